//! Global renderer state held for the length of a bake run.
use std::ops::{Deref, DerefMut};

use shadergraph::{RenderEngine, Scene};
use tracing::{debug, info};

/// Engine the bake call requires.
pub const BAKE_ENGINE: RenderEngine = RenderEngine::Cycles;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectState {
    pub name: String,
    pub hide_render: bool,
    pub active_uv: Option<String>,
}

/// Renderer settings and per-object flags a run changes, as found before
/// the run started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererStateSnapshot {
    pub engine: RenderEngine,
    pub use_clear: bool,
    pub objects: Vec<ObjectState>,
}

impl RendererStateSnapshot {
    /// Unknown object names are ignored.
    pub fn capture(scene: &Scene, objects: &[&str]) -> Self {
        Self {
            engine: scene.render.engine,
            use_clear: scene.render.use_clear,
            objects: objects
                .iter()
                .filter_map(|name| scene.object(name))
                .map(|object| ObjectState {
                    name: object.name.clone(),
                    hide_render: object.hide_render,
                    active_uv: object.active_uv_layer().map(str::to_string),
                })
                .collect(),
        }
    }

    pub fn restore(&self, scene: &mut Scene) {
        scene.render.engine = self.engine;
        scene.render.use_clear = self.use_clear;
        for state in &self.objects {
            let Some(object) = scene.object_mut(&state.name) else {
                continue;
            };
            object.hide_render = state.hide_render;
            for layer in &mut object.uv_layers {
                layer.active = state.active_uv.as_deref() == Some(layer.name.as_str());
            }
        }
    }
}

/// Scene borrowed for a bake run. Construction forces the bake engine,
/// disables the blanket clear and makes the baked objects renderable;
/// the snapshot is put back by `finish` or, failing that, on drop.
pub struct RenderSession<'a> {
    scene: &'a mut Scene,
    snapshot: RendererStateSnapshot,
    restored: bool,
}

impl<'a> RenderSession<'a> {
    pub fn begin(scene: &'a mut Scene, objects: &[&str]) -> Self {
        let snapshot = RendererStateSnapshot::capture(scene, objects);
        scene.render.engine = BAKE_ENGINE;
        scene.render.use_clear = false;
        for name in objects {
            if let Some(object) = scene.object_mut(name) {
                object.hide_render = false;
            }
        }
        info!(objects = objects.len(), "renderer state saved");
        Self {
            scene,
            snapshot,
            restored: false,
        }
    }

    pub fn snapshot(&self) -> &RendererStateSnapshot {
        &self.snapshot
    }

    /// Makes `uv_map` the only active layer of `object` until the session
    /// ends. Returns `false` when the object or layer does not exist.
    pub fn activate_uv_layer(&mut self, object: &str, uv_map: &str) -> bool {
        let activated = self
            .scene
            .object_mut(object)
            .map(|object| object.set_active_uv_layer(uv_map))
            .unwrap_or(false);
        debug!(object, uv_map, activated, "selected bake UV layer");
        activated
    }

    pub fn finish(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.snapshot.restore(&mut *self.scene);
        self.restored = true;
        info!("renderer state restored");
    }
}

impl Deref for RenderSession<'_> {
    type Target = Scene;

    fn deref(&self) -> &Scene {
        &*self.scene
    }
}

impl DerefMut for RenderSession<'_> {
    fn deref_mut(&mut self) -> &mut Scene {
        &mut *self.scene
    }
}

impl Drop for RenderSession<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
