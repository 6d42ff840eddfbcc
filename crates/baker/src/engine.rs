use bakeconfig::BakeType;
use shadergraph::{ImageWrite, NodeKind, RenderEngine, Scene};
use tracing::debug;

use crate::state::BAKE_ENGINE;

/// Failures raised by a bake call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BakeError {
    #[error("object '{0}' does not exist")]
    UnknownObject(String),
    #[error("baking requires the {BAKE_ENGINE:?} engine, scene uses {0:?}")]
    WrongEngine(RenderEngine),
    #[error("material '{0}' has no active image texture node")]
    NoActiveImage(String),
    #[error("object '{object}' has no UV map '{uv_map}'")]
    MissingUvMap { object: String, uv_map: String },
    #[error("image '{0}' does not exist")]
    MissingImage(String),
    #[error("bake failed: {0}")]
    Engine(String),
}

/// The external render call. It bakes every material of `object` at once,
/// writing whatever feeds each material output into the image of that
/// material's active image texture node.
pub trait BakeEngine {
    /// Runs one bake for `object` with a single `margin` for all materials.
    fn bake(
        &mut self,
        scene: &mut Scene,
        object: &str,
        bake_type: BakeType,
        margin: u32,
    ) -> Result<(), BakeError>;
}

impl<F> BakeEngine for F
where
    F: FnMut(&mut Scene, &str, BakeType, u32) -> Result<(), BakeError>,
{
    fn bake(
        &mut self,
        scene: &mut Scene,
        object: &str,
        bake_type: BakeType,
        margin: u32,
    ) -> Result<(), BakeError> {
        self(scene, object, bake_type, margin)
    }
}

/// Engine that checks what a real renderer would require and records an
/// [`ImageWrite`] per material instead of rasterising.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    calls: usize,
    fail_on_call: Option<usize>,
}

impl SimulatedEngine {
    /// Creates an engine that never fails on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `call`-th bake (1-based) fail after validation passed.
    pub fn failing_on(call: usize) -> Self {
        Self {
            calls: 0,
            fail_on_call: Some(call),
        }
    }

    /// Number of bake calls seen so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl BakeEngine for SimulatedEngine {
    fn bake(
        &mut self,
        scene: &mut Scene,
        object: &str,
        bake_type: BakeType,
        margin: u32,
    ) -> Result<(), BakeError> {
        self.calls += 1;

        if scene.render.engine != BAKE_ENGINE {
            return Err(BakeError::WrongEngine(scene.render.engine));
        }
        let target = scene
            .object(object)
            .ok_or_else(|| BakeError::UnknownObject(object.to_string()))?;
        let uv_layer = target
            .active_uv_layer()
            .ok_or_else(|| BakeError::MissingUvMap {
                object: object.to_string(),
                uv_map: "<active>".into(),
            })?;
        debug!(object, uv_layer, ?bake_type, margin, "simulating bake");

        let mut writes = Vec::new();
        for name in target.materials() {
            let material = scene
                .material(name)
                .filter(|material| material.use_nodes)
                .ok_or_else(|| BakeError::NoActiveImage(name.to_string()))?;
            let image = material
                .tree
                .active()
                .and_then(|id| material.tree.node(id))
                .filter(|node| node.kind == NodeKind::ImageTexture)
                .and_then(|node| node.image.clone())
                .ok_or_else(|| BakeError::NoActiveImage(name.to_string()))?;
            if !scene.images.contains(&image) {
                return Err(BakeError::MissingImage(image));
            }
            for (_, node) in material.tree.nodes() {
                if let Some(uv_map) = node.uv_map.as_deref() {
                    if node.kind == NodeKind::UvMap && !target.has_uv_layer(uv_map) {
                        return Err(BakeError::MissingUvMap {
                            object: object.to_string(),
                            uv_map: uv_map.to_string(),
                        });
                    }
                }
            }

            let sources = material
                .surface_input()
                .map(|surface| {
                    material
                        .tree
                        .upstream(&surface)
                        .into_iter()
                        .filter_map(|output| {
                            material
                                .tree
                                .node(output.node)
                                .map(|node| format!("{}.{}", node.display_name(), output.socket))
                        })
                        .collect()
                })
                .unwrap_or_default();
            writes.push((
                image,
                ImageWrite {
                    material: name.to_string(),
                    sources,
                    margin,
                },
            ));
        }

        if self.fail_on_call == Some(self.calls) {
            return Err(BakeError::Engine(format!(
                "simulated failure in bake call {}",
                self.calls
            )));
        }

        for (image, write) in writes {
            if let Some(image) = scene.images.get_mut(&image) {
                image.record(write);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadergraph::{ColorSpace, InputRef, Material, Node, Object, OutputRef, SURFACE};

    fn scene() -> Scene {
        let mut material = Material::new("Metal");
        let output = material.tree.add_node(Node::material_output());
        let value = material.tree.add_node(Node::value(0.5));
        material
            .tree
            .link(OutputRef::new(value, "Value"), InputRef::new(output, SURFACE))
            .unwrap();
        let sampler = material.tree.add_node(Node::image_texture("Bake"));
        material.tree.set_active(Some(sampler)).unwrap();

        let mut scene = Scene::new();
        scene.render.engine = RenderEngine::Cycles;
        scene.materials.push(material);
        scene
            .objects
            .push(Object::mesh("Crate").with_material("Metal").with_uv_layer("UVMap"));
        scene.images.create("Bake", 64, 64, ColorSpace::Srgb);
        scene
    }

    #[test]
    fn records_surface_sources_into_active_image() {
        let mut scene = scene();
        let mut engine = SimulatedEngine::new();
        engine.bake(&mut scene, "Crate", BakeType::Emit, 8).unwrap();

        let image = scene.images.get("Bake").unwrap();
        assert!(image.has_data);
        assert_eq!(
            image.writes,
            vec![ImageWrite {
                material: "Metal".into(),
                sources: vec!["Value.Value".into()],
                margin: 8,
            }]
        );
        assert_eq!(engine.calls(), 1);
    }

    #[test]
    fn rejects_wrong_engine_and_missing_active_image() {
        let mut scene = scene();
        scene.render.engine = RenderEngine::Eevee;
        let err = SimulatedEngine::new()
            .bake(&mut scene, "Crate", BakeType::Emit, 8)
            .unwrap_err();
        assert_eq!(err, BakeError::WrongEngine(RenderEngine::Eevee));

        scene.render.engine = RenderEngine::Cycles;
        scene.material_mut("Metal").unwrap().tree.set_active(None).unwrap();
        let err = SimulatedEngine::new()
            .bake(&mut scene, "Crate", BakeType::Emit, 8)
            .unwrap_err();
        assert_eq!(err, BakeError::NoActiveImage("Metal".into()));
    }

    #[test]
    fn injected_failure_writes_nothing() {
        let mut scene = scene();
        let mut engine = SimulatedEngine::failing_on(2);
        engine.bake(&mut scene, "Crate", BakeType::Emit, 8).unwrap();
        let err = engine
            .bake(&mut scene, "Crate", BakeType::Emit, 8)
            .unwrap_err();
        assert!(matches!(err, BakeError::Engine(_)));
        assert_eq!(scene.images.get("Bake").unwrap().writes.len(), 1);
    }

    #[test]
    fn closures_are_engines() {
        let mut scene = scene();
        let mut seen = Vec::new();
        let mut engine = |_: &mut Scene, object: &str, _: BakeType, margin: u32| -> Result<(), BakeError> {
            seen.push((object.to_string(), margin));
            Ok(())
        };
        engine.bake(&mut scene, "Crate", BakeType::Diffuse, 4).unwrap();
        assert_eq!(seen, vec![("Crate".to_string(), 4)]);
    }
}
