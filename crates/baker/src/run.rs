//! Drives a whole bake run: renderer state, images, graph surgery and one
//! engine call per pass.
use std::collections::BTreeSet;
use std::fmt;

use scheduler::{BakeInstruction, Pass};
use shadergraph::Scene;
use tracing::{debug, info, warn};

use crate::engine::{BakeEngine, BakeError};
use crate::images::ImageResolver;
use crate::rewire::{GraphRewirer, MaterialBake, RewireError};
use crate::state::RenderSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BakeStatus {
    Finished,
    Cancelled { reason: String },
}

impl fmt::Display for BakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("finished"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
        }
    }
}

/// Outcome of [`Baker::run`]. Passes completed before a cancellation keep
/// their results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakeReport {
    pub status: BakeStatus,
    pub passes_completed: usize,
    pub passes_skipped: usize,
    pub warnings: Vec<String>,
}

impl BakeReport {
    pub fn is_finished(&self) -> bool {
        self.status == BakeStatus::Finished
    }
}

impl Default for BakeReport {
    fn default() -> Self {
        Self {
            status: BakeStatus::Finished,
            passes_completed: 0,
            passes_skipped: 0,
            warnings: Vec::new(),
        }
    }
}

enum PassOutcome {
    Completed,
    Skipped,
}

pub struct Baker<E> {
    engine: E,
}

impl<E: BakeEngine> Baker<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Runs `passes` in order. The first failed engine call rolls back its
    /// own pass and stops the run; earlier passes are not undone. Renderer
    /// state is restored and the placeholder image removed on every path.
    pub fn run(&mut self, scene: &mut Scene, passes: &[Pass]) -> BakeReport {
        let mut objects: Vec<&str> = Vec::new();
        for pass in passes {
            if !objects.contains(&pass.object.as_str()) {
                objects.push(&pass.object);
            }
        }

        let mut report = BakeReport::default();
        let mut session = RenderSession::begin(scene, &objects);
        let mut images = ImageResolver::new();
        clear_images(&mut session, &images, passes);

        for pass in passes {
            match self.run_pass(&mut session, &mut images, pass, &mut report.warnings) {
                Ok(PassOutcome::Completed) => report.passes_completed += 1,
                Ok(PassOutcome::Skipped) => report.passes_skipped += 1,
                Err(err) => {
                    warn!(pass = pass.index, object = %pass.object, %err, "bake failed; stopping run");
                    report.status = BakeStatus::Cancelled {
                        reason: format!("pass {} ({}): {err}", pass.index, pass.object),
                    };
                    break;
                }
            }
        }

        images.dispose(&mut session.images);
        session.finish();
        info!(
            status = %report.status,
            completed = report.passes_completed,
            skipped = report.passes_skipped,
            warnings = report.warnings.len(),
            "bake run done"
        );
        report
    }

    fn run_pass(
        &mut self,
        session: &mut RenderSession<'_>,
        images: &mut ImageResolver,
        pass: &Pass,
        warnings: &mut Vec<String>,
    ) -> Result<PassOutcome, BakeError> {
        info!(
            pass = pass.index,
            object = %pass.object,
            preset = %pass.preset,
            bake_type = ?pass.bake_type,
            margin = pass.max_margin,
            "starting pass"
        );

        let uv_map = pass.uv_map();
        if let Some(uv_map) = uv_map {
            if !session.activate_uv_layer(&pass.object, uv_map) {
                let message = format!(
                    "pass {}: object '{}' has no UV map '{uv_map}'; pass skipped",
                    pass.index, pass.object
                );
                warn!("{message}");
                warnings.push(message);
                return Ok(PassOutcome::Skipped);
            }
        }
        // A single layer is what the engine rasterises with anyway.
        let uv_node = session
            .object(&pass.object)
            .filter(|object| object.uv_layers.len() > 1)
            .and(uv_map);

        let rewirer = GraphRewirer::new(pass.bake_type, pass.index);
        let mark = images.mark();
        let mut prepared: Vec<MaterialBake> = Vec::new();
        for material in pass.materials() {
            let real: Vec<&BakeInstruction> = pass
                .real_instructions()
                .filter(|instruction| instruction.material == material)
                .collect();
            if let Some(bake) =
                prepare_material(session, images, &rewirer, material, uv_node, &real, warnings)
            {
                prepared.push(bake);
            }
        }

        if prepared.iter().all(MaterialBake::is_dummy) {
            let message = format!(
                "pass {} ({}): no material could be prepared; pass skipped",
                pass.index, pass.object
            );
            warn!("{message}");
            warnings.push(message);
            rollback(session, &rewirer, prepared, warnings);
            images.discard_since(&mut session.images, mark);
            return Ok(PassOutcome::Skipped);
        }

        let scene: &mut Scene = session;
        match self
            .engine
            .bake(scene, &pass.object, pass.bake_type, pass.max_margin)
        {
            Ok(()) => {
                for bake in prepared {
                    let name = bake.material.clone();
                    let Some(material) = scene.material_mut(&name) else {
                        continue;
                    };
                    match rewirer.cleanup_pass(material, bake) {
                        Ok(cleanup) => warnings.extend(cleanup),
                        Err(err) => {
                            warn!(material = %name, %err, "cleanup failed");
                            warnings.push(format!("material '{name}': cleanup failed: {err}"));
                        }
                    }
                }
                info!(pass = pass.index, object = %pass.object, "pass completed");
                Ok(PassOutcome::Completed)
            }
            Err(err) => {
                rollback(session, &rewirer, prepared, warnings);
                images.discard_since(&mut session.images, mark);
                Err(err)
            }
        }
    }
}

/// Clears target images that already hold data when their clear policy asks
/// for it. Images still to be created are left to the pass that needs them.
fn clear_images(session: &mut RenderSession<'_>, images: &ImageResolver, passes: &[Pass]) {
    let use_clear = session.snapshot().use_clear;
    let targets: BTreeSet<String> = passes
        .iter()
        .flat_map(Pass::real_instructions)
        .filter_map(|instruction| images.lookup(&session.images, &instruction.image))
        .collect();

    for name in targets {
        let Some(image) = session.images.get_mut(&name) else {
            continue;
        };
        if image.has_data && image.clear_override.unwrap_or(use_clear) {
            image.clear();
            debug!(image = %name, "cleared image before baking");
        }
    }
}

/// Prepares one material for the pass, falling back to a dummy sampler when
/// its real instructions cannot be wired. `None` means the material could
/// not be touched at all.
fn prepare_material(
    session: &mut RenderSession<'_>,
    images: &mut ImageResolver,
    rewirer: &GraphRewirer,
    material: &str,
    uv_map: Option<&str>,
    real: &[&BakeInstruction],
    warnings: &mut Vec<String>,
) -> Option<MaterialBake> {
    let mut usable = Vec::with_capacity(real.len());
    let mut target_images = BTreeSet::new();
    for instruction in real {
        match images.resolve(&mut session.images, &instruction.image) {
            Ok(name) => {
                target_images.insert(name);
                usable.push(*instruction);
            }
            Err(err) => {
                let message = format!(
                    "material '{material}': {err}; input '{}' skipped",
                    instruction.input().unwrap_or_default()
                );
                warn!("{message}");
                warnings.push(message);
            }
        }
    }
    let placeholder = images.placeholder(&mut session.images);

    let Some(target) = session.material_mut(material) else {
        let message = format!("material '{material}' does not exist; skipped");
        warn!("{message}");
        warnings.push(message);
        return None;
    };

    let attempt = match (target_images.len(), target_images.iter().next()) {
        (0, _) | (_, None) => None,
        (1, Some(image)) => Some(rewirer.prepare(target, image, uv_map, &usable)),
        _ => Some(Err(RewireError::MixedImages(material.to_string()))),
    };

    match attempt {
        Some(Ok(bake)) => {
            warnings.extend(
                bake.warnings
                    .iter()
                    .map(|warning| format!("material '{material}': {warning}")),
            );
            return Some(bake);
        }
        Some(Err(err)) => {
            let message = format!("material '{material}' skipped: {err}");
            warn!("{message}");
            warnings.push(message);
        }
        None => {}
    }

    match rewirer.prepare_dummy(target, &placeholder) {
        Ok(bake) => Some(bake),
        Err(err) => {
            let message = format!("material '{material}' skipped: {err}");
            warn!("{message}");
            warnings.push(message);
            None
        }
    }
}

fn rollback(
    scene: &mut Scene,
    rewirer: &GraphRewirer,
    prepared: Vec<MaterialBake>,
    warnings: &mut Vec<String>,
) {
    for bake in prepared {
        let name = bake.material.clone();
        let Some(material) = scene.material_mut(&name) else {
            continue;
        };
        for failure in rewirer.rollback(material, bake) {
            warn!(material = %name, %failure, "rollback step failed");
            warnings.push(format!("material '{name}': rollback step failed: {failure}"));
        }
    }
}
