use std::collections::BTreeMap;

use bakeconfig::{
    detect_conflict, BakeConfig, BakeMode, BakePreset, BakeType, ChannelClaim, ChannelMask,
    ConfigResolver, EffectiveConfig, ImageTarget, MaterialInterface, ResolveError,
};
use shadergraph::{ColorSpace, Object, Scene, SocketKind};
use tracing::{debug, info, warn};

mod summary;
mod validate;

pub use summary::{ImageSummary, PassSummary};
pub use validate::ValidationIssue;

/// UV map assumed when neither the config nor the object names one.
pub const FALLBACK_UV_MAP: &str = "UVMap";

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("object '{0}' not found")]
    UnknownObject(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakeTarget {
    pub input: String,
    pub kind: SocketKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDescriptor {
    New {
        name: String,
        resolution: u32,
        color_space: ColorSpace,
    },
    Existing {
        name: String,
    },
    /// Shared 1x1 image sampled by dummy instructions.
    Placeholder,
}

impl ImageDescriptor {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::New { name, .. } | Self::Existing { name } => Some(name),
            Self::Placeholder => None,
        }
    }

    pub fn mode(&self) -> Option<BakeMode> {
        match self {
            Self::New { .. } => Some(BakeMode::New),
            Self::Existing { .. } => Some(BakeMode::Existing),
            Self::Placeholder => None,
        }
    }
}

/// Name of the image created for a new-image bake of `input` on `object`.
pub fn derived_image_name(object: &str, input: &str) -> String {
    format!("{object}_Bake_{input}")
}

/// One material's part of a pass. Without a target it is a dummy that only
/// keeps the material's graph consistent while its object is baked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakeInstruction {
    pub material: String,
    pub target: Option<BakeTarget>,
    pub uv_map: Option<String>,
    pub channels: ChannelMask,
    pub image: ImageDescriptor,
    pub margin: u32,
    /// Preset this instruction was resolved from.
    pub preset: String,
}

impl BakeInstruction {
    pub fn from_config(object: &str, preset: &str, config: &EffectiveConfig) -> Self {
        let image = match &config.image {
            ImageTarget::New {
                resolution,
                color_space,
            } => ImageDescriptor::New {
                name: derived_image_name(object, &config.target),
                resolution: *resolution,
                color_space: *color_space,
            },
            ImageTarget::Existing { name } => ImageDescriptor::Existing { name: name.clone() },
        };
        Self {
            material: config.material.clone(),
            target: Some(BakeTarget {
                input: config.target.clone(),
                kind: config.target_kind,
            }),
            uv_map: Some(config.uv_map.clone()),
            channels: config.channels.clone(),
            image,
            margin: config.margin,
            preset: preset.to_string(),
        }
    }

    pub fn dummy(material: &str, preset: &str) -> Self {
        Self {
            material: material.to_string(),
            target: None,
            uv_map: None,
            channels: ChannelMask::new(),
            image: ImageDescriptor::Placeholder,
            margin: 0,
            preset: preset.to_string(),
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.target.is_none()
    }

    pub fn input(&self) -> Option<&str> {
        self.target.as_ref().map(|target| target.input.as_str())
    }

    pub fn claim(&self) -> Option<ChannelClaim<'_>> {
        match (&self.image, &self.target, &self.uv_map) {
            (ImageDescriptor::Existing { name }, Some(target), Some(uv_map)) => Some(ChannelClaim {
                image: name,
                uv_map,
                socket: &target.input,
                channels: &self.channels,
            }),
            _ => None,
        }
    }

    fn targets_existing(&self, image: &str, uv_map: &str, material: &str) -> bool {
        !self.is_dummy()
            && self.material == material
            && self.uv_map.as_deref() == Some(uv_map)
            && matches!(&self.image, ImageDescriptor::Existing { name } if name == image)
    }
}

/// One external bake call: every material of `object`, baked together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pass {
    pub object: String,
    pub index: usize,
    pub preset: String,
    pub bake_type: BakeType,
    pub instructions: Vec<BakeInstruction>,
    pub max_margin: u32,
}

impl Pass {
    pub fn real_instructions(&self) -> impl Iterator<Item = &BakeInstruction> {
        self.instructions.iter().filter(|instruction| !instruction.is_dummy())
    }

    pub fn has_real_instructions(&self) -> bool {
        self.real_instructions().next().is_some()
    }

    /// Distinct materials in instruction order.
    pub fn materials(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for instruction in &self.instructions {
            if !seen.contains(&instruction.material.as_str()) {
                seen.push(instruction.material.as_str());
            }
        }
        seen
    }

    /// UV map the object rasterises with during this pass.
    pub fn uv_map(&self) -> Option<&str> {
        self.real_instructions()
            .find_map(|instruction| instruction.uv_map.as_deref())
    }

    pub fn recompute_margin(&mut self) {
        self.max_margin = self
            .real_instructions()
            .map(|instruction| instruction.margin)
            .max()
            .unwrap_or(0);
    }
}

/// A preset left out of the plan, with nothing of it applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPreset {
    pub object: String,
    pub preset: String,
    pub error: ResolveError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPlan {
    pub passes: Vec<Pass>,
    pub rejected: Vec<RejectedPreset>,
}

impl PassPlan {
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn summaries(&self) -> Vec<PassSummary> {
        self.passes.iter().map(PassSummary::from_pass).collect()
    }
}

pub struct PassScheduler<'a> {
    scene: &'a Scene,
    config: &'a BakeConfig,
}

impl<'a> PassScheduler<'a> {
    pub fn new(scene: &'a Scene, config: &'a BakeConfig) -> Self {
        Self { scene, config }
    }

    /// Bake margin used when neither preset nor override sets one.
    pub fn global_margin(&self) -> u32 {
        self.config
            .defaults
            .margin
            .unwrap_or(self.scene.render.margin)
    }

    /// Builds passes for `objects` in the given order, presets in
    /// declaration order. A preset whose resolution fails or whose merge
    /// would conflict is recorded in `rejected`; the other presets of the
    /// object are still scheduled.
    pub fn schedule(&self, objects: &[&str]) -> Result<PassPlan, SchedulerError> {
        let mut plan = PassPlan::default();
        for name in objects {
            let object = self
                .scene
                .object(name)
                .ok_or_else(|| SchedulerError::UnknownObject(name.to_string()))?;
            if !object.is_mesh() {
                warn!(object = %object.name, "not a mesh; skipping");
                continue;
            }
            self.schedule_object(object, &mut plan);
        }
        info!(
            passes = plan.passes.len(),
            rejected = plan.rejected.len(),
            "scheduled bake passes"
        );
        Ok(plan)
    }

    fn schedule_object(&self, object: &Object, plan: &mut PassPlan) {
        let materials = object.materials();
        let interfaces: Vec<MaterialInterface> = materials
            .iter()
            .filter_map(|name| self.scene.material(name))
            .filter(|material| material.use_nodes)
            .filter_map(MaterialInterface::from_material)
            .collect();

        let default_uv_map = self
            .config
            .defaults
            .uv_map
            .clone()
            .or_else(|| object.active_uv_layer().map(str::to_string))
            .unwrap_or_else(|| FALLBACK_UV_MAP.to_string());
        let resolver = ConfigResolver::new(self.global_margin(), default_uv_map);

        for preset in self.config.presets(&object.name) {
            if !preset.active {
                debug!(object = %object.name, preset = %preset.name, "preset inactive; skipping");
                continue;
            }

            let configs = match resolver.resolve_preset(preset, &interfaces) {
                Ok(configs) => configs,
                Err(error) => {
                    warn!(object = %object.name, preset = %preset.name, %error, "rejecting preset");
                    plan.rejected.push(RejectedPreset {
                        object: object.name.clone(),
                        preset: preset.name.clone(),
                        error,
                    });
                    continue;
                }
            };

            if let Err(error) = self.schedule_preset(object, &materials, preset, &configs, plan) {
                warn!(object = %object.name, preset = %preset.name, %error, "rejecting preset");
                plan.rejected.push(RejectedPreset {
                    object: object.name.clone(),
                    preset: preset.name.clone(),
                    error,
                });
            }
        }
    }

    fn schedule_preset(
        &self,
        object: &Object,
        materials: &[&str],
        preset: &BakePreset,
        configs: &[EffectiveConfig],
        plan: &mut PassPlan,
    ) -> Result<(), ResolveError> {
        let by_material: BTreeMap<&str, &EffectiveConfig> = configs
            .iter()
            .map(|config| (config.material.as_str(), config))
            .collect();

        let mut instructions = Vec::with_capacity(materials.len());
        let mut merges: BTreeMap<usize, Vec<BakeInstruction>> = BTreeMap::new();

        for material in materials {
            let Some(config) = by_material.get(material) else {
                instructions.push(BakeInstruction::dummy(material, &preset.name));
                continue;
            };
            let instruction = BakeInstruction::from_config(&object.name, &preset.name, config);

            let earlier = match &config.image {
                ImageTarget::Existing { name } => plan.passes.iter().position(|pass| {
                    pass.object == object.name
                        && pass.bake_type == preset.bake_type
                        && pass.instructions.iter().any(|other| {
                            other.targets_existing(name, &config.uv_map, &config.material)
                        })
                }),
                ImageTarget::New { .. } => None,
            };

            match earlier {
                Some(index) => {
                    debug!(
                        object = %object.name,
                        preset = %preset.name,
                        material,
                        pass = index,
                        "merging into earlier pass on the same image"
                    );
                    merges.entry(index).or_default().push(instruction);
                    instructions.push(BakeInstruction::dummy(material, &preset.name));
                }
                None => instructions.push(instruction),
            }
        }

        for (index, merged) in &merges {
            let pass = &plan.passes[*index];
            let claims = pass
                .instructions
                .iter()
                .chain(merged.iter())
                .filter_map(BakeInstruction::claim);
            if let Some(conflict) = detect_conflict(&preset.name, claims) {
                return Err(conflict.into());
            }
        }

        for (index, merged) in merges {
            let pass = &mut plan.passes[index];
            for instruction in merged {
                // Replace the earlier pass's dummy for this material, if any.
                pass.instructions
                    .retain(|other| !(other.is_dummy() && other.material == instruction.material));
                pass.instructions.push(instruction);
            }
            pass.recompute_margin();
        }

        let mut pass = Pass {
            object: object.name.clone(),
            index: plan.passes.len(),
            preset: preset.name.clone(),
            bake_type: preset.bake_type,
            instructions,
            max_margin: 0,
        };
        if !pass.has_real_instructions() {
            debug!(object = %object.name, preset = %preset.name, "nothing to bake; dropping pass");
            return Ok(());
        }
        pass.recompute_margin();
        plan.passes.push(pass);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use shadergraph::{Material, Object, Scene, Socket, SocketKind};

    pub fn pbr(name: &str) -> Material {
        Material::with_interface(
            name,
            "Principled",
            vec![
                Socket::new("Base Color", SocketKind::Color),
                Socket::new("Roughness", SocketKind::Float),
                Socket::new("Metallic", SocketKind::Float),
                Socket::new("Specular", SocketKind::Float),
            ],
        )
        .unwrap()
    }

    pub fn scene() -> Scene {
        let mut scene = Scene::new();
        scene.materials.push(pbr("Wood"));
        scene.materials.push(pbr("Metal"));
        scene.materials.push(Material::with_interface(
            "Glass",
            "Glass",
            vec![Socket::new("IOR", SocketKind::Float)],
        )
        .unwrap());
        scene.objects.push(
            Object::mesh("Crate")
                .with_material("Wood")
                .with_material("Metal")
                .with_material("Glass")
                .with_uv_layer("UVMap")
                .with_uv_layer("Lightmap"),
        );
        scene
    }
}
