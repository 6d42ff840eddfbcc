//! Two-level preset/override resolution and channel conflict detection.
//!
//! `resolve_field` is the only override rule: a field comes from the
//! per-material override iff that override's flag is set, never from a mix.
//! Settings share one flag, margin has its own.
use std::collections::{BTreeMap, BTreeSet};

use shadergraph::{ColorSpace, Material, SocketKind};
use tracing::debug;

use crate::{BakeMode, BakePreset, BakeSettings, Channel, ChannelMask, MaterialOverride};

/// Picks `override_value` when it exists and `use_override` is set.
pub fn resolve_field<'a, T: ?Sized>(
    preset: &'a T,
    override_value: Option<&'a T>,
    use_override: bool,
) -> &'a T {
    match override_value {
        Some(value) if use_override => value,
        _ => preset,
    }
}

fn effective_settings(preset: &BakeSettings, record: Option<&MaterialOverride>) -> BakeSettings {
    let flag = record.map(|r| r.use_override).unwrap_or(false);
    let other = record.map(|r| &r.settings);
    BakeSettings {
        target: resolve_field(&preset.target, other.map(|s| &s.target), flag).clone(),
        uv_map: resolve_field(&preset.uv_map, other.map(|s| &s.uv_map), flag).clone(),
        mode: *resolve_field(&preset.mode, other.map(|s| &s.mode), flag),
        image: resolve_field(&preset.image, other.map(|s| &s.image), flag).clone(),
        resolution: *resolve_field(&preset.resolution, other.map(|s| &s.resolution), flag),
        color_space: *resolve_field(&preset.color_space, other.map(|s| &s.color_space), flag),
        channel: *resolve_field(&preset.channel, other.map(|s| &s.channel), flag),
        channels: resolve_field(&preset.channels, other.map(|s| &s.channels), flag).clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTarget {
    New {
        resolution: u32,
        color_space: ColorSpace,
    },
    Existing {
        name: String,
    },
}

impl ImageTarget {
    pub fn mode(&self) -> BakeMode {
        match self {
            Self::New { .. } => BakeMode::New,
            Self::Existing { .. } => BakeMode::Existing,
        }
    }

    pub fn existing_name(&self) -> Option<&str> {
        match self {
            Self::Existing { name } => Some(name),
            Self::New { .. } => None,
        }
    }
}

/// Fully resolved settings for one material under one preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub material: String,
    pub target: String,
    pub target_kind: SocketKind,
    pub uv_map: String,
    pub image: ImageTarget,
    pub channels: ChannelMask,
    pub margin: u32,
    pub overridden: bool,
}

impl EffectiveConfig {
    /// Channels claimed in an existing image; `None` for new images, which
    /// never conflict.
    pub fn claim(&self) -> Option<ChannelClaim<'_>> {
        let image = self.image.existing_name()?;
        Some(ChannelClaim {
            image,
            uv_map: &self.uv_map,
            socket: &self.target,
            channels: &self.channels,
        })
    }
}

/// The bakeable inputs of one material's interface node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialInterface {
    pub material: String,
    pub inputs: Vec<(String, SocketKind)>,
}

impl MaterialInterface {
    /// `None` when the material has no interface group feeding its output.
    pub fn from_material(material: &Material) -> Option<Self> {
        material.interface_node()?;
        Some(Self {
            material: material.name.clone(),
            inputs: material
                .interface_inputs()
                .into_iter()
                .map(|socket| (socket.name.clone(), socket.kind))
                .collect(),
        })
    }

    pub fn input_kind(&self, name: &str) -> Option<SocketKind> {
        self.inputs
            .iter()
            .find(|(input, _)| input == name)
            .map(|(_, kind)| *kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClaim<'a> {
    pub image: &'a str,
    pub uv_map: &'a str,
    pub socket: &'a str,
    pub channels: &'a ChannelMask,
}

/// Two different sockets writing the same channel of one existing image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "preset '{preset}': sockets '{first}' and '{second}' both write channel {channel} of image '{image}' on UV map '{uv_map}'"
)]
pub struct BakeConflict {
    pub preset: String,
    pub image: String,
    pub uv_map: String,
    pub channel: Channel,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Conflict(#[from] BakeConflict),
    #[error("preset '{preset}': material '{material}' overrides target '{input}' which its interface does not have")]
    UnknownInput {
        preset: String,
        material: String,
        input: String,
    },
    #[error("preset '{preset}': material '{material}' overrides target '{input}' which is a shader and cannot be baked")]
    Unbakeable {
        preset: String,
        material: String,
        input: String,
    },
    #[error("preset '{preset}': material '{material}' targets an existing image but names none")]
    MissingImage { preset: String, material: String },
}

/// A full-colour claim occupies the three colour channels.
pub fn claimed_channels(mask: &ChannelMask) -> ChannelMask {
    if mask.is_empty() {
        [Channel::R, Channel::G, Channel::B].into_iter().collect()
    } else {
        mask.clone()
    }
}

/// Finds the first channel of an `(image, uv_map)` group claimed by two
/// different sockets. Groups and channels are visited in sorted order and
/// the two smallest socket names are reported, so the result does not depend
/// on the order of `claims`.
pub fn detect_conflict<'a>(
    preset: &str,
    claims: impl IntoIterator<Item = ChannelClaim<'a>>,
) -> Option<BakeConflict> {
    let mut owners: BTreeMap<(&str, &str, Channel), BTreeSet<&str>> = BTreeMap::new();
    for claim in claims {
        for channel in claimed_channels(claim.channels) {
            owners
                .entry((claim.image, claim.uv_map, channel))
                .or_default()
                .insert(claim.socket);
        }
    }

    owners
        .into_iter()
        .find_map(|((image, uv_map, channel), sockets)| {
            let mut sockets = sockets.into_iter();
            let first = sockets.next()?;
            let second = sockets.next()?;
            Some(BakeConflict {
                preset: preset.to_string(),
                image: image.to_string(),
                uv_map: uv_map.to_string(),
                channel,
                first: first.to_string(),
                second: second.to_string(),
            })
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigResolver {
    pub global_margin: u32,
    /// UV map used when neither preset nor override names one.
    pub default_uv_map: String,
}

impl ConfigResolver {
    pub fn new(global_margin: u32, default_uv_map: impl Into<String>) -> Self {
        Self {
            global_margin,
            default_uv_map: default_uv_map.into(),
        }
    }

    /// Resolves `preset` for every interface, in interface order. Materials
    /// whose resolved target is missing (or names nothing) are skipped unless
    /// an override chose that target, which is an error. Nothing is returned
    /// when any conflict is found.
    pub fn resolve_preset(
        &self,
        preset: &BakePreset,
        interfaces: &[MaterialInterface],
    ) -> Result<Vec<EffectiveConfig>, ResolveError> {
        let mut configs = Vec::new();
        for interface in interfaces {
            if let Some(config) = self.resolve_material(preset, interface)? {
                configs.push(config);
            }
        }

        if let Some(conflict) = detect_conflict(
            &preset.name,
            configs.iter().filter_map(EffectiveConfig::claim),
        ) {
            return Err(conflict.into());
        }

        Ok(configs)
    }

    fn resolve_material(
        &self,
        preset: &BakePreset,
        interface: &MaterialInterface,
    ) -> Result<Option<EffectiveConfig>, ResolveError> {
        let record = preset.overrides.get(&interface.material);
        let overridden = record.map(|r| r.use_override).unwrap_or(false);
        let settings = effective_settings(&preset.settings, record);

        let Some(target) = settings.target else {
            debug!(preset = %preset.name, material = %interface.material, "no target; skipping material");
            return Ok(None);
        };

        let kind = match interface.input_kind(&target) {
            Some(kind) if kind.is_bakeable() => kind,
            Some(_) if overridden => {
                return Err(ResolveError::Unbakeable {
                    preset: preset.name.clone(),
                    material: interface.material.clone(),
                    input: target,
                })
            }
            None if overridden => {
                return Err(ResolveError::UnknownInput {
                    preset: preset.name.clone(),
                    material: interface.material.clone(),
                    input: target,
                })
            }
            _ => {
                debug!(
                    preset = %preset.name,
                    material = %interface.material,
                    input = %target,
                    "interface has no bakeable input; skipping material"
                );
                return Ok(None);
            }
        };

        let image = match settings.mode {
            BakeMode::New => ImageTarget::New {
                resolution: settings.resolution,
                color_space: settings.color_space,
            },
            BakeMode::Existing => match settings.image {
                Some(name) if !name.trim().is_empty() => ImageTarget::Existing { name },
                _ => {
                    return Err(ResolveError::MissingImage {
                        preset: preset.name.clone(),
                        material: interface.material.clone(),
                    })
                }
            },
        };

        let channels = if kind.is_scalar() {
            [settings.channel].into_iter().collect()
        } else {
            settings.channels
        };

        let margin_flag = record.map(|r| r.use_margin_override).unwrap_or(false);
        let margin = resolve_field(&preset.margin, record.map(|r| &r.margin), margin_flag)
            .unwrap_or(self.global_margin);

        Ok(Some(EffectiveConfig {
            material: interface.material.clone(),
            target,
            target_kind: kind,
            uv_map: settings
                .uv_map
                .unwrap_or_else(|| self.default_uv_map.clone()),
            image,
            channels,
            margin,
            overridden,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BakeConfig;

    fn interface(material: &str, inputs: &[(&str, SocketKind)]) -> MaterialInterface {
        MaterialInterface {
            material: material.into(),
            inputs: inputs
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
        }
    }

    fn pbr(material: &str) -> MaterialInterface {
        interface(
            material,
            &[
                ("Base Color", SocketKind::Color),
                ("Roughness", SocketKind::Float),
                ("Metallic", SocketKind::Float),
                ("Specular", SocketKind::Float),
                ("BSDF", SocketKind::Shader),
            ],
        )
    }

    fn preset(toml: &str) -> BakePreset {
        let config = BakeConfig::from_toml_str(toml).expect("parse config");
        config.presets("Crate")[0].clone()
    }

    fn resolver() -> ConfigResolver {
        ConfigResolver::new(16, "UVMap")
    }

    #[test]
    fn resolve_field_follows_flag_only() {
        assert_eq!(*resolve_field(&1, Some(&2), true), 2);
        assert_eq!(*resolve_field(&1, Some(&2), false), 1);
        assert_eq!(*resolve_field(&1, None, true), 1);
    }

    #[test]
    fn override_replaces_every_setting_but_not_margin() {
        let preset = preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Rough"
target = "Roughness"
resolution = 512
margin = 8

[objects.Crate.presets.overrides.Metal]
use_override = true
target = "Metallic"
uv_map = "Lightmap"
margin = 2
"#,
        );
        let configs = resolver()
            .resolve_preset(&preset, &[pbr("Wood"), pbr("Metal")])
            .unwrap();
        assert_eq!(configs.len(), 2);

        let wood = &configs[0];
        assert_eq!(wood.target, "Roughness");
        assert_eq!(wood.uv_map, "UVMap");
        assert_eq!(wood.margin, 8);
        assert!(!wood.overridden);

        let metal = &configs[1];
        assert_eq!(metal.target, "Metallic");
        assert_eq!(metal.uv_map, "Lightmap");
        // Override resolution was not given, so the override's default wins.
        assert_eq!(
            metal.image,
            ImageTarget::New {
                resolution: 1024,
                color_space: ColorSpace::Srgb
            }
        );
        assert_eq!(metal.margin, 8);
        assert_eq!(metal.channels, [Channel::R].into_iter().collect());
    }

    #[test]
    fn margin_override_is_independent() {
        let preset = preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Rough"
target = "Roughness"

[objects.Crate.presets.overrides.Metal]
use_margin_override = true
margin = 3
"#,
        );
        let configs = resolver()
            .resolve_preset(&preset, &[pbr("Wood"), pbr("Metal")])
            .unwrap();
        assert_eq!(configs[0].margin, 16);
        assert_eq!(configs[1].margin, 3);
        assert_eq!(configs[1].target, "Roughness");
        assert!(!configs[1].overridden);
    }

    #[test]
    fn skips_materials_without_matching_input() {
        let preset = preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Rough"
target = "Roughness"
"#,
        );
        let glass = interface("Glass", &[("IOR", SocketKind::Float)]);
        let configs = resolver()
            .resolve_preset(&preset, &[glass, pbr("Metal")])
            .unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].material, "Metal");
    }

    #[test]
    fn overridden_unknown_input_is_an_error() {
        let preset = preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Rough"
target = "Roughness"

[objects.Crate.presets.overrides.Metal]
use_override = true
target = "Sheen"
"#,
        );
        let err = resolver().resolve_preset(&preset, &[pbr("Metal")]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownInput {
                preset: "Rough".into(),
                material: "Metal".into(),
                input: "Sheen".into(),
            }
        );
    }

    #[test]
    fn shader_inputs_are_not_bakeable() {
        let preset = preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Closure"
target = "BSDF"
"#,
        );
        let configs = resolver().resolve_preset(&preset, &[pbr("Metal")]).unwrap();
        assert!(configs.is_empty());
    }

    #[test]
    fn colour_targets_use_channel_set() {
        let preset = preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Albedo"
target = "Base Color"
channel = "G"
channels = ["R", "A"]
"#,
        );
        let configs = resolver().resolve_preset(&preset, &[pbr("Metal")]).unwrap();
        assert_eq!(configs[0].target_kind, SocketKind::Color);
        assert_eq!(
            configs[0].channels,
            [Channel::R, Channel::A].into_iter().collect()
        );
    }

    const CONFLICT: &str = r#"
version = 1

[[objects.Crate.presets]]
name = "Packed"
target = "Roughness"
mode = "existing"
image = "IMG"
uv_map = "UV0"
channel = "R"

[objects.Crate.presets.overrides.Metal]
use_override = true
target = "Metallic"
mode = "existing"
image = "IMG"
uv_map = "UV0"
channel = "R"
"#;

    #[test]
    fn conflict_names_both_sockets_regardless_of_order() {
        let preset = preset(CONFLICT);
        let forward = resolver()
            .resolve_preset(&preset, &[pbr("Wood"), pbr("Metal")])
            .unwrap_err();
        let backward = resolver()
            .resolve_preset(&preset, &[pbr("Metal"), pbr("Wood")])
            .unwrap_err();
        assert_eq!(forward, backward);

        let ResolveError::Conflict(conflict) = forward else {
            panic!("expected conflict, got {forward:?}");
        };
        assert_eq!(conflict.image, "IMG");
        assert_eq!(conflict.uv_map, "UV0");
        assert_eq!(conflict.channel, Channel::R);
        assert_eq!(
            (conflict.first.as_str(), conflict.second.as_str()),
            ("Metallic", "Roughness")
        );
    }

    #[test]
    fn same_socket_or_new_images_never_conflict() {
        let preset = preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Packed"
target = "Roughness"
mode = "existing"
image = "IMG"
channel = "R"
"#,
        );
        let configs = resolver()
            .resolve_preset(&preset, &[pbr("Wood"), pbr("Metal")])
            .unwrap();
        assert_eq!(configs.len(), 2);

        let fresh = self::preset(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Fresh"
target = "Roughness"

[objects.Crate.presets.overrides.Metal]
use_override = true
target = "Metallic"
"#,
        );
        assert!(resolver()
            .resolve_preset(&fresh, &[pbr("Wood"), pbr("Metal")])
            .is_ok());
    }

    #[test]
    fn full_colour_claims_rgb() {
        let mask = ChannelMask::new();
        let color = ChannelClaim {
            image: "IMG",
            uv_map: "UV0",
            socket: "Base Color",
            channels: &mask,
        };
        let blue: ChannelMask = [Channel::B].into_iter().collect();
        let scalar = ChannelClaim {
            socket: "Specular",
            channels: &blue,
            ..color
        };
        let conflict = detect_conflict("Packed", [color, scalar]).unwrap();
        assert_eq!(conflict.channel, Channel::B);
    }

    #[test]
    fn resolving_twice_is_identical() {
        let preset = preset(CONFLICT.replace("channel = \"R\"\n\n", "channel = \"G\"\n\n").as_str());
        let interfaces = [pbr("Wood"), pbr("Metal")];
        let first = resolver().resolve_preset(&preset, &interfaces).unwrap();
        let second = resolver().resolve_preset(&preset, &interfaces).unwrap();
        assert_eq!(first, second);
    }
}
