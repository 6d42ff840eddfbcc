use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use shadergraph::ColorSpace;

mod resolve;

pub use resolve::{
    claimed_channels, detect_conflict, resolve_field, BakeConflict, ChannelClaim, ConfigResolver,
    EffectiveConfig, ImageTarget, MaterialInterface, ResolveError,
};

pub const MIN_RESOLUTION: u32 = 64;
pub const MAX_RESOLUTION: u32 = 8192;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the render engine shades the surface during a bake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BakeType {
    /// Raw value emission; alpha cannot be captured.
    #[default]
    Emit,
    /// Shaded diffuse pass through a transparent/diffuse mix, capturing alpha.
    Diffuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BakeMode {
    #[default]
    New,
    Existing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Channel {
    R,
    G,
    B,
    A,
}

impl Channel {
    pub fn letter(self) -> char {
        match self {
            Self::R => 'R',
            Self::G => 'G',
            Self::B => 'B',
            Self::A => 'A',
        }
    }

    /// Socket name on the combine/separate color nodes; alpha has none.
    pub fn component(self) -> Option<&'static str> {
        match self {
            Self::R => Some("Red"),
            Self::G => Some("Green"),
            Self::B => Some("Blue"),
            Self::A => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Channels written by one instruction; empty means full colour.
pub type ChannelMask = BTreeSet<Channel>;

pub fn mask_label(mask: &ChannelMask) -> String {
    if mask.is_empty() {
        return "RGB".into();
    }
    mask.iter().map(|channel| channel.letter()).collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BakeConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectPresets>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Overrides the scene's global bake margin.
    pub margin: Option<u32>,
    /// UV map used when a preset names none; falls back to the object's
    /// active layer.
    pub uv_map: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectPresets {
    #[serde(default)]
    pub presets: Vec<BakePreset>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BakePreset {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub bake_type: BakeType,
    #[serde(flatten)]
    pub settings: BakeSettings,
    #[serde(default)]
    pub margin: Option<u32>,
    #[serde(default)]
    pub overrides: BTreeMap<String, MaterialOverride>,
}

/// Per-material record attached to a preset. Settings and margin are
/// overridden independently.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MaterialOverride {
    #[serde(default)]
    pub use_override: bool,
    #[serde(flatten)]
    pub settings: BakeSettings,
    #[serde(default)]
    pub use_margin_override: bool,
    #[serde(default)]
    pub margin: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BakeSettings {
    #[serde(default, deserialize_with = "deserialize_target")]
    pub target: Option<String>,
    #[serde(default)]
    pub uv_map: Option<String>,
    #[serde(default)]
    pub mode: BakeMode,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default)]
    pub color_space: ColorSpace,
    #[serde(default = "default_channel")]
    pub channel: Channel,
    #[serde(default)]
    pub channels: ChannelMask,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            target: None,
            uv_map: None,
            mode: BakeMode::default(),
            image: None,
            resolution: default_resolution(),
            color_space: ColorSpace::default(),
            channel: default_channel(),
            channels: ChannelMask::new(),
        }
    }
}

fn default_active() -> bool {
    true
}

fn default_resolution() -> u32 {
    1024
}

fn default_channel() -> Channel {
    Channel::R
}

fn deserialize_target<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

impl BakeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BakeConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn empty() -> Self {
        Self {
            version: 1,
            defaults: Defaults::default(),
            objects: BTreeMap::new(),
        }
    }

    pub fn presets(&self, object: &str) -> &[BakePreset] {
        self.objects
            .get(object)
            .map(|entry| entry.presets.as_slice())
            .unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        for (object, entry) in &self.objects {
            if object.trim().is_empty() {
                return Err(ConfigError::Invalid("object name may not be empty".into()));
            }

            let mut names = BTreeSet::new();
            for preset in &entry.presets {
                let name = preset.name.trim();
                if name.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "object '{object}' has a preset with an empty name"
                    )));
                }
                if !names.insert(name) {
                    return Err(ConfigError::Invalid(format!(
                        "object '{object}' declares preset '{name}' more than once"
                    )));
                }

                validate_settings(&preset.settings, &format!("preset '{object}/{name}'"))?;

                for (material, record) in &preset.overrides {
                    if material.trim().is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "preset '{object}/{name}' has an override with an empty material name"
                        )));
                    }
                    if record.use_override {
                        validate_settings(
                            &record.settings,
                            &format!("override '{object}/{name}/{material}'"),
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn validate_settings(settings: &BakeSettings, context: &str) -> Result<(), ConfigError> {
    if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&settings.resolution) {
        return Err(ConfigError::Invalid(format!(
            "{context} resolution {} must be between {MIN_RESOLUTION} and {MAX_RESOLUTION}",
            settings.resolution
        )));
    }

    if settings.mode == BakeMode::Existing
        && settings
            .image
            .as_deref()
            .map(|image| image.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::Invalid(format!(
            "{context} uses mode 'existing' but names no image"
        )));
    }

    if let Some(uv_map) = &settings.uv_map {
        if uv_map.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{context} uv_map may not be empty"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[defaults]
margin = 12

[[objects.Crate.presets]]
name = "Packed ORM"
bake_type = "emit"
target = "Roughness"
uv_map = "UVMap"
mode = "existing"
image = "Crate_ORM"
color_space = "non-color"
channel = "G"
margin = 8

[objects.Crate.presets.overrides.Metal]
use_override = true
target = "Metallic"
mode = "existing"
image = "Crate_ORM"
channel = "B"
use_margin_override = true
margin = 4

[[objects.Crate.presets]]
name = "Albedo"
active = false
bake_type = "diffuse"
target = "Base Color"
resolution = 2048
channels = ["R", "G", "B", "A"]
"#;

    #[test]
    fn parses_sample_config() {
        let config = BakeConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.defaults.margin, Some(12));
        let presets = config.presets("Crate");
        assert_eq!(presets.len(), 2);

        let orm = &presets[0];
        assert!(orm.active);
        assert_eq!(orm.settings.mode, BakeMode::Existing);
        assert_eq!(orm.settings.channel, Channel::G);
        assert_eq!(orm.settings.color_space, ColorSpace::NonColor);
        let metal = &orm.overrides["Metal"];
        assert!(metal.use_override && metal.use_margin_override);
        assert_eq!(metal.settings.target.as_deref(), Some("Metallic"));
        assert_eq!(metal.margin, Some(4));

        let albedo = &presets[1];
        assert!(!albedo.active);
        assert_eq!(albedo.bake_type, BakeType::Diffuse);
        assert_eq!(albedo.settings.channels.len(), 4);
        assert_eq!(albedo.settings.resolution, 2048);
    }

    #[test]
    fn none_target_means_nothing_to_bake() {
        let config = BakeConfig::from_toml_str(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Off"
target = "NONE"
"#,
        )
        .unwrap();
        assert_eq!(config.presets("Crate")[0].settings.target, None);
        assert!(config.presets("Missing").is_empty());
    }

    #[test]
    fn rejects_resolution_out_of_range() {
        let err = BakeConfig::from_toml_str(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Tiny"
target = "Roughness"
resolution = 16
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("resolution")));
    }

    #[test]
    fn rejects_existing_mode_without_image() {
        let err = BakeConfig::from_toml_str(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Packed"
target = "Roughness"
mode = "existing"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_channel_letter() {
        let err = BakeConfig::from_toml_str(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Packed"
target = "Roughness"
channel = "X"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_wrong_version_and_blank_names() {
        let err = BakeConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = BakeConfig::from_toml_str(
            r#"
version = 1

[[objects.Crate.presets]]
name = "  "
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("empty name")));
    }

    #[test]
    fn ignores_disabled_override_settings() {
        let config = BakeConfig::from_toml_str(
            r#"
version = 1

[[objects.Crate.presets]]
name = "Rough"
target = "Roughness"

[objects.Crate.presets.overrides.Metal]
use_override = false
mode = "existing"
"#,
        )
        .unwrap();
        assert!(!config.presets("Crate")[0].overrides["Metal"].use_override);
    }

    #[test]
    fn mask_labels_default_to_rgb() {
        assert_eq!(mask_label(&ChannelMask::new()), "RGB");
        let mask: ChannelMask = [Channel::A, Channel::R].into_iter().collect();
        assert_eq!(mask_label(&mask), "RA");
        assert_eq!(Channel::B.component(), Some("Blue"));
        assert_eq!(Channel::A.component(), None);
    }
}
