use std::collections::BTreeMap;
use std::fmt;

use bakeconfig::{mask_label, BakeMode, BakeType, ChannelMask};

use crate::Pass;

/// What a pass writes into one image, sockets grouped by channel mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub name: String,
    pub mode: BakeMode,
    pub channels: BTreeMap<ChannelMask, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub index: usize,
    pub object: String,
    pub preset: String,
    pub bake_type: BakeType,
    pub materials: Vec<String>,
    pub margin: u32,
    pub images: Vec<ImageSummary>,
}

impl PassSummary {
    /// Summarises the real work of a pass; materials that only sample the
    /// placeholder are left out.
    pub fn from_pass(pass: &Pass) -> Self {
        let mut images: Vec<ImageSummary> = Vec::new();
        let mut materials: Vec<String> = Vec::new();
        for instruction in pass.real_instructions() {
            if !materials.contains(&instruction.material) {
                materials.push(instruction.material.clone());
            }
            let (Some(name), Some(mode), Some(input)) = (
                instruction.image.name(),
                instruction.image.mode(),
                instruction.input(),
            ) else {
                continue;
            };

            let index = match images.iter().position(|image| image.name == name) {
                Some(index) => index,
                None => {
                    images.push(ImageSummary {
                        name: name.to_string(),
                        mode,
                        channels: BTreeMap::new(),
                    });
                    images.len() - 1
                }
            };
            let sockets = images[index]
                .channels
                .entry(instruction.channels.clone())
                .or_default();
            if !sockets.iter().any(|socket| socket == input) {
                sockets.push(input.to_string());
            }
        }

        Self {
            index: pass.index,
            object: pass.object.clone(),
            preset: pass.preset.clone(),
            bake_type: pass.bake_type,
            materials,
            margin: pass.max_margin,
            images,
        }
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bake_type = match self.bake_type {
            BakeType::Emit => "emit",
            BakeType::Diffuse => "diffuse",
        };
        writeln!(
            f,
            "Pass #{} {} [{}, {}] margin {}",
            self.index, self.object, self.preset, bake_type, self.margin
        )?;
        writeln!(f, "  materials: {}", self.materials.join(", "))?;
        for image in &self.images {
            let mode = match image.mode {
                BakeMode::New => "new",
                BakeMode::Existing => "existing",
            };
            writeln!(f, "  {} ({mode})", image.name)?;
            for (mask, sockets) in &image.channels {
                writeln!(f, "    {}: {}", mask_label(mask), sockets.join(", "))?;
            }
        }
        Ok(())
    }
}
