//! Image resources referenced by image texture nodes.
//!
//! Pixel storage is not modelled. A bake appends an [`ImageWrite`] describing
//! which material wrote which sources, and clearing forgets all of them.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    #[default]
    Srgb,
    NonColor,
    Linear,
}

/// One bake call's contribution to an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageWrite {
    pub material: String,
    /// Sampled sources, e.g. `"Roughness -> G"`.
    #[serde(default)]
    pub sources: Vec<String>,
    pub margin: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub color_space: ColorSpace,
    #[serde(default)]
    pub has_data: bool,
    /// Per-image clear policy; `None` defers to the renderer setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_override: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<ImageWrite>,
}

impl Image {
    pub fn new(name: impl Into<String>, width: u32, height: u32, color_space: ColorSpace) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            color_space,
            has_data: false,
            clear_override: None,
            writes: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.has_data = false;
        self.writes.clear();
    }

    pub fn record(&mut self, write: ImageWrite) {
        self.has_data = true;
        self.writes.push(write);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageStore {
    images: BTreeMap<String, Image>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new image, suffixing the name (`.001`, `.002`, ...) when it
    /// is already taken. Returns the name actually used.
    pub fn create(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        color_space: ColorSpace,
    ) -> String {
        let mut unique = name.to_string();
        let mut counter = 1;
        while self.images.contains_key(&unique) {
            unique = format!("{name}.{counter:03}");
            counter += 1;
        }
        self.images.insert(
            unique.clone(),
            Image::new(unique.clone(), width, height, color_space),
        );
        unique
    }

    pub fn insert(&mut self, image: Image) {
        self.images.insert(image.name.clone(), image);
    }

    pub fn get(&self, name: &str) -> Option<&Image> {
        self.images.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Image> {
        self.images.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Image> {
        self.images.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.images.values()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_suffixes_taken_names() {
        let mut store = ImageStore::new();
        assert_eq!(store.create("Bake", 64, 64, ColorSpace::Srgb), "Bake");
        assert_eq!(store.create("Bake", 64, 64, ColorSpace::Srgb), "Bake.001");
        assert_eq!(store.create("Bake", 32, 32, ColorSpace::NonColor), "Bake.002");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn clear_drops_recorded_writes() {
        let mut image = Image::new("Bake", 8, 8, ColorSpace::Linear);
        image.record(ImageWrite {
            material: "Metal".into(),
            sources: vec!["Roughness -> G".into()],
            margin: 4,
        });
        assert!(image.has_data);
        image.clear();
        assert!(!image.has_data);
        assert!(image.writes.is_empty());
    }

    #[test]
    fn color_space_uses_kebab_case() {
        let json = serde_json::to_string(&ColorSpace::NonColor).unwrap();
        assert_eq!(json, "\"non-color\"");
    }
}
