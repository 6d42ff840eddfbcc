//! Maps image descriptors to concrete images for the length of one run.
use std::collections::BTreeMap;

use scheduler::ImageDescriptor;
use shadergraph::{ColorSpace, ImageStore};
use tracing::{debug, info};

/// Name requested for the shared placeholder image.
pub const PLACEHOLDER_IMAGE: &str = "__DummyImage";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image '{0}' does not exist")]
    NotFound(String),
}

/// Memoises new images by their derived name so every material that asks
/// for the same target within a run gets the same image, and owns the
/// placeholder sampled by dummy instructions.
#[derive(Debug, Default)]
pub struct ImageResolver {
    cache: BTreeMap<String, String>,
    created: Vec<String>,
    placeholder: Option<String>,
}

impl ImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        images: &mut ImageStore,
        descriptor: &ImageDescriptor,
    ) -> Result<String, ImageError> {
        match descriptor {
            ImageDescriptor::New {
                name,
                resolution,
                color_space,
            } => Ok(self.resolve_new(images, name, *resolution, *color_space)),
            ImageDescriptor::Existing { name } => {
                if images.contains(name) {
                    Ok(name.clone())
                } else {
                    Err(ImageError::NotFound(name.clone()))
                }
            }
            ImageDescriptor::Placeholder => Ok(self.placeholder(images)),
        }
    }

    /// The image `resolve` would hand out for `descriptor` if that image is
    /// already in the store. Never creates anything.
    pub fn lookup(&self, images: &ImageStore, descriptor: &ImageDescriptor) -> Option<String> {
        match descriptor {
            ImageDescriptor::New {
                name,
                resolution,
                color_space,
            } => match self.cache.get(name) {
                Some(cached) if images.contains(cached) => Some(cached.clone()),
                _ => fits(images, name, *resolution, *color_space).then(|| name.clone()),
            },
            ImageDescriptor::Existing { name } => images.contains(name).then(|| name.clone()),
            ImageDescriptor::Placeholder => None,
        }
    }

    fn resolve_new(
        &mut self,
        images: &mut ImageStore,
        name: &str,
        resolution: u32,
        color_space: ColorSpace,
    ) -> String {
        if let Some(cached) = self.cache.get(name) {
            if images.contains(cached) {
                return cached.clone();
            }
        }

        // An image left behind by an earlier run is reused when it still fits.
        let resolved = if fits(images, name, resolution, color_space) {
            debug!(image = name, "reusing image from an earlier bake");
            name.to_string()
        } else {
            let created = images.create(name, resolution, resolution, color_space);
            info!(image = %created, resolution, "created bake image");
            self.created.push(created.clone());
            created
        };
        self.cache.insert(name.to_string(), resolved.clone());
        resolved
    }

    /// The shared 1x1 placeholder, created on first use.
    pub fn placeholder(&mut self, images: &mut ImageStore) -> String {
        if let Some(name) = &self.placeholder {
            if images.contains(name) {
                return name.clone();
            }
        }
        let name = images.create(PLACEHOLDER_IMAGE, 1, 1, ColorSpace::Srgb);
        debug!(image = %name, "created placeholder image");
        self.placeholder = Some(name.clone());
        name
    }

    /// Marks the current point in the creation history for [`Self::discard_since`].
    pub fn mark(&self) -> usize {
        self.created.len()
    }

    /// Removes the images created after `mark` and forgets them, so a later
    /// pass asking for the same target creates it afresh.
    pub fn discard_since(&mut self, images: &mut ImageStore, mark: usize) {
        if mark >= self.created.len() {
            return;
        }
        for name in self.created.split_off(mark) {
            images.remove(&name);
            self.cache.retain(|_, resolved| *resolved != name);
            debug!(image = %name, "discarded unused bake image");
        }
    }

    /// Removes the placeholder; everything else stays with the scene.
    pub fn dispose(&mut self, images: &mut ImageStore) {
        if let Some(name) = self.placeholder.take() {
            images.remove(&name);
            debug!(image = %name, "removed placeholder image");
        }
    }
}

fn fits(images: &ImageStore, name: &str, resolution: u32, color_space: ColorSpace) -> bool {
    images.get(name).is_some_and(|image| {
        image.width == resolution && image.height == resolution && image.color_space == color_space
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_image(name: &str) -> ImageDescriptor {
        ImageDescriptor::New {
            name: name.into(),
            resolution: 512,
            color_space: ColorSpace::NonColor,
        }
    }

    #[test]
    fn same_derived_name_converges_on_one_image() {
        let mut images = ImageStore::new();
        let mut resolver = ImageResolver::new();
        let first = resolver
            .resolve(&mut images, &new_image("Crate_Bake_Roughness"))
            .unwrap();
        let second = resolver
            .resolve(&mut images, &new_image("Crate_Bake_Roughness"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(images.len(), 1);
        assert_eq!(resolver.mark(), 1);
    }

    #[test]
    fn mismatched_leftover_gets_a_fresh_name() {
        let mut images = ImageStore::new();
        images.create("Crate_Bake_Roughness", 64, 64, ColorSpace::Srgb);
        let mut resolver = ImageResolver::new();
        let name = resolver
            .resolve(&mut images, &new_image("Crate_Bake_Roughness"))
            .unwrap();
        assert_eq!(name, "Crate_Bake_Roughness.001");
    }

    #[test]
    fn matching_leftover_is_reused() {
        let mut images = ImageStore::new();
        images.create("Crate_Bake_Roughness", 512, 512, ColorSpace::NonColor);
        let mut resolver = ImageResolver::new();
        let name = resolver
            .resolve(&mut images, &new_image("Crate_Bake_Roughness"))
            .unwrap();
        assert_eq!(name, "Crate_Bake_Roughness");
        assert_eq!(resolver.mark(), 0);
    }

    #[test]
    fn lookup_never_creates() {
        let mut images = ImageStore::new();
        images.create("Crate_Bake_Metallic", 512, 512, ColorSpace::NonColor);
        images.create("Crate_Bake_Specular", 64, 64, ColorSpace::NonColor);
        let resolver = ImageResolver::new();

        assert_eq!(
            resolver.lookup(&images, &new_image("Crate_Bake_Metallic")).as_deref(),
            Some("Crate_Bake_Metallic")
        );
        assert!(resolver.lookup(&images, &new_image("Crate_Bake_Specular")).is_none());
        assert!(resolver.lookup(&images, &new_image("Crate_Bake_Roughness")).is_none());
        assert!(resolver
            .lookup(&images, &ImageDescriptor::Existing { name: "ORM".into() })
            .is_none());
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn discard_removes_only_images_created_after_the_mark() {
        let mut images = ImageStore::new();
        let mut resolver = ImageResolver::new();
        resolver
            .resolve(&mut images, &new_image("Crate_Bake_Roughness"))
            .unwrap();
        let mark = resolver.mark();
        resolver
            .resolve(&mut images, &new_image("Crate_Bake_Metallic"))
            .unwrap();

        resolver.discard_since(&mut images, mark);
        assert!(images.contains("Crate_Bake_Roughness"));
        assert!(!images.contains("Crate_Bake_Metallic"));

        let again = resolver
            .resolve(&mut images, &new_image("Crate_Bake_Metallic"))
            .unwrap();
        assert_eq!(again, "Crate_Bake_Metallic");
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn dangling_existing_reference_is_not_found() {
        let mut images = ImageStore::new();
        let err = ImageResolver::new()
            .resolve(
                &mut images,
                &ImageDescriptor::Existing {
                    name: "ORM".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err, ImageError::NotFound("ORM".into()));
    }

    #[test]
    fn placeholder_is_shared_and_disposed() {
        let mut images = ImageStore::new();
        let mut resolver = ImageResolver::new();
        let first = resolver
            .resolve(&mut images, &ImageDescriptor::Placeholder)
            .unwrap();
        let second = resolver.placeholder(&mut images);
        assert_eq!(first, second);
        let image = images.get(&first).unwrap();
        assert_eq!((image.width, image.height), (1, 1));

        resolver.dispose(&mut images);
        assert!(images.is_empty());
        resolver.dispose(&mut images);
        assert!(images.is_empty());
    }
}
