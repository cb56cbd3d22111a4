//! # Bundle Assembler
//!
//! Orchestrates the compile pipeline: manifest model in, portable
//! descriptor out.
//!
//! ## Compile Flow
//!
//! ```text
//! Manifest ──► defaults (invocation image, bundle tag)
//!          ──► schema synthesis (parameters, outputs, definitions)
//!          ──► custom action synthesis
//!          ──► dependency extension
//!          ──► image map
//!          ──► build stamp
//!          ──► Descriptor
//! ```
//!
//! Each compile call processes one manifest to completion with no shared
//! state; concurrent compiles must each own their manifest and compiler.
//!
//! ## Publish Flow
//!
//! Republishing a compiled bundle under a new registry location rewrites
//! image entries in place ([`Compiler::rewrite_image_on_publish`]) using
//! digests and relocation mappings the caller has already resolved; the
//! compiler itself performs no network I/O. A refreshed cache entry is
//! best-effort ([`refresh_cached_bundle`]).

use crate::actions::synthesize_actions;
use crate::cache::{Cache, RelocationMap};
use crate::constants::{CUSTOM_BUNDLE_KEY, DEPENDENCIES_KEY, INVOCATION_IMAGE_TYPE, SCHEMA_VERSION};
use crate::dependencies::synthesize_dependencies;
use crate::descriptor::{Descriptor, Image};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::reference::ImageReference;
use crate::schema::{synthesize_outputs, synthesize_parameters};
use crate::stamp::{MixinInfo, generate_stamp};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Identifies an image entry within a descriptor for publish-time
/// rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTarget {
    /// The bundle's invocation image.
    Invocation,
    /// An entry in the image map, by its key.
    Mapped(String),
}

/// Compiles one manifest into a bundle descriptor.
pub struct Compiler {
    manifest: Manifest,
    mixins: Vec<MixinInfo>,
}

impl Compiler {
    /// Creates a compiler for a validated manifest and the mixins
    /// participating in its build.
    pub fn new(manifest: Manifest, mixins: Vec<MixinInfo>) -> Self {
        Self { manifest, mixins }
    }

    /// Compiles the manifest into a descriptor.
    pub fn to_descriptor(&mut self) -> Result<Descriptor> {
        self.manifest.set_defaults()?;

        let (parameters, parameter_definitions) = synthesize_parameters(&self.manifest)?;
        let (outputs, output_definitions) = synthesize_outputs(&self.manifest)?;

        let mut definitions = parameter_definitions;
        for (id, schema) in output_definitions {
            if definitions.insert(id.clone(), schema).is_some() {
                return Err(Error::DuplicateDefinition(id));
            }
        }

        let mut custom = BTreeMap::new();
        let mut required_extensions = Vec::new();

        if let Some(dependencies) = synthesize_dependencies(&self.manifest) {
            custom.insert(
                DEPENDENCIES_KEY.to_string(),
                serde_json::to_value(&dependencies)
                    .map_err(|e| Error::Serialization(e.to_string()))?,
            );
            required_extensions.push(DEPENDENCIES_KEY.to_string());
        }

        let stamp = generate_stamp(&self.manifest, &self.mixins);
        custom.insert(
            CUSTOM_BUNDLE_KEY.to_string(),
            serde_json::to_value(&stamp).map_err(|e| Error::Serialization(e.to_string()))?,
        );

        let descriptor = Descriptor {
            schema_version: SCHEMA_VERSION.to_string(),
            name: self.manifest.name.clone(),
            version: self.manifest.version.clone(),
            description: self.manifest.description.clone(),
            invocation_images: vec![self.generate_invocation_image()?],
            images: self.generate_images(),
            actions: synthesize_actions(&self.manifest),
            parameters,
            outputs,
            definitions,
            custom,
            required_extensions,
        };

        info!(
            bundle = %descriptor.name,
            version = %descriptor.version,
            "compiled bundle descriptor"
        );

        Ok(descriptor)
    }

    /// Returns the compiled manifest, including any defaults the compile
    /// filled in (invocation image, bundle tag).
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn generate_invocation_image(&self) -> Result<Image> {
        let image = self.manifest.image.clone().ok_or_else(|| {
            Error::Internal("invocation image was not derived before assembly".to_string())
        })?;

        Ok(Image {
            image,
            image_type: Some(INVOCATION_IMAGE_TYPE.to_string()),
            ..Image::default()
        })
    }

    /// Copies image-map entries into descriptor image entries. The full
    /// reference is `repository@digest` when a digest is present, else
    /// `repository:tag`, else the bare repository.
    fn generate_images(&self) -> BTreeMap<String, Image> {
        let mut images = BTreeMap::new();

        for (name, mapped) in &self.manifest.image_map {
            let image = if let Some(digest) = &mapped.digest {
                format!("{}@{}", mapped.repository, digest)
            } else if let Some(tag) = &mapped.tag {
                format!("{}:{}", mapped.repository, tag)
            } else {
                mapped.repository.clone()
            };

            images.insert(
                name.clone(),
                Image {
                    description: mapped.description.clone(),
                    image,
                    image_type: mapped.image_type.clone(),
                    digest: mapped.digest.clone(),
                    size: mapped.size,
                    media_type: mapped.media_type.clone(),
                    labels: mapped.labels.clone(),
                },
            );
        }

        images
    }

    /// Rewrites one image entry after its relocated copy has been pushed:
    /// the entry's reference becomes `new_image@new_digest` and its digest
    /// field is updated. Mutates the descriptor in place; the caller
    /// persists it.
    pub fn rewrite_image_on_publish(
        descriptor: &mut Descriptor,
        target: &ImageTarget,
        new_image: &str,
        new_digest: &str,
    ) -> Result<()> {
        let pinned = ImageReference::parse(new_image)?.with_digest(new_digest)?;

        let entry = match target {
            ImageTarget::Invocation => descriptor
                .invocation_images
                .first_mut()
                .ok_or_else(|| Error::ImageNotFound("invocation image".to_string()))?,
            ImageTarget::Mapped(key) => descriptor
                .images
                .get_mut(key)
                .ok_or_else(|| Error::ImageNotFound(key.clone()))?,
        };

        debug!(from = %entry.image, to = %pinned, "rewrote published image");
        entry.image = format!("{}@{}", pinned.name(), new_digest);
        entry.digest = Some(new_digest.to_string());

        Ok(())
    }
}

/// Loads a relocation mapping from a JSON file.
pub fn load_relocation_map(path: &Path) -> Result<RelocationMap> {
    let load_err = |reason: String| Error::RelocationMapLoad {
        path: path.to_path_buf(),
        reason,
    };

    let data = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
    serde_json::from_str(&data).map_err(|e| load_err(e.to_string()))
}

/// Looks up an image's relocated reference. A missing entry for an image
/// that must be relocated is a hard error.
pub fn lookup_relocation<'a>(map: &'a RelocationMap, image: &str) -> Result<&'a str> {
    map.get(image)
        .map(String::as_str)
        .ok_or_else(|| Error::RelocationMissing(image.to_string()))
}

/// Re-stores a bundle in the cache after a publish.
///
/// A stale cache entry degrades performance, not correctness, so store
/// failures are logged and swallowed; the publish already succeeded.
pub fn refresh_cached_bundle(
    cache: &impl Cache,
    tag: &str,
    descriptor: &Descriptor,
    relocation_map: Option<&RelocationMap>,
) {
    match cache.find(tag) {
        Ok(None) => {
            debug!(tag = %tag, "bundle is not cached, nothing to refresh");
            return;
        }
        Ok(Some(_)) => {}
        Err(e) => {
            warn!(tag = %tag, error = %e, "unable to read cache for bundle");
            return;
        }
    }

    if let Err(e) = cache.store(tag, descriptor, relocation_map) {
        warn!(tag = %tag, error = %e, "unable to update cache for bundle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MappedImage;

    fn compiled_manifest() -> Manifest {
        let mut m = Manifest {
            name: "hello".to_string(),
            version: "0.1.0".to_string(),
            bundle_tag: "example.com/ns/hello:v0.1.0".to_string(),
            ..Manifest::default()
        };
        m.set_defaults().unwrap();
        m
    }

    #[test]
    fn test_generate_images_reference_forms() {
        let mut manifest = compiled_manifest();
        let digest = "sha256:6b5a28ccbb76f12ce771a23757880c6083234255c5ba191fca1c5db1f71c1687";
        manifest.image_map.insert(
            "pinned".to_string(),
            MappedImage {
                repository: "example.com/ns/worker".to_string(),
                digest: Some(digest.to_string()),
                ..MappedImage::default()
            },
        );
        manifest.image_map.insert(
            "tagged".to_string(),
            MappedImage {
                repository: "example.com/ns/worker".to_string(),
                tag: Some("v2".to_string()),
                ..MappedImage::default()
            },
        );
        manifest.image_map.insert(
            "bare".to_string(),
            MappedImage {
                repository: "example.com/ns/worker".to_string(),
                ..MappedImage::default()
            },
        );

        let compiler = Compiler::new(manifest, Vec::new());
        let images = compiler.generate_images();

        assert_eq!(
            images["pinned"].image,
            format!("example.com/ns/worker@{}", digest)
        );
        assert_eq!(images["tagged"].image, "example.com/ns/worker:v2");
        assert_eq!(images["bare"].image, "example.com/ns/worker");
    }

    #[test]
    fn test_rewrite_invocation_image_on_publish() {
        let mut compiler = Compiler::new(compiled_manifest(), Vec::new());
        let mut descriptor = compiler.to_descriptor().unwrap();
        let digest = "sha256:6b5a28ccbb76f12ce771a23757880c6083234255c5ba191fca1c5db1f71c1687";

        Compiler::rewrite_image_on_publish(
            &mut descriptor,
            &ImageTarget::Invocation,
            "new.io/orgb/hello-installer",
            digest,
        )
        .unwrap();

        let entry = &descriptor.invocation_images[0];
        assert_eq!(entry.image, format!("new.io/orgb/hello-installer@{}", digest));
        assert_eq!(entry.digest.as_deref(), Some(digest));
    }

    #[test]
    fn test_rewrite_unknown_image_key_fails() {
        let mut compiler = Compiler::new(compiled_manifest(), Vec::new());
        let mut descriptor = compiler.to_descriptor().unwrap();
        let digest = "sha256:6b5a28ccbb76f12ce771a23757880c6083234255c5ba191fca1c5db1f71c1687";

        let err = Compiler::rewrite_image_on_publish(
            &mut descriptor,
            &ImageTarget::Mapped("ghost".to_string()),
            "new.io/orgb/ghost",
            digest,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImageNotFound(_)));
    }

    #[test]
    fn test_lookup_relocation() {
        let map = RelocationMap::from([(
            "orig.io/orga/myimg:v1".to_string(),
            "new.io/orgb/myimg:v1".to_string(),
        )]);

        assert_eq!(
            lookup_relocation(&map, "orig.io/orga/myimg:v1").unwrap(),
            "new.io/orgb/myimg:v1"
        );
        assert!(matches!(
            lookup_relocation(&map, "orig.io/orga/other:v1").unwrap_err(),
            Error::RelocationMissing(_)
        ));
    }
}
