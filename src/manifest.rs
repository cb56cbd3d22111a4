//! # Manifest Model
//!
//! Typed representation of the author's bundle configuration, decoded from
//! YAML. The compiler reads this model; it never mutates it except for one
//! narrow default-filling pass ([`Manifest::set_defaults`]) that derives
//! the invocation image and a concrete bundle tag before synthesis.
//!
//! ## Custom actions
//!
//! Any top-level key outside [`RESERVED_MANIFEST_KEYS`] is a custom action:
//!
//! ```yaml
//! install:
//!   - exec:
//!       description: Install the app
//! status:
//!   - exec:
//!       description: Check on the app
//! ```
//!
//! The reserved-key list is a static constant checked during decoding, so
//! the split between model fields and custom actions stays auditable.
//!
//! ## One-of-many-shapes declarations
//!
//! Mixin and required-extension declarations accept either a bare name or
//! a single-key map carrying config:
//!
//! ```yaml
//! mixins:
//!   - exec
//!   - az:
//!       extensions:
//!         - iot
//! ```
//!
//! Both decode into `{ name, optional config }`; an empty map or a map
//! with more than one key is rejected.
//!
//! ## Validation
//!
//! [`Manifest::validate`] aggregates every problem it finds into a single
//! [`Error::ManifestInvalid`] so authors see all of them in one pass,
//! rather than fixing one error per compile.

use crate::constants::{
    INVOCATION_IMAGE_SUFFIX, MAX_MANIFEST_SIZE, RESERVED_MANIFEST_KEYS,
};
use crate::error::{Error, Result};
use crate::reference::{self, ImageReference};
use crate::schema::Schema;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// The author's bundle configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Location the manifest was loaded from; used only for build stamping.
    #[serde(skip)]
    pub manifest_path: Option<PathBuf>,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Bundle version; must be semantic version text when a docker tag has
    /// to be synthesized from it.
    #[serde(default)]
    pub version: String,

    /// Invocation image reference (`REGISTRY/NAME:TAG`). Optional; derived
    /// from the bundle tag when absent.
    #[serde(
        default,
        rename = "invocationImage",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,

    /// Bundle name in the form `REGISTRY/NAME:TAG`.
    #[serde(default, rename = "tag")]
    pub bundle_tag: String,

    /// Relative path to the invocation image template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<MixinDeclaration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Steps,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upgrade: Steps,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uninstall: Steps,

    /// Opaque author payload, reserved so it is never mistaken for a
    /// custom action.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_yaml::Value>,

    /// Step sequences for actions beyond the lifecycle ones; populated by
    /// the decoder from unreserved top-level keys.
    #[serde(skip)]
    pub custom_actions: BTreeMap<String, Steps>,

    /// Author-supplied metadata overriding custom action defaults.
    #[serde(
        default,
        rename = "customActions",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub custom_action_definitions: BTreeMap<String, CustomActionDeclaration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDeclaration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialDeclaration>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Dependency>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputDeclaration>,

    /// Images referenced by the bundle. If a relocation mapping is later
    /// produced it is mounted at runtime for these to be resolved.
    #[serde(default, rename = "images", skip_serializing_if = "BTreeMap::is_empty")]
    pub image_map: BTreeMap<String, MappedImage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<RequiredExtension>,
}

/// A sequence of steps within one action.
pub type Steps = Vec<Step>;

/// One step of an action: a single-key map addressing a mixin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub data: BTreeMap<String, serde_yaml::Value>,
}

impl Step {
    /// Returns the mixin this step is addressed to.
    pub fn mixin_name(&self) -> Option<&str> {
        self.data.keys().next().map(String::as_str)
    }

    /// Returns the step's description. Every step must have one.
    pub fn description(&self) -> std::result::Result<String, String> {
        let mixin = self.mixin_name().ok_or("empty step data")?;
        let config = self.data.get(mixin).ok_or("empty step data")?;
        let description = config
            .get("description")
            .ok_or_else(|| format!("mixin step ({}) missing description", mixin))?;
        match description.as_str() {
            Some(text) => Ok(text.to_string()),
            None => Err(format!("invalid description type for mixin step ({})", mixin)),
        }
    }

    fn validate(&self, manifest: &Manifest) -> std::result::Result<(), String> {
        if self.data.is_empty() {
            return Err("no mixin specified".to_string());
        }
        if self.data.len() > 1 {
            return Err("more than one mixin specified".to_string());
        }

        if let Some(mixin) = self.mixin_name() {
            let declared = manifest.mixins.iter().any(|m| m.name == mixin);
            if !declared {
                return Err(format!("mixin ({}) was not declared", mixin));
            }
        }

        self.description().map(|_| ())
    }
}

/// A mixin declaration: a bare name, or a name with opaque config.
#[derive(Debug, Clone, PartialEq)]
pub struct MixinDeclaration {
    pub name: String,
    pub config: Option<serde_yaml::Value>,
}

impl<'de> Deserialize<'de> for MixinDeclaration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (name, config) =
            name_with_optional_config(deserializer, "mixin declaration")?;
        Ok(Self { name, config })
    }
}

impl Serialize for MixinDeclaration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_name_with_optional_config(serializer, &self.name, &self.config)
    }
}

/// A custom extension the bundle requires from its runtime: a bare name,
/// or a name with config.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredExtension {
    pub name: String,
    pub config: Option<serde_yaml::Value>,
}

impl<'de> Deserialize<'de> for RequiredExtension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (name, config) =
            name_with_optional_config(deserializer, "required extension")?;
        Ok(Self { name, config })
    }
}

impl Serialize for RequiredExtension {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_name_with_optional_config(serializer, &self.name, &self.config)
    }
}

/// Decodes the "bare string or single-key map" shape shared by mixin and
/// required-extension declarations.
fn name_with_optional_config<'de, D: Deserializer<'de>>(
    deserializer: D,
    what: &'static str,
) -> std::result::Result<(String, Option<serde_yaml::Value>), D::Error> {
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::String(name) => Ok((name, None)),
        serde_yaml::Value::Mapping(map) => {
            let mut entries = map.into_iter();
            let Some((key, config)) = entries.next() else {
                return Err(de::Error::custom(format!("{} was empty", what)));
            };
            if entries.next().is_some() {
                return Err(de::Error::custom(format!(
                    "{} contained more than one entry",
                    what
                )));
            }
            let name = key
                .as_str()
                .ok_or_else(|| de::Error::custom(format!("{} name must be a string", what)))?;
            Ok((name.to_string(), Some(config)))
        }
        _ => Err(de::Error::custom(format!(
            "{} must be a name or a single-key map",
            what
        ))),
    }
}

fn serialize_name_with_optional_config<S: Serializer>(
    serializer: S,
    name: &str,
    config: &Option<serde_yaml::Value>,
) -> std::result::Result<S::Ok, S::Error> {
    match config {
        None => serializer.serialize_str(name),
        Some(config) => {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(name, config)?;
            map.end()
        }
    }
}

/// Destination of a parameter or credential inside the invocation image:
/// an environment variable or a filesystem path, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, rename = "env", skip_serializing_if = "Option::is_none")]
    pub environment_variable: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Location {
    /// True when neither destination is set.
    pub fn is_empty(&self) -> bool {
        self.environment_variable.is_none() && self.path.is_none()
    }

    fn validate(&self) -> Option<String> {
        if self.environment_variable.is_some() && self.path.is_some() {
            Some("destination must set either env or path, not both".to_string())
        } else {
            None
        }
    }
}

/// A single parameter declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub sensitive: bool,

    /// Actions this parameter applies to; empty means every action.
    #[serde(default, rename = "applyTo", skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,

    #[serde(flatten)]
    pub destination: Location,

    #[serde(flatten)]
    pub schema: Schema,
}

impl ParameterDeclaration {
    /// True when this parameter applies to the given action.
    pub fn applies_to(&self, action: &str) -> bool {
        self.apply_to.is_empty() || self.apply_to.iter().any(|a| a == action)
    }

    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.name.is_empty() {
            issues.push("parameter name is required".to_string());
            return issues;
        }
        if let Some(issue) = self.destination.validate() {
            issues.push(format!("parameter '{}': {}", self.name, issue));
        }
        if self.schema.schema_type.as_deref() == Some(crate::constants::FILE_TYPE)
            && self.destination.path.is_none()
        {
            issues.push(format!(
                "no destination path supplied for parameter '{}'",
                self.name
            ));
        }
        for issue in self.schema.coerce_file().validate() {
            issues.push(format!("parameter '{}': {}", self.name, issue));
        }
        issues
    }
}

/// A single output declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputDeclaration {
    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "applyTo", skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,

    #[serde(default)]
    pub sensitive: bool,

    /// File a mixin produces; the compiler captures it as a proper output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(flatten)]
    pub schema: Schema,
}

impl OutputDeclaration {
    /// True when this output applies to the given action.
    pub fn applies_to(&self, action: &str) -> bool {
        self.apply_to.is_empty() || self.apply_to.iter().any(|a| a == action)
    }

    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.name.is_empty() {
            issues.push("output name is required".to_string());
            return issues;
        }
        if self.schema.schema_type.as_deref() == Some(crate::constants::FILE_TYPE)
            && self.path.is_none()
        {
            issues.push(format!("no path supplied for output '{}'", self.name));
        }
        for issue in self.schema.coerce_file().validate() {
            issues.push(format!("output '{}': {}", self.name, issue));
        }
        issues
    }
}

/// A credential the bundle needs at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDeclaration {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(flatten)]
    pub location: Location,
}

fn default_true() -> bool {
    true
}

/// A bundle this bundle depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependency {
    /// Bundle reference: `REGISTRY/NAME`, optionally with an explicit
    /// version suffix.
    #[serde(default)]
    pub tag: String,

    /// Acceptable semantic version ranges. Only valid when the tag does
    /// not already pin a version.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,

    #[serde(default, rename = "prereleases")]
    pub allow_prereleases: bool,

    /// Parameter values passed through to the dependency.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl Dependency {
    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.tag.is_empty() {
            issues.push("dependency tag is required".to_string());
            return issues;
        }
        if self.tag.contains(':') && !self.versions.is_empty() {
            issues.push(format!(
                "dependency tag '{}' can only specify REGISTRY/NAME when version ranges are specified",
                self.tag
            ));
        }
        issues
    }
}

/// An image referenced by the bundle, copied into the descriptor's image
/// map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappedImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "imageType", skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,

    #[serde(default)]
    pub repository: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl MappedImage {
    fn validate(&self, name: &str) -> Vec<String> {
        let mut issues = Vec::new();
        if let Some(digest) = &self.digest {
            if let Err(e) = reference::validate_digest(digest) {
                issues.push(format!("image '{}': {}", name, e));
            }
            if self.tag.is_some() {
                issues.push(format!(
                    "image '{}': specify either a digest or a tag, not both",
                    name
                ));
            }
        }
        if let Err(e) = ImageReference::parse(&self.repository) {
            issues.push(format!("image '{}': {}", name, e));
        }
        issues
    }
}

/// Author-supplied metadata for a custom action. When present it overrides
/// the compiler's defaults outright; fields are not merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomActionDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub modifies: bool,

    #[serde(default)]
    pub stateless: bool,
}

impl Manifest {
    /// Decodes a manifest from YAML source, splitting unreserved top-level
    /// keys out as custom actions.
    pub fn from_yaml(data: &str) -> Result<Manifest> {
        let mut manifest: Manifest =
            serde_yaml::from_str(data).map_err(|e| Error::ManifestDecode(e.to_string()))?;

        // Second, untyped pass: anything not claimed by the model is a
        // custom action.
        let raw: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(data).map_err(|e| Error::ManifestDecode(e.to_string()))?;

        for (key, value) in raw {
            if RESERVED_MANIFEST_KEYS.contains(&key.as_str()) {
                continue;
            }
            let steps: Steps = serde_yaml::from_value(value).map_err(|e| {
                Error::ManifestDecode(format!("invalid custom action '{}': {}", key, e))
            })?;
            manifest.custom_actions.insert(key, steps);
        }

        Ok(manifest)
    }

    /// Reads, decodes, and validates a manifest from a file.
    pub fn load_from(path: &Path) -> Result<Manifest> {
        let read_err = |reason: String| Error::ManifestRead {
            path: path.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(path).map_err(|e| read_err(e.to_string()))?;
        if metadata.len() > MAX_MANIFEST_SIZE {
            return Err(read_err(format!(
                "manifest exceeds maximum size of {} bytes",
                MAX_MANIFEST_SIZE
            )));
        }

        let data = fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
        let mut manifest = Self::from_yaml(&data)?;
        manifest.manifest_path = Some(path.to_path_buf());
        manifest.validate()?;
        Ok(manifest)
    }

    /// Every action name the manifest defines: the lifecycle actions plus
    /// all custom actions.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = crate::constants::LIFECYCLE_ACTIONS.to_vec();
        names.extend(self.custom_actions.keys().map(String::as_str));
        names
    }

    /// Validates the manifest, aggregating every problem found.
    ///
    /// Also fills defaults (invocation image, bundle tag), since the
    /// derived values are themselves subject to validation.
    pub fn validate(&mut self) -> Result<()> {
        let mut issues = Vec::new();

        if self.name.is_empty() {
            issues.push("bundle name is required".to_string());
        }
        if self.bundle_tag.is_empty() {
            issues.push("a bundle tag is required (REGISTRY/NAME:TAG)".to_string());
        } else if let Err(e) = self.set_defaults() {
            issues.push(e.to_string());
        }

        if let Some(dockerfile) = &self.dockerfile {
            if dockerfile.eq_ignore_ascii_case("dockerfile") {
                issues.push(
                    "the invocation image template cannot be named 'Dockerfile' because that is the filename generated during build"
                        .to_string(),
                );
            }
        }

        if self.mixins.is_empty() {
            issues.push("no mixins declared".to_string());
        }

        for (action, steps) in [
            ("install", &self.install),
            ("upgrade", &self.upgrade),
            ("uninstall", &self.uninstall),
        ] {
            if steps.is_empty() {
                issues.push(format!("no {} action defined", action));
            }
            self.validate_steps(action, steps, &mut issues);
        }
        for (action, steps) in &self.custom_actions {
            self.validate_steps(action, steps, &mut issues);
        }

        for dependency in self.dependencies.values() {
            issues.extend(dependency.validate());
        }

        let mut parameter_names = BTreeSet::new();
        for parameter in &self.parameters {
            if !parameter.name.is_empty() && !parameter_names.insert(parameter.name.as_str()) {
                issues.push(format!("duplicate parameter name '{}'", parameter.name));
            }
            issues.extend(parameter.validate());
        }

        let mut output_names = BTreeSet::new();
        for output in &self.outputs {
            if !output.name.is_empty() && !output_names.insert(output.name.as_str()) {
                issues.push(format!("duplicate output name '{}'", output.name));
            }
            issues.extend(output.validate());
        }

        for credential in &self.credentials {
            if let Some(issue) = credential.location.validate() {
                issues.push(format!("credential '{}': {}", credential.name, issue));
            }
        }

        for (name, image) in &self.image_map {
            issues.extend(image.validate(name));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::ManifestInvalid { issues })
        }
    }

    fn validate_steps(&self, action: &str, steps: &Steps, issues: &mut Vec<String>) {
        for step in steps {
            if let Err(e) = step.validate(self) {
                issues.push(format!("validation of action \"{}\" failed: {}", action, e));
            }
        }
    }

    /// Fills defaults derived from the bundle tag: the invocation image
    /// name and, when the tag lacks a docker tag, the bundle tag itself.
    /// Idempotent.
    pub fn set_defaults(&mut self) -> Result<()> {
        let bundle_tag = self.bundle_tag.clone();
        self.set_invocation_image_from_bundle_tag(&bundle_tag, false)
    }

    /// Derives the invocation image from the given bundle tag.
    ///
    /// When no invocation image was declared, one is synthesized as
    /// `<bundle-name>-installer` with the derived docker tag. When one was
    /// declared, it is left alone unless `update_domain` is set and the
    /// reference is tagged, in which case its registry/organization is
    /// replaced with the bundle tag's while its leaf name and tag are
    /// preserved.
    pub fn set_invocation_image_from_bundle_tag(
        &mut self,
        bundle_tag: &str,
        update_domain: bool,
    ) -> Result<()> {
        let bundle_ref =
            ImageReference::parse(bundle_tag).map_err(|e| Error::InvalidBundleTag {
                tag: bundle_tag.to_string(),
                reason: e.to_string(),
            })?;

        let docker_tag = self.docker_tag_from_bundle_ref(&bundle_ref)?;

        match &self.image {
            None => {
                let installer = format!("{}{}", bundle_ref.name(), INVOCATION_IMAGE_SUFFIX);
                let image_ref = ImageReference::parse(&installer)?.with_tag(&docker_tag)?;
                self.image = Some(image_ref.to_string());
            }
            Some(image) => {
                let image_ref = ImageReference::parse(image)?;
                if let Some(own_tag) = image_ref.tag() {
                    if update_domain {
                        let moved = reference::relocate(&image_ref.name(), bundle_tag)?;
                        self.image = Some(moved.with_tag(own_tag)?.to_string());
                    }
                    // A tagged image under the right domain is kept as-is.
                } else if image_ref.digest().is_none() {
                    self.image = Some(image_ref.with_tag(&docker_tag)?.to_string());
                } else {
                    return Err(Error::InvalidBundleTag {
                        tag: image.clone(),
                        reason: "must be a taggable OCI image reference, not a digest".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns the docker tag portion of the bundle tag. When the tag is
    /// missing one, a `v<semver>` tag is synthesized from the manifest
    /// version and the bundle tag is rewritten in place to include it.
    fn docker_tag_from_bundle_ref(&mut self, bundle_ref: &ImageReference) -> Result<String> {
        if let Some(tag) = bundle_ref.tag() {
            return Ok(tag.to_string());
        }
        if bundle_ref.digest().is_some() {
            return Err(Error::InvalidBundleTag {
                tag: self.bundle_tag.clone(),
                reason: "must be a taggable OCI image reference, not a digest".to_string(),
            });
        }

        let version =
            semver::Version::parse(&self.version).map_err(|e| Error::InvalidVersion {
                version: self.version.clone(),
                reason: e.to_string(),
            })?;
        let docker_tag = format!("v{}", version);
        self.bundle_tag = bundle_ref.with_tag(&docker_tag)?.to_string();
        Ok(docker_tag)
    }
}
