//! Tests for the compile pipeline.
//!
//! Validates end-to-end descriptor assembly: schema synthesis, custom
//! actions, dependency extension, build stamp determinism, and publish-time
//! image rewriting.

use magikbundle::{
    CUSTOM_BUNDLE_KEY, Compiler, DEBUG_PARAMETER, DEPENDENCIES_KEY, ImageTarget, Manifest,
    MixinInfo, SCHEMA_VERSION, Stamp, UNKNOWN_DIGEST, refresh_cached_bundle,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const FULL_MANIFEST: &str = r#"
name: mybuns
version: 0.1.0
description: "A very thorough test bundle"
tag: example.com/ns/mybuns:v0.1.0
mixins:
  - exec
install:
  - exec:
      description: "Install mybuns"
      command: ./install.sh
upgrade:
  - exec:
      description: "Upgrade mybuns"
      command: ./upgrade.sh
uninstall:
  - exec:
      description: "Uninstall mybuns"
      command: ./uninstall.sh
status:
  - exec:
      description: "Print status"
      command: ./status.sh
zombies:
  - exec:
      description: "Run zombies"
      command: ./zombies.sh
parameters:
  - name: color
    type: string
    default: blue
  - name: kubeconfig
    type: file
    path: /root/.kube/config
  - name: password
    type: string
    sensitive: true
    applyTo:
      - install
outputs:
  - name: connstr
    type: string
    applyTo:
      - install
dependencies:
  mysql:
    tag: deislabs/azure-mysql
    versions:
      - "5.7.x - 8"
images:
  worker:
    repository: example.com/ns/worker
    digest: sha256:6b5a28ccbb76f12ce771a23757880c6083234255c5ba191fca1c5db1f71c1687
"#;

fn load_manifest(dir: &TempDir) -> Manifest {
    let path = dir.path().join("bundle.yaml");
    fs::write(&path, FULL_MANIFEST).unwrap();
    Manifest::load_from(&path).unwrap()
}

fn mixins() -> Vec<MixinInfo> {
    vec![MixinInfo {
        name: "exec".to_string(),
        version: "1.0.0".to_string(),
    }]
}

// =============================================================================
// Descriptor Assembly Tests
// =============================================================================

#[test]
fn test_compile_full_manifest() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    assert_eq!(descriptor.schema_version, SCHEMA_VERSION);
    assert_eq!(descriptor.name, "mybuns");
    assert_eq!(descriptor.version, "0.1.0");
    assert_eq!(
        descriptor.description.as_deref(),
        Some("A very thorough test bundle")
    );

    assert_eq!(descriptor.invocation_images.len(), 1);
    assert_eq!(
        descriptor.invocation_images[0].image,
        "example.com/ns/mybuns-installer:v0.1.0"
    );
    assert_eq!(
        descriptor.invocation_images[0].image_type.as_deref(),
        Some("docker")
    );

    assert!(descriptor.custom.contains_key(CUSTOM_BUNDLE_KEY));
    assert!(descriptor.custom.contains_key(DEPENDENCIES_KEY));
}

#[test]
fn test_compile_synthesizes_parameters_and_definitions() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    // Declared parameters plus the injected debug parameter.
    assert!(descriptor.parameters.contains_key("color"));
    assert!(descriptor.parameters.contains_key("kubeconfig"));
    assert!(descriptor.parameters.contains_key("password"));
    assert!(descriptor.parameters.contains_key(DEBUG_PARAMETER));

    // Entries reference named definitions.
    assert_eq!(descriptor.parameters["color"].definition, "color-parameter");
    assert!(descriptor.definitions.contains_key("color-parameter"));
    assert!(
        descriptor
            .definitions
            .contains_key(&format!("{}-parameter", DEBUG_PARAMETER))
    );

    // A parameter with a default is optional; one without is required.
    assert!(!descriptor.parameters["color"].required);
    assert!(descriptor.parameters["password"].required);

    // Empty destination defaults to the upper-cased name as an env var.
    let color = descriptor.parameters["color"].destination.as_ref().unwrap();
    assert_eq!(color.environment_variable.as_deref(), Some("COLOR"));

    // Sensitivity lands on the definition, not the entry.
    let password = &descriptor.definitions["password-parameter"];
    assert_eq!(password.write_only, Some(true));
}

#[test]
fn test_compile_coerces_file_parameters() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    let kubeconfig = &descriptor.definitions["kubeconfig-parameter"];
    assert_eq!(kubeconfig.schema_type.as_deref(), Some("string"));
    assert_eq!(kubeconfig.content_encoding.as_deref(), Some("base64"));
}

#[test]
fn test_file_parameter_without_path_fails_synthesis() {
    let dir = TempDir::new().unwrap();
    let yaml = FULL_MANIFEST.replace("    path: /root/.kube/config\n", "");
    let path = dir.path().join("bundle.yaml");
    fs::write(&path, yaml).unwrap();

    let err = Manifest::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("kubeconfig"));
}

#[test]
fn test_compile_synthesizes_outputs() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    let connstr = &descriptor.outputs["connstr"];
    assert_eq!(connstr.definition, "connstr-output");
    assert_eq!(connstr.path, "/cnab/app/outputs/connstr");
    assert_eq!(connstr.apply_to.as_deref(), Some(&["install".to_string()][..]));
    assert!(descriptor.definitions.contains_key("connstr-output"));
}

#[test]
fn test_apply_to_defaults_to_every_action() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    let color = &descriptor.parameters["color"];
    for action in ["install", "upgrade", "uninstall", "status", "zombies"] {
        assert!(color.applies_to(action), "color should apply to {}", action);
    }

    let password = &descriptor.parameters["password"];
    assert!(password.applies_to("install"));
    assert!(!password.applies_to("zombies"));
}

// =============================================================================
// Custom Action Tests
// =============================================================================

#[test]
fn test_compile_emits_custom_actions_only() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    assert_eq!(descriptor.actions.len(), 2);
    assert!(descriptor.actions.contains_key("status"));
    assert!(descriptor.actions.contains_key("zombies"));
    for lifecycle in ["install", "upgrade", "uninstall"] {
        assert!(
            !descriptor.actions.contains_key(lifecycle),
            "{} must stay implicit",
            lifecycle
        );
    }

    assert!(!descriptor.actions["status"].modifies);
    assert!(descriptor.actions["zombies"].modifies);
    assert!(!descriptor.actions["zombies"].stateless);
}

// =============================================================================
// Dependency Extension Tests
// =============================================================================

#[test]
fn test_dependency_extension_present_exactly_once() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    let payload = &descriptor.custom[DEPENDENCIES_KEY];
    let requires = payload.get("requires").unwrap();
    assert_eq!(
        requires["mysql"]["bundle"].as_str(),
        Some("deislabs/azure-mysql")
    );
    assert_eq!(
        requires["mysql"]["version"]["ranges"][0].as_str(),
        Some("5.7.x - 8")
    );

    let count = descriptor
        .required_extensions
        .iter()
        .filter(|e| e.as_str() == DEPENDENCIES_KEY)
        .count();
    assert_eq!(count, 1);
}

#[test]
fn test_no_dependencies_means_no_extension() {
    let dir = TempDir::new().unwrap();
    let yaml = FULL_MANIFEST.replace(
        "dependencies:\n  mysql:\n    tag: deislabs/azure-mysql\n    versions:\n      - \"5.7.x - 8\"\n",
        "",
    );
    let path = dir.path().join("bundle.yaml");
    fs::write(&path, yaml).unwrap();

    let mut compiler = Compiler::new(Manifest::load_from(&path).unwrap(), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    assert!(!descriptor.custom.contains_key(DEPENDENCIES_KEY));
    assert!(descriptor.required_extensions.is_empty());
}

// =============================================================================
// Build Stamp Tests
// =============================================================================

#[test]
fn test_stamp_is_deterministic_across_compiles() {
    let dir = TempDir::new().unwrap();

    let mut first = Compiler::new(load_manifest(&dir), mixins());
    let mut second = Compiler::new(load_manifest(&dir), mixins());

    let a = Stamp::load(&first.to_descriptor().unwrap()).unwrap();
    let b = Stamp::load(&second.to_descriptor().unwrap()).unwrap();
    assert_eq!(a, b);
    assert_ne!(a.manifest_digest, UNKNOWN_DIGEST);
}

#[test]
fn test_stamp_round_trips_through_descriptor_json() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    let original = Stamp::load(&descriptor).unwrap();
    let decoded = magikbundle::Descriptor::from_json(&descriptor.to_json().unwrap()).unwrap();
    assert_eq!(Stamp::load(&decoded).unwrap(), original);
}

#[test]
fn test_stamp_falls_back_to_unknown_for_missing_source() {
    let dir = TempDir::new().unwrap();
    let mut manifest = load_manifest(&dir);
    manifest.manifest_path = Some(PathBuf::from("/nonexistent/bundle.yaml"));

    let mut compiler = Compiler::new(manifest, mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    let stamp = Stamp::load(&descriptor).unwrap();
    assert_eq!(stamp.manifest_digest, UNKNOWN_DIGEST);
}

// =============================================================================
// Publish Rewrite Tests
// =============================================================================

#[test]
fn test_publish_rewrites_mapped_image() {
    let dir = TempDir::new().unwrap();
    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let mut descriptor = compiler.to_descriptor().unwrap();

    let new_digest = "sha256:ed49d1b4f1c1fe247bc8ba3099f1f4b3fc2918257b70cca572ce7b2f8086f0bd";
    Compiler::rewrite_image_on_publish(
        &mut descriptor,
        &ImageTarget::Mapped("worker".to_string()),
        "new.io/orgb/worker",
        new_digest,
    )
    .unwrap();

    let worker = &descriptor.images["worker"];
    assert_eq!(worker.image, format!("new.io/orgb/worker@{}", new_digest));
    assert_eq!(worker.digest.as_deref(), Some(new_digest));
}

// =============================================================================
// Cache Refresh Tests
// =============================================================================

#[test]
fn test_refresh_skips_uncached_bundles() {
    let dir = TempDir::new().unwrap();
    let cache = magikbundle::BundleCache::with_path(dir.path().join("cache")).unwrap();

    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let descriptor = compiler.to_descriptor().unwrap();

    refresh_cached_bundle(&cache, "example.com/ns/mybuns:v0.1.0", &descriptor, None);
    assert!(!cache.contains("example.com/ns/mybuns:v0.1.0"));
}

#[test]
fn test_refresh_updates_cached_bundle() {
    let dir = TempDir::new().unwrap();
    let cache = magikbundle::BundleCache::with_path(dir.path().join("cache")).unwrap();
    let tag = "example.com/ns/mybuns:v0.1.0";

    let mut compiler = Compiler::new(load_manifest(&dir), mixins());
    let mut descriptor = compiler.to_descriptor().unwrap();
    cache.store(tag, &descriptor, None).unwrap();

    descriptor.description = Some("republished".to_string());
    refresh_cached_bundle(&cache, tag, &descriptor, None);

    let cached = cache.get(tag).unwrap().unwrap();
    assert_eq!(cached.descriptor.description.as_deref(), Some("republished"));
}
