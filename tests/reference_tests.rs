//! Tests for image reference parsing, tag derivation, and relocation.
//!
//! Validates the invariants the compiler relies on to keep the bundle
//! tag, invocation image, and referenced images mutually consistent.

use magikbundle::{Error, ImageReference, Manifest, relocate};

fn manifest(tag: &str, version: &str) -> Manifest {
    Manifest {
        name: "app".to_string(),
        version: version.to_string(),
        bundle_tag: tag.to_string(),
        ..Manifest::default()
    }
}

// =============================================================================
// Invocation Image Derivation Tests
// =============================================================================

#[test]
fn test_tagged_bundle_tag_derives_installer_image() {
    let mut m = manifest("example.com/ns/app:v1.2.3", "1.2.3");
    m.set_defaults().unwrap();
    assert_eq!(
        m.image.as_deref(),
        Some("example.com/ns/app-installer:v1.2.3")
    );
    assert_eq!(m.bundle_tag, "example.com/ns/app:v1.2.3");
}

#[test]
fn test_untagged_bundle_tag_is_rewritten_from_version() {
    let mut m = manifest("example.com/ns/app", "1.0.0");
    m.set_defaults().unwrap();
    assert_eq!(m.bundle_tag, "example.com/ns/app:v1.0.0");
    assert_eq!(
        m.image.as_deref(),
        Some("example.com/ns/app-installer:v1.0.0")
    );
}

#[test]
fn test_untagged_bundle_tag_with_bad_version_fails() {
    let mut m = manifest("example.com/ns/app", "latest");
    let err = m.set_defaults().unwrap_err();
    assert!(matches!(err, Error::InvalidVersion { .. }));
}

#[test]
fn test_digest_only_bundle_tag_is_rejected() {
    let mut m = manifest(
        "example.com/ns/app@sha256:6b5a28ccbb76f12ce771a23757880c6083234255c5ba191fca1c5db1f71c1687",
        "1.0.0",
    );
    let err = m.set_defaults().unwrap_err();
    assert!(matches!(err, Error::InvalidBundleTag { .. }));
}

#[test]
fn test_set_defaults_is_idempotent() {
    let mut m = manifest("example.com/ns/app", "1.0.0");
    m.set_defaults().unwrap();
    let first = (m.bundle_tag.clone(), m.image.clone());
    m.set_defaults().unwrap();
    assert_eq!((m.bundle_tag.clone(), m.image.clone()), first);
}

// =============================================================================
// Relocation Tests
// =============================================================================

#[test]
fn test_relocate_preserves_leaf_name() {
    let moved = relocate("orig.io/orga/subdir/myimg", "new.io/orgb").unwrap();
    assert_eq!(moved.to_string(), "new.io/orgb/myimg");
}

#[test]
fn test_relocate_uses_bundle_org_not_bundle_name() {
    let moved = relocate("old.io/acme/worker", "new.io/ns/bundle").unwrap();
    assert_eq!(moved.to_string(), "new.io/ns/worker");
}

#[test]
fn test_update_domain_preserves_image_tag() {
    let mut m = manifest("new.io/orgb/bundle:v2.0.0", "2.0.0");
    m.image = Some("orig.io/orga/worker:canary".to_string());
    m.set_invocation_image_from_bundle_tag("new.io/orgb/bundle:v2.0.0", true)
        .unwrap();
    assert_eq!(m.image.as_deref(), Some("new.io/orgb/worker:canary"));
}

// =============================================================================
// Parsing Tests
// =============================================================================

#[test]
fn test_parse_all_reference_shapes() {
    let digest = "sha256:6b5a28ccbb76f12ce771a23757880c6083234255c5ba191fca1c5db1f71c1687";

    let named = ImageReference::parse("example.com/ns/app").unwrap();
    assert_eq!(named.tag(), None);
    assert_eq!(named.digest(), None);

    let tagged = ImageReference::parse("example.com/ns/app:v1").unwrap();
    assert_eq!(tagged.tag(), Some("v1"));

    let pinned = ImageReference::parse(&format!("example.com/ns/app@{}", digest)).unwrap();
    assert!(pinned.is_digest_only());

    let both = ImageReference::parse(&format!("example.com/ns/app:v1@{}", digest)).unwrap();
    assert_eq!(both.tag(), Some("v1"));
    assert_eq!(both.digest(), Some(digest));
    assert!(!both.is_digest_only());
}

#[test]
fn test_parse_round_trips_display() {
    for reference in [
        "app",
        "myorg/app",
        "example.com/ns/app:v1.2.3",
        "localhost:5000/app:latest",
        "example.com/ns/app:v1@sha256:6b5a28ccbb76f12ce771a23757880c6083234255c5ba191fca1c5db1f71c1687",
    ] {
        let parsed = ImageReference::parse(reference).unwrap();
        assert_eq!(parsed.to_string(), reference);
    }
}
