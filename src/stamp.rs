//! # Build Stamps
//!
//! Every compiled descriptor carries a stamp: a content digest over the
//! manifest source, the compiler version, and the participating mixins.
//! Recompiling an unchanged manifest with the same compiler and mixins
//! yields the same digest, so callers can compare a descriptor's stamp to
//! a freshly computed one and skip rebuilds that would change nothing.
//!
//! The digest is advisory. When the manifest source cannot be read the
//! stamp records the sentinel [`UNKNOWN_DIGEST`] with a warning, which
//! never matches a computed digest, so the bundle is simply always
//! considered stale. Decoding a stamp out of a descriptor is the
//! opposite: a descriptor without a readable stamp is corrupted or
//! foreign, and that is a hard error.

use crate::constants::{CUSTOM_BUNDLE_KEY, UNKNOWN_DIGEST, VERSION};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use tracing::warn;

/// Identity of a mixin participating in a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixinInfo {
    pub name: String,
    pub version: String,
}

/// The build stamp embedded in a descriptor's `custom` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamp {
    /// Hex-encoded sha256 over the manifest source, compiler version, and
    /// mixin identities, or [`UNKNOWN_DIGEST`] when the source could not
    /// be read.
    pub manifest_digest: String,
}

impl Stamp {
    /// Decodes the stamp embedded in a descriptor.
    ///
    /// Unlike stamp generation this is a hard error when the stamp is
    /// missing or malformed.
    pub fn load(descriptor: &Descriptor) -> Result<Stamp> {
        let data = descriptor
            .custom
            .get(CUSTOM_BUNDLE_KEY)
            .ok_or_else(|| Error::StampDecode("descriptor has no build stamp".to_string()))?;

        serde_json::from_value(data.clone())
            .map_err(|e| Error::StampDecode(e.to_string()))
    }

    /// True when this stamp matches a freshly generated one. A stamp with
    /// the unknown sentinel never matches.
    pub fn matches(&self, other: &Stamp) -> bool {
        self.manifest_digest != UNKNOWN_DIGEST && self.manifest_digest == other.manifest_digest
    }
}

/// Generates the stamp for a manifest and the mixins participating in its
/// build.
///
/// Never fails: when the manifest source cannot be read the stamp records
/// the unknown sentinel and a warning is logged, since the digest only
/// decides whether a rebuild is needed.
pub fn generate_stamp(manifest: &Manifest, mixins: &[MixinInfo]) -> Stamp {
    match digest_manifest(manifest, mixins) {
        Ok(digest) => Stamp {
            manifest_digest: digest,
        },
        Err(e) => {
            warn!(error = %e, "could not digest the manifest file");
            Stamp {
                manifest_digest: UNKNOWN_DIGEST.to_string(),
            }
        }
    }
}

fn digest_manifest(manifest: &Manifest, mixins: &[MixinInfo]) -> Result<String> {
    let path = manifest.manifest_path.as_ref().ok_or_else(|| {
        Error::Internal("manifest was not loaded from a file".to_string())
    })?;

    let data = fs::read(path).map_err(|e| Error::ManifestRead {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&data);
    hasher.update(VERSION.as_bytes());
    for mixin in mixins {
        hasher.update(mixin.name.as_bytes());
        hasher.update(mixin.version.as_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}
