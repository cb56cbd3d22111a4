//! # Bundle Cache
//!
//! Caches compiled descriptors (and their relocation mappings, when one
//! was produced during publish) keyed by bundle tag, so repeated
//! operations against the same bundle skip a registry round-trip.
//!
//! ## Storage Model
//!
//! Each bundle tag maps to one cache entry directory named by the hex
//! sha256 of the tag string:
//!
//! ```text
//! ~/.magikbundle/cache/
//! └── 6b5a28cc.../
//!     ├── bundle.json
//!     └── relocation-mapping.json   (only when one exists)
//! ```
//!
//! Hashing the tag keeps arbitrary reference characters (`/`, `:`, `@`)
//! out of directory names.
//!
//! ## Write Semantics
//!
//! Entries are written atomically via a unique temp file + rename, so a
//! crash never leaves a partial descriptor behind. Storing an entry that
//! already exists replaces it.
//!
//! The cache is an optimization: refresh failures after a successful
//! publish are logged as warnings, never surfaced as errors, since the
//! publish itself already succeeded.

use crate::constants::{CACHE_DESCRIPTOR_NAME, CACHE_RELOCATION_NAME};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Mapping from original image references to their relocated locations.
pub type RelocationMap = BTreeMap<String, String>;

/// A cached bundle: the descriptor plus its relocation mapping, if any.
#[derive(Debug, Clone)]
pub struct CachedBundle {
    pub tag: String,
    pub descriptor: Descriptor,
    pub relocation_map: Option<RelocationMap>,
}

/// The cache contract consumed by publish refresh: a key/value store of
/// compiled bundles keyed by tag.
pub trait Cache {
    /// Retrieves a cached bundle, or `None` when the tag has no entry.
    fn find(&self, tag: &str) -> Result<Option<CachedBundle>>;

    /// Stores a bundle, replacing any existing entry for the same tag.
    fn store(
        &self,
        tag: &str,
        descriptor: &Descriptor,
        relocation_map: Option<&RelocationMap>,
    ) -> Result<CachedBundle>;
}

/// Filesystem-backed bundle cache.
///
/// Safe to use from multiple threads: entries are written under unique
/// temp names and published with an atomic rename, so concurrent stores
/// of the same tag leave one complete winner.
pub struct BundleCache {
    base_dir: PathBuf,
}

impl BundleCache {
    /// Creates a cache at the default location under the user's home
    /// directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_path())
    }

    /// Creates a cache at the specified path.
    pub fn with_path(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| Error::CacheInitFailed {
            path: base_dir.clone(),
            reason: e.to_string(),
        })?;

        info!("Bundle cache initialized at: {}", base_dir.display());

        Ok(Self { base_dir })
    }

    /// Returns the default cache path.
    fn default_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(".magikbundle").join("cache")
        } else {
            PathBuf::from(".magikbundle").join("cache")
        }
    }

    /// Returns the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the entry directory for a bundle tag.
    ///
    /// The tag is hashed so reference characters never reach the
    /// filesystem as path components.
    pub fn entry_path(&self, tag: &str) -> PathBuf {
        let key = hex::encode(Sha256::digest(tag.as_bytes()));
        self.base_dir.join(key)
    }

    /// Checks whether a bundle is cached.
    pub fn contains(&self, tag: &str) -> bool {
        self.entry_path(tag).join(CACHE_DESCRIPTOR_NAME).exists()
    }

    /// Retrieves a cached bundle, or `None` when the tag has no entry.
    pub fn get(&self, tag: &str) -> Result<Option<CachedBundle>> {
        let entry = self.entry_path(tag);
        let descriptor_path = entry.join(CACHE_DESCRIPTOR_NAME);
        if !descriptor_path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&descriptor_path)?;
        let descriptor = Descriptor::from_json(&data)?;

        let relocation_path = entry.join(CACHE_RELOCATION_NAME);
        let relocation_map = if relocation_path.exists() {
            let data = fs::read_to_string(&relocation_path)?;
            let map: RelocationMap = serde_json::from_str(&data)
                .map_err(|e| Error::RelocationMapLoad {
                    path: relocation_path,
                    reason: e.to_string(),
                })?;
            Some(map)
        } else {
            None
        };

        Ok(Some(CachedBundle {
            tag: tag.to_string(),
            descriptor,
            relocation_map,
        }))
    }

    /// Stores a bundle, replacing any existing entry for the same tag.
    pub fn store(
        &self,
        tag: &str,
        descriptor: &Descriptor,
        relocation_map: Option<&RelocationMap>,
    ) -> Result<CachedBundle> {
        let entry = self.entry_path(tag);
        fs::create_dir_all(&entry).map_err(|e| Error::CacheWriteFailed(e.to_string()))?;

        self.write_atomic(
            &entry.join(CACHE_DESCRIPTOR_NAME),
            descriptor.to_json()?.as_bytes(),
        )?;

        let relocation_path = entry.join(CACHE_RELOCATION_NAME);
        match relocation_map {
            Some(map) => {
                let data = serde_json::to_string_pretty(map)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                self.write_atomic(&relocation_path, data.as_bytes())?;
            }
            None => {
                // A replaced entry must not keep a stale mapping around.
                if relocation_path.exists() {
                    fs::remove_file(&relocation_path)
                        .map_err(|e| Error::CacheWriteFailed(e.to_string()))?;
                }
            }
        }

        debug!(tag = %tag, "cached bundle at {}", entry.display());

        Ok(CachedBundle {
            tag: tag.to_string(),
            descriptor: descriptor.clone(),
            relocation_map: relocation_map.cloned(),
        })
    }

    /// Removes a bundle's cache entry, if present.
    pub fn remove(&self, tag: &str) -> Result<()> {
        let entry = self.entry_path(tag);
        if entry.exists() {
            fs::remove_dir_all(&entry).map_err(|e| Error::CacheWriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Lists the tags of every cached bundle.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if let Some(cached) = self.read_entry_tag(&entry.path()) {
                tags.push(cached);
            }
        }
        tags.sort();
        Ok(tags)
    }

    fn read_entry_tag(&self, entry: &Path) -> Option<String> {
        let data = fs::read_to_string(entry.join(CACHE_DESCRIPTOR_NAME)).ok()?;
        let descriptor = Descriptor::from_json(&data).ok()?;
        // The descriptor's name/version identify it for listing; the full
        // tag is recoverable only by hashing candidate tags, so the list
        // reports name:version.
        Some(format!("{}:{}", descriptor.name, descriptor.version))
    }

    /// Writes a file atomically: unique temp name, then rename. Concurrent
    /// writers of the same path each use their own temp file, and the
    /// final rename is atomic.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let temp_name = format!("tmp.{}", uuid::Uuid::now_v7());
        let temp_path = path.with_extension(temp_name);
        fs::write(&temp_path, data).map_err(|e| Error::CacheWriteFailed(e.to_string()))?;
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::CacheWriteFailed(e.to_string())
        })?;
        Ok(())
    }
}

impl Cache for BundleCache {
    fn find(&self, tag: &str) -> Result<Option<CachedBundle>> {
        self.get(tag)
    }

    fn store(
        &self,
        tag: &str,
        descriptor: &Descriptor,
        relocation_map: Option<&RelocationMap>,
    ) -> Result<CachedBundle> {
        BundleCache::store(self, tag, descriptor, relocation_map)
    }
}
