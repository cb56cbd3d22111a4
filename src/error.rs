//! Error types for the bundle compiler.

use std::path::PathBuf;

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling or publishing a bundle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Reference Errors
    // =========================================================================
    /// Failed to parse an image reference.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// A digest string does not match the canonical digest grammar.
    #[error("invalid digest '{digest}': {reason}")]
    InvalidDigest { digest: String, reason: String },

    /// The bundle tag cannot be used to derive image names.
    #[error("invalid bundle tag '{tag}': {reason}")]
    InvalidBundleTag { tag: String, reason: String },

    /// The manifest version is not valid semantic version text.
    #[error("could not parse the bundle version '{version}' as a semantic version: {reason}")]
    InvalidVersion { version: String, reason: String },

    // =========================================================================
    // Manifest Errors
    // =========================================================================
    /// Manifest validation found one or more problems. All problems are
    /// reported together so authors can fix them in one pass.
    #[error("manifest validation failed:\n  {}", .issues.join("\n  "))]
    ManifestInvalid { issues: Vec<String> },

    /// Failed to decode the manifest source.
    #[error("could not decode manifest: {0}")]
    ManifestDecode(String),

    /// Failed to read the manifest source.
    #[error("could not read manifest at {path}: {reason}")]
    ManifestRead { path: PathBuf, reason: String },

    // =========================================================================
    // Schema Synthesis Errors
    // =========================================================================
    /// One or more declarations failed schema synthesis. Collected across
    /// all parameters and outputs, each tagged with the offending name.
    #[error("schema synthesis failed:\n  {}", .issues.join("\n  "))]
    SchemaValidation { issues: Vec<String> },

    /// Two declarations produced the same synthetic definition identifier.
    #[error("duplicate definition id '{0}'")]
    DuplicateDefinition(String),

    // =========================================================================
    // Publish Errors
    // =========================================================================
    /// The descriptor has no image entry under the requested key.
    #[error("image '{0}' does not exist in the bundle")]
    ImageNotFound(String),

    /// A relocation mapping is missing an entry for an image that must be
    /// relocated.
    #[error("no relocation mapping exists for image '{0}'")]
    RelocationMissing(String),

    /// Failed to load a relocation mapping file.
    #[error("could not load relocation mapping at {path}: {reason}")]
    RelocationMapLoad { path: PathBuf, reason: String },

    // =========================================================================
    // Stamp Errors
    // =========================================================================
    /// Failed to decode a build stamp out of a descriptor. Indicates a
    /// corrupted or foreign descriptor, never retried.
    #[error("could not decode the build stamp: {0}")]
    StampDecode(String),

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Cache initialization failed.
    #[error("failed to initialize cache at {path}: {reason}")]
    CacheInitFailed { path: PathBuf, reason: String },

    /// Cache write failed.
    #[error("failed to write to cache: {0}")]
    CacheWriteFailed(String),

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}
