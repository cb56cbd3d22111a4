//! # Bundle Compiler Constants
//!
//! Defines the well-known keys, limits, and fixed identifiers used across
//! the compiler. These constants are the **single source of truth** for the
//! wire format emitted in bundle descriptors; third-party tooling inspects
//! descriptors directly, so none of these values may drift casually.
//!
//! ## Cross-References
//!
//! - [`crate::descriptor`]: Uses the schema version and extension keys
//! - [`crate::manifest`]: Uses the reserved key list to split custom actions
//! - [`crate::stamp`]: Uses the vendor-extension key and compiler version
//! - [`crate::cache`]: Uses the cache file names

/// Compiler version, baked into every build stamp.
///
/// Changing the compiler version changes every stamp digest, which forces
/// a rebuild of previously compiled bundles. This is intentional.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Descriptor schema version emitted by this compiler.
///
/// Fixed per compiler release; consumers reject descriptors with schema
/// versions they do not understand.
pub const SCHEMA_VERSION: &str = "v1.0.0";

/// Vendor-extension key under which the build stamp (and any other
/// compiler metadata) is embedded in a descriptor's `custom` section.
pub const CUSTOM_BUNDLE_KEY: &str = "dev.magik.bundle";

/// Identifier of the interoperable dependencies extension.
///
/// Used both as the `custom` key for the dependency payload and as the
/// entry appended to `requiredExtensions` when a bundle declares
/// dependencies.
pub const DEPENDENCIES_KEY: &str = "io.cnab.dependencies";

/// Suffix appended to the bundle name when deriving a default invocation
/// image, e.g. `example.com/ns/app` becomes `example.com/ns/app-installer`.
pub const INVOCATION_IMAGE_SUFFIX: &str = "-installer";

/// Image type recorded for the invocation image.
pub const INVOCATION_IMAGE_TYPE: &str = "docker";

/// Directory inside the invocation image where outputs are captured.
///
/// Every descriptor output entry points at `<OUTPUTS_DIR>/<name>`.
pub const OUTPUTS_DIR: &str = "/cnab/app/outputs";

/// Path at which a relocation mapping is mounted into the invocation image
/// at runtime, when one was produced during publish.
pub const RELOCATION_MOUNT_PATH: &str = "/cnab/app/relocation-mapping.json";

/// Name of the debug parameter injected into every compiled bundle.
pub const DEBUG_PARAMETER: &str = "magik-debug";

/// Environment variable backing [`DEBUG_PARAMETER`].
pub const DEBUG_PARAMETER_ENV: &str = "MAGIK_DEBUG";

/// Sentinel schema type authors use to transport a file's contents.
///
/// The schema synthesizer rewrites this to a base64-encoded string; the
/// sentinel itself never appears in an emitted descriptor.
pub const FILE_TYPE: &str = "file";

/// Sentinel stamp digest recorded when the manifest source could not be
/// read. A stamp of this value never matches a computed digest, so the
/// bundle is always considered stale.
pub const UNKNOWN_DIGEST: &str = "unknown";

// =============================================================================
// Limits
// =============================================================================

/// Maximum image reference length in bytes.
///
/// Prevents pathological references from reaching the parser. Registry
/// implementations may have lower limits.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Maximum manifest source size (1 MiB).
///
/// Prevents memory exhaustion from parsing malformed manifests. Real
/// manifests are typically under 50 KiB.
pub const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

// =============================================================================
// Manifest keys and actions
// =============================================================================

/// Top-level manifest keys claimed by the typed manifest model.
///
/// Any other top-level key is treated as a custom action. This list is
/// checked statically during decoding instead of introspecting the model,
/// so the reserved set stays auditable in one place.
pub const RESERVED_MANIFEST_KEYS: &[&str] = &[
    "name",
    "description",
    "version",
    "invocationImage",
    "tag",
    "dockerfile",
    "mixins",
    "install",
    "upgrade",
    "uninstall",
    "custom",
    "customActions",
    "parameters",
    "credentials",
    "dependencies",
    "outputs",
    "images",
    "required",
];

/// Lifecycle actions with dedicated manifest keys.
///
/// These are implicit in the descriptor's action model and are never
/// emitted into the `actions` map.
pub const LIFECYCLE_ACTIONS: &[&str] = &["install", "upgrade", "uninstall"];

/// Required extensions this compiler understands.
///
/// Anything else in the manifest's `required` section is flagged by
/// [`crate::lint::lint_required`] as unsupported.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["dependencies"];

// =============================================================================
// Cache layout
// =============================================================================

/// File name of the cached descriptor within a cache entry.
pub const CACHE_DESCRIPTOR_NAME: &str = "bundle.json";

/// File name of the cached relocation mapping within a cache entry.
pub const CACHE_RELOCATION_NAME: &str = "relocation-mapping.json";
