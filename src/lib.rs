//! # magikbundle
//!
//! **Declarative Application Bundle Compiler**
//!
//! This crate compiles an author-facing bundle manifest into a portable,
//! spec-conformant bundle descriptor: a JSON document (plus an invocation
//! image reference) that any compliant bundle runtime can execute. It also
//! supports republishing a compiled bundle under a new registry location,
//! rewriting embedded image references consistently.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          magikbundle                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   Manifest Model (YAML)                                          │
//! │        │                                                         │
//! │        ├──► Reference Resolver                                   │
//! │        │      parse / relocate / derive invocation image         │
//! │        │                                                         │
//! │        ├──► Schema Synthesizer                                   │
//! │        │      parameters + outputs → entries + definitions       │
//! │        │      file → base64 string coercion                      │
//! │        │                                                         │
//! │        ├──► Dependency / Custom Action Generators                │
//! │        │                                                         │
//! │        ├──► Build Stamp                                          │
//! │        │      sha256(manifest ‖ version ‖ mixins)                │
//! │        │                                                         │
//! │        ▼                                                         │
//! │   Bundle Assembler ──► Descriptor (JSON)                         │
//! │                                                                  │
//! │   Publish: descriptor + resolved digest + relocation map         │
//! │            ──► image rewrite ──► cache refresh                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Properties
//!
//! - **Deterministic**: compiling the same manifest bytes with the same
//!   compiler and mixin set yields an identical build stamp, so callers
//!   can skip rebuilds that would change nothing.
//! - **Synchronous**: one compile call processes one manifest to
//!   completion. The compiler performs blocking file reads only (manifest
//!   source, relocation mapping) and no network I/O; registry digests are
//!   supplied by the caller as already-resolved values.
//! - **Wire-exact**: emitted JSON field names match the target
//!   specification's schema exactly; third-party tooling inspects these
//!   documents directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use magikbundle::{Compiler, Manifest, MixinInfo};
//! use std::path::Path;
//!
//! fn main() -> magikbundle::Result<()> {
//!     let manifest = Manifest::load_from(Path::new("bundle.yaml"))?;
//!     let mixins = vec![MixinInfo {
//!         name: "exec".to_string(),
//!         version: "1.0.0".to_string(),
//!     }];
//!
//!     let mut compiler = Compiler::new(manifest, mixins);
//!     let descriptor = compiler.to_descriptor()?;
//!     println!("{}", descriptor.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod cache;
pub mod compiler;
pub mod constants;
pub mod dependencies;
pub mod descriptor;
pub mod error;
pub mod lint;
pub mod manifest;
pub mod reference;
pub mod schema;
pub mod stamp;

// Re-exports
pub use cache::{BundleCache, Cache, CachedBundle, RelocationMap};
pub use compiler::{
    Compiler, ImageTarget, load_relocation_map, lookup_relocation, refresh_cached_bundle,
};
pub use constants::*;
pub use descriptor::{Action, Descriptor, Image, Output, Parameter};
pub use error::{Error, Result};
pub use lint::{Finding, Level, lint_required};
pub use manifest::{Location, Manifest, MixinDeclaration, RequiredExtension};
pub use reference::{ImageReference, relocate};
pub use schema::{Definitions, Schema};
pub use stamp::{MixinInfo, Stamp, generate_stamp};
