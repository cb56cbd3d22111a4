//! # Registry Image References
//!
//! Parses, validates, and rewrites registry image references of the form
//! `[host/]path[:tag][@digest]`, following the de-facto distribution
//! grammar used by container registries.
//!
//! ## Grammar
//!
//! ```text
//! reference := name [":" tag] ["@" digest]
//! name      := [host "/"] path-component ("/" path-component)*
//! host      := any first segment containing "." or ":", or "localhost"
//! tag       := [A-Za-z0-9_][A-Za-z0-9._-]{0,127}
//! digest    := algorithm ":" hex  (hex is at least 32 characters)
//! ```
//!
//! A reference with no host (e.g. `myorg/myapp`) is kept as written; the
//! compiler never normalizes references onto a default registry, because
//! the descriptor must round-trip exactly what the author published.
//!
//! ## Ambiguity
//!
//! A reference may carry a tag, a digest, both, or neither. The compiler
//! cares about three shapes:
//!
//! - **tagged** (`host/app:v1`): usable as a bundle tag and invocation image
//! - **named** (`host/app`): a tag is synthesized from the bundle version
//! - **digested without a tag** (`host/app@sha256:...`): rejected wherever a
//!   taggable reference is required
//!
//! ## Relocation
//!
//! [`relocate`] moves a reference onto a new registry/organization while
//! preserving its leaf name. This is how published bundles keep their
//! referenced images alongside the bundle itself.

use crate::constants::MAX_IMAGE_REF_LEN;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed registry image reference.
///
/// Immutable once parsed; rewriting operations ([`ImageReference::with_tag`],
/// [`ImageReference::with_digest`], [`relocate`]) return new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    host: Option<String>,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Parses a reference string, validating every component.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if s.len() > MAX_IMAGE_REF_LEN {
            return Err(invalid("reference exceeds maximum length"));
        }

        // Digest is unambiguous: everything after '@'.
        let (rest, digest) = match s.split_once('@') {
            Some((rest, digest)) => {
                validate_digest(digest)?;
                (rest, Some(digest.to_string()))
            }
            None => (s, None),
        };

        // The tag separator is a ':' after the last '/'; a ':' before that
        // belongs to a registry port.
        let name_start = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match rest[name_start..].find(':') {
            Some(i) => {
                let split = name_start + i;
                (&rest[..split], Some(rest[split + 1..].to_string()))
            }
            None => (rest, None),
        };

        if let Some(tag) = &tag {
            validate_tag(tag).map_err(|reason| invalid(&reason))?;
        }

        let (host, path) = match name.split_once('/') {
            Some((first, remainder)) if is_host(first) => {
                (Some(first.to_string()), remainder.to_string())
            }
            _ => (None, name.to_string()),
        };

        if path.is_empty() {
            return Err(invalid("reference has no repository path"));
        }
        for component in path.split('/') {
            validate_path_component(component).map_err(|reason| invalid(&reason))?;
        }

        Ok(Self {
            host,
            path,
            tag,
            digest,
        })
    }

    /// Returns the registry host, if the reference carries one.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the repository path (everything between host and tag).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the full name (`host/path` or bare `path`), without tag or
    /// digest.
    pub fn name(&self) -> String {
        match &self.host {
            Some(host) => format!("{}/{}", host, self.path),
            None => self.path.clone(),
        }
    }

    /// Returns the final path segment, e.g. `myimg` for `orig.io/orga/myimg`.
    pub fn leaf(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns the tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns the digest, if any.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// True for references that resolve to a pure-digest form: pinned by
    /// digest with no tag to re-point. Such references are rejected as
    /// bundle tags.
    pub fn is_digest_only(&self) -> bool {
        self.digest.is_some() && self.tag.is_none()
    }

    /// Returns a copy of this reference with the given tag.
    pub fn with_tag(&self, tag: &str) -> Result<Self> {
        validate_tag(tag).map_err(|reason| Error::InvalidReference {
            reference: format!("{}:{}", self.name(), tag),
            reason,
        })?;
        let mut updated = self.clone();
        updated.tag = Some(tag.to_string());
        Ok(updated)
    }

    /// Returns a copy of this reference pinned to the given digest.
    pub fn with_digest(&self, digest: &str) -> Result<Self> {
        validate_digest(digest)?;
        let mut updated = self.clone();
        updated.digest = Some(digest.to_string());
        Ok(updated)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Relocates an image reference onto a new bundle tag's registry and
/// organization, preserving the image's leaf name.
///
/// The new location is `host(new) / org(new) / leaf(original)`, where the
/// org is the new bundle tag's repository path minus its final (bundle
/// name) segment. A single-segment path is used whole, covering bundle
/// tags given as `HOST/ORG` with no name segment.
///
/// ```
/// use magikbundle::reference::relocate;
///
/// let moved = relocate("orig.io/orga/subdir/myimg", "new.io/orgb").unwrap();
/// assert_eq!(moved.to_string(), "new.io/orgb/myimg");
/// ```
pub fn relocate(original: &str, new_bundle_tag: &str) -> Result<ImageReference> {
    let orig = ImageReference::parse(original)?;
    let bundle = ImageReference::parse(new_bundle_tag)?;

    let segments: Vec<&str> = bundle.path().split('/').collect();
    let org = if segments.len() > 1 {
        segments[..segments.len() - 1].join("/")
    } else {
        bundle.path().to_string()
    };

    let mut relocated = String::new();
    if let Some(host) = bundle.host() {
        relocated.push_str(host);
        relocated.push('/');
    }
    relocated.push_str(&org);
    relocated.push('/');
    relocated.push_str(orig.leaf());

    // Re-parse to confirm the joined name is still a valid reference.
    ImageReference::parse(&relocated)
}

/// Validates a digest string against the canonical grammar
/// `algorithm ":" hex`.
pub fn validate_digest(digest: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidDigest {
        digest: digest.to_string(),
        reason: reason.to_string(),
    };

    let (algorithm, hash) = digest
        .split_once(':')
        .ok_or_else(|| invalid("expected 'algorithm:hex'"))?;

    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
        || !algorithm.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid("invalid algorithm"));
    }

    if hash.len() < 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("hash must be at least 32 hex characters"));
    }

    Ok(())
}

/// True when the first path segment names a registry host rather than an
/// organization: it contains a dot or a port, or is `localhost`.
fn is_host(segment: &str) -> bool {
    segment == "localhost" || segment.contains('.') || segment.contains(':')
}

fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    if tag.is_empty() || tag.len() > 128 {
        return Err("tag must be 1-128 characters".to_string());
    }
    let mut chars = tag.chars();
    let first = chars.next().unwrap_or(' ');
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return Err(format!("tag '{}' must start with a letter, digit, or underscore", tag));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || "._-".contains(c)) {
        return Err(format!("tag '{}' contains invalid characters", tag));
    }
    Ok(())
}

fn validate_path_component(component: &str) -> std::result::Result<(), String> {
    if component.is_empty() {
        return Err("repository path has an empty component".to_string());
    }
    if !component
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
    {
        return Err(format!(
            "repository component '{}' must be lowercase alphanumeric with '.', '_', or '-' separators",
            component
        ));
    }
    let starts_ok = component.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit());
    let ends_ok = component.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !starts_ok || !ends_ok {
        return Err(format!(
            "repository component '{}' must start and end with an alphanumeric character",
            component
        ));
    }
    Ok(())
}
