//! # Dependency Extension
//!
//! Converts the manifest's dependency declarations into the interoperable
//! dependencies extension payload carried in the descriptor's `custom`
//! section under [`crate::constants::DEPENDENCIES_KEY`].
//!
//! A bundle with dependencies also lists the extension key in
//! `requiredExtensions` exactly once, so runtimes without dependency
//! support refuse it instead of silently skipping the dependencies.

use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The dependencies extension payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Bundles this bundle requires, keyed by the manifest's dependency
    /// names.
    pub requires: BTreeMap<String, DependencyEntry>,
}

/// One required bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// The bundle's reference, e.g. `deislabs/azure-mysql:5.7`.
    pub bundle: String,

    /// Version constraints; absent when the tag pins a version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<DependencyVersion>,
}

/// Version constraints for a required bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyVersion {
    /// Acceptable semantic version ranges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<String>,

    /// Whether prerelease versions satisfy the ranges.
    #[serde(default, rename = "prereleases", skip_serializing_if = "is_false")]
    pub allow_prereleases: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Builds the dependencies payload, or `None` when the manifest declares
/// no dependencies.
pub fn synthesize_dependencies(manifest: &Manifest) -> Option<Dependencies> {
    if manifest.dependencies.is_empty() {
        return None;
    }

    let mut requires = BTreeMap::new();
    for (name, dependency) in &manifest.dependencies {
        let version = if dependency.versions.is_empty() && !dependency.allow_prereleases {
            None
        } else {
            Some(DependencyVersion {
                ranges: dependency.versions.clone(),
                allow_prereleases: dependency.allow_prereleases,
            })
        };

        requires.insert(
            name.clone(),
            DependencyEntry {
                bundle: dependency.tag.clone(),
                version,
            },
        );
    }

    Some(Dependencies { requires })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Dependency;

    #[test]
    fn test_no_dependencies_yields_no_payload() {
        let m = Manifest::default();
        assert!(synthesize_dependencies(&m).is_none());
    }

    #[test]
    fn test_dependency_shapes() {
        let mut m = Manifest::default();
        m.dependencies.insert(
            "no-version".to_string(),
            Dependency {
                tag: "deislabs/azure-mysql:5.7".to_string(),
                ..Dependency::default()
            },
        );
        m.dependencies.insert(
            "no-ranges".to_string(),
            Dependency {
                tag: "deislabs/azure-active-directory".to_string(),
                allow_prereleases: true,
                ..Dependency::default()
            },
        );
        m.dependencies.insert(
            "with-ranges".to_string(),
            Dependency {
                tag: "deislabs/azure-blob-storage".to_string(),
                versions: vec!["1.x - 2".to_string(), "2.1 - 3.x".to_string()],
                ..Dependency::default()
            },
        );

        let deps = synthesize_dependencies(&m).unwrap();
        assert_eq!(deps.requires.len(), 3);

        let pinned = &deps.requires["no-version"];
        assert_eq!(pinned.bundle, "deislabs/azure-mysql:5.7");
        assert!(pinned.version.is_none());

        let prereleases = &deps.requires["no-ranges"];
        assert!(prereleases.version.as_ref().unwrap().allow_prereleases);
        assert!(prereleases.version.as_ref().unwrap().ranges.is_empty());

        let ranged = &deps.requires["with-ranges"];
        assert_eq!(
            ranged.version.as_ref().unwrap().ranges,
            vec!["1.x - 2", "2.1 - 3.x"]
        );
        assert!(!ranged.version.as_ref().unwrap().allow_prereleases);
    }

    #[test]
    fn test_payload_wire_keys() {
        let deps = Dependencies {
            requires: BTreeMap::from([(
                "storage".to_string(),
                DependencyEntry {
                    bundle: "deislabs/azure-blob-storage".to_string(),
                    version: Some(DependencyVersion {
                        ranges: vec!["1.x - 2".to_string()],
                        allow_prereleases: true,
                    }),
                },
            )]),
        };
        let json = serde_json::to_string(&deps).unwrap();
        assert!(json.contains("\"requires\""));
        assert!(json.contains("\"prereleases\":true"));
        assert!(json.contains("\"ranges\""));
    }
}
