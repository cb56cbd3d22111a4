//! # Manifest Linting
//!
//! Advisory checks run over a manifest before compilation. Lint results
//! carry a stable code, a severity, and a human-readable message; the
//! single rule implemented here flags `required` extensions this compiler
//! does not understand.

use crate::constants::SUPPORTED_EXTENSIONS;
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Stable identifier of the unsupported-required-extension rule.
pub const CODE_UNSUPPORTED_REQUIRED_EXTENSION: &str = "required-100";

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// The manifest will not compile or run correctly.
    Error,
    /// Suspect but not fatal.
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
        }
    }
}

/// One lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) - {}", self.level, self.code, self.message)
    }
}

/// Lints a manifest's `required` section, flagging extensions this
/// compiler does not support.
pub fn lint_required(manifest: &Manifest) -> Vec<Finding> {
    let mut findings = Vec::new();

    for extension in &manifest.required {
        if SUPPORTED_EXTENSIONS.contains(&extension.name.as_str()) {
            continue;
        }
        debug!(extension = %extension.name, "unsupported required extension");
        findings.push(Finding {
            code: CODE_UNSUPPORTED_REQUIRED_EXTENSION.to_string(),
            level: Level::Warning,
            message: format!(
                "unsupported required extension '{}' declared in the manifest",
                extension.name
            ),
        });
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::RequiredExtension;

    #[test]
    fn test_supported_extension_is_clean() {
        let manifest = Manifest {
            required: vec![RequiredExtension {
                name: "dependencies".to_string(),
                config: None,
            }],
            ..Manifest::default()
        };
        assert!(lint_required(&manifest).is_empty());
    }

    #[test]
    fn test_unsupported_extension_is_flagged_as_warning() {
        let manifest = Manifest {
            required: vec![RequiredExtension {
                name: "vpn".to_string(),
                config: None,
            }],
            ..Manifest::default()
        };

        let findings = lint_required(&manifest);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, CODE_UNSUPPORTED_REQUIRED_EXTENSION);
        assert_eq!(findings[0].level, Level::Warning);
        assert!(findings[0].message.contains("vpn"));
    }
}
