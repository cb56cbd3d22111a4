//! # Custom Action Synthesis
//!
//! Builds the descriptor's `actions` map from the manifest's custom
//! actions. Lifecycle actions (install, upgrade, uninstall) are implicit
//! in the descriptor model and never emitted here.
//!
//! An author-supplied declaration under `customActions` overrides the
//! defaults outright. Without one, a handful of well-known action names
//! get curated metadata; everything else defaults to a modifying,
//! stateful action described by its own name, the conservative choice
//! for an action the compiler knows nothing about.

use crate::descriptor::Action;
use crate::manifest::Manifest;
use std::collections::BTreeMap;
use tracing::debug;

/// Synthesizes the descriptor's custom action entries.
pub fn synthesize_actions(manifest: &Manifest) -> BTreeMap<String, Action> {
    let mut actions = BTreeMap::new();

    for name in manifest.custom_actions.keys() {
        let action = match manifest.custom_action_definitions.get(name) {
            Some(declared) => Action {
                description: declared.description.clone(),
                modifies: declared.modifies,
                stateless: declared.stateless,
            },
            None => {
                debug!(action = %name, "no custom action declaration, using defaults");
                default_action(name)
            }
        };
        actions.insert(name.clone(), action);
    }

    actions
}

/// Default metadata for a custom action with no declaration.
fn default_action(name: &str) -> Action {
    match name {
        "dry-run" => Action {
            description: Some(
                "Execute the installation in a dry-run mode, allowing to see what would happen with the given set of parameter values"
                    .to_string(),
            ),
            modifies: false,
            stateless: true,
        },
        "help" => Action {
            description: Some("Print an help message to the standard output".to_string()),
            modifies: false,
            stateless: true,
        },
        "log" => Action {
            description: Some(
                "Print logs of the installed system to the standard output".to_string(),
            ),
            modifies: false,
            stateless: false,
        },
        "status" => Action {
            description: Some(
                "Print a human readable status message to the standard output".to_string(),
            ),
            modifies: false,
            stateless: false,
        },
        other => Action {
            description: Some(other.to_string()),
            modifies: true,
            stateless: false,
        },
    }
}
