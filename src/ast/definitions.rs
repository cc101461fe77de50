//! Definition-corpus types: the immutable data produced by the (out-of-scope)
//! markup parser at startup. Everything here is built once and never mutated.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::expansion::Expansion;
use super::types::{Platform, SourceLocation, ValueType};
use crate::context::Axis;

/// A typed CLI argument. Mandatory iff `default` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentDefinition {
    pub name: String,
    pub value_type: ValueType,
    pub is_array: bool,
    pub default: Option<String>,
    pub location: SourceLocation,
}

impl ArgumentDefinition {
    pub fn is_mandatory(&self) -> bool {
        self.default.is_none()
    }
}

/// A boolean CLI input; absence implies `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    pub location: SourceLocation,
}

/// A version's axis or platform guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Axis { axis_name: Arc<str>, value: String },
    Platform { value: String },
}

impl Condition {
    pub fn matches(&self, axis_values: &FxHashMap<String, String>, platform: Platform) -> bool {
        match self {
            Condition::Axis { axis_name, value } => {
                axis_values.get(axis_name.as_ref()).is_some_and(|v| v == value)
            }
            Condition::Platform { value } => platform.as_str() == value,
        }
    }
}

/// One declared return value: `name:type=value-expression`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnDeclaration {
    pub name: String,
    pub value_type: ValueType,
    pub value_expression: String,
    pub location: SourceLocation,
}

/// Dependency classification, carried on [`DependencyDeclaration`] and later
/// on graph edges. A tagged sum type, never a pair of booleans — pruning and
/// scheduling pattern-match on this directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyKind {
    Strong,
    Weak,
    Soft { retainer_action: String },
}

/// An explicit `dep` / `weak` / `soft ... retain....` declaration inside a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDeclaration {
    pub action_name: String,
    pub kind: DependencyKind,
    pub location: SourceLocation,
}

/// The script language a version is written in. The language runtime that
/// turns this, plus a rendered script body, into a spawnable command is an
/// external collaborator; this crate only needs to know which one to
/// pick and what file extension its scripts get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Bash,
    Python,
}

impl Language {
    pub fn script_extension(&self) -> &'static str {
        match self {
            Language::Bash => "sh",
            Language::Python => "py",
        }
    }
}

/// One conditional version of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionVersion {
    pub language: Language,
    pub script: String,
    pub expansions: Vec<Expansion>,
    pub returns: Vec<ReturnDeclaration>,
    pub dependencies: Vec<DependencyDeclaration>,
    pub conditions: Vec<Condition>,
    pub location: SourceLocation,
}

impl ActionVersion {
    pub fn matches(&self, axis_values: &FxHashMap<String, String>, platform: Platform) -> bool {
        self.conditions.iter().all(|c| c.matches(axis_values, platform))
    }

    /// Axis names this version's conditions mention, required for the
    /// compiler's context-reduction computation.
    pub fn required_axes(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().filter_map(|c| match c {
            Condition::Axis { axis_name, .. } => Some(axis_name.as_ref()),
            Condition::Platform { .. } => None,
        })
    }
}

/// A named unit of work with one or more conditional versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub versions: Vec<ActionVersion>,
    pub required_env_vars: FxHashMap<String, String>,
    pub location: SourceLocation,
}

impl ActionDefinition {
    /// Union of axes referenced by any version's conditions.
    pub fn required_axes(&self) -> FxHashSet<Arc<str>> {
        self.versions
            .iter()
            .flat_map(|v| v.required_axes())
            .map(Arc::from)
            .collect()
    }

    /// Select the version whose conditions are satisfied by `axis_values` and
    /// `platform`. Returns `None` if zero or more than one version matches —
    /// surfaced later by the validator only if the node is retained.
    pub fn select_version(
        &self,
        axis_values: &FxHashMap<String, String>,
        platform: Platform,
    ) -> Option<&ActionVersion> {
        if self.versions.len() == 1 && self.versions[0].conditions.is_empty() {
            return Some(&self.versions[0]);
        }
        let mut matches = self.versions.iter().filter(|v| v.matches(axis_values, platform));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn all_expansions(&self) -> impl Iterator<Item = &Expansion> {
        self.versions.iter().flat_map(|v| v.expansions.iter())
    }
}

/// The complete definition corpus, consumed as already-parsed data from the
/// markup parser collaborator. Immutable after construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub axes: FxHashMap<String, Axis>,
    pub arguments: FxHashMap<String, ArgumentDefinition>,
    pub flags: FxHashMap<String, FlagDefinition>,
    pub passthrough_env: Vec<String>,
    pub actions: FxHashMap<String, ActionDefinition>,
    pub sequential_by_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation {
            file_path: "actions.md".into(),
            line_number: 1,
            section_name: "build".into(),
        }
    }

    fn axis_values(pairs: &[(&str, &str)]) -> FxHashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    // ═══════════════════════════════════════════════════════════════
    // Version selection
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn single_unconditional_version_always_selected() {
        let def = ActionDefinition {
            name: "build".into(),
            versions: vec![ActionVersion {
                language: Language::Bash,
                script: "echo hi".into(),
                expansions: vec![],
                returns: vec![],
                dependencies: vec![],
                conditions: vec![],
                location: loc(),
            }],
            required_env_vars: FxHashMap::default(),
            location: loc(),
        };
        assert!(def.select_version(&FxHashMap::default(), Platform::Linux).is_some());
    }

    #[test]
    fn no_matching_version_returns_none() {
        let def = ActionDefinition {
            name: "build".into(),
            versions: vec![ActionVersion {
                language: Language::Bash,
                script: "echo hi".into(),
                expansions: vec![],
                returns: vec![],
                dependencies: vec![],
                conditions: vec![Condition::Axis {
                    axis_name: "mode".into(),
                    value: "prod".into(),
                }],
                location: loc(),
            }],
            required_env_vars: FxHashMap::default(),
            location: loc(),
        };
        let values = axis_values(&[("mode", "dev")]);
        assert!(def.select_version(&values, Platform::Linux).is_none());
    }

    #[test]
    fn ambiguous_version_match_returns_none() {
        let version = |value: &str| ActionVersion {
            language: Language::Bash,
            script: "echo hi".into(),
            expansions: vec![],
            returns: vec![],
            dependencies: vec![],
            conditions: vec![Condition::Axis {
                axis_name: "mode".into(),
                value: value.into(),
            }],
            location: loc(),
        };
        // Two versions with overlapping (identical) conditions both match.
        let def = ActionDefinition {
            name: "build".into(),
            versions: vec![version("dev"), version("dev")],
            required_env_vars: FxHashMap::default(),
            location: loc(),
        };
        let values = axis_values(&[("mode", "dev")]);
        assert!(def.select_version(&values, Platform::Linux).is_none());
    }

    #[test]
    fn required_axes_unions_across_versions() {
        let v1 = ActionVersion {
            language: Language::Bash,
            script: String::new(),
            expansions: vec![],
            returns: vec![],
            dependencies: vec![],
            conditions: vec![Condition::Axis {
                axis_name: "mode".into(),
                value: "dev".into(),
            }],
            location: loc(),
        };
        let v2 = ActionVersion {
            language: Language::Bash,
            script: String::new(),
            expansions: vec![],
            returns: vec![],
            dependencies: vec![],
            conditions: vec![Condition::Axis {
                axis_name: "arch".into(),
                value: "x64".into(),
            }],
            location: loc(),
        };
        let def = ActionDefinition {
            name: "build".into(),
            versions: vec![v1, v2],
            required_env_vars: FxHashMap::default(),
            location: loc(),
        };
        let axes = def.required_axes();
        assert_eq!(axes.len(), 2);
        assert!(axes.contains("mode"));
        assert!(axes.contains("arch"));
    }

    #[test]
    fn platform_condition_matches_current_platform_string() {
        let cond = Condition::Platform { value: Platform::current().as_str().to_string() };
        assert!(cond.matches(&FxHashMap::default(), Platform::current()));
    }
}
