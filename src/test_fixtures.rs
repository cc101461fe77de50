//! Shared test-corpus builders, exported only under the `test-fixtures`
//! feature so integration tests in `tests/` can build small definition
//! corpora without re-deriving the same boilerplate every unit-test module
//! in this crate already carries locally.
//!
//! These mirror the small `loc()`/`bash_version()`/`action()` helpers
//! scattered across `src/**/tests` modules, just promoted to a shared,
//! feature-gated location instead of copy-pasted per file.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::ast::{
    ActionDefinition, ActionVersion, ArgumentDefinition, Condition, DependencyDeclaration,
    DependencyKind, FlagDefinition, Language, ParsedDocument, ReturnDeclaration, SourceLocation,
    ValueType,
};
use crate::context::Axis;
use crate::dag::Invocation;

// ═══════════════════════════════════════════════════════════════
// Locations
// ═══════════════════════════════════════════════════════════════

pub fn loc(section: &str) -> SourceLocation {
    SourceLocation { file_path: "actions.md".into(), line_number: 1, section_name: section.into() }
}

// ═══════════════════════════════════════════════════════════════
// Versions
// ═══════════════════════════════════════════════════════════════

#[allow(clippy::too_many_arguments)]
pub fn version(
    language: Language,
    script: &str,
    expansions: Vec<crate::ast::Expansion>,
    returns: Vec<ReturnDeclaration>,
    dependencies: Vec<DependencyDeclaration>,
    conditions: Vec<Condition>,
) -> ActionVersion {
    ActionVersion {
        language,
        script: script.to_string(),
        expansions,
        returns,
        dependencies,
        conditions,
        location: loc("version"),
    }
}

/// A bare Bash version with no deps, returns, expansions, or conditions.
pub fn bash(script: &str) -> ActionVersion {
    version(Language::Bash, script, vec![], vec![], vec![], vec![])
}

pub fn bash_with_conditions(script: &str, conditions: Vec<Condition>) -> ActionVersion {
    version(Language::Bash, script, vec![], vec![], vec![], conditions)
}

pub fn bash_with_dependencies(script: &str, dependencies: Vec<DependencyDeclaration>) -> ActionVersion {
    version(Language::Bash, script, vec![], vec![], dependencies, vec![])
}

pub fn bash_with_returns(script: &str, returns: Vec<ReturnDeclaration>) -> ActionVersion {
    version(Language::Bash, script, vec![], returns, vec![], vec![])
}

// ═══════════════════════════════════════════════════════════════
// Dependencies and returns
// ═══════════════════════════════════════════════════════════════

pub fn strong_dep(action_name: &str) -> DependencyDeclaration {
    DependencyDeclaration { action_name: action_name.into(), kind: DependencyKind::Strong, location: loc("deps") }
}

pub fn weak_dep(action_name: &str) -> DependencyDeclaration {
    DependencyDeclaration { action_name: action_name.into(), kind: DependencyKind::Weak, location: loc("deps") }
}

pub fn soft_dep(action_name: &str, retainer_action: &str) -> DependencyDeclaration {
    DependencyDeclaration {
        action_name: action_name.into(),
        kind: DependencyKind::Soft { retainer_action: retainer_action.into() },
        location: loc("deps"),
    }
}

pub fn returns_int(name: &str, value_expression: &str) -> ReturnDeclaration {
    ReturnDeclaration { name: name.into(), value_type: ValueType::Int, value_expression: value_expression.into(), location: loc("returns") }
}

pub fn returns_string(name: &str, value_expression: &str) -> ReturnDeclaration {
    ReturnDeclaration { name: name.into(), value_type: ValueType::String, value_expression: value_expression.into(), location: loc("returns") }
}

pub fn returns_bool(name: &str, value_expression: &str) -> ReturnDeclaration {
    ReturnDeclaration { name: name.into(), value_type: ValueType::Bool, value_expression: value_expression.into(), location: loc("returns") }
}

// ═══════════════════════════════════════════════════════════════
// Actions and documents
// ═══════════════════════════════════════════════════════════════

pub fn action_with_versions(name: &str, versions: Vec<ActionVersion>) -> ActionDefinition {
    ActionDefinition { name: name.into(), versions, required_env_vars: FxHashMap::default(), location: loc(name) }
}

/// A single-version action whose script is a plain Bash one-liner.
pub fn simple_action(name: &str, script: &str) -> ActionDefinition {
    action_with_versions(name, vec![bash(script)])
}

pub fn axis(name: &str, values: &[&str], default: Option<&str>) -> Axis {
    Axis::new(name, values.iter().map(|v| v.to_string()).collect(), default.map(String::from))
}

pub fn argument(name: &str, value_type: ValueType, default: Option<&str>) -> ArgumentDefinition {
    ArgumentDefinition { name: name.into(), value_type, is_array: false, default: default.map(String::from), location: loc("args") }
}

pub fn flag(name: &str) -> FlagDefinition {
    FlagDefinition { name: name.into(), location: loc("flags") }
}

/// A document containing just the given actions, no axes/args/flags.
pub fn document(actions: Vec<ActionDefinition>) -> ParsedDocument {
    let mut doc = ParsedDocument::default();
    for action in actions {
        doc.actions.insert(action.name.clone(), action);
    }
    doc
}

pub fn document_with_axes(actions: Vec<ActionDefinition>, axes: Vec<Axis>) -> ParsedDocument {
    let mut doc = document(actions);
    for ax in axes {
        doc.axes.insert(ax.name.to_string(), ax);
    }
    doc
}

// ═══════════════════════════════════════════════════════════════
// Invocations
// ═══════════════════════════════════════════════════════════════

pub fn invocation(action_name: &str) -> Invocation {
    Invocation {
        action_name: action_name.into(),
        axes: FxHashMap::default(),
        args: FxHashMap::default(),
        flags: FxHashMap::default(),
    }
}

pub fn invocation_with_axes(action_name: &str, axes: &[(&str, &str)]) -> Invocation {
    let mut inv = invocation(action_name);
    for (name, value) in axes {
        inv.axes.insert((*name).to_string(), (*value).to_string());
    }
    inv
}

pub fn invocation_with_args(action_name: &str, args: &[(&str, Value)]) -> Invocation {
    let mut inv = invocation(action_name);
    for (name, value) in args {
        inv.args.insert((*name).to_string(), value.clone());
    }
    inv
}
