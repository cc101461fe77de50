//! Post-compile validator. Runs after compilation, before execution;
//! collects every issue rather than failing on the first.

use std::fmt;

use crate::ast::{Expansion, Language, ParsedDocument};
use crate::context::ActionKey;

use super::node::ActionGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    UnknownGoal { key: ActionKey },
    NoSelectedVersion { key: ActionKey },
    UnknownActionReference { key: ActionKey, action: String },
    UnknownReturnReference { key: ActionKey, action: String, variable: String },
    UnknownArgument { key: ActionKey, name: String },
    UnknownFlag { key: ActionKey, name: String },
    UnresolvedEnv { key: ActionKey, variable: String },
    UnknownAxisInCondition { key: ActionKey, axis: String },
    MissingAxisValue { key: ActionKey, axis: String },
    ArrayWhereScalarRequired { key: ActionKey, argument: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::UnknownGoal { key } => write!(f, "{key}: goal is not a known action"),
            ValidationIssue::NoSelectedVersion { key } => write!(f, "{key}: no version selected"),
            ValidationIssue::UnknownActionReference { key, action } => {
                write!(f, "{key}: references unknown action '{action}'")
            }
            ValidationIssue::UnknownReturnReference { key, action, variable } => {
                write!(f, "{key}: action '{action}' has no declared return '{variable}'")
            }
            ValidationIssue::UnknownArgument { key, name } => {
                write!(f, "{key}: references undeclared argument '{name}'")
            }
            ValidationIssue::UnknownFlag { key, name } => {
                write!(f, "{key}: references undeclared flag '{name}'")
            }
            ValidationIssue::UnresolvedEnv { key, variable } => {
                write!(f, "{key}: env variable '{variable}' is not passed through or present")
            }
            ValidationIssue::UnknownAxisInCondition { key, axis } => {
                write!(f, "{key}: condition references undeclared axis '{axis}'")
            }
            ValidationIssue::MissingAxisValue { key, axis } => {
                write!(f, "{key}: axis '{axis}' has no supplied or defaulted value")
            }
            ValidationIssue::ArrayWhereScalarRequired { key, argument } => {
                write!(f, "{key}: array-typed argument '{argument}' used where a scalar is required")
            }
        }
    }
}

/// Validate a compiled graph against the definition corpus. Returns every
/// issue found; an empty vec means the graph is executable.
pub fn validate(
    graph: &ActionGraph,
    document: &ParsedDocument,
    axis_values: &rustc_hash::FxHashMap<String, String>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for goal in &graph.goals {
        if !document.actions.contains_key(goal.action_name.as_ref()) {
            issues.push(ValidationIssue::UnknownGoal { key: goal.clone() });
        }
    }

    for (key, node) in &graph.nodes {
        if !document.actions.contains_key(key.action_name.as_ref()) {
            continue;
        }

        let Some(version) = &node.selected_version else {
            issues.push(ValidationIssue::NoSelectedVersion { key: key.clone() });
            continue;
        };

        for expansion in &version.expansions {
            match expansion {
                Expansion::StrongActionOutput { action: target_action, variable }
                | Expansion::WeakActionOutput { action: target_action, variable } => {
                    match document.actions.get(target_action.as_str()) {
                        None => issues.push(ValidationIssue::UnknownActionReference {
                            key: key.clone(),
                            action: target_action.clone(),
                        }),
                        Some(target) => {
                            let declares = target
                                .versions
                                .iter()
                                .any(|v| v.returns.iter().any(|r| &r.name == variable));
                            if !declares {
                                issues.push(ValidationIssue::UnknownReturnReference {
                                    key: key.clone(),
                                    action: target_action.clone(),
                                    variable: variable.clone(),
                                });
                            }
                        }
                    }
                }
                Expansion::RetainedCheck { action: target_action } => {
                    if !document.actions.contains_key(target_action.as_str()) {
                        issues.push(ValidationIssue::UnknownActionReference {
                            key: key.clone(),
                            action: target_action.clone(),
                        });
                    }
                }
                Expansion::Argument { name } => match document.arguments.get(name) {
                    None => issues.push(ValidationIssue::UnknownArgument {
                        key: key.clone(),
                        name: name.clone(),
                    }),
                    Some(arg) if arg.is_array && version.language == Language::Bash => {
                        issues.push(ValidationIssue::ArrayWhereScalarRequired {
                            key: key.clone(),
                            argument: name.clone(),
                        });
                    }
                    Some(_) => {}
                },
                Expansion::Flag { name } => {
                    if !document.flags.contains_key(name) {
                        issues.push(ValidationIssue::UnknownFlag { key: key.clone(), name: name.clone() });
                    }
                }
                Expansion::Env { variable } => {
                    let passthrough = document.passthrough_env.iter().any(|v| v == variable);
                    let present = std::env::var(variable).is_ok();
                    if !passthrough && !present {
                        issues.push(ValidationIssue::UnresolvedEnv {
                            key: key.clone(),
                            variable: variable.clone(),
                        });
                    }
                }
                Expansion::System { .. } => {}
            }
        }

        for condition in &version.conditions {
            if let crate::ast::Condition::Axis { axis_name, .. } = condition {
                if !document.axes.contains_key(axis_name.as_ref()) {
                    issues.push(ValidationIssue::UnknownAxisInCondition {
                        key: key.clone(),
                        axis: axis_name.to_string(),
                    });
                } else if !axis_values.contains_key(axis_name.as_ref())
                    && document.axes[axis_name.as_ref()].default.is_none()
                {
                    issues.push(ValidationIssue::MissingAxisValue {
                        key: key.clone(),
                        axis: axis_name.to_string(),
                    });
                }
            }
        }
    }

    issues
}
