//! Expansion engine: resolves lexical script references against a runtime context.
//!
//! An [`Expansion`] is a placeholder of one of six kinds, already lexed and
//! classified by the markup parser (out of scope here). At execution time
//! each is resolved against an [`ExpansionContext`] built from the node's
//! merged args/flags/axis values, the outputs table, and the soft-retention
//! verdicts from the retainer pre-pass.

use std::borrow::Cow;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ActionKey;
use crate::error::{RunnerError, RunnerResult};

/// One of the six expansion reference kinds a script body may contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expansion {
    System { variable: String },
    Env { variable: String },
    Argument { name: String },
    Flag { name: String },
    /// `${action.<name>.<var>}` — fails if the action or variable is absent.
    StrongActionOutput { action: String, variable: String },
    /// `${weak.action.<name>.<var>}` — empty string if absent or null.
    WeakActionOutput { action: String, variable: String },
    /// `${retained.action.<name>}` — "1"/"0" based on the post-retainer set.
    RetainedCheck { action: String },
}

impl Expansion {
    /// The action name this expansion implicitly depends on, if any. Used by
    /// the compiler to add implicit strong/weak dependency edges.
    pub fn dependency_action(&self) -> Option<&str> {
        match self {
            Expansion::StrongActionOutput { action, .. } => Some(action),
            Expansion::WeakActionOutput { action, .. } => Some(action),
            _ => None,
        }
    }

    /// Parse a `${...}` path body into its expansion kind. The markup parser
    /// (out of scope) already classified every script-body reference at
    /// definition time; this mirrors that same lexical grammar so the
    /// language runtime can resolve a rendered path string at execution time.
    pub fn parse_path(path: &str) -> Option<Expansion> {
        let mut parts = path.split('.');
        match parts.next()? {
            "sys" => Some(Expansion::System { variable: parts.collect::<Vec<_>>().join(".") }),
            "env" => Some(Expansion::Env { variable: parts.collect::<Vec<_>>().join(".") }),
            "args" => Some(Expansion::Argument { name: parts.collect::<Vec<_>>().join(".") }),
            "flags" => Some(Expansion::Flag { name: parts.collect::<Vec<_>>().join(".") }),
            "weak" => {
                if parts.next()? != "action" {
                    return None;
                }
                let action = parts.next()?.to_string();
                let variable = parts.collect::<Vec<_>>().join(".");
                Some(Expansion::WeakActionOutput { action, variable })
            }
            "retained" => {
                if parts.next()? != "action" {
                    return None;
                }
                Some(Expansion::RetainedCheck { action: parts.collect::<Vec<_>>().join(".") })
            }
            "action" => {
                let action = parts.next()?.to_string();
                let variable = parts.collect::<Vec<_>>().join(".");
                Some(Expansion::StrongActionOutput { action, variable })
            }
            _ => None,
        }
    }
}

/// Snapshot of everything needed to resolve expansions for one node.
///
/// Each field is an immutable map handed to the worker before it starts —
/// there is no shared mutable state visited during resolution.
pub struct ExpansionContext<'a> {
    pub sys: &'a FxHashMap<String, String>,
    pub env: &'a FxHashMap<String, String>,
    pub args: &'a FxHashMap<String, Value>,
    pub flags: &'a FxHashMap<String, bool>,
    /// Published outputs of already-completed dependencies, keyed by action name
    /// as it appears in the script (same reduced-context action the compiler wired).
    pub actions: &'a FxHashMap<String, FxHashMap<String, Value>>,
    /// Which ActionKeys survived the soft-dependency retention pass.
    pub retained: &'a dyn Fn(&str) -> bool,
}

impl Expansion {
    /// Resolve to the string form used for script-text interpolation. Arrays
    /// render as whitespace-separated tokens; structured-language
    /// runtimes instead read `args`/`flags` from the sidecar context file and
    /// never call this path for array-typed arguments.
    pub fn resolve(&self, ctx: &ExpansionContext, key: &ActionKey) -> RunnerResult<String> {
        match self {
            Expansion::System { variable } => ctx
                .sys
                .get(variable)
                .cloned()
                .ok_or_else(|| RunnerError::UnresolvedDependency {
                    key: key.clone(),
                    detail: format!("system variable '{variable}' not found"),
                }),
            Expansion::Env { variable } => ctx
                .env
                .get(variable)
                .cloned()
                .ok_or_else(|| RunnerError::UnresolvedDependency {
                    key: key.clone(),
                    detail: format!("environment variable '{variable}' not found"),
                }),
            Expansion::Argument { name } => ctx
                .args
                .get(name)
                .map(render_value)
                .ok_or_else(|| RunnerError::UnresolvedDependency {
                    key: key.clone(),
                    detail: format!("argument '{name}' not found"),
                }),
            Expansion::Flag { name } => ctx
                .flags
                .get(name)
                .map(|v| if *v { "1".to_string() } else { "0".to_string() })
                .ok_or_else(|| RunnerError::UnresolvedDependency {
                    key: key.clone(),
                    detail: format!("flag '{name}' not found"),
                }),
            Expansion::StrongActionOutput { action, variable } => {
                let outputs = ctx.actions.get(action).ok_or_else(|| {
                    RunnerError::UnresolvedDependency {
                        key: key.clone(),
                        detail: format!("action '{action}' output not available"),
                    }
                })?;
                outputs
                    .get(variable)
                    .map(render_value)
                    .ok_or_else(|| RunnerError::UnresolvedDependency {
                        key: key.clone(),
                        detail: format!("variable '{variable}' not found in action '{action}' outputs"),
                    })
            }
            Expansion::WeakActionOutput { action, variable } => Ok(ctx
                .actions
                .get(action)
                .and_then(|outputs| outputs.get(variable))
                .filter(|v| !v.is_null())
                .map(render_value)
                .unwrap_or_default()),
            Expansion::RetainedCheck { action } => {
                Ok(if (ctx.retained)(action) { "1" } else { "0" }.to_string())
            }
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

/// Substitute every `${...}` reference in `template` using `resolver`.
/// Returns a borrowed [`Cow`] when no reference is present (the common case
/// for short scripts with no interpolation), avoiding an allocation.
pub fn substitute<'a>(
    template: &'a str,
    resolver: impl Fn(&str) -> RunnerResult<String>,
) -> RunnerResult<Cow<'a, str>> {
    let Some(first) = template.find("${") else {
        return Ok(Cow::Borrowed(template));
    };

    let mut out = String::with_capacity(template.len());
    out.push_str(&template[..first]);
    let mut rest = &template[first..];

    loop {
        debug_assert!(rest.starts_with("${"));
        let Some(close) = rest.find('}') else {
            out.push_str(rest);
            break;
        };
        let path = &rest[2..close];
        out.push_str(&resolver(path)?);
        rest = &rest[close + 1..];

        match rest.find("${") {
            Some(next) => {
                out.push_str(&rest[..next]);
                rest = &rest[next..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }

    Ok(Cow::Owned(out))
}
