//! CLI invocation surface: argv tokenization itself is an external
//! collaborator's concern — `clap` splits argv into strings
//! for us exactly as it would for any CLI, and the goal/axis/argument/flag
//! grammar inside the trailing token vector is walked by this module.
//!
//! Scoping is positional: tokens before the first `:action-name` goal token
//! are global; tokens after a goal and before the next one are scoped to
//! that invocation. Toggle and path options (`--dry-run`, `--defs`, etc.)
//! are recognized by `clap` itself and must precede the first goal token —
//! once a goal opens, every subsequent token is grammar, not a CLI option.

use clap::Parser;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::PathBuf;

use taskctx::dag::Invocation;
use taskctx::error::{RunnerError, RunnerResult};

#[derive(Parser, Debug)]
#[command(name = "taskctx")]
#[command(about = "Context-aware task runner: compiles action definitions and CLI goals into an executable DAG and runs it")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON-encoded definition corpus (the markup parser's output).
    #[arg(long = "defs", default_value = "actions.json")]
    pub defs: PathBuf,

    /// Project root; run directories live under `<project-root>/.mdl/runs/`.
    #[arg(long = "project-root", default_value = ".")]
    pub project_root: String,

    /// Also write the invoker-facing JSON output document to this path.
    #[arg(long = "output")]
    pub output: Option<PathBuf>,

    /// Enumerate actions with their dependencies, arguments, flags, env vars, returns, and axes.
    #[arg(long = "list")]
    pub list: bool,

    /// Compile and print the topologically sorted plan without executing anything.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Restore nodes reported `done` in the most recent prior run instead of re-running them.
    #[arg(long = "continue")]
    pub continue_run: bool,

    /// Force a single-worker pool, preserving topological order.
    #[arg(long = "sequential")]
    pub sequential: bool,

    /// Keep the run directory even when every goal succeeds.
    #[arg(long = "keep-run-dir")]
    pub keep_run_dir: bool,

    /// `make -k` style: a node failure still blocks its own dependents but no
    /// longer halts dispatch of unrelated ready nodes.
    #[arg(long = "suppress-on-fail")]
    pub suppress_on_fail: bool,

    /// Goal tokens (`:action-name`) plus the axis/argument/flag tokens scoped
    /// to whichever goal precedes them.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub tokens: Vec<String>,
}

/// The result of walking [`Cli::tokens`]: global overrides plus one
/// [`Invocation`] per goal token, in the order they were written.
#[derive(Debug, Default)]
pub struct ParsedGoals {
    pub global_axes: FxHashMap<String, String>,
    pub global_args: FxHashMap<String, Value>,
    pub global_flags: FxHashMap<String, bool>,
    pub invocations: Vec<Invocation>,
}

pub fn parse_tokens(tokens: &[String]) -> RunnerResult<ParsedGoals> {
    let mut parsed = ParsedGoals::default();

    for token in tokens {
        if let Some(action_name) = token.strip_prefix(':') {
            if action_name.is_empty() {
                return Err(RunnerError::MalformedCli {
                    detail: "goal token ':' is missing an action name".into(),
                });
            }
            parsed.invocations.push(Invocation {
                action_name: action_name.to_string(),
                ..Invocation::default()
            });
            continue;
        }

        match parsed.invocations.last_mut() {
            Some(current) => apply_token(token, &mut current.axes, &mut current.args, &mut current.flags)?,
            None => apply_token(token, &mut parsed.global_axes, &mut parsed.global_args, &mut parsed.global_flags)?,
        }
    }

    if parsed.invocations.is_empty() {
        return Err(RunnerError::MalformedCli { detail: "no goal tokens supplied".into() });
    }

    Ok(parsed)
}

/// Classify one non-goal token as an axis spec, an argument, or a flag, and
/// fold it into whichever scope (global or current invocation) is active.
/// Repeated `--name=value` tokens for the same name accumulate into an array
/// rather than overwriting, so array-typed arguments can be supplied
/// positionally without a separate list syntax.
fn apply_token(
    token: &str,
    axes: &mut FxHashMap<String, String>,
    args: &mut FxHashMap<String, Value>,
    flags: &mut FxHashMap<String, bool>,
) -> RunnerResult<()> {
    if let Some(rest) = token.strip_prefix("--") {
        if rest.is_empty() {
            return Err(RunnerError::MalformedCli { detail: "bare '--' is not a valid argument or flag token".into() });
        }
        return match rest.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                match args.get_mut(name) {
                    Some(Value::Array(values)) => values.push(Value::String(value.to_string())),
                    Some(existing) => {
                        let previous = existing.clone();
                        *existing = Value::Array(vec![previous, Value::String(value.to_string())]);
                    }
                    None => {
                        args.insert(name.to_string(), Value::String(value.to_string()));
                    }
                }
                Ok(())
            }
            Some(_) => Err(RunnerError::MalformedCli { detail: format!("malformed argument token '{token}'") }),
            None => {
                flags.insert(rest.to_string(), true);
                Ok(())
            }
        };
    }

    match token.split_once('=') {
        Some((name, value)) if !name.is_empty() => {
            axes.insert(name.to_string(), value.to_string());
            Ok(())
        }
        _ => Err(RunnerError::MalformedCli {
            detail: format!("unrecognized token '{token}': expected ':action', 'axis=value', '--name=value', or '--name'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_goal_with_no_scoped_tokens() {
        let parsed = parse_tokens(&[":build".to_string()]).unwrap();
        assert_eq!(parsed.invocations.len(), 1);
        assert_eq!(parsed.invocations[0].action_name, "build");
    }

    #[test]
    fn global_tokens_before_the_first_goal_are_global() {
        let tokens = vec!["mode=prod".to_string(), "--verbose".to_string(), ":build".to_string()];
        let parsed = parse_tokens(&tokens).unwrap();
        assert_eq!(parsed.global_axes.get("mode").unwrap(), "prod");
        assert_eq!(*parsed.global_flags.get("verbose").unwrap(), true);
    }

    #[test]
    fn tokens_after_a_goal_are_scoped_to_it() {
        let tokens = vec![
            ":build".to_string(),
            "target=linux-x64".to_string(),
            "--name=widget".to_string(),
            ":deploy".to_string(),
            "--env=staging".to_string(),
        ];
        let parsed = parse_tokens(&tokens).unwrap();
        assert_eq!(parsed.invocations.len(), 2);
        assert_eq!(parsed.invocations[0].axes.get("target").unwrap(), "linux-x64");
        assert_eq!(parsed.invocations[0].args.get("name").unwrap(), "widget");
        assert_eq!(parsed.invocations[1].args.get("env").unwrap(), "staging");
        assert!(parsed.invocations[1].axes.is_empty());
    }

    #[test]
    fn repeated_argument_token_accumulates_into_an_array() {
        let tokens = vec![":build".to_string(), "--file=a.txt".to_string(), "--file=b.txt".to_string()];
        let parsed = parse_tokens(&tokens).unwrap();
        let files = parsed.invocations[0].args.get("file").unwrap();
        assert_eq!(files, &Value::Array(vec![Value::String("a.txt".into()), Value::String("b.txt".into())]));
    }

    #[test]
    fn token_before_any_goal_with_no_recognizable_shape_is_malformed() {
        let err = parse_tokens(&["just-junk".to_string()]).unwrap_err();
        assert!(matches!(err, RunnerError::MalformedCli { .. }));
    }

    #[test]
    fn empty_goal_name_is_malformed() {
        let err = parse_tokens(&[":".to_string()]).unwrap_err();
        assert!(matches!(err, RunnerError::MalformedCli { .. }));
    }

    #[test]
    fn no_goals_at_all_is_malformed() {
        let err = parse_tokens(&["mode=prod".to_string()]).unwrap_err();
        assert!(matches!(err, RunnerError::MalformedCli { .. }));
    }
}
