//! Runner error types with stable error codes.
//!
//! Error code ranges:
//! - TASKCTX-000-009: CLI / invocation surface
//! - TASKCTX-010-019: Wildcard expansion
//! - TASKCTX-020-029: Compiler (unification, version selection)
//! - TASKCTX-030-039: Validator
//! - TASKCTX-040-049: Graph algebra (pruning, cycle detection)
//! - TASKCTX-050-059: Retainer executor
//! - TASKCTX-060-069: Execution engine
//! - TASKCTX-070-079: Config / IO

use miette::Diagnostic;
use thiserror::Error;

use crate::context::ActionKey;

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

/// Trait for errors that provide fix suggestions, surfaced alongside miette's
/// own diagnostic rendering on the CLI's error path.
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug, Diagnostic)]
#[diagnostic(url(docsrs))]
pub enum RunnerError {
    // ═══════════════════════════════════════════
    // CLI / INVOCATION SURFACE (000-009)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-000] malformed invocation: {detail}")]
    #[diagnostic(code(taskctx::malformed_cli), help("Check goal, axis, argument, and flag tokens"))]
    MalformedCli { detail: String },

    #[error("[TASKCTX-001] unknown goal '{goal}'")]
    #[diagnostic(code(taskctx::unknown_goal), help("Check the action name against the definition set"))]
    UnknownGoal { goal: String },

    #[error("[TASKCTX-002] unknown axis '{axis}'")]
    #[diagnostic(code(taskctx::unknown_axis))]
    UnknownAxis { axis: String },

    #[error("[TASKCTX-003] unknown argument '{argument}'")]
    #[diagnostic(code(taskctx::unknown_argument))]
    UnknownArgument { argument: String },

    #[error("[TASKCTX-004] unknown flag '{flag}'")]
    #[diagnostic(code(taskctx::unknown_flag))]
    UnknownFlag { flag: String },

    #[error("[TASKCTX-005] unknown return '{action}.{variable}'")]
    #[diagnostic(code(taskctx::unknown_return))]
    UnknownReturn { action: String, variable: String },

    // ═══════════════════════════════════════════
    // WILDCARD EXPANSION (010-019)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-010] axis '{axis}' pattern '{pattern}' matched no declared value")]
    #[diagnostic(code(taskctx::no_match), help("Check the axis's declared value set"))]
    NoMatch { axis: String, pattern: String },

    // ═══════════════════════════════════════════
    // COMPILER (020-029)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-020] conflicting definitions for '{key}'")]
    #[diagnostic(
        code(taskctx::conflicting_definitions),
        help("Two invocations selected incompatible versions under the same reduced context")
    )]
    ConflictingDefinitions { key: ActionKey },

    #[error("[TASKCTX-021] no version selected for '{key}'")]
    #[diagnostic(code(taskctx::no_version_selected), help("Zero or more than one version's conditions matched"))]
    NoVersionSelected { key: ActionKey },

    #[error("[TASKCTX-022] unresolved reference while expanding '{key}': {detail}")]
    #[diagnostic(code(taskctx::unresolved_dependency))]
    UnresolvedDependency { key: ActionKey, detail: String },

    // ═══════════════════════════════════════════
    // VALIDATOR (030-039)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-030] validation failed with {} issue(s)", .issues.len())]
    #[diagnostic(code(taskctx::validation_failed))]
    Validation { issues: Vec<String> },

    // ═══════════════════════════════════════════
    // GRAPH ALGEBRA (040-049)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-040] cycle detected: {}", .path.iter().map(|k| k.label()).collect::<Vec<_>>().join(" -> "))]
    #[diagnostic(code(taskctx::cycle), help("Remove the circular dependency listed above"))]
    Cycle { path: Vec<ActionKey> },

    // ═══════════════════════════════════════════
    // RETAINER EXECUTOR (050-059)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-050] retainer '{key}' failed: {reason}")]
    #[diagnostic(code(taskctx::retainer_failed))]
    RetainerFailed { key: ActionKey, reason: String },

    // ═══════════════════════════════════════════
    // EXECUTION ENGINE (060-069)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-060] action '{key}' exited with status {status}")]
    #[diagnostic(code(taskctx::script_nonzero_exit), help("Check stderr.log in the run directory"))]
    ScriptNonZeroExit { key: ActionKey, status: i32 },

    #[error("[TASKCTX-061] action '{key}' did not produce declared output '{variable}'")]
    #[diagnostic(code(taskctx::missing_output))]
    MissingOutput { key: ActionKey, variable: String },

    #[error("[TASKCTX-062] action '{key}' artifact output '{variable}' is not a valid path")]
    #[diagnostic(code(taskctx::bad_artifact))]
    BadArtifact { key: ActionKey, variable: String },

    #[error("[TASKCTX-063] action '{key}' was cancelled")]
    #[diagnostic(code(taskctx::cancelled))]
    Cancelled { key: ActionKey },

    #[error("[TASKCTX-064] action '{key}' spawn failed: {reason}")]
    #[diagnostic(code(taskctx::spawn_failed))]
    SpawnFailed { key: ActionKey, reason: String },

    // ═══════════════════════════════════════════
    // CONFIG / IO (070-079)
    // ═══════════════════════════════════════════
    #[error("[TASKCTX-070] config error: {reason}")]
    #[diagnostic(code(taskctx::config_error), help("Check the [runner] table in your config file"))]
    Config { reason: String },

    #[error("[TASKCTX-071] IO error: {0}")]
    #[diagnostic(code(taskctx::io_error))]
    Io(#[from] std::io::Error),

    #[error("[TASKCTX-072] JSON error: {0}")]
    #[diagnostic(code(taskctx::json_error))]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedCli { .. } => "TASKCTX-000",
            Self::UnknownGoal { .. } => "TASKCTX-001",
            Self::UnknownAxis { .. } => "TASKCTX-002",
            Self::UnknownArgument { .. } => "TASKCTX-003",
            Self::UnknownFlag { .. } => "TASKCTX-004",
            Self::UnknownReturn { .. } => "TASKCTX-005",
            Self::NoMatch { .. } => "TASKCTX-010",
            Self::ConflictingDefinitions { .. } => "TASKCTX-020",
            Self::NoVersionSelected { .. } => "TASKCTX-021",
            Self::UnresolvedDependency { .. } => "TASKCTX-022",
            Self::Validation { .. } => "TASKCTX-030",
            Self::Cycle { .. } => "TASKCTX-040",
            Self::RetainerFailed { .. } => "TASKCTX-050",
            Self::ScriptNonZeroExit { .. } => "TASKCTX-060",
            Self::MissingOutput { .. } => "TASKCTX-061",
            Self::BadArtifact { .. } => "TASKCTX-062",
            Self::Cancelled { .. } => "TASKCTX-063",
            Self::SpawnFailed { .. } => "TASKCTX-064",
            Self::Config { .. } => "TASKCTX-070",
            Self::Io(_) => "TASKCTX-071",
            Self::Json(_) => "TASKCTX-072",
        }
    }

    /// Whether this failure, had it happened mid-run, still lets in-flight
    /// sibling nodes finish rather than forcing an immediate abort. The
    /// failure policy always says yes, except for cancellation, which tears
    /// down in-flight work deliberately. Errors that never reach a running
    /// engine (compilation, validation, config) are classified `false` here
    /// since the question doesn't apply to them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ScriptNonZeroExit { .. }
                | Self::MissingOutput { .. }
                | Self::BadArtifact { .. }
                | Self::SpawnFailed { .. }
                | Self::RetainerFailed { .. }
                | Self::Io(_)
        )
    }
}

impl FixSuggestion for RunnerError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            RunnerError::MalformedCli { .. } => Some("Check goal, axis, argument, and flag tokens"),
            RunnerError::UnknownGoal { .. } => Some("Check the action name against the definition set"),
            RunnerError::UnknownAxis { .. } => Some("Declare the axis or fix its spelling"),
            RunnerError::UnknownArgument { .. } => Some("Declare the argument or fix its spelling"),
            RunnerError::UnknownFlag { .. } => Some("Declare the flag or fix its spelling"),
            RunnerError::UnknownReturn { .. } => Some("Check the action declares this return value"),
            RunnerError::NoMatch { .. } => Some("Check the axis's declared value set"),
            RunnerError::ConflictingDefinitions { .. } => {
                Some("Ensure all invocations select the same version for a shared reduced context")
            }
            RunnerError::NoVersionSelected { .. } => {
                Some("Make exactly one version's conditions match the supplied axes")
            }
            RunnerError::UnresolvedDependency { .. } => Some("Check the referenced system/env/action/argument/flag"),
            RunnerError::Validation { .. } => Some("Fix the listed issues and recompile"),
            RunnerError::Cycle { .. } => Some("Remove the circular dependency listed above"),
            RunnerError::RetainerFailed { .. } => Some("Check the retainer script's exit code and retain() call"),
            RunnerError::ScriptNonZeroExit { .. } => Some("Check stderr.log in the run directory"),
            RunnerError::MissingOutput { .. } => Some("Ensure the script emits the declared return value"),
            RunnerError::BadArtifact { .. } => Some("Ensure the artifact path exists and is absolute"),
            RunnerError::Cancelled { .. } => None,
            RunnerError::SpawnFailed { .. } => Some("Check the language runtime is installed and on PATH"),
            RunnerError::Config { .. } => Some("Check the [runner] table in your config file"),
            RunnerError::Io(_) => Some("Check file path and permissions"),
            RunnerError::Json(_) => Some("Check JSON syntax"),
        }
    }
}
