//! Retainer executor: decides whether a pending soft dependency's
//! target should be kept in the graph.
//!
//! A retainer runs in its own isolated scratch directory with no visibility
//! into sibling node outputs — its `ExpansionContext` carries an empty
//! `actions` map, so `${action...}`/`${weak.action...}` references inside a
//! retainer script simply fail to resolve rather than leaking state across
//! that isolation boundary. It signals retention by calling a
//! `retain()` shell function (or `mdl.retain()` in Python) injected into the
//! script preamble, which just touches a signal file the host then checks
//! for. The verdict is true iff the process exits zero *and* that file
//! exists; a script that exits zero without calling `retain()` means "don't
//! retain", not an error.

use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::TempDir;
use tokio::process::Command;

use crate::ast::{ActionVersion, Language};
use crate::context::ActionKey;
use crate::error::{RunnerError, RunnerResult};

use super::language::prepare_script;
use crate::ast::ExpansionContext;

const SIGNAL_FILE_NAME: &str = ".retain_signal";

const BASH_PREAMBLE: &str = "retain() { touch \"$TASKCTX_RETAIN_SIGNAL\"; }\n";
const PYTHON_PREAMBLE: &str = "import os\n\
class _Mdl:\n\
    def retain(self):\n\
        open(os.environ['TASKCTX_RETAIN_SIGNAL'], 'w').close()\n\
mdl = _Mdl()\n\
def retain():\n\
    mdl.retain()\n";

/// Run a retainer script to completion and report whether it called `retain()`.
///
/// A timeout or a missing signal file is "do not retain", not an error — only
/// a nonzero exit (the retainer actually crashing) surfaces as
/// [`RunnerError::RetainerFailed`] with its stderr attached, per the
/// retainer-failed error contract.
pub async fn run_retainer(
    key: &ActionKey,
    version: &ActionVersion,
    ctx: &ExpansionContext<'_>,
    timeout: Duration,
) -> RunnerResult<bool> {
    let scratch = TempDir::new()?;
    let node_dir = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf())
        .map_err(|_| RunnerError::RetainerFailed { key: key.clone(), reason: "non-UTF-8 temp path".into() })?;

    let mut with_preamble = version.clone();
    let preamble = match version.language {
        Language::Bash => BASH_PREAMBLE,
        Language::Python => PYTHON_PREAMBLE,
    };
    with_preamble.script = format!("{preamble}{}", version.script);

    let prepared = prepare_script(&node_dir, &with_preamble, ctx, key)?;
    let signal_path = node_dir.join(SIGNAL_FILE_NAME);

    let mut command = Command::new(&prepared.command[0]);
    command.args(&prepared.command[1..]);
    command.env("TASKCTX_RETAIN_SIGNAL", signal_path.as_str());
    command.current_dir(node_dir.as_std_path());

    let Ok(spawn_result) = tokio::time::timeout(timeout, command.output()).await else {
        // Wall-clock limit hit: not a configuration error, just a verdict.
        return Ok(false);
    };
    let output = spawn_result.map_err(|e| RunnerError::SpawnFailed { key: key.clone(), reason: e.to_string() })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(RunnerError::RetainerFailed { key: key.clone(), reason: stderr });
    }

    Ok(signal_path.as_std_path().exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;
    use rustc_hash::FxHashMap;
    use serde_json::Value;

    fn loc() -> SourceLocation {
        SourceLocation { file_path: "x.md".into(), line_number: 1, section_name: "x".into() }
    }

    fn empty_ctx<'a>(
        sys: &'a FxHashMap<String, String>,
        env: &'a FxHashMap<String, String>,
        args: &'a FxHashMap<String, Value>,
        flags: &'a FxHashMap<String, bool>,
        actions: &'a FxHashMap<String, FxHashMap<String, Value>>,
        retained: &'a dyn Fn(&str) -> bool,
    ) -> ExpansionContext<'a> {
        ExpansionContext { sys, env, args, flags, actions, retained }
    }

    fn bash_version(script: &str) -> ActionVersion {
        ActionVersion {
            language: Language::Bash,
            script: script.to_string(),
            expansions: vec![],
            returns: vec![],
            dependencies: vec![],
            conditions: vec![],
            location: loc(),
        }
    }

    #[tokio::test]
    async fn retainer_that_calls_retain_is_kept() {
        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let args = FxHashMap::default();
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("check");

        let version = bash_version("retain()");
        let verdict = run_retainer(&key, &version, &ctx, Duration::from_secs(5)).await.unwrap();
        assert!(verdict);
    }

    #[tokio::test]
    async fn retainer_that_exits_zero_without_calling_retain_is_not_kept() {
        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let args = FxHashMap::default();
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("check");

        let version = bash_version("true");
        let verdict = run_retainer(&key, &version, &ctx, Duration::from_secs(5)).await.unwrap();
        assert!(!verdict);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_retainer_failed_error_even_if_retain_was_called() {
        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let args = FxHashMap::default();
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("check");

        let version = bash_version("retain(); exit 1");
        let err = run_retainer(&key, &version, &ctx, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, RunnerError::RetainerFailed { .. }));
    }

    #[tokio::test]
    async fn timeout_is_a_do_not_retain_verdict_not_an_error() {
        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let args = FxHashMap::default();
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("check");

        let version = bash_version("sleep 30");
        let verdict = run_retainer(&key, &version, &ctx, Duration::from_millis(50)).await.unwrap();
        assert!(!verdict);
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_as_retainer_failed_with_stderr() {
        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let args = FxHashMap::default();
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("check");

        let version = bash_version("echo boom >&2; exit 1");
        let err = run_retainer(&key, &version, &ctx, Duration::from_secs(5)).await.unwrap_err();
        match err {
            RunnerError::RetainerFailed { reason, .. } => assert!(reason.contains("boom")),
            other => panic!("expected RetainerFailed, got {other:?}"),
        }
    }
}
