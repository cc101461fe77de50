//! Execution engine: runs a pruned, unified [`ActionGraph`] to
//! completion.
//!
//! Scheduling is a ready-queue plus decrementing-dependency-count worker
//! pool, not a re-scan-every-tick loop: each node tracks how many of its
//! strong+weak dependencies remain outstanding, and becomes eligible for
//! dispatch the instant that count hits zero. This keeps dispatch O(ready
//! nodes) per completion rather than O(graph size).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use camino::Utf8PathBuf;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::ast::{ActionVersion, Language, ParsedDocument, ValueType};
use crate::context::ActionKey;
use crate::dag::{ActionGraph, ActionNode, PendingSoftDependency};
use crate::error::{RunnerError, RunnerResult};
use crate::event::{EventBus, EventKind};
use crate::store::OutputsTable;

use super::language::prepare_script;
use super::retainer::run_retainer;
use super::rundir::{self, Meta, NodeStatus, OutputDoc, TypedValue};

/// Injected into every non-retainer script so the script's own runtime
/// computation — not a static Rust-side substitution — produces the final
/// `output.json`. Declared returns are rendered into `ret`/`mdl.ret` calls
/// appended after the user's script body (see [`with_return_preamble`]); the
/// shell/interpreter evaluates those calls with the rest of the script's
/// state already in scope, so a return's value expression can reference
/// arithmetic or variables the script computed along the way.
const RET_BASH_PREAMBLE: &str = r#"declare -a TASKCTX_RET_NAMES=()
declare -a TASKCTX_RET_TYPES=()
declare -a TASKCTX_RET_VALUES=()
ret() {
    local decl="$1"
    local name="${decl%%:*}"
    local rest="${decl#*:}"
    local type="${rest%%=*}"
    local value="${rest#*=}"
    TASKCTX_RET_NAMES+=("$name")
    TASKCTX_RET_TYPES+=("$type")
    TASKCTX_RET_VALUES+=("$value")
}
taskctx_write_outputs() {
    local out="$TASKCTX_OUTPUT_JSON"
    [ -z "$out" ] && return
    {
        printf '{'
        local i n=${#TASKCTX_RET_NAMES[@]}
        for ((i = 0; i < n; i++)); do
            local name="${TASKCTX_RET_NAMES[$i]}" type="${TASKCTX_RET_TYPES[$i]}" value="${TASKCTX_RET_VALUES[$i]}"
            [ "$i" -gt 0 ] && printf ','
            case "$type" in
                int)
                    printf '"%s":{"type":"%s","value":%s}' "$name" "$type" "$value"
                    ;;
                bool)
                    case "$value" in
                        1|true|yes) json_value=true ;;
                        *) json_value=false ;;
                    esac
                    printf '"%s":{"type":"%s","value":%s}' "$name" "$type" "$json_value"
                    ;;
                *)
                    local escaped="${value//\\/\\\\}"
                    escaped="${escaped//\"/\\\"}"
                    printf '"%s":{"type":"%s","value":"%s"}' "$name" "$type" "$escaped"
                    ;;
            esac
        done
        printf '}'
    } > "$out"
}
trap taskctx_write_outputs EXIT
"#;

const RET_PYTHON_PREAMBLE: &str = "import atexit\n\
import json\n\
import os\n\
_taskctx_outputs = {}\n\
def ret(name, value, type_str):\n\
    if type_str == 'int':\n\
        value = int(value)\n\
    elif type_str == 'bool':\n\
        value = bool(value)\n\
    else:\n\
        value = str(value)\n\
    _taskctx_outputs[name] = {'type': type_str, 'value': value}\n\
class _Mdl:\n\
    def ret(self, name, value, type_str):\n\
        ret(name, value, type_str)\n\
mdl = _Mdl()\n\
def _taskctx_write_outputs():\n\
    out = os.environ.get('TASKCTX_OUTPUT_JSON')\n\
    if out:\n\
        with open(out, 'w') as handle:\n\
            json.dump(_taskctx_outputs, handle)\n\
atexit.register(_taskctx_write_outputs)\n";

/// Append one generated `ret`/`mdl.ret` call per declared return to `script`,
/// after the preamble that defines it. Each value expression is substituted
/// through the same `${...}` resolver as the script body and then embedded
/// unquoted, so the literal text after substitution is evaluated by the
/// interpreter at run time rather than computed here.
fn with_return_preamble(
    version: &ActionVersion,
    ctx: &crate::ast::ExpansionContext,
    key: &ActionKey,
) -> RunnerResult<ActionVersion> {
    let preamble = match version.language {
        Language::Bash => RET_BASH_PREAMBLE,
        Language::Python => RET_PYTHON_PREAMBLE,
    };
    let mut trailer = String::new();
    for decl in &version.returns {
        let rendered = resolve_return(&decl.value_expression, ctx, key)?;
        match version.language {
            Language::Bash => {
                trailer.push_str(&format!("\nret \"{}:{}={}\"\n", decl.name, decl.value_type.as_str(), rendered));
            }
            Language::Python => {
                trailer.push_str(&format!(
                    "\nmdl.ret({:?}, {}, {:?})\n",
                    decl.name,
                    rendered,
                    decl.value_type.as_str()
                ));
            }
        }
    }

    let mut with_preamble = version.clone();
    with_preamble.script = format!("{preamble}{}{trailer}", version.script);
    Ok(with_preamble)
}

/// System-variable context available to every `${sys.*}` reference.
fn system_vars() -> FxHashMap<String, String> {
    let mut sys = FxHashMap::default();
    sys.insert("platform".to_string(), crate::ast::Platform::current().as_str().to_string());
    sys.insert("arch".to_string(), std::env::consts::ARCH.to_string());
    sys
}

/// Run every pending soft dependency's retainer in parallel, regardless of
/// `--sequential` — sequential mode bounds node execution concurrency, not
/// this pre-pass. Returns the set of targets whose retainer called `retain()`.
pub async fn resolve_soft_dependencies(
    pending: &[PendingSoftDependency],
    graph: &ActionGraph,
    config: &EngineConfig,
) -> RunnerResult<FxHashSet<ActionKey>> {
    let sys = system_vars();
    let mut set: JoinSet<RunnerResult<(ActionKey, bool)>> = JoinSet::new();

    for dep in pending {
        let Some(retainer_node) = graph.get(&dep.retainer) else { continue };
        let Some(version) = retainer_node.selected_version.clone() else { continue };
        let args = retainer_node.args.clone();
        let flags = retainer_node.flags.clone();
        let env = config.passthrough_env.clone();
        let sys = sys.clone();
        let timeout = config.retainer_timeout;
        let target = dep.target.clone();
        let retainer_key = dep.retainer.clone();

        set.spawn(async move {
            let empty_actions: FxHashMap<String, FxHashMap<String, Value>> = FxHashMap::default();
            let retained_fn = |_: &str| false;
            let ctx = crate::ast::ExpansionContext {
                sys: &sys,
                env: &env,
                args: &args,
                flags: &flags,
                actions: &empty_actions,
                retained: &retained_fn,
            };
            let kept = run_retainer(&retainer_key, &version, &ctx, timeout).await?;
            Ok((target, kept))
        });
    }

    let mut retained = FxHashSet::default();
    while let Some(joined) = set.join_next().await {
        let (target, kept) = joined.map_err(|e| RunnerError::SpawnFailed {
            key: ActionKey::default_context("<retainer-join>"),
            reason: e.to_string(),
        })??;
        if kept {
            retained.insert(target);
        }
    }
    Ok(retained)
}

/// Explicit constructor parameters for one engine run — never a module-level
/// singleton, so two runs (or tests) never see each other's configuration.
pub struct EngineConfig {
    pub project_root: Utf8PathBuf,
    pub run_root: Utf8PathBuf,
    pub passthrough_env: FxHashMap<String, String>,
    pub parallelism: usize,
    pub keep_run_dir: bool,
    /// `make -k` style: when true, a node failure still blocks its own
    /// dependents but does not halt dispatch of unrelated ready nodes. When
    /// false (default), a single failure halts all new dispatch.
    pub suppress_on_fail: bool,
    pub retainer_timeout: Duration,
    pub continue_from: Option<Utf8PathBuf>,
}

enum NodeOutcome {
    Done,
    Restored,
}

struct CompletedNode {
    key: ActionKey,
    result: RunnerResult<NodeOutcome>,
}

/// Run every node of `graph` to completion (or to first failure, per the
/// halt-new-dispatch policy), publishing returns to `outputs` as each node
/// finishes and emitting lifecycle events through `events`.
pub async fn run_graph(
    graph: &ActionGraph,
    document: &ParsedDocument,
    config: &EngineConfig,
    events: Arc<EventBus>,
    outputs: Arc<OutputsTable>,
    cancellation: CancellationToken,
) -> RunnerResult<()> {
    std::fs::create_dir_all(config.run_root.as_std_path())?;

    for node in graph.nodes.values() {
        let Some(action) = document.actions.get(&node.action_name) else { continue };
        for (var, _) in &action.required_env_vars {
            if !config.passthrough_env.contains_key(var) {
                return Err(RunnerError::UnresolvedDependency {
                    key: node.key.clone(),
                    detail: format!("required environment variable '{var}' is not present"),
                });
            }
        }
    }

    let retained_names: FxHashSet<String> = graph.nodes.values().map(|n| n.action_name.clone()).collect();

    // Only count dependencies on nodes that will actually run in this graph.
    // A dependency edge surviving `--continue` restoration still points at a
    // restored node so the expansion context below can resolve it, but that
    // node will never complete here, so it must not hold up dispatch.
    let mut remaining: FxHashMap<ActionKey, usize> = graph
        .nodes
        .iter()
        .map(|(key, node)| {
            let count = node.strong_and_weak_dependency_keys().filter(|target| graph.nodes.contains_key(target)).count();
            (key.clone(), count)
        })
        .collect();

    let mut ready: VecDeque<ActionKey> = sorted_ready(&remaining);
    let mut inflight: JoinSet<CompletedNode> = JoinSet::new();
    let mut stop_dispatch = false;
    let mut first_failure: Option<RunnerError> = None;
    let mut completed = 0usize;
    let total = graph.nodes.len();

    while completed < total {
        while !stop_dispatch
            && !ready.is_empty()
            && inflight.len() < config.parallelism
            && !cancellation.is_cancelled()
        {
            let key = ready.pop_front().unwrap();
            let node = graph.get(&key).expect("ready node must exist in graph").clone();
            let config = config_snapshot(config);
            let events = events.clone();
            let outputs = outputs.clone();
            let retained_names = retained_names.clone();
            let cancellation = cancellation.clone();

            inflight.spawn(async move {
                let result = run_one_node(&key, &node, &config, &events, &outputs, &retained_names, &cancellation).await;
                CompletedNode { key, result }
            });
        }

        if cancellation.is_cancelled() {
            stop_dispatch = true;
        }

        let Some(joined) = inflight.join_next().await else {
            // No in-flight work and nothing ready: either done, or every
            // remaining node is blocked behind a failed dependency.
            break;
        };
        let completed_node = joined.map_err(|e| RunnerError::SpawnFailed {
            key: ActionKey::default_context("<task-join>"),
            reason: e.to_string(),
        })?;
        completed += 1;

        match completed_node.result {
            Ok(_) => {
                if let Some(node) = graph.get(&completed_node.key) {
                    for edge in &node.dependents {
                        if edge.kind.is_soft() {
                            continue;
                        }
                        if let Some(count) = remaining.get_mut(&edge.target) {
                            *count -= 1;
                            if *count == 0 {
                                insert_sorted(&mut ready, edge.target.clone());
                            }
                        }
                    }
                }
            }
            Err(err) => {
                if !config.suppress_on_fail {
                    stop_dispatch = true;
                }
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
    }

    // Drain any tasks still running after the failure that halted dispatch.
    while let Some(joined) = inflight.join_next().await {
        if let Ok(CompletedNode { result: Err(err), .. }) = joined {
            if first_failure.is_none() {
                first_failure = Some(err);
            }
        }
    }

    if let Some(err) = first_failure {
        return Err(err);
    }

    Ok(())
}

fn sorted_ready(remaining: &FxHashMap<ActionKey, usize>) -> VecDeque<ActionKey> {
    let mut ready: Vec<ActionKey> = remaining.iter().filter(|(_, c)| **c == 0).map(|(k, _)| k.clone()).collect();
    ready.sort_by(|a, b| a.action_name.cmp(&b.action_name).then_with(|| a.label().cmp(&b.label())));
    VecDeque::from(ready)
}

fn insert_sorted(queue: &mut VecDeque<ActionKey>, key: ActionKey) {
    let pos = queue.partition_point(|k| {
        k.action_name < key.action_name || (k.action_name == key.action_name && k.label() < key.label())
    });
    queue.insert(pos, key);
}

// A cheap-to-clone snapshot handed into each spawned task. `EngineConfig`
// is immutable for the run's lifetime; cloning the handful of fields a node
// actually needs keeps the task's captured state simple to reason about at
// the cost of one small clone per dispatched node.
fn config_snapshot(config: &EngineConfig) -> EngineSnapshot {
    EngineSnapshot {
        run_root: config.run_root.clone(),
        passthrough_env: config.passthrough_env.clone(),
    }
}

struct EngineSnapshot {
    run_root: Utf8PathBuf,
    passthrough_env: FxHashMap<String, String>,
}

async fn run_one_node(
    key: &ActionKey,
    node: &ActionNode,
    config: &EngineSnapshot,
    events: &EventBus,
    outputs: &OutputsTable,
    retained_names: &FxHashSet<String>,
    cancellation: &CancellationToken,
) -> RunnerResult<NodeOutcome> {
    let Some(version) = &node.selected_version else {
        return Err(RunnerError::NoVersionSelected { key: key.clone() });
    };

    let node_dir = config.run_root.join(rundir::node_dir_name(key));
    std::fs::create_dir_all(node_dir.as_std_path())?;

    events.emit(EventKind::MarkRunning { key: key.clone() });
    let started = Instant::now();
    write_meta(&node_dir, key, NodeStatus::Running, started, None, None, None)?;

    let sys = system_vars();
    let actions_ctx: FxHashMap<String, FxHashMap<String, Value>> = node
        .dependencies
        .iter()
        .filter(|e| !e.kind.is_soft())
        .filter_map(|e| outputs.get(&e.target).map(|v| (e.target.action_name.to_string(), v.into_iter().collect())))
        .collect();
    let retained_names = retained_names.clone();
    let retained = move |name: &str| retained_names.contains(name);
    let ctx = crate::ast::ExpansionContext {
        sys: &sys,
        env: &config.passthrough_env,
        args: &node.args,
        flags: &node.flags,
        actions: &actions_ctx,
        retained: &retained,
    };

    let with_returns = with_return_preamble(version, &ctx, key)?;
    let prepared = prepare_script(&node_dir, &with_returns, &ctx, key)?;
    let output_json_path = node_dir.join("output.json");

    let mut command = Command::new(&prepared.command[0]);
    command.args(&prepared.command[1..]);
    command.current_dir(node_dir.as_std_path());
    command.env("TASKCTX_OUTPUT_JSON", output_json_path.as_str());
    for (k, v) in &config.passthrough_env {
        command.env(k, v);
    }

    let stdout_path = node_dir.join("stdout.log");
    let stderr_path = node_dir.join("stderr.log");
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());

    let mut child = command.spawn().map_err(|e| RunnerError::SpawnFailed { key: key.clone(), reason: e.to_string() })?;
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let output = tokio::select! {
        result = wait_with_output(child, stdout, stderr, &stdout_path, &stderr_path) => result?,
        _ = cancellation.cancelled() => {
            return Err(RunnerError::Cancelled { key: key.clone() });
        }
    };

    let duration = started.elapsed();

    if !output.status.success() {
        let status = output.status.code().unwrap_or(-1);
        write_meta(&node_dir, key, NodeStatus::Failed, started, Some(duration), Some(status), None)?;
        events.emit(EventKind::MarkFailed {
            key: key.clone(),
            reason: format!("exit status {status}"),
        });
        return Err(RunnerError::ScriptNonZeroExit { key: key.clone(), status });
    }

    if !output_json_path.as_std_path().exists() {
        let variable = version.returns.first().map(|d| d.name.clone()).unwrap_or_default();
        write_meta(&node_dir, key, NodeStatus::Failed, started, Some(duration), Some(0), None)?;
        events.emit(EventKind::MarkFailed { key: key.clone(), reason: "no output.json generated".into() });
        return Err(RunnerError::MissingOutput { key: key.clone(), variable });
    }
    let content = std::fs::read_to_string(output_json_path.as_std_path())?;
    let produced: OutputDoc = serde_json::from_str(&content)?;

    let mut raw_returns = std::collections::HashMap::new();
    let mut typed_returns = std::collections::HashMap::new();
    for decl in &version.returns {
        let Some(typed) = produced.returns.get(&decl.name) else {
            write_meta(&node_dir, key, NodeStatus::Failed, started, Some(duration), Some(0), None)?;
            events.emit(EventKind::MarkFailed {
                key: key.clone(),
                reason: format!("declared return '{}' missing from output.json", decl.name),
            });
            return Err(RunnerError::MissingOutput { key: key.clone(), variable: decl.name.clone() });
        };
        let value = validate_return(&typed.value, decl.value_type, &node_dir, key, &decl.name)?;
        raw_returns.insert(decl.name.clone(), value.clone());
        typed_returns.insert(decl.name.clone(), TypedValue { value_type: decl.value_type, value });
    }

    outputs.publish(key.clone(), raw_returns.clone())?;
    rundir::write_output_atomic(&node_dir, &OutputDoc { returns: typed_returns })?;
    write_meta(&node_dir, key, NodeStatus::Done, started, Some(duration), Some(0), None)?;
    events.emit(EventKind::MarkDone { key: key.clone(), returns: raw_returns });

    Ok(NodeOutcome::Done)
}

async fn wait_with_output(
    mut child: tokio::process::Child,
    mut stdout: tokio::process::ChildStdout,
    mut stderr: tokio::process::ChildStderr,
    stdout_path: &Utf8PathBuf,
    stderr_path: &Utf8PathBuf,
) -> RunnerResult<std::process::Output> {
    use tokio::io::AsyncReadExt;

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let (stdout_result, stderr_result, status) = tokio::join!(
        stdout.read_to_end(&mut stdout_buf),
        stderr.read_to_end(&mut stderr_buf),
        child.wait(),
    );
    stdout_result?;
    stderr_result?;
    let status = status?;

    std::fs::write(stdout_path.as_std_path(), &stdout_buf)?;
    std::fs::write(stderr_path.as_std_path(), &stderr_buf)?;

    Ok(std::process::Output { status, stdout: stdout_buf, stderr: stderr_buf })
}

fn resolve_return(value_expression: &str, ctx: &crate::ast::ExpansionContext, key: &ActionKey) -> RunnerResult<String> {
    let resolver = |path: &str| -> RunnerResult<String> {
        let expansion = crate::ast::Expansion::parse_path(path).ok_or_else(|| RunnerError::UnresolvedDependency {
            key: key.clone(),
            detail: format!("unrecognized reference '${{{path}}}' in return expression"),
        })?;
        expansion.resolve(ctx, key)
    };
    Ok(crate::ast::substitute(value_expression, resolver)?.into_owned())
}

/// Validate a return value the script itself produced in `output.json`. Only
/// `file`/`directory` returns need host-side checking — the interpreter
/// already typed everything else when it wrote the file.
fn validate_return(
    raw_value: &Value,
    value_type: ValueType,
    node_dir: &Utf8PathBuf,
    key: &ActionKey,
    variable: &str,
) -> RunnerResult<Value> {
    if !value_type.is_artifact() {
        return Ok(raw_value.clone());
    }

    let text = raw_value.as_str().unwrap_or_default();
    let path = std::path::Path::new(text.trim());
    let path = if path.is_absolute() { path.to_path_buf() } else { node_dir.as_std_path().join(path) };
    let valid = match value_type {
        ValueType::File => path.is_file(),
        ValueType::Directory => path.is_dir(),
        _ => unreachable!(),
    };
    if !valid {
        return Err(RunnerError::BadArtifact { key: key.clone(), variable: variable.to_string() });
    }
    Ok(Value::String(path.to_string_lossy().into_owned()))
}

#[allow(clippy::too_many_arguments)]
fn write_meta(
    node_dir: &Utf8PathBuf,
    key: &ActionKey,
    status: NodeStatus,
    started: Instant,
    duration: Option<Duration>,
    exit_code: Option<i32>,
    restored_from_run: Option<String>,
) -> RunnerResult<()> {
    let now_unix_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    let started_offset = started.elapsed();
    let started_at_unix_ms = now_unix_ms.saturating_sub(started_offset.as_millis() as u64);

    let meta = Meta {
        action_name: key.action_name.to_string(),
        context: key.context.canonical(),
        status,
        started_at_unix_ms,
        finished_at_unix_ms: duration.map(|_| now_unix_ms),
        duration_seconds: duration.map(|d| d.as_secs_f64()),
        exit_code,
        restored_from_run,
    };
    rundir::write_meta_atomic(node_dir, &meta)
}

/// Restore a node from a prior run directory rather than re-executing it,
/// used by `--continue`. Copies the node's directory wholesale — never a
/// symlink, so a later `--keep-run-dir false` cleanup of the old run can't
/// take the new run's restored data with it. `duration_seconds` is copied
/// verbatim from the prior run's `meta.json`, describing the original
/// execution rather than the near-instant copy.
pub fn restore_node(
    key: &ActionKey,
    prior_run_root: &Utf8PathBuf,
    new_run_root: &Utf8PathBuf,
    outputs: &OutputsTable,
    events: &EventBus,
) -> RunnerResult<()> {
    let dir_name = rundir::node_dir_name(key);
    let prior_dir = prior_run_root.join(&dir_name);
    let new_dir = new_run_root.join(&dir_name);

    copy_dir_recursive(prior_dir.as_std_path(), new_dir.as_std_path())?;

    let mut meta = rundir::read_meta(&new_dir)?;
    let prior_run_id = prior_run_root.file_name().unwrap_or("unknown").to_string();
    meta.status = NodeStatus::Restored;
    meta.restored_from_run = Some(prior_run_id);
    rundir::write_meta_atomic(&new_dir, &meta)?;

    let output_path = new_dir.join("output.json");
    if output_path.as_std_path().exists() {
        let content = std::fs::read_to_string(output_path.as_std_path())?;
        let output: OutputDoc = serde_json::from_str(&content)?;
        let raw_returns = output.returns.into_iter().map(|(name, typed)| (name, typed.value)).collect();
        outputs.publish(key.clone(), raw_returns)?;
    }

    events.emit(EventKind::MarkRestored { key: key.clone() });
    Ok(())
}

fn copy_dir_recursive(from: &std::path::Path, to: &std::path::Path) -> RunnerResult<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ActionVersion, Language, ReturnDeclaration, SourceLocation};
    use crate::context::ContextId;
    use crate::dag::{Edge, EdgeKind};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn loc() -> SourceLocation {
        SourceLocation { file_path: "x.md".into(), line_number: 1, section_name: "x".into() }
    }

    fn key(name: &str) -> ActionKey {
        ActionKey::new(name, ContextId::empty())
    }

    fn bare_node(name: &str, version: Option<ActionVersion>) -> ActionNode {
        ActionNode {
            key: key(name),
            action_name: name.to_string(),
            selected_version: version,
            dependencies: vec![],
            dependents: vec![],
            args: FxHashMap::default(),
            flags: FxHashMap::default(),
        }
    }

    fn bash(script: &str, returns: Vec<ReturnDeclaration>) -> ActionVersion {
        ActionVersion {
            language: Language::Bash,
            script: script.to_string(),
            expansions: vec![],
            returns,
            dependencies: vec![],
            conditions: vec![],
            location: loc(),
        }
    }

    fn engine_config(run_root: Utf8PathBuf) -> EngineConfig {
        EngineConfig {
            project_root: run_root.clone(),
            run_root,
            passthrough_env: FxHashMap::default(),
            parallelism: 2,
            keep_run_dir: true,
            suppress_on_fail: false,
            retainer_timeout: Duration::from_secs(5),
            continue_from: None,
        }
    }

    #[tokio::test]
    async fn successful_two_node_chain_publishes_outputs_in_order() {
        let dir = tempdir().unwrap();
        let run_root = Utf8PathBuf::from_path_buf(dir.path().join("run")).unwrap();
        let config = engine_config(run_root);

        let doc = ParsedDocument::default();
        let build_return = ReturnDeclaration {
            name: "value".into(),
            value_type: ValueType::String,
            value_expression: "ok".into(),
            location: loc(),
        };

        let mut graph = ActionGraph::default();
        graph.nodes.insert(key("build"), bare_node("build", Some(bash("true", vec![build_return]))));
        let mut deploy = bare_node("deploy", Some(bash("true", vec![])));
        deploy.dependencies.push(Edge { target: key("build"), kind: EdgeKind::Strong });
        graph.nodes.insert(key("deploy"), deploy);
        graph.nodes.get_mut(&key("build")).unwrap().dependents.push(Edge { target: key("deploy"), kind: EdgeKind::Strong });
        graph.goals.insert(key("deploy"));

        let events = Arc::new(EventBus::new());
        let outputs = Arc::new(OutputsTable::new());
        let cancellation = CancellationToken::new();

        run_graph(&graph, &doc, &config, events, outputs.clone(), cancellation).await.unwrap();

        assert!(outputs.contains(&key("build")));
        assert!(outputs.contains(&key("deploy")));
    }

    #[tokio::test]
    async fn failing_node_halts_new_dispatch_and_surfaces_error() {
        let dir = tempdir().unwrap();
        let run_root = Utf8PathBuf::from_path_buf(dir.path().join("run")).unwrap();
        let config = engine_config(run_root);

        let doc = ParsedDocument::default();
        let mut graph = ActionGraph::default();
        graph.nodes.insert(key("build"), bare_node("build", Some(bash("exit 1", vec![]))));
        graph.goals.insert(key("build"));

        let events = Arc::new(EventBus::new());
        let outputs = Arc::new(OutputsTable::new());
        let cancellation = CancellationToken::new();

        let err = run_graph(&graph, &doc, &config, events, outputs, cancellation).await.unwrap_err();
        assert!(matches!(err, RunnerError::ScriptNonZeroExit { .. }));
    }

    #[tokio::test]
    async fn int_and_bool_returns_are_typed() {
        let dir = tempdir().unwrap();
        let run_root = Utf8PathBuf::from_path_buf(dir.path().join("run")).unwrap();
        let config = engine_config(run_root);

        let doc = ParsedDocument::default();
        let returns = vec![
            ReturnDeclaration { name: "count".into(), value_type: ValueType::Int, value_expression: "3".into(), location: loc() },
            ReturnDeclaration { name: "ok".into(), value_type: ValueType::Bool, value_expression: "1".into(), location: loc() },
        ];
        let mut graph = ActionGraph::default();
        graph.nodes.insert(key("build"), bare_node("build", Some(bash("true", returns))));
        graph.goals.insert(key("build"));

        let events = Arc::new(EventBus::new());
        let outputs = Arc::new(OutputsTable::new());
        let cancellation = CancellationToken::new();

        run_graph(&graph, &doc, &config, events, outputs.clone(), cancellation).await.unwrap();
        let published = outputs.get(&key("build")).unwrap();
        assert_eq!(published["count"], Value::from(3));
        assert_eq!(published["ok"], Value::Bool(true));
    }

    #[tokio::test]
    async fn return_value_expression_is_evaluated_by_the_script_at_run_time() {
        let dir = tempdir().unwrap();
        let run_root = Utf8PathBuf::from_path_buf(dir.path().join("run")).unwrap();
        let config = engine_config(run_root);

        let doc = ParsedDocument::default();
        let base_return = ReturnDeclaration {
            name: "v".into(),
            value_type: ValueType::Int,
            value_expression: "3".into(),
            location: loc(),
        };
        let doubled_return = ReturnDeclaration {
            name: "r".into(),
            value_type: ValueType::Int,
            value_expression: "$(( ${action.base.v} * 2 ))".into(),
            location: loc(),
        };

        let mut graph = ActionGraph::default();
        graph.nodes.insert(key("base"), bare_node("base", Some(bash("true", vec![base_return]))));
        let mut double = bare_node("double", Some(bash("true", vec![doubled_return])));
        double.dependencies.push(Edge { target: key("base"), kind: EdgeKind::Strong });
        graph.nodes.insert(key("double"), double);
        graph.nodes.get_mut(&key("base")).unwrap().dependents.push(Edge { target: key("double"), kind: EdgeKind::Strong });
        graph.goals.insert(key("double"));

        let events = Arc::new(EventBus::new());
        let outputs = Arc::new(OutputsTable::new());
        let cancellation = CancellationToken::new();

        run_graph(&graph, &doc, &config, events, outputs.clone(), cancellation).await.unwrap();
        let published = outputs.get(&key("double")).unwrap();
        assert_eq!(published["r"], Value::from(6));
    }

    #[tokio::test]
    async fn script_exiting_before_its_declared_return_is_missing_output() {
        let dir = tempdir().unwrap();
        let run_root = Utf8PathBuf::from_path_buf(dir.path().join("run")).unwrap();
        let config = engine_config(run_root);

        let doc = ParsedDocument::default();
        // `exit 0` runs before the generated `ret "v:int=3"` trailer line, so
        // the EXIT trap writes an output.json missing the declared return.
        let returns = vec![ReturnDeclaration {
            name: "v".into(),
            value_type: ValueType::Int,
            value_expression: "3".into(),
            location: loc(),
        }];
        let mut graph = ActionGraph::default();
        graph.nodes.insert(key("build"), bare_node("build", Some(bash("exit 0", returns))));
        graph.goals.insert(key("build"));

        let events = Arc::new(EventBus::new());
        let outputs = Arc::new(OutputsTable::new());
        let cancellation = CancellationToken::new();

        let err = run_graph(&graph, &doc, &config, events, outputs, cancellation).await.unwrap_err();
        assert!(matches!(err, RunnerError::MissingOutput { .. }));
    }
}
