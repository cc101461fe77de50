//! taskctx CLI: compiles a definition corpus plus CLI goals into an
//! executable DAG and runs it.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use colored::Colorize;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio_util::sync::CancellationToken;

mod cli;

use cli::Cli;
use taskctx::ast::{load_file, ParsedDocument};
use taskctx::config::RunnerConfig;
use taskctx::context::ActionKey;
use taskctx::dag::{
    expand_wildcards, prune_phase_1, prune_to_goals, topological_sort, validate, ActionGraph,
    CompileInput, Compiler, PendingSoftDependency,
};
use taskctx::error::{FixSuggestion, RunnerError, RunnerResult};
use taskctx::event::{EventBus, TracingEmitter};
use taskctx::runtime::rundir::{self, NodeStatus, OutputDoc};
use taskctx::runtime::{resolve_soft_dependencies, restore_node, run_graph, EngineConfig};
use taskctx::store::OutputsTable;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> RunnerResult<()> {
    let document = load_file(&cli.defs)?;
    let project_root = Utf8PathBuf::from(cli.project_root.clone());
    let config = RunnerConfig::load()?;

    if cli.list {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    let parsed = cli::parse_tokens(&cli.tokens)?;

    let (concrete_global, expanded_invocations) =
        expand_wildcards(&document.axes, &parsed.global_axes, &parsed.invocations)?;

    let input = CompileInput {
        document: &document,
        invocations: &expanded_invocations[..],
        global_axes: concrete_global.clone(),
        global_args: parsed.global_args,
        global_flags: parsed.global_flags,
    };
    let compiled = Compiler::new(&document).compile(&input)?;

    let passthrough_env: FxHashMap<String, String> = document
        .passthrough_env
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|v| (name.clone(), v)))
        .collect();

    let sequential = cli.sequential || config.runner.sequential;
    let keep_run_dir = cli.keep_run_dir || config.runner.keep_run_dir;
    let parallelism = if sequential { 1 } else { config.effective_parallelism() };
    let retainer_timeout = std::time::Duration::from_secs(config.runner.retainer_timeout_secs);

    let run_id = rundir::new_run_id(chrono::Utc::now());
    let run_root = rundir::runs_root(&project_root).join(run_id);

    let engine_config = EngineConfig {
        project_root: project_root.clone(),
        run_root: run_root.clone(),
        passthrough_env,
        parallelism,
        keep_run_dir,
        suppress_on_fail: cli.suppress_on_fail,
        retainer_timeout,
        continue_from: None,
    };

    let phase1 = prune_phase_1(&compiled);

    let retained_soft_targets: FxHashSet<ActionKey> = if cli.dry_run {
        // Dry-run never spawns a subprocess, including retainers; soft
        // dependencies stay undetermined rather than guessed at.
        FxHashSet::default()
    } else {
        resolve_soft_dependencies(&phase1.pending_soft, &compiled, &engine_config).await?
    };

    let pruned = prune_to_goals(&compiled, &retained_soft_targets);

    let axis_values = effective_axis_values(&document, &concrete_global);
    let issues = validate(&pruned, &document, &axis_values);
    if !issues.is_empty() {
        return Err(RunnerError::Validation {
            issues: issues.iter().map(|i| i.to_string()).collect(),
        });
    }

    let order = topological_sort(&pruned)?;

    if cli.dry_run {
        print_dry_run(&order, &phase1.pending_soft);
        return Ok(());
    }

    let mut bus = EventBus::new();
    bus.register(Box::new(TracingEmitter));
    let events = Arc::new(bus);
    let outputs = Arc::new(OutputsTable::new());

    let cancellation = CancellationToken::new();
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.cancel();
            }
        });
    }

    let mut remaining = pruned.clone();
    if cli.continue_run {
        let prior_run_root = rundir::latest_run(&rundir::runs_root(&project_root))?;
        if let Some(prior) = prior_run_root {
            let keys: Vec<ActionKey> = remaining.nodes.keys().cloned().collect();
            let mut restored = FxHashSet::default();
            for key in &keys {
                let prior_node_dir = prior.join(rundir::node_dir_name(key));
                if !prior_node_dir.as_std_path().exists() {
                    continue;
                }
                let Ok(meta) = rundir::read_meta(&prior_node_dir) else { continue };
                if meta.status == NodeStatus::Done {
                    restore_node(key, &prior, &run_root, &outputs, &events)?;
                    restored.insert(key.clone());
                }
            }
            strip_restored_nodes(&mut remaining, &restored);
        }
    }

    let run_result = run_graph(&remaining, &document, &engine_config, events.clone(), outputs.clone(), cancellation).await;

    let report = collect_goal_outputs(&pruned, &run_root);
    let rendered = serde_json::to_string_pretty(&report)?;
    println!("{rendered}");
    if let Some(output_path) = &cli.output {
        std::fs::write(output_path, &rendered)?;
    }

    match run_result {
        Ok(()) => {
            if !keep_run_dir {
                let _ = std::fs::remove_dir_all(run_root.as_std_path());
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{} run directory preserved at {}", "Note:".yellow(), run_root);
            Err(err)
        }
    }
}

/// Merge concrete global axis values with each axis's default, giving the
/// validator the same "supplied or defaulted" view it checks conditions against.
fn effective_axis_values(
    document: &ParsedDocument,
    concrete_global: &FxHashMap<String, String>,
) -> FxHashMap<String, String> {
    let mut values = concrete_global.clone();
    for (name, axis) in &document.axes {
        if !values.contains_key(name) {
            if let Some(default) = &axis.default {
                values.insert(name.clone(), default.clone());
            }
        }
    }
    values
}

fn print_dry_run(order: &[ActionKey], pending_soft: &[PendingSoftDependency]) {
    let plan: Vec<String> = order.iter().map(|k| k.label()).collect();
    let pending: Vec<String> = pending_soft.iter().map(|p| p.target.label()).collect();
    let report = serde_json::json!({
        "plan": plan,
        "pending_soft_dependencies": pending,
    });
    println!("{}", serde_json::to_string_pretty(&report).expect("plan serializes"));
}

/// Remove restored nodes from the executable remainder. Dependency edges
/// pointing at a restored node are left in place — `run_graph` already
/// excludes them when seeding its ready-dependency counts (restored nodes
/// never complete inside this run), and the executor still needs those edges
/// to resolve `${action.<restored>.*}` against the outputs the restore step
/// published. Only `dependents` are pruned, since a restored node is never
/// dispatched and so never walks its own dependents list.
fn strip_restored_nodes(graph: &mut ActionGraph, restored: &FxHashSet<ActionKey>) {
    graph.nodes.retain(|key, _| !restored.contains(key));
    for node in graph.nodes.values_mut() {
        node.dependents.retain(|edge| !restored.contains(&edge.target));
    }
    graph.goals.retain(|key| !restored.contains(key));
}

fn collect_goal_outputs(graph: &ActionGraph, run_root: &Utf8Path) -> FxHashMap<String, OutputDoc> {
    let mut report = FxHashMap::default();
    for goal in &graph.goals {
        let output_path = run_root.join(rundir::node_dir_name(goal)).join("output.json");
        let Ok(content) = std::fs::read_to_string(output_path.as_std_path()) else { continue };
        let Ok(output) = serde_json::from_str::<OutputDoc>(&content) else { continue };
        report.insert(goal.label(), output);
    }
    report
}
