//! Execution runtime: language-specific script preparation, run directory
//! layout, retainer execution, and the scheduling engine that drives a
//! pruned [`crate::dag::ActionGraph`] to completion.

pub mod executor;
pub mod language;
pub mod retainer;
pub mod rundir;

pub use executor::{resolve_soft_dependencies, restore_node, run_graph, EngineConfig};
pub use language::{prepare_script, PreparedScript};
pub use retainer::run_retainer;
pub use rundir::{latest_run, new_run_id, node_dir_name, runs_root, Meta, NodeStatus, OutputDoc, TypedValue};
