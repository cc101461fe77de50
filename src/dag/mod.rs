//! DAG types and algorithms: graph algebra, multi-context compilation,
//! pruning, wildcard goal expansion, and the post-compile validator.

pub mod compiler;
pub mod node;
pub mod prune;
pub mod validate;
pub mod wildcard;

pub use compiler::{CompileInput, Compiler, Invocation};
pub use node::{nodes_compatible, ActionGraph, ActionNode, Edge, EdgeKind};
pub use prune::{find_cycle, prune_phase_1, prune_to_goals, topological_sort, PendingSoftDependency, PrunePhase1Result};
pub use validate::{validate, ValidationIssue};
pub use wildcard::expand_wildcards;
