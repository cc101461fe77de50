//! taskctx - context-aware task runner (v0.1)
//!
//! Compiles a declarative action-definition corpus plus a set of CLI goals
//! into a single unified DAG (an [`dag::ActionGraph`]), prunes it against
//! weak/soft dependency semantics, and drives it to completion with a
//! parallel execution engine.
//!
//! ## Module layout
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | Definition-corpus types (`ParsedDocument`, `ActionDefinition`, `Expansion`) and the JSON loader |
//! | [`context`] | Axis/context/action-key identity: `Axis`, `ContextId`, `ActionKey` |
//! | [`dag`] | Graph algebra: compilation, unification, pruning, cycle detection, wildcard expansion, validation |
//! | [`runtime`] | Script preparation, run directories, the retainer executor, and the scheduling engine |
//! | [`store`] | Concurrent outputs table shared across in-flight nodes |
//! | [`event`] | Typed lifecycle event stream for UI/tracing collaborators |
//! | [`config`] | `~/.config/taskctx/config.toml` plus env overrides |
//! | [`error`] | `RunnerError` with stable `TASKCTX-NNN` codes and fix suggestions |

pub mod ast;
pub mod context;
pub mod dag;
pub mod runtime;

pub mod event;
pub mod store;

pub mod config;
pub mod error;

#[cfg(feature = "test-fixtures")]
pub mod test_fixtures;

pub use ast::{
    ActionDefinition, ActionVersion, ArgumentDefinition, Condition, DependencyDeclaration,
    DependencyKind, Expansion, ExpansionContext, FlagDefinition, Language, ParsedDocument,
    ReturnDeclaration, ValueType,
};
pub use context::{ActionKey, Axis, ContextId};
pub use dag::{ActionGraph, ActionNode, CompileInput, Compiler, Invocation};
pub use error::{RunnerError, RunnerResult};
pub use event::{EventBus, EventEmitter, EventKind, NoopEmitter, TracingEmitter};
pub use runtime::{EngineConfig, PreparedScript};
pub use store::OutputsTable;
