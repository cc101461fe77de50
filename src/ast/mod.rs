//! Domain model: the definition-corpus types the compiler consumes.
//!
//! Everything here is already-parsed data handed in by the markup parser
//! collaborator (out of scope) — this module owns no parsing logic, only
//! the shapes and the pure per-value operations (version selection, axis
//! requirement computation, expansion resolution) that the compiler and
//! validator build on.

pub mod definitions;
pub mod expansion;
pub mod loader;
pub mod types;

pub use definitions::{
    ActionDefinition, ActionVersion, ArgumentDefinition, Condition, DependencyDeclaration,
    DependencyKind, FlagDefinition, Language, ParsedDocument, ReturnDeclaration,
};
pub use expansion::{substitute, Expansion, ExpansionContext};
pub use loader::{load_file, load_str};
pub use types::{Platform, SourceLocation, ValueType};
