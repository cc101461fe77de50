//! Context & key model: the identity of a contextualized action instance.
//!
//! A [`ContextId`] is the canonical, order-independent identity of an execution
//! world: a sorted set of (axis, value) pairs. Two contexts with the same pairs
//! are the same context regardless of the order they were built in — sorting at
//! construction time is what makes equality, hashing, and serialization agree.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A named finite domain of string values, with at most one marked default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    pub name: Arc<str>,
    pub values: Vec<String>,
    pub default: Option<String>,
}

impl Axis {
    pub fn new(name: impl Into<Arc<str>>, values: Vec<String>, default: Option<String>) -> Self {
        Self {
            name: name.into(),
            values,
            default,
        }
    }

    pub fn is_valid_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Sorted, canonical (axis, value) pairs identifying an execution context.
///
/// The empty context is the *default* context, serializing to the literal
/// string `"default"`. Equality and hashing are purely structural over the
/// sorted pairs — there is no hidden interning registry backing identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContextId {
    axis_values: Vec<(Arc<str>, Arc<str>)>,
}

impl ContextId {
    /// The context with no axis values — the shared default world.
    pub fn empty() -> Self {
        Self {
            axis_values: Vec::new(),
        }
    }

    /// Build a ContextId from an unordered map of axis name -> value, sorting
    /// by axis name so that equal inputs always produce byte-equal identity.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arc<str>>,
        V: Into<Arc<str>>,
    {
        let mut axis_values: Vec<(Arc<str>, Arc<str>)> =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        axis_values.sort_by(|a, b| a.0.cmp(&b.0));
        Self { axis_values }
    }

    pub fn is_empty(&self) -> bool {
        self.axis_values.is_empty()
    }

    pub fn get(&self, axis_name: &str) -> Option<&str> {
        self.axis_values
            .iter()
            .find(|(name, _)| name.as_ref() == axis_name)
            .map(|(_, value)| value.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.axis_values.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    /// Restrict this context to the given subset of axis names. Reduction is
    /// monotone: reducing to a subset of axes never depends on axis values
    /// outside that subset, so `reduce(reduce(c, B), A) == reduce(c, A)` for
    /// any `A ⊆ B`.
    pub fn reduce_to_axes(&self, axis_names: &FxHashSet<Arc<str>>) -> Self {
        let axis_values = self
            .axis_values
            .iter()
            .filter(|(name, _)| axis_names.contains(name))
            .cloned()
            .collect();
        Self { axis_values }
    }

    /// Canonical string form: `axis1:value1+axis2:value2`, or `default` if empty.
    pub fn canonical(&self) -> String {
        if self.axis_values.is_empty() {
            return "default".to_string();
        }
        self.axis_values
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// (action name, ContextId) — the identity used throughout the graph.
///
/// String form is `<ContextId>#<action-name>`, matching the run-directory
/// label format before any truncation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub action_name: Arc<str>,
    pub context: ContextId,
}

impl ActionKey {
    pub fn new(action_name: impl Into<Arc<str>>, context: ContextId) -> Self {
        Self {
            action_name: action_name.into(),
            context,
        }
    }

    /// An ActionKey under the empty (default) context.
    pub fn default_context(action_name: impl Into<Arc<str>>) -> Self {
        Self::new(action_name, ContextId::empty())
    }

    pub fn label(&self) -> String {
        format!("{}#{}", self.context, self.action_name)
    }

    /// Purely cosmetic short identity for log/table legibility. Derived from
    /// the canonical label, never from anything else, and never consulted
    /// for equality or hashing.
    pub fn short_id(&self) -> String {
        let digest = Sha256::digest(self.label().as_bytes());
        digest[..3].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// A stable single-character symbol paired with [`short_id`], chosen by
    /// indexing a fixed palette with the short id's leading byte.
    pub fn symbol(&self) -> char {
        const PALETTE: &[char] = &[
            '●', '◆', '■', '▲', '▶', '★', '◼', '✦', '◉', '✚', '✪', '✳', '◈', '✤', '✜', '✶',
        ];
        let digest = Sha256::digest(self.label().as_bytes());
        PALETTE[digest[0] as usize % PALETTE.len()]
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
