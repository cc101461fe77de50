//! Graph node and edge types.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::ast::{ActionVersion, Condition};
use crate::context::ActionKey;

/// A dependency edge's classification: a tagged sum type, never a pair of
/// booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    Strong,
    Weak,
    Soft { retainer: ActionKey },
}

impl EdgeKind {
    pub fn is_weak(&self) -> bool {
        matches!(self, EdgeKind::Weak)
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, EdgeKind::Soft { .. })
    }
}

/// An edge to `target`, classified by [`EdgeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub target: ActionKey,
    pub kind: EdgeKind,
}

/// ActionKey + selected version + dependency/dependent sets + resolved
/// args/flags. Created by the compiler, mutated only during unification's
/// edge-merging, frozen thereafter.
#[derive(Debug, Clone)]
pub struct ActionNode {
    pub key: ActionKey,
    pub action_name: String,
    /// `None` when no version (or more than one) matches the full axis
    /// assignment; surfaced by the validator only if the node is retained.
    pub selected_version: Option<ActionVersion>,
    pub dependencies: Vec<Edge>,
    pub dependents: Vec<Edge>,
    pub args: FxHashMap<String, Value>,
    pub flags: FxHashMap<String, bool>,
}

impl ActionNode {
    pub fn strong_dependency_keys(&self) -> impl Iterator<Item = &ActionKey> {
        self.dependencies
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Strong))
            .map(|e| &e.target)
    }

    pub fn strong_and_weak_dependency_keys(&self) -> impl Iterator<Item = &ActionKey> {
        self.dependencies
            .iter()
            .filter(|e| !e.kind.is_soft())
            .map(|e| &e.target)
    }

    pub fn pending_soft_edges(&self) -> impl Iterator<Item = &Edge> {
        self.dependencies.iter().filter(|e| e.kind.is_soft())
    }
}

/// Two nodes sharing an ActionKey are mergeable iff they name the same action
/// and selected the same version (by condition set) — everything else is a
/// mergeable edge delta.
pub fn nodes_compatible(a: &ActionNode, b: &ActionNode) -> bool {
    if a.action_name != b.action_name {
        return false;
    }
    match (&a.selected_version, &b.selected_version) {
        (None, None) => true,
        (Some(va), Some(vb)) => same_conditions(&va.conditions, &vb.conditions),
        _ => false,
    }
}

fn same_conditions(a: &[Condition], b: &[Condition]) -> bool {
    let sa: FxHashSet<&Condition> = a.iter().collect();
    let sb: FxHashSet<&Condition> = b.iter().collect();
    sa == sb
}

/// ActionKey → ActionNode, plus the set of goal keys. Rebuilt wholesale by
/// each pruning pass; never mutated in place after publication.
#[derive(Debug, Clone, Default)]
pub struct ActionGraph {
    pub nodes: FxHashMap<ActionKey, ActionNode>,
    pub goals: FxHashSet<ActionKey>,
}

impl ActionGraph {
    pub fn get(&self, key: &ActionKey) -> Option<&ActionNode> {
        self.nodes.get(key)
    }

    /// BFS reachability: is there a strong+weak path from `from` to `to`?
    pub fn has_path(&self, from: &ActionKey, to: &ActionKey) -> bool {
        if from == to {
            return true;
        }
        let mut visited: FxHashSet<&ActionKey> = FxHashSet::default();
        let mut queue = vec![from];
        visited.insert(from);
        while let Some(current) = queue.pop() {
            let Some(node) = self.nodes.get(current) else { continue };
            for edge in &node.dependents {
                if edge.target == *to {
                    return true;
                }
                if visited.insert(&edge.target) {
                    queue.push(&edge.target);
                }
            }
        }
        false
    }
}
