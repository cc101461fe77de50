//! Graph algebra: retention closure, pruning, topological sort, cycle detection.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::ActionKey;
use crate::error::{RunnerError, RunnerResult};

use super::node::{ActionGraph, EdgeKind};

/// Strong-edge-only reachability closure from `seeds`.
fn strong_closure(graph: &ActionGraph, seeds: impl IntoIterator<Item = ActionKey>) -> FxHashSet<ActionKey> {
    let mut retained: FxHashSet<ActionKey> = FxHashSet::default();
    let mut queue: Vec<ActionKey> = Vec::new();
    for seed in seeds {
        if retained.insert(seed.clone()) {
            queue.push(seed);
        }
    }
    while let Some(key) = queue.pop() {
        let Some(node) = graph.get(&key) else { continue };
        for target in node.strong_dependency_keys() {
            if retained.insert(target.clone()) {
                queue.push(target.clone());
            }
        }
    }
    retained
}

/// A soft edge (source, target, retainer) whose target is not yet retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSoftDependency {
    pub source: ActionKey,
    pub target: ActionKey,
    pub retainer: ActionKey,
}

pub struct PrunePhase1Result {
    pub retained: FxHashSet<ActionKey>,
    pub pending_soft: Vec<PendingSoftDependency>,
}

/// Phase 1/2: strong-only closure from the goals, then the set of pending
/// soft dependencies whose target fell outside that closure.
pub fn prune_phase_1(graph: &ActionGraph) -> PrunePhase1Result {
    let retained = strong_closure(graph, graph.goals.iter().cloned());

    let mut pending_soft = Vec::new();
    for node in graph.nodes.values() {
        for edge in node.pending_soft_edges() {
            let EdgeKind::Soft { retainer } = &edge.kind else { unreachable!() };
            if !retained.contains(&edge.target) {
                pending_soft.push(PendingSoftDependency {
                    source: node.key.clone(),
                    target: edge.target.clone(),
                    retainer: retainer.clone(),
                });
            }
        }
    }

    PrunePhase1Result { retained, pending_soft }
}

/// Phase 3: recompute retention once retainer verdicts are known, then build
/// the final pruned graph. Weak edges survive only when both endpoints do.
pub fn prune_to_goals(
    graph: &ActionGraph,
    retained_soft_targets: &FxHashSet<ActionKey>,
) -> ActionGraph {
    let mut retained = strong_closure(graph, graph.goals.iter().cloned());
    retained.extend(strong_closure(graph, retained_soft_targets.iter().cloned()));

    let mut nodes = FxHashMap::default();
    for (key, node) in &graph.nodes {
        if !retained.contains(key) {
            continue;
        }
        let mut pruned = node.clone();
        pruned.dependencies.retain(|edge| match &edge.kind {
            EdgeKind::Strong => retained.contains(&edge.target),
            EdgeKind::Weak => retained.contains(&edge.target),
            EdgeKind::Soft { .. } => retained.contains(&edge.target),
        });
        pruned.dependents.retain(|edge| retained.contains(&edge.target));
        nodes.insert(key.clone(), pruned);
    }

    ActionGraph {
        nodes,
        goals: graph.goals.iter().filter(|k| retained.contains(*k)).cloned().collect(),
    }
}

/// Kahn's algorithm over all surviving strong+weak edges, ties broken by
/// action-name for a deterministic order. A non-empty remainder means a cycle.
pub fn topological_sort(graph: &ActionGraph) -> RunnerResult<Vec<ActionKey>> {
    let mut indegree: FxHashMap<ActionKey, usize> =
        graph.nodes.keys().map(|k| (k.clone(), 0)).collect();
    for node in graph.nodes.values() {
        for target in node.strong_and_weak_dependency_keys() {
            if let Some(count) = indegree.get_mut(target) {
                *count += 1;
            }
        }
    }

    // Kahn's walks dependency edges forward (dependency -> dependent) to
    // produce dependencies-before-dependents order, so indegree here counts
    // *dependents* pointing at a node, i.e. how many nodes must run after it
    // still depend on something unresolved. We instead schedule by popping
    // zero-remaining-dependency nodes using the reverse (dependent) view.
    let mut remaining: FxHashMap<ActionKey, usize> = FxHashMap::default();
    for (key, node) in &graph.nodes {
        remaining.insert(key.clone(), node.strong_and_weak_dependency_keys().count());
    }

    let mut ready: Vec<ActionKey> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(k, _)| k.clone())
        .collect();
    ready.sort_by(|a, b| a.action_name.cmp(&b.action_name).then_with(|| a.label().cmp(&b.label())));

    let mut order = Vec::with_capacity(graph.nodes.len());
    let mut ready = std::collections::VecDeque::from(ready);

    while let Some(key) = ready.pop_front() {
        order.push(key.clone());
        let Some(node) = graph.get(&key) else { continue };
        let mut newly_ready = Vec::new();
        for edge in &node.dependents {
            if let Some(count) = remaining.get_mut(&edge.target) {
                *count -= 1;
                if *count == 0 {
                    newly_ready.push(edge.target.clone());
                }
            }
        }
        newly_ready.sort_by(|a, b| a.action_name.cmp(&b.action_name).then_with(|| a.label().cmp(&b.label())));
        for key in newly_ready {
            let pos = ready.partition_point(|k| {
                k.action_name < key.action_name || (k.action_name == key.action_name && k.label() < key.label())
            });
            ready.insert(pos, key);
        }
    }

    if order.len() != graph.nodes.len() {
        let cycle = find_cycle(graph).unwrap_or_default();
        return Err(RunnerError::Cycle { path: cycle });
    }

    Ok(order)
}

/// Depth-first three-color cycle detection, returning a concrete cycle path
/// for error reporting.
pub fn find_cycle(graph: &ActionGraph) -> Option<Vec<ActionKey>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: FxHashMap<ActionKey, Color> =
        graph.nodes.keys().map(|k| (k.clone(), Color::White)).collect();
    let mut stack: Vec<ActionKey> = Vec::new();

    fn visit(
        key: &ActionKey,
        graph: &ActionGraph,
        color: &mut FxHashMap<ActionKey, Color>,
        stack: &mut Vec<ActionKey>,
    ) -> Option<Vec<ActionKey>> {
        color.insert(key.clone(), Color::Gray);
        stack.push(key.clone());

        if let Some(node) = graph.get(key) {
            for target in node.strong_and_weak_dependency_keys() {
                match color.get(target).copied().unwrap_or(Color::White) {
                    Color::White => {
                        if let Some(cycle) = visit(target, graph, color, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Gray => {
                        let start = stack.iter().position(|k| k == target).unwrap_or(0);
                        let mut cycle: Vec<ActionKey> = stack[start..].to_vec();
                        cycle.push(target.clone());
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        color.insert(key.clone(), Color::Black);
        None
    }

    let mut keys: Vec<&ActionKey> = graph.nodes.keys().collect();
    keys.sort_by(|a, b| a.label().cmp(&b.label()));
    for key in keys {
        if color.get(key).copied().unwrap_or(Color::White) == Color::White {
            if let Some(cycle) = visit(key, graph, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextId;
    use crate::dag::node::{ActionNode, Edge};
    use rustc_hash::FxHashMap as Map;

    fn key(name: &str) -> ActionKey {
        ActionKey::new(name, ContextId::empty())
    }

    fn bare_node(name: &str) -> ActionNode {
        ActionNode {
            key: key(name),
            action_name: name.to_string(),
            selected_version: None,
            dependencies: vec![],
            dependents: vec![],
            args: Map::default(),
            flags: Map::default(),
        }
    }

    fn link(graph: &mut ActionGraph, from: &str, to: &str, kind: EdgeKind) {
        graph
            .nodes
            .get_mut(&key(from))
            .unwrap()
            .dependencies
            .push(Edge { target: key(to), kind: kind.clone() });
        graph
            .nodes
            .get_mut(&key(to))
            .unwrap()
            .dependents
            .push(Edge { target: key(from), kind });
    }

    // ═══════════════════════════════════════════════════════════════
    // Pruning
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn phase1_retains_only_strong_closure_from_goals() {
        let mut graph = ActionGraph::default();
        for name in ["goal", "strong_dep", "unreachable"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(&mut graph, "goal", "strong_dep", EdgeKind::Strong);
        graph.goals.insert(key("goal"));

        let result = prune_phase_1(&graph);
        assert!(result.retained.contains(&key("goal")));
        assert!(result.retained.contains(&key("strong_dep")));
        assert!(!result.retained.contains(&key("unreachable")));
    }

    #[test]
    fn pending_soft_dependency_surfaces_when_target_not_retained() {
        let mut graph = ActionGraph::default();
        for name in ["goal", "soft_target", "retainer"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(
            &mut graph,
            "goal",
            "soft_target",
            EdgeKind::Soft { retainer: key("retainer") },
        );
        graph.goals.insert(key("goal"));

        let result = prune_phase_1(&graph);
        assert_eq!(result.pending_soft.len(), 1);
        assert_eq!(result.pending_soft[0].target, key("soft_target"));
    }

    #[test]
    fn phase3_retains_soft_target_when_retainer_signals_retention() {
        let mut graph = ActionGraph::default();
        for name in ["goal", "soft_target"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(
            &mut graph,
            "goal",
            "soft_target",
            EdgeKind::Soft { retainer: key("retainer") },
        );
        graph.goals.insert(key("goal"));

        let retained_soft: FxHashSet<ActionKey> = [key("soft_target")].into_iter().collect();
        let pruned = prune_to_goals(&graph, &retained_soft);
        assert!(pruned.nodes.contains_key(&key("soft_target")));
    }

    #[test]
    fn re_pruning_an_already_pruned_graph_is_a_no_op() {
        let mut graph = ActionGraph::default();
        for name in ["goal", "dep"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(&mut graph, "goal", "dep", EdgeKind::Strong);
        graph.goals.insert(key("goal"));

        let empty = FxHashSet::default();
        let once = prune_to_goals(&graph, &empty);
        let twice = prune_to_goals(&once, &empty);
        assert_eq!(once.nodes.len(), twice.nodes.len());
        assert_eq!(once.goals, twice.goals);
    }

    // ═══════════════════════════════════════════════════════════════
    // Topological sort
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn topo_sort_orders_dependencies_before_dependents() {
        let mut graph = ActionGraph::default();
        for name in ["a", "b", "c"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(&mut graph, "a", "b", EdgeKind::Strong);
        link(&mut graph, "b", "c", EdgeKind::Strong);
        graph.goals.insert(key("a"));

        let order = topological_sort(&graph).unwrap();
        let pos = |n: &str| order.iter().position(|k| k.action_name.as_ref() == n).unwrap();
        assert!(pos("c") < pos("b"));
        assert!(pos("b") < pos("a"));
    }

    #[test]
    fn topo_sort_breaks_ties_by_action_name() {
        let mut graph = ActionGraph::default();
        for name in ["zeta", "alpha"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        let order = topological_sort(&graph).unwrap();
        assert_eq!(order[0].action_name.as_ref(), "alpha");
        assert_eq!(order[1].action_name.as_ref(), "zeta");
    }

    #[test]
    fn cyclic_graph_fails_topo_sort_with_cycle_error() {
        let mut graph = ActionGraph::default();
        for name in ["a", "b"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(&mut graph, "a", "b", EdgeKind::Strong);
        link(&mut graph, "b", "a", EdgeKind::Strong);

        let err = topological_sort(&graph).unwrap_err();
        assert!(matches!(err, RunnerError::Cycle { .. }));
    }

    // ═══════════════════════════════════════════════════════════════
    // Cycle detection
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn find_cycle_reports_a_concrete_path() {
        let mut graph = ActionGraph::default();
        for name in ["a", "b"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(&mut graph, "a", "b", EdgeKind::Strong);
        link(&mut graph, "b", "a", EdgeKind::Strong);

        let cycle = find_cycle(&graph).unwrap();
        assert!(cycle.contains(&key("a")));
        assert!(cycle.contains(&key("b")));
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let mut graph = ActionGraph::default();
        for name in ["a", "b"] {
            graph.nodes.insert(key(name), bare_node(name));
        }
        link(&mut graph, "a", "b", EdgeKind::Strong);
        assert!(find_cycle(&graph).is_none());
    }
}
