//! Compiler: turns (definitions, invocations) into a single unified ActionGraph.
//!
//! Each invocation is compiled into its own per-invocation graph under a
//! context computed from merged global/per-invocation axes, then all
//! per-invocation graphs are unified by ActionKey.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::ast::{DependencyKind, ParsedDocument, Platform};
use crate::context::{ActionKey, ContextId};
use crate::error::{RunnerError, RunnerResult};

use super::node::{nodes_compatible, ActionGraph, ActionNode, Edge, EdgeKind};

/// One user-requested goal with its own args/flags/axes.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub action_name: String,
    pub axes: FxHashMap<String, String>,
    pub args: FxHashMap<String, Value>,
    pub flags: FxHashMap<String, bool>,
}

/// Everything the compiler needs: the definition corpus plus a sequence of
/// invocations with their global overrides.
pub struct CompileInput<'a> {
    pub document: &'a ParsedDocument,
    pub invocations: &'a [Invocation],
    pub global_axes: FxHashMap<String, String>,
    pub global_args: FxHashMap<String, Value>,
    pub global_flags: FxHashMap<String, bool>,
}

struct ResolvedInvocation {
    action_name: String,
    context: ContextId,
    axis_values: FxHashMap<String, String>,
    args: FxHashMap<String, Value>,
    flags: FxHashMap<String, bool>,
}

pub struct Compiler<'a> {
    document: &'a ParsedDocument,
    platform: Platform,
}

impl<'a> Compiler<'a> {
    pub fn new(document: &'a ParsedDocument) -> Self {
        Self {
            document,
            platform: Platform::current(),
        }
    }

    pub fn compile(&self, input: &CompileInput<'a>) -> RunnerResult<ActionGraph> {
        if input.invocations.is_empty() {
            return Err(RunnerError::MalformedCli {
                detail: "no goals supplied".into(),
            });
        }

        let resolved = self.resolve_invocations(input)?;

        let mut graphs = Vec::with_capacity(resolved.len());
        for invocation in &resolved {
            graphs.push(self.build_invocation_graph(invocation)?);
        }

        unify(graphs)
    }

    fn resolve_invocations(&self, input: &CompileInput<'a>) -> RunnerResult<Vec<ResolvedInvocation>> {
        input
            .invocations
            .iter()
            .map(|invocation| {
                let mut merged_axes = input.global_axes.clone();
                for (name, value) in &invocation.axes {
                    if let Some(existing) = merged_axes.get(name) {
                        if existing != value {
                            return Err(RunnerError::MalformedCli {
                                detail: format!(
                                    "axis '{name}' assigned both '{existing}' (global) and '{value}' (per-invocation)"
                                ),
                            });
                        }
                    }
                    merged_axes.insert(name.clone(), value.clone());
                }

                for (name, axis) in &self.document.axes {
                    merged_axes
                        .entry(name.clone())
                        .or_insert_with(|| axis.default.clone().unwrap_or_default());
                }

                let context = ContextId::from_pairs(
                    merged_axes.iter().map(|(k, v)| (k.clone(), v.clone())),
                );

                let mut args = input.global_args.clone();
                args.extend(invocation.args.clone());
                for (name, def) in &self.document.arguments {
                    if !args.contains_key(name) {
                        if let Some(default) = &def.default {
                            args.insert(name.clone(), Value::String(default.clone()));
                        }
                    }
                }

                let mut flags = input.global_flags.clone();
                flags.extend(invocation.flags.clone());
                for name in self.document.flags.keys() {
                    flags.entry(name.clone()).or_insert(false);
                }

                Ok(ResolvedInvocation {
                    action_name: invocation.action_name.clone(),
                    context,
                    axis_values: merged_axes,
                    args,
                    flags,
                })
            })
            .collect()
    }

    fn reduced_key(&self, action_name: &str, full_context: &ContextId) -> ActionKey {
        let reduced = match self.document.actions.get(action_name) {
            Some(def) => full_context.reduce_to_axes(&def.required_axes()),
            None => ContextId::empty(),
        };
        ActionKey::new(action_name, reduced)
    }

    fn build_invocation_graph(&self, invocation: &ResolvedInvocation) -> RunnerResult<ActionGraph> {
        if !self.document.actions.contains_key(&invocation.action_name) {
            return Err(RunnerError::UnknownGoal {
                goal: invocation.action_name.clone(),
            });
        }

        let mut nodes: FxHashMap<ActionKey, ActionNode> = FxHashMap::default();

        for (action_name, action) in &self.document.actions {
            let key = self.reduced_key(action_name, &invocation.context);
            let selected_version = action.select_version(&invocation.axis_values, self.platform).cloned();

            let mut dependencies = Vec::new();
            if let Some(version) = &selected_version {
                for expansion in &version.expansions {
                    if let Some(dep_name) = expansion.dependency_action() {
                        let dep_key = self.reduced_key(dep_name, &invocation.context);
                        let kind = match expansion {
                            crate::ast::Expansion::WeakActionOutput { .. } => EdgeKind::Weak,
                            _ => EdgeKind::Strong,
                        };
                        dependencies.push(Edge { target: dep_key, kind });
                    }
                }

                for decl in &version.dependencies {
                    let dep_key = self.reduced_key(&decl.action_name, &invocation.context);
                    let kind = match &decl.kind {
                        DependencyKind::Strong => EdgeKind::Strong,
                        DependencyKind::Weak => EdgeKind::Weak,
                        DependencyKind::Soft { retainer_action } => {
                            let retainer_key = self.reduced_key(retainer_action, &invocation.context);
                            EdgeKind::Soft { retainer: retainer_key }
                        }
                    };
                    dependencies.push(Edge { target: dep_key, kind });
                }
            }

            nodes.insert(
                key.clone(),
                ActionNode {
                    key,
                    action_name: action_name.clone(),
                    selected_version,
                    dependencies,
                    dependents: Vec::new(),
                    args: invocation.args.clone(),
                    flags: invocation.flags.clone(),
                },
            );
        }

        // Populate reverse edges symmetrically.
        let reverse: Vec<(ActionKey, Edge)> = nodes
            .values()
            .flat_map(|node| {
                node.dependencies.iter().filter_map(move |edge| {
                    nodes.contains_key(&edge.target).then(|| {
                        (
                            edge.target.clone(),
                            Edge {
                                target: node.key.clone(),
                                kind: edge.kind.clone(),
                            },
                        )
                    })
                })
            })
            .collect();
        for (target, dependent_edge) in reverse {
            if let Some(node) = nodes.get_mut(&target) {
                node.dependents.push(dependent_edge);
            }
        }

        let goal_key = self.reduced_key(&invocation.action_name, &invocation.context);
        Ok(ActionGraph {
            nodes,
            goals: FxHashSet::from_iter([goal_key]),
        })
    }
}

fn unify(graphs: Vec<ActionGraph>) -> RunnerResult<ActionGraph> {
    let mut unified_nodes: FxHashMap<ActionKey, ActionNode> = FxHashMap::default();
    let mut unified_goals: FxHashSet<ActionKey> = FxHashSet::default();

    for graph in graphs {
        unified_goals.extend(graph.goals);

        for (key, node) in graph.nodes {
            match unified_nodes.get_mut(&key) {
                None => {
                    unified_nodes.insert(key, node);
                }
                Some(existing) => {
                    if !nodes_compatible(existing, &node) {
                        return Err(RunnerError::ConflictingDefinitions { key: key.clone() });
                    }
                    merge_edges(&mut existing.dependencies, node.dependencies);
                    merge_edges(&mut existing.dependents, node.dependents);
                }
            }
        }
    }

    Ok(ActionGraph {
        nodes: unified_nodes,
        goals: unified_goals,
    })
}

fn merge_edges(into: &mut Vec<Edge>, from: Vec<Edge>) {
    for edge in from {
        if !into.contains(&edge) {
            into.push(edge);
        }
    }
}
