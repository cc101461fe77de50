//! Wildcard expander: fans parametric CLI invocations out into the Cartesian
//! product of concrete axis values before compilation.

use rustc_hash::FxHashMap;

use crate::context::Axis;
use crate::error::{RunnerError, RunnerResult};

use super::compiler::Invocation;

fn is_pattern(value: &str) -> bool {
    value.contains('*')
}

fn match_pattern(axis: &Axis, pattern: &str) -> RunnerResult<Vec<String>> {
    let matched: Vec<String> = if pattern == "*" {
        axis.values.clone()
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        axis.values.iter().filter(|v| v.starts_with(prefix)).cloned().collect()
    } else {
        vec![pattern.to_string()]
    };

    if matched.is_empty() {
        return Err(RunnerError::NoMatch {
            axis: axis.name.to_string(),
            pattern: pattern.to_string(),
        });
    }
    Ok(matched)
}

fn axis_or_unknown<'a>(axes: &'a FxHashMap<String, Axis>, name: &str) -> RunnerResult<&'a Axis> {
    axes.get(name).ok_or_else(|| RunnerError::UnknownAxis { axis: name.to_string() })
}

/// Cartesian product over a list of (axis name, candidate values). Empty
/// input yields a single empty assignment — the identity case.
fn cartesian_product(patterns: &[(String, Vec<String>)]) -> Vec<FxHashMap<String, String>> {
    let mut combos = vec![FxHashMap::default()];
    for (name, values) in patterns {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

/// Split each invocation's axes into concrete values and pattern candidates,
/// then Cartesian-multiply with the global patterns (which distribute across
/// every invocation) to produce the fully concrete invocation list, plus the
/// remaining concrete global axes.
pub fn expand_wildcards(
    axes: &FxHashMap<String, Axis>,
    global_axes: &FxHashMap<String, String>,
    invocations: &[Invocation],
) -> RunnerResult<(FxHashMap<String, String>, Vec<Invocation>)> {
    let mut concrete_global = FxHashMap::default();
    let mut global_patterns: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in global_axes {
        if is_pattern(value) {
            let axis = axis_or_unknown(axes, name)?;
            global_patterns.push((name.clone(), match_pattern(axis, value)?));
        } else {
            concrete_global.insert(name.clone(), value.clone());
        }
    }

    let mut expanded = Vec::new();
    for invocation in invocations {
        let mut concrete_axes = FxHashMap::default();
        let mut patterns = global_patterns.clone();
        for (name, value) in &invocation.axes {
            if is_pattern(value) {
                let axis = axis_or_unknown(axes, name)?;
                patterns.push((name.clone(), match_pattern(axis, value)?));
            } else {
                concrete_axes.insert(name.clone(), value.clone());
            }
        }

        for combo in cartesian_product(&patterns) {
            let mut axes_for_combo = concrete_axes.clone();
            axes_for_combo.extend(combo);
            expanded.push(Invocation {
                action_name: invocation.action_name.clone(),
                axes: axes_for_combo,
                args: invocation.args.clone(),
                flags: invocation.flags.clone(),
            });
        }
    }

    Ok((concrete_global, expanded))
}
