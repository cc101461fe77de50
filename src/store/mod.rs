//! Outputs table: the single source of truth for published action returns.
//!
//! Every node publishes its declared returns exactly once, after its script
//! exits zero and its return values have been parsed. Dependents read from
//! here via [`ExpansionContext::actions`](crate::ast::ExpansionContext), keyed
//! by the action name as it appears in the script body rather than by the
//! full [`ActionKey`] — two sibling contexts never share a script, so the
//! name alone disambiguates within a single node's view.

use dashmap::DashMap;
use serde_json::Value;

use crate::context::ActionKey;
use crate::error::{RunnerError, RunnerResult};

/// Concurrent, write-once-per-key store of published action returns.
#[derive(Debug, Default)]
pub struct OutputsTable {
    entries: DashMap<ActionKey, std::collections::HashMap<String, Value>>,
}

impl OutputsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `key`'s returns. Fails if `key` has already published — the
    /// engine never re-runs a node within a single invocation, so a second
    /// publish attempt means a scheduling bug, not a legitimate overwrite.
    pub fn publish(&self, key: ActionKey, returns: std::collections::HashMap<String, Value>) -> RunnerResult<()> {
        if self.entries.contains_key(&key) {
            return Err(RunnerError::UnresolvedDependency {
                key: key.clone(),
                detail: "outputs already published for this action".into(),
            });
        }
        self.entries.insert(key, returns);
        Ok(())
    }

    pub fn get(&self, key: &ActionKey) -> Option<std::collections::HashMap<String, Value>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextId;

    fn key(name: &str) -> ActionKey {
        ActionKey::new(name, ContextId::empty())
    }

    #[test]
    fn publish_then_get_round_trips() {
        let table = OutputsTable::new();
        let mut returns = std::collections::HashMap::new();
        returns.insert("path".to_string(), Value::String("/tmp/out".into()));
        table.publish(key("build"), returns.clone()).unwrap();
        assert_eq!(table.get(&key("build")), Some(returns));
    }

    #[test]
    fn double_publish_for_the_same_key_is_rejected() {
        let table = OutputsTable::new();
        table.publish(key("build"), std::collections::HashMap::new()).unwrap();
        let err = table.publish(key("build"), std::collections::HashMap::new()).unwrap_err();
        assert!(matches!(err, RunnerError::UnresolvedDependency { .. }));
    }

    #[test]
    fn missing_key_returns_none() {
        let table = OutputsTable::new();
        assert!(table.get(&key("missing")).is_none());
    }
}
