//! Registry of action implementations keyed by integration and action name.
//!
//! Populated once at startup; lookups afterwards are read-only.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, ServerError};
use crate::runtime::action::ActionFactory;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<(String, String), Arc<dyn ActionFactory>>,
}

impl ActionRegistry {
    /// Create a new empty action registry
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register an action for an integration.
    ///
    /// Registering the same pair twice replaces the earlier factory.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut registry = ActionRegistry::new();
    /// registry.register("slack", "notify", || Box::new(SlackNotify::default()) as Box<dyn Action>);
    /// ```
    pub fn register(
        &mut self,
        integration: impl Into<String>,
        action: impl Into<String>,
        factory: impl ActionFactory + 'static,
    ) {
        let key = (integration.into(), action.into());
        if self.actions.insert(key.clone(), Arc::new(factory)).is_some() {
            tracing::warn!("Action '{}' for integration '{}' registered twice", key.1, key.0);
        }
    }

    /// Resolve the factory for (integration, action).
    pub fn resolve(&self, integration: &str, action: &str) -> Result<Arc<dyn ActionFactory>> {
        self.actions
            .get(&(integration.to_string(), action.to_string()))
            .cloned()
            .ok_or_else(|| ServerError::ActionNotFound {
                integration: integration.to_string(),
                action: action.to_string(),
            })
    }

    pub fn has_action(&self, integration: &str, action: &str) -> bool {
        self.actions
            .contains_key(&(integration.to_string(), action.to_string()))
    }

    /// All registered (integration, action) pairs, sorted.
    pub fn list_actions(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.actions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn count(&self) -> usize {
        self.actions.len()
    }
}
