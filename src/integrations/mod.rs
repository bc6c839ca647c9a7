//! Built-in action implementations.
//!
//! Every action shipped with the server is registered here at startup.

pub mod slack;

use crate::runtime::{Action, ActionRegistry};

/// Register all built-in actions.
pub fn register_builtin_actions(registry: &mut ActionRegistry) {
    registry.register("slack", "notify", || {
        Box::new(slack::SlackNotify::default()) as Box<dyn Action>
    });
}

/// A registry containing only the built-in actions.
pub fn builtin_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    register_builtin_actions(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_contains_slack_notify() {
        let registry = builtin_registry();
        assert!(registry.has_action("slack", "notify"));
    }
}
