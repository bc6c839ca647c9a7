//! Action runtime.
//!
//! Integration configuration lookup, the action capability, its registry and
//! the dispatcher that runs actions in isolation.

pub mod action;
pub mod action_registry;
pub mod context;
pub mod dispatcher;
pub mod integration_config;

// Re-export key types
pub use action::{Action, ActionError, ActionFactory};
pub use action_registry::ActionRegistry;
pub use context::{ActionContext, ActionLog, HttpResponse};
pub use dispatcher::ActionDispatcher;
pub use integration_config::{IntegrationConfig, IntegrationConfigRegistry};
