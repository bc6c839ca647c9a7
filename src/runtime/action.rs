//! Action capability implemented by integration authors.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::runtime::context::ActionContext;

/// Error type for action implementations
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Failed(String),
}

/// A single executable action for one integration.
///
/// A fresh instance is created for every invocation, so implementations may
/// keep per-invocation state in `self`.
#[async_trait]
pub trait Action: Send {
    /// Run the action against the connection carried by `ctx`.
    async fn execute(&mut self, ctx: &ActionContext, input: Value) -> Result<Value, ActionError>;

    /// Release per-invocation resources.
    ///
    /// Always called after `execute`, whether it succeeded or not.
    async fn finalize(&mut self, _ctx: &ActionContext) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Creates action instances.
pub trait ActionFactory: Send + Sync {
    fn create(&self) -> Box<dyn Action>;
}

/// Plain constructor functions and closures are factories.
impl<F> ActionFactory for F
where
    F: Fn() -> Box<dyn Action> + Send + Sync,
{
    fn create(&self) -> Box<dyn Action> {
        self()
    }
}
