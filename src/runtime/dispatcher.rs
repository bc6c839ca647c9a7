//! Action dispatch.
//!
//! Resolves the action for (integration, action name), runs it against a
//! connection and turns every failure mode of integration-supplied code
//! (errors, panics, timeouts) into `ServerError::ActionExecutionFailed`.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

use crate::connections::Connection;
use crate::error::{Result, ServerError};
use crate::runtime::action::{Action, ActionError};
use crate::runtime::action_registry::ActionRegistry;
use crate::runtime::context::ActionContext;
use crate::runtime::integration_config::IntegrationConfig;

pub struct ActionDispatcher {
    actions: ActionRegistry,
    http: reqwest::Client,
    timeout: Option<Duration>,
}

impl ActionDispatcher {
    pub fn new(actions: ActionRegistry) -> Self {
        Self {
            actions,
            http: reqwest::Client::new(),
            timeout: None,
        }
    }

    /// Bound the execute and finalize steps, each separately. `None` lets
    /// actions run indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `action_name` for the connection's integration.
    ///
    /// Finalize always runs once an instance exists; its failures are logged
    /// and never replace the execute result.
    ///
    /// # Errors
    /// * `ActionNotFound` - nothing registered for (integration, action)
    /// * `ActionExecutionFailed` - construction, execution or timeout failure
    pub async fn dispatch(
        &self,
        integration_config: &IntegrationConfig,
        connection: &Connection,
        action_name: &str,
        input: Value,
    ) -> Result<Value> {
        let factory = self.actions.resolve(&connection.integration, action_name)?;

        let failed = |message: String| ServerError::ActionExecutionFailed {
            action: action_name.to_string(),
            message,
        };

        let mut action: Box<dyn Action> =
            std::panic::catch_unwind(AssertUnwindSafe(|| factory.create()))
                .map_err(|panic| failed(format!("action construction panicked: {}", panic_message(&panic))))?;

        let ctx = ActionContext::new(
            action_name,
            integration_config.clone(),
            connection.clone(),
            self.http.clone(),
        );

        tracing::debug!(
            integration = %connection.integration,
            action = action_name,
            connection_id = %connection.id,
            "Executing action"
        );

        let execution = AssertUnwindSafe(action.execute(&ctx, input)).catch_unwind();
        let outcome = match within(self.timeout, execution).await {
            Some(outcome) => outcome,
            None => Ok(Err(ActionError::Failed(format!(
                "timed out after {:?}",
                self.timeout.unwrap_or_default()
            )))),
        };

        let result = match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(panic) => Err(failed(format!("action panicked: {}", panic_message(&panic)))),
        };

        let finalization = AssertUnwindSafe(action.finalize(&ctx)).catch_unwind();
        match within(self.timeout, finalization).await {
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => tracing::error!(action = action_name, "Action finalize failed: {}", e),
            None => tracing::error!(
                action = action_name,
                "Action finalize timed out after {:?}",
                self.timeout.unwrap_or_default()
            ),
            Some(Err(panic)) => tracing::error!(
                action = action_name,
                "Action finalize panicked: {}",
                panic_message(&panic)
            ),
        }
        ctx.log().flush();

        match &result {
            Ok(output) => tracing::debug!(action = action_name, "Result from action: {}", output),
            Err(e) => tracing::warn!(action = action_name, "{}", e),
        }

        result
    }
}

/// Await `fut`, giving up after `limit` when one is set.
async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
