//! Execution context handed to an action for one invocation.
//!
//! Carries the integration configuration, the connection (credential and
//! metadata), a diagnostic log scoped to the invocation and an HTTP helper
//! that applies the integration's base URL and authentication.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use serde_json::Value;
use tracing::Level;
use uuid::Uuid;

use crate::connections::Connection;
use crate::runtime::action::ActionError;
use crate::runtime::integration_config::IntegrationConfig;

/// Target used for every event emitted through [`ActionLog`].
pub const ACTION_LOG_TARGET: &str = "nango_server::action";

/// Auth mode that sends the connection's access token as a bearer token.
pub const AUTH_HEADER_TOKEN: &str = "AUTH_HEADER_TOKEN";

/// Diagnostic output sink for a single action invocation.
#[derive(Debug)]
pub struct ActionLog {
    integration: String,
    action: String,
    connection_id: Uuid,
    entries: AtomicUsize,
}

macro_rules! action_event {
    ($log:expr, $level:expr, $msg:expr) => {
        tracing::event!(
            target: ACTION_LOG_TARGET,
            $level,
            integration = %$log.integration,
            action = %$log.action,
            connection_id = %$log.connection_id,
            "{}",
            $msg
        )
    };
}

impl ActionLog {
    pub fn new(integration: &str, action: &str, connection_id: Uuid) -> Self {
        Self {
            integration: integration.to_string(),
            action: action.to_string(),
            connection_id,
            entries: AtomicUsize::new(0),
        }
    }

    pub fn log(&self, level: Level, message: &str) {
        self.entries.fetch_add(1, Ordering::Relaxed);
        // `event!` needs a constant level
        match level {
            Level::ERROR => action_event!(self, Level::ERROR, message),
            Level::WARN => action_event!(self, Level::WARN, message),
            Level::INFO => action_event!(self, Level::INFO, message),
            Level::DEBUG => action_event!(self, Level::DEBUG, message),
            Level::TRACE => action_event!(self, Level::TRACE, message),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    /// Close the log for this invocation.
    pub fn flush(&self) {
        action_event!(
            self,
            Level::DEBUG,
            format!("Action execution complete ({} log entries)", self.entry_count())
        );
    }
}

/// HTTP response returned by [`ActionContext::http_request`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// JSON body, or the raw text as a JSON string when the body is not JSON.
    pub body: Value,
}

pub struct ActionContext {
    integration_config: IntegrationConfig,
    connection: Connection,
    log: ActionLog,
    http: reqwest::Client,
}

impl ActionContext {
    pub fn new(
        action_name: &str,
        integration_config: IntegrationConfig,
        connection: Connection,
        http: reqwest::Client,
    ) -> Self {
        let log = ActionLog::new(&connection.integration, action_name, connection.id);
        Self {
            integration_config,
            connection,
            log,
            http,
        }
    }

    pub fn integration_config(&self) -> &IntegrationConfig {
        &self.integration_config
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Resolve `endpoint` against the integration's `base_url`.
    ///
    /// Absolute URLs are used as-is.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<String, ActionError> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(endpoint.to_string());
        }

        let base = self.integration_config.base_url().ok_or_else(|| {
            ActionError::Failed(format!(
                "Integration '{}' has no base_url configured",
                self.integration_config.name()
            ))
        })?;

        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        ))
    }

    /// Call the integration's API on behalf of the connection.
    ///
    /// # Arguments
    /// * `endpoint` - Path relative to the integration's `base_url`
    /// * `method` - HTTP method
    /// * `params` - Query parameters
    /// * `body` - JSON request body
    pub async fn http_request(
        &self,
        endpoint: &str,
        method: reqwest::Method,
        params: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<HttpResponse, ActionError> {
        let url = self.endpoint_url(endpoint)?;

        let mut request = self.http.request(method.clone(), &url);
        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        match self.integration_config.auth_mode().unwrap_or(AUTH_HEADER_TOKEN) {
            AUTH_HEADER_TOKEN => request = request.bearer_auth(&self.connection.access_token),
            "NONE" => {}
            other => {
                return Err(ActionError::Failed(format!(
                    "Unsupported call_auth mode '{}' for integration '{}'",
                    other,
                    self.integration_config.name()
                )))
            }
        }

        self.log.debug(&format!("{} {}", method, url));
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}
