//! Error taxonomy for the server.
//!
//! Business-level errors are reported back to the requester (or simply
//! acknowledged), infrastructure-level errors leave the inbound message
//! unacknowledged so the transport redelivers it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(String),

    #[error("Connection for integration '{integration}' and user_id '{user_id}' already exists")]
    ConnectionConflict { integration: String, user_id: String },

    #[error("No connection exists for integration '{integration}' and user_id '{user_id}'")]
    ConnectionNotFound { integration: String, user_id: String },

    #[error("Integration not configured: {0}")]
    IntegrationNotFound(String),

    #[error("No action '{action}' registered for integration '{integration}'")]
    ActionNotFound { integration: String, action: String },

    #[error("Action '{action}' failed: {message}")]
    ActionExecutionFailed { action: String, message: String },

    #[error("Connection store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Classification used in reply payloads.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::MalformedMessage(_) => ErrorKind::MalformedMessage,
            ServerError::UnknownMessageKind(_) => ErrorKind::UnknownMessageKind,
            ServerError::ConnectionConflict { .. } => ErrorKind::ConnectionConflict,
            ServerError::ConnectionNotFound { .. } => ErrorKind::ConnectionNotFound,
            ServerError::IntegrationNotFound(_) => ErrorKind::IntegrationNotFound,
            ServerError::ActionNotFound { .. } => ErrorKind::ActionNotFound,
            ServerError::ActionExecutionFailed { .. } => ErrorKind::ActionExecutionFailed,
            ServerError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            ServerError::Transport(_) => ErrorKind::Transport,
            ServerError::Config(_) => ErrorKind::Config,
        }
    }

    /// True for the only class of failure that is eligible for redelivery.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ServerError::StoreUnavailable(_) | ServerError::Transport(_))
    }
}

impl From<r2d2::Error> for ServerError {
    fn from(e: r2d2::Error) -> Self {
        ServerError::StoreUnavailable(format!("connection pool: {}", e))
    }
}

impl From<async_nats::Error> for ServerError {
    fn from(e: async_nats::Error) -> Self {
        ServerError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedMessage,
    UnknownMessageKind,
    ConnectionConflict,
    ConnectionNotFound,
    IntegrationNotFound,
    ActionNotFound,
    ActionExecutionFailed,
    StoreUnavailable,
    Transport,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
