/// Message envelopes for the server's NATS subjects
///
/// Inbound requests arrive as JSON documents tagged by `action`; replies to
/// trigger requests are JSON documents carrying the request's correlation id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::connections::NewConnection;
use crate::error::{ErrorKind, Result, ServerError};

/// Header carrying the subject a trigger reply must be published to.
pub const REPLY_TO_HEADER: &str = "Nango-Reply-To";

/// Header carrying the requester's correlation id, echoed on the reply.
pub const CORRELATION_ID_HEADER: &str = "Nango-Correlation-Id";

pub const REGISTER_CONNECTION: &str = "REGISTER_CONNECTION";
pub const TRIGGER_ACTION: &str = "TRIGGER_ACTION";

/// Register a connection for (integration, user_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterConnectionMessage {
    pub integration: String,
    pub user_id: String,
    #[serde(alias = "accessToken")]
    pub o_auth_access_token: String,
    #[serde(default)]
    pub additional_config: Option<Map<String, Value>>,
}

impl RegisterConnectionMessage {
    pub fn into_new_connection(self) -> NewConnection {
        NewConnection {
            integration: self.integration,
            user_id: self.user_id,
            access_token: self.o_auth_access_token,
            additional_config: self.additional_config.unwrap_or_default(),
        }
    }
}

/// Run an action against an existing connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerActionMessage {
    pub integration: String,
    pub user_id: String,
    #[serde(alias = "actionName")]
    pub triggered_action: String,
    #[serde(default)]
    pub input: Value,
}

/// A parsed inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    RegisterConnection(RegisterConnectionMessage),
    TriggerAction(TriggerActionMessage),
}

impl InboundMessage {
    /// Parse a raw payload.
    ///
    /// # Errors
    /// * `UnknownMessageKind` - `action` is present but outside the known set
    /// * `MalformedMessage` - anything else that does not parse
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ServerError::MalformedMessage(format!("invalid JSON: {}", e)))?;

        let kind = value
            .get("action")
            .ok_or_else(|| ServerError::MalformedMessage("missing 'action' field".to_string()))?;
        match kind.as_str() {
            Some(REGISTER_CONNECTION) | Some(TRIGGER_ACTION) => {}
            Some(other) => return Err(ServerError::UnknownMessageKind(other.to_string())),
            None => return Err(ServerError::UnknownMessageKind(kind.to_string())),
        }

        serde_json::from_value(value).map_err(|e| ServerError::MalformedMessage(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::RegisterConnection(_) => REGISTER_CONNECTION,
            InboundMessage::TriggerAction(_) => TRIGGER_ACTION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Reply to a trigger request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub correlation_id: String,
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
    pub timestamp: DateTime<Utc>,
}

impl OutboundEnvelope {
    pub fn success(correlation_id: impl Into<String>, result: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ReplyStatus::Ok,
            result: Some(result),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(correlation_id: impl Into<String>, error: &ServerError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ReplyStatus::Error,
            result: None,
            error: Some(ReplyError {
                kind: error.kind(),
                message: error.to_string(),
            }),
            timestamp: Utc::now(),
        }
    }

    pub fn from_result(correlation_id: impl Into<String>, result: &Result<Value>) -> Self {
        match result {
            Ok(value) => Self::success(correlation_id, value.clone()),
            Err(e) => Self::failure(correlation_id, e),
        }
    }
}
