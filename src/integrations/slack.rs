//! Slack actions.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::runtime::{Action, ActionContext, ActionError};

/// Posts a message to a channel via `chat.postMessage`.
///
/// Input: `{ "channelId": "C123", "msg": "hello" }`
#[derive(Debug, Default)]
pub struct SlackNotify;

impl SlackNotify {
    fn request_body(input: &Value) -> Result<Value, ActionError> {
        let channel_id = input.get("channelId").and_then(|v| v.as_str());
        let msg = input.get("msg").and_then(|v| v.as_str());

        match (channel_id, msg) {
            (Some(channel), Some(text)) => Ok(json!({
                "channel": channel,
                "mrkdwn": true,
                "text": text,
            })),
            _ => Err(ActionError::InvalidInput(format!(
                "Slack notify requires both a channel ID and a message (channelId: {:?}, msg: {:?})",
                channel_id, msg
            ))),
        }
    }
}

#[async_trait]
impl Action for SlackNotify {
    async fn execute(&mut self, ctx: &ActionContext, input: Value) -> Result<Value, ActionError> {
        let body = Self::request_body(&input)?;

        let response = ctx
            .http_request("chat.postMessage", reqwest::Method::POST, None, Some(&body))
            .await?;

        if response.status >= 400 {
            ctx.log().error(&format!(
                "chat.postMessage returned {} {}",
                response.status, response.status_text
            ));
        } else {
            ctx.log().info(&format!("chat.postMessage returned {}", response.status));
        }

        Ok(json!({
            "status": response.status,
            "statusText": response.status_text,
        }))
    }
}
