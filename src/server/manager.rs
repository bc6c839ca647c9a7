//! Message channel manager.
//!
//! Routes one inbound delivery to the registries and the dispatcher and
//! decides how the delivery is settled with the transport. Acknowledgement
//! does not depend on the business outcome: only infrastructure failures
//! leave a message eligible for redelivery.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, ServerError};
use crate::nats::message_envelope::{
    InboundMessage, OutboundEnvelope, RegisterConnectionMessage, TriggerActionMessage,
};
use crate::server::context::ServerContext;

/// A message as received from the transport.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub reply_target: Option<String>,
    pub correlation_id: Option<String>,
}

/// How a delivery is settled with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the inbound queue.
    Ack,
    /// Poison message; remove without redelivery.
    Reject,
    /// Infrastructure failure; leave for transport-driven redelivery.
    Redeliver,
}

/// Outbound side of the channel.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn publish_reply(&self, reply_target: &str, envelope: &OutboundEnvelope) -> Result<()>;
}

pub struct MessageChannelManager {
    ctx: Arc<ServerContext>,
    replies: Arc<dyn ReplySink>,
}

impl MessageChannelManager {
    pub fn new(ctx: Arc<ServerContext>, replies: Arc<dyn ReplySink>) -> Self {
        Self { ctx, replies }
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    pub async fn handle(&self, delivery: Delivery) -> Disposition {
        let message = match InboundMessage::parse(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Rejecting inbound message: {}", e);
                return Disposition::Reject;
            }
        };

        tracing::debug!(
            kind = message.kind(),
            correlation_id = delivery.correlation_id.as_deref().unwrap_or("-"),
            "Server received message"
        );

        match message {
            InboundMessage::RegisterConnection(msg) => self.handle_register(msg).await,
            InboundMessage::TriggerAction(msg) => {
                self.handle_trigger(msg, delivery.reply_target, delivery.correlation_id)
                    .await
            }
        }
    }

    async fn handle_register(&self, msg: RegisterConnectionMessage) -> Disposition {
        match self.ctx.connections.register(msg.into_new_connection()).await {
            Ok(_) => Disposition::Ack,
            Err(e @ ServerError::ConnectionConflict { .. }) => {
                tracing::warn!("Cannot register connection: {}", e);
                Disposition::Ack
            }
            Err(e) => {
                tracing::error!("Failed to register connection, leaving for redelivery: {}", e);
                Disposition::Redeliver
            }
        }
    }

    async fn handle_trigger(
        &self,
        msg: TriggerActionMessage,
        reply_target: Option<String>,
        correlation_id: Option<String>,
    ) -> Disposition {
        let (Some(reply_target), Some(correlation_id)) = (reply_target, correlation_id) else {
            tracing::error!(
                "Rejecting TRIGGER_ACTION for '{}': missing reply target or correlation id",
                msg.integration
            );
            return Disposition::Reject;
        };

        let result = self.trigger(msg).await;
        if let Err(e) = &result {
            if e.is_infrastructure() {
                tracing::error!(
                    correlation_id = %correlation_id,
                    "Trigger failed on infrastructure, leaving for redelivery: {}",
                    e
                );
                return Disposition::Redeliver;
            }
        }

        let envelope = OutboundEnvelope::from_result(correlation_id, &result);
        match self.replies.publish_reply(&reply_target, &envelope).await {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                tracing::error!(
                    correlation_id = %envelope.correlation_id,
                    "Failed to publish reply to '{}': {}",
                    reply_target,
                    e
                );
                Disposition::Redeliver
            }
        }
    }

    /// Resolve integration config, then connection, then run the action.
    pub async fn trigger(&self, msg: TriggerActionMessage) -> Result<Value> {
        let config = self.ctx.integrations.get(&msg.integration)?;
        let connection = self
            .ctx
            .connections
            .lookup(&msg.integration, &msg.user_id)
            .await?;

        self.ctx
            .dispatcher
            .dispatch(config, &connection, &msg.triggered_action, msg.input)
            .await
    }
}
