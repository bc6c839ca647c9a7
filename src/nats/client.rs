/// NATS JetStream client for the server's inbound and outbound subjects
///
/// Provides connection management, the durable inbound consumer and reply
/// publishing.

use async_nats::jetstream::{self, consumer::pull};
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Result, ServerError};
use crate::nats::message_envelope::{OutboundEnvelope, CORRELATION_ID_HEADER, REPLY_TO_HEADER};
use crate::server::manager::{Delivery, ReplySink};

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub stream_name: String,
    pub inbound_subject: String,
    pub consumer_name: String,
    pub max_deliver: i64,
    pub max_age: Duration,
    pub max_bytes: i64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            stream_name: std::env::var("NATS_STREAM")
                .unwrap_or_else(|_| "NANGO".to_string()),
            inbound_subject: std::env::var("NATS_INBOUND_SUBJECT")
                .unwrap_or_else(|_| "server_inbound".to_string()),
            consumer_name: std::env::var("NATS_CONSUMER")
                .unwrap_or_else(|_| "nango-server".to_string()),
            max_deliver: std::env::var("MAX_DELIVER")
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(5),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

pub type InboundConsumer = jetstream::consumer::Consumer<pull::Config>;

/// Flow-control settings for the inbound consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerLimits {
    /// Unacknowledged messages the server hands out at once
    pub max_ack_pending: usize,
    /// How long a delivered message may stay unsettled before redelivery
    pub ack_wait: Duration,
}

/// Consumer definition for the inbound subject.
pub fn inbound_consumer_config(config: &NatsConfig, limits: ConsumerLimits) -> pull::Config {
    pull::Config {
        durable_name: Some(config.consumer_name.clone()),
        ack_policy: jetstream::consumer::AckPolicy::Explicit,
        ack_wait: limits.ack_wait,
        max_ack_pending: i64::try_from(limits.max_ack_pending).unwrap_or(i64::MAX),
        max_deliver: config.max_deliver,
        filter_subject: config.inbound_subject.clone(),
        ..Default::default()
    }
}

#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS and make sure the inbound stream exists
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to connect to {}: {}", config.url, e)))?;
        tracing::info!("Connected to NATS at {}", config.url);

        let jetstream = jetstream::new(client.clone());

        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![config.inbound_subject.clone()],
                max_age: config.max_age,
                max_bytes: config.max_bytes,
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| ServerError::Transport(format!("failed to get/create stream: {}", e)))?;

        tracing::info!("JetStream stream '{}' ready", config.stream_name);

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Durable pull consumer with explicit acknowledgement on the inbound subject
    pub async fn inbound_consumer(&self, limits: ConsumerLimits) -> Result<InboundConsumer> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to get stream: {}", e)))?;

        stream
            .get_or_create_consumer(
                &self.config.consumer_name,
                inbound_consumer_config(&self.config, limits),
            )
            .await
            .map_err(|e| ServerError::Transport(format!("failed to create consumer: {}", e)))
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Flush pending publishes to the server.
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| ServerError::Transport(format!("failed to flush: {}", e)))
    }
}

#[async_trait]
impl ReplySink for NatsClient {
    async fn publish_reply(&self, reply_target: &str, envelope: &OutboundEnvelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| ServerError::Transport(format!("failed to encode reply: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, envelope.correlation_id.as_str());

        self.client
            .publish_with_headers(reply_target.to_string(), headers, payload.into())
            .await
            .map_err(|e| ServerError::Transport(format!("failed to publish reply: {}", e)))?;

        tracing::debug!(
            "Published reply {} to subject {}",
            envelope.correlation_id,
            reply_target
        );

        Ok(())
    }
}

/// Convert a JetStream message into a transport-neutral delivery.
pub fn delivery_from_message(msg: &jetstream::Message) -> Delivery {
    delivery_from_parts(&msg.payload, msg.headers.as_ref())
}

/// Build a delivery from a raw payload and its headers.
///
/// Reply routing comes only from `Nango-Reply-To` and `Nango-Correlation-Id`.
pub fn delivery_from_parts(payload: &[u8], headers: Option<&HeaderMap>) -> Delivery {
    let header = |name: &str| {
        headers
            .and_then(|headers| headers.get(name))
            .map(|value| value.as_str().to_string())
    };

    Delivery {
        payload: payload.to_vec(),
        reply_target: header(REPLY_TO_HEADER),
        correlation_id: header(CORRELATION_ID_HEADER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NatsConfig {
        NatsConfig {
            url: "nats://localhost:4222".to_string(),
            stream_name: "NANGO".to_string(),
            inbound_subject: "server_inbound".to_string(),
            consumer_name: "nango-server".to_string(),
            max_deliver: 5,
            max_age: Duration::from_secs(60),
            max_bytes: 1024,
        }
    }

    #[test]
    fn test_consumer_config_applies_limits() {
        let limits = ConsumerLimits {
            max_ack_pending: 64,
            ack_wait: Duration::from_secs(150),
        };
        let consumer = inbound_consumer_config(&config(), limits);

        assert_eq!(consumer.durable_name.as_deref(), Some("nango-server"));
        assert_eq!(consumer.filter_subject, "server_inbound");
        assert_eq!(consumer.ack_wait, Duration::from_secs(150));
        assert_eq!(consumer.max_ack_pending, 64);
        assert_eq!(consumer.max_deliver, 5);
        assert!(matches!(consumer.ack_policy, jetstream::consumer::AckPolicy::Explicit));
    }

    #[test]
    fn test_delivery_reads_reply_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(REPLY_TO_HEADER, "client.replies");
        headers.insert(CORRELATION_ID_HEADER, "corr-1");
        headers.insert("Other", "ignored");

        let delivery = delivery_from_parts(b"{}", Some(&headers));

        assert_eq!(delivery.payload, b"{}".to_vec());
        assert_eq!(delivery.reply_target.as_deref(), Some("client.replies"));
        assert_eq!(delivery.correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn test_delivery_missing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "corr-2");

        let partial = delivery_from_parts(b"{}", Some(&headers));
        assert_eq!(partial.reply_target, None);
        assert_eq!(partial.correlation_id.as_deref(), Some("corr-2"));

        let bare = delivery_from_parts(b"{}", None);
        assert_eq!(bare.reply_target, None);
        assert_eq!(bare.correlation_id, None);
    }

    #[test]
    fn test_header_names() {
        assert_eq!(REPLY_TO_HEADER, "Nango-Reply-To");
        assert_eq!(CORRELATION_ID_HEADER, "Nango-Correlation-Id");
    }
}
