/// NATS JetStream integration module
///
/// Inbound/outbound envelopes and the NATS client used by the server

pub mod message_envelope;
pub mod client;

pub use message_envelope::{InboundMessage, OutboundEnvelope, ReplyError, ReplyStatus};
pub use client::{ConsumerLimits, NatsClient, NatsConfig};
