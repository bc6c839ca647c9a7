//! # nango-server: Integration Execution Backend
//!
//! Receives requests over a durable NATS JetStream subject to register
//! third-party connections and to trigger integration actions against them,
//! and replies to trigger requests on a correlated subject.
//!
//! ## Components
//!
//! - **Connection registry** (`connections`, `diesel_runtime`): one connection
//!   per (integration, user) pair, enforced by the database
//! - **Integration config registry** (`runtime::integration_config`): loaded
//!   once from `integrations.yaml`
//! - **Action dispatcher** (`runtime`): resolves and runs actions in isolation
//! - **Message channel manager** (`server`): routes inbound requests,
//!   publishes replies and settles messages with the transport
//!
//! ## Wire format
//!
//! ```json
//! {"action": "REGISTER_CONNECTION", "integration": "slack", "userId": "u1",
//!  "oAuthAccessToken": "xoxb-...", "additionalConfig": {}}
//!
//! {"action": "TRIGGER_ACTION", "integration": "slack", "userId": "u1",
//!  "triggeredAction": "notify", "input": {"channelId": "C1", "msg": "hi"}}
//! ```
//!
//! Trigger requests carry `Nango-Reply-To` and `Nango-Correlation-Id` headers.

pub mod error;

// Connection registry and its SQL store
pub mod connections;
pub mod diesel_runtime;

// Integration config, actions and dispatch
pub mod runtime;
pub mod integrations;

// NATS JetStream integration
pub mod nats;

// Request/reply server
pub mod server;

// Re-export key types
pub use error::{ErrorKind, Result, ServerError};
pub use connections::{Connection, ConnectionRegistry, ConnectionStore, NewConnection};
pub use diesel_runtime::{Database, DatabaseConfig, DieselConnectionStore};
pub use runtime::{
    Action, ActionContext, ActionDispatcher, ActionError, ActionRegistry, IntegrationConfig,
    IntegrationConfigRegistry,
};
pub use nats::{InboundMessage, NatsClient, NatsConfig, OutboundEnvelope};
pub use server::{Delivery, Disposition, MessageChannelManager, ReplySink, Server, ServerContext, ServerSettings};
