//! The request/reply server: context, channel manager and consumption loop.

pub mod config;
pub mod consumer;
pub mod context;
pub mod health;
pub mod manager;
pub mod shutdown;

pub use config::ServerSettings;
pub use consumer::Server;
pub use context::ServerContext;
pub use manager::{Delivery, Disposition, MessageChannelManager, ReplySink};
