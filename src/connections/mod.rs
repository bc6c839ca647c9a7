//! Connection registry: credentialed links between a user and an integration.
//!
//! One connection exists per (integration, user_id) pair. The pair is unique
//! at the storage layer, so concurrent registrations for the same pair
//! resolve to exactly one winner.

pub mod model;
pub mod registry;
pub mod store;

pub use model::{Connection, NewConnection};
pub use registry::ConnectionRegistry;
pub use store::ConnectionStore;
