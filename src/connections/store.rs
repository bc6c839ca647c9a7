use crate::connections::Connection;
use crate::error::Result;

/// Backing store for connection records.
///
/// Implementations are blocking; the registry moves calls onto the blocking
/// thread pool.
pub trait ConnectionStore: Send + Sync {
    /// Persist `connection` in a single conditional insert.
    ///
    /// Returns `ServerError::ConnectionConflict` when a record for the same
    /// (integration, user_id) already exists. The check must be performed by
    /// the storage layer itself, not by a prior read.
    fn insert_unique(&self, connection: &Connection) -> Result<()>;

    /// Point lookup by (integration, user_id).
    fn find(&self, integration: &str, user_id: &str) -> Result<Option<Connection>>;
}
