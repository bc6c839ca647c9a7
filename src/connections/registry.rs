use std::sync::Arc;

use crate::connections::{Connection, ConnectionStore, NewConnection};
use crate::error::{Result, ServerError};

/// Registers and looks up connections on top of a [`ConnectionStore`].
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self { store }
    }

    /// Create a connection for a new (integration, user_id) pair.
    ///
    /// # Errors
    /// * `ConnectionConflict` - the pair is already registered; nothing is written
    /// * `StoreUnavailable` - the store could not complete the insert
    pub async fn register(&self, new: NewConnection) -> Result<Connection> {
        let connection = Connection::create(new);
        let store = Arc::clone(&self.store);

        let connection = run_blocking(move || {
            store.insert_unique(&connection)?;
            Ok(connection)
        })
        .await?;

        tracing::info!(
            connection_id = %connection.id,
            integration = %connection.integration,
            user_id = %connection.user_id,
            "Registered connection"
        );

        Ok(connection)
    }

    /// Fetch the connection for (integration, user_id).
    pub async fn lookup(&self, integration: &str, user_id: &str) -> Result<Connection> {
        let store = Arc::clone(&self.store);
        let (integration, user_id) = (integration.to_string(), user_id.to_string());

        run_blocking(move || {
            store
                .find(&integration, &user_id)?
                .ok_or(ServerError::ConnectionNotFound { integration, user_id })
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::StoreUnavailable(format!("store task failed: {}", e)))?
}
