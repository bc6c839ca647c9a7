//! Server context constructed once at boot and shared by every handler.

use std::path::Path;
use std::sync::Arc;

use crate::connections::{ConnectionRegistry, ConnectionStore};
use crate::diesel_runtime::{Database, DatabaseConfig, DieselConnectionStore};
use crate::error::Result;
use crate::integrations;
use crate::runtime::{ActionDispatcher, ActionRegistry, IntegrationConfigRegistry};
use crate::server::config::{ServerSettings, INTEGRATIONS_FILE};

pub struct ServerContext {
    pub settings: ServerSettings,
    pub integrations: IntegrationConfigRegistry,
    pub connections: ConnectionRegistry,
    pub dispatcher: ActionDispatcher,
}

impl ServerContext {
    pub fn new(
        settings: ServerSettings,
        integrations: IntegrationConfigRegistry,
        store: Arc<dyn ConnectionStore>,
        actions: ActionRegistry,
    ) -> Self {
        let dispatcher = ActionDispatcher::new(actions).with_timeout(settings.action_timeout());
        Self {
            settings,
            integrations,
            connections: ConnectionRegistry::new(store),
            dispatcher,
        }
    }

    /// Build the production context.
    ///
    /// Reads `integrations.yaml` from `integrations_dir`, opens the connection
    /// database, creates its tables and registers the built-in actions. Any
    /// failure here is fatal for the process.
    pub fn bootstrap(
        settings: ServerSettings,
        integrations_dir: &Path,
        database_url: &str,
        database_config: DatabaseConfig,
    ) -> Result<Self> {
        let integrations =
            IntegrationConfigRegistry::load_from_file(integrations_dir.join(INTEGRATIONS_FILE))?;

        let db = Database::new_with_config(database_url, database_config)?;
        db.test_connection()?;
        db.ensure_tables()?;
        let store = Arc::new(DieselConnectionStore::new(db));

        let actions = integrations::builtin_registry();
        for (integration, action) in actions.list_actions() {
            if !integrations.has_integration(&integration) {
                tracing::debug!(
                    "Action '{}' is registered but integration '{}' is not configured",
                    action,
                    integration
                );
            }
        }
        tracing::info!("Registered {} action(s)", actions.count());

        Ok(Self::new(settings, integrations, store, actions))
    }

    /// Tear down the context once no handling holds it any more.
    ///
    /// Dropping the registries releases the connection store and its pool.
    pub fn shutdown(self) {
        tracing::info!(
            "Releasing connection store ({} integration(s) configured)",
            self.integrations.len()
        );
    }
}
