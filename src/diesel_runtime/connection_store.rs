//! Diesel-backed [`ConnectionStore`].

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::connections::{Connection, ConnectionStore};
use crate::diesel_runtime::database::Database;
use crate::diesel_runtime::schema::nango_connections;
use crate::error::{Result, ServerError};

#[derive(Insertable)]
#[diesel(table_name = nango_connections)]
struct ConnectionRow<'a> {
    id: String,
    integration: &'a str,
    user_id: &'a str,
    access_token: &'a str,
    additional_config: String,
    created_at: String,
    updated_at: String,
}

/// Column order matches the `nango_connections` table.
#[derive(Queryable)]
struct StoredConnection {
    id: String,
    integration: String,
    user_id: String,
    access_token: String,
    additional_config: String,
    created_at: String,
    updated_at: String,
}

impl<'a> ConnectionRow<'a> {
    fn from_connection(connection: &'a Connection) -> Result<Self> {
        let additional_config = serde_json::to_string(&connection.additional_config)
            .map_err(|e| ServerError::StoreUnavailable(format!("cannot encode additional_config: {}", e)))?;

        Ok(Self {
            id: connection.id.to_string(),
            integration: &connection.integration,
            user_id: &connection.user_id,
            access_token: &connection.access_token,
            additional_config,
            created_at: connection.created_at.to_rfc3339(),
            updated_at: connection.updated_at.to_rfc3339(),
        })
    }
}

impl TryFrom<StoredConnection> for Connection {
    type Error = ServerError;

    fn try_from(row: StoredConnection) -> Result<Self> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            ServerError::StoreUnavailable(format!("corrupt connection record {}: {} ({})", row.id, field, e))
        };

        let id = Uuid::parse_str(&row.id).map_err(|e| corrupt("id", &e))?;
        let additional_config =
            serde_json::from_str(&row.additional_config).map_err(|e| corrupt("additional_config", &e))?;
        let created_at = parse_timestamp(&row.created_at).map_err(|e| corrupt("created_at", &e))?;
        let updated_at = parse_timestamp(&row.updated_at).map_err(|e| corrupt("updated_at", &e))?;

        Ok(Connection {
            id,
            integration: row.integration,
            user_id: row.user_id,
            access_token: row.access_token,
            additional_config,
            created_at,
            updated_at,
        })
    }
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

/// Connection store backed by a pooled SQL database.
#[derive(Clone)]
pub struct DieselConnectionStore {
    db: Database,
}

impl DieselConnectionStore {
    /// Wrap a database whose tables have already been ensured.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ConnectionStore for DieselConnectionStore {
    fn insert_unique(&self, connection: &Connection) -> Result<()> {
        let row = ConnectionRow::from_connection(connection)?;
        let mut conn = self.db.get_connection()?;

        match diesel::insert_into(nango_connections::table)
            .values(&row)
            .execute(&mut conn)
        {
            Ok(_) => Ok(()),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(ServerError::ConnectionConflict {
                    integration: connection.integration.clone(),
                    user_id: connection.user_id.clone(),
                })
            }
            Err(e) => Err(ServerError::StoreUnavailable(e.to_string())),
        }
    }

    fn find(&self, integration: &str, user_id: &str) -> Result<Option<Connection>> {
        let mut conn = self.db.get_connection()?;

        let stored = nango_connections::table
            .filter(nango_connections::integration.eq(integration))
            .filter(nango_connections::user_id.eq(user_id))
            .first::<StoredConnection>(&mut conn)
            .optional()
            .map_err(|e| ServerError::StoreUnavailable(e.to_string()))?;

        stored.map(Connection::try_from).transpose()
    }
}
