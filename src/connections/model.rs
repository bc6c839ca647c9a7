use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored connection.
///
/// `id`, `integration` and `user_id` never change after creation.
/// `access_token` is a credential, not part of the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: Uuid,
    pub integration: String,
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub additional_config: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by a register request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConnection {
    pub integration: String,
    pub user_id: String,
    pub access_token: String,
    pub additional_config: Map<String, Value>,
}

impl Connection {
    /// Build a fresh record with a new identifier and both timestamps set to now.
    pub fn create(new: NewConnection) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            integration: new.integration,
            user_id: new.user_id,
            access_token: new.access_token,
            additional_config: new.additional_config,
            created_at: now,
            updated_at: now,
        }
    }
}
