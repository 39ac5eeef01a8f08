use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::source::DocumentSource;

/// Opaque secret payload stored alongside a credential
pub type CredentialJson = serde_json::Map<String, serde_json::Value>;

/// Persisted credential bound to a connector/source pairing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub id: i32,
    pub credential_json: CredentialJson,
    pub user_id: Option<Uuid>,
    pub source: DocumentSource,
    pub admin_public: bool,
    pub time_created: DateTime<Utc>,
    pub time_updated: DateTime<Utc>,
}

impl Credential {
    pub fn new(id: i32, source: DocumentSource, credential_json: CredentialJson) -> Self {
        let now = Utc::now();
        Self {
            id,
            credential_json,
            user_id: None,
            source,
            admin_public: false,
            time_created: now,
            time_updated: now,
        }
    }

    /// String value stored under `key`, if present
    pub fn secret(&self, key: &str) -> Option<&str> {
        self.credential_json.get(key).and_then(|v| v.as_str())
    }
}
