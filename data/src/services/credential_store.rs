use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use recap_config::DatabaseSettings;
use recap_models::{Credential, CredentialJson, DocumentSource};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info};
use uuid::Uuid;

use crate::connectors::error::{ConnectorError, ConnectorResult};

/// Persistence contract used when a connector rotates its credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Replaces the stored payload of `credential` and mirrors it in memory.
    /// Fails rather than dropping the update.
    async fn update_credential_json(
        &self,
        credential: &mut Credential,
        credential_json: CredentialJson,
    ) -> ConnectorResult<()>;
}

/// Postgres-backed credential table
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(settings: &DatabaseSettings) -> ConnectorResult<Self> {
        let url = settings.url.as_deref().ok_or_else(|| {
            ConnectorError::InvalidConfiguration("DATABASE_URL is not set".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(url)
            .await?;

        info!("🗄️  Credential store connected");
        Ok(Self::new(pool))
    }

    pub async fn get_credential(&self, credential_id: i32) -> ConnectorResult<Credential> {
        let row = sqlx::query(
            r#"
            SELECT id, credential_json, user_id, source, admin_public, time_created, time_updated
            FROM credential
            WHERE id = $1
            "#,
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ConnectorError::CredentialNotFound(credential_id))?;

        let source: String = row.try_get("source")?;
        let credential_json: serde_json::Value = row.try_get("credential_json")?;

        Ok(Credential {
            id: row.try_get("id")?,
            credential_json: match credential_json {
                serde_json::Value::Object(map) => map,
                other => {
                    return Err(ConnectorError::SerializationError(format!(
                        "credential {} payload is not an object: {}",
                        credential_id, other
                    )))
                }
            },
            user_id: row.try_get::<Option<Uuid>, _>("user_id")?,
            source: source
                .parse::<DocumentSource>()
                .map_err(|e| ConnectorError::DatabaseError(e.to_string()))?,
            admin_public: row.try_get("admin_public")?,
            time_created: row.try_get::<DateTime<Utc>, _>("time_created")?,
            time_updated: row.try_get::<DateTime<Utc>, _>("time_updated")?,
        })
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn update_credential_json(
        &self,
        credential: &mut Credential,
        credential_json: CredentialJson,
    ) -> ConnectorResult<()> {
        let payload = serde_json::Value::Object(credential_json.clone());
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE credential
            SET credential_json = $1, time_updated = now()
            WHERE id = $2
            RETURNING time_updated
            "#,
        )
        .bind(&payload)
        .bind(credential.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            error!(credential_id = credential.id, "Credential disappeared before refresh could be stored");
            return Err(ConnectorError::CredentialNotFound(credential.id));
        };

        tx.commit().await?;

        credential.time_updated = row.try_get::<DateTime<Utc>, _>("time_updated")?;
        credential.credential_json = credential_json;
        Ok(())
    }
}

/// Process-local credential store, for development setups without Postgres
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<i32, Credential>>,
    writes: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, credential: Credential) {
        self.credentials.write().insert(credential.id, credential);
    }

    pub fn get(&self, credential_id: i32) -> Option<Credential> {
        self.credentials.read().get(&credential_id).cloned()
    }

    /// Number of successful payload updates
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn update_credential_json(
        &self,
        credential: &mut Credential,
        credential_json: CredentialJson,
    ) -> ConnectorResult<()> {
        let mut credentials = self.credentials.write();
        let stored = credentials
            .get_mut(&credential.id)
            .ok_or(ConnectorError::CredentialNotFound(credential.id))?;

        let now = Utc::now();
        stored.credential_json = credential_json.clone();
        stored.time_updated = now;

        credential.credential_json = credential_json;
        credential.time_updated = now;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_store_updates_both_copies() {
        let store = InMemoryCredentialStore::new();
        let mut credential = Credential::new(7, DocumentSource::GoogleDrive, CredentialJson::new());
        store.insert(credential.clone());

        let payload = json!({ "token": "fresh" }).as_object().cloned().unwrap();
        store.update_credential_json(&mut credential, payload.clone()).await.unwrap();

        assert_eq!(credential.credential_json, payload);
        assert_eq!(store.get(7).unwrap().credential_json, payload);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_store_fails_for_unknown_row() {
        let store = InMemoryCredentialStore::new();
        let mut credential = Credential::new(1, DocumentSource::Slack, CredentialJson::new());

        let err = store
            .update_credential_json(&mut credential, CredentialJson::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::CredentialNotFound(1)));
        assert_eq!(store.write_count(), 0);
    }
}
