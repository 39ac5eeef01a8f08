use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, SlimDocument};

use super::error::ConnectorResult;
use super::types::{Capabilities, ConnectorSpecificConfig};

/// Trait that every connector implements, whatever modes it supports
#[async_trait]
pub trait BaseConnector: Send + Sync {
    /// Returns the name of the connector
    fn name(&self) -> &'static str;

    /// Source the produced documents are attributed to
    fn source(&self) -> DocumentSource;

    /// Takes the stored secret payload.
    /// Returns a replacement payload when the connector rotated the secret
    /// (e.g. an OAuth refresh), or `None` when nothing changed.
    async fn load_credentials(
        &mut self,
        credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>>;

    fn as_load_connector(&self) -> Option<&dyn LoadConnector> {
        None
    }

    fn as_poll_connector(&self) -> Option<&dyn PollConnector> {
        None
    }

    fn as_slim_connector(&self) -> Option<&dyn SlimConnector> {
        None
    }

    fn as_event_connector(&self) -> Option<&dyn EventConnector> {
        None
    }
}

/// Produces a complete snapshot of the source
#[async_trait]
pub trait LoadConnector: BaseConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>>;
}

/// Produces the documents changed inside `[start, end]`
#[async_trait]
pub trait PollConnector: BaseConnector {
    async fn poll_source(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>>;
}

/// Lists document ids without fetching content, used for pruning
#[async_trait]
pub trait SlimConnector: BaseConnector {
    async fn retrieve_all_slim_documents(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<SlimDocument>>;
}

/// Accepts push notifications (webhooks) from the source
#[async_trait]
pub trait EventConnector: BaseConnector {
    async fn handle_event(&self, payload: serde_json::Value) -> ConnectorResult<Vec<Document>>;
}

/// Compile-time description of a registrable connector type
pub trait ConnectorClass: BaseConnector + Sized + 'static {
    const NAME: &'static str;

    /// Capabilities this type implements; must agree with the `as_*_connector` accessors
    const CAPABILITIES: Capabilities;

    /// Builds the connector from its source-specific configuration
    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self>;
}
