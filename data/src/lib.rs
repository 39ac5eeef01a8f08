//! Connector resolution for Recap: maps a document source and input mode to a
//! connector type, builds it with tenant context, and persists refreshed
//! credentials.

pub mod connectors;
pub mod services;

pub use connectors::{
    identify_connector_class, BaseConnector, ConnectorError, ConnectorFactory, ConnectorResult,
};
pub use services::CredentialStore;
