pub mod error;
pub mod factory;
pub mod http;
pub mod traits;
pub mod types;

pub mod dropbox;
pub mod github;
pub mod gitlab;
pub mod google_drive;
pub mod local_file;
pub mod notion;
pub mod slack;
pub mod web;

pub use error::{ConnectorError, ConnectorResult};
pub use factory::{identify_connector_class, registered_sources, with_tenant_context, ConnectorFactory};
pub use traits::{
    BaseConnector, ConnectorClass, EventConnector, LoadConnector, PollConnector, SlimConnector,
};
pub use types::{Capabilities, ConnectorDescriptor, ConnectorSpecificConfig, TENANT_ID_KEY};
