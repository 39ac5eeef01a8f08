use recap_config::{get_cached_settings, ConnectorSettings};
use recap_models::{Credential, DocumentSource, InputType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::services::credential_store::CredentialStore;

use super::dropbox::DropboxConnector;
use super::error::{ConnectorError, ConnectorResult};
use super::github::GithubConnector;
use super::gitlab::GitlabConnector;
use super::google_drive::GoogleDriveConnector;
use super::local_file::LocalFileConnector;
use super::notion::NotionConnector;
use super::slack::SlackPollConnector;
use super::traits::BaseConnector;
use super::types::{ConnectorDescriptor, ConnectorSpecificConfig, TENANT_ID_KEY};
use super::web::WebConnector;

/// Table entry: one type for every mode, or a family keyed by input type
#[derive(Debug, Clone)]
enum ConnectorMapping {
    Single(ConnectorDescriptor),
    ByInputType(Vec<(InputType, ConnectorDescriptor)>),
}

/// Order used to pick a family member when no input type is requested
const DEFAULT_INPUT_PREFERENCE: [InputType; 4] = [
    InputType::LoadState,
    InputType::Poll,
    InputType::SlimRetrieval,
    InputType::Event,
];

lazy_static::lazy_static! {
    static ref CONNECTOR_MAP: HashMap<DocumentSource, ConnectorMapping> = {
        let mut map = HashMap::new();
        map.insert(DocumentSource::Web, ConnectorMapping::Single(ConnectorDescriptor::of::<WebConnector>()));
        map.insert(DocumentSource::File, ConnectorMapping::Single(ConnectorDescriptor::of::<LocalFileConnector>()));
        map.insert(
            DocumentSource::Slack,
            ConnectorMapping::ByInputType(vec![
                (InputType::Poll, ConnectorDescriptor::of::<SlackPollConnector>()),
                (InputType::SlimRetrieval, ConnectorDescriptor::of::<SlackPollConnector>()),
            ]),
        );
        map.insert(DocumentSource::Github, ConnectorMapping::Single(ConnectorDescriptor::of::<GithubConnector>()));
        map.insert(DocumentSource::Gitlab, ConnectorMapping::Single(ConnectorDescriptor::of::<GitlabConnector>()));
        map.insert(DocumentSource::GoogleDrive, ConnectorMapping::Single(ConnectorDescriptor::of::<GoogleDriveConnector>()));
        map.insert(DocumentSource::Dropbox, ConnectorMapping::Single(ConnectorDescriptor::of::<DropboxConnector>()));
        map.insert(DocumentSource::Notion, ConnectorMapping::Single(ConnectorDescriptor::of::<NotionConnector>()));
        map
    };
}

/// Sources with at least one registered connector, in a stable order
pub fn registered_sources() -> Vec<DocumentSource> {
    let mut sources: Vec<_> = CONNECTOR_MAP.keys().copied().collect();
    sources.sort();
    sources
}

/// Resolves the connector type for `source`.
///
/// Without an input type, a mode-keyed family yields its `load_state` member,
/// falling back to the most capable member it has. With a load, poll or event
/// input type, the resolved type must declare that capability, whatever key it
/// was stored under. Slim retrieval is not checked here: callers probe
/// `as_slim_connector` on the instance and fall back to a full load.
pub fn identify_connector_class(
    source: DocumentSource,
    input_type: Option<InputType>,
) -> ConnectorResult<ConnectorDescriptor> {
    let connector = match CONNECTOR_MAP.get(&source) {
        None => None,
        Some(ConnectorMapping::Single(descriptor)) => Some(*descriptor),
        Some(ConnectorMapping::ByInputType(family)) => {
            let lookup = |wanted: InputType| {
                family
                    .iter()
                    .find(|(input, _)| *input == wanted)
                    .map(|(_, descriptor)| *descriptor)
            };
            match input_type {
                Some(wanted) => lookup(wanted),
                None => DEFAULT_INPUT_PREFERENCE.iter().find_map(|wanted| lookup(*wanted)),
            }
        }
    };

    let connector = connector.ok_or_else(|| {
        warn!(source = %source, input_type = ?input_type, "No connector registered");
        ConnectorError::ConnectorMissing(format!("Connector not found for source={}", source))
    })?;

    if let Some(wanted) = input_type.filter(|i| *i != InputType::SlimRetrieval) {
        if !connector.supports(wanted) {
            warn!(
                source = %source,
                connector = connector.name(),
                input_type = %wanted,
                "Connector does not implement the requested input type"
            );
            return Err(ConnectorError::ConnectorMissing(format!(
                "Connector for source={} does not accept input_type={}",
                source, wanted
            )));
        }
    }

    Ok(connector)
}

/// Copy of `config` with the tenant id injected when `source` is tenant-aware.
/// The caller's map is left untouched.
pub fn with_tenant_context(
    source: DocumentSource,
    config: &ConnectorSpecificConfig,
    tenant_id: Option<&str>,
) -> ConnectorSpecificConfig {
    let mut config = config.clone();
    if source.requires_tenant_context() {
        let value = tenant_id
            .map(|t| serde_json::Value::String(t.to_string()))
            .unwrap_or(serde_json::Value::Null);
        config.insert(TENANT_ID_KEY.to_string(), value);
    }
    config
}

/// Builds live connectors from the static table
#[derive(Debug, Clone)]
pub struct ConnectorFactory {
    settings: Arc<ConnectorSettings>,
}

impl Default for ConnectorFactory {
    fn default() -> Self {
        Self::new(get_cached_settings())
    }
}

impl ConnectorFactory {
    pub fn new(settings: Arc<ConnectorSettings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    /// Resolves, constructs and loads credentials into a connector.
    ///
    /// When the connector hands back a replacement credential payload it is
    /// persisted through `store` (one write) and mirrored into `credential`.
    /// Constructor, credential and persistence errors are returned unchanged.
    pub async fn instantiate_connector<S>(
        &self,
        store: &S,
        source: DocumentSource,
        input_type: Option<InputType>,
        connector_specific_config: &ConnectorSpecificConfig,
        credential: &mut Credential,
        tenant_id: Option<&str>,
    ) -> ConnectorResult<Box<dyn BaseConnector>>
    where
        S: CredentialStore + ?Sized,
    {
        let connector_class = identify_connector_class(source, input_type)?;
        let config = with_tenant_context(source, connector_specific_config, tenant_id);

        debug!(
            source = %source,
            connector = connector_class.name(),
            credential_id = credential.id,
            "Instantiating connector"
        );

        let mut connector = connector_class.build(config, &self.settings)?;
        let new_credentials = connector.load_credentials(&credential.credential_json).await?;

        if let Some(new_credentials) = new_credentials {
            info!(
                source = %source,
                credential_id = credential.id,
                "Connector refreshed its credentials, persisting"
            );
            store.update_credential_json(credential, new_credentials).await?;
        }

        Ok(connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::types::Capabilities;
    use serde_json::json;

    #[test]
    fn test_slack_poll_resolves_to_poll_connector() {
        let connector = identify_connector_class(DocumentSource::Slack, Some(InputType::Poll)).unwrap();
        assert_eq!(connector.name(), "SlackPollConnector");
        assert!(connector.supports(InputType::Poll));
    }

    #[test]
    fn test_slack_load_state_is_missing() {
        let err = identify_connector_class(DocumentSource::Slack, Some(InputType::LoadState)).unwrap_err();
        assert!(err.is_connector_missing());
        assert_eq!(err.to_string(), "Connector not found for source=slack");
    }

    #[test]
    fn test_slack_without_input_type_falls_back_to_poll() {
        let connector = identify_connector_class(DocumentSource::Slack, None).unwrap();
        assert_eq!(connector.name(), "SlackPollConnector");
    }

    #[test]
    fn test_unknown_source_name_is_missing() {
        let err: ConnectorError = "unknown_source".parse::<DocumentSource>().unwrap_err().into();
        assert!(err.is_connector_missing());
    }

    #[test]
    fn test_unregistered_source_is_missing() {
        for source in [DocumentSource::Gmail, DocumentSource::NotApplicable, DocumentSource::S3] {
            let err = identify_connector_class(source, None).unwrap_err();
            assert!(err.is_connector_missing(), "{} should be missing", source);
        }
    }

    #[test]
    fn test_every_registered_source_resolves_without_input_type() {
        for source in registered_sources() {
            let connector = identify_connector_class(source, None)
                .unwrap_or_else(|e| panic!("{} failed to resolve: {}", source, e));
            let caps = connector.capabilities();
            assert!(
                caps.load_state || source == DocumentSource::Slack,
                "{} default should be a load connector",
                source
            );
        }
    }

    #[test]
    fn test_resolution_never_returns_mismatched_capability() {
        let all_inputs = [
            InputType::LoadState,
            InputType::Poll,
            InputType::SlimRetrieval,
            InputType::Event,
        ];
        for source in DocumentSource::ALL {
            for input in all_inputs {
                match identify_connector_class(source, Some(input)) {
                    Ok(_) if input == InputType::SlimRetrieval => {
                        assert!(registered_sources().contains(&source))
                    }
                    Ok(connector) => assert!(connector.supports(input)),
                    Err(e) => assert!(e.is_connector_missing()),
                }
            }
        }

        let web = identify_connector_class(DocumentSource::Web, Some(InputType::SlimRetrieval)).unwrap();
        assert_eq!(web.name(), "WebConnector");
    }

    #[test]
    fn test_slim_retrieval_resolves_for_every_registered_source() {
        for source in registered_sources() {
            let connector = identify_connector_class(source, Some(InputType::SlimRetrieval))
                .unwrap_or_else(|e| panic!("{} failed to resolve for slim: {}", source, e));
            assert_eq!(
                connector.supports(InputType::SlimRetrieval),
                source == DocumentSource::Slack,
                "{} slim flag",
                source
            );
        }
    }

    #[test]
    fn test_capability_check_is_independent_of_table_key() {
        // Web is a single entry registered for every mode but only loads
        let err = identify_connector_class(DocumentSource::Web, Some(InputType::Poll)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Connector for source=web does not accept input_type=poll"
        );
        assert!(identify_connector_class(DocumentSource::Github, Some(InputType::Event)).is_ok());
        assert!(identify_connector_class(DocumentSource::Gitlab, Some(InputType::Event)).is_err());
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let first = identify_connector_class(DocumentSource::Github, Some(InputType::Poll)).unwrap();
        let second = identify_connector_class(DocumentSource::Github, Some(InputType::Poll)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.capabilities(), Capabilities::NONE.with_load().with_poll().with_event());
    }

    #[test]
    fn test_tenant_context_only_for_tenant_aware_sources() {
        let config = json!({ "file_locations": ["a.txt"] }).as_object().cloned().unwrap();

        let file_config = with_tenant_context(DocumentSource::File, &config, Some("tenant_1"));
        assert_eq!(file_config.get(TENANT_ID_KEY), Some(&json!("tenant_1")));
        assert_eq!(file_config.len(), config.len() + 1);
        assert!(!config.contains_key(TENANT_ID_KEY));

        let web_config = with_tenant_context(DocumentSource::Web, &config, Some("tenant_1"));
        assert_eq!(web_config, config);

        let no_tenant = with_tenant_context(DocumentSource::File, &config, None);
        assert_eq!(no_tenant.get(TENANT_ID_KEY), Some(&serde_json::Value::Null));
    }

    #[test]
    fn test_declared_capabilities_match_instances() {
        let settings = ConnectorSettings::default();
        let sample_configs = [
            (DocumentSource::Web, json!({ "base_url": "https://docs.example.com" })),
            (DocumentSource::File, json!({ "file_locations": ["notes"], "tenant_id": null })),
            (DocumentSource::Slack, json!({})),
            (DocumentSource::Github, json!({ "repo_owner": "recap-ai" })),
            (DocumentSource::Gitlab, json!({ "project_owner": "recap", "project_name": "core" })),
            (DocumentSource::GoogleDrive, json!({})),
            (DocumentSource::Dropbox, json!({})),
            (DocumentSource::Notion, json!({})),
        ];
        assert_eq!(sample_configs.len(), registered_sources().len());

        for (source, config) in sample_configs {
            let descriptor = identify_connector_class(source, None).unwrap();
            let connector = descriptor
                .build(config.as_object().cloned().unwrap(), &settings)
                .unwrap_or_else(|e| panic!("{} failed to build: {}", source, e));
            assert_eq!(
                Capabilities::of_instance(connector.as_ref()),
                descriptor.capabilities(),
                "{} declares capabilities it does not implement",
                source
            );
            assert_eq!(connector.source(), source);
        }
    }
}
