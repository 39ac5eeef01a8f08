use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, InputType};
use serde::de::DeserializeOwned;
use std::fmt;

use super::error::{ConnectorError, ConnectorResult};
use super::traits::{BaseConnector, ConnectorClass};

/// Caller-owned, source-specific constructor arguments
pub type ConnectorSpecificConfig = serde_json::Map<String, serde_json::Value>;

/// Config key the tenant id is injected under for tenant-aware sources
pub const TENANT_ID_KEY: &str = "tenant_id";

/// Input modes a connector type can be driven in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub load_state: bool,
    pub poll: bool,
    pub slim_retrieval: bool,
    pub event: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        load_state: false,
        poll: false,
        slim_retrieval: false,
        event: false,
    };

    pub const fn with_load(mut self) -> Self {
        self.load_state = true;
        self
    }

    pub const fn with_poll(mut self) -> Self {
        self.poll = true;
        self
    }

    pub const fn with_slim(mut self) -> Self {
        self.slim_retrieval = true;
        self
    }

    pub const fn with_event(mut self) -> Self {
        self.event = true;
        self
    }

    pub fn supports(&self, input_type: InputType) -> bool {
        match input_type {
            InputType::LoadState => self.load_state,
            InputType::Poll => self.poll,
            InputType::SlimRetrieval => self.slim_retrieval,
            InputType::Event => self.event,
        }
    }

    /// Capabilities a live instance actually exposes
    pub fn of_instance(connector: &dyn BaseConnector) -> Self {
        Self {
            load_state: connector.as_load_connector().is_some(),
            poll: connector.as_poll_connector().is_some(),
            slim_retrieval: connector.as_slim_connector().is_some(),
            event: connector.as_event_connector().is_some(),
        }
    }
}

type BuildFn = fn(ConnectorSpecificConfig, &ConnectorSettings) -> ConnectorResult<Box<dyn BaseConnector>>;

fn build_boxed<C: ConnectorClass>(
    config: ConnectorSpecificConfig,
    settings: &ConnectorSettings,
) -> ConnectorResult<Box<dyn BaseConnector>> {
    Ok(Box::new(C::from_config(config, settings)?))
}

/// Handle on a registered, not yet instantiated connector type
#[derive(Clone, Copy)]
pub struct ConnectorDescriptor {
    name: &'static str,
    capabilities: Capabilities,
    build: BuildFn,
}

impl ConnectorDescriptor {
    pub fn of<C: ConnectorClass>() -> Self {
        Self {
            name: C::NAME,
            capabilities: C::CAPABILITIES,
            build: build_boxed::<C>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn supports(&self, input_type: InputType) -> bool {
        self.capabilities.supports(input_type)
    }

    /// Runs the connector constructor
    pub fn build(
        &self,
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Box<dyn BaseConnector>> {
        (self.build)(config, settings)
    }
}

impl fmt::Debug for ConnectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorDescriptor")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl PartialEq for ConnectorDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.capabilities == other.capabilities
    }
}

impl Eq for ConnectorDescriptor {}

/// Deserializes connector arguments, rejecting unknown or missing keys
pub fn parse_config<T: DeserializeOwned>(
    connector: &str,
    config: ConnectorSpecificConfig,
) -> ConnectorResult<T> {
    serde_json::from_value(serde_json::Value::Object(config)).map_err(|e| {
        ConnectorError::InvalidConfiguration(format!("{}: {}", connector, e))
    })
}

/// Non-empty string secret stored under `key`
pub fn required_secret(
    connector: &str,
    credentials: &CredentialJson,
    key: &str,
) -> ConnectorResult<String> {
    credentials
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| ConnectorError::CredentialMissing(format!("{} requires {}", connector, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct SampleConfig {
        base_url: String,
        #[serde(default)]
        depth: usize,
    }

    fn config(value: serde_json::Value) -> ConnectorSpecificConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_config_accepts_known_keys() {
        let parsed: SampleConfig =
            parse_config("sample", config(json!({ "base_url": "https://a.b" }))).unwrap();
        assert_eq!(parsed.base_url, "https://a.b");
        assert_eq!(parsed.depth, 0);
    }

    #[test]
    fn test_parse_config_rejects_unknown_and_missing_keys() {
        let unknown = parse_config::<SampleConfig>(
            "sample",
            config(json!({ "base_url": "https://a.b", "colour": "red" })),
        );
        assert!(matches!(unknown, Err(ConnectorError::InvalidConfiguration(_))));

        let missing = parse_config::<SampleConfig>("sample", config(json!({})));
        assert!(matches!(missing, Err(ConnectorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_required_secret() {
        let creds = config(json!({ "token": "abc", "empty": "" }));
        assert_eq!(required_secret("x", &creds, "token").unwrap(), "abc");
        assert!(matches!(
            required_secret("x", &creds, "empty"),
            Err(ConnectorError::CredentialMissing(_))
        ));
        assert!(required_secret("x", &creds, "absent").is_err());
    }

    #[test]
    fn test_capability_builder() {
        const CAPS: Capabilities = Capabilities::NONE.with_poll().with_slim();
        assert!(CAPS.supports(InputType::Poll));
        assert!(CAPS.supports(InputType::SlimRetrieval));
        assert!(!CAPS.supports(InputType::LoadState));
        assert!(!CAPS.supports(InputType::Event));
    }
}
