//! Source identifiers and input modes shared by the connector layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Logical origin of indexed content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    IngestionApi,
    Slack,
    Web,
    GoogleDrive,
    Gmail,
    Requesttracker,
    Github,
    Gitlab,
    Guru,
    Bookstack,
    Confluence,
    Slab,
    Jira,
    Productboard,
    File,
    Notion,
    Zulip,
    Linear,
    Hubspot,
    Document360,
    Gong,
    GoogleSites,
    Zendesk,
    Loopio,
    Dropbox,
    Sharepoint,
    Teams,
    Salesforce,
    Discourse,
    Axero,
    Clickup,
    Mediawiki,
    Wikipedia,
    Asana,
    S3,
    R2,
    GoogleCloudStorage,
    OciStorage,
    Xenforo,
    NotApplicable,
    Discord,
    Freshdesk,
    Fireflies,
    Egnyte,
    Airtable,
}

impl DocumentSource {
    pub const ALL: [DocumentSource; 45] = [
        DocumentSource::IngestionApi,
        DocumentSource::Slack,
        DocumentSource::Web,
        DocumentSource::GoogleDrive,
        DocumentSource::Gmail,
        DocumentSource::Requesttracker,
        DocumentSource::Github,
        DocumentSource::Gitlab,
        DocumentSource::Guru,
        DocumentSource::Bookstack,
        DocumentSource::Confluence,
        DocumentSource::Slab,
        DocumentSource::Jira,
        DocumentSource::Productboard,
        DocumentSource::File,
        DocumentSource::Notion,
        DocumentSource::Zulip,
        DocumentSource::Linear,
        DocumentSource::Hubspot,
        DocumentSource::Document360,
        DocumentSource::Gong,
        DocumentSource::GoogleSites,
        DocumentSource::Zendesk,
        DocumentSource::Loopio,
        DocumentSource::Dropbox,
        DocumentSource::Sharepoint,
        DocumentSource::Teams,
        DocumentSource::Salesforce,
        DocumentSource::Discourse,
        DocumentSource::Axero,
        DocumentSource::Clickup,
        DocumentSource::Mediawiki,
        DocumentSource::Wikipedia,
        DocumentSource::Asana,
        DocumentSource::S3,
        DocumentSource::R2,
        DocumentSource::GoogleCloudStorage,
        DocumentSource::OciStorage,
        DocumentSource::Xenforo,
        DocumentSource::NotApplicable,
        DocumentSource::Discord,
        DocumentSource::Freshdesk,
        DocumentSource::Fireflies,
        DocumentSource::Egnyte,
        DocumentSource::Airtable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::IngestionApi => "ingestion_api",
            DocumentSource::Slack => "slack",
            DocumentSource::Web => "web",
            DocumentSource::GoogleDrive => "google_drive",
            DocumentSource::Gmail => "gmail",
            DocumentSource::Requesttracker => "requesttracker",
            DocumentSource::Github => "github",
            DocumentSource::Gitlab => "gitlab",
            DocumentSource::Guru => "guru",
            DocumentSource::Bookstack => "bookstack",
            DocumentSource::Confluence => "confluence",
            DocumentSource::Slab => "slab",
            DocumentSource::Jira => "jira",
            DocumentSource::Productboard => "productboard",
            DocumentSource::File => "file",
            DocumentSource::Notion => "notion",
            DocumentSource::Zulip => "zulip",
            DocumentSource::Linear => "linear",
            DocumentSource::Hubspot => "hubspot",
            DocumentSource::Document360 => "document360",
            DocumentSource::Gong => "gong",
            DocumentSource::GoogleSites => "google_sites",
            DocumentSource::Zendesk => "zendesk",
            DocumentSource::Loopio => "loopio",
            DocumentSource::Dropbox => "dropbox",
            DocumentSource::Sharepoint => "sharepoint",
            DocumentSource::Teams => "teams",
            DocumentSource::Salesforce => "salesforce",
            DocumentSource::Discourse => "discourse",
            DocumentSource::Axero => "axero",
            DocumentSource::Clickup => "clickup",
            DocumentSource::Mediawiki => "mediawiki",
            DocumentSource::Wikipedia => "wikipedia",
            DocumentSource::Asana => "asana",
            DocumentSource::S3 => "s3",
            DocumentSource::R2 => "r2",
            DocumentSource::GoogleCloudStorage => "google_cloud_storage",
            DocumentSource::OciStorage => "oci_storage",
            DocumentSource::Xenforo => "xenforo",
            DocumentSource::NotApplicable => "not_applicable",
            DocumentSource::Discord => "discord",
            DocumentSource::Freshdesk => "freshdesk",
            DocumentSource::Fireflies => "fireflies",
            DocumentSource::Egnyte => "egnyte",
            DocumentSource::Airtable => "airtable",
        }
    }

    /// Whether connectors for this source need the owning tenant in their configuration
    pub fn requires_tenant_context(&self) -> bool {
        SOURCES_REQUIRING_TENANT_CONTEXT.contains(self)
    }
}

/// Sources whose connector configuration receives the tenant id
pub const SOURCES_REQUIRING_TENANT_CONTEXT: &[DocumentSource] = &[DocumentSource::File];

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown document source: {0}")]
pub struct ParseSourceError(pub String);

impl FromStr for DocumentSource {
    type Err = ParseSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentSource::ALL
            .iter()
            .copied()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| ParseSourceError(s.to_string()))
    }
}

/// How a connector is driven by the indexing job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// Full snapshot of the source
    LoadState,
    /// Changes inside a time window
    Poll,
    /// Push-driven change notifications
    Event,
    /// Document ids only, used for pruning
    SlimRetrieval,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::LoadState => "load_state",
            InputType::Poll => "poll",
            InputType::Event => "event",
            InputType::SlimRetrieval => "slim_retrieval",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown input type: {0}")]
pub struct ParseInputTypeError(pub String);

impl FromStr for InputType {
    type Err = ParseInputTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load_state" => Ok(InputType::LoadState),
            "poll" => Ok(InputType::Poll),
            "event" => Ok(InputType::Event),
            "slim_retrieval" => Ok(InputType::SlimRetrieval),
            other => Err(ParseInputTypeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names_round_trip_through_serde() {
        for source in DocumentSource::ALL {
            let encoded = serde_json::to_value(source).unwrap();
            assert_eq!(encoded, serde_json::Value::String(source.as_str().to_string()));
            assert_eq!(source.as_str().parse::<DocumentSource>().unwrap(), source);
        }
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let err = "unknown_source".parse::<DocumentSource>().unwrap_err();
        assert_eq!(err, ParseSourceError("unknown_source".to_string()));
    }

    #[test]
    fn test_only_file_requires_tenant_context() {
        let tenant_aware: Vec<_> = DocumentSource::ALL
            .iter()
            .filter(|s| s.requires_tenant_context())
            .collect();
        assert_eq!(tenant_aware, vec![&DocumentSource::File]);
    }

    #[test]
    fn test_input_type_parsing() {
        assert_eq!("slim_retrieval".parse::<InputType>().unwrap(), InputType::SlimRetrieval);
        assert!("push".parse::<InputType>().is_err());
    }
}
