use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mime_guess::from_path;
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, Section};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ConnectorError, ConnectorResult};
use super::http::{build_client, check_response, trim_base};
use super::traits::{BaseConnector, ConnectorClass, LoadConnector, PollConnector};
use super::types::{parse_config, required_secret, Capabilities, ConnectorSpecificConfig};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DropboxConfig {
    #[serde(default)]
    root_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DropboxEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    id: String,
    path_display: String,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct DropboxListFolderResult {
    entries: Vec<DropboxEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct DropboxListFolderRequest<'a> {
    path: &'a str,
    recursive: bool,
    include_deleted: bool,
}

/// Text files stored in a Dropbox account
pub struct DropboxConnector {
    client: Client,
    api_url: String,
    content_url: String,
    root_path: String,
    access_token: Option<String>,
}

impl DropboxConnector {
    fn access_token(&self) -> ConnectorResult<&str> {
        self.access_token.as_deref().ok_or_else(|| {
            ConnectorError::CredentialMissing("Dropbox credentials not loaded".to_string())
        })
    }

    async fn list_folder(&self) -> ConnectorResult<Vec<DropboxEntry>> {
        let request_body = DropboxListFolderRequest {
            path: &self.root_path,
            recursive: true,
            include_deleted: false,
        };

        let mut all_entries = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let request = match &cursor {
                Some(cursor) => self
                    .client
                    .post(format!("{}/files/list_folder/continue", trim_base(&self.api_url)))
                    .json(&serde_json::json!({ "cursor": cursor })),
                None => self
                    .client
                    .post(format!("{}/files/list_folder", trim_base(&self.api_url)))
                    .json(&request_body),
            };

            let response = request.bearer_auth(self.access_token()?).send().await?;
            let result: DropboxListFolderResult =
                check_response("Dropbox", response).await?.json().await?;

            all_entries.extend(result.entries);
            if !result.has_more {
                break;
            }
            cursor = Some(result.cursor);
        }

        Ok(all_entries)
    }

    async fn download_file(&self, path: &str) -> ConnectorResult<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/files/download", trim_base(&self.content_url)))
            .bearer_auth(self.access_token()?)
            .header("Dropbox-API-Arg", serde_json::to_string(&serde_json::json!({ "path": path }))?)
            .send()
            .await?;

        Ok(check_response("Dropbox", response).await?.bytes().await?.to_vec())
    }

    async fn fetch_documents(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Document>> {
        let mut documents = Vec::new();

        for entry in self.list_folder().await? {
            if entry.tag != "file" || !is_text_file(&entry.name) {
                continue;
            }
            let in_window = match entry.server_modified {
                Some(modified) => {
                    start.map(|s| modified >= s).unwrap_or(true) && end.map(|e| modified <= e).unwrap_or(true)
                }
                None => start.is_none(),
            };
            if !in_window {
                continue;
            }

            let bytes = match self.download_file(&entry.path_display).await {
                Ok(bytes) => bytes,
                Err(e @ ConnectorError::AuthenticationFailed(_)) => return Err(e),
                Err(e) => {
                    warn!("Failed to download {}: {}", entry.path_display, e);
                    continue;
                }
            };

            documents.push(
                Document::new(
                    entry.id,
                    DocumentSource::Dropbox,
                    entry.name.clone(),
                    vec![Section::new(None, String::from_utf8_lossy(&bytes).into_owned())],
                )
                .with_title(entry.name)
                .with_metadata("path", entry.path_display)
                .with_updated_at(entry.server_modified),
            );
        }

        info!("✅ Dropbox produced {} documents", documents.len());
        Ok(documents)
    }
}

fn is_text_file(name: &str) -> bool {
    let mime = from_path(name).first_or_octet_stream();
    mime.type_() == mime_guess::mime::TEXT || mime.essence_str() == "application/json"
}

#[async_trait]
impl BaseConnector for DropboxConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::Dropbox
    }

    async fn load_credentials(
        &mut self,
        credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        self.access_token = Some(required_secret(Self::NAME, credentials, "dropbox_access_token")?);
        Ok(None)
    }

    fn as_load_connector(&self) -> Option<&dyn LoadConnector> {
        Some(self)
    }

    fn as_poll_connector(&self) -> Option<&dyn PollConnector> {
        Some(self)
    }
}

#[async_trait]
impl LoadConnector for DropboxConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>> {
        self.fetch_documents(None, None).await
    }
}

#[async_trait]
impl PollConnector for DropboxConnector {
    async fn poll_source(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>> {
        self.fetch_documents(Some(start), Some(end)).await
    }
}

impl ConnectorClass for DropboxConnector {
    const NAME: &'static str = "DropboxConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_load().with_poll();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: DropboxConfig = parse_config(Self::NAME, config)?;

        // Dropbox names the account root "" rather than "/"
        let root_path = match config.root_path.as_deref().map(|p| p.trim_end_matches('/')) {
            None | Some("") => String::new(),
            Some(p) if p.starts_with('/') => p.to_string(),
            Some(p) => format!("/{}", p),
        };

        Ok(Self {
            client: build_client(settings)?,
            api_url: settings.endpoints.dropbox_api.clone(),
            content_url: settings.endpoints.dropbox_content.clone(),
            root_path,
            access_token: None,
        })
    }
}
