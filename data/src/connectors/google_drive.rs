use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret, RefreshToken,
    TokenResponse, TokenUrl,
};
use recap_config::{ConnectorSettings, GoogleOAuthApp};
use recap_models::{CredentialJson, Document, DocumentSource, Section};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::error::{ConnectorError, ConnectorResult};
use super::http::{build_client, check_response, trim_base};
use super::traits::{BaseConnector, ConnectorClass, LoadConnector, PollConnector};
use super::types::{parse_config, Capabilities, ConnectorSpecificConfig};

const GOOGLE_TOKENS_KEY: &str = "google_tokens";
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "nextPageToken,files(id,name,mimeType,modifiedTime,webViewLink,owners(emailAddress))";
/// Tokens this close to expiry are refreshed up front
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GoogleDriveConfig {
    #[serde(default)]
    folder_ids: Vec<String>,
    #[serde(default)]
    include_shared: bool,
}

/// OAuth token bundle stored under `google_tokens`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleTokens {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl GoogleTokens {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return true;
        }
        self.expiry
            .map(|expiry| expiry - Duration::seconds(EXPIRY_MARGIN_SECS) <= now)
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveOwner {
    #[serde(default)]
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    web_view_link: Option<String>,
    #[serde(default)]
    owners: Vec<DriveOwner>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// How a Drive file's text is obtained
enum ContentFetch {
    Export(&'static str),
    Download,
    Skip,
}

fn content_fetch(mime_type: &str) -> ContentFetch {
    match mime_type {
        "application/vnd.google-apps.document" => ContentFetch::Export("text/plain"),
        "application/vnd.google-apps.presentation" => ContentFetch::Export("text/plain"),
        "application/vnd.google-apps.spreadsheet" => ContentFetch::Export("text/csv"),
        m if m.starts_with("text/") || m == "application/json" => ContentFetch::Download,
        _ => ContentFetch::Skip,
    }
}

/// Google Drive files, with OAuth access token refresh
pub struct GoogleDriveConnector {
    client: Client,
    api_url: String,
    token_url: String,
    oauth_app: GoogleOAuthApp,
    folder_ids: Vec<String>,
    include_shared: bool,
    access_token: Option<String>,
}

impl GoogleDriveConnector {
    fn access_token(&self) -> ConnectorResult<&str> {
        self.access_token.as_deref().ok_or_else(|| {
            ConnectorError::CredentialMissing("Google Drive credentials not loaded".to_string())
        })
    }

    async fn refresh(&self, tokens: &GoogleTokens) -> ConnectorResult<GoogleTokens> {
        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            ConnectorError::AuthenticationFailed(
                "Google token expired and no refresh token found".to_string(),
            )
        })?;
        let client_id = tokens
            .client_id
            .clone()
            .or_else(|| self.oauth_app.client_id.clone())
            .ok_or_else(|| ConnectorError::CredentialMissing("Google OAuth client_id".to_string()))?;
        let client_secret = tokens
            .client_secret
            .clone()
            .or_else(|| self.oauth_app.client_secret.clone());

        let client = BasicClient::new(
            ClientId::new(client_id),
            client_secret.map(ClientSecret::new),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                .map_err(|e| ConnectorError::InvalidConfiguration(e.to_string()))?,
            Some(
                TokenUrl::new(self.token_url.clone())
                    .map_err(|e| ConnectorError::InvalidConfiguration(e.to_string()))?,
            ),
        );

        let token_result = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| ConnectorError::AuthenticationFailed(format!("Google token refresh failed: {}", e)))?;

        Ok(GoogleTokens {
            token: token_result.access_token().secret().clone(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| tokens.refresh_token.clone()),
            client_id: tokens.client_id.clone(),
            client_secret: tokens.client_secret.clone(),
            expiry: token_result
                .expires_in()
                .and_then(|d| Duration::from_std(d).ok())
                .map(|d| Utc::now() + d),
        })
    }

    async fn list_page(&self, query: &str, page_token: Option<&str>) -> ConnectorResult<DriveFileList> {
        let url = format!("{}/files", trim_base(&self.api_url));
        let shared = self.include_shared.to_string();
        let mut params = vec![
            ("q", query),
            ("pageSize", "100"),
            ("fields", FILE_FIELDS),
            ("supportsAllDrives", shared.as_str()),
            ("includeItemsFromAllDrives", shared.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.access_token()?)
            .query(&params)
            .send()
            .await?;
        Ok(check_response("Google Drive", response).await?.json().await?)
    }

    async fn list_query(&self, query: &str) -> ConnectorResult<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(query, page_token.as_deref()).await?;
            files.extend(page.files);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(files)
    }

    /// Every non-folder file in scope; configured folders are walked recursively
    async fn list_files(&self) -> ConnectorResult<Vec<DriveFile>> {
        if self.folder_ids.is_empty() {
            let query = if self.include_shared {
                format!("trashed = false and mimeType != '{}'", FOLDER_MIME)
            } else {
                format!("trashed = false and mimeType != '{}' and 'me' in owners", FOLDER_MIME)
            };
            return self.list_query(&query).await;
        }

        let mut files = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = self.folder_ids.clone();

        while let Some(folder_id) = pending.pop() {
            if !seen.insert(folder_id.clone()) {
                continue;
            }
            let query = format!("'{}' in parents and trashed = false", folder_id);
            for file in self.list_query(&query).await? {
                if file.mime_type == FOLDER_MIME {
                    pending.push(file.id);
                } else {
                    files.push(file);
                }
            }
        }

        Ok(files)
    }

    async fn file_text(&self, file: &DriveFile) -> ConnectorResult<Option<String>> {
        let base = trim_base(&self.api_url);
        let request = match content_fetch(&file.mime_type) {
            ContentFetch::Export(export_mime) => self
                .client
                .get(format!("{}/files/{}/export", base, file.id))
                .query(&[("mimeType", export_mime)]),
            ContentFetch::Download => self
                .client
                .get(format!("{}/files/{}", base, file.id))
                .query(&[("alt", "media")]),
            ContentFetch::Skip => {
                debug!("Skipping Drive file {} ({})", file.name, file.mime_type);
                return Ok(None);
            }
        };

        let response = request.bearer_auth(self.access_token()?).send().await?;
        Ok(Some(check_response("Google Drive", response).await?.text().await?))
    }

    async fn fetch_documents(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Document>> {
        let mut documents = Vec::new();

        for file in self.list_files().await? {
            let in_window = match file.modified_time {
                Some(modified) => {
                    start.map(|s| modified >= s).unwrap_or(true) && end.map(|e| modified <= e).unwrap_or(true)
                }
                None => start.is_none(),
            };
            if !in_window {
                continue;
            }

            let text = match self.file_text(&file).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e @ ConnectorError::AuthenticationFailed(_)) => return Err(e),
                Err(e) => {
                    warn!("Failed to fetch Drive file {}: {}", file.name, e);
                    continue;
                }
            };

            let owners = file.owners.into_iter().filter_map(|o| o.email_address).collect();
            let link = file.web_view_link.clone();
            documents.push(
                Document::new(
                    link.clone().unwrap_or_else(|| file.id.clone()),
                    DocumentSource::GoogleDrive,
                    file.name.clone(),
                    vec![Section::new(link, text)],
                )
                .with_title(file.name)
                .with_metadata("mime_type", file.mime_type)
                .with_updated_at(file.modified_time)
                .with_owners(owners),
            );
        }

        info!("✅ Google Drive produced {} documents", documents.len());
        Ok(documents)
    }
}

#[async_trait]
impl BaseConnector for GoogleDriveConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::GoogleDrive
    }

    async fn load_credentials(
        &mut self,
        credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        let raw = credentials.get(GOOGLE_TOKENS_KEY).cloned().ok_or_else(|| {
            ConnectorError::CredentialMissing(format!("{} requires {}", Self::NAME, GOOGLE_TOKENS_KEY))
        })?;
        // older rows store the bundle as a JSON string
        let tokens: GoogleTokens = match raw {
            serde_json::Value::String(encoded) => serde_json::from_str(&encoded)?,
            other => serde_json::from_value(other)?,
        };

        if !tokens.needs_refresh(Utc::now()) {
            self.access_token = Some(tokens.token);
            return Ok(None);
        }

        info!("🔑 Google Drive access token expired, refreshing");
        let refreshed = self.refresh(&tokens).await?;
        self.access_token = Some(refreshed.token.clone());

        let mut updated = credentials.clone();
        updated.insert(GOOGLE_TOKENS_KEY.to_string(), serde_json::to_value(&refreshed)?);
        Ok(Some(updated))
    }

    fn as_load_connector(&self) -> Option<&dyn LoadConnector> {
        Some(self)
    }

    fn as_poll_connector(&self) -> Option<&dyn PollConnector> {
        Some(self)
    }
}

#[async_trait]
impl LoadConnector for GoogleDriveConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>> {
        self.fetch_documents(None, None).await
    }
}

#[async_trait]
impl PollConnector for GoogleDriveConnector {
    async fn poll_source(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>> {
        self.fetch_documents(Some(start), Some(end)).await
    }
}

impl ConnectorClass for GoogleDriveConnector {
    const NAME: &'static str = "GoogleDriveConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_load().with_poll();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: GoogleDriveConfig = parse_config(Self::NAME, config)?;

        Ok(Self {
            client: build_client(settings)?,
            api_url: settings.endpoints.google_drive.clone(),
            token_url: settings.endpoints.google_oauth_token.clone(),
            oauth_app: settings.google_oauth.clone(),
            folder_ids: config.folder_ids,
            include_shared: config.include_shared,
            access_token: None,
        })
    }
}
