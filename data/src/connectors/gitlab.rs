use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, Section};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::error::{ConnectorError, ConnectorResult};
use super::http::{build_client, check_response, trim_base};
use super::traits::{BaseConnector, ConnectorClass, LoadConnector, PollConnector};
use super::types::{parse_config, required_secret, Capabilities, ConnectorSpecificConfig};

const PER_PAGE: usize = 100;
const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GitlabConfig {
    project_owner: String,
    project_name: String,
    #[serde(default = "default_true")]
    include_mrs: bool,
    #[serde(default = "default_true")]
    include_issues: bool,
}

#[derive(Debug, Deserialize)]
struct GitlabAuthor {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitlabItem {
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    web_url: String,
    state: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    author: Option<GitlabAuthor>,
}

/// Merge requests and issues of a single GitLab project
pub struct GitlabConnector {
    client: Client,
    project_owner: String,
    project_name: String,
    include_mrs: bool,
    include_issues: bool,
    gitlab_url: String,
    access_token: Option<String>,
}

impl GitlabConnector {
    fn project_path(&self) -> String {
        format!("{}/{}", self.project_owner, self.project_name)
    }

    async fn fetch_items(
        &self,
        endpoint: &str,
        object_type: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Document>> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            ConnectorError::CredentialMissing("GitLab credentials not loaded".to_string())
        })?;
        let url = format!(
            "{}/api/v4/projects/{}/{}",
            trim_base(&self.gitlab_url),
            urlencoding::encode(&self.project_path()),
            endpoint
        );

        let mut documents = Vec::new();
        'pages: for page in 1usize.. {
            let response = self
                .client
                .get(&url)
                .header("PRIVATE-TOKEN", token)
                .query(&[
                    ("state", "all".to_string()),
                    ("order_by", "updated_at".to_string()),
                    ("sort", "desc".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?;
            let items: Vec<GitlabItem> = check_response("GitLab", response).await?.json().await?;
            let done = items.len() < PER_PAGE;

            for item in items {
                if start.map(|s| item.updated_at < s).unwrap_or(false) {
                    break 'pages;
                }
                if end.map(|e| item.updated_at > e).unwrap_or(false) {
                    continue;
                }
                documents.push(self.item_document(object_type, item));
            }

            if done {
                break;
            }
        }

        Ok(documents)
    }

    fn item_document(&self, object_type: &str, item: GitlabItem) -> Document {
        let owners = item.author.into_iter().map(|a| a.username).collect();
        Document::new(
            item.web_url.as_str(),
            DocumentSource::Gitlab,
            format!("{}: {}", item.iid, item.title),
            vec![Section::new(Some(item.web_url.clone()), item.description.unwrap_or_default())],
        )
        .with_title(item.title)
        .with_metadata("project", self.project_path())
        .with_metadata("state", item.state)
        .with_metadata("object_type", object_type)
        .with_updated_at(Some(item.updated_at))
        .with_owners(owners)
    }

    async fn fetch_all(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Document>> {
        let mut documents = Vec::new();
        if self.include_mrs {
            documents.extend(self.fetch_items("merge_requests", "MergeRequest", start, end).await?);
        }
        if self.include_issues {
            documents.extend(self.fetch_items("issues", "Issue", start, end).await?);
        }

        info!("✅ GitLab {} produced {} documents", self.project_path(), documents.len());
        Ok(documents)
    }
}

#[async_trait]
impl BaseConnector for GitlabConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::Gitlab
    }

    async fn load_credentials(
        &mut self,
        credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        self.access_token = Some(required_secret(Self::NAME, credentials, "gitlab_access_token")?);
        if let Some(url) = credentials.get("gitlab_url").and_then(|v| v.as_str()) {
            if !url.is_empty() {
                self.gitlab_url = url.to_string();
            }
        }
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
impl LoadConnector for GitlabConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>> {
        self.fetch_all(None, None).await
    }
}

#[async_trait]
impl PollConnector for GitlabConnector {
    async fn poll_source(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>> {
        self.fetch_all(Some(start), Some(end)).await
    }
}

impl ConnectorClass for GitlabConnector {
    const NAME: &'static str = "GitlabConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_load().with_poll();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: GitlabConfig = parse_config(Self::NAME, config)?;

        Ok(Self {
            client: build_client(settings)?,
            project_owner: config.project_owner,
            project_name: config.project_name,
            include_mrs: config.include_mrs,
            include_issues: config.include_issues,
            gitlab_url: DEFAULT_GITLAB_URL.to_string(),
            access_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_credentials_override_instance_url() {
        let config = json!({ "project_owner": "recap", "project_name": "core" });
        let mut connector =
            GitlabConnector::from_config(config.as_object().cloned().unwrap(), &ConnectorSettings::default())
                .unwrap();
        assert_eq!(connector.gitlab_url, DEFAULT_GITLAB_URL);

        let creds = json!({ "gitlab_url": "https://git.internal", "gitlab_access_token": "glpat" });
        let refreshed = connector
            .load_credentials(creds.as_object().unwrap())
            .await
            .unwrap();

        assert!(refreshed.is_none());
        assert_eq!(connector.gitlab_url, "https://git.internal");
        assert_eq!(connector.project_path(), "recap/core");
    }

    #[test]
    fn test_project_name_is_required() {
        let config = json!({ "project_owner": "recap" });
        let result =
            GitlabConnector::from_config(config.as_object().cloned().unwrap(), &ConnectorSettings::default());
        assert!(matches!(result, Err(ConnectorError::InvalidConfiguration(_))));
    }
}
