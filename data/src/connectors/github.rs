use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, Section};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::error::{ConnectorError, ConnectorResult};
use super::http::{build_client, check_response, trim_base};
use super::traits::{BaseConnector, ConnectorClass, EventConnector, LoadConnector, PollConnector};
use super::types::{parse_config, required_secret, Capabilities, ConnectorSpecificConfig};

const PER_PAGE: usize = 100;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GithubConfig {
    repo_owner: String,
    #[serde(default)]
    repositories: Option<String>,
    #[serde(default = "default_true")]
    include_prs: bool,
    #[serde(default)]
    include_issues: bool,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubUser {
    login: String,
}

/// Pull requests and issues share this shape in the REST API
#[derive(Debug, Clone, Deserialize)]
struct GithubItem {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    state: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    user: Option<GithubUser>,
    #[serde(default)]
    pull_request: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    PullRequest,
    Issue,
}

impl ItemKind {
    fn as_str(&self) -> &'static str {
        match self {
            ItemKind::PullRequest => "PullRequest",
            ItemKind::Issue => "Issue",
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            ItemKind::PullRequest => "pulls",
            ItemKind::Issue => "issues",
        }
    }
}

/// Indexes pull requests and issues of a GitHub owner's repositories
pub struct GithubConnector {
    client: Client,
    api_url: String,
    repo_owner: String,
    repositories: Vec<String>,
    include_prs: bool,
    include_issues: bool,
    access_token: Option<String>,
}

impl GithubConnector {
    fn access_token(&self) -> ConnectorResult<&str> {
        self.access_token.as_deref().ok_or_else(|| {
            ConnectorError::CredentialMissing("GitHub credentials not loaded".to_string())
        })
    }

    async fn get_page<T: DeserializeOwned>(&self, path: &str, page: usize, extra: &[(&str, &str)]) -> ConnectorResult<Vec<T>> {
        let url = format!("{}/{}", trim_base(&self.api_url), path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.access_token()?)
            .header("Accept", "application/vnd.github.v3+json")
            .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())])
            .query(extra)
            .send()
            .await?;

        Ok(check_response("GitHub", response).await?.json().await?)
    }

    async fn repositories(&self) -> ConnectorResult<Vec<String>> {
        if !self.repositories.is_empty() {
            return Ok(self.repositories.clone());
        }

        let mut names = Vec::new();
        let path = format!("users/{}/repos", self.repo_owner);
        for page in 1.. {
            let repos: Vec<GithubRepo> = self.get_page(&path, page, &[]).await?;
            let done = repos.len() < PER_PAGE;
            names.extend(repos.into_iter().map(|r| r.name));
            if done {
                break;
            }
        }

        debug!("GitHub owner {} has {} repositories", self.repo_owner, names.len());
        Ok(names)
    }

    /// Items ordered by most recently updated, cut off once older than `start`
    async fn fetch_items(
        &self,
        repo: &str,
        kind: ItemKind,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Document>> {
        let path = format!("repos/{}/{}/{}", self.repo_owner, repo, kind.endpoint());
        let params = [("state", "all"), ("sort", "updated"), ("direction", "desc")];
        let mut documents = Vec::new();

        'pages: for page in 1.. {
            let items: Vec<GithubItem> = self.get_page(&path, page, &params).await?;
            let done = items.len() < PER_PAGE;

            for item in items {
                if start.map(|s| item.updated_at < s).unwrap_or(false) {
                    break 'pages;
                }
                if end.map(|e| item.updated_at > e).unwrap_or(false) {
                    continue;
                }
                // the issues endpoint also lists pull requests
                if kind == ItemKind::Issue && item.pull_request.is_some() {
                    continue;
                }
                documents.push(item_document(repo, kind, &item));
            }

            if done {
                break;
            }
        }

        Ok(documents)
    }

    async fn fetch_all(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Document>> {
        let mut documents = Vec::new();

        for repo in self.repositories().await? {
            if self.include_prs {
                documents.extend(self.fetch_items(&repo, ItemKind::PullRequest, start, end).await?);
            }
            if self.include_issues {
                documents.extend(self.fetch_items(&repo, ItemKind::Issue, start, end).await?);
            }
        }

        info!("✅ GitHub {} produced {} documents", self.repo_owner, documents.len());
        Ok(documents)
    }
}

#[async_trait]
impl BaseConnector for GithubConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::Github
    }

    async fn load_credentials(
        &mut self,
        credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        self.access_token = Some(required_secret(Self::NAME, credentials, "github_access_token")?);
        Ok(None)
    }

    fn as_load_connector(&self) -> Option<&dyn LoadConnector> {
        Some(self)
    }

    fn as_poll_connector(&self) -> Option<&dyn PollConnector> {
        Some(self)
    }

    fn as_event_connector(&self) -> Option<&dyn EventConnector> {
        Some(self)
    }
}

#[async_trait]
impl LoadConnector for GithubConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>> {
        self.fetch_all(None, None).await
    }
}

#[async_trait]
impl PollConnector for GithubConnector {
    async fn poll_source(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>> {
        self.fetch_all(Some(start), Some(end)).await
    }
}

#[async_trait]
impl EventConnector for GithubConnector {
    /// Accepts `pull_request` and `issues` webhook deliveries; other events yield nothing
    async fn handle_event(&self, payload: Value) -> ConnectorResult<Vec<Document>> {
        let owner = payload
            .pointer("/repository/owner/login")
            .and_then(|v| v.as_str());
        let repo = payload.pointer("/repository/name").and_then(|v| v.as_str());

        let (Some(owner), Some(repo)) = (owner, repo) else {
            return Err(ConnectorError::SerializationError(
                "GitHub event without repository".to_string(),
            ));
        };
        if !owner.eq_ignore_ascii_case(&self.repo_owner)
            || (!self.repositories.is_empty() && !self.repositories.iter().any(|r| r == repo))
        {
            debug!("Ignoring GitHub event for {}/{}", owner, repo);
            return Ok(Vec::new());
        }

        let (kind, item) = if let Some(pr) = payload.get("pull_request") {
            (ItemKind::PullRequest, pr)
        } else if let Some(issue) = payload.get("issue") {
            (ItemKind::Issue, issue)
        } else {
            return Ok(Vec::new());
        };

        let wanted = match kind {
            ItemKind::PullRequest => self.include_prs,
            ItemKind::Issue => self.include_issues,
        };
        if !wanted {
            return Ok(Vec::new());
        }

        let item: GithubItem = serde_json::from_value(item.clone())?;
        Ok(vec![item_document(repo, kind, &item)])
    }
}

impl ConnectorClass for GithubConnector {
    const NAME: &'static str = "GithubConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_load().with_poll().with_event();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: GithubConfig = parse_config(Self::NAME, config)?;
        if config.repo_owner.trim().is_empty() {
            return Err(ConnectorError::InvalidConfiguration(
                "GithubConnector: repo_owner is empty".to_string(),
            ));
        }

        let repositories = config
            .repositories
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            client: build_client(settings)?,
            api_url: settings.endpoints.github.clone(),
            repo_owner: config.repo_owner,
            repositories,
            include_prs: config.include_prs,
            include_issues: config.include_issues,
            access_token: None,
        })
    }
}

fn item_document(repo: &str, kind: ItemKind, item: &GithubItem) -> Document {
    let body = item.body.clone().unwrap_or_default();
    let owners = item.user.iter().map(|u| u.login.clone()).collect();

    Document::new(
        item.html_url.as_str(),
        DocumentSource::Github,
        format!("{}: {}", item.number, item.title),
        vec![Section::new(Some(item.html_url.clone()), body)],
    )
    .with_title(item.title.as_str())
    .with_metadata("repo", repo)
    .with_metadata("state", item.state.as_str())
    .with_metadata("object_type", kind.as_str())
    .with_updated_at(Some(item.updated_at))
    .with_owners(owners)
}
