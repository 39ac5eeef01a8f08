use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, Section, SlimDocument};
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::error::{ConnectorError, ConnectorResult};
use super::http::{build_client, check_response, trim_base};
use super::traits::{BaseConnector, ConnectorClass, PollConnector, SlimConnector};
use super::types::{parse_config, required_secret, Capabilities, ConnectorSpecificConfig};

const PAGE_LIMIT: &str = "200";
const IGNORED_SUBTYPES: [&str; 4] = ["channel_join", "channel_leave", "channel_purpose", "channel_topic"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SlackConfig {
    #[serde(default)]
    channels: Option<Vec<String>>,
    #[serde(default)]
    channel_regex_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMessage {
    ts: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reply_count: Option<u32>,
}

impl SlackMessage {
    fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    fn has_replies(&self) -> bool {
        self.reply_count.unwrap_or(0) > 0 && self.thread_root() == self.ts
    }

    fn is_ignored(&self) -> bool {
        self.subtype
            .as_deref()
            .map(|s| IGNORED_SUBTYPES.contains(&s))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct ChannelPage {
    #[serde(default)]
    channels: Vec<SlackChannel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

fn next_cursor(metadata: &Option<ResponseMetadata>) -> Option<String> {
    metadata
        .as_ref()
        .map(|m| m.next_cursor.clone())
        .filter(|c| !c.is_empty())
}

enum ChannelFilter {
    All,
    Names(Vec<String>),
    Patterns(Vec<Regex>),
}

impl ChannelFilter {
    fn matches(&self, channel: &SlackChannel) -> bool {
        match self {
            ChannelFilter::All => true,
            ChannelFilter::Names(names) => names
                .iter()
                .any(|n| n.trim_start_matches('#') == channel.name),
            ChannelFilter::Patterns(patterns) => patterns.iter().any(|p| p.is_match(&channel.name)),
        }
    }
}

/// Pulls channel threads from the Slack Web API
pub struct SlackPollConnector {
    client: Client,
    api_url: String,
    filter: ChannelFilter,
    token: Option<String>,
}

impl SlackPollConnector {
    fn token(&self) -> ConnectorResult<&str> {
        self.token.as_deref().ok_or_else(|| {
            ConnectorError::CredentialMissing("Slack credentials not loaded".to_string())
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> ConnectorResult<T> {
        let url = format!("{}/{}", trim_base(&self.api_url), method);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token()?)
            .query(params)
            .send()
            .await?;
        let body: Value = check_response("Slack", response).await?.json().await?;

        if !body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let reason = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown_error")
                .to_string();
            return Err(match reason.as_str() {
                "invalid_auth" | "not_authed" | "token_revoked" | "account_inactive" => {
                    ConnectorError::AuthenticationFailed(format!("Slack {}: {}", method, reason))
                }
                "ratelimited" => ConnectorError::RateLimitExceeded(format!("Slack {}", method)),
                _ => ConnectorError::HttpError(format!("Slack {} failed: {}", method, reason)),
            });
        }

        Ok(serde_json::from_value(body)?)
    }

    pub async fn list_channels(&self) -> ConnectorResult<Vec<SlackChannel>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("types", "public_channel".to_string()),
                ("exclude_archived", "true".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let page: ChannelPage = self.call("conversations.list", &params).await?;
            channels.extend(page.channels.into_iter().filter(|c| self.filter.matches(c)));

            cursor = next_cursor(&page.response_metadata);
            if cursor.is_none() {
                break;
            }
        }

        debug!("Slack channels selected: {}", channels.len());
        Ok(channels)
    }

    async fn history(
        &self,
        channel: &SlackChannel,
        oldest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<SlackMessage>> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("channel", channel.id.clone()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(oldest) = oldest {
                params.push(("oldest", to_slack_ts(oldest)));
            }
            if let Some(latest) = latest {
                params.push(("latest", to_slack_ts(latest)));
            }
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let page: MessagePage = self.call("conversations.history", &params).await?;
            messages.extend(page.messages.into_iter().filter(|m| !m.is_ignored()));

            cursor = next_cursor(&page.response_metadata);
            if !page.has_more || cursor.is_none() {
                break;
            }
        }

        Ok(messages)
    }

    async fn replies(&self, channel: &SlackChannel, thread_ts: &str) -> ConnectorResult<Vec<SlackMessage>> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("channel", channel.id.clone()),
                ("ts", thread_ts.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let page: MessagePage = self.call("conversations.replies", &params).await?;
            messages.extend(page.messages.into_iter().filter(|m| !m.is_ignored()));

            cursor = next_cursor(&page.response_metadata);
            if !page.has_more || cursor.is_none() {
                break;
            }
        }

        Ok(messages)
    }

    async fn channel_documents(
        &self,
        channel: &SlackChannel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>> {
        let mut documents = Vec::new();

        for message in self.history(channel, Some(start), Some(end)).await? {
            let thread = if message.has_replies() {
                self.replies(channel, &message.ts).await?
            } else {
                vec![message]
            };
            if let Some(document) = thread_document(channel, &thread) {
                documents.push(document);
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl BaseConnector for SlackPollConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::Slack
    }

    async fn load_credentials(
        &mut self,
        credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        self.token = Some(required_secret(Self::NAME, credentials, "slack_bot_token")?);
        Ok(None)
    }

    fn as_poll_connector(&self) -> Option<&dyn PollConnector> {
        Some(self)
    }

    fn as_slim_connector(&self) -> Option<&dyn SlimConnector> {
        Some(self)
    }
}

#[async_trait]
impl PollConnector for SlackPollConnector {
    async fn poll_source(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>> {
        let mut documents = Vec::new();
        for channel in self.list_channels().await? {
            documents.extend(self.channel_documents(&channel, start, end).await?);
        }

        info!("✅ Slack poll produced {} thread documents", documents.len());
        Ok(documents)
    }
}

#[async_trait]
impl SlimConnector for SlackPollConnector {
    async fn retrieve_all_slim_documents(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<SlimDocument>> {
        let mut ids = BTreeSet::new();
        for channel in self.list_channels().await? {
            for message in self.history(&channel, start, end).await? {
                ids.insert(thread_id(&channel, message.thread_root()));
            }
        }

        Ok(ids.into_iter().map(|id| SlimDocument { id }).collect())
    }
}

impl ConnectorClass for SlackPollConnector {
    const NAME: &'static str = "SlackPollConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_poll().with_slim();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: SlackConfig = parse_config(Self::NAME, config)?;

        let filter = match config.channels {
            None => ChannelFilter::All,
            Some(channels) if channels.is_empty() => ChannelFilter::All,
            Some(channels) if config.channel_regex_enabled => ChannelFilter::Patterns(
                channels
                    .iter()
                    .map(|p| {
                        Regex::new(p).map_err(|e| {
                            ConnectorError::InvalidConfiguration(format!("channel pattern {}: {}", p, e))
                        })
                    })
                    .collect::<ConnectorResult<Vec<_>>>()?,
            ),
            Some(channels) => ChannelFilter::Names(channels),
        };

        Ok(Self {
            client: build_client(settings)?,
            api_url: settings.endpoints.slack.clone(),
            filter,
            token: None,
        })
    }
}

fn thread_id(channel: &SlackChannel, thread_ts: &str) -> String {
    format!("{}__{}", channel.id, thread_ts)
}

fn to_slack_ts(time: DateTime<Utc>) -> String {
    format!("{}.{:06}", time.timestamp(), time.timestamp_subsec_micros())
}

fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, fraction) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{:0<6}", fraction).get(..6)?.parse().ok()?;
    Utc.timestamp_opt(secs, micros * 1_000).single()
}

/// One document per thread; messages become sections in posting order
fn thread_document(channel: &SlackChannel, thread: &[SlackMessage]) -> Option<Document> {
    let root = thread.first()?;
    let sections: Vec<Section> = thread
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| Section::new(None, m.text.clone()))
        .collect();
    if sections.is_empty() {
        return None;
    }

    let snippet: String = root.text.lines().next().unwrap_or("").chars().take(50).collect();
    let updated_at = thread.iter().filter_map(|m| parse_slack_ts(&m.ts)).max();
    let mut owners: Vec<String> = thread.iter().filter_map(|m| m.user.clone()).collect();
    owners.sort();
    owners.dedup();

    Some(
        Document::new(
            thread_id(channel, root.thread_root()),
            DocumentSource::Slack,
            format!("#{}: {}", channel.name, snippet),
            sections,
        )
        .with_metadata("channel", channel.name.as_str())
        .with_updated_at(updated_at)
        .with_owners(owners),
    )
}
