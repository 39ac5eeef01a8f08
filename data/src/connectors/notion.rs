use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, Section};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::error::{ConnectorError, ConnectorResult};
use super::http::{build_client, check_response, trim_base};
use super::traits::{BaseConnector, ConnectorClass, LoadConnector, PollConnector};
use super::types::{parse_config, required_secret, Capabilities, ConnectorSpecificConfig};

const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotionConfig {
    #[serde(default)]
    root_page_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NotionPage {
    id: String,
    #[serde(default)]
    url: Option<String>,
    last_edited_time: DateTime<Utc>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    properties: Value,
}

impl NotionPage {
    fn title(&self) -> String {
        self.properties
            .as_object()
            .and_then(|props| {
                props
                    .values()
                    .find(|p| p.get("type").and_then(|t| t.as_str()) == Some("title"))
            })
            .and_then(|p| p.get("title"))
            .map(plain_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct NotionList<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Notion pages shared with the integration
pub struct NotionConnector {
    client: Client,
    api_url: String,
    root_page_id: Option<String>,
    token: Option<String>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl NotionConnector {
    fn request(&self, builder: RequestBuilder) -> ConnectorResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or_else(|| {
            ConnectorError::CredentialMissing("Notion credentials not loaded".to_string())
        })?;
        Ok(builder.bearer_auth(token).header("Notion-Version", NOTION_VERSION))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", trim_base(&self.api_url), path)
    }

    /// Pages visible to the integration, most recently edited first.
    /// Stops paging once pages are older than `since`.
    async fn search_pages(&self, since: Option<DateTime<Utc>>) -> ConnectorResult<Vec<NotionPage>> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": { "property": "object", "value": "page" },
                "sort": { "direction": "descending", "timestamp": "last_edited_time" },
                "page_size": PAGE_SIZE,
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let response = self.request(self.client.post(self.url("search")))?.json(&body).send().await?;
            let list: NotionList<NotionPage> = check_response("Notion", response).await?.json().await?;

            let mut reached_window_start = false;
            for page in list.results {
                if since.map(|s| page.last_edited_time < s).unwrap_or(false) {
                    reached_window_start = true;
                    break;
                }
                pages.push(page);
            }

            cursor = list.next_cursor;
            if reached_window_start || !list.has_more || cursor.is_none() {
                break;
            }
        }

        Ok(pages)
    }

    async fn get_page(&self, page_id: &str) -> ConnectorResult<NotionPage> {
        let response = self
            .request(self.client.get(self.url(&format!("pages/{}", page_id))))?
            .send()
            .await?;
        Ok(check_response("Notion", response).await?.json().await?)
    }

    async fn block_children(&self, block_id: &str) -> ConnectorResult<Vec<Value>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(c) = &cursor {
                params.push(("start_cursor", c.clone()));
            }

            let response = self
                .request(self.client.get(self.url(&format!("blocks/{}/children", block_id))))?
                .query(&params)
                .send()
                .await?;
            let list: NotionList<Value> = check_response("Notion", response).await?.json().await?;
            blocks.extend(list.results);

            cursor = list.next_cursor;
            if !list.has_more || cursor.is_none() {
                break;
            }
        }

        Ok(blocks)
    }

    /// Appends the text of `block_id`'s descendants; sub-pages are collected, not inlined
    fn render_blocks<'a>(
        &'a self,
        block_id: &'a str,
        out: &'a mut Vec<String>,
        child_pages: &'a mut Vec<String>,
    ) -> BoxFuture<'a, ConnectorResult<()>> {
        Box::pin(async move {
            for block in self.block_children(block_id).await? {
                let Some(id) = block.get("id").and_then(|v| v.as_str()) else {
                    continue;
                };
                let block_type = block.get("type").and_then(|t| t.as_str()).unwrap_or("");

                if block_type == "child_page" {
                    child_pages.push(id.to_string());
                    continue;
                }
                if let Some(line) = render_block(&block) {
                    out.push(line);
                }
                if block.get("has_children").and_then(|v| v.as_bool()).unwrap_or(false) {
                    self.render_blocks(id, out, child_pages).await?;
                }
            }
            Ok(())
        })
    }

    async fn page_document(&self, page: &NotionPage, child_pages: &mut Vec<String>) -> ConnectorResult<Document> {
        let mut lines = Vec::new();
        self.render_blocks(&page.id, &mut lines, child_pages).await?;

        let title = page.title();
        Ok(Document::new(
            page.id.as_str(),
            DocumentSource::Notion,
            title.clone(),
            vec![Section::new(page.url.clone(), lines.join("\n"))],
        )
        .with_title(title)
        .with_updated_at(Some(page.last_edited_time)))
    }

    async fn fetch_documents(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ConnectorResult<Vec<Document>> {
        let in_window = |page: &NotionPage| {
            !page.archived
                && start.map(|s| page.last_edited_time >= s).unwrap_or(true)
                && end.map(|e| page.last_edited_time <= e).unwrap_or(true)
        };
        let mut documents = Vec::new();

        match &self.root_page_id {
            None => {
                for page in self.search_pages(start).await? {
                    if in_window(&page) {
                        let mut ignored = Vec::new();
                        documents.push(self.page_document(&page, &mut ignored).await?);
                    }
                }
            }
            Some(root) => {
                // every page under the root is visited; only edited ones are emitted
                let mut pending = vec![root.clone()];
                let mut seen = HashSet::new();
                while let Some(page_id) = pending.pop() {
                    if !seen.insert(page_id.clone()) {
                        continue;
                    }
                    let page = self.get_page(&page_id).await?;
                    let mut children = Vec::new();
                    let document = self.page_document(&page, &mut children).await?;
                    if in_window(&page) {
                        documents.push(document);
                    }
                    pending.extend(children);
                }
            }
        }

        info!("✅ Notion produced {} documents", documents.len());
        Ok(documents)
    }
}

fn plain_text(rich_text: &Value) -> String {
    rich_text
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn render_block(block: &Value) -> Option<String> {
    let block_type = block.get("type")?.as_str()?;
    let body = block.get(block_type)?;
    let text = plain_text(body.get("rich_text")?);

    let line = match block_type {
        "paragraph" | "callout" => text,
        "heading_1" => format!("# {}", text),
        "heading_2" => format!("## {}", text),
        "heading_3" => format!("### {}", text),
        "bulleted_list_item" => format!("- {}", text),
        "numbered_list_item" => format!("1. {}", text),
        "quote" => format!("> {}", text),
        "to_do" => {
            let checked = body.get("checked").and_then(|c| c.as_bool()).unwrap_or(false);
            format!("[{}] {}", if checked { "x" } else { " " }, text)
        }
        "code" => {
            let language = body.get("language").and_then(|l| l.as_str()).unwrap_or("");
            format!("```{}\n{}\n```", language, text)
        }
        other => {
            debug!("Skipping Notion block type {}", other);
            return None;
        }
    };

    (!line.trim().is_empty()).then_some(line)
}

#[async_trait]
impl BaseConnector for NotionConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::Notion
    }

    async fn load_credentials(
        &mut self,
        credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        self.token = Some(required_secret(Self::NAME, credentials, "notion_integration_token")?);
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
impl LoadConnector for NotionConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>> {
        self.fetch_documents(None, None).await
    }
}

#[async_trait]
impl PollConnector for NotionConnector {
    async fn poll_source(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConnectorResult<Vec<Document>> {
        self.fetch_documents(Some(start), Some(end)).await
    }
}

impl ConnectorClass for NotionConnector {
    const NAME: &'static str = "NotionConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_load().with_poll();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: NotionConfig = parse_config(Self::NAME, config)?;

        Ok(Self {
            client: build_client(settings)?,
            api_url: settings.endpoints.notion.clone(),
            root_page_id: config.root_page_id.filter(|id| !id.is_empty()),
            token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(block_type: &str, extra: Value) -> Value {
        let mut body = json!({ "rich_text": [{ "plain_text": "Hello " }, { "plain_text": "world" }] });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        let mut block = json!({ "id": "b1", "type": block_type });
        block[block_type] = body;
        block
    }

    #[test]
    fn test_render_block_types() {
        assert_eq!(render_block(&block("paragraph", json!({}))).unwrap(), "Hello world");
        assert_eq!(render_block(&block("heading_2", json!({}))).unwrap(), "## Hello world");
        assert_eq!(
            render_block(&block("to_do", json!({ "checked": true }))).unwrap(),
            "[x] Hello world"
        );
        assert_eq!(
            render_block(&block("code", json!({ "language": "rust" }))).unwrap(),
            "```rust\nHello world\n```"
        );
        assert!(render_block(&block("image", json!({}))).is_none());
    }

    #[test]
    fn test_page_title_from_properties() {
        let page: NotionPage = serde_json::from_value(json!({
            "id": "p1",
            "last_edited_time": "2024-01-01T00:00:00.000Z",
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": "Runbook" }] },
                "Tags": { "type": "multi_select" }
            }
        }))
        .unwrap();
        assert_eq!(page.title(), "Runbook");

        let untitled: NotionPage =
            serde_json::from_value(json!({ "id": "p2", "last_edited_time": "2024-01-01T00:00:00Z" })).unwrap();
        assert_eq!(untitled.title(), "Untitled");
    }
}
