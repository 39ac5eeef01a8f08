use async_trait::async_trait;
use recap_config::ConnectorSettings;
use recap_models::{CredentialJson, Document, DocumentSource, Section};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use tracing::{info, warn};
use url::Url;

use super::error::{ConnectorError, ConnectorResult};
use super::http::{build_client, check_response};
use super::traits::{BaseConnector, ConnectorClass, LoadConnector};
use super::types::{parse_config, Capabilities, ConnectorSpecificConfig};

const STRIPPED_ELEMENTS: [&str; 5] = ["script", "style", "nav", "footer", "noscript"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebConnectorType {
    /// Crawl every page reachable under the base URL
    #[default]
    Recursive,
    /// Only the base URL
    Single,
    /// Base URL points at a sitemap.xml
    Sitemap,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebConfig {
    base_url: String,
    #[serde(default)]
    web_connector_type: WebConnectorType,
}

/// Scrapes public web pages into documents
pub struct WebConnector {
    client: Client,
    base_url: Url,
    connector_type: WebConnectorType,
    max_pages: usize,
}

impl WebConnector {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn connector_type(&self) -> WebConnectorType {
        self.connector_type
    }

    async fn fetch_page(&self, url: &Url) -> ConnectorResult<(String, String)> {
        info!("🌐 Fetching content from: {}", url);

        let response = self.client.get(url.as_str()).send().await?;
        let response = check_response("Web", response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        Ok((response.text().await?, content_type))
    }

    async fn crawl(&self) -> ConnectorResult<Vec<Document>> {
        let mut documents = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([self.base_url.clone()]);

        while let Some(url) = queue.pop_front() {
            if documents.len() >= self.max_pages {
                warn!("Reached page limit of {} for {}", self.max_pages, self.base_url);
                break;
            }
            if !visited.insert(url.to_string()) {
                continue;
            }

            let (body, content_type) = match self.fetch_page(&url).await {
                Ok(page) => page,
                // the root page failing means the whole crawl is broken
                Err(e) if url == self.base_url => return Err(e),
                Err(e) => {
                    warn!("Failed to fetch {}: {}", url, e);
                    continue;
                }
            };

            if !content_type.contains("text/html") {
                documents.push(plain_document(&url, body));
                continue;
            }

            let page = Html::parse_document(&body);
            if self.connector_type == WebConnectorType::Recursive {
                for link in extract_links(&page, &url)? {
                    if is_under(&link, &self.base_url) && !visited.contains(link.as_str()) {
                        queue.push_back(link);
                    }
                }
            }
            documents.push(html_document(&url, &page)?);

            if self.connector_type == WebConnectorType::Single {
                break;
            }
        }

        Ok(documents)
    }

    async fn load_sitemap(&self) -> ConnectorResult<Vec<Document>> {
        let (body, _) = self.fetch_page(&self.base_url).await?;
        let urls = sitemap_urls(&body)?;
        info!("📄 Sitemap {} lists {} pages", self.base_url, urls.len());

        let mut documents = Vec::new();
        for url in urls.into_iter().take(self.max_pages) {
            match self.fetch_page(&url).await {
                Ok((body, content_type)) if content_type.contains("text/html") => {
                    documents.push(html_document(&url, &Html::parse_document(&body))?);
                }
                Ok((body, _)) => documents.push(plain_document(&url, body)),
                Err(e) => warn!("Failed to fetch {}: {}", url, e),
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl BaseConnector for WebConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn source(&self) -> DocumentSource {
        DocumentSource::Web
    }

    async fn load_credentials(
        &mut self,
        _credentials: &CredentialJson,
    ) -> ConnectorResult<Option<CredentialJson>> {
        // public pages only
        Ok(None)
    }

    fn as_load_connector(&self) -> Option<&dyn LoadConnector> {
        Some(self)
    }
}

#[async_trait]
impl LoadConnector for WebConnector {
    async fn load_from_state(&self) -> ConnectorResult<Vec<Document>> {
        let documents = match self.connector_type {
            WebConnectorType::Sitemap => self.load_sitemap().await?,
            WebConnectorType::Recursive | WebConnectorType::Single => self.crawl().await?,
        };
        info!("✅ Web connector loaded {} pages from {}", documents.len(), self.base_url);
        Ok(documents)
    }
}

impl ConnectorClass for WebConnector {
    const NAME: &'static str = "WebConnector";
    const CAPABILITIES: Capabilities = Capabilities::NONE.with_load();

    fn from_config(
        config: ConnectorSpecificConfig,
        settings: &ConnectorSettings,
    ) -> ConnectorResult<Self> {
        let config: WebConfig = parse_config(Self::NAME, config)?;

        let raw = if config.base_url.contains("://") {
            config.base_url
        } else {
            format!("https://{}", config.base_url)
        };
        let base_url = Url::parse(&raw)
            .map_err(|_| ConnectorError::InvalidConfiguration(format!("Invalid URL: {}", raw)))?;

        Ok(Self {
            client: build_client(settings)?,
            base_url,
            connector_type: config.web_connector_type,
            max_pages: settings.web_max_pages,
        })
    }
}

fn selector(css: &str) -> ConnectorResult<Selector> {
    Selector::parse(css)
        .map_err(|e| ConnectorError::SerializationError(format!("bad selector {}: {:?}", css, e)))
}

fn is_under(link: &Url, base: &Url) -> bool {
    link.host_str() == base.host_str() && link.path().starts_with(base.path())
}

fn extract_links(page: &Html, base_url: &Url) -> ConnectorResult<Vec<Url>> {
    let link_selector = selector("a[href]")?;
    let mut links = Vec::new();

    for element in page.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Ok(mut absolute) = base_url.join(href) {
            if absolute.scheme() != "http" && absolute.scheme() != "https" {
                continue;
            }
            absolute.set_fragment(None);
            links.push(absolute);
        }
    }

    links.sort();
    links.dedup();
    Ok(links)
}

/// Visible text of the page, skipping scripts and page chrome
fn extract_text(page: &Html) -> String {
    let mut parts = Vec::new();
    for node in page.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| STRIPPED_ELEMENTS.contains(&e.name()))
                .unwrap_or(false)
        });
        if !hidden {
            parts.push(&**text);
        }
    }

    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn html_document(url: &Url, page: &Html) -> ConnectorResult<Document> {
    let title = page
        .select(&selector("title")?)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    Ok(Document::new(
        url.as_str(),
        DocumentSource::Web,
        title.clone(),
        vec![Section::new(Some(url.to_string()), extract_text(page))],
    )
    .with_title(title))
}

fn plain_document(url: &Url, body: String) -> Document {
    Document::new(
        url.as_str(),
        DocumentSource::Web,
        url.as_str(),
        vec![Section::new(Some(url.to_string()), body)],
    )
}

fn sitemap_urls(xml: &str) -> ConnectorResult<Vec<Url>> {
    let loc = Regex::new(r"<loc>\s*([^<\s]+)\s*</loc>")
        .map_err(|e| ConnectorError::SerializationError(e.to_string()))?;

    Ok(loc
        .captures_iter(xml)
        .filter_map(|c| Url::parse(&c[1]).ok())
        .collect())
}
