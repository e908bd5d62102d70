//! Confluence wiki document loader.
//!
//! This module is only available when the `confluence` feature is enabled.
//! Pages are read through the REST content API and their storage-format
//! XHTML is reduced to markdown-flavoured plain text so the structural
//! chunker can split on headings.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::document::{Document, Metadata};
use crate::error::{RagError, Result};
use crate::loader::{DocumentLoader, LoadOptions};
use crate::settings::DocumentSourceConfig;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([1-6])[^>]*>(.*?)</h[1-6]>")
        .expect("unreachable error: failed to compile heading pattern")
});
static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|pre|blockquote|ul|ol|table)>")
        .expect("unreachable error: failed to compile block end pattern")
});
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</tr>").expect("unreachable error: failed to compile line break pattern")
});
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<li[^>]*>").expect("unreachable error: failed to compile list item pattern")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<[^>]*>").expect("unreachable error: failed to compile tag pattern")
});
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n[ \t]*\n(\s*\n)+").expect("unreachable error: failed to compile blank line pattern")
});

/// Convert Confluence storage-format XHTML to markdown-flavoured text.
///
/// Headings become `#` lines, block ends become blank lines, `<br>` a newline, list
/// items become `- ` lines, remaining tags are dropped and common entities
/// decoded.
pub fn storage_to_text(xhtml: &str) -> String {
    let text = HEADING.replace_all(xhtml, |caps: &regex::Captures<'_>| {
        let level = caps[1].parse::<usize>().unwrap_or(1);
        format!("\n\n{} {}\n\n", "#".repeat(level), TAG.replace_all(&caps[2], "").trim())
    });
    let text = LIST_ITEM.replace_all(&text, "\n- ");
    let text = BLOCK_END.replace_all(&text, "\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Content of a page without body text: whitespace, so it is non-empty but
/// yields no chunks.
const BLANK_PAGE: &str = "\n";

#[derive(Debug, Deserialize)]
struct ContentPage {
    results: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    id: String,
    title: String,
    #[serde(default)]
    body: Option<ContentBody>,
    #[serde(default)]
    version: Option<ContentVersion>,
    #[serde(default, rename = "_links")]
    links: Option<ContentLinks>,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    storage: StorageBody,
}

#[derive(Debug, Deserialize)]
struct StorageBody {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ContentVersion {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct ContentLinks {
    #[serde(default)]
    webui: Option<String>,
}

/// A [`DocumentLoader`] over the pages of one Confluence space.
///
/// `load(limit, offset, extra)` returns up to `limit` pages starting at page
/// `offset`, issuing as many requests of at most the configured page size as
/// needed. Offsets at or beyond `max_pages` yield an empty page. The space
/// can be overridden per call with `extra["space_key"]`.
///
/// Every page the source returns yields one document. Pages whose body
/// renders to no text become a blank placeholder, which chunks to nothing,
/// so a window of such pages is not mistaken for the end of the space.
///
/// With `continue_on_failure` (the default) a failed request is logged and
/// the pages fetched so far by this call are returned, which is empty when
/// the first request fails; otherwise the failure is returned as
/// [`RagError::Loader`].
pub struct ConfluenceLoader {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    api_key: Option<String>,
    space_key: Option<String>,
    max_pages: usize,
    page_limit: usize,
    continue_on_failure: bool,
}

impl ConfluenceLoader {
    /// Create a loader from the document source configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if no URL is configured.
    pub fn new(config: &DocumentSourceConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| RagError::Config("confluence url is required".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;

        info!(space_key = ?config.space_key, url = %base_url, "initialized Confluence loader");

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            space_key: config.space_key.clone(),
            max_pages: config.max_pages,
            page_limit: config.limit.max(1),
            continue_on_failure: config.continue_on_failure,
        })
    }

    fn error(message: String) -> RagError {
        RagError::Loader { source_name: "confluence".to_string(), message }
    }

    async fn fetch(&self, space_key: Option<&str>, limit: usize, start: usize) -> Result<Vec<ContentItem>> {
        let url = format!("{}/rest/api/content", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("type", "page".to_string()),
            ("limit", limit.to_string()),
            ("start", start.to_string()),
            ("expand", "body.storage,version".to_string()),
        ];
        if let Some(space_key) = space_key {
            query.push(("spaceKey", space_key.to_string()));
        }

        let mut request = self.client.get(&url).query(&query);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.api_key.as_deref());
        }

        let response =
            request.send().await.map_err(|e| Self::error(format!("request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error(format!("API returned {status}: {body}")));
        }
        let page: ContentPage = response
            .json()
            .await
            .map_err(|e| Self::error(format!("failed to parse response: {e}")))?;

        debug!(start, requested = limit, received = page.results.len(), "fetched content page");
        Ok(page.results)
    }

    fn to_document(&self, item: ContentItem, space_key: Option<&str>) -> Document {
        let body = item.body.map(|b| b.storage.value).unwrap_or_default();
        let mut content = storage_to_text(&body);
        if content.is_empty() {
            debug!(page_id = %item.id, title = %item.title, "page has empty body");
            content = BLANK_PAGE.to_string();
        }

        let source = item
            .links
            .and_then(|l| l.webui)
            .map(|path| format!("{}{}", self.base_url, path))
            .unwrap_or_else(|| format!("{}/pages/viewpage.action?pageId={}", self.base_url, item.id));

        let mut metadata = Metadata::new();
        metadata.insert("id".to_string(), Value::String(item.id));
        metadata.insert("title".to_string(), Value::String(item.title));
        metadata.insert("source".to_string(), Value::String(source));
        if let Some(space_key) = space_key {
            metadata.insert("space_key".to_string(), Value::String(space_key.to_string()));
        }
        if let Some(version) = item.version {
            metadata.insert("version".to_string(), Value::from(version.number));
        }

        Document::new(content, metadata)
    }
}

#[async_trait]
impl DocumentLoader for ConfluenceLoader {
    async fn load(&self, limit: usize, offset: usize, extra: &LoadOptions) -> Result<Vec<Document>> {
        if offset >= self.max_pages || limit == 0 {
            return Ok(Vec::new());
        }
        let space_key = extra
            .get("space_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.space_key.clone());

        let wanted = limit.min(self.max_pages - offset);
        let mut documents = Vec::new();
        let mut start = offset;

        while start < offset + wanted {
            let request_limit = self.page_limit.min(offset + wanted - start);
            let items = match self.fetch(space_key.as_deref(), request_limit, start).await {
                Ok(items) => items,
                Err(e) if self.continue_on_failure => {
                    error!(start, error = %e, "error loading from Confluence, continuing");
                    break;
                }
                Err(e) => return Err(e),
            };

            let received = items.len();
            let page_space = space_key.as_deref();
            documents.extend(items.into_iter().map(|item| self.to_document(item, page_space)));
            if received < request_limit {
                break;
            }
            start += received;
        }

        if documents.is_empty() {
            warn!(offset, limit, "no Confluence pages returned");
        }
        Ok(documents)
    }
}
