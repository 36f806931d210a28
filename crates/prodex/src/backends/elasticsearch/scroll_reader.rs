// ai
//! 📜 Scroll reader: the `CursorReader` that actually talks to a cluster.
//!
//! 🧠 Knowledge graph:
//! - open:  `POST /{index}/_search?scroll={keep_alive}` with size, query, `_source.includes`
//! - next:  `POST /_search/scroll` with `{scroll, scroll_id}`
//! - close: `DELETE /_search/scroll` with `{scroll_id}`
//! - A 404 on `next` is ES saying "search_context_missing_exception": the TTL ran out or a
//!   node restarted. That is a partial scan, not a crash. We hand back a page with no cursor
//!   and let the job decide how sad to be.
//! - Sorting by `_doc` is the cheapest scroll order. We don't need relevance, we need everything.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use super::ElasticsearchConnection;
use crate::backends::CursorReader;
use crate::common::{Cursor, ScrollPage, ScrollRequest, SourceHit};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

// -- 🦕 ES 7+ says {"value": n, "relation": "eq"}, older clusters just say n
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
    Legacy(u64),
}

impl TotalHits {
    /// 🔢 `None` when the cluster only promises a lower bound (`relation: "gte"`).
    fn exact(&self) -> Option<u64> {
        match self {
            TotalHits::Object { relation, .. } if relation.as_deref() == Some("gte") => None,
            TotalHits::Object { value, .. } => Some(*value),
            TotalHits::Legacy(value) => Some(*value),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_index", default)]
    index: Option<String>,
    #[serde(rename = "_source", default)]
    source: Option<Value>,
}

impl SearchResponse {
    fn into_page(self, keep_alive: &str) -> ScrollPage {
        ScrollPage {
            hits: self
                .hits
                .hits
                .into_iter()
                .map(|raw| SourceHit {
                    id: raw.id,
                    index: raw.index,
                    source: raw.source,
                })
                .collect(),
            cursor: self.scroll_id.map(|token| Cursor::new(token, keep_alive)),
            total: self.hits.total.as_ref().and_then(TotalHits::exact),
        }
    }
}

/// 📜 Scroll-API cursor reader.
///
/// Remembers the keep-alive from `open` so every `next` refreshes the TTL by the same amount.
#[derive(Debug)]
pub(crate) struct ElasticsearchScrollReader {
    connection: ElasticsearchConnection,
    keep_alive: String,
}

impl ElasticsearchScrollReader {
    pub(crate) fn new(connection: ElasticsearchConnection) -> Self {
        Self {
            connection,
            keep_alive: "1m".to_string(),
        }
    }

    async fn read_page(response: reqwest::Response, keep_alive: &str, what: &str) -> Result<ScrollPage> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("💀 The {} response body got lost on the way home", what))?;
        if !status.is_success() {
            anyhow::bail!("💀 {} failed with {}. Elasticsearch says: '{}'", what, status, body);
        }
        let parsed: SearchResponse = serde_json::from_str(&body).with_context(|| {
            format!("💀 The {} response was not the JSON we were promised", what)
        })?;
        Ok(parsed.into_page(keep_alive))
    }
}

#[async_trait]
impl CursorReader for ElasticsearchScrollReader {
    async fn open(&mut self, request: &ScrollRequest) -> Result<ScrollPage> {
        self.keep_alive = request.keep_alive.clone();

        let mut url = self.connection.endpoint(&[request.index.as_str(), "_search"])?;
        url.query_pairs_mut().append_pair("scroll", &request.keep_alive);

        let mut body = json!({
            "size": request.page_size,
            "query": request.query,
            "sort": ["_doc"],
            // -- 📏 without this ES 7+ stops counting at 10,000 and the progress bar lies
            "track_total_hits": true,
        });
        if !request.source_includes.is_empty() {
            body["_source"] = json!({ "includes": request.source_includes });
        }

        debug!(
            "📡 Opening scroll on '{}' (size {}, keep_alive {})",
            request.index, request.page_size, request.keep_alive
        );
        let response = self
            .connection
            .request(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .with_context(|| format!("💀 The initial search on '{}' never made it to the cluster", request.index))?;

        let page = Self::read_page(response, &self.keep_alive, "initial scroll search").await?;
        trace!("📄 First page: {} hits, total {:?}", page.hits.len(), page.total);
        Ok(page)
    }

    async fn next(&mut self, cursor: &Cursor) -> Result<ScrollPage> {
        let url = self.connection.endpoint(&["_search", "scroll"])?;
        let body = json!({
            "scroll": cursor.keep_alive(),
            "scroll_id": cursor.token(),
        });

        let response = self
            .connection
            .request(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .context("💀 The scroll request never made it to the cluster")?;

        if response.status() == StatusCode::NOT_FOUND {
            // -- ⚠️ the search context is gone. TTL, restart, or a rogue clear_scroll. Not our problem to retry.
            let body = response.text().await.unwrap_or_default();
            warn!(
                "⚠️ Scroll context vanished mid-scan (404). The cluster said: '{}'",
                body
            );
            return Ok(ScrollPage::default());
        }

        Self::read_page(response, cursor.keep_alive(), "scroll").await
    }

    async fn close(&mut self, cursor: Option<Cursor>) {
        let Some(cursor) = cursor else {
            debug!("🗑️ No cursor to release. Nothing to see here.");
            return;
        };

        let url = match self.connection.endpoint(&["_search", "scroll"]) {
            Ok(url) => url,
            Err(err) => {
                warn!("⚠️ Could not build the clear-scroll URL, letting the cursor expire on its own: {:#}", err);
                return;
            }
        };

        let result = self
            .connection
            .request(Method::DELETE, url)
            .header("Content-Type", "application/json")
            .body(json!({ "scroll_id": cursor.token() }).to_string())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("🗑️ Scroll context released");
            }
            Ok(response) => {
                warn!(
                    "⚠️ Clearing the scroll context answered {}. It will expire after {} anyway.",
                    response.status(),
                    cursor.keep_alive()
                );
            }
            Err(err) => {
                warn!(
                    "⚠️ Clearing the scroll context failed: {}. It will expire after {} anyway.",
                    err,
                    cursor.keep_alive()
                );
            }
        }
    }
}
