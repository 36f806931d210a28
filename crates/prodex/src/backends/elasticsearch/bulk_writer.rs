// ai
//! 📡 Bulk writer: documents go in, a per-document report comes out.
//!
//! 🎬 The bulk API has rules. Two lines per document. Action metadata, then the source.
//! Newline-delimited. Trailing newline on the whole body. And when it answers 200 with
//! `"errors": true`, the only way to find out who got rejected is to read `items[]`,
//! in request order, one by one. So we do.
//!
//! ## Knowledge Graph 🧠
//! - `WriteMode::Bulk`: one `POST /_bulk` per batch, NDJSON, per-item errors parsed
//! - `WriteMode::Individual`: one `PUT /{index}/_doc/{id}` per document, non-2xx = failure
//! - `BulkAction::Index` upserts; `BulkAction::Create` refuses to overwrite (409 per doc)
//! - Transport failures and a non-2xx on the whole `_bulk` request are `Err`: the job aborts.
//!   Rejections of individual documents are data, not errors.
//!
//! 🦆

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use super::ElasticsearchConnection;
use crate::backends::BulkWriter;
use crate::common::{DestinationDoc, WriteFailure, WriteReport};

/// 🚚 How documents leave the building.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// 📦 One `_bulk` request per batch.
    #[default]
    Bulk,
    /// 🐢 One request per document.
    Individual,
}

/// 🎬 The verb on every action line.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// ♻️ Create or overwrite. Re-runs with natural keys land on the same ids.
    #[default]
    Index,
    /// 🚫 Create only. An existing id is a per-document 409 conflict.
    Create,
}

impl BulkAction {
    fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Create => "create",
        }
    }

    fn document_endpoint(&self) -> &'static str {
        match self {
            BulkAction::Index => "_doc",
            BulkAction::Create => "_create",
        }
    }
}

/// 🔧 Resolved writer settings. Per-job defaults are applied in `app_config` before this exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElasticsearchWriterConfig {
    pub mode: WriteMode,
    pub action: BulkAction,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// 💬 Pull a human sentence out of an ES error object, whatever shape it arrived in.
fn describe_error(error: &Value) -> String {
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (None, Some(reason)) => reason.to_string(),
        (Some(kind), None) => kind.to_string(),
        (None, None) => error.to_string(),
    }
}

/// 📝 Render a batch as a `_bulk` NDJSON body, trailing newline included.
///
/// ```text
/// {"index":{"_index":"product","_id":"6283"}}
/// {"product_id":"6283","product_name":"Basic T-shirt - dark blue/white",...}
/// ```
pub(crate) fn render_bulk_body(index: &str, action: BulkAction, documents: &[DestinationDoc]) -> Result<String> {
    let mut body = String::new();
    for doc in documents {
        let mut action_line = serde_json::Map::new();
        action_line.insert(
            action.as_str().to_string(),
            json!({ "_index": index, "_id": doc.id }),
        );
        body.push_str(
            &serde_json::to_string(&action_line)
                .context("💀 The JSON that describes JSON has failed to become JSON")?,
        );
        body.push('\n');
        body.push_str(
            &serde_json::to_string(&doc.body)
                .with_context(|| format!("💀 Document '{}' refused to serialize", doc.id))?,
        );
        body.push('\n');
    }
    Ok(body)
}

/// 📋 Turn a `_bulk` response into a report. Items come back in request order, so a
/// missing `_id` on an item falls back to the id we sent in that slot.
fn report_from_bulk_response(response: BulkResponse, documents: &[DestinationDoc]) -> WriteReport {
    if !response.errors {
        return WriteReport {
            succeeded: documents.len() as u64,
            failed: Vec::new(),
        };
    }

    let mut failed = Vec::new();
    for (slot, item) in response.items.into_iter().enumerate() {
        // -- 🎯 each item is {"index": {...}} or {"create": {...}}: one key, we don't care which
        let Some(item) = item.into_values().next() else {
            continue;
        };
        let Some(error) = item.error else {
            continue;
        };
        let id = item
            .id
            .or_else(|| documents.get(slot).map(|doc| doc.id.clone()))
            .unwrap_or_else(|| format!("<slot {}>", slot));
        failed.push(WriteFailure {
            id,
            reason: format!("{} ({})", describe_error(&error), item.status),
        });
    }

    WriteReport {
        succeeded: (documents.len() - failed.len().min(documents.len())) as u64,
        failed,
    }
}

/// 📡 `BulkWriter` backed by the cluster.
#[derive(Debug)]
pub(crate) struct ElasticsearchBulkWriter {
    connection: ElasticsearchConnection,
    config: ElasticsearchWriterConfig,
}

impl ElasticsearchBulkWriter {
    pub(crate) fn new(connection: ElasticsearchConnection, config: ElasticsearchWriterConfig) -> Self {
        Self { connection, config }
    }

    async fn write_bulk(&self, index: &str, documents: &[DestinationDoc]) -> Result<WriteReport> {
        let body = render_bulk_body(index, self.config.action, documents)?;
        debug!(
            "📡 Sending {} docs ({} bytes) to /_bulk for '{}'",
            documents.len(),
            body.len(),
            index
        );

        let url = self.connection.endpoint(&["_bulk"])?;
        let response = self
            .connection
            .request(Method::POST, url)
            // ⚠️ application/x-ndjson, not application/json. ES is particular about this.
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("💀 The bulk request never made it to Elasticsearch")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("💀 The bulk response body got lost on the way home")?;
        if !status.is_success() {
            anyhow::bail!(
                "💀 The bulk request arrived, but Elasticsearch answered {}. Body: '{}'",
                status,
                text
            );
        }

        let parsed: BulkResponse =
            serde_json::from_str(&text).context("💀 The bulk response was not the JSON we were promised")?;
        let report = report_from_bulk_response(parsed, documents);
        trace!(
            "🚀 Bulk landed: {} ok, {} rejected",
            report.succeeded,
            report.failed.len()
        );
        Ok(report)
    }

    async fn write_individually(&self, index: &str, documents: &[DestinationDoc]) -> Result<WriteReport> {
        let mut report = WriteReport::default();
        for doc in documents {
            let url = self
                .connection
                .endpoint(&[index, self.config.action.document_endpoint(), doc.id.as_str()])?;
            let body = serde_json::to_string(&doc.body)
                .with_context(|| format!("💀 Document '{}' refused to serialize", doc.id))?;

            trace!("📡 PUT {} ", url);
            let response = self
                .connection
                .request(Method::PUT, url)
                .header("Content-Type", "application/json")
                .body(body)
                .send()
                .await
                .with_context(|| format!("💀 Writing document '{}' never made it to the cluster", doc.id))?;

            let status = response.status();
            if status.is_success() {
                report.succeeded += 1;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|parsed| parsed.get("error").map(describe_error))
                .unwrap_or(text);
            warn!("⚠️ Document '{}' rejected with {}", doc.id, status);
            report.failed.push(WriteFailure {
                id: doc.id.clone(),
                reason: format!("{} ({})", reason, status.as_u16()),
            });
        }
        Ok(report)
    }
}

#[async_trait]
impl BulkWriter for ElasticsearchBulkWriter {
    async fn write(&mut self, index: &str, documents: &[DestinationDoc]) -> Result<WriteReport> {
        if documents.is_empty() {
            return Ok(WriteReport::default());
        }
        match self.config.mode {
            WriteMode::Bulk => self.write_bulk(index, documents).await,
            WriteMode::Individual => self.write_individually(index, documents).await,
        }
    }
}
