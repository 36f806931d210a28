//! # Previously, on Prodex...
//!
//! 🎬 The cluster was not invited to the unit tests. It is expensive, it is slow, and it
//! has opinions. So we built two stand-ins that live entirely in RAM and keep receipts.
//!
//! [`InMemoryReader`] pages through a `Vec` of hits, hands out a fresh token per page,
//! refuses stale tokens, counts every open/next/close, and can be told to explode or
//! lose its cursor on a given call. [`InMemoryWriter`] stores documents per index behind
//! an `Arc<Mutex<...>>` so tests can peek after handing it to a job, and can be told to
//! reject ids or to behave like a `create` action.
//!
//! ⚠️ This is NOT for production. This is for tests. It is `#[cfg(test)]` for a reason.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::backends::{BulkAction, BulkWriter, CursorReader};
use crate::common::{Cursor, DestinationDoc, ScrollPage, ScrollRequest, SourceHit, WriteFailure, WriteReport};

/// 📊 Shared call counters. Clone the `Arc` before handing the reader to a job.
#[derive(Debug, Default)]
pub(crate) struct ReaderCalls {
    pub open: AtomicUsize,
    pub next: AtomicUsize,
    pub close: AtomicUsize,
    /// 🔒 Number of `close` calls that actually carried a cursor.
    pub close_with_cursor: AtomicUsize,
}

impl ReaderCalls {
    pub(crate) fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
    pub(crate) fn next(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
    pub(crate) fn close(&self) -> usize {
        self.close.load(Ordering::SeqCst)
    }
    pub(crate) fn close_with_cursor(&self) -> usize {
        self.close_with_cursor.load(Ordering::SeqCst)
    }
}

/// 📦 A scroll over a `Vec`. Pages are sized by the request, exactly like the real thing.
#[derive(Debug, Default)]
pub(crate) struct InMemoryReader {
    hits: Vec<SourceHit>,
    position: usize,
    page_size: usize,
    keep_alive: String,
    generation: usize,
    live_token: Option<String>,
    pub(crate) calls: Arc<ReaderCalls>,
    fail_open: bool,
    /// 💥 1-based `next` call that returns `Err`.
    fail_on_next: Option<usize>,
    /// 👻 1-based `next` call whose page comes back without a cursor.
    lose_cursor_on_next: Option<usize>,
    last_request: Option<ScrollRequest>,
}

impl InMemoryReader {
    pub(crate) fn new(hits: Vec<SourceHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    /// 🧪 `count` hits with ids `doc-0..`, each carrying whatever `source_for` builds.
    pub(crate) fn generated(count: usize, source_for: impl Fn(usize) -> Value) -> Self {
        Self::new(
            (0..count)
                .map(|i| SourceHit::new(format!("doc-{}", i), source_for(i)))
                .collect(),
        )
    }

    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub(crate) fn failing_on_next(mut self, call: usize) -> Self {
        self.fail_on_next = Some(call);
        self
    }

    pub(crate) fn losing_cursor_on_next(mut self, call: usize) -> Self {
        self.lose_cursor_on_next = Some(call);
        self
    }

    pub(crate) fn last_request(&self) -> Option<&ScrollRequest> {
        self.last_request.as_ref()
    }

    fn take_page(&mut self) -> Vec<SourceHit> {
        let end = (self.position + self.page_size).min(self.hits.len());
        let page = self.hits[self.position..end].to_vec();
        self.position = end;
        page
    }

    fn issue_cursor(&mut self) -> Cursor {
        self.generation += 1;
        let token = format!("mem-cursor-{}", self.generation);
        self.live_token = Some(token.clone());
        Cursor::new(token, self.keep_alive.clone())
    }
}

#[async_trait]
impl CursorReader for InMemoryReader {
    async fn open(&mut self, request: &ScrollRequest) -> Result<ScrollPage> {
        self.calls.open.fetch_add(1, Ordering::SeqCst);
        self.last_request = Some(request.clone());
        if self.fail_open {
            anyhow::bail!("💀 in-memory cluster is on strike");
        }
        self.position = 0;
        self.page_size = request.page_size.max(1);
        self.keep_alive = request.keep_alive.clone();

        let hits = self.take_page();
        let cursor = self.issue_cursor();
        Ok(ScrollPage {
            hits,
            cursor: Some(cursor),
            total: Some(self.hits.len() as u64),
        })
    }

    async fn next(&mut self, cursor: &Cursor) -> Result<ScrollPage> {
        let call = self.calls.next.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_next == Some(call) {
            anyhow::bail!("💀 in-memory network cable unplugged on call {}", call);
        }
        if self.live_token.as_deref() != Some(cursor.token()) {
            anyhow::bail!(
                "💀 stale cursor '{}', latest is {:?}",
                cursor.token(),
                self.live_token
            );
        }

        let hits = self.take_page();
        if self.lose_cursor_on_next == Some(call) {
            self.live_token = None;
            return Ok(ScrollPage {
                hits,
                cursor: None,
                total: None,
            });
        }
        let cursor = self.issue_cursor();
        Ok(ScrollPage {
            hits,
            cursor: Some(cursor),
            total: None,
        })
    }

    async fn close(&mut self, cursor: Option<Cursor>) {
        self.calls.close.fetch_add(1, Ordering::SeqCst);
        if cursor.is_some() {
            self.calls.close_with_cursor.fetch_add(1, Ordering::SeqCst);
        }
        self.live_token = None;
    }
}

type Store = BTreeMap<String, BTreeMap<String, Value>>;

/// 📦 A writer that never forgets. Index → id → body.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryWriter {
    pub(crate) stored: Arc<Mutex<Store>>,
    /// 📏 Size of every batch `write` was called with, in order.
    pub(crate) batches: Arc<Mutex<Vec<usize>>>,
    rejected: HashMap<String, String>,
    action: BulkAction,
}

impl InMemoryWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rejecting(mut self, id: &str, reason: &str) -> Self {
        self.rejected.insert(id.to_string(), reason.to_string());
        self
    }

    pub(crate) fn with_action(mut self, action: BulkAction) -> Self {
        self.action = action;
        self
    }

    pub(crate) async fn ids_in(&self, index: &str) -> HashSet<String> {
        self.stored
            .lock()
            .await
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) async fn doc(&self, index: &str, id: &str) -> Option<Value> {
        self.stored
            .lock()
            .await
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }

    pub(crate) async fn count(&self, index: &str) -> usize {
        self.stored.lock().await.get(index).map(BTreeMap::len).unwrap_or(0)
    }
}

#[async_trait]
impl BulkWriter for InMemoryWriter {
    async fn write(&mut self, index: &str, documents: &[DestinationDoc]) -> Result<WriteReport> {
        self.batches.lock().await.push(documents.len());

        let mut stored = self.stored.lock().await;
        let target = stored.entry(index.to_string()).or_default();
        let mut report = WriteReport::default();
        for doc in documents {
            if let Some(reason) = self.rejected.get(&doc.id) {
                report.failed.push(WriteFailure {
                    id: doc.id.clone(),
                    reason: reason.clone(),
                });
                continue;
            }
            if self.action == BulkAction::Create && target.contains_key(&doc.id) {
                report.failed.push(WriteFailure {
                    id: doc.id.clone(),
                    reason: format!("version_conflict_engine_exception: [{}]: document already exists (409)", doc.id),
                });
                continue;
            }
            target.insert(doc.id.clone(), doc.body.clone());
            report.succeeded += 1;
        }
        Ok(report)
    }
}
