//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 A `CursorReader` pours pages out of the source index. A `BulkWriter` slurps
//! destination documents into another one. The job in between does the thinking.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (Elasticsearch for real, InMemory for tests)
//! - The job is generic over both traits, so every impl gets monomorphized into its own
//!   straight-line orchestration code. No vtables were harmed.
//! - Backend configs live next to the backend they configure (`elasticsearch.rs`).
//!
//! 🦆 The duck is here because every file must have one.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{Cursor, DestinationDoc, ScrollPage, ScrollRequest, WriteReport};

pub(crate) mod elasticsearch;
#[cfg(test)]
pub(crate) mod in_mem;

pub use elasticsearch::{BulkAction, ElasticsearchConfig, ElasticsearchWriterConfig, WriteMode};

/// 🚰 A paging cursor over a source index.
///
/// # Contract 📜
/// - `open` returns the first page and the first cursor. An `Err` here is fatal to the job.
/// - `next` MUST be called with the most recently returned cursor; tokens change per page.
///   An empty page is the "we're done" signal, not an error.
/// - A page without a cursor means the handle vanished (TTL, restart). Stop scanning.
/// - `close` is best-effort: `None` is a no-op, failures are logged and swallowed.
///   It takes the cursor by value so it can't be used afterwards.
#[async_trait]
pub(crate) trait CursorReader: std::fmt::Debug + Send {
    /// 📡 Open a cursor and fetch the first page.
    async fn open(&mut self, request: &ScrollRequest) -> Result<ScrollPage>;
    /// 📄 Fetch the page after `cursor`.
    async fn next(&mut self, cursor: &Cursor) -> Result<ScrollPage>;
    /// 🗑️ Release the server-side cursor. Never fails loudly.
    async fn close(&mut self, cursor: Option<Cursor>);
}

/// 🕳️ A destination for transformed documents.
///
/// # Contract 📜
/// - Each document is written under its own `DestinationDoc::id`.
/// - Per-document rejections go into `WriteReport::failed`; siblings still get written.
/// - `Err` is reserved for "the whole request never landed" (transport, 5xx on `_bulk`).
#[async_trait]
pub(crate) trait BulkWriter: std::fmt::Debug + Send {
    /// 📥 Write one batch into `index`.
    async fn write(&mut self, index: &str, documents: &[DestinationDoc]) -> Result<WriteReport>;
}
