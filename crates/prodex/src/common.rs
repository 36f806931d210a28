// ai
//! 📦 Common data structures: the things that ride between the cursor, the transformer,
//! and the writer.
//!
//! 🎬 A page arrives. It carries hits. Each hit carries a `_source` that may or may not
//! contain what we were promised. A transformer turns those hits into destination docs.
//! A writer ships them. A cursor keeps track of where we are, until somebody releases it.
//!
//! 🧠 Knowledge graph:
//! - `SourceHit`: one raw document read from the source index
//! - `Cursor`: the server-side scroll handle. NOT `Clone`. Released by value, once.
//! - `ScrollRequest` / `ScrollPage`: what we ask the reader for, and what comes back
//! - `DestinationDoc`: one document bound for the destination index, id already chosen
//! - `WriteReport` / `WriteFailure`: what the writer says happened to a batch
//!
//! 🦆

use serde::Serialize;
use serde_json::Value;

/// 🎯 One document as it came out of the source index.
///
/// `source` is an `Option` because `_source` can be disabled, filtered down to nothing,
/// or just plain absent. Validation decides what that means; this struct doesn't judge.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SourceHit {
    /// 🏷️ `_id` in the source index. Used for logging skips, never for writes.
    pub id: String,
    /// 📡 `_index` the hit came from, when the server bothers to tell us.
    pub index: Option<String>,
    /// 📦 The `_source` payload. Loosely typed until a transformer validates it.
    pub source: Option<Value>,
}

impl SourceHit {
    pub(crate) fn new(id: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            index: None,
            source: Some(source),
        }
    }
}

/// 🔒 A live scroll handle.
///
/// The token changes on every page, so the job always keeps the most recent one.
/// Deliberately not `Clone`: `CursorReader::close` takes it by value, and the only way to
/// close twice would be to own it twice.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Cursor {
    token: String,
    keep_alive: String,
}

impl Cursor {
    pub(crate) fn new(token: impl Into<String>, keep_alive: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            keep_alive: keep_alive.into(),
        }
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// ⏱️ Time-to-live the server was asked to hold this cursor for, in ES time units ("1m").
    pub(crate) fn keep_alive(&self) -> &str {
        &self.keep_alive
    }
}

/// 📡 Everything the reader needs to open a cursor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScrollRequest {
    pub index: String,
    pub query: Value,
    /// 🎯 `_source.includes`. Empty means "send me everything", which is rarely what we want.
    pub source_includes: Vec<String>,
    pub page_size: usize,
    pub keep_alive: String,
}

/// 📄 One page of hits plus the refreshed cursor.
///
/// - `hits` empty + `cursor` present: the scroll is exhausted. Normal ending.
/// - `cursor` absent: the server lost (or never gave us) a handle. Partial scan.
#[derive(Debug, Default)]
pub(crate) struct ScrollPage {
    pub hits: Vec<SourceHit>,
    pub cursor: Option<Cursor>,
    /// 📊 `hits.total` as reported by the first page. Only used to size the progress bar.
    pub total: Option<u64>,
}

/// 📦 A document headed for the destination index. The transformer picked the id,
/// so the writer never has to guess.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct DestinationDoc {
    pub id: String,
    pub body: Value,
}

/// 💀 One document the destination refused, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub id: String,
    pub reason: String,
}

/// 📋 What happened to a batch. `succeeded + failed.len()` always equals the batch size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct WriteReport {
    pub succeeded: u64,
    pub failed: Vec<WriteFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_a_new_hit_always_has_a_source() {
        let hit = SourceHit::new("abc", json!({"category_name": "Men's Shoes"}));
        assert_eq!(hit.id, "abc");
        assert!(hit.index.is_none());
        assert_eq!(hit.source, Some(json!({"category_name": "Men's Shoes"})));
    }

    #[test]
    fn the_one_where_the_cursor_remembers_its_keep_alive() {
        let cursor = Cursor::new("DXF1ZXJ5QW5kRmV0Y2gBAAAAAAAAAD4WYm9laVYtZndUQlNsdDcwakFMNjU1QQ==", "1m");
        assert_eq!(cursor.keep_alive(), "1m");
        assert!(cursor.token().starts_with("DXF1"));
    }
}
