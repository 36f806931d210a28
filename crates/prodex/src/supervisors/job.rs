// ai
//! 🎬 *[a scroll opens. somewhere, a cluster allocates a search context and starts a 60s timer.]*
//!
//! 🧵 The migration job: reader → transformer → writer, one page at a time, with exactly one
//! `close` at the end no matter how the story ends.
//!
//! ```text
//!   INIT ──open──▶ SCANNING ⇄ WRITING ──empty page / lost cursor──▶ DRAINING ──▶ CLOSED
//!     │                │           │                                    │
//!     └─ open failed: no writes, no close (there's nothing to close)     │
//!                      └───────────┴─────── any error ──────────────────┴──▶ CLOSED, then Err
//! ```
//!
//! 🧠 Knowledge graph:
//! - The latest cursor lives in one `Option<Cursor>` slot. Every page either refreshes it or
//!   (cursor lost) leaves the last known one in place.
//! - The scan body returns a `Result`. `run` closes the slot's cursor unconditionally, then
//!   propagates that `Result`. That is the whole release guarantee.
//! - Counters reset per run, and the transformer's `begin` drops whatever an aborted run
//!   left behind. A `sequential` id counter is not per-run state, so it keeps climbing
//!   across runs of the same job instance.
//!
//! 🦆 the duck holds the cursor. the duck always gives it back.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backends::{BulkWriter, CursorReader};
use crate::common::{Cursor, DestinationDoc, ScrollPage, ScrollRequest, WriteFailure};
use crate::progress::ProgressMetrics;
use crate::transforms::{DocumentTransform, DocumentTransformer, TransformOutput};

/// 🔧 Everything a job needs to know that isn't a reader, writer, or transformer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JobSettings {
    pub name: String,
    pub source_index: String,
    pub destination_index: String,
    pub batch_size: usize,
    pub page_size: usize,
    pub keep_alive: String,
    pub query: Value,
    pub show_progress: bool,
}

/// 📊 Counters for one run. On a run that returns `Ok`,
/// `written + skipped + failed == transformed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStats {
    pub scanned: u64,
    /// 🔄 documents emitted plus skips recorded
    pub transformed: u64,
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
    /// 📄 non-empty pages processed
    pub pages: u64,
    /// ⚠️ the cursor vanished before the scroll was exhausted
    pub partial_scan: bool,
}

/// 🧾 What a finished run hands back to the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job: String,
    pub stats: MigrationStats,
    /// 💀 write rejections, by id and reason
    pub failures: Vec<WriteFailure>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobPhase {
    Init,
    Scanning,
    Writing,
    Draining,
    Closed,
}

/// 📦 Per-run scratch space. Dropped when `run` returns.
#[derive(Debug)]
struct RunState {
    stats: MigrationStats,
    failures: Vec<WriteFailure>,
    buffer: Vec<DestinationDoc>,
    progress: ProgressMetrics,
}

#[derive(Debug)]
pub(crate) struct MigrationJob<R: CursorReader, W: BulkWriter> {
    settings: JobSettings,
    reader: R,
    transformer: DocumentTransformer,
    writer: W,
    phase: JobPhase,
}

impl<R: CursorReader, W: BulkWriter> MigrationJob<R, W> {
    pub(crate) fn new(settings: JobSettings, reader: R, transformer: DocumentTransformer, writer: W) -> Self {
        Self {
            settings,
            reader,
            transformer,
            writer,
            phase: JobPhase::Init,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.settings.name
    }

    fn enter(&mut self, phase: JobPhase) {
        if self.phase != phase {
            debug!("🔀 job '{}': {:?} → {:?}", self.settings.name, self.phase, phase);
            self.phase = phase;
        }
    }

    /// 🚀 One full pass over the source index.
    ///
    /// An `open` failure returns `Err` without writing or closing anything. After a
    /// successful `open`, `close` runs exactly once with the latest known cursor, and only
    /// then does any error from scanning or writing come back to the caller.
    pub(crate) async fn run(&mut self) -> Result<JobReport> {
        let started = Instant::now();
        self.enter(JobPhase::Init);
        info!(
            "🚀 job '{}': {} → {}",
            self.settings.name, self.settings.source_index, self.settings.destination_index
        );

        let request = ScrollRequest {
            index: self.settings.source_index.clone(),
            query: self.settings.query.clone(),
            source_includes: self.transformer.source_includes(),
            page_size: self.settings.page_size,
            keep_alive: self.settings.keep_alive.clone(),
        };
        let first = self
            .reader
            .open(&request)
            .await
            .with_context(|| format!("💀 job '{}' could not open a cursor on '{}'", self.settings.name, request.index))?;
        self.transformer.begin();

        let mut run = RunState {
            stats: MigrationStats::default(),
            failures: Vec::new(),
            buffer: Vec::with_capacity(self.settings.batch_size),
            progress: ProgressMetrics::new(
                self.settings.name.clone(),
                first.total.unwrap_or(0),
                self.settings.show_progress,
            ),
        };
        let mut slot: Option<Cursor> = None;

        let outcome = self.scan(first, &mut slot, &mut run).await;

        // 🔒 the one and only close, on every path out of the scan
        self.reader.close(slot.take()).await;
        self.enter(JobPhase::Closed);
        run.progress.finish();
        outcome?;

        let report = JobReport {
            job: self.settings.name.clone(),
            stats: run.stats,
            failures: run.failures,
            elapsed: started.elapsed(),
        };
        info!(
            "✅ job '{}' done: scanned {}, transformed {}, written {}, skipped {}, failed {}{}",
            report.job,
            report.stats.scanned,
            report.stats.transformed,
            report.stats.written,
            report.stats.skipped,
            report.stats.failed,
            if report.stats.partial_scan { " (partial scan)" } else { "" }
        );
        Ok(report)
    }

    async fn scan(&mut self, first: ScrollPage, slot: &mut Option<Cursor>, run: &mut RunState) -> Result<()> {
        let mut page = first;
        loop {
            self.enter(JobPhase::Scanning);
            let ScrollPage { hits, cursor, .. } = page;
            let cursor_lost = cursor.is_none();
            if cursor.is_some() {
                *slot = cursor;
            }

            if !hits.is_empty() {
                self.enter(JobPhase::Writing);
                run.stats.pages += 1;
                run.stats.scanned += hits.len() as u64;
                for hit in &hits {
                    let output = self.transformer.transform(hit);
                    absorb(output, run);
                    while run.buffer.len() >= self.settings.batch_size.max(1) {
                        self.flush(run).await?;
                    }
                }
                run.progress.update(run.stats.scanned, run.stats.written);
            }

            if cursor_lost {
                warn!(
                    "⚠️ job '{}' lost its cursor after {} documents. Finishing with a partial scan.",
                    self.settings.name, run.stats.scanned
                );
                run.stats.partial_scan = true;
                break;
            }
            if hits.is_empty() {
                debug!("📭 job '{}': scroll exhausted", self.settings.name);
                break;
            }

            let current = slot
                .as_ref()
                .context("💀 no cursor to continue scrolling with")?;
            page = self
                .reader
                .next(current)
                .await
                .with_context(|| format!("💀 job '{}' failed fetching page {}", self.settings.name, run.stats.pages + 1))?;
        }

        self.enter(JobPhase::Draining);
        let output = self.transformer.finish();
        absorb(output, run);
        while !run.buffer.is_empty() {
            self.flush(run).await?;
        }
        run.progress.update(run.stats.scanned, run.stats.written);
        Ok(())
    }

    /// 📤 Write up to `batch_size` documents from the front of the buffer.
    async fn flush(&mut self, run: &mut RunState) -> Result<()> {
        let take = run.buffer.len().min(self.settings.batch_size.max(1));
        let batch: Vec<DestinationDoc> = run.buffer.drain(..take).collect();
        let report = self
            .writer
            .write(&self.settings.destination_index, &batch)
            .await
            .with_context(|| {
                format!(
                    "💀 job '{}' failed writing {} documents to '{}'",
                    self.settings.name,
                    batch.len(),
                    self.settings.destination_index
                )
            })?;

        debug!(
            "📤 job '{}': batch of {} → {} ok, {} failed",
            self.settings.name,
            batch.len(),
            report.succeeded,
            report.failed.len()
        );
        run.stats.written += report.succeeded;
        run.stats.failed += report.failed.len() as u64;
        for failure in &report.failed {
            warn!("💀 job '{}': document '{}' rejected: {}", self.settings.name, failure.id, failure.reason);
        }
        run.failures.extend(report.failed);
        Ok(())
    }
}

fn absorb(output: TransformOutput, run: &mut RunState) {
    run.stats.transformed += output.transformed();
    run.stats.skipped += output.skipped.len() as u64;
    for skip in &output.skipped {
        warn!("🙅 skipped '{}': {}", skip.source_id, skip.reason);
    }
    run.buffer.extend(output.documents);
}
