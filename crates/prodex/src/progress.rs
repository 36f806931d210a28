// AI
//! 📊 progress.rs: "Are we there yet?" Every migration, every time, forever.
//!
//! 🚀 Two jobs here. While a migration runs, [`ProgressMetrics`] drives an indicatif bar with a
//! comfy-table throughput panel strapped to it. When everything is done, [`render_summary`]
//! lays the final numbers out in one table, one row per job.
//!
//! ⚠️ Watching this progress bar will not make it go faster. We've tried. Science says no.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};

use crate::supervisors::JobReport;

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 docs" → "1,000,000 docs". You're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 The brains behind the live display. Tracks scanned and written docs against the
/// `hits.total` the first page promised.
///
/// Uses a sliding 5-second window for the docs/s rate so spikes don't scare you.
pub(crate) struct ProgressMetrics {
    job_name: String,
    /// 📏 `hits.total` from the first page. 0 if the cluster didn't say.
    total_docs: u64,
    scanned: u64,
    written: u64,
    progress_bar: ProgressBar,
    /// 🔄 sliding window of (timestamp, scanned) for rate calculation
    rate_samples: VecDeque<(Instant, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("job_name", &self.job_name)
            .field("total_docs", &self.total_docs)
            .field("scanned", &self.scanned)
            .field("written", &self.written)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Spin up a new ProgressMetrics. `visible = false` gives a hidden bar that still
    /// counts, for `runtime.show_progress = false` and for tests.
    pub(crate) fn new(job_name: impl Into<String>, total_docs: u64, visible: bool) -> Self {
        let progress_bar = if visible {
            ProgressBar::new(total_docs)
        } else {
            ProgressBar::hidden()
        };
        // -- 🎨 cyan because it's classy, blue because it's calm
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64));

        Self {
            job_name: job_name.into(),
            total_docs,
            scanned: 0,
            written: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Feed the totals after every page. Absolute values, not deltas.
    pub(crate) fn update(&mut self, scanned: u64, written: u64) {
        self.scanned = scanned;
        self.written = written;
        let docs_per_sec = self.docs_per_sec();
        self.render(docs_per_sec);
        self.progress_bar.set_position(self.scanned);
    }

    /// ✅ Ring the bell. We made it (or we lost the cursor, same energy).
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    fn docs_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.scanned));

        match self.rate_samples.front() {
            Some(&(oldest_time, oldest_scanned)) => {
                let elapsed = now.duration_since(oldest_time).as_secs_f64();
                if elapsed > 0.0 {
                    self.scanned.saturating_sub(oldest_scanned) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// 🎨 Layout (3 rows x 2 cols), right-aligned, no borders:
    /// ```text
    /// | job: <name>
    /// | [=====>----------]
    ///   <docs/s>       <scanned / total>
    ///   <written>      <%>
    ///   <elapsed>      <remaining>
    /// ```
    fn render(&self, docs_per_sec: f64) {
        let percent = if self.total_docs > 0 {
            (self.scanned as f64 / self.total_docs as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // 🔮 linear extrapolation, assumes the future looks like the past
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            let remaining_secs = total_estimated - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Docs/s", format_number(docs_per_sec as u64))).set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} scanned",
                format_number(self.scanned),
                format_number(self.total_docs)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} written", format_number(self.written))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}%", percent)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("job: {}\n{}", self.job_name, table));
    }
}

/// 🧾 One row per job. Printed by the CLI once every enabled job has finished.
pub fn render_summary(reports: &[JobReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "job", "scanned", "transformed", "written", "skipped", "failed", "pages", "partial scan", "elapsed",
    ]);
    for report in reports {
        let stats = &report.stats;
        let numbers = [
            stats.scanned,
            stats.transformed,
            stats.written,
            stats.skipped,
            stats.failed,
            stats.pages,
        ];
        let mut row = vec![Cell::new(&report.job)];
        row.extend(
            numbers
                .iter()
                .map(|n| Cell::new(format_number(*n)).set_alignment(CellAlignment::Right)),
        );
        row.push(Cell::new(if stats.partial_scan { "yes ⚠️" } else { "no" }));
        row.push(Cell::new(format_duration(report.elapsed)).set_alignment(CellAlignment::Right));
        table.add_row(row);
    }
    table
}
