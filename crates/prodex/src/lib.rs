//! 🚀 prodex: reads an Elasticsearch index through a scroll cursor, reshapes what it finds,
//! and writes the result somewhere else. Categories get rolled up, orders get flattened into
//! a product catalog, and the cursor always gets handed back. 🦆

pub mod app_config;
mod backends;
mod common;
mod progress;
mod supervisors;
mod transforms;

use anyhow::{Context, Result};

pub use app_config::AppConfig;
pub use backends::{BulkAction, ElasticsearchConfig, ElasticsearchWriterConfig, WriteMode};
pub use common::WriteFailure;
pub use progress::render_summary;
pub use supervisors::{JobReport, MigrationStats};
pub use transforms::{CategoryIdScheme, CategoryLookupTable, UnmappedCategoryPolicy};

/// 🚀 Run every enabled job, in order, against the configured cluster.
pub async fn run(app_config: AppConfig) -> Result<Vec<JobReport>> {
    supervisors::Supervisor::new(app_config)
        .run()
        .await
        .context("💀 prodex run failed")
}
