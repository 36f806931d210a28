//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where scroll contexts expire in sixty seconds..."
//! 🎬 "One supervisor dared to run the jobs one at a time."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor: part middle manager, part helicopter parent. It reads the config,
//! decides which jobs are on, connects to the cluster once, and runs the jobs in order.
//! A job that aborts doesn't stop the next one. The supervisor just remembers who failed
//! and brings it up at the end, like any good manager.
//!
//! ⚠️ The job module stays private. Only its reports leave the building.

mod job;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};

use crate::app_config::{AppConfig, CategoriesJobConfig, ProductsJobConfig};
use crate::backends::elasticsearch::{ElasticsearchBulkWriter, ElasticsearchConnection, ElasticsearchScrollReader};
use crate::backends::{BulkWriter, CursorReader, ElasticsearchWriterConfig};
use crate::transforms::{CategoryLookupTable, CategoryRollup, DocumentTransformer, ProductCatalog};

pub use job::{JobReport, MigrationStats};
pub(crate) use job::{JobSettings, MigrationJob};

/// 📋 One enabled job, fully resolved from config, not yet connected to anything.
#[derive(Debug)]
pub(crate) struct JobPlan {
    pub settings: JobSettings,
    pub transformer: DocumentTransformer,
    pub write: ElasticsearchWriterConfig,
}

impl JobPlan {
    fn categories(config: &CategoriesJobConfig, lookup: Arc<CategoryLookupTable>, show_progress: bool) -> Self {
        Self {
            settings: JobSettings {
                name: "categories".to_string(),
                source_index: config.source_index.clone(),
                destination_index: config.destination_index.clone(),
                batch_size: config.batch_size.max(1),
                page_size: config.scan.page_size.max(1),
                keep_alive: config.scan.keep_alive.clone(),
                query: config.scan.query_or_match_all(),
                show_progress,
            },
            transformer: DocumentTransformer::Categories(CategoryRollup::new(
                config.category_field.clone(),
                config.id_scheme,
                lookup,
            )),
            write: config.write.resolve(CategoriesJobConfig::DEFAULT_WRITE_MODE),
        }
    }

    fn products(config: &ProductsJobConfig, lookup: Arc<CategoryLookupTable>, show_progress: bool) -> Self {
        Self {
            settings: JobSettings {
                name: "products".to_string(),
                source_index: config.source_index.clone(),
                destination_index: config.destination_index.clone(),
                batch_size: config.batch_size.max(1),
                page_size: config.scan.page_size.max(1),
                keep_alive: config.scan.keep_alive.clone(),
                query: config.scan.query_or_match_all(),
                show_progress,
            },
            transformer: DocumentTransformer::Products(ProductCatalog::new(lookup, config.unmapped_category)),
            write: config.write.resolve(ProductsJobConfig::DEFAULT_WRITE_MODE),
        }
    }
}

/// 📦 The Supervisor: because even batch jobs need someone hovering over them
/// asking "is it done yet?"
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🗂️ The enabled jobs, categories first. The lookup table is shared, read-only.
    pub(crate) fn plans(&self) -> Vec<JobPlan> {
        let lookup = Arc::new(self.app_config.category_ids.clone());
        let show_progress = self.app_config.runtime.show_progress;
        let extract = &self.app_config.extract;

        let mut plans = Vec::new();
        if extract.categories.enabled {
            plans.push(JobPlan::categories(&extract.categories, lookup.clone(), show_progress));
        }
        if extract.products.enabled {
            plans.push(JobPlan::products(&extract.products, lookup, show_progress));
        }
        plans
    }

    /// 🚀 Connect once, run every enabled job against the cluster.
    pub(crate) async fn run(&self) -> Result<Vec<JobReport>> {
        let plans = self.plans();
        if plans.is_empty() {
            warn!(
                "💤 No jobs enabled. Set extract.categories.enabled or extract.products.enabled \
                 to give me something to do."
            );
            return Ok(Vec::new());
        }

        let connection = ElasticsearchConnection::connect(&self.app_config.elasticsearch)
            .await
            .with_context(|| format!("💀 could not connect to Elasticsearch at '{}'", self.app_config.elasticsearch.url))?;

        run_plans(plans, |plan| {
            (
                ElasticsearchScrollReader::new(connection.clone()),
                ElasticsearchBulkWriter::new(connection.clone(), plan.write),
            )
        })
        .await
    }
}

/// 🧵 Run plans in order with whatever backends `backends_for` builds. Keeps going after
/// a job aborts, then fails naming every job that did.
pub(crate) async fn run_plans<R, W, F>(plans: Vec<JobPlan>, mut backends_for: F) -> Result<Vec<JobReport>>
where
    R: CursorReader,
    W: BulkWriter,
    F: FnMut(&JobPlan) -> (R, W),
{
    let mut reports = Vec::with_capacity(plans.len());
    let mut aborted = Vec::new();

    for plan in plans {
        let (reader, writer) = backends_for(&plan);
        let mut job = MigrationJob::new(plan.settings, reader, plan.transformer, writer);
        match job.run().await {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!("💀 job '{}' aborted: {:#}", job.name(), err);
                aborted.push(job.name().to_string());
            }
        }
    }

    if !aborted.is_empty() {
        bail!("💀 {} job(s) aborted: {}", aborted.len(), aborted.join(", "));
    }
    info!("🏁 {} job(s) finished", reports.len());
    Ok(reports)
}
