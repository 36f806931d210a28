//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! ```toml
//! [elasticsearch]
//! url = "https://localhost:9200"
//! username = "elastic"
//!
//! [extract.categories]
//! enabled = true
//! id_scheme = "lookup"          # or "sequential"
//!
//! [extract.products]
//! enabled = true
//! unmapped_category = "skip"    # or "null_category"
//! write = { mode = "bulk", action = "index" }
//!
//! [category_ids]
//! "Men's Shoes" = 5
//! ```

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::backends::{BulkAction, ElasticsearchConfig, ElasticsearchWriterConfig, WriteMode};
use crate::transforms::{CategoryIdScheme, CategoryLookupTable, UnmappedCategoryPolicy};

const ENV_PREFIX: &str = "PRODEX_";

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    /// 🗺️ Replaces the built-in table wholesale when present. No merging with the defaults.
    #[serde(default)]
    pub category_ids: CategoryLookupTable,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractConfig {
    #[serde(default)]
    pub categories: CategoriesJobConfig,
    #[serde(default)]
    pub products: ProductsJobConfig,
}

/// 📡 How the scroll is opened. Same knobs for every job.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScanConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// ⏱️ ES time units: "30s", "1m", "5m".
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    /// 🎯 Query DSL. Absent means `match_all`.
    #[serde(default)]
    pub query: Option<Value>,
}

impl ScanConfig {
    pub fn query_or_match_all(&self) -> Value {
        self.query
            .clone()
            .unwrap_or_else(|| serde_json::json!({"match_all": {}}))
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            keep_alive: default_keep_alive(),
            query: None,
        }
    }
}

/// 🚚 Per-job write settings. `mode` left out means "whatever this job does by default".
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteConfig {
    #[serde(default)]
    pub mode: Option<WriteMode>,
    #[serde(default)]
    pub action: BulkAction,
}

impl WriteConfig {
    pub fn resolve(&self, default_mode: WriteMode) -> ElasticsearchWriterConfig {
        ElasticsearchWriterConfig {
            mode: self.mode.unwrap_or(default_mode),
            action: self.action,
        }
    }
}

/// 🏷️ `[extract.categories]`: product index → category index roll-up.
#[derive(Debug, Deserialize, Clone)]
pub struct CategoriesJobConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_categories_source")]
    pub source_index: String,
    #[serde(default = "default_categories_destination")]
    pub destination_index: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_category_field")]
    pub category_field: String,
    #[serde(default)]
    pub id_scheme: CategoryIdScheme,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub write: WriteConfig,
}

impl CategoriesJobConfig {
    /// 🐢 a handful of documents, one request each
    pub const DEFAULT_WRITE_MODE: WriteMode = WriteMode::Individual;
}

impl Default for CategoriesJobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source_index: default_categories_source(),
            destination_index: default_categories_destination(),
            batch_size: default_batch_size(),
            category_field: default_category_field(),
            id_scheme: CategoryIdScheme::default(),
            scan: ScanConfig::default(),
            write: WriteConfig::default(),
        }
    }
}

/// 🛒 `[extract.products]`: e-commerce orders → product catalog.
#[derive(Debug, Deserialize, Clone)]
pub struct ProductsJobConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_products_source")]
    pub source_index: String,
    #[serde(default = "default_products_destination")]
    pub destination_index: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub unmapped_category: UnmappedCategoryPolicy,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub write: WriteConfig,
}

impl ProductsJobConfig {
    pub const DEFAULT_WRITE_MODE: WriteMode = WriteMode::Bulk;
}

impl Default for ProductsJobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source_index: default_products_source(),
            destination_index: default_products_destination(),
            batch_size: default_batch_size(),
            unmapped_category: UnmappedCategoryPolicy::default(),
            scan: ScanConfig::default(),
            write: WriteConfig::default(),
        }
    }
}

/// 🎛️ Knobs that aren't about any one job.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📊 Draw the progress bar. Turn off for CI logs that don't appreciate carriage returns.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_progress: default_show_progress(),
        }
    }
}

fn default_page_size() -> usize {
    1000
}

fn default_keep_alive() -> String {
    "1m".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_categories_source() -> String {
    "product".to_string()
}

fn default_categories_destination() -> String {
    "category".to_string()
}

fn default_category_field() -> String {
    "category_name".to_string()
}

fn default_products_source() -> String {
    "kibana_sample_data_ecommerce".to_string()
}

fn default_products_destination() -> String {
    "product".to_string()
}

fn default_show_progress() -> bool {
    true
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges `PRODEX_*` environment variables (nested with `__`, so
/// `PRODEX_EXTRACT__PRODUCTS__ENABLED=true`) with an optional TOML file.
///
/// 📐 DESIGN NOTE:
///   - `config_file_name` is None  → env vars only. No file. No assumptions.
///   - `config_file_name` is Some  → env vars + TOML file, merged. TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable. The message says which source was involved.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables ({}*). \
             The file exists in our hearts, but apparently not in valid TOML.",
            path.display(),
            ENV_PREFIX
        ),
        None => format!(
            "💀 Failed to parse configuration from environment variables ({}*). \
             No file was provided, this one's all on the environment. Classic.",
            ENV_PREFIX
        ),
    };

    config.extract().context(context_msg)
}
