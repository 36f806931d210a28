//! 🚀 prodex-cli: the front door, the bouncer, the maitre d' of prodex.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up logging,
//! lets the library do the heavy lifting, and then prints the receipt. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🎛️ Scroll an index, reshape it, bulk it back in.
#[derive(Debug, Parser)]
#[command(name = "prodex", version, about)]
struct Args {
    /// 📋 TOML config file. If it doesn't exist, config comes from PRODEX_* env vars only.
    #[arg(default_value = "prodex.toml")]
    config: PathBuf,
}

/// 🚀 main(): where it all begins. The "I pressed enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config
/// 4. Run the enabled jobs
/// 5. Print the summary, or peel the error onion and exit 1
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // 🔒 A missing file is fine (env-only config). An unreadable path is not.
    let config_file = args.config.as_path();
    let config_file_if_present = match config_file.try_exists().with_context(|| {
        format!(
            "💀 Couldn't check whether the configuration file exists. Maybe a permissions thing, \
             maybe a cwd thing. Was checking here: '{}'",
            config_file.display()
        )
    })? {
        true => Some(config_file),
        false => {
            info!(
                "📋 '{}' not found, configuring from PRODEX_* environment variables only",
                config_file.display()
            );
            None
        }
    };

    let app_config = prodex::app_config::load_config(config_file_if_present)
        .context("💀 In prodex-cli, main, we couldn't load the configuration. Check the file and the PRODEX_* variables.")?;

    match prodex::run(app_config).await {
        Ok(reports) => {
            if !reports.is_empty() {
                println!("{}", prodex::render_summary(&reports));
            }
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut looks_like_connection_trouble = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                    || cause_str.contains("Could not reach Elasticsearch")
                {
                    looks_like_connection_trouble = true;
                }
            }

            if looks_like_connection_trouble {
                error!(
                    "🔧 hint: looks like Elasticsearch isn't reachable. Check [elasticsearch].url, \
                     that the cluster is actually running (`docker ps`, `curl -k $URL`), and that \
                     self-signed dev clusters have trust_all_certificates = true. ☕"
                );
            }

            std::process::exit(1);
        }
    }
}
