//! Coletor - Price-Transparency Portal Collector
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use coletor::{build_targets, data, Collector, Config};

/// Coletor - Price-Transparency Portal Collector
#[derive(Parser, Debug)]
#[command(name = "coletor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON array of EAN barcodes
    #[arg(long, short = 'i')]
    items: Option<PathBuf>,

    /// JSON array of descriptions, parallel to the items file
    #[arg(long, short = 'd')]
    descriptions: Option<PathBuf>,

    /// Output CSV path
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Worker pool size (1 = one reused browser session)
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// WebDriver endpoint
    #[arg(long)]
    webdriver: Option<String>,

    /// Run with a visible browser window
    #[arg(long)]
    headed: bool,

    /// Skip challenge solving entirely
    #[arg(long)]
    no_captcha: bool,

    /// Skip registry enrichment; enrichment fields stay unknown
    #[arg(long)]
    no_enrichment: bool,

    /// Collect at most this many targets
    #[arg(long)]
    limit: Option<usize>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::default_config_toml());
        return Ok(());
    }

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(items) = args.items {
        config.inputs.items = items;
    }
    if let Some(descriptions) = args.descriptions {
        config.inputs.descriptions = descriptions;
    }
    if let Some(output) = args.output {
        config.output.path = output;
    }
    if let Some(workers) = args.workers {
        config.run.workers = workers.max(1);
    }
    if let Some(webdriver) = args.webdriver {
        config.driver.webdriver_url = webdriver;
    }
    if args.headed {
        config.driver.headless = false;
    }
    if args.no_captcha {
        config.captcha.enabled = false;
    }
    if args.no_enrichment {
        config.registry.enabled = false;
    }

    let items = data::load_items(&config.inputs)?;
    let mut targets = build_targets(&items, &config.portal.locations);
    if let Some(limit) = args.limit {
        targets.truncate(limit);
    }
    if targets.is_empty() {
        warn!("nothing to collect: empty catalog or no locations configured");
        return Ok(());
    }

    let output_path = config.output.path.clone();
    let collector = Collector::with_config(config)?;

    // Ctrl-C lets in-flight visits abandon cleanly instead of dying
    // mid-DOM-mutation.
    let cancel = collector.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping collection");
            cancel.cancel();
        }
    });

    let summary = collector.run(targets).await?;
    data::write_records(&output_path, &summary.records)?;

    println!(
        "Collected {} of {} targets -> {}",
        summary.collected(),
        summary.attempted,
        output_path.display()
    );

    Ok(())
}
