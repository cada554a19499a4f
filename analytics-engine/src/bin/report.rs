//! Customer risk report over a JSON dataset
//!
//! ```bash
//! aml-report dataset.json CUS001 --as-of 2024-07-01T00:00:00Z
//! ANALYTICS_CONFIG=analytics.toml aml-report dataset.json CUS001
//! ```
//!
//! Without `--config`, configuration comes from `ANALYTICS_*` environment
//! variables.

use analytics_engine::{AnalyticsEngine, Config, InMemoryStore, StaticRiskReference};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "aml-report")]
#[command(about = "Customer AML risk profile over a JSON dataset")]
#[command(version)]
struct Args {
    /// Dataset with customers, counterparties, transactions and subsidiaries
    dataset: PathBuf,

    /// Customer to profile
    customer_id: String,

    /// End of the lookback window (RFC 3339), defaults to now
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,

    /// TOML configuration file
    #[arg(long, env = "ANALYTICS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    let dataset = std::fs::read_to_string(&args.dataset)
        .with_context(|| format!("reading dataset {}", args.dataset.display()))?;
    let store = InMemoryStore::from_json(&dataset)?;
    tracing::info!(transactions = store.transaction_count(), "Dataset loaded");

    let engine = AnalyticsEngine::new(Arc::new(store), Arc::new(StaticRiskReference::new()), config)?;
    let as_of = args.as_of.unwrap_or_else(Utc::now);
    let profile = engine
        .customer_risk_profile_as_of(&args.customer_id, as_of)
        .await?;

    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}
