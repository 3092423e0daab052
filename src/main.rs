use anyhow::Context;
use basic_cleaning::config::{StepConfig, TrackingConfig};
use basic_cleaning::gateway::{self, BlobStore};
use basic_cleaning::{logging, step};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// A step for basic data cleaning
#[derive(Parser, Debug)]
#[command(name = "basic_cleaning", version, about = "A step for basic data cleaning")]
struct Cli {
    /// Input artifact to be cleaned
    #[arg(long = "input_artifact")]
    input_artifact: String,

    /// Output artifact after cleaning
    #[arg(long = "output_artifact")]
    output_artifact: String,

    /// Type of the output artifact
    #[arg(long = "output_type")]
    output_type: String,

    /// Description of the output artifact
    #[arg(long = "output_description")]
    output_description: String,

    /// Minimum price to consider
    #[arg(long = "min_price", allow_negative_numbers = true)]
    min_price: f64,

    /// Maximum price to consider
    #[arg(long = "max_price", allow_negative_numbers = true)]
    max_price: f64,

    /// Tracking config file (defaults to basic_cleaning.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use a filesystem artifact store rooted here
    #[arg(long = "artifact_root")]
    artifact_root: Option<PathBuf>,

    /// Directory for downloads and the intermediate output file
    #[arg(long = "work_dir")]
    work_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut tracking = TrackingConfig::load(cli.config.as_deref())?;
    if let Some(work_dir) = cli.work_dir {
        tracking.work_dir = work_dir;
    }
    let _guard = logging::init_logging(tracking.log_dir.as_deref());

    let config = StepConfig::new(
        cli.input_artifact,
        cli.output_artifact,
        cli.output_type,
        cli.output_description,
        cli.min_price,
        cli.max_price,
    )?;
    let store = gateway::open_store(&tracking.store, cli.artifact_root.as_deref())?;
    info!("Using artifact store {}", store.describe());

    let outcome = step::go(&config, &tracking, store)
        .await
        .context("basic cleaning failed")?;

    println!(
        "{} -> {} ({} of {} rows kept, run {})",
        config.input_artifact,
        outcome.output.qualified_name(),
        outcome.report.rows_out(),
        outcome.report.rows_in(),
        outcome.run.id
    );
    Ok(())
}
