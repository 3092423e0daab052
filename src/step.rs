use crate::artifacts::{Artifact, ArtifactManifest};
use crate::cleaner::{clean_with_report, CleaningReport};
use crate::config::{StepConfig, TrackingConfig};
use crate::constants::OUTPUT_FILE_NAME;
use crate::error::Result;
use crate::gateway::BlobStore;
use crate::run::{Run, RunRecord, RunSettings};
use crate::table;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// What a successful cleaning run produced
#[derive(Debug)]
pub struct StepOutcome {
    pub run: RunRecord,
    pub output: ArtifactManifest,
    pub report: CleaningReport,
}

/// Download the raw dataset, clean it, and publish the result as a new artifact.
///
/// The run is recorded as failed when anything goes wrong after it started.
/// No output artifact is published unless cleaning succeeded. A failure to
/// close the run after publishing leaves the artifact in place.
#[instrument(skip_all, fields(input = %config.input_artifact, output = %config.output_artifact))]
pub async fn go(
    config: &StepConfig,
    tracking: &TrackingConfig,
    store: Arc<dyn BlobStore>,
) -> Result<StepOutcome> {
    let download_dir = tracking.work_dir.join("artifacts");
    let mut run = Run::init(store, RunSettings::from(tracking), download_dir).await?;
    run.update_config(config)?;

    let result = match execute(&mut run, config, &tracking.work_dir).await {
        Ok((output, report)) => complete(&mut run, output, report).await,
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        error!("Cleaning run failed: {}", e);
        if let Err(record_err) = run.fail(&e.to_string()).await {
            warn!("Could not record run failure: {}", record_err);
        }
    }
    result
}

/// Record the summary and close the run as finished
async fn complete(
    run: &mut Run,
    output: ArtifactManifest,
    report: CleaningReport,
) -> Result<StepOutcome> {
    run.set_summary(&report)?;
    let record = run.finish().await?;
    Ok(StepOutcome {
        run: record,
        output,
        report,
    })
}

async fn execute(
    run: &mut Run,
    config: &StepConfig,
    work_dir: &Path,
) -> Result<(ArtifactManifest, CleaningReport)> {
    info!("Downloading artifact {}", config.input_artifact);
    let fetched = run.use_artifact(&config.input_artifact).await?;
    let input_path = fetched.file()?;
    let raw = table::read_csv(&input_path)?;

    let (cleaned, report) = clean_with_report(raw, &config.price_range())?;
    info!("Kept {} of {} rows", report.rows_out(), report.rows_in());

    info!("Saving cleaned dataset to a new artifact");
    fs::create_dir_all(work_dir).await?;
    let output_path = work_dir.join(OUTPUT_FILE_NAME);
    table::write_csv(&cleaned, &output_path)?;

    let mut artifact = Artifact::new(
        &config.output_artifact,
        &config.output_type,
        &config.output_description,
    );
    artifact.add_file(output_path);
    let manifest = run.log_artifact(&artifact).await?;

    Ok((manifest, report))
}
