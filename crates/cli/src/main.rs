mod cli;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rawshift_core::{
    config::load_default_config, load_config, validate_config, Config, ConversionFailure,
    ConversionOrchestrator, ConversionOutput, ConversionUpdate, ImageFormat, InputFile,
    OrchestratorStatus,
};

use cli::Cli;

/// Summary printed with `--json`.
#[derive(Debug, Serialize)]
struct Report {
    converted: Vec<ConversionOutput>,
    failed: Vec<ConversionFailure>,
    errors: Vec<String>,
    status: OrchestratorStatus,
}

/// Settings resolved from the command line over the config file.
struct RunSettings {
    target: ImageFormat,
    quality: f32,
    use_fast_path: bool,
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => load_default_config().context("Failed to load default configuration")?,
    };
    validate_config(&config).context("Configuration validation failed")?;

    let settings = resolve_settings(&cli, &config)?;
    check_destinations(&cli.files, &settings)?;
    tokio::fs::create_dir_all(&settings.out_dir)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", settings.out_dir))?;
    info!(
        target = %settings.target,
        quality = settings.quality,
        fast_path = settings.use_fast_path,
        files = cli.files.len(),
        "Starting conversion"
    );

    let orchestrator = ConversionOrchestrator::with_default_engines(&config);
    orchestrator.preload_workers();

    let jobs = cli
        .files
        .iter()
        .map(|path| convert_file(&orchestrator, path, &settings));
    let outcomes = futures::future::join_all(jobs).await;

    let mut report = Report {
        converted: Vec::new(),
        failed: Vec::new(),
        errors: Vec::new(),
        status: OrchestratorStatus::default(),
    };
    for (path, outcome) in cli.files.iter().zip(outcomes) {
        match outcome {
            Ok(Ok(output)) => report.converted.push(output),
            Ok(Err(failure)) => {
                error!("{}", failure);
                report.failed.push(failure);
            }
            Err(e) => {
                error!("{:?}: {:#}", path, e);
                report.errors.push(format!("{}: {:#}", path.display(), e));
            }
        }
    }
    report.status = orchestrator.status().await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    }

    let failed = report.failed.len() + report.errors.len();
    info!(
        converted = report.converted.len(),
        failed, "Finished"
    );
    if failed > 0 {
        bail!("{} of {} conversions failed", failed, cli.files.len());
    }
    Ok(())
}

fn resolve_settings(cli: &Cli, config: &Config) -> Result<RunSettings> {
    let target = match &cli.to {
        Some(format) => format
            .parse::<ImageFormat>()
            .map_err(|e| anyhow!("Invalid --to: {}", e))?,
        None => config
            .output
            .target_format()
            .map_err(|e| anyhow!("Invalid output.format: {}", e))?,
    };
    let quality = cli.quality.unwrap_or(config.output.quality);
    if !(0.0..=1.0).contains(&quality) {
        bail!("Quality must be between 0 and 1, got {}", quality);
    }

    Ok(RunSettings {
        target,
        quality,
        use_fast_path: config.orchestrator.use_fast_path && !cli.no_fast_path,
        out_dir: cli.out.clone().unwrap_or_else(|| config.output.dir.clone()),
    })
}

/// Output path a file will be written to.
fn destination(path: &Path, settings: &RunSettings) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let output_name = InputFile::new(name, Vec::<u8>::new()).output_name(settings.target);
    settings.out_dir.join(output_name)
}

/// Refuses to run when two inputs would be written to the same file.
fn check_destinations(files: &[PathBuf], settings: &RunSettings) -> Result<()> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
    for path in files {
        let dest = destination(path, settings);
        if let Some(previous) = seen.insert(dest.clone(), path) {
            bail!(
                "{:?} and {:?} would both be written to {:?}",
                previous,
                path,
                dest
            );
        }
    }
    Ok(())
}

async fn convert_file(
    orchestrator: &ConversionOrchestrator,
    path: &Path,
    settings: &RunSettings,
) -> Result<Result<ConversionOutput, ConversionFailure>> {
    let file = InputFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    debug!(
        file = %file.name(),
        size = file.len(),
        fast_path = orchestrator.can_fast_path_convert(&file, settings.target),
        "Submitting"
    );

    let mut updates = orchestrator.submit(
        file,
        settings.target,
        settings.quality,
        settings.use_fast_path,
    );
    let mut outcome = None;
    while let Some(update) = updates.next().await {
        match update {
            ConversionUpdate::Pending => debug!(path = ?path, "Queued"),
            ConversionUpdate::Processing => debug!(path = ?path, "Processing"),
            ConversionUpdate::Completed(output) => outcome = Some(Ok(output)),
            ConversionUpdate::Failed(failure) => outcome = Some(Err(failure)),
        }
    }
    let outcome = outcome.context("Conversion ended without a result")?;

    if let Ok(output) = &outcome {
        let dest = settings.out_dir.join(&output.output_name);
        tokio::fs::write(&dest, &output.bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", dest))?;
        info!(
            "{} -> {:?} ({}x{}, {} bytes, {} ms)",
            output.file_name,
            dest,
            output.output_width,
            output.output_height,
            output.output_size,
            output.time_taken.as_millis()
        );
    }
    Ok(outcome)
}
