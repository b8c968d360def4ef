//! `health-merge` command-line interface.
//!
//! Merges the raw per-subject exports of a study directory into per-run
//! and combined CSV files. Excluded subjects are reported in the log and in
//! the optional JSON batch report; they do not make the process fail.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use health_merge::config::AppConfig;
use health_merge::file_writer::write_json;
use health_merge::locator::DirectoryLocator;
use health_merge::logging::{init_logging, OperationTimer};
use health_merge::models::SubjectId;
use health_merge::pipeline::{BatchReport, Pipeline};
use health_merge::resolver::MessageKeyStrategy;
use health_merge::validation::InputValidator;

#[derive(Parser)]
#[command(author, version, about = "Merge per-subject wearable, SMS, survey and fMRI event data", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the per-run event files for each subject
    Separate(MergeArgs),
    /// Write only the combined file for all subjects
    Combined(MergeArgs),
    /// Write per-run files and the combined file
    All(MergeArgs),
    /// List the subject ids found in the raw data directory
    Subjects {
        /// Raw data directory
        #[arg(long)]
        raw_dir: Option<String>,
    },
    /// Print the effective configuration as YAML
    ShowConfig,
}

#[derive(Args, Clone)]
struct MergeArgs {
    /// Comma-separated subject ids, e.g. 1011,1105
    #[arg(short, long)]
    subjects: Option<String>,

    /// Raw data directory
    #[arg(long)]
    raw_dir: Option<String>,

    /// Output directory
    #[arg(long)]
    clean_dir: Option<String>,

    /// How survey message numbers become event keys
    #[arg(long)]
    message_key: Option<MessageKeyStrategy>,

    /// Write a JSON batch report to this file
    #[arg(long)]
    report: Option<String>,
}

#[derive(Clone, Copy)]
enum OutputMode {
    Separate,
    Combined,
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        InputValidator::validate_log_level(level)?;
        config.logging.level.clone_from(level);
    }

    let log_level = config.get_log_level();
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(
        Some(log_level.as_str()),
        log_file.as_deref(),
        config.logging.format == "json",
    )?;

    info!("Starting health-merge");

    match &cli.command {
        Commands::Separate(args) => merge(config, args, OutputMode::Separate)?,
        Commands::Combined(args) => merge(config, args, OutputMode::Combined)?,
        Commands::All(args) => merge(config, args, OutputMode::All)?,
        Commands::Subjects { raw_dir } => {
            if let Some(dir) = raw_dir {
                config.data.raw_dir.clone_from(dir);
            }
            list_subjects(&config)?;
        }
        Commands::ShowConfig => {
            let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
            print!("{yaml}");
        }
    }

    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(config: &mut AppConfig, args: &MergeArgs, mode: OutputMode) -> Result<()> {
    if let Some(list) = &args.subjects {
        config.merge.subjects = InputValidator::parse_subject_list(list)?;
    }
    if let Some(dir) = &args.raw_dir {
        config.data.raw_dir.clone_from(dir);
    }
    if let Some(dir) = &args.clean_dir {
        config.data.clean_dir.clone_from(dir);
    }
    if let Some(strategy) = args.message_key {
        config.merge.message_key = strategy;
    }
    if let Some(report) = &args.report {
        config.output.report_path = Some(report.clone());
    }

    let (run_files, combined) = match mode {
        OutputMode::Separate => (true, false),
        OutputMode::Combined => (false, true),
        OutputMode::All => (true, true),
    };
    config.output.write_run_files = run_files;
    config.output.write_combined = combined;

    config.validate()
}

fn locator_for(config: &AppConfig) -> Result<DirectoryLocator> {
    let raw_dir = config.raw_dir();
    InputValidator::validate_directory(&raw_dir).context("Raw data directory is not usable")?;
    Ok(DirectoryLocator::new(raw_dir, config.data.survey_prefix.clone()))
}

/// Configured subjects, or every subject found in the raw directory
fn resolve_subjects(config: &AppConfig, locator: &DirectoryLocator) -> Result<Vec<SubjectId>> {
    let configured = config.subjects()?;
    if !configured.is_empty() {
        return Ok(configured);
    }

    let discovered = locator
        .discover_subjects()
        .with_context(|| format!("Failed to scan {}", locator.raw_dir().display()))?;
    info!("Discovered {} subjects in {}", discovered.len(), locator.raw_dir().display());
    Ok(discovered)
}

fn merge(mut config: AppConfig, args: &MergeArgs, mode: OutputMode) -> Result<()> {
    apply_overrides(&mut config, args, mode)?;
    let timer = OperationTimer::new("merge batch");

    let locator = locator_for(&config)?;
    let subjects = resolve_subjects(&config, &locator)?;
    if subjects.is_empty() {
        bail!("No subjects to process in {}", locator.raw_dir().display());
    }

    info!(
        subjects = subjects.len(),
        message_key = %config.merge.message_key,
        "Merging subjects"
    );

    let pipeline = Pipeline::new(locator, config.merge.message_key);
    let report = pipeline.run_batch(&subjects, &config.output_options());

    if let Some(path) = &config.output.report_path {
        write_json(&report, Path::new(path)).with_context(|| format!("Failed to write report to {path}"))?;
        info!("Wrote batch report to {}", path);
    }

    summarize(&report, config.output.write_combined);
    timer.finish();
    Ok(())
}

fn summarize(report: &BatchReport, combined_requested: bool) {
    info!(
        processed = report.processed.len(),
        excluded = report.excluded.len(),
        files = report.files_written.len(),
        "Batch finished"
    );
    if report.is_empty() {
        warn!("No subject could be merged");
    }
    if let Some(rows) = report.combined_rows {
        info!("Combined file has {} rows", rows);
    } else if combined_requested {
        warn!("No combined file was written");
    }
}

fn list_subjects(config: &AppConfig) -> Result<()> {
    let locator = locator_for(config)?;
    let subjects = locator
        .discover_subjects()
        .with_context(|| format!("Failed to scan {}", locator.raw_dir().display()))?;

    for subject in subjects {
        println!("{subject}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use health_merge::file_writer::COMBINED_FILE_NAME;
    use tempfile::tempdir;

    fn args(raw: &Path, clean: &Path) -> MergeArgs {
        MergeArgs {
            subjects: None,
            raw_dir: Some(raw.display().to_string()),
            clean_dir: Some(clean.display().to_string()),
            message_key: None,
            report: None,
        }
    }

    #[test]
    fn test_batch_without_merged_subjects_still_succeeds() {
        let raw = tempdir().unwrap();
        std::fs::write(raw.path().join("sub-2000_sms-times.csv"), ",timestamp\n0,2020-04-08 11:00:00\n").unwrap();
        let clean = tempdir().unwrap();

        let result = merge(AppConfig::default(), &args(raw.path(), clean.path()), OutputMode::All);
        assert!(result.is_ok());
        assert!(!clean.path().join(COMBINED_FILE_NAME).exists());
    }

    #[test]
    fn test_directory_without_subjects_fails() {
        let raw = tempdir().unwrap();
        let clean = tempdir().unwrap();

        let result = merge(AppConfig::default(), &args(raw.path(), clean.path()), OutputMode::All);
        assert!(result.is_err());
    }
}
