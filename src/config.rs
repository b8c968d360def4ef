use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::file_writer::COMBINED_FILE_NAME;
use crate::models::SubjectId;
use crate::pipeline::OutputOptions;
use crate::resolver::MessageKeyStrategy;
use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input and output directories
    pub data: DataConfig,
    /// Subject selection and message keying
    pub merge: MergeConfig,
    /// Which files a batch writes
    pub output: OutputConfig,
    /// Log level, file and format
    pub logging: LoggingConfig,
}

/// Where data is read from and written to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding the raw exports
    pub raw_dir: String,
    /// Directory the merged files are written to
    pub clean_dir: String,
    /// File name prefix of the shared daily survey export
    pub survey_prefix: String,
}

/// Merge behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// How survey message numbers become event keys
    pub message_key: MessageKeyStrategy,
    /// Subjects to process; empty means every subject found in `raw_dir`
    #[serde(default)]
    pub subjects: Vec<String>,
}

/// Output selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write one file per subject and run
    pub write_run_files: bool,
    /// Write the combined file
    pub write_combined: bool,
    /// Combined file name inside `clean_dir`
    pub combined_file_name: String,
    /// Optional path of the JSON batch report
    pub report_path: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    /// Optional JSON log file
    pub file_path: Option<String>,
    /// Console format, `json` or `text`
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                raw_dir: "data_raw".to_string(),
                clean_dir: "data_clean".to_string(),
                survey_prefix: "DailySurveys".to_string(),
            },
            merge: MergeConfig {
                message_key: MessageKeyStrategy::default(),
                subjects: Vec::new(),
            },
            output: OutputConfig {
                write_run_files: true,
                write_combined: true,
                combined_file_name: COMBINED_FILE_NAME.to_string(),
                report_path: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// defaults, `config/default`, `config/local`, `health-merge`, the
    /// explicit file if given, then `HEALTH_MERGE_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .map_err(|e| anyhow!("Failed to build default configuration: {}", e))?;

        let mut builder = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("health-merge").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("HEALTH_MERGE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("merge.subjects")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values.
    ///
    /// Directory existence is left to the commands that read them.
    pub fn validate(&self) -> Result<()> {
        if self.data.raw_dir.trim().is_empty() {
            return Err(anyhow!("raw_dir must not be empty"));
        }
        if self.data.clean_dir.trim().is_empty() {
            return Err(anyhow!("clean_dir must not be empty"));
        }
        if self.data.survey_prefix.trim().is_empty() {
            return Err(anyhow!("survey_prefix must not be empty"));
        }

        for subject in &self.merge.subjects {
            InputValidator::validate_subject_id(subject)?;
        }

        InputValidator::validate_output_file_name(&self.output.combined_file_name)?;
        InputValidator::validate_log_level(&self.logging.level)?;
        InputValidator::validate_log_format(&self.logging.format)?;

        Ok(())
    }

    /// Configured subjects, if any were named
    pub fn subjects(&self) -> Result<Vec<SubjectId>> {
        self.merge
            .subjects
            .iter()
            .map(|id| SubjectId::new(id.trim()).map_err(Into::into))
            .collect()
    }

    /// Directory holding the raw exports
    pub fn raw_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.raw_dir)
    }

    /// Directory the merged files are written to
    pub fn clean_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.clean_dir)
    }

    /// Output options for a batch run
    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            output_dir: self.clean_dir(),
            write_run_files: self.output.write_run_files,
            write_combined: self.output.write_combined,
            combined_file_name: self.output.combined_file_name.clone(),
        }
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}
