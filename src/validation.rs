use anyhow::{anyhow, Result};
use std::path::Path;

/// Validation utilities for command-line and configuration input
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a subject id: 1 to 10 ASCII digits
    pub fn validate_subject_id(id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(anyhow!("Subject id cannot be empty"));
        }

        if id.len() > 10 {
            return Err(anyhow!("Subject id too long (max 10 digits): {id}"));
        }

        if !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("Subject id must contain only digits: {id}"));
        }

        Ok(())
    }

    /// Validate a comma-separated subject list such as `1011,1105`
    pub fn parse_subject_list(list: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        if ids.is_empty() {
            return Err(anyhow!("Subject list cannot be empty"));
        }

        for id in &ids {
            Self::validate_subject_id(id)?;
        }

        Ok(ids)
    }

    /// Validate that a directory exists
    pub fn validate_directory(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(anyhow!("Directory path cannot be empty"));
        }

        if !path.exists() {
            return Err(anyhow!("Directory does not exist: {path:?}"));
        }

        if !path.is_dir() {
            return Err(anyhow!("Path is not a directory: {path:?}"));
        }

        Ok(())
    }

    /// Validate a bare output file name
    pub fn validate_output_file_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("Output file name cannot be empty"));
        }

        if name.contains('/') || name.contains('\\') {
            return Err(anyhow!("Output file name must not contain path separators: {name}"));
        }

        if name.contains("..") {
            return Err(anyhow!("Output file name must not contain '..': {name}"));
        }

        if name.contains('\0') {
            return Err(anyhow!("Output file name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate a log level name
    pub fn validate_log_level(level: &str) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level) {
            return Err(anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                level,
                valid_levels
            ));
        }

        Ok(())
    }

    /// Validate a log format name
    pub fn validate_log_format(format: &str) -> Result<()> {
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&format) {
            return Err(anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                format,
                valid_formats
            ));
        }

        Ok(())
    }
}
