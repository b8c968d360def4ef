use anyhow::Result;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence over `log_level`. Console output goes to
/// stderr, as JSON when `json` is set. With `log_file`, events are also
/// written as JSON to a daily rolling file next to it; keep the returned
/// guard alive until exit so buffered lines are flushed.
pub fn init_logging(log_level: Option<&str>, log_file: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = log_level.unwrap_or("info");
            EnvFilter::try_new(level)
        })
        .map_err(|e| anyhow::anyhow!("Failed to create log filter: {}", e))?;

    let text_console = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
    });
    let json_console = json.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
    });

    let (file_layer, guard) = match log_file {
        Some(log_path) => {
            let directory = log_path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = log_path
                .file_name()
                .map_or_else(|| "health-merge.log".to_string(), |name| name.to_string_lossy().into_owned());
            let (non_blocking_appender, guard) = non_blocking(rolling::daily(directory, file_name));

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_appender)
                .with_ansi(false)
                .with_target(true)
                .json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter)
        .with(text_console)
        .with(json_console)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    info!("Logging system initialized");
    Ok(guard)
}

/// Logs how long a named stage took.
///
/// Call [`OperationTimer::finish`] on success; a timer dropped without it
/// (an early `?` return) logs at debug level instead.
pub struct OperationTimer {
    operation: String,
    start: Instant,
    finished: bool,
}

impl OperationTimer {
    /// Start timing `operation`
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
            finished: false,
        }
    }

    /// Log and return the elapsed time
    pub fn finish(mut self) -> Duration {
        self.finished = true;
        let elapsed = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = elapsed.as_millis(),
            "Operation completed"
        );
        elapsed
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !self.finished && !std::thread::panicking() {
            debug!(
                operation = %self.operation,
                duration_ms = self.start.elapsed().as_millis(),
                "Operation abandoned"
            );
        }
    }
}
