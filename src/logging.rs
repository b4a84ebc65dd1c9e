use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::error::{BoqError, BoqResult};

/// Logging configuration for chonker-boq
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: PathBuf,
    /// Only honoured with the `advanced_logging` feature
    pub enable_file_logging: bool,
    pub enable_json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            enable_file_logging: false,
            enable_json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn verbose(verbose: bool) -> Self {
        Self {
            level: if verbose { "debug" } else { "warn" }.to_string(),
            ..Default::default()
        }
    }
}

/// Keeps the non-blocking file writer alive; drop it last.
#[derive(Default)]
pub struct LoggingGuard {
    #[cfg(feature = "advanced_logging")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize the logging system
///
/// `RUST_LOG` wins over the configured level. Console output goes to stderr so
/// stdout stays clean for JSON and CSV output.
pub fn init_logging(config: &LoggingConfig) -> BoqResult<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chonker_boq={},{}", config.level, config.level)));

    let console_layer = if config.enable_json_format {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .compact()
            .boxed()
    };

    // Only pushed to with the advanced_logging feature
    #[allow(unused_mut)]
    let mut layers = vec![console_layer];
    #[allow(unused_mut)]
    let mut guard = LoggingGuard::default();

    if config.enable_file_logging {
        #[cfg(feature = "advanced_logging")]
        {
            std::fs::create_dir_all(&config.log_dir)
                .map_err(|e| BoqError::file_io(config.log_dir.to_string_lossy().to_string(), e))?;

            let file_appender = tracing_appender::rolling::daily(&config.log_dir, "chonker-boq.log");
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
            guard._file_guard = Some(file_guard);

            let file_layer = if config.enable_json_format {
                fmt::layer().json().with_writer(file_writer).boxed()
            } else {
                fmt::layer().with_writer(file_writer).with_ansi(false).boxed()
            };
            layers.push(file_layer);
        }

        #[cfg(not(feature = "advanced_logging"))]
        return Err(BoqError::configuration(
            "file logging needs the advanced_logging feature",
        ));
    }

    Registry::default()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| BoqError::General(anyhow::anyhow!("logging already initialised: {}", e)))?;

    info!("🐹 chonker-boq logging initialized");
    info!("Log level: {}", config.level);
    if config.enable_file_logging {
        info!("File logging enabled: {}", config.log_dir.display());
    }

    Ok(guard)
}

/// Log build and platform information for debugging
pub fn log_system_info() {
    info!("🐹 chonker-boq v{} - bilingual BOQ table extraction", env!("CARGO_PKG_VERSION"));
    info!("System: {} {}", std::env::consts::OS, std::env::consts::ARCH);
}

/// Performance logging utilities
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    pub fn start(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!("⏱️  Starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    pub fn checkpoint(&self, checkpoint: &str) {
        let elapsed = self.start.elapsed();
        tracing::debug!("⏱️  {} - {}: {}ms", self.operation, checkpoint, elapsed.as_millis());
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        info!("⏱️  Completed {}: {}ms", self.operation, self.start.elapsed().as_millis());
    }
}

/// Macro for logging a document-level error with context
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            recoverable = $error.is_recoverable(),
            "chonker-boq error occurred"
        );
    };
}

/// Log a page or sheet that was skipped
#[macro_export]
macro_rules! log_section_warning {
    ($warning:expr) => {
        tracing::warn!(
            section = %$warning.section,
            reason = %$warning.message,
            "⚠️  Section skipped"
        );
    };
}
