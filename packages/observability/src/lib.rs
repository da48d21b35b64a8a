//! # Observability
//!
//! Centralized logging layer for deskvault.
//!
//! Binaries call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Library crates never install a
//! subscriber themselves.
//!
//! When a log path is configured, every event is appended to that file as one
//! JSON object per line (timestamp, level, service, pid, target, message and
//! structured fields), flushed per line so `tail -f | jq` works while the
//! process runs. Without a log path, events go to stderr in compact form.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "deskvault".into(),
//!     default_level: "debug".into(),
//!     log_path: Some(paths.log_file()),
//!     also_stderr: true,
//! });
//! tracing::info!("ready");
//! ```

mod file;
mod json_layer;

pub use file::{JsonlFile, JsonlFileWriter};
pub use json_layer::{JsonLayer, LogEntry};

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSON log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// JSONL log file. `None` disables the file layer.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings (stderr only).
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        also_stderr: true,
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this twice is harmless: the second installation attempt is ignored.
pub fn init_with_config(config: LogConfig) {
    let file_layer = config.log_path.as_ref().and_then(|path| {
        match JsonlFile::open(path) {
            Ok(writer) => Some(
                JsonLayer::new(config.service_name.clone(), writer)
                    .with_filter(env_filter(&config.default_level)),
            ),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let stderr_layer = if config.also_stderr || config.log_path.is_none() {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(env_filter(&config.default_level)),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        );
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
