//! Logging initialization for the deskvault binary.
//!
//! Library crates only emit `tracing` events; the binary installs the
//! subscriber once through [`init_logging`].

use std::path::Path;

/// Initialize the logging system.
///
/// Events are appended as JSONL to `log_path` and mirrored to stderr when
/// `also_stderr` is set. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, log_path: &Path, also_stderr: bool) {
    observability::init_with_config(observability::LogConfig {
        service_name: "deskvault".into(),
        default_level: level.into(),
        log_path: Some(log_path.to_path_buf()),
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("Verbose"), tracing::Level::INFO);
    }
}
