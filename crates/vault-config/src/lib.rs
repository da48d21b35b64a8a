//! Configuration, paths, and logging setup for deskvault.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DatabaseSettings, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
