//! File system locations used by deskvault.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

const BASE_DIR_NAME: &str = ".deskvault";
const DATABASE_FILE_NAME: &str = "deskvault.db";
const LOG_FILE_NAME: &str = "deskvault.jsonl";

/// Resolves every path deskvault reads or writes, rooted at one base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.deskvault)
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.deskvault`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Paths rooted at a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Use `base_dir` when given, otherwise the default location.
    pub fn resolve(base_dir: Option<PathBuf>) -> CoreResult<Self> {
        match base_dir {
            Some(dir) => Ok(Self::with_base_dir(dir)),
            None => Self::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<base>/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// `<base>/deskvault.db`
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE_NAME)
    }

    /// `<base>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `<base>/logs/deskvault.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-deskvault");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), base.as_path());
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.database_file(), base.join("deskvault.db"));
        assert_eq!(paths.logs_dir(), base.join("logs"));
        assert_eq!(paths.log_file(), base.join("logs/deskvault.jsonl"));
    }

    #[test]
    fn test_paths_default_under_home() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), home.join(".deskvault").as_path());
    }

    #[test]
    fn test_resolve_prefers_override() {
        let paths = Paths::resolve(Some(PathBuf::from("/elsewhere"))).unwrap();
        assert_eq!(paths.base_dir(), Path::new("/elsewhere"));
    }

    #[test]
    fn test_ensure_dirs_idempotent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("deskvault");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
