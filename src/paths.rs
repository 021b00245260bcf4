//! Runtime directory layout.
//!
//! The data directory defaults to `~/.rouge` and can be moved with
//! `ROUGE_DATA_DIR` or the global `--data-dir` flag.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DATA_DIR_ENV: &str = "ROUGE_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RougePaths {
    base: PathBuf,
}

impl RougePaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve the data directory: explicit override, then `ROUGE_DATA_DIR`,
    /// then `~/.rouge`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, |key| std::env::var(key).ok())
    }

    pub fn resolve_with(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            return Ok(Self::new(dir));
        }
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(Self::new(home.join(".rouge")))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.base.join("workflows")
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("rouge.toml")
    }

    pub fn default_database(&self) -> PathBuf {
        self.base.join("rouge.db")
    }

    pub fn worker_log_name(worker_id: &str) -> String {
        format!("worker_{worker_id}.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.logs_dir(), self.workflows_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let paths = RougePaths::resolve_with(Some(Path::new("/tmp/explicit")), |_| {
            Some("/tmp/from-env".to_string())
        })
        .unwrap();
        assert_eq!(paths.base_dir(), Path::new("/tmp/explicit"));
    }

    #[test]
    fn test_env_override() {
        let paths = RougePaths::resolve_with(None, |key| {
            (key == DATA_DIR_ENV).then(|| "/tmp/from-env".to_string())
        })
        .unwrap();
        assert_eq!(paths.base_dir(), Path::new("/tmp/from-env"));
        assert_eq!(paths.logs_dir(), Path::new("/tmp/from-env/logs"));
        assert_eq!(paths.config_file(), Path::new("/tmp/from-env/rouge.toml"));
    }

    #[test]
    fn test_blank_env_falls_back_to_home() {
        let paths = RougePaths::resolve_with(None, |_| Some("  ".to_string())).unwrap();
        assert!(paths.base_dir().ends_with(".rouge"));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RougePaths::new(dir.path().join("data"));
        paths.ensure_directories().unwrap();
        assert!(paths.logs_dir().is_dir());
        assert!(paths.workflows_dir().is_dir());
    }
}
