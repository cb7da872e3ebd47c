use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::archive::{EvictionPolicy, DEFAULT_ARCHIVE_CAPACITY};
use crate::scheduler::DEFAULT_SAVE_DELAY;

pub const DEFAULT_REQUESTED_FILES_ENV: &str = "DOCSESSION_OPEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub save_delay_ms: u64,
    pub archive_capacity: usize,
    pub eviction: EvictionPolicy,
    pub requested_files_env: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_delay_ms: DEFAULT_SAVE_DELAY.as_millis() as u64,
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            eviction: EvictionPolicy::default(),
            requested_files_env: DEFAULT_REQUESTED_FILES_ENV.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Reads a TOML config. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path))
            }
        };
        Self::parse(&raw).with_context(|| format!("failed to parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = SessionConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.save_delay(), Duration::from_millis(500));
        assert_eq!(config.archive_capacity, 500);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = SessionConfig::parse("eviction = \"lru\"\nsave_delay_ms = 250\n").unwrap();
        assert_eq!(config.eviction, EvictionPolicy::Lru);
        assert_eq!(config.save_delay_ms, 250);
        assert_eq!(config.requested_files_env, DEFAULT_REQUESTED_FILES_ENV);
    }

    #[test]
    fn malformed_file_is_an_error_with_context() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "archive_capacity = \"lots\"").unwrap();
        let err = SessionConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }
}
