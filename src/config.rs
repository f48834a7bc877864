use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

use crate::session::DEFAULT_LEVEL_WINDOW;

/// Engine settings. Every field has a default, so a config file only needs
/// to name what it overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Longest allowed take in seconds; 0 disables the cap
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    /// Number of levels kept in the rolling window
    #[serde(default = "default_level_window")]
    pub level_window: usize,
    /// Where in-progress takes are captured
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Where saved recordings live
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// The duration cap, with the 0 sentinel mapped to "uncapped".
    pub fn max_duration(&self) -> Option<u64> {
        (self.max_duration_secs > 0).then_some(self.max_duration_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: default_max_duration_secs(),
            level_window: default_level_window(),
            scratch_dir: default_scratch_dir(),
            library_dir: default_library_dir(),
        }
    }
}

fn default_max_duration_secs() -> u64 {
    600
}

fn default_level_window() -> usize {
    DEFAULT_LEVEL_WINDOW
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("recordings/scratch")
}

fn default_library_dir() -> PathBuf {
    PathBuf::from("recordings/library")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = EngineConfig::default();
        assert_eq!(config.max_duration_secs, 600);
        assert_eq!(config.level_window, DEFAULT_LEVEL_WINDOW);
        assert_eq!(config.max_duration(), Some(600));
    }

    #[test]
    fn zero_cap_means_uncapped() {
        let config = EngineConfig {
            max_duration_secs: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.max_duration(), None);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "max_duration_secs = 30\n").unwrap();

        let config = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.max_duration(), Some(30));
        assert_eq!(config.level_window, DEFAULT_LEVEL_WINDOW);
    }
}
