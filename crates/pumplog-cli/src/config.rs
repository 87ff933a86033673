//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fabricate the first scheduled segment after a settings snapshot when
    /// no basal is active. Needed for pump families that never report that
    /// segment themselves.
    pub auto_schedule: bool,
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PUMPLOG_*)
        figment = figment.merge(Env::prefixed("PUMPLOG_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for pumplog.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pumplog"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_config_path_returns_some() {
        assert!(dirs_config_path().is_some());
    }

    #[test]
    fn test_dirs_config_path_ends_with_pumplog() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "pumplog");
    }

    #[test]
    fn test_default_config_leaves_auto_schedule_off() {
        assert!(!Config::default().auto_schedule);
    }
}
