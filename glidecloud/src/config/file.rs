//! Configuration file loading.
//!
//! Settings structs live in [`super::settings`], constants in
//! [`super::defaults`] and parsing in [`super::parser`].

use std::path::Path;

use ini::Ini;
use thiserror::Error;

pub use super::defaults::*;
pub use super::settings::*;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFile {
    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();

        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:5597");
        assert_eq!(config.database.save_interval, DEFAULT_SAVE_INTERVAL_SECS);
        assert!(!config.ogn.enabled);
        assert_eq!(config.ogn.server, "aprs.glidernet.org");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("glidecloud.ini");
        std::fs::write(&config_path, "[ogn]\nenabled = true\ncallsign = GC1\n").unwrap();

        let config = ConfigFile::load_from(&config_path).unwrap();
        let ogn = config.ogn_client_config();

        assert!(ogn.enabled);
        assert_eq!(ogn.callsign, "GC1");
        assert_eq!(ogn.port, 14580);
    }
}
