//! INI configuration for the glidecloud server.
//!
//! ```ini
//! [server]
//! bind = 0.0.0.0
//! port = 5597
//!
//! [database]
//! save_interval = 60
//!
//! [ogn]
//! enabled = true
//! callsign = GLDCLD1
//! filter = r/47.0/8.0/300
//!
//! [logging]
//! file = /var/log/glidecloud.log
//! ```
//!
//! # Example
//!
//! ```
//! use glidecloud::config::ConfigFile;
//! use std::path::Path;
//!
//! let config = ConfigFile::load_from(Path::new("/nonexistent.ini")).unwrap();
//! assert_eq!(config.server.port, 5597);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;

pub use file::{
    ConfigFile, ConfigFileError, DatabaseSettings, LoggingSettings, OgnSettings, ServerSettings,
    DEFAULT_BIND_ADDRESS, DEFAULT_SAVE_INTERVAL_SECS, DEFAULT_SERVER_PORT,
};
