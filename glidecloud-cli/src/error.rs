//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use glidecloud::config::ConfigFileError;
use glidecloud::persist::PersistError;
use glidecloud::server::ServerError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration file could not be read or is invalid
    Config(ConfigFileError),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// Server failed to start or stopped with an error
    Server(ServerError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Server(ServerError::Load(
                PersistError::BadMagic(_)
                | PersistError::UnsupportedVersion(_)
                | PersistError::Truncated
                | PersistError::Invalid(_),
            )) => {
                eprintln!();
                eprintln!("The database file is not a usable glidecloud snapshot.");
                eprintln!("Move it aside to start with an empty state.");
            }
            CliError::Server(ServerError::Bind { .. }) => {
                eprintln!();
                eprintln!("Check that no other server is using the port,");
                eprintln!("or choose another one in the [server] section of the config file.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Server(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Server(e) => Some(e),
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ServerError> for CliError {
    fn from(e: ServerError) -> Self {
        CliError::Server(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_wraps_source() {
        let err = CliError::Server(ServerError::Load(PersistError::UnsupportedVersion(9)));
        assert_eq!(
            err.to_string(),
            "Failed to load database: Unsupported database version 9"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_message() {
        let err = CliError::from(ConfigFileError::InvalidValue {
            section: "server".into(),
            key: "port".into(),
            value: "x".into(),
            reason: "must be a port number".into(),
        });
        assert!(err.to_string().starts_with("Configuration error: "));
    }
}
