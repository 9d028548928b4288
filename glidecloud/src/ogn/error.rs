//! Error types for the OGN APRS-IS client.

use thiserror::Error;

/// Reasons an APRS-IS session could not be established or ended.
#[derive(Debug, Error)]
pub enum OgnError {
    /// Name resolution failed.
    #[error("Failed to resolve {server}:{port}: {source}")]
    Resolve {
        server: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Resolution returned no addresses.
    #[error("No address found for {0}")]
    NoAddress(String),

    /// Every resolved address refused or timed out.
    #[error("All connection attempts to {0} failed")]
    ConnectFailed(String),

    /// Read or write error on an established connection.
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection.
    #[error("Connection closed by server")]
    Closed,

    /// The server sent an empty line, which APRS-IS uses to signal failure.
    #[error("Zero-length line received")]
    EmptyLine,
}
