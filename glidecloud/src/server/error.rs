//! Server startup errors.

use std::net::SocketAddr;

use thiserror::Error;

use crate::persist::PersistError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind UDP socket on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load database: {0}")]
    Load(#[source] PersistError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}
