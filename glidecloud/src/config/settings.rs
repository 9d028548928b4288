//! Settings structs, one per `[section]` of the INI file.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::ogn::OgnClientConfig;

/// Complete server configuration loaded from the INI file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub ogn: OgnSettings,
    pub logging: LoggingSettings,
}

/// UDP listener.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub bind: IpAddr,
    pub port: u16,
}

/// State snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    /// Seconds between snapshots, at least 1.
    pub save_interval: u64,
}

/// OGN APRS-IS feed.
#[derive(Debug, Clone, PartialEq)]
pub struct OgnSettings {
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    pub callsign: String,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Append log output to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

impl ConfigFile {
    /// Address the UDP socket binds to.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.database.save_interval)
    }

    /// Client configuration for the APRS-IS feed.
    pub fn ogn_client_config(&self) -> OgnClientConfig {
        OgnClientConfig {
            enabled: self.ogn.enabled,
            server: self.ogn.server.clone(),
            port: self.ogn.port,
            callsign: self.ogn.callsign.clone(),
            filter: self.ogn.filter.clone(),
            ..Default::default()
        }
    }
}
