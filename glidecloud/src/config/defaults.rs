//! Default values for all configuration settings and the
//! `ConfigFile::default()` implementation.

use std::net::{IpAddr, Ipv4Addr};

use super::settings::*;
use crate::ogn::{DEFAULT_OGN_CALLSIGN, DEFAULT_OGN_PORT, DEFAULT_OGN_SERVER};

// =============================================================================
// [server]
// =============================================================================

/// Listen on every IPv4 interface.
pub const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// UDP port of the live-tracking protocol.
pub const DEFAULT_SERVER_PORT: u16 = 5597;

// =============================================================================
// [database]
// =============================================================================

/// Seconds between state snapshots.
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 60;

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind: DEFAULT_BIND_ADDRESS,
                port: DEFAULT_SERVER_PORT,
            },
            database: DatabaseSettings {
                save_interval: DEFAULT_SAVE_INTERVAL_SECS,
            },
            ogn: OgnSettings {
                enabled: false,
                server: DEFAULT_OGN_SERVER.to_string(),
                port: DEFAULT_OGN_PORT,
                callsign: DEFAULT_OGN_CALLSIGN.to_string(),
                filter: None,
            },
            logging: LoggingSettings { file: None },
        }
    }
}
