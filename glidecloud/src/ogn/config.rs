//! Configuration for the OGN APRS-IS client.

use std::time::Duration;

/// Default APRS-IS server of the Open Glider Network.
pub const DEFAULT_OGN_SERVER: &str = "aprs.glidernet.org";

/// Default port (filtered feed).
pub const DEFAULT_OGN_PORT: u16 = 14580;

/// Default read-only login callsign.
pub const DEFAULT_OGN_CALLSIGN: &str = "N0CALL";

/// Default connect timeout per address.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default wait before reconnecting.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 30;

/// Default keep-alive interval.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 240;

/// Configuration for [`OgnClient`](super::OgnClient).
#[derive(Debug, Clone, PartialEq)]
pub struct OgnClientConfig {
    /// Whether the feed is ingested at all.
    pub enabled: bool,

    /// APRS-IS host name.
    pub server: String,

    /// APRS-IS port.
    pub port: u16,

    /// Callsign sent in the login line.
    pub callsign: String,

    /// Optional server-side filter, e.g. `r/47.0/8.0/200`.
    pub filter: Option<String>,

    /// Timeout for each TCP connect attempt.
    pub connect_timeout: Duration,

    /// Wait after a failed or closed session before trying again.
    pub reconnect_delay: Duration,

    /// Interval between `#keepalive` lines.
    pub keepalive_interval: Duration,
}

impl OgnClientConfig {
    /// The APRS-IS login line, including the line terminator.
    pub fn login_line(&self) -> String {
        let mut line = format!(
            "user {} pass -1 vers glidecloud {}",
            self.callsign,
            crate::VERSION
        );
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            line.push_str(" filter ");
            line.push_str(filter);
        }
        line.push_str("\r\n");
        line
    }
}

impl Default for OgnClientConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: DEFAULT_OGN_SERVER.to_string(),
            port: DEFAULT_OGN_PORT,
            callsign: DEFAULT_OGN_CALLSIGN.to_string(),
            filter: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OgnClientConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.server, "aprs.glidernet.org");
        assert_eq!(config.port, 14580);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect_delay, Duration::from_secs(30));
        assert_eq!(config.keepalive_interval, Duration::from_secs(240));
    }

    #[test]
    fn test_login_line() {
        let mut config = OgnClientConfig {
            callsign: "GC1".into(),
            ..Default::default()
        };
        assert_eq!(
            config.login_line(),
            format!("user GC1 pass -1 vers glidecloud {}\r\n", crate::VERSION)
        );

        config.filter = Some("r/47/8/100".into());
        assert!(config.login_line().ends_with(" filter r/47/8/100\r\n"));
    }
}
