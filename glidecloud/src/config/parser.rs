//! INI parsing: the single place where INI key names map to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = parse_value(section, "server", "bind", "must be an IP address")? {
            config.server.bind = v;
        }
        if let Some(v) = parse_value(section, "server", "port", "must be a port number")? {
            config.server.port = v;
        }
    }

    // [database] section
    if let Some(section) = ini.section(Some("database")) {
        if let Some(v) = section.get("save_interval") {
            config.database.save_interval = v
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|&secs| secs > 0)
                .ok_or_else(|| {
                    invalid(
                        "database",
                        "save_interval",
                        v,
                        "must be a positive integer (seconds)",
                    )
                })?;
        }
    }

    // [ogn] section
    if let Some(section) = ini.section(Some("ogn")) {
        if let Some(v) = section.get("enabled") {
            config.ogn.enabled = parse_bool(v);
        }
        if let Some(v) = section.get("server") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("ogn", "server", v, "must not be empty"));
            }
            config.ogn.server = v.to_string();
        }
        if let Some(v) = parse_value(section, "ogn", "port", "must be a port number")? {
            config.ogn.port = v;
        }
        if let Some(v) = section.get("callsign") {
            let v = v.trim();
            if v.is_empty() || v.contains(char::is_whitespace) {
                return Err(invalid("ogn", "callsign", v, "must be a single word"));
            }
            config.ogn.callsign = v.to_string();
        }
        if let Some(v) = section.get("filter") {
            let v = v.trim();
            config.ogn.filter = (!v.is_empty()).then(|| v.to_string());
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = Some(PathBuf::from(v));
            }
        }
    }

    Ok(config)
}

/// Parse an optional key with `FromStr`.
fn parse_value<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    section
        .get(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| invalid(section_name, key, v, reason))
        })
        .transpose()
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv6Addr};

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        parse_ini(&Ini::load_from_str(text).unwrap())
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            "[server]\nbind = ::\nport = 6000\n\
             [database]\nsave_interval = 15\n\
             [ogn]\nenabled = yes\nserver = aprs.example.org\nport = 10152\n\
             callsign = GC42\nfilter = r/47/8/200\n\
             [logging]\nfile = /var/log/glidecloud.log\n",
        )
        .unwrap();

        assert_eq!(config.server.bind, IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.database.save_interval, 15);
        assert!(config.ogn.enabled);
        assert_eq!(config.ogn.server, "aprs.example.org");
        assert_eq!(config.ogn.port, 10152);
        assert_eq!(config.ogn.callsign, "GC42");
        assert_eq!(config.ogn.filter.as_deref(), Some("r/47/8/200"));
        assert_eq!(
            config.logging.file,
            Some(PathBuf::from("/var/log/glidecloud.log"))
        );
    }

    #[test]
    fn test_partial_config() {
        let config = parse("[server]\nport = 7000\n").unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.bind, ConfigFile::default().server.bind);
        assert!(!config.ogn.enabled);
    }

    #[test]
    fn test_invalid_port() {
        let err = parse("[server]\nport = 70000\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "server");
                assert_eq!(key, "port");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_bind() {
        assert!(parse("[server]\nbind = localhost\n").is_err());
    }

    #[test]
    fn test_zero_save_interval_rejected() {
        assert!(parse("[database]\nsave_interval = 0\n").is_err());
        assert!(parse("[database]\nsave_interval = soon\n").is_err());
    }

    #[test]
    fn test_callsign_must_be_one_word() {
        assert!(parse("[ogn]\ncallsign = two words\n").is_err());
    }

    #[test]
    fn test_empty_filter_is_none() {
        let config = parse("[ogn]\nfilter =\n").unwrap();
        assert!(config.ogn.filter.is_none());
    }

    #[test]
    fn test_parse_bool_values() {
        for v in ["true", "TRUE", "1", "yes", "on", " Yes "] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["false", "0", "no", "off", "", "maybe"] {
            assert!(!parse_bool(v), "{v}");
        }
    }
}
