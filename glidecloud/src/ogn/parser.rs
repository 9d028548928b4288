//! APRS-IS line parser for OGN aircraft beacons.
//!
//! A line looks like
//!
//! ```text
//! FLRDDA5BA>APRS,qAS,LFMX:/165829h4415.41N/00600.03E'342/049/A=005524 id0ADDA5BA -454fpm
//! └ device ┘ └── path ──┘ └──────────────────── position payload ─────────────────────┘
//! ```
//!
//! Parsing is best effort: unknown comment tokens are skipped, but a line
//! without a usable position is rejected as a whole.

use crate::geo::GeoPoint;
use crate::registry::AircraftType;

const FEET_TO_METERS: f64 = 0.3048;
const KNOTS_TO_MPS: f64 = 0.514444;
const FPM_TO_MPS: f64 = 0.00508;

/// Callsign prefixes that precede a hexadecimal device address.
const ADDRESS_PREFIXES: [&str; 5] = ["FLR", "ICA", "PAW", "OGN", "DD"];

/// Position and motion decoded from an APRS position payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub location: GeoPoint,
    /// Meters above MSL.
    pub altitude: Option<i32>,
    /// Degrees, 0..=359.
    pub track: Option<u16>,
    /// m/s, rounded to whole meters per second.
    pub ground_speed: Option<f64>,
    /// m/s.
    pub climb_rate: Option<f64>,
    /// Degrees per second.
    pub turn_rate: Option<f64>,
    pub aircraft_type: AircraftType,
}

/// A parsed aircraft beacon.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficReport {
    /// APRS callsign of the sender.
    pub device_id: String,
    /// Device address derived from the callsign, 0 if none.
    pub database_id: u32,
    pub position: PositionReport,
}

/// Parse one APRS-IS line into an aircraft report.
///
/// Returns `None` for comments, receiver beacons, non-position packets and
/// anything malformed.
pub fn parse_line(line: &str) -> Option<TrafficReport> {
    let line = line.trim_end_matches(['\r', '\n']);
    let colon = line.find(':')?;
    let gt = line.find('>').filter(|&gt| gt < colon)?;

    let device_id = &line[..gt];
    if device_id.is_empty() {
        return None;
    }

    let path = &line[gt + 1..colon];
    if is_receiver_path(path) {
        return None;
    }

    let position = parse_position(&line[colon + 1..])?;
    Some(TrafficReport {
        device_id: device_id.to_owned(),
        database_id: database_id(device_id),
        position,
    })
}

/// Receiver (ground station) beacons arrive over TCP/IP.
fn is_receiver_path(path: &str) -> bool {
    path.contains("APRS,TCPIP*") || path.contains("qAC")
}

/// Device address from a callsign such as `FLRDDA5BA`, or 0.
pub fn database_id(callsign: &str) -> u32 {
    ADDRESS_PREFIXES
        .iter()
        .find_map(|prefix| callsign.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|rest| u32::from_str_radix(rest, 16).ok())
        .unwrap_or(0)
}

/// Parse an APRS position payload (the part after the colon).
pub fn parse_position(payload: &str) -> Option<PositionReport> {
    let mut cur = Cursor::new(payload.as_bytes());

    if !matches!(cur.peek(), Some(b'!' | b'/' | b'=')) {
        return None;
    }
    cur.bump(1);

    // HHMMSS timestamp, optionally followed by its format letter
    if cur.digits(6).is_some() {
        cur.bump(6);
        if matches!(cur.peek(), Some(b'h' | b'z' | b'/')) {
            cur.bump(1);
        }
    }

    let latitude = cur.coordinate(2, b'N', b'S')?;

    let aircraft_type = match cur.peek() {
        Some(b'/') => AircraftType::Glider,
        Some(b'\\') => AircraftType::Powered,
        Some(b'\'') => AircraftType::HangGlider,
        Some(b'^') => AircraftType::Paraglider,
        Some(b'O') => AircraftType::Balloon,
        Some(b'g' | b'z') => AircraftType::Uav,
        _ => AircraftType::Unknown,
    };
    if matches!(
        cur.peek(),
        Some(b'/' | b'\\' | b'\'' | b'^' | b'X' | b'g' | b'O' | b'z' | b'n')
    ) {
        cur.bump(1);
    }

    let longitude = cur.coordinate(3, b'E', b'W')?;

    let location = GeoPoint::new(latitude, longitude);
    if !location.is_valid() {
        return None;
    }

    let mut report = PositionReport {
        location,
        altitude: None,
        track: None,
        ground_speed: None,
        climb_rate: None,
        turn_rate: None,
        aircraft_type,
    };

    // Course/speed extension: 'ttt/sss
    if matches!(cur.peek(), Some(b'\'' | b'/' | b'\\' | b'^' | b'&')) {
        if let Some(track) = cur.digits_at(1, 3) {
            if track <= 359 {
                report.track = Some(track as u16);
            }
            cur.bump(4);
            if cur.eat(b'/') {
                if let Some(mut knots) = cur.digits(2) {
                    cur.bump(2);
                    if let Some(digit) = cur.digits(1) {
                        knots = knots * 10 + digit;
                        cur.bump(1);
                    }
                    report.ground_speed = Some((f64::from(knots) * KNOTS_TO_MPS).round());
                }
            }
        }
    }

    parse_comment(&mut cur, &mut report);
    Some(report)
}

/// Scan the free-form comment for the tokens we understand.
fn parse_comment(cur: &mut Cursor<'_>, report: &mut PositionReport) {
    while let Some(byte) = cur.peek() {
        if byte == b'\r' || byte == b'\n' {
            break;
        }

        if cur.starts_with(b"/A=") {
            cur.bump(3);
            if let Some(feet) = cur.integer() {
                report.altitude = Some((feet as f64 * FEET_TO_METERS) as i32);
                continue;
            }
        } else if cur.starts_with(b" id") {
            cur.bump(3);
            let mut count = 0;
            while count < 8 && cur.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                cur.bump(1);
                count += 1;
            }
            continue;
        } else if cur.starts_with(b" rot=") {
            cur.bump(5);
            if let Some(rate) = cur.number() {
                report.turn_rate = Some(rate);
                continue;
            }
        } else if cur.starts_with(b" clb=") {
            cur.bump(5);
            if let Some(rate) = cur.number() {
                report.climb_rate = Some(rate);
            }
            continue;
        } else if byte == b' ' && matches!(cur.peek_at(1), Some(b'+' | b'-')) {
            // Climb in fpm. Digit count varies by tracker (+64, -019, +0123).
            let mark = cur.pos;
            cur.bump(1);
            if let Some(fpm) = cur.integer() {
                if cur.starts_with(b"fpm") {
                    cur.bump(3);
                    report.climb_rate = Some(fpm as f64 * FPM_TO_MPS);
                    continue;
                }
            }
            cur.pos = mark;
        }

        cur.bump(1);
    }
}

/// Byte cursor over an ASCII payload.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.bytes.len());
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.bump(1);
            true
        } else {
            false
        }
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        self.bytes[self.pos..].starts_with(prefix)
    }

    /// Value of exactly `n` decimal digits at the cursor, not consumed.
    fn digits(&self, n: usize) -> Option<u32> {
        self.digits_at(0, n)
    }

    fn digits_at(&self, offset: usize, n: usize) -> Option<u32> {
        let start = self.pos + offset;
        let slice = self.bytes.get(start..start + n)?;
        slice.iter().try_fold(0u32, |acc, &b| {
            b.is_ascii_digit().then(|| acc * 10 + u32::from(b - b'0'))
        })
    }

    /// `DD[D]MM[.hh]` followed by a hemisphere letter, in signed degrees.
    fn coordinate(&mut self, degree_digits: usize, positive: u8, negative: u8) -> Option<f64> {
        let degrees = self.digits(degree_digits)?;
        self.bump(degree_digits);
        let minutes = self.digits(2)?;
        self.bump(2);

        let mut hundredths = 0;
        if self.peek() == Some(b'.') {
            self.bump(1);
            if let Some(value) = self.digits(2) {
                hundredths = value;
                self.bump(2);
            }
        }

        let value = f64::from(degrees)
            + (f64::from(minutes) + f64::from(hundredths) / 100.0) / 60.0;
        match self.peek()? {
            b if b == positive => {
                self.bump(1);
                Some(value)
            }
            b if b == negative => {
                self.bump(1);
                Some(-value)
            }
            _ => None,
        }
    }

    /// Optionally signed decimal integer, consumed on success.
    fn integer(&mut self) -> Option<i64> {
        let start = self.pos;
        let mut end = start;
        if matches!(self.bytes.get(end), Some(b'+' | b'-')) {
            end += 1;
        }
        let digits_start = end;
        while self.bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        if end == digits_start {
            return None;
        }
        let text = std::str::from_utf8(&self.bytes[start..end]).ok()?;
        let value = text.parse().ok()?;
        self.pos = end;
        Some(value)
    }

    /// Optionally signed decimal number with an optional fraction.
    fn number(&mut self) -> Option<f64> {
        let start = self.pos;
        let mut end = start;
        if matches!(self.bytes.get(end), Some(b'+' | b'-')) {
            end += 1;
        }
        let digits_start = end;
        while self
            .bytes
            .get(end)
            .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
        {
            end += 1;
        }
        if end == digits_start {
            return None;
        }
        let text = std::str::from_utf8(&self.bytes[start..end]).ok()?;
        let value = text.parse().ok()?;
        self.pos = end;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    // =========================================================================
    // Positions
    // =========================================================================

    #[test]
    fn test_basic_position() {
        let report = parse_position("!4742.50N/12226.22W").unwrap();
        assert!(close(report.location.latitude, 47.708333));
        assert!(close(report.location.longitude, -122.437));
        assert_eq!(report.track, None);
        assert_eq!(report.aircraft_type, AircraftType::Glider);
    }

    #[test]
    fn test_whole_minutes() {
        let report = parse_position("!4742N/12226E").unwrap();
        assert!(close(report.location.latitude, 47.7));
        assert!(close(report.location.longitude, 122.433333));
    }

    #[test]
    fn test_timestamp_prefix() {
        let report = parse_position("/123456/4742.50N/12226.22W").unwrap();
        assert!(close(report.location.latitude, 47.708333));
        let report = parse_position("/123456h4742.50N/12226.22W").unwrap();
        assert!(close(report.location.longitude, -122.437));
    }

    #[test]
    fn test_course_and_speed() {
        let report = parse_position("!4742.50N/12226.22W'270/045").unwrap();
        assert_eq!(report.track, Some(270));
        assert_eq!(report.ground_speed, Some(23.0));
    }

    #[test]
    fn test_track_out_of_range_ignored() {
        let report = parse_position("!4742.50N/12226.22W'400/045").unwrap();
        assert_eq!(report.track, None);
        assert_eq!(report.ground_speed, Some(23.0));
    }

    #[test]
    fn test_altitude() {
        let report = parse_position("!4742.50N/12226.22W/A=12345").unwrap();
        assert_eq!(report.altitude, Some(3762));
    }

    #[test]
    fn test_climb_rate_fpm() {
        let report = parse_position("!4742.50N/12226.22W +0123fpm").unwrap();
        assert!(close(report.climb_rate.unwrap(), 0.62484));
        let report = parse_position("!4742.50N/12226.22W -454fpm").unwrap();
        assert!(close(report.climb_rate.unwrap(), -2.30632));
        let report = parse_position("!4742.50N/12226.22W -019fpm").unwrap();
        assert!(close(report.climb_rate.unwrap(), -0.09652));
        let report = parse_position("!4742.50N/12226.22W +fpm").unwrap();
        assert_eq!(report.climb_rate, None);
    }

    #[test]
    fn test_turn_rate_and_clb() {
        let report = parse_position("!4742.50N/12226.22W rot=+12.5 clb=-3").unwrap();
        assert_eq!(report.turn_rate, Some(12.5));
        assert_eq!(report.climb_rate, Some(-3.0));
    }

    #[test]
    fn test_aircraft_types() {
        let cases = [
            ("!4742.50N/12226.22W", AircraftType::Glider),
            ("!4742.50N\\12226.22W", AircraftType::Powered),
            ("!4742.50N'12226.22W", AircraftType::HangGlider),
            ("!4742.50N^12226.22W", AircraftType::Paraglider),
            ("!4742.50NO12226.22W", AircraftType::Balloon),
            ("!4742.50Ng12226.22W", AircraftType::Uav),
            ("!4742.50Nn12226.22W", AircraftType::Unknown),
        ];
        for (payload, expected) in cases {
            assert_eq!(parse_position(payload).unwrap().aircraft_type, expected, "{payload}");
        }
    }

    #[test]
    fn test_invalid_payloads() {
        for payload in [
            "",
            "X4742.50N/12226.22W",
            "!4742.50X/12226.22W",
            "!4742.50N/12226.22X",
            "!47N/122W",
            "!4742.50N",
            "!9542.50N/12226.22W",
        ] {
            assert!(parse_position(payload).is_none(), "{payload}");
        }
    }

    #[test]
    fn test_real_world_payloads() {
        let report = parse_position(
            "/205026h4942.30N/00707.33E^266/435/A=024093 !W08! id253C6749 +64fpm FL239.50 A3:DLH84M",
        )
        .unwrap();
        assert_eq!(report.track, Some(266));
        assert_eq!(report.ground_speed, Some(224.0));
        assert_eq!(report.altitude, Some(7343));
        assert!(close(report.climb_rate.unwrap(), 0.32512));
        assert_eq!(report.aircraft_type, AircraftType::Glider);

        let report = parse_position(
            "/205027h5059.14N/00646.55E'302/034/A=000206 !W92! id203D223B +000fpm gps6x3",
        )
        .unwrap();
        assert_eq!(report.track, Some(302));
        assert_eq!(report.ground_speed, Some(17.0));
        assert_eq!(report.altitude, Some(62));
        assert_eq!(report.climb_rate, Some(0.0));
    }

    // =========================================================================
    // Lines
    // =========================================================================

    #[test]
    fn test_receiver_beacon_discarded() {
        assert!(parse_line("LKHS>APRS,TCPIP*,qAC,GLIDERN2:/211635h4902.45NI01429.51E&000/000/A=001689").is_none());
        assert!(parse_line("EDER>OGNSDR,qAC,GLIDERN3:/120000h5000.00N/01000.00E").is_none());
    }

    #[test]
    fn test_aircraft_line_parsed() {
        let report = parse_line(
            "FLRDDA5BA>APRS,qAS,LFMX:/165829h4415.41N/00600.03E'342/049/A=005524 id0ADDA5BA -454fpm\r\n",
        )
        .unwrap();
        assert_eq!(report.device_id, "FLRDDA5BA");
        assert_eq!(report.database_id, 0xdda5ba);
        assert_eq!(report.position.track, Some(342));
        assert_eq!(report.position.altitude, Some(1683));
        assert!(close(report.position.location.latitude, 44.256833));
    }

    #[test]
    fn test_receiver_beacon_with_bare_position_discarded() {
        assert!(parse_line("ID123>APRS,TCPIP*,qAC,GLIDERN2:!4742.50N/12226.22W").is_none());
    }

    #[test]
    fn test_tracker_line_with_course_and_altitude() {
        let report =
            parse_line("FLR123456>OGNTRK:!4742.50N/12226.22W'270/045/A=012345").unwrap();
        assert_eq!(report.device_id, "FLR123456");
        assert_eq!(report.database_id, 0x123456);

        let position = report.position;
        assert!(close(position.location.latitude, 47.708333));
        assert!(close(position.location.longitude, -122.437));
        assert_eq!(position.aircraft_type, AircraftType::Glider);
        assert_eq!(position.track, Some(270));
        assert_eq!(position.ground_speed, Some(23.0));
        assert_eq!(position.altitude, Some(3762));
        assert_eq!(position.climb_rate, None);
    }

    #[test]
    fn test_non_position_lines_ignored() {
        assert!(parse_line("# aprsc 2.1.4").is_none());
        assert!(parse_line("FLRDDA5BA>APRS,qAS,LFMX:>status text").is_none());
        assert!(parse_line("no separators here").is_none());
        assert!(parse_line("A:B>C").is_none());
        assert!(parse_line(">APRS:!4742.50N/12226.22W").is_none());
    }

    #[test]
    fn test_database_id() {
        assert_eq!(database_id("FLRDDA5BA"), 0xdda5ba);
        assert_eq!(database_id("ICA3D1C35"), 0x3d1c35);
        assert_eq!(database_id("OGN123456"), 0x123456);
        assert_eq!(database_id("PAW404040"), 0x404040);
        assert_eq!(database_id("DD1234"), 0x1234);
        assert_eq!(database_id("LKHS"), 0);
        assert_eq!(database_id("FLR"), 0);
        assert_eq!(database_id("FLRXYZ"), 0);
    }
}
