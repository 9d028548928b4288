//! Packet and record types of the tracking protocol.
//!
//! Values are held in physical units (degrees, meters, m/s); the fixed-point
//! wire encodings live in the codec.

use crate::geo::GeoPoint;

/// Packet type tags as they appear in the header.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Ping = 1,
    Ack = 2,
    Fix = 3,
    TrafficRequest = 4,
    TrafficResponse = 5,
    UserNameRequest = 6,
    UserNameResponse = 7,
    WaveSubmit = 8,
    WaveRequest = 9,
    WaveResponse = 10,
    ThermalSubmit = 11,
    ThermalRequest = 12,
    ThermalResponse = 13,
}

impl PacketType {
    /// Look up a type by its wire tag.
    pub fn from_tag(tag: u16) -> Option<Self> {
        Some(match tag {
            1 => Self::Ping,
            2 => Self::Ack,
            3 => Self::Fix,
            4 => Self::TrafficRequest,
            5 => Self::TrafficResponse,
            6 => Self::UserNameRequest,
            7 => Self::UserNameResponse,
            8 => Self::WaveSubmit,
            9 => Self::WaveRequest,
            10 => Self::WaveResponse,
            11 => Self::ThermalSubmit,
            12 => Self::ThermalRequest,
            13 => Self::ThermalResponse,
            _ => return None,
        })
    }

    /// Wire tag of this type.
    pub fn tag(self) -> u16 {
        self as u16
    }

    /// Minimum datagram size for this type, header included.
    pub fn fixed_size(self) -> usize {
        match self {
            Self::Fix | Self::WaveSubmit | Self::ThermalSubmit => 48,
            Self::UserNameResponse => 40,
            _ => 24,
        }
    }
}

/// ACK flag: the key in the request was rejected.
pub const ACK_FLAG_BAD_KEY: u32 = 0x1;

/// Traffic request flags.
pub const TRAFFIC_FLAG_FOLLOWEES: u32 = 0x1;
pub const TRAFFIC_FLAG_CLUB: u32 = 0x2;
pub const TRAFFIC_FLAG_NEAR: u32 = 0x4;

/// User name response flag: no user with that id.
pub const USER_NAME_FLAG_NOT_FOUND: u32 = 0x1;

/// Fix flags marking which optional fields are present.
pub mod fix_flags {
    pub const LOCATION: u32 = 0x1;
    pub const TRACK: u32 = 0x2;
    pub const GROUND_SPEED: u32 = 0x4;
    pub const AIRSPEED: u32 = 0x8;
    pub const ALTITUDE: u32 = 0x10;
    pub const VARIO: u32 = 0x20;
    pub const ENL: u32 = 0x40;
}

/// A GPS fix uploaded by a client.
///
/// Optional fields are `None` when the corresponding flag is clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fix {
    /// Millisecond of the UTC day (may exceed one day after midnight).
    pub time_of_day_ms: u32,
    pub location: Option<GeoPoint>,
    /// Ground track in degrees.
    pub track: Option<u16>,
    /// Ground speed in m/s.
    pub ground_speed: Option<f64>,
    /// Indicated airspeed in m/s.
    pub airspeed: Option<f64>,
    /// Altitude above MSL in meters.
    pub altitude: Option<i16>,
    /// Vertical speed in m/s.
    pub vario: Option<f64>,
    /// Engine noise level (0..999).
    pub engine_noise_level: Option<u16>,
}

impl Fix {
    /// Flag word describing which fields are present.
    pub fn flags(&self) -> u32 {
        use fix_flags::*;

        let mut flags = 0;
        let mut set = |present: bool, flag: u32| {
            if present {
                flags |= flag;
            }
        };
        set(self.location.is_some(), LOCATION);
        set(self.track.is_some(), TRACK);
        set(self.ground_speed.is_some(), GROUND_SPEED);
        set(self.airspeed.is_some(), AIRSPEED);
        set(self.altitude.is_some(), ALTITUDE);
        set(self.vario.is_some(), VARIO);
        set(self.engine_noise_level.is_some(), ENL);
        flags
    }
}

/// One aircraft in a traffic response.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRecord {
    pub pilot_id: u32,
    /// Millisecond of the UTC day the position was reported.
    pub time_of_day_ms: u32,
    pub location: GeoPoint,
    pub altitude: i16,
    /// Track in degrees (0 if unknown).
    pub track: u16,
    /// Turn rate in degrees per second.
    pub turn_rate: f64,
    /// Vertical speed in m/s.
    pub vario: f64,
}

/// A thermal as submitted or returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalRecord {
    pub time_of_day_ms: u32,
    pub bottom: GeoPoint,
    pub top: GeoPoint,
    pub bottom_altitude: i16,
    pub top_altitude: i16,
    /// Average lift in m/s.
    pub lift: f64,
}

/// A wave as submitted or returned, described by two points on its axis.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveRecord {
    pub time_of_day_ms: u32,
    pub a: GeoPoint,
    pub b: GeoPoint,
    pub bottom_altitude: i16,
    pub top_altitude: i16,
    /// Average lift in m/s.
    pub lift: f64,
}

/// Reply to a user name request.
#[derive(Debug, Clone, PartialEq)]
pub struct UserNameResponse {
    pub user_id: u32,
    pub flags: u32,
    pub club_id: u32,
    pub name: String,
}

impl UserNameResponse {
    /// A response carrying a name.
    pub fn found(user_id: u32, name: impl Into<String>) -> Self {
        Self {
            user_id,
            flags: 0,
            club_id: 0,
            name: name.into(),
        }
    }

    /// A response reporting an unknown user.
    pub fn not_found(user_id: u32) -> Self {
        Self {
            user_id,
            flags: USER_NAME_FLAG_NOT_FOUND,
            club_id: 0,
            name: String::new(),
        }
    }
}

/// Decoded packet body.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Ping { id: u16 },
    Ack { id: u16, flags: u32 },
    Fix(Fix),
    TrafficRequest { flags: u32 },
    TrafficResponse(Vec<TrafficRecord>),
    UserNameRequest { user_id: u32 },
    UserNameResponse(UserNameResponse),
    WaveSubmit(WaveRecord),
    WaveRequest { flags: u32 },
    WaveResponse(Vec<WaveRecord>),
    ThermalSubmit(ThermalRecord),
    ThermalRequest { flags: u32 },
    ThermalResponse(Vec<ThermalRecord>),
}

impl Packet {
    /// Type tag of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Ping { .. } => PacketType::Ping,
            Self::Ack { .. } => PacketType::Ack,
            Self::Fix(_) => PacketType::Fix,
            Self::TrafficRequest { .. } => PacketType::TrafficRequest,
            Self::TrafficResponse(_) => PacketType::TrafficResponse,
            Self::UserNameRequest { .. } => PacketType::UserNameRequest,
            Self::UserNameResponse(_) => PacketType::UserNameResponse,
            Self::WaveSubmit(_) => PacketType::WaveSubmit,
            Self::WaveRequest { .. } => PacketType::WaveRequest,
            Self::WaveResponse(_) => PacketType::WaveResponse,
            Self::ThermalSubmit(_) => PacketType::ThermalSubmit,
            Self::ThermalRequest { .. } => PacketType::ThermalRequest,
            Self::ThermalResponse(_) => PacketType::ThermalResponse,
        }
    }
}

/// A full datagram: the sender's key and the packet body.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub key: u64,
    pub packet: Packet,
}

impl Datagram {
    pub fn new(key: u64, packet: Packet) -> Self {
        Self { key, packet }
    }
}
