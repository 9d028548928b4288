//! Binary encoding and decoding of datagrams.
//!
//! Every datagram starts with a 16-byte header (magic, CRC, type, key).
//! Integers are big-endian; coordinates are micro-degrees, lift and vario
//! are 1/256 m/s, turn rate is 1/10 deg/s and speeds are 1/16 m/s.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::crc::crc16_ccitt;
use super::packet::{
    fix_flags, Datagram, Fix, Packet, PacketType, ThermalRecord, TrafficRecord, UserNameResponse,
    WaveRecord,
};
use super::{HEADER_SIZE, MAGIC};
use crate::geo::GeoPoint;

/// Maximum number of records a response header can announce.
pub const MAX_RECORD_COUNT: usize = u8::MAX as usize;

/// Size of the fixed part of a user name response.
const USER_NAME_RESPONSE_SIZE: usize = 40;

/// Byte offset of the CRC field.
const CRC_OFFSET: usize = 4;

/// Reasons a datagram is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram too short for a header: {len} bytes")]
    TooShort { len: usize },

    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    #[error("unknown packet type {0}")]
    UnknownType(u16),

    #[error("{packet_type:?} needs {expected} bytes, got {actual}")]
    Truncated {
        packet_type: PacketType,
        expected: usize,
        actual: usize,
    },

    #[error("{packet_type:?} announces {count} records but carries {remaining} bytes")]
    CountMismatch {
        packet_type: PacketType,
        count: usize,
        remaining: usize,
    },

    #[error("user name length {length} does not match {remaining} trailing bytes")]
    NameLengthMismatch { length: usize, remaining: usize },

    #[error("user name is not valid UTF-8")]
    InvalidName,

    #[error("CRC mismatch: header says 0x{expected:04x}, computed 0x{actual:04x}")]
    BadCrc { expected: u16, actual: u16 },
}

// =========================================================================
// Fixed-point conversions
// =========================================================================

/// Degrees to wire micro-degrees.
pub fn to_micro_degrees(degrees: f64) -> i32 {
    (degrees * 1_000_000.0)
        .round()
        .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// Wire micro-degrees to degrees.
pub fn from_micro_degrees(value: i32) -> f64 {
    f64::from(value) / 1_000_000.0
}

/// Scale a value into a saturating signed 16-bit fixed-point field.
pub fn to_fixed_i16(value: f64, scale: f64) -> i16 {
    (value * scale)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Scale a value into a saturating unsigned 16-bit fixed-point field.
pub fn to_fixed_u16(value: f64, scale: f64) -> u16 {
    (value * scale).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Lift and climb: 1/256 m/s.
pub const LIFT_SCALE: f64 = 256.0;
/// Vario: 1/256 m/s.
pub const VARIO_SCALE: f64 = 256.0;
/// Turn rate: 1/10 deg/s.
pub const TURN_RATE_SCALE: f64 = 10.0;
/// Ground speed and airspeed: 1/16 m/s.
pub const SPEED_SCALE: f64 = 16.0;

fn put_point(buf: &mut BytesMut, point: &GeoPoint) {
    buf.put_i32(to_micro_degrees(point.latitude));
    buf.put_i32(to_micro_degrees(point.longitude));
}

fn get_point(buf: &mut &[u8]) -> GeoPoint {
    let latitude = from_micro_degrees(buf.get_i32());
    let longitude = from_micro_degrees(buf.get_i32());
    GeoPoint::new(latitude, longitude)
}

// =========================================================================
// Response records
// =========================================================================

/// A record carried in a variable-length response packet.
pub trait ResponseRecord: Sized {
    /// Encoded size of one record.
    const SIZE: usize;

    /// Response packet type carrying this record.
    const RESPONSE: PacketType;

    fn put(&self, buf: &mut BytesMut);

    /// Read one record. The caller guarantees `SIZE` bytes are available.
    fn get(buf: &mut &[u8]) -> Self;
}

impl ResponseRecord for TrafficRecord {
    const SIZE: usize = 24;
    const RESPONSE: PacketType = PacketType::TrafficResponse;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32(self.pilot_id);
        buf.put_u32(self.time_of_day_ms);
        put_point(buf, &self.location);
        buf.put_i16(self.altitude);
        buf.put_u16(self.track);
        buf.put_i16(to_fixed_i16(self.turn_rate, TURN_RATE_SCALE));
        buf.put_i16(to_fixed_i16(self.vario, VARIO_SCALE));
    }

    fn get(buf: &mut &[u8]) -> Self {
        Self {
            pilot_id: buf.get_u32(),
            time_of_day_ms: buf.get_u32(),
            location: get_point(buf),
            altitude: buf.get_i16(),
            track: buf.get_u16(),
            turn_rate: f64::from(buf.get_i16()) / TURN_RATE_SCALE,
            vario: f64::from(buf.get_i16()) / VARIO_SCALE,
        }
    }
}

impl ResponseRecord for ThermalRecord {
    const SIZE: usize = 32;
    const RESPONSE: PacketType = PacketType::ThermalResponse;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32(self.time_of_day_ms);
        buf.put_u32(0);
        put_point(buf, &self.bottom);
        put_point(buf, &self.top);
        buf.put_i16(self.bottom_altitude);
        buf.put_i16(self.top_altitude);
        buf.put_i16(to_fixed_i16(self.lift, LIFT_SCALE));
        buf.put_i16(0);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let time_of_day_ms = buf.get_u32();
        buf.advance(4);
        let bottom = get_point(buf);
        let top = get_point(buf);
        let bottom_altitude = buf.get_i16();
        let top_altitude = buf.get_i16();
        let lift = f64::from(buf.get_i16()) / LIFT_SCALE;
        buf.advance(2);
        Self {
            time_of_day_ms,
            bottom,
            top,
            bottom_altitude,
            top_altitude,
            lift,
        }
    }
}

impl ResponseRecord for WaveRecord {
    const SIZE: usize = 32;
    const RESPONSE: PacketType = PacketType::WaveResponse;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32(self.time_of_day_ms);
        buf.put_u32(0);
        put_point(buf, &self.a);
        put_point(buf, &self.b);
        buf.put_i16(self.bottom_altitude);
        buf.put_i16(self.top_altitude);
        buf.put_i16(to_fixed_i16(self.lift, LIFT_SCALE));
        buf.put_i16(0);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let time_of_day_ms = buf.get_u32();
        buf.advance(4);
        let a = get_point(buf);
        let b = get_point(buf);
        let bottom_altitude = buf.get_i16();
        let top_altitude = buf.get_i16();
        let lift = f64::from(buf.get_i16()) / LIFT_SCALE;
        buf.advance(2);
        Self {
            time_of_day_ms,
            a,
            b,
            bottom_altitude,
            top_altitude,
            lift,
        }
    }
}

// =========================================================================
// Encoding
// =========================================================================

fn begin(key: u64, packet_type: PacketType, capacity: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_u32(MAGIC);
    buf.put_u16(0);
    buf.put_u16(packet_type.tag());
    buf.put_u64(key);
    buf
}

fn seal(mut buf: BytesMut) -> Bytes {
    let crc = crc16_ccitt(0, &buf);
    buf[CRC_OFFSET..CRC_OFFSET + 2].copy_from_slice(&crc.to_be_bytes());
    buf.freeze()
}

/// Encode a response packet carrying `records`.
///
/// At most [`MAX_RECORD_COUNT`] records fit in one packet; callers split
/// longer lists (see [`ResponseAssembler`](super::ResponseAssembler)).
pub fn encode_response<R: ResponseRecord>(key: u64, records: &[R]) -> Bytes {
    debug_assert!(records.len() <= MAX_RECORD_COUNT);
    let records = &records[..records.len().min(MAX_RECORD_COUNT)];

    let mut buf = begin(key, R::RESPONSE, HEADER_SIZE + 8 + records.len() * R::SIZE);
    buf.put_u16(0);
    buf.put_u8(0);
    buf.put_u8(records.len() as u8);
    buf.put_u32(0);
    for record in records {
        record.put(&mut buf);
    }
    seal(buf)
}

fn encode_fix(buf: &mut BytesMut, fix: &Fix) {
    buf.put_u32(fix.flags());
    buf.put_u32(fix.time_of_day_ms);
    put_point(buf, &fix.location.unwrap_or(GeoPoint::new(0.0, 0.0)));
    buf.put_u32(0);
    buf.put_u16(fix.track.unwrap_or(0));
    buf.put_u16(to_fixed_u16(fix.ground_speed.unwrap_or(0.0), SPEED_SCALE));
    buf.put_u16(to_fixed_u16(fix.airspeed.unwrap_or(0.0), SPEED_SCALE));
    buf.put_i16(fix.altitude.unwrap_or(0));
    buf.put_i16(to_fixed_i16(fix.vario.unwrap_or(0.0), VARIO_SCALE));
    buf.put_u16(fix.engine_noise_level.unwrap_or(0));
}

/// Longest prefix of `name` that fits in `max` bytes without splitting a
/// character.
fn truncate_utf8(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Encode a packet into a datagram with a valid CRC.
///
/// User names longer than 255 bytes are truncated at a character boundary.
pub fn encode(key: u64, packet: &Packet) -> Bytes {
    let packet_type = packet.packet_type();
    let mut buf = match packet {
        Packet::TrafficResponse(records) => return encode_response(key, records),
        Packet::ThermalResponse(records) => return encode_response(key, records),
        Packet::WaveResponse(records) => return encode_response(key, records),
        _ => begin(key, packet_type, packet_type.fixed_size() + 256),
    };

    match packet {
        Packet::Ping { id } => {
            buf.put_u16(*id);
            buf.put_u16(0);
            buf.put_u32(0);
        }
        Packet::Ack { id, flags } => {
            buf.put_u16(*id);
            buf.put_u16(0);
            buf.put_u32(*flags);
        }
        Packet::Fix(fix) => encode_fix(&mut buf, fix),
        Packet::TrafficRequest { flags }
        | Packet::WaveRequest { flags }
        | Packet::ThermalRequest { flags } => {
            buf.put_u32(*flags);
            buf.put_u32(0);
        }
        Packet::UserNameRequest { user_id } => {
            buf.put_u32(*user_id);
            buf.put_u32(0);
        }
        Packet::UserNameResponse(response) => {
            let name = truncate_utf8(&response.name, u8::MAX as usize);
            buf.put_u32(response.user_id);
            buf.put_u32(response.flags);
            buf.put_u32(response.club_id);
            buf.put_u8(name.len() as u8);
            buf.put_bytes(0, 3);
            buf.put_u64(0);
            buf.put_slice(name.as_bytes());
        }
        Packet::ThermalSubmit(record) => record.put(&mut buf),
        Packet::WaveSubmit(record) => record.put(&mut buf),
        Packet::TrafficResponse(_) | Packet::ThermalResponse(_) | Packet::WaveResponse(_) => {}
    }

    seal(buf)
}

// =========================================================================
// Decoding
// =========================================================================

/// Validate the variable-length part against the announced count.
fn check_records<R: ResponseRecord>(data: &[u8]) -> Result<usize, DecodeError> {
    let count = usize::from(data[HEADER_SIZE + 3]);
    let remaining = data.len() - (HEADER_SIZE + 8);
    if count * R::SIZE != remaining {
        return Err(DecodeError::CountMismatch {
            packet_type: R::RESPONSE,
            count,
            remaining,
        });
    }
    Ok(count)
}

fn get_records<R: ResponseRecord>(body: &mut &[u8], count: usize) -> Vec<R> {
    body.advance(8);
    (0..count).map(|_| R::get(body)).collect()
}

/// Decode and validate a datagram.
///
/// Checks, in order: header length, magic, type, the type's fixed size, the
/// record count or name length of variable packets, and finally the CRC.
pub fn decode(data: &[u8]) -> Result<Datagram, DecodeError> {
    if data.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort { len: data.len() });
    }

    let mut header = &data[..HEADER_SIZE];
    let magic = header.get_u32();
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let expected_crc = header.get_u16();
    let tag = header.get_u16();
    let key = header.get_u64();

    let packet_type = PacketType::from_tag(tag).ok_or(DecodeError::UnknownType(tag))?;
    if data.len() < packet_type.fixed_size() {
        return Err(DecodeError::Truncated {
            packet_type,
            expected: packet_type.fixed_size(),
            actual: data.len(),
        });
    }

    let count = match packet_type {
        PacketType::TrafficResponse => check_records::<TrafficRecord>(data)?,
        PacketType::ThermalResponse => check_records::<ThermalRecord>(data)?,
        PacketType::WaveResponse => check_records::<WaveRecord>(data)?,
        PacketType::UserNameResponse => {
            let length = usize::from(data[HEADER_SIZE + 12]);
            let remaining = data.len() - USER_NAME_RESPONSE_SIZE;
            if length != remaining {
                return Err(DecodeError::NameLengthMismatch { length, remaining });
            }
            length
        }
        _ => 0,
    };

    let actual_crc = crc16_ccitt(
        crc16_ccitt(crc16_ccitt(0, &data[..CRC_OFFSET]), &[0, 0]),
        &data[CRC_OFFSET + 2..],
    );
    if actual_crc != expected_crc {
        return Err(DecodeError::BadCrc {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    let mut body = &data[HEADER_SIZE..];
    let packet = match packet_type {
        PacketType::Ping => Packet::Ping { id: body.get_u16() },
        PacketType::Ack => {
            let id = body.get_u16();
            body.advance(2);
            Packet::Ack {
                id,
                flags: body.get_u32(),
            }
        }
        PacketType::Fix => Packet::Fix(decode_fix(&mut body)),
        PacketType::TrafficRequest => Packet::TrafficRequest {
            flags: body.get_u32(),
        },
        PacketType::WaveRequest => Packet::WaveRequest {
            flags: body.get_u32(),
        },
        PacketType::ThermalRequest => Packet::ThermalRequest {
            flags: body.get_u32(),
        },
        PacketType::UserNameRequest => Packet::UserNameRequest {
            user_id: body.get_u32(),
        },
        PacketType::UserNameResponse => {
            let user_id = body.get_u32();
            let flags = body.get_u32();
            let club_id = body.get_u32();
            body.advance(12);
            let name = std::str::from_utf8(&body[..count])
                .map_err(|_| DecodeError::InvalidName)?
                .to_owned();
            Packet::UserNameResponse(UserNameResponse {
                user_id,
                flags,
                club_id,
                name,
            })
        }
        PacketType::ThermalSubmit => Packet::ThermalSubmit(ThermalRecord::get(&mut body)),
        PacketType::WaveSubmit => Packet::WaveSubmit(WaveRecord::get(&mut body)),
        PacketType::TrafficResponse => Packet::TrafficResponse(get_records(&mut body, count)),
        PacketType::ThermalResponse => Packet::ThermalResponse(get_records(&mut body, count)),
        PacketType::WaveResponse => Packet::WaveResponse(get_records(&mut body, count)),
    };

    Ok(Datagram { key, packet })
}

fn decode_fix(body: &mut &[u8]) -> Fix {
    let flags = body.get_u32();
    let time_of_day_ms = body.get_u32();
    let location = get_point(body);
    body.advance(4);
    let track = body.get_u16();
    let ground_speed = body.get_u16();
    let airspeed = body.get_u16();
    let altitude = body.get_i16();
    let vario = body.get_i16();
    let engine_noise_level = body.get_u16();

    let has = |flag: u32| flags & flag != 0;
    Fix {
        time_of_day_ms,
        location: has(fix_flags::LOCATION).then_some(location),
        track: has(fix_flags::TRACK).then_some(track),
        ground_speed: has(fix_flags::GROUND_SPEED).then(|| f64::from(ground_speed) / SPEED_SCALE),
        airspeed: has(fix_flags::AIRSPEED).then(|| f64::from(airspeed) / SPEED_SCALE),
        altitude: has(fix_flags::ALTITUDE).then_some(altitude),
        vario: has(fix_flags::VARIO).then(|| f64::from(vario) / VARIO_SCALE),
        engine_noise_level: has(fix_flags::ENL).then_some(engine_noise_level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: u64 = 0x0123_4567_89ab_cdef;

    fn thermal() -> ThermalRecord {
        ThermalRecord {
            time_of_day_ms: 43_200_000,
            bottom: GeoPoint::new(46.5, 7.25),
            top: GeoPoint::new(46.501, 7.251),
            bottom_altitude: 900,
            top_altitude: 2100,
            lift: 2.5,
        }
    }

    // =========================================================================
    // Layout
    // =========================================================================

    #[test]
    fn test_ping_layout() {
        let bytes = encode(KEY, &Packet::Ping { id: 0x1234 });
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &MAGIC.to_be_bytes());
        assert_eq!(&bytes[6..8], &1u16.to_be_bytes());
        assert_eq!(&bytes[8..16], &KEY.to_be_bytes());
        assert_eq!(&bytes[16..18], &[0x12, 0x34]);
    }

    #[test]
    fn test_crc_field_covers_whole_datagram() {
        let bytes = encode(KEY, &Packet::Ping { id: 7 });
        let mut zeroed = bytes.to_vec();
        zeroed[4] = 0;
        zeroed[5] = 0;
        let crc = crc16_ccitt(0, &zeroed);
        assert_eq!(&bytes[4..6], &crc.to_be_bytes());
    }

    #[test]
    fn test_fix_layout_and_scaling() {
        let fix = Fix {
            time_of_day_ms: 1000,
            location: Some(GeoPoint::new(47.123456, -8.5)),
            track: Some(270),
            ground_speed: Some(25.0),
            altitude: Some(1500),
            vario: Some(-1.5),
            ..Default::default()
        };
        let bytes = encode(KEY, &Packet::Fix(fix.clone()));
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[24..28], &47_123_456i32.to_be_bytes());
        assert_eq!(&bytes[28..32], &(-8_500_000i32).to_be_bytes());
        assert_eq!(&bytes[38..40], &400u16.to_be_bytes());
        assert_eq!(&bytes[44..46], &(-384i16).to_be_bytes());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.key, KEY);
        assert_eq!(decoded.packet, Packet::Fix(fix));
    }

    #[test]
    fn test_fix_without_location_flag() {
        let bytes = encode(KEY, &Packet::Fix(Fix::default()));
        let Packet::Fix(fix) = decode(&bytes).unwrap().packet else {
            panic!("expected fix");
        };
        assert_eq!(fix.location, None);
        assert_eq!(fix.altitude, None);
    }

    #[test]
    fn test_thermal_response_size() {
        let packet = Packet::ThermalResponse(vec![thermal(), thermal()]);
        let bytes = encode(KEY, &packet);
        assert_eq!(bytes.len(), 24 + 2 * 32);
        assert_eq!(bytes[19], 2);
        assert_eq!(decode(&bytes).unwrap().packet, packet);
    }

    #[test]
    fn test_traffic_record_fields() {
        let record = TrafficRecord {
            pilot_id: 0x8000_0001,
            time_of_day_ms: 5,
            location: GeoPoint::new(-33.0, 151.0),
            altitude: 800,
            track: 123,
            turn_rate: -3.5,
            vario: 1.25,
        };
        let bytes = encode(KEY, &Packet::TrafficResponse(vec![record.clone()]));
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[44..46], &(-35i16).to_be_bytes());
        assert_eq!(&bytes[46..48], &320i16.to_be_bytes());
        assert_eq!(
            decode(&bytes).unwrap().packet,
            Packet::TrafficResponse(vec![record])
        );
    }

    #[test]
    fn test_user_name_response() {
        let packet = Packet::UserNameResponse(UserNameResponse::found(0x8000_0002, "FLRDDA5BA"));
        let bytes = encode(KEY, &packet);
        assert_eq!(bytes.len(), 40 + 9);
        assert_eq!(decode(&bytes).unwrap().packet, packet);
    }

    #[test]
    fn test_user_name_truncated_on_char_boundary() {
        let long = "é".repeat(200);
        let bytes = encode(KEY, &Packet::UserNameResponse(UserNameResponse::found(1, long)));
        let Packet::UserNameResponse(response) = decode(&bytes).unwrap().packet else {
            panic!("expected user name response");
        };
        assert_eq!(response.name.len(), 254);
    }

    // =========================================================================
    // Rejection
    // =========================================================================

    #[test]
    fn test_rejects_short_datagram() {
        assert_eq!(decode(&[0u8; 10]), Err(DecodeError::TooShort { len: 10 }));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = encode(KEY, &Packet::Ping { id: 1 }).to_vec();
        bytes[0] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMagic(_))));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let mut bytes = encode(KEY, &Packet::Ping { id: 1 }).to_vec();
        bytes[6..8].copy_from_slice(&99u16.to_be_bytes());
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownType(99)));
    }

    #[test]
    fn test_rejects_truncated_fix() {
        let bytes = encode(KEY, &Packet::Fix(Fix::default()));
        assert!(matches!(
            decode(&bytes[..40]),
            Err(DecodeError::Truncated {
                packet_type: PacketType::Fix,
                expected: 48,
                actual: 40
            })
        ));
    }

    #[test]
    fn test_rejects_count_mismatch() {
        let bytes = encode(KEY, &Packet::ThermalResponse(vec![thermal(), thermal()]));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(DecodeError::CountMismatch { count: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_name_length_mismatch() {
        let mut bytes = encode(
            KEY,
            &Packet::UserNameResponse(UserNameResponse::found(1, "abc")),
        )
        .to_vec();
        bytes.push(b'x');
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::NameLengthMismatch {
                length: 3,
                remaining: 4
            })
        );
    }

    #[test]
    fn test_rejects_corrupted_body() {
        let mut bytes = encode(KEY, &Packet::ThermalSubmit(thermal())).to_vec();
        bytes[30] ^= 0x01;
        assert!(matches!(decode(&bytes), Err(DecodeError::BadCrc { .. })));
    }

    #[test]
    fn test_fixed_point_saturates() {
        assert_eq!(to_fixed_i16(1000.0, 256.0), i16::MAX);
        assert_eq!(to_fixed_i16(-1000.0, 256.0), i16::MIN);
        assert_eq!(to_micro_degrees(47.5), 47_500_000);
        assert!((from_micro_degrees(-122_437_200) + 122.4372).abs() < 1e-9);
    }
}
