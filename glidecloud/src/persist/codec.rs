//! Binary snapshot format.
//!
//! ```text
//! u32 magic "GCDB", u32 version
//! clients:  (u8 1, client)*  u8 0
//! thermals: (u8 1, thermal)* u8 0
//! u8 1, traffic: (u8 1, traffic)* u8 0
//! u8 1, waves:   (u8 1, wave)*    u8 0      (absent in older files)
//! ```
//!
//! All integers are big-endian. Stamps are unix milliseconds, translated to
//! and from the monotonic clock through one [`WallClock`] reading so the
//! relative age of entries survives a restart.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use super::error::PersistError;
use crate::geo::GeoPoint;
use crate::protocol::{
    from_micro_degrees, to_fixed_i16, to_fixed_u16, to_micro_degrees, LIFT_SCALE, SPEED_SCALE,
    TURN_RATE_SCALE,
};
use crate::registry::{
    is_client_id, AircraftType, Client, Registries, Thermal, Traffic, Wave, FIRST_TRAFFIC_ID,
};
use crate::time::WallClock;

/// "GCDB"
pub const DATABASE_MAGIC: u32 = 0x4743_4442;

pub const DATABASE_VERSION: u32 = 1;

const RECORD: u8 = 1;
const END: u8 = 0;

const NO_TRACK: u16 = u16::MAX;
const NO_SPEED: u16 = u16::MAX;
const NO_RATE: i16 = i16::MIN;
const NO_ALTITUDE: i32 = i32::MIN;

/// Serialize every registry.
pub fn encode_state(state: &Registries, clock: &WallClock) -> Bytes {
    let mut buf = BytesMut::with_capacity(4096);
    buf.put_u32(DATABASE_MAGIC);
    buf.put_u32(DATABASE_VERSION);

    for entry in state.clients.iter() {
        buf.put_u8(RECORD);
        buf.put_u64(*entry.key);
        put_client(&mut buf, entry.value, clock.to_unix_millis(entry.stamp));
    }
    buf.put_u8(END);

    for entry in state.thermals.iter() {
        buf.put_u8(RECORD);
        buf.put_u64(*entry.key);
        put_thermal(&mut buf, entry.value, clock.to_unix_millis(entry.stamp));
    }
    buf.put_u8(END);

    buf.put_u8(1);
    for entry in state.traffic.iter() {
        if entry.key.len() > usize::from(u8::MAX) {
            debug!(device = %entry.key, "Device id too long to save");
            continue;
        }
        buf.put_u8(RECORD);
        buf.put_u8(entry.key.len() as u8);
        buf.put_slice(entry.key.as_bytes());
        put_traffic(&mut buf, entry.value, clock.to_unix_millis(entry.stamp));
    }
    buf.put_u8(END);

    buf.put_u8(1);
    for entry in state.waves.iter() {
        buf.put_u8(RECORD);
        buf.put_u64(*entry.key);
        put_wave(&mut buf, entry.value, clock.to_unix_millis(entry.stamp));
    }
    buf.put_u8(END);

    buf.freeze()
}

/// Rebuild registries from a snapshot.
///
/// The whole snapshot is rejected on the first malformed field. Entries
/// whose stamp predates what the monotonic clock can represent are dropped.
pub fn decode_state(data: &[u8], clock: &WallClock) -> Result<Registries, PersistError> {
    let mut r = Reader::new(data);

    let magic = r.u32()?;
    if magic != DATABASE_MAGIC {
        return Err(PersistError::BadMagic(magic));
    }
    let version = r.u32()?;
    if version != DATABASE_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }

    let mut state = Registries::new();
    let mut dropped = 0usize;

    while r.record()? {
        let key = r.u64()?;
        let (client, millis) = get_client(&mut r)?;
        if state.clients.contains_key(&key) {
            return Err(PersistError::Invalid("duplicate client key"));
        }
        match clock.from_unix_millis(millis) {
            Some(stamp) => state.clients.push_back(key, client, stamp),
            None => dropped += 1,
        }
    }

    while r.record()? {
        let id = r.u64()?;
        let (thermal, millis) = get_thermal(&mut r)?;
        if state.thermals.contains_key(&id) {
            return Err(PersistError::Invalid("duplicate thermal id"));
        }
        match clock.from_unix_millis(millis) {
            Some(stamp) => state.thermals.push_back(id, thermal, stamp),
            None => dropped += 1,
        }
    }

    if r.flag("traffic section marker")? {
        while r.record()? {
            let device_id = r.string()?;
            let (traffic, millis) = get_traffic(&mut r)?;
            if state.traffic.contains_key(&device_id)
                || state.traffic.find_by_id(traffic.id).is_some()
            {
                return Err(PersistError::Invalid("duplicate traffic entry"));
            }
            match clock.from_unix_millis(millis) {
                Some(stamp) => state.traffic.push_back(device_id, traffic, stamp),
                None => dropped += 1,
            }
        }
    }

    if !r.is_empty() && r.flag("wave section marker")? {
        while r.record()? {
            let id = r.u64()?;
            let (wave, millis) = get_wave(&mut r)?;
            if state.waves.contains_key(&id) {
                return Err(PersistError::Invalid("duplicate wave id"));
            }
            match clock.from_unix_millis(millis) {
                Some(stamp) => state.waves.push_back(id, wave, stamp),
                None => dropped += 1,
            }
        }
    }

    if !r.is_empty() {
        return Err(PersistError::Invalid("trailing data"));
    }
    if dropped > 0 {
        debug!(dropped, "Dropped snapshot entries older than the monotonic clock");
    }

    Ok(state)
}

// =========================================================================
// Records
// =========================================================================

fn put_client(buf: &mut BytesMut, client: &Client, millis: i64) {
    buf.put_u32(client.id);
    buf.put_i64(millis);
    let location = client.location.unwrap_or(GeoPoint::new(0.0, 0.0));
    buf.put_u8(u8::from(client.location.is_some()));
    put_point(buf, &location);
    buf.put_i16(client.altitude);
    put_address(buf, &client.address);
}

fn get_client(r: &mut Reader<'_>) -> Result<(Client, i64), PersistError> {
    let id = r.u32()?;
    if !is_client_id(id) {
        return Err(PersistError::Invalid("client id"));
    }
    let millis = r.i64()?;
    let has_location = r.flag("client location flag")?;
    let location = r.point()?;
    let altitude = r.i16()?;
    let address = r.address()?;

    let mut client = Client::new(id, address);
    client.location = has_location.then_some(location);
    client.altitude = altitude;
    Ok((client, millis))
}

fn put_thermal(buf: &mut BytesMut, thermal: &Thermal, millis: i64) {
    buf.put_u64(thermal.owner);
    buf.put_i64(millis);
    buf.put_u32(thermal.time_of_day_ms);
    put_point(buf, &thermal.bottom);
    put_point(buf, &thermal.top);
    buf.put_i16(thermal.bottom_altitude);
    buf.put_i16(thermal.top_altitude);
    buf.put_i16(to_fixed_i16(thermal.lift, LIFT_SCALE));
}

fn get_thermal(r: &mut Reader<'_>) -> Result<(Thermal, i64), PersistError> {
    let owner = r.u64()?;
    let millis = r.i64()?;
    let thermal = Thermal {
        owner,
        time_of_day_ms: r.u32()?,
        bottom: r.point()?,
        top: r.point()?,
        bottom_altitude: r.i16()?,
        top_altitude: r.i16()?,
        lift: f64::from(r.i16()?) / LIFT_SCALE,
    };
    Ok((thermal, millis))
}

fn put_wave(buf: &mut BytesMut, wave: &Wave, millis: i64) {
    buf.put_u64(wave.owner);
    buf.put_i64(millis);
    buf.put_u32(wave.time_of_day_ms);
    put_point(buf, &wave.a);
    put_point(buf, &wave.b);
    buf.put_i16(wave.bottom_altitude);
    buf.put_i16(wave.top_altitude);
    buf.put_i16(to_fixed_i16(wave.lift, LIFT_SCALE));
}

fn get_wave(r: &mut Reader<'_>) -> Result<(Wave, i64), PersistError> {
    let owner = r.u64()?;
    let millis = r.i64()?;
    let wave = Wave {
        owner,
        time_of_day_ms: r.u32()?,
        a: r.point()?,
        b: r.point()?,
        bottom_altitude: r.i16()?,
        top_altitude: r.i16()?,
        lift: f64::from(r.i16()?) / LIFT_SCALE,
    };
    Ok((wave, millis))
}

fn put_traffic(buf: &mut BytesMut, traffic: &Traffic, millis: i64) {
    buf.put_u32(traffic.id);
    buf.put_u32(traffic.database_id);
    buf.put_i64(millis);
    put_point(buf, &traffic.location);
    buf.put_i32(traffic.altitude.map_or(NO_ALTITUDE, |a| a.max(NO_ALTITUDE + 1)));
    buf.put_u16(traffic.track.filter(|&t| t != NO_TRACK).unwrap_or(NO_TRACK));
    buf.put_u16(
        traffic
            .ground_speed
            .map_or(NO_SPEED, |s| to_fixed_u16(s, SPEED_SCALE).min(NO_SPEED - 1)),
    );
    buf.put_i16(put_rate(traffic.climb_rate, LIFT_SCALE));
    buf.put_i16(put_rate(traffic.turn_rate, TURN_RATE_SCALE));
    buf.put_u8(traffic.aircraft_type as u8);
}

fn put_rate(value: Option<f64>, scale: f64) -> i16 {
    value.map_or(NO_RATE, |v| to_fixed_i16(v, scale).max(NO_RATE + 1))
}

fn get_rate(raw: i16, scale: f64) -> Option<f64> {
    (raw != NO_RATE).then(|| f64::from(raw) / scale)
}

fn get_traffic(r: &mut Reader<'_>) -> Result<(Traffic, i64), PersistError> {
    let id = r.u32()?;
    if id < FIRST_TRAFFIC_ID {
        return Err(PersistError::Invalid("traffic id"));
    }
    let database_id = r.u32()?;
    let millis = r.i64()?;
    let location = r.point()?;

    let mut traffic = Traffic::new(id, database_id, location);
    traffic.altitude = Some(r.i32()?).filter(|&a| a != NO_ALTITUDE);
    traffic.track = Some(r.u16()?).filter(|&t| t != NO_TRACK);
    traffic.ground_speed = Some(r.u16()?)
        .filter(|&s| s != NO_SPEED)
        .map(|s| f64::from(s) / SPEED_SCALE);
    traffic.climb_rate = get_rate(r.i16()?, LIFT_SCALE);
    traffic.turn_rate = get_rate(r.i16()?, TURN_RATE_SCALE);
    traffic.aircraft_type =
        AircraftType::from_u8(r.u8()?).ok_or(PersistError::Invalid("aircraft type"))?;
    Ok((traffic, millis))
}

fn put_point(buf: &mut BytesMut, point: &GeoPoint) {
    buf.put_i32(to_micro_degrees(point.latitude));
    buf.put_i32(to_micro_degrees(point.longitude));
}

fn put_address(buf: &mut BytesMut, address: &SocketAddr) {
    match address.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(4);
            buf.put_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.put_u8(6);
            buf.put_slice(&ip.octets());
        }
    }
    buf.put_u16(address.port());
}

// =========================================================================
// Reader
// =========================================================================

/// Bounds-checked cursor over the snapshot.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn need(&self, n: usize) -> Result<(), PersistError> {
        if self.buf.remaining() < n {
            Err(PersistError::Truncated)
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, PersistError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, PersistError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn i16(&mut self) -> Result<i16, PersistError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    fn u32(&mut self) -> Result<u32, PersistError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn i32(&mut self) -> Result<i32, PersistError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn u64(&mut self) -> Result<u64, PersistError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    fn i64(&mut self) -> Result<i64, PersistError> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    /// A 0/1 byte.
    fn flag(&mut self, what: &'static str) -> Result<bool, PersistError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(PersistError::Invalid(what)),
        }
    }

    /// True if another record follows, false at the end of a section.
    fn record(&mut self) -> Result<bool, PersistError> {
        self.flag("record marker")
    }

    fn point(&mut self) -> Result<GeoPoint, PersistError> {
        let latitude = from_micro_degrees(self.i32()?);
        let longitude = from_micro_degrees(self.i32()?);
        let point = GeoPoint::new(latitude, longitude);
        if point.is_valid() {
            Ok(point)
        } else {
            Err(PersistError::Invalid("coordinate"))
        }
    }

    fn string(&mut self) -> Result<String, PersistError> {
        let len = usize::from(self.u8()?);
        self.need(len)?;
        let buf: &'a [u8] = self.buf;
        let (bytes, rest) = buf.split_at(len);
        let s = std::str::from_utf8(bytes).map_err(|_| PersistError::Invalid("device id"))?;
        self.buf = rest;
        Ok(s.to_owned())
    }

    fn address(&mut self) -> Result<SocketAddr, PersistError> {
        let ip = match self.u8()? {
            0 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            4 => {
                self.need(4)?;
                let mut octets = [0u8; 4];
                self.buf.copy_to_slice(&mut octets);
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            6 => {
                self.need(16)?;
                let mut octets = [0u8; 16];
                self.buf.copy_to_slice(&mut octets);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => return Err(PersistError::Invalid("address family")),
        };
        Ok(SocketAddr::new(ip, self.u16()?))
    }
}
