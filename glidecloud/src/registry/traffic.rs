//! Aircraft seen on the OGN (APRS-IS) feed.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::time::Instant;

use super::store::{Entry, Registry};
use super::Locate;
use crate::geo::GeoPoint;

/// First public id handed to OGN traffic; the range below belongs to clients.
pub const FIRST_TRAFFIC_ID: u32 = 0x8000_0000;

/// Aircraft category from the APRS symbol table character.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AircraftType {
    #[default]
    Unknown = 0,
    Glider = 1,
    Powered = 2,
    HangGlider = 3,
    Paraglider = 4,
    Balloon = 5,
    Uav = 6,
}

impl AircraftType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Unknown,
            1 => Self::Glider,
            2 => Self::Powered,
            3 => Self::HangGlider,
            4 => Self::Paraglider,
            5 => Self::Balloon,
            6 => Self::Uav,
            _ => return None,
        })
    }
}

impl fmt::Display for AircraftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Glider => "glider",
            Self::Powered => "powered",
            Self::HangGlider => "hang glider",
            Self::Paraglider => "paraglider",
            Self::Balloon => "balloon",
            Self::Uav => "UAV",
        };
        f.write_str(name)
    }
}

/// Last known state of one OGN aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct Traffic {
    /// Public id from the high half of the id space.
    pub id: u32,
    /// Device database id derived from the callsign, 0 if unknown.
    pub database_id: u32,
    pub location: GeoPoint,
    /// Meters above MSL.
    pub altitude: Option<i32>,
    /// Degrees.
    pub track: Option<u16>,
    /// m/s.
    pub ground_speed: Option<f64>,
    /// m/s.
    pub climb_rate: Option<f64>,
    /// Degrees per second.
    pub turn_rate: Option<f64>,
    pub aircraft_type: AircraftType,
}

impl Traffic {
    pub fn new(id: u32, database_id: u32, location: GeoPoint) -> Self {
        Self {
            id,
            database_id,
            location,
            altitude: None,
            track: None,
            ground_speed: None,
            climb_rate: None,
            turn_rate: None,
            aircraft_type: AircraftType::Unknown,
        }
    }
}

impl Locate for Traffic {
    fn location(&self) -> Option<GeoPoint> {
        Some(self.location)
    }
}

/// Registry of OGN traffic keyed by device id, with a reverse index from
/// public id back to device id.
pub struct TrafficRegistry {
    inner: Registry<String, Traffic>,
    by_id: HashMap<u32, String>,
    next_id: u32,
}

impl TrafficRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
            by_id: HashMap::new(),
            next_id: FIRST_TRAFFIC_ID,
        }
    }

    /// Create or update the aircraft `device_id`.
    ///
    /// A new aircraft starts at `location` with `database_id`; `update` then
    /// runs on both new and existing entries.
    pub fn make_or_update(
        &mut self,
        device_id: &str,
        database_id: u32,
        location: GeoPoint,
        now: Instant,
        update: impl FnOnce(&mut Traffic),
    ) -> Entry<'_, String, Traffic> {
        let key = device_id.to_owned();
        if !self.inner.contains_key(&key) {
            let id = self.allocate_id();
            self.by_id.insert(id, key.clone());
            let mut traffic = Traffic::new(id, database_id, location);
            update(&mut traffic);
            return self.inner.make_or_update(key, now, move || traffic, |_| {});
        }
        self.inner.make_or_update(
            key,
            now,
            || Traffic::new(0, database_id, location),
            |traffic| {
                traffic.location = location;
                update(traffic);
            },
        )
    }

    /// Look up an aircraft by its public id.
    pub fn find_by_id(&self, id: u32) -> Option<Entry<'_, String, Traffic>> {
        self.by_id.get(&id).and_then(|key| self.inner.find(key))
    }

    pub fn expire(&mut self, cutoff: Instant) -> usize {
        let by_id = &mut self.by_id;
        self.inner.expire_with(cutoff, |_, traffic| {
            by_id.remove(&traffic.id);
        })
    }

    /// Restore an aircraft, keeping its public id.
    pub fn push_back(&mut self, device_id: String, traffic: Traffic, stamp: Instant) {
        if traffic.id >= self.next_id && traffic.id < u32::MAX {
            self.next_id = traffic.id + 1;
        }
        if let Some(old) = self.inner.find(&device_id) {
            self.by_id.remove(&old.value.id);
        }
        self.by_id.insert(traffic.id, device_id.clone());
        self.inner.push_back(device_id, traffic, stamp);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.by_id.clear();
        self.next_id = FIRST_TRAFFIC_ID;
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id.max(FIRST_TRAFFIC_ID);
        self.next_id = id.checked_add(1).unwrap_or(FIRST_TRAFFIC_ID);
        id
    }
}

impl Default for TrafficRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TrafficRegistry {
    type Target = Registry<String, Traffic>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ids_from_high_half() {
        let now = Instant::now();
        let mut traffic = TrafficRegistry::new();
        let here = GeoPoint::new(47.0, 8.0);
        let a = traffic.make_or_update("FLRDDA5BA", 0xdda5ba, here, now, |_| {}).value.id;
        let b = traffic.make_or_update("ICA3D1C35", 0x3d1c35, here, now, |_| {}).value.id;
        assert_eq!(a, FIRST_TRAFFIC_ID);
        assert_eq!(b, FIRST_TRAFFIC_ID + 1);
        assert_eq!(traffic.find_by_id(a).map(|e| e.key.as_str()), Some("FLRDDA5BA"));
    }

    #[test]
    fn test_update_is_idempotent_by_device() {
        let now = Instant::now();
        let mut traffic = TrafficRegistry::new();
        traffic.make_or_update("FLR1", 1, GeoPoint::new(47.0, 8.0), now, |_| {});
        let entry = traffic.make_or_update("FLR1", 1, GeoPoint::new(47.1, 8.1), now, |t| {
            t.altitude = Some(1500);
        });
        assert_eq!(entry.value.id, FIRST_TRAFFIC_ID);
        assert_eq!(entry.value.location, GeoPoint::new(47.1, 8.1));
        assert_eq!(entry.value.altitude, Some(1500));
        assert_eq!(traffic.len(), 1);
    }

    #[test]
    fn test_expire_drops_reverse_index() {
        let t0 = Instant::now();
        let mut traffic = TrafficRegistry::new();
        traffic.make_or_update("FLR1", 1, GeoPoint::new(47.0, 8.0), t0, |_| {});
        assert_eq!(traffic.expire(t0 + Duration::from_secs(1)), 1);
        assert!(traffic.find_by_id(FIRST_TRAFFIC_ID).is_none());
        assert!(traffic.by_id.is_empty());
    }

    #[test]
    fn test_restore_keeps_id() {
        let now = Instant::now();
        let mut traffic = TrafficRegistry::new();
        let restored = Traffic::new(FIRST_TRAFFIC_ID + 9, 0, GeoPoint::new(1.0, 2.0));
        traffic.push_back("OGN123456".into(), restored, now);
        assert!(traffic.find_by_id(FIRST_TRAFFIC_ID + 9).is_some());

        let id = traffic
            .make_or_update("OGN654321", 0, GeoPoint::new(1.0, 2.0), now, |_| {})
            .value
            .id;
        assert_eq!(id, FIRST_TRAFFIC_ID + 10);
    }

    #[test]
    fn test_aircraft_type_codes() {
        for code in 0..=6 {
            assert_eq!(AircraftType::from_u8(code).unwrap() as u8, code);
        }
        assert_eq!(AircraftType::from_u8(7), None);
    }
}
