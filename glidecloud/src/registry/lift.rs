//! Thermals and waves reported by clients.
//!
//! Both are immutable once submitted and live in a [`SubmissionRegistry`]
//! keyed by a server-assigned id.

use std::ops::Deref;
use std::time::Instant;

use super::store::Registry;
use super::Locate;
use crate::geo::GeoPoint;
use crate::protocol::{ThermalRecord, WaveRecord};

/// A thermal, indexed by the point where the climb ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Thermal {
    /// Secret key of the client that reported it.
    pub owner: u64,
    /// Client-reported millisecond of the UTC day.
    pub time_of_day_ms: u32,
    pub bottom: GeoPoint,
    pub top: GeoPoint,
    pub bottom_altitude: i16,
    pub top_altitude: i16,
    /// Average lift in m/s.
    pub lift: f64,
}

impl Thermal {
    pub fn from_record(owner: u64, record: &ThermalRecord) -> Self {
        Self {
            owner,
            time_of_day_ms: record.time_of_day_ms,
            bottom: record.bottom,
            top: record.top,
            bottom_altitude: record.bottom_altitude,
            top_altitude: record.top_altitude,
            lift: record.lift,
        }
    }

    pub fn to_record(&self) -> ThermalRecord {
        ThermalRecord {
            time_of_day_ms: self.time_of_day_ms,
            bottom: self.bottom,
            top: self.top,
            bottom_altitude: self.bottom_altitude,
            top_altitude: self.top_altitude,
            lift: self.lift,
        }
    }
}

impl Locate for Thermal {
    fn location(&self) -> Option<GeoPoint> {
        Some(self.top)
    }
}

/// A wave, described by two points on its axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    pub owner: u64,
    pub time_of_day_ms: u32,
    pub a: GeoPoint,
    pub b: GeoPoint,
    pub bottom_altitude: i16,
    pub top_altitude: i16,
    pub lift: f64,
}

impl Wave {
    pub fn from_record(owner: u64, record: &WaveRecord) -> Self {
        Self {
            owner,
            time_of_day_ms: record.time_of_day_ms,
            a: record.a,
            b: record.b,
            bottom_altitude: record.bottom_altitude,
            top_altitude: record.top_altitude,
            lift: record.lift,
        }
    }

    pub fn to_record(&self) -> WaveRecord {
        WaveRecord {
            time_of_day_ms: self.time_of_day_ms,
            a: self.a,
            b: self.b,
            bottom_altitude: self.bottom_altitude,
            top_altitude: self.top_altitude,
            lift: self.lift,
        }
    }
}

impl Locate for Wave {
    fn location(&self) -> Option<GeoPoint> {
        Some(self.a.midpoint(&self.b))
    }
}

/// Something a client submitted, remembering who.
pub trait Submission: Locate {
    fn owner(&self) -> u64;
}

impl Submission for Thermal {
    fn owner(&self) -> u64 {
        self.owner
    }
}

impl Submission for Wave {
    fn owner(&self) -> u64 {
        self.owner
    }
}

/// Registry of submissions keyed by sequential server ids.
pub struct SubmissionRegistry<T> {
    inner: Registry<u64, T>,
    next_id: u64,
}

pub type ThermalRegistry = SubmissionRegistry<Thermal>;
pub type WaveRegistry = SubmissionRegistry<Wave>;

impl<T: Submission> SubmissionRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
            next_id: 1,
        }
    }

    /// Store a new submission and return its id.
    pub fn insert(&mut self, value: T, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.inner.make_or_update(id, now, move || value, |_| {});
        id
    }

    pub fn expire(&mut self, cutoff: Instant) -> usize {
        self.inner.expire(cutoff)
    }

    /// Restore a submission with its saved id.
    pub fn push_back(&mut self, id: u64, value: T, stamp: Instant) {
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.inner.push_back(id, value, stamp);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.next_id = 1;
    }
}

impl<T: Submission> Default for SubmissionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for SubmissionRegistry<T> {
    type Target = Registry<u64, T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
