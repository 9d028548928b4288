//! In-memory registries of everything the server tracks.
//!
//! Each registry answers three kinds of question: "who has this key",
//! "who has not been heard from for a while" and "who is near this point".
//!
//! # Architecture
//!
//! ```text
//!                 ┌────────────────────────────┐
//!   HashMap<K> ──►│ slot arena: Node { K, V,   │◄── RTree [lon, lat]
//!                 │   stamp, prev, next }      │
//!                 └────────────────────────────┘
//!                  head (recent) ⇄ … ⇄ tail (stale)
//! ```
//!
//! [`Registry`] is the generic store. The specialisations add id allocation
//! and the conversions the server needs:
//!
//! - [`ClientRegistry`]: clients keyed by secret key
//! - [`ThermalRegistry`] / [`WaveRegistry`]: submissions keyed by server id
//! - [`TrafficRegistry`]: OGN aircraft keyed by device id

mod client;
mod lift;
mod store;
mod traffic;

pub use client::{
    is_client_id, Client, ClientRegistry, FIRST_CLIENT_ID, LAST_CLIENT_ID, UNKNOWN_ALTITUDE,
};
pub use lift::{Submission, SubmissionRegistry, Thermal, ThermalRegistry, Wave, WaveRegistry};
pub use store::{Entry, Iter, Locate, Registry};
pub use traffic::{AircraftType, Traffic, TrafficRegistry, FIRST_TRAFFIC_ID};

/// Everything the server tracks, owned together.
#[derive(Default)]
pub struct Registries {
    pub clients: ClientRegistry,
    pub thermals: ThermalRegistry,
    pub waves: WaveRegistry,
    pub traffic: TrafficRegistry,
}

impl std::fmt::Debug for Registries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registries").finish_non_exhaustive()
    }
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
            && self.thermals.is_empty()
            && self.waves.is_empty()
            && self.traffic.is_empty()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
        self.thermals.clear();
        self.waves.clear();
        self.traffic.clear();
    }
}
