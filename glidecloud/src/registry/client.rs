//! Connected tracking clients.

use std::net::SocketAddr;
use std::ops::Deref;
use std::time::Instant;

use super::store::{Entry, Registry};
use super::Locate;
use crate::geo::GeoPoint;

/// Lowest public client id.
pub const FIRST_CLIENT_ID: u32 = 1;

/// Highest public client id; ids above belong to OGN traffic.
pub const LAST_CLIENT_ID: u32 = 0x7fff_ffff;

/// Altitude value meaning "unknown".
pub const UNKNOWN_ALTITUDE: i16 = -1;

/// State kept for one client, keyed by its secret key.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    /// Public id shown to other clients.
    pub id: u32,
    /// Where the last datagram came from.
    pub address: SocketAddr,
    pub location: Option<GeoPoint>,
    /// Meters above MSL, or [`UNKNOWN_ALTITUDE`].
    pub altitude: i16,
    pub track: Option<u16>,
    /// Vertical speed in m/s.
    pub vario: Option<f64>,
    /// Traffic pushes are sent until this instant.
    pub traffic_until: Option<Instant>,
    /// Thermal and wave pushes are sent until this instant.
    pub thermals_until: Option<Instant>,
}

impl Client {
    pub fn new(id: u32, address: SocketAddr) -> Self {
        Self {
            id,
            address,
            location: None,
            altitude: UNKNOWN_ALTITUDE,
            track: None,
            vario: None,
            traffic_until: None,
            thermals_until: None,
        }
    }

    pub fn wants_traffic(&self, now: Instant) -> bool {
        self.traffic_until.is_some_and(|until| now < until)
    }

    pub fn wants_thermals(&self, now: Instant) -> bool {
        self.thermals_until.is_some_and(|until| now < until)
    }
}

impl Locate for Client {
    fn location(&self) -> Option<GeoPoint> {
        self.location
    }
}

/// Returns true if `id` is in the range handed out to clients.
pub fn is_client_id(id: u32) -> bool {
    (FIRST_CLIENT_ID..=LAST_CLIENT_ID).contains(&id)
}

/// Registry of clients with a sequential public id allocator.
///
/// Read access goes through [`Deref`] to the underlying [`Registry`];
/// mutations go through this wrapper so new clients always get an id.
pub struct ClientRegistry {
    inner: Registry<u64, Client>,
    next_id: u32,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
            next_id: FIRST_CLIENT_ID,
        }
    }

    /// Find the client for `key`, creating it if unseen, and record that a
    /// datagram arrived from `address` at `now`.
    pub fn make_or_update(
        &mut self,
        key: u64,
        address: SocketAddr,
        now: Instant,
        update: impl FnOnce(&mut Client),
    ) -> Entry<'_, u64, Client> {
        if !self.inner.contains_key(&key) {
            let mut client = Client::new(allocate_id(&mut self.next_id), address);
            update(&mut client);
            return self.inner.make_or_update(key, now, move || client, |_| {});
        }
        self.inner.make_or_update(
            key,
            now,
            || Client::new(0, address),
            |client| {
                client.address = address;
                update(client);
            },
        )
    }

    /// Update an existing client only. Returns `None` for unknown keys.
    pub fn update(
        &mut self,
        key: u64,
        address: SocketAddr,
        now: Instant,
        update: impl FnOnce(&mut Client),
    ) -> Option<Entry<'_, u64, Client>> {
        if !self.inner.contains_key(&key) {
            return None;
        }
        Some(self.inner.make_or_update(
            key,
            now,
            || Client::new(0, address),
            |client| {
                client.address = address;
                update(client);
            },
        ))
    }

    pub fn expire(&mut self, cutoff: Instant) -> usize {
        self.inner.expire(cutoff)
    }

    /// Restore a client at the back of the recency order, keeping its id.
    pub fn push_back(&mut self, key: u64, client: Client, stamp: Instant) {
        if client.id >= self.next_id && client.id < LAST_CLIENT_ID {
            self.next_id = client.id + 1;
        }
        self.inner.push_back(key, client, stamp);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.next_id = FIRST_CLIENT_ID;
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ClientRegistry {
    type Target = Registry<u64, Client>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

fn allocate_id(next_id: &mut u32) -> u32 {
    let id = (*next_id).clamp(FIRST_CLIENT_ID, LAST_CLIENT_ID);
    *next_id = if id == LAST_CLIENT_ID {
        FIRST_CLIENT_ID
    } else {
        id + 1
    };
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 1], port))
    }

    #[test]
    fn test_ids_are_sequential_and_stable() {
        let now = Instant::now();
        let mut clients = ClientRegistry::new();
        let a = clients.make_or_update(10, addr(1), now, |_| {}).value.id;
        let b = clients.make_or_update(20, addr(2), now, |_| {}).value.id;
        let a_again = clients.make_or_update(10, addr(3), now, |_| {}).value.id;
        assert_eq!((a, b, a_again), (1, 2, 1));
        assert_eq!(clients.find(&10).unwrap().value.address, addr(3));
    }

    #[test]
    fn test_new_client_defaults() {
        let client = Client::new(5, addr(1));
        assert_eq!(client.altitude, UNKNOWN_ALTITUDE);
        assert_eq!(client.location, None);
        assert!(!client.wants_traffic(Instant::now()));
    }

    #[test]
    fn test_update_does_not_create() {
        let mut clients = ClientRegistry::new();
        assert!(clients.update(1, addr(1), Instant::now(), |_| {}).is_none());
        assert!(clients.is_empty());
    }

    #[test]
    fn test_subscription_window() {
        let now = Instant::now();
        let mut client = Client::new(1, addr(1));
        client.traffic_until = Some(now + Duration::from_secs(300));
        assert!(client.wants_traffic(now));
        assert!(!client.wants_traffic(now + Duration::from_secs(300)));
        assert!(!client.wants_thermals(now));
    }

    #[test]
    fn test_restore_advances_allocator() {
        let now = Instant::now();
        let mut clients = ClientRegistry::new();
        clients.push_back(1, Client::new(41, addr(1)), now);
        let id = clients.make_or_update(2, addr(2), now, |_| {}).value.id;
        assert_eq!(id, 42);
    }

    #[test]
    fn test_allocator_wraps_within_client_range() {
        let mut next = LAST_CLIENT_ID;
        assert_eq!(allocate_id(&mut next), LAST_CLIENT_ID);
        assert_eq!(allocate_id(&mut next), FIRST_CLIENT_ID);
        assert!(is_client_id(FIRST_CLIENT_ID));
        assert!(!is_client_id(0x8000_0000));
        assert!(!is_client_id(0));
    }
}
