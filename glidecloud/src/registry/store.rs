//! Generic keyed, recency-ordered, spatially indexed store.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use rstar::{RTree, RTreeObject, AABB};

use crate::geo::{GeoPoint, RangeBox};

/// Entities that may have a position on the map.
pub trait Locate {
    /// Current position, or `None` if not (yet) known.
    fn location(&self) -> Option<GeoPoint>;
}

/// A slot index stored in the R-tree at a `[lon, lat]` position.
#[derive(Clone, Debug, PartialEq)]
struct IndexedSlot {
    position: [f64; 2],
    slot: usize,
}

impl RTreeObject for IndexedSlot {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

fn position_of(point: GeoPoint) -> [f64; 2] {
    [point.longitude, point.latitude]
}

struct Node<K, V> {
    key: K,
    value: V,
    stamp: Instant,
    /// Towards the front (more recent).
    prev: Option<usize>,
    /// Towards the back (less recent).
    next: Option<usize>,
    /// Position currently stored in the R-tree.
    indexed: Option<[f64; 2]>,
}

/// Borrowed view of one stored entity.
#[derive(Debug)]
pub struct Entry<'a, K, V> {
    pub key: &'a K,
    pub value: &'a V,
    /// When the entity was last created, updated or touched.
    pub stamp: Instant,
}

impl<K, V> Clone for Entry<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Entry<'_, K, V> {}

/// Keyed store with three simultaneous access paths.
///
/// - by key, through a hash map
/// - by recency, through a doubly linked list threaded through the slots
///   (front = most recently seen)
/// - by position, through an R-tree over the entities that have one
///
/// All three hold slot indices into one arena, so an entity is stored once.
/// Removal is O(1) plus the R-tree removal; expiry walks from the back and
/// stops at the first entity that is still fresh.
pub struct Registry<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    by_key: HashMap<K, usize>,
    spatial: RTree<IndexedSlot>,
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Locate,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Locate,
{
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            by_key: HashMap::new(),
            spatial: RTree::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Number of entities present in the spatial index.
    pub fn located_len(&self) -> usize {
        self.spatial.size()
    }

    /// Look up an entity without creating or touching it.
    pub fn find(&self, key: &K) -> Option<Entry<'_, K, V>> {
        self.by_key.get(key).map(|&slot| self.entry(slot))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Insert a new entity built by `make`, or apply `update` to the
    /// existing one.
    ///
    /// Either way the entity moves to the front with stamp `now`, and the
    /// spatial index follows any change of location.
    pub fn make_or_update(
        &mut self,
        key: K,
        now: Instant,
        make: impl FnOnce() -> V,
        update: impl FnOnce(&mut V),
    ) -> Entry<'_, K, V> {
        let slot = match self.by_key.get(&key) {
            Some(&slot) => {
                if let Some(node) = self.slots[slot].as_mut() {
                    update(&mut node.value);
                    node.stamp = now;
                }
                self.unlink(slot);
                self.link_front(slot);
                self.reindex(slot);
                slot
            }
            None => {
                let slot = self.allocate(key.clone(), make(), now);
                self.by_key.insert(key, slot);
                self.link_front(slot);
                self.reindex(slot);
                slot
            }
        };
        self.entry(slot)
    }

    /// Refresh an entity's recency. Returns false if the key is unknown.
    pub fn touch(&mut self, key: &K, now: Instant) -> bool {
        let Some(&slot) = self.by_key.get(key) else {
            return false;
        };
        if let Some(node) = self.slots[slot].as_mut() {
            node.stamp = now;
        }
        self.unlink(slot);
        self.link_front(slot);
        true
    }

    /// Remove one entity, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.by_key.remove(key)?;
        self.release(slot).map(|(_, value)| value)
    }

    /// Remove every entity last seen before `cutoff`.
    pub fn expire(&mut self, cutoff: Instant) -> usize {
        self.expire_with(cutoff, |_, _| {})
    }

    /// Like [`expire`](Self::expire), handing each removed entity to
    /// `removed`.
    pub fn expire_with(&mut self, cutoff: Instant, mut removed: impl FnMut(K, V)) -> usize {
        let mut count = 0;
        while let Some(slot) = self.tail {
            let stale = self.slots[slot]
                .as_ref()
                .is_some_and(|node| node.stamp < cutoff);
            if !stale {
                break;
            }
            let Some((key, value)) = self.release(slot) else {
                break;
            };
            self.by_key.remove(&key);
            removed(key, value);
            count += 1;
        }
        count
    }

    /// Stamp of the least recently seen entity.
    pub fn oldest_stamp(&self) -> Option<Instant> {
        self.tail
            .and_then(|slot| self.slots[slot].as_ref())
            .map(|node| node.stamp)
    }

    /// Entities whose location lies in the bounding box of the circle of
    /// `radius` meters around `center`.
    ///
    /// The box over-includes near its corners; callers that need the exact
    /// circle filter with [`GeoPoint::distance`].
    pub fn query_within_range(
        &self,
        center: GeoPoint,
        radius: f64,
    ) -> impl Iterator<Item = Entry<'_, K, V>> + '_ {
        RangeBox::around(center, radius)
            .envelopes()
            .flat_map(move |(min, max)| {
                self.spatial
                    .locate_in_envelope(&AABB::from_corners(min, max))
                    .map(move |indexed| self.entry(indexed.slot))
            })
    }

    /// All entities, most recently seen first.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }

    /// Append an entity at the back of the recency order.
    ///
    /// Used when restoring a snapshot, which lists entities most recent
    /// first. An existing entity with the same key is replaced.
    pub fn push_back(&mut self, key: K, value: V, stamp: Instant) {
        self.remove(&key);
        let slot = self.allocate(key.clone(), value, stamp);
        self.by_key.insert(key, slot);
        self.link_back(slot);
        self.reindex(slot);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.by_key.clear();
        self.spatial = RTree::new();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn entry(&self, slot: usize) -> Entry<'_, K, V> {
        match self.slots[slot].as_ref() {
            Some(node) => Entry {
                key: &node.key,
                value: &node.value,
                stamp: node.stamp,
            },
            None => unreachable!("index refers to a free slot"),
        }
    }

    fn allocate(&mut self, key: K, value: V, stamp: Instant) -> usize {
        let node = Node {
            key,
            value,
            stamp,
            prev: None,
            next: None,
            indexed: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Detach a slot from the list and the R-tree and free it. The caller
    /// removes the key from the map.
    fn release(&mut self, slot: usize) -> Option<(K, V)> {
        self.unlink(slot);
        let node = self.slots[slot].take()?;
        if let Some(position) = node.indexed {
            self.spatial.remove(&IndexedSlot { position, slot });
        }
        self.free.push(slot);
        Some((node.key, node.value))
    }

    /// Bring the R-tree in line with the slot's current location.
    fn reindex(&mut self, slot: usize) {
        let Some(node) = self.slots[slot].as_mut() else {
            return;
        };
        let wanted = node
            .value
            .location()
            .filter(GeoPoint::is_valid)
            .map(position_of);
        if wanted == node.indexed {
            return;
        }
        let previous = std::mem::replace(&mut node.indexed, wanted);
        if let Some(position) = previous {
            let removed = self.spatial.remove(&IndexedSlot { position, slot });
            debug_assert!(removed.is_some());
        }
        if let Some(position) = wanted {
            self.spatial.insert(IndexedSlot { position, slot });
        }
    }

    fn unlink(&mut self, slot: usize) {
        let Some(node) = self.slots[slot].as_mut() else {
            return;
        };
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev {
            Some(p) => {
                if let Some(n) = self.slots[p].as_mut() {
                    n.next = next;
                }
            }
            None if self.head == Some(slot) => self.head = next,
            None => {}
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None if self.tail == Some(slot) => self.tail = prev,
            None => {}
        }
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[slot].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(node) = self.slots[h].as_mut() {
                    node.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn link_back(&mut self, slot: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.slots[slot].as_mut() {
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(node) = self.slots[t].as_mut() {
                    node.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }
}

/// Iterator over a registry in recency order.
pub struct Iter<'a, K, V> {
    registry: &'a Registry<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = Entry<'a, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.registry.slots[slot].as_ref()?;
        self.cursor = node.next;
        Some(Entry {
            key: &node.key,
            value: &node.value,
            stamp: node.stamp,
        })
    }
}
