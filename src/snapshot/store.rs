//! Snapshot store
//!
//! Each (venue, instrument) key owns a slot whose record is swapped whole,
//! so readers never see a half-written snapshot. The key index is only
//! write-locked the first time a key appears.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::{Bbo, Snapshot};

type Slot = Arc<ArcSwapOption<Snapshot>>;

/// Latest BBO for every known (venue, instrument) key
#[derive(Debug, Default)]
pub struct SnapshotStore {
    /// instrument -> venue -> slot
    slots: RwLock<HashMap<String, BTreeMap<String, Slot>>>,
}

impl SnapshotStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate the slot for a key so the first `put` needs no write lock
    pub fn register(&self, venue: &str, instrument: &str) {
        self.slot_or_insert(venue, instrument);
    }

    /// Replace the record for `(venue, instrument)`
    pub fn put(&self, venue: &str, instrument: &str, bbo: Bbo) {
        let snapshot = Arc::new(Snapshot::new(venue, instrument, bbo));
        self.slot_or_insert(venue, instrument).store(Some(snapshot));
    }

    /// Point-in-time copy of every usable snapshot for an instrument, keyed by venue
    pub fn get_all(&self, instrument: &str) -> BTreeMap<String, Snapshot> {
        let slots = self.slots.read();
        let Some(venues) = slots.get(instrument) else {
            return BTreeMap::new();
        };

        venues
            .iter()
            .filter_map(|(venue, slot)| {
                let snapshot = slot.load_full()?;
                snapshot
                    .is_usable()
                    .then(|| (venue.clone(), Snapshot::clone(&snapshot)))
            })
            .collect()
    }

    /// Usable snapshots for an instrument that are not older than `max_age`
    pub fn fresh(
        &self,
        instrument: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> BTreeMap<String, Snapshot> {
        let mut snapshots = self.get_all(instrument);
        snapshots.retain(|_, snapshot| !Self::is_stale(snapshot, now, max_age));
        snapshots
    }

    pub fn is_stale(snapshot: &Snapshot, now: DateTime<Utc>, max_age: Duration) -> bool {
        snapshot.is_stale(now, max_age)
    }

    /// Names of every venue with at least one registered key
    pub fn venues(&self) -> BTreeSet<String> {
        self.slots
            .read()
            .values()
            .flat_map(|venues| venues.keys().cloned())
            .collect()
    }

    /// Every instrument with at least one registered key, sorted
    pub fn instruments(&self) -> BTreeSet<String> {
        self.slots.read().keys().cloned().collect()
    }

    /// Number of instruments per venue with a fresh, usable snapshot
    pub fn fresh_counts(&self, now: DateTime<Utc>, max_age: Duration) -> BTreeMap<String, usize> {
        let slots = self.slots.read();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        for venues in slots.values() {
            for (venue, slot) in venues {
                let entry = counts.entry(venue.clone()).or_default();
                if let Some(snapshot) = slot.load_full() {
                    if snapshot.is_usable() && !snapshot.is_stale(now, max_age) {
                        *entry += 1;
                    }
                }
            }
        }

        counts
    }

    fn slot_or_insert(&self, venue: &str, instrument: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .get(instrument)
            .and_then(|venues| venues.get(venue))
        {
            return slot.clone();
        }

        let mut slots = self.slots.write();
        slots
            .entry(instrument.to_string())
            .or_default()
            .entry(venue.to_string())
            .or_default()
            .clone()
    }
}
