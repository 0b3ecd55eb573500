//! Bounded, open-addressed hash table with LFU-style pruning.
//!
//! Unlike [`crate::countmin::CountMinSketch`], this engine retains actual
//! keys and exact per-key counts, at the cost of evicting the
//! lowest-frequency keys once the table's load factor is exceeded. The
//! open-addressing/tombstone/drift shape mirrors the teacher's
//! `ReversePurgeItemHashMap`; the eviction body does not (see
//! [`BoundedHashTable::prune`]).
//!
//! # Example
//!
//! ```rust
//! use bounter_rs::hashtable::BoundedHashTable;
//!
//! let mut ht = BoundedHashTable::with_buckets(8, true).unwrap();
//! ht.increment(b"a", 3).unwrap();
//! ht.increment(b"b", 2).unwrap();
//! assert_eq!(ht.get(b"a"), 3);
//! assert_eq!(ht.len(), 2);
//! ```

mod serialization;

use crate::error::Error;
use crate::hash::hash128;
use crate::hll::HyperLogLog;

const LOAD_FACTOR: f64 = 0.75;
const DRIFT_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Empty,
    Tombstone,
    Occupied,
}

#[derive(Debug, Clone)]
struct Slot {
    state: SlotState,
    hash64: u64,
    key: Vec<u8>,
    count: u64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            state: SlotState::Empty,
            hash64: 0,
            key: Vec::new(),
            count: 0,
        }
    }
}

/// A bounded hash table mapping byte-string keys to exact `u64` counts,
/// evicting low-frequency keys under memory pressure.
#[derive(Debug, Clone)]
pub struct BoundedHashTable {
    slots: Vec<Slot>,
    live: usize,
    tombstones: usize,
    total: u64,
    distinct: HyperLogLog,
    pruned: bool,
    use_unicode: bool,
}

impl BoundedHashTable {
    /// Creates a table with `buckets` slots (must be a power of two).
    /// `use_unicode` controls whether iteration decodes keys as UTF-8
    /// (returning [`String`]) or leaves them as raw bytes.
    pub fn with_buckets(buckets: usize, use_unicode: bool) -> Result<Self, Error> {
        if buckets == 0 || !buckets.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "buckets must be a power of two, got {buckets}"
            )));
        }
        Ok(Self {
            slots: (0..buckets).map(|_| Slot::empty()).collect(),
            live: 0,
            tombstones: 0,
            total: 0,
            distinct: HyperLogLog::new(),
            pruned: false,
            use_unicode,
        })
    }

    /// Creates a table sized to fit within `size_mb` megabytes, using
    /// [`crate::factory::derive_ht_buckets`].
    pub fn new(size_mb: u64, use_unicode: bool) -> Result<Self, Error> {
        let buckets = crate::factory::derive_ht_buckets(size_mb)?;
        Self::with_buckets(buckets, use_unicode)
    }

    /// Physical slot count (`N`).
    pub fn buckets(&self) -> usize {
        self.slots.len()
    }

    /// Number of live (non-empty, non-tombstone) slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the table currently holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Exact sum of all increments applied to this table, net of explicit
    /// `delete`s. Pruning does not subtract from this: it tracks the grand
    /// sum of the stream, not the sum of what the table currently holds.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// HyperLogLog estimate of distinct keys ever seen (not reduced by
    /// deletion or pruning).
    pub fn cardinality(&self) -> u64 {
        self.distinct.estimate()
    }

    /// `live_slots / N`: heuristic fullness indicator.
    pub fn quality(&self) -> f64 {
        self.live as f64 / self.slots.len() as f64
    }

    /// Whether a prune pass has ever run. Once true, `get` may return 0 for
    /// a key that was previously inserted and later evicted; the flag never
    /// clears.
    pub fn pruned(&self) -> bool {
        self.pruned
    }

    /// Returns the count for `key`, or 0 if absent.
    pub fn get(&self, key: &[u8]) -> u64 {
        match self.find_occupied(key) {
            Some(idx) => self.slots[idx].count,
            None => 0,
        }
    }

    /// Whether `key` currently has a live entry.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.find_occupied(key).is_some()
    }

    /// Sets `key`'s count to exactly `value`, inserting it if absent.
    pub fn set(&mut self, key: &[u8], value: u64) -> Result<(), Error> {
        let (h_low, h_high) = hash128(key);
        self.reserve_slot_for(h_low, key);
        let idx = self.probe_for_insert(h_low, key)?;
        let prev = if self.slots[idx].state == SlotState::Occupied {
            self.slots[idx].count
        } else {
            0
        };
        self.occupy(idx, h_low, key, value);
        self.total = self
            .total
            .checked_add(value)
            .and_then(|t| t.checked_sub(prev))
            .ok_or_else(|| Error::overflow("total would exceed u64::MAX"))?;
        self.distinct.add_hash(h_high);
        Ok(())
    }

    /// Increments `key`'s count by `delta` (non-negative), inserting it if
    /// absent.
    pub fn increment(&mut self, key: &[u8], delta: u64) -> Result<(), Error> {
        let (h_low, h_high) = hash128(key);
        self.reserve_slot_for(h_low, key);
        let idx = self.probe_for_insert(h_low, key)?;
        let prev = if self.slots[idx].state == SlotState::Occupied {
            self.slots[idx].count
        } else {
            0
        };
        let next = prev
            .checked_add(delta)
            .ok_or_else(|| Error::overflow("count would exceed u64::MAX"))?;
        self.occupy(idx, h_low, key, next);
        self.total = self
            .total
            .checked_add(delta)
            .ok_or_else(|| Error::overflow("total would exceed u64::MAX"))?;
        self.distinct.add_hash(h_high);
        Ok(())
    }

    /// Deletes `key` if present, leaving a tombstone. Returns whether a key
    /// was actually removed.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.find_occupied(key) {
            Some(idx) => {
                self.total -= self.slots[idx].count;
                self.slots[idx] = Slot {
                    state: SlotState::Tombstone,
                    hash64: 0,
                    key: Vec::new(),
                    count: 0,
                };
                self.live -= 1;
                self.tombstones += 1;
                true
            }
            None => false,
        }
    }

    /// Feeds each key yielded by `keys` into the table with an increment of
    /// one.
    pub fn update_iter<I, K>(&mut self, keys: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        for key in keys {
            self.increment(key.as_ref(), 1)?;
        }
        Ok(())
    }

    /// Feeds a `key -> delta` mapping into the table.
    pub fn update_map<I, K>(&mut self, entries: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, u64)>,
        K: AsRef<[u8]>,
    {
        for (key, delta) in entries {
            self.increment(key.as_ref(), delta)?;
        }
        Ok(())
    }

    /// Merges `other` into `self`. Both tables must have the same bucket
    /// count. Every live slot in `other` is added into `self`, saturating
    /// at `u64::MAX` with an overflow error.
    pub fn merge(&mut self, other: &Self) -> Result<(), Error> {
        if self.slots.len() != other.slots.len() {
            return Err(Error::incompatible_merge(
                "HT merge requires identical bucket count",
            ));
        }
        for slot in other.slots.iter().filter(|s| s.state == SlotState::Occupied) {
            self.increment(&slot.key, slot.count)?;
        }
        self.distinct.merge(&other.distinct)?;
        Ok(())
    }

    /// Snapshot of live keys, decoded as UTF-8 if constructed with
    /// `use_unicode = true`.
    pub fn iter_keys(&self) -> Vec<Vec<u8>> {
        self.live_slots().map(|s| s.key.clone()).collect()
    }

    /// Snapshot of live key strings. Only meaningful when constructed with
    /// `use_unicode = true`; non-UTF-8 keys are replaced with the Unicode
    /// replacement character.
    pub fn iter_keys_str(&self) -> Vec<String> {
        self.live_slots()
            .map(|s| String::from_utf8_lossy(&s.key).into_owned())
            .collect()
    }

    /// Snapshot of live counts.
    pub fn iter_values(&self) -> Vec<u64> {
        self.live_slots().map(|s| s.count).collect()
    }

    /// Snapshot of live `(key, count)` pairs.
    pub fn iter_items(&self) -> Vec<(Vec<u8>, u64)> {
        self.live_slots().map(|s| (s.key.clone(), s.count)).collect()
    }

    /// Whether this table was constructed to decode keys as UTF-8 text.
    pub fn use_unicode(&self) -> bool {
        self.use_unicode
    }

    fn live_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.state == SlotState::Occupied)
    }

    fn find_occupied(&self, key: &[u8]) -> Option<usize> {
        let (h_low, _) = hash128(key);
        self.find_occupied_with_hash(h_low, key)
    }

    fn find_occupied_with_hash(&self, h_low: u64, key: &[u8]) -> Option<usize> {
        let mask = self.slots.len() - 1;
        let mut probe = (h_low as usize) & mask;
        let mut drift = 0usize;
        loop {
            match self.slots[probe].state {
                SlotState::Empty => return None,
                SlotState::Occupied if self.slots[probe].hash64 == h_low && self.slots[probe].key == key => {
                    return Some(probe);
                }
                _ => {}
            }
            probe = (probe + 1) & mask;
            drift += 1;
            if drift >= self.slots.len() {
                return None;
            }
            debug_assert!(drift < DRIFT_LIMIT, "probe drift limit exceeded");
        }
    }

    /// Finds the slot to write `key` into: its existing occupied slot, or
    /// the first tombstone/empty slot encountered along the probe path.
    fn probe_for_insert(&self, h_low: u64, key: &[u8]) -> Result<usize, Error> {
        let mask = self.slots.len() - 1;
        let mut probe = (h_low as usize) & mask;
        let mut first_free: Option<usize> = None;
        let mut drift = 0usize;
        loop {
            match self.slots[probe].state {
                SlotState::Empty => {
                    return Ok(first_free.unwrap_or(probe));
                }
                SlotState::Tombstone => {
                    if first_free.is_none() {
                        first_free = Some(probe);
                    }
                }
                SlotState::Occupied => {
                    if self.slots[probe].hash64 == h_low && self.slots[probe].key == key {
                        return Ok(probe);
                    }
                }
            }
            probe = (probe + 1) & mask;
            drift += 1;
            if drift >= self.slots.len() {
                return Err(Error::budget_too_small(
                    "hash table is full: no empty or tombstone slot on probe path",
                ));
            }
        }
    }

    fn occupy(&mut self, idx: usize, h_low: u64, key: &[u8], count: u64) {
        let was_free = self.slots[idx].state != SlotState::Occupied;
        if was_free {
            if self.slots[idx].state == SlotState::Tombstone {
                self.tombstones -= 1;
            }
            self.live += 1;
        }
        self.slots[idx] = Slot {
            state: SlotState::Occupied,
            hash64: h_low,
            key: key.to_vec(),
            count,
        };
    }

    /// Claims a slot for `key` ahead of an insert, pruning first if `key`
    /// is new and the table has reached its high-water mark. Checking
    /// before the new key is written (rather than after) matters: it keeps
    /// a just-inserted key from being counted among the entries the
    /// threshold sweep can evict for its own insertion.
    fn reserve_slot_for(&mut self, h_low: u64, key: &[u8]) {
        if self.find_occupied_with_hash(h_low, key).is_some() {
            return;
        }
        let high_water = (self.slots.len() as f64 * LOAD_FACTOR) as usize;
        if self.live + self.tombstones >= high_water {
            self.prune();
        }
    }

    /// Threshold-sweep eviction: find the smallest count threshold `t` such
    /// that deleting every slot with `count <= t` frees at least half the
    /// table, then rehash survivors into a fresh slot array, reclaiming all
    /// tombstones in the process. Ties at `t` are evicted together even if
    /// this over-evicts. Latches `pruned = true`. `total` is untouched: it
    /// tracks the exact sum of every increment ever applied, including the
    /// counts this pass evicts.
    fn prune(&mut self) {
        let n = self.slots.len();
        let target_live = n / 2;

        let mut counts: Vec<u64> = self.live_slots().map(|s| s.count).collect();
        counts.sort_unstable();

        // Smallest threshold `t` such that evicting every slot with
        // `count <= t` leaves at most `target_live` slots. Entries tied at
        // `t` are always evicted together, which can over-evict past
        // `target_live` — that's the rule, not a bug.
        let mut threshold = 0u64;
        let mut idx = 0usize;
        while counts.len() - idx > target_live && idx < counts.len() {
            threshold = counts[idx];
            while idx < counts.len() && counts[idx] == threshold {
                idx += 1;
            }
        }

        let survivors: Vec<Slot> = std::mem::take(&mut self.slots)
            .into_iter()
            .filter(|s| s.state == SlotState::Occupied && s.count > threshold)
            .collect();

        self.slots = (0..n).map(|_| Slot::empty()).collect();
        self.live = 0;
        self.tombstones = 0;

        let mask = n - 1;
        for slot in survivors {
            let mut probe = (slot.hash64 as usize) & mask;
            while self.slots[probe].state == SlotState::Occupied {
                probe = (probe + 1) & mask;
            }
            self.slots[probe] = slot;
            self.live += 1;
        }
        self.pruned = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_eviction_keeps_highest_counts() {
        let mut ht = BoundedHashTable::with_buckets(4, true).unwrap();
        ht.set(b"e", 1).unwrap();
        ht.set(b"a", 3).unwrap();
        ht.set(b"b", 2).unwrap();
        ht.set(b"d", 5).unwrap();
        ht.set(b"e", 4).unwrap();

        assert_eq!(ht.get(b"a"), 3);
        assert_eq!(ht.get(b"d"), 5);
        assert_eq!(ht.get(b"e"), 4);
        assert_eq!(ht.len(), 3);
    }

    #[test]
    fn s4_low_count_keys_are_evicted_under_pressure() {
        let mut ht = BoundedHashTable::with_buckets(8, true).unwrap();
        ht.set(b"a", 3).unwrap();
        ht.set(b"b", 2).unwrap();
        ht.set(b"c", 4).unwrap();
        ht.set(b"d", 1).unwrap();
        ht.set(b"e", 5).unwrap();
        ht.set(b"f", 6).unwrap();
        ht.increment(b"x", 1).unwrap();

        assert!(ht.contains(b"x"));
        assert!(ht.len() <= 5);
        assert!(ht.pruned());
    }

    #[test]
    fn exact_counts_without_pruning() {
        let mut ht = BoundedHashTable::with_buckets(1024, true).unwrap();
        for i in 0..100u64 {
            ht.increment(format!("k{i}").as_bytes(), 1).unwrap();
        }
        ht.increment(b"k5", 9).unwrap();
        assert_eq!(ht.get(b"k5"), 10);
        assert!(!ht.pruned());
    }

    #[test]
    fn pruning_never_exceeds_half_capacity() {
        let mut ht = BoundedHashTable::with_buckets(16, true).unwrap();
        for i in 0..1000u64 {
            ht.increment(format!("key-{}", i % 50).as_bytes(), (i % 7) + 1)
                .unwrap();
        }
        assert!(ht.len() <= ht.buckets() / 2);
    }

    #[test]
    fn total_reflects_full_stream_sum_even_after_pruning() {
        let mut ht = BoundedHashTable::with_buckets(8, true).unwrap();
        let mut exact_total = 0u64;
        for i in 0..30u64 {
            ht.increment(format!("k{i}").as_bytes(), 2).unwrap();
            exact_total += 2;
        }
        assert!(ht.pruned());
        assert_eq!(ht.total(), exact_total);
    }

    #[test]
    fn delete_removes_key_and_frees_slot_for_reuse() {
        let mut ht = BoundedHashTable::with_buckets(1024, true).unwrap();
        ht.increment(b"foo", 1).unwrap();
        assert!(ht.delete(b"foo"));
        assert!(!ht.contains(b"foo"));
        assert_eq!(ht.get(b"foo"), 0);
        assert!(!ht.delete(b"foo"));
    }

    #[test]
    fn buckets_must_be_power_of_two() {
        assert!(BoundedHashTable::with_buckets(100, true).is_err());
    }

    #[test]
    fn merge_requires_matching_bucket_count() {
        let a = BoundedHashTable::with_buckets(64, true).unwrap();
        let b = BoundedHashTable::with_buckets(128, true).unwrap();
        let mut a = a;
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn merge_sums_counts_across_disjoint_keys() {
        let mut a = BoundedHashTable::with_buckets(4096, true).unwrap();
        let mut b = BoundedHashTable::with_buckets(4096, true).unwrap();
        a.increment(b"shared", 2).unwrap();
        b.increment(b"shared", 3).unwrap();
        b.increment(b"only-b", 7).unwrap();

        a.merge(&b).unwrap();
        assert_eq!(a.get(b"shared"), 5);
        assert_eq!(a.get(b"only-b"), 7);
    }

    #[test]
    fn str_and_bytes_collide() {
        let mut ht = BoundedHashTable::with_buckets(64, true).unwrap();
        ht.increment("foo".as_bytes(), 1).unwrap();
        assert_eq!(ht.get(b"foo"), ht.get("foo".as_bytes()));
    }
}
