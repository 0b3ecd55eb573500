//! Binary layout for [`super::BoundedHashTable`]:
//!
//! ```text
//! [version: u8] [flags: u8] [buckets: u32] [live: u32] [total: u64]
//! [hll: HyperLogLog]
//! live * { hash64: u64, key_len: u32, key_bytes: [u8; key_len], count: u64 }
//! ```
//!
//! `flags` bit 0 is `pruned`, bit 1 is `use_unicode`. Only live slots are
//! written; tombstones and empty slots carry no information worth
//! persisting and are implicit on reload (every slot starts empty, then
//! each live entry is reinserted through the normal probe path).

use super::BoundedHashTable;
use super::Slot;
use super::SlotState;
use crate::error::Error;
use crate::hll::HyperLogLog;
use crate::serialize::SketchBytes;
use crate::serialize::SketchSlice;

const FORMAT_VERSION: u8 = 1;
const FLAG_PRUNED: u8 = 1 << 0;
const FLAG_USE_UNICODE: u8 = 1 << 1;

impl BoundedHashTable {
    /// Serializes this table to a self-contained byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = SketchBytes::with_capacity(64 + self.live * 24);
        out.write_u8(FORMAT_VERSION);

        let mut flags = 0u8;
        if self.pruned {
            flags |= FLAG_PRUNED;
        }
        if self.use_unicode {
            flags |= FLAG_USE_UNICODE;
        }
        out.write_u8(flags);
        out.write_u32_le(self.slots.len() as u32);
        out.write_u32_le(self.live as u32);
        out.write_u64_le(self.total);
        self.distinct.serialize_into(&mut out);

        for slot in self.live_slots() {
            out.write_u64_le(slot.hash64);
            out.write_u32_le(slot.key.len() as u32);
            out.write(&slot.key);
            out.write_u64_le(slot.count);
        }
        out.into_bytes()
    }

    /// Deserializes a table previously produced by [`Self::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut src = SketchSlice::new(bytes);
        let version = src.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::deserial(format!(
                "unsupported HT format version {version}"
            )));
        }
        let flags = src.read_u8()?;
        let buckets = src.read_u32_le()? as usize;
        let live_count = src.read_u32_le()? as usize;
        let total = src.read_u64_le()?;
        let distinct = HyperLogLog::deserialize_from(&mut src)?;

        if buckets == 0 || !buckets.is_power_of_two() {
            return Err(Error::deserial(format!(
                "invalid bucket count {buckets} in serialized data"
            )));
        }

        let mut table = Self {
            slots: (0..buckets).map(|_| Slot::empty()).collect(),
            live: 0,
            tombstones: 0,
            total: 0,
            distinct,
            pruned: flags & FLAG_PRUNED != 0,
            use_unicode: flags & FLAG_USE_UNICODE != 0,
        };

        let mask = buckets - 1;
        for _ in 0..live_count {
            let hash64 = src.read_u64_le()?;
            let key_len = src.read_u32_le()? as usize;
            let key = src.read_bytes(key_len)?.to_vec();
            let count = src.read_u64_le()?;

            let mut probe = (hash64 as usize) & mask;
            while table.slots[probe].state == SlotState::Occupied {
                probe = (probe + 1) & mask;
            }
            table.slots[probe] = Slot {
                state: SlotState::Occupied,
                hash64,
                key,
                count,
            };
            table.live += 1;
        }
        table.total = total;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::super::BoundedHashTable;

    #[test]
    fn round_trips_live_entries() {
        let mut ht = BoundedHashTable::with_buckets(256, true).unwrap();
        for i in 0..30u64 {
            ht.increment(format!("k{i}").as_bytes(), i + 1).unwrap();
        }

        let bytes = ht.serialize();
        let restored = BoundedHashTable::deserialize(&bytes).unwrap();

        assert_eq!(restored.buckets(), ht.buckets());
        assert_eq!(restored.len(), ht.len());
        assert_eq!(restored.total(), ht.total());
        assert_eq!(restored.get(b"k5"), ht.get(b"k5"));
        assert_eq!(restored.pruned(), ht.pruned());
        assert_eq!(restored.use_unicode(), ht.use_unicode());
    }

    #[test]
    fn preserves_pruned_flag() {
        let mut ht = BoundedHashTable::with_buckets(8, true).unwrap();
        for i in 0..10u64 {
            ht.increment(format!("k{i}").as_bytes(), i + 1).unwrap();
        }
        assert!(ht.pruned());
        let restored = BoundedHashTable::deserialize(&ht.serialize()).unwrap();
        assert!(restored.pruned());
    }

    #[test]
    fn rejects_truncated_input() {
        let ht = BoundedHashTable::with_buckets(64, true).unwrap();
        let bytes = ht.serialize();
        assert!(BoundedHashTable::deserialize(&bytes[..bytes.len().saturating_sub(1)]).is_err());
    }
}
