//! Count-Min Sketch implementation for approximate frequency estimation
//! under a fixed memory budget.
//!
//! The sketch trades exactness for a flat, pre-allocated `depth × width`
//! table: no key is ever retained, only a matrix of counters indexed by
//! `depth` independent hash functions. A point query returns the minimum
//! (or, for log variants, the decoded minimum) across the `depth` rows.
//!
//! # Usage
//!
//! ```rust
//! use bounter_rs::countmin::{CellVariant, CountMinSketch};
//!
//! let mut cms = CountMinSketch::with_shape(1024, 4, CellVariant::Conservative).unwrap();
//! cms.increment(b"foo").unwrap();
//! cms.increment(b"foo").unwrap();
//! cms.increment(b"bar").unwrap();
//!
//! assert!(cms.get(b"foo") >= 2);
//! assert_eq!(cms.total(), 3);
//! ```

mod serialization;

use crate::common::random::XorShift64;
use crate::error::Error;
use crate::hash::hash128;
use crate::hll::HyperLogLog;

/// Which cell encoding and update rule a [`CountMinSketch`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellVariant {
    /// 32-bit cells, conservative update (bumps only the row minimum).
    Conservative,
    /// 8-bit logarithmic cells (`shift = 2`), independent probabilistic
    /// increment per row.
    Log8,
    /// 16-bit logarithmic cells (`shift = 9`), independent probabilistic
    /// increment per row.
    Log1024,
    /// 16-bit logarithmic cells (`shift = 9`) with a single shared coin
    /// flip applied to every row at the current minimum, combining the
    /// conservative and logarithmic update rules.
    LogCons1024,
}

impl CellVariant {
    /// Bytes used per cell on disk and in memory.
    pub fn cell_bytes(&self) -> usize {
        match self {
            CellVariant::Conservative => 4,
            CellVariant::Log8 => 1,
            CellVariant::Log1024 | CellVariant::LogCons1024 => 2,
        }
    }

    fn log_shift(&self) -> Option<u32> {
        match self {
            CellVariant::Conservative => None,
            CellVariant::Log8 => Some(crate::codec::LOG8_SHIFT),
            CellVariant::Log1024 | CellVariant::LogCons1024 => Some(crate::codec::LOG1024_SHIFT),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            CellVariant::Conservative => 0,
            CellVariant::Log8 => 1,
            CellVariant::Log1024 => 2,
            CellVariant::LogCons1024 => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(CellVariant::Conservative),
            1 => Ok(CellVariant::Log8),
            2 => Ok(CellVariant::Log1024),
            3 => Ok(CellVariant::LogCons1024),
            other => Err(Error::deserial(format!("unknown CMS variant tag {other}"))),
        }
    }
}

/// The row-major contiguous cell buffer, one variant per cell width.
#[derive(Debug, Clone)]
enum CellStorage {
    U32(Vec<u32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl CellStorage {
    fn new(variant: CellVariant, len: usize) -> Self {
        match variant {
            CellVariant::Conservative => CellStorage::U32(vec![0; len]),
            CellVariant::Log8 => CellStorage::U8(vec![0; len]),
            CellVariant::Log1024 | CellVariant::LogCons1024 => CellStorage::U16(vec![0; len]),
        }
    }

    fn get(&self, idx: usize) -> u64 {
        match self {
            CellStorage::U32(v) => v[idx] as u64,
            CellStorage::U8(v) => v[idx] as u64,
            CellStorage::U16(v) => v[idx] as u64,
        }
    }

    fn set(&mut self, idx: usize, value: u64) {
        match self {
            CellStorage::U32(v) => v[idx] = value as u32,
            CellStorage::U8(v) => v[idx] = value as u8,
            CellStorage::U16(v) => v[idx] = value as u16,
        }
    }

    fn len(&self) -> usize {
        match self {
            CellStorage::U32(v) => v.len(),
            CellStorage::U8(v) => v.len(),
            CellStorage::U16(v) => v.len(),
        }
    }
}

/// A Count-Min Sketch counting engine.
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    variant: CellVariant,
    width: usize,
    depth: usize,
    cells: CellStorage,
    total: u64,
    distinct: HyperLogLog,
    rng: XorShift64,
}

impl CountMinSketch {
    /// Creates a sketch with an explicit `(width, depth)` shape. `width`
    /// must be a power of two; `depth` must be at least one.
    pub fn with_shape(width: usize, depth: usize, variant: CellVariant) -> Result<Self, Error> {
        if width == 0 || !width.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "width must be a power of two, got {width}"
            )));
        }
        if depth == 0 {
            return Err(Error::invalid_argument("depth must be at least 1"));
        }
        Ok(Self {
            variant,
            width,
            depth,
            cells: CellStorage::new(variant, width * depth),
            total: 0,
            distinct: HyperLogLog::new(),
            rng: XorShift64::default(),
        })
    }

    /// Creates a sketch sized to fit within `size_mb` megabytes, using
    /// [`crate::factory::derive_cms_dims`]'s width/depth arithmetic.
    pub fn new(size_mb: u64, variant: CellVariant) -> Result<Self, Error> {
        let (width, depth) =
            crate::factory::derive_cms_dims(Some(size_mb), None, None, variant.cell_bytes())?;
        Self::with_shape(width, depth, variant)
    }

    /// Seeds the internal PRNG explicitly, for reproducible tests of the
    /// log-counter probabilistic increment.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = XorShift64::seeded(seed);
        self
    }

    /// Active cell variant.
    pub fn variant(&self) -> CellVariant {
        self.variant
    }

    /// Number of columns per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of independent hash rows.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Exact sum of all increments applied so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// HyperLogLog estimate of the number of distinct keys seen.
    pub fn cardinality(&self) -> u64 {
        self.distinct.estimate()
    }

    /// `cardinality / width`: a heuristic fullness indicator. Values at or
    /// above 1 indicate the table is seeing meaningful collision bias;
    /// values at or above 5 indicate heavy bias.
    pub fn quality(&self) -> f64 {
        self.cardinality() as f64 / self.width as f64
    }

    /// Total size of the cell buffer in bytes (`width * depth * cell_bytes`).
    pub fn size(&self) -> usize {
        self.width * self.depth * self.variant.cell_bytes()
    }

    /// Increments `key` by one.
    pub fn increment(&mut self, key: &[u8]) -> Result<(), Error> {
        self.increment_by(key, 1)
    }

    /// Increments `key` by `delta`. `delta` must be non-negative.
    pub fn increment_by(&mut self, key: &[u8], delta: i64) -> Result<(), Error> {
        if delta < 0 {
            return Err(Error::invalid_argument("delta must not be negative"));
        }
        if delta == 0 {
            return Ok(());
        }
        let delta = delta as u64;
        let new_total = self
            .total
            .checked_add(delta)
            .ok_or_else(|| Error::overflow("total would exceed u64::MAX"))?;

        let (h_low, h_high) = hash128(key);
        let buckets = self.bucket_indices(h_low, h_high);

        match self.variant {
            CellVariant::Conservative => self.conservative_increment(&buckets, delta)?,
            CellVariant::Log8 | CellVariant::Log1024 => {
                self.independent_log_increment(&buckets, delta)
            }
            CellVariant::LogCons1024 => self.conservative_log_increment(&buckets, delta),
        }

        self.total = new_total;
        self.distinct.add_hash(h_high);
        Ok(())
    }

    /// Returns the estimated count for `key` (decoded through the active
    /// variant's codec).
    pub fn get(&self, key: &[u8]) -> u64 {
        let (h_low, h_high) = hash128(key);
        let buckets = self.bucket_indices(h_low, h_high);
        let min_cell = buckets
            .iter()
            .enumerate()
            .map(|(row, &b)| self.cells.get(self.row_base(row) + b))
            .min()
            .unwrap();
        match self.variant.log_shift() {
            Some(shift) => crate::codec::decode(shift, min_cell),
            None => min_cell,
        }
    }

    /// Whether `key` has a non-zero estimate.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key) > 0
    }

    /// Merges `other` into `self`. Both sketches must share the same
    /// variant, width, and depth.
    pub fn merge(&mut self, other: &Self) -> Result<(), Error> {
        if self.variant != other.variant || self.width != other.width || self.depth != other.depth
        {
            return Err(Error::incompatible_merge(
                "CMS merge requires identical variant, width, and depth",
            ));
        }
        self.total = self
            .total
            .checked_add(other.total)
            .ok_or_else(|| Error::overflow("total would exceed u64::MAX during merge"))?;
        self.distinct.merge(&other.distinct)?;

        match self.variant {
            CellVariant::Conservative => {
                if let (CellStorage::U32(a), CellStorage::U32(b)) = (&mut self.cells, &other.cells)
                {
                    for (x, y) in a.iter_mut().zip(b.iter()) {
                        *x = x.saturating_add(*y);
                    }
                }
            }
            _ => {
                // Log variants: cell-wise max. Merging sums of log-encoded
                // values is not exact (decode/sum/re-encode is strictly
                // more correct but discards the simplicity the log
                // encoding exists for); this crate takes the max rule the
                // spec documents as an explicit approximation.
                for i in 0..self.cells.len() {
                    let merged = self.cells.get(i).max(other.cells.get(i));
                    self.cells.set(i, merged);
                }
            }
        }
        Ok(())
    }

    /// Feeds each key yielded by `keys` into the sketch with a count of one.
    pub fn update_iter<I, K>(&mut self, keys: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        for key in keys {
            self.increment(key.as_ref())?;
        }
        Ok(())
    }

    /// Feeds a `key -> delta` mapping into the sketch.
    pub fn update_map<I, K>(&mut self, entries: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<[u8]>,
    {
        for (key, delta) in entries {
            self.increment_by(key.as_ref(), delta)?;
        }
        Ok(())
    }

    fn bucket_indices(&self, h_low: u64, h_high: u64) -> Vec<usize> {
        let mask = (self.width - 1) as u64;
        (0..self.depth as u64)
            .map(|i| (h_low ^ h_high.wrapping_mul(i)) & mask)
            .map(|b| b as usize)
            .collect()
    }

    fn row_base(&self, row: usize) -> usize {
        row * self.width
    }

    fn conservative_increment(&mut self, buckets: &[usize], delta: u64) -> Result<(), Error> {
        let cells: Vec<u64> = buckets
            .iter()
            .enumerate()
            .map(|(row, &b)| self.cells.get(self.row_base(row) + b))
            .collect();
        let m = *cells.iter().min().unwrap();
        let bumped = m
            .checked_add(delta)
            .filter(|&v| v <= u32::MAX as u64)
            .ok_or_else(|| Error::overflow("CMS cell would exceed its 32-bit range"))?;

        for (row, (&b, &cur)) in buckets.iter().zip(cells.iter()).enumerate() {
            let idx = self.row_base(row) + b;
            let next = if cur == m { bumped } else { cur.max(bumped) };
            self.cells.set(idx, next);
        }
        Ok(())
    }

    fn independent_log_increment(&mut self, buckets: &[usize], delta: u64) {
        let shift = self.variant.log_shift().expect("log variant");
        for _ in 0..delta {
            for (row, &b) in buckets.iter().enumerate() {
                let idx = self.row_base(row) + b;
                let cur = self.cells.get(idx);
                let next = crate::codec::probabilistic_bump(shift, cur, &mut self.rng);
                self.cells.set(idx, next);
            }
        }
    }

    fn conservative_log_increment(&mut self, buckets: &[usize], delta: u64) {
        let shift = self.variant.log_shift().expect("log variant");
        for _ in 0..delta {
            let cells: Vec<u64> = buckets
                .iter()
                .enumerate()
                .map(|(row, &b)| self.cells.get(self.row_base(row) + b))
                .collect();
            let m = *cells.iter().min().unwrap();
            let bumped = crate::codec::probabilistic_bump(shift, m, &mut self.rng);
            if bumped != m {
                for (row, (&b, &cur)) in buckets.iter().zip(cells.iter()).enumerate() {
                    if cur == m {
                        self.cells.set(self.row_base(row) + b, bumped);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_conservative_basic_counts() {
        let mut cms = CountMinSketch::with_shape(2048, 4, CellVariant::Conservative).unwrap();
        for _ in 0..3 {
            cms.increment(b"foo").unwrap();
        }
        cms.increment(b"bar").unwrap();

        assert_eq!(cms.get(b"foo"), 3);
        assert_eq!(cms.get(b"bar"), 1);
        assert_eq!(cms.get(b"missing"), 0);
        assert_eq!(cms.total(), 4);
        assert_eq!(cms.cardinality(), 2);
    }

    #[test]
    fn conservative_never_undercounts() {
        let mut cms = CountMinSketch::with_shape(64, 4, CellVariant::Conservative).unwrap();
        let mut truth = std::collections::HashMap::new();
        for i in 0..500u64 {
            let key = format!("key-{}", i % 40);
            cms.increment(key.as_bytes()).unwrap();
            *truth.entry(key).or_insert(0u64) += 1;
        }
        for (key, count) in truth {
            assert!(cms.get(key.as_bytes()) >= count);
        }
    }

    #[test]
    fn negative_delta_is_rejected_without_mutation() {
        let mut cms = CountMinSketch::with_shape(64, 4, CellVariant::Conservative).unwrap();
        cms.increment(b"foo").unwrap();
        let before = cms.get(b"foo");
        let before_total = cms.total();
        assert!(cms.increment_by(b"foo", -5).is_err());
        assert_eq!(cms.get(b"foo"), before);
        assert_eq!(cms.total(), before_total);
    }

    #[test]
    fn str_and_bytes_collide() {
        let mut cms = CountMinSketch::with_shape(64, 4, CellVariant::Conservative).unwrap();
        cms.increment("foo".as_bytes()).unwrap();
        assert_eq!(cms.get(b"foo"), cms.get("foo".as_bytes()));
    }

    #[test]
    fn width_must_be_power_of_two() {
        assert!(CountMinSketch::with_shape(1000, 4, CellVariant::Conservative).is_err());
    }

    #[test]
    fn zero_depth_is_rejected() {
        assert!(CountMinSketch::with_shape(64, 0, CellVariant::Conservative).is_err());
    }

    #[test]
    fn merge_requires_matching_shape() {
        let a = CountMinSketch::with_shape(64, 4, CellVariant::Conservative).unwrap();
        let b = CountMinSketch::with_shape(128, 4, CellVariant::Conservative).unwrap();
        let mut a = a;
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn merge_of_conservative_sums_disjoint_keys() {
        let mut a = CountMinSketch::with_shape(1 << 17, 8, CellVariant::Conservative).unwrap();
        let mut b = CountMinSketch::with_shape(1 << 17, 8, CellVariant::Conservative).unwrap();
        for i in 0..200u64 {
            a.increment(format!("a-{i}").as_bytes()).unwrap();
        }
        for i in 0..200u64 {
            b.increment(format!("b-{i}").as_bytes()).unwrap();
        }
        let total_before = a.total() + b.total();
        a.merge(&b).unwrap();
        assert_eq!(a.total(), total_before);
        assert_eq!(a.get(b"a-5"), 1);
        assert_eq!(a.get(b"b-5"), 1);
    }

    #[test]
    fn log8_tracks_large_counts_within_bias_bound() {
        let mut cms = CountMinSketch::with_shape(2048, 4, CellVariant::Log8)
            .unwrap()
            .with_seed(11);
        for _ in 0..127_451u64 {
            cms.increment(b"x").unwrap();
        }
        let estimate = cms.get(b"x") as f64;
        let err = (estimate - 127_451.0).abs() / 127_451.0;
        assert!(err <= 0.7, "log8 error {err} too high");
    }

    #[test]
    fn cardinality_only_one_by_one_shape() {
        let mut cms = CountMinSketch::with_shape(1, 1, CellVariant::Conservative).unwrap();
        for i in 0..2000u64 {
            cms.increment(format!("k{i}").as_bytes()).unwrap();
        }
        let err = (cms.cardinality() as f64 - 2000.0).abs() / 2000.0;
        assert!(err < 0.05);
    }
}
