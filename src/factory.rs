//! Unified front-end choosing between the hash-table, Count-Min Sketch, and
//! cardinality-only engines from a memory budget, plus the size arithmetic
//! each engine's `new(size_mb, ...)` constructor delegates to.
//!
//! Grounded line-for-line in `bounter.bounter()`: same parameter names, same
//! validation order (`need_counts` first, then `size_mb` presence, then the
//! `need_iteration` + `log_counting` conflict, then engine selection).

use crate::countmin::CellVariant;
use crate::countmin::CountMinSketch;
use crate::error::Error;
use crate::hashtable::BoundedHashTable;
use crate::hll::HyperLogLog;

/// Which log-counter cell width to request from the factory when building a
/// CMS. `None` selects the 32-bit conservative variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCounting {
    /// `u8` cells (`log8`), shift = 2.
    Log8,
    /// `u16` cells (`log1024`), shift = 9.
    Log1024,
}

impl LogCounting {
    fn into_variant(self) -> CellVariant {
        match self {
            LogCounting::Log8 => CellVariant::Log8,
            LogCounting::Log1024 => CellVariant::Log1024,
        }
    }
}

/// A counting engine returned by [`make_counter`]. Wraps whichever concrete
/// engine the factory chose behind one front-end so callers don't need to
/// match on the inputs they already passed in.
#[derive(Debug, Clone)]
pub enum Counter {
    /// Exact key→count table with LFU pruning (`need_iteration = true`).
    HashTable(BoundedHashTable),
    /// Count-Min Sketch (`need_iteration = false`).
    Sketch(CountMinSketch),
    /// Cardinality-only estimator (`need_counts = false`). `get` is not
    /// implemented on this variant.
    CardinalityOnly(HyperLogLog),
}

impl Counter {
    /// Increments `key` by one.
    pub fn increment(&mut self, key: &[u8]) -> Result<(), Error> {
        self.increment_by(key, 1)
    }

    /// Increments `key` by `delta`.
    pub fn increment_by(&mut self, key: &[u8], delta: i64) -> Result<(), Error> {
        match self {
            Counter::HashTable(ht) => {
                if delta < 0 {
                    return Err(Error::invalid_argument("delta must not be negative"));
                }
                ht.increment(key, delta as u64)
            }
            Counter::Sketch(cms) => cms.increment_by(key, delta),
            Counter::CardinalityOnly(hll) => {
                hll.add(key);
                Ok(())
            }
        }
    }

    /// Returns the estimated/exact count for `key`. Not implemented on the
    /// cardinality-only engine.
    pub fn get(&self, key: &[u8]) -> Result<u64, Error> {
        match self {
            Counter::HashTable(ht) => Ok(ht.get(key)),
            Counter::Sketch(cms) => Ok(cms.get(key)),
            Counter::CardinalityOnly(_) => Err(Error::not_implemented(
                "get is not implemented for the cardinality-only counter",
            )),
        }
    }

    /// HyperLogLog estimate of distinct keys seen.
    pub fn cardinality(&self) -> u64 {
        match self {
            Counter::HashTable(ht) => ht.cardinality(),
            Counter::Sketch(cms) => cms.cardinality(),
            Counter::CardinalityOnly(hll) => hll.estimate(),
        }
    }

    /// Exact sum of all increments applied (cardinality-only: unsupported,
    /// returns 0 since no exact counts are tracked).
    pub fn total(&self) -> u64 {
        match self {
            Counter::HashTable(ht) => ht.total(),
            Counter::Sketch(cms) => cms.total(),
            Counter::CardinalityOnly(_) => 0,
        }
    }
}

/// Derives `(width, depth)` for a Count-Min Sketch from a memory budget.
///
/// Rules (spec): if both `width` and `depth` are unspecified, pick the
/// largest power-of-two `width <= size_bytes / (cell_bytes * 16)`, then fill
/// `depth = size_bytes / (width * cell_bytes)`. If only one is given, fill
/// the other to consume the budget. If both are given, the budget is
/// ignored.
pub fn derive_cms_dims(
    size_mb: Option<u64>,
    width: Option<usize>,
    depth: Option<usize>,
    cell_bytes: usize,
) -> Result<(usize, usize), Error> {
    if let (Some(w), Some(d)) = (width, depth) {
        return Ok((w, d));
    }

    let size_mb = size_mb.ok_or_else(|| {
        Error::invalid_argument("size_mb must be provided unless width and depth are both set")
    })?;
    let size_bytes = size_mb
        .checked_mul(1024 * 1024)
        .ok_or_else(|| Error::overflow("size_mb overflows when converted to bytes"))?;

    if let Some(w) = width {
        if w == 0 || !w.is_power_of_two() {
            return Err(Error::invalid_argument("width must be a power of two"));
        }
        let d = (size_bytes / (w as u64 * cell_bytes as u64)).max(1) as usize;
        return Ok((w, d));
    }

    if let Some(d) = depth {
        if d == 0 {
            return Err(Error::invalid_argument("depth must be at least 1"));
        }
        let w = largest_pow2_le(size_bytes / (d as u64 * cell_bytes as u64));
        if w == 0 {
            return Err(Error::budget_too_small("size_mb too small for requested depth"));
        }
        return Ok((w, d));
    }

    let w = largest_pow2_le(size_bytes / (cell_bytes as u64 * 16));
    if w == 0 {
        return Err(Error::budget_too_small("size_mb too small to derive a CMS width"));
    }
    let d = (size_bytes / (w as u64 * cell_bytes as u64)).max(1) as usize;
    Ok((w, d))
}

/// Derives the bucket count (`N`) for a [`BoundedHashTable`] from a memory
/// budget, assuming a 32-byte per-slot footprint (hash64 + key
/// pointer/length + u64 count, with alignment padding).
pub fn derive_ht_buckets(size_mb: u64) -> Result<usize, Error> {
    const BYTES_PER_SLOT: u64 = 32;
    let size_bytes = size_mb
        .checked_mul(1024 * 1024)
        .ok_or_else(|| Error::overflow("size_mb overflows when converted to bytes"))?;
    let n = largest_pow2_le(size_bytes / BYTES_PER_SLOT);
    if n == 0 {
        return Err(Error::budget_too_small(
            "size_mb too small to derive any hash table buckets",
        ));
    }
    Ok(n)
}

fn largest_pow2_le(n: u64) -> usize {
    if n == 0 {
        0
    } else {
        (1u64 << (63 - n.leading_zeros())) as usize
    }
}

/// Builds a counting engine for the given budget and feature flags.
///
/// - `need_counts = false` returns a cardinality-only counter; `get` on it
///   fails with `NotImplemented`.
/// - `need_iteration = true` with `log_counting` set is a value error (log
///   counting is CMS-only).
/// - `need_iteration = true` returns a [`BoundedHashTable`] sized to
///   `size_mb`.
/// - `need_iteration = false` returns a [`CountMinSketch`] sized to
///   `size_mb`, using the requested cell variant.
pub fn make_counter(
    size_mb: Option<u64>,
    need_iteration: bool,
    need_counts: bool,
    log_counting: Option<LogCounting>,
) -> Result<Counter, Error> {
    if !need_counts {
        return Ok(Counter::CardinalityOnly(HyperLogLog::new()));
    }

    let size_mb = size_mb
        .ok_or_else(|| Error::invalid_argument("size_mb must be provided when need_counts is true"))?;

    if need_iteration {
        if log_counting.is_some() {
            return Err(Error::invalid_argument(
                "log_counting is only supported with need_iteration = false",
            ));
        }
        Ok(Counter::HashTable(BoundedHashTable::new(size_mb, true)?))
    } else {
        let variant = log_counting
            .map(LogCounting::into_variant)
            .unwrap_or(CellVariant::Conservative);
        Ok(Counter::Sketch(CountMinSketch::new(size_mb, variant)?))
    }
}
