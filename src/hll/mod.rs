//! HyperLogLog cardinality estimator shared by every counting engine.
//!
//! Every CMS and hash-table variant feeds each key it sees into an
//! [`HyperLogLog`] alongside its own counting structure, so `cardinality()`
//! reports the true distinct-key count of the stream even once the CMS has
//! lost individual keys to hash collisions, or the hash table has evicted
//! them under memory pressure.
//!
//! # Example
//!
//! ```rust
//! use bounter_rs::hll::HyperLogLog;
//!
//! let mut hll = HyperLogLog::new();
//! for i in 0..2000 {
//!     hll.add(format!("key-{i}").as_bytes());
//! }
//! let estimate = hll.estimate();
//! assert!((estimate as f64 - 2000.0).abs() < 2000.0 * 0.05);
//! ```

mod serialization;

use crate::error::Error;
use crate::hash::hash128;

/// `p = 15` gives 32 Ki registers and a standard error of about 1%, matching
/// the `HyperLogLog(15)` used throughout the original `bounter` sources.
pub const DEFAULT_P: u8 = 15;

/// A HyperLogLog cardinality estimator.
///
/// Registers are stored one byte each rather than packed 6-bit, trading a
/// few KiB of memory for simplicity: at `p = 15` that is 32 KiB either way,
/// which is negligible next to the CMS/HT buffers this sketch rides along
/// with.
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    p: u8,
    registers: Vec<u8>,
}

impl HyperLogLog {
    /// Creates an estimator using [`DEFAULT_P`] registers.
    pub fn new() -> Self {
        Self::with_p(DEFAULT_P)
    }

    /// Creates an estimator with an explicit `p` (4..=24 is a sane range;
    /// `p = 15` is what every engine in this crate actually uses).
    pub fn with_p(p: u8) -> Self {
        let m = 1usize << p;
        Self {
            p,
            registers: vec![0u8; m],
        }
    }

    /// Number of registers (`2^p`).
    pub fn num_registers(&self) -> usize {
        self.registers.len()
    }

    /// Feeds a byte string into the estimator.
    pub fn add(&mut self, bytes: &[u8]) {
        let (_, h_high) = hash128(bytes);
        self.add_hash(h_high);
    }

    /// Feeds a precomputed 64-bit hash into the estimator directly. Exposed
    /// so CMS/HT engines that already computed a hash for their own bucket
    /// lookup don't need to hash the key a second time.
    pub fn add_hash(&mut self, h: u64) {
        let p = self.p as u32;
        let idx = (h >> (64 - p)) as usize;
        let w = (h << p) | (1u64 << (p - 1));
        let run = w.leading_zeros() as u8 + 1;
        if run > self.registers[idx] {
            self.registers[idx] = run;
        }
    }

    /// Returns the cardinality estimate.
    pub fn estimate(&self) -> u64 {
        let m = self.registers.len() as f64;
        let alpha = alpha(self.registers.len());

        let mut sum = 0.0f64;
        let mut zeros = 0u32;
        for &r in &self.registers {
            sum += 2f64.powi(-(r as i32));
            if r == 0 {
                zeros += 1;
            }
        }

        let raw = alpha * m * m / sum;

        let estimate = if raw <= 2.5 * m && zeros > 0 {
            // Small-range correction: linear counting.
            m * (m / zeros as f64).ln()
        } else if raw <= (1.0 / 30.0) * (1u64 << 32) as f64 {
            raw
        } else {
            // Large-range correction for estimates approaching 2^32.
            let two32 = (1u64 << 32) as f64;
            -two32 * (1.0 - raw / two32).ln()
        };

        estimate.round().max(0.0) as u64
    }

    /// Merges another estimator's registers into this one (register-wise
    /// max). Both estimators must have been created with the same `p`.
    pub fn merge(&mut self, other: &Self) -> Result<(), Error> {
        if self.p != other.p {
            return Err(Error::incompatible_merge(format!(
                "HyperLogLog p mismatch: {} vs {}",
                self.p, other.p
            )));
        }
        for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
        Ok(())
    }
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Bias-correction constant from the original HyperLogLog paper.
fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_estimate_is_zero() {
        let hll = HyperLogLog::new();
        assert_eq!(hll.estimate(), 0);
    }

    #[test]
    fn distinct_keys_are_estimated_within_tolerance() {
        let mut hll = HyperLogLog::new();
        for i in 0..5000u64 {
            hll.add(format!("item-{i}").as_bytes());
        }
        let estimate = hll.estimate() as f64;
        let err = (estimate - 5000.0).abs() / 5000.0;
        assert!(err < 0.05, "relative error {err} too high");
    }

    #[test]
    fn repeated_keys_do_not_inflate_estimate() {
        let mut hll = HyperLogLog::new();
        for _ in 0..10_000 {
            hll.add(b"same-key");
        }
        assert_eq!(hll.estimate(), 1);
    }

    #[test]
    fn merge_of_disjoint_sets_approximates_union() {
        let mut a = HyperLogLog::new();
        let mut b = HyperLogLog::new();
        for i in 0..2000u64 {
            a.add(format!("a-{i}").as_bytes());
        }
        for i in 0..2000u64 {
            b.add(format!("b-{i}").as_bytes());
        }
        a.merge(&b).unwrap();
        let estimate = a.estimate() as f64;
        let err = (estimate - 4000.0).abs() / 4000.0;
        assert!(err < 0.05, "relative error {err} too high");
    }

    #[test]
    fn merge_rejects_mismatched_p() {
        let mut a = HyperLogLog::with_p(10);
        let b = HyperLogLog::with_p(12);
        assert!(a.merge(&b).is_err());
    }
}
