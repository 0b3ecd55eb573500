//! Approximate frequency counting under a fixed memory budget.
//!
//! Two counting engines share a common hashing and cardinality substrate:
//!
//! - [`hashtable::BoundedHashTable`] — an exact key→count table that evicts
//!   low-frequency keys once its load factor is exceeded.
//! - [`countmin::CountMinSketch`] — a fixed-size probabilistic matrix that
//!   retains no keys at all, offering conservative-update and logarithmic
//!   cell-width variants for smaller footprints.
//!
//! [`factory::make_counter`] is the recommended entry point: given a memory
//! budget and a few feature flags, it picks the engine that fits.
//!
//! ```rust
//! use bounter_rs::factory::{make_counter, LogCounting};
//!
//! let mut counter = make_counter(Some(1), false, true, Some(LogCounting::Log1024)).unwrap();
//! counter.increment(b"foo").unwrap();
//! counter.increment(b"foo").unwrap();
//! assert!(counter.get(b"foo").unwrap() >= 2);
//! ```

pub mod codec;
pub mod common;
pub mod countmin;
pub mod error;
pub mod factory;
pub mod hash;
pub mod hashtable;
pub mod hll;
pub(crate) mod serialize;
