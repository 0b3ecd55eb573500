//! Logarithmic counter codec used by the `log8` and `log1024` Count-Min
//! Sketch cell variants.
//!
//! A log counter stores an *encoded* value in a small integer cell (`u8` for
//! log8, `u16` for log1024) that represents a much larger decoded count by
//! splitting it into an exponent and a mantissa once it grows past a linear
//! region. The encode/decode arithmetic here is ported unchanged from the
//! `log_encode`/`log_decode` methods of the original `bounter`
//! `CountMinSketch` (`shift = 2` for log8, `shift = 9` for log1024).

use crate::common::random::RandomSource;

/// Shift used by the `log8` cell variant (`u8` cells).
pub const LOG8_SHIFT: u32 = 2;

/// Shift used by the `log1024` and `logcons1024` cell variants (`u16` cells).
pub const LOG1024_SHIFT: u32 = 9;

/// Returns `base = 1 << (shift + 1)`: the size of one exponent "step" and
/// the boundary of the linear region (`2 * base`).
#[inline]
pub fn base_for_shift(shift: u32) -> u64 {
    1u64 << (shift + 1)
}

/// Decodes an encoded cell value back to an approximate count.
pub fn decode(shift: u32, encoded: u64) -> u64 {
    let base = base_for_shift(shift);
    if encoded <= 2 * base {
        return encoded;
    }
    let exponent = (encoded >> (shift + 1)) + shift as u64;
    let mantissa = encoded % base;
    let step = 1u64 << exponent;
    step + mantissa * step / base
}

/// Encodes an integer count into its log-counter cell representation.
///
/// Used for the probabilistic increment's linear region and for debugging;
/// the steady-state hot path only ever bumps a cell by one encoded unit at
/// a time (see [`probabilistic_bump`]).
pub fn encode(shift: u32, value: u64) -> u64 {
    let base = base_for_shift(shift);
    if value <= 2 * base {
        return value;
    }
    let base_bits = 63 - value.leading_zeros() as u64;
    let log_value_base = (base_bits - shift as u64) * base;
    let remainder = (value >> (base_bits - shift as u64 - 1)) - base;
    log_value_base + remainder
}

/// Applies the probabilistic increment rule to one log-counter cell,
/// returning the new cell value.
///
/// In the linear region (`cell < 2*base`) the bump is deterministic. Past
/// that, the cell is incremented with probability `2^-(cell/base - 1)`,
/// drawn from `rng`.
pub fn probabilistic_bump(shift: u32, cell: u64, rng: &mut dyn RandomSource) -> u64 {
    let base = base_for_shift(shift);
    if cell < 2 * base {
        return cell + 1;
    }
    let mask = (1u64 << (cell / base - 1)) - 1;
    let r = rng.next_u64();
    if r & mask == 0 {
        cell + 1
    } else {
        cell
    }
}
