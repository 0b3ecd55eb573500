//! MurmurHash3-x64-128 hashing substrate shared by every counting engine.
//!
//! All engines hash raw key bytes directly through [`hash128`]; the
//! [`MurmurHash3X64128`] `Hasher` wrapper exists for the rare case where
//! generic code only has a `T: Hash` bound rather than raw bytes.

use std::hash::Hasher;

/// Default seed used across this crate unless a caller asks for another one.
pub const DEFAULT_SEED: u32 = 0;

/// Hashes `bytes` with MurmurHash3-x64-128 under the default seed, returning
/// the low and high 64-bit halves.
#[inline]
pub fn hash128(bytes: &[u8]) -> (u64, u64) {
    hash128_with_seed(bytes, DEFAULT_SEED)
}

/// Hashes `bytes` with MurmurHash3-x64-128 under an explicit seed.
#[inline]
pub fn hash128_with_seed(bytes: &[u8], seed: u32) -> (u64, u64) {
    mur3::murmurhash3_x64_128(bytes, seed)
}

/// A [`Hasher`] wrapping MurmurHash3-x64-128, for hashing generic `T: Hash`
/// values rather than raw byte slices.
#[derive(Debug, Clone)]
pub struct MurmurHash3X64128 {
    seed: u32,
    buf: Vec<u8>,
}

impl MurmurHash3X64128 {
    /// Creates a hasher using the crate's default seed.
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Creates a hasher using an explicit seed.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            seed,
            buf: Vec::new(),
        }
    }

    /// Returns both 64-bit halves of the digest.
    pub fn finish128(&self) -> (u64, u64) {
        hash128_with_seed(&self.buf, self.seed)
    }
}

impl Default for MurmurHash3X64128 {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for MurmurHash3X64128 {
    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        self.finish128().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash128_is_deterministic() {
        let a = hash128(b"foo");
        let b = hash128(b"foo");
        assert_eq!(a, b);
    }

    #[test]
    fn hash128_distinguishes_inputs() {
        assert_ne!(hash128(b"foo"), hash128(b"bar"));
    }

    #[test]
    fn str_and_bytes_forms_collide() {
        let key = "foo";
        assert_eq!(hash128(key.as_bytes()), hash128(b"foo"));
    }

    #[test]
    fn hasher_matches_direct_call() {
        let mut hasher = MurmurHash3X64128::new();
        hasher.write(b"hello world");
        assert_eq!(hasher.finish128(), hash128(b"hello world"));
    }

    #[test]
    fn matches_known_test_vectors_across_tail_lengths() {
        // Covers remainders of 0, <8, =8, and >8 bytes in the final 16-byte block.
        let (h1, h2) = hash128(b"The quick brown fox jumps over the lazy dog");
        assert_eq!(h1, 0xe34bbc7bbc071b6c);
        assert_eq!(h2, 0x7a433ca9c49a9347);

        let (h1, h2) = hash128(b"The quick brown fox jumps over the lazy eog");
        assert_eq!(h1, 0x362108102c62d1c9);
        assert_eq!(h2, 0x3285cd100292b305);

        let (h1, h2) = hash128(b"The quick brown fox jumps over the lazy dogdogdog");
        assert_eq!(h1, 0x9c8205300e612fc4);
        assert_eq!(h2, 0xcbc0af6136aa3df9);

        let (h1, h2) = hash128(b"The quick brown fox jumps over the lazy1");
        assert_eq!(h1, 0xe3301a827e5cdfe3);
        assert_eq!(h2, 0xbdbf05f8da0f0392);

        let (h1, h2) = hash128(b"The quick brown fox jumps over t");
        assert_eq!(h1, 0xdf6af91bb29bdacf);
        assert_eq!(h2, 0x91a341c58df1f3a6);

        let key = [
            0x54, 0x68, 0x65, 0x20, 0x71, 0x75, 0x69, 0x63, 0x6b, 0x20, 0x62, 0x72, 0x6f, 0x77,
            0x6e, 0x20, 0x66, 0x6f, 0x78, 0x20, 0x6a, 0x75, 0x6d, 0x70, 0x73, 0x20, 0x6f, 0x76,
            0x65, 0x72, 0x20, 0x74, 0x68, 0x65, 0x20, 0x6c, 0x61, 0x7a, 0x79, 0x20, 0x64, 0x6f,
            0x67, 0xff, 0x64, 0x6f, 0x67, 0x00,
        ];
        let (h1, h2) = hash128(&key);
        assert_eq!(h1, 0xe88abda785929c9e);
        assert_eq!(h2, 0x96b98587cacc83d6);
    }
}
