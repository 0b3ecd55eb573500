//! Binary layout for [`super::HyperLogLog`]: `p` (1 byte) followed by
//! `2^p` raw register bytes.

use crate::error::Error;
use crate::hll::HyperLogLog;
use crate::serialize::SketchBytes;
use crate::serialize::SketchSlice;

impl HyperLogLog {
    /// Serializes this estimator's state (not a standalone tagged blob —
    /// callers embed this in their own sketch's serialized form).
    pub(crate) fn serialize_into(&self, out: &mut SketchBytes) {
        out.write_u8(self.p);
        out.write(&self.registers);
    }

    /// Reads back state written by [`Self::serialize_into`].
    pub(crate) fn deserialize_from(src: &mut SketchSlice) -> Result<Self, Error> {
        let p = src.read_u8()?;
        let m = 1usize << p;
        let registers = src.read_bytes(m)?.to_vec();
        Ok(Self { p, registers })
    }
}
