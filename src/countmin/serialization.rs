//! Binary layout for [`super::CountMinSketch`]:
//!
//! ```text
//! [version: u8] [variant: u8] [width: u32] [depth: u32] [total: u64]
//! [hll: HyperLogLog] [cells: width*depth * cell_bytes]
//! ```
//!
//! The format has no separate magic number: callers are expected to know
//! which kind of sketch they're reading, the same way the teacher's
//! `countmin::serialization` preamble is read only after the caller has
//! already dispatched on a family id.

use super::CellStorage;
use super::CellVariant;
use super::CountMinSketch;
use crate::common::random::XorShift64;
use crate::error::Error;
use crate::hll::HyperLogLog;
use crate::serialize::SketchBytes;
use crate::serialize::SketchSlice;

const FORMAT_VERSION: u8 = 1;

impl CountMinSketch {
    /// Serializes this sketch to a self-contained byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = SketchBytes::with_capacity(self.size() + 32);
        out.write_u8(FORMAT_VERSION);
        out.write_u8(self.variant.tag());
        out.write_u32_le(self.width as u32);
        out.write_u32_le(self.depth as u32);
        out.write_u64_le(self.total);
        self.distinct.serialize_into(&mut out);
        match &self.cells {
            CellStorage::U32(v) => {
                for &c in v {
                    out.write_u32_le(c);
                }
            }
            CellStorage::U8(v) => out.write(v),
            CellStorage::U16(v) => {
                for &c in v {
                    out.write_u16_le(c);
                }
            }
        }
        out.into_bytes()
    }

    /// Deserializes a sketch previously produced by [`Self::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut src = SketchSlice::new(bytes);
        let version = src.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::deserial(format!(
                "unsupported CMS format version {version}"
            )));
        }
        let variant = CellVariant::from_tag(src.read_u8()?)?;
        let width = src.read_u32_le()? as usize;
        let depth = src.read_u32_le()? as usize;
        let total = src.read_u64_le()?;
        let distinct = HyperLogLog::deserialize_from(&mut src)?;

        let len = width
            .checked_mul(depth)
            .ok_or_else(|| Error::deserial("width * depth overflow"))?;
        let cells = match variant {
            CellVariant::Conservative => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(src.read_u32_le()?);
                }
                CellStorage::U32(v)
            }
            CellVariant::Log8 => CellStorage::U8(src.read_bytes(len)?.to_vec()),
            CellVariant::Log1024 | CellVariant::LogCons1024 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(src.read_u16_le()?);
                }
                CellStorage::U16(v)
            }
        };

        Ok(Self {
            variant,
            width,
            depth,
            cells,
            total,
            distinct,
            rng: XorShift64::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::CellVariant;
    use super::super::CountMinSketch;

    #[test]
    fn round_trips_conservative() {
        let mut cms = CountMinSketch::with_shape(256, 4, CellVariant::Conservative).unwrap();
        for i in 0..50u64 {
            cms.increment(format!("k{i}").as_bytes()).unwrap();
        }
        cms.increment(b"k0").unwrap();

        let bytes = cms.serialize();
        let restored = CountMinSketch::deserialize(&bytes).unwrap();

        assert_eq!(restored.width(), cms.width());
        assert_eq!(restored.depth(), cms.depth());
        assert_eq!(restored.total(), cms.total());
        assert_eq!(restored.get(b"k0"), cms.get(b"k0"));
        assert_eq!(restored.cardinality(), cms.cardinality());
    }

    #[test]
    fn round_trips_log1024() {
        let mut cms = CountMinSketch::with_shape(256, 4, CellVariant::Log1024).unwrap();
        for _ in 0..200u64 {
            cms.increment(b"hot").unwrap();
        }
        let bytes = cms.serialize();
        let restored = CountMinSketch::deserialize(&bytes).unwrap();
        assert_eq!(restored.get(b"hot"), cms.get(b"hot"));
    }

    #[test]
    fn rejects_truncated_input() {
        let cms = CountMinSketch::with_shape(64, 2, CellVariant::Conservative).unwrap();
        let bytes = cms.serialize();
        assert!(CountMinSketch::deserialize(&bytes[..bytes.len() - 10]).is_err());
    }

    #[test]
    fn rejects_bad_version() {
        let cms = CountMinSketch::with_shape(64, 2, CellVariant::Conservative).unwrap();
        let mut bytes = cms.serialize();
        bytes[0] = 0xff;
        assert!(CountMinSketch::deserialize(&bytes).is_err());
    }
}
