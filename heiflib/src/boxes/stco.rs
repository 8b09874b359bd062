//! 8.7.5 Chunk Offset Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

/// Implements both "stco" and "co64".
///
/// Offsets are kept as u64; on write the box decides by value whether
/// it needs the large form.
#[derive(Clone, Debug)]
pub struct ChunkOffsetBox {
    pub fourcc: FourCC,
    pub entries: Vec<u64>,
    offset: i64,
}
pub type ChunkLargeOffsetBox = ChunkOffsetBox;

impl ChunkOffsetBox {
    /// Add a global extra offset to all entries in this box.
    ///
    /// The offset is applied when serializing the box.
    pub fn add_offset(&mut self, move_offset: i64) {
        self.offset = move_offset;
    }

    pub fn push(&mut self, offset: u64) {
        self.entries.push(offset);
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.entries.get(index).copied()
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    fn is_large(&self) -> bool {
        let offset = self.offset;
        self.entries
            .iter()
            .any(|&e| e as i64 + offset > u32::MAX as i64)
    }
}

impl Default for ChunkOffsetBox {
    fn default() -> Self {
        ChunkOffsetBox {
            fourcc: FourCC::new(b"stco"),
            entries: Vec::new(),
            offset: 0,
        }
    }
}

impl FromBytes for ChunkOffsetBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ChunkOffsetBox> {
        let mut reader = BoxReader::new(stream)?;
        let fourcc = reader.header.fourcc;
        let stream = &mut reader;

        let count = u32::from_bytes(stream)?;
        let large = fourcc == b"co64";
        let mut entries = Vec::new();
        for _ in 0..count {
            let e = if large {
                u64::from_bytes(stream)?
            } else {
                u32::from_bytes(stream)? as u64
            };
            entries.push(e);
        }

        Ok(ChunkOffsetBox {
            fourcc,
            entries,
            offset: 0,
        })
    }

    fn min_size() -> usize {
        16
    }
}

impl ToBytes for ChunkOffsetBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        let large = self.is_large() || self.fourcc == b"co64";
        (self.entries.len() as u32).to_bytes(stream)?;
        for &entry in &self.entries {
            let entry = (entry as i64 + self.offset) as u64;
            if large {
                entry.to_bytes(stream)?;
            } else {
                (entry as u32).to_bytes(stream)?;
            }
        }
        Ok(())
    }
}

impl BoxInfo for ChunkOffsetBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        // Decide by value: any offset beyond 32 bits needs co64.
        if self.is_large() {
            FourCC::new(b"co64")
        } else {
            self.fourcc
        }
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for ChunkOffsetBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn large_offsets_switch_to_co64() {
        let mut stco = ChunkOffsetBox::default();
        stco.push(16);
        stco.push(u32::MAX as u64 + 10);

        let mut buf = MemBuffer::new();
        stco.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        assert_eq!(&v[4..8], b"co64");

        let mut rdr = SliceReader::new(&v);
        let back = ChunkOffsetBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.entries, vec![16, u32::MAX as u64 + 10]);
    }

    #[test]
    fn small_offsets_stay_stco() {
        let mut stco = ChunkOffsetBox::default();
        stco.push(4096);
        let mut buf = MemBuffer::new();
        stco.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        assert_eq!(&v[4..8], b"stco");
        let mut rdr = SliceReader::new(&v);
        let back = ChunkOffsetBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.get(0), Some(4096));
    }
}
