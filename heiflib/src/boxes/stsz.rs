//! 8.7.3 Sample Size Boxes (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

/// 'stsz': per-sample sizes, or one uniform size.
#[derive(Clone, Debug, Default)]
pub struct SampleSizeBox {
    pub sample_size: u32,
    pub count: u32,
    pub entries: Vec<u32>,
}

impl SampleSizeBox {
    /// Size of sample `index` (0-based).
    pub fn size(&self, index: usize) -> Option<u32> {
        if self.sample_size != 0 {
            if (index as u32) < self.count {
                Some(self.sample_size)
            } else {
                None
            }
        } else {
            self.entries.get(index).copied()
        }
    }

    /// Number of samples.
    pub fn sample_count(&self) -> u32 {
        if self.sample_size != 0 {
            self.count
        } else {
            self.entries.len() as u32
        }
    }

    pub fn push(&mut self, size: u32) {
        self.entries.push(size);
        self.count = self.entries.len() as u32;
    }

    /// Sum of all sample sizes.
    pub fn total_size(&self) -> u64 {
        if self.sample_size != 0 {
            self.sample_size as u64 * self.count as u64
        } else {
            self.entries.iter().map(|&s| s as u64).sum()
        }
    }
}

impl FromBytes for SampleSizeBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<SampleSizeBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;
        let sample_size = u32::from_bytes(stream)?;
        let count = u32::from_bytes(stream)?;
        let mut entries = Vec::new();
        if sample_size == 0 {
            for _ in 0..count {
                if stream.left() < 4 {
                    return Err(ioerr!(UnexpectedEof, "stsz: truncated size table"));
                }
                entries.push(u32::from_bytes(stream)?);
            }
        }
        Ok(SampleSizeBox {
            sample_size,
            count,
            entries,
        })
    }
    fn min_size() -> usize {
        20
    }
}

impl ToBytes for SampleSizeBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        self.sample_size.to_bytes(stream)?;
        if self.sample_size != 0 {
            self.count.to_bytes(stream)?;
        } else {
            (self.entries.len() as u32).to_bytes(stream)?;
            for &e in &self.entries {
                e.to_bytes(stream)?;
            }
        }
        Ok(())
    }
}

impl BoxInfo for SampleSizeBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"stsz")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for SampleSizeBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
}

/// 'stz2': compact sample sizes (4, 8 or 16 bit fields).
#[derive(Clone, Debug, Default)]
pub struct CompactSampleSizeBox {
    pub field_size: u8,
    pub entries: Vec<u32>,
}

impl CompactSampleSizeBox {
    /// Widen into a plain SampleSizeBox.
    pub fn to_sample_size_box(&self) -> SampleSizeBox {
        SampleSizeBox {
            sample_size: 0,
            count: self.entries.len() as u32,
            entries: self.entries.clone(),
        }
    }
}

impl FromBytes for CompactSampleSizeBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<CompactSampleSizeBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;
        stream.skip(3)?;
        let field_size = u8::from_bytes(stream)?;
        let count = u32::from_bytes(stream)?;
        let mut entries = Vec::new();
        match field_size {
            4 => {
                for _ in 0..(count + 1) / 2 {
                    let b = u8::from_bytes(stream)?;
                    entries.push((b >> 4) as u32);
                    if entries.len() < count as usize {
                        entries.push((b & 0xf) as u32);
                    }
                }
            },
            8 => {
                for _ in 0..count {
                    entries.push(u8::from_bytes(stream)? as u32);
                }
            },
            16 => {
                for _ in 0..count {
                    entries.push(u16::from_bytes(stream)? as u32);
                }
            },
            sz => return Err(ioerr!(InvalidData, "stz2: invalid field size {}", sz)),
        }
        Ok(CompactSampleSizeBox { field_size, entries })
    }
    fn min_size() -> usize {
        20
    }
}

impl ToBytes for CompactSampleSizeBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        stream.skip(3)?;
        self.field_size.to_bytes(stream)?;
        (self.entries.len() as u32).to_bytes(stream)?;
        match self.field_size {
            4 => {
                let mut iter = self.entries.chunks(2);
                while let Some(pair) = iter.next() {
                    let hi = (pair[0] & 0xf) as u8;
                    let lo = if pair.len() > 1 { (pair[1] & 0xf) as u8 } else { 0 };
                    ((hi << 4) | lo).to_bytes(stream)?;
                }
            },
            8 => {
                for &e in &self.entries {
                    (e as u8).to_bytes(stream)?;
                }
            },
            16 => {
                for &e in &self.entries {
                    (e as u16).to_bytes(stream)?;
                }
            },
            sz => return Err(ioerr!(InvalidData, "stz2: invalid field size {}", sz)),
        }
        Ok(())
    }
}

impl BoxInfo for CompactSampleSizeBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"stz2")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for CompactSampleSizeBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn stsz_uniform() {
        let stsz = SampleSizeBox {
            sample_size: 1000,
            count: 5,
            entries: Vec::new(),
        };
        assert_eq!(stsz.size(4), Some(1000));
        assert_eq!(stsz.size(5), None);
        assert_eq!(stsz.total_size(), 5000);
    }

    #[test]
    fn stz2_nibbles_round_trip() {
        let b = CompactSampleSizeBox {
            field_size: 4,
            entries: vec![1, 2, 3],
        };
        let mut buf = MemBuffer::new();
        b.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = CompactSampleSizeBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.entries, vec![1, 2, 3]);
    }
}
