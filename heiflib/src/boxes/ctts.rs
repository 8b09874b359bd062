//! 8.6.1.3 Composition Time to Sample Box and
//! 8.6.1.4 Composition to Decode Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

/// 'ctts': per sample signed composition offsets.
///
/// Version 0 stores unsigned offsets, version 1 signed; both parse into
/// the signed form.
#[derive(Clone, Debug, Default)]
pub struct CompositionOffsetBox {
    pub entries: Vec<CompositionOffsetEntry>,
    signed: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct CompositionOffsetEntry {
    pub count: u32,
    pub offset: i32,
}

impl CompositionOffsetBox {
    /// Expand into per-sample composition offsets.
    pub fn sample_offsets(&self) -> Vec<i32> {
        let mut v = Vec::new();
        for e in &self.entries {
            for _ in 0..e.count {
                v.push(e.offset);
            }
        }
        v
    }

    /// Append one sample's offset, merging runs.
    pub fn push(&mut self, offset: i32) {
        if offset < 0 {
            self.signed = true;
        }
        if let Some(last) = self.entries.last_mut() {
            if last.offset == offset {
                last.count += 1;
                return;
            }
        }
        self.entries.push(CompositionOffsetEntry { count: 1, offset });
    }
}

impl FromBytes for CompositionOffsetBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<CompositionOffsetBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let stream = &mut reader;
        let count = u32::from_bytes(stream)?;
        let mut entries = Vec::new();
        for _ in 0..count {
            if stream.left() < 8 {
                return Err(ioerr!(UnexpectedEof, "ctts: truncated entry list"));
            }
            let count = u32::from_bytes(stream)?;
            let offset = if version == 0 {
                let v = u32::from_bytes(stream)?;
                // clamp: version 0 offsets are unsigned
                std::cmp::min(v, i32::MAX as u32) as i32
            } else {
                i32::from_bytes(stream)?
            };
            entries.push(CompositionOffsetEntry { count, offset });
        }
        Ok(CompositionOffsetBox {
            entries,
            signed: version > 0,
        })
    }
    fn min_size() -> usize {
        16
    }
}

impl ToBytes for CompositionOffsetBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let version = writer.version();
        let stream = &mut writer;
        (self.entries.len() as u32).to_bytes(stream)?;
        for e in &self.entries {
            e.count.to_bytes(stream)?;
            if version == 0 {
                (e.offset as u32).to_bytes(stream)?;
            } else {
                e.offset.to_bytes(stream)?;
            }
        }
        Ok(())
    }
}

impl BoxInfo for CompositionOffsetBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"ctts")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for CompositionOffsetBox {
    fn version(&self) -> Option<u8> {
        if self.signed || self.entries.iter().any(|e| e.offset < 0) {
            Some(1)
        } else {
            Some(0)
        }
    }
}

def_box! {
    /// 'cslg': bounds of the composition to decode shift.
    #[derive(Default)]
    CompositionToDecodeBox {
        composition_to_dts_shift:           i32,
        least_decode_to_display_delta:      i32,
        greatest_decode_to_display_delta:   i32,
        composition_start_time:             i32,
        composition_end_time:               i32,
    },
    fourcc => b"cslg",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn ctts_negative_offsets_force_version_1() {
        let mut ctts = CompositionOffsetBox::default();
        ctts.push(100);
        ctts.push(-100);
        assert_eq!(ctts.version(), Some(1));

        let mut buf = MemBuffer::new();
        ctts.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = CompositionOffsetBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.sample_offsets(), vec![100, -100]);
    }
}
