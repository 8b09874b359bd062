//! Metadata sample entries (ISO/IEC 14496-12 12.9).
use std::io;

use crate::boxes::prelude::*;

/// 'mett' / 'tmet' / 'metx' sample entry for (timed) metadata tracks.
///
/// The zero terminated strings after the sample entry header differ in
/// meaning per fourcc but share the wire shape; they are kept in read
/// order.
#[derive(Clone, Debug)]
pub struct MetadataSampleEntry {
    pub fourcc: FourCC,
    pub data_reference_index: u16,
    pub strings: Vec<ZString>,
    pub boxes: Vec<HeifBox>,
}
pub type TextMetadataSampleEntry = MetadataSampleEntry;
pub type XmlMetadataSampleEntry = MetadataSampleEntry;

impl Default for MetadataSampleEntry {
    fn default() -> MetadataSampleEntry {
        MetadataSampleEntry {
            fourcc: FourCC::new(b"mett"),
            data_reference_index: 1,
            strings: Vec::new(),
            boxes: Vec::new(),
        }
    }
}

impl MetadataSampleEntry {
    /// The mime format string ('mett': second string, after content_encoding).
    pub fn mime_format(&self) -> Option<&ZString> {
        self.strings.last()
    }
}

impl FromBytes for MetadataSampleEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<MetadataSampleEntry> {
        let mut reader = BoxReader::new(stream)?;
        let fourcc = reader.header.fourcc;
        let stream = &mut reader;
        stream.skip(6)?;
        let data_reference_index = u16::from_bytes(stream)?;
        let mut strings = Vec::new();
        // Strings up to the first contained box (peek for a plausible size).
        while stream.left() > 0 {
            if stream.left() >= 8 {
                let peeked = stream.peek(8)?;
                let possible_size = u32::from_be_bytes([peeked[0], peeked[1], peeked[2], peeked[3]]);
                let printable = peeked[4..8].iter().all(|&c| c >= b' ' && c <= b'~');
                if possible_size as u64 <= stream.left() && possible_size >= 8 && printable {
                    break;
                }
            }
            strings.push(ZString::from_bytes(stream)?);
        }
        let boxes = Vec::<HeifBox>::from_bytes(stream)?;
        Ok(MetadataSampleEntry {
            fourcc,
            data_reference_index,
            strings,
            boxes,
        })
    }
    fn min_size() -> usize {
        16
    }
}

impl ToBytes for MetadataSampleEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        stream.skip(6)?;
        self.data_reference_index.to_bytes(stream)?;
        for s in &self.strings {
            s.to_bytes(stream)?;
        }
        self.boxes.to_bytes(stream)?;
        Ok(())
    }
}

impl BoxInfo for MetadataSampleEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        self.fourcc
    }
}

impl FullBox for MetadataSampleEntry {}
