//! 8.9.3 Sample Group Description Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;
use crate::io::SliceReader;

/// Direct reference sample list, the 'refs' grouping entry of
/// ISO/IEC 14496-15: per-sample decoding dependencies.
#[derive(Clone, Debug, Default)]
pub struct DirectReferenceSamplesList {
    pub sample_id: u32,
    pub direct_reference_sample_ids: Vec<u32>,
}

/// One sgpd entry: decoded for groupings we understand, raw otherwise.
#[derive(Clone, Debug)]
pub enum SampleGroupEntry {
    Refs(DirectReferenceSamplesList),
    Raw(Vec<u8>),
}

/// 'sgpd'.
#[derive(Clone, Debug, Default)]
pub struct SampleGroupDescriptionBox {
    pub grouping_type: FourCC,
    pub default_length: u32,
    pub entries: Vec<SampleGroupEntry>,
}

impl SampleGroupDescriptionBox {
    /// The entry at a 1-based group description index.
    pub fn entry(&self, group_description_index: u32) -> Option<&SampleGroupEntry> {
        if group_description_index == 0 {
            return None;
        }
        self.entries.get(group_description_index as usize - 1)
    }

    /// The 'refs' entry at a 1-based index, if this is a refs grouping.
    pub fn refs_entry(&self, group_description_index: u32) -> Option<&DirectReferenceSamplesList> {
        match self.entry(group_description_index) {
            Some(SampleGroupEntry::Refs(r)) => Some(r),
            _ => None,
        }
    }
}

fn parse_refs_entry(data: &[u8]) -> io::Result<DirectReferenceSamplesList> {
    let mut r = SliceReader::new(data);
    let sample_id = u32::from_bytes(&mut r)?;
    let num = u8::from_bytes(&mut r)?;
    let mut ids = Vec::new();
    for _ in 0..num {
        ids.push(u32::from_bytes(&mut r)?);
    }
    Ok(DirectReferenceSamplesList {
        sample_id,
        direct_reference_sample_ids: ids,
    })
}

fn refs_entry_bytes(e: &DirectReferenceSamplesList) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&e.sample_id.to_be_bytes());
    v.push(e.direct_reference_sample_ids.len() as u8);
    for id in &e.direct_reference_sample_ids {
        v.extend_from_slice(&id.to_be_bytes());
    }
    v
}

impl FromBytes for SampleGroupDescriptionBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<SampleGroupDescriptionBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let stream = &mut reader;

        let grouping_type = FourCC::from_bytes(stream)?;
        let default_length = if version == 1 {
            u32::from_bytes(stream)?
        } else {
            0
        };
        if version >= 2 {
            // default_sample_description_index, unused here.
            u32::from_bytes(stream)?;
        }
        let count = u32::from_bytes(stream)?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let len = if version == 1 && default_length == 0 {
                u32::from_bytes(stream)? as u64
            } else if version == 1 {
                default_length as u64
            } else {
                // version 0 has no length field; entries run to the
                // end of the box, which only works for one entry.
                stream.left()
            };
            let data = stream.read(len)?.to_vec();
            let entry = if grouping_type == b"refs" {
                SampleGroupEntry::Refs(parse_refs_entry(&data)?)
            } else {
                SampleGroupEntry::Raw(data)
            };
            entries.push(entry);
        }
        Ok(SampleGroupDescriptionBox {
            grouping_type,
            default_length,
            entries,
        })
    }
    fn min_size() -> usize {
        20
    }
}

impl ToBytes for SampleGroupDescriptionBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        self.grouping_type.to_bytes(stream)?;
        // Always written as version 1 with per-entry lengths.
        0u32.to_bytes(stream)?;
        (self.entries.len() as u32).to_bytes(stream)?;
        for e in &self.entries {
            let data = match e {
                SampleGroupEntry::Refs(r) => refs_entry_bytes(r),
                SampleGroupEntry::Raw(d) => d.clone(),
            };
            (data.len() as u32).to_bytes(stream)?;
            stream.write(&data)?;
        }
        Ok(())
    }
}

impl BoxInfo for SampleGroupDescriptionBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"sgpd")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(2)
    }
}

impl FullBox for SampleGroupDescriptionBox {
    fn version(&self) -> Option<u8> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn sgpd_refs_round_trip() {
        let sgpd = SampleGroupDescriptionBox {
            grouping_type: FourCC::new(b"refs"),
            default_length: 0,
            entries: vec![SampleGroupEntry::Refs(DirectReferenceSamplesList {
                sample_id: 1,
                direct_reference_sample_ids: vec![2, 3],
            })],
        };
        let mut buf = MemBuffer::new();
        sgpd.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = SampleGroupDescriptionBox::from_bytes(&mut rdr).unwrap();
        let refs = back.refs_entry(1).unwrap();
        assert_eq!(refs.sample_id, 1);
        assert_eq!(refs.direct_reference_sample_ids, vec![2, 3]);
        assert!(back.refs_entry(0).is_none());
    }
}
