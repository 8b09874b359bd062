//! 8.3.3 Track Reference Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

/// 'tref': typed references from this track to others.
///
/// The fourcc of each child is the reference type ('thmb', 'auxl',
/// 'cdsc', ...), its payload the referenced track ids.
#[derive(Clone, Debug, Default)]
pub struct TrackReferenceBox {
    pub references: Vec<TrackReference>,
}

#[derive(Clone, Debug)]
pub struct TrackReference {
    pub reference_type: FourCC,
    pub track_ids: Vec<u32>,
}

impl TrackReferenceBox {
    /// The referenced track ids of one reference type.
    pub fn by_type(&self, reference_type: FourCC) -> Vec<u32> {
        let mut v = Vec::new();
        for r in &self.references {
            if r.reference_type == reference_type {
                v.extend_from_slice(&r.track_ids);
            }
        }
        v
    }
}

impl FromBytes for TrackReferenceBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<TrackReferenceBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;
        let mut references = Vec::new();
        while stream.left() >= 8 {
            let mut child = BoxReader::new(stream)?;
            let reference_type = child.header.fourcc;
            let cstream = &mut child;
            let mut track_ids = Vec::new();
            while cstream.left() >= 4 {
                track_ids.push(u32::from_bytes(cstream)?);
            }
            references.push(TrackReference {
                reference_type,
                track_ids,
            });
        }
        Ok(TrackReferenceBox { references })
    }
    fn min_size() -> usize {
        8
    }
}

impl ToBytes for TrackReferenceBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        for r in &self.references {
            let size = 8 + 4 * r.track_ids.len() as u32;
            size.to_bytes(stream)?;
            r.reference_type.to_bytes(stream)?;
            for &id in &r.track_ids {
                id.to_bytes(stream)?;
            }
        }
        Ok(())
    }
}

impl BoxInfo for TrackReferenceBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"tref")
    }
}

impl FullBox for TrackReferenceBox {}
