//! 8.5.2 Sample Description Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 'stsd': the codec specific sample entries of a track.
    #[derive(Default)]
    SampleDescriptionBox {
        entries:    ArraySized32<HeifBox>,
    },
    fourcc => b"stsd",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl SampleDescriptionBox {
    /// The fourcc of the n'th (1-based) sample entry.
    pub fn entry_type(&self, index: u16) -> Option<FourCC> {
        if index == 0 {
            return None;
        }
        (*self.entries).get(index as usize - 1).map(|e| e.fourcc())
    }
}

/// The fixed part of a VisualSampleEntry, shared by all video sample
/// entry types.
#[derive(Clone, Debug)]
pub struct VisualSampleEntryFields {
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
    pub horiz_dpi: FixedFloat16_16,
    pub vert_dpi: FixedFloat16_16,
    pub frame_count: u16,
    pub depth: u16,
}

impl Default for VisualSampleEntryFields {
    fn default() -> VisualSampleEntryFields {
        VisualSampleEntryFields {
            data_reference_index: 1,
            width: 0,
            height: 0,
            horiz_dpi: FixedFloat16_16(0x480000),
            vert_dpi: FixedFloat16_16(0x480000),
            frame_count: 1,
            depth: 0x18,
        }
    }
}

impl FromBytes for VisualSampleEntryFields {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<VisualSampleEntryFields> {
        stream.skip(6)?;
        let data_reference_index = u16::from_bytes(stream)?;
        stream.skip(16)?;
        let width = u16::from_bytes(stream)?;
        let height = u16::from_bytes(stream)?;
        let horiz_dpi = FixedFloat16_16::from_bytes(stream)?;
        let vert_dpi = FixedFloat16_16::from_bytes(stream)?;
        stream.skip(4)?;
        let frame_count = u16::from_bytes(stream)?;
        // compressor name, fixed 32 byte pascal string.
        stream.skip(32)?;
        let depth = u16::from_bytes(stream)?;
        // pre_defined = -1
        stream.skip(2)?;
        Ok(VisualSampleEntryFields {
            data_reference_index,
            width,
            height,
            horiz_dpi,
            vert_dpi,
            frame_count,
            depth,
        })
    }
    fn min_size() -> usize {
        78
    }
}

impl ToBytes for VisualSampleEntryFields {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        stream.skip(6)?;
        self.data_reference_index.to_bytes(stream)?;
        stream.skip(16)?;
        self.width.to_bytes(stream)?;
        self.height.to_bytes(stream)?;
        self.horiz_dpi.to_bytes(stream)?;
        self.vert_dpi.to_bytes(stream)?;
        stream.skip(4)?;
        self.frame_count.to_bytes(stream)?;
        stream.skip(32)?;
        self.depth.to_bytes(stream)?;
        (-1i16).to_bytes(stream)?;
        Ok(())
    }
}
