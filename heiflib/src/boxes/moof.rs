//! Movie fragments (ISO/IEC 14496-12:2015(E) 8.8).
//!
//! Only what sample-table reconstruction needs: the fragment
//! containers, the fragment header defaults, and track runs.
use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{MovieFragmentHeaderBox, TrackFragmentBaseMediaDecodeTimeBox};

def_box! {
    MovieFragmentBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"moof",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl MovieFragmentBox {
    declare_box_methods_opt!(MovieFragmentHeaderBox, fragment_header, fragment_header_mut);

    pub fn track_fragments(&self) -> Vec<&TrackFragmentBox> {
        iter_box!(self, TrackFragmentBox).collect()
    }
}

def_box! {
    TrackFragmentBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"traf",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl TrackFragmentBox {
    declare_box_methods_opt!(TrackFragmentHeaderBox, fragment_header, fragment_header_mut);
    declare_box_methods_opt!(TrackFragmentBaseMediaDecodeTimeBox, base_media_decode_time, base_media_decode_time_mut);

    pub fn track_runs(&self) -> Vec<&TrackRunBox> {
        iter_box!(self, TrackRunBox).collect()
    }
}

/// 'tfhd'. All fields after the track id are conditional on flags.
#[derive(Clone, Debug, Default)]
pub struct TrackFragmentHeaderBox {
    pub flags: u32,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

impl TrackFragmentHeaderBox {
    pub fn duration_is_empty(&self) -> bool {
        self.flags & 0x10000 != 0
    }
    pub fn default_base_is_moof(&self) -> bool {
        self.flags & 0x20000 != 0
    }
}

impl FromBytes for TrackFragmentHeaderBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<TrackFragmentHeaderBox> {
        let mut reader = BoxReader::new(stream)?;
        let flags = reader.header.flags;
        let stream = &mut reader;
        let track_id = u32::from_bytes(stream)?;
        let base_data_offset = if flags & 0x1 != 0 {
            Some(u64::from_bytes(stream)?)
        } else {
            None
        };
        let sample_description_index = if flags & 0x2 != 0 {
            Some(u32::from_bytes(stream)?)
        } else {
            None
        };
        let default_sample_duration = if flags & 0x8 != 0 {
            Some(u32::from_bytes(stream)?)
        } else {
            None
        };
        let default_sample_size = if flags & 0x10 != 0 {
            Some(u32::from_bytes(stream)?)
        } else {
            None
        };
        let default_sample_flags = if flags & 0x20 != 0 {
            Some(u32::from_bytes(stream)?)
        } else {
            None
        };
        Ok(TrackFragmentHeaderBox {
            flags,
            track_id,
            base_data_offset,
            sample_description_index,
            default_sample_duration,
            default_sample_size,
            default_sample_flags,
        })
    }
    fn min_size() -> usize {
        16
    }
}

impl ToBytes for TrackFragmentHeaderBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        self.track_id.to_bytes(stream)?;
        if let Some(v) = self.base_data_offset {
            v.to_bytes(stream)?;
        }
        if let Some(v) = self.sample_description_index {
            v.to_bytes(stream)?;
        }
        if let Some(v) = self.default_sample_duration {
            v.to_bytes(stream)?;
        }
        if let Some(v) = self.default_sample_size {
            v.to_bytes(stream)?;
        }
        if let Some(v) = self.default_sample_flags {
            v.to_bytes(stream)?;
        }
        Ok(())
    }
}

impl BoxInfo for TrackFragmentHeaderBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"tfhd")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for TrackFragmentHeaderBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
    fn flags(&self) -> u32 {
        let mut flags = self.flags & 0x30000;
        if self.base_data_offset.is_some() {
            flags |= 0x1;
        }
        if self.sample_description_index.is_some() {
            flags |= 0x2;
        }
        if self.default_sample_duration.is_some() {
            flags |= 0x8;
        }
        if self.default_sample_size.is_some() {
            flags |= 0x10;
        }
        if self.default_sample_flags.is_some() {
            flags |= 0x20;
        }
        flags
    }
}

/// One sample of a track run.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrackRunEntry {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i64>,
}

/// 'trun'.
#[derive(Clone, Debug, Default)]
pub struct TrackRunBox {
    pub flags: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub entries: Vec<TrackRunEntry>,
}

impl TrackRunBox {
    pub const SAMPLE_DURATION_PRESENT: u32 = 0x100;
    pub const SAMPLE_SIZE_PRESENT: u32 = 0x200;
    pub const SAMPLE_FLAGS_PRESENT: u32 = 0x400;
    pub const SAMPLE_CTS_OFFSETS_PRESENT: u32 = 0x800;
}

impl FromBytes for TrackRunBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<TrackRunBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let flags = reader.header.flags;
        let stream = &mut reader;

        let sample_count = u32::from_bytes(stream)?;
        let data_offset = if flags & 0x1 != 0 {
            Some(i32::from_bytes(stream)?)
        } else {
            None
        };
        let first_sample_flags = if flags & 0x4 != 0 {
            Some(u32::from_bytes(stream)?)
        } else {
            None
        };
        let mut entries = Vec::new();
        for _ in 0..sample_count {
            let duration = if flags & TrackRunBox::SAMPLE_DURATION_PRESENT != 0 {
                Some(u32::from_bytes(stream)?)
            } else {
                None
            };
            let size = if flags & TrackRunBox::SAMPLE_SIZE_PRESENT != 0 {
                Some(u32::from_bytes(stream)?)
            } else {
                None
            };
            let sflags = if flags & TrackRunBox::SAMPLE_FLAGS_PRESENT != 0 {
                Some(u32::from_bytes(stream)?)
            } else {
                None
            };
            let composition_time_offset = if flags & TrackRunBox::SAMPLE_CTS_OFFSETS_PRESENT != 0 {
                Some(if version == 0 {
                    u32::from_bytes(stream)? as i64
                } else {
                    i32::from_bytes(stream)? as i64
                })
            } else {
                None
            };
            entries.push(TrackRunEntry {
                duration,
                size,
                flags: sflags,
                composition_time_offset,
            });
        }
        Ok(TrackRunBox {
            flags,
            data_offset,
            first_sample_flags,
            entries,
        })
    }
    fn min_size() -> usize {
        16
    }
}

impl ToBytes for TrackRunBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let version = writer.version();
        let stream = &mut writer;
        (self.entries.len() as u32).to_bytes(stream)?;
        if let Some(v) = self.data_offset {
            v.to_bytes(stream)?;
        }
        if let Some(v) = self.first_sample_flags {
            v.to_bytes(stream)?;
        }
        for e in &self.entries {
            if let Some(v) = e.duration {
                v.to_bytes(stream)?;
            }
            if let Some(v) = e.size {
                v.to_bytes(stream)?;
            }
            if let Some(v) = e.flags {
                v.to_bytes(stream)?;
            }
            if let Some(v) = e.composition_time_offset {
                if version == 0 {
                    (v as u32).to_bytes(stream)?;
                } else {
                    (v as i32).to_bytes(stream)?;
                }
            }
        }
        Ok(())
    }
}

impl BoxInfo for TrackRunBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"trun")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for TrackRunBox {
    fn version(&self) -> Option<u8> {
        let negative = self
            .entries
            .iter()
            .any(|e| e.composition_time_offset.map(|o| o < 0).unwrap_or(false));
        if negative {
            Some(1)
        } else {
            Some(0)
        }
    }
    fn flags(&self) -> u32 {
        let mut flags = self.flags;
        if self.data_offset.is_some() {
            flags |= 0x1;
        }
        if self.first_sample_flags.is_some() {
            flags |= 0x4;
        }
        flags
    }
}
