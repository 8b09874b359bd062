//! 8.6.5 Edit Box and 8.6.6 Edit List Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

def_box! {
    EditBox {
        boxes:  Vec<EditListBox>,
    },
    fourcc => b"edts",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    #[derive(Default)]
    EditListBox {
        entries:    ArraySized32<EditListEntry>,
    },
    fourcc => b"elst",
    version => [1, entries],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

/// Entry in an edit list.
///
/// Both entry versions parse into the widened form; the version tag is
/// recomputed on write.
///
/// Rate semantics: `(1, 0)` plays forward at normal speed, `(-1, 0)`
/// in reverse, `(0, 0)` dwells on a single sample. A fractional rate
/// `(0, f)` with `f > 0` plays forward with sample durations scaled by
/// `32768 / f`; negative fractions are rejected when parsing.
#[derive(Clone, Debug, Default)]
pub struct EditListEntry {
    /// In movie timescale units.
    pub segment_duration: u64,
    /// In media timescale units; -1 marks an empty edit.
    pub media_time: i64,
    pub media_rate_integer: i16,
    pub media_rate_fraction: i16,
}

impl EditListEntry {
    pub fn is_empty_edit(&self) -> bool {
        self.media_time == -1
    }

    pub fn is_dwell(&self) -> bool {
        self.media_rate_integer == 0 && self.media_rate_fraction == 0
    }
}

impl FromBytes for EditListEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<Self> {
        let entry = if stream.version() == 0 {
            EditListEntry {
                segment_duration: u32::from_bytes(stream)? as u64,
                media_time: i32::from_bytes(stream)? as i64,
                media_rate_integer: i16::from_bytes(stream)?,
                media_rate_fraction: i16::from_bytes(stream)?,
            }
        } else {
            EditListEntry {
                segment_duration: u64::from_bytes(stream)?,
                media_time: i64::from_bytes(stream)?,
                media_rate_integer: i16::from_bytes(stream)?,
                media_rate_fraction: i16::from_bytes(stream)?,
            }
        };
        if entry.media_rate_integer == 0 && entry.media_rate_fraction < 0 {
            return Err(ioerr!(InvalidData, "elst: negative fractional media rate"));
        }
        Ok(entry)
    }

    fn min_size() -> usize {
        12
    }
}

impl ToBytes for EditListEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        if stream.version() == 0 {
            (self.segment_duration as u32).to_bytes(stream)?;
            (self.media_time as i32).to_bytes(stream)?;
        } else {
            self.segment_duration.to_bytes(stream)?;
            self.media_time.to_bytes(stream)?;
        }
        self.media_rate_integer.to_bytes(stream)?;
        self.media_rate_fraction.to_bytes(stream)?;
        Ok(())
    }
}

impl FullBox for EditListEntry {
    fn version(&self) -> Option<u8> {
        if self.segment_duration > 0xffffffff
            || self.media_time < -0x7fffffff
            || self.media_time > 0x7fffffff
        {
            Some(1)
        } else {
            Some(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn elst_round_trip_version_0() {
        let mut elst = EditListBox::default();
        elst.entries.push(EditListEntry {
            segment_duration: 500,
            media_time: -1,
            media_rate_integer: 1,
            media_rate_fraction: 0,
        });
        elst.entries.push(EditListEntry {
            segment_duration: 300,
            media_time: 200,
            media_rate_integer: 1,
            media_rate_fraction: 0,
        });
        assert_eq!(elst.version(), Some(0));

        let mut buf = MemBuffer::new();
        elst.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = EditListBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.entries.len(), 2);
        assert!(back.entries[0].is_empty_edit());
        assert_eq!(back.entries[1].media_time, 200);
    }

    #[test]
    fn elst_wide_entry_forces_version_1() {
        let mut elst = EditListBox::default();
        elst.entries.push(EditListEntry {
            segment_duration: u32::MAX as u64 + 1,
            media_time: 0,
            media_rate_integer: 1,
            media_rate_fraction: 0,
        });
        assert_eq!(elst.version(), Some(1));

        let mut buf = MemBuffer::new();
        elst.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = EditListBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.entries[0].segment_duration, u32::MAX as u64 + 1);
    }
}
