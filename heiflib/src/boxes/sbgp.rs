//! 8.9.2 Sample To Group Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

/// 'sbgp': binds runs of samples to sample group description entries.
#[derive(Clone, Debug, Default)]
pub struct SampleToGroupBox {
    pub grouping_type: FourCC,
    /// Only present in version 1 boxes.
    pub grouping_type_parameter: Option<u32>,
    pub entries: Vec<SampleToGroupEntry>,
}

#[derive(Clone, Copy, Debug)]
pub struct SampleToGroupEntry {
    pub sample_count: u32,
    /// 1-based index into the matching sgpd, 0 = no group.
    pub group_description_index: u32,
}

impl SampleToGroupBox {
    /// Decode into a per-sample group description index vector.
    ///
    /// The summed run lengths are checked against overflow before the
    /// vector is materialized.
    pub fn sample_indices(&self) -> io::Result<Vec<u32>> {
        let mut total: u64 = 0;
        for e in &self.entries {
            total += e.sample_count as u64;
            if total >= u32::MAX as u64 {
                return Err(ioerr!(InvalidData, "sbgp: sample count overflow"));
            }
        }
        let mut v = Vec::with_capacity(total as usize);
        for e in &self.entries {
            for _ in 0..e.sample_count {
                v.push(e.group_description_index);
            }
        }
        Ok(v)
    }

    /// Group description index of one sample (0-based), without
    /// materializing the table.
    pub fn group_of_sample(&self, sample: u32) -> u32 {
        let mut at = 0u64;
        for e in &self.entries {
            at += e.sample_count as u64;
            if (sample as u64) < at {
                return e.group_description_index;
            }
        }
        0
    }
}

impl FromBytes for SampleToGroupBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<SampleToGroupBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let stream = &mut reader;
        let grouping_type = FourCC::from_bytes(stream)?;
        let grouping_type_parameter = if version >= 1 {
            Some(u32::from_bytes(stream)?)
        } else {
            None
        };
        let count = u32::from_bytes(stream)?;
        let mut entries = Vec::new();
        for _ in 0..count {
            if stream.left() < 8 {
                return Err(ioerr!(UnexpectedEof, "sbgp: truncated entry list"));
            }
            entries.push(SampleToGroupEntry {
                sample_count: u32::from_bytes(stream)?,
                group_description_index: u32::from_bytes(stream)?,
            });
        }
        Ok(SampleToGroupBox {
            grouping_type,
            grouping_type_parameter,
            entries,
        })
    }
    fn min_size() -> usize {
        20
    }
}

impl ToBytes for SampleToGroupBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        self.grouping_type.to_bytes(stream)?;
        if let Some(p) = self.grouping_type_parameter {
            p.to_bytes(stream)?;
        }
        (self.entries.len() as u32).to_bytes(stream)?;
        for e in &self.entries {
            e.sample_count.to_bytes(stream)?;
            e.group_description_index.to_bytes(stream)?;
        }
        Ok(())
    }
}

impl BoxInfo for SampleToGroupBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"sbgp")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for SampleToGroupBox {
    fn version(&self) -> Option<u8> {
        if self.grouping_type_parameter.is_some() {
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
    fn sbgp_round_trip_and_decode() {
        let sbgp = SampleToGroupBox {
            grouping_type: FourCC::new(b"refs"),
            grouping_type_parameter: None,
            entries: vec![
                SampleToGroupEntry {
                    sample_count: 2,
                    group_description_index: 1,
                },
                SampleToGroupEntry {
                    sample_count: 1,
                    group_description_index: 0,
                },
            ],
        };
        let mut buf = MemBuffer::new();
        sbgp.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = SampleToGroupBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.grouping_type, b"refs");
        assert_eq!(back.sample_indices().unwrap(), vec![1, 1, 0]);
        assert_eq!(back.group_of_sample(2), 0);
    }

    #[test]
    fn sbgp_overflow_guard() {
        let sbgp = SampleToGroupBox {
            grouping_type: FourCC::new(b"refs"),
            grouping_type_parameter: None,
            entries: vec![
                SampleToGroupEntry {
                    sample_count: u32::MAX - 1,
                    group_description_index: 1,
                },
                SampleToGroupEntry {
                    sample_count: u32::MAX - 1,
                    group_description_index: 2,
                },
            ],
        };
        assert!(sbgp.sample_indices().is_err());
    }
}
