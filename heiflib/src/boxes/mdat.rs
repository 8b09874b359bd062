//! 8.1.1 Media Data Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

/// 'mdat'.
///
/// When read from a file the payload is not loaded into memory; only
/// its absolute file offset and length are kept. Item and sample data
/// is fetched through `HeifFile::read_at` using iloc / stco offsets.
/// A writer constructed mdat carries its payload in `data`.
#[derive(Clone, Debug, Default)]
pub struct MediaDataBox {
    /// Absolute file offset of the payload (not the header).
    pub payload_offset: u64,
    /// Payload length in bytes.
    pub payload_size: u64,
    /// In-memory payload (writer side only).
    pub data: Vec<u8>,
}

impl FromBytes for MediaDataBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<MediaDataBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;
        let payload_offset = stream.pos();
        let payload_size = stream.left();
        stream.skip(payload_size)?;
        Ok(MediaDataBox {
            payload_offset,
            payload_size,
            data: Vec::new(),
        })
    }
    fn min_size() -> usize {
        8
    }
}

impl ToBytes for MediaDataBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        writer.write(&self.data)?;
        Ok(())
    }
}

impl BoxInfo for MediaDataBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"mdat")
    }
}

impl FullBox for MediaDataBox {}
