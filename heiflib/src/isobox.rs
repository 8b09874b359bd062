//! The ISOBMFF box framework.
//!
//! Every box starts with a 32 bit size and a FourCC. A size of 1 means
//! the real size follows as a 64 bit value, a size of 0 means "to the end
//! of the enclosing box". FullBoxes carry an extra version byte and 24
//! bits of flags.
//!
//! [`BoxReader`] is a size-limited view over a stream that has consumed
//! such a header; [`BoxWriter`] writes a provisional header and back-fills
//! the size when the payload is complete.
//!
use std::fmt::Debug;
use std::io;

use crate::boxes::HeifBox;
use crate::serialize::{BoxBytes, FromBytes, ReadBytes, ToBytes, WriteBytes};
use crate::types::{FourCC, Uuid};

/// Gets implemented for every box.
pub trait BoxInfo {
    /// The "fourcc" name of this box.
    fn fourcc(&self) -> FourCC;
    /// Highest FullBox version we support for this type. `None` for plain boxes.
    fn max_version() -> Option<u8>
    where
        Self: Sized,
    {
        None
    }
}

/// Version and flags of a FullBox.
///
/// Plain boxes keep the default implementation; FullBoxes return
/// `Some(version)`, usually derived from the fields that need it.
pub trait FullBox {
    fn version(&self) -> Option<u8> {
        None
    }
    fn flags(&self) -> u32 {
        0
    }
}

/// The parsed header of a box.
#[derive(Debug, Clone)]
pub struct BoxHeader {
    /// Number of payload bytes following the header (version/flags included).
    pub size: u64,
    pub fourcc: FourCC,
    pub user_type: Option<Uuid>,
    pub version: Option<u8>,
    pub flags: u32,
    pub max_version: Option<u8>,
}

impl BoxHeader {
    /// Look at the next box header without consuming it.
    ///
    /// Peeks only as many bytes as this particular header needs, so
    /// that an mdat header at the edge of a mapped segment stays
    /// readable.
    pub fn peek<R: ReadBytes>(stream: &mut R) -> io::Result<BoxHeader> {
        let left = stream.left();
        if left < 8 {
            return Err(ioerr!(UnexpectedEof, "BoxHeader::peek: short box"));
        }
        let base = stream.peek(8)?;
        let size1 = u32::from_be_bytes([base[0], base[1], base[2], base[3]]);
        let fourcc = FourCC(u32::from_be_bytes([base[4], base[5], base[6], base[7]]));
        let mut need = 8u64;
        if size1 == 1 {
            need += 8;
        }
        if fourcc == b"uuid" {
            need += 16;
        }
        if HeifBox::max_version_from_fourcc(fourcc).is_some() {
            need += 4;
        }
        let need = std::cmp::min(need, left);
        let data = stream.peek(need)?.to_vec();
        let mut rdr = crate::io::SliceReader::new(&data);
        BoxHeader::parse(&mut rdr, left)
    }

    /// Read and consume the next box header.
    pub fn read<R: ReadBytes>(stream: &mut R) -> io::Result<BoxHeader> {
        let left = stream.left();
        BoxHeader::parse(stream, left)
    }

    fn parse<R: ReadBytes>(stream: &mut R, left: u64) -> io::Result<BoxHeader> {
        let size1 = u32::from_bytes(stream)?;
        let fourcc = FourCC::from_bytes(stream)?;
        let mut header_len = 8u64;

        let mut size = match size1 {
            0 => left.saturating_sub(8),
            1 => {
                header_len += 8;
                u64::from_bytes(stream)?.saturating_sub(16)
            },
            x => (x as u64).saturating_sub(8),
        };

        let user_type = if fourcc == b"uuid" {
            header_len += 16;
            size = size.saturating_sub(16);
            Some(Uuid::from_bytes(stream)?)
        } else {
            None
        };

        if size > left.saturating_sub(header_len) {
            return Err(ioerr!(
                UnexpectedEof,
                "{}: advertised size {} exceeds enclosing box",
                fourcc,
                size
            ));
        }

        let max_version = HeifBox::max_version_from_fourcc(fourcc);
        let (version, flags) = if max_version.is_some() {
            if size < 4 {
                return Err(ioerr!(UnexpectedEof, "{}: truncated FullBox header", fourcc));
            }
            let version = u8::from_bytes(stream)?;
            let f1 = u8::from_bytes(stream)? as u32;
            let f2 = u16::from_bytes(stream)? as u32;
            (Some(version), (f1 << 16) | f2)
        } else {
            (None, 0)
        };

        Ok(BoxHeader {
            size,
            fourcc,
            user_type,
            version,
            flags,
            max_version,
        })
    }
}

/// Reads one box: header plus a size-limited view on the payload.
pub struct BoxReader<'a> {
    pub header: BoxHeader,
    maxsize: u64,
    // Boxed, since a BoxReader might contain a BoxReader.
    inner: Box<dyn ReadBytes + 'a>,
}

impl<'a> BoxReader<'a> {
    /// Read the box header, then return a size-limited reader.
    pub fn new(stream: &'a mut impl ReadBytes) -> io::Result<BoxReader<'a>> {
        let pos = stream.pos();
        let header = BoxHeader::read(stream)?;
        // size counts version/flags, which BoxHeader::read consumed.
        let consumed = stream.pos() - pos;
        let hdr_payload = if header.version.is_some() { 4 } else { 0 };
        let maxsize = pos + consumed - hdr_payload + header.size;
        log::trace!(
            "BoxReader::new: {} size {} maxsize {}",
            header.fourcc,
            header.size,
            maxsize
        );
        Ok(BoxReader {
            header,
            maxsize,
            inner: Box::new(stream),
        })
    }
}

impl<'a> Drop for BoxReader<'a> {
    fn drop(&mut self) {
        if self.inner.pos() < self.maxsize {
            log::trace!(
                "BoxReader {} drop: skipping {}",
                self.header.fourcc,
                self.maxsize - self.inner.pos()
            );
            let _ = self.inner.skip(self.maxsize - self.inner.pos());
        }
    }
}

impl<'a> ReadBytes for BoxReader<'a> {
    fn read(&mut self, amount: u64) -> io::Result<&[u8]> {
        let amount = if amount == 0 { self.left() } else { amount };
        if amount == 0 {
            return Ok(b"");
        }
        if self.inner.pos() + amount > self.maxsize {
            return Err(ioerr!(
                UnexpectedEof,
                "{}: read {} past end of box",
                self.header.fourcc,
                amount
            ));
        }
        self.inner.read(amount)
    }
    fn peek(&mut self, amount: u64) -> io::Result<&[u8]> {
        if self.inner.pos() + amount > self.maxsize {
            return Err(ioerr!(UnexpectedEof, "{}: peek past end of box", self.header.fourcc));
        }
        self.inner.peek(amount)
    }
    fn skip(&mut self, amount: u64) -> io::Result<()> {
        if self.inner.pos() + amount > self.maxsize {
            return Err(ioerr!(UnexpectedEof, "{}: skip past end of box", self.header.fourcc));
        }
        self.inner.skip(amount)
    }
    fn left(&self) -> u64 {
        let pos = self.inner.pos();
        if pos > self.maxsize {
            0
        } else {
            self.maxsize - pos
        }
    }
}

impl<'a> BoxBytes for BoxReader<'a> {
    fn pos(&self) -> u64 {
        self.inner.pos()
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.maxsize {
            return Err(ioerr!(UnexpectedEof, "seek past end of box"));
        }
        self.inner.seek(pos)
    }
    fn size(&self) -> u64 {
        self.maxsize
    }
    fn version(&self) -> u8 {
        self.header.version.unwrap_or_else(|| self.inner.version())
    }
    fn flags(&self) -> u32 {
        if self.header.version.is_some() {
            self.header.flags
        } else {
            self.inner.flags()
        }
    }
    fn fourcc(&self) -> FourCC {
        self.header.fourcc
    }
}

/// Writes the box header, and back-patches the size on finalize / drop.
pub struct BoxWriter<W: WriteBytes> {
    offset: u64,
    version: Option<u8>,
    flags: u32,
    inner: W,
    finalized: bool,
}

impl<W> BoxWriter<W>
where
    W: WriteBytes,
{
    /// Write a provisional box header, then return a new stream. When
    /// the stream is dropped, the box header is updated.
    pub fn new<B>(mut stream: W, b: &B) -> io::Result<BoxWriter<W>>
    where
        B: BoxInfo + FullBox,
    {
        let offset = stream.pos();
        0u32.to_bytes(&mut stream)?;
        b.fourcc().to_bytes(&mut stream)?;
        let version = b.version();
        let flags = b.flags();
        if let Some(version) = version {
            version.to_bytes(&mut stream)?;
            ((flags >> 16) as u8).to_bytes(&mut stream)?;
            (flags as u16).to_bytes(&mut stream)?;
        }
        Ok(BoxWriter {
            offset,
            version,
            flags,
            inner: stream,
            finalized: false,
        })
    }

    /// Finalize the box: seek back to the header and write the size.
    ///
    /// If you don't call this explicitly, it is done automatically when the
    /// BoxWriter is dropped. Any I/O errors will result in panics.
    pub fn finalize(&mut self) -> io::Result<()> {
        self.finalized = true;
        let pos = self.inner.pos();
        self.inner.seek(self.offset)?;
        let sz = pos - self.offset;
        if sz > u32::MAX as u64 {
            return Err(ioerr!(InvalidData, "box too large for 32 bit size field"));
        }
        (sz as u32).to_bytes(&mut self.inner)?;
        self.inner.seek(pos)?;
        Ok(())
    }
}

impl<W> Drop for BoxWriter<W>
where
    W: WriteBytes,
{
    fn drop(&mut self) {
        if !self.finalized {
            self.finalize().unwrap();
        }
    }
}

impl<W> WriteBytes for BoxWriter<W>
where
    W: WriteBytes,
{
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write(data)
    }
    fn skip(&mut self, amount: u64) -> io::Result<()> {
        self.inner.skip(amount)
    }
}

impl<W> BoxBytes for BoxWriter<W>
where
    W: WriteBytes,
{
    fn pos(&self) -> u64 {
        self.inner.pos()
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(pos)
    }
    fn version(&self) -> u8 {
        self.version.unwrap_or_else(|| self.inner.version())
    }
    fn flags(&self) -> u32 {
        if self.version.is_some() {
            self.flags
        } else {
            self.inner.flags()
        }
    }
    fn fourcc(&self) -> FourCC {
        self.inner.fourcc()
    }
}

/// Read a collection of boxes from a stream.
pub fn read_boxes<R: ReadBytes>(mut file: R) -> io::Result<Vec<HeifBox>> {
    let mut boxes = Vec::new();
    while file.left() >= 8 {
        let b = HeifBox::from_bytes(&mut file)?;
        boxes.push(b);
    }
    Ok(boxes)
}

/// Any unknown box we encounter is kept as a GenericBox.
///
/// The payload is preserved as-is, so unmodified containers round-trip
/// byte-identically.
#[derive(Clone)]
pub struct GenericBox {
    pub fourcc: FourCC,
    pub data: Vec<u8>,
}

impl FromBytes for GenericBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<GenericBox> {
        let mut reader = BoxReader::new(stream)?;
        let fourcc = reader.header.fourcc;
        let size = reader.left();
        let data = reader.read(size)?.to_vec();
        Ok(GenericBox { fourcc, data })
    }
    fn min_size() -> usize {
        8
    }
}

impl ToBytes for GenericBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        writer.write(&self.data)
    }
}

impl BoxInfo for GenericBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        self.fourcc
    }
}

impl FullBox for GenericBox {}

struct U8Array(u64);

impl Debug for U8Array {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[u8; {}]", &self.0)
    }
}

impl Debug for GenericBox {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut dbg = f.debug_struct("GenericBox");
        dbg.field("fourcc", &self.fourcc);
        dbg.field("data", &U8Array(self.data.len() as u64));
        dbg.finish()
    }
}

/// A complete file: the flat list of top level boxes.
pub struct Heif {
    pub boxes: Vec<HeifBox>,
}

impl Heif {
    /// Read all top level boxes from a stream.
    pub fn read<R: ReadBytes>(stream: &mut R) -> io::Result<Heif> {
        let boxes = read_boxes(stream)?;
        Ok(Heif { boxes })
    }

    /// Serialize all top level boxes to a stream.
    pub fn write<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        for b in &self.boxes {
            b.to_bytes(stream)?;
        }
        Ok(())
    }

    /// Get a reference to the FileTypeBox.
    pub fn file_type(&self) -> Option<&crate::boxes::FileTypeBox> {
        use crate::boxes::FileTypeBox;
        first_box!(&self.boxes, FileTypeBox)
    }

    /// Get a reference to the file level MetaBox, if present.
    pub fn meta(&self) -> Option<&crate::boxes::MetaBox> {
        use crate::boxes::MetaBox;
        first_box!(&self.boxes, MetaBox)
    }

    /// Get a reference to the MovieBox, if present.
    pub fn movie(&self) -> Option<&crate::boxes::MovieBox> {
        use crate::boxes::MovieBox;
        first_box!(&self.boxes, MovieBox)
    }
}

impl Debug for Heif {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut dbg = f.debug_struct("Heif");
        dbg.field("boxes", &self.boxes);
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn generic_box_round_trips() {
        let bytes: &[u8] = &[0, 0, 0, 12, b'w', b'x', b'y', b'z', 1, 2, 3, 4];
        let mut rdr = SliceReader::new(bytes);
        let b = GenericBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(b.fourcc, b"wxyz");
        assert_eq!(b.data, vec![1, 2, 3, 4]);

        let mut buf = MemBuffer::new();
        b.to_bytes(&mut buf).unwrap();
        assert_eq!(buf.into_vec(), bytes);
    }

    #[test]
    fn box_writer_backpatches_size() {
        let b = GenericBox {
            fourcc: crate::types::FourCC::new(b"free"),
            data: vec![0u8; 9],
        };
        let mut buf = MemBuffer::new();
        b.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        assert_eq!(v.len(), 17);
        assert_eq!(&v[0..4], &[0, 0, 0, 17]);
        assert_eq!(&v[4..8], b"free");
    }
}
