//! File read/write.
//!
use std::convert::TryInto;
use std::fs;
use std::io::{self, ErrorKind, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use memmap::{Mmap, MmapOptions};

use crate::serialize::{BoxBytes, ReadBytes, WriteBytes};

struct FileSegment {
    start: u64,
    len: u64,
    map: Mmap,
}

/// Reads a HEIF file.
///
/// Implements `ReadBytes`, so it can be passed to `Heif::read`.
///
/// The box structure is `mmap`ed, the payload of `mdat` boxes is not.
/// Item and sample data is read on demand through [`HeifFile::read_at`].
pub struct HeifFile {
    file: Arc<fs::File>,
    pos: u64,
    size: u64,
    segments: Vec<FileSegment>,
    input_filename: Option<String>,
}

impl HeifFile {
    /// Open a HEIF file.
    pub fn open(path: impl AsRef<str>) -> io::Result<HeifFile> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        let size = file.metadata()?.len();

        // Create a list of segments where we leave out the
        // payload part of mdat boxes.
        let mut segs = Vec::<(u64, u64)>::new();
        segs.push((0, 0));
        let mut pos = 0;
        while let Some((boxtype, boxpos, boxsize)) = next_box(&file, &mut pos, size)? {
            if &boxtype == b"mdat" {
                segs.last_mut().unwrap().1 += 16;
                segs.push((boxpos + boxsize, 0));
            } else {
                segs.last_mut().unwrap().1 += boxsize;
            }
        }

        // Now mmap those segments.
        let mut segments = Vec::new();
        for seg in &segs {
            if seg.1 == 0 {
                break;
            }
            let len = std::cmp::min(seg.1, size - seg.0);
            let map = unsafe { MmapOptions::new().offset(seg.0).len(len as usize).map(&file)? };
            segments.push(FileSegment {
                start: seg.0,
                len,
                map,
            });
        }

        Ok(HeifFile {
            segments,
            file: Arc::new(file),
            pos: 0,
            size,
            input_filename: Some(path.to_string()),
        })
    }

    /// Name of the input file.
    pub fn input_filename(&self) -> Option<&str> {
        self.input_filename.as_deref()
    }

    /// Read a range of the file, regardless of the mapped segments.
    ///
    /// This is how mdat payload bytes (item data, sample data) are
    /// materialized.
    pub fn read_at(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        if offset.checked_add(length).map(|end| end > self.size).unwrap_or(true) {
            return Err(ioerr!(
                UnexpectedEof,
                "read_at: range {}+{} outside file of size {}",
                offset,
                length,
                self.size
            ));
        }
        let mut buf = vec![0u8; length as usize];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    /// Total file size.
    pub fn file_size(&self) -> u64 {
        self.size
    }

    #[inline]
    fn map(&self, amount: u64) -> io::Result<(usize, usize)> {
        for idx in 0..self.segments.len() {
            let seg = &self.segments[idx];
            if self.pos >= seg.start && self.pos < seg.start + seg.len {
                if self.pos + amount > seg.start + seg.len {
                    return Err(ioerr!(
                        InvalidInput,
                        "tried to read over mapped segment boundary"
                    ));
                }
                let npos = (self.pos - seg.start) as usize;
                return Ok((idx, npos));
            }
        }
        Err(ioerr!(InvalidInput, "read request outside of any mapped segment"))
    }
}

// Walk the top level boxes.
fn next_box(file: &fs::File, pos: &mut u64, filesize: u64) -> io::Result<Option<([u8; 4], u64, u64)>> {
    if *pos + 15 >= filesize {
        return Ok(None);
    }
    let mut buf = [0u8; 16];
    file.read_exact_at(&mut buf[..], *pos)?;
    let boxtype = &buf[4..8];
    let mut boxsize = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as u64;
    if boxsize == 0 {
        boxsize = filesize - *pos;
    } else if boxsize == 1 {
        boxsize = u64::from_be_bytes(buf[8..16].try_into().unwrap());
    }
    let xpos = *pos;
    *pos += boxsize;
    Ok(Some((boxtype.try_into().unwrap(), xpos, boxsize)))
}

impl ReadBytes for HeifFile {
    #[inline]
    fn read(&mut self, amount: u64) -> io::Result<&[u8]> {
        let (seg, offset) = self.map(amount)?;
        self.pos += amount;
        Ok(&self.segments[seg].map[offset..offset + amount as usize])
    }

    #[inline]
    fn peek(&mut self, amount: u64) -> io::Result<&[u8]> {
        let (seg, offset) = self.map(amount)?;
        Ok(&self.segments[seg].map[offset..offset + amount as usize])
    }

    #[inline]
    fn skip(&mut self, amount: u64) -> io::Result<()> {
        if self.pos + amount > self.size {
            return Err(ioerr!(UnexpectedEof, "tried to seek past eof"));
        }
        self.pos += amount;
        Ok(())
    }

    #[inline]
    fn left(&self) -> u64 {
        if self.pos > self.size {
            0
        } else {
            self.size - self.pos
        }
    }
}

impl BoxBytes for HeifFile {
    #[inline]
    fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.size {
            return Err(ioerr!(UnexpectedEof, "tried to seek past eof"));
        }
        self.pos = pos;
        Ok(())
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}

/// A positioned reader over an in-memory byte slice.
///
/// Used for parsing item payloads, decoder configuration records, and
/// scratch buffers produced by the writer.
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> SliceReader<'a> {
        SliceReader { data, pos: 0 }
    }
}

impl<'a> ReadBytes for SliceReader<'a> {
    fn read(&mut self, amount: u64) -> io::Result<&[u8]> {
        let amount = if amount == 0 { self.left() } else { amount };
        if self.pos + amount > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "read past end of buffer"));
        }
        let pos = self.pos as usize;
        self.pos += amount;
        Ok(&self.data[pos..pos + amount as usize])
    }
    fn peek(&mut self, amount: u64) -> io::Result<&[u8]> {
        if self.pos + amount > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "peek past end of buffer"));
        }
        let pos = self.pos as usize;
        Ok(&self.data[pos..pos + amount as usize])
    }
    fn skip(&mut self, amount: u64) -> io::Result<()> {
        if self.pos + amount > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "skip past end of buffer"));
        }
        self.pos += amount;
        Ok(())
    }
    fn left(&self) -> u64 {
        self.data.len() as u64 - self.pos
    }
}

impl<'a> BoxBytes for SliceReader<'a> {
    fn pos(&self) -> u64 {
        self.pos
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "seek past end of buffer"));
        }
        self.pos = pos;
        Ok(())
    }
    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Memory buffer that implements WriteBytes.
#[derive(Debug, Default)]
pub struct MemBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl MemBuffer {
    pub fn new() -> MemBuffer {
        MemBuffer {
            data: Vec::new(),
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl WriteBytes for MemBuffer {
    fn write(&mut self, newdata: &[u8]) -> io::Result<()> {
        let mut newdata = newdata;
        if self.pos < self.data.len() {
            let len = std::cmp::min(self.data.len() - self.pos, newdata.len());
            self.data[self.pos..self.pos + len].copy_from_slice(&newdata[..len]);
            newdata = &newdata[len..];
            self.pos += len;
        }
        if newdata.len() > 0 {
            self.data.extend_from_slice(newdata);
            self.pos = self.data.len();
        }
        Ok(())
    }

    fn skip(&mut self, amount: u64) -> io::Result<()> {
        self.pos += amount as usize;
        if self.pos > self.data.len() {
            self.data.resize(self.pos, 0);
        }
        Ok(())
    }
}

impl BoxBytes for MemBuffer {
    fn pos(&self) -> u64 {
        self.pos as u64
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos as usize;
        if self.pos > self.data.len() {
            self.data.resize(self.pos, 0);
        }
        Ok(())
    }
    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Count bytes, don't actually write.
#[derive(Debug, Default)]
pub struct CountBytes {
    pos: usize,
    max: usize,
}

impl CountBytes {
    pub fn new() -> CountBytes {
        CountBytes { pos: 0, max: 0 }
    }

    pub fn count(&self) -> u64 {
        self.max as u64
    }
}

impl WriteBytes for CountBytes {
    fn write(&mut self, newdata: &[u8]) -> io::Result<()> {
        self.pos += newdata.len();
        if self.max < self.pos {
            self.max = self.pos;
        }
        Ok(())
    }

    fn skip(&mut self, amount: u64) -> io::Result<()> {
        self.pos += amount as usize;
        if self.max < self.pos {
            self.max = self.pos;
        }
        Ok(())
    }
}

impl BoxBytes for CountBytes {
    fn pos(&self) -> u64 {
        self.pos as u64
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos as usize;
        Ok(())
    }
    fn size(&self) -> u64 {
        self.max as u64
    }
}

impl WriteBytes for fs::File {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }

    fn skip(&mut self, amount: u64) -> io::Result<()> {
        Seek::seek(self, SeekFrom::Current(amount as i64))?;
        Ok(())
    }
}

impl BoxBytes for fs::File {
    fn pos(&self) -> u64 {
        // stream_position needs &mut; go through the fd instead.
        let mut f = self;
        Seek::seek(&mut f, SeekFrom::Current(0)).unwrap_or(0)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        Seek::seek(self, SeekFrom::Start(pos))?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.metadata().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membuffer_write_seek_write() {
        let mut buf = MemBuffer::new();
        buf.write(&[0, 0, 0, 0]).unwrap();
        buf.write(&[1, 2, 3]).unwrap();
        buf.seek(0).unwrap();
        buf.write(&[9, 9, 9, 9]).unwrap();
        assert_eq!(buf.into_vec(), vec![9, 9, 9, 9, 1, 2, 3]);
    }

    #[test]
    fn slice_reader_tracks_position() {
        let mut r = SliceReader::new(&[1, 2, 3, 4]);
        assert_eq!(r.read(2).unwrap(), &[1, 2]);
        assert_eq!(r.pos(), 2);
        assert_eq!(r.left(), 2);
        assert!(r.read(3).is_err());
    }
}
