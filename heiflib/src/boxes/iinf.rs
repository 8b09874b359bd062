//! 8.11.6 Item Information Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

/// `iinf`: the list of `infe` entries.
#[derive(Clone, Debug, Default)]
pub struct ItemInfoBox {
    pub entries: Vec<ItemInfoEntry>,
}

impl ItemInfoBox {
    /// Look up an entry by item id.
    pub fn by_item_id(&self, item_id: u32) -> Option<&ItemInfoEntry> {
        self.entries.iter().find(|e| e.item_id == item_id)
    }
}

impl FromBytes for ItemInfoBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ItemInfoBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;
        let entry_count = if stream.version() == 0 {
            u16::from_bytes(stream)? as u32
        } else {
            u32::from_bytes(stream)?
        };
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            if stream.left() < 8 {
                return Err(ioerr!(UnexpectedEof, "iinf: truncated entry list"));
            }
            entries.push(ItemInfoEntry::from_bytes(stream)?);
        }
        Ok(ItemInfoBox { entries })
    }
    fn min_size() -> usize {
        14
    }
}

impl ToBytes for ItemInfoBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        if stream.version() == 0 {
            (self.entries.len() as u16).to_bytes(stream)?;
        } else {
            (self.entries.len() as u32).to_bytes(stream)?;
        }
        for e in &self.entries {
            e.to_bytes(stream)?;
        }
        Ok(())
    }
}

impl BoxInfo for ItemInfoBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"iinf")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for ItemInfoBox {
    fn version(&self) -> Option<u8> {
        if self.entries.len() > u16::MAX as usize {
            Some(1)
        } else {
            Some(0)
        }
    }
}

/// `infe`: one item.
///
/// Only entry versions 2 and 3 occur in HEIF files. Flags bit 0 marks
/// a hidden item.
#[derive(Clone, Debug)]
pub struct ItemInfoEntry {
    pub item_id: u32,
    pub item_protection_index: u16,
    pub item_type: FourCC,
    pub item_name: ZString,
    pub content_type: Option<ZString>,
    pub content_encoding: Option<ZString>,
    pub item_uri_type: Option<ZString>,
    pub hidden: bool,
}

impl Default for ItemInfoEntry {
    fn default() -> ItemInfoEntry {
        ItemInfoEntry {
            item_id: 0,
            item_protection_index: 0,
            item_type: FourCC::default(),
            item_name: ZString::new(""),
            content_type: None,
            content_encoding: None,
            item_uri_type: None,
            hidden: false,
        }
    }
}

impl FromBytes for ItemInfoEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ItemInfoEntry> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let hidden = reader.header.flags & 1 != 0;
        let stream = &mut reader;
        if version < 2 {
            return Err(ioerr!(InvalidData, "infe: version {} not supported", version));
        }
        let item_id = if version == 2 {
            u16::from_bytes(stream)? as u32
        } else {
            u32::from_bytes(stream)?
        };
        let item_protection_index = u16::from_bytes(stream)?;
        let item_type = FourCC::from_bytes(stream)?;
        let item_name = ZString::from_bytes(stream)?;
        let mut content_type = None;
        let mut content_encoding = None;
        let mut item_uri_type = None;
        if item_type == b"mime" {
            content_type = Some(ZString::from_bytes(stream)?);
            if stream.left() > 0 {
                content_encoding = Some(ZString::from_bytes(stream)?);
            }
        } else if item_type == b"uri " {
            item_uri_type = Some(ZString::from_bytes(stream)?);
        }
        Ok(ItemInfoEntry {
            item_id,
            item_protection_index,
            item_type,
            item_name,
            content_type,
            content_encoding,
            item_uri_type,
            hidden,
        })
    }
    fn min_size() -> usize {
        20
    }
}

impl ToBytes for ItemInfoEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        if stream.version() == 2 {
            (self.item_id as u16).to_bytes(stream)?;
        } else {
            self.item_id.to_bytes(stream)?;
        }
        self.item_protection_index.to_bytes(stream)?;
        self.item_type.to_bytes(stream)?;
        self.item_name.to_bytes(stream)?;
        if let Some(ct) = self.content_type.as_ref() {
            ct.to_bytes(stream)?;
        }
        if let Some(ce) = self.content_encoding.as_ref() {
            ce.to_bytes(stream)?;
        }
        if let Some(ut) = self.item_uri_type.as_ref() {
            ut.to_bytes(stream)?;
        }
        Ok(())
    }
}

impl BoxInfo for ItemInfoEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"infe")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(3)
    }
}

impl FullBox for ItemInfoEntry {
    fn version(&self) -> Option<u8> {
        if self.item_id > u16::MAX as u32 {
            Some(3)
        } else {
            Some(2)
        }
    }
    fn flags(&self) -> u32 {
        self.hidden as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    fn round_trip(iinf: &ItemInfoBox) -> ItemInfoBox {
        let mut buf = MemBuffer::new();
        iinf.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        ItemInfoBox::from_bytes(&mut rdr).unwrap()
    }

    #[test]
    fn infe_mime_entry() {
        let mut iinf = ItemInfoBox::default();
        iinf.entries.push(ItemInfoEntry {
            item_id: 1,
            item_type: FourCC::new(b"hvc1"),
            ..ItemInfoEntry::default()
        });
        iinf.entries.push(ItemInfoEntry {
            item_id: 2,
            item_type: FourCC::new(b"mime"),
            content_type: Some(ZString::new("application/rdf+xml")),
            hidden: true,
            ..ItemInfoEntry::default()
        });
        let back = round_trip(&iinf);
        assert_eq!(back.entries.len(), 2);
        assert_eq!(back.entries[0].item_type, b"hvc1");
        assert!(!back.entries[0].hidden);
        let mime = back.by_item_id(2).unwrap();
        assert_eq!(mime.content_type.as_ref().unwrap().as_str(), "application/rdf+xml");
        assert!(mime.hidden);
    }
}
