//! 8.11.3 Item Location Box (ISO/IEC 14496-12:2015(E))
//!
//! Every item has a construction method (0 = file offset, 1 = idat
//! offset, 2 = item offset) and a list of extents that concatenate to
//! the item data.
use std::io;

use crate::boxes::prelude::*;

#[derive(Clone, Debug)]
pub struct ItemLocationBox {
    pub offset_size: u8,
    pub length_size: u8,
    pub base_offset_size: u8,
    pub index_size: u8,
    pub items: Vec<ItemLocationEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct ItemLocationEntry {
    pub item_id: u32,
    pub construction_method: u8,
    pub data_reference_index: u16,
    pub base_offset: u64,
    pub extents: Vec<ItemLocationExtent>,
}

#[derive(Clone, Debug, Default)]
pub struct ItemLocationExtent {
    pub index: u64,
    pub offset: u64,
    pub length: u64,
}

impl Default for ItemLocationBox {
    fn default() -> ItemLocationBox {
        ItemLocationBox {
            offset_size: 8,
            length_size: 8,
            base_offset_size: 0,
            index_size: 0,
            items: Vec::new(),
        }
    }
}

impl ItemLocationBox {
    /// Look up the location of an item by id.
    pub fn by_item_id(&self, item_id: u32) -> Option<&ItemLocationEntry> {
        self.items.iter().find(|e| e.item_id == item_id)
    }

    /// Total length of an item, all extents combined.
    pub fn item_length(&self, item_id: u32) -> Option<u64> {
        self.by_item_id(item_id)
            .map(|e| e.extents.iter().map(|x| x.length).sum())
    }
}

fn read_sized<R: ReadBytes>(stream: &mut R, size: u8) -> io::Result<u64> {
    match size {
        0 => Ok(0),
        4 => Ok(u32::from_bytes(stream)? as u64),
        8 => u64::from_bytes(stream),
        sz => Err(ioerr!(InvalidData, "iloc: invalid field size {}", sz)),
    }
}

fn write_sized<W: WriteBytes>(stream: &mut W, size: u8, value: u64) -> io::Result<()> {
    match size {
        0 => Ok(()),
        4 => (value as u32).to_bytes(stream),
        8 => value.to_bytes(stream),
        sz => Err(ioerr!(InvalidData, "iloc: invalid field size {}", sz)),
    }
}

impl FromBytes for ItemLocationBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ItemLocationBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let stream = &mut reader;

        let sizes = u16::from_bytes(stream)?;
        let offset_size = ((sizes >> 12) & 0xf) as u8;
        let length_size = ((sizes >> 8) & 0xf) as u8;
        let base_offset_size = ((sizes >> 4) & 0xf) as u8;
        let index_size = if version > 0 { (sizes & 0xf) as u8 } else { 0 };

        let item_count = if version < 2 {
            u16::from_bytes(stream)? as u32
        } else {
            u32::from_bytes(stream)?
        };

        let mut items = Vec::new();
        for _ in 0..item_count {
            let item_id = if version < 2 {
                u16::from_bytes(stream)? as u32
            } else {
                u32::from_bytes(stream)?
            };
            let construction_method = if version > 0 {
                (u16::from_bytes(stream)? & 0xf) as u8
            } else {
                0
            };
            let data_reference_index = u16::from_bytes(stream)?;
            let base_offset = read_sized(stream, base_offset_size)?;
            let extent_count = u16::from_bytes(stream)?;
            let mut extents = Vec::new();
            for _ in 0..extent_count {
                let index = if version > 0 && index_size > 0 {
                    read_sized(stream, index_size)?
                } else {
                    0
                };
                let offset = read_sized(stream, offset_size)?;
                let length = read_sized(stream, length_size)?;
                extents.push(ItemLocationExtent { index, offset, length });
            }
            items.push(ItemLocationEntry {
                item_id,
                construction_method,
                data_reference_index,
                base_offset,
                extents,
            });
        }

        Ok(ItemLocationBox {
            offset_size,
            length_size,
            base_offset_size,
            index_size,
            items,
        })
    }
    fn min_size() -> usize {
        18
    }
}

impl ToBytes for ItemLocationBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let version = writer.version();
        let stream = &mut writer;

        let sizes = ((self.offset_size as u16) << 12)
            | ((self.length_size as u16) << 8)
            | ((self.base_offset_size as u16) << 4)
            | if version > 0 { self.index_size as u16 } else { 0 };
        sizes.to_bytes(stream)?;

        if version < 2 {
            (self.items.len() as u16).to_bytes(stream)?;
        } else {
            (self.items.len() as u32).to_bytes(stream)?;
        }

        for item in &self.items {
            if version < 2 {
                (item.item_id as u16).to_bytes(stream)?;
            } else {
                item.item_id.to_bytes(stream)?;
            }
            if version > 0 {
                (item.construction_method as u16).to_bytes(stream)?;
            }
            item.data_reference_index.to_bytes(stream)?;
            write_sized(stream, self.base_offset_size, item.base_offset)?;
            (item.extents.len() as u16).to_bytes(stream)?;
            for extent in &item.extents {
                if version > 0 && self.index_size > 0 {
                    write_sized(stream, self.index_size, extent.index)?;
                }
                write_sized(stream, self.offset_size, extent.offset)?;
                write_sized(stream, self.length_size, extent.length)?;
            }
        }
        Ok(())
    }
}

impl BoxInfo for ItemLocationBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"iloc")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(2)
    }
}

impl FullBox for ItemLocationBox {
    fn version(&self) -> Option<u8> {
        if self.items.iter().any(|i| i.item_id > u16::MAX as u32) {
            Some(2)
        } else if self.items.iter().any(|i| i.construction_method != 0) {
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
    fn iloc_round_trip() {
        let mut iloc = ItemLocationBox::default();
        iloc.items.push(ItemLocationEntry {
            item_id: 1,
            construction_method: 0,
            data_reference_index: 0,
            base_offset: 0,
            extents: vec![ItemLocationExtent {
                index: 0,
                offset: 4096,
                length: 8192,
            }],
        });
        iloc.items.push(ItemLocationEntry {
            item_id: 2,
            construction_method: 1,
            data_reference_index: 0,
            base_offset: 0,
            extents: vec![ItemLocationExtent {
                index: 0,
                offset: 0,
                length: 21,
            }],
        });

        let mut buf = MemBuffer::new();
        iloc.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = ItemLocationBox::from_bytes(&mut rdr).unwrap();

        // construction method 1 forces version 1
        assert_eq!(back.items.len(), 2);
        let e = back.by_item_id(1).unwrap();
        assert_eq!(e.extents[0].offset, 4096);
        assert_eq!(back.item_length(1), Some(8192));
        let e = back.by_item_id(2).unwrap();
        assert_eq!(e.construction_method, 1);
        assert_eq!(e.extents[0].length, 21);
    }
}
