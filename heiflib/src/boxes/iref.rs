//! 8.11.12 Item Reference Box (ISO/IEC 14496-12:2015(E))
//!
//! Directed typed edges between items. The fourcc of each child box is
//! the reference type ('thmb', 'auxl', 'cdsc', 'dimg', 'base', 'exbl').
use std::io;

use crate::boxes::prelude::*;

#[derive(Clone, Debug, Default)]
pub struct ItemReferenceBox {
    pub references: Vec<SingleItemTypeReference>,
}

/// One reference edge: `from_item_id` points at each of `to_item_ids`.
#[derive(Clone, Debug)]
pub struct SingleItemTypeReference {
    pub reference_type: FourCC,
    pub from_item_id: u32,
    pub to_item_ids: Vec<u32>,
}

impl ItemReferenceBox {
    /// All references of the given type.
    pub fn by_type<'a>(&'a self, reference_type: FourCC) -> impl Iterator<Item = &'a SingleItemTypeReference> {
        self.references
            .iter()
            .filter(move |r| r.reference_type == reference_type)
    }

    /// All targets referenced from `from_id` with `reference_type`.
    pub fn references_from(&self, from_id: u32, reference_type: FourCC) -> Vec<u32> {
        let mut v = Vec::new();
        for r in self.by_type(reference_type) {
            if r.from_item_id == from_id {
                v.extend_from_slice(&r.to_item_ids);
            }
        }
        v
    }

    /// All sources that reference `to_id` with `reference_type`.
    pub fn references_to(&self, to_id: u32, reference_type: FourCC) -> Vec<u32> {
        let mut v = Vec::new();
        for r in self.by_type(reference_type) {
            if r.to_item_ids.iter().any(|&id| id == to_id) {
                v.push(r.from_item_id);
            }
        }
        v
    }
}

impl FromBytes for ItemReferenceBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ItemReferenceBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let stream = &mut reader;

        let mut references = Vec::new();
        while stream.left() >= 8 {
            // Child boxes are plain boxes with a dynamic fourcc.
            let mut child = BoxReader::new(stream)?;
            let reference_type = child.header.fourcc;
            let cstream = &mut child;
            let from_item_id = if version == 0 {
                u16::from_bytes(cstream)? as u32
            } else {
                u32::from_bytes(cstream)?
            };
            let reference_count = u16::from_bytes(cstream)?;
            let mut to_item_ids = Vec::new();
            for _ in 0..reference_count {
                let id = if version == 0 {
                    u16::from_bytes(cstream)? as u32
                } else {
                    u32::from_bytes(cstream)?
                };
                to_item_ids.push(id);
            }
            references.push(SingleItemTypeReference {
                reference_type,
                from_item_id,
                to_item_ids,
            });
        }
        Ok(ItemReferenceBox { references })
    }
    fn min_size() -> usize {
        12
    }
}

impl ToBytes for ItemReferenceBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let version = writer.version();
        let stream = &mut writer;

        let id_size = if version == 0 { 2u32 } else { 4 };
        for r in &self.references {
            // header + from_id + count + to_ids
            let size = 8 + id_size + 2 + id_size * r.to_item_ids.len() as u32;
            size.to_bytes(stream)?;
            r.reference_type.to_bytes(stream)?;
            if version == 0 {
                (r.from_item_id as u16).to_bytes(stream)?;
            } else {
                r.from_item_id.to_bytes(stream)?;
            }
            (r.to_item_ids.len() as u16).to_bytes(stream)?;
            for &id in &r.to_item_ids {
                if version == 0 {
                    (id as u16).to_bytes(stream)?;
                } else {
                    id.to_bytes(stream)?;
                }
            }
        }
        Ok(())
    }
}

impl BoxInfo for ItemReferenceBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"iref")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for ItemReferenceBox {
    fn version(&self) -> Option<u8> {
        let large = self.references.iter().any(|r| {
            r.from_item_id > u16::MAX as u32 || r.to_item_ids.iter().any(|&id| id > u16::MAX as u32)
        });
        if large {
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
    fn iref_round_trip_and_lookup() {
        let mut iref = ItemReferenceBox::default();
        iref.references.push(SingleItemTypeReference {
            reference_type: FourCC::new(b"thmb"),
            from_item_id: 2,
            to_item_ids: vec![1],
        });
        iref.references.push(SingleItemTypeReference {
            reference_type: FourCC::new(b"dimg"),
            from_item_id: 9,
            to_item_ids: vec![1, 2, 3, 4],
        });

        let mut buf = MemBuffer::new();
        iref.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = ItemReferenceBox::from_bytes(&mut rdr).unwrap();

        assert_eq!(back.references.len(), 2);
        assert_eq!(back.references_from(2, FourCC::new(b"thmb")), vec![1]);
        assert_eq!(back.references_to(1, FourCC::new(b"thmb")), vec![2]);
        assert_eq!(back.references_from(9, FourCC::new(b"dimg")), vec![1, 2, 3, 4]);
        assert_eq!(back.references_to(3, FourCC::new(b"dimg")), vec![9]);
    }
}
