//! 8.11.14 Item Properties Box (ISO/IEC 14496-12:2015(E)) and the
//! descriptive / transformative item properties of HEIF.
use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 'iprp': the property container plus the association table(s).
    #[derive(Default)]
    ItemPropertiesBox {
        boxes:  Vec<HeifBox>,
    },
    fourcc => b"iprp",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl ItemPropertiesBox {
    declare_box_methods_opt!(ItemPropertyContainerBox, container, container_mut);
    declare_box_methods_opt!(ItemPropertyAssociationBox, association, association_mut);

    /// The associations of one item, in listed order.
    ///
    /// Index 0 is reserved: each returned index is 1-based into the
    /// `ipco` children.
    pub fn item_associations(&self, item_id: u32) -> Vec<PropertyAssociation> {
        self.association()
            .and_then(|a| a.entries.iter().find(|e| e.item_id == item_id))
            .map(|e| e.associations.clone())
            .unwrap_or_default()
    }

    /// Get a property by 1-based index, as reported in `ipma`.
    pub fn property(&self, index: u16) -> Option<&HeifBox> {
        if index == 0 {
            return None;
        }
        self.container()
            .and_then(|c| c.boxes.get(index as usize - 1))
    }
}

def_box! {
    /// 'ipco': all properties, in the order `ipma` indexes them.
    #[derive(Default)]
    ItemPropertyContainerBox {
        boxes:  Vec<HeifBox>,
    },
    fourcc => b"ipco",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

/// One `(property index, essential)` pair of an `ipma` entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyAssociation {
    pub essential: bool,
    pub property_index: u16,
}

#[derive(Clone, Debug, Default)]
pub struct ItemPropertyAssociationEntry {
    pub item_id: u32,
    pub associations: Vec<PropertyAssociation>,
}

/// 'ipma'. Flags bit 0 selects 15 bit property indexes.
#[derive(Clone, Debug, Default)]
pub struct ItemPropertyAssociationBox {
    pub entries: Vec<ItemPropertyAssociationEntry>,
}

impl FromBytes for ItemPropertyAssociationBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ItemPropertyAssociationBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let wide = reader.header.flags & 1 != 0;
        let stream = &mut reader;

        let entry_count = u32::from_bytes(stream)?;
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let item_id = if version < 1 {
                u16::from_bytes(stream)? as u32
            } else {
                u32::from_bytes(stream)?
            };
            let association_count = u8::from_bytes(stream)?;
            let mut associations = Vec::new();
            for _ in 0..association_count {
                let (essential, property_index) = if wide {
                    let v = u16::from_bytes(stream)?;
                    (v & 0x8000 != 0, v & 0x7fff)
                } else {
                    let v = u8::from_bytes(stream)?;
                    (v & 0x80 != 0, (v & 0x7f) as u16)
                };
                associations.push(PropertyAssociation {
                    essential,
                    property_index,
                });
            }
            entries.push(ItemPropertyAssociationEntry { item_id, associations });
        }
        Ok(ItemPropertyAssociationBox { entries })
    }
    fn min_size() -> usize {
        16
    }
}

impl ToBytes for ItemPropertyAssociationBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let version = writer.version();
        let wide = writer.flags() & 1 != 0;
        let stream = &mut writer;

        (self.entries.len() as u32).to_bytes(stream)?;
        for e in &self.entries {
            if version < 1 {
                (e.item_id as u16).to_bytes(stream)?;
            } else {
                e.item_id.to_bytes(stream)?;
            }
            (e.associations.len() as u8).to_bytes(stream)?;
            for a in &e.associations {
                if wide {
                    let v = ((a.essential as u16) << 15) | (a.property_index & 0x7fff);
                    v.to_bytes(stream)?;
                } else {
                    let v = ((a.essential as u8) << 7) | (a.property_index & 0x7f) as u8;
                    v.to_bytes(stream)?;
                }
            }
        }
        Ok(())
    }
}

impl BoxInfo for ItemPropertyAssociationBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"ipma")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for ItemPropertyAssociationBox {
    fn version(&self) -> Option<u8> {
        if self.entries.iter().any(|e| e.item_id > u16::MAX as u32) {
            Some(1)
        } else {
            Some(0)
        }
    }
    fn flags(&self) -> u32 {
        let wide = self
            .entries
            .iter()
            .any(|e| e.associations.iter().any(|a| a.property_index > 0x7f));
        wide as u32
    }
}

def_box! {
    /// 'ispe': width and height of the reconstructed image.
    #[derive(Default)]
    ImageSpatialExtentsProperty {
        image_width:    u32,
        image_height:   u32,
    },
    fourcc => b"ispe",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// 'irot': anti-clockwise rotation in units of 90 degrees (low 2 bits).
    #[derive(Default)]
    ImageRotationProperty {
        angle:  u8,
    },
    fourcc => b"irot",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl ImageRotationProperty {
    pub fn degrees(&self) -> u16 {
        ((self.angle & 0x3) as u16) * 90
    }

    pub fn from_degrees(degrees: u16) -> ImageRotationProperty {
        ImageRotationProperty {
            angle: ((degrees / 90) % 4) as u8,
        }
    }
}

def_box! {
    /// 'imir': mirror axis, 0 = vertical (left/right swap), 1 = horizontal.
    #[derive(Default)]
    ImageMirrorProperty {
        axis:   u8,
    },
    fourcc => b"imir",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    /// 'clap': clean aperture, fractional crop window.
    #[derive(Default)]
    CleanApertureBox {
        clean_aperture_width_n:     u32,
        clean_aperture_width_d:     u32,
        clean_aperture_height_n:    u32,
        clean_aperture_height_d:    u32,
        horiz_off_n:                i32,
        horiz_off_d:                i32,
        vert_off_n:                 i32,
        vert_off_d:                 i32,
    },
    fourcc => b"clap",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    /// 'auxC': what kind of auxiliary image (alpha, depth, ...) this is.
    #[derive(Default)]
    AuxiliaryTypeProperty {
        aux_type:       ZString,
        aux_subtype:    Data,
    },
    fourcc => b"auxC",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// 'rloc': position of this item relative to the related master.
    #[derive(Default)]
    RelativeLocationProperty {
        horizontal_offset:  u32,
        vertical_offset:    u32,
    },
    fourcc => b"rloc",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// 'lsel': which coded layer of an L-HEVC item to decode.
    #[derive(Default)]
    LayerSelectorProperty {
        layer_id:   u16,
    },
    fourcc => b"lsel",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    /// 'tols': target output layer set of an L-HEVC item.
    #[derive(Default)]
    TargetOlsProperty {
        target_ols_index:   u16,
    },
    fourcc => b"tols",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn ipma_round_trip() {
        let mut ipma = ItemPropertyAssociationBox::default();
        ipma.entries.push(ItemPropertyAssociationEntry {
            item_id: 1,
            associations: vec![
                PropertyAssociation {
                    essential: true,
                    property_index: 1,
                },
                PropertyAssociation {
                    essential: false,
                    property_index: 2,
                },
            ],
        });
        let mut buf = MemBuffer::new();
        ipma.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = ItemPropertyAssociationBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.entries.len(), 1);
        assert_eq!(back.entries[0].associations, ipma.entries[0].associations);
    }

    #[test]
    fn ipma_wide_indexes() {
        let mut ipma = ItemPropertyAssociationBox::default();
        ipma.entries.push(ItemPropertyAssociationEntry {
            item_id: 1,
            associations: vec![PropertyAssociation {
                essential: false,
                property_index: 300,
            }],
        });
        let mut buf = MemBuffer::new();
        ipma.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = ItemPropertyAssociationBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.entries[0].associations[0].property_index, 300);
    }

    #[test]
    fn irot_degrees() {
        assert_eq!(ImageRotationProperty::from_degrees(270).degrees(), 270);
        assert_eq!(ImageRotationProperty { angle: 2 }.degrees(), 180);
    }
}
