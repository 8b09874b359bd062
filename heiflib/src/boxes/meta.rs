//! The MetaBox and its immediate children.
//!
//! The item graph itself (items, properties, references) lives in the
//! boxes below this one; the accessors here are the entry points the
//! reader uses.
use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{HandlerBox, ItemInfoBox, ItemLocationBox, ItemPropertiesBox, ItemReferenceBox};

def_box! {
    /// 8.11.1 Meta Box (ISO/IEC 14496-12:2015(E))
    MetaBox {
        boxes:  Vec<HeifBox>,
    },
    fourcc => b"meta",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl MetaBox {
    declare_box_methods_opt!(HandlerBox, handler, handler_mut);
    declare_box_methods_opt!(PrimaryItemBox, primary_item, primary_item_mut);
    declare_box_methods_opt!(ItemInfoBox, item_info, item_info_mut);
    declare_box_methods_opt!(ItemLocationBox, item_location, item_location_mut);
    declare_box_methods_opt!(ItemReferenceBox, item_reference, item_reference_mut);
    declare_box_methods_opt!(ItemPropertiesBox, item_properties, item_properties_mut);
    declare_box_methods_opt!(ItemDataBox, item_data, item_data_mut);
    declare_box_methods_opt!(GroupsListBox, groups_list, groups_list_mut);
    declare_box_methods_opt!(ItemProtectionBox, item_protection, item_protection_mut);

    /// Is this a `pict` handler meta box?
    pub fn is_pict(&self) -> bool {
        self.handler()
            .map(|h| h.handler_type == b"pict")
            .unwrap_or(false)
    }
}

impl Default for MetaBox {
    fn default() -> MetaBox {
        MetaBox { boxes: Vec::new() }
    }
}

/// 8.11.4 Primary Item Box (ISO/IEC 14496-12:2015(E))
///
/// Version 0 stores the item id in 16 bits, version 1 in 32.
#[derive(Clone, Debug, Default)]
pub struct PrimaryItemBox {
    pub item_id: u32,
}

impl FromBytes for PrimaryItemBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<PrimaryItemBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;
        let item_id = if stream.version() == 0 {
            u16::from_bytes(stream)? as u32
        } else {
            u32::from_bytes(stream)?
        };
        Ok(PrimaryItemBox { item_id })
    }
    fn min_size() -> usize {
        14
    }
}

impl ToBytes for PrimaryItemBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        if stream.version() == 0 {
            (self.item_id as u16).to_bytes(stream)?;
        } else {
            self.item_id.to_bytes(stream)?;
        }
        Ok(())
    }
}

impl BoxInfo for PrimaryItemBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"pitm")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for PrimaryItemBox {
    fn version(&self) -> Option<u8> {
        if self.item_id > u16::MAX as u32 {
            Some(1)
        } else {
            Some(0)
        }
    }
}

def_box! {
    /// 8.11.11 Item Data Box: payload store for construction method 1.
    #[derive(Default)]
    ItemDataBox {
        data:   Data,
    },
    fourcc => b"idat",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    /// 8.11.14 Groups List Box.
    #[derive(Default)]
    GroupsListBox {
        boxes:  Vec<HeifBox>,
    },
    fourcc => b"grpl",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    /// 8.11.14.2 Entity to Group Box, 'altr' grouping.
    #[derive(Default)]
    EntityToGroupBox {
        group_id:   u32,
        entity_ids: ArraySized32<u32>,
    },
    fourcc => b"altr",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// 8.11.5 Item Protection Box.
    ///
    /// The contained scheme information boxes are kept opaque.
    #[derive(Default)]
    ItemProtectionBox {
        entries:    ArraySized16<HeifBox>,
    },
    fourcc => b"ipro",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}
