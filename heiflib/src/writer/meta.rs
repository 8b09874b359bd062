//! Populates the MetaBox side of a written file: items, locations,
//! properties, references, groups and the primary item.
use std::collections::HashMap;
use std::io;

use crate::boxes::*;
use crate::types::{FourCC, ZString};
use crate::writer::manifest;
use crate::writer::media::ParsedBitstream;

// Where an item's payload lives before offsets are final.
#[derive(Clone, Copy, Debug)]
enum Storage {
    // offset relative to the start of the writer's mdat payload.
    Mdat { offset: u64, length: u64 },
    // offset into idat.
    Idat { offset: u64, length: u64 },
}

/// Builds the meta box and its mdat payload.
pub struct MetaWriter {
    items: Vec<ItemInfoEntry>,
    storage: Vec<(u32, Storage)>,
    references: Vec<SingleItemTypeReference>,
    properties: Vec<HeifBox>,
    associations: Vec<ItemPropertyAssociationEntry>,
    idat: Vec<u8>,
    pub mdat: Vec<u8>,
    next_item_id: u32,
    /// uniq_bsid -> item ids, in image order.
    bsid_items: HashMap<u32, Vec<u32>>,
    primary_item: Option<u32>,
    groups: Vec<EntityToGroupBox>,
    next_group_id: u32,
}

impl MetaWriter {
    pub fn new() -> MetaWriter {
        MetaWriter {
            items: Vec::new(),
            storage: Vec::new(),
            references: Vec::new(),
            properties: Vec::new(),
            associations: Vec::new(),
            idat: Vec::new(),
            mdat: Vec::new(),
            next_item_id: 1,
            bsid_items: HashMap::new(),
            primary_item: None,
            groups: Vec::new(),
            next_group_id: 0x1000,
        }
    }

    fn new_item_id(&mut self) -> u32 {
        let id = self.next_item_id;
        self.next_item_id += 1;
        id
    }

    // 1-based property index.
    fn add_property(&mut self, prop: HeifBox) -> u16 {
        self.properties.push(prop);
        self.properties.len() as u16
    }

    fn associate(&mut self, item_id: u32, index: u16, essential: bool) {
        let assoc = PropertyAssociation {
            essential,
            property_index: index,
        };
        if let Some(e) = self.associations.iter_mut().find(|e| e.item_id == item_id) {
            e.associations.push(assoc);
            return;
        }
        self.associations.push(ItemPropertyAssociationEntry {
            item_id,
            associations: vec![assoc],
        });
    }

    fn add_reference(&mut self, reference_type: &[u8; 4], from: u32, to: Vec<u32>) {
        if to.is_empty() {
            return;
        }
        self.references.push(SingleItemTypeReference {
            reference_type: FourCC::new(reference_type),
            from_item_id: from,
            to_item_ids: to,
        });
    }

    /// The item ids a (uniq_bsid, index) pair resolves to.
    pub fn resolve_bsid(&self, uniq_bsid: u32, index: u32) -> io::Result<u32> {
        self.bsid_items
            .get(&uniq_bsid)
            .and_then(|v| v.get(index as usize))
            .copied()
            .ok_or_else(|| ioerr!(InvalidData, "manifest references unknown uniq_bsid {}", uniq_bsid))
    }

    pub fn items_of_bsid(&self, uniq_bsid: u32) -> Vec<u32> {
        self.bsid_items.get(&uniq_bsid).cloned().unwrap_or_default()
    }

    // Add a set of coded images: infe + iloc + config/ispe properties.
    fn add_coded_images(
        &mut self,
        code_type: &str,
        parsed: &ParsedBitstream,
        uniq_bsid: u32,
        hidden: bool,
    ) -> io::Result<Vec<u32>> {
        let tag = fourcc_of(code_type)?;
        let config_index = self.add_property(parsed.config.clone());
        let ispe = ImageSpatialExtentsProperty {
            image_width: parsed.width,
            image_height: parsed.height,
        };
        let ispe_index = self.add_property(ispe.to_heifbox());

        let mut ids = Vec::new();
        for image in &parsed.images {
            let id = self.new_item_id();
            self.items.push(ItemInfoEntry {
                item_id: id,
                item_type: tag,
                item_name: ZString::new(""),
                hidden: hidden || image.is_hidden,
                ..ItemInfoEntry::default()
            });
            let offset = self.mdat.len() as u64;
            self.mdat.extend_from_slice(&image.data);
            self.storage.push((
                id,
                Storage::Mdat {
                    offset,
                    length: image.data.len() as u64,
                },
            ));
            self.associate(id, config_index, true);
            self.associate(id, ispe_index, false);
            ids.push(id);
        }
        self.bsid_items.entry(uniq_bsid).or_default().extend(ids.iter());
        Ok(ids)
    }

    fn add_transform_properties(&mut self, item_ids: &[u32], property: &manifest::Property) {
        if let Some(degrees) = property.irot {
            let idx = self.add_property(ImageRotationProperty::from_degrees(degrees).to_heifbox());
            for &id in item_ids {
                self.associate(id, idx, true);
            }
        }
        if let Some(axis) = property.imir {
            let idx = self.add_property(ImageMirrorProperty { axis }.to_heifbox());
            for &id in item_ids {
                self.associate(id, idx, true);
            }
        }
        if let Some(clap) = property.clap {
            let b = CleanApertureBox {
                clean_aperture_width_n: clap.width_n,
                clean_aperture_width_d: clap.width_d,
                clean_aperture_height_n: clap.height_n,
                clean_aperture_height_d: clap.height_d,
                horiz_off_n: clap.horiz_off_n,
                horiz_off_d: clap.horiz_off_d,
                vert_off_n: clap.vert_off_n,
                vert_off_d: clap.vert_off_d,
            };
            let idx = self.add_property(b.to_heifbox());
            for &id in item_ids {
                self.associate(id, idx, true);
            }
        }
    }

    /// Master images of one content entry.
    pub fn add_master(
        &mut self,
        content: &manifest::Content,
        parsed: &ParsedBitstream,
    ) -> io::Result<Vec<u32>> {
        let master = &content.master;
        let ids = self.add_coded_images(&master.code_type, parsed, master.uniq_bsid, false)?;
        if let Some(property) = content.property.as_ref() {
            self.add_transform_properties(&ids, property);
        }
        Ok(ids)
    }

    /// Thumbnail images: 'thmb' references index-match the masters.
    pub fn add_thumbs(
        &mut self,
        cfg: &manifest::Thumbs,
        parsed: &ParsedBitstream,
        master_ids: &[u32],
    ) -> io::Result<Vec<u32>> {
        let ids = self.add_coded_images(&cfg.code_type, parsed, cfg.uniq_bsid, false)?;
        for (i, &id) in ids.iter().enumerate() {
            let target = master_ids
                .get(i)
                .or_else(|| master_ids.first())
                .copied()
                .ok_or_else(|| ioerr!(InvalidData, "thumbnails without master images"))?;
            self.add_reference(b"thmb", id, vec![target]);
        }
        Ok(ids)
    }

    /// Auxiliary images ('auxl' + auxC).
    pub fn add_auxiliary(
        &mut self,
        cfg: &manifest::Auxiliary,
        parsed: &ParsedBitstream,
        master_ids: &[u32],
    ) -> io::Result<Vec<u32>> {
        let ids = self.add_coded_images(&cfg.code_type, parsed, cfg.uniq_bsid, false)?;
        let auxc = AuxiliaryTypeProperty {
            aux_type: ZString::new(&cfg.aux_type),
            aux_subtype: crate::types::Data(cfg.sub_type.clone()),
        };
        let auxc_index = self.add_property(auxc.to_heifbox());
        for (i, &id) in ids.iter().enumerate() {
            self.associate(id, auxc_index, true);
            let target = master_ids
                .get(i)
                .or_else(|| master_ids.first())
                .copied()
                .ok_or_else(|| ioerr!(InvalidData, "auxiliary images without master images"))?;
            self.add_reference(b"auxl", id, vec![target]);
        }
        Ok(ids)
    }

    /// Layered (L-HEVC) images: 'base' reference to the base bitstream
    /// items plus layer selection properties.
    pub fn add_layers(
        &mut self,
        cfg: &manifest::Layer,
        parsed: Option<&ParsedBitstream>,
        base_ids: &[u32],
    ) -> io::Result<Vec<u32>> {
        let ids = match parsed {
            Some(parsed) => self.add_coded_images(&cfg.code_type, parsed, cfg.uniq_bsid, cfg.hidden)?,
            None => {
                // layer selection over the base bitstream itself.
                let ids = base_ids.to_vec();
                self.bsid_items.entry(cfg.uniq_bsid).or_default().extend(ids.iter());
                ids
            },
        };
        let tols_index = self.add_property(
            TargetOlsProperty {
                target_ols_index: cfg.target_outputlayer,
            }
            .to_heifbox(),
        );
        let lsel_index = cfg.layer_selection.map(|layer_id| {
            self.add_property(LayerSelectorProperty { layer_id }.to_heifbox())
        });
        for (i, &id) in ids.iter().enumerate() {
            self.associate(id, tols_index, true);
            if let Some(lsel_index) = lsel_index {
                self.associate(id, lsel_index, true);
            }
            if parsed.is_some() {
                if let Some(&base) = base_ids.get(i).or_else(|| base_ids.first()) {
                    self.add_reference(b"base", id, vec![base]);
                }
            }
        }
        Ok(ids)
    }

    /// Metadata item ('Exif' or XML 'mime'), cdsc-describing the masters.
    pub fn add_metadata(&mut self, cfg: &manifest::Metadata, master_ids: &[u32]) -> io::Result<u32> {
        let data = std::fs::read(&cfg.file_path)?;
        let id = self.new_item_id();
        match cfg.hdlr_type.as_str() {
            "exif" => {
                self.items.push(ItemInfoEntry {
                    item_id: id,
                    item_type: FourCC::new(b"Exif"),
                    item_name: ZString::new(""),
                    ..ItemInfoEntry::default()
                });
            },
            "xml" => {
                self.items.push(ItemInfoEntry {
                    item_id: id,
                    item_type: FourCC::new(b"mime"),
                    item_name: ZString::new(""),
                    content_type: Some(ZString::new("application/rdf+xml")),
                    ..ItemInfoEntry::default()
                });
            },
            other => return Err(ioerr!(InvalidData, "metadata hdlr_type {} unknown", other)),
        }
        let offset = self.mdat.len() as u64;
        self.mdat.extend_from_slice(&data);
        self.storage.push((
            id,
            Storage::Mdat {
                offset,
                length: data.len() as u64,
            },
        ));
        self.add_reference(b"cdsc", id, master_ids.to_vec());
        Ok(id)
    }

    /// Derived items; payloads land in idat.
    pub fn add_derived(&mut self, derived: &manifest::Derived) -> io::Result<()> {
        for iden in &derived.iden {
            let source = self.resolve_bsid(iden.uniq_bsid, iden.refs_index)?;
            let id = self.new_item_id();
            self.items.push(ItemInfoEntry {
                item_id: id,
                item_type: FourCC::new(b"iden"),
                item_name: ZString::new(""),
                ..ItemInfoEntry::default()
            });
            self.storage.push((
                id,
                Storage::Idat {
                    offset: self.idat.len() as u64,
                    length: 0,
                },
            ));
            self.add_reference(b"dimg", id, vec![source]);
            let property = manifest::Property {
                irot: iden.irot,
                imir: iden.imir,
                clap: None,
            };
            self.add_transform_properties(&[id], &property);
        }

        for grid in &derived.grid {
            if grid.refs.len() != grid.rows as usize * grid.columns as usize {
                return Err(ioerr!(
                    InvalidData,
                    "grid {}x{} has {} refs",
                    grid.rows,
                    grid.columns,
                    grid.refs.len()
                ));
            }
            let mut inputs = Vec::new();
            for r in &grid.refs {
                inputs.push(self.resolve_bsid(r.uniq_bsid, r.refs_index)?);
            }
            let id = self.new_item_id();
            self.items.push(ItemInfoEntry {
                item_id: id,
                item_type: FourCC::new(b"grid"),
                item_name: ZString::new(""),
                ..ItemInfoEntry::default()
            });
            let payload = grid_payload(grid);
            let offset = self.idat.len() as u64;
            self.idat.extend_from_slice(&payload);
            self.storage.push((
                id,
                Storage::Idat {
                    offset,
                    length: payload.len() as u64,
                },
            ));
            self.add_reference(b"dimg", id, inputs);
            let ispe_index = self.add_property(
                ImageSpatialExtentsProperty {
                    image_width: grid.output_width,
                    image_height: grid.output_height,
                }
                .to_heifbox(),
            );
            self.associate(id, ispe_index, false);
        }

        for iovl in &derived.iovl {
            let mut inputs = Vec::new();
            for r in &iovl.refs {
                inputs.push(self.resolve_bsid(r.uniq_bsid, r.refs_index)?);
            }
            let id = self.new_item_id();
            self.items.push(ItemInfoEntry {
                item_id: id,
                item_type: FourCC::new(b"iovl"),
                item_name: ZString::new(""),
                ..ItemInfoEntry::default()
            });
            let payload = iovl_payload(iovl);
            let offset = self.idat.len() as u64;
            self.idat.extend_from_slice(&payload);
            self.storage.push((
                id,
                Storage::Idat {
                    offset,
                    length: payload.len() as u64,
                },
            ));
            self.add_reference(b"dimg", id, inputs);
            let ispe_index = self.add_property(
                ImageSpatialExtentsProperty {
                    image_width: iovl.output_width,
                    image_height: iovl.output_height,
                }
                .to_heifbox(),
            );
            self.associate(id, ispe_index, false);
        }
        Ok(())
    }

    /// One 'altr' entity group per idxs list.
    pub fn add_entity_groups(&mut self, egroups: &[manifest::Egroup]) -> io::Result<()> {
        for egroup in egroups {
            for list in &egroup.idxs_lists {
                let mut entity_ids = Vec::new();
                for r in list {
                    entity_ids.push(self.resolve_bsid(r.uniq_bsid, r.refs_index)?);
                }
                let group_id = self.next_group_id;
                self.next_group_id += 1;
                self.groups.push(EntityToGroupBox {
                    group_id,
                    entity_ids: entity_ids.into_iter().collect(),
                });
            }
        }
        Ok(())
    }

    pub fn set_primary_item(&mut self, item_id: u32) {
        self.primary_item = Some(item_id);
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Assemble the MetaBox; mdat extents get `mdat_payload_offset`
    /// added, which is 0 on the sizing pass.
    pub fn make_meta(&self, mdat_payload_offset: u64) -> MetaBox {
        let mut boxes: Vec<HeifBox> = Vec::new();

        boxes.push(
            HandlerBox {
                handler_type: FourCC::new(b"pict"),
                name: ZString::new(""),
            }
            .to_heifbox(),
        );
        if let Some(primary) = self.primary_item {
            boxes.push(PrimaryItemBox { item_id: primary }.to_heifbox());
        }

        let iinf = ItemInfoBox {
            entries: self.items.clone(),
        };
        boxes.push(iinf.to_heifbox());

        let mut iloc = ItemLocationBox::default();
        for &(item_id, storage) in &self.storage {
            let (construction_method, offset, length) = match storage {
                Storage::Mdat { offset, length } => (0u8, offset + mdat_payload_offset, length),
                Storage::Idat { offset, length } => (1u8, offset, length),
            };
            iloc.items.push(ItemLocationEntry {
                item_id,
                construction_method,
                data_reference_index: 0,
                base_offset: 0,
                extents: vec![ItemLocationExtent {
                    index: 0,
                    offset,
                    length,
                }],
            });
        }
        boxes.push(iloc.to_heifbox());

        if !self.references.is_empty() {
            boxes.push(
                ItemReferenceBox {
                    references: self.references.clone(),
                }
                .to_heifbox(),
            );
        }

        let iprp = ItemPropertiesBox {
            boxes: vec![
                ItemPropertyContainerBox {
                    boxes: self.properties.clone(),
                }
                .to_heifbox(),
                ItemPropertyAssociationBox {
                    entries: self.associations.clone(),
                }
                .to_heifbox(),
            ],
        };
        boxes.push(iprp.to_heifbox());

        if !self.idat.is_empty() {
            boxes.push(
                ItemDataBox {
                    data: crate::types::Data(self.idat.clone()),
                }
                .to_heifbox(),
            );
        }
        if !self.groups.is_empty() {
            let grpl = GroupsListBox {
                boxes: self.groups.iter().map(|g| g.clone().to_heifbox()).collect(),
            };
            boxes.push(grpl.to_heifbox());
        }

        MetaBox { boxes }
    }
}

fn fourcc_of(code_type: &str) -> io::Result<FourCC> {
    let b = code_type.as_bytes();
    if b.len() != 4 {
        return Err(ioerr!(InvalidData, "bad code type {:?}", code_type));
    }
    Ok(FourCC::new(&[b[0], b[1], b[2], b[3]]))
}

fn grid_payload(grid: &manifest::Grid) -> Vec<u8> {
    let wide = grid.output_width > u16::MAX as u32 || grid.output_height > u16::MAX as u32;
    let mut v = Vec::new();
    v.push(0); // version
    v.push(wide as u8); // flags
    v.push((grid.rows - 1) as u8);
    v.push((grid.columns - 1) as u8);
    if wide {
        v.extend_from_slice(&grid.output_width.to_be_bytes());
        v.extend_from_slice(&grid.output_height.to_be_bytes());
    } else {
        v.extend_from_slice(&(grid.output_width as u16).to_be_bytes());
        v.extend_from_slice(&(grid.output_height as u16).to_be_bytes());
    }
    v
}

fn iovl_payload(iovl: &manifest::Iovl) -> Vec<u8> {
    let wide = iovl.output_width > u16::MAX as u32
        || iovl.output_height > u16::MAX as u32
        || iovl
            .refs
            .iter()
            .any(|r| r.offset_x.abs() > i16::MAX as i32 || r.offset_y.abs() > i16::MAX as i32);
    let mut v = Vec::new();
    v.push(0); // version
    v.push(wide as u8); // flags
    for c in iovl.canvas_fill.iter() {
        v.extend_from_slice(&c.to_be_bytes());
    }
    if wide {
        v.extend_from_slice(&iovl.output_width.to_be_bytes());
        v.extend_from_slice(&iovl.output_height.to_be_bytes());
        for r in &iovl.refs {
            v.extend_from_slice(&r.offset_x.to_be_bytes());
            v.extend_from_slice(&r.offset_y.to_be_bytes());
        }
    } else {
        v.extend_from_slice(&(iovl.output_width as u16).to_be_bytes());
        v.extend_from_slice(&(iovl.output_height as u16).to_be_bytes());
        for r in &iovl.refs {
            v.extend_from_slice(&(r.offset_x as i16).to_be_bytes());
            v.extend_from_slice(&(r.offset_y as i16).to_be_bytes());
        }
    }
    v
}
