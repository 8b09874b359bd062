//! The file writer: composes a HEIF file from source bitstreams and a
//! declarative content manifest.
//!
//! Two-pass layout: all top level boxes are first written to scratch
//! buffers with zero offsets to discover their sizes, then the iloc /
//! stco offsets are recomputed and the boxes rewritten before the
//! final emit.
use std::io::Write;

pub mod manifest;
pub mod media;
pub mod meta;
pub mod track;

use crate::boxes::*;
use crate::error::{Error, Result};
use crate::io::MemBuffer;
use crate::serialize::ToBytes;
use crate::types::{Duration_, FourCC, Time};
use crate::writer::manifest::Manifest;
use crate::writer::media::parse_bitstream;
use crate::writer::meta::MetaWriter;
use crate::writer::track::{make_track, BuiltTrack, TrackRole};

const WRITER_VERSION_TAG: &str = "NHW_0.1.0";

/// Composes and writes one file.
pub struct FileWriter {
    meta_writer: MetaWriter,
    tracks: Vec<BuiltTrack>,
    movie_timescale: u32,
}

impl FileWriter {
    /// Write the file the manifest describes. Fails fast on any
    /// manifest inconsistency.
    pub fn write_file(config: &Manifest) -> Result<()> {
        let mut writer = FileWriter {
            meta_writer: MetaWriter::new(),
            tracks: Vec::new(),
            movie_timescale: 1000,
        };
        writer.create_content(config)?;
        writer.layout_and_emit(config)
    }

    fn create_content(&mut self, config: &Manifest) -> Result<()> {
        let mut next_track_id = 1u32;
        let mut next_alternate_group = 1u16;

        for content in &config.content {
            let master = &content.master;
            let parsed = parse_bitstream(&master.code_type, &master.file_path)?;

            match master.encp_type.as_str() {
                "meta" => {
                    let master_ids = self.meta_writer.add_master(content, &parsed)?;
                    for thumbs in &content.thumbs {
                        let tparsed = parse_bitstream(&thumbs.code_type, &thumbs.file_path)?;
                        self.meta_writer.add_thumbs(thumbs, &tparsed, &master_ids)?;
                    }
                    for metadata in &content.metadata {
                        self.meta_writer.add_metadata(metadata, &master_ids)?;
                    }
                    for aux in &content.auxiliary {
                        let aparsed = parse_bitstream(&aux.code_type, &aux.file_path)?;
                        self.meta_writer.add_auxiliary(aux, &aparsed, &master_ids)?;
                    }
                    for layer in &content.layers {
                        let lparsed = match layer.file_path.as_ref() {
                            Some(path) => Some(parse_bitstream(&layer.code_type, path)?),
                            None => None,
                        };
                        let base_ids = self.meta_writer.items_of_bsid(layer.base_refr);
                        if base_ids.is_empty() {
                            return Err(Error::MalformedBitstream(format!(
                                "layer {} names unknown base_refr {}",
                                layer.uniq_bsid, layer.base_refr
                            )));
                        }
                        self.meta_writer.add_layers(layer, lparsed.as_ref(), &base_ids)?;
                    }
                    if let Some(derived) = content.derived.as_ref() {
                        self.meta_writer.add_derived(derived)?;
                    }
                },
                "trak" => {
                    let alternate_group = if master.write_alternates {
                        let g = next_alternate_group;
                        next_alternate_group += 1;
                        g
                    } else {
                        0
                    };
                    self.movie_timescale = master.tick_rate;
                    let master_track_id = next_track_id;
                    next_track_id += 1;
                    self.tracks.push(make_track(
                        master,
                        &parsed,
                        master_track_id,
                        self.movie_timescale,
                        alternate_group,
                        TrackRole::Master,
                        &master.hdlr_type,
                    )?);
                    if master.make_vide && master.hdlr_type == "pict" {
                        // a 'vide' handler duplicate in the same
                        // alternate group.
                        let vide_id = next_track_id;
                        next_track_id += 1;
                        self.tracks.push(make_track(
                            master,
                            &parsed,
                            vide_id,
                            self.movie_timescale,
                            if alternate_group != 0 {
                                alternate_group
                            } else {
                                let g = next_alternate_group;
                                next_alternate_group += 1;
                                g
                            },
                            TrackRole::Master,
                            "vide",
                        )?);
                    }
                    for thumbs in &content.thumbs {
                        let tparsed = parse_bitstream(&thumbs.code_type, &thumbs.file_path)?;
                        let id = next_track_id;
                        next_track_id += 1;
                        self.tracks.push(make_track(
                            master,
                            &tparsed,
                            id,
                            self.movie_timescale,
                            0,
                            TrackRole::Thumb {
                                master_track_id,
                            },
                            &master.hdlr_type,
                        )?);
                    }
                    for aux in &content.auxiliary {
                        let aparsed = parse_bitstream(&aux.code_type, &aux.file_path)?;
                        let id = next_track_id;
                        next_track_id += 1;
                        self.tracks.push(make_track(
                            master,
                            &aparsed,
                            id,
                            self.movie_timescale,
                            0,
                            TrackRole::Aux {
                                master_track_id,
                                cfg: aux,
                            },
                            &master.hdlr_type,
                        )?);
                    }
                },
                other => {
                    return Err(Error::MalformedBitstream(format!(
                        "encp_type {:?} is not 'meta' or 'trak'",
                        other
                    )))
                },
            }
        }

        // entity groups and the primary item bind across contents.
        if self.meta_writer.has_items() {
            self.meta_writer.add_entity_groups(&config.egroups)?;
            let primary = self
                .meta_writer
                .resolve_bsid(config.general.prim_refr, config.general.prim_indx)
                .map_err(|e| Error::MalformedBitstream(e.to_string()))?;
            self.meta_writer.set_primary_item(primary);
        }
        Ok(())
    }

    fn make_ftyp(&self, config: &Manifest) -> Result<FileTypeBox> {
        let tag = |s: &str| -> Result<FourCC> {
            let b = s.as_bytes();
            if b.len() != 4 {
                return Err(Error::MalformedBitstream(format!("bad brand {:?}", s)));
            }
            Ok(FourCC::new(&[b[0], b[1], b[2], b[3]]))
        };
        let mut compatible = Vec::new();
        for b in &config.brands.compatible {
            compatible.push(tag(b)?);
        }
        Ok(FileTypeBox {
            major_brand: tag(&config.brands.major)?,
            minor_version: 0,
            compatible_brands: compatible,
        })
    }

    fn make_moov(&self) -> Option<MovieBox> {
        if self.tracks.is_empty() {
            return None;
        }
        let max_duration = self
            .tracks
            .iter()
            .map(|t| t.trak.track_header().duration.0)
            .max()
            .unwrap_or(0);
        let next_track_id = self
            .tracks
            .iter()
            .map(|t| t.trak.track_id())
            .max()
            .unwrap_or(0)
            + 1;
        let mut boxes = vec![MovieHeaderBox {
            timescale: self.movie_timescale,
            duration: Duration_(max_duration),
            cr_time: Time(0),
            mod_time: Time(0),
            next_track_id,
            ..MovieHeaderBox::default()
        }
        .to_heifbox()];
        for t in &self.tracks {
            boxes.push(t.trak.clone().to_heifbox());
        }
        Some(MovieBox { boxes })
    }

    fn serialized_size(b: &HeifBox) -> u64 {
        b.size()
    }

    fn layout_and_emit(&mut self, config: &Manifest) -> Result<()> {
        let ftyp = self.make_ftyp(config)?;
        let ftyp_size = Self::serialized_size(&ftyp.clone().to_heifbox());

        let has_meta = self.meta_writer.has_items();
        let meta_mdat_present = has_meta && !self.meta_writer.mdat.is_empty();
        let moov = self.make_moov();

        let moov_with_offsets = |moov: &MovieBox, offsets: &[u64]| -> MovieBox {
            let mut m = moov.clone();
            for (i, &offset) in offsets.iter().enumerate() {
                if let Some(trak) = iter_box_mut!(m.boxes, TrackBox).nth(i) {
                    trak.media_mut()
                        .media_info_mut()
                        .sample_table_mut()
                        .chunk_offset_table_mut()
                        .add_offset(offset as i64);
                }
            }
            m
        };

        // Tentative write with zero offsets to discover the box sizes,
        // then recompute. Offsets can grow a box (stco turning into
        // co64), so iterate until the layout is stable.
        let mut meta_payload_offset = 0u64;
        let mut track_payload_offsets = vec![0u64; self.tracks.len()];
        for _pass in 0..4 {
            let meta_size = if has_meta {
                Self::serialized_size(&self.meta_writer.make_meta(meta_payload_offset).to_heifbox())
            } else {
                0
            };
            let moov_size = moov
                .as_ref()
                .map(|m| Self::serialized_size(&moov_with_offsets(m, &track_payload_offsets).to_heifbox()))
                .unwrap_or(0);

            // mdat order after ftyp/meta/moov: the meta mdat, then one
            // mdat per track; each payload starts 8 bytes into its box.
            let mut cursor = ftyp_size + meta_size + moov_size;
            let new_meta_payload_offset = if meta_mdat_present {
                let o = cursor + 8;
                cursor += 8 + self.meta_writer.mdat.len() as u64;
                o
            } else {
                0
            };
            let mut new_track_offsets = Vec::with_capacity(self.tracks.len());
            for t in &self.tracks {
                new_track_offsets.push(cursor + 8);
                cursor += 8 + t.mdat.len() as u64;
            }

            let stable = new_meta_payload_offset == meta_payload_offset
                && new_track_offsets == track_payload_offsets;
            meta_payload_offset = new_meta_payload_offset;
            track_payload_offsets = new_track_offsets;
            if stable {
                break;
            }
        }

        // Final write with the resolved offsets.
        let mut buf = MemBuffer::new();
        ftyp.to_bytes(&mut buf)?;
        if has_meta {
            self.meta_writer.make_meta(meta_payload_offset).to_bytes(&mut buf)?;
        }
        if let Some(moov) = moov.as_ref() {
            moov_with_offsets(moov, &track_payload_offsets).to_bytes(&mut buf)?;
        }
        if meta_mdat_present {
            MediaDataBox {
                data: std::mem::take(&mut self.meta_writer.mdat),
                ..MediaDataBox::default()
            }
            .to_bytes(&mut buf)?;
        }
        for t in &mut self.tracks {
            MediaDataBox {
                data: std::mem::take(&mut t.mdat),
                ..MediaDataBox::default()
            }
            .to_bytes(&mut buf)?;
        }
        // trailing compatibility tag mdat.
        MediaDataBox {
            data: WRITER_VERSION_TAG.as_bytes().to_vec(),
            ..MediaDataBox::default()
        }
        .to_bytes(&mut buf)?;

        let mut file = std::fs::File::create(&config.output_path).map_err(Error::Io)?;
        file.write_all(&buf.into_vec()).map_err(Error::Io)?;
        Ok(())
    }
}
