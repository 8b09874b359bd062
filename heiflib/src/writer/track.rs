//! Builds image sequence tracks for the writer: the trak box tree and
//! the matching mdat payload.
use std::io;

use crate::boxes::*;
use crate::types::{Duration_, FixedFloat16_16, FourCC, IsoLanguageCode, Time, ZString};
use crate::writer::manifest;
use crate::writer::media::ParsedBitstream;

/// A track plus its media payload; stco offsets are relative to the
/// payload start until the final layout pass patches them.
pub struct BuiltTrack {
    pub trak: TrackBox,
    pub mdat: Vec<u8>,
}

/// What this track is, relative to its master.
pub enum TrackRole<'a> {
    Master,
    Thumb { master_track_id: u32 },
    Aux { master_track_id: u32, cfg: &'a manifest::Auxiliary },
}

pub fn make_track(
    master: &manifest::Master,
    parsed: &ParsedBitstream,
    track_id: u32,
    movie_timescale: u32,
    alternate_group: u16,
    role: TrackRole,
    handler_type: &str,
) -> io::Result<BuiltTrack> {
    if master.disp_rate == 0 || master.tick_rate == 0 {
        return Err(ioerr!(InvalidData, "track: disp_rate / tick_rate must be non-zero"));
    }
    let sample_duration = master.tick_rate / master.disp_rate;
    let sample_count = parsed.images.len() as u32;
    let media_duration = sample_count as u64 * sample_duration as u64;

    // media payload, decode order.
    let mut mdat = Vec::new();
    let mut stsz = SampleSizeBox::default();
    for image in &parsed.images {
        stsz.push(image.data.len() as u32);
        mdat.extend_from_slice(&image.data);
    }

    let mut stts = TimeToSampleBox::default();
    for _ in 0..sample_count {
        stts.push(sample_duration);
    }

    // composition offsets from decode vs display order.
    let mut ctts = CompositionOffsetBox::default();
    let mut need_ctts = false;
    for image in &parsed.images {
        let delta = (image.display_order as i64 - image.decode_order as i64)
            * sample_duration as i64;
        if delta != 0 {
            need_ctts = true;
        }
        ctts.push(delta as i32);
    }

    let mut stsc = SampleToChunkBox::default();
    stsc.entries.push(SampleToChunkEntry {
        first_chunk: 1,
        samples_per_chunk: sample_count,
        sample_description_index: 1,
    });
    let mut stco = ChunkOffsetBox::default();
    stco.push(0);

    let mut stss = SyncSampleBox::default();
    let all_sync = parsed.images.iter().all(|i| i.is_sync);
    for (i, image) in parsed.images.iter().enumerate() {
        if image.is_sync {
            stss.entries.push(i as u32 + 1);
        }
    }

    // 'refs' sample grouping for decoding dependencies.
    let has_refs = parsed.images.iter().any(|i| !i.ref_indices.is_empty());
    let mut sbgp = SampleToGroupBox {
        grouping_type: FourCC::new(b"refs"),
        grouping_type_parameter: None,
        entries: Vec::new(),
    };
    let mut sgpd = SampleGroupDescriptionBox {
        grouping_type: FourCC::new(b"refs"),
        default_length: 0,
        entries: Vec::new(),
    };
    if has_refs {
        for (i, image) in parsed.images.iter().enumerate() {
            sgpd.entries.push(SampleGroupEntry::Refs(DirectReferenceSamplesList {
                sample_id: i as u32 + 1,
                direct_reference_sample_ids: image
                    .ref_indices
                    .iter()
                    .map(|&r| r as u32 + 1)
                    .collect(),
            }));
            sbgp.entries.push(SampleToGroupEntry {
                sample_count: 1,
                group_description_index: i as u32 + 1,
            });
        }
    }

    let sample_entry = make_sample_entry(master, parsed, &role)?;

    let mut stbl_boxes = vec![
        SampleDescriptionBox {
            entries: vec![sample_entry].into_iter().collect(),
        }
        .to_heifbox(),
        stts.to_heifbox(),
    ];
    if need_ctts {
        stbl_boxes.push(ctts.to_heifbox());
    }
    stbl_boxes.push(stsc.to_heifbox());
    stbl_boxes.push(stco.to_heifbox());
    stbl_boxes.push(stsz.to_heifbox());
    if !all_sync {
        stbl_boxes.push(stss.to_heifbox());
    }
    if has_refs {
        stbl_boxes.push(sbgp.to_heifbox());
        stbl_boxes.push(sgpd.to_heifbox());
    }
    let stbl = SampleTableBox { boxes: stbl_boxes };

    let header = if handler_type == "vide" {
        VideoMediaHeaderBox::default().to_heifbox()
    } else {
        NullMediaHeaderBox::default().to_heifbox()
    };
    let minf = MediaInformationBox {
        boxes: vec![header, DataInformationBox::default().to_heifbox(), stbl.to_heifbox()],
    };

    let hdlr_tag = match handler_type {
        "vide" => FourCC::new(b"vide"),
        "meta" => FourCC::new(b"meta"),
        _ => FourCC::new(b"pict"),
    };
    let mdia = MediaBox {
        boxes: vec![
            MediaHeaderBox {
                cr_time: Time(0),
                mod_time: Time(0),
                timescale: master.tick_rate,
                duration: Duration_(media_duration),
                language: IsoLanguageCode::default(),
                quality: 0,
            }
            .to_heifbox(),
            HandlerBox {
                handler_type: hdlr_tag,
                name: ZString::new(""),
            }
            .to_heifbox(),
            minf.to_heifbox(),
        ],
    };

    let movie_duration = media_duration * movie_timescale as u64 / master.tick_rate as u64;
    let mut tkhd = TrackHeaderBox::default();
    tkhd.track_id = track_id;
    tkhd.duration = Duration_(movie_duration);
    tkhd.alternate_group = alternate_group;
    tkhd.width = FixedFloat16_16((parsed.width.min(u16::MAX as u32) as u32) << 16);
    tkhd.height = FixedFloat16_16((parsed.height.min(u16::MAX as u32) as u32) << 16);

    let mut trak_boxes = vec![tkhd.to_heifbox()];

    match role {
        TrackRole::Master => {},
        TrackRole::Thumb { master_track_id } => {
            trak_boxes.push(
                TrackReferenceBox {
                    references: vec![TrackReference {
                        reference_type: FourCC::new(b"thmb"),
                        track_ids: vec![master_track_id],
                    }],
                }
                .to_heifbox(),
            );
        },
        TrackRole::Aux { master_track_id, .. } => {
            trak_boxes.push(
                TrackReferenceBox {
                    references: vec![TrackReference {
                        reference_type: FourCC::new(b"auxl"),
                        track_ids: vec![master_track_id],
                    }],
                }
                .to_heifbox(),
            );
        },
    }

    if let Some(elst_cfg) = master.edit_list.as_ref() {
        let elst = make_edit_list(elst_cfg, movie_timescale, master.tick_rate, media_duration)?;
        trak_boxes.push(
            EditBox {
                boxes: vec![elst],
            }
            .to_heifbox(),
        );
    }

    trak_boxes.push(mdia.to_heifbox());

    Ok(BuiltTrack {
        trak: TrackBox { boxes: trak_boxes },
        mdat,
    })
}

fn make_sample_entry(
    master: &manifest::Master,
    parsed: &ParsedBitstream,
    role: &TrackRole,
) -> io::Result<HeifBox> {
    let mut fields = crate::boxes::stsd::VisualSampleEntryFields::default();
    fields.width = parsed.width.min(u16::MAX as u32) as u16;
    fields.height = parsed.height.min(u16::MAX as u32) as u16;

    let mut boxes = vec![parsed.config.clone()];
    if let Some(ccst) = master.ccst.as_ref() {
        boxes.push(
            CodingConstraintsBox::new(
                ccst.all_ref_pics_intra,
                ccst.intra_pred_used,
                ccst.max_ref_per_pic,
            )
            .to_heifbox(),
        );
    }
    if let TrackRole::Aux { cfg, .. } = role {
        // the auxiliary type of an aux track rides in the sample entry.
        boxes.push(
            AuxiliaryTypeProperty {
                aux_type: ZString::new(&cfg.aux_type),
                aux_subtype: crate::types::Data(cfg.sub_type.clone()),
            }
            .to_heifbox(),
        );
    }

    let entry = match parsed.code_type.as_str() {
        "avc1" | "avc3" => AvcSampleEntry {
            fourcc: tag_of(&parsed.code_type),
            fields,
            boxes,
        }
        .to_heifbox(),
        "hvc1" | "hev1" => HeifBox::HevcSampleEntry(HevcSampleEntry {
            fourcc: tag_of(&parsed.code_type),
            fields,
            boxes,
        }),
        "lhv1" | "lhe1" => HeifBox::LhevcSampleEntry(LhevcSampleEntry {
            fourcc: tag_of(&parsed.code_type),
            fields,
            boxes,
        }),
        other => return Err(ioerr!(Unsupported, "code type {} has no sample entry", other)),
    };
    Ok(entry)
}

fn tag_of(s: &str) -> FourCC {
    let b = s.as_bytes();
    FourCC::new(&[b[0], b[1], b[2], b[3]])
}

fn make_edit_list(
    cfg: &manifest::EditList,
    _movie_timescale: u32,
    _media_timescale: u32,
    media_duration: u64,
) -> io::Result<EditListBox> {
    let mut elst = EditListBox::default();
    let repeat = std::cmp::max(1, 1 + cfg.numb_rept) as usize;
    for _ in 0..repeat {
        for e in &cfg.entries {
            let entry = match e.edit_type.as_str() {
                "empty" => EditListEntry {
                    segment_duration: e.duration,
                    media_time: -1,
                    media_rate_integer: 1,
                    media_rate_fraction: 0,
                },
                "dwell" => EditListEntry {
                    segment_duration: e.duration,
                    media_time: e.media_time,
                    media_rate_integer: 0,
                    media_rate_fraction: 0,
                },
                "shift" => EditListEntry {
                    segment_duration: if e.duration == 0 { media_duration } else { e.duration },
                    media_time: e.media_time,
                    media_rate_integer: e.media_rate_integer.unwrap_or(1),
                    media_rate_fraction: e.media_rate_fraction.unwrap_or(0),
                },
                other => return Err(ioerr!(InvalidData, "edit type {} unknown", other)),
            };
            elst.entries.push(entry);
        }
    }
    Ok(elst)
}
