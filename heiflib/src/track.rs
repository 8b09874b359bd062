//! Track level helpers: per-sample reconstruction from the sample
//! table, decode dependencies, timelines, and summary info.
use std::io;
use std::time::Duration;

use serde::Serialize;

use crate::boxes::*;
use crate::isobox::BoxInfo;
use crate::timeline::Timeline;
use crate::types::FourCC;

/// Information about one sample, fused from the stbl tables.
#[derive(Default, Debug, Clone)]
pub struct SampleInfo {
    /// Absolute file position.
    pub fpos: u64,
    pub size: u32,
    pub duration: u32,
    pub decode_time: u64,
    pub composition_delta: i32,
    pub is_sync: bool,
    /// 1-based chunk this sample lives in.
    pub chunk: u32,
    pub sample_description_index: u32,
}

/// Reconstruct the full per-sample table of a track.
pub fn sample_info_list(trak: &TrackBox) -> io::Result<Vec<SampleInfo>> {
    let minf = trak.media().media_info();
    let stbl = first_box!(&minf.boxes, SampleTableBox)
        .ok_or_else(|| ioerr!(InvalidData, "track {}: no sample table", trak.track_id()))?;
    if !stbl.is_valid() {
        return Err(ioerr!(InvalidData, "track {}: malformed sample table", trak.track_id()));
    }

    // stz2 widens into the plain form.
    let compact;
    let stsz = match first_box!(&stbl.boxes, CompactSampleSizeBox) {
        Some(stz2) => {
            compact = stz2.to_sample_size_box();
            &compact
        },
        None => stbl.sample_size(),
    };
    let sample_count = stsz.sample_count();

    let stts = stbl.time_to_sample();
    if stts.sample_count()? != sample_count {
        log::error!(
            "track {}: stts covers {} samples, stsz {}",
            trak.track_id(),
            stts.sample_count()?,
            sample_count
        );
    }
    let deltas = stts.sample_deltas()?;
    let times = stts.sample_times()?;
    let offsets = stbl.composition_time_to_sample().map(|c| c.sample_offsets());
    let sync = stbl.sync_samples().map(|s| s.sync_flags(sample_count));

    let stco = stbl.chunk_offset_table();
    let stsc = stbl.sample_to_chunk();

    let mut samples = Vec::with_capacity(sample_count as usize);
    let mut fpos = 0u64;
    let mut prev_chunk = 0u32;
    let mut chunk_iter = stsc.iter_samples(stco.len() as u32);
    for i in 0..sample_count as usize {
        let chunk_info = chunk_iter
            .next()
            .ok_or_else(|| ioerr!(InvalidData, "stsc does not cover all samples"))?;
        if chunk_info.chunk != prev_chunk {
            fpos = stco
                .get(chunk_info.chunk as usize - 1)
                .ok_or_else(|| ioerr!(InvalidData, "stsc names chunk {} outside stco", chunk_info.chunk))?;
            prev_chunk = chunk_info.chunk;
        }
        let size = stsz
            .size(i)
            .ok_or_else(|| ioerr!(InvalidData, "stsz does not cover sample {}", i))?;
        samples.push(SampleInfo {
            fpos,
            size,
            duration: deltas.get(i).copied().unwrap_or(0),
            decode_time: times.get(i).copied().unwrap_or(0),
            composition_delta: offsets.as_ref().and_then(|o| o.get(i)).copied().unwrap_or(0),
            is_sync: sync.as_ref().map(|s| s[i]).unwrap_or(true),
            chunk: chunk_info.chunk,
            sample_description_index: chunk_info.sample_description_index,
        });
        fpos += size as u64;
    }
    Ok(samples)
}

/// Decode dependencies of a sample via the 'refs' sample grouping.
///
/// Returned values are sample ids as declared in the group entries.
pub fn sample_decode_dependencies(stbl: &SampleTableBox, sample_index: u32) -> Vec<u32> {
    let sbgp = match stbl.sample_to_group() {
        Some(b) if b.grouping_type == b"refs" => b,
        _ => return Vec::new(),
    };
    let sgpd = match stbl.sample_group_description() {
        Some(b) if b.grouping_type == b"refs" => b,
        _ => return Vec::new(),
    };
    let group = sbgp.group_of_sample(sample_index);
    match sgpd.refs_entry(group) {
        Some(e) => e.direct_reference_sample_ids.clone(),
        None => Vec::new(),
    }
}

/// Sample id of a sample per the 'refs' grouping (0 when ungrouped).
pub fn sample_group_sample_id(stbl: &SampleTableBox, sample_index: u32) -> Option<u32> {
    let sbgp = stbl.sample_to_group().filter(|b| b.grouping_type == b"refs")?;
    let sgpd = stbl.sample_group_description().filter(|b| b.grouping_type == b"refs")?;
    sgpd.refs_entry(sbgp.group_of_sample(sample_index)).map(|e| e.sample_id)
}

/// Build the presentation timeline of a track.
pub fn track_timeline(trak: &TrackBox, movie_timescale: u32) -> io::Result<Timeline> {
    let media = trak.media();
    let media_timescale = media.media_header().timescale;
    let stbl = first_box!(&media.media_info().boxes, SampleTableBox)
        .ok_or_else(|| ioerr!(InvalidData, "track {}: no sample table", trak.track_id()))?;

    let mut tl = Timeline::new();
    tl.load_sample_times(stbl.time_to_sample(), stbl.composition_time_to_sample())?;
    if let Some(elst) = trak.edit_list() {
        tl.load_edit_list(&elst.entries, movie_timescale, media_timescale);
    }
    tl.unravel(0)?;
    Ok(tl)
}

/// General track information.
#[derive(Debug, Default, Serialize)]
pub struct TrackInfo {
    pub id: u32,
    pub track_type: String,
    #[serde(serialize_with = "seconds")]
    pub duration: Duration,
    pub size: u64,
    pub sample_count: u32,
    pub alternate_group: u16,
    pub specific_info: SpecificTrackInfo,
}

/// Track-type specific info.
#[derive(Serialize)]
#[serde(untagged)]
pub enum SpecificTrackInfo {
    VideoTrackInfo(VideoTrackInfo),
    MetadataTrackInfo(MetadataTrackInfo),
    UnknownTrackInfo(UnknownTrackInfo),
}

impl Default for SpecificTrackInfo {
    fn default() -> SpecificTrackInfo {
        SpecificTrackInfo::UnknownTrackInfo(UnknownTrackInfo {
            codec_id: "und".to_string(),
        })
    }
}

impl std::fmt::Debug for SpecificTrackInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SpecificTrackInfo::VideoTrackInfo(i) => std::fmt::Debug::fmt(i, f),
            SpecificTrackInfo::MetadataTrackInfo(i) => std::fmt::Debug::fmt(i, f),
            SpecificTrackInfo::UnknownTrackInfo(i) => std::fmt::Debug::fmt(i, f),
        }
    }
}

/// Image / video track details.
#[derive(Debug, Default, Serialize)]
pub struct VideoTrackInfo {
    pub codec_id: String,
    pub width: u16,
    pub height: u16,
}

/// Timed metadata track details.
#[derive(Debug, Default, Serialize)]
pub struct MetadataTrackInfo {
    pub codec_id: String,
    pub mime_format: Option<String>,
}

/// Anything else.
#[derive(Debug, Default, Serialize)]
pub struct UnknownTrackInfo {
    pub codec_id: String,
}

/// Extract general track information for all tracks in the movie.
pub fn track_info(movie: &MovieBox) -> Vec<TrackInfo> {
    let mut v = Vec::new();
    let mvhd = movie.movie_header();

    for track in &movie.tracks() {
        let mut info = TrackInfo::default();

        let tkhd = track.track_header();
        info.id = tkhd.track_id;
        info.alternate_group = tkhd.alternate_group;
        info.duration = Duration::from_millis((1000 * tkhd.duration.0) / (mvhd.timescale.max(1) as u64));

        let mdia = track.media();
        let mdhd = mdia.media_header();
        if mdhd.duration.0 != 0 {
            info.duration =
                Duration::from_millis((1000 * mdhd.duration.0) / (mdhd.timescale.max(1) as u64));
        }

        if let Some(hdlr) = mdia.handler() {
            info.track_type = hdlr.handler_type.to_string();
        }

        let stbl = mdia.media_info().sample_table();
        info.size = stbl.sample_size().total_size();
        info.sample_count = stbl.sample_size().sample_count();

        let stsd = stbl.sample_description();
        info.specific_info = sample_entry_info(stsd);
        v.push(info)
    }
    v
}

fn sample_entry_info(stsd: &SampleDescriptionBox) -> SpecificTrackInfo {
    for entry in &stsd.entries {
        match entry {
            HeifBox::AvcSampleEntry(e) => {
                let codec_id = e
                    .configuration()
                    .map(|c| c.codec_id())
                    .unwrap_or_else(|| format!("{}.unknown", e.fourcc));
                return SpecificTrackInfo::VideoTrackInfo(VideoTrackInfo {
                    codec_id,
                    width: e.fields.width,
                    height: e.fields.height,
                });
            },
            HeifBox::HevcSampleEntry(e) => {
                let codec_id = e
                    .configuration()
                    .map(|c| c.codec_id())
                    .unwrap_or_else(|| format!("{}.unknown", e.fourcc));
                return SpecificTrackInfo::VideoTrackInfo(VideoTrackInfo {
                    codec_id,
                    width: e.fields.width,
                    height: e.fields.height,
                });
            },
            HeifBox::LhevcSampleEntry(e) => {
                return SpecificTrackInfo::VideoTrackInfo(VideoTrackInfo {
                    codec_id: e.fourcc.to_string(),
                    width: e.fields.width,
                    height: e.fields.height,
                });
            },
            HeifBox::MetadataSampleEntry(e) => {
                return SpecificTrackInfo::MetadataTrackInfo(MetadataTrackInfo {
                    codec_id: e.fourcc.to_string(),
                    mime_format: e.mime_format().map(|s| s.to_string()),
                });
            },
            _ => {},
        }
    }
    let id = stsd
        .entries
        .iter()
        .next()
        .map(|e| e.fourcc().to_string())
        .unwrap_or_else(|| "unkn".to_string());
    SpecificTrackInfo::UnknownTrackInfo(UnknownTrackInfo { codec_id: id })
}

// Serialize helper.
fn seconds<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(value.as_millis() as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Duration_, IsoLanguageCode, Time};

    fn minimal_track(chunk_offsets: Vec<u64>, sizes: Vec<u32>, stsc_entries: Vec<SampleToChunkEntry>) -> TrackBox {
        let mut stts = TimeToSampleBox::default();
        for _ in 0..sizes.len() {
            stts.push(100);
        }
        let mut stsz = SampleSizeBox::default();
        for s in sizes {
            stsz.push(s);
        }
        let mut stsc = SampleToChunkBox::default();
        for e in stsc_entries {
            stsc.entries.push(e);
        }
        let mut stco = ChunkOffsetBox::default();
        for o in chunk_offsets {
            stco.push(o);
        }
        let stbl = SampleTableBox {
            boxes: vec![
                SampleDescriptionBox::default().to_heifbox(),
                stts.to_heifbox(),
                stsc.to_heifbox(),
                stco.to_heifbox(),
                stsz.to_heifbox(),
            ],
        };
        let minf = MediaInformationBox {
            boxes: vec![stbl.to_heifbox()],
        };
        let mdia = MediaBox {
            boxes: vec![
                MediaHeaderBox {
                    cr_time: Time(0),
                    mod_time: Time(0),
                    timescale: 1000,
                    duration: Duration_(0),
                    language: IsoLanguageCode::default(),
                    quality: 0,
                }
                .to_heifbox(),
                minf.to_heifbox(),
            ],
        };
        TrackBox {
            boxes: vec![TrackHeaderBox::default().to_heifbox(), mdia.to_heifbox()],
        }
    }

    #[test]
    fn sample_positions_follow_chunks() {
        // chunk 1 at 1000 with 2 samples, chunk 2 at 5000 with 1.
        let trak = minimal_track(
            vec![1000, 5000],
            vec![10, 20, 30],
            vec![
                SampleToChunkEntry {
                    first_chunk: 1,
                    samples_per_chunk: 2,
                    sample_description_index: 1,
                },
                SampleToChunkEntry {
                    first_chunk: 2,
                    samples_per_chunk: 1,
                    sample_description_index: 1,
                },
            ],
        );
        let samples = sample_info_list(&trak).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].fpos, 1000);
        assert_eq!(samples[1].fpos, 1010);
        assert_eq!(samples[2].fpos, 5000);
        assert!(samples.iter().all(|s| s.is_sync));
        assert_eq!(samples[2].decode_time, 200);
    }
}
