//! The HEIF reader: contexts, the item graph, property lookup, data
//! materialization and timestamps.
//!
//! A *context* is either the file level meta box (context id 0) or a
//! track (context id = track id). Meta items are addressed by their
//! infe item id, track "items" are 0-based sample indices.
use std::collections::HashMap;

use serde::Serialize;

use crate::boxes::*;
use crate::error::{Error, Result};
use crate::io::{HeifFile, SliceReader};
use crate::isobox::{BoxInfo, Heif};
use crate::serialize::{FromBytes, ReadBytes};
use crate::timeline::Timeline;
use crate::track::{sample_decode_dependencies, sample_info_list, track_timeline, SampleInfo};
use crate::types::FourCC;

pub const META_CONTEXT_ID: u32 = 0;

/// Which kind of context an id names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ContextKind {
    Meta,
    Track(usize),
}

/// Feature summary of the file, computed during initialize.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FileProperties {
    pub has_single_image: bool,
    pub has_image_collection: bool,
    pub has_image_sequence: bool,
    pub has_cover_image: bool,
    pub has_alternate_tracks: bool,
    pub meta_context: Option<MetaBoxProperties>,
    pub tracks: Vec<TrackContextProperties>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct MetaBoxProperties {
    pub context_id: u32,
    pub has_master_images: bool,
    pub has_thumbnails: bool,
    pub has_auxiliary_images: bool,
    pub has_derived_images: bool,
    pub has_pre_derived_images: bool,
    pub has_hidden_images: bool,
    pub has_item_metadata: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TrackContextProperties {
    pub context_id: u32,
    pub handler: String,
    pub sample_count: u32,
    pub has_thumbnails: bool,
    pub has_auxiliary: bool,
    pub is_alternate: bool,
}

/// A typed item property, as returned by the property getters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemPropertyType {
    Ispe,
    Irot,
    Imir,
    Clap,
    AuxC,
    Rloc,
    Lsel,
    Tols,
    Oinf,
    AvcC,
    HvcC,
    LhvC,
    Unknown,
}

/// One entry of `get_item_properties`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ItemPropertyInfo {
    pub property_type: ItemPropertyType,
    /// 1-based index under ipco, usable with the `get_property_*` calls.
    pub index: u32,
    pub essential: bool,
}

/// A parsed 'grid' derived item payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridItem {
    pub rows: u16,
    pub columns: u16,
    pub output_width: u32,
    pub output_height: u32,
    /// Tile items in row-major order (the dimg references).
    pub input_item_ids: Vec<u32>,
}

/// A parsed 'iovl' derived item payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IovlItem {
    pub canvas_fill_value: [u16; 4],
    pub output_width: u32,
    pub output_height: u32,
    pub offsets: Vec<(i32, i32)>,
    pub input_item_ids: Vec<u32>,
}

/// Decoder parameter sets of an item, keyed by set kind.
#[derive(Debug, Clone, Default)]
pub struct DecoderParameterSets {
    pub code_type: FourCC,
    /// ("VPS" | "SPS" | "PPS", NAL unit bytes)
    pub sets: Vec<(&'static str, Vec<u8>)>,
}

#[derive(PartialEq)]
enum State {
    Uninitialized,
    Ready,
}

struct TrackContext {
    track_id: u32,
    samples: Vec<SampleInfo>,
    timeline: Timeline,
}

/// The reader.
pub struct HeifReader {
    state: State,
    file: Option<HeifFile>,
    heif: Option<Heif>,
    contexts: HashMap<u32, ContextKind>,
    tracks: Vec<TrackContext>,
    file_properties: FileProperties,
    forced_fps: HashMap<u32, f64>,
    forced_loop: HashMap<u32, bool>,
}

impl HeifReader {
    /// A reader with no file bound yet.
    pub fn new() -> HeifReader {
        HeifReader {
            state: State::Uninitialized,
            file: None,
            heif: None,
            contexts: HashMap::new(),
            tracks: Vec::new(),
            file_properties: FileProperties::default(),
            forced_fps: HashMap::new(),
            forced_loop: HashMap::new(),
        }
    }

    /// Open and validate a file.
    pub fn open(path: impl AsRef<str>) -> Result<HeifReader> {
        let mut reader = HeifReader::new();
        reader.initialize(path)?;
        Ok(reader)
    }

    /// Open the file, validate the ftyp brands and populate the item /
    /// track graph.
    pub fn initialize(&mut self, path: impl AsRef<str>) -> Result<()> {
        let mut file = HeifFile::open(path.as_ref()).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(e),
            _ => Error::from(e),
        })?;
        let heif = Heif::read(&mut file)?;

        let ftyp = heif
            .file_type()
            .ok_or_else(|| Error::MalformedBitstream("no ftyp box".to_string()))?;
        let supported = [
            FourCC::new(b"heic"),
            FourCC::new(b"heix"),
            FourCC::new(b"hevc"),
            FourCC::new(b"mif1"),
            FourCC::new(b"msf1"),
            FourCC::new(b"avci"),
            FourCC::new(b"avcs"),
        ];
        if !supported.iter().any(|b| ftyp.compatible_with(b)) {
            return Err(Error::UnsupportedFeature(format!(
                "no supported brand in ftyp (major {})",
                ftyp.major_brand
            )));
        }

        self.contexts.clear();
        self.tracks.clear();
        if heif.meta().is_some() {
            self.contexts.insert(META_CONTEXT_ID, ContextKind::Meta);
        }
        if let Some(moov) = heif.movie() {
            if !moov.is_valid() {
                return Err(Error::MalformedBitstream("movie box is malformed".to_string()));
            }
            let movie_timescale = moov.movie_header().timescale;
            for (i, trak) in moov.tracks().iter().enumerate() {
                if !trak.is_valid() {
                    return Err(Error::MalformedBitstream(format!(
                        "track {} is malformed",
                        trak.track_id()
                    )));
                }
                let samples = sample_info_list(trak)?;
                let timeline = track_timeline(trak, movie_timescale)?;
                self.contexts.insert(trak.track_id(), ContextKind::Track(i));
                self.tracks.push(TrackContext {
                    track_id: trak.track_id(),
                    samples,
                    timeline,
                });
            }
        }
        if self.contexts.is_empty() {
            return Err(Error::MalformedBitstream(
                "file has neither a meta box nor a movie box".to_string(),
            ));
        }

        self.file = Some(file);
        self.heif = Some(heif);
        self.state = State::Ready;
        self.file_properties = self.compute_file_properties()?;
        Ok(())
    }

    /// Release the stream and reset to the uninitialized state.
    pub fn close(&mut self) {
        self.state = State::Uninitialized;
        self.file = None;
        self.heif = None;
        self.contexts.clear();
        self.tracks.clear();
        self.file_properties = FileProperties::default();
        self.forced_fps.clear();
        self.forced_loop.clear();
    }

    fn heif(&self) -> Result<&Heif> {
        if self.state != State::Ready {
            return Err(Error::Uninitialized);
        }
        self.heif.as_ref().ok_or(Error::Uninitialized)
    }

    fn file(&self) -> Result<&HeifFile> {
        if self.state != State::Ready {
            return Err(Error::Uninitialized);
        }
        self.file.as_ref().ok_or(Error::Uninitialized)
    }

    fn context(&self, context_id: u32) -> Result<ContextKind> {
        if self.state != State::Ready {
            return Err(Error::Uninitialized);
        }
        self.contexts
            .get(&context_id)
            .copied()
            .ok_or(Error::InvalidContext(context_id))
    }

    fn meta(&self) -> Result<&MetaBox> {
        self.heif()?
            .meta()
            .ok_or(Error::InvalidContext(META_CONTEXT_ID))
    }

    fn track(&self, context_id: u32) -> Result<&TrackContext> {
        match self.context(context_id)? {
            ContextKind::Track(_) => self
                .tracks
                .iter()
                .find(|t| t.track_id == context_id)
                .ok_or(Error::InvalidContext(context_id)),
            ContextKind::Meta => Err(Error::NotApplicable("not a track context")),
        }
    }

    fn track_box(&self, context_id: u32) -> Result<&TrackBox> {
        match self.context(context_id)? {
            ContextKind::Track(i) => {
                let movie = self.heif()?.movie().ok_or(Error::InvalidContext(context_id))?;
                movie
                    .tracks()
                    .get(i)
                    .copied()
                    .ok_or(Error::InvalidContext(context_id))
            },
            ContextKind::Meta => Err(Error::NotApplicable("not a track context")),
        }
    }

    //
    // ftyp accessors.
    //

    pub fn get_major_brand(&self) -> Result<String> {
        Ok(self.heif()?.file_type().map(|f| f.major_brand.to_string()).unwrap_or_default())
    }

    pub fn get_minor_version(&self) -> Result<u32> {
        Ok(self.heif()?.file_type().map(|f| f.minor_version).unwrap_or(0))
    }

    pub fn get_compatible_brands(&self) -> Result<Vec<String>> {
        Ok(self
            .heif()?
            .file_type()
            .map(|f| f.compatible_brands.iter().map(|b| b.to_string()).collect())
            .unwrap_or_default())
    }

    //
    // file level summary.
    //

    pub fn get_file_properties(&self) -> Result<&FileProperties> {
        if self.state != State::Ready {
            return Err(Error::Uninitialized);
        }
        Ok(&self.file_properties)
    }

    fn compute_file_properties(&self) -> Result<FileProperties> {
        let mut props = FileProperties::default();

        if self.contexts.contains_key(&META_CONTEXT_ID) {
            let meta = self.meta()?;
            let mut mp = MetaBoxProperties {
                context_id: META_CONTEXT_ID,
                ..MetaBoxProperties::default()
            };
            let masters = self.master_item_ids(meta);
            mp.has_master_images = !masters.is_empty();
            props.has_single_image = masters.len() == 1;
            props.has_image_collection = masters.len() > 1;
            props.has_cover_image = meta.primary_item().is_some();
            if let Some(iref) = meta.item_reference() {
                mp.has_thumbnails = iref.by_type(FourCC::new(b"thmb")).next().is_some();
                mp.has_auxiliary_images = iref.by_type(FourCC::new(b"auxl")).next().is_some();
                mp.has_pre_derived_images = iref.by_type(FourCC::new(b"base")).next().is_some();
            }
            if let Some(iinf) = meta.item_info() {
                mp.has_derived_images = iinf.entries.iter().any(|e| {
                    e.item_type == b"grid" || e.item_type == b"iovl" || e.item_type == b"iden"
                });
                mp.has_hidden_images = iinf.entries.iter().any(|e| e.hidden);
                mp.has_item_metadata = iinf
                    .entries
                    .iter()
                    .any(|e| e.item_type == b"Exif" || e.item_type == b"mime" || e.item_type == b"uri ");
            }
            props.meta_context = Some(mp);
        }

        if let Some(movie) = self.heif()?.movie() {
            let mut groups: HashMap<u16, u32> = HashMap::new();
            for trak in movie.tracks() {
                let tkhd = trak.track_header();
                if tkhd.alternate_group != 0 {
                    *groups.entry(tkhd.alternate_group).or_insert(0) += 1;
                }
                let handler = trak
                    .handler_type()
                    .map(|h| h.to_string())
                    .unwrap_or_default();
                if handler == "pict" {
                    props.has_image_sequence = true;
                }
                let tref = trak.track_reference();
                props.tracks.push(TrackContextProperties {
                    context_id: trak.track_id(),
                    handler,
                    sample_count: trak
                        .media()
                        .media_info()
                        .sample_table()
                        .sample_size()
                        .sample_count(),
                    has_thumbnails: tref
                        .map(|r| !r.by_type(FourCC::new(b"thmb")).is_empty())
                        .unwrap_or(false),
                    has_auxiliary: tref
                        .map(|r| !r.by_type(FourCC::new(b"auxl")).is_empty())
                        .unwrap_or(false),
                    is_alternate: tkhd.alternate_group != 0,
                });
            }
            props.has_alternate_tracks = groups.values().any(|&n| n > 1);
        }
        Ok(props)
    }

    //
    // dimensions and playback.
    //

    pub fn get_display_width(&self, context_id: u32) -> Result<u32> {
        let trak = self.track_box(context_id)?;
        Ok(trak.track_header().width.get() as u32)
    }

    pub fn get_display_height(&self, context_id: u32) -> Result<u32> {
        let trak = self.track_box(context_id)?;
        Ok(trak.track_header().height.get() as u32)
    }

    /// Width of one item, from its associated ispe property.
    pub fn get_width(&self, context_id: u32, item_id: u32) -> Result<u32> {
        self.item_extents(context_id, item_id).map(|(w, _)| w)
    }

    /// Height of one item, from its associated ispe property.
    pub fn get_height(&self, context_id: u32, item_id: u32) -> Result<u32> {
        self.item_extents(context_id, item_id).map(|(_, h)| h)
    }

    fn item_extents(&self, context_id: u32, item_id: u32) -> Result<(u32, u32)> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let meta = self.meta()?;
                self.check_item(meta, item_id)?;
                let iprp = meta
                    .item_properties()
                    .ok_or(Error::InvalidItemId(item_id))?;
                for assoc in iprp.item_associations(item_id) {
                    if let Some(HeifBox::ImageSpatialExtentsProperty(ispe)) =
                        iprp.property(assoc.property_index)
                    {
                        return Ok((ispe.image_width, ispe.image_height));
                    }
                }
                Err(Error::InvalidPropertyIndex(0))
            },
            ContextKind::Track(_) => {
                let trak = self.track_box(context_id)?;
                let tkhd = trak.track_header();
                let _ = self.track_sample(context_id, item_id)?;
                Ok((tkhd.width.get() as u32, tkhd.height.get() as u32))
            },
        }
    }

    /// The transformation matrix of the movie header.
    pub fn get_matrix(&self) -> Result<Vec<i32>> {
        let movie = self
            .heif()?
            .movie()
            .ok_or(Error::NotApplicable("no movie box in this file"))?;
        Ok(movie.movie_header().matrix.values())
    }

    pub fn get_playback_duration_in_secs(&self, context_id: u32) -> Result<f64> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let n = self.master_item_ids(self.meta()?).len() as f64;
                match self.forced_fps.get(&context_id) {
                    Some(fps) if *fps > 0.0 => Ok(n / fps),
                    _ => Ok(0.0),
                }
            },
            ContextKind::Track(_) => {
                let track = self.track(context_id)?;
                let timescale = self
                    .track_box(context_id)?
                    .media()
                    .media_header()
                    .timescale
                    .max(1);
                Ok(track.timeline.span() as f64 / timescale as f64)
            },
        }
    }

    /// Override the timing policy of a context with a fixed frame rate.
    pub fn set_forced_timed_playback(&mut self, context_id: u32, fps: f64) -> Result<()> {
        self.context(context_id)?;
        self.forced_fps.insert(context_id, fps);
        Ok(())
    }

    /// Force looping playback of a context.
    pub fn set_forced_loop_playback(&mut self, context_id: u32, force: bool) -> Result<()> {
        self.context(context_id)?;
        self.forced_loop.insert(context_id, force);
        Ok(())
    }

    pub fn get_forced_loop_playback(&self, context_id: u32) -> Result<bool> {
        self.context(context_id)?;
        Ok(self.forced_loop.get(&context_id).copied().unwrap_or(false))
    }

    //
    // item enumeration.
    //

    /// Items of a context filtered by a type tag.
    ///
    /// Meta contexts understand the infe fourccs plus the pseudo types
    /// "master", "thumb", "aux" and "hidden". Track contexts understand
    /// "master" (all samples), "sync" and "nonsync".
    pub fn get_item_list_by_type(&self, context_id: u32, item_type: &str) -> Result<Vec<u32>> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let meta = self.meta()?;
                let iinf = meta.item_info().ok_or(Error::InvalidContext(context_id))?;
                let v = match item_type {
                    "master" => self.master_item_ids(meta),
                    "thumb" => self.referencing_item_ids(meta, FourCC::new(b"thmb")),
                    "aux" => self.referencing_item_ids(meta, FourCC::new(b"auxl")),
                    "hidden" => iinf
                        .entries
                        .iter()
                        .filter(|e| e.hidden)
                        .map(|e| e.item_id)
                        .collect(),
                    t => {
                        let tag = type_tag(t)?;
                        iinf.entries
                            .iter()
                            .filter(|e| e.item_type == tag)
                            .map(|e| e.item_id)
                            .collect()
                    },
                };
                Ok(v)
            },
            ContextKind::Track(_) => {
                let track = self.track(context_id)?;
                let v = match item_type {
                    "master" => (0..track.samples.len() as u32).collect(),
                    "sync" => track
                        .samples
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.is_sync)
                        .map(|(i, _)| i as u32)
                        .collect(),
                    "nonsync" => track
                        .samples
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| !s.is_sync)
                        .map(|(i, _)| i as u32)
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(v)
            },
        }
    }

    /// The type tag of one item.
    pub fn get_item_type(&self, context_id: u32, item_id: u32) -> Result<FourCC> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let meta = self.meta()?;
                let iinf = meta.item_info().ok_or(Error::InvalidItemId(item_id))?;
                iinf.by_item_id(item_id)
                    .map(|e| e.item_type)
                    .ok_or(Error::InvalidItemId(item_id))
            },
            ContextKind::Track(_) => {
                let sample = self.track_sample(context_id, item_id)?;
                let stbl = self.track_box(context_id)?.media().media_info().sample_table();
                stbl.sample_description()
                    .entry_type(sample.sample_description_index as u16)
                    .ok_or(Error::InvalidSampleDescriptionIndex(
                        sample.sample_description_index,
                    ))
            },
        }
    }

    // Coded master images: not hidden, not thumbnails, not auxiliary.
    fn master_item_ids(&self, meta: &MetaBox) -> Vec<u32> {
        let iinf = match meta.item_info() {
            Some(iinf) => iinf,
            None => return Vec::new(),
        };
        let coded = [
            FourCC::new(b"hvc1"),
            FourCC::new(b"avc1"),
            FourCC::new(b"lhv1"),
        ];
        let thumbs: Vec<u32> = self.referencing_item_ids(meta, FourCC::new(b"thmb"));
        let auxs: Vec<u32> = self.referencing_item_ids(meta, FourCC::new(b"auxl"));
        iinf.entries
            .iter()
            .filter(|e| coded.contains(&e.item_type))
            .filter(|e| !e.hidden)
            .filter(|e| !thumbs.contains(&e.item_id) && !auxs.contains(&e.item_id))
            .map(|e| e.item_id)
            .collect()
    }

    // Items that are the source of a reference of the given type.
    fn referencing_item_ids(&self, meta: &MetaBox, tag: FourCC) -> Vec<u32> {
        match meta.item_reference() {
            Some(iref) => {
                let mut v = Vec::new();
                for r in iref.by_type(tag) {
                    if !v.contains(&r.from_item_id) {
                        v.push(r.from_item_id);
                    }
                }
                v
            },
            None => Vec::new(),
        }
    }

    fn check_item<'a>(&self, meta: &'a MetaBox, item_id: u32) -> Result<&'a ItemInfoEntry> {
        meta.item_info()
            .and_then(|iinf| iinf.by_item_id(item_id))
            .ok_or(Error::InvalidItemId(item_id))
    }

    fn track_sample(&self, context_id: u32, item_id: u32) -> Result<&SampleInfo> {
        let track = self.track(context_id)?;
        track
            .samples
            .get(item_id as usize)
            .ok_or(Error::InvalidItemId(item_id))
    }

    //
    // references.
    //

    /// Items referenced *from* `from_id` with the given reference type.
    pub fn get_referenced_from_item_list_by_type(
        &self,
        context_id: u32,
        from_id: u32,
        reference_type: &str,
    ) -> Result<Vec<u32>> {
        let tag = type_tag(reference_type)?;
        match self.context(context_id)? {
            ContextKind::Meta => {
                let meta = self.meta()?;
                self.check_item(meta, from_id)?;
                Ok(meta
                    .item_reference()
                    .map(|iref| iref.references_from(from_id, tag))
                    .unwrap_or_default())
            },
            ContextKind::Track(_) => {
                // samples of tracks that reference this track; the
                // matching sample is the one with the same index.
                let movie = self.heif()?.movie().ok_or(Error::InvalidContext(context_id))?;
                self.track_sample(context_id, from_id)?;
                let mut v = Vec::new();
                for other in movie.tracks() {
                    if other.track_id() == context_id {
                        continue;
                    }
                    if let Some(tref) = other.track_reference() {
                        if tref.by_type(tag).contains(&context_id) {
                            if self
                                .track(other.track_id())
                                .map(|t| from_id < t.samples.len() as u32)
                                .unwrap_or(false)
                            {
                                v.push(from_id);
                            }
                        }
                    }
                }
                Ok(v)
            },
        }
    }

    /// Items that reference `to_id` with the given reference type.
    pub fn get_referenced_to_item_list_by_type(
        &self,
        context_id: u32,
        to_id: u32,
        reference_type: &str,
    ) -> Result<Vec<u32>> {
        let tag = type_tag(reference_type)?;
        match self.context(context_id)? {
            ContextKind::Meta => {
                let meta = self.meta()?;
                self.check_item(meta, to_id)?;
                Ok(meta
                    .item_reference()
                    .map(|iref| iref.references_to(to_id, tag))
                    .unwrap_or_default())
            },
            ContextKind::Track(_) => {
                // follow this track's own tref: the matching sample of
                // each referenced track has the same index.
                let trak = self.track_box(context_id)?;
                self.track_sample(context_id, to_id)?;
                let mut v = Vec::new();
                if let Some(tref) = trak.track_reference() {
                    for other in tref.by_type(tag) {
                        if self
                            .track(other)
                            .map(|t| to_id < t.samples.len() as u32)
                            .unwrap_or(false)
                        {
                            v.push(to_id);
                        }
                    }
                }
                Ok(v)
            },
        }
    }

    /// The primary (cover) image item.
    pub fn get_cover_image_item_id(&self, context_id: u32) -> Result<u32> {
        match self.context(context_id)? {
            ContextKind::Meta => self
                .meta()?
                .primary_item()
                .map(|p| p.item_id)
                .ok_or(Error::NotApplicable("no primary item")),
            ContextKind::Track(_) => Err(Error::NotApplicable("tracks have no cover image")),
        }
    }

    //
    // data materialization.
    //

    /// Raw item payload. Storage (idat vs mdat) is transparent.
    ///
    /// Protected items surface their raw bytes; use
    /// `get_item_protection_scheme` for the scheme information.
    pub fn get_item_data(&self, context_id: u32, item_id: u32) -> Result<Vec<u8>> {
        match self.context(context_id)? {
            ContextKind::Meta => self.meta_item_data(item_id),
            ContextKind::Track(_) => {
                let sample = self.track_sample(context_id, item_id)?;
                Ok(self.file()?.read_at(sample.fpos, sample.size as u64)?)
            },
        }
    }

    fn meta_item_data(&self, item_id: u32) -> Result<Vec<u8>> {
        let meta = self.meta()?;
        self.check_item(meta, item_id)?;
        let iloc = meta
            .item_location()
            .ok_or(Error::InvalidItemId(item_id))?;
        let entry = iloc.by_item_id(item_id).ok_or(Error::InvalidItemId(item_id))?;
        if entry.data_reference_index != 0 {
            return Err(Error::UnsupportedFeature(
                "item data in external files".to_string(),
            ));
        }
        let mut data = Vec::new();
        match entry.construction_method {
            0 => {
                for extent in &entry.extents {
                    let offset = entry.base_offset + extent.offset;
                    data.extend(self.file()?.read_at(offset, extent.length)?);
                }
            },
            1 => {
                let idat = meta
                    .item_data()
                    .ok_or_else(|| Error::MalformedBitstream("item uses idat but none present".to_string()))?;
                for extent in &entry.extents {
                    let start = (entry.base_offset + extent.offset) as usize;
                    let end = start + extent.length as usize;
                    let slice = idat
                        .data
                        .0
                        .get(start..end)
                        .ok_or_else(|| Error::MalformedBitstream("idat extent out of range".to_string()))?;
                    data.extend_from_slice(slice);
                }
            },
            m => {
                return Err(Error::UnsupportedFeature(format!(
                    "iloc construction method {}",
                    m
                )))
            },
        }
        Ok(data)
    }

    /// Scheme information of a protected item: the raw bytes of the
    /// sinf box its protection index names.
    pub fn get_item_protection_scheme(&self, context_id: u32, item_id: u32) -> Result<Vec<u8>> {
        self.context(context_id)?;
        let meta = self.meta()?;
        let entry = self.check_item(meta, item_id)?;
        if entry.item_protection_index == 0 {
            return Err(Error::NotApplicable("item is not protected"));
        }
        let ipro = meta
            .item_protection()
            .ok_or_else(|| Error::MalformedBitstream("protected item without ipro".to_string()))?;
        let sinf = (*ipro.entries)
            .get(entry.item_protection_index as usize - 1)
            .ok_or(Error::InvalidPropertyIndex(entry.item_protection_index as u32))?;
        match sinf {
            HeifBox::GenericBox(b) => Ok(b.data.clone()),
            _ => Ok(Vec::new()),
        }
    }

    /// Item data as a directly decodable Annex-B stream: start-coded
    /// parameter sets from the decoder configuration, then the item's
    /// NAL units with length prefixes replaced by start codes.
    pub fn get_item_data_with_decoder_parameters(
        &self,
        context_id: u32,
        item_id: u32,
    ) -> Result<Vec<u8>> {
        if let ContextKind::Meta = self.context(context_id)? {
            let meta = self.meta()?;
            let entry = self.check_item(meta, item_id)?;
            if entry.item_protection_index != 0 {
                return Err(Error::ProtectedItem(item_id));
            }
        }
        let (prefix, length_size) = match self.decoder_configuration(context_id, item_id)? {
            DecoderConfig::Avc(rec) => (rec.to_annex_b(), rec.length_size_minus_one as usize + 1),
            DecoderConfig::Hevc(rec) => (rec.to_annex_b(), rec.length_size_minus_one as usize + 1),
            DecoderConfig::Lhevc(rec) => (rec.to_annex_b(), rec.length_size_minus_one as usize + 1),
        };
        let data = self.get_item_data(context_id, item_id)?;
        let mut out = prefix;
        length_prefixed_to_annex_b(&data, length_size, &mut out)?;
        Ok(out)
    }

    /// The codec type governing an item ('hvc1', 'avc1', 'lhv1', ...).
    pub fn get_decoder_code_type(&self, context_id: u32, item_id: u32) -> Result<FourCC> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let t = self.get_item_type(context_id, item_id)?;
                match &t.to_be_bytes() {
                    b"hvc1" | b"avc1" | b"avc3" | b"hev1" | b"lhv1" | b"lhe1" => Ok(t),
                    _ => Err(Error::UnknownCodeType(t.to_string())),
                }
            },
            ContextKind::Track(_) => {
                let t = self.get_item_type(context_id, item_id)?;
                Ok(t)
            },
        }
    }

    /// Parameter set NAL units of the decoder configuration of an item.
    pub fn get_decoder_parameter_sets(
        &self,
        context_id: u32,
        item_id: u32,
    ) -> Result<DecoderParameterSets> {
        let mut out = DecoderParameterSets::default();
        out.code_type = self.get_decoder_code_type(context_id, item_id)?;
        match self.decoder_configuration(context_id, item_id)? {
            DecoderConfig::Avc(rec) => {
                for s in &rec.sps {
                    out.sets.push(("SPS", s.clone()));
                }
                for p in &rec.pps {
                    out.sets.push(("PPS", p.clone()));
                }
            },
            DecoderConfig::Hevc(rec) => {
                for (kind, t) in [("VPS", 32u8), ("SPS", 33), ("PPS", 34)].iter() {
                    for nal in rec.nal_units_of_type(*t) {
                        out.sets.push((kind, nal.to_vec()));
                    }
                }
            },
            DecoderConfig::Lhevc(rec) => {
                for (kind, t) in [("VPS", 32u8), ("SPS", 33), ("PPS", 34)].iter() {
                    for nal in rec.nal_units_of_type(*t) {
                        out.sets.push((kind, nal.to_vec()));
                    }
                }
            },
        }
        Ok(out)
    }

    fn decoder_configuration(&self, context_id: u32, item_id: u32) -> Result<DecoderConfig> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let meta = self.meta()?;
                self.check_item(meta, item_id)?;
                let iprp = meta
                    .item_properties()
                    .ok_or_else(|| Error::UnknownCodeType("no item properties".to_string()))?;
                for assoc in iprp.item_associations(item_id) {
                    match iprp.property(assoc.property_index) {
                        Some(HeifBox::AvcConfigurationBox(c)) => {
                            return Ok(DecoderConfig::Avc(c.configuration.clone()))
                        },
                        Some(HeifBox::HevcConfigurationBox(c)) => {
                            return Ok(DecoderConfig::Hevc(c.configuration.clone()))
                        },
                        Some(HeifBox::LhevcConfigurationBox(c)) => {
                            return Ok(DecoderConfig::Lhevc(c.configuration.clone()))
                        },
                        _ => {},
                    }
                }
                Err(Error::UnknownCodeType(
                    self.get_item_type(context_id, item_id)?.to_string(),
                ))
            },
            ContextKind::Track(_) => {
                let sample = self.track_sample(context_id, item_id)?;
                let stbl = self.track_box(context_id)?.media().media_info().sample_table();
                let entry = (*stbl.sample_description().entries)
                    .get(sample.sample_description_index as usize - 1)
                    .ok_or(Error::InvalidSampleDescriptionIndex(
                        sample.sample_description_index,
                    ))?;
                match entry {
                    HeifBox::AvcSampleEntry(e) => e
                        .configuration()
                        .cloned()
                        .map(DecoderConfig::Avc)
                        .ok_or_else(|| Error::UnknownCodeType("avc entry without avcC".to_string())),
                    HeifBox::HevcSampleEntry(e) => e
                        .configuration()
                        .cloned()
                        .map(DecoderConfig::Hevc)
                        .ok_or_else(|| Error::UnknownCodeType("hevc entry without hvcC".to_string())),
                    HeifBox::LhevcSampleEntry(e) => e
                        .configuration()
                        .cloned()
                        .map(DecoderConfig::Lhevc)
                        .ok_or_else(|| Error::UnknownCodeType("lhevc entry without lhvC".to_string())),
                    other => Err(Error::UnknownCodeType(other.fourcc().to_string())),
                }
            },
        }
    }

    //
    // derived items.
    //

    /// Parse the payload of a 'grid' derived item.
    pub fn get_item_grid(&self, context_id: u32, item_id: u32) -> Result<GridItem> {
        let t = self.get_item_type(context_id, item_id)?;
        if t != b"grid" {
            return Err(Error::InvalidItemId(item_id));
        }
        let data = self.get_item_data(context_id, item_id)?;
        let mut r = SliceReader::new(&data);
        u8::from_bytes(&mut r)?; // version
        let flags = u8::from_bytes(&mut r)?;
        let rows = u8::from_bytes(&mut r)? as u16 + 1;
        let columns = u8::from_bytes(&mut r)? as u16 + 1;
        let (output_width, output_height) = if flags & 1 != 0 {
            (u32::from_bytes(&mut r)?, u32::from_bytes(&mut r)?)
        } else {
            (u16::from_bytes(&mut r)? as u32, u16::from_bytes(&mut r)? as u32)
        };
        let input_item_ids =
            self.get_referenced_from_item_list_by_type(context_id, item_id, "dimg")?;
        if input_item_ids.len() != rows as usize * columns as usize {
            return Err(Error::MalformedBitstream(format!(
                "grid {}x{} has {} dimg references",
                rows,
                columns,
                input_item_ids.len()
            )));
        }
        Ok(GridItem {
            rows,
            columns,
            output_width,
            output_height,
            input_item_ids,
        })
    }

    /// Parse the payload of an 'iovl' (overlay) derived item.
    pub fn get_item_iovl(&self, context_id: u32, item_id: u32) -> Result<IovlItem> {
        let t = self.get_item_type(context_id, item_id)?;
        if t != b"iovl" {
            return Err(Error::InvalidItemId(item_id));
        }
        let data = self.get_item_data(context_id, item_id)?;
        let mut r = SliceReader::new(&data);
        u8::from_bytes(&mut r)?; // version
        let flags = u8::from_bytes(&mut r)?;
        let mut canvas = [0u16; 4];
        for c in canvas.iter_mut() {
            *c = u16::from_bytes(&mut r)?;
        }
        let wide = flags & 1 != 0;
        let (output_width, output_height) = if wide {
            (u32::from_bytes(&mut r)?, u32::from_bytes(&mut r)?)
        } else {
            (u16::from_bytes(&mut r)? as u32, u16::from_bytes(&mut r)? as u32)
        };
        let input_item_ids =
            self.get_referenced_from_item_list_by_type(context_id, item_id, "dimg")?;
        let mut offsets = Vec::new();
        for _ in 0..input_item_ids.len() {
            let (x, y) = if wide {
                (i32::from_bytes(&mut r)?, i32::from_bytes(&mut r)?)
            } else {
                (i16::from_bytes(&mut r)? as i32, i16::from_bytes(&mut r)? as i32)
            };
            offsets.push((x, y));
        }
        Ok(IovlItem {
            canvas_fill_value: canvas,
            output_width,
            output_height,
            offsets,
            input_item_ids,
        })
    }

    //
    // properties.
    //

    /// The ordered property associations of an item.
    pub fn get_item_properties(&self, context_id: u32, item_id: u32) -> Result<Vec<ItemPropertyInfo>> {
        self.context(context_id)?;
        let meta = self.meta()?;
        self.check_item(meta, item_id)?;
        let iprp = match meta.item_properties() {
            Some(iprp) => iprp,
            None => return Ok(Vec::new()),
        };
        let mut v = Vec::new();
        for assoc in iprp.item_associations(item_id) {
            let property_type = match iprp.property(assoc.property_index) {
                Some(HeifBox::ImageSpatialExtentsProperty(_)) => ItemPropertyType::Ispe,
                Some(HeifBox::ImageRotationProperty(_)) => ItemPropertyType::Irot,
                Some(HeifBox::ImageMirrorProperty(_)) => ItemPropertyType::Imir,
                Some(HeifBox::CleanApertureBox(_)) => ItemPropertyType::Clap,
                Some(HeifBox::AuxiliaryTypeProperty(_)) => ItemPropertyType::AuxC,
                Some(HeifBox::RelativeLocationProperty(_)) => ItemPropertyType::Rloc,
                Some(HeifBox::LayerSelectorProperty(_)) => ItemPropertyType::Lsel,
                Some(HeifBox::TargetOlsProperty(_)) => ItemPropertyType::Tols,
                Some(HeifBox::OperatingPointsInformationProperty(_)) => ItemPropertyType::Oinf,
                Some(HeifBox::AvcConfigurationBox(_)) => ItemPropertyType::AvcC,
                Some(HeifBox::HevcConfigurationBox(_)) => ItemPropertyType::HvcC,
                Some(HeifBox::LhevcConfigurationBox(_)) => ItemPropertyType::LhvC,
                Some(_) => ItemPropertyType::Unknown,
                None => return Err(Error::InvalidPropertyIndex(assoc.property_index as u32)),
            };
            v.push(ItemPropertyInfo {
                property_type,
                index: assoc.property_index as u32,
                essential: assoc.essential,
            });
        }
        Ok(v)
    }

    /// Does this item carry an unrecognized essential property?
    ///
    /// Renderers must refuse to decode such an item.
    pub fn has_unknown_essential_property(&self, context_id: u32, item_id: u32) -> Result<bool> {
        Ok(self
            .get_item_properties(context_id, item_id)?
            .iter()
            .any(|p| p.essential && p.property_type == ItemPropertyType::Unknown))
    }

    fn property_box(&self, context_id: u32, index: u32) -> Result<&HeifBox> {
        self.context(context_id)?;
        let iprp = self
            .meta()?
            .item_properties()
            .ok_or(Error::InvalidPropertyIndex(index))?;
        iprp.property(index as u16)
            .ok_or(Error::InvalidPropertyIndex(index))
    }

    pub fn get_property_ispe(&self, context_id: u32, index: u32) -> Result<ImageSpatialExtentsProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::ImageSpatialExtentsProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_irot(&self, context_id: u32, index: u32) -> Result<ImageRotationProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::ImageRotationProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_imir(&self, context_id: u32, index: u32) -> Result<ImageMirrorProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::ImageMirrorProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_clap(&self, context_id: u32, index: u32) -> Result<CleanApertureBox> {
        match self.property_box(context_id, index)? {
            HeifBox::CleanApertureBox(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_auxc(&self, context_id: u32, index: u32) -> Result<AuxiliaryTypeProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::AuxiliaryTypeProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_rloc(&self, context_id: u32, index: u32) -> Result<RelativeLocationProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::RelativeLocationProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_lsel(&self, context_id: u32, index: u32) -> Result<LayerSelectorProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::LayerSelectorProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_tols(&self, context_id: u32, index: u32) -> Result<TargetOlsProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::TargetOlsProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    pub fn get_property_oinf(
        &self,
        context_id: u32,
        index: u32,
    ) -> Result<OperatingPointsInformationProperty> {
        match self.property_box(context_id, index)? {
            HeifBox::OperatingPointsInformationProperty(p) => Ok(p.clone()),
            _ => Err(Error::InvalidPropertyIndex(index)),
        }
    }

    //
    // timestamps and decode order.
    //

    /// Presentation timestamps of a context: (milliseconds, item id),
    /// sorted by time.
    pub fn get_item_timestamps(&self, context_id: u32) -> Result<Vec<(u64, u32)>> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let masters = self.master_item_ids(self.meta()?);
                let fps = self.forced_fps.get(&context_id).copied().unwrap_or(0.0);
                Ok(masters
                    .iter()
                    .enumerate()
                    .map(|(i, &id)| {
                        let ts = if fps > 0.0 {
                            (i as f64 * 1000.0 / fps) as u64
                        } else {
                            0
                        };
                        (ts, id)
                    })
                    .collect())
            },
            ContextKind::Track(_) => {
                if let Some(&fps) = self.forced_fps.get(&context_id) {
                    if fps > 0.0 {
                        let track = self.track(context_id)?;
                        return Ok((0..track.samples.len() as u32)
                            .map(|i| ((i as f64 * 1000.0 / fps) as u64, i))
                            .collect());
                    }
                }
                let track = self.track(context_id)?;
                let timescale = self
                    .track_box(context_id)?
                    .media()
                    .media_header()
                    .timescale
                    .max(1);
                Ok(track
                    .timeline
                    .time_map_ms(timescale)?
                    .into_iter()
                    .map(|(ts, id)| (ts, id as u32))
                    .collect())
            },
        }
    }

    /// All presentation times of one item (a sample can be emitted
    /// several times by the edit list).
    pub fn get_timestamps_of_item(&self, context_id: u32, item_id: u32) -> Result<Vec<u64>> {
        let map = self.get_item_timestamps(context_id)?;
        match self.context(context_id)? {
            ContextKind::Meta => {
                self.check_item(self.meta()?, item_id)?;
            },
            ContextKind::Track(_) => {
                self.track_sample(context_id, item_id)?;
            },
        }
        Ok(map
            .into_iter()
            .filter(|&(_, id)| id == item_id)
            .map(|(ts, _)| ts)
            .collect())
    }

    /// Items in decoding order, with their presentation times.
    pub fn get_items_in_decoding_order(&self, context_id: u32) -> Result<Vec<(u32, u64)>> {
        let mut v: Vec<(u32, u64)> = self
            .get_item_timestamps(context_id)?
            .into_iter()
            .map(|(ts, id)| (id, ts))
            .collect();
        // decode order is sample order for tracks, declaration order
        // for meta items.
        v.sort_by_key(|&(id, _)| id);
        Ok(v)
    }

    /// Decoding dependencies of one item.
    ///
    /// For meta items these are the 'dimg' / 'base' references, for
    /// track samples the 'refs' sample group entries.
    pub fn get_item_decode_dependencies(&self, context_id: u32, item_id: u32) -> Result<Vec<u32>> {
        match self.context(context_id)? {
            ContextKind::Meta => {
                let meta = self.meta()?;
                self.check_item(meta, item_id)?;
                let mut v = Vec::new();
                if let Some(iref) = meta.item_reference() {
                    // cycle safe: one level plus a visited set.
                    let mut stack = vec![item_id];
                    let mut visited = Vec::new();
                    while let Some(id) = stack.pop() {
                        if visited.contains(&id) {
                            continue;
                        }
                        visited.push(id);
                        for tag in [b"dimg", b"base"].iter() {
                            for dep in iref.references_from(id, FourCC::new(tag)) {
                                if !v.contains(&dep) {
                                    v.push(dep);
                                    stack.push(dep);
                                }
                            }
                        }
                    }
                }
                Ok(v)
            },
            ContextKind::Track(_) => {
                self.track_sample(context_id, item_id)?;
                let stbl = self.track_box(context_id)?.media().media_info().sample_table();
                Ok(sample_decode_dependencies(stbl, item_id))
            },
        }
    }
}

enum DecoderConfig {
    Avc(AvcDecoderConfigurationRecord),
    Hevc(HevcDecoderConfigurationRecord),
    Lhevc(LhevcDecoderConfigurationRecord),
}

/// Turn a 4-character type string into a tag.
fn type_tag(s: &str) -> Result<FourCC> {
    let b = s.as_bytes();
    if b.len() != 4 {
        return Err(Error::UnknownCodeType(s.to_string()));
    }
    Ok(FourCC::new(&[b[0], b[1], b[2], b[3]]))
}

/// Replace NAL unit length fields with start codes.
fn length_prefixed_to_annex_b(data: &[u8], length_size: usize, out: &mut Vec<u8>) -> Result<()> {
    let mut pos = 0usize;
    while pos + length_size <= data.len() {
        let mut len = 0usize;
        for i in 0..length_size {
            len = (len << 8) | data[pos + i] as usize;
        }
        pos += length_size;
        if pos + len > data.len() {
            return Err(Error::MalformedBitstream(
                "NAL length field overruns the item data".to_string(),
            ));
        }
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(&data[pos..pos + len]);
        pos += len;
    }
    if pos != data.len() {
        return Err(Error::MalformedBitstream(
            "trailing bytes after the last NAL unit".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_conversion() {
        let data = [0, 0, 0, 2, 0xaa, 0xbb, 0, 0, 0, 1, 0xcc];
        let mut out = Vec::new();
        length_prefixed_to_annex_b(&data, 4, &mut out).unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 0xaa, 0xbb, 0, 0, 0, 1, 0xcc]);

        let bad = [0, 0, 0, 9, 0xaa];
        let mut out = Vec::new();
        assert!(length_prefixed_to_annex_b(&bad, 4, &mut out).is_err());
    }

    #[test]
    fn uninitialized_calls_are_rejected() {
        let reader = HeifReader::new();
        assert!(matches!(reader.get_file_properties(), Err(Error::Uninitialized)));
        assert!(matches!(
            reader.get_item_list_by_type(0, "master"),
            Err(Error::Uninitialized)
        ));
    }

    use crate::bitstream::BitWriter;
    use crate::parse::{hevc_nal_type, rbsp_to_nal};
    use crate::writer::manifest;
    use crate::writer::FileWriter;

    fn hevc_nal(nal_type: u8, rbsp: Vec<u8>) -> Vec<u8> {
        let mut v = vec![nal_type << 1, 1];
        v.extend(rbsp_to_nal(&rbsp));
        v
    }

    fn make_vps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 4);
        w.write_bit(true);
        w.write_bit(true);
        w.write_bits(0, 6);
        w.write_bits(0, 3);
        w.write_bit(true);
        w.write_bits(0xffff, 16);
        crate::parse::hevc::tests::write_ptl(&mut w);
        w.write_bit(true);
        w.write_ue(3);
        w.write_ue(0);
        w.write_ue(0);
        w.write_bits(0, 6);
        w.write_ue(0);
        w.write_bit(false);
        w.write_bit(false);
        w.write_bit(true);
        w.finish()
    }

    fn idr_slice_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bit(true); // first_slice_segment_in_pic_flag
        w.write_bit(false); // no_output_of_prior_pics
        w.write_ue(0); // pps id
        w.write_ue(2); // slice_type I
        w.write_bit(true); // sao luma
        w.write_bit(true); // sao chroma
        w.write_se(0); // slice_qp_delta
        w.write_bit(true); // loop filter across slices
        w.write_bit(true); // stop
        w.finish()
    }

    // One IDR picture, 640x480, as an Annex-B stream.
    fn single_image_stream() -> Vec<u8> {
        let mut data = Vec::new();
        let mut push = |n: &[u8]| {
            data.extend_from_slice(&[0, 0, 0, 1]);
            data.extend_from_slice(n);
        };
        push(&hevc_nal(hevc_nal_type::VPS, make_vps_rbsp()));
        push(&hevc_nal(
            hevc_nal_type::SPS,
            crate::parse::hevc::tests::make_sps_rbsp(),
        ));
        push(&hevc_nal(
            hevc_nal_type::PPS,
            crate::parse::hevc::tests::make_pps_rbsp(),
        ));
        push(&hevc_nal(hevc_nal_type::IDR_W_RADL, idr_slice_rbsp()));
        data
    }

    #[test]
    fn write_then_read_single_image() {
        let dir = std::env::temp_dir();
        let bs_path = dir.join(format!("heiflib-rt-{}.265", std::process::id()));
        let out_path = dir.join(format!("heiflib-rt-{}.heic", std::process::id()));
        std::fs::write(&bs_path, single_image_stream()).unwrap();

        let config = manifest::Manifest {
            brands: manifest::Brands {
                major: "heic".to_string(),
                compatible: vec!["mif1".to_string(), "heic".to_string()],
            },
            output_path: out_path.to_str().unwrap().to_string(),
            content: vec![manifest::Content {
                master: manifest::Master {
                    code_type: "hvc1".to_string(),
                    file_path: bs_path.to_str().unwrap().to_string(),
                    hdlr_type: "pict".to_string(),
                    encp_type: "meta".to_string(),
                    disp_xdim: 640,
                    disp_ydim: 480,
                    disp_rate: 30,
                    tick_rate: 90000,
                    uniq_bsid: 1,
                    edit_list: None,
                    ccst: None,
                    make_vide: false,
                    write_alternates: false,
                },
                thumbs: Vec::new(),
                metadata: Vec::new(),
                auxiliary: Vec::new(),
                layers: Vec::new(),
                derived: Some(manifest::Derived {
                    iden: Vec::new(),
                    grid: vec![manifest::Grid {
                        rows: 2,
                        columns: 4,
                        output_width: 2560,
                        output_height: 960,
                        refs: (0..8)
                            .map(|_| manifest::DerivedRef {
                                uniq_bsid: 1,
                                refs_index: 0,
                            })
                            .collect(),
                    }],
                    iovl: Vec::new(),
                }),
                property: None,
            }],
            egroups: Vec::new(),
            general: manifest::General {
                prim_refr: 1,
                prim_indx: 0,
            },
        };
        FileWriter::write_file(&config).unwrap();

        let reader = HeifReader::open(out_path.to_str().unwrap()).unwrap();
        let props = reader.get_file_properties().unwrap().clone();
        assert!(props.has_single_image);
        assert!(props.has_cover_image);
        assert!(props.meta_context.as_ref().unwrap().has_derived_images);

        let cover = reader.get_cover_image_item_id(META_CONTEXT_ID).unwrap();
        assert_eq!(reader.get_item_type(0, cover).unwrap(), b"hvc1");
        assert_eq!(reader.get_width(0, cover).unwrap(), 640);
        assert_eq!(reader.get_height(0, cover).unwrap(), 480);

        // decodable form: start-coded VPS/SPS/PPS, then the slice.
        let data = reader.get_item_data_with_decoder_parameters(0, cover).unwrap();
        let nals = crate::parse::split_nal_units(&data).unwrap();
        assert_eq!(nals.len(), 4);
        assert_eq!(nals[0][0] >> 1, 32); // VPS
        assert_eq!(nals[1][0] >> 1, 33); // SPS
        assert_eq!(nals[2][0] >> 1, 34); // PPS
        assert_eq!(nals[3][0] >> 1, 19); // IDR slice

        // the 4x2 grid, declaration order tiles.
        let grids = reader.get_item_list_by_type(0, "grid").unwrap();
        assert_eq!(grids.len(), 1);
        let grid = reader.get_item_grid(0, grids[0]).unwrap();
        assert_eq!(grid.rows, 2);
        assert_eq!(grid.columns, 4);
        assert_eq!(grid.output_width, 2560);
        assert_eq!(grid.input_item_ids.len(), 8);
        assert!(grid.input_item_ids.iter().all(|&id| id == cover));
        let deps = reader.get_item_decode_dependencies(0, grids[0]).unwrap();
        assert_eq!(deps, vec![cover]);

        // the decoder parameter sets are exposed per kind as well.
        let sets = reader.get_decoder_parameter_sets(0, cover).unwrap();
        assert_eq!(sets.code_type, b"hvc1");
        let kinds: Vec<&str> = sets.sets.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec!["VPS", "SPS", "PPS"]);

        let _ = std::fs::remove_file(&bs_path);
        let _ = std::fs::remove_file(&out_path);
    }
}
