//! The declarative content manifest driving the writer.
//!
//! Mirrors the structure a JSON manifest file deserializes into;
//! `uniq_bsid` values bind bitstreams across manifest entries.
use serde::Deserialize;

fn default_tick_rate() -> u32 {
    90000
}

fn default_disp_rate() -> u32 {
    30
}

#[derive(Clone, Debug, Deserialize)]
pub struct Manifest {
    pub brands: Brands,
    pub output_path: String,
    pub content: Vec<Content>,
    #[serde(default)]
    pub egroups: Vec<Egroup>,
    pub general: General,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Brands {
    pub major: String,
    #[serde(default)]
    pub compatible: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct General {
    /// uniq_bsid of the content providing the primary item.
    pub prim_refr: u32,
    /// Index of the primary image within that content (0 based).
    #[serde(default)]
    pub prim_indx: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Content {
    pub master: Master,
    #[serde(default)]
    pub thumbs: Vec<Thumbs>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
    #[serde(default)]
    pub auxiliary: Vec<Auxiliary>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub derived: Option<Derived>,
    #[serde(default)]
    pub property: Option<Property>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Master {
    /// 'hvc1', 'avc1' or 'lhv1'.
    pub code_type: String,
    pub file_path: String,
    /// 'pict' or 'vide'.
    #[serde(default = "default_hdlr")]
    pub hdlr_type: String,
    /// 'meta' (image collection) or 'trak' (image sequence).
    pub encp_type: String,
    #[serde(default)]
    pub disp_xdim: u32,
    #[serde(default)]
    pub disp_ydim: u32,
    #[serde(default = "default_disp_rate")]
    pub disp_rate: u32,
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    pub uniq_bsid: u32,
    #[serde(default)]
    pub edit_list: Option<EditList>,
    #[serde(default)]
    pub ccst: Option<Ccst>,
    /// Also emit a 'vide' handler duplicate of a 'pict' track.
    #[serde(default)]
    pub make_vide: bool,
    #[serde(default)]
    pub write_alternates: bool,
}

fn default_hdlr() -> String {
    "pict".to_string()
}

/// Coding constraints of an image sequence sample entry.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Ccst {
    #[serde(default)]
    pub all_ref_pics_intra: bool,
    #[serde(default)]
    pub intra_pred_used: bool,
    #[serde(default)]
    pub max_ref_per_pic: u8,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Thumbs {
    pub code_type: String,
    pub file_path: String,
    pub uniq_bsid: u32,
    /// Every n'th master sample gets a thumb (track encapsulation).
    #[serde(default)]
    pub sync_rate: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Metadata {
    /// 'exif' or 'xml'.
    pub hdlr_type: String,
    pub file_path: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Auxiliary {
    pub code_type: String,
    pub file_path: String,
    pub uniq_bsid: u32,
    /// The auxC urn, e.g. "urn:mpeg:hevc:2015:auxid:1" for alpha.
    pub aux_type: String,
    #[serde(default)]
    pub sub_type: Vec<u8>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Layer {
    pub code_type: String,
    #[serde(default)]
    pub file_path: Option<String>,
    /// uniq_bsid of the base layer bitstream.
    pub base_refr: u32,
    pub uniq_bsid: u32,
    #[serde(default)]
    pub target_outputlayer: u16,
    #[serde(default)]
    pub layer_selection: Option<u16>,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Derived {
    #[serde(default)]
    pub iden: Vec<Iden>,
    #[serde(default)]
    pub grid: Vec<Grid>,
    #[serde(default)]
    pub iovl: Vec<Iovl>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Iden {
    /// uniq_bsid + image index of the input image.
    pub uniq_bsid: u32,
    #[serde(default)]
    pub refs_index: u32,
    #[serde(default)]
    pub irot: Option<u16>,
    #[serde(default)]
    pub imir: Option<u8>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Grid {
    pub rows: u16,
    pub columns: u16,
    pub output_width: u32,
    pub output_height: u32,
    /// Tiles in row major order: (uniq_bsid, image index).
    pub refs: Vec<DerivedRef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Iovl {
    #[serde(default)]
    pub canvas_fill: [u16; 4],
    pub output_width: u32,
    pub output_height: u32,
    pub refs: Vec<IovlRef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DerivedRef {
    pub uniq_bsid: u32,
    #[serde(default)]
    pub refs_index: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IovlRef {
    pub uniq_bsid: u32,
    #[serde(default)]
    pub refs_index: u32,
    pub offset_x: i32,
    pub offset_y: i32,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Property {
    #[serde(default)]
    pub irot: Option<u16>,
    #[serde(default)]
    pub imir: Option<u8>,
    #[serde(default)]
    pub clap: Option<Clap>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Clap {
    pub width_n: u32,
    pub width_d: u32,
    pub height_n: u32,
    pub height_d: u32,
    pub horiz_off_n: i32,
    pub horiz_off_d: i32,
    pub vert_off_n: i32,
    pub vert_off_d: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EditList {
    #[serde(default)]
    pub numb_rept: i32,
    pub entries: Vec<EditEntryCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EditEntryCfg {
    /// "empty", "dwell" or "shift".
    pub edit_type: String,
    pub media_time: i64,
    pub duration: u64,
    #[serde(default)]
    pub media_rate_integer: Option<i16>,
    #[serde(default)]
    pub media_rate_fraction: Option<i16>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Egroup {
    pub idxs_lists: Vec<Vec<EgroupRef>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EgroupRef {
    pub uniq_bsid: u32,
    #[serde(default)]
    pub refs_index: u32,
}

impl Manifest {
    /// Load a manifest from a JSON file.
    pub fn from_json_file(path: &str) -> std::io::Result<Manifest> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| ioerr!(InvalidData, "manifest: {}", e))
    }
}
