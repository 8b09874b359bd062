//! Source bitstream handling for the writer: parse an Annex-B
//! elementary stream into coded images plus a decoder configuration
//! record, with NAL units converted to length prefixed form.
use std::io;

use crate::bitstream::BitReader;
use crate::boxes::{
    AvcConfigurationBox, AvcDecoderConfigurationRecord, HevcConfigurationBox,
    HevcDecoderConfigurationRecord, HeifBox, LhevcConfigurationBox,
    LhevcDecoderConfigurationRecord,
};
use crate::parse::{
    hevc_nal_type, nal_to_rbsp, AccessUnit, AvcStreamParser, HevcNalHeader, HevcStreamParser,
};

/// One coded picture, ready to be placed in an mdat.
#[derive(Clone, Debug, Default)]
pub struct CodedImage {
    /// Length prefixed (4 byte) VCL NAL units.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub is_sync: bool,
    pub decode_order: u64,
    pub display_order: u64,
    pub poc: i32,
    /// Decode order indices of referenced pictures.
    pub ref_indices: Vec<u64>,
    pub is_hidden: bool,
}

/// A parsed source bitstream.
pub struct ParsedBitstream {
    pub code_type: String,
    pub images: Vec<CodedImage>,
    /// The matching decoder configuration box (avcC / hvcC / lhvC).
    pub config: HeifBox,
    pub width: u32,
    pub height: u32,
}

fn length_prefix(unit: &AccessUnit) -> Vec<u8> {
    let mut v = Vec::new();
    for nal in &unit.vcl_nals {
        v.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        v.extend_from_slice(nal);
    }
    v
}

fn images_from_units(units: &[AccessUnit], sync_from_idr_only: bool) -> Vec<CodedImage> {
    units
        .iter()
        .map(|u| CodedImage {
            data: length_prefix(u),
            width: u.width,
            height: u.height,
            is_sync: if sync_from_idr_only {
                u.is_idr
            } else {
                u.is_idr || u.is_cra || u.is_bla
            },
            decode_order: u.decode_order,
            display_order: u.display_order,
            poc: u.poc,
            ref_indices: u.ref_pic_indices.clone(),
            is_hidden: !u.is_output,
        })
        .collect()
}

/// Parse an elementary stream file per code type.
pub fn parse_bitstream(code_type: &str, path: &str) -> io::Result<ParsedBitstream> {
    let data = std::fs::read(path)?;
    match code_type {
        "avc1" | "avc3" => parse_avc(code_type, &data),
        "hvc1" | "hev1" => parse_hevc(code_type, &data),
        "lhv1" | "lhe1" => parse_lhevc(code_type, &data),
        other => Err(ioerr!(Unsupported, "code type {} has no parser", other)),
    }
}

fn parse_avc(code_type: &str, data: &[u8]) -> io::Result<ParsedBitstream> {
    let mut parser = AvcStreamParser::new();
    let units = parser.parse_stream(data)?;
    let first = units
        .first()
        .ok_or_else(|| ioerr!(InvalidData, "bitstream has no access units"))?;

    let mut rec = AvcDecoderConfigurationRecord {
        configuration_version: 1,
        length_size_minus_one: 3,
        ..AvcDecoderConfigurationRecord::default()
    };
    for unit in &units {
        for sps in &unit.sps_nals {
            // profile / compatibility / level live right after the
            // NAL header byte.
            if sps.len() >= 4 {
                rec.profile_indication = sps[1];
                rec.profile_compatibility = sps[2];
                rec.level_indication = sps[3];
            }
            if !rec.sps.contains(sps) {
                rec.sps.push(sps.clone());
            }
        }
        for pps in &unit.pps_nals {
            if !rec.pps.contains(pps) {
                rec.pps.push(pps.clone());
            }
        }
    }
    let (width, height) = (first.width, first.height);
    Ok(ParsedBitstream {
        code_type: code_type.to_string(),
        images: images_from_units(&units, true),
        config: AvcConfigurationBox { configuration: rec }.to_heifbox(),
        width,
        height,
    })
}

// Fill the hvcC profile fields from an SPS NAL unit.
fn hevc_config_from_sps(rec: &mut HevcDecoderConfigurationRecord, sps_nal: &[u8]) -> io::Result<()> {
    let rbsp = nal_to_rbsp(&sps_nal[2..]);
    let mut r = BitReader::new(&rbsp);
    let sps = crate::parse::hevc::HevcSps::read(&mut r, 0, None)?;
    if let Some(ptl) = sps.ptl.as_ref() {
        rec.general_profile_space = ptl.general_profile_space;
        rec.general_tier_flag = ptl.general_tier_flag;
        rec.general_profile_idc = ptl.general_profile_idc;
        rec.general_profile_compatibility_flags = ptl.general_profile_compatibility_flags;
        rec.general_level_idc = ptl.general_level_idc;
    }
    rec.chroma_format_idc = sps.chroma_format_idc as u8;
    rec.bit_depth_luma_minus8 = sps.bit_depth_luma_minus8 as u8;
    rec.bit_depth_chroma_minus8 = sps.bit_depth_chroma_minus8 as u8;
    rec.num_temporal_layers = sps.max_sub_layers_minus1 + 1;
    rec.temporal_id_nested = sps.temporal_id_nesting_flag;
    Ok(())
}

fn parse_hevc(code_type: &str, data: &[u8]) -> io::Result<ParsedBitstream> {
    let mut parser = HevcStreamParser::new();
    let units = parser.parse_stream(data)?;
    let first = units
        .first()
        .ok_or_else(|| ioerr!(InvalidData, "bitstream has no access units"))?;

    let mut rec = HevcDecoderConfigurationRecord {
        configuration_version: 1,
        length_size_minus_one: 3,
        ..HevcDecoderConfigurationRecord::default()
    };
    let mut sps_seen = false;
    for unit in &units {
        for vps in &unit.vps_nals {
            rec.add_nal_unit(vps.clone(), hevc_nal_type::VPS, true);
        }
        for sps in &unit.sps_nals {
            if !sps_seen {
                hevc_config_from_sps(&mut rec, sps)?;
                sps_seen = true;
            }
            rec.add_nal_unit(sps.clone(), hevc_nal_type::SPS, true);
        }
        for pps in &unit.pps_nals {
            rec.add_nal_unit(pps.clone(), hevc_nal_type::PPS, true);
        }
    }
    let (width, height) = (first.width, first.height);
    Ok(ParsedBitstream {
        code_type: code_type.to_string(),
        images: images_from_units(&units, false),
        config: HevcConfigurationBox { configuration: rec }.to_heifbox(),
        width,
        height,
    })
}

fn parse_lhevc(code_type: &str, data: &[u8]) -> io::Result<ParsedBitstream> {
    let mut parser = HevcStreamParser::new();
    let units = parser.parse_stream(data)?;
    let first = units
        .first()
        .ok_or_else(|| ioerr!(InvalidData, "bitstream has no access units"))?;

    let mut rec = LhevcDecoderConfigurationRecord {
        configuration_version: 1,
        length_size_minus_one: 3,
        num_temporal_layers: 1,
        ..LhevcDecoderConfigurationRecord::default()
    };
    for unit in &units {
        for vps in &unit.vps_nals {
            rec.add_nal_unit(vps.clone(), hevc_nal_type::VPS, true);
        }
        for sps in &unit.sps_nals {
            // temporal layer count from the (layered) SPS header.
            if let Ok(h) = HevcNalHeader::parse(sps) {
                let rbsp = nal_to_rbsp(&sps[2..]);
                let mut r = BitReader::new(&rbsp);
                r.read_bits(4).ok();
                if h.nuh_layer_id == 0 {
                    if let Ok(b) = r.read_bits(3) {
                        rec.num_temporal_layers = b as u8 + 1;
                    }
                }
            }
            rec.add_nal_unit(sps.clone(), hevc_nal_type::SPS, true);
        }
        for pps in &unit.pps_nals {
            rec.add_nal_unit(pps.clone(), hevc_nal_type::PPS, true);
        }
    }
    let (width, height) = (first.width, first.height);
    Ok(ParsedBitstream {
        code_type: code_type.to_string(),
        images: images_from_units(&units, false),
        config: LhevcConfigurationBox { configuration: rec }.to_heifbox(),
        width,
        height,
    })
}
