//! AVC (H.264) sequence and picture parameter sets.
//!
//! Everything the slice header, POC derivation and DPB need is decoded
//! into plain structs; parameter sets are looked up by their id, a new
//! set with an existing id displaces the old one.
use std::io;

use crate::bitstream::BitReader;
use crate::parse::cond;

/// AVC scaling list (4x4 or 8x8).
#[derive(Clone, Debug)]
pub struct ScalingList {
    pub use_default_scaling_matrix_flag: bool,
    pub scaling_list: Vec<u32>,
}

impl ScalingList {
    pub(crate) fn read(reader: &mut BitReader, size_of_list: usize) -> io::Result<ScalingList> {
        let mut last_scale = 8_u32;
        let mut next_scale = 8_u32;
        let mut use_default_scaling_matrix_flag = false;
        let mut scaling_list = Vec::new();

        for j in 0..size_of_list {
            if next_scale != 0 {
                let delta_scale = reader.read_se()?;
                next_scale = (last_scale as i32 + delta_scale + 256) as u32 % 256;
                use_default_scaling_matrix_flag = j == 0 && next_scale == 0;
            }
            let val = if next_scale == 0 { last_scale } else { next_scale };
            scaling_list.push(val);
            last_scale = val;
        }
        Ok(ScalingList {
            use_default_scaling_matrix_flag,
            scaling_list,
        })
    }
}

/// Scaling matrix: the optional per-block-size lists.
#[derive(Clone, Debug, Default)]
pub struct ScalingMatrix {
    pub scaling_list_4x4: Vec<Option<ScalingList>>,
    pub scaling_list_8x8: Vec<Option<ScalingList>>,
}

impl ScalingMatrix {
    fn read(reader: &mut BitReader, chroma_format_idc: u32) -> io::Result<ScalingMatrix> {
        let mut m = ScalingMatrix::default();
        let size = if chroma_format_idc == 3 { 12 } else { 8 };
        for i in 0..size {
            let present = reader.read_bit()?;
            let list = cond(present, || {
                ScalingList::read(reader, if i < 6 { 16 } else { 64 })
            })?;
            if i < 6 {
                m.scaling_list_4x4.push(list);
            } else {
                m.scaling_list_8x8.push(list);
            }
        }
        Ok(m)
    }
}

/// Picture order count configuration of an SPS.
#[derive(Clone, Debug)]
pub enum PicOrderCntType {
    Zero {
        log2_max_pic_order_cnt_lsb_minus4: u8,
    },
    One {
        delta_pic_order_always_zero_flag: bool,
        offset_for_non_ref_pic: i32,
        offset_for_top_to_bottom_field: i32,
        offset_for_ref_frame: Vec<i32>,
    },
    Two,
}

impl PicOrderCntType {
    fn read(reader: &mut BitReader) -> io::Result<PicOrderCntType> {
        match reader.read_ue_max(2)? {
            0 => Ok(PicOrderCntType::Zero {
                log2_max_pic_order_cnt_lsb_minus4: reader.read_ue_max(12)? as u8,
            }),
            1 => {
                let delta_pic_order_always_zero_flag = reader.read_bit()?;
                let offset_for_non_ref_pic = reader.read_se()?;
                let offset_for_top_to_bottom_field = reader.read_se()?;
                let num = reader.read_ue_max(255)?;
                let mut offset_for_ref_frame = Vec::new();
                for _ in 0..num {
                    offset_for_ref_frame.push(reader.read_se()?);
                }
                Ok(PicOrderCntType::One {
                    delta_pic_order_always_zero_flag,
                    offset_for_non_ref_pic,
                    offset_for_top_to_bottom_field,
                    offset_for_ref_frame,
                })
            },
            _ => Ok(PicOrderCntType::Two),
        }
    }
}

/// Chroma format block of high-profile SPSes.
#[derive(Clone, Debug)]
pub struct ChromaFormat {
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    pub scaling_matrix: Option<ScalingMatrix>,
}

impl ChromaFormat {
    fn read(reader: &mut BitReader, profile_idc: u8) -> io::Result<Option<ChromaFormat>> {
        match profile_idc {
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135 => {},
            _ => return Ok(None),
        }
        let chroma_format_idc = reader.read_ue_max(3)?;
        let separate_colour_plane_flag = if chroma_format_idc == 3 {
            reader.read_bit()?
        } else {
            false
        };
        Ok(Some(ChromaFormat {
            chroma_format_idc,
            separate_colour_plane_flag,
            bit_depth_luma_minus8: reader.read_ue_max(6)?,
            bit_depth_chroma_minus8: reader.read_ue_max(6)?,
            qpprime_y_zero_transform_bypass_flag: reader.read_bit()?,
            scaling_matrix: cond(reader.read_bit()?, || {
                ScalingMatrix::read(reader, chroma_format_idc)
            })?,
        }))
    }
}

/// Frame cropping window.
#[derive(Clone, Debug, Default)]
pub struct FrameCropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl FrameCropping {
    fn read(reader: &mut BitReader) -> io::Result<FrameCropping> {
        Ok(FrameCropping {
            left: reader.read_ue()?,
            right: reader.read_ue()?,
            top: reader.read_ue()?,
            bottom: reader.read_ue()?,
        })
    }
}

/// AVC HRD parameters.
#[derive(Clone, Debug)]
pub struct HrdParameters {
    pub cpb_cnt_minus1: u32,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub bit_rate_value_minus1: Vec<u32>,
    pub cpb_size_value_minus1: Vec<u32>,
    pub cbr_flag: Vec<bool>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
}

impl HrdParameters {
    fn read(reader: &mut BitReader) -> io::Result<HrdParameters> {
        let cpb_cnt_minus1 = reader.read_ue_max(31)?;
        let bit_rate_scale = reader.read_bits(4)? as u8;
        let cpb_size_scale = reader.read_bits(4)? as u8;
        let mut bit_rate_value_minus1 = Vec::new();
        let mut cpb_size_value_minus1 = Vec::new();
        let mut cbr_flag = Vec::new();
        for _ in 0..=cpb_cnt_minus1 {
            bit_rate_value_minus1.push(reader.read_ue()?);
            cpb_size_value_minus1.push(reader.read_ue()?);
            cbr_flag.push(reader.read_bit()?);
        }
        Ok(HrdParameters {
            cpb_cnt_minus1,
            bit_rate_scale,
            cpb_size_scale,
            bit_rate_value_minus1,
            cpb_size_value_minus1,
            cbr_flag,
            initial_cpb_removal_delay_length_minus1: reader.read_bits(5)? as u8,
            cpb_removal_delay_length_minus1: reader.read_bits(5)? as u8,
            dpb_output_delay_length_minus1: reader.read_bits(5)? as u8,
            time_offset_length: reader.read_bits(5)? as u8,
        })
    }
}

/// AVC VUI parameters.
#[derive(Clone, Debug, Default)]
pub struct VuiParameters {
    pub aspect_ratio_idc: Option<u8>,
    pub sar_width: u16,
    pub sar_height: u16,
    pub overscan_appropriate: Option<bool>,
    pub video_format: Option<u8>,
    pub video_full_range_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,
    pub num_units_in_tick: Option<u32>,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
    pub nal_hrd_parameters: Option<HrdParameters>,
    pub vcl_hrd_parameters: Option<HrdParameters>,
    pub low_delay_hrd_flag: bool,
    pub pic_struct_present_flag: bool,
    pub bitstream_restriction_flag: bool,
    pub max_num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}

impl VuiParameters {
    fn read(reader: &mut BitReader) -> io::Result<VuiParameters> {
        let mut vui = VuiParameters::default();
        if reader.read_bit()? {
            let idc = reader.read_bits(8)? as u8;
            vui.aspect_ratio_idc = Some(idc);
            if idc == 255 {
                vui.sar_width = reader.read_bits(16)? as u16;
                vui.sar_height = reader.read_bits(16)? as u16;
            }
        }
        if reader.read_bit()? {
            vui.overscan_appropriate = Some(reader.read_bit()?);
        }
        if reader.read_bit()? {
            vui.video_format = Some(reader.read_bits(3)? as u8);
            vui.video_full_range_flag = reader.read_bit()?;
            if reader.read_bit()? {
                vui.colour_primaries = reader.read_bits(8)? as u8;
                vui.transfer_characteristics = reader.read_bits(8)? as u8;
                vui.matrix_coefficients = reader.read_bits(8)? as u8;
            }
        }
        if reader.read_bit()? {
            vui.chroma_sample_loc_type_top_field = reader.read_ue_max(5)?;
            vui.chroma_sample_loc_type_bottom_field = reader.read_ue_max(5)?;
        }
        if reader.read_bit()? {
            vui.num_units_in_tick = Some(reader.read_bits(32)?);
            vui.time_scale = reader.read_bits(32)?;
            vui.fixed_frame_rate_flag = reader.read_bit()?;
        }
        let nal_hrd = reader.read_bit()?;
        vui.nal_hrd_parameters = cond(nal_hrd, || HrdParameters::read(reader))?;
        let vcl_hrd = reader.read_bit()?;
        vui.vcl_hrd_parameters = cond(vcl_hrd, || HrdParameters::read(reader))?;
        if nal_hrd || vcl_hrd {
            vui.low_delay_hrd_flag = reader.read_bit()?;
        }
        vui.pic_struct_present_flag = reader.read_bit()?;
        vui.bitstream_restriction_flag = reader.read_bit()?;
        if vui.bitstream_restriction_flag {
            reader.read_bit()?; // motion_vectors_over_pic_boundaries_flag
            reader.read_ue()?; // max_bytes_per_pic_denom
            reader.read_ue()?; // max_bits_per_mb_denom
            reader.read_ue()?; // log2_max_mv_length_horizontal
            reader.read_ue()?; // log2_max_mv_length_vertical
            vui.max_num_reorder_frames = reader.read_ue()?;
            vui.max_dec_frame_buffering = reader.read_ue()?;
        }
        Ok(vui)
    }
}

/// AVC Sequence Parameter Set.
#[derive(Clone, Debug)]
pub struct AvcSps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub sps_id: u8,
    pub chroma_format: Option<ChromaFormat>,
    pub log2_max_frame_num_minus4: u8,
    pub pic_order_cnt_type: PicOrderCntType,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
    pub frame_cropping: Option<FrameCropping>,
    pub vui_parameters: Option<VuiParameters>,
}

impl AvcSps {
    /// Parse an SPS from RBSP data (the NAL header byte stripped).
    pub fn read(reader: &mut BitReader) -> io::Result<AvcSps> {
        let profile_idc = reader.read_u8()?;
        let constraint_flags = reader.read_u8()?;
        let level_idc = reader.read_u8()?;
        let sps_id = reader.read_ue_max(31)? as u8;
        let chroma_format = ChromaFormat::read(reader, profile_idc)?;
        let log2_max_frame_num_minus4 = reader.read_ue_max(12)? as u8;
        let pic_order_cnt_type = PicOrderCntType::read(reader)?;
        let max_num_ref_frames = reader.read_ue_max(31)?;
        let gaps_in_frame_num_value_allowed_flag = reader.read_bit()?;
        let pic_width_in_mbs_minus1 = reader.read_ue()?;
        let pic_height_in_map_units_minus1 = reader.read_ue()?;
        let frame_mbs_only_flag = reader.read_bit()?;
        let mb_adaptive_frame_field_flag = if !frame_mbs_only_flag {
            reader.read_bit()?
        } else {
            false
        };
        let direct_8x8_inference_flag = reader.read_bit()?;
        let frame_cropping = cond(reader.read_bit()?, || FrameCropping::read(reader))?;
        let vui_parameters = cond(reader.read_bit()?, || VuiParameters::read(reader))?;
        Ok(AvcSps {
            profile_idc,
            constraint_flags,
            level_idc,
            sps_id,
            chroma_format,
            log2_max_frame_num_minus4,
            pic_order_cnt_type,
            max_num_ref_frames,
            gaps_in_frame_num_value_allowed_flag,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_only_flag,
            mb_adaptive_frame_field_flag,
            direct_8x8_inference_flag,
            frame_cropping,
            vui_parameters,
        })
    }

    pub fn max_frame_num(&self) -> u32 {
        1 << (self.log2_max_frame_num_minus4 as u32 + 4)
    }

    fn chroma_format_idc(&self) -> u32 {
        self.chroma_format.as_ref().map(|c| c.chroma_format_idc).unwrap_or(1)
    }

    /// Display width after cropping.
    pub fn width(&self) -> u32 {
        let mut w = (self.pic_width_in_mbs_minus1 + 1) * 16;
        if let Some(crop) = self.frame_cropping.as_ref() {
            let unit = match self.chroma_format_idc() {
                0 | 3 => 1,
                _ => 2,
            };
            w = w.saturating_sub((crop.left + crop.right) * unit);
        }
        w
    }

    /// Display height after cropping.
    pub fn height(&self) -> u32 {
        let frame_mult = if self.frame_mbs_only_flag { 1 } else { 2 };
        let mut h = (self.pic_height_in_map_units_minus1 + 1) * 16 * frame_mult;
        if let Some(crop) = self.frame_cropping.as_ref() {
            let unit = match self.chroma_format_idc() {
                1 => 2,
                _ => 1,
            } * frame_mult;
            h = h.saturating_sub((crop.top + crop.bottom) * unit);
        }
        h
    }
}

/// Slice group layout of a PPS (map types 0..=5; type 6 is outside the
/// HEIF profile and rejected).
#[derive(Clone, Debug, Default)]
pub struct SliceGroups {
    pub num_slice_groups_minus1: u32,
    pub slice_group_map_type: u32,
    pub run_length_minus1: Vec<u32>,
    pub top_left: Vec<u32>,
    pub bottom_right: Vec<u32>,
    pub slice_group_change_direction_flag: bool,
    pub slice_group_change_rate_minus1: u32,
}

impl SliceGroups {
    fn read(reader: &mut BitReader, num_slice_groups_minus1: u32) -> io::Result<SliceGroups> {
        let mut g = SliceGroups::default();
        g.num_slice_groups_minus1 = num_slice_groups_minus1;
        g.slice_group_map_type = reader.read_ue_max(6)?;
        match g.slice_group_map_type {
            0 => {
                for _ in 0..=num_slice_groups_minus1 {
                    g.run_length_minus1.push(reader.read_ue()?);
                }
            },
            2 => {
                for _ in 0..num_slice_groups_minus1 {
                    g.top_left.push(reader.read_ue()?);
                    g.bottom_right.push(reader.read_ue()?);
                }
            },
            3 | 4 | 5 => {
                g.slice_group_change_direction_flag = reader.read_bit()?;
                g.slice_group_change_rate_minus1 = reader.read_ue()?;
            },
            6 => {
                return Err(ioerr!(Unsupported, "pps: slice group map type 6"));
            },
            _ => {},
        }
        Ok(g)
    }
}

/// AVC Picture Parameter Set.
#[derive(Clone, Debug)]
pub struct AvcPps {
    pub pps_id: u8,
    pub sps_id: u8,
    pub entropy_coding_mode_flag: bool,
    pub pic_order_present_flag: bool,
    pub slice_groups: Option<SliceGroups>,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix: Option<ScalingMatrix>,
    pub second_chroma_qp_index_offset: i32,
}

impl AvcPps {
    /// Parse a PPS from RBSP data (the NAL header byte stripped).
    ///
    /// `chroma_format_idc` comes from the referenced SPS and is only
    /// needed for the optional trailing scaling matrix.
    pub fn read(reader: &mut BitReader, chroma_format_idc: u32) -> io::Result<AvcPps> {
        let pps_id = reader.read_ue_max(255)? as u8;
        let sps_id = reader.read_ue_max(31)? as u8;
        let entropy_coding_mode_flag = reader.read_bit()?;
        let pic_order_present_flag = reader.read_bit()?;
        let num_slice_groups_minus1 = reader.read_ue_max(7)?;
        let slice_groups = cond(num_slice_groups_minus1 > 0, || {
            SliceGroups::read(reader, num_slice_groups_minus1)
        })?;
        let num_ref_idx_l0_default_active_minus1 = reader.read_ue_max(31)?;
        let num_ref_idx_l1_default_active_minus1 = reader.read_ue_max(31)?;
        let weighted_pred_flag = reader.read_bit()?;
        let weighted_bipred_idc = reader.read_bits(2)? as u8;
        let pic_init_qp_minus26 = reader.read_se()?;
        let pic_init_qs_minus26 = reader.read_se()?;
        let chroma_qp_index_offset = reader.read_se()?;
        let deblocking_filter_control_present_flag = reader.read_bit()?;
        let constrained_intra_pred_flag = reader.read_bit()?;
        let redundant_pic_cnt_present_flag = reader.read_bit()?;

        let mut transform_8x8_mode_flag = false;
        let mut pic_scaling_matrix = None;
        let mut second_chroma_qp_index_offset = chroma_qp_index_offset;
        if reader.has_more_rbsp_data() {
            transform_8x8_mode_flag = reader.read_bit()?;
            if reader.read_bit()? {
                // The 8x8 list count depends on chroma format and the
                // transform flag.
                let size = 6 + if transform_8x8_mode_flag {
                    if chroma_format_idc == 3 {
                        6
                    } else {
                        2
                    }
                } else {
                    0
                };
                let mut m = ScalingMatrix::default();
                for i in 0..size {
                    let present = reader.read_bit()?;
                    let list = cond(present, || {
                        ScalingList::read(reader, if i < 6 { 16 } else { 64 })
                    })?;
                    if i < 6 {
                        m.scaling_list_4x4.push(list);
                    } else {
                        m.scaling_list_8x8.push(list);
                    }
                }
                pic_scaling_matrix = Some(m);
            }
            second_chroma_qp_index_offset = reader.read_se()?;
        }

        Ok(AvcPps {
            pps_id,
            sps_id,
            entropy_coding_mode_flag,
            pic_order_present_flag,
            slice_groups,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            weighted_pred_flag,
            weighted_bipred_idc,
            pic_init_qp_minus26,
            pic_init_qs_minus26,
            chroma_qp_index_offset,
            deblocking_filter_control_present_flag,
            constrained_intra_pred_flag,
            redundant_pic_cnt_present_flag,
            transform_8x8_mode_flag,
            pic_scaling_matrix,
            second_chroma_qp_index_offset,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bitstream::BitWriter;

    // Build a baseline SPS: poc type 0, 16x16 macroblocks 80x48,
    // log2_max_frame_num 4, log2_max_poc_lsb 4.
    pub(crate) fn make_sps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(66, 8); // profile_idc baseline
        w.write_bits(0xc0, 8); // constraint flags
        w.write_bits(30, 8); // level_idc
        w.write_ue(0); // sps_id
        w.write_ue(0); // log2_max_frame_num_minus4
        w.write_ue(0); // pic_order_cnt_type 0
        w.write_ue(0); // log2_max_pic_order_cnt_lsb_minus4
        w.write_ue(3); // max_num_ref_frames
        w.write_bit(false); // gaps_in_frame_num
        w.write_ue(4); // pic_width_in_mbs_minus1 -> 80
        w.write_ue(2); // pic_height_in_map_units_minus1 -> 48
        w.write_bit(true); // frame_mbs_only
        w.write_bit(false); // direct_8x8_inference
        w.write_bit(false); // frame_cropping
        w.write_bit(false); // vui
        w.write_bit(true); // rbsp stop bit
        w.finish()
    }

    #[test]
    fn sps_parses() {
        let rbsp = make_sps_rbsp();
        let mut r = BitReader::new(&rbsp);
        let sps = AvcSps::read(&mut r).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.width(), 80);
        assert_eq!(sps.height(), 48);
        assert_eq!(sps.max_frame_num(), 16);
        assert_eq!(sps.max_num_ref_frames, 3);
        assert!(matches!(
            sps.pic_order_cnt_type,
            PicOrderCntType::Zero {
                log2_max_pic_order_cnt_lsb_minus4: 0
            }
        ));
    }

    pub(crate) fn make_pps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_ue(0); // pps_id
        w.write_ue(0); // sps_id
        w.write_bit(false); // entropy_coding_mode
        w.write_bit(false); // pic_order_present
        w.write_ue(0); // num_slice_groups_minus1
        w.write_ue(2); // num_ref_idx_l0_default_active_minus1
        w.write_ue(0); // num_ref_idx_l1_default_active_minus1
        w.write_bit(false); // weighted_pred
        w.write_bits(0, 2); // weighted_bipred_idc
        w.write_se(0); // pic_init_qp_minus26
        w.write_se(0); // pic_init_qs_minus26
        w.write_se(0); // chroma_qp_index_offset
        w.write_bit(true); // deblocking_filter_control_present
        w.write_bit(false); // constrained_intra_pred
        w.write_bit(false); // redundant_pic_cnt_present
        w.write_bit(true); // rbsp stop bit
        w.finish()
    }

    #[test]
    fn pps_parses() {
        let rbsp = make_pps_rbsp();
        let mut r = BitReader::new(&rbsp);
        let pps = AvcPps::read(&mut r, 1).unwrap();
        assert_eq!(pps.pps_id, 0);
        assert_eq!(pps.num_ref_idx_l0_default_active_minus1, 2);
        assert!(pps.deblocking_filter_control_present_flag);
        assert!(!pps.transform_8x8_mode_flag);
    }

    #[test]
    fn slice_group_type_6_is_unsupported() {
        let mut w = BitWriter::new();
        w.write_ue(1); // pps_id
        w.write_ue(0); // sps_id
        w.write_bit(false);
        w.write_bit(false);
        w.write_ue(1); // num_slice_groups_minus1 = 1
        w.write_ue(6); // slice_group_map_type 6
        let rbsp = w.finish();
        let mut r = BitReader::new(&rbsp);
        let err = AvcPps::read(&mut r, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
