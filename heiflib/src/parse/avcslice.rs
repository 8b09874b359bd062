//! AVC (H.264) slice header.
//!
//! Parses every field up to and including the deblocking parameters,
//! which is all the DPB engine and access unit boundary test need.
use std::io;

use crate::bitstream::BitReader;
use crate::parse::avc::{AvcPps, AvcSps, PicOrderCntType};
use crate::parse::AvcNalHeader;

/// Slice type, slice_type % 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    fn from_u32(v: u32) -> io::Result<SliceType> {
        Ok(match v % 5 {
            0 => SliceType::P,
            1 => SliceType::B,
            2 => SliceType::I,
            3 => SliceType::Sp,
            _ => SliceType::Si,
        })
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, SliceType::I | SliceType::Si)
    }

    pub fn is_b(&self) -> bool {
        matches!(self, SliceType::B)
    }
}

/// One reference picture list modification command.
///
/// `idc` 0/1 carry abs_diff_pic_num_minus1, idc 2 a long_term_pic_num.
#[derive(Clone, Copy, Debug)]
pub struct RefPicListModOp {
    pub idc: u32,
    pub value: u32,
}

/// One memory management control operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmcoOp {
    pub op: u32,
    pub difference_of_pic_nums_minus1: u32,
    pub long_term_pic_num: u32,
    pub long_term_frame_idx: u32,
    pub max_long_term_frame_idx_plus1: u32,
}

const MAX_MMCO_OPS: usize = 35;

/// AVC slice header.
#[derive(Clone, Debug)]
pub struct AvcSliceHeader {
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    pub pps_id: u8,
    pub colour_plane_id: u8,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: u32,
    pub pic_order_cnt_lsb: u32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    pub redundant_pic_cnt: u32,
    pub direct_spatial_mv_pred_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub ref_pic_list_mod_l0: Vec<RefPicListModOp>,
    pub ref_pic_list_mod_l1: Vec<RefPicListModOp>,
    pub no_output_of_prior_pics_flag: bool,
    pub long_term_reference_flag: bool,
    pub adaptive_ref_pic_marking_mode_flag: bool,
    pub mmco_ops: Vec<MmcoOp>,
    pub cabac_init_idc: u32,
    pub slice_qp_delta: i32,
    pub disable_deblocking_filter_idc: u32,
    pub slice_alpha_c0_offset_div2: i32,
    pub slice_beta_offset_div2: i32,
}

impl AvcSliceHeader {
    pub fn is_idr(&self) -> bool {
        self.nal_unit_type == crate::parse::avc_nal_type::SLICE_IDR
    }

    pub fn is_reference(&self) -> bool {
        self.nal_ref_idc != 0
    }

    pub fn has_mmco5(&self) -> bool {
        self.mmco_ops.iter().any(|op| op.op == 5)
    }

    /// Parse a slice header from RBSP data (NAL header byte included in
    /// `nal` but already stripped from the reader).
    pub fn read(reader: &mut BitReader, nal: AvcNalHeader, sps: &AvcSps, pps: &AvcPps) -> io::Result<AvcSliceHeader> {
        let first_mb_in_slice = reader.read_ue()?;
        let slice_type = SliceType::from_u32(reader.read_ue_max(9)?)?;
        let pps_id = reader.read_ue_max(255)? as u8;

        let separate_colour_plane = sps
            .chroma_format
            .as_ref()
            .map(|c| c.separate_colour_plane_flag)
            .unwrap_or(false);
        let colour_plane_id = if separate_colour_plane {
            reader.read_bits(2)? as u8
        } else {
            0
        };

        let frame_num = reader.read_bits(sps.log2_max_frame_num_minus4 + 4)?;

        let mut field_pic_flag = false;
        let mut bottom_field_flag = false;
        if !sps.frame_mbs_only_flag {
            field_pic_flag = reader.read_bit()?;
            if field_pic_flag {
                bottom_field_flag = reader.read_bit()?;
            }
        }

        let is_idr = nal.is_idr();
        let idr_pic_id = if is_idr { reader.read_ue()? } else { 0 };

        let mut pic_order_cnt_lsb = 0;
        let mut delta_pic_order_cnt_bottom = 0;
        let mut delta_pic_order_cnt = [0i32; 2];
        match &sps.pic_order_cnt_type {
            PicOrderCntType::Zero {
                log2_max_pic_order_cnt_lsb_minus4,
            } => {
                pic_order_cnt_lsb = reader.read_bits(log2_max_pic_order_cnt_lsb_minus4 + 4)?;
                if pps.pic_order_present_flag && !field_pic_flag {
                    delta_pic_order_cnt_bottom = reader.read_se()?;
                }
            },
            PicOrderCntType::One {
                delta_pic_order_always_zero_flag,
                ..
            } => {
                if !delta_pic_order_always_zero_flag {
                    delta_pic_order_cnt[0] = reader.read_se()?;
                    if pps.pic_order_present_flag && !field_pic_flag {
                        delta_pic_order_cnt[1] = reader.read_se()?;
                    }
                }
            },
            PicOrderCntType::Two => {},
        }

        let redundant_pic_cnt = if pps.redundant_pic_cnt_present_flag {
            reader.read_ue()?
        } else {
            0
        };

        let mut direct_spatial_mv_pred_flag = false;
        if slice_type.is_b() {
            direct_spatial_mv_pred_flag = reader.read_bit()?;
        }

        let mut num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1;
        let mut num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1;
        if matches!(slice_type, SliceType::P | SliceType::Sp | SliceType::B) {
            if reader.read_bit()? {
                num_ref_idx_l0_active_minus1 = reader.read_ue_max(31)?;
                if slice_type.is_b() {
                    num_ref_idx_l1_active_minus1 = reader.read_ue_max(31)?;
                }
            }
        }

        // ref_pic_list_modification
        let mut ref_pic_list_mod_l0 = Vec::new();
        let mut ref_pic_list_mod_l1 = Vec::new();
        if !slice_type.is_intra() {
            if reader.read_bit()? {
                ref_pic_list_mod_l0 = read_modifications(reader)?;
            }
        }
        if slice_type.is_b() {
            if reader.read_bit()? {
                ref_pic_list_mod_l1 = read_modifications(reader)?;
            }
        }

        // pred_weight_table
        if (pps.weighted_pred_flag && matches!(slice_type, SliceType::P | SliceType::Sp))
            || (pps.weighted_bipred_idc == 1 && slice_type.is_b())
        {
            skip_pred_weight_table(
                reader,
                sps,
                slice_type,
                num_ref_idx_l0_active_minus1,
                num_ref_idx_l1_active_minus1,
            )?;
        }

        // dec_ref_pic_marking
        let mut no_output_of_prior_pics_flag = false;
        let mut long_term_reference_flag = false;
        let mut adaptive_ref_pic_marking_mode_flag = false;
        let mut mmco_ops = Vec::new();
        if nal.nal_ref_idc != 0 {
            if is_idr {
                no_output_of_prior_pics_flag = reader.read_bit()?;
                long_term_reference_flag = reader.read_bit()?;
            } else {
                adaptive_ref_pic_marking_mode_flag = reader.read_bit()?;
                if adaptive_ref_pic_marking_mode_flag {
                    loop {
                        let op = reader.read_ue_max(6)?;
                        if op == 0 {
                            break;
                        }
                        if mmco_ops.len() >= MAX_MMCO_OPS {
                            return Err(ioerr!(InvalidData, "slice: too many mmco commands"));
                        }
                        let mut mmco = MmcoOp {
                            op,
                            ..MmcoOp::default()
                        };
                        if op == 1 || op == 3 {
                            mmco.difference_of_pic_nums_minus1 = reader.read_ue()?;
                        }
                        if op == 2 {
                            mmco.long_term_pic_num = reader.read_ue()?;
                        }
                        if op == 3 || op == 6 {
                            mmco.long_term_frame_idx = reader.read_ue()?;
                        }
                        if op == 4 {
                            mmco.max_long_term_frame_idx_plus1 = reader.read_ue()?;
                        }
                        mmco_ops.push(mmco);
                    }
                }
            }
        }

        let mut cabac_init_idc = 0;
        if pps.entropy_coding_mode_flag && !slice_type.is_intra() {
            cabac_init_idc = reader.read_ue_max(2)?;
        }
        let slice_qp_delta = reader.read_se()?;
        if matches!(slice_type, SliceType::Sp | SliceType::Si) {
            if slice_type == SliceType::Sp {
                reader.read_bit()?; // sp_for_switch_flag
            }
            reader.read_se()?; // slice_qs_delta
        }
        let mut disable_deblocking_filter_idc = 0;
        let mut slice_alpha_c0_offset_div2 = 0;
        let mut slice_beta_offset_div2 = 0;
        if pps.deblocking_filter_control_present_flag {
            disable_deblocking_filter_idc = reader.read_ue_max(2)?;
            if disable_deblocking_filter_idc != 1 {
                slice_alpha_c0_offset_div2 = reader.read_se()?;
                slice_beta_offset_div2 = reader.read_se()?;
            }
        }

        Ok(AvcSliceHeader {
            nal_ref_idc: nal.nal_ref_idc,
            nal_unit_type: nal.nal_unit_type,
            first_mb_in_slice,
            slice_type,
            pps_id,
            colour_plane_id,
            frame_num,
            field_pic_flag,
            bottom_field_flag,
            idr_pic_id,
            pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom,
            delta_pic_order_cnt,
            redundant_pic_cnt,
            direct_spatial_mv_pred_flag,
            num_ref_idx_l0_active_minus1,
            num_ref_idx_l1_active_minus1,
            ref_pic_list_mod_l0,
            ref_pic_list_mod_l1,
            no_output_of_prior_pics_flag,
            long_term_reference_flag,
            adaptive_ref_pic_marking_mode_flag,
            mmco_ops,
            cabac_init_idc,
            slice_qp_delta,
            disable_deblocking_filter_idc,
            slice_alpha_c0_offset_div2,
            slice_beta_offset_div2,
        })
    }

    /// Is this slice the start of a new access unit, compared to the
    /// previous slice of the current one?
    ///
    /// Evaluated as soon as two slice headers are available.
    pub fn is_new_access_unit(&self, prev: &AvcSliceHeader, sps: &AvcSps) -> bool {
        if self.frame_num != prev.frame_num {
            return true;
        }
        if self.pps_id != prev.pps_id {
            return true;
        }
        if self.is_idr() != prev.is_idr() {
            return true;
        }
        if self.is_idr() && prev.is_idr() && self.idr_pic_id != prev.idr_pic_id {
            return true;
        }
        if (self.nal_ref_idc == 0) != (prev.nal_ref_idc == 0) {
            return true;
        }
        match &sps.pic_order_cnt_type {
            PicOrderCntType::Zero { .. } => {
                if self.pic_order_cnt_lsb != prev.pic_order_cnt_lsb
                    || self.delta_pic_order_cnt_bottom != prev.delta_pic_order_cnt_bottom
                {
                    return true;
                }
            },
            PicOrderCntType::One { .. } => {
                if self.delta_pic_order_cnt != prev.delta_pic_order_cnt {
                    return true;
                }
            },
            PicOrderCntType::Two => {},
        }
        if self.field_pic_flag != prev.field_pic_flag
            || (self.field_pic_flag && self.bottom_field_flag != prev.bottom_field_flag)
        {
            return true;
        }
        false
    }
}

fn read_modifications(reader: &mut BitReader) -> io::Result<Vec<RefPicListModOp>> {
    let mut v = Vec::new();
    loop {
        let idc = reader.read_ue_max(3)?;
        if idc == 3 {
            break;
        }
        let value = reader.read_ue()?;
        v.push(RefPicListModOp { idc, value });
        if v.len() > 64 {
            return Err(ioerr!(InvalidData, "slice: runaway ref pic list modification"));
        }
    }
    Ok(v)
}

fn skip_pred_weight_table(
    reader: &mut BitReader,
    sps: &AvcSps,
    slice_type: SliceType,
    num_ref_idx_l0_active_minus1: u32,
    num_ref_idx_l1_active_minus1: u32,
) -> io::Result<()> {
    let chroma_format_idc = sps.chroma_format.as_ref().map(|c| c.chroma_format_idc).unwrap_or(1);
    reader.read_ue()?; // luma_log2_weight_denom
    if chroma_format_idc != 0 {
        reader.read_ue()?; // chroma_log2_weight_denom
    }
    let mut one_list = |count: u32| -> io::Result<()> {
        for _ in 0..=count {
            if reader.read_bit()? {
                reader.read_se()?;
                reader.read_se()?;
            }
            if chroma_format_idc != 0 {
                if reader.read_bit()? {
                    for _ in 0..4 {
                        reader.read_se()?;
                    }
                }
            }
        }
        Ok(())
    };
    one_list(num_ref_idx_l0_active_minus1)?;
    if slice_type.is_b() {
        one_list(num_ref_idx_l1_active_minus1)?;
    }
    Ok(())
}
