//! HEVC (H.265) slice segment header.
use std::io;

use crate::bitstream::BitReader;
use crate::parse::hevc::{ceil_log2, HevcPps, HevcSps, HevcVps, ShortTermRps};
use crate::parse::{hevc_nal_type, HevcNalHeader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HevcSliceType {
    B,
    P,
    I,
}

impl HevcSliceType {
    fn from_u32(v: u32) -> io::Result<HevcSliceType> {
        Ok(match v {
            0 => HevcSliceType::B,
            1 => HevcSliceType::P,
            2 => HevcSliceType::I,
            other => return Err(ioerr!(InvalidData, "slice: bad slice_type {}", other)),
        })
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, HevcSliceType::I)
    }
}

/// One long term reference picture entry of a slice.
#[derive(Clone, Copy, Debug, Default)]
pub struct LongTermRefEntry {
    pub poc_lsb: u32,
    pub used_by_curr_pic: bool,
    pub msb_present: bool,
    pub delta_poc_msb_cycle: u32,
}

/// HEVC slice segment header.
#[derive(Clone, Debug)]
pub struct HevcSliceHeader {
    pub nal: HevcNalHeader,
    pub first_slice_segment_in_pic_flag: bool,
    pub no_output_of_prior_pics_flag: bool,
    pub pps_id: u8,
    pub dependent_slice_segment_flag: bool,
    pub slice_segment_address: u32,
    pub slice_type: HevcSliceType,
    pub pic_output_flag: bool,
    pub slice_pic_order_cnt_lsb: u32,
    /// The active short term RPS (from the SPS pool or inline).
    pub short_term_rps: ShortTermRps,
    pub short_term_rps_sps_flag: bool,
    pub short_term_rps_idx: u32,
    pub long_term_refs: Vec<LongTermRefEntry>,
    pub temporal_mvp_enabled_flag: bool,
    pub inter_layer_pred_enabled_flag: bool,
    pub inter_layer_pred_layer_idc: Vec<u32>,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub list_entry_l0: Vec<u32>,
    pub list_entry_l1: Vec<u32>,
    pub five_minus_max_num_merge_cand: u32,
    pub slice_qp_delta: i32,
    pub num_entry_point_offsets: u32,
}

impl HevcSliceHeader {
    pub fn is_irap(&self) -> bool {
        self.nal.is_irap()
    }

    /// NumPicTotalCurr: reference pictures available to the current
    /// picture.
    pub fn num_pic_total_curr(&self) -> usize {
        let st = self
            .short_term_rps
            .used_by_curr_pic_s0
            .iter()
            .chain(self.short_term_rps.used_by_curr_pic_s1.iter())
            .filter(|&&u| u)
            .count();
        let lt = self.long_term_refs.iter().filter(|e| e.used_by_curr_pic).count();
        st + lt + self.inter_layer_pred_layer_idc.len()
    }

    /// Parse a slice segment header from RBSP data (the two NAL header
    /// bytes stripped from the reader).
    pub fn read(
        reader: &mut BitReader,
        nal: HevcNalHeader,
        sps: &HevcSps,
        pps: &HevcPps,
        vps: Option<&HevcVps>,
    ) -> io::Result<HevcSliceHeader> {
        let first_slice_segment_in_pic_flag = reader.read_bit()?;
        let mut no_output_of_prior_pics_flag = false;
        if nal.nal_unit_type >= hevc_nal_type::BLA_W_LP
            && nal.nal_unit_type <= hevc_nal_type::RESERVED_IRAP_VCL23
        {
            no_output_of_prior_pics_flag = reader.read_bit()?;
        }
        let pps_id = reader.read_ue_max(63)? as u8;

        let mut dependent_slice_segment_flag = false;
        let mut slice_segment_address = 0;
        if !first_slice_segment_in_pic_flag {
            if pps.dependent_slice_segments_enabled_flag {
                dependent_slice_segment_flag = reader.read_bit()?;
            }
            slice_segment_address = reader.read_bits(sps.slice_address_len())?;
        }

        let mut header = HevcSliceHeader {
            nal,
            first_slice_segment_in_pic_flag,
            no_output_of_prior_pics_flag,
            pps_id,
            dependent_slice_segment_flag,
            slice_segment_address,
            slice_type: HevcSliceType::I,
            pic_output_flag: true,
            slice_pic_order_cnt_lsb: 0,
            short_term_rps: ShortTermRps::default(),
            short_term_rps_sps_flag: false,
            short_term_rps_idx: 0,
            long_term_refs: Vec::new(),
            temporal_mvp_enabled_flag: false,
            inter_layer_pred_enabled_flag: false,
            inter_layer_pred_layer_idc: Vec::new(),
            num_ref_idx_l0_active_minus1: pps.num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_active_minus1: pps.num_ref_idx_l1_default_active_minus1,
            list_entry_l0: Vec::new(),
            list_entry_l1: Vec::new(),
            five_minus_max_num_merge_cand: 0,
            slice_qp_delta: 0,
            num_entry_point_offsets: 0,
        };

        if dependent_slice_segment_flag {
            // dependent segments inherit the independent header.
            return Ok(header);
        }

        for _ in 0..pps.num_extra_slice_header_bits {
            reader.read_bit()?;
        }
        header.slice_type = HevcSliceType::from_u32(reader.read_ue_max(2)?)?;
        if pps.output_flag_present_flag {
            header.pic_output_flag = reader.read_bit()?;
        }
        if sps.separate_colour_plane_flag {
            reader.read_bits(2)?; // colour_plane_id
        }

        if !nal.is_idr() {
            header.slice_pic_order_cnt_lsb =
                reader.read_bits(sps.log2_max_pic_order_cnt_lsb_minus4 + 4)?;
            header.short_term_rps_sps_flag = reader.read_bit()?;
            if !header.short_term_rps_sps_flag {
                let n = sps.short_term_rps.len() as u32;
                header.short_term_rps = ShortTermRps::read(reader, n, n, &sps.short_term_rps)?;
            } else if sps.short_term_rps.len() > 1 {
                let len = ceil_log2(sps.short_term_rps.len() as u32);
                header.short_term_rps_idx = reader.read_bits(len)?;
                header.short_term_rps = sps
                    .short_term_rps
                    .get(header.short_term_rps_idx as usize)
                    .cloned()
                    .ok_or_else(|| ioerr!(InvalidData, "slice: bad short term rps index"))?;
            } else if let Some(rps) = sps.short_term_rps.first() {
                header.short_term_rps = rps.clone();
            }

            if sps.long_term_ref_pics_present_flag {
                let num_lt_sps_total = sps.lt_ref_pic_poc_lsb_sps.len() as u32;
                let num_long_term_sps = if num_lt_sps_total > 0 {
                    reader.read_ue_max(num_lt_sps_total)?
                } else {
                    0
                };
                let num_long_term_pics = reader.read_ue_max(32)?;
                for i in 0..num_long_term_sps + num_long_term_pics {
                    let mut entry = LongTermRefEntry::default();
                    if i < num_long_term_sps {
                        let idx = if num_lt_sps_total > 1 {
                            reader.read_bits(ceil_log2(num_lt_sps_total))?
                        } else {
                            0
                        };
                        entry.poc_lsb = sps
                            .lt_ref_pic_poc_lsb_sps
                            .get(idx as usize)
                            .copied()
                            .ok_or_else(|| ioerr!(InvalidData, "slice: bad lt sps index"))?;
                        entry.used_by_curr_pic = sps
                            .used_by_curr_pic_lt_sps
                            .get(idx as usize)
                            .copied()
                            .unwrap_or(false);
                    } else {
                        entry.poc_lsb =
                            reader.read_bits(sps.log2_max_pic_order_cnt_lsb_minus4 + 4)?;
                        entry.used_by_curr_pic = reader.read_bit()?;
                    }
                    entry.msb_present = reader.read_bit()?;
                    if entry.msb_present {
                        entry.delta_poc_msb_cycle = reader.read_ue()?;
                    }
                    header.long_term_refs.push(entry);
                }
            }
            if sps.temporal_mvp_enabled_flag {
                header.temporal_mvp_enabled_flag = reader.read_bit()?;
            }
        }

        // inter layer prediction signalling for nuh_layer_id > 0.
        if nal.nuh_layer_id > 0 {
            if let Some(ext) = vps.and_then(|v| v.extension.as_ref()) {
                let num_direct = ext.num_direct_ref_layers(nal.nuh_layer_id) as u32;
                if !ext.default_ref_layers_active_flag && num_direct > 0 {
                    header.inter_layer_pred_enabled_flag = reader.read_bit()?;
                    if header.inter_layer_pred_enabled_flag && num_direct > 1 {
                        let num_refs = if !ext.max_one_active_ref_layer_flag {
                            reader.read_ue_max(num_direct - 1)? + 1
                        } else {
                            1
                        };
                        if num_refs != num_direct {
                            let len = ceil_log2(num_direct);
                            for _ in 0..num_refs {
                                header.inter_layer_pred_layer_idc.push(reader.read_bits(len)?);
                            }
                        } else {
                            for i in 0..num_direct {
                                header.inter_layer_pred_layer_idc.push(i);
                            }
                        }
                    } else if header.inter_layer_pred_enabled_flag {
                        header.inter_layer_pred_layer_idc.push(0);
                    }
                }
            }
        }

        if sps.sample_adaptive_offset_enabled_flag {
            reader.read_bit()?; // slice_sao_luma_flag
            if sps.chroma_format_idc != 0 {
                reader.read_bit()?; // slice_sao_chroma_flag
            }
        }

        if !header.slice_type.is_intra() {
            if reader.read_bit()? {
                header.num_ref_idx_l0_active_minus1 = reader.read_ue_max(14)?;
                if header.slice_type == HevcSliceType::B {
                    header.num_ref_idx_l1_active_minus1 = reader.read_ue_max(14)?;
                }
            }
            let num_pic_total_curr = header.num_pic_total_curr();
            if pps.lists_modification_present_flag && num_pic_total_curr > 1 {
                let len = ceil_log2(num_pic_total_curr as u32);
                if reader.read_bit()? {
                    for _ in 0..=header.num_ref_idx_l0_active_minus1 {
                        header.list_entry_l0.push(reader.read_bits(len)?);
                    }
                }
                if header.slice_type == HevcSliceType::B {
                    if reader.read_bit()? {
                        for _ in 0..=header.num_ref_idx_l1_active_minus1 {
                            header.list_entry_l1.push(reader.read_bits(len)?);
                        }
                    }
                }
            }
            if header.slice_type == HevcSliceType::B {
                reader.read_bit()?; // mvd_l1_zero_flag
            }
            if pps.cabac_init_present_flag {
                reader.read_bit()?; // cabac_init_flag
            }
            if header.temporal_mvp_enabled_flag {
                let collocated_from_l0 = if header.slice_type == HevcSliceType::B {
                    reader.read_bit()?
                } else {
                    true
                };
                let active = if collocated_from_l0 {
                    header.num_ref_idx_l0_active_minus1
                } else {
                    header.num_ref_idx_l1_active_minus1
                };
                if active > 0 {
                    reader.read_ue()?; // collocated_ref_idx
                }
            }
            if (pps.weighted_pred_flag && header.slice_type == HevcSliceType::P)
                || (pps.weighted_bipred_flag && header.slice_type == HevcSliceType::B)
            {
                skip_pred_weight_table(reader, sps, &header)?;
            }
            header.five_minus_max_num_merge_cand = reader.read_ue_max(4)?;
        }

        header.slice_qp_delta = reader.read_se()?;
        if pps.slice_chroma_qp_offsets_present_flag {
            reader.read_se()?; // slice_cb_qp_offset
            reader.read_se()?; // slice_cr_qp_offset
        }
        let mut deblocking_filter_disabled = pps.deblocking_filter_disabled_flag;
        if pps.deblocking_filter_control_present_flag {
            let mut overridden = false;
            if pps.deblocking_filter_override_enabled_flag {
                overridden = reader.read_bit()?;
            }
            if overridden {
                deblocking_filter_disabled = reader.read_bit()?;
                if !deblocking_filter_disabled {
                    reader.read_se()?; // slice_beta_offset_div2
                    reader.read_se()?; // slice_tc_offset_div2
                }
            }
        }
        if pps.loop_filter_across_slices_enabled_flag
            && (sps.sample_adaptive_offset_enabled_flag || !deblocking_filter_disabled)
        {
            reader.read_bit()?; // slice_loop_filter_across_slices_enabled_flag
        }

        if pps.tiles_enabled_flag || pps.entropy_coding_sync_enabled_flag {
            header.num_entry_point_offsets = reader.read_ue()?;
            if header.num_entry_point_offsets > 0 {
                let offset_len = reader.read_ue_max(31)? + 1;
                for _ in 0..header.num_entry_point_offsets {
                    reader.read_bits(offset_len as u8)?;
                }
            }
        }

        Ok(header)
    }
}

fn skip_pred_weight_table(
    reader: &mut BitReader,
    sps: &HevcSps,
    header: &HevcSliceHeader,
) -> io::Result<()> {
    let chroma = sps.chroma_format_idc != 0;
    reader.read_ue()?; // luma_log2_weight_denom
    if chroma {
        reader.read_se()?; // delta_chroma_log2_weight_denom
    }
    let mut one_list = |count: u32| -> io::Result<()> {
        let n = count as usize + 1;
        let mut luma_flags = Vec::with_capacity(n);
        for _ in 0..n {
            luma_flags.push(reader.read_bit()?);
        }
        let mut chroma_flags = vec![false; n];
        if chroma {
            for i in 0..n {
                chroma_flags[i] = reader.read_bit()?;
            }
        }
        for i in 0..n {
            if luma_flags[i] {
                reader.read_se()?;
                reader.read_se()?;
            }
            if chroma_flags[i] {
                for _ in 0..4 {
                    reader.read_se()?;
                }
            }
        }
        Ok(())
    };
    one_list(header.num_ref_idx_l0_active_minus1)?;
    if header.slice_type == HevcSliceType::B {
        one_list(header.num_ref_idx_l1_active_minus1)?;
    }
    Ok(())
}
