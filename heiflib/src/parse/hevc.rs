//! HEVC (H.265) video, sequence and picture parameter sets, including
//! the L-HEVC VPS extension for layered streams.
use std::io;

use crate::bitstream::BitReader;
use crate::parse::cond;

pub const MAX_SHORT_TERM_RPS: u32 = 64;

/// profile_tier_level() general part plus per-sub-layer entries.
#[derive(Clone, Debug, Default)]
pub struct ProfileTierLevel {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_progressive_source_flag: bool,
    pub general_interlaced_source_flag: bool,
    pub general_non_packed_constraint_flag: bool,
    pub general_frame_only_constraint_flag: bool,
    pub general_level_idc: u8,
    pub sub_layer_profile_present: Vec<bool>,
    pub sub_layer_level_present: Vec<bool>,
    pub sub_layer_level_idc: Vec<u8>,
}

impl ProfileTierLevel {
    pub(crate) fn read(
        reader: &mut BitReader,
        profile_present: bool,
        max_sub_layers_minus1: u8,
    ) -> io::Result<ProfileTierLevel> {
        let mut ptl = ProfileTierLevel::default();
        if profile_present {
            ptl.general_profile_space = reader.read_bits(2)? as u8;
            ptl.general_tier_flag = reader.read_bit()?;
            ptl.general_profile_idc = reader.read_bits(5)? as u8;
            ptl.general_profile_compatibility_flags = reader.read_bits(32)?;
            ptl.general_progressive_source_flag = reader.read_bit()?;
            ptl.general_interlaced_source_flag = reader.read_bit()?;
            ptl.general_non_packed_constraint_flag = reader.read_bit()?;
            ptl.general_frame_only_constraint_flag = reader.read_bit()?;
            // reserved_zero_44bits
            reader.read_bits(22)?;
            reader.read_bits(22)?;
        }
        ptl.general_level_idc = reader.read_bits(8)? as u8;

        for _ in 0..max_sub_layers_minus1 {
            ptl.sub_layer_profile_present.push(reader.read_bit()?);
            ptl.sub_layer_level_present.push(reader.read_bit()?);
        }
        if max_sub_layers_minus1 > 0 {
            for _ in max_sub_layers_minus1..8 {
                reader.read_bits(2)?; // reserved_zero_2bits
            }
        }
        for i in 0..max_sub_layers_minus1 as usize {
            if ptl.sub_layer_profile_present[i] {
                // same 88 bit layout as the general part.
                reader.read_bits(32)?;
                reader.read_bits(32)?;
                reader.read_bits(24)?;
            }
            if ptl.sub_layer_level_present[i] {
                ptl.sub_layer_level_idc.push(reader.read_bits(8)? as u8);
            } else {
                ptl.sub_layer_level_idc.push(0);
            }
        }
        Ok(ptl)
    }
}

/// scaling_list_data(): decoded coefficient lists.
#[derive(Clone, Debug, Default)]
pub struct ScalingListData {
    /// [size_id][matrix_id] -> coefficients (absent when predicted).
    pub lists: Vec<Vec<Option<Vec<u32>>>>,
    pub dc_coef: Vec<Vec<i32>>,
}

impl ScalingListData {
    pub(crate) fn read(reader: &mut BitReader) -> io::Result<ScalingListData> {
        let mut data = ScalingListData::default();
        for size_id in 0..4usize {
            let mut per_size = Vec::new();
            let mut dc_per_size = Vec::new();
            let step = if size_id == 3 { 3 } else { 1 };
            let mut matrix_id = 0usize;
            while matrix_id < 6 {
                if !reader.read_bit()? {
                    // copy from a predictor matrix.
                    reader.read_ue()?; // scaling_list_pred_matrix_id_delta
                    per_size.push(None);
                    dc_per_size.push(8 + 8);
                } else {
                    let coef_num = std::cmp::min(64usize, 1 << (4 + (size_id << 1)));
                    let mut next_coef: i32 = 8;
                    let mut dc = 8 + 8;
                    if size_id > 1 {
                        let dc_minus8 = reader.read_se()?;
                        dc = dc_minus8 + 8;
                        next_coef = dc;
                    }
                    let mut coefs = Vec::with_capacity(coef_num);
                    for _ in 0..coef_num {
                        let delta = reader.read_se()?;
                        next_coef = (next_coef + delta + 256) % 256;
                        coefs.push(next_coef as u32);
                    }
                    per_size.push(Some(coefs));
                    dc_per_size.push(dc);
                }
                matrix_id += step;
            }
            data.lists.push(per_size);
            data.dc_coef.push(dc_per_size);
        }
        Ok(data)
    }
}

/// A decoded short term reference picture set.
///
/// S0 deltas are negative (before the current picture), S1 positive.
#[derive(Clone, Debug, Default)]
pub struct ShortTermRps {
    pub delta_poc_s0: Vec<i32>,
    pub used_by_curr_pic_s0: Vec<bool>,
    pub delta_poc_s1: Vec<i32>,
    pub used_by_curr_pic_s1: Vec<bool>,
}

impl ShortTermRps {
    pub fn num_delta_pocs(&self) -> usize {
        self.delta_poc_s0.len() + self.delta_poc_s1.len()
    }

    /// Parse one st_ref_pic_set(), expanding inter-RPS prediction
    /// against the already parsed sets.
    pub(crate) fn read(
        reader: &mut BitReader,
        st_rps_idx: u32,
        num_short_term_ref_pic_sets: u32,
        prev: &[ShortTermRps],
    ) -> io::Result<ShortTermRps> {
        let inter_pred = if st_rps_idx != 0 {
            reader.read_bit()?
        } else {
            false
        };
        if inter_pred {
            let delta_idx_minus1 = if st_rps_idx == num_short_term_ref_pic_sets {
                reader.read_ue()?
            } else {
                0
            };
            let delta_rps_sign = reader.read_bit()?;
            let abs_delta_rps_minus1 = reader.read_ue()?;
            let delta_rps = (1 - 2 * delta_rps_sign as i64) * (abs_delta_rps_minus1 as i64 + 1);

            let ref_idx = st_rps_idx as i64 - (delta_idx_minus1 as i64 + 1);
            if ref_idx < 0 || ref_idx as usize >= prev.len() {
                return Err(ioerr!(InvalidData, "st_ref_pic_set: bad inter rps index"));
            }
            let ref_rps = &prev[ref_idx as usize];
            let num_delta = ref_rps.num_delta_pocs();

            let mut used_by_curr = Vec::with_capacity(num_delta + 1);
            let mut use_delta = Vec::with_capacity(num_delta + 1);
            for _ in 0..=num_delta {
                let used = reader.read_bit()?;
                used_by_curr.push(used);
                let ud = if !used { reader.read_bit()? } else { true };
                use_delta.push(ud);
            }

            let num_neg = ref_rps.delta_poc_s0.len();
            let num_pos = ref_rps.delta_poc_s1.len();
            let mut rps = ShortTermRps::default();

            // S0: the reference's S1 in reverse, the delta itself,
            // then the reference's S0 forward.
            for j in (0..num_pos).rev() {
                let d_poc = ref_rps.delta_poc_s1[j] as i64 + delta_rps;
                if d_poc < 0 && use_delta[num_neg + j] {
                    rps.delta_poc_s0.push(d_poc as i32);
                    rps.used_by_curr_pic_s0.push(used_by_curr[num_neg + j]);
                }
            }
            if delta_rps < 0 && use_delta[num_delta] {
                rps.delta_poc_s0.push(delta_rps as i32);
                rps.used_by_curr_pic_s0.push(used_by_curr[num_delta]);
            }
            for j in 0..num_neg {
                let d_poc = ref_rps.delta_poc_s0[j] as i64 + delta_rps;
                if d_poc < 0 && use_delta[j] {
                    rps.delta_poc_s0.push(d_poc as i32);
                    rps.used_by_curr_pic_s0.push(used_by_curr[j]);
                }
            }

            // S1 mirrored.
            for j in (0..num_neg).rev() {
                let d_poc = ref_rps.delta_poc_s0[j] as i64 + delta_rps;
                if d_poc > 0 && use_delta[j] {
                    rps.delta_poc_s1.push(d_poc as i32);
                    rps.used_by_curr_pic_s1.push(used_by_curr[j]);
                }
            }
            if delta_rps > 0 && use_delta[num_delta] {
                rps.delta_poc_s1.push(delta_rps as i32);
                rps.used_by_curr_pic_s1.push(used_by_curr[num_delta]);
            }
            for j in 0..num_pos {
                let d_poc = ref_rps.delta_poc_s1[j] as i64 + delta_rps;
                if d_poc > 0 && use_delta[num_neg + j] {
                    rps.delta_poc_s1.push(d_poc as i32);
                    rps.used_by_curr_pic_s1.push(used_by_curr[num_neg + j]);
                }
            }
            Ok(rps)
        } else {
            let num_negative = reader.read_ue_max(16)?;
            let num_positive = reader.read_ue_max(16)?;
            let mut rps = ShortTermRps::default();
            let mut acc = 0i64;
            for _ in 0..num_negative {
                let d = reader.read_ue()? as i64 + 1;
                acc -= d;
                rps.delta_poc_s0.push(acc as i32);
                rps.used_by_curr_pic_s0.push(reader.read_bit()?);
            }
            let mut acc = 0i64;
            for _ in 0..num_positive {
                let d = reader.read_ue()? as i64 + 1;
                acc += d;
                rps.delta_poc_s1.push(acc as i32);
                rps.used_by_curr_pic_s1.push(reader.read_bit()?);
            }
            Ok(rps)
        }
    }
}

/// HEVC sub-layer HRD entries.
fn read_sub_layer_hrd(reader: &mut BitReader, cpb_cnt: u32, sub_pic: bool) -> io::Result<()> {
    for _ in 0..cpb_cnt {
        reader.read_ue()?; // bit_rate_value_minus1
        reader.read_ue()?; // cpb_size_value_minus1
        if sub_pic {
            reader.read_ue()?; // cpb_size_du_value_minus1
            reader.read_ue()?; // bit_rate_du_value_minus1
        }
        reader.read_bit()?; // cbr_flag
    }
    Ok(())
}

/// hrd_parameters(): consumed for stream position, key rates kept.
#[derive(Clone, Debug, Default)]
pub struct HevcHrdParameters {
    pub nal_hrd_present: bool,
    pub vcl_hrd_present: bool,
    pub sub_pic_hrd_present: bool,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
}

impl HevcHrdParameters {
    pub(crate) fn read(
        reader: &mut BitReader,
        common_inf_present: bool,
        max_sub_layers_minus1: u8,
    ) -> io::Result<HevcHrdParameters> {
        let mut hrd = HevcHrdParameters::default();
        if common_inf_present {
            hrd.nal_hrd_present = reader.read_bit()?;
            hrd.vcl_hrd_present = reader.read_bit()?;
            if hrd.nal_hrd_present || hrd.vcl_hrd_present {
                hrd.sub_pic_hrd_present = reader.read_bit()?;
                if hrd.sub_pic_hrd_present {
                    reader.read_bits(8)?; // tick_divisor_minus2
                    reader.read_bits(5)?; // du_cpb_removal_delay_increment_length_minus1
                    reader.read_bit()?; // sub_pic_cpb_params_in_pic_timing_sei_flag
                    reader.read_bits(5)?; // dpb_output_delay_du_length_minus1
                }
                hrd.bit_rate_scale = reader.read_bits(4)? as u8;
                hrd.cpb_size_scale = reader.read_bits(4)? as u8;
                if hrd.sub_pic_hrd_present {
                    reader.read_bits(4)?; // cpb_size_du_scale
                }
                reader.read_bits(5)?; // initial_cpb_removal_delay_length_minus1
                reader.read_bits(5)?; // au_cpb_removal_delay_length_minus1
                reader.read_bits(5)?; // dpb_output_delay_length_minus1
            }
        }
        for _ in 0..=max_sub_layers_minus1 {
            let fixed_general = reader.read_bit()?;
            let fixed_within_cvs = if !fixed_general { reader.read_bit()? } else { true };
            let mut low_delay = false;
            if fixed_within_cvs {
                reader.read_ue()?; // elemental_duration_in_tc_minus1
            } else {
                low_delay = reader.read_bit()?;
            }
            let cpb_cnt = if !low_delay { reader.read_ue_max(31)? + 1 } else { 1 };
            if hrd.nal_hrd_present {
                read_sub_layer_hrd(reader, cpb_cnt, hrd.sub_pic_hrd_present)?;
            }
            if hrd.vcl_hrd_present {
                read_sub_layer_hrd(reader, cpb_cnt, hrd.sub_pic_hrd_present)?;
            }
        }
        Ok(hrd)
    }
}

/// HEVC VUI parameters.
#[derive(Clone, Debug, Default)]
pub struct HevcVui {
    pub aspect_ratio_idc: Option<u8>,
    pub sar_width: u16,
    pub sar_height: u16,
    pub video_full_range_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub num_units_in_tick: Option<u32>,
    pub time_scale: u32,
    pub hrd: Option<HevcHrdParameters>,
}

impl HevcVui {
    pub(crate) fn read(reader: &mut BitReader, max_sub_layers_minus1: u8) -> io::Result<HevcVui> {
        let mut vui = HevcVui::default();
        if reader.read_bit()? {
            let idc = reader.read_bits(8)? as u8;
            vui.aspect_ratio_idc = Some(idc);
            if idc == 255 {
                vui.sar_width = reader.read_bits(16)? as u16;
                vui.sar_height = reader.read_bits(16)? as u16;
            }
        }
        if reader.read_bit()? {
            reader.read_bit()?; // overscan_appropriate_flag
        }
        if reader.read_bit()? {
            reader.read_bits(3)?; // video_format
            vui.video_full_range_flag = reader.read_bit()?;
            if reader.read_bit()? {
                vui.colour_primaries = reader.read_bits(8)? as u8;
                vui.transfer_characteristics = reader.read_bits(8)? as u8;
                vui.matrix_coefficients = reader.read_bits(8)? as u8;
            }
        }
        if reader.read_bit()? {
            reader.read_ue()?; // chroma_sample_loc_type_top_field
            reader.read_ue()?; // chroma_sample_loc_type_bottom_field
        }
        reader.read_bit()?; // neutral_chroma_indication_flag
        reader.read_bit()?; // field_seq_flag
        reader.read_bit()?; // frame_field_info_present_flag
        if reader.read_bit()? {
            // default display window
            reader.read_ue()?;
            reader.read_ue()?;
            reader.read_ue()?;
            reader.read_ue()?;
        }
        if reader.read_bit()? {
            vui.num_units_in_tick = Some(reader.read_bits(32)?);
            vui.time_scale = reader.read_bits(32)?;
            if reader.read_bit()? {
                reader.read_ue()?; // vui_num_ticks_poc_diff_one_minus1
            }
            if reader.read_bit()? {
                vui.hrd = Some(HevcHrdParameters::read(reader, true, max_sub_layers_minus1)?);
            }
        }
        if reader.read_bit()? {
            // bitstream restriction
            reader.read_bit()?;
            reader.read_bit()?;
            reader.read_bit()?;
            reader.read_ue()?; // min_spatial_segmentation_idc
            reader.read_ue()?; // max_bytes_per_pic_denom
            reader.read_ue()?; // max_bits_per_min_cu_denom
            reader.read_ue()?; // log2_max_mv_length_horizontal
            reader.read_ue()?; // log2_max_mv_length_vertical
        }
        Ok(vui)
    }
}

/// One rep_format() entry of the VPS extension.
#[derive(Clone, Debug, Default)]
pub struct RepFormat {
    pub pic_width_vps_in_luma_samples: u16,
    pub pic_height_vps_in_luma_samples: u16,
    pub chroma_format_vps_idc: u8,
    pub separate_colour_plane_vps_flag: bool,
    pub bit_depth_vps_luma_minus8: u8,
    pub bit_depth_vps_chroma_minus8: u8,
}

impl RepFormat {
    fn read(reader: &mut BitReader) -> io::Result<RepFormat> {
        let mut rf = RepFormat::default();
        rf.pic_width_vps_in_luma_samples = reader.read_bits(16)? as u16;
        rf.pic_height_vps_in_luma_samples = reader.read_bits(16)? as u16;
        if reader.read_bit()? {
            rf.chroma_format_vps_idc = reader.read_bits(2)? as u8;
            if rf.chroma_format_vps_idc == 3 {
                rf.separate_colour_plane_vps_flag = reader.read_bit()?;
            }
            rf.bit_depth_vps_luma_minus8 = reader.read_bits(4)? as u8;
            rf.bit_depth_vps_chroma_minus8 = reader.read_bits(4)? as u8;
        } else {
            rf.chroma_format_vps_idc = 1;
        }
        if reader.read_bit()? {
            // conformance window
            reader.read_ue()?;
            reader.read_ue()?;
            reader.read_ue()?;
            reader.read_ue()?;
        }
        Ok(rf)
    }
}

/// The L-HEVC VPS extension: layer topology and output layer sets.
#[derive(Clone, Debug, Default)]
pub struct VpsExtension {
    pub splitting_flag: bool,
    pub scalability_mask: u16,
    pub layer_id_in_nuh: Vec<u8>,
    pub dimension_id: Vec<Vec<u8>>,
    pub view_id_val: Vec<u16>,
    /// direct_dependency_flag[i][j]: layer i depends directly on layer j
    /// (indices into the layer table, not nuh ids).
    pub direct_dependency: Vec<Vec<bool>>,
    pub max_tid_il_ref_pics_plus1: Vec<Vec<u8>>,
    pub default_ref_layers_active_flag: bool,
    pub profile_tier_levels: Vec<ProfileTierLevel>,
    pub default_output_layer_idc: u8,
    /// Per output layer set: index of the underlying layer set.
    pub ols_to_layer_set: Vec<u32>,
    /// Per output layer set: output_layer_flag per layer in the set.
    pub output_layer_flags: Vec<Vec<bool>>,
    pub rep_formats: Vec<RepFormat>,
    pub vps_rep_format_idx: Vec<u32>,
    pub max_one_active_ref_layer_flag: bool,
    pub poc_lsb_aligned_flag: bool,
    pub poc_lsb_not_present: Vec<bool>,
    /// Layers included per layer set (nuh layer ids).
    pub layer_sets: Vec<Vec<u8>>,
}

impl VpsExtension {
    /// Index into the layer table for a nuh layer id.
    pub fn layer_idx(&self, nuh_layer_id: u8) -> Option<usize> {
        self.layer_id_in_nuh.iter().position(|&id| id == nuh_layer_id)
    }

    /// Direct reference layers (nuh ids) of one layer.
    pub fn direct_ref_layers(&self, nuh_layer_id: u8) -> Vec<u8> {
        let i = match self.layer_idx(nuh_layer_id) {
            Some(i) => i,
            None => return Vec::new(),
        };
        let mut v = Vec::new();
        for j in 0..i {
            if self.direct_dependency[i][j] {
                v.push(self.layer_id_in_nuh[j]);
            }
        }
        v
    }

    pub fn num_direct_ref_layers(&self, nuh_layer_id: u8) -> usize {
        self.direct_ref_layers(nuh_layer_id).len()
    }

    /// Transitive closure of the reference layers of one layer.
    pub fn ref_layers(&self, nuh_layer_id: u8) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut stack = self.direct_ref_layers(nuh_layer_id);
        while let Some(id) = stack.pop() {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            stack.extend(self.direct_ref_layers(id));
        }
        seen.sort();
        seen
    }

    pub fn num_ref_layers(&self, nuh_layer_id: u8) -> usize {
        self.ref_layers(nuh_layer_id).len()
    }

    /// Layers that are (transitively) predicted from this one.
    pub fn predicted_layers(&self, nuh_layer_id: u8) -> Vec<u8> {
        let mut v = Vec::new();
        for &other in &self.layer_id_in_nuh {
            if other != nuh_layer_id && self.ref_layers(other).contains(&nuh_layer_id) {
                v.push(other);
            }
        }
        v
    }

    pub fn num_predicted_layers(&self, nuh_layer_id: u8) -> usize {
        self.predicted_layers(nuh_layer_id).len()
    }

    /// num_layers_in_id_list for one layer set.
    pub fn num_layers_in_id_list(&self, layer_set_idx: usize) -> usize {
        self.layer_sets.get(layer_set_idx).map(|s| s.len()).unwrap_or(0)
    }
}

/// HEVC Video Parameter Set.
#[derive(Clone, Debug, Default)]
pub struct HevcVps {
    pub vps_id: u8,
    pub base_layer_internal_flag: bool,
    pub base_layer_available_flag: bool,
    pub max_layers_minus1: u8,
    pub max_sub_layers_minus1: u8,
    pub temporal_id_nesting_flag: bool,
    pub ptl: ProfileTierLevel,
    pub max_layer_id: u8,
    pub num_layer_sets_minus1: u32,
    pub layer_id_included: Vec<Vec<bool>>,
    pub num_units_in_tick: Option<u32>,
    pub time_scale: u32,
    pub extension: Option<VpsExtension>,
}

impl HevcVps {
    pub fn read(reader: &mut BitReader) -> io::Result<HevcVps> {
        let mut vps = HevcVps::default();
        vps.vps_id = reader.read_bits(4)? as u8;
        vps.base_layer_internal_flag = reader.read_bit()?;
        vps.base_layer_available_flag = reader.read_bit()?;
        vps.max_layers_minus1 = reader.read_bits(6)? as u8;
        vps.max_sub_layers_minus1 = reader.read_bits(3)? as u8;
        vps.temporal_id_nesting_flag = reader.read_bit()?;
        reader.read_bits(16)?; // vps_reserved_0xffff_16bits
        vps.ptl = ProfileTierLevel::read(reader, true, vps.max_sub_layers_minus1)?;
        let sub_layer_ordering_info_present = reader.read_bit()?;
        let start = if sub_layer_ordering_info_present {
            0
        } else {
            vps.max_sub_layers_minus1
        };
        for _ in start..=vps.max_sub_layers_minus1 {
            reader.read_ue()?; // vps_max_dec_pic_buffering_minus1
            reader.read_ue()?; // vps_max_num_reorder_pics
            reader.read_ue()?; // vps_max_latency_increase_plus1
        }
        vps.max_layer_id = reader.read_bits(6)? as u8;
        vps.num_layer_sets_minus1 = reader.read_ue_max(1023)?;
        for _ in 1..=vps.num_layer_sets_minus1 {
            let mut included = Vec::new();
            for _ in 0..=vps.max_layer_id {
                included.push(reader.read_bit()?);
            }
            vps.layer_id_included.push(included);
        }
        if reader.read_bit()? {
            vps.num_units_in_tick = Some(reader.read_bits(32)?);
            vps.time_scale = reader.read_bits(32)?;
            if reader.read_bit()? {
                reader.read_ue()?; // vps_num_ticks_poc_diff_one_minus1
            }
            let num_hrd = reader.read_ue_max(1023)?;
            for i in 0..num_hrd {
                reader.read_ue()?; // hrd_layer_set_idx
                let common_inf = if i > 0 { reader.read_bit()? } else { true };
                HevcHrdParameters::read(reader, common_inf, vps.max_sub_layers_minus1)?;
            }
        }
        if reader.read_bit()? {
            // vps_extension_flag
            reader.byte_align();
            vps.extension = Some(read_vps_extension(reader, &vps)?);
        }
        Ok(vps)
    }

    /// The layers (nuh ids) of layer set `idx`, set 0 being the base
    /// layer alone.
    fn layer_set_layers(&self, idx: usize) -> Vec<u8> {
        if idx == 0 {
            return vec![0];
        }
        match self.layer_id_included.get(idx - 1) {
            Some(included) => included
                .iter()
                .enumerate()
                .filter(|(_, &inc)| inc)
                .map(|(id, _)| id as u8)
                .collect(),
            None => Vec::new(),
        }
    }
}

fn read_vps_extension(reader: &mut BitReader, vps: &HevcVps) -> io::Result<VpsExtension> {
    let mut ext = VpsExtension::default();
    let max_layers_minus1 = std::cmp::min(vps.max_layers_minus1, 62);

    if max_layers_minus1 > 0 && vps.base_layer_internal_flag {
        ProfileTierLevel::read(reader, false, vps.max_sub_layers_minus1)?;
    }
    ext.splitting_flag = reader.read_bit()?;
    let mut num_scalability_types = 0;
    let mut mask = 0u16;
    for i in 0..16 {
        let b = reader.read_bit()?;
        if b {
            mask |= 1 << (15 - i);
            num_scalability_types += 1;
        }
    }
    ext.scalability_mask = mask;
    let dim_count = if ext.splitting_flag {
        num_scalability_types - 1
    } else {
        num_scalability_types
    };
    let mut dimension_id_len = Vec::new();
    for _ in 0..dim_count {
        dimension_id_len.push(reader.read_bits(3)? as u8 + 1);
    }
    let nuh_layer_id_present = reader.read_bit()?;

    ext.layer_id_in_nuh.push(0);
    ext.dimension_id.push(vec![0; num_scalability_types as usize]);
    for _ in 1..=max_layers_minus1 {
        let id = if nuh_layer_id_present {
            reader.read_bits(6)? as u8
        } else {
            ext.layer_id_in_nuh.len() as u8
        };
        ext.layer_id_in_nuh.push(id);
        let mut dims = Vec::new();
        if !ext.splitting_flag {
            for j in 0..dim_count as usize {
                dims.push(reader.read_bits(dimension_id_len[j])? as u8);
            }
        }
        ext.dimension_id.push(dims);
    }

    let view_id_len = reader.read_bits(4)? as u8;
    if view_id_len > 0 {
        // one view id value per distinct view; use the layer count as
        // the bound, extra values are harmless.
        let num_views = ext.layer_id_in_nuh.len();
        for _ in 0..num_views {
            ext.view_id_val.push(reader.read_bits(view_id_len)? as u16);
        }
    }

    let num_layers = max_layers_minus1 as usize + 1;
    ext.direct_dependency = vec![vec![false; num_layers]; num_layers];
    for i in 1..num_layers {
        for j in 0..i {
            ext.direct_dependency[i][j] = reader.read_bit()?;
        }
    }

    // layer sets from the base VPS part.
    for i in 0..=vps.num_layer_sets_minus1 as usize {
        ext.layer_sets.push(vps.layer_set_layers(i));
    }

    // num_add_layer_sets only occurs with multiple independent layers;
    // independent non-base layers are outside the HEIF profile.
    let num_independent = (1..num_layers)
        .filter(|&i| (0..i).all(|j| !ext.direct_dependency[i][j]))
        .count()
        + 1;
    if num_independent > 1 {
        return Err(ioerr!(Unsupported, "vps extension: additional independent layer sets"));
    }

    let sub_layers_max_present = reader.read_bit()?;
    if sub_layers_max_present {
        for _ in 0..num_layers {
            reader.read_bits(3)?; // sub_layers_vps_max_minus1
        }
    }
    let max_tid_ref_present = reader.read_bit()?;
    ext.max_tid_il_ref_pics_plus1 = vec![vec![7; num_layers]; num_layers];
    if max_tid_ref_present {
        for i in 0..num_layers - 1 {
            for j in i + 1..num_layers {
                if ext.direct_dependency[j][i] {
                    ext.max_tid_il_ref_pics_plus1[i][j] = reader.read_bits(3)? as u8;
                }
            }
        }
    }
    ext.default_ref_layers_active_flag = reader.read_bit()?;

    let vps_num_ptl_minus1 = reader.read_ue_max(63)?;
    let ptl_start = if vps.base_layer_internal_flag { 2 } else { 1 };
    for _ in ptl_start..=vps_num_ptl_minus1 {
        let profile_present = reader.read_bit()?;
        ext.profile_tier_levels
            .push(ProfileTierLevel::read(reader, profile_present, vps.max_sub_layers_minus1)?);
    }

    let num_layer_sets = vps.num_layer_sets_minus1 as usize + 1;
    let mut num_add_olss = 0;
    if num_layer_sets > 1 {
        num_add_olss = reader.read_ue_max(1023)?;
        ext.default_output_layer_idc = reader.read_bits(2)? as u8;
    }
    let num_output_layer_sets = num_add_olss as usize + num_layer_sets;
    let ptl_count = vps_num_ptl_minus1 + 1;
    let ptl_idx_len = ceil_log2(ptl_count);

    ext.ols_to_layer_set.push(0);
    ext.output_layer_flags.push(vec![true]);
    for i in 1..num_output_layer_sets {
        let layer_set_idx = if num_layer_sets > 2 && i >= num_layer_sets {
            reader.read_ue_max(1023)? + 1
        } else {
            i as u32
        };
        ext.ols_to_layer_set.push(layer_set_idx);
        let layers_in_set = ext.num_layers_in_id_list(layer_set_idx as usize);
        let mut flags = Vec::new();
        if i > vps.num_layer_sets_minus1 as usize || ext.default_output_layer_idc == 2 {
            for _ in 0..layers_in_set {
                flags.push(reader.read_bit()?);
            }
        } else {
            // default: the highest layer (idc 0/1) is the output layer.
            for j in 0..layers_in_set {
                flags.push(j + 1 == layers_in_set);
            }
        }
        // necessary layers: every output layer and its reference layers.
        let set_layers = ext.layer_sets[layer_set_idx as usize].clone();
        let mut necessary = vec![false; layers_in_set];
        for j in 0..layers_in_set {
            if flags[j] {
                necessary[j] = true;
                let refs = ext.ref_layers(set_layers[j]);
                for (k, &id) in set_layers.iter().enumerate() {
                    if refs.contains(&id) {
                        necessary[k] = true;
                    }
                }
            }
        }
        for j in 0..layers_in_set {
            if necessary[j] && vps_num_ptl_minus1 > 0 {
                reader.read_bits(ptl_idx_len)?; // profile_tier_level_idx
            }
        }
        let num_output_layers = flags.iter().filter(|&&f| f).count();
        ext.output_layer_flags.push(flags);
        if num_output_layers == 1 {
            let out_idx = ext.output_layer_flags[i].iter().position(|&f| f).unwrap();
            if ext.num_direct_ref_layers(set_layers[out_idx]) > 0 {
                reader.read_bit()?; // alt_output_layer_flag
            }
        }
    }

    let vps_num_rep_formats_minus1 = reader.read_ue_max(255)?;
    for _ in 0..=vps_num_rep_formats_minus1 {
        ext.rep_formats.push(RepFormat::read(reader)?);
    }
    let rep_format_idx_len = ceil_log2(vps_num_rep_formats_minus1 + 1);
    let rep_format_idx_present = if vps_num_rep_formats_minus1 > 0 {
        reader.read_bit()?
    } else {
        false
    };
    ext.vps_rep_format_idx = vec![0; num_layers];
    for i in 1..num_layers {
        ext.vps_rep_format_idx[i] = if rep_format_idx_present {
            reader.read_bits(rep_format_idx_len)?
        } else {
            std::cmp::min(i as u32, vps_num_rep_formats_minus1)
        };
    }

    ext.max_one_active_ref_layer_flag = reader.read_bit()?;
    ext.poc_lsb_aligned_flag = reader.read_bit()?;
    ext.poc_lsb_not_present = vec![false; num_layers];
    for i in 1..num_layers {
        if ext.num_direct_ref_layers(ext.layer_id_in_nuh[i]) == 0 {
            ext.poc_lsb_not_present[i] = reader.read_bit()?;
        }
    }
    // dpb_size() and the remaining extension syntax is not needed for
    // item decoding; the slice parsers only require what is above.
    Ok(ext)
}

pub(crate) fn ceil_log2(v: u32) -> u8 {
    let mut n = 0u8;
    while (1u32 << n) < v {
        n += 1;
    }
    n
}

/// HEVC Sequence Parameter Set.
#[derive(Clone, Debug, Default)]
pub struct HevcSps {
    pub vps_id: u8,
    pub max_sub_layers_minus1: u8,
    pub ext_or_max_sub_layers_minus1: u8,
    pub temporal_id_nesting_flag: bool,
    pub ptl: Option<ProfileTierLevel>,
    pub sps_id: u8,
    /// nuh_layer_id > 0 with ext == 7: dimensions come from the VPS
    /// rep format table.
    pub multi_layer_ext: bool,
    pub update_rep_format_flag: bool,
    pub sps_rep_format_idx: u8,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    pub conformance_window: Option<(u32, u32, u32, u32)>,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub log2_min_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_luma_coding_block_size: u32,
    pub scaling_list: Option<ScalingListData>,
    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,
    pub pcm_enabled_flag: bool,
    pub short_term_rps: Vec<ShortTermRps>,
    pub long_term_ref_pics_present_flag: bool,
    pub lt_ref_pic_poc_lsb_sps: Vec<u32>,
    pub used_by_curr_pic_lt_sps: Vec<bool>,
    pub temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,
    pub vui: Option<HevcVui>,
}

impl HevcSps {
    /// Parse an SPS from RBSP data (the two NAL header bytes stripped).
    ///
    /// `nuh_layer_id` decides the multi-layer extension interpretation,
    /// `vps` resolves sub-layer counts for layered SPSes.
    pub fn read(reader: &mut BitReader, nuh_layer_id: u8, vps: Option<&HevcVps>) -> io::Result<HevcSps> {
        let mut sps = HevcSps::default();
        sps.vps_id = reader.read_bits(4)? as u8;
        if nuh_layer_id == 0 {
            sps.max_sub_layers_minus1 = reader.read_bits(3)? as u8;
            sps.ext_or_max_sub_layers_minus1 = sps.max_sub_layers_minus1;
        } else {
            sps.ext_or_max_sub_layers_minus1 = reader.read_bits(3)? as u8;
            sps.max_sub_layers_minus1 = if sps.ext_or_max_sub_layers_minus1 == 7 {
                vps.map(|v| v.max_sub_layers_minus1).unwrap_or(0)
            } else {
                sps.ext_or_max_sub_layers_minus1
            };
        }
        sps.multi_layer_ext = nuh_layer_id > 0 && sps.ext_or_max_sub_layers_minus1 == 7;

        if !sps.multi_layer_ext {
            sps.temporal_id_nesting_flag = reader.read_bit()?;
            sps.ptl = Some(ProfileTierLevel::read(reader, true, sps.max_sub_layers_minus1)?);
        }
        sps.sps_id = reader.read_ue_max(15)? as u8;

        if sps.multi_layer_ext {
            sps.update_rep_format_flag = reader.read_bit()?;
            if sps.update_rep_format_flag {
                sps.sps_rep_format_idx = reader.read_bits(8)? as u8;
            }
            // dimensions come from the VPS rep format table.
            if let Some(vps) = vps {
                if let Some(ext) = vps.extension.as_ref() {
                    let idx = if sps.update_rep_format_flag {
                        sps.sps_rep_format_idx as usize
                    } else {
                        ext.layer_idx(nuh_layer_id)
                            .map(|i| ext.vps_rep_format_idx[i] as usize)
                            .unwrap_or(0)
                    };
                    if let Some(rf) = ext.rep_formats.get(idx) {
                        sps.pic_width_in_luma_samples = rf.pic_width_vps_in_luma_samples as u32;
                        sps.pic_height_in_luma_samples = rf.pic_height_vps_in_luma_samples as u32;
                        sps.chroma_format_idc = rf.chroma_format_vps_idc as u32;
                        sps.bit_depth_luma_minus8 = rf.bit_depth_vps_luma_minus8 as u32;
                        sps.bit_depth_chroma_minus8 = rf.bit_depth_vps_chroma_minus8 as u32;
                    }
                }
            }
        } else {
            sps.chroma_format_idc = reader.read_ue_max(3)?;
            if sps.chroma_format_idc == 3 {
                sps.separate_colour_plane_flag = reader.read_bit()?;
            }
            sps.pic_width_in_luma_samples = reader.read_ue()?;
            sps.pic_height_in_luma_samples = reader.read_ue()?;
            if reader.read_bit()? {
                sps.conformance_window = Some((
                    reader.read_ue()?,
                    reader.read_ue()?,
                    reader.read_ue()?,
                    reader.read_ue()?,
                ));
            }
            sps.bit_depth_luma_minus8 = reader.read_ue_max(8)?;
            sps.bit_depth_chroma_minus8 = reader.read_ue_max(8)?;
        }

        sps.log2_max_pic_order_cnt_lsb_minus4 = reader.read_ue_max(12)? as u8;

        if !sps.multi_layer_ext {
            let ordering_info_present = reader.read_bit()?;
            let start = if ordering_info_present {
                0
            } else {
                sps.max_sub_layers_minus1
            };
            for _ in start..=sps.max_sub_layers_minus1 {
                reader.read_ue()?; // sps_max_dec_pic_buffering_minus1
                reader.read_ue()?; // sps_max_num_reorder_pics
                reader.read_ue()?; // sps_max_latency_increase_plus1
            }
        }

        sps.log2_min_luma_coding_block_size_minus3 = reader.read_ue()?;
        sps.log2_diff_max_min_luma_coding_block_size = reader.read_ue()?;
        reader.read_ue()?; // log2_min_luma_transform_block_size_minus2
        reader.read_ue()?; // log2_diff_max_min_luma_transform_block_size
        reader.read_ue()?; // max_transform_hierarchy_depth_inter
        reader.read_ue()?; // max_transform_hierarchy_depth_intra

        if reader.read_bit()? {
            // scaling_list_enabled
            let infer = if sps.multi_layer_ext {
                let infer = reader.read_bit()?; // sps_infer_scaling_list_flag
                if infer {
                    reader.read_bits(6)?; // sps_scaling_list_ref_layer_id
                }
                infer
            } else {
                false
            };
            if !infer && reader.read_bit()? {
                sps.scaling_list = Some(ScalingListData::read(reader)?);
            }
        }
        sps.amp_enabled_flag = reader.read_bit()?;
        sps.sample_adaptive_offset_enabled_flag = reader.read_bit()?;
        sps.pcm_enabled_flag = reader.read_bit()?;
        if sps.pcm_enabled_flag {
            reader.read_bits(4)?; // pcm_sample_bit_depth_luma_minus1
            reader.read_bits(4)?; // pcm_sample_bit_depth_chroma_minus1
            reader.read_ue()?; // log2_min_pcm_luma_coding_block_size_minus3
            reader.read_ue()?; // log2_diff_max_min_pcm_luma_coding_block_size
            reader.read_bit()?; // pcm_loop_filter_disabled_flag
        }

        let num_short_term = reader.read_ue_max(MAX_SHORT_TERM_RPS)?;
        for i in 0..num_short_term {
            let rps = ShortTermRps::read(reader, i, num_short_term, &sps.short_term_rps)?;
            sps.short_term_rps.push(rps);
        }

        sps.long_term_ref_pics_present_flag = reader.read_bit()?;
        if sps.long_term_ref_pics_present_flag {
            let num_lt = reader.read_ue_max(32)?;
            for _ in 0..num_lt {
                sps.lt_ref_pic_poc_lsb_sps
                    .push(reader.read_bits(sps.log2_max_pic_order_cnt_lsb_minus4 + 4)?);
                sps.used_by_curr_pic_lt_sps.push(reader.read_bit()?);
            }
        }
        sps.temporal_mvp_enabled_flag = reader.read_bit()?;
        sps.strong_intra_smoothing_enabled_flag = reader.read_bit()?;
        if reader.read_bit()? {
            sps.vui = Some(HevcVui::read(reader, sps.max_sub_layers_minus1)?);
        }
        // sps_extension flags and payloads are not needed downstream.
        Ok(sps)
    }

    pub fn max_poc_lsb(&self) -> i32 {
        1 << (self.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4)
    }

    /// CTB geometry: number of CTBs covering the picture.
    pub fn pic_size_in_ctbs(&self) -> u32 {
        let log2_ctb = self.log2_min_luma_coding_block_size_minus3
            + 3
            + self.log2_diff_max_min_luma_coding_block_size;
        let ctb = 1u32 << log2_ctb;
        let w = (self.pic_width_in_luma_samples + ctb - 1) / ctb;
        let h = (self.pic_height_in_luma_samples + ctb - 1) / ctb;
        w * h
    }

    /// Bit width of slice_segment_address.
    pub fn slice_address_len(&self) -> u8 {
        ceil_log2(self.pic_size_in_ctbs())
    }

    /// Display width after the conformance window.
    pub fn width(&self) -> u32 {
        let mut w = self.pic_width_in_luma_samples;
        if let Some((left, right, _, _)) = self.conformance_window {
            let unit = match self.chroma_format_idc {
                1 | 2 => 2,
                _ => 1,
            };
            w = w.saturating_sub((left + right) * unit);
        }
        w
    }

    /// Display height after the conformance window.
    pub fn height(&self) -> u32 {
        let mut h = self.pic_height_in_luma_samples;
        if let Some((_, _, top, bottom)) = self.conformance_window {
            let unit = match self.chroma_format_idc {
                1 => 2,
                _ => 1,
            };
            h = h.saturating_sub((top + bottom) * unit);
        }
        h
    }
}

/// HEVC Picture Parameter Set.
#[derive(Clone, Debug, Default)]
pub struct HevcPps {
    pub pps_id: u8,
    pub sps_id: u8,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub init_qp_minus26: i32,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    pub diff_cu_qp_delta_depth: u32,
    pub cb_qp_offset: i32,
    pub cr_qp_offset: i32,
    pub slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    pub tiles_enabled_flag: bool,
    pub entropy_coding_sync_enabled_flag: bool,
    pub num_tile_columns_minus1: u32,
    pub num_tile_rows_minus1: u32,
    pub uniform_spacing_flag: bool,
    pub column_widths_minus1: Vec<u32>,
    pub row_heights_minus1: Vec<u32>,
    pub loop_filter_across_tiles_enabled_flag: bool,
    pub loop_filter_across_slices_enabled_flag: bool,
    pub deblocking_filter_control_present_flag: bool,
    pub deblocking_filter_override_enabled_flag: bool,
    pub deblocking_filter_disabled_flag: bool,
    pub beta_offset_div2: i32,
    pub tc_offset_div2: i32,
    pub scaling_list: Option<ScalingListData>,
    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u32,
    pub slice_segment_header_extension_present_flag: bool,
}

impl HevcPps {
    /// Parse a PPS from RBSP data (the two NAL header bytes stripped).
    pub fn read(reader: &mut BitReader) -> io::Result<HevcPps> {
        let mut pps = HevcPps::default();
        pps.pps_id = reader.read_ue_max(63)? as u8;
        pps.sps_id = reader.read_ue_max(15)? as u8;
        pps.dependent_slice_segments_enabled_flag = reader.read_bit()?;
        pps.output_flag_present_flag = reader.read_bit()?;
        pps.num_extra_slice_header_bits = reader.read_bits(3)? as u8;
        pps.sign_data_hiding_enabled_flag = reader.read_bit()?;
        pps.cabac_init_present_flag = reader.read_bit()?;
        pps.num_ref_idx_l0_default_active_minus1 = reader.read_ue_max(14)?;
        pps.num_ref_idx_l1_default_active_minus1 = reader.read_ue_max(14)?;
        pps.init_qp_minus26 = reader.read_se()?;
        pps.constrained_intra_pred_flag = reader.read_bit()?;
        pps.transform_skip_enabled_flag = reader.read_bit()?;
        pps.cu_qp_delta_enabled_flag = reader.read_bit()?;
        if pps.cu_qp_delta_enabled_flag {
            pps.diff_cu_qp_delta_depth = reader.read_ue()?;
        }
        pps.cb_qp_offset = reader.read_se()?;
        pps.cr_qp_offset = reader.read_se()?;
        pps.slice_chroma_qp_offsets_present_flag = reader.read_bit()?;
        pps.weighted_pred_flag = reader.read_bit()?;
        pps.weighted_bipred_flag = reader.read_bit()?;
        pps.transquant_bypass_enabled_flag = reader.read_bit()?;
        pps.tiles_enabled_flag = reader.read_bit()?;
        pps.entropy_coding_sync_enabled_flag = reader.read_bit()?;
        if pps.tiles_enabled_flag {
            pps.num_tile_columns_minus1 = reader.read_ue()?;
            pps.num_tile_rows_minus1 = reader.read_ue()?;
            pps.uniform_spacing_flag = reader.read_bit()?;
            if !pps.uniform_spacing_flag {
                for _ in 0..pps.num_tile_columns_minus1 {
                    pps.column_widths_minus1.push(reader.read_ue()?);
                }
                for _ in 0..pps.num_tile_rows_minus1 {
                    pps.row_heights_minus1.push(reader.read_ue()?);
                }
            }
            pps.loop_filter_across_tiles_enabled_flag = reader.read_bit()?;
        }
        pps.loop_filter_across_slices_enabled_flag = reader.read_bit()?;
        pps.deblocking_filter_control_present_flag = reader.read_bit()?;
        if pps.deblocking_filter_control_present_flag {
            pps.deblocking_filter_override_enabled_flag = reader.read_bit()?;
            pps.deblocking_filter_disabled_flag = reader.read_bit()?;
            if !pps.deblocking_filter_disabled_flag {
                pps.beta_offset_div2 = reader.read_se()?;
                pps.tc_offset_div2 = reader.read_se()?;
            }
        }
        if reader.read_bit()? {
            pps.scaling_list = Some(ScalingListData::read(reader)?);
        }
        pps.lists_modification_present_flag = reader.read_bit()?;
        pps.log2_parallel_merge_level_minus2 = reader.read_ue()?;
        pps.slice_segment_header_extension_present_flag = reader.read_bit()?;
        // pps_extension flags and payloads are not needed downstream.
        Ok(pps)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bitstream::BitWriter;

    pub(crate) fn write_ptl(w: &mut BitWriter) {
        w.write_bits(0, 2); // profile_space
        w.write_bit(false); // tier
        w.write_bits(1, 5); // profile_idc (main)
        w.write_bits(0x60000000, 32); // compatibility
        w.write_bit(true); // progressive
        w.write_bit(false); // interlaced
        w.write_bit(false); // non_packed
        w.write_bit(true); // frame_only
        w.write_bits(0, 22);
        w.write_bits(0, 22);
        w.write_bits(93, 8); // level
    }

    // A minimal single-layer SPS: 640x480, poc lsb 4 bits, one
    // explicit short term rps { -1 used, -2 used, +1 used }.
    pub(crate) fn make_sps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 4); // vps id
        w.write_bits(0, 3); // max_sub_layers_minus1
        w.write_bit(true); // temporal_id_nesting
        write_ptl(&mut w);
        w.write_ue(0); // sps id
        w.write_ue(1); // chroma_format_idc
        w.write_ue(640); // width
        w.write_ue(480); // height
        w.write_bit(false); // conformance window
        w.write_ue(0); // bit_depth_luma
        w.write_ue(0); // bit_depth_chroma
        w.write_ue(0); // log2_max_pic_order_cnt_lsb_minus4
        w.write_bit(true); // ordering info present
        w.write_ue(3); // max_dec_pic_buffering_minus1
        w.write_ue(0); // num_reorder
        w.write_ue(0); // max_latency
        w.write_ue(0); // log2_min_cb_size_minus3
        w.write_ue(3); // log2_diff_max_min -> 64x64 CTB
        w.write_ue(0); // min tb
        w.write_ue(3); // diff tb
        w.write_ue(0); // hierarchy inter
        w.write_ue(0); // hierarchy intra
        w.write_bit(false); // scaling list enabled
        w.write_bit(false); // amp
        w.write_bit(true); // sao
        w.write_bit(false); // pcm
        // two short term rps: explicit, then inter predicted.
        w.write_ue(2);
        // rps 0: negatives -1 -2 used, positive +1 used.
        w.write_ue(2); // num_negative
        w.write_ue(1); // num_positive
        w.write_ue(0); // delta -1
        w.write_bit(true);
        w.write_ue(0); // delta -2
        w.write_bit(true);
        w.write_ue(0); // delta +1
        w.write_bit(true);
        // rps 1: inter predicted from rps 0, delta_rps = +1,
        // use_delta for all.
        w.write_bit(true); // inter_ref_pic_set_prediction_flag
        w.write_bit(false); // delta_rps_sign (positive)
        w.write_ue(0); // abs_delta_rps_minus1
        for _ in 0..4 {
            w.write_bit(true); // used_by_curr_pic_flag
        }
        w.write_bit(false); // long_term_ref_pics_present
        w.write_bit(false); // temporal_mvp
        w.write_bit(false); // strong intra smoothing
        w.write_bit(false); // vui
        w.write_bit(false); // sps_extension
        w.write_bit(true); // stop bit
        w.finish()
    }

    #[test]
    fn sps_parses() {
        let rbsp = make_sps_rbsp();
        let mut r = BitReader::new(&rbsp);
        let sps = HevcSps::read(&mut r, 0, None).unwrap();
        assert_eq!(sps.width(), 640);
        assert_eq!(sps.height(), 480);
        assert_eq!(sps.max_poc_lsb(), 16);
        // 640x480 with 64x64 CTBs: 10x8 = 80 CTBs, address len 7.
        assert_eq!(sps.pic_size_in_ctbs(), 80);
        assert_eq!(sps.slice_address_len(), 7);
        assert_eq!(sps.short_term_rps.len(), 2);
    }

    #[test]
    fn inter_rps_prediction_expands() {
        let rbsp = make_sps_rbsp();
        let mut r = BitReader::new(&rbsp);
        let sps = HevcSps::read(&mut r, 0, None).unwrap();
        let rps0 = &sps.short_term_rps[0];
        assert_eq!(rps0.delta_poc_s0, vec![-1, -2]);
        assert_eq!(rps0.delta_poc_s1, vec![1]);
        // rps 1 predicted with delta_rps = +1:
        // S0 from ref S1 reversed: 1+1=2 not <0; delta itself +1 not <0;
        // ref S0 forward: -1+1=0 not <0, -2+1=-1 -> S0 = [-1]
        // S1: ref S0 reversed: -2+1=-1 no, -1+1=0 no... delta +1 yes,
        // ref S1 forward: 1+1=2 -> S1 = [1, 2]
        let rps1 = &sps.short_term_rps[1];
        assert_eq!(rps1.delta_poc_s0, vec![-1]);
        assert_eq!(rps1.delta_poc_s1, vec![1, 2]);
        assert!(rps1.used_by_curr_pic_s0.iter().all(|&u| u));
        assert!(rps1.used_by_curr_pic_s1.iter().all(|&u| u));
    }

    pub(crate) fn make_pps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_ue(0); // pps id
        w.write_ue(0); // sps id
        w.write_bit(false); // dependent_slice_segments_enabled
        w.write_bit(false); // output_flag_present
        w.write_bits(0, 3); // num_extra_slice_header_bits
        w.write_bit(false); // sign_data_hiding
        w.write_bit(false); // cabac_init_present
        w.write_ue(0); // num_ref_idx_l0_default_active_minus1
        w.write_ue(0); // l1
        w.write_se(0); // init_qp_minus26
        w.write_bit(false); // constrained_intra_pred
        w.write_bit(false); // transform_skip
        w.write_bit(false); // cu_qp_delta
        w.write_se(0); // cb_qp_offset
        w.write_se(0); // cr_qp_offset
        w.write_bit(false); // slice_chroma_qp_offsets_present
        w.write_bit(false); // weighted_pred
        w.write_bit(false); // weighted_bipred
        w.write_bit(false); // transquant_bypass
        w.write_bit(false); // tiles_enabled
        w.write_bit(false); // entropy_coding_sync
        w.write_bit(true); // loop_filter_across_slices
        w.write_bit(false); // deblocking_filter_control_present
        w.write_bit(false); // pps_scaling_list_data_present
        w.write_bit(false); // lists_modification_present
        w.write_ue(0); // log2_parallel_merge_level_minus2
        w.write_bit(false); // slice_segment_header_extension
        w.write_bit(false); // pps_extension
        w.write_bit(true); // stop bit
        w.finish()
    }

    #[test]
    fn pps_parses() {
        let rbsp = make_pps_rbsp();
        let mut r = BitReader::new(&rbsp);
        let pps = HevcPps::read(&mut r).unwrap();
        assert_eq!(pps.pps_id, 0);
        assert!(pps.loop_filter_across_slices_enabled_flag);
        assert!(!pps.tiles_enabled_flag);
    }
}
