//! AVC decoded picture buffer: POC derivation, sliding window and
//! adaptive (MMCO) marking, and reference picture list construction.
//!
//! Pictures are addressed by their decode order index; reference lists
//! are vectors of indices into the DPB, never pointers.
use std::collections::HashMap;
use std::io;

use crate::bitstream::BitReader;
use crate::parse::avc::{AvcPps, AvcSps, PicOrderCntType};
use crate::parse::avcslice::{AvcSliceHeader, MmcoOp, RefPicListModOp, SliceType};
use crate::parse::{avc_nal_type, nal_to_rbsp, split_nal_units, AccessUnit, AvcNalHeader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefType {
    NonRef,
    ShortTerm,
    LongTerm,
}

/// One decoded picture as the DPB tracks it.
#[derive(Clone, Debug)]
pub struct Picture {
    pub decode_order: u64,
    pub poc: i32,
    pub frame_num: u32,
    pub ref_type: RefType,
    /// FrameNumWrap / PicNum, refreshed per slice.
    pub pic_num: i64,
    pub long_term_frame_idx: u32,
    pub is_idr: bool,
    pub has_mmco5: bool,
    pub for_output: bool,
}

/// The decoded picture buffer.
#[derive(Default)]
pub struct Dpb {
    pub pictures: Vec<Picture>,
    pub max_num_ref_frames: u32,
}

impl Dpb {
    fn num_short_term(&self) -> usize {
        self.pictures.iter().filter(|p| p.ref_type == RefType::ShortTerm).count()
    }

    fn num_long_term(&self) -> usize {
        self.pictures.iter().filter(|p| p.ref_type == RefType::LongTerm).count()
    }

    /// Refresh pic_num (FrameNumWrap) for every short term picture.
    fn update_pic_nums(&mut self, curr_frame_num: u32, max_frame_num: u32) {
        for p in &mut self.pictures {
            if p.ref_type == RefType::ShortTerm {
                p.pic_num = if p.frame_num > curr_frame_num {
                    p.frame_num as i64 - max_frame_num as i64
                } else {
                    p.frame_num as i64
                };
            }
        }
    }

    /// Sliding window: when the reference bound is reached, the short
    /// term picture with the smallest pic_num becomes a non-reference.
    fn sliding_window(&mut self) {
        let max = std::cmp::max(self.max_num_ref_frames, 1) as usize;
        while self.num_short_term() + self.num_long_term() >= max {
            let mut smallest: Option<usize> = None;
            for (i, p) in self.pictures.iter().enumerate() {
                if p.ref_type != RefType::ShortTerm {
                    continue;
                }
                if smallest
                    .map(|s| p.pic_num < self.pictures[s].pic_num)
                    .unwrap_or(true)
                {
                    smallest = Some(i);
                }
            }
            match smallest {
                Some(i) => self.pictures[i].ref_type = RefType::NonRef,
                None => break,
            }
        }
    }

    fn mark_all_non_ref(&mut self) {
        for p in &mut self.pictures {
            p.ref_type = RefType::NonRef;
        }
    }

    /// Execute the adaptive marking commands, in order.
    fn execute_mmco(&mut self, ops: &[MmcoOp], curr_pic_num: i64, max_pic_num: i64) -> MmcoResult {
        let mut result = MmcoResult::default();
        for op in ops {
            match op.op {
                1 => {
                    let pic_num = wrap_pic_num(
                        curr_pic_num - (op.difference_of_pic_nums_minus1 as i64 + 1),
                        max_pic_num,
                    );
                    if let Some(p) = self
                        .pictures
                        .iter_mut()
                        .find(|p| p.ref_type == RefType::ShortTerm && p.pic_num == pic_num)
                    {
                        p.ref_type = RefType::NonRef;
                    }
                },
                2 => {
                    if let Some(p) = self.pictures.iter_mut().find(|p| {
                        p.ref_type == RefType::LongTerm && p.long_term_frame_idx as i64 == op.long_term_pic_num as i64
                    }) {
                        p.ref_type = RefType::NonRef;
                    }
                },
                3 => {
                    // any long term picture already holding the index
                    // is unmarked first.
                    for p in self.pictures.iter_mut() {
                        if p.ref_type == RefType::LongTerm && p.long_term_frame_idx == op.long_term_frame_idx {
                            p.ref_type = RefType::NonRef;
                        }
                    }
                    let pic_num = wrap_pic_num(
                        curr_pic_num - (op.difference_of_pic_nums_minus1 as i64 + 1),
                        max_pic_num,
                    );
                    if let Some(p) = self
                        .pictures
                        .iter_mut()
                        .find(|p| p.ref_type == RefType::ShortTerm && p.pic_num == pic_num)
                    {
                        p.ref_type = RefType::LongTerm;
                        p.long_term_frame_idx = op.long_term_frame_idx;
                    }
                },
                4 => {
                    result.max_long_term_frame_idx = op.max_long_term_frame_idx_plus1 as i64 - 1;
                    for p in self.pictures.iter_mut() {
                        if p.ref_type == RefType::LongTerm
                            && p.long_term_frame_idx as i64 > result.max_long_term_frame_idx
                        {
                            p.ref_type = RefType::NonRef;
                        }
                    }
                },
                5 => {
                    self.mark_all_non_ref();
                    result.has_mmco5 = true;
                },
                6 => {
                    result.current_long_term_frame_idx = Some(op.long_term_frame_idx);
                },
                _ => {},
            }
        }
        result
    }
}

fn wrap_pic_num(pic_num: i64, max_pic_num: i64) -> i64 {
    if pic_num < 0 {
        pic_num + max_pic_num
    } else {
        pic_num
    }
}

#[derive(Default)]
struct MmcoResult {
    has_mmco5: bool,
    current_long_term_frame_idx: Option<u32>,
    max_long_term_frame_idx: i64,
}

/// Running state of the POC derivation.
#[derive(Default)]
struct PocState {
    prev_poc_msb: i32,
    prev_poc_lsb: i32,
    prev_frame_num: u32,
    prev_frame_num_offset: u32,
    prev_had_mmco5: bool,
    prev_ref_poc: i32,
}

impl PocState {
    /// Picture order count of the picture this slice starts.
    fn compute(&mut self, slice: &AvcSliceHeader, sps: &AvcSps) -> i32 {
        let poc = match &sps.pic_order_cnt_type {
            PicOrderCntType::Zero {
                log2_max_pic_order_cnt_lsb_minus4,
            } => {
                let max_poc_lsb = 1i32 << (log2_max_pic_order_cnt_lsb_minus4 + 4);
                let lsb = slice.pic_order_cnt_lsb as i32;
                let (prev_msb, prev_lsb) = if slice.is_idr() {
                    (0, 0)
                } else if self.prev_had_mmco5 {
                    (0, self.prev_ref_poc)
                } else {
                    (self.prev_poc_msb, self.prev_poc_lsb)
                };
                let msb = if lsb < prev_lsb && (prev_lsb - lsb) >= max_poc_lsb / 2 {
                    prev_msb + max_poc_lsb
                } else if lsb > prev_lsb && (lsb - prev_lsb) > max_poc_lsb / 2 {
                    prev_msb - max_poc_lsb
                } else {
                    prev_msb
                };
                if slice.is_reference() {
                    self.prev_poc_msb = msb;
                    self.prev_poc_lsb = lsb;
                }
                msb + lsb
            },
            PicOrderCntType::One {
                offset_for_non_ref_pic,
                offset_for_ref_frame,
                ..
            } => {
                let max_frame_num = sps.max_frame_num();
                let frame_num_offset = if slice.is_idr() {
                    0
                } else if self.prev_frame_num > slice.frame_num {
                    self.prev_frame_num_offset + max_frame_num
                } else {
                    self.prev_frame_num_offset
                };
                self.prev_frame_num_offset = frame_num_offset;

                let mut abs_frame_num = (frame_num_offset + slice.frame_num) as i64;
                if !slice.is_reference() && abs_frame_num > 0 {
                    abs_frame_num -= 1;
                }
                let num_in_cycle = offset_for_ref_frame.len() as i64;
                let mut expected = 0i64;
                if abs_frame_num > 0 && num_in_cycle > 0 {
                    let cycle_cnt = (abs_frame_num - 1) / num_in_cycle;
                    let frame_num_in_cycle = (abs_frame_num - 1) % num_in_cycle;
                    let delta_per_cycle: i64 = offset_for_ref_frame.iter().map(|&o| o as i64).sum();
                    expected = cycle_cnt * delta_per_cycle;
                    for i in 0..=frame_num_in_cycle {
                        expected += offset_for_ref_frame[i as usize] as i64;
                    }
                }
                if !slice.is_reference() {
                    expected += *offset_for_non_ref_pic as i64;
                }
                (expected + slice.delta_pic_order_cnt[0] as i64) as i32
            },
            PicOrderCntType::Two => {
                let max_frame_num = sps.max_frame_num();
                let frame_num_offset = if slice.is_idr() {
                    0
                } else if self.prev_frame_num > slice.frame_num {
                    self.prev_frame_num_offset + max_frame_num
                } else {
                    self.prev_frame_num_offset
                };
                self.prev_frame_num_offset = frame_num_offset;
                if slice.is_idr() {
                    0
                } else {
                    let temp = 2 * (frame_num_offset + slice.frame_num) as i32;
                    if slice.is_reference() {
                        temp
                    } else {
                        temp - 1
                    }
                }
            },
        };
        self.prev_frame_num = slice.frame_num;
        poc
    }
}

/// Initialize reference picture list 0 (and 1 for B slices), returning
/// DPB indices.
fn init_ref_lists(dpb: &Dpb, slice: &AvcSliceHeader, curr_poc: i32) -> (Vec<usize>, Vec<usize>) {
    let mut short_term: Vec<usize> = dpb
        .pictures
        .iter()
        .enumerate()
        .filter(|(_, p)| p.ref_type == RefType::ShortTerm)
        .map(|(i, _)| i)
        .collect();
    let mut long_term: Vec<usize> = dpb
        .pictures
        .iter()
        .enumerate()
        .filter(|(_, p)| p.ref_type == RefType::LongTerm)
        .map(|(i, _)| i)
        .collect();
    long_term.sort_by_key(|&i| dpb.pictures[i].long_term_frame_idx);

    match slice.slice_type {
        SliceType::P | SliceType::Sp => {
            short_term.sort_by(|&a, &b| dpb.pictures[b].pic_num.cmp(&dpb.pictures[a].pic_num));
            let mut list0 = short_term;
            list0.extend_from_slice(&long_term);
            (list0, Vec::new())
        },
        SliceType::B => {
            let mut before: Vec<usize> = short_term
                .iter()
                .copied()
                .filter(|&i| dpb.pictures[i].poc <= curr_poc)
                .collect();
            let mut after: Vec<usize> = short_term
                .iter()
                .copied()
                .filter(|&i| dpb.pictures[i].poc > curr_poc)
                .collect();
            before.sort_by(|&a, &b| dpb.pictures[b].poc.cmp(&dpb.pictures[a].poc));
            after.sort_by(|&a, &b| dpb.pictures[a].poc.cmp(&dpb.pictures[b].poc));

            let mut list0 = before.clone();
            list0.extend_from_slice(&after);
            list0.extend_from_slice(&long_term);

            let mut list1 = after;
            list1.extend_from_slice(&before);
            list1.extend_from_slice(&long_term);

            if list0.len() > 1 && list0 == list1 {
                list1.swap(0, 1);
            }
            (list0, list1)
        },
        _ => (Vec::new(), Vec::new()),
    }
}

/// Apply the slice's reference list modification commands.
fn modify_ref_list(
    dpb: &Dpb,
    list: &mut Vec<usize>,
    mods: &[RefPicListModOp],
    curr_pic_num: i64,
    max_pic_num: i64,
    num_active: usize,
) {
    list.truncate(num_active);
    let mut pic_num_pred = curr_pic_num;
    let mut ref_idx = 0usize;
    for m in mods {
        let target = match m.idc {
            0 | 1 => {
                let diff = m.value as i64 + 1;
                let mut no_wrap = if m.idc == 0 {
                    pic_num_pred - diff
                } else {
                    pic_num_pred + diff
                };
                if no_wrap < 0 {
                    no_wrap += max_pic_num;
                } else if no_wrap >= max_pic_num {
                    no_wrap -= max_pic_num;
                }
                pic_num_pred = no_wrap;
                let pic_num = if no_wrap > curr_pic_num {
                    no_wrap - max_pic_num
                } else {
                    no_wrap
                };
                dpb.pictures
                    .iter()
                    .position(|p| p.ref_type == RefType::ShortTerm && p.pic_num == pic_num)
            },
            2 => dpb
                .pictures
                .iter()
                .position(|p| p.ref_type == RefType::LongTerm && p.long_term_frame_idx as i64 == m.value as i64),
            _ => None,
        };
        let target = match target {
            Some(t) => t,
            None => continue,
        };
        // insert at ref_idx, shift the rest right, drop a duplicate.
        list.insert(std::cmp::min(ref_idx, list.len()), target);
        let mut n = ref_idx + 1;
        while n < list.len() {
            if list[n] == target {
                list.remove(n);
            } else {
                n += 1;
            }
        }
        list.truncate(num_active);
        ref_idx += 1;
    }
    list.truncate(num_active);
}

enum ParsedNal {
    Sps(AvcSps),
    Pps(AvcPps),
    Slice(AvcSliceHeader),
    Other,
}

/// Parses an AVC Annex-B stream into access units, driving the DPB.
#[derive(Default)]
pub struct AvcStreamParser {
    sps_map: HashMap<u8, AvcSps>,
    pps_map: HashMap<u8, AvcPps>,
    dpb: Dpb,
    poc_state: PocState,
    decode_order: u64,
}

impl AvcStreamParser {
    pub fn new() -> AvcStreamParser {
        AvcStreamParser::default()
    }

    pub fn sps_by_id(&self, id: u8) -> Option<&AvcSps> {
        self.sps_map.get(&id)
    }

    pub fn pps_by_id(&self, id: u8) -> Option<&AvcPps> {
        self.pps_map.get(&id)
    }

    fn parse_nal(&mut self, nal: &[u8]) -> io::Result<ParsedNal> {
        let header = AvcNalHeader::parse(nal)?;
        let rbsp = nal_to_rbsp(&nal[1..]);
        let mut reader = BitReader::new(&rbsp);
        match header.nal_unit_type {
            avc_nal_type::SPS => {
                let sps = AvcSps::read(&mut reader)?;
                Ok(ParsedNal::Sps(sps))
            },
            avc_nal_type::PPS => {
                // The chroma format comes from the SPS the PPS names;
                // peek it by parsing the ids first.
                let mut peek = BitReader::new(&rbsp);
                peek.read_ue()?; // pps_id
                let sps_id = peek.read_ue_max(31)? as u8;
                let chroma = self
                    .sps_map
                    .get(&sps_id)
                    .and_then(|s| s.chroma_format.as_ref())
                    .map(|c| c.chroma_format_idc)
                    .unwrap_or(1);
                let pps = AvcPps::read(&mut reader, chroma)?;
                Ok(ParsedNal::Pps(pps))
            },
            t if t >= avc_nal_type::SLICE_NON_IDR && t <= avc_nal_type::SLICE_IDR => {
                if t != avc_nal_type::SLICE_NON_IDR && t != avc_nal_type::SLICE_IDR {
                    return Err(ioerr!(Unsupported, "avc: slice data partitioning"));
                }
                // resolve the active parameter sets through the ids.
                let mut peek = BitReader::new(&rbsp);
                peek.read_ue()?; // first_mb_in_slice
                peek.read_ue()?; // slice_type
                let pps_id = peek.read_ue_max(255)? as u8;
                let pps = self
                    .pps_map
                    .get(&pps_id)
                    .ok_or_else(|| ioerr!(InvalidData, "avc: slice names unknown pps {}", pps_id))?;
                let sps = self
                    .sps_map
                    .get(&pps.sps_id)
                    .ok_or_else(|| ioerr!(InvalidData, "avc: pps names unknown sps {}", pps.sps_id))?;
                let slice = AvcSliceHeader::read(&mut reader, header, sps, pps)?;
                Ok(ParsedNal::Slice(slice))
            },
            _ => Ok(ParsedNal::Other),
        }
    }

    /// Is this NAL unit the first VCL NAL unit of a picture?
    pub fn is_first_vcl_of_picture(nal: &[u8]) -> bool {
        match AvcNalHeader::parse(nal) {
            Ok(h) if h.is_vcl() => {
                let rbsp = nal_to_rbsp(&nal[1..]);
                let mut r = BitReader::new(&rbsp);
                r.read_ue().map(|first_mb| first_mb == 0).unwrap_or(false)
            },
            _ => false,
        }
    }

    /// Parse a whole Annex-B stream into access units.
    ///
    /// Every access unit gets its POC, decode/display order, reference
    /// picture indices (by decode order), and the parameter set NAL
    /// units that preceded it.
    pub fn parse_stream(&mut self, data: &[u8]) -> io::Result<Vec<AccessUnit>> {
        let nals = split_nal_units(data)?;

        let mut units: Vec<AccessUnit> = Vec::new();
        let mut current: Option<AccessUnit> = None;
        let mut current_slices: Vec<AvcSliceHeader> = Vec::new();
        let mut pending_sps: Vec<Vec<u8>> = Vec::new();
        let mut pending_pps: Vec<Vec<u8>> = Vec::new();

        for nal in nals {
            let parsed = self.parse_nal(nal)?;
            match parsed {
                ParsedNal::Sps(sps) => {
                    pending_sps.push(nal.to_vec());
                    self.sps_map.insert(sps.sps_id, sps);
                    if let Some(au) = current.take() {
                        self.finish_access_unit(au, &current_slices, &mut units)?;
                        current_slices.clear();
                    }
                },
                ParsedNal::Pps(pps) => {
                    pending_pps.push(nal.to_vec());
                    self.pps_map.insert(pps.pps_id, pps);
                    if let Some(au) = current.take() {
                        self.finish_access_unit(au, &current_slices, &mut units)?;
                        current_slices.clear();
                    }
                },
                ParsedNal::Slice(slice) => {
                    let new_au = match (current_slices.last(), current.as_ref()) {
                        (Some(prev), Some(_)) => {
                            let sps = self.active_sps(&slice)?;
                            slice.is_new_access_unit(prev, sps)
                        },
                        _ => false,
                    };
                    if new_au {
                        if let Some(au) = current.take() {
                            self.finish_access_unit(au, &current_slices, &mut units)?;
                            current_slices.clear();
                        }
                    }
                    let au = current.get_or_insert_with(|| {
                        let mut au = AccessUnit::default();
                        au.vps_nals = Vec::new();
                        au.sps_nals = std::mem::take(&mut pending_sps);
                        au.pps_nals = std::mem::take(&mut pending_pps);
                        au
                    });
                    au.vcl_nals.push(nal.to_vec());
                    current_slices.push(slice);
                },
                ParsedNal::Other => {
                    // AUD / SEI close the current access unit.
                    if let Some(au) = current.take() {
                        self.finish_access_unit(au, &current_slices, &mut units)?;
                        current_slices.clear();
                    }
                },
            }
        }
        if let Some(au) = current.take() {
            self.finish_access_unit(au, &current_slices, &mut units)?;
        }

        assign_display_order(&mut units);
        Ok(units)
    }

    fn active_sps(&self, slice: &AvcSliceHeader) -> io::Result<&AvcSps> {
        let pps = self
            .pps_map
            .get(&slice.pps_id)
            .ok_or_else(|| ioerr!(InvalidData, "avc: unknown pps {}", slice.pps_id))?;
        self.sps_map
            .get(&pps.sps_id)
            .ok_or_else(|| ioerr!(InvalidData, "avc: unknown sps {}", pps.sps_id))
    }

    fn finish_access_unit(
        &mut self,
        mut au: AccessUnit,
        slices: &[AvcSliceHeader],
        units: &mut Vec<AccessUnit>,
    ) -> io::Result<()> {
        let slice = match slices.first() {
            Some(s) => s,
            None => return Ok(()),
        };
        let sps = self.active_sps(slice)?.clone();

        let poc = self.poc_state.compute(slice, &sps);
        let max_frame_num = sps.max_frame_num() as i64;
        let curr_pic_num = slice.frame_num as i64;

        self.dpb.max_num_ref_frames = sps.max_num_ref_frames;
        self.dpb.update_pic_nums(slice.frame_num, sps.max_frame_num());

        if slice.is_idr() {
            self.dpb.mark_all_non_ref();
        }

        // reference lists for dependency tracking, from the first slice.
        let (mut list0, mut list1) = init_ref_lists(&self.dpb, slice, poc);
        modify_ref_list(
            &self.dpb,
            &mut list0,
            &slice.ref_pic_list_mod_l0,
            curr_pic_num,
            max_frame_num,
            slice.num_ref_idx_l0_active_minus1 as usize + 1,
        );
        if slice.slice_type.is_b() {
            modify_ref_list(
                &self.dpb,
                &mut list1,
                &slice.ref_pic_list_mod_l1,
                curr_pic_num,
                max_frame_num,
                slice.num_ref_idx_l1_active_minus1 as usize + 1,
            );
        }
        let mut refs: Vec<u64> = Vec::new();
        if !slice.slice_type.is_intra() {
            for &i in list0.iter().chain(list1.iter()) {
                let idx = self.dpb.pictures[i].decode_order;
                if !refs.contains(&idx) {
                    refs.push(idx);
                }
            }
        }

        // marking of the current picture.
        let mut pic = Picture {
            decode_order: self.decode_order,
            poc,
            frame_num: slice.frame_num,
            ref_type: if slice.is_reference() {
                RefType::ShortTerm
            } else {
                RefType::NonRef
            },
            pic_num: slice.frame_num as i64,
            long_term_frame_idx: 0,
            is_idr: slice.is_idr(),
            has_mmco5: false,
            for_output: true,
        };

        self.poc_state.prev_had_mmco5 = false;
        if slice.is_reference() {
            if slice.is_idr() {
                if slice.long_term_reference_flag {
                    pic.ref_type = RefType::LongTerm;
                    pic.long_term_frame_idx = 0;
                }
            } else if slice.adaptive_ref_pic_marking_mode_flag {
                let result = self.dpb.execute_mmco(&slice.mmco_ops, curr_pic_num, max_frame_num);
                if result.has_mmco5 {
                    pic.has_mmco5 = true;
                    pic.poc = 0;
                    self.poc_state.prev_had_mmco5 = true;
                    self.poc_state.prev_ref_poc = 0;
                    self.poc_state.prev_frame_num = 0;
                    self.poc_state.prev_frame_num_offset = 0;
                }
                if let Some(idx) = result.current_long_term_frame_idx {
                    pic.ref_type = RefType::LongTerm;
                    pic.long_term_frame_idx = idx;
                }
            } else {
                self.dpb.sliding_window();
            }
        }

        au.poc = pic.poc;
        au.decode_order = self.decode_order;
        au.width = sps.width();
        au.height = sps.height();
        au.ref_pic_indices = refs;
        au.is_idr = slice.is_idr();
        au.is_intra = slices.iter().all(|s| s.slice_type.is_intra());
        au.is_output = true;

        self.dpb.pictures.push(pic);
        // bound the structural buffer: drop old non reference entries.
        let horizon = self.dpb.max_num_ref_frames as usize + 18;
        if self.dpb.pictures.len() > horizon {
            let cut = self.dpb.pictures.len() - horizon;
            self.dpb.pictures.drain(..cut);
        }

        self.decode_order += 1;
        units.push(au);
        Ok(())
    }
}

/// Display order: rank by POC within each IDR delimited sequence.
pub(crate) fn assign_display_order(units: &mut Vec<AccessUnit>) {
    let mut start = 0usize;
    let mut base = 0u64;
    for i in 0..=units.len() {
        let boundary = i == units.len() || (i > start && units[i].is_idr);
        if boundary {
            let mut order: Vec<usize> = (start..i).collect();
            order.sort_by_key(|&k| units[k].poc);
            for (rank, &k) in order.iter().enumerate() {
                units[k].display_order = base + rank as u64;
            }
            base += (i - start) as u64;
            start = i;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;
    use crate::parse::avc::tests::{make_pps_rbsp, make_sps_rbsp};
    use crate::parse::rbsp_to_nal;

    fn nal(header: u8, rbsp: Vec<u8>) -> Vec<u8> {
        let mut v = vec![header];
        v.extend(rbsp_to_nal(&rbsp));
        v
    }

    // A P slice for the test SPS/PPS: poc type 0, frame_num 4 bits,
    // poc lsb 4 bits.
    fn slice_rbsp(idr: bool, frame_num: u32, poc_lsb: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_ue(0); // first_mb_in_slice
        w.write_ue(if idr { 2 } else { 0 }); // slice_type I / P
        w.write_ue(0); // pps_id
        w.write_bits(frame_num, 4);
        if idr {
            w.write_ue(0); // idr_pic_id
        }
        w.write_bits(poc_lsb, 4);
        if !idr {
            // P slice: num_ref_idx_active_override, ref list mod
            w.write_bit(false);
            w.write_bit(false); // ref_pic_list_modification_flag_l0
        }
        // dec_ref_pic_marking (nal_ref_idc != 0)
        if idr {
            w.write_bit(false); // no_output_of_prior_pics
            w.write_bit(false); // long_term_reference
        } else {
            w.write_bit(false); // adaptive_ref_pic_marking
        }
        w.write_se(0); // slice_qp_delta
        // deblocking (control present in test pps)
        w.write_ue(1); // disable_deblocking_filter_idc = 1
        w.write_bit(true); // stop bit
        w.finish()
    }

    fn stream_with_frame_nums(pairs: &[(bool, u32, u32)]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut push = |n: &[u8]| {
            data.extend_from_slice(&[0, 0, 0, 1]);
            data.extend_from_slice(n);
        };
        push(&nal(0x67, make_sps_rbsp()));
        push(&nal(0x68, make_pps_rbsp()));
        for &(idr, frame_num, poc_lsb) in pairs {
            let header = if idr { 0x65 } else { 0x61 };
            push(&nal(header, slice_rbsp(idr, frame_num, poc_lsb)));
        }
        data
    }

    #[test]
    fn access_unit_boundaries_on_frame_num() {
        let data = stream_with_frame_nums(&[(true, 0, 0), (false, 1, 2), (false, 2, 4)]);
        let mut parser = AvcStreamParser::new();
        let units = parser.parse_stream(&data).unwrap();
        assert_eq!(units.len(), 3);
        assert!(units[0].is_idr);
        assert_eq!(units[0].sps_nals.len(), 1);
        assert_eq!(units[0].pps_nals.len(), 1);
        assert_eq!(units[1].sps_nals.len(), 0);
        assert_eq!(units[0].width, 80);
        assert_eq!(units[0].height, 48);
        // P frames reference the previous picture.
        assert_eq!(units[1].ref_pic_indices, vec![0]);
        assert_eq!(units[2].ref_pic_indices, vec![1, 0]);
    }

    #[test]
    fn poc_msb_wraps() {
        // frame_num and poc lsb 0..15, then wrap: the 17th picture has
        // lsb 0 again and the derived POC must be 16, not 0.
        let mut pairs = vec![(true, 0u32, 0u32)];
        for i in 1..16 {
            pairs.push((false, i, i));
        }
        pairs.push((false, 0, 0));
        let data = stream_with_frame_nums(&pairs);
        let mut parser = AvcStreamParser::new();
        let units = parser.parse_stream(&data).unwrap();
        assert_eq!(units.len(), 17);
        assert_eq!(units[15].poc, 15);
        assert_eq!(units[16].poc, 16);
    }

    #[test]
    fn first_vcl_detection() {
        let s = nal(0x65, slice_rbsp(true, 0, 0));
        assert!(AvcStreamParser::is_first_vcl_of_picture(&s));
        let s = nal(0x67, make_sps_rbsp());
        assert!(!AvcStreamParser::is_first_vcl_of_picture(&s));
    }

    #[test]
    fn display_order_follows_poc() {
        let mut units = vec![
            AccessUnit {
                poc: 0,
                is_idr: true,
                ..AccessUnit::default()
            },
            AccessUnit {
                poc: 4,
                ..AccessUnit::default()
            },
            AccessUnit {
                poc: 2,
                ..AccessUnit::default()
            },
        ];
        assign_display_order(&mut units);
        assert_eq!(units[0].display_order, 0);
        assert_eq!(units[1].display_order, 2);
        assert_eq!(units[2].display_order, 1);
    }
}
