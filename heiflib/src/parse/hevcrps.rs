//! HEVC reference picture sets and access unit assembly.
//!
//! The reader's responsibility is structural: per access unit it
//! produces the ordered reference picture indices downstream consumers
//! use for dependency tracking, not pixel reconstruction.
use std::collections::HashMap;
use std::io;

use crate::bitstream::BitReader;
use crate::parse::avcdpb::assign_display_order;
use crate::parse::hevc::{HevcPps, HevcSps, HevcVps};
use crate::parse::hevcslice::HevcSliceHeader;
use crate::parse::{hevc_nal_type, nal_to_rbsp, split_nal_units, AccessUnit, HevcNalHeader};

/// One picture as the structural DPB tracks it.
#[derive(Clone, Debug)]
struct HevcPicture {
    decode_order: u64,
    poc: i32,
    nuh_layer_id: u8,
}

/// The classified reference picture sets of one picture.
#[derive(Clone, Debug, Default)]
pub struct RefPicSets {
    pub st_curr_before: Vec<u64>,
    pub st_curr_after: Vec<u64>,
    pub st_foll: Vec<u64>,
    pub lt_curr: Vec<u64>,
    pub lt_foll: Vec<u64>,
}

impl RefPicSets {
    /// All pictures the current one may reference, in temp list order.
    pub fn current_refs(&self) -> Vec<u64> {
        let mut v = Vec::new();
        for &i in self
            .st_curr_before
            .iter()
            .chain(self.st_curr_after.iter())
            .chain(self.lt_curr.iter())
        {
            if !v.contains(&i) {
                v.push(i);
            }
        }
        v
    }

    fn all(&self) -> Vec<u64> {
        let mut v = self.current_refs();
        for &i in self.st_foll.iter().chain(self.lt_foll.iter()) {
            if !v.contains(&i) {
                v.push(i);
            }
        }
        v
    }
}

/// Build reference picture list 0 / 1 from the classified sets,
/// applying the slice's list_entry modification.
pub fn build_ref_pic_lists(sets: &RefPicSets, slice: &HevcSliceHeader) -> (Vec<u64>, Vec<u64>) {
    let make = |first: &[u64], second: &[u64], num_active: usize, entries: &[u32]| -> Vec<u64> {
        let pool: Vec<u64> = first
            .iter()
            .chain(second.iter())
            .chain(sets.lt_curr.iter())
            .copied()
            .collect();
        if pool.is_empty() {
            return Vec::new();
        }
        let mut temp = Vec::new();
        while temp.len() < num_active {
            temp.extend_from_slice(&pool);
        }
        let mut list = Vec::with_capacity(num_active);
        for i in 0..num_active {
            let idx = entries.get(i).map(|&e| e as usize).unwrap_or(i);
            list.push(temp.get(idx).copied().unwrap_or(temp[i % temp.len()]));
        }
        list
    };
    let list0 = make(
        &sets.st_curr_before,
        &sets.st_curr_after,
        slice.num_ref_idx_l0_active_minus1 as usize + 1,
        &slice.list_entry_l0,
    );
    let list1 = if slice.slice_type == crate::parse::hevcslice::HevcSliceType::B {
        make(
            &sets.st_curr_after,
            &sets.st_curr_before,
            slice.num_ref_idx_l1_active_minus1 as usize + 1,
            &slice.list_entry_l1,
        )
    } else {
        Vec::new()
    };
    (list0, list1)
}

enum ParsedNal {
    Vps(HevcVps),
    Sps(HevcSps),
    Pps(HevcPps),
    Slice(HevcSliceHeader),
    AuTerminator,
    Other,
}

/// Parses an HEVC Annex-B stream into access units.
#[derive(Default)]
pub struct HevcStreamParser {
    vps_map: HashMap<u8, HevcVps>,
    sps_map: HashMap<u8, HevcSps>,
    pps_map: HashMap<u8, HevcPps>,
    dpb: Vec<HevcPicture>,
    prev_tid0_poc_lsb: i32,
    prev_tid0_poc_msb: i32,
    decode_order: u64,
}

impl HevcStreamParser {
    pub fn new() -> HevcStreamParser {
        HevcStreamParser::default()
    }

    pub fn vps_by_id(&self, id: u8) -> Option<&HevcVps> {
        self.vps_map.get(&id)
    }

    pub fn sps_by_id(&self, id: u8) -> Option<&HevcSps> {
        self.sps_map.get(&id)
    }

    pub fn pps_by_id(&self, id: u8) -> Option<&HevcPps> {
        self.pps_map.get(&id)
    }

    /// Is this NAL unit the first VCL NAL unit of a picture?
    pub fn is_first_vcl_of_picture(nal: &[u8]) -> bool {
        match HevcNalHeader::parse(nal) {
            Ok(h) if h.is_vcl() => {
                let rbsp = nal_to_rbsp(&nal[2..]);
                let mut r = BitReader::new(&rbsp);
                r.read_bit().unwrap_or(false)
            },
            _ => false,
        }
    }

    fn parse_nal(&mut self, nal: &[u8]) -> io::Result<ParsedNal> {
        let header = HevcNalHeader::parse(nal)?;
        let rbsp = nal_to_rbsp(&nal[2..]);
        let mut reader = BitReader::new(&rbsp);
        match header.nal_unit_type {
            hevc_nal_type::VPS => {
                let vps = HevcVps::read(&mut reader)?;
                Ok(ParsedNal::Vps(vps))
            },
            hevc_nal_type::SPS => {
                // peek the vps id to resolve layered sub-layer counts.
                let vps = {
                    let mut peek = BitReader::new(&rbsp);
                    let vps_id = peek.read_bits(4)? as u8;
                    self.vps_map.get(&vps_id)
                };
                let sps = HevcSps::read(&mut reader, header.nuh_layer_id, vps)?;
                Ok(ParsedNal::Sps(sps))
            },
            hevc_nal_type::PPS => {
                let pps = HevcPps::read(&mut reader)?;
                Ok(ParsedNal::Pps(pps))
            },
            t if t < hevc_nal_type::VPS => {
                let mut peek = BitReader::new(&rbsp);
                peek.read_bit()?; // first_slice_segment_in_pic_flag
                if header.nal_unit_type >= hevc_nal_type::BLA_W_LP
                    && header.nal_unit_type <= hevc_nal_type::RESERVED_IRAP_VCL23
                {
                    peek.read_bit()?;
                }
                let pps_id = peek.read_ue_max(63)? as u8;
                let pps = self
                    .pps_map
                    .get(&pps_id)
                    .ok_or_else(|| ioerr!(InvalidData, "hevc: slice names unknown pps {}", pps_id))?;
                let sps = self
                    .sps_map
                    .get(&pps.sps_id)
                    .ok_or_else(|| ioerr!(InvalidData, "hevc: pps names unknown sps {}", pps.sps_id))?;
                let vps = self.vps_map.get(&sps.vps_id);
                let slice = HevcSliceHeader::read(&mut reader, header, sps, pps, vps)?;
                Ok(ParsedNal::Slice(slice))
            },
            hevc_nal_type::AUD | hevc_nal_type::PREFIX_SEI | hevc_nal_type::EOS | hevc_nal_type::EOB => {
                Ok(ParsedNal::AuTerminator)
            },
            _ => Ok(ParsedNal::Other),
        }
    }

    /// Parse a whole Annex-B stream into access units.
    pub fn parse_stream(&mut self, data: &[u8]) -> io::Result<Vec<AccessUnit>> {
        let nals = split_nal_units(data)?;

        let mut units: Vec<AccessUnit> = Vec::new();
        let mut current: Option<AccessUnit> = None;
        let mut current_slices: Vec<HevcSliceHeader> = Vec::new();
        let mut pending_vps: Vec<Vec<u8>> = Vec::new();
        let mut pending_sps: Vec<Vec<u8>> = Vec::new();
        let mut pending_pps: Vec<Vec<u8>> = Vec::new();

        for nal in nals {
            match self.parse_nal(nal)? {
                ParsedNal::Vps(vps) => {
                    pending_vps.push(nal.to_vec());
                    self.vps_map.insert(vps.vps_id, vps);
                    self.flush(&mut current, &mut current_slices, &mut units)?;
                },
                ParsedNal::Sps(sps) => {
                    pending_sps.push(nal.to_vec());
                    self.sps_map.insert(sps.sps_id, sps);
                    self.flush(&mut current, &mut current_slices, &mut units)?;
                },
                ParsedNal::Pps(pps) => {
                    pending_pps.push(nal.to_vec());
                    self.pps_map.insert(pps.pps_id, pps);
                    self.flush(&mut current, &mut current_slices, &mut units)?;
                },
                ParsedNal::Slice(slice) => {
                    // A base layer first slice opens a new access unit;
                    // higher layer pictures stay in the current one.
                    let new_au = slice.first_slice_segment_in_pic_flag
                        && slice.nal.nuh_layer_id == 0
                        && current.is_some()
                        && !current_slices.is_empty();
                    if new_au {
                        self.flush(&mut current, &mut current_slices, &mut units)?;
                    }
                    let au = current.get_or_insert_with(|| {
                        let mut au = AccessUnit::default();
                        au.vps_nals = std::mem::take(&mut pending_vps);
                        au.sps_nals = std::mem::take(&mut pending_sps);
                        au.pps_nals = std::mem::take(&mut pending_pps);
                        au
                    });
                    au.vcl_nals.push(nal.to_vec());
                    current_slices.push(slice);
                },
                ParsedNal::AuTerminator => {
                    self.flush(&mut current, &mut current_slices, &mut units)?;
                },
                ParsedNal::Other => {},
            }
        }
        self.flush(&mut current, &mut current_slices, &mut units)?;

        assign_display_order(&mut units);
        Ok(units)
    }

    fn flush(
        &mut self,
        current: &mut Option<AccessUnit>,
        slices: &mut Vec<HevcSliceHeader>,
        units: &mut Vec<AccessUnit>,
    ) -> io::Result<()> {
        if let Some(au) = current.take() {
            self.finish_access_unit(au, slices, units)?;
            slices.clear();
        }
        Ok(())
    }

    fn active_sps(&self, slice: &HevcSliceHeader) -> io::Result<&HevcSps> {
        let pps = self
            .pps_map
            .get(&slice.pps_id)
            .ok_or_else(|| ioerr!(InvalidData, "hevc: unknown pps {}", slice.pps_id))?;
        self.sps_map
            .get(&pps.sps_id)
            .ok_or_else(|| ioerr!(InvalidData, "hevc: unknown sps {}", pps.sps_id))
    }

    fn finish_access_unit(
        &mut self,
        mut au: AccessUnit,
        slices: &[HevcSliceHeader],
        units: &mut Vec<AccessUnit>,
    ) -> io::Result<()> {
        let slice = match slices.iter().find(|s| !s.dependent_slice_segment_flag) {
            Some(s) => s,
            None => return Ok(()),
        };
        let sps = self.active_sps(slice)?.clone();

        let poc = self.compute_poc(slice, &sps);

        if slice.nal.is_idr() || slice.nal.is_bla() {
            self.dpb.retain(|p| p.nuh_layer_id != slice.nal.nuh_layer_id);
        }

        let sets = self.classify_ref_pic_sets(slice, &sps, poc);
        // Dependencies are the full current sets, not the (possibly
        // truncated) per-slice lists.
        let refs = if slice.slice_type.is_intra() {
            Vec::new()
        } else {
            sets.current_refs()
        };

        // prune: only pictures in some set survive, plus other layers.
        let keep = sets.all();
        let layer = slice.nal.nuh_layer_id;
        self.dpb
            .retain(|p| p.nuh_layer_id != layer || keep.contains(&p.decode_order));
        self.dpb.push(HevcPicture {
            decode_order: self.decode_order,
            poc,
            nuh_layer_id: layer,
        });

        au.poc = poc;
        au.decode_order = self.decode_order;
        au.width = sps.width();
        au.height = sps.height();
        au.ref_pic_indices = refs;
        au.is_idr = slice.nal.is_idr();
        au.is_cra = slice.nal.is_cra();
        au.is_bla = slice.nal.is_bla();
        au.is_intra = slices
            .iter()
            .filter(|s| !s.dependent_slice_segment_flag)
            .all(|s| s.slice_type.is_intra());
        au.is_output = slice.pic_output_flag;

        self.decode_order += 1;
        units.push(au);
        Ok(())
    }

    fn compute_poc(&mut self, slice: &HevcSliceHeader, sps: &HevcSps) -> i32 {
        let max_poc_lsb = sps.max_poc_lsb();
        let lsb = slice.slice_pic_order_cnt_lsb as i32;
        let msb = if slice.is_irap() && (slice.nal.is_idr() || slice.nal.is_bla()) {
            0
        } else {
            let prev_lsb = self.prev_tid0_poc_lsb;
            let prev_msb = self.prev_tid0_poc_msb;
            if lsb < prev_lsb && (prev_lsb - lsb) >= max_poc_lsb / 2 {
                prev_msb + max_poc_lsb
            } else if lsb > prev_lsb && (lsb - prev_lsb) > max_poc_lsb / 2 {
                prev_msb - max_poc_lsb
            } else {
                prev_msb
            }
        };
        let poc = msb + lsb;
        // track the previous temporal id 0 picture of the base layer.
        if slice.nal.nuh_temporal_id_plus1 == 1
            && slice.nal.nuh_layer_id == 0
            && slice.nal.nal_unit_type != hevc_nal_type::RASL_R
        {
            self.prev_tid0_poc_lsb = lsb;
            self.prev_tid0_poc_msb = msb;
        }
        poc
    }

    /// Classify the slice's RPS against the structural DPB.
    fn classify_ref_pic_sets(&self, slice: &HevcSliceHeader, sps: &HevcSps, poc: i32) -> RefPicSets {
        let mut sets = RefPicSets::default();
        let layer = slice.nal.nuh_layer_id;
        let max_poc_lsb = sps.max_poc_lsb();

        let find_by_poc = |target: i32| -> Option<u64> {
            self.dpb
                .iter()
                .find(|p| p.nuh_layer_id == layer && p.poc == target)
                .map(|p| p.decode_order)
        };
        let find_by_poc_lsb = |target_lsb: i32| -> Option<u64> {
            self.dpb
                .iter()
                .find(|p| p.nuh_layer_id == layer && (p.poc & (max_poc_lsb - 1)) == target_lsb)
                .map(|p| p.decode_order)
        };

        let rps = &slice.short_term_rps;
        for (i, &delta) in rps.delta_poc_s0.iter().enumerate() {
            if let Some(idx) = find_by_poc(poc + delta) {
                if rps.used_by_curr_pic_s0[i] {
                    sets.st_curr_before.push(idx);
                } else {
                    sets.st_foll.push(idx);
                }
            }
        }
        for (i, &delta) in rps.delta_poc_s1.iter().enumerate() {
            if let Some(idx) = find_by_poc(poc + delta) {
                if rps.used_by_curr_pic_s1[i] {
                    sets.st_curr_after.push(idx);
                } else {
                    sets.st_foll.push(idx);
                }
            }
        }

        for lt in &slice.long_term_refs {
            let found = if lt.msb_present {
                let target = poc - lt.delta_poc_msb_cycle as i32 * max_poc_lsb
                    - (poc & (max_poc_lsb - 1))
                    + lt.poc_lsb as i32;
                find_by_poc(target)
            } else {
                find_by_poc_lsb(lt.poc_lsb as i32)
            };
            if let Some(idx) = found {
                if lt.used_by_curr_pic {
                    sets.lt_curr.push(idx);
                } else {
                    sets.lt_foll.push(idx);
                }
            }
        }
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;
    use crate::parse::hevc::tests::{make_pps_rbsp, make_sps_rbsp};
    use crate::parse::rbsp_to_nal;

    fn hevc_nal(nal_type: u8, rbsp: Vec<u8>) -> Vec<u8> {
        let mut v = vec![nal_type << 1, 1];
        v.extend(rbsp_to_nal(&rbsp));
        v
    }

    fn make_vps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 4); // vps id
        w.write_bit(true); // base_layer_internal
        w.write_bit(true); // base_layer_available
        w.write_bits(0, 6); // max_layers_minus1
        w.write_bits(0, 3); // max_sub_layers_minus1
        w.write_bit(true); // temporal_id_nesting
        w.write_bits(0xffff, 16);
        crate::parse::hevc::tests::write_ptl(&mut w);
        w.write_bit(true); // sub_layer_ordering_info_present
        w.write_ue(3);
        w.write_ue(0);
        w.write_ue(0);
        w.write_bits(0, 6); // max_layer_id
        w.write_ue(0); // num_layer_sets_minus1
        w.write_bit(false); // timing info
        w.write_bit(false); // extension
        w.write_bit(true); // stop
        w.finish()
    }

    // IDR slice: first slice, no poc fields.
    fn idr_slice_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bit(true); // first_slice_segment_in_pic_flag
        w.write_bit(false); // no_output_of_prior_pics
        w.write_ue(0); // pps id
        w.write_ue(2); // slice_type I
        w.write_bit(true); // sao luma (sao enabled in test sps)
        w.write_bit(true); // sao chroma
        w.write_se(0); // slice_qp_delta
        w.write_bit(true); // loop filter across slices
        w.write_bit(true); // stop
        w.finish()
    }

    // P slice using sps rps idx 0 (deltas -1,-2 used / +1 used).
    fn p_slice_rbsp(poc_lsb: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bit(true); // first_slice
        w.write_ue(0); // pps id
        w.write_ue(1); // slice_type P
        w.write_bits(poc_lsb, 4); // slice_pic_order_cnt_lsb
        w.write_bit(true); // short_term_ref_pic_set_sps_flag
        w.write_bits(0, 1); // idx (2 sets -> 1 bit)
        w.write_bit(true); // sao luma
        w.write_bit(true); // sao chroma
        w.write_bit(false); // num_ref_idx_active_override
        w.write_ue(0); // five_minus_max_num_merge_cand
        w.write_se(0); // slice_qp_delta
        w.write_bit(true); // loop filter across slices
        w.write_bit(true); // stop
        w.finish()
    }

    fn build_stream(slices: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut push = |n: &[u8]| {
            data.extend_from_slice(&[0, 0, 0, 1]);
            data.extend_from_slice(n);
        };
        push(&hevc_nal(hevc_nal_type::VPS, make_vps_rbsp()));
        push(&hevc_nal(hevc_nal_type::SPS, make_sps_rbsp()));
        push(&hevc_nal(hevc_nal_type::PPS, make_pps_rbsp()));
        for (t, rbsp) in slices {
            push(&hevc_nal(*t, rbsp.clone()));
        }
        data
    }

    #[test]
    fn idr_and_trailing_pictures() {
        let data = build_stream(&[
            (hevc_nal_type::IDR_W_RADL, idr_slice_rbsp()),
            (1, p_slice_rbsp(1)), // TRAIL_R
            (1, p_slice_rbsp(2)),
        ]);
        let mut parser = HevcStreamParser::new();
        let units = parser.parse_stream(&data).unwrap();
        assert_eq!(units.len(), 3);
        assert!(units[0].is_idr && units[0].is_intra);
        assert_eq!(units[0].vps_nals.len(), 1);
        assert_eq!(units[0].sps_nals.len(), 1);
        assert_eq!(units[0].poc, 0);
        assert_eq!(units[1].poc, 1);
        assert_eq!(units[2].poc, 2);
        assert_eq!(units[0].width, 640);
        assert_eq!(units[0].height, 480);
        // picture 1 references the IDR (delta -1); picture 2 references
        // both predecessors.
        assert_eq!(units[1].ref_pic_indices, vec![0]);
        assert!(units[2].ref_pic_indices.contains(&1));
        assert!(units[2].ref_pic_indices.contains(&0));
    }

    #[test]
    fn poc_msb_wrap() {
        // poc lsb is 4 bits; feeding lsb 0..15 then 0 again must wrap
        // the msb to 16.
        let mut slices = vec![(hevc_nal_type::IDR_W_RADL, idr_slice_rbsp())];
        for i in 1..16 {
            slices.push((1, p_slice_rbsp(i)));
        }
        slices.push((1, p_slice_rbsp(0)));
        let data = build_stream(&slices);
        let mut parser = HevcStreamParser::new();
        let units = parser.parse_stream(&data).unwrap();
        assert_eq!(units.last().unwrap().poc, 16);
    }

    #[test]
    fn first_vcl_detection() {
        let s = hevc_nal(hevc_nal_type::IDR_W_RADL, idr_slice_rbsp());
        assert!(HevcStreamParser::is_first_vcl_of_picture(&s));
        let s = hevc_nal(hevc_nal_type::SPS, make_sps_rbsp());
        assert!(!HevcStreamParser::is_first_vcl_of_picture(&s));
    }
}
