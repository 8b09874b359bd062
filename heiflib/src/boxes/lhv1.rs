//! Layered HEVC sample entries, decoder configuration, and the
//! operating points information property (ISO/IEC 14496-15).
use std::io;

use crate::boxes::hvc1::{annex_b_by_types, read_nal_arrays, write_nal_arrays, NalArray};
use crate::boxes::prelude::*;
use crate::boxes::stsd::VisualSampleEntryFields;
use crate::bitstream::{BitReader, BitWriter};

/// 'lhv1' / 'lhe1' sample entry.
#[derive(Clone, Debug)]
pub struct LhevcSampleEntry {
    pub fourcc: FourCC,
    pub fields: VisualSampleEntryFields,
    pub boxes: Vec<HeifBox>,
}
pub type Lhe1SampleEntry = LhevcSampleEntry;

impl Default for LhevcSampleEntry {
    fn default() -> LhevcSampleEntry {
        LhevcSampleEntry {
            fourcc: FourCC::new(b"lhv1"),
            fields: VisualSampleEntryFields::default(),
            boxes: Vec::new(),
        }
    }
}

impl LhevcSampleEntry {
    pub fn configuration(&self) -> Option<&LhevcDecoderConfigurationRecord> {
        first_box!(&self.boxes, LhevcConfigurationBox).map(|c| &c.configuration)
    }
}

impl FromBytes for LhevcSampleEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<LhevcSampleEntry> {
        let mut reader = BoxReader::new(stream)?;
        let fourcc = reader.header.fourcc;
        let stream = &mut reader;
        let fields = VisualSampleEntryFields::from_bytes(stream)?;
        let boxes = Vec::<HeifBox>::from_bytes(stream)?;
        Ok(LhevcSampleEntry { fourcc, fields, boxes })
    }
    fn min_size() -> usize {
        86
    }
}

impl ToBytes for LhevcSampleEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        self.fields.to_bytes(stream)?;
        self.boxes.to_bytes(stream)?;
        Ok(())
    }
}

impl BoxInfo for LhevcSampleEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        self.fourcc
    }
}

impl FullBox for LhevcSampleEntry {}

def_box! {
    /// L-HEVC Configuration box.
    LhevcConfigurationBox {
        configuration:  LhevcDecoderConfigurationRecord,
    },
    fourcc => b"lhvC",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

/// LHEVCDecoderConfigurationRecord.
///
/// Unlike the plain HEVC record this one carries no profile/tier/level;
/// those come from the operating point selected through 'oinf'/'tols'.
#[derive(Clone, Debug, Default)]
pub struct LhevcDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub min_spatial_segmentation_idc: u16,
    pub parallelism_type: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub length_size_minus_one: u8,
    pub arrays: Vec<NalArray>,
}

impl LhevcDecoderConfigurationRecord {
    /// All parameter sets as one Annex-B byte stream, VPS then SPS then PPS.
    pub fn to_annex_b(&self) -> Vec<u8> {
        annex_b_by_types(&self.arrays, &[32, 33, 34])
    }

    pub fn nal_units_of_type(&self, nal_unit_type: u8) -> Vec<&[u8]> {
        let mut v = Vec::new();
        for a in self.arrays.iter().filter(|a| a.nal_unit_type == nal_unit_type) {
            for nal in &a.nal_units {
                v.push(&nal[..]);
            }
        }
        v
    }

    pub fn add_nal_unit(&mut self, nal_unit: Vec<u8>, nal_unit_type: u8, completeness: bool) {
        crate::boxes::hvc1::add_nal_unit(&mut self.arrays, nal_unit, nal_unit_type, completeness);
    }
}

impl FromBytes for LhevcDecoderConfigurationRecord {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<LhevcDecoderConfigurationRecord> {
        let configuration_version = u8::from_bytes(stream)?;
        let min_spatial_segmentation_idc = u16::from_bytes(stream)? & 0xfff;
        let parallelism_type = u8::from_bytes(stream)? & 0x3;
        let b = u8::from_bytes(stream)?;
        let num_temporal_layers = (b >> 3) & 0x7;
        let temporal_id_nested = b & 0x4 != 0;
        let length_size_minus_one = b & 0x3;
        let arrays = read_nal_arrays(stream)?;
        Ok(LhevcDecoderConfigurationRecord {
            configuration_version,
            min_spatial_segmentation_idc,
            parallelism_type,
            num_temporal_layers,
            temporal_id_nested,
            length_size_minus_one,
            arrays,
        })
    }
    fn min_size() -> usize {
        6
    }
}

impl ToBytes for LhevcDecoderConfigurationRecord {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        self.configuration_version.to_bytes(stream)?;
        (0xf000u16 | (self.min_spatial_segmentation_idc & 0xfff)).to_bytes(stream)?;
        (0xfc | (self.parallelism_type & 0x3)).to_bytes(stream)?;
        let b = 0xc0
            | ((self.num_temporal_layers & 0x7) << 3)
            | ((self.temporal_id_nested as u8) << 2)
            | (self.length_size_minus_one & 0x3);
        b.to_bytes(stream)?;
        write_nal_arrays(&self.arrays, stream)?;
        Ok(())
    }
}

/// Profile/tier/level entry of the 'oinf' property.
#[derive(Clone, Debug, Default)]
pub struct OinfProfileTierLevel {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
}

/// One layer of an operating point.
#[derive(Clone, Debug, Default)]
pub struct OinfOperatingPointLayer {
    pub ptl_idx: u8,
    pub layer_id: u8,
    pub is_output_layer: bool,
    pub is_alternate_output_layer: bool,
}

/// One operating point: an output layer set at a max temporal id.
#[derive(Clone, Debug, Default)]
pub struct OinfOperatingPoint {
    pub output_layer_set_idx: u16,
    pub max_temporal_id: u8,
    pub layers: Vec<OinfOperatingPointLayer>,
    pub min_pic_width: u16,
    pub min_pic_height: u16,
    pub max_pic_width: u16,
    pub max_pic_height: u16,
    pub max_chroma_format: u8,
    pub max_bit_depth_minus8: u8,
    /// (avg_frame_rate, constant_frame_rate)
    pub frame_rate_info: Option<(u16, u8)>,
    /// (max_bit_rate, avg_bit_rate)
    pub bit_rate_info: Option<(u32, u32)>,
}

/// 'oinf': operating points information of a layered stream.
///
/// The trailing layer dependency section is preserved opaque.
#[derive(Clone, Debug, Default)]
pub struct OperatingPointsInformationProperty {
    pub scalability_mask: u16,
    pub profile_tier_levels: Vec<OinfProfileTierLevel>,
    pub operating_points: Vec<OinfOperatingPoint>,
    pub tail: Vec<u8>,
}

impl OperatingPointsInformationProperty {
    /// The operating point for an output layer set index, if declared.
    pub fn operating_point(&self, output_layer_set_idx: u16) -> Option<&OinfOperatingPoint> {
        self.operating_points
            .iter()
            .find(|op| op.output_layer_set_idx == output_layer_set_idx)
    }

    /// All layer ids over all operating points, deduplicated, in order.
    pub fn layer_ids(&self) -> Vec<u8> {
        let mut v = Vec::new();
        for op in &self.operating_points {
            for l in &op.layers {
                if !v.contains(&l.layer_id) {
                    v.push(l.layer_id);
                }
            }
        }
        v
    }
}

impl FromBytes for OperatingPointsInformationProperty {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<OperatingPointsInformationProperty> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;
        let payload = stream.read(stream.left())?.to_vec();
        let mut r = BitReader::new(&payload);

        let scalability_mask = r.read_bits(16)? as u16;
        r.read_bits(2)?;
        let num_ptl = r.read_bits(6)?;
        let mut profile_tier_levels = Vec::new();
        for _ in 0..num_ptl {
            profile_tier_levels.push(OinfProfileTierLevel {
                general_profile_space: r.read_bits(2)? as u8,
                general_tier_flag: r.read_bit()?,
                general_profile_idc: r.read_bits(5)? as u8,
                general_profile_compatibility_flags: r.read_bits(32)?,
                general_constraint_indicator_flags: ((r.read_bits(16)? as u64) << 32)
                    | r.read_bits(32)? as u64,
                general_level_idc: r.read_bits(8)? as u8,
            });
        }
        let num_operating_points = r.read_bits(16)?;
        let mut operating_points = Vec::new();
        for _ in 0..num_operating_points {
            let output_layer_set_idx = r.read_bits(16)? as u16;
            let max_temporal_id = r.read_bits(8)? as u8;
            let layer_count = r.read_bits(8)?;
            let mut layers = Vec::new();
            for _ in 0..layer_count {
                layers.push(OinfOperatingPointLayer {
                    ptl_idx: r.read_bits(8)? as u8,
                    layer_id: r.read_bits(6)? as u8,
                    is_output_layer: r.read_bit()?,
                    is_alternate_output_layer: r.read_bit()?,
                });
            }
            let min_pic_width = r.read_bits(16)? as u16;
            let min_pic_height = r.read_bits(16)? as u16;
            let max_pic_width = r.read_bits(16)? as u16;
            let max_pic_height = r.read_bits(16)? as u16;
            let max_chroma_format = r.read_bits(2)? as u8;
            let max_bit_depth_minus8 = r.read_bits(3)? as u8;
            r.read_bit()?;
            let frame_rate_info_flag = r.read_bit()?;
            let bit_rate_info_flag = r.read_bit()?;
            let frame_rate_info = if frame_rate_info_flag {
                let avg_frame_rate = r.read_bits(16)? as u16;
                r.read_bits(6)?;
                let constant_frame_rate = r.read_bits(2)? as u8;
                Some((avg_frame_rate, constant_frame_rate))
            } else {
                None
            };
            let bit_rate_info = if bit_rate_info_flag {
                Some((r.read_bits(32)?, r.read_bits(32)?))
            } else {
                None
            };
            operating_points.push(OinfOperatingPoint {
                output_layer_set_idx,
                max_temporal_id,
                layers,
                min_pic_width,
                min_pic_height,
                max_pic_width,
                max_pic_height,
                max_chroma_format,
                max_bit_depth_minus8,
                frame_rate_info,
                bit_rate_info,
            });
        }
        r.byte_align();
        let tail = r.read_bytes(r.bytes_left())?.to_vec();

        Ok(OperatingPointsInformationProperty {
            scalability_mask,
            profile_tier_levels,
            operating_points,
            tail,
        })
    }
    fn min_size() -> usize {
        17
    }
}

impl ToBytes for OperatingPointsInformationProperty {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;

        let mut w = BitWriter::new();
        w.write_bits(self.scalability_mask as u32, 16);
        w.write_bits(0, 2);
        w.write_bits(self.profile_tier_levels.len() as u32, 6);
        for ptl in &self.profile_tier_levels {
            w.write_bits(ptl.general_profile_space as u32, 2);
            w.write_bit(ptl.general_tier_flag);
            w.write_bits(ptl.general_profile_idc as u32, 5);
            w.write_bits(ptl.general_profile_compatibility_flags, 32);
            w.write_bits((ptl.general_constraint_indicator_flags >> 32) as u32, 16);
            w.write_bits(ptl.general_constraint_indicator_flags as u32, 32);
            w.write_bits(ptl.general_level_idc as u32, 8);
        }
        w.write_bits(self.operating_points.len() as u32, 16);
        for op in &self.operating_points {
            w.write_bits(op.output_layer_set_idx as u32, 16);
            w.write_bits(op.max_temporal_id as u32, 8);
            w.write_bits(op.layers.len() as u32, 8);
            for l in &op.layers {
                w.write_bits(l.ptl_idx as u32, 8);
                w.write_bits(l.layer_id as u32, 6);
                w.write_bit(l.is_output_layer);
                w.write_bit(l.is_alternate_output_layer);
            }
            w.write_bits(op.min_pic_width as u32, 16);
            w.write_bits(op.min_pic_height as u32, 16);
            w.write_bits(op.max_pic_width as u32, 16);
            w.write_bits(op.max_pic_height as u32, 16);
            w.write_bits(op.max_chroma_format as u32, 2);
            w.write_bits(op.max_bit_depth_minus8 as u32, 3);
            w.write_bit(false);
            w.write_bit(op.frame_rate_info.is_some());
            w.write_bit(op.bit_rate_info.is_some());
            if let Some((avg, constant)) = op.frame_rate_info {
                w.write_bits(avg as u32, 16);
                w.write_bits(0, 6);
                w.write_bits(constant as u32, 2);
            }
            if let Some((max, avg)) = op.bit_rate_info {
                w.write_bits(max, 32);
                w.write_bits(avg, 32);
            }
        }
        let mut payload = w.finish();
        payload.extend_from_slice(&self.tail);
        stream.write(&payload)?;
        Ok(())
    }
}

impl BoxInfo for OperatingPointsInformationProperty {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"oinf")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for OperatingPointsInformationProperty {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn oinf_round_trip() {
        let oinf = OperatingPointsInformationProperty {
            scalability_mask: 0x0002,
            profile_tier_levels: vec![OinfProfileTierLevel {
                general_profile_idc: 7,
                general_level_idc: 93,
                ..OinfProfileTierLevel::default()
            }],
            operating_points: vec![OinfOperatingPoint {
                output_layer_set_idx: 1,
                max_temporal_id: 6,
                layers: vec![
                    OinfOperatingPointLayer {
                        ptl_idx: 1,
                        layer_id: 0,
                        is_output_layer: false,
                        is_alternate_output_layer: false,
                    },
                    OinfOperatingPointLayer {
                        ptl_idx: 1,
                        layer_id: 1,
                        is_output_layer: true,
                        is_alternate_output_layer: false,
                    },
                ],
                min_pic_width: 640,
                min_pic_height: 480,
                max_pic_width: 1280,
                max_pic_height: 960,
                max_chroma_format: 1,
                max_bit_depth_minus8: 0,
                frame_rate_info: None,
                bit_rate_info: None,
            }],
            tail: Vec::new(),
        };
        let mut buf = MemBuffer::new();
        oinf.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = OperatingPointsInformationProperty::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.scalability_mask, 0x0002);
        let op = back.operating_point(1).unwrap();
        assert_eq!(op.max_pic_width, 1280);
        assert_eq!(op.layers.len(), 2);
        assert!(op.layers[1].is_output_layer);
        assert_eq!(back.layer_ids(), vec![0, 1]);
    }
}
