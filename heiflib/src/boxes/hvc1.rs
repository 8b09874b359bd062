//! HEVC sample entries and decoder configuration (ISO/IEC 14496-15).
use std::io;

use crate::boxes::prelude::*;
use crate::boxes::stsd::VisualSampleEntryFields;

/// 'hvc1' / 'hev1' sample entry.
#[derive(Clone, Debug)]
pub struct HevcSampleEntry {
    pub fourcc: FourCC,
    pub fields: VisualSampleEntryFields,
    pub boxes: Vec<HeifBox>,
}
pub type Hev1SampleEntry = HevcSampleEntry;

impl Default for HevcSampleEntry {
    fn default() -> HevcSampleEntry {
        HevcSampleEntry {
            fourcc: FourCC::new(b"hvc1"),
            fields: VisualSampleEntryFields::default(),
            boxes: Vec::new(),
        }
    }
}

impl HevcSampleEntry {
    /// The contained decoder configuration record.
    pub fn configuration(&self) -> Option<&HevcDecoderConfigurationRecord> {
        first_box!(&self.boxes, HevcConfigurationBox).map(|c| &c.configuration)
    }
}

impl FromBytes for HevcSampleEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<HevcSampleEntry> {
        let mut reader = BoxReader::new(stream)?;
        let fourcc = reader.header.fourcc;
        let stream = &mut reader;
        let fields = VisualSampleEntryFields::from_bytes(stream)?;
        let boxes = Vec::<HeifBox>::from_bytes(stream)?;
        Ok(HevcSampleEntry { fourcc, fields, boxes })
    }
    fn min_size() -> usize {
        86
    }
}

impl ToBytes for HevcSampleEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        self.fields.to_bytes(stream)?;
        self.boxes.to_bytes(stream)?;
        Ok(())
    }
}

impl BoxInfo for HevcSampleEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        self.fourcc
    }
}

impl FullBox for HevcSampleEntry {}

def_box! {
    /// HEVC Configuration box.
    ///
    /// Contains just the HEVCDecoderConfigurationRecord.
    HevcConfigurationBox {
        configuration:  HevcDecoderConfigurationRecord,
    },
    fourcc => b"hvcC",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

/// One parameter set array of a (L-)HEVC configuration record, keyed
/// by NAL unit type.
#[derive(Clone, Debug, Default)]
pub struct NalArray {
    pub array_completeness: bool,
    pub nal_unit_type: u8,
    /// NAL units with emulation prevention bytes, no start codes.
    pub nal_units: Vec<Vec<u8>>,
}

pub(crate) fn read_nal_arrays<R: ReadBytes>(stream: &mut R) -> io::Result<Vec<NalArray>> {
    let num_arrays = u8::from_bytes(stream)?;
    let mut arrays = Vec::new();
    for _ in 0..num_arrays {
        let b = u8::from_bytes(stream)?;
        let array_completeness = b & 0x80 != 0;
        let nal_unit_type = b & 0x3f;
        let num_nalus = u16::from_bytes(stream)?;
        let mut nal_units = Vec::new();
        for _ in 0..num_nalus {
            let len = u16::from_bytes(stream)? as u64;
            nal_units.push(stream.read(len)?.to_vec());
        }
        arrays.push(NalArray {
            array_completeness,
            nal_unit_type,
            nal_units,
        });
    }
    Ok(arrays)
}

pub(crate) fn write_nal_arrays<W: WriteBytes>(arrays: &[NalArray], stream: &mut W) -> io::Result<()> {
    (arrays.len() as u8).to_bytes(stream)?;
    for a in arrays {
        (((a.array_completeness as u8) << 7) | (a.nal_unit_type & 0x3f)).to_bytes(stream)?;
        (a.nal_units.len() as u16).to_bytes(stream)?;
        for nal in &a.nal_units {
            (nal.len() as u16).to_bytes(stream)?;
            stream.write(nal)?;
        }
    }
    Ok(())
}

/// Add a NAL unit to the array for its type, creating the array if needed.
pub(crate) fn add_nal_unit(arrays: &mut Vec<NalArray>, nal_unit: Vec<u8>, nal_unit_type: u8, completeness: bool) {
    for a in arrays.iter_mut() {
        if a.nal_unit_type == nal_unit_type {
            a.nal_units.push(nal_unit);
            return;
        }
    }
    arrays.push(NalArray {
        array_completeness: completeness,
        nal_unit_type,
        nal_units: vec![nal_unit],
    });
}

/// Start-code prefix every NAL unit of the arrays with the given types,
/// in the order the types are listed.
pub(crate) fn annex_b_by_types(arrays: &[NalArray], types: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    for &t in types {
        for a in arrays.iter().filter(|a| a.nal_unit_type == t) {
            for nal in &a.nal_units {
                v.extend_from_slice(&[0, 0, 0, 1]);
                v.extend_from_slice(nal);
            }
        }
    }
    v
}

// aligned(8) class HEVCDecoderConfigurationRecord, see the comment block
// in ISO/IEC 14496-15 8.3.3.1 for the full layout.
#[derive(Clone, Debug, Default)]
pub struct HevcDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
    pub min_spatial_segmentation_idc: u16,
    pub parallelism_type: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub length_size_minus_one: u8,
    pub arrays: Vec<NalArray>,
}

impl HevcDecoderConfigurationRecord {
    /// Return codec id, e.g. hvc1.1.6.L93.B0
    pub fn codec_id(&self) -> String {
        format!(
            "hvc1.{:x}.{:x}.{}{}.B0",
            self.general_profile_idc,
            self.general_profile_compatibility_flags,
            if self.general_tier_flag { 'H' } else { 'L' },
            self.general_level_idc,
        )
    }

    /// All parameter sets as one Annex-B byte stream, VPS then SPS then PPS.
    pub fn to_annex_b(&self) -> Vec<u8> {
        annex_b_by_types(&self.arrays, &[32, 33, 34])
    }

    /// The NAL units of one parameter set type.
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
        add_nal_unit(&mut self.arrays, nal_unit, nal_unit_type, completeness);
    }
}

impl FromBytes for HevcDecoderConfigurationRecord {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<HevcDecoderConfigurationRecord> {
        let configuration_version = u8::from_bytes(stream)?;
        let b = u8::from_bytes(stream)?;
        let general_profile_space = b >> 6;
        let general_tier_flag = b & 0x20 != 0;
        let general_profile_idc = b & 0x1f;
        let general_profile_compatibility_flags = u32::from_bytes(stream)?;
        let hi = u16::from_bytes(stream)? as u64;
        let lo = u32::from_bytes(stream)? as u64;
        let general_constraint_indicator_flags = (hi << 32) | lo;
        let general_level_idc = u8::from_bytes(stream)?;
        let min_spatial_segmentation_idc = u16::from_bytes(stream)? & 0xfff;
        let parallelism_type = u8::from_bytes(stream)? & 0x3;
        let chroma_format_idc = u8::from_bytes(stream)? & 0x3;
        let bit_depth_luma_minus8 = u8::from_bytes(stream)? & 0x7;
        let bit_depth_chroma_minus8 = u8::from_bytes(stream)? & 0x7;
        let avg_frame_rate = u16::from_bytes(stream)?;
        let b = u8::from_bytes(stream)?;
        let constant_frame_rate = b >> 6;
        let num_temporal_layers = (b >> 3) & 0x7;
        let temporal_id_nested = b & 0x4 != 0;
        let length_size_minus_one = b & 0x3;
        let arrays = read_nal_arrays(stream)?;

        Ok(HevcDecoderConfigurationRecord {
            configuration_version,
            general_profile_space,
            general_tier_flag,
            general_profile_idc,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            general_level_idc,
            min_spatial_segmentation_idc,
            parallelism_type,
            chroma_format_idc,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            avg_frame_rate,
            constant_frame_rate,
            num_temporal_layers,
            temporal_id_nested,
            length_size_minus_one,
            arrays,
        })
    }
    fn min_size() -> usize {
        23
    }
}

impl ToBytes for HevcDecoderConfigurationRecord {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        self.configuration_version.to_bytes(stream)?;
        let b = (self.general_profile_space << 6)
            | ((self.general_tier_flag as u8) << 5)
            | (self.general_profile_idc & 0x1f);
        b.to_bytes(stream)?;
        self.general_profile_compatibility_flags.to_bytes(stream)?;
        ((self.general_constraint_indicator_flags >> 32) as u16).to_bytes(stream)?;
        (self.general_constraint_indicator_flags as u32).to_bytes(stream)?;
        self.general_level_idc.to_bytes(stream)?;
        (0xf000 | (self.min_spatial_segmentation_idc & 0xfff)).to_bytes(stream)?;
        (0xfc | (self.parallelism_type & 0x3)).to_bytes(stream)?;
        (0xfc | (self.chroma_format_idc & 0x3)).to_bytes(stream)?;
        (0xf8 | (self.bit_depth_luma_minus8 & 0x7)).to_bytes(stream)?;
        (0xf8 | (self.bit_depth_chroma_minus8 & 0x7)).to_bytes(stream)?;
        self.avg_frame_rate.to_bytes(stream)?;
        let b = (self.constant_frame_rate << 6)
            | ((self.num_temporal_layers & 0x7) << 3)
            | ((self.temporal_id_nested as u8) << 2)
            | (self.length_size_minus_one & 0x3);
        b.to_bytes(stream)?;
        write_nal_arrays(&self.arrays, stream)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn hvcc_round_trip() {
        let mut rec = HevcDecoderConfigurationRecord {
            configuration_version: 1,
            general_profile_idc: 1,
            general_profile_compatibility_flags: 0x60000000,
            general_level_idc: 93,
            chroma_format_idc: 1,
            num_temporal_layers: 1,
            temporal_id_nested: true,
            length_size_minus_one: 3,
            ..HevcDecoderConfigurationRecord::default()
        };
        rec.add_nal_unit(vec![0x40, 1, 0xaa], 32, true);
        rec.add_nal_unit(vec![0x42, 1, 0xbb], 33, true);
        rec.add_nal_unit(vec![0x44, 1, 0xcc], 34, true);

        let b = HevcConfigurationBox { configuration: rec };
        let mut buf = MemBuffer::new();
        b.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = HevcConfigurationBox::from_bytes(&mut rdr).unwrap();
        let cfg = &back.configuration;
        assert_eq!(cfg.arrays.len(), 3);
        assert_eq!(cfg.nal_units_of_type(33), vec![&[0x42, 1, 0xbb][..]]);
        assert!(cfg.temporal_id_nested);
        // VPS + SPS + PPS, each with a 4 byte start code.
        let annexb = cfg.to_annex_b();
        assert_eq!(&annexb[0..4], &[0, 0, 0, 1]);
        assert_eq!(annexb.len(), 3 * (4 + 3));
        assert_eq!(annexb[4], 0x40);
        assert_eq!(annexb[11], 0x42);
        assert_eq!(annexb[18], 0x44);
    }
}
