//! AVC sample entries and decoder configuration (ISO/IEC 14496-15).
use std::io;

use crate::boxes::prelude::*;
use crate::boxes::stsd::VisualSampleEntryFields;

/// 'avc1' / 'avc3' sample entry.
///
/// The two fourccs share a layout; which one was read is kept in the
/// `fourcc` field, like the stco/co64 pair.
#[derive(Clone, Debug)]
pub struct AvcSampleEntry {
    pub fourcc: FourCC,
    pub fields: VisualSampleEntryFields,
    pub boxes: Vec<HeifBox>,
}
pub type Avc3SampleEntry = AvcSampleEntry;

impl Default for AvcSampleEntry {
    fn default() -> AvcSampleEntry {
        AvcSampleEntry {
            fourcc: FourCC::new(b"avc1"),
            fields: VisualSampleEntryFields::default(),
            boxes: Vec::new(),
        }
    }
}

impl AvcSampleEntry {
    /// The contained decoder configuration record.
    pub fn configuration(&self) -> Option<&AvcDecoderConfigurationRecord> {
        first_box!(&self.boxes, AvcConfigurationBox).map(|c| &c.configuration)
    }
}

impl FromBytes for AvcSampleEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<AvcSampleEntry> {
        let mut reader = BoxReader::new(stream)?;
        let fourcc = reader.header.fourcc;
        let stream = &mut reader;
        let fields = VisualSampleEntryFields::from_bytes(stream)?;
        let boxes = Vec::<HeifBox>::from_bytes(stream)?;
        Ok(AvcSampleEntry { fourcc, fields, boxes })
    }
    fn min_size() -> usize {
        86
    }
}

impl ToBytes for AvcSampleEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;
        self.fields.to_bytes(stream)?;
        self.boxes.to_bytes(stream)?;
        Ok(())
    }
}

impl BoxInfo for AvcSampleEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        self.fourcc
    }
}

impl FullBox for AvcSampleEntry {}

def_box! {
    /// AvcConfigurationBox (ISO/IEC 14496-15)
    AvcConfigurationBox {
        configuration: AvcDecoderConfigurationRecord,
    },
    fourcc => b"avcC",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

// aligned(8) class AVCDecoderConfigurationRecord {
//     unsigned int(8) configurationVersion = 1;
//     unsigned int(8) AVCProfileIndication;
//     unsigned int(8) profile_compatibility;
//     unsigned int(8) AVCLevelIndication;
//     bit(6) reserved = '111111'b;
//     unsigned int(2) lengthSizeMinusOne;
//     bit(3) reserved = '111'b;
//     unsigned int(5) numOfSequenceParameterSets;
//     for (i=0; i< numOfSequenceParameterSets; i++) {
//       unsigned int(16) sequenceParameterSetLength ;
//       bit(8*sequenceParameterSetLength) sequenceParameterSetNALUnit;
//     }
//     unsigned int(8) numOfPictureParameterSets;
//     for (i=0; i< numOfPictureParameterSets; i++) {
//       unsigned int(16) pictureParameterSetLength;
//       bit(8*pictureParameterSetLength) pictureParameterSetNALUnit;
//     }
// }
#[derive(Clone, Debug, Default)]
pub struct AvcDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    pub length_size_minus_one: u8,
    /// SPS NAL units, emulation prevention bytes included.
    pub sps: Vec<Vec<u8>>,
    /// PPS NAL units, emulation prevention bytes included.
    pub pps: Vec<Vec<u8>>,
    /// Profile specific extension bytes, kept opaque.
    pub extensions: Vec<u8>,
}

impl AvcDecoderConfigurationRecord {
    /// Return human name of the codec profile, like "Baseline" or "High".
    pub fn codec_name(&self) -> &'static str {
        match self.profile_indication {
            0x2c => "AVC CAVLC 4:4:4",
            0x42 => "AVC Baseline",
            0x4d => "AVC Main",
            0x58 => "AVC Extended",
            0x64 => "AVC High",
            0x6e => "AVC High 10",
            0x7a => "AVC High 4:2:2",
            0xf4 => "AVC High 4:4:4",
            _ => "AVC",
        }
    }

    /// Return codec id as avc1.4d401f
    pub fn codec_id(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile_indication, self.profile_compatibility, self.level_indication
        )
    }

    /// All parameter sets as one Annex-B byte stream (SPS then PPS).
    pub fn to_annex_b(&self) -> Vec<u8> {
        let mut v = Vec::new();
        for nal in self.sps.iter().chain(self.pps.iter()) {
            v.extend_from_slice(&[0, 0, 0, 1]);
            v.extend_from_slice(nal);
        }
        v
    }
}

impl FromBytes for AvcDecoderConfigurationRecord {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<AvcDecoderConfigurationRecord> {
        let configuration_version = u8::from_bytes(stream)?;
        let profile_indication = u8::from_bytes(stream)?;
        let profile_compatibility = u8::from_bytes(stream)?;
        let level_indication = u8::from_bytes(stream)?;
        let length_size_minus_one = u8::from_bytes(stream)? & 0x3;

        let num_sps = u8::from_bytes(stream)? & 0x1f;
        let mut sps = Vec::new();
        for _ in 0..num_sps {
            let len = u16::from_bytes(stream)? as u64;
            sps.push(stream.read(len)?.to_vec());
        }
        let num_pps = u8::from_bytes(stream)?;
        let mut pps = Vec::new();
        for _ in 0..num_pps {
            let len = u16::from_bytes(stream)? as u64;
            pps.push(stream.read(len)?.to_vec());
        }
        // High profile records carry chroma format and SPS extensions.
        let extensions = stream.read(stream.left())?.to_vec();

        Ok(AvcDecoderConfigurationRecord {
            configuration_version,
            profile_indication,
            profile_compatibility,
            level_indication,
            length_size_minus_one,
            sps,
            pps,
            extensions,
        })
    }
    fn min_size() -> usize {
        7
    }
}

impl ToBytes for AvcDecoderConfigurationRecord {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        self.configuration_version.to_bytes(stream)?;
        self.profile_indication.to_bytes(stream)?;
        self.profile_compatibility.to_bytes(stream)?;
        self.level_indication.to_bytes(stream)?;
        (0xfc | (self.length_size_minus_one & 0x3)).to_bytes(stream)?;
        (0xe0 | (self.sps.len() as u8 & 0x1f)).to_bytes(stream)?;
        for nal in &self.sps {
            (nal.len() as u16).to_bytes(stream)?;
            stream.write(nal)?;
        }
        (self.pps.len() as u8).to_bytes(stream)?;
        for nal in &self.pps {
            (nal.len() as u16).to_bytes(stream)?;
            stream.write(nal)?;
        }
        stream.write(&self.extensions)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn avcc_round_trip() {
        let rec = AvcDecoderConfigurationRecord {
            configuration_version: 1,
            profile_indication: 0x42,
            profile_compatibility: 0xc0,
            level_indication: 0x1f,
            length_size_minus_one: 3,
            sps: vec![vec![0x67, 1, 2, 3]],
            pps: vec![vec![0x68, 4, 5]],
            extensions: Vec::new(),
        };
        let b = AvcConfigurationBox { configuration: rec };
        let mut buf = MemBuffer::new();
        b.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        let mut rdr = SliceReader::new(&v);
        let back = AvcConfigurationBox::from_bytes(&mut rdr).unwrap();
        assert_eq!(back.configuration.sps, b.configuration.sps);
        assert_eq!(back.configuration.pps, b.configuration.pps);
        assert_eq!(back.configuration.codec_id(), "avc1.42c01f");
        assert_eq!(
            back.configuration.to_annex_b(),
            vec![0, 0, 0, 1, 0x67, 1, 2, 3, 0, 0, 0, 1, 0x68, 4, 5]
        );
    }
}
