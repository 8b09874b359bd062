use std::io;

use crate::boxes::prelude::*;

def_box! {
    FileTypeBox {
        major_brand:        FourCC,
        minor_version:      u32,
        compatible_brands:  Vec<FourCC>,
    },
    fourcc => b"ftyp",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl FileTypeBox {
    /// Does the compatible brand list contain `brand`?
    pub fn compatible_with(&self, brand: &FourCC) -> bool {
        self.major_brand == *brand || self.compatible_brands.iter().any(|b| b == brand)
    }
}

def_box! {
    /// 8.4.3 Handler Reference Box (ISO/IEC 14496-12:2015(E))
    HandlerBox {
        skip:           4,
        handler_type:   FourCC,
        skip:           12,
        name:           ZString,
    },
    fourcc => b"hdlr",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    MediaHeaderBox {
        cr_time:    Time,
        mod_time:   Time,
        timescale:  u32,
        duration:   Duration_,
        language:   IsoLanguageCode,
        quality:    u16,
    },
    fourcc => b"mdhd",
    version => [1, cr_time, mod_time, duration],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    MovieHeaderBox {
        cr_time:    Time,
        mod_time:   Time,
        timescale:  u32,
        duration:   Duration_,
        pref_rate:  FixedFloat16_16,
        pref_vol:   FixedFloat8_8,
        skip:       10,
        matrix:     Matrix,
        skip:       24,
        next_track_id: u32,
    },
    fourcc => b"mvhd",
    version => [1, cr_time, mod_time, duration],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl Default for MovieHeaderBox {
    fn default() -> MovieHeaderBox {
        MovieHeaderBox {
            cr_time: Time(0),
            mod_time: Time(0),
            timescale: 1000,
            duration: Duration_(0),
            pref_rate: FixedFloat16_16(0x10000),
            pref_vol: FixedFloat8_8(0x100),
            matrix: Matrix::default(),
            next_track_id: 1,
        }
    }
}

def_box! {
    /// 8.3.2 Track Header Box (ISO/IEC 14496-12:2015(E))
    ///
    /// Flags: bit 0: track_enabled, bit 1: track_in_movie, bit 2: track_in_preview.
    TrackHeaderBox {
        flags:      Flags,
        cr_time:    Time,
        mod_time:   Time,
        track_id:   u32,
        skip:       4,
        duration:   Duration_,
        skip:       8,
        layer:      u16,
        alternate_group: u16,
        volume:     FixedFloat8_8,
        skip:       2,
        matrix:     Matrix,
        width:      FixedFloat16_16,
        height:     FixedFloat16_16,
    },
    fourcc => b"tkhd",
    version => [1, cr_time, mod_time, duration, flags],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl TrackHeaderBox {
    pub fn enabled(&self) -> bool {
        self.flags.get(0)
    }
    pub fn in_movie(&self) -> bool {
        self.flags.get(1)
    }
}

impl Default for TrackHeaderBox {
    fn default() -> TrackHeaderBox {
        TrackHeaderBox {
            flags: Flags(3),
            cr_time: Time(0),
            mod_time: Time(0),
            track_id: 1,
            duration: Duration_(0),
            layer: 0,
            alternate_group: 0,
            volume: FixedFloat8_8(0),
            matrix: Matrix::default(),
            width: FixedFloat16_16(0),
            height: FixedFloat16_16(0),
        }
    }
}

def_box! {
    #[derive(Default)]
    VideoMediaHeaderBox {
        flags:          Flags,
        graphics_mode:  u16,
        opcolor_r:      u16,
        opcolor_g:      u16,
        opcolor_b:      u16,
    },
    fourcc => b"vmhd",
    version => [0, flags],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    #[derive(Default)]
    NullMediaHeaderBox {
    },
    fourcc => b"nmhd",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    UserDataBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"udta",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    #[derive(Default)]
    FreeBox {
        data:   Data,
    },
    fourcc => b"free",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    DataInformationBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"dinf",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl Default for DataInformationBox {
    fn default() -> DataInformationBox {
        // A dref with one self-contained url entry.
        let url = DataEntryUrlBox {
            flags: Flags(1),
            location: ZString::default(),
        };
        let dref = DataReferenceBox {
            entries: vec![url.to_heifbox()].into_iter().collect(),
        };
        DataInformationBox {
            boxes: vec![dref.to_heifbox()],
        }
    }
}

def_box! {
    DataReferenceBox {
        entries:    ArraySized32<HeifBox>,
    },
    fourcc => b"dref",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// Flags bit 0: media data is in the same file.
    DataEntryUrlBox {
        flags:      Flags,
        location:   ZString,
    },
    fourcc => b"url ",
    version => [0, flags],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    DataEntryUrnBox {
        flags:      Flags,
        name:       ZString,
        location:   ZString,
    },
    fourcc => b"urn ",
    version => [0, flags],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// Coding constraints for image sequence sample entries.
    CodingConstraintsBox {
        // 1 bit all_ref_pics_intra, 1 bit intra_pred_used,
        // 4 bits max_ref_per_pic, 26 reserved.
        packed: u32,
    },
    fourcc => b"ccst",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl CodingConstraintsBox {
    pub fn new(all_ref_pics_intra: bool, intra_pred_used: bool, max_ref_per_pic: u8) -> CodingConstraintsBox {
        let packed = ((all_ref_pics_intra as u32) << 31)
            | ((intra_pred_used as u32) << 30)
            | (((max_ref_per_pic & 0xf) as u32) << 26);
        CodingConstraintsBox { packed }
    }

    pub fn all_ref_pics_intra(&self) -> bool {
        self.packed & (1 << 31) != 0
    }
    pub fn intra_pred_used(&self) -> bool {
        self.packed & (1 << 30) != 0
    }
    pub fn max_ref_per_pic(&self) -> u8 {
        ((self.packed >> 26) & 0xf) as u8
    }
}

def_box! {
    MovieExtendsBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"mvex",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    MovieExtendsHeaderBox {
        fragment_duration:  Duration_,
    },
    fourcc => b"mehd",
    version => [1, fragment_duration],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    TrackExtendsBox {
        track_id:       u32,
        default_sample_description_index:   u32,
        default_sample_duration:    u32,
        default_sample_size:        u32,
        default_sample_flags:       u32,
    },
    fourcc => b"trex",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    MovieFragmentHeaderBox {
        sequence_number:    u32,
    },
    fourcc => b"mfhd",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    TrackFragmentBaseMediaDecodeTimeBox {
        base_media_decode_time: VersionSizedUint,
    },
    fourcc => b"tfdt",
    version => [1, base_media_decode_time],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}
