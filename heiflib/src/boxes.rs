//! All the boxes we know.
//!
//! This module does not only contain boxes, but also the types
//! that are used in the boxes, and helper types like iterators.
//!
use std::fmt::Debug;
use std::io;

pub(crate) mod misc;
pub(crate) mod prelude;

pub use self::misc::*;
use self::prelude::*;

use crate::isobox::GenericBox;

def_boxes! {
    // Sample entries and decoder configuration records.
    AvcSampleEntry, b"avc1" => avc1;
    Avc3SampleEntry, b"avc3";
    AvcConfigurationBox, b"avcC";

    HevcSampleEntry, b"hvc1" => hvc1;
    Hev1SampleEntry, b"hev1";
    HevcConfigurationBox, b"hvcC";

    LhevcSampleEntry, b"lhv1" => lhv1;
    Lhe1SampleEntry, b"lhe1";
    LhevcConfigurationBox, b"lhvC";
    OperatingPointsInformationProperty, b"oinf";

    MetadataSampleEntry, b"mett" => mett;
    TextMetadataSampleEntry, b"tmet";
    XmlMetadataSampleEntry, b"metx";

    // The item side of a HEIF file.
    MetaBox, b"meta" => meta;
    PrimaryItemBox, b"pitm";
    ItemDataBox, b"idat";
    GroupsListBox, b"grpl";
    EntityToGroupBox, b"altr";

    ItemInfoBox, b"iinf" => iinf;
    ItemInfoEntry, b"infe";
    ItemLocationBox, b"iloc" => iloc;
    ItemReferenceBox, b"iref" => iref;
    ItemProtectionBox, b"ipro";

    ItemPropertiesBox, b"iprp" => iprp;
    ItemPropertyContainerBox, b"ipco";
    ItemPropertyAssociationBox, b"ipma";
    ImageSpatialExtentsProperty, b"ispe";
    ImageRotationProperty, b"irot";
    ImageMirrorProperty, b"imir";
    CleanApertureBox, b"clap";
    AuxiliaryTypeProperty, b"auxC";
    RelativeLocationProperty, b"rloc";
    LayerSelectorProperty, b"lsel";
    TargetOlsProperty, b"tols";

    // The track side.
    MovieBox, b"moov" => moov;
    TrackBox, b"trak" => trak;
    MediaBox, b"mdia";
    MediaInformationBox, b"minf";
    TrackReferenceBox, b"tref" => tref;
    EditBox, b"edts" => edts;
    EditListBox, b"elst";

    MediaDataBox, b"mdat" => mdat;

    MovieFragmentBox, b"moof" => moof;
    TrackFragmentBox, b"traf";
    TrackFragmentHeaderBox, b"tfhd";
    TrackRunBox, b"trun";

    SampleTableBox, b"stbl" => stbl;
    SampleDescriptionBox, b"stsd" => stsd;
    TimeToSampleBox, b"stts" => stts;
    CompositionOffsetBox, b"ctts" => ctts;
    CompositionToDecodeBox, b"cslg";
    SampleToChunkBox, b"stsc" => stsc;
    ChunkOffsetBox, b"stco" => stco;
    ChunkLargeOffsetBox, b"co64";
    SampleSizeBox, b"stsz" => stsz;
    CompactSampleSizeBox, b"stz2";
    SyncSampleBox, b"stss" => stss;
    SampleToGroupBox, b"sbgp" => sbgp;
    SampleGroupDescriptionBox, b"sgpd" => sgpd;

    // Simple boxes, defined in misc.rs.
    CodingConstraintsBox, b"ccst";
    DataEntryUrlBox, b"url ";
    DataEntryUrnBox, b"urn ";
    DataInformationBox, b"dinf";
    DataReferenceBox, b"dref";
    FileTypeBox, b"ftyp";
    FreeBox, b"free";
    HandlerBox, b"hdlr";
    MediaHeaderBox, b"mdhd";
    MovieExtendsBox, b"mvex";
    MovieExtendsHeaderBox, b"mehd";
    MovieFragmentHeaderBox, b"mfhd";
    MovieHeaderBox, b"mvhd";
    NullMediaHeaderBox, b"nmhd";
    TrackExtendsBox, b"trex";
    TrackFragmentBaseMediaDecodeTimeBox, b"tfdt";
    TrackHeaderBox, b"tkhd";
    UserDataBox, b"udta";
    VideoMediaHeaderBox, b"vmhd";
}
