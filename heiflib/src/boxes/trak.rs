//! 8.3.1 Track Box (ISO/IEC 14496-12:2015(E)) and its containers.
use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{
    EditBox, EditListBox, HandlerBox, MediaHeaderBox, SampleTableBox, TrackHeaderBox,
    TrackReferenceBox,
};

def_box! {
    TrackBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"trak",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl TrackBox {
    declare_box_methods!(TrackHeaderBox, track_header, track_header_mut);
    declare_box_methods!(MediaBox, media, media_mut);
    declare_box_methods_opt!(TrackReferenceBox, track_reference, track_reference_mut);

    /// Get the track id.
    pub fn track_id(&self) -> u32 {
        self.track_header().track_id
    }

    /// The handler type of the media ('pict', 'vide', 'meta', ...).
    pub fn handler_type(&self) -> Option<FourCC> {
        first_box!(&self.media().boxes, HandlerBox).map(|h| h.handler_type)
    }

    /// Get the edit list, if it is present and has at least one entry.
    pub fn edit_list(&self) -> Option<&EditListBox> {
        if let Some(edts) = first_box!(&self.boxes, EditBox) {
            if let Some(elst) = edts.boxes.iter().next() {
                if elst.entries.len() > 0 {
                    return Some(&elst);
                }
            }
        }
        None
    }

    /// Check if this track is valid (has header and media boxes).
    pub fn is_valid(&self) -> bool {
        let mut valid = true;
        let track_id = match first_box!(&self.boxes, TrackHeaderBox) {
            Some(th) => th.track_id,
            None => {
                log::error!("TrackBox: no TrackHeaderBox present");
                return false;
            },
        };

        match first_box!(&self.boxes, MediaBox) {
            Some(m) => {
                if !m.is_valid() {
                    valid = false;
                }
            },
            None => {
                log::error!("TrackBox(id {}): no MediaBox present", track_id);
                valid = false;
            },
        }

        valid
    }
}

def_box! {
    /// 8.4.1 Media Box.
    MediaBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"mdia",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl MediaBox {
    declare_box_methods!(MediaHeaderBox, media_header, media_header_mut);
    declare_box_methods!(MediaInformationBox, media_info, media_info_mut);
    declare_box_methods_opt!(HandlerBox, handler, handler_mut);

    pub fn is_valid(&self) -> bool {
        let mut valid = true;
        if first_box!(&self.boxes, MediaHeaderBox).is_none() {
            log::error!("MediaBox: no MediaHeaderBox present");
            valid = false;
        }
        if first_box!(&self.boxes, MediaInformationBox).is_none() {
            log::error!("MediaBox: no MediaInformationBox present");
            valid = false;
        }
        valid
    }
}

def_box! {
    /// 8.4.4 Media Information Box.
    MediaInformationBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"minf",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl MediaInformationBox {
    declare_box_methods!(SampleTableBox, sample_table, sample_table_mut);
}
