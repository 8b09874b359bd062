//! 8.2.1 Movie Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{MovieHeaderBox, TrackBox};

def_box! {
    /// The moov box is a container for the movie header and the tracks.
    #[derive(Default)]
    MovieBox {
        boxes:      Vec<HeifBox>,
    },
    fourcc => b"moov",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl MovieBox {
    declare_box_methods!(MovieHeaderBox, movie_header, movie_header_mut);

    /// Get a list of all tracks.
    pub fn tracks(&self) -> Vec<&TrackBox> {
        iter_box!(self, TrackBox).collect()
    }

    /// Find a track by track id.
    pub fn track_by_id(&self, track_id: u32) -> Option<&TrackBox> {
        iter_box!(self, TrackBox).find(|t| t.track_id() == track_id)
    }

    /// Check if this MovieBox is valid (has header and at least one track).
    pub fn is_valid(&self) -> bool {
        let mut valid = true;
        if first_box!(&self.boxes, MovieHeaderBox).is_none() {
            log::error!("MovieBox: no MovieHeaderBox present");
            valid = false;
        }
        if self.tracks().is_empty() {
            log::error!("MovieBox: no TrackBox present");
            valid = false;
        }
        valid
    }
}
