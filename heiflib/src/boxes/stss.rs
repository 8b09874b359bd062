//! 8.6.2 Sync Sample Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 'stss': 1-based numbers of the sync samples.
    ///
    /// Absence of this box means every sample is a sync sample.
    #[derive(Default)]
    SyncSampleBox {
        entries:    ArraySized32<u32>,
    },
    fourcc => b"stss",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl SyncSampleBox {
    /// Is sample `sample` (1-based) a sync sample?
    pub fn is_sync(&self, sample: u32) -> bool {
        self.entries.iter().any(|&s| s == sample)
    }

    /// Expand into a per-sample bool vector.
    pub fn sync_flags(&self, sample_count: u32) -> Vec<bool> {
        let mut v = vec![false; sample_count as usize];
        for &s in &self.entries {
            if s >= 1 && s <= sample_count {
                v[s as usize - 1] = true;
            }
        }
        v
    }
}
