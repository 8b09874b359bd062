//! 8.7.4 Sample To Chunk Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 'stsc': maps samples to chunks, run length encoded.
    #[derive(Default)]
    SampleToChunkBox {
        entries:    ArraySized32<SampleToChunkEntry>,
    },
    fourcc => b"stsc",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_struct! {
    #[derive(Copy)]
    SampleToChunkEntry,
        first_chunk:                u32,
        samples_per_chunk:          u32,
        sample_description_index:   u32,
}

/// Chunk placement of one sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleChunkInfo {
    /// 1-based chunk number.
    pub chunk: u32,
    /// 1-based number of the first sample of that chunk.
    pub first_sample: u32,
    /// Index into the sample description box.
    pub sample_description_index: u32,
}

impl SampleToChunkBox {
    /// Decode the run-length table into per-sample chunk info, given the
    /// total number of samples and chunks.
    ///
    /// The per-sample vector is built lazily by the caller when needed;
    /// this iterator form avoids materializing it for simple walks.
    pub fn iter_samples<'a>(&'a self, chunk_count: u32) -> SampleToChunkIterator<'a> {
        SampleToChunkIterator {
            entries: &self.entries,
            chunk_count,
            entry: 0,
            chunk: 0,
            sample_in_chunk: 0,
            first_sample_of_chunk: 1,
            sample: 1,
        }
    }
}

/// Yields a `SampleChunkInfo` per sample.
#[derive(Clone)]
pub struct SampleToChunkIterator<'a> {
    entries: &'a [SampleToChunkEntry],
    chunk_count: u32,
    entry: usize,
    chunk: u32,
    sample_in_chunk: u32,
    first_sample_of_chunk: u32,
    sample: u32,
}

impl<'a> Iterator for SampleToChunkIterator<'a> {
    type Item = SampleChunkInfo;

    fn next(&mut self) -> Option<SampleChunkInfo> {
        if self.entries.is_empty() {
            return None;
        }
        if self.chunk == 0 {
            // start at the first chunk.
            self.chunk = self.entries[0].first_chunk;
            self.sample_in_chunk = 0;
        }
        loop {
            let e = &self.entries[self.entry];
            if self.sample_in_chunk < e.samples_per_chunk {
                self.sample_in_chunk += 1;
                self.sample += 1;
                return Some(SampleChunkInfo {
                    chunk: self.chunk,
                    first_sample: self.first_sample_of_chunk,
                    sample_description_index: e.sample_description_index,
                });
            }
            // next chunk.
            if self.chunk >= self.chunk_count {
                return None;
            }
            self.chunk += 1;
            self.sample_in_chunk = 0;
            self.first_sample_of_chunk = self.sample;
            if self.entry + 1 < self.entries.len()
                && self.entries[self.entry + 1].first_chunk <= self.chunk
            {
                self.entry += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stsc_run_length_walk() {
        let mut stsc = SampleToChunkBox::default();
        // chunks 1-2 carry 2 samples each, chunk 3 and later 1 sample.
        stsc.entries.push(SampleToChunkEntry {
            first_chunk: 1,
            samples_per_chunk: 2,
            sample_description_index: 1,
        });
        stsc.entries.push(SampleToChunkEntry {
            first_chunk: 3,
            samples_per_chunk: 1,
            sample_description_index: 1,
        });
        let chunks: Vec<u32> = stsc.iter_samples(4).map(|s| s.chunk).collect();
        assert_eq!(chunks, vec![1, 1, 2, 2, 3, 4]);
        let firsts: Vec<u32> = stsc.iter_samples(4).map(|s| s.first_sample).collect();
        assert_eq!(firsts, vec![1, 1, 3, 3, 5, 6]);
    }
}
