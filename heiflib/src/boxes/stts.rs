//! 8.6.1.2 Time To Sample Box (ISO/IEC 14496-12:2015(E))
use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 'stts': run length encoded sample durations.
    #[derive(Default)]
    TimeToSampleBox {
        entries:    ArraySized32<TimeToSampleEntry>,
    },
    fourcc => b"stts",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_struct! {
    #[derive(Copy)]
    TimeToSampleEntry,
        count:  u32,
        delta:  u32,
}

impl TimeToSampleBox {
    /// Total number of samples, with an overflow guard.
    pub fn sample_count(&self) -> io::Result<u32> {
        let mut total: u64 = 0;
        for e in &self.entries {
            total += e.count as u64;
            if total >= u32::MAX as u64 {
                return Err(ioerr!(InvalidData, "stts: sample count overflow"));
            }
        }
        Ok(total as u32)
    }

    /// Expand into per-sample decode timestamps (cumulative deltas).
    pub fn sample_times(&self) -> io::Result<Vec<u64>> {
        let count = self.sample_count()? as usize;
        let mut v = Vec::with_capacity(count);
        let mut t = 0u64;
        for e in &self.entries {
            for _ in 0..e.count {
                v.push(t);
                t += e.delta as u64;
            }
        }
        Ok(v)
    }

    /// Per-sample durations.
    pub fn sample_deltas(&self) -> io::Result<Vec<u32>> {
        let count = self.sample_count()? as usize;
        let mut v = Vec::with_capacity(count);
        for e in &self.entries {
            for _ in 0..e.count {
                v.push(e.delta);
            }
        }
        Ok(v)
    }

    /// The duration of the last sample.
    pub fn last_sample_duration(&self) -> u32 {
        self.entries.last().map(|e| e.delta).unwrap_or(0)
    }

    /// Append one sample of the given duration, merging runs.
    pub fn push(&mut self, delta: u32) {
        if let Some(last) = self.entries.last_mut() {
            if last.delta == delta {
                last.count += 1;
                return;
            }
        }
        self.entries.push(TimeToSampleEntry { count: 1, delta });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stts_expansion() {
        let mut stts = TimeToSampleBox::default();
        stts.push(100);
        stts.push(100);
        stts.push(50);
        assert_eq!(stts.entries.len(), 2);
        assert_eq!(stts.sample_count().unwrap(), 3);
        assert_eq!(stts.sample_times().unwrap(), vec![0, 100, 200]);
        assert_eq!(stts.sample_deltas().unwrap(), vec![100, 100, 50]);
        assert_eq!(stts.last_sample_duration(), 50);
    }
}
