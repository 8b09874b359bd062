//! The presentation timeline solver.
//!
//! Composites a time-to-sample table, an optional composition offset
//! table and an optional edit list into a monotonic map from movie
//! presentation time to sample index.
//!
//! All map keys are in media timescale units; an edit list's
//! segment durations (movie timescale) are converted as they are
//! applied.
use std::io;

use crate::boxes::{CompositionOffsetBox, EditListEntry, TimeToSampleBox, TrackRunBox};

/// Presentation map builder for one track (or track fragment run).
#[derive(Default)]
pub struct Timeline {
    edit_list: Vec<EditListEntry>,
    has_edit_list: bool,
    movie_timescale: u32,
    media_timescale: u32,
    media_pts: Vec<(i64, u64)>,
    movie_pts: Vec<(u64, u64)>,
    movie_offset: u64,
    media_offset: i64,
    last_sample_duration: u64,
    sample_base: u64,
}

impl Timeline {
    pub fn new() -> Timeline {
        Timeline::default()
    }

    /// Load the stts (+ optional ctts) tables.
    pub fn load_sample_times(
        &mut self,
        stts: &TimeToSampleBox,
        ctts: Option<&CompositionOffsetBox>,
    ) -> io::Result<()> {
        let dts = stts.sample_times()?;
        self.last_sample_duration = stts.last_sample_duration() as u64;
        let offsets = ctts.map(|c| c.sample_offsets());
        if let Some(offsets) = offsets.as_ref() {
            if offsets.len() != dts.len() {
                return Err(ioerr!(
                    InvalidData,
                    "ctts entries ({}) do not cover the sample count ({})",
                    offsets.len(),
                    dts.len()
                ));
            }
        }
        for (i, &t) in dts.iter().enumerate() {
            let pts = t as i64 + offsets.as_ref().map(|o| o[i] as i64).unwrap_or(0);
            self.media_pts.push((pts, self.sample_base + i as u64));
        }
        self.sample_base += dts.len() as u64;
        self.media_pts.sort_by_key(|&(pts, id)| (pts, id));
        Ok(())
    }

    /// Load samples of a track fragment run instead of stts/ctts.
    pub fn load_track_run(&mut self, trun: &TrackRunBox, default_duration: u32) -> io::Result<()> {
        let mut t = 0i64;
        let mut last = default_duration as u64;
        for (i, e) in trun.entries.iter().enumerate() {
            let pts = t + e.composition_time_offset.unwrap_or(0);
            self.media_pts.push((pts, self.sample_base + i as u64));
            let dur = e.duration.unwrap_or(default_duration) as u64;
            t += dur as i64;
            last = dur;
        }
        self.sample_base += trun.entries.len() as u64;
        self.last_sample_duration = last;
        self.media_pts.sort_by_key(|&(pts, id)| (pts, id));
        Ok(())
    }

    /// Attach an edit list with the two timescales it converts between.
    pub fn load_edit_list(&mut self, entries: &[EditListEntry], movie_timescale: u32, media_timescale: u32) {
        self.edit_list = entries.to_vec();
        self.has_edit_list = !entries.is_empty();
        self.movie_timescale = movie_timescale;
        self.media_timescale = media_timescale;
    }

    fn from_movie_to_media_ts(&self, movie_ts: u64) -> u64 {
        if self.movie_timescale != 0 {
            movie_ts * self.media_timescale as u64 / self.movie_timescale as u64
        } else {
            movie_ts
        }
    }

    /// Resolve the map: apply the edit list, or shift by `pts_offset`
    /// (base media decode time for fragments).
    pub fn unravel(&mut self, pts_offset: u64) -> io::Result<()> {
        if self.media_pts.is_empty() {
            return Ok(());
        }
        if self.has_edit_list {
            self.media_offset = pts_offset as i64;
            let entries = std::mem::take(&mut self.edit_list);
            for entry in &entries {
                self.apply_edit(entry);
            }
            self.edit_list = entries;
        } else {
            for &(pts, id) in &self.media_pts {
                let pts = std::cmp::max(pts, 0) as u64 + pts_offset;
                self.movie_pts.push((pts, id));
            }
            self.movie_offset = self
                .movie_pts
                .last()
                .map(|&(pts, _)| pts + self.last_sample_duration)
                .unwrap_or(0);
        }
        Ok(())
    }

    fn apply_edit(&mut self, entry: &EditListEntry) {
        if entry.media_time == -1 {
            self.apply_empty_edit(entry);
        }
        if entry.media_rate_integer == 0 && entry.media_rate_fraction == 0 {
            self.apply_dwell_edit(entry);
        }
        if entry.media_time >= 0
            && (entry.media_rate_integer == 1
                || (entry.media_rate_integer == 0 && entry.media_rate_fraction > 0))
        {
            self.apply_shift_edit_forward(entry);
        }
        if entry.media_time >= 0 && entry.media_rate_integer == -1 {
            self.apply_shift_edit_reverse(entry);
        }
    }

    fn apply_empty_edit(&mut self, entry: &EditListEntry) {
        self.movie_offset += self.from_movie_to_media_ts(entry.segment_duration);
    }

    fn apply_dwell_edit(&mut self, entry: &EditListEntry) {
        // the sample whose media time range contains the edit point.
        let pos = self.media_pts.iter().position(|&(pts, _)| pts >= entry.media_time);
        let sample = match pos {
            Some(i) if self.media_pts[i].0 == entry.media_time => Some(self.media_pts[i].1),
            Some(0) => None,
            Some(i) => Some(self.media_pts[i - 1].1),
            None => None,
        };
        if let Some(sample) = sample {
            self.movie_pts.push((self.movie_offset, sample));
            self.movie_offset += self.from_movie_to_media_ts(entry.segment_duration);
        }
    }

    fn apply_shift_edit_forward(&mut self, entry: &EditListEntry) {
        // A fractional rate (0, f) scales each sample's duration by
        // 32768 / f.
        let sample_time_ratio = if entry.media_rate_integer == 1 {
            1.0
        } else {
            (i16::MAX as f64 + 1.0) / entry.media_rate_fraction as f64
        };

        let segment_begin = entry.media_time;
        let segment_end = if entry.segment_duration != 0 {
            entry.media_time
                + self.from_movie_to_media_ts(
                    (entry.segment_duration as f64 / sample_time_ratio) as u64,
                ) as i64
        } else {
            i64::MAX
        };

        let mut last_inserted_t1 = segment_begin;

        for i in 0..self.media_pts.len() {
            let sample_duration = if i + 1 == self.media_pts.len() {
                self.last_sample_duration as i64
            } else {
                self.media_pts[i + 1].0 - self.media_pts[i].0
            };
            let sample_id = self.media_pts[i].1;
            let t0 = self.media_pts[i].0 + self.media_offset;
            let t1 = t0 + sample_duration;

            if t0 >= segment_begin {
                if t0 < segment_end {
                    self.movie_offset += (sample_time_ratio * (t0 - last_inserted_t1) as f64) as u64;
                    self.movie_pts.push((self.movie_offset, sample_id));
                    let inserted_duration;
                    if t1 <= segment_end {
                        inserted_duration = sample_duration;
                        last_inserted_t1 = t1;
                    } else {
                        // cut from the end
                        inserted_duration = segment_end - t0;
                        last_inserted_t1 = segment_end;
                    }
                    self.movie_offset += (sample_time_ratio * inserted_duration as f64) as u64;
                }
            } else if t1 > segment_begin {
                self.movie_offset +=
                    (sample_time_ratio * (segment_begin - last_inserted_t1) as f64) as u64;
                self.movie_pts.push((self.movie_offset, sample_id));
                let inserted_duration;
                if t1 >= segment_end {
                    inserted_duration = segment_end - segment_begin;
                    last_inserted_t1 = segment_end;
                } else {
                    inserted_duration = t1 - segment_begin;
                    last_inserted_t1 = t1;
                }
                self.movie_offset += (sample_time_ratio * inserted_duration as f64) as u64;
            }
        }
        if entry.segment_duration != 0 {
            // gap between the last inserted sample and the segment end.
            self.movie_offset += (sample_time_ratio * (segment_end - last_inserted_t1) as f64) as u64;
        }
    }

    fn apply_shift_edit_reverse(&mut self, entry: &EditListEntry) {
        let mut segment_begin = entry.media_time;
        let mut segment_end = i64::MAX;
        let mut last_inserted_t0 = segment_begin;
        if entry.segment_duration != 0 {
            segment_end = entry.media_time;
            segment_begin =
                entry.media_time - self.from_movie_to_media_ts(entry.segment_duration) as i64;
            last_inserted_t0 = segment_end;
        } else if let Some(&(last_pts, _)) = self.media_pts.last() {
            last_inserted_t0 = last_pts + self.last_sample_duration as i64;
        }

        for i in (0..self.media_pts.len()).rev() {
            let sample_duration = if i + 1 == self.media_pts.len() {
                self.last_sample_duration as i64
            } else {
                self.media_pts[i + 1].0 - self.media_pts[i].0
            };
            let sample_id = self.media_pts[i].1;
            let t0 = self.media_pts[i].0 + self.media_offset;
            let t1 = t0 + sample_duration;

            if t0 >= segment_begin {
                if t0 < segment_end {
                    self.movie_pts.push((self.movie_offset, sample_id));
                    let inserted_duration;
                    if t1 <= segment_end {
                        inserted_duration = sample_duration;
                        self.movie_offset += (last_inserted_t0 - t1) as u64;
                    } else {
                        inserted_duration = segment_end - t0;
                        self.movie_offset += (last_inserted_t0 - segment_end) as u64;
                    }
                    last_inserted_t0 = t0;
                    self.movie_offset += inserted_duration as u64;
                }
            } else if t1 > segment_begin {
                self.movie_pts.push((self.movie_offset, sample_id));
                let inserted_duration;
                if t1 >= segment_end {
                    self.movie_offset += (last_inserted_t0 - segment_end) as u64;
                    inserted_duration = segment_end - segment_begin;
                } else {
                    self.movie_offset += (last_inserted_t0 - t1) as u64;
                    inserted_duration = t1 - segment_begin;
                }
                last_inserted_t0 = segment_begin;
                self.movie_offset += inserted_duration as u64;
            }
        }
        if entry.segment_duration != 0 {
            self.movie_offset += (last_inserted_t0 - segment_begin) as u64;
        }
    }

    /// The resolved movie-time-to-sample map, keys in media timescale.
    pub fn time_map_ts(&self) -> &[(u64, u64)] {
        &self.movie_pts
    }

    /// The map scaled to milliseconds.
    pub fn time_map_ms(&self, timescale: u32) -> io::Result<Vec<(u64, u64)>> {
        if timescale == 0 {
            return Err(ioerr!(InvalidData, "timeline: timescale is zero"));
        }
        Ok(self
            .movie_pts
            .iter()
            .map(|&(ts, id)| (ts * 1000 / timescale as u64, id))
            .collect())
    }

    /// Total presentation span, media timescale units.
    pub fn span(&self) -> u64 {
        self.movie_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stts_of(durations: &[u32]) -> TimeToSampleBox {
        let mut stts = TimeToSampleBox::default();
        for &d in durations {
            stts.push(d);
        }
        stts
    }

    fn edit(duration: u64, media_time: i64, rate_int: i16, rate_frac: i16) -> EditListEntry {
        EditListEntry {
            segment_duration: duration,
            media_time,
            media_rate_integer: rate_int,
            media_rate_fraction: rate_frac,
        }
    }

    #[test]
    fn no_edit_list_is_identity() {
        let mut tl = Timeline::new();
        tl.load_sample_times(&stts_of(&[100, 100, 100]), None).unwrap();
        tl.unravel(0).unwrap();
        assert_eq!(tl.time_map_ts(), &[(0, 0), (100, 1), (200, 2)]);
        assert_eq!(tl.span(), 300);
        assert_eq!(
            tl.time_map_ms(1000).unwrap(),
            vec![(0, 0), (100, 1), (200, 2)]
        );
    }

    #[test]
    fn ctts_reorders_samples() {
        let mut tl = Timeline::new();
        let mut ctts = CompositionOffsetBox::default();
        // decode order 0,1,2 -> presentation order 0,2,1
        ctts.push(0);
        ctts.push(200);
        ctts.push(0);
        tl.load_sample_times(&stts_of(&[100, 100, 100]), Some(&ctts)).unwrap();
        tl.unravel(0).unwrap();
        assert_eq!(tl.time_map_ts(), &[(0, 0), (200, 2), (300, 1)]);
    }

    #[test]
    fn empty_then_forward_edit() {
        // media/movie timescale 1000, 10 samples of 100 each.
        // empty 500, then 300 starting at media time 200.
        let mut tl = Timeline::new();
        tl.load_sample_times(&stts_of(&[100; 10]), None).unwrap();
        tl.load_edit_list(
            &[edit(500, -1, 1, 0), edit(300, 200, 1, 0)],
            1000,
            1000,
        );
        tl.unravel(0).unwrap();
        assert_eq!(tl.time_map_ts(), &[(500, 2), (600, 3), (700, 4)]);
        assert_eq!(tl.span(), 800);
    }

    #[test]
    fn dwell_edit_emits_one_sample() {
        let mut tl = Timeline::new();
        tl.load_sample_times(&stts_of(&[100; 4]), None).unwrap();
        tl.load_edit_list(&[edit(250, 100, 0, 0), edit(0, 0, 1, 0)], 1000, 1000);
        tl.unravel(0).unwrap();
        // the dwell pins sample 1 at 0 for 250, then the whole
        // media plays from 250.
        assert_eq!(tl.time_map_ts()[0], (0, 1));
        assert_eq!(tl.time_map_ts()[1], (250, 0));
        assert_eq!(tl.time_map_ts()[2], (350, 1));
        assert_eq!(tl.span(), 250 + 400);
    }

    #[test]
    fn reverse_edit_reverses_sample_order() {
        let mut tl = Timeline::new();
        tl.load_sample_times(&stts_of(&[100; 4]), None).unwrap();
        tl.load_edit_list(&[edit(400, 400, -1, 0)], 1000, 1000);
        tl.unravel(0).unwrap();
        // samples come out 3,2,1,0 with increasing movie timestamps.
        let map = tl.time_map_ts();
        assert_eq!(map.len(), 4);
        let ids: Vec<u64> = map.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![3, 2, 1, 0]);
        let mut times: Vec<u64> = map.iter().map(|&(t, _)| t).collect();
        let sorted = {
            let mut s = times.clone();
            s.sort();
            s
        };
        assert_eq!(times, sorted);
        times.dedup();
        assert_eq!(times.len(), 4);
        assert_eq!(tl.span(), 400);
    }

    #[test]
    fn timescale_conversion_in_edits() {
        // movie timescale 1000, media timescale 90000.
        let mut tl = Timeline::new();
        tl.load_sample_times(&stts_of(&[9000; 10]), None).unwrap();
        tl.load_edit_list(&[edit(500, 0, 1, 0)], 1000, 90000);
        tl.unravel(0).unwrap();
        // 500 movie units = 45000 media units = 5 samples.
        assert_eq!(tl.time_map_ts().len(), 5);
        assert_eq!(tl.span(), 45000);
    }

    #[test]
    fn fractional_forward_rate_scales_durations() {
        // rate (0, 16384) = half speed: durations double.
        let mut tl = Timeline::new();
        tl.load_sample_times(&stts_of(&[100; 4]), None).unwrap();
        tl.load_edit_list(&[edit(0, 0, 0, 16384)], 1000, 1000);
        tl.unravel(0).unwrap();
        let map = tl.time_map_ts();
        assert_eq!(map[0], (0, 0));
        assert_eq!(map[1], (200, 1));
        assert_eq!(map[2], (400, 2));
        assert_eq!(tl.span(), 800);
    }
}
