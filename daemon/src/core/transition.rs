//! Transition detection and state-occurrence statistics.
//!
//! Two independent passes share the timeline: edge detection (finds new
//! transitions as the masked state changes) and statistics (tallies how
//! often the timeline passes through each endpoint of a known transition).
//! Each owns its own cursor since they run at different points in a tick
//! and must resume independently.

use super::image::{self, Image, Mask};
use super::state::StateRegistry;
use super::timeline::Timeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub src: usize,
    pub dst: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
pub struct TransitionRecorder {
    transitions: Vec<Transition>,
    scan_cursor: usize,
    stats_cursor: usize,
    period_precision_ms: u64,
}

impl TransitionRecorder {
    pub fn new(period_precision_ms: u64) -> Self {
        Self {
            transitions: Vec::new(),
            scan_cursor: 0,
            stats_cursor: 0,
            period_precision_ms,
        }
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    fn duplicates_existing(&self, src: usize, dst: usize, duration_ms: u64) -> bool {
        self.transitions
            .iter()
            .any(|t| t.src == src && t.dst == dst && t.duration_ms.abs_diff(duration_ms) <= self.period_precision_ms)
    }

    fn try_record(&mut self, src: usize, dst: usize, duration_ms: u64) {
        if src != dst && !self.duplicates_existing(src, dst, duration_ms) {
            self.transitions.push(Transition { src, dst, duration_ms });
        }
    }

    /// Scans `timeline[..up_to]` for new transitions, resuming from the
    /// cursor left by the previous call. If a change-point at `i` has no
    /// matching second change-point yet, the cursor stops at `i` rather
    /// than past it, so a later call (once the timeline has grown) can
    /// still resolve it.
    pub fn scan(&mut self, timeline: &Timeline, mask: &Mask, states: &StateRegistry, up_to: usize) {
        let up_to = up_to.min(timeline.len());
        let masked_at = |idx: usize| -> Image { image::masked(&timeline.get(idx).unwrap().image, mask) };

        let mut i = self.scan_cursor;
        loop {
            if i + 1 >= up_to {
                break;
            }
            if masked_at(i) == masked_at(i + 1) {
                i += 1;
                continue;
            }

            let mut k = i + 1;
            let mut resolved = None;
            while k + 2 < up_to {
                if masked_at(k + 1) != masked_at(k + 2) {
                    resolved = Some(k);
                    break;
                }
                k += 1;
            }

            match resolved {
                Some(k) => {
                    let src_sample = &timeline.get(i + 1).unwrap().image;
                    let dst_sample = &timeline.get(k + 2).unwrap().image;
                    if let (Some(src_id), Some(dst_id)) =
                        (states.find(src_sample, mask), states.find(dst_sample, mask))
                    {
                        let ts_src = timeline.get(i + 1).unwrap().timestamp_ns;
                        let ts_dst = timeline.get(k + 2).unwrap().timestamp_ns;
                        let duration_ms = (ts_dst - ts_src) / 1_000_000;
                        self.try_record(src_id, dst_id, duration_ms);
                    }
                    i = k + 1;
                }
                None => break,
            }
        }
        self.scan_cursor = i;
    }

    /// For every currently known transition, walks `timeline[..up_to]`
    /// pairwise from the stats cursor and increments both endpoint counts
    /// whenever a consecutive pair matches that transition's
    /// `(src, dst)` masked images. Deliberately double-counts interior
    /// states that sit on more than one transition.
    pub fn analyze_statistics(
        &mut self,
        timeline: &Timeline,
        mask: &Mask,
        states: &mut StateRegistry,
        up_to: usize,
    ) {
        let up_to = up_to.min(timeline.len());
        while self.stats_cursor + 1 < up_to {
            let a = image::masked(&timeline.get(self.stats_cursor).unwrap().image, mask);
            let b = image::masked(&timeline.get(self.stats_cursor + 1).unwrap().image, mask);

            for t in self.transitions.clone() {
                let src_image = states.state_at(t.src);
                let dst_image = states.state_at(t.dst);
                if let (Some(src_image), Some(dst_image)) = (src_image, dst_image) {
                    if &a == src_image && &b == dst_image {
                        states.increment(t.src);
                        states.increment(t.dst);
                    }
                }
            }
            self.stats_cursor += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timeline::Sample;

    fn mask_all() -> Mask {
        [0xFFu8; image::IMAGE_SIZE]
    }

    fn img(fill: u8) -> Image {
        [fill; image::IMAGE_SIZE]
    }

    fn build_ab_timeline(n_cycles: usize, step_ms: u64) -> Timeline {
        let mut t = Timeline::new();
        for k in 0..(n_cycles * 2) {
            let fill = if k % 2 == 0 { 1 } else { 2 };
            t.append(Sample { timestamp_ns: (k as u64) * step_ms * 1_000_000, image: img(fill) });
        }
        t
    }

    #[test]
    fn ab_alternation_yields_two_transitions() {
        let mask = mask_all();
        let t = build_ab_timeline(5, 200);

        let mut states = StateRegistry::new();
        let images: Vec<Image> = (0..t.len()).map(|i| t.get(i).unwrap().image).collect();
        states.ingest_up_to(&images, &mask, images.len());

        let mut rec = TransitionRecorder::new(10);
        rec.scan(&t, &mask, &states, t.len());

        assert_eq!(rec.transitions().len(), 2);
        let has = |src: u8, dst: u8| {
            let src_id = states.find(&img(src), &mask).unwrap();
            let dst_id = states.find(&img(dst), &mask).unwrap();
            rec.transitions().iter().any(|tr| tr.src == src_id && tr.dst == dst_id)
        };
        assert!(has(1, 2));
        assert!(has(2, 1));
    }

    #[test]
    fn duplicate_transitions_within_precision_are_suppressed() {
        // A -> B -> A -> B -> A, durations 200, 200, 205, 195, precision 10
        let mask = mask_all();
        let mut t = Timeline::new();
        let durations = [0u64, 200, 400, 605, 800];
        for (k, &ts) in durations.iter().enumerate() {
            let fill = if k % 2 == 0 { 1 } else { 2 };
            t.append(Sample { timestamp_ns: ts * 1_000_000, image: img(fill) });
        }

        let mut states = StateRegistry::new();
        let images: Vec<Image> = (0..t.len()).map(|i| t.get(i).unwrap().image).collect();
        states.ingest_up_to(&images, &mask, images.len());

        let mut rec = TransitionRecorder::new(10);
        rec.scan(&t, &mask, &states, t.len());

        assert_eq!(rec.transitions().len(), 2);
    }

    #[test]
    fn unresolved_change_point_does_not_advance_cursor_past_it() {
        let mask = mask_all();
        // Only one transition into the timeline so far; no second
        // change-point exists yet to resolve it.
        let mut t = Timeline::new();
        t.append(Sample { timestamp_ns: 0, image: img(1) });
        t.append(Sample { timestamp_ns: 100_000_000, image: img(2) });

        let mut states = StateRegistry::new();
        let images: Vec<Image> = (0..t.len()).map(|i| t.get(i).unwrap().image).collect();
        states.ingest_up_to(&images, &mask, images.len());

        let mut rec = TransitionRecorder::new(10);
        rec.scan(&t, &mask, &states, t.len());
        assert_eq!(rec.transitions().len(), 0);
        assert_eq!(rec.scan_cursor, 0);
    }

    #[test]
    fn statistics_increments_both_endpoints_per_match() {
        let mask = mask_all();
        let t = build_ab_timeline(3, 100);

        let mut states = StateRegistry::new();
        let images: Vec<Image> = (0..t.len()).map(|i| t.get(i).unwrap().image).collect();
        states.ingest_up_to(&images, &mask, images.len());

        let mut rec = TransitionRecorder::new(10);
        rec.scan(&t, &mask, &states, t.len());
        rec.analyze_statistics(&t, &mask, &mut states, t.len());

        let a_id = states.find(&img(1), &mask).unwrap();
        let b_id = states.find(&img(2), &mask).unwrap();
        assert!(states.count_at(a_id) > 0);
        assert!(states.count_at(b_id) > 0);
    }
}
