//! Append-only sample timeline.

use super::image::{self, Image};

/// A single `(timestamp, image)` observation. Timestamps are monotonic
/// nanoseconds assigned at PLC-read completion.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub timestamp_ns: u64,
    pub image: Image,
}

/// The single source of truth consumed by every analyzer. One writer (the
/// sampler), many readers (analyzers, the query surface) — readers take a
/// `len()` snapshot and only index below it, so they always see a
/// consistent prefix.
#[derive(Debug, Default)]
pub struct Timeline {
    samples: Vec<Sample>,
}

impl Timeline {
    pub fn new() -> Self {
        Self { samples: Vec::new() }
    }

    /// Appends a sample unless the image is all-zero (guards against a
    /// spurious read during controller start-up). Returns `true` if the
    /// sample was stored.
    pub fn append(&mut self, sample: Sample) -> bool {
        if image::is_zero(&sample.image) {
            return false;
        }
        if let Some(last) = self.samples.last() {
            debug_assert!(
                sample.timestamp_ns >= last.timestamp_ns,
                "timeline timestamps must be non-decreasing"
            );
        }
        self.samples.push(sample);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Never reallocates; returns a reference into the backing storage.
    pub fn get(&self, i: usize) -> Option<&Sample> {
        self.samples.get(i)
    }

    pub fn slice_from(&self, i: usize) -> &[Sample] {
        if i >= self.samples.len() {
            &[]
        } else {
            &self.samples[i..]
        }
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, fill: u8) -> Sample {
        Sample { timestamp_ns: ts, image: [fill; image::IMAGE_SIZE] }
    }

    #[test]
    fn drops_all_zero_images() {
        let mut t = Timeline::new();
        assert!(!t.append(sample(0, 0)));
        assert_eq!(t.len(), 0);
        assert!(t.append(sample(1, 1)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn indices_are_stable() {
        let mut t = Timeline::new();
        t.append(sample(100, 1));
        t.append(sample(200, 2));
        assert_eq!(t.get(0).unwrap().timestamp_ns, 100);
        assert_eq!(t.get(1).unwrap().timestamp_ns, 200);
        assert!(t.get(2).is_none());
    }

    #[test]
    fn slice_from_bounds() {
        let mut t = Timeline::new();
        t.append(sample(1, 1));
        t.append(sample(2, 2));
        t.append(sample(3, 3));
        assert_eq!(t.slice_from(1).len(), 2);
        assert_eq!(t.slice_from(10).len(), 0);
    }

    #[test]
    fn empty_timeline_is_a_noop_surface() {
        let t = Timeline::new();
        assert_eq!(t.len(), 0);
        assert!(t.get(0).is_none());
        assert!(t.last().is_none());
    }
}
