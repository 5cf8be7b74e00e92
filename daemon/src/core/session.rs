//! Session-scoped analysis driver.
//!
//! Owns every collection a connected sampler produces: the timeline, the
//! histogram, and the three analyzers (cycle detection, state registry,
//! transition recorder) plus the phase they're driven through. Dropping a
//! `Session` drops all of it at once, which is what makes a disconnect a
//! clean reset rather than a manual unwind of several independent pieces.

use super::cycle::CycleDetector;
use super::histogram::ValueHistogram;
use super::image::{self, Image, Mask};
use super::state::StateRegistry;
use super::timeline::{Sample, Timeline};
use super::transition::{Transition, TransitionRecorder};

/// Observable phase. `Waiting` has no direct variant here — a `Session`
/// only exists once a sampler is connected, so the registry that owns an
/// `Option<Session>` synthesizes `Waiting` for the `None` case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CycleSearch { deadline_ns: u64, tolerance: u32 },
    Accumulate,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTunables {
    pub min_cycle_time_ms: u64,
    pub starting_precision: u32,
    pub cycles_analyze_time_s: u64,
    pub cycles_analyze_time_add_s: u64,
    pub period_precision_ms: u64,
}

impl Default for SessionTunables {
    fn default() -> Self {
        Self {
            min_cycle_time_ms: 10_000,
            starting_precision: 1,
            cycles_analyze_time_s: 30,
            cycles_analyze_time_add_s: 20,
            period_precision_ms: 100,
        }
    }
}

pub struct Session {
    tunables: SessionTunables,
    started_ns: u64,
    phase: Phase,
    timeline: Timeline,
    histogram: ValueHistogram,
    cycles: CycleDetector,
    states: StateRegistry,
    transitions: TransitionRecorder,
}

impl Session {
    pub fn new(tunables: SessionTunables, started_ns: u64) -> Self {
        let deadline_ns = started_ns + tunables.cycles_analyze_time_s * 1_000_000_000;
        Self {
            cycles: CycleDetector::new(tunables.min_cycle_time_ms, tunables.period_precision_ms),
            transitions: TransitionRecorder::new(tunables.period_precision_ms),
            phase: Phase::CycleSearch { deadline_ns, tolerance: tunables.starting_precision },
            tunables,
            started_ns,
            timeline: Timeline::new(),
            histogram: ValueHistogram::new(),
            states: StateRegistry::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn record_sample(&mut self, sample: Sample) -> bool {
        let accepted = self.timeline.append(sample);
        if accepted {
            self.histogram.observe(&sample.image);
        }
        accepted
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn histogram_snapshot(&self) -> Vec<[u8; image::IMAGE_SIZE]> {
        self.histogram.snapshot()
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.cycles.mask()
    }

    pub fn cycles(&self) -> &[u64] {
        self.cycles.cycles()
    }

    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    pub fn transitions(&self) -> &[Transition] {
        self.transitions.transitions()
    }

    pub fn latest_sample(&self) -> Option<&Sample> {
        self.timeline.last()
    }

    /// Runs one analysis tick. `now_ns` drives the cycle-search deadline
    /// check; callers pass their own clock so this stays pure and testable.
    pub fn tick(&mut self, now_ns: u64) {
        match self.phase {
            Phase::CycleSearch { deadline_ns, tolerance } => {
                self.cycles.scan(&self.timeline, tolerance);
                let accepted_any = !self.cycles.cycles().is_empty();

                if now_ns >= deadline_ns {
                    if accepted_any {
                        self.phase = Phase::Accumulate;
                    } else {
                        let next_tol = (tolerance + 1).min(super::cycle::MAX_TOLERANCE);
                        let extended_deadline = deadline_ns + self.tunables.cycles_analyze_time_add_s * 1_000_000_000;
                        self.phase = Phase::CycleSearch { deadline_ns: extended_deadline, tolerance: next_tol };
                    }
                }
            }
            Phase::Accumulate => {
                if let Some(mask) = self.cycles.mask().copied() {
                    let len = self.timeline.len();
                    let images: Vec<Image> = (0..len).map(|i| self.timeline.get(i).unwrap().image).collect();
                    self.states.ingest_up_to(&images, &mask, len);
                    self.transitions.scan(&self.timeline, &mask, &self.states, len);
                    self.transitions.analyze_statistics(&self.timeline, &mask, &mut self.states, len);
                }
            }
        }
    }

    pub fn started_ns(&self) -> u64 {
        self.started_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts_ms: u64, fill: u8) -> Sample {
        Sample { timestamp_ns: ts_ms * 1_000_000, image: [fill; image::IMAGE_SIZE] }
    }

    #[test]
    fn perfectly_periodic_input_reaches_accumulate_with_two_states_and_two_transitions() {
        let tunables = SessionTunables {
            min_cycle_time_ms: 150,
            starting_precision: 2,
            cycles_analyze_time_s: 1,
            cycles_analyze_time_add_s: 1,
            period_precision_ms: 100,
        };
        let mut session = Session::new(tunables, 0);

        for k in 0..200u64 {
            let mut img = [0u8; image::IMAGE_SIZE];
            if k % 2 == 1 {
                img[0] = 1;
                img[1] = 1;
            }
            session.record_sample(Sample { timestamp_ns: k * 100 * 1_000_000, image: img });
        }

        // Deadline of 1s means the first tick (now=2s) already covers the
        // whole 200*100ms=20s window worth of samples ingested above.
        session.tick(2_000_000_000);
        assert!(matches!(session.phase(), Phase::Accumulate));

        // Run a few more ticks so the state/transition passes execute.
        for _ in 0..3 {
            session.tick(2_000_000_000);
        }

        assert_eq!(session.states().len(), 2);
        assert_eq!(session.transitions().len(), 2);
    }

    #[test]
    fn all_zero_samples_are_never_stored() {
        let mut session = Session::new(SessionTunables::default(), 0);
        assert!(!session.record_sample(sample(0, 0)));
        assert_eq!(session.timeline().len(), 0);
    }

    #[test]
    fn cycle_search_extends_tolerance_without_any_signal() {
        let tunables = SessionTunables {
            min_cycle_time_ms: 10,
            starting_precision: 0,
            cycles_analyze_time_s: 1,
            cycles_analyze_time_add_s: 1,
            period_precision_ms: 10,
        };
        let mut session = Session::new(tunables, 0);

        // Monotonically increasing counter: no recurrence at any tolerance 0.
        for k in 0..50u64 {
            let mut img = [0u8; image::IMAGE_SIZE];
            img[0] = (k % 256) as u8;
            session.record_sample(Sample { timestamp_ns: k * 50 * 1_000_000, image: img });
        }

        session.tick(2_000_000_000);
        match session.phase() {
            Phase::CycleSearch { tolerance, .. } => assert!(tolerance >= 1),
            Phase::Accumulate => panic!("should not have accumulated without a detected cycle"),
        }
        assert!(session.states().is_empty());
        assert!(session.transitions().is_empty());
    }
}
