//! Progress hooks for the overlap build.
//!
//! Intersecting every tract with its candidate response areas is the only
//! slow step, so [`build_overlaps_with_progress`] reports one tick per
//! tract through [`ProgressCallback`]. The CLI renders ticks with
//! `indicatif`; everything else passes [`NullProgress`].
//!
//! [`build_overlaps_with_progress`]: crate::overlaps::build_overlaps_with_progress

use std::sync::Arc;

/// Receives progress from the overlap build.
pub trait ProgressCallback: Send + Sync {
    /// Number of tracts about to be processed.
    fn set_total(&self, total: u64);

    /// `delta` more tracts processed.
    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// The build is over; `msg` summarizes the result.
    fn finish(&self, msg: String);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// A shared [`NullProgress`], for callers that hold progress as an
/// `Arc<dyn ProgressCallback>`.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::overlaps::build_overlaps_with_progress;
    use crate::test_support::{area, rect, tract};
    use fire_resource_crosswalk_models::CrosswalkConfig;

    #[derive(Default)]
    struct Recorder {
        total: Mutex<u64>,
        ticks: Mutex<u64>,
        finished: Mutex<Option<String>>,
    }

    impl ProgressCallback for Recorder {
        fn set_total(&self, total: u64) {
            *self.total.lock().unwrap() = total;
        }
        fn inc(&self, delta: u64) {
            *self.ticks.lock().unwrap() += delta;
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, msg: String) {
            *self.finished.lock().unwrap() = Some(msg);
        }
    }

    #[test]
    fn one_tick_per_tract() {
        let sources = vec![
            tract("A", rect(0.0, 0.0, 1.0, 1.0), 1.0),
            tract("B", rect(1.0, 0.0, 2.0, 1.0), 1.0),
            tract("C", rect(9.0, 9.0, 10.0, 10.0), 1.0),
        ];
        let targets = vec![area("X", rect(0.0, 0.0, 2.0, 1.0))];
        let recorder = Recorder::default();

        build_overlaps_with_progress(&sources, &targets, &CrosswalkConfig::default(), &recorder)
            .unwrap();

        assert_eq!(*recorder.total.lock().unwrap(), 3);
        assert_eq!(*recorder.ticks.lock().unwrap(), 3);
        assert_eq!(recorder.finished.lock().unwrap().as_deref(), Some("2 overlaps"));
    }
}
