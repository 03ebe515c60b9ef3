//! Per-channel current value and history
//!
//! Only the pipeline writes to a [`ChannelStore`]; everyone else gets shared
//! references and reads.

use alloc::vec::Vec;
use core::time::Duration;

use crate::config::OverlapPolicy;
use crate::error::TelemetryError;
use crate::readings::Telemetry;
use crate::storage::{BoundedSeries, Sample, SeriesIter};
use crate::time::{ReconciliationAnchor, Timestamp};

/// Result of merging one batch of device history into a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: usize,
    /// Samples dropped by the overlap policy
    pub dropped: usize,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.merged += other.merged;
        self.dropped += other.dropped;
    }
}

#[derive(Debug, Clone)]
pub struct ChannelStore<T: Telemetry> {
    current: Option<T>,
    history: BoundedSeries<T::Point>,
}

impl<T: Telemetry> ChannelStore<T> {
    pub fn new(capacity: usize) -> Result<Self, TelemetryError> {
        Ok(Self {
            current: None,
            history: BoundedSeries::new(capacity)?,
        })
    }

    /// Latest live value, `None` until the first push for this channel
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &BoundedSeries<T::Point> {
        &self.history
    }

    /// Ordered view of the history, oldest first
    pub fn history_snapshot(&self) -> SeriesIter<'_, T::Point> {
        self.history.iter()
    }

    /// Replace the current value and record it at `now`
    pub(crate) fn set_current(&mut self, value: T, now: Timestamp) {
        self.history.append(Sample::new(now, value.point()));
        self.current = Some(value);
    }

    /// Project device history onto the wall clock and append it
    ///
    /// `entries` must be in ascending uptime order. Merging the same range
    /// twice records it twice unless `policy` filters the overlap.
    pub(crate) fn merge_historical<I>(
        &mut self,
        entries: I,
        anchor: &ReconciliationAnchor,
        policy: OverlapPolicy,
    ) -> MergeOutcome
    where
        I: IntoIterator<Item = (Duration, T::Point)>,
    {
        let mut outcome = MergeOutcome::default();
        let mut batch: Vec<Sample<T::Point>> = Vec::new();

        for (uptime, point) in entries {
            let sample = Sample::new(anchor.project(uptime), point);

            // Compared against what was stored before this batch
            if let OverlapPolicy::Tolerance { window_ms } = policy
                && self.history.has_sample_near(sample.timestamp, window_ms)
            {
                outcome.dropped += 1;
                continue;
            }
            batch.push(sample);
        }

        outcome.merged = batch.len();
        self.history.append_batch(batch);
        outcome
    }
}
