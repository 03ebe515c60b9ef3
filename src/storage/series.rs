//! Capacity-bounded time series for one channel

use alloc::collections::VecDeque;
use alloc::collections::vec_deque;

use super::{DEFAULT_HISTORY_CAPACITY, SeriesStats, TimeWindow};
use crate::error::TelemetryError;
use crate::time::Timestamp;

/// One value stamped with the wall-clock instant it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub timestamp: Timestamp,
    pub value: T,
}

impl<T> Sample<T> {
    pub const fn new(timestamp: Timestamp, value: T) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered view over a series, oldest first
pub type SeriesIter<'a, T> = vec_deque::Iter<'a, Sample<T>>;

/// Ring buffer of samples that drops the oldest entry once full
///
/// Live appends arrive in time order, so the series stays ordered by
/// timestamp. Eviction only ever happens at the head.
#[derive(Debug, Clone)]
pub struct BoundedSeries<T> {
    samples: VecDeque<Sample<T>>,
    capacity: usize,
}

impl<T> BoundedSeries<T> {
    /// Create an empty series, rejecting a zero capacity
    pub fn new(capacity: usize) -> Result<Self, TelemetryError> {
        if capacity == 0 {
            return Err(TelemetryError::InvalidCapacity(capacity));
        }

        Ok(Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Add a sample at the tail, evicting from the head when over capacity
    pub fn append(&mut self, sample: Sample<T>) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Append samples the caller has already sorted by timestamp
    ///
    /// The order is not checked. A batch larger than the capacity leaves only
    /// its newest `capacity` samples.
    pub fn append_batch<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = Sample<T>>,
    {
        for sample in batch {
            self.append(sample);
        }
    }

    /// Restartable read-only view in stored order
    pub fn iter(&self) -> SeriesIter<'_, T> {
        self.samples.iter()
    }

    pub fn to_ordered_sequence(&self) -> SeriesIter<'_, T> {
        self.iter()
    }

    pub fn latest(&self) -> Option<&Sample<T>> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&Sample<T>> {
        self.samples.front()
    }

    /// Samples no older than `window` before `now`
    pub fn window(
        &self,
        window: TimeWindow,
        now: Timestamp,
    ) -> impl Iterator<Item = &Sample<T>> + Clone {
        let start = window
            .duration_ms()
            .map(|span| now.saturating_sub_millis(span));

        self.samples
            .iter()
            .filter(move |sample| start.is_none_or(|start| sample.timestamp >= start))
    }

    /// Whether any stored sample lies within `tolerance_ms` of `timestamp`
    pub fn has_sample_near(&self, timestamp: Timestamp, tolerance_ms: u64) -> bool {
        self.samples
            .iter()
            .any(|sample| sample.timestamp.abs_diff_millis(timestamp) <= tolerance_ms)
    }

    /// Statistics of one numeric field over a window
    ///
    /// Samples where `field` yields `None` (sensor absent) are left out.
    pub fn stats<F>(&self, window: TimeWindow, now: Timestamp, field: F) -> SeriesStats
    where
        F: Fn(&T) -> Option<f32>,
    {
        SeriesStats::from_values(self.window(window, now).filter_map(|s| field(&s.value)))
    }
}

impl<T> Default for BoundedSeries<T> {
    fn default() -> Self {
        Self {
            samples: VecDeque::with_capacity(DEFAULT_HISTORY_CAPACITY),
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl<'a, T> IntoIterator for &'a BoundedSeries<T> {
    type Item = &'a Sample<T>;
    type IntoIter = SeriesIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
