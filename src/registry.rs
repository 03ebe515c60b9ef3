//! Known PWM output indices
//!
//! The number of outputs is only learned from the first snapshot and can
//! differ between sessions. Within a session an index is the identity of an
//! output: the device reordering its outputs is unsupported and would
//! attribute history to the wrong output.
//!
//! The known set only grows. An output missing from a later snapshot keeps
//! its last value and history so charts do not jump.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::channels::ChannelStore;
use crate::readings::{OutputPoint, OutputReading, OutputType};
use crate::storage::BoundedSeries;

/// Output channel stores keyed by index
pub type OutputChannels = BTreeMap<usize, ChannelStore<OutputReading>>;

#[derive(Debug, Clone, Default)]
pub struct OutputRegistry {
    known: BTreeSet<usize>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add any unseen indices and return them in ascending order
    ///
    /// Indices missing from `indices` are kept.
    pub fn reconcile<I>(&mut self, indices: I) -> Vec<usize>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut added: Vec<usize> = indices
            .into_iter()
            .filter(|index| self.known.insert(*index))
            .collect();
        added.sort_unstable();
        added
    }

    pub fn known_indices(&self) -> &BTreeSet<usize> {
        &self.known
    }

    pub fn contains(&self, index: usize) -> bool {
        self.known.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Indices whose latest value has the given type
    ///
    /// The type is read from each output's current value, so the most
    /// recently observed type wins. Outputs only seen in history have no
    /// type and never match.
    pub fn filter_by_type(&self, kind: OutputType, outputs: &OutputChannels) -> BTreeSet<usize> {
        self.known
            .iter()
            .copied()
            .filter(|index| {
                outputs
                    .get(index)
                    .and_then(|store| store.current())
                    .is_some_and(|reading| reading.kind == kind)
            })
            .collect()
    }

    /// Per-index chart projections, optionally limited to one type
    pub fn projections<'a>(
        &self,
        outputs: &'a OutputChannels,
        kind: Option<OutputType>,
    ) -> Vec<OutputProjection<'a>> {
        self.known
            .iter()
            .filter_map(|index| {
                let store = outputs.get(index)?;
                let current = store.current();
                let observed = current.map(|reading| reading.kind);
                if kind.is_some() && observed != kind {
                    return None;
                }

                Some(OutputProjection {
                    index: *index,
                    kind: observed,
                    current,
                    history: store.history(),
                })
            })
            .collect()
    }
}

/// Charted field of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputField {
    Duty,
    Temperature,
}

impl OutputField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Duty => "duty",
            Self::Temperature => "temperature",
        }
    }

    pub fn value(self, point: &OutputPoint) -> Option<f32> {
        match self {
            Self::Duty => Some(point.duty),
            Self::Temperature => point.temperature,
        }
    }
}

/// Stable chart series key, e.g. `pwmOutput-2-duty`
pub fn series_key(index: usize, field: OutputField) -> String {
    format!("pwmOutput-{}-{}", index, field.as_str())
}

/// Everything a chart needs about one output
#[derive(Debug, Clone, Copy)]
pub struct OutputProjection<'a> {
    pub index: usize,
    /// `None` while only history has been seen for this output
    pub kind: Option<OutputType>,
    pub current: Option<&'a OutputReading>,
    pub history: &'a BoundedSeries<OutputPoint>,
}

impl OutputProjection<'_> {
    pub fn series_key(&self, field: OutputField) -> String {
        series_key(self.index, field)
    }
}
