//! Session telemetry store
//!
//! Holds the channel stores for one dashboard session. Presentation code
//! reads it through shared references; only the pipeline can mutate it.

use alloc::collections::BTreeSet;
use alloc::collections::btree_map::Entry;
use alloc::vec::Vec;
use core::time::Duration;

use crate::channels::ChannelStore;
use crate::error::TelemetryError;
use crate::metrics::DewRisk;
use crate::readings::{AmbientReading, OutputReading, OutputType, PowerReading};
use crate::registry::{OutputChannels, OutputProjection, OutputRegistry};

#[derive(Debug, Clone)]
pub struct TelemetryStore {
    capacity: usize,
    ambient: ChannelStore<AmbientReading>,
    power: ChannelStore<PowerReading>,
    outputs: OutputChannels,
    registry: OutputRegistry,
    device_uptime: Option<Duration>,
}

impl TelemetryStore {
    pub fn new(capacity: usize) -> Result<Self, TelemetryError> {
        Ok(Self {
            capacity,
            ambient: ChannelStore::new(capacity)?,
            power: ChannelStore::new(capacity)?,
            outputs: OutputChannels::new(),
            registry: OutputRegistry::new(),
            device_uptime: None,
        })
    }

    pub fn ambient(&self) -> &ChannelStore<AmbientReading> {
        &self.ambient
    }

    pub fn power(&self) -> &ChannelStore<PowerReading> {
        &self.power
    }

    pub fn output(&self, index: usize) -> Option<&ChannelStore<OutputReading>> {
        self.outputs.get(&index)
    }

    pub fn outputs(&self) -> &OutputChannels {
        &self.outputs
    }

    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    pub fn known_indices(&self) -> &BTreeSet<usize> {
        self.registry.known_indices()
    }

    pub fn outputs_of_type(&self, kind: OutputType) -> BTreeSet<usize> {
        self.registry.filter_by_type(kind, &self.outputs)
    }

    pub fn output_projections(&self, kind: Option<OutputType>) -> Vec<OutputProjection<'_>> {
        self.registry.projections(&self.outputs, kind)
    }

    /// Device uptime from the latest push that carried one
    pub fn device_uptime(&self) -> Option<Duration> {
        self.device_uptime
    }

    /// Condensation risk from the current ambient reading
    pub fn dew_risk(&self) -> Option<DewRisk> {
        self.ambient.current().and_then(DewRisk::assess)
    }

    pub(crate) fn ambient_mut(&mut self) -> &mut ChannelStore<AmbientReading> {
        &mut self.ambient
    }

    pub(crate) fn power_mut(&mut self) -> &mut ChannelStore<PowerReading> {
        &mut self.power
    }

    pub(crate) fn registry_mut(&mut self) -> &mut OutputRegistry {
        &mut self.registry
    }

    pub(crate) fn set_device_uptime(&mut self, uptime: Duration) {
        self.device_uptime = Some(uptime);
    }

    /// Store for an output, created on first use
    pub(crate) fn output_mut(
        &mut self,
        index: usize,
    ) -> Result<&mut ChannelStore<OutputReading>, TelemetryError> {
        match self.outputs.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(ChannelStore::new(self.capacity)?)),
        }
    }
}
