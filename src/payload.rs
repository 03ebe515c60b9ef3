//! Wire formats of the status push and the history endpoint
//!
//! Status messages are decoded in two steps. The envelope keeps every channel
//! as raw JSON, and each channel is decoded on its own when the pipeline
//! applies the message, so one malformed channel cannot take its siblings
//! down with it.
//!
//! Older firmware names the output array `heaters`; newer firmware uses
//! `pwmOutputs`. Both are accepted, and `pwmOutputs` wins when a body carries
//! both.

use alloc::vec::Vec;
use core::time::Duration;

use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::error::TelemetryError;
use crate::readings::{AmbientReading, OutputPoint, PowerReading};

/// Decode one channel from its raw JSON
pub fn decode<'v, T: Deserialize<'v>>(value: &'v Value) -> Result<T, TelemetryError> {
    T::deserialize(value).map_err(TelemetryError::malformed)
}

/// One `status` event from the push channel
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusFrame {
    pub ambient: Option<Value>,
    pub power: Option<Value>,
    #[serde(default, rename = "pwmOutputs")]
    pub outputs: Option<Value>,
    /// Output array under its legacy name
    #[serde(default)]
    pub heaters: Option<Value>,
    pub app: Option<Value>,
}

impl StatusFrame {
    /// Parse a status event body. Only the envelope has to be valid here.
    pub fn from_json(text: &str) -> Result<Self, TelemetryError> {
        let value: Value = serde_json::from_str(text).map_err(TelemetryError::malformed)?;
        if !value.is_object() {
            return Err(TelemetryError::malformed("status event is not an object"));
        }
        decode(&value)
    }

    /// Raw output elements, empty when the array is absent or empty
    pub fn output_elements(&self) -> Result<&[Value], TelemetryError> {
        match self.outputs.as_ref().or(self.heaters.as_ref()) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(TelemetryError::malformed("output list is not an array")),
        }
    }
}

/// Firmware block of a status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AppStatus {
    /// Seconds since boot
    pub uptime: u64,
}

/// Response of the history endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPayload {
    /// Device uptime in seconds when the response was produced
    pub now: u64,
    /// Entries that decoded, in the order the device sent them
    pub entries: Vec<HistoryEntry>,
    /// Entries dropped because they did not decode
    pub skipped: usize,
}

impl HistoryPayload {
    pub fn from_json(text: &str) -> Result<Self, TelemetryError> {
        #[derive(Deserialize)]
        struct Envelope {
            now: u64,
            #[serde(default)]
            entries: Vec<Value>,
        }

        let envelope: Envelope = serde_json::from_str(text).map_err(TelemetryError::malformed)?;

        let mut entries = Vec::with_capacity(envelope.entries.len());
        let mut skipped = 0;
        for (position, raw) in envelope.entries.iter().enumerate() {
            match decode::<HistoryEntry>(raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(" Skipping history entry {}: {}", position, e);
                    skipped += 1;
                }
            }
        }

        Ok(Self {
            now: envelope.now,
            entries,
            skipped,
        })
    }

    pub fn device_uptime(&self) -> Duration {
        Duration::from_secs(self.now)
    }
}

/// One sample of the device's history ring buffer
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Seconds since boot when the sample was taken
    pub uptime: u64,
    pub ambient_temperature: Option<f32>,
    pub ambient_humidity: Option<f32>,
    pub ambient_dewpoint: Option<f32>,
    pub bus_voltage: Option<f32>,
    pub current: Option<f32>,
    pub power: Option<f32>,
    #[serde(default, rename = "pwmOutputs")]
    pub pwm_outputs: Option<Vec<HistoryOutput>>,
    #[serde(default)]
    pub heaters: Option<Vec<HistoryOutput>>,
}

impl HistoryEntry {
    /// Recorded outputs in index order, empty when the entry has none
    pub fn outputs(&self) -> &[HistoryOutput] {
        self.pwm_outputs
            .as_deref()
            .or(self.heaters.as_deref())
            .unwrap_or_default()
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_secs(self.uptime)
    }

    /// Ambient sample, absent unless both temperature and humidity were read
    pub fn ambient(&self) -> Option<AmbientReading> {
        Some(AmbientReading {
            temperature: Some(self.ambient_temperature?),
            humidity: Some(self.ambient_humidity?),
            dewpoint: self.ambient_dewpoint,
        })
    }

    /// Power sample, absent unless bus voltage and current were read
    pub fn power(&self) -> Option<PowerReading> {
        let bus_voltage = self.bus_voltage?;
        let current = self.current?;

        Some(PowerReading {
            bus_voltage,
            current,
            power: self.power.unwrap_or(bus_voltage * current),
            shunt_voltage: None,
        })
    }
}

/// Output state recorded in a history entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct HistoryOutput {
    /// Already zero for outputs that were inactive
    pub duty: f32,
    pub temperature: Option<f32>,
}

impl HistoryOutput {
    pub fn point(&self) -> OutputPoint {
        OutputPoint {
            duty: self.duty,
            temperature: self.temperature,
        }
    }
}
