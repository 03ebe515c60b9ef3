//! Typed channel values reported by the device
//!
//! Each channel keeps its latest reading as-is and records a chart point per
//! sample. For ambient and power the point is the reading itself; outputs
//! only chart their duty and temperature.

use core::fmt::Debug;

use serde::{Deserialize, Serialize};

/// A channel value that can be recorded in a series
pub trait Telemetry: Clone {
    /// What gets stored in the history for one sample
    type Point: Clone + Debug;

    fn point(&self) -> Self::Point;
}

/// Ambient sensor reading. Every field is `None` when the sensor is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbientReading {
    /// °C
    pub temperature: Option<f32>,
    /// %RH
    pub humidity: Option<f32>,
    /// °C
    pub dewpoint: Option<f32>,
}

impl AmbientReading {
    /// Degrees between the air temperature and the dewpoint
    pub fn dewpoint_margin(&self) -> Option<f32> {
        Some(self.temperature? - self.dewpoint?)
    }
}

impl Telemetry for AmbientReading {
    type Point = Self;

    fn point(&self) -> Self::Point {
        *self
    }
}

/// Power meter reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerReading {
    /// V
    pub bus_voltage: f32,
    /// A
    pub current: f32,
    /// W
    pub power: f32,
    /// mV, not recorded in device history
    pub shunt_voltage: Option<f32>,
}

impl Telemetry for PowerReading {
    type Point = Self;

    fn point(&self) -> Self::Point {
        *self
    }
}

/// Control mode of a PWM output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Off,
    Fixed,
    TargetTemperature,
    Dewpoint,
    #[serde(other)]
    Unknown,
}

/// What is plugged into a PWM output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Heater,
    Output,
    #[serde(other)]
    Unknown,
}

impl OutputType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Heater => "Heater",
            Self::Output => "Output",
            Self::Unknown => "Unknown",
        }
    }
}

/// State of one PWM output. The index is its position in the status array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputReading {
    pub mode: OutputMode,
    /// Duty cycle, 0.0 to 1.0
    pub duty: f32,
    pub active: bool,
    #[serde(rename = "type")]
    pub kind: OutputType,
    pub max_duty: Option<f32>,
    pub min_duty: Option<f32>,
    #[serde(default)]
    pub has_temperature: bool,
    #[serde(default)]
    pub apply_at_startup: bool,
    /// Probe temperature in °C, when a probe is fitted
    pub temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub dewpoint_offset: Option<f32>,
    pub ramp_offset: Option<f32>,
}

impl OutputReading {
    /// Duty actually applied: an inactive output drives nothing
    pub fn effective_duty(&self) -> f32 {
        if self.active { self.duty } else { 0.0 }
    }
}

impl Telemetry for OutputReading {
    type Point = OutputPoint;

    fn point(&self) -> Self::Point {
        OutputPoint {
            duty: self.effective_duty(),
            temperature: self.temperature,
        }
    }
}

/// Charted state of an output
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputPoint {
    pub duty: f32,
    pub temperature: Option<f32>,
}
