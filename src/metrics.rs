//! Condensation risk assessment
//!
//! Dew heaters exist to keep optics above the dewpoint. The margin between
//! the ambient temperature and the dewpoint tells the dashboard how close
//! the equipment is to fogging up.

use crate::readings::AmbientReading;

/// Condensation risk derived from the dewpoint margin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DewRisk {
    /// Margin of 5 °C or more
    Low,
    /// Margin between 2.5 °C and 5 °C
    Moderate,
    /// Margin below 2.5 °C
    High,
    /// Temperature at or below the dewpoint
    Condensing,
}

impl DewRisk {
    /// Classify a margin in °C between air temperature and dewpoint
    pub fn from_margin(margin: f32) -> Self {
        if margin >= 5.0 {
            Self::Low
        } else if margin >= 2.5 {
            Self::Moderate
        } else if margin > 0.0 {
            Self::High
        } else {
            Self::Condensing
        }
    }

    /// Assess a reading. `None` when temperature or dewpoint is missing.
    pub fn assess(ambient: &AmbientReading) -> Option<Self> {
        ambient.dewpoint_margin().map(Self::from_margin)
    }

    /// Get the display label for this risk level
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::Condensing => "Condensing",
        }
    }
}
