use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;
use crate::storage::DEFAULT_HISTORY_CAPACITY;

/// What to do with a history sample that lands on top of one already stored
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Keep every sample, duplicates included
    #[default]
    Accept,
    /// Drop history samples within `window_ms` of a stored sample
    Tolerance { window_ms: u64 },
}

/// Per-session settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Samples kept per channel
    pub history_capacity: usize,
    pub overlap: OverlapPolicy,
    /// Give up waiting for the history fetch after this long. `None` waits forever.
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            overlap: OverlapPolicy::Accept,
            fetch_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(text: &str) -> Result<Self, TelemetryError> {
        let config: Self = serde_json::from_str(text).map_err(TelemetryError::config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.history_capacity == 0 {
            return Err(TelemetryError::InvalidCapacity(self.history_capacity));
        }
        Ok(())
    }
}
