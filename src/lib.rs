//! Telemetry core for the AstroPowerBox dashboard
//!
//! This crate ingests status snapshots pushed by the device and the
//! boot-relative history ring buffer it serves on request, projects device
//! uptime onto wall-clock time, and keeps bounded per-channel time series for
//! the ambient sensor, the power meter and every PWM output the device
//! reports.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the replay tool and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod channels;
pub mod config;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod pipeline;
pub mod readings;
pub mod registry;
pub mod session;
pub mod storage;
pub mod store;
pub mod subscription;
pub mod time;

pub use config::{OverlapPolicy, SessionConfig};
pub use error::TelemetryError;
pub use pipeline::{FetchStatus, Pipeline, PipelineState};
pub use store::TelemetryStore;
pub use session::Session;
pub use subscription::{EventQueue, Subscription, TelemetryEvent};
pub use time::{Clock, ManualClock, ReconciliationAnchor, Timestamp};
