//! Error types shared by the telemetry core

use core::fmt::{self, Write};

use thiserror_no_std::Error;

/// Maximum length of the human readable detail carried by an error.
pub const MESSAGE_CAPACITY: usize = 64;

pub type ErrorMessage = heapless::String<MESSAGE_CAPACITY>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("Invalid history capacity: {0}")]
    InvalidCapacity(usize),
    #[error("Invalid configuration: {0}")]
    Config(ErrorMessage),
    #[error("Malformed payload: {0}")]
    MalformedPayload(ErrorMessage),
    #[error("Transport failure: {0}")]
    Transport(ErrorMessage),
    #[error("Push subscription is closed")]
    SubscriptionClosed,
    #[error("Event queue is full")]
    QueueFull,
}

impl TelemetryError {
    pub fn config(detail: impl fmt::Display) -> Self {
        Self::Config(short_message(detail))
    }

    pub fn malformed(detail: impl fmt::Display) -> Self {
        Self::MalformedPayload(short_message(detail))
    }

    pub fn transport(detail: impl fmt::Display) -> Self {
        Self::Transport(short_message(detail))
    }
}

/// Render `detail` into a fixed-size message, cutting it at capacity.
pub fn short_message(detail: impl fmt::Display) -> ErrorMessage {
    struct Truncating<'a>(&'a mut ErrorMessage);

    impl Write for Truncating<'_> {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for c in s.chars() {
                if self.0.push(c).is_err() {
                    return Err(fmt::Error);
                }
            }
            Ok(())
        }
    }

    let mut message = ErrorMessage::new();
    // Overflow only means the message was cut short.
    let _ = write!(Truncating(&mut message), "{}", detail);
    message
}
