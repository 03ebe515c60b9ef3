//! Event queue between the transport collaborators and the session
//!
//! The push stream and the one-shot history fetch both post into a single
//! bounded queue. The session drains it one event at a time, so each event is
//! handled to completion before the next one starts.
//!
//! Closing is synchronous and idempotent. After close, deliveries are refused
//! and [`Subscription::next`] yields `None`, so a transport that keeps firing
//! after the view went away cannot reach a torn-down consumer.

use core::cell::Cell;
use core::fmt::Display;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};

use crate::error::TelemetryError;
use crate::payload::{HistoryPayload, StatusFrame};

/// Events buffered between producers and the session
/// Set to 8 to absorb a burst of pushes while history is being merged
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// Input events of the telemetry pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// A status snapshot arrived on the push channel
    Status(StatusFrame),
    /// The history fetch resolved, successfully or not
    History(Result<HistoryPayload, TelemetryError>),
}

pub struct EventQueue {
    events: Channel<CriticalSectionRawMutex, TelemetryEvent, EVENT_QUEUE_CAPACITY>,
    closed: Mutex<CriticalSectionRawMutex, Cell<bool>>,
    close_signal: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
            closed: Mutex::new(Cell::new(false)),
            close_signal: Signal::new(),
        }
    }

    /// Consumer side. A queue serves a single session; it cannot be reopened.
    pub fn subscribe(&self) -> Subscription<'_> {
        Subscription { queue: self }
    }

    /// Handle for the push transport
    pub fn push_sender(&self) -> PushSender<'_> {
        PushSender { queue: self }
    }

    /// One-shot handle for the history fetch
    pub fn fetch_completer(&self) -> FetchCompleter<'_> {
        FetchCompleter { queue: self }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock(|closed| closed.get())
    }

    /// Close the queue. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let was_closed = self.closed.lock(|closed| closed.replace(true));
        if was_closed {
            return false;
        }

        // Pending events are for a consumer that no longer exists
        let mut dropped = 0usize;
        while self.events.try_receive().is_ok() {
            dropped += 1;
        }
        self.close_signal.signal(());
        info!(" Push subscription closed, {} pending events dropped", dropped);
        true
    }

    fn post(&self, event: TelemetryEvent) -> Result<(), TelemetryError> {
        if self.is_closed() {
            debug!(" Ignoring event after close");
            return Err(TelemetryError::SubscriptionClosed);
        }
        self.events
            .try_send(event)
            .map_err(|_| TelemetryError::QueueFull)
    }
}

/// Cancellable stream of parsed events
///
/// Dropping the subscription closes it.
pub struct Subscription<'a> {
    queue: &'a EventQueue,
}

impl Subscription<'_> {
    /// Wait for the next event, `None` once closed
    pub async fn next(&mut self) -> Option<TelemetryEvent> {
        if let Some(event) = self.try_next() {
            return Some(event);
        }
        if self.queue.is_closed() {
            return None;
        }

        match select(self.queue.events.receive(), self.queue.close_signal.wait()).await {
            Either::First(event) if !self.queue.is_closed() => Some(event),
            _ => None,
        }
    }

    /// Take the next queued event without waiting
    pub fn try_next(&mut self) -> Option<TelemetryEvent> {
        if self.queue.is_closed() {
            return None;
        }
        self.queue.events.try_receive().ok()
    }

    pub fn close(&mut self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// Entry point for status events coming off the push channel
#[derive(Clone, Copy)]
pub struct PushSender<'a> {
    queue: &'a EventQueue,
}

impl PushSender<'_> {
    /// Parse a status event body and queue it
    pub fn deliver(&self, body: &str) -> Result<(), TelemetryError> {
        if self.queue.is_closed() {
            return Err(TelemetryError::SubscriptionClosed);
        }

        let frame = StatusFrame::from_json(body).inspect_err(|e| {
            warn!(" Dropping status event: {}", e);
        })?;
        self.queue.post(TelemetryEvent::Status(frame))
    }
}

/// Completes the history fetch exactly once
pub struct FetchCompleter<'a> {
    queue: &'a EventQueue,
}

impl FetchCompleter<'_> {
    /// Hand over the response body. An unreadable body counts as a failed fetch.
    pub fn resolve(self, body: &str) -> Result<(), TelemetryError> {
        self.queue
            .post(TelemetryEvent::History(HistoryPayload::from_json(body)))
    }

    /// Report that the fetch did not produce a response
    pub fn fail(self, detail: impl Display) -> Result<(), TelemetryError> {
        self.queue.post(TelemetryEvent::History(Err(
            TelemetryError::transport(detail),
        )))
    }
}
