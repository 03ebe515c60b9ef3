//! Dashboard session
//!
//! A session is created when the dashboard view mounts and dropped when it
//! unmounts. Opening it subscribes to the event queue and marks the history
//! fetch as in flight; dropping it closes the subscription on every exit
//! path.

use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use log::{debug, info};

use crate::config::SessionConfig;
use crate::error::TelemetryError;
use crate::pipeline::{Pipeline, PipelineState};
use crate::store::TelemetryStore;
use crate::subscription::{EventQueue, Subscription};
use crate::time::{Clock, Timestamp};

/// Resolve once `clock` reaches `deadline`, yielding to the executor between
/// checks
async fn wait_until<C: Clock>(clock: &C, deadline: Timestamp) {
    while clock.now() < deadline {
        yield_now().await;
    }
}

pub struct Session<'a, C: Clock> {
    pipeline: Pipeline<C>,
    subscription: Subscription<'a>,
}

impl<'a, C: Clock> Session<'a, C> {
    pub fn open(
        queue: &'a EventQueue,
        config: SessionConfig,
        clock: C,
    ) -> Result<Self, TelemetryError> {
        let mut pipeline = Pipeline::new(config, clock)?;
        if queue.is_closed() {
            return Err(TelemetryError::SubscriptionClosed);
        }

        let subscription = queue.subscribe();
        pipeline.begin_subscription();
        pipeline.begin_fetch();
        info!(
            " Session opened, history capacity {}",
            pipeline.config().history_capacity
        );

        Ok(Self {
            pipeline,
            subscription,
        })
    }

    pub fn pipeline(&self) -> &Pipeline<C> {
        &self.pipeline
    }

    pub fn store(&self) -> &TelemetryStore {
        self.pipeline.store()
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Handle every event already queued, then check the fetch deadline
    ///
    /// All queued events are handled even if the history fetch failed; the
    /// failure is returned afterwards.
    pub fn pump(&mut self) -> Result<usize, TelemetryError> {
        let mut handled = 0;
        let mut failure = None;

        while let Some(event) = self.subscription.try_next() {
            if let Err(e) = self.pipeline.handle_event(event) {
                failure = Some(e);
            }
            handled += 1;
        }
        self.pipeline.poll_deadline();

        match failure {
            Some(e) => Err(e),
            None => Ok(handled),
        }
    }

    /// Handle events as they arrive until the subscription is closed
    ///
    /// A failed fetch does not stop the loop; it stays available through
    /// [`Pipeline::last_fetch_error`]. While a fetch with a timeout is
    /// pending, waiting for the next event is raced against its deadline on
    /// the session clock, so a silent transport still times the fetch out.
    pub async fn run(&mut self) {
        loop {
            let next = match self.pipeline.fetch_deadline() {
                Some(deadline) => {
                    let expiry = wait_until(self.pipeline.clock(), deadline);
                    let raced = select(self.subscription.next(), expiry).await;
                    match raced {
                        Either::First(event) => event,
                        Either::Second(()) => {
                            self.pipeline.poll_deadline();
                            continue;
                        }
                    }
                }
                None => self.subscription.next().await,
            };
            let Some(event) = next else {
                break;
            };

            if let Err(e) = self.pipeline.handle_event(event) {
                debug!(" Event failed, continuing: {}", e);
            }
            self.pipeline.poll_deadline();
        }
        self.pipeline.end_subscription();
    }

    /// Close the subscription. Calling it again does nothing.
    pub fn close(&mut self) {
        self.subscription.close();
        self.pipeline.end_subscription();
    }
}
