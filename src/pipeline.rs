//! Reconciliation pipeline
//!
//! The pipeline is the only writer into the [`TelemetryStore`]. It is fed by
//! two independent sources:
//!
//! - live status snapshots, stamped with the local wall clock on arrival;
//! - the device history, fetched once per session and projected onto the
//!   wall clock through a [`ReconciliationAnchor`].
//!
//! Either source may complete first. History that arrives after live data is
//! appended behind it, so a series can hold live samples positionally before
//! older history samples. That is accepted and never rewritten.
//!
//! The pipeline never retries. A failed fetch is recorded and handed back to
//! the caller while live updates carry on.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::time::Duration;

use log::{debug, error, info, warn};

use crate::channels::MergeOutcome;
use crate::config::SessionConfig;
use crate::error::TelemetryError;
use crate::payload::{AppStatus, HistoryEntry, HistoryPayload, StatusFrame, decode};
use crate::readings::{AmbientReading, OutputPoint, OutputReading, PowerReading};
use crate::store::TelemetryStore;
use crate::subscription::TelemetryEvent;
use crate::time::{Clock, ReconciliationAnchor, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing started yet
    Uninitialized,
    /// Subscription or fetch started, no data yet
    AwaitingFirstData,
    /// At least one source delivered
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Pending,
    Completed,
    Failed,
    /// Gave up waiting. A late response is still merged.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Idle,
    Open,
    Closed,
}

/// What happened to one channel during a tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelUpdate {
    /// Not present in the message
    #[default]
    Absent,
    Updated,
    /// Present but malformed, previous state kept
    Skipped,
}

/// Outcome of applying one status snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub ambient: ChannelUpdate,
    pub power: ChannelUpdate,
    pub outputs: ChannelUpdate,
    pub app: ChannelUpdate,
    pub outputs_updated: usize,
    pub outputs_skipped: usize,
    /// Output indices seen for the first time
    pub new_outputs: Vec<usize>,
}

/// Outcome of merging the device history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub ambient: MergeOutcome,
    pub power: MergeOutcome,
    pub outputs: MergeOutcome,
    /// Entries that could not be decoded at all
    pub discarded_entries: usize,
}

pub struct Pipeline<C: Clock> {
    store: TelemetryStore,
    config: SessionConfig,
    clock: C,
    state: PipelineState,
    fetch: FetchStatus,
    push: PushStatus,
    fetch_started_at: Option<Timestamp>,
    last_fetch_error: Option<TelemetryError>,
}

impl<C: Clock> Pipeline<C> {
    pub fn new(config: SessionConfig, clock: C) -> Result<Self, TelemetryError> {
        config.validate()?;

        Ok(Self {
            store: TelemetryStore::new(config.history_capacity)?,
            config,
            clock,
            state: PipelineState::Uninitialized,
            fetch: FetchStatus::Idle,
            push: PushStatus::Idle,
            fetch_started_at: None,
            last_fetch_error: None,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.fetch
    }

    pub fn push_status(&self) -> PushStatus {
        self.push
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn last_fetch_error(&self) -> Option<&TelemetryError> {
        self.last_fetch_error.as_ref()
    }

    /// The push channel was opened
    pub fn begin_subscription(&mut self) {
        self.push = PushStatus::Open;
        self.await_data();
    }

    /// The history fetch was sent
    pub fn begin_fetch(&mut self) {
        self.fetch = FetchStatus::Pending;
        self.fetch_started_at = Some(self.clock.now());
        self.await_data();
    }

    /// The push channel was closed
    pub fn end_subscription(&mut self) {
        self.push = PushStatus::Closed;
    }

    fn await_data(&mut self) {
        if self.state == PipelineState::Uninitialized {
            self.state = PipelineState::AwaitingFirstData;
            info!(" Waiting for first telemetry");
        }
    }

    fn go_live(&mut self, cause: &str) {
        if self.state != PipelineState::Live {
            self.state = PipelineState::Live;
            info!(" Telemetry live after {}", cause);
        }
    }

    /// Dispatch one queued event
    ///
    /// A failed fetch is recorded and returned as the error.
    pub fn handle_event(&mut self, event: TelemetryEvent) -> Result<(), TelemetryError> {
        match event {
            TelemetryEvent::Status(frame) => {
                self.apply_status(&frame);
                Ok(())
            }
            TelemetryEvent::History(Ok(payload)) => {
                self.apply_history_now(&payload);
                Ok(())
            }
            TelemetryEvent::History(Err(e)) => {
                self.fetch_failed(e.clone());
                Err(e)
            }
        }
    }

    /// Apply a live snapshot, stamping it with the current time
    ///
    /// Channels are decoded one by one. A malformed channel keeps its previous
    /// state and does not stop the others. An empty output list leaves every
    /// output untouched.
    pub fn apply_status(&mut self, frame: &StatusFrame) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        if let Some(raw) = &frame.ambient {
            report.ambient = match decode::<AmbientReading>(raw) {
                Ok(reading) => {
                    self.store.ambient_mut().set_current(reading, now);
                    ChannelUpdate::Updated
                }
                Err(e) => {
                    warn!(" Skipping ambient update: {}", e);
                    ChannelUpdate::Skipped
                }
            };
        }

        if let Some(raw) = &frame.power {
            report.power = match decode::<PowerReading>(raw) {
                Ok(reading) => {
                    self.store.power_mut().set_current(reading, now);
                    ChannelUpdate::Updated
                }
                Err(e) => {
                    warn!(" Skipping power update: {}", e);
                    ChannelUpdate::Skipped
                }
            };
        }

        self.apply_outputs(frame, now, &mut report);

        if let Some(raw) = &frame.app {
            report.app = match decode::<AppStatus>(raw) {
                Ok(app) => {
                    self.store.set_device_uptime(Duration::from_secs(app.uptime));
                    ChannelUpdate::Updated
                }
                Err(e) => {
                    warn!(" Skipping app status: {}", e);
                    ChannelUpdate::Skipped
                }
            };
        }

        debug!(
            " Status tick: ambient={:?} power={:?} outputs={}/{}",
            report.ambient,
            report.power,
            report.outputs_updated,
            report.outputs_updated + report.outputs_skipped
        );
        self.go_live("first status push");
        report
    }

    fn apply_outputs(&mut self, frame: &StatusFrame, now: Timestamp, report: &mut TickReport) {
        let elements = match frame.output_elements() {
            Ok(elements) => elements,
            Err(e) => {
                warn!(" Skipping output update: {}", e);
                report.outputs = ChannelUpdate::Skipped;
                return;
            }
        };
        if elements.is_empty() {
            return;
        }

        let mut readings: Vec<(usize, OutputReading)> = Vec::with_capacity(elements.len());
        for (index, raw) in elements.iter().enumerate() {
            match decode::<OutputReading>(raw) {
                Ok(reading) => readings.push((index, reading)),
                Err(e) => {
                    warn!(" Skipping output {} update: {}", index, e);
                    report.outputs_skipped += 1;
                }
            }
        }

        report.new_outputs = self
            .store
            .registry_mut()
            .reconcile(readings.iter().map(|(index, _)| *index));
        for index in &report.new_outputs {
            info!(" Discovered output {}", index);
        }

        for (index, reading) in readings {
            match self.store.output_mut(index) {
                Ok(store) => {
                    store.set_current(reading, now);
                    report.outputs_updated += 1;
                }
                Err(e) => {
                    error!(" Failed to create store for output {}: {}", index, e);
                    report.outputs_skipped += 1;
                }
            }
        }

        report.outputs = if report.outputs_updated > 0 {
            ChannelUpdate::Updated
        } else {
            ChannelUpdate::Skipped
        };
    }

    /// Merge the device history, anchored at the current wall-clock time
    pub fn apply_history_now(&mut self, payload: &HistoryPayload) -> MergeReport {
        let anchor = ReconciliationAnchor::new(self.clock.now(), payload.device_uptime());
        self.apply_history(payload, anchor)
    }

    /// Merge the device history into every channel
    ///
    /// Entries are put in uptime order first. A channel skips entries whose
    /// fields for it are null, and entries with an empty output list add
    /// nothing to the outputs.
    pub fn apply_history(
        &mut self,
        payload: &HistoryPayload,
        anchor: ReconciliationAnchor,
    ) -> MergeReport {
        let policy = self.config.overlap;
        let mut entries: Vec<&HistoryEntry> = payload.entries.iter().collect();
        entries.sort_by_key(|entry| entry.uptime);

        let mut report = MergeReport {
            discarded_entries: payload.skipped,
            ..MergeReport::default()
        };

        report.ambient = self.store.ambient_mut().merge_historical(
            entries
                .iter()
                .filter_map(|entry| Some((entry.uptime(), entry.ambient()?))),
            &anchor,
            policy,
        );

        report.power = self.store.power_mut().merge_historical(
            entries
                .iter()
                .filter_map(|entry| Some((entry.uptime(), entry.power()?))),
            &anchor,
            policy,
        );

        let mut per_output: BTreeMap<usize, Vec<(Duration, OutputPoint)>> = BTreeMap::new();
        for entry in &entries {
            for (index, output) in entry.outputs().iter().enumerate() {
                per_output
                    .entry(index)
                    .or_default()
                    .push((entry.uptime(), output.point()));
            }
        }

        for index in self.store.registry_mut().reconcile(per_output.keys().copied()) {
            info!(" Discovered output {} in history", index);
        }
        for (index, batch) in per_output {
            match self.store.output_mut(index) {
                Ok(store) => report
                    .outputs
                    .absorb(store.merge_historical(batch, &anchor, policy)),
                Err(e) => error!(" Failed to create store for output {}: {}", index, e),
            }
        }

        info!(
            " Merged history: ambient={} power={} outputs={} dropped={} discarded={}",
            report.ambient.merged,
            report.power.merged,
            report.outputs.merged,
            report.ambient.dropped + report.power.dropped + report.outputs.dropped,
            report.discarded_entries
        );

        self.fetch = FetchStatus::Completed;
        self.fetch_started_at = None;
        self.go_live("history merge");
        report
    }

    /// Record a failed history fetch. Live channels are unaffected.
    pub fn fetch_failed(&mut self, error: TelemetryError) {
        error!(" History fetch failed: {}", error);
        self.fetch = FetchStatus::Failed;
        self.fetch_started_at = None;
        self.last_fetch_error = Some(error);
    }

    /// Instant at which a pending fetch times out, if a timeout is configured
    pub fn fetch_deadline(&self) -> Option<Timestamp> {
        match (self.config.fetch_timeout_ms, self.fetch, self.fetch_started_at) {
            (Some(timeout_ms), FetchStatus::Pending, Some(started)) => {
                let timeout_ms = i64::try_from(timeout_ms).unwrap_or(i64::MAX);
                Some(started.saturating_add_millis(timeout_ms))
            }
            _ => None,
        }
    }

    /// Check the fetch deadline
    ///
    /// Returns `true` when this call expired a pending fetch, in which case
    /// the pipeline goes live without history.
    pub fn poll_deadline(&mut self) -> bool {
        let (Some(timeout_ms), FetchStatus::Pending, Some(started)) =
            (self.config.fetch_timeout_ms, self.fetch, self.fetch_started_at)
        else {
            return false;
        };

        let elapsed = self.clock.now().as_millis().saturating_sub(started.as_millis());
        if elapsed < 0 || (elapsed as u64) < timeout_ms {
            return false;
        }

        warn!(" History fetch timed out after {} ms", elapsed);
        self.fetch = FetchStatus::TimedOut;
        self.go_live("history fetch timeout");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlapPolicy;
    use crate::readings::OutputType;
    use crate::time::ManualClock;

    const T0: i64 = 1_700_000_000_000;

    fn clock() -> ManualClock {
        ManualClock::new(Timestamp::from_millis(T0))
    }

    fn status(text: &str) -> StatusFrame {
        StatusFrame::from_json(text).unwrap()
    }

    fn heaters(duties: &[f32]) -> StatusFrame {
        let outputs: Vec<String> = duties
            .iter()
            .map(|duty| {
                format!(
                    r#"{{"mode":"fixed","duty":{},"active":true,"type":"heater","temperature":5.0}}"#,
                    duty
                )
            })
            .collect();
        status(&format!(r#"{{"pwmOutputs":[{}]}}"#, outputs.join(",")))
    }

    fn history(text: &str) -> HistoryPayload {
        HistoryPayload::from_json(text).unwrap()
    }

    fn output_duties(pipeline: &Pipeline<&ManualClock>, index: usize) -> Vec<f32> {
        pipeline
            .store()
            .output(index)
            .map(|store| store.history_snapshot().map(|s| s.value.duty).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_state_transitions() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);

        pipeline.begin_subscription();
        pipeline.begin_fetch();
        assert_eq!(pipeline.state(), PipelineState::AwaitingFirstData);
        assert!(pipeline.store().ambient().current().is_none());

        pipeline.apply_status(&heaters(&[0.5]));
        assert_eq!(pipeline.state(), PipelineState::Live);

        pipeline.apply_history_now(&history(r#"{"now":100,"entries":[]}"#));
        assert_eq!(pipeline.state(), PipelineState::Live);
        assert_eq!(pipeline.fetch_status(), FetchStatus::Completed);
    }

    #[test]
    fn test_history_first_goes_live() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        pipeline.begin_fetch();
        pipeline.apply_history_now(&history(r#"{"now":100,"entries":[]}"#));
        assert_eq!(pipeline.state(), PipelineState::Live);
    }

    #[test]
    fn test_invalid_capacity_fails_fast() {
        let clock = clock();
        let config = SessionConfig {
            history_capacity: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config, &clock),
            Err(TelemetryError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_live_push_updates_every_channel() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();

        let report = pipeline.apply_status(&status(
            r#"{"ambient":{"temperature":3.0,"humidity":88.0,"dewpoint":1.2},
                "power":{"busVoltage":12.3,"current":2.0,"power":24.6,"shuntVoltage":11.0},
                "pwmOutputs":[{"mode":"dewpoint","duty":0.3,"active":true,"type":"heater"},
                              {"mode":"off","duty":0.0,"active":false,"type":"output"}],
                "app":{"uptime":7200}}"#,
        ));

        assert_eq!(report.ambient, ChannelUpdate::Updated);
        assert_eq!(report.power, ChannelUpdate::Updated);
        assert_eq!(report.outputs, ChannelUpdate::Updated);
        assert_eq!(report.outputs_updated, 2);
        assert_eq!(report.new_outputs, vec![0, 1]);

        let store = pipeline.store();
        assert_eq!(store.ambient().current().and_then(|a| a.dewpoint), Some(1.2));
        assert_eq!(store.power().history().len(), 1);
        assert_eq!(
            store.ambient().history().latest().map(|s| s.timestamp),
            Some(Timestamp::from_millis(T0))
        );
        assert_eq!(store.device_uptime(), Some(Duration::from_secs(7200)));
        assert!(store.outputs_of_type(OutputType::Output).contains(&1));
    }

    #[test]
    fn test_empty_output_list_is_noop() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();

        pipeline.apply_status(&heaters(&[0.5]));
        let before = pipeline.store().output(0).and_then(|s| s.current()).cloned();

        clock.advance(Duration::from_secs(1));
        let report = pipeline.apply_status(&status(r#"{"pwmOutputs":[]}"#));

        assert_eq!(report.outputs, ChannelUpdate::Absent);
        assert_eq!(pipeline.store().output(0).and_then(|s| s.current()).cloned(), before);
        assert_eq!(before.map(|r| r.duty), Some(0.5));
        assert!(pipeline.store().known_indices().contains(&0));
        assert_eq!(output_duties(&pipeline, 0), vec![0.5]);
    }

    #[test]
    fn test_growing_output_count_keeps_history() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();

        pipeline.apply_status(&heaters(&[0.1, 0.2]));
        clock.advance(Duration::from_secs(1));
        let report = pipeline.apply_status(&heaters(&[0.3, 0.4, 0.5]));

        assert_eq!(report.new_outputs, vec![2]);
        let known: Vec<usize> = pipeline.store().known_indices().iter().copied().collect();
        assert_eq!(known, vec![0, 1, 2]);
        assert_eq!(output_duties(&pipeline, 0), vec![0.1, 0.3]);
        assert_eq!(output_duties(&pipeline, 1), vec![0.2, 0.4]);
        assert_eq!(output_duties(&pipeline, 2), vec![0.5]);
    }

    #[test]
    fn test_shrinking_output_count_keeps_last_state() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();

        pipeline.apply_status(&heaters(&[0.1, 0.2]));
        clock.advance(Duration::from_secs(1));
        pipeline.apply_status(&heaters(&[0.9]));

        assert_eq!(pipeline.store().known_indices().len(), 2);
        assert_eq!(output_duties(&pipeline, 1), vec![0.2]);
        assert_eq!(
            pipeline.store().output(1).and_then(|s| s.current()).map(|r| r.duty),
            Some(0.2)
        );
    }

    #[test]
    fn test_malformed_channel_does_not_abort_siblings() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        pipeline.apply_status(&status(
            r#"{"power":{"busVoltage":12.0,"current":1.0,"power":12.0}}"#,
        ));

        let report = pipeline.apply_status(&status(
            r#"{"ambient":{"temperature":"warm"},
                "power":{"busVoltage":11.0},
                "pwmOutputs":[{"mode":"fixed","active":true,"type":"heater"},
                              {"mode":"fixed","duty":0.6,"active":true,"type":"heater"}]}"#,
        ));

        assert_eq!(report.ambient, ChannelUpdate::Skipped);
        assert_eq!(report.power, ChannelUpdate::Skipped);
        assert_eq!(report.outputs_skipped, 1);
        assert_eq!(report.outputs_updated, 1);

        let store = pipeline.store();
        assert!(store.ambient().current().is_none());
        assert_eq!(store.power().current().map(|p| p.bus_voltage), Some(12.0));
        assert!(store.output(0).is_none());
        assert!(!store.known_indices().contains(&0));
        assert_eq!(output_duties(&pipeline, 1), vec![0.6]);
    }

    #[test]
    fn test_history_merge_projects_and_skips_nulls() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        pipeline.begin_fetch();

        let report = pipeline.apply_history_now(&history(
            r#"{"now":500,"entries":[
                {"uptime":490,"ambientTemperature":null,"ambientHumidity":null,
                 "busVoltage":12.0,"current":1.0,"power":12.0,"pwmOutputs":[]},
                {"uptime":480,"ambientTemperature":4.0,"ambientHumidity":75.0,"ambientDewpoint":0.0,
                 "busVoltage":12.1,"current":1.0,"power":12.1,
                 "pwmOutputs":[{"duty":0.25,"temperature":6.0},{"duty":0.0}]}
            ]}"#,
        ));

        assert_eq!(report.ambient.merged, 1);
        assert_eq!(report.power.merged, 2);
        assert_eq!(report.outputs.merged, 2);

        let store = pipeline.store();
        let power_stamps: Vec<i64> = store
            .power()
            .history_snapshot()
            .map(|s| s.timestamp.as_millis())
            .collect();
        assert_eq!(power_stamps, vec![T0 - 20_000, T0 - 10_000]);
        assert_eq!(
            store.ambient().history().latest().map(|s| s.timestamp.as_millis()),
            Some(T0 - 20_000)
        );
        assert!(store.ambient().current().is_none());

        // History-only outputs are known but have no type yet
        assert_eq!(store.known_indices().len(), 2);
        assert!(store.outputs_of_type(OutputType::Heater).is_empty());
        assert_eq!(output_duties(&pipeline, 0), vec![0.25]);
    }

    #[test]
    fn test_history_after_live_is_appended_behind() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        pipeline.apply_status(&heaters(&[0.8]));

        pipeline.apply_history_now(&history(
            r#"{"now":60,"entries":[{"uptime":30,"pwmOutputs":[{"duty":0.1}]}]}"#,
        ));

        assert_eq!(output_duties(&pipeline, 0), vec![0.8, 0.1]);
        assert_eq!(
            pipeline.store().output(0).and_then(|s| s.current()).map(|r| r.duty),
            Some(0.8)
        );
    }

    #[test]
    fn test_overlap_tolerance_drops_duplicates() {
        let clock = clock();
        let config = SessionConfig {
            overlap: OverlapPolicy::Tolerance { window_ms: 2_000 },
            ..SessionConfig::default()
        };
        let mut pipeline = Pipeline::new(config, &clock).unwrap();
        pipeline.apply_status(&status(
            r#"{"power":{"busVoltage":12.0,"current":1.0,"power":12.0}}"#,
        ));

        let report = pipeline.apply_history_now(&history(
            r#"{"now":100,"entries":[
                {"uptime":90,"busVoltage":12.0,"current":1.0},
                {"uptime":100,"busVoltage":12.0,"current":1.0}
            ]}"#,
        ));

        assert_eq!(report.power.merged, 1);
        assert_eq!(report.power.dropped, 1);
        assert_eq!(pipeline.store().power().history().len(), 2);
    }

    #[test]
    fn test_fetch_failure_keeps_live_data() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        pipeline.begin_subscription();
        pipeline.begin_fetch();
        pipeline.apply_status(&heaters(&[0.4]));

        let result = pipeline.handle_event(TelemetryEvent::History(Err(
            TelemetryError::transport("503"),
        )));

        assert!(matches!(result, Err(TelemetryError::Transport(_))));
        assert_eq!(pipeline.fetch_status(), FetchStatus::Failed);
        assert!(pipeline.last_fetch_error().is_some());
        assert_eq!(pipeline.state(), PipelineState::Live);
        assert_eq!(output_duties(&pipeline, 0), vec![0.4]);

        assert!(pipeline.handle_event(TelemetryEvent::Status(heaters(&[0.5]))).is_ok());
        assert_eq!(output_duties(&pipeline, 0), vec![0.4, 0.5]);
    }

    #[test]
    fn test_fetch_failure_before_data_keeps_waiting() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        pipeline.begin_subscription();
        pipeline.begin_fetch();
        pipeline.fetch_failed(TelemetryError::transport("refused"));

        assert_eq!(pipeline.state(), PipelineState::AwaitingFirstData);
    }

    #[test]
    fn test_fetch_deadline() {
        let clock = clock();
        let config = SessionConfig {
            fetch_timeout_ms: Some(5_000),
            ..SessionConfig::default()
        };
        let mut pipeline = Pipeline::new(config, &clock).unwrap();
        pipeline.begin_fetch();

        clock.advance(Duration::from_millis(4_999));
        assert!(!pipeline.poll_deadline());
        assert_eq!(pipeline.state(), PipelineState::AwaitingFirstData);

        clock.advance(Duration::from_millis(1));
        assert!(pipeline.poll_deadline());
        assert_eq!(pipeline.fetch_status(), FetchStatus::TimedOut);
        assert_eq!(pipeline.state(), PipelineState::Live);
        assert!(pipeline.store().power().history().is_empty());
        assert!(!pipeline.poll_deadline());

        // A late response still lands
        pipeline.apply_history_now(&history(
            r#"{"now":100,"entries":[{"uptime":99,"busVoltage":12.0,"current":1.0}]}"#,
        ));
        assert_eq!(pipeline.fetch_status(), FetchStatus::Completed);
        assert_eq!(pipeline.store().power().history().len(), 1);
    }

    #[test]
    fn test_fetch_deadline_only_while_pending() {
        let clock = clock();
        let config = SessionConfig {
            fetch_timeout_ms: Some(1_500),
            ..SessionConfig::default()
        };
        let mut pipeline = Pipeline::new(config, &clock).unwrap();
        assert_eq!(pipeline.fetch_deadline(), None);

        pipeline.begin_subscription();
        pipeline.begin_fetch();
        assert_eq!(
            pipeline.fetch_deadline(),
            Some(Timestamp::from_millis(T0 + 1_500))
        );

        clock.advance(Duration::from_secs(2));
        assert!(pipeline.poll_deadline());
        assert_eq!(pipeline.fetch_deadline(), None);
    }

    #[test]
    fn test_no_deadline_without_timeout() {
        let clock = clock();
        let mut pipeline = Pipeline::new(SessionConfig::default(), &clock).unwrap();
        pipeline.begin_fetch();
        clock.advance(Duration::from_secs(3600));

        assert!(!pipeline.poll_deadline());
        assert_eq!(pipeline.state(), PipelineState::AwaitingFirstData);
    }

    #[test]
    fn test_history_capacity_applies_to_merge() {
        let clock = clock();
        let config = SessionConfig {
            history_capacity: 3,
            ..SessionConfig::default()
        };
        let mut pipeline = Pipeline::new(config, &clock).unwrap();

        let entries: Vec<String> = (1..=6)
            .map(|uptime| format!(r#"{{"uptime":{},"busVoltage":{}.0,"current":1.0}}"#, uptime, uptime))
            .collect();
        pipeline.apply_history_now(&history(&format!(
            r#"{{"now":6,"entries":[{}]}}"#,
            entries.join(",")
        )));

        let volts: Vec<f32> = pipeline
            .store()
            .power()
            .history_snapshot()
            .map(|s| s.value.bus_voltage)
            .collect();
        assert_eq!(volts, vec![4.0, 5.0, 6.0]);
    }
}
