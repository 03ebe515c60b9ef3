//! Replays AstroPowerBox telemetry through a dashboard session.
//!
//! Feeds a history response and a sequence of status events into
//! `apb-core` exactly as the dashboard transport would, then logs what the
//! session ended up with. Useful for checking captures from a real device
//! without a browser, and for eyeballing merge behavior.
//!
//! # Usage
//!
//! | Invocation                                                | Source                    |
//! |-----------------------------------------------------------|---------------------------|
//! | `apb-replay`                                              | Synthetic device          |
//! | `apb-replay <history.json> <status.jsonl> [config.json]`  | Captured payloads         |
//!
//! Status captures hold one `status` event body per line. Events are spaced
//! one second apart on a manual clock that starts at the host's current time.
//! Set `RUST_LOG=debug` to see every tick.

use std::env;
use std::f64::consts::TAU;
use std::fs;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{error, info, warn};
use serde_json::json;

use apb_core::metrics::DewRisk;
use apb_core::readings::OutputType;
use apb_core::registry::OutputField;
use apb_core::storage::TimeWindow;
use apb_core::{
    Clock, EventQueue, ManualClock, Session, SessionConfig, TelemetryStore, Timestamp,
};

// ---------------------------------------------------------------------------
// Replay constants
// ---------------------------------------------------------------------------

/// Spacing between replayed status events (the device pushes at ~1 Hz).
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Status events generated in synthetic mode.
const SYNTHETIC_TICKS: usize = 120;

/// History entries generated in synthetic mode.
const SYNTHETIC_HISTORY_ENTRIES: usize = 300;

/// Device-side recording interval of synthetic history entries.
const SYNTHETIC_HISTORY_INTERVAL_SECS: u64 = 10;

/// Window used for the summary statistics.
const SUMMARY_WINDOW: TimeWindow = TimeWindow::FiveMinutes;

// ---------------------------------------------------------------------------
// Synthetic device
// ---------------------------------------------------------------------------

/// Produces status and history bodies shaped like the firmware's.
struct MockDevice {
    /// Seconds since the fake boot
    uptime_secs: u64,
}

impl MockDevice {
    fn new(uptime_secs: u64) -> Self {
        Self { uptime_secs }
    }

    /// Ambient temperature, humidity and dewpoint at a given uptime.
    fn ambient_at(uptime_secs: u64) -> (f64, f64, f64) {
        let t = uptime_secs as f64;
        let temperature = 6.0 + 3.0 * (TAU * t / 3600.0).sin() + 0.3 * (t / 47.0).cos();
        let humidity = (82.0 + 8.0 * (TAU * t / 2700.0).cos()).clamp(0.0, 100.0);

        // Magnus approximation
        let gamma = (humidity / 100.0).ln() + 17.62 * temperature / (243.12 + temperature);
        let dewpoint = 243.12 * gamma / (17.62 - gamma);

        (temperature, humidity, dewpoint)
    }

    /// Heater duty tracking the dewpoint margin.
    fn heater_duty(temperature: f64, dewpoint: f64) -> f64 {
        ((dewpoint + 5.0 - temperature) / 5.0).clamp(0.0, 1.0)
    }

    fn next_status(&mut self) -> String {
        self.uptime_secs += STATUS_INTERVAL.as_secs();
        let (temperature, humidity, dewpoint) = Self::ambient_at(self.uptime_secs);
        let duty = Self::heater_duty(temperature, dewpoint);
        let current = 0.2 + 2.5 * duty;

        json!({
            "ambient": { "temperature": temperature, "humidity": humidity, "dewpoint": dewpoint },
            "power": {
                "busVoltage": 12.2,
                "current": current,
                "power": 12.2 * current,
                "shuntVoltage": current * 10.0
            },
            "pwmOutputs": [
                {
                    "mode": "dewpoint", "max_duty": 1.0, "min_duty": 0.0, "duty": duty,
                    "active": duty > 0.0, "has_temperature": true, "apply_at_startup": true,
                    "type": "heater", "temperature": temperature + 8.0 * duty,
                    "dewpoint_offset": 5.0
                },
                {
                    "mode": "off", "max_duty": 1.0, "duty": 0.0, "active": false,
                    "has_temperature": false, "apply_at_startup": false, "type": "output"
                }
            ],
            "app": { "uptime": self.uptime_secs }
        })
        .to_string()
    }

    fn history(&self) -> String {
        let span = SYNTHETIC_HISTORY_ENTRIES as u64 * SYNTHETIC_HISTORY_INTERVAL_SECS;
        let first = self.uptime_secs.saturating_sub(span);

        let entries: Vec<_> = (1..=SYNTHETIC_HISTORY_ENTRIES as u64)
            .map(|i| {
                let uptime = first + i * SYNTHETIC_HISTORY_INTERVAL_SECS;
                let (temperature, humidity, dewpoint) = Self::ambient_at(uptime);
                let duty = Self::heater_duty(temperature, dewpoint);
                let current = 0.2 + 2.5 * duty;

                json!({
                    "uptime": uptime,
                    "ambientTemperature": temperature,
                    "ambientHumidity": humidity,
                    "ambientDewpoint": dewpoint,
                    "busVoltage": 12.2,
                    "current": current,
                    "power": 12.2 * current,
                    "pwmOutputs": [
                        { "duty": duty, "temperature": temperature + 8.0 * duty },
                        { "duty": 0.0, "temperature": null }
                    ]
                })
            })
            .collect();

        json!({ "now": self.uptime_secs, "entries": entries }).to_string()
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

struct Captures {
    /// Body of the history response, or why it is unavailable
    history: Result<String, String>,
    /// One status event body per entry
    statuses: Vec<String>,
    config: SessionConfig,
}

fn synthetic_captures() -> Captures {
    let mut device = MockDevice::new(4 * 3600);
    let history = device.history();
    let statuses = (0..SYNTHETIC_TICKS).map(|_| device.next_status()).collect();

    Captures {
        history: Ok(history),
        statuses,
        config: SessionConfig::default(),
    }
}

fn file_captures(args: &[String]) -> Result<Captures, String> {
    let history = fs::read_to_string(&args[0]).map_err(|e| format!("{}: {}", args[0], e));

    let statuses = fs::read_to_string(&args[1])
        .map_err(|e| format!("{}: {}", args[1], e))?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    let config = match args.get(2) {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
            SessionConfig::from_json(&text).map_err(|e| format!("{}: {}", path, e))?
        }
        None => SessionConfig::default(),
    };

    Ok(Captures {
        history,
        statuses,
        config,
    })
}

fn wall_clock_now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    Timestamp::from_millis(i64::try_from(millis).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

fn fmt_opt(value: Option<f32>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

fn log_summary(store: &TelemetryStore, now: Timestamp) {
    let ambient = store.ambient();
    if let Some(reading) = ambient.current() {
        info!(
            "Ambient: {} °C, {} %RH, dewpoint {} °C",
            fmt_opt(reading.temperature),
            fmt_opt(reading.humidity),
            fmt_opt(reading.dewpoint)
        );
    } else {
        info!("Ambient: not available");
    }
    let stats = ambient
        .history()
        .stats(SUMMARY_WINDOW, now, |a| a.temperature);
    info!(
        "Ambient temperature ({}): avg {:.2} min {:.2} max {:.2} over {} of {} samples",
        SUMMARY_WINDOW.label(),
        stats.avg,
        stats.min,
        stats.max,
        stats.count,
        ambient.history().len()
    );
    if let Some(risk) = store.dew_risk() {
        info!("Dew risk: {}", risk.label());
        if risk >= DewRisk::High {
            warn!("Optics at risk of fogging");
        }
    }

    let power = store.power();
    match power.current() {
        Some(reading) => info!(
            "Power: {:.2} V, {:.3} A, {:.2} W",
            reading.bus_voltage, reading.current, reading.power
        ),
        None => info!("Power: not available"),
    }
    let stats = power
        .history()
        .stats(SUMMARY_WINDOW, now, |p| Some(p.power));
    info!(
        "Power ({}): avg {:.2} W, peak {:.2} W over {} of {} samples",
        SUMMARY_WINDOW.label(),
        stats.avg,
        stats.max,
        stats.count,
        power.history().len()
    );

    for projection in store.output_projections(None) {
        let kind = projection.kind.map_or("unknown", OutputType::label);
        let duty = projection.current.map(|reading| reading.effective_duty());
        let stats = projection.history.stats(SUMMARY_WINDOW, now, |point| {
            OutputField::Duty.value(point)
        });
        info!(
            "{} ({}): duty {}, avg {:.2} over {} of {} samples",
            projection.series_key(OutputField::Duty),
            kind,
            fmt_opt(duty),
            stats.avg,
            stats.count,
            projection.history.len()
        );
    }
    info!(
        "Heaters: {:?}",
        store.outputs_of_type(OutputType::Heater)
    );

    if let Some(uptime) = store.device_uptime() {
        info!("Device uptime: {} s", uptime.as_secs());
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let captures = match args.len() {
        0 => {
            info!("No captures given, replaying a synthetic device");
            synthetic_captures()
        }
        2 | 3 => match file_captures(&args) {
            Ok(captures) => captures,
            Err(e) => {
                error!("Failed to load captures: {}", e);
                return ExitCode::FAILURE;
            }
        },
        _ => {
            error!("Usage: apb-replay [<history.json> <status.jsonl> [config.json]]");
            return ExitCode::from(2);
        }
    };

    let queue = EventQueue::new();
    let clock = ManualClock::new(wall_clock_now());
    let mut session = match Session::open(&queue, captures.config, &clock) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to open session: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // The dashboard fires the history fetch as it subscribes
    let completer = queue.fetch_completer();
    let posted = match &captures.history {
        Ok(body) => completer.resolve(body),
        Err(reason) => completer.fail(reason),
    };
    if let Err(e) = posted {
        warn!("History response not queued: {}", e);
    }

    let sender = queue.push_sender();
    for (line, body) in captures.statuses.iter().enumerate() {
        if let Err(e) = sender.deliver(body) {
            warn!("Status event {} not queued: {}", line + 1, e);
        }
        if let Err(e) = session.pump() {
            error!("History unavailable, continuing with live data: {}", e);
        }
        clock.advance(STATUS_INTERVAL);
    }
    if let Err(e) = session.pump() {
        error!("History unavailable: {}", e);
    }

    info!(
        "Replayed {} status events, session {:?}, fetch {:?}",
        captures.statuses.len(),
        session.state(),
        session.pipeline().fetch_status()
    );
    log_summary(session.store(), clock.now());

    session.close();
    ExitCode::SUCCESS
}
