//! Wall-clock timestamps and projection of device uptime onto them
//!
//! The device never reports absolute time. Its history entries carry the
//! uptime at which they were recorded, and the history response carries the
//! uptime at which it was produced. Pairing that with the wall-clock reading
//! taken when the response arrived gives a [`ReconciliationAnchor`], which is
//! enough to place every entry on the wall clock.
//!
//! The projection assumes the uptime counter advances at wall-clock rate. It
//! drifts if the device slept or was paused; that is not corrected.

use core::cell::Cell;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub const fn saturating_add_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    pub const fn saturating_sub_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_sub(millis))
    }

    /// Absolute distance between two instants in milliseconds
    pub const fn abs_diff_millis(self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }
}

/// Wall-clock and device-uptime readings taken together for one history batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationAnchor {
    pub wall_clock_at_fetch: Timestamp,
    pub device_uptime_at_fetch: Duration,
}

impl ReconciliationAnchor {
    pub const fn new(wall_clock_at_fetch: Timestamp, device_uptime_at_fetch: Duration) -> Self {
        Self {
            wall_clock_at_fetch,
            device_uptime_at_fetch,
        }
    }

    /// Project an entry's uptime through this anchor. See [`reconcile`].
    pub fn project(&self, entry_uptime: Duration) -> Timestamp {
        reconcile(self, entry_uptime)
    }
}

/// `wall_clock_at_fetch - (device_uptime_at_fetch - entry_uptime)`
///
/// Computed with signed arithmetic, so an entry newer than the anchor (a
/// reboot while the response was in flight) lands after the anchor instead
/// of failing. Results outside the `i64` range saturate.
pub fn reconcile(anchor: &ReconciliationAnchor, entry_uptime: Duration) -> Timestamp {
    let lag = anchor.device_uptime_at_fetch.as_millis() as i128 - entry_uptime.as_millis() as i128;
    let millis = anchor.wall_clock_at_fetch.as_millis() as i128 - lag;

    Timestamp(millis.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
}

/// Source of the current wall-clock time
pub trait Clock {
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Clock that only moves when told to
///
/// Used by tests and by replays of captured payloads, where time has to
/// follow the capture rather than the host.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    pub const fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start.0),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.set(now.0);
    }

    pub fn advance(&self, by: Duration) {
        let step = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.set(self.now.get().saturating_add(step));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_projects_to_epoch() {
        let anchor =
            ReconciliationAnchor::new(Timestamp::from_millis(10_000), Duration::from_secs(500));
        assert_eq!(reconcile(&anchor, Duration::from_secs(490)), Timestamp::EPOCH);
    }

    #[test]
    fn test_reconcile_at_anchor_uptime() {
        let anchor = ReconciliationAnchor::new(
            Timestamp::from_millis(1_700_000_000_000),
            Duration::from_secs(3600),
        );
        assert_eq!(
            anchor.project(Duration::from_secs(3600)),
            Timestamp::from_millis(1_700_000_000_000)
        );
    }

    #[test]
    fn test_reconcile_entry_newer_than_anchor() {
        // Uptime past the anchor happens when the device rebooted mid-flight
        let anchor = ReconciliationAnchor::new(Timestamp::from_millis(50_000), Duration::from_secs(10));
        assert_eq!(
            reconcile(&anchor, Duration::from_secs(15)),
            Timestamp::from_millis(55_000)
        );
    }

    #[test]
    fn test_reconcile_is_monotonic_in_uptime() {
        let anchor =
            ReconciliationAnchor::new(Timestamp::from_millis(900_000), Duration::from_secs(600));
        let projected: Vec<Timestamp> = [0u64, 1, 1, 30, 599, 600]
            .iter()
            .map(|secs| anchor.project(Duration::from_secs(*secs)))
            .collect();

        assert!(projected.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_reconcile_saturates() {
        let anchor = ReconciliationAnchor::new(Timestamp::from_millis(i64::MIN + 5), Duration::MAX);
        assert_eq!(reconcile(&anchor, Duration::ZERO).as_millis(), i64::MIN);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(Timestamp::from_millis(1_000));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Timestamp::from_millis(1_250));

        let by_ref = &clock;
        clock.set(Timestamp::from_millis(42));
        assert_eq!(by_ref.now(), Timestamp::from_millis(42));
    }
}
