pub mod series;
pub mod stats;

pub use series::{BoundedSeries, Sample, SeriesIter};
pub use stats::SeriesStats;

/// Number of samples each channel keeps unless configured otherwise
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Time window for chart views and statistics
///
/// Live pushes arrive about once a second, so the default capacity covers a
/// little over fifteen minutes of live data. Device history reaches further
/// back at its own recording cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// Last minute
    OneMinute,
    /// Last 5 minutes
    FiveMinutes,
    /// Last 15 minutes
    FifteenMinutes,
    /// Last hour
    OneHour,
    /// Everything the series still holds
    All,
}

impl TimeWindow {
    /// Get a short label for display
    pub const fn label(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::All => "all",
        }
    }

    /// Get the duration of this window in milliseconds, `None` when unbounded
    pub const fn duration_ms(self) -> Option<i64> {
        match self {
            Self::OneMinute => Some(60_000),
            Self::FiveMinutes => Some(300_000),
            Self::FifteenMinutes => Some(900_000),
            Self::OneHour => Some(3_600_000),
            Self::All => None,
        }
    }
}
