//! Timeframe identity: an (interval, unit) pair with a closed set of
//! well-known names.

use std::fmt;

use crate::error::EngineError;

/// The unit a [`Timeframe`] interval is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Whole seconds.
    Second,
    /// Whole minutes.
    Minute,
    /// Whole hours.
    Hour,
    /// Whole days.
    Day,
    /// Whole weeks (week start is the ISO week's Monday).
    Week,
    /// Whole calendar months.
    Month,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Second => "sec",
            TimeUnit::Minute => "min",
            TimeUnit::Hour => "hr",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        };
        f.write_str(s)
    }
}

/// A timeframe: a positive interval measured in a [`TimeUnit`].
///
/// The active set of timeframes is fixed at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    /// The interval, e.g. `5` for "5 minutes".
    pub interval: u32,
    /// The unit the interval is measured in.
    pub unit: TimeUnit,
}

impl Timeframe {
    /// Construct a timeframe directly. `interval` must be positive; this is
    /// enforced by every public constructor path (`parse`), not here, since
    /// callers assembling a `Timeframe` from already-validated parts (e.g.
    /// warm-up bookkeeping) should not have to re-prove it.
    pub const fn new(interval: u32, unit: TimeUnit) -> Self {
        Timeframe { interval, unit }
    }

    /// Parse one of the closed set of recognized timeframe names:
    /// `1sec, 5sec, 10sec, 15sec, 30sec, 1min, 5min, 15min, 30min, 1hr,
    /// 4hr, 1day, 1week, 1month`. Unknown names fail with `InvalidTimeframe`.
    pub fn parse(name: &str) -> Result<Self, EngineError> {
        let tf = match name {
            "1sec" => Timeframe::new(1, TimeUnit::Second),
            "5sec" => Timeframe::new(5, TimeUnit::Second),
            "10sec" => Timeframe::new(10, TimeUnit::Second),
            "15sec" => Timeframe::new(15, TimeUnit::Second),
            "30sec" => Timeframe::new(30, TimeUnit::Second),
            "1min" => Timeframe::new(1, TimeUnit::Minute),
            "5min" => Timeframe::new(5, TimeUnit::Minute),
            "15min" => Timeframe::new(15, TimeUnit::Minute),
            "30min" => Timeframe::new(30, TimeUnit::Minute),
            "1hr" => Timeframe::new(1, TimeUnit::Hour),
            "4hr" => Timeframe::new(4, TimeUnit::Hour),
            "1day" => Timeframe::new(1, TimeUnit::Day),
            "1week" => Timeframe::new(1, TimeUnit::Week),
            "1month" => Timeframe::new(1, TimeUnit::Month),
            other => {
                return Err(EngineError::InvalidTimeframe {
                    name: other.to_string(),
                });
            }
        };
        Ok(tf)
    }

    /// The staleness budget `health()` uses for this timeframe: `interval
    /// * 4s` for SECOND units, otherwise `interval * 60s * 1.2 + 180s`.
    pub fn staleness_budget(&self) -> chrono::Duration {
        let secs: i64 = match self.unit {
            TimeUnit::Second => i64::from(self.interval) * 4,
            _ => {
                let minutes_equivalent = self.approx_minutes();
                (minutes_equivalent as f64 * 60.0 * 1.2) as i64 + 180
            }
        };
        chrono::Duration::seconds(secs)
    }

    /// A rough minutes-equivalent of this timeframe's interval, used only
    /// for the staleness-budget formula above: HOUR/DAY/WEEK/MONTH
    /// intervals are expressed in minutes before applying it.
    fn approx_minutes(&self) -> u64 {
        let interval = u64::from(self.interval);
        match self.unit {
            TimeUnit::Second => 0,
            TimeUnit::Minute => interval,
            TimeUnit::Hour => interval * 60,
            TimeUnit::Day => interval * 60 * 24,
            TimeUnit::Week => interval * 60 * 24 * 7,
            TimeUnit::Month => interval * 60 * 24 * 30,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.interval, self.unit)
    }
}
