//! OHLCV bar value type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar for a single bucket. The OHLC ordering invariant, `low <=
/// min(open, close) <= max(open, close) <= high`, is enforced by every
/// mutator in [`crate::bar_series::BarSeries`] rather than here. Volume is
/// the raw cumulative contribution; it floors to 1 per bucket only when
/// [`crate::config::EngineConfig::enforce_min_bar_volume`] opts into that
/// (non-standard) compatibility behavior, and is 0 otherwise for a bucket
/// that only ever saw zero-volume (quote-synthesized) ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// The instant identifying this bar's bucket.
    pub bucket_start: DateTime<Utc>,
    /// Opening price: the price of the first tick in the bucket.
    pub open: Decimal,
    /// Highest price seen in the bucket so far.
    pub high: Decimal,
    /// Lowest price seen in the bucket so far.
    pub low: Decimal,
    /// Closing price: the price of the most recent tick in the bucket.
    pub close: Decimal,
    /// Cumulative volume contributed to the bucket.
    pub volume: u64,
}

impl Bar {
    /// Start a new bar from a single tick: OHLC all equal to `price`,
    /// volume set to the tick's raw contribution. Callers that want the
    /// minimum-1 compatibility floor apply it before calling this.
    pub fn opening(bucket_start: DateTime<Utc>, price: Decimal, volume: u64) -> Self {
        Bar {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// `true` iff the OHLC invariants hold: `low` is the minimum of the
    /// four prices and `high` the maximum. Volume carries no lower bound
    /// here — a bar built with minimum-volume enforcement off may
    /// legitimately sit at 0.
    pub fn invariants_hold(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high && self.low <= self.high
    }
}
