//! A capped, per-timeframe series of OHLCV bars and the store that holds
//! one such series per configured timeframe.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::bar::Bar;
use crate::error::EngineError;
use crate::time::{bucket_start, Timeframe};

/// Outcome of [`BarSeries::append_or_update`], used by the caller to decide
/// whether a `new_bar` event must be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new bar was pushed; the previous last bar, if any, is now frozen.
    NewBar,
    /// The current (last) bar was updated in place.
    Updated,
    /// The tick's bucket was older than the current bar's bucket; the tick
    /// was discarded per the late-tick policy.
    DiscardedLate,
}

/// An ordered, capped sequence of bars for one timeframe. Every bar but the
/// last is frozen; the last is the one eligible for in-place updates.
#[derive(Debug, Clone)]
pub struct BarSeries {
    timeframe: Timeframe,
    bars: VecDeque<Bar>,
    max_bars: usize,
    enforce_min_bar_volume: bool,
}

impl BarSeries {
    /// Create an empty series capped at `max_bars` bars, with the
    /// minimum-1-volume compatibility floor off (the documented default).
    pub fn new(timeframe: Timeframe, max_bars: usize) -> Self {
        BarSeries::with_config(timeframe, max_bars, false)
    }

    /// Create an empty series capped at `max_bars` bars. When
    /// `enforce_min_bar_volume` is `true`, every bar's volume is floored to
    /// at least 1 even if every contributing tick carried volume 0 — the
    /// non-standard compatibility behavior some vendors' bars assume.
    pub fn with_config(timeframe: Timeframe, max_bars: usize, enforce_min_bar_volume: bool) -> Self {
        BarSeries {
            timeframe,
            bars: VecDeque::new(),
            max_bars: max_bars.max(1),
            enforce_min_bar_volume,
        }
    }

    /// The timeframe this series tracks.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Number of bars currently held.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// `true` if no bars have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The current (last, mutable) bar, if any.
    pub fn current(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Seed the series with historical bars during warm-up.
    /// Bars must already be in ascending `bucket_start` order; the caller
    /// (the lifecycle controller) is responsible for that ordering, as it
    /// comes directly from `HistoricalDataSource::get_bars`.
    pub fn seed(&mut self, bars: impl IntoIterator<Item = Bar>) {
        self.bars.extend(bars);
        self.evict_overflow();
    }

    /// The last `n` bars (or all, if `n` is `None`), oldest first.
    pub fn tail(&self, n: Option<usize>) -> Vec<Bar> {
        let n = n.unwrap_or(self.bars.len()).min(self.bars.len());
        self.bars.iter().rev().take(n).rev().copied().collect()
    }

    /// Apply a tick to this series: start a new bar, update the current
    /// bar, or discard a late tick.
    pub fn append_or_update(
        &mut self,
        ts: DateTime<Utc>,
        price: Decimal,
        volume_delta: u64,
    ) -> AppendOutcome {
        let bucket = bucket_start(ts, self.timeframe);
        let enforce = self.enforce_min_bar_volume;
        let opening_volume = floor_volume(volume_delta, enforce);

        let outcome = match self.bars.back() {
            None => {
                self.bars.push_back(Bar::opening(bucket, price, opening_volume));
                AppendOutcome::NewBar
            }
            Some(last) if bucket > last.bucket_start => {
                self.bars.push_back(Bar::opening(bucket, price, opening_volume));
                AppendOutcome::NewBar
            }
            Some(last) if bucket == last.bucket_start => {
                let bar = self.bars.back_mut().expect("checked Some above");
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                bar.volume = floor_volume(bar.volume + volume_delta, enforce);
                AppendOutcome::Updated
            }
            Some(_) => AppendOutcome::DiscardedLate,
        };

        if matches!(outcome, AppendOutcome::NewBar) {
            self.evict_overflow();
        }
        outcome
    }

    fn evict_overflow(&mut self) {
        while self.bars.len() > self.max_bars {
            self.bars.pop_front();
        }
    }
}

/// Apply the non-standard minimum-1-volume compatibility floor when
/// `enforce` is set; otherwise pass `volume` through unmodified, including 0.
fn floor_volume(volume: u64, enforce: bool) -> u64 {
    if enforce {
        volume.max(1)
    } else {
        volume
    }
}

/// One [`BarSeries`] per configured [`Timeframe`]; the set of keys is fixed
/// at construction and never grows or shrinks afterward. Lives behind
/// `bars_lock` in the engine.
#[derive(Debug, Clone)]
pub struct BarSeriesStore {
    series: HashMap<Timeframe, BarSeries>,
}

impl BarSeriesStore {
    /// Create a store with one empty series per timeframe in `timeframes`,
    /// all sharing `enforce_min_bar_volume`.
    pub fn new(timeframes: &[Timeframe], max_bars: usize, enforce_min_bar_volume: bool) -> Self {
        let series = timeframes
            .iter()
            .map(|tf| (*tf, BarSeries::with_config(*tf, max_bars, enforce_min_bar_volume)))
            .collect();
        BarSeriesStore { series }
    }

    /// The configured timeframes, in construction order is not preserved
    /// (backed by a `HashMap`); callers that need a stable order should
    /// sort the result themselves.
    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.series.keys().copied()
    }

    /// Borrow the series for one timeframe.
    pub fn get(&self, tf: Timeframe) -> Result<&BarSeries, EngineError> {
        self.series
            .get(&tf)
            .ok_or(EngineError::UnknownTimeframe { timeframe: tf })
    }

    /// Mutably borrow the series for one timeframe.
    pub fn get_mut(&mut self, tf: Timeframe) -> Result<&mut BarSeries, EngineError> {
        self.series
            .get_mut(&tf)
            .ok_or(EngineError::UnknownTimeframe { timeframe: tf })
    }

    /// `true` iff every configured timeframe has at least one bar.
    pub fn all_have_bars(&self) -> bool {
        self.series.values().all(|s| !s.is_empty())
    }

    /// The close of the finest (smallest-bucket) configured timeframe's
    /// current bar, used for `current_price()`. "Finest" is
    /// approximated by bucket duration at a fixed reference instant,
    /// since `Timeframe` alone does not linearly order across units.
    pub fn finest_current_close(&self) -> Option<Decimal> {
        let reference = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        self.series
            .keys()
            .min_by_key(|tf| bucket_duration_estimate(reference, **tf))
            .and_then(|tf| self.series.get(tf))
            .and_then(|s| s.current())
            .map(|b| b.close)
    }
}

fn bucket_duration_estimate(reference: DateTime<Utc>, tf: Timeframe) -> chrono::Duration {
    let next = bucket_start(
        reference + chrono::Duration::seconds(1) * i32::try_from(tf.interval).unwrap_or(1),
        tf,
    );
    next - bucket_start(reference, tf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeUnit;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(i64::from(ms)))
            .unwrap()
    }

    #[test]
    fn ticks_within_and_across_minute_buckets_build_the_expected_bars() {
        let tf = Timeframe::new(1, TimeUnit::Minute);
        let mut series = BarSeries::new(tf, 1000);

        let outcomes = [
            series.append_or_update(ts(12, 0, 0, 100), dec!(100), 1),
            series.append_or_update(ts(12, 0, 30, 0), dec!(101), 2),
            series.append_or_update(ts(12, 0, 59, 900), dec!(99), 3),
            series.append_or_update(ts(12, 1, 0, 200), dec!(102), 4),
        ];
        let new_bar_count = outcomes
            .iter()
            .filter(|o| **o == AppendOutcome::NewBar)
            .count();

        assert_eq!(new_bar_count, 2);
        let bars = series.tail(None);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, dec!(100));
        assert_eq!(bars[0].high, dec!(101));
        assert_eq!(bars[0].low, dec!(99));
        assert_eq!(bars[0].close, dec!(99));
        assert_eq!(bars[0].volume, 6);
        assert_eq!(bars[1].open, dec!(102));
        assert_eq!(bars[1].high, dec!(102));
        assert_eq!(bars[1].low, dec!(102));
        assert_eq!(bars[1].close, dec!(102));
        assert_eq!(bars[1].volume, 4);
    }

    #[test]
    fn late_tick_is_discarded_without_mutating_bars() {
        let tf = Timeframe::new(1, TimeUnit::Minute);
        let mut series = BarSeries::new(tf, 1000);
        series.append_or_update(ts(12, 1, 0, 0), dec!(100), 1);
        let before = series.tail(None);

        let outcome = series.append_or_update(ts(12, 0, 30, 0), dec!(999), 99);

        assert_eq!(outcome, AppendOutcome::DiscardedLate);
        assert_eq!(series.tail(None), before);
    }

    #[test]
    fn idempotent_same_bucket_same_close_zero_volume() {
        let tf = Timeframe::new(1, TimeUnit::Minute);
        let mut series = BarSeries::new(tf, 1000);
        series.append_or_update(ts(12, 0, 0, 0), dec!(100), 1);
        let before = series.tail(None);

        let outcome = series.append_or_update(ts(12, 0, 30, 0), dec!(100), 0);

        assert_eq!(outcome, AppendOutcome::Updated);
        let after = series.tail(None);
        assert_eq!(before[0].volume, after[0].volume);
        assert_eq!(before[0].open, after[0].open);
        assert_eq!(before[0].high, after[0].high);
        assert_eq!(before[0].low, after[0].low);
        assert_eq!(before[0].close, after[0].close);
    }

    #[test]
    fn zero_volume_ticks_leave_a_zero_volume_bar_when_enforcement_is_off() {
        let tf = Timeframe::new(1, TimeUnit::Minute);
        let mut series = BarSeries::new(tf, 1000);
        series.append_or_update(ts(12, 0, 0, 0), dec!(100), 0);
        assert_eq!(series.current().unwrap().volume, 0);
        series.append_or_update(ts(12, 0, 30, 0), dec!(101), 0);
        assert_eq!(series.current().unwrap().volume, 0);
    }

    #[test]
    fn zero_volume_ticks_are_floored_to_one_when_enforcement_is_on() {
        let tf = Timeframe::new(1, TimeUnit::Minute);
        let mut series = BarSeries::with_config(tf, 1000, true);
        series.append_or_update(ts(12, 0, 0, 0), dec!(100), 0);
        assert_eq!(series.current().unwrap().volume, 1);
        series.append_or_update(ts(12, 0, 30, 0), dec!(101), 0);
        assert_eq!(series.current().unwrap().volume, 1);
    }

    #[test]
    fn eviction_caps_series_length() {
        let tf = Timeframe::new(1, TimeUnit::Second);
        let mut series = BarSeries::new(tf, 3);
        for i in 0..10u32 {
            series.append_or_update(ts(12, 0, i, 0), dec!(100), 1);
        }
        assert_eq!(series.len(), 3);
        let bars = series.tail(None);
        // bucket_start values must be strictly increasing and only the
        // last three survive.
        assert!(bars.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
    }

    #[test]
    fn all_bars_satisfy_ohlcv_invariants() {
        let tf = Timeframe::new(1, TimeUnit::Second);
        let mut series = BarSeries::new(tf, 1000);
        for (i, p) in [(0, 100), (1, 105), (1, 95), (2, 110)] {
            series.append_or_update(ts(12, 0, i, 0), Decimal::from(p), 1);
        }
        for bar in series.tail(None) {
            assert!(bar.invariants_hold(), "{bar:?}");
        }
    }
}
