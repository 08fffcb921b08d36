//! A bounded FIFO of executions tagged with an inferred aggressor side,
//! plus the flow summaries layered on top of it.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The inferred aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    /// The trade crossed the ask: the buyer was the aggressor.
    Buy,
    /// The trade crossed the bid: the seller was the aggressor.
    Sell,
    /// No usable top-of-book was available at ingest time.
    Unknown,
}

/// One executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution price.
    pub price: Decimal,
    /// Executed volume.
    pub volume: u64,
    /// Execution instant.
    pub ts: DateTime<Utc>,
    /// Inferred aggressor side.
    pub side: TradeSide,
}

/// A bounded FIFO of executions, newest last, capped at `max_trades`.
#[derive(Debug, Clone)]
pub struct TradeTape {
    trades: VecDeque<Trade>,
    max_trades: usize,
}

impl TradeTape {
    /// Create an empty tape capped at `max_trades`.
    pub fn new(max_trades: usize) -> Self {
        TradeTape {
            trades: VecDeque::new(),
            max_trades: max_trades.max(1),
        }
    }

    /// Number of trades currently held.
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// `true` iff the tape is empty.
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Append a trade, inferring its side from the current top-of-book:
    /// `price >= best_ask` -> Buy, `price <= best_bid` -> Sell, otherwise
    /// Unknown. Evicts the oldest trade if over capacity.
    pub fn append(
        &mut self,
        price: Decimal,
        volume: u64,
        ts: DateTime<Utc>,
        best_bid: Option<Decimal>,
        best_ask: Option<Decimal>,
    ) -> TradeSide {
        let side = match (best_bid, best_ask) {
            (_, Some(ask)) if price >= ask => TradeSide::Buy,
            (Some(bid), _) if price <= bid => TradeSide::Sell,
            _ => TradeSide::Unknown,
        };
        self.trades.push_back(Trade {
            price,
            volume,
            ts,
            side,
        });
        while self.trades.len() > self.max_trades {
            self.trades.pop_front();
        }
        side
    }

    /// The most recent `n` trades, newest last.
    pub fn recent(&self, n: usize) -> Vec<Trade> {
        let n = n.min(self.trades.len());
        self.trades.iter().rev().take(n).rev().copied().collect()
    }

    fn in_window(&self, now: DateTime<Utc>, window: Duration) -> impl Iterator<Item = &Trade> {
        let cutoff = now - window;
        self.trades.iter().filter(move |t| t.ts >= cutoff)
    }

    /// Aggregate flow statistics over the trailing `window` ending at
    /// `now`.
    pub fn summary(&self, now: DateTime<Utc>, window: Duration) -> TradeFlowSummary {
        let mut total_volume = 0u64;
        let mut trade_count = 0u64;
        let mut buy_volume = 0u64;
        let mut sell_volume = 0u64;
        let mut notional = Decimal::ZERO;

        for t in self.in_window(now, window) {
            total_volume += t.volume;
            trade_count += 1;
            notional += t.price * Decimal::from(t.volume);
            match t.side {
                TradeSide::Buy => buy_volume += t.volume,
                TradeSide::Sell => sell_volume += t.volume,
                TradeSide::Unknown => {}
            }
        }

        let vwap = if total_volume > 0 {
            Some(notional / Decimal::from(total_volume))
        } else {
            None
        };
        let avg_size = if trade_count > 0 {
            Some(Decimal::from(total_volume) / Decimal::from(trade_count))
        } else {
            None
        };
        let buy_sell_ratio = if sell_volume > 0 {
            Some(Decimal::from(buy_volume) / Decimal::from(sell_volume))
        } else {
            None
        };

        TradeFlowSummary {
            total_volume,
            trade_count,
            buy_volume,
            sell_volume,
            vwap,
            avg_size,
            buy_sell_ratio,
        }
    }

    /// Cumulative buy-minus-sell delta over the trailing `window`, plus a
    /// bucketed classification and the running per-trade series.
    pub fn cumulative_delta(&self, now: DateTime<Utc>, window: Duration) -> CumulativeDelta {
        let mut running = 0i64;
        let mut series = Vec::new();
        for t in self.in_window(now, window) {
            let signed = match t.side {
                TradeSide::Buy => i64::try_from(t.volume).unwrap_or(i64::MAX),
                TradeSide::Sell => -i64::try_from(t.volume).unwrap_or(i64::MAX),
                TradeSide::Unknown => 0,
            };
            running += signed;
            series.push(running);
        }

        let classification = match running {
            d if d >= 500 => DeltaClassification::StronglyBullish,
            d if d >= 100 => DeltaClassification::Bullish,
            d if d > -100 => DeltaClassification::Neutral,
            d if d > -500 => DeltaClassification::Bearish,
            _ => DeltaClassification::StronglyBearish,
        };

        CumulativeDelta {
            delta: running,
            classification,
            series,
        }
    }

    /// Bucket the whole tape (unwindowed) by `floor(price / bucket_size)`,
    /// returning the point of control and value area.
    pub fn volume_profile(&self, bucket_size: Decimal) -> VolumeProfile {
        debug_assert!(bucket_size > Decimal::ZERO);
        let mut buckets: Vec<ProfileBucket> = Vec::new();

        for t in &self.trades {
            let bucket_index = (t.price / bucket_size).floor();
            match buckets.iter_mut().find(|b| b.index == bucket_index) {
                Some(b) => {
                    b.total_volume += t.volume;
                    b.price_sum += t.price;
                    b.trade_count += 1;
                }
                None => buckets.push(ProfileBucket {
                    index: bucket_index,
                    low: bucket_index * bucket_size,
                    high: (bucket_index + Decimal::ONE) * bucket_size,
                    total_volume: t.volume,
                    price_sum: t.price,
                    trade_count: 1,
                }),
            }
        }
        buckets.sort_by(|a, b| a.index.cmp(&b.index));

        let total_volume: u64 = buckets.iter().map(|b| b.total_volume).sum();
        let poc = buckets
            .iter()
            .max_by_key(|b| b.total_volume)
            .map(|b| b.mean_price());

        let mut by_volume_desc: Vec<&ProfileBucket> = buckets.iter().collect();
        by_volume_desc.sort_by(|a, b| b.total_volume.cmp(&a.total_volume));
        let target = (total_volume as f64 * 0.7).ceil() as u64;
        let mut accumulated = 0u64;
        let mut value_area_buckets: Vec<&ProfileBucket> = Vec::new();
        for b in by_volume_desc {
            if accumulated >= target && !value_area_buckets.is_empty() {
                break;
            }
            accumulated += b.total_volume;
            value_area_buckets.push(b);
        }
        let value_area = if value_area_buckets.is_empty() {
            None
        } else {
            let high = value_area_buckets
                .iter()
                .map(|b| b.mean_price())
                .fold(Decimal::MIN, Decimal::max);
            let low = value_area_buckets
                .iter()
                .map(|b| b.mean_price())
                .fold(Decimal::MAX, Decimal::min);
            Some(ValueArea { high, low })
        };

        VolumeProfile {
            buckets,
            poc,
            value_area,
        }
    }
}

/// Flow summary over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TradeFlowSummary {
    /// Total traded volume in the window.
    pub total_volume: u64,
    /// Number of trades in the window.
    pub trade_count: u64,
    /// Volume of buy-tagged trades.
    pub buy_volume: u64,
    /// Volume of sell-tagged trades.
    pub sell_volume: u64,
    /// Volume-weighted average price, if any volume traded.
    pub vwap: Option<Decimal>,
    /// Mean trade size, if any trades occurred.
    pub avg_size: Option<Decimal>,
    /// `buy_volume / sell_volume`, if `sell_volume > 0`.
    pub buy_sell_ratio: Option<Decimal>,
}

/// Bucketed classification of a [`CumulativeDelta`] at thresholds
/// `{+-100, +-500}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaClassification {
    /// Delta >= 500.
    StronglyBullish,
    /// 100 <= delta < 500.
    Bullish,
    /// -100 < delta < 100.
    Neutral,
    /// -500 < delta <= -100.
    Bearish,
    /// Delta <= -500.
    StronglyBearish,
}

/// Cumulative buy-minus-sell delta over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeDelta {
    /// `Σbuy - Σsell` over the window.
    pub delta: i64,
    /// Bucketed classification of `delta`.
    pub classification: DeltaClassification,
    /// The running delta after each trade in the window, oldest first.
    pub series: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProfileBucket {
    index: Decimal,
    low: Decimal,
    high: Decimal,
    total_volume: u64,
    price_sum: Decimal,
    trade_count: u64,
}

impl ProfileBucket {
    fn mean_price(&self) -> Decimal {
        self.price_sum / Decimal::from(self.trade_count)
    }
}

/// One price bucket in a [`VolumeProfile`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeProfileBucket {
    /// Lower bound of this bucket (inclusive).
    pub low: Decimal,
    /// Upper bound of this bucket (exclusive).
    pub high: Decimal,
    /// Total traded volume in the bucket.
    pub total_volume: u64,
    /// Number of trades in the bucket.
    pub trade_count: u64,
}

/// The smallest set of buckets, by descending volume, whose cumulative
/// volume reaches 70% of the profile's total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueArea {
    /// Highest mean price among the value-area buckets.
    pub high: Decimal,
    /// Lowest mean price among the value-area buckets.
    pub low: Decimal,
}

/// Volume profile over (by default) the whole tape, bucketed by price.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeProfile {
    buckets: Vec<ProfileBucket>,
    /// The point of control: mean price of the highest-volume bucket.
    pub poc: Option<Decimal>,
    /// The value area, if any trades were profiled.
    pub value_area: Option<ValueArea>,
}

impl VolumeProfile {
    /// The profiled buckets, in ascending price order.
    pub fn buckets(&self) -> Vec<VolumeProfileBucket> {
        self.buckets
            .iter()
            .map(|b| VolumeProfileBucket {
                low: b.low,
                high: b.high,
                total_volume: b.total_volume,
                trade_count: b.trade_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn trade_side_is_inferred_from_top_of_book_at_execution_time() {
        let mut tape = TradeTape::new(1000);
        let bid = Some(dec!(99));
        let ask = Some(dec!(101));

        assert_eq!(tape.append(dec!(100), 1, now(), bid, ask), TradeSide::Unknown);
        assert_eq!(tape.append(dec!(101), 1, now(), bid, ask), TradeSide::Buy);
        assert_eq!(tape.append(dec!(99), 1, now(), bid, ask), TradeSide::Sell);
        assert_eq!(tape.append(dec!(102), 1, now(), bid, ask), TradeSide::Buy);
    }

    #[test]
    fn cap_evicts_oldest_keeps_newest_last() {
        let mut tape = TradeTape::new(2);
        tape.append(dec!(1), 1, now(), None, None);
        tape.append(dec!(2), 1, now(), None, None);
        tape.append(dec!(3), 1, now(), None, None);
        assert_eq!(tape.len(), 2);
        let recent = tape.recent(10);
        assert_eq!(recent.last().unwrap().price, dec!(3));
        assert_eq!(recent.first().unwrap().price, dec!(2));
    }

    #[test]
    fn cumulative_delta_matches_definition() {
        let mut tape = TradeTape::new(1000);
        let bid = Some(dec!(99));
        let ask = Some(dec!(101));
        tape.append(dec!(101), 10, now(), bid, ask); // buy
        tape.append(dec!(99), 4, now(), bid, ask); // sell
        tape.append(dec!(101), 3, now(), bid, ask); // buy

        let cd = tape.cumulative_delta(now(), Duration::hours(1));
        assert_eq!(cd.delta, 10 - 4 + 3);
    }

    #[test]
    fn volume_profile_poc_is_highest_volume_bucket() {
        let mut tape = TradeTape::new(1000);
        tape.append(dec!(100.2), 5, now(), None, None);
        tape.append(dec!(100.4), 20, now(), None, None);
        tape.append(dec!(101.1), 3, now(), None, None);

        let profile = tape.volume_profile(dec!(1));
        assert!(profile.poc.is_some());
        let poc = profile.poc.unwrap();
        assert!(poc >= dec!(100) && poc < dec!(101));
    }
}
