//! Depth-event classifier: translates vendor depth messages into book
//! mutations and trade-tape appends.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::side::{BookSide, Side};
use crate::trade::TradeTape;

/// One vendor depth-message entry, as it arrives over the wire. `type`
/// follows the vendor's entry-type code table; `timestamp` is an optional
/// ISO-8601 string (falls back to "now" if absent or unparsable).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawDepthEntry {
    /// The level's price.
    pub price: Decimal,
    /// The level's volume (0 means "remove", for types 1/2).
    pub volume: u64,
    /// The vendor entry-type code.
    #[serde(rename = "type")]
    pub entry_type: i32,
    /// Optional ISO-8601 timestamp string for this entry.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A parsed, statically-typed vendor depth entry: entry types are
/// resolved once at the wire boundary so downstream code never matches
/// on a raw type code again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthEntry {
    /// Type 1: an ask-side level write.
    Ask { price: Decimal, volume: u64 },
    /// Type 2: a bid-side level write.
    Bid { price: Decimal, volume: u64 },
    /// Type 5: an execution to append to the trade tape.
    Trade { price: Decimal, volume: u64 },
    /// Types 9/10: an order modification or cancellation, disambiguated by
    /// price vs. mid at classification time.
    Modify { code: i32, price: Decimal, volume: u64 },
    /// Any other vendor type code: counted, never mutates state.
    Unknown { code: i32 },
}

impl DepthEntry {
    /// Parse one wire entry into its sum-typed form.
    pub fn parse(raw: &RawDepthEntry) -> Self {
        match raw.entry_type {
            1 => DepthEntry::Ask {
                price: raw.price,
                volume: raw.volume,
            },
            2 => DepthEntry::Bid {
                price: raw.price,
                volume: raw.volume,
            },
            5 => DepthEntry::Trade {
                price: raw.price,
                volume: raw.volume,
            },
            code @ (9 | 10) => DepthEntry::Modify {
                code,
                price: raw.price,
                volume: raw.volume,
            },
            code => DepthEntry::Unknown { code },
        }
    }
}

/// Monotonic, lock-free counters for vendor entry types, readable without
/// acquiring `book_lock`.
#[derive(Debug, Default)]
pub struct OrderTypeStats {
    /// Count of type-1 (ask) entries processed.
    pub ask_updates: AtomicU64,
    /// Count of type-2 (bid) entries processed.
    pub bid_updates: AtomicU64,
    /// Count of type-5 (trade) entries processed.
    pub trade_entries: AtomicU64,
    /// Count of type-9/10 (modify/cancel) entries processed.
    pub modify_or_cancel: AtomicU64,
    /// Count of entries with an unrecognized type code.
    pub other_types: AtomicU64,
}

impl OrderTypeStats {
    fn record(&self, entry: &DepthEntry) {
        let counter = match entry {
            DepthEntry::Ask { .. } => &self.ask_updates,
            DepthEntry::Bid { .. } => &self.bid_updates,
            DepthEntry::Trade { .. } => &self.trade_entries,
            DepthEntry::Modify { .. } => &self.modify_or_cancel,
            DepthEntry::Unknown { .. } => &self.other_types,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time snapshot of the counters, for `order_type_stats()`.
    pub fn snapshot(&self) -> OrderTypeStatsSnapshot {
        OrderTypeStatsSnapshot {
            ask_updates: self.ask_updates.load(Ordering::Relaxed),
            bid_updates: self.bid_updates.load(Ordering::Relaxed),
            trade_entries: self.trade_entries.load(Ordering::Relaxed),
            modify_or_cancel: self.modify_or_cancel.load(Ordering::Relaxed),
            other_types: self.other_types.load(Ordering::Relaxed),
        }
    }
}

/// An owned, cloneable copy of [`OrderTypeStats`] for the read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderTypeStatsSnapshot {
    /// Count of type-1 (ask) entries processed.
    pub ask_updates: u64,
    /// Count of type-2 (bid) entries processed.
    pub bid_updates: u64,
    /// Count of type-5 (trade) entries processed.
    pub trade_entries: u64,
    /// Count of type-9/10 (modify/cancel) entries processed.
    pub modify_or_cancel: u64,
    /// Count of entries with an unrecognized type code.
    pub other_types: u64,
}

/// What happened while classifying one batch, for the caller to decide
/// whether/what to dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyOutcome {
    /// Number of entries applied to the bid side.
    pub bid_writes: usize,
    /// Number of entries applied to the ask side.
    pub ask_writes: usize,
    /// Number of trades appended to the tape.
    pub trades_appended: usize,
    /// Number of modify/cancel entries that had to fall back to writing
    /// both sides because mid was unknown (lossy but self-correcting: the
    /// next unambiguous type-1/2 update on that price corrects it).
    pub ambiguous_modifies: usize,
}

/// Classify and apply one batch of vendor depth entries, routing each by
/// its entry-type code. Each entry's optional ISO-8601 timestamp string
/// is resolved to an instant, falling back to `now` on absence or parse
/// failure.
#[allow(clippy::too_many_arguments)]
pub fn classify_depth_batch(
    bid: &mut BookSide,
    ask: &mut BookSide,
    tape: &mut TradeTape,
    stats: &OrderTypeStats,
    entries: &[RawDepthEntry],
    now: DateTime<Utc>,
) -> ClassifyOutcome {
    let mut outcome = ClassifyOutcome::default();

    for raw in entries {
        let ts = raw
            .timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        let entry = DepthEntry::parse(raw);
        stats.record(&entry);

        match entry {
            DepthEntry::Ask { price, volume } => {
                ask.apply_update(price, volume, ts, "ask");
                outcome.ask_writes += 1;
            }
            DepthEntry::Bid { price, volume } => {
                bid.apply_update(price, volume, ts, "bid");
                outcome.bid_writes += 1;
            }
            DepthEntry::Trade { price, volume } => {
                if volume > 0 {
                    let best_bid = bid.best().map(|l| l.price);
                    let best_ask = ask.best().map(|l| l.price);
                    tape.append(price, volume, ts, best_bid, best_ask);
                    outcome.trades_appended += 1;
                }
            }
            DepthEntry::Modify { price, volume, .. } => {
                let mid = match (bid.best(), ask.best()) {
                    (Some(b), Some(a)) => Some((b.price + a.price) / Decimal::TWO),
                    _ => None,
                };
                match mid {
                    Some(mid) if price <= mid => {
                        bid.apply_update(price, volume, ts, "modify");
                        outcome.bid_writes += 1;
                    }
                    Some(_) => {
                        ask.apply_update(price, volume, ts, "modify");
                        outcome.ask_writes += 1;
                    }
                    None => {
                        // Mid unknown: write both sides, idempotent for
                        // absent keys. The next unambiguous type 1/2
                        // update corrects whichever side was wrong.
                        bid.apply_update(price, volume, ts, "modify");
                        ask.apply_update(price, volume, ts, "modify");
                        outcome.bid_writes += 1;
                        outcome.ask_writes += 1;
                        outcome.ambiguous_modifies += 1;
                    }
                }
            }
            DepthEntry::Unknown { .. } => {}
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn entry(price: Decimal, volume: u64, entry_type: i32) -> RawDepthEntry {
        RawDepthEntry {
            price,
            volume,
            entry_type,
            timestamp: None,
        }
    }

    #[test]
    fn modify_and_cancel_entries_disambiguate_by_mid_and_self_correct() {
        let mut bid = BookSide::new(Side::Bid, 100);
        let mut ask = BookSide::new(Side::Ask, 100);
        let mut tape = TradeTape::new(1000);
        let stats = OrderTypeStats::default();

        classify_depth_batch(
            &mut bid,
            &mut ask,
            &mut tape,
            &stats,
            &[entry(dec!(100), 5, 2), entry(dec!(101), 4, 1)],
            now(),
        );
        assert_eq!(bid.best().unwrap().price, dec!(100));
        assert_eq!(ask.best().unwrap().price, dec!(101));

        // Type 10 cancel at 100 with mid known (100.5) hits the bid side.
        classify_depth_batch(
            &mut bid,
            &mut ask,
            &mut tape,
            &stats,
            &[entry(dec!(100), 0, 10)],
            now(),
        );
        assert!(bid.is_empty());
        assert_eq!(ask.best().unwrap().price, dec!(101));

        // Type 9 write at 101 with mid unknown (bid side now empty) writes
        // both sides.
        let outcome = classify_depth_batch(
            &mut bid,
            &mut ask,
            &mut tape,
            &stats,
            &[entry(dec!(101), 7, 9)],
            now(),
        );
        assert_eq!(outcome.ambiguous_modifies, 1);
        assert_eq!(ask.best().unwrap().volume, 7);
        assert_eq!(bid.best().unwrap().price, dec!(101));

        // A later unambiguous update corrects the stray bid write.
        classify_depth_batch(
            &mut bid,
            &mut ask,
            &mut tape,
            &stats,
            &[entry(dec!(99), 3, 2)],
            now(),
        );
        assert_eq!(bid.best().unwrap().price, dec!(99));
    }

    #[test]
    fn unknown_type_counted_and_inert() {
        let mut bid = BookSide::new(Side::Bid, 100);
        let mut ask = BookSide::new(Side::Ask, 100);
        let mut tape = TradeTape::new(1000);
        let stats = OrderTypeStats::default();

        classify_depth_batch(
            &mut bid,
            &mut ask,
            &mut tape,
            &stats,
            &[entry(dec!(1), 1, 42)],
            now(),
        );

        assert!(bid.is_empty() && ask.is_empty());
        assert_eq!(stats.snapshot().other_types, 1);
    }
}
