//! A sorted price-level map for one side of the book, with insert/modify/
//! cancel semantics and top-N queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use rust_decimal::Decimal;

use super::level::PriceLevel;

/// Which side of the book a [`BookSide`] represents. Determines iteration
/// order: bids descend from the best (highest) price, asks ascend from the
/// best (lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The bid side (buy orders); best is the highest price.
    Bid,
    /// The ask side (sell orders); best is the lowest price.
    Ask,
}

/// One side of the order book: a price -> level map, capped at
/// `max_levels`, always keeping the levels closest to the top of book.
#[derive(Debug)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, PriceLevel>,
    max_levels: usize,
    /// Top-of-book cached lock-free, so callers on the hot ingestion path
    /// (trade-side inference, iceberg observation) can read it without
    /// going through the full level map.
    best_cache: AtomicCell<Option<(Decimal, u64)>>,
}

impl Clone for BookSide {
    fn clone(&self) -> Self {
        BookSide {
            side: self.side,
            levels: self.levels.clone(),
            max_levels: self.max_levels,
            best_cache: AtomicCell::new(self.best_cache.load()),
        }
    }
}

impl BookSide {
    /// Create an empty side capped at `max_levels` entries.
    pub fn new(side: Side, max_levels: usize) -> Self {
        BookSide {
            side,
            levels: BTreeMap::new(),
            max_levels: max_levels.max(1),
            best_cache: AtomicCell::new(None),
        }
    }

    fn refresh_best_cache(&self) {
        let best = self.top_iter().next().map(|l| (l.price, l.volume));
        self.best_cache.store(best);
    }

    /// The best (top-of-book) price and volume, read from the lock-free
    /// cache rather than the level map. Equivalent to `best()` but does
    /// not walk the `BTreeMap`.
    pub fn cached_best(&self) -> Option<(Decimal, u64)> {
        self.best_cache.load()
    }

    /// Which side this is.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of resting levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// `true` iff there are no resting levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Insert, overwrite, or remove a level: `volume == 0`
    /// removes the level (a no-op if absent); otherwise the level is set,
    /// overwriting any prior entry at that price. The side is
    /// cap-enforced after every mutation.
    pub fn apply_update(
        &mut self,
        price: Decimal,
        volume: u64,
        ts: DateTime<Utc>,
        origin_type: &'static str,
    ) {
        if volume == 0 {
            self.levels.remove(&price);
            self.refresh_best_cache();
            return;
        }
        self.levels.insert(
            price,
            PriceLevel {
                price,
                volume,
                last_update: ts,
                origin_type,
            },
        );
        self.cap_to(self.max_levels);
        self.refresh_best_cache();
    }

    /// The best (top-of-book) level, if any.
    pub fn best(&self) -> Option<PriceLevel> {
        self.top_iter().next()
    }

    /// The top `n` levels in side-natural order.
    pub fn top(&self, n: usize) -> Vec<PriceLevel> {
        self.top_iter().take(n).collect()
    }

    /// Sum of volume and count of levels whose price falls in
    /// `[lower, upper]` inclusive.
    pub fn depth_in_range(&self, lower: Decimal, upper: Decimal) -> (u64, usize) {
        let (lo, hi) = if lower <= upper {
            (lower, upper)
        } else {
            (upper, lower)
        };
        self.levels
            .range(lo..=hi)
            .fold((0u64, 0usize), |(vol, count), (_, lvl)| {
                (vol + lvl.volume, count + 1)
            })
    }

    /// Evict the worst `len() - max_levels` entries, measured from the top
    /// of book. No-op if already within budget.
    pub fn cap_to(&mut self, max_levels: usize) {
        while self.levels.len() > max_levels {
            let worst_key = match self.side {
                // Bids: worst is the lowest price (first key ascending).
                Side::Bid => self.levels.keys().next().copied(),
                // Asks: worst is the highest price (last key ascending).
                Side::Ask => self.levels.keys().next_back().copied(),
            };
            match worst_key {
                Some(k) => {
                    self.levels.remove(&k);
                }
                None => break,
            }
        }
    }

    /// All levels in side-natural order.
    pub fn top_iter(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        match self.side {
            Side::Bid => Box::new(self.levels.values().rev().copied()),
            Side::Ask => Box::new(self.levels.values().copied()),
        }
    }

    /// `true` iff every stored level has `volume > 0` — always true by
    /// construction, exposed for property tests.
    pub fn all_levels_positive_volume(&self) -> bool {
        self.levels.values().all(|l| l.volume > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn bids_iterate_descending_asks_ascending() {
        let mut bids = BookSide::new(Side::Bid, 100);
        bids.apply_update(dec!(99), 1, now(), "bid");
        bids.apply_update(dec!(100), 1, now(), "bid");
        bids.apply_update(dec!(98), 1, now(), "bid");
        let prices: Vec<_> = bids.top(10).iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(99), dec!(98)]);

        let mut asks = BookSide::new(Side::Ask, 100);
        asks.apply_update(dec!(101), 1, now(), "ask");
        asks.apply_update(dec!(103), 1, now(), "ask");
        asks.apply_update(dec!(102), 1, now(), "ask");
        let prices: Vec<_> = asks.top(10).iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(101), dec!(102), dec!(103)]);
    }

    #[test]
    fn zero_volume_removes_level() {
        let mut side = BookSide::new(Side::Bid, 100);
        side.apply_update(dec!(100), 5, now(), "bid");
        side.apply_update(dec!(100), 0, now(), "bid");
        assert!(side.is_empty());
    }

    #[test]
    fn removing_absent_level_is_a_no_op() {
        let mut side = BookSide::new(Side::Bid, 100);
        side.apply_update(dec!(100), 0, now(), "bid");
        assert!(side.is_empty());
    }

    #[test]
    fn cap_evicts_worst_first() {
        let mut side = BookSide::new(Side::Bid, 2);
        side.apply_update(dec!(100), 1, now(), "bid");
        side.apply_update(dec!(99), 1, now(), "bid");
        side.apply_update(dec!(98), 1, now(), "bid");
        assert_eq!(side.len(), 2);
        let prices: Vec<_> = side.top(10).iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(99)]);
    }

    #[test]
    fn cached_best_tracks_mutations_without_walking_the_map() {
        let mut side = BookSide::new(Side::Bid, 100);
        assert_eq!(side.cached_best(), None);

        side.apply_update(dec!(100), 5, now(), "bid");
        side.apply_update(dec!(101), 3, now(), "bid");
        assert_eq!(side.cached_best(), Some((dec!(101), 3)));

        side.apply_update(dec!(101), 0, now(), "bid");
        assert_eq!(side.cached_best(), Some((dec!(100), 5)));
    }

    #[test]
    fn depth_in_range_sums_inclusive() {
        let mut side = BookSide::new(Side::Ask, 100);
        side.apply_update(dec!(100), 5, now(), "ask");
        side.apply_update(dec!(101), 7, now(), "ask");
        side.apply_update(dec!(105), 3, now(), "ask");
        let (vol, count) = side.depth_in_range(dec!(100), dec!(101));
        assert_eq!((vol, count), (12, 2));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    proptest! {
        /// §8 invariant 5: after any sequence of updates, a side never
        /// exceeds its cap and every stored level has positive volume.
        #[test]
        fn any_update_sequence_stays_capped_and_positive(
            cap in 1usize..20,
            updates in proptest::collection::vec((1i64..50, 0u64..20), 0..100),
        ) {
            let mut side = BookSide::new(Side::Bid, cap);
            for (price, volume) in updates {
                side.apply_update(Decimal::from(price), volume, now(), "bid");
            }
            prop_assert!(side.len() <= cap);
            prop_assert!(side.all_levels_positive_volume());
            if let Some((price, volume)) = side.cached_best() {
                prop_assert!(volume > 0);
                prop_assert_eq!(Some((price, volume)), side.best().map(|l| (l.price, l.volume)));
            } else {
                prop_assert!(side.is_empty());
            }
        }
    }
}
