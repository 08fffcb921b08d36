//! Quote normalizer: reconciles partial/alias-named quote frames into a
//! coherent last-quote state and synthesizes mid-price ticks for the
//! ingestor.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::BookSide;
use crate::tick::TickKind;

/// One incoming quote frame. Field aliases collapse the vendor's
/// `bestBid`/`bid`, `bestAsk`/`ask`, and `lastPrice`/`last`/`price`
/// variants onto single Rust fields via serde, so downstream code never
/// sees a raw alias dictionary.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawQuoteFrame {
    /// The bid price, under any of its vendor aliases.
    #[serde(alias = "bestBid")]
    pub bid: Option<Decimal>,
    /// The ask price, under any of its vendor aliases.
    #[serde(alias = "bestAsk")]
    pub ask: Option<Decimal>,
    /// The last-trade price, under any of its vendor aliases.
    #[serde(alias = "lastPrice", alias = "price")]
    pub last: Option<Decimal>,
    /// The last-trade volume, if this frame represents a trade.
    pub volume: Option<u64>,
}

/// Last-seen bid/ask, retained across partial frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuoteState {
    /// Last-seen bid price.
    pub bid: Option<Decimal>,
    /// Last-seen ask price.
    pub ask: Option<Decimal>,
}

impl QuoteState {
    /// Apply any non-null bid/ask from `frame`, leaving the other field
    /// untouched.
    pub fn apply(&mut self, frame: &RawQuoteFrame) {
        if let Some(bid) = frame.bid {
            self.bid = Some(bid);
        }
        if let Some(ask) = frame.ask {
            self.ask = Some(ask);
        }
    }

    /// The mid price, if both sides are known.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        }
    }
}

/// The synthesized tick derived from a quote frame, or `None` if the frame
/// carried nothing ingestible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesizedTick {
    /// The synthesized price.
    pub price: Decimal,
    /// The synthesized volume (only non-zero for `TickKind::Trade`).
    pub volume: u64,
    /// Whether this synthesizes a trade or a quote tick.
    pub kind: TickKind,
}

/// Decide the tick kind and price for a quote frame.
/// Does not mutate `state`; call [`QuoteState::apply`] first.
pub fn synthesize_tick(frame: &RawQuoteFrame, state: &QuoteState) -> Option<SynthesizedTick> {
    if let (Some(last), Some(volume)) = (frame.last, frame.volume) {
        return Some(SynthesizedTick {
            price: last,
            volume,
            kind: TickKind::Trade,
        });
    }
    if let Some(mid) = state.mid() {
        return Some(SynthesizedTick {
            price: mid,
            volume: 0,
            kind: TickKind::Quote,
        });
    }
    if let Some(bid) = state.bid {
        return Some(SynthesizedTick {
            price: bid,
            volume: 0,
            kind: TickKind::Quote,
        });
    }
    if let Some(ask) = state.ask {
        return Some(SynthesizedTick {
            price: ask,
            volume: 0,
            kind: TickKind::Quote,
        });
    }
    None
}

/// A normalized quote event ready for dispatch on the `quote_update`
/// channel, emitted only once both sides of the book
/// are known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedQuote {
    /// Bid price.
    pub bid: Decimal,
    /// Ask price.
    pub ask: Decimal,
    /// Size at the bid, from the matching Level-2 level or an estimate.
    pub bid_size: u64,
    /// Size at the ask, from the matching Level-2 level or an estimate.
    pub ask_size: u64,
    /// `true` if either size was estimated rather than read from the book.
    pub sizes_estimated: bool,
}

/// Estimate a level's size from the current spread in ticks, per a fixed
/// lookup table: 1 tick -> 150, 2 ticks -> 100, else 50.
fn estimate_size_from_spread_ticks(spread_ticks: u32) -> u64 {
    match spread_ticks {
        1 => 150,
        2 => 100,
        _ => 50,
    }
}

/// Build the normalized quote frame for dispatch, filling sizes from the
/// matching Level-2 level (within one tick of the quoted price) or, as a
/// last resort, from the spread-ticks lookup table.
/// Returns `None` if either side of `state` is still unknown.
pub fn normalize_for_dispatch(
    state: &QuoteState,
    bid_side: &BookSide,
    ask_side: &BookSide,
    tick_size: Decimal,
) -> Option<NormalizedQuote> {
    let (bid, ask) = (state.bid?, state.ask?);

    let level_size = |side: &BookSide, price: Decimal| -> Option<u64> {
        side.top(usize::MAX)
            .into_iter()
            .find(|l| (l.price - price).abs() <= tick_size)
            .map(|l| l.volume)
    };

    let spread_ticks = if tick_size > Decimal::ZERO {
        ((ask - bid) / tick_size)
            .round()
            .to_i64()
            .unwrap_or(0)
            .unsigned_abs() as u32
    } else {
        0
    };
    let estimated_size = estimate_size_from_spread_ticks(spread_ticks.max(1));

    let bid_level_size = level_size(bid_side, bid);
    let ask_level_size = level_size(ask_side, ask);
    let sizes_estimated = bid_level_size.is_none() || ask_level_size.is_none();

    Some(NormalizedQuote {
        bid,
        ask,
        bid_size: bid_level_size.unwrap_or(estimated_size),
        ask_size: ask_level_size.unwrap_or(estimated_size),
        sizes_estimated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Side;
    use rust_decimal_macros::dec;

    #[test]
    fn quote_normalization_estimates_sizes_absent_from_the_book() {
        let mut state = QuoteState::default();
        let frame = RawQuoteFrame {
            bid: Some(dec!(100)),
            ask: Some(dec!(100.25)),
            last: None,
            volume: None,
        };
        state.apply(&frame);

        let bid_side = BookSide::new(Side::Bid, 100);
        let ask_side = BookSide::new(Side::Ask, 100);
        let normalized =
            normalize_for_dispatch(&state, &bid_side, &ask_side, dec!(0.25)).unwrap();

        assert_eq!(normalized.bid_size, 150);
        assert_eq!(normalized.ask_size, 150);
        assert!(normalized.sizes_estimated);

        let tick = synthesize_tick(&frame, &state).unwrap();
        assert_eq!(tick.kind, TickKind::Quote);
        assert_eq!(tick.price, dec!(100.125));
        assert_eq!(tick.volume, 0);
    }

    #[test]
    fn bid_only_frame_updates_state_but_no_dispatch() {
        let mut state = QuoteState::default();
        let frame = RawQuoteFrame {
            bid: Some(dec!(100)),
            ask: None,
            last: None,
            volume: None,
        };
        state.apply(&frame);

        let bid_side = BookSide::new(Side::Bid, 100);
        let ask_side = BookSide::new(Side::Ask, 100);
        assert!(normalize_for_dispatch(&state, &bid_side, &ask_side, dec!(0.25)).is_none());

        let tick = synthesize_tick(&frame, &state).unwrap();
        assert_eq!(tick.kind, TickKind::Quote);
        assert_eq!(tick.price, dec!(100));
        assert_eq!(tick.volume, 0);
    }

    #[test]
    fn alias_fields_deserialize_onto_canonical_names() {
        let json = r#"{"bestBid": 100.0, "bestAsk": 100.5, "lastPrice": 100.25, "volume": 3}"#;
        let frame: RawQuoteFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.bid, Some(dec!(100.0)));
        assert_eq!(frame.ask, Some(dec!(100.5)));
        assert_eq!(frame.last, Some(dec!(100.25)));
        assert_eq!(frame.volume, Some(3));
    }
}
