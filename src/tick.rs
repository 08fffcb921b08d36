//! Normalized tick ingestion: a single price/volume event fanned out across
//! every configured timeframe's bar series in one pass.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::bar::Bar;
use crate::bar_series::{AppendOutcome, BarSeriesStore};
use crate::error::EngineError;
use crate::time::Timeframe;

/// Whether a tick originated from an execution or was synthesized from a
/// quote update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// A real trade print: carries a non-zero volume.
    Trade,
    /// A synthesized quote tick (mid, or one-sided bid/ask): volume is 0.
    Quote,
}

/// One normalized price event ready to update bar series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// When the tick occurred.
    pub ts: DateTime<Utc>,
    /// The tick price.
    pub price: Decimal,
    /// The tick volume (0 for quote-derived ticks).
    pub volume: u64,
    /// Trade vs. quote origin.
    pub kind: TickKind,
}

/// A timeframe whose current bar just closed or was created, for dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewBarEvent {
    /// Which timeframe produced the bar.
    pub timeframe: Timeframe,
    /// The bar itself.
    pub bar: Bar,
}

/// Everything that happened while fanning one tick across every
/// configured timeframe.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Bars that were newly opened by this tick, one per timeframe that
    /// rolled over.
    pub new_bars: Vec<NewBarEvent>,
    /// Number of timeframes whose current bar was updated in place.
    pub updated: usize,
    /// Number of timeframes that discarded this tick as late.
    pub discarded_late: usize,
}

/// Apply one tick to every series in `store`, under a single borrow —
/// callers hold `bars_lock` for the whole call, so every timeframe either
/// sees the tick or none do.
pub fn ingest_tick(store: &mut BarSeriesStore, tick: Tick) -> Result<IngestOutcome, EngineError> {
    let mut outcome = IngestOutcome::default();

    let timeframes: Vec<Timeframe> = store.timeframes().collect();
    for tf in timeframes {
        let series = store.get_mut(tf)?;
        match series.append_or_update(tick.ts, tick.price, tick.volume) {
            AppendOutcome::NewBar => {
                if let Some(bar) = series.current() {
                    outcome.new_bars.push(NewBarEvent { timeframe: tf, bar: *bar });
                }
            }
            AppendOutcome::Updated => outcome.updated += 1,
            AppendOutcome::DiscardedLate => outcome.discarded_late += 1,
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeUnit;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, m, s).unwrap()
    }

    #[test]
    fn a_single_tick_opens_a_bar_on_every_configured_timeframe() {
        let timeframes = [
            Timeframe::new(1, TimeUnit::Minute),
            Timeframe::new(5, TimeUnit::Minute),
        ];
        let mut store = BarSeriesStore::new(&timeframes, 1000, false);

        let outcome = ingest_tick(
            &mut store,
            Tick {
                ts: ts(0, 0),
                price: dec!(100),
                volume: 1,
                kind: TickKind::Trade,
            },
        )
        .unwrap();

        assert_eq!(outcome.new_bars.len(), 2);
        assert!(store.all_have_bars());
    }

    #[test]
    fn a_late_tick_is_discarded_on_every_timeframe_without_partial_application() {
        let timeframes = [Timeframe::new(1, TimeUnit::Minute)];
        let mut store = BarSeriesStore::new(&timeframes, 1000, false);

        ingest_tick(
            &mut store,
            Tick { ts: ts(1, 0), price: dec!(100), volume: 1, kind: TickKind::Trade },
        )
        .unwrap();
        let outcome = ingest_tick(
            &mut store,
            Tick { ts: ts(0, 0), price: dec!(50), volume: 1, kind: TickKind::Trade },
        )
        .unwrap();

        assert_eq!(outcome.discarded_late, 1);
        assert_eq!(outcome.new_bars.len(), 0);
    }

    #[test]
    fn unknown_timeframe_lookup_fails_without_mutating_any_series() {
        let timeframes = [Timeframe::new(1, TimeUnit::Minute)];
        let mut store = BarSeriesStore::new(&timeframes, 1000, false);
        let unconfigured = Timeframe::new(1, TimeUnit::Hour);
        assert!(store.get(unconfigured).is_err());
    }
}
