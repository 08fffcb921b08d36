//! The steady-state engine: bar series plus order book behind two
//! coarse locks, and the snapshot read API layered over both.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::{
    self, AnalyticsFlags, AnalyticsParams, AnalyticsSnapshot, BestBidAsk, Cluster, DepthInRange,
    IcebergHistory, IcebergScore, Imbalance, LiquidityLevel, SupportResistanceLevel,
};
use crate::bar::Bar;
use crate::bar_series::BarSeriesStore;
use crate::book::{
    classify_depth_batch, BookSide, ClassifyOutcome, OrderTypeStats, OrderTypeStatsSnapshot,
    PriceLevel, RawDepthEntry, Side,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{
    DataUpdatePayload, EnhancedTrade, EventBus, Executor, MarketDepthPayload, MarketTradePayload,
    RawTradeEntry,
};
use crate::quote::{normalize_for_dispatch, synthesize_tick, QuoteState, RawQuoteFrame};
use crate::stats::{EngineStats, EngineStatsSnapshot};
use crate::tick::{ingest_tick as fan_out_tick, Tick, TickKind};
use crate::time::Timeframe;
use crate::trade::{Trade, TradeFlowSummary, TradeSide, TradeTape};

/// One incoming trade-channel entry, as it arrives over the wire.
/// `entry_type == 0` means the vendor tagged it a sell, anything else a
/// buy; `volume` missing falls back to
/// [`EngineConfig::small_trade_volume_default`].
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct WireTradeEntry {
    /// Execution price.
    pub price: Decimal,
    /// Execution volume, if the vendor included one.
    pub volume: Option<u64>,
    /// The vendor's raw side code.
    #[serde(rename = "type")]
    pub entry_type: i32,
    /// Optional ISO-8601 timestamp string for this entry.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Everything `book_lock` guards: both book sides, the trade tape, quote
/// state, and the analytics-level counters (iceberg history, order-type
/// stats).
pub struct BookState {
    /// The bid side.
    pub bid: BookSide,
    /// The ask side.
    pub ask: BookSide,
    /// The trade tape.
    pub tape: TradeTape,
    /// Last-seen bid/ask from quote frames.
    pub quote: QuoteState,
    /// Per-level iceberg refresh history.
    pub iceberg: IcebergHistory,
    /// Lock-free per-entry-type vendor counters.
    pub order_type_stats: OrderTypeStats,
}

impl BookState {
    fn new(max_levels_per_side: usize, max_trades: usize) -> Self {
        BookState {
            bid: BookSide::new(Side::Bid, max_levels_per_side),
            ask: BookSide::new(Side::Ask, max_levels_per_side),
            tape: TradeTape::new(max_trades),
            quote: QuoteState::default(),
            iceberg: IcebergHistory::new(),
            order_type_stats: OrderTypeStats::default(),
        }
    }
}

/// Bid/ask snapshot for the read API, copied out from under `book_lock`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookSnapshot {
    /// Bid levels, best first.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    pub asks: Vec<PriceLevel>,
    /// The instant this snapshot was taken.
    pub as_of: DateTime<Utc>,
}

/// Combined counters for `statistics()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatistics {
    /// Engine-wide activity counters.
    pub engine: EngineStatsSnapshot,
    /// Per-vendor-entry-type counters.
    pub order_types: OrderTypeStatsSnapshot,
}

/// Structural health of the engine's held state, independent of the
/// lifecycle controller's `Streaming`/`Stopped` state.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// `true` iff every configured timeframe has at least one bar.
    pub bars_populated: bool,
    /// Timeframes whose current bar is older than its staleness budget.
    pub stale_timeframes: Vec<Timeframe>,
    /// `true` iff the best bid crosses the best ask.
    pub crossed_book: bool,
}

impl HealthReport {
    /// `true` iff bars are populated, none are stale, and the book is
    /// not crossed.
    pub fn healthy(&self) -> bool {
        self.bars_populated && self.stale_timeframes.is_empty() && !self.crossed_book
    }
}

/// The steady-state engine for one instrument: synchronized multi-
/// timeframe bar series plus a Level-2 order book, with derived
/// analytics and subscriber dispatch layered on top.
pub struct Engine {
    config: EngineConfig,
    bars: RwLock<BarSeriesStore>,
    book: RwLock<BookState>,
    stats: EngineStats,
    /// Subscriber callback channels.
    pub events: EventBus,
    executor: RwLock<Option<Arc<dyn Executor>>>,
}

impl Engine {
    /// Build an engine with empty bars and an empty book, per `config`.
    pub fn new(config: EngineConfig) -> Self {
        let bars = BarSeriesStore::new(
            &config.timeframes,
            config.max_bars_per_series,
            config.enforce_min_bar_volume,
        );
        let book = BookState::new(config.max_levels_per_side, config.max_trades);
        Engine {
            config,
            bars: RwLock::new(bars),
            book: RwLock::new(book),
            stats: EngineStats::new(),
            events: EventBus::default(),
            executor: RwLock::new(None),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install (or clear, with `None`) the executor asynchronous
    /// callbacks are scheduled on.
    pub fn set_executor(&self, executor: Option<Arc<dyn Executor>>) {
        *self.executor.write().unwrap() = executor;
    }

    fn executor_ref(&self) -> Option<Arc<dyn Executor>> {
        self.executor.read().unwrap().clone()
    }

    /// Seed one timeframe's series with historical bars during warm-up.
    pub fn seed_bars(&self, tf: Timeframe, bars: impl IntoIterator<Item = Bar>) -> Result<(), EngineError> {
        let mut store = self.bars.write().unwrap();
        store.get_mut(tf)?.seed(bars);
        Ok(())
    }

    /// Fan a normalized tick out to every configured timeframe, then
    /// dispatch `data_update` and any `new_bar` events.
    pub fn ingest_tick(&self, tick: Tick) -> Result<(), EngineError> {
        let outcome = {
            let mut store = self.bars.write().unwrap();
            fan_out_tick(&mut store, tick)?
        };
        self.stats
            .record_ingest(outcome.new_bars.len(), outcome.discarded_late);

        let payload = DataUpdatePayload {
            ts: tick.ts,
            price: tick.price,
            volume: tick.volume,
        };
        let mut errors = self
            .events
            .data_update
            .dispatch(&payload, self.executor_ref().as_deref());
        for event in &outcome.new_bars {
            errors += self
                .events
                .new_bar
                .dispatch(event, self.executor_ref().as_deref());
        }
        self.record_callback_errors(errors);
        Ok(())
    }

    /// Classify and apply one vendor depth frame, updating iceberg
    /// history for written levels and dispatching `market_depth`.
    pub fn apply_depth_frame(&self, entries: &[RawDepthEntry], now: DateTime<Utc>) -> ClassifyOutcome {
        let outcome = {
            let mut book = self.book.write().unwrap();
            let BookState {
                bid,
                ask,
                tape,
                order_type_stats,
                iceberg,
                ..
            } = &mut *book;
            let outcome = classify_depth_batch(bid, ask, tape, order_type_stats, entries, now);
            for raw in entries {
                if matches!(raw.entry_type, 1 | 2) && raw.volume > 0 {
                    iceberg.observe(raw.price, raw.volume, now);
                }
            }
            outcome
        };
        self.stats.record_depth_frame();
        let payload = MarketDepthPayload {
            entries: entries.to_vec(),
        };
        let errors = self
            .events
            .market_depth
            .dispatch(&payload, self.executor_ref().as_deref());
        self.record_callback_errors(errors);
        outcome
    }

    /// Apply one quote frame: update quote state, synthesize and ingest
    /// a tick from it, and dispatch `quote_update` once both sides are
    /// known.
    pub fn apply_quote_frame(
        &self,
        frame: RawQuoteFrame,
        now: DateTime<Utc>,
        tick_size: Decimal,
    ) -> Result<(), EngineError> {
        let (synthesized, normalized) = {
            let mut book = self.book.write().unwrap();
            book.quote.apply(&frame);
            let synthesized = synthesize_tick(&frame, &book.quote);
            let normalized = normalize_for_dispatch(&book.quote, &book.bid, &book.ask, tick_size);
            (synthesized, normalized)
        };
        self.stats.record_quote_frame();

        if let Some(synthesized) = synthesized {
            self.ingest_tick(Tick {
                ts: now,
                price: synthesized.price,
                volume: synthesized.volume,
                kind: synthesized.kind,
            })?;
        }
        if let Some(normalized) = normalized {
            let errors = self
                .events
                .quote_update
                .dispatch(&normalized, self.executor_ref().as_deref());
            self.record_callback_errors(errors);
        }
        Ok(())
    }

    /// Apply one batch of `market_trade` channel entries: append to the
    /// trade tape (inferring the enhanced side from top-of-book), feed a
    /// `Trade`-kind tick into the bar series, and dispatch
    /// `market_trade`.
    pub fn apply_trade_frame(&self, entries: &[WireTradeEntry], now: DateTime<Utc>) -> Result<(), EngineError> {
        for raw in entries {
            let ts = raw
                .timestamp
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);
            let volume = raw.volume.unwrap_or(self.config.small_trade_volume_default);

            let side = {
                let mut book = self.book.write().unwrap();
                let best_bid = book.bid.best().map(|l| l.price);
                let best_ask = book.ask.best().map(|l| l.price);
                book.tape.append(raw.price, volume, ts, best_bid, best_ask)
            };

            let payload = MarketTradePayload {
                raw: RawTradeEntry {
                    price: raw.price,
                    volume,
                    entry_type: raw.entry_type,
                    ts,
                },
                enhanced: EnhancedTrade {
                    ts,
                    price: raw.price,
                    size: volume,
                    side,
                    is_aggressive: side != TradeSide::Unknown,
                },
            };
            let errors = self
                .events
                .market_trade
                .dispatch(&payload, self.executor_ref().as_deref());
            self.record_callback_errors(errors);

            self.ingest_tick(Tick {
                ts,
                price: raw.price,
                volume,
                kind: TickKind::Trade,
            })?;
        }
        Ok(())
    }

    fn record_callback_errors(&self, count: u64) {
        for _ in 0..count {
            self.stats.record_callback_error();
        }
    }

    // ---- Read API ----

    /// The last `n` bars of one timeframe (all of them if `n` is `None`).
    pub fn get_bars(&self, tf: Timeframe, n: Option<usize>) -> Result<Vec<Bar>, EngineError> {
        let store = self.bars.read().unwrap();
        Ok(store.get(tf)?.tail(n))
    }

    /// The last `n` bars of every timeframe in `tfs` (all configured
    /// timeframes if `tfs` is `None`).
    pub fn get_mtf(
        &self,
        tfs: Option<&[Timeframe]>,
        n: Option<usize>,
    ) -> Result<HashMap<Timeframe, Vec<Bar>>, EngineError> {
        let store = self.bars.read().unwrap();
        let wanted: Vec<Timeframe> = match tfs {
            Some(tfs) => tfs.to_vec(),
            None => store.timeframes().collect(),
        };
        wanted
            .into_iter()
            .map(|tf| store.get(tf).map(|s| (tf, s.tail(n))))
            .collect()
    }

    /// The close of the finest configured timeframe's current bar.
    pub fn current_price(&self) -> Option<Decimal> {
        self.bars.read().unwrap().finest_current_close()
    }

    /// The top `levels` of each book side, copied out.
    pub fn orderbook_snapshot(&self, levels: usize) -> OrderbookSnapshot {
        let book = self.book.read().unwrap();
        OrderbookSnapshot {
            bids: book.bid.top(levels),
            asks: book.ask.top(levels),
            as_of: Utc::now(),
        }
    }

    /// Best bid/ask, spread, and mid.
    pub fn best_bid_ask(&self) -> BestBidAsk {
        let book = self.book.read().unwrap();
        analytics::best_bid_ask(&book.bid, &book.ask)
    }

    /// Depth within `delta` of `mid` on each side.
    pub fn orderbook_depth(&self, mid: Decimal, delta: Decimal) -> DepthInRange {
        let book = self.book.read().unwrap();
        analytics::depth_in_range(&book.bid, &book.ask, mid, delta)
    }

    /// Order-book imbalance, corroborated by recent trade flow.
    pub fn imbalance(&self, now: DateTime<Utc>) -> Option<Imbalance> {
        let book = self.book.read().unwrap();
        analytics::imbalance(&book.bid, &book.ask, &book.tape, now)
    }

    /// Liquidity concentrations on one side.
    pub fn liquidity_levels(&self, side: Side, min_volume: u64) -> Vec<LiquidityLevel> {
        let book = self.book.read().unwrap();
        match side {
            Side::Bid => analytics::liquidity_levels(&book.bid, min_volume),
            Side::Ask => analytics::liquidity_levels(&book.ask, min_volume),
        }
    }

    /// Nearby-level clusters on one side.
    pub fn clusters(&self, side: Side, top_n: usize, tolerance: Decimal, min_size: usize) -> Vec<Cluster> {
        let book = self.book.read().unwrap();
        match side {
            Side::Bid => analytics::clusters(&book.bid, top_n, tolerance, min_size),
            Side::Ask => analytics::clusters(&book.ask, top_n, tolerance, min_size),
        }
    }

    /// Candidate support/resistance levels.
    pub fn support_resistance(&self, mid: Decimal, profile_bucket_size: Decimal) -> Vec<SupportResistanceLevel> {
        let book = self.book.read().unwrap();
        analytics::support_resistance(&book.bid, &book.ask, &book.tape, mid, profile_bucket_size)
    }

    /// Compute every metric named in `flags` over one consistent snapshot
    /// of the book and tape, acquiring `book_lock` exactly once. Cheaper
    /// than calling the individual analytics methods back to back when a
    /// caller wants several of them at once.
    pub fn analytics(&self, flags: AnalyticsFlags, params: &AnalyticsParams) -> AnalyticsSnapshot {
        let book = self.book.read().unwrap();
        analytics::compute(&book.bid, &book.ask, &book.tape, &book.iceberg, flags, params)
    }

    /// Iceberg scores for every level with enough history.
    pub fn iceberg_scores(&self, now: DateTime<Utc>, window: chrono::Duration, tick_size: Decimal) -> Vec<IcebergScore> {
        let book = self.book.read().unwrap();
        book.iceberg.score_all(now, window, tick_size)
    }

    /// The most recent `n` trades.
    pub fn recent_trades(&self, n: usize) -> Vec<Trade> {
        self.book.read().unwrap().tape.recent(n)
    }

    /// Aggregate trade flow over the trailing `minutes` minutes.
    pub fn trade_flow_summary(&self, now: DateTime<Utc>, minutes: i64) -> TradeFlowSummary {
        self.book
            .read()
            .unwrap()
            .tape
            .summary(now, chrono::Duration::minutes(minutes))
    }

    /// The last-seen bid/ask.
    pub fn quote_state(&self) -> QuoteState {
        self.book.read().unwrap().quote
    }

    /// A snapshot of the per-vendor-entry-type counters.
    pub fn order_type_stats(&self) -> OrderTypeStatsSnapshot {
        self.book.read().unwrap().order_type_stats.snapshot()
    }

    /// Structural health: populated bars, no stale timeframes, book not
    /// crossed.
    pub fn health(&self, now: DateTime<Utc>) -> HealthReport {
        let store = self.bars.read().unwrap();
        let bars_populated = store.all_have_bars();
        let stale_timeframes: Vec<Timeframe> = store
            .timeframes()
            .filter(|tf| {
                store
                    .get(*tf)
                    .ok()
                    .and_then(|s| s.current())
                    .map(|bar| now - bar.bucket_start > tf.staleness_budget())
                    .unwrap_or(true)
            })
            .collect();
        drop(store);

        let crossed_book = {
            let book = self.book.read().unwrap();
            match (book.bid.best(), book.ask.best()) {
                (Some(b), Some(a)) => b.price >= a.price,
                _ => false,
            }
        };

        HealthReport {
            bars_populated,
            stale_timeframes,
            crossed_book,
        }
    }

    /// Aggregate engine-wide plus per-entry-type counters.
    pub fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            engine: self.stats.snapshot(),
            order_types: self.order_type_stats(),
        }
    }
}
