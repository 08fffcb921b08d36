//! # depthcore
//!
//! A real-time futures market-data core: synchronized multi-timeframe OHLCV
//! bar series plus a Level-2 order book, with derived analytics and a
//! subscriber-callback read API, for a single instrument.
//!
//! The crate is organized around three layers:
//!
//! - **Ingestion primitives**: [`bar`], [`bar_series`], [`tick`], [`book`],
//!   [`quote`], [`trade`] — the data types and pure functions that turn one
//!   vendor frame or tick into a state mutation. None of these acquire a
//!   lock; they operate on already-borrowed state.
//! - **The engine**: [`engine`] wires those primitives behind two
//!   `RwLock`s (`bars_lock`, `book_lock`), exposes the mutation entry
//!   points ([`engine::Engine::ingest_tick`],
//!   [`engine::Engine::apply_depth_frame`],
//!   [`engine::Engine::apply_quote_frame`],
//!   [`engine::Engine::apply_trade_frame`]) and a snapshot read API, and
//!   dispatches [`events`] to subscribers.
//! - **The lifecycle controller**: [`lifecycle`] drives one [`engine::Engine`]
//!   through historical warm-up and realtime feed start/stop against the
//!   [`external::HistoricalDataSource`]/[`external::RealtimeTransport`]
//!   collaborator traits.
//!
//! [`config::EngineConfig`] is the construction-time configuration; there is
//! no file or environment loader, it is assembled directly by the host
//! application and passed to [`engine::Engine::new`].
//!
//! ## Concurrency
//!
//! Two locks guard all mutable state: `bars_lock` (the bar series map) and
//! `book_lock` (both book sides, the trade tape, quote state, and
//! analytics-level counters). Lock ordering is always `bars_lock` before
//! `book_lock`. Every public [`engine::Engine`] method acquires each lock at
//! most once per call and never re-enters it, so the two `RwLock`s never
//! need to be reentrant in practice. Observability counters
//! ([`stats::EngineStats`], [`book::OrderTypeStats`]) are plain
//! `AtomicU64`s, readable without taking either lock.
//!
//! ## Error handling
//!
//! [`error::EngineError`] covers timeframe configuration and lookup
//! failures on the hot path; [`error::LifecycleError`] covers historical
//! warm-up, token validation, and transport failures in
//! [`lifecycle::LifecycleController`]. Malformed vendor frames and
//! panicking subscriber callbacks are logged via `tracing` and counted,
//! never propagated: no single bad frame stops the stream.

pub mod analytics;
pub mod bar;
pub mod bar_series;
pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod external;
pub mod lifecycle;
pub mod prelude;
pub mod quote;
pub mod stats;
pub mod tick;
pub mod time;
pub mod trade;

pub use config::EngineConfig;
pub use engine::{BookState, Engine, EngineStatistics, HealthReport, OrderbookSnapshot, WireTradeEntry};
pub use error::{EngineError, LifecycleError};
pub use events::EventBus;
pub use lifecycle::{LifecycleController, LifecycleState};
