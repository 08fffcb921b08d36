//! Prelude module that re-exports the types most consumers need.
//!
//! ```
//! use depthcore::prelude::*;
//! ```

pub use crate::analytics::{
    AnalyticsFlags, AnalyticsParams, AnalyticsSnapshot, BestBidAsk, Cluster, DepthInRange,
    Imbalance, ImbalanceConfidence, ImbalanceDirection, LiquidityLevel, PriceZone,
    SupportResistanceKind, SupportResistanceLevel,
};
pub use crate::analytics::{IcebergClassification, IcebergHistory, IcebergScore};
pub use crate::bar::Bar;
pub use crate::book::{ClassifyOutcome, OrderTypeStatsSnapshot, PriceLevel, RawDepthEntry, Side};
pub use crate::config::EngineConfig;
pub use crate::engine::{
    BookState, Engine, EngineStatistics, HealthReport, OrderbookSnapshot, WireTradeEntry,
};
pub use crate::error::{EngineError, LifecycleError};
pub use crate::events::{Callback, DataUpdatePayload, EventBus, Executor, MarketTradePayload};
pub use crate::external::{
    Channel, HistoricalDataSource, HistoricalError, InstrumentInfo, RealtimeTransport,
    TransportError,
};
pub use crate::lifecycle::{LifecycleController, LifecycleState};
pub use crate::quote::{NormalizedQuote, QuoteState, RawQuoteFrame};
pub use crate::stats::EngineStatsSnapshot;
pub use crate::tick::{NewBarEvent, Tick, TickKind};
pub use crate::time::{TimeUnit, Timeframe};
pub use crate::trade::{Trade, TradeFlowSummary, TradeSide, TradeTape};
