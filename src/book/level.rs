//! `PriceLevel`, a single resting quantity at a price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price level in a [`super::BookSide`]. `volume == 0` is never stored
/// — a zero-volume update removes the level instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// The level's price.
    pub price: Decimal,
    /// Resting volume at this price.
    pub volume: u64,
    /// When this level was last written.
    pub last_update: DateTime<Utc>,
    /// Free-form tag identifying which vendor message type wrote this
    /// level last (`"bid"`, `"ask"`, or a modification-origin marker).
    pub origin_type: &'static str,
}
