//! Derived order-book and trade-tape analytics. Every function here takes
//! already-locked state by reference and returns an owned value object —
//! no analytics function acquires a lock itself.

mod iceberg;

pub use iceberg::{IcebergClassification, IcebergHistory, IcebergScore};

use bitflags::bitflags;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::{BookSide, Side};
use crate::trade::TradeTape;

/// Top-of-book snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BestBidAsk {
    /// Best bid price, if the bid side is non-empty.
    pub bid: Option<Decimal>,
    /// Best ask price, if the ask side is non-empty.
    pub ask: Option<Decimal>,
    /// `ask - bid`, if both sides are known.
    pub spread: Option<Decimal>,
    /// `(bid + ask) / 2`, if both sides are known.
    pub mid: Option<Decimal>,
}

/// Read the best bid/ask, spread, and mid from both sides of the book.
pub fn best_bid_ask(bid: &BookSide, ask: &BookSide) -> BestBidAsk {
    let bid_price = bid.best().map(|l| l.price);
    let ask_price = ask.best().map(|l| l.price);
    let (spread, mid) = match (bid_price, ask_price) {
        (Some(b), Some(a)) => (Some(a - b), Some((a + b) / Decimal::TWO)),
        _ => (None, None),
    };
    BestBidAsk {
        bid: bid_price,
        ask: ask_price,
        spread,
        mid,
    }
}

/// Which way the top-of-book imbalance leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImbalanceDirection {
    /// Ratio above the bullish threshold.
    Bullish,
    /// Ratio below the bearish threshold.
    Bearish,
    /// Within the neutral band.
    Neutral,
}

/// Whether the trade-tape delta corroborates the book-side imbalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImbalanceConfidence {
    /// No corroborating signal, or the signals disagree.
    Normal,
    /// The recent trade-flow delta agrees in sign and exceeds the
    /// corroboration threshold.
    High,
}

/// Order-book imbalance over the top `n` levels of each side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imbalance {
    /// `(bid_vol - ask_vol) / (bid_vol + ask_vol)` over the top levels.
    pub ratio: Decimal,
    /// Bullish/bearish/neutral classification of `ratio`.
    pub direction: ImbalanceDirection,
    /// Whether the trade tape corroborates `direction`.
    pub confidence: ImbalanceConfidence,
}

const IMBALANCE_LEVELS: usize = 5;
const IMBALANCE_THRESHOLD: f64 = 0.3;
const CORROBORATION_THRESHOLD: f64 = 0.2;
const CORROBORATION_WINDOW_MINUTES: i64 = 5;

/// Compute the imbalance over the top 5 levels of each side, raising
/// confidence to `High` when the sign agrees with the trailing 5-minute
/// trade-flow delta by more than 0.2 in magnitude. Returns `None` if both
/// sides are empty.
pub fn imbalance(
    bid: &BookSide,
    ask: &BookSide,
    tape: &TradeTape,
    now: DateTime<Utc>,
) -> Option<Imbalance> {
    let bid_vol: u64 = bid.top(IMBALANCE_LEVELS).iter().map(|l| l.volume).sum();
    let ask_vol: u64 = ask.top(IMBALANCE_LEVELS).iter().map(|l| l.volume).sum();
    let total = bid_vol + ask_vol;
    if total == 0 {
        return None;
    }

    let ratio_f64 = (bid_vol as f64 - ask_vol as f64) / total as f64;
    let ratio = Decimal::from(bid_vol as i64 - ask_vol as i64) / Decimal::from(total);

    let direction = if ratio_f64 > IMBALANCE_THRESHOLD {
        ImbalanceDirection::Bullish
    } else if ratio_f64 < -IMBALANCE_THRESHOLD {
        ImbalanceDirection::Bearish
    } else {
        ImbalanceDirection::Neutral
    };

    let trade_delta = tape
        .cumulative_delta(now, Duration::minutes(CORROBORATION_WINDOW_MINUTES))
        .delta;
    let agrees = match direction {
        ImbalanceDirection::Bullish => trade_delta as f64 > CORROBORATION_THRESHOLD * total as f64,
        ImbalanceDirection::Bearish => {
            (trade_delta as f64) < -CORROBORATION_THRESHOLD * total as f64
        }
        ImbalanceDirection::Neutral => false,
    };
    let confidence = if agrees {
        ImbalanceConfidence::High
    } else {
        ImbalanceConfidence::Normal
    };

    Some(Imbalance {
        ratio,
        direction,
        confidence,
    })
}

/// Volume and level count within a price band on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepthInRange {
    /// Summed bid volume in `[mid - delta, mid]`.
    pub bid_volume: u64,
    /// Number of bid levels in that band.
    pub bid_count: usize,
    /// Summed ask volume in `[mid, mid + delta]`.
    pub ask_volume: u64,
    /// Number of ask levels in that band.
    pub ask_count: usize,
}

/// Depth within `delta` of `mid` on each side.
pub fn depth_in_range(bid: &BookSide, ask: &BookSide, mid: Decimal, delta: Decimal) -> DepthInRange {
    let (bid_volume, bid_count) = bid.depth_in_range(mid - delta, mid);
    let (ask_volume, ask_count) = ask.depth_in_range(mid, mid + delta);
    DepthInRange {
        bid_volume,
        bid_count,
        ask_volume,
        ask_count,
    }
}

/// A resting level qualifying as a liquidity concentration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidityLevel {
    /// The level's price.
    pub price: Decimal,
    /// The level's volume.
    pub volume: u64,
    /// Which side this level belongs to.
    pub side: Side,
    /// `volume / mean_volume_of_qualifying_levels`.
    pub liquidity_score: Decimal,
}

/// Levels on `side` with `volume >= min_volume`, scored relative to the
/// mean volume among the qualifying levels themselves.
pub fn liquidity_levels(side: &BookSide, min_volume: u64) -> Vec<LiquidityLevel> {
    let qualifying: Vec<_> = side
        .top_iter()
        .filter(|l| l.volume >= min_volume)
        .collect();
    if qualifying.is_empty() {
        return Vec::new();
    }
    let total: u64 = qualifying.iter().map(|l| l.volume).sum();
    let mean = Decimal::from(total) / Decimal::from(qualifying.len());

    qualifying
        .into_iter()
        .map(|l| LiquidityLevel {
            price: l.price,
            volume: l.volume,
            side: side.side(),
            liquidity_score: Decimal::from(l.volume) / mean,
        })
        .collect()
}

/// A contiguous group of nearby levels, reported as one liquidity pocket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    /// Volume-weighted average price of the cluster.
    pub center: Decimal,
    /// `(lowest, highest)` price in the cluster.
    pub range: (Decimal, Decimal),
    /// Summed volume across member levels.
    pub total_volume: u64,
    /// Number of member levels.
    pub order_count: usize,
    /// Volume-weighted average price (same as `center`, exposed under the
    /// name analytics consumers expect).
    pub vwap: Decimal,
}

/// Greedily sweep the top `top_n` levels of `side`, starting a new cluster
/// whenever the gap between consecutive prices exceeds `tolerance`.
/// Clusters with fewer than `min_size` members are dropped.
pub fn clusters(side: &BookSide, top_n: usize, tolerance: Decimal, min_size: usize) -> Vec<Cluster> {
    let levels = side.top(top_n);
    let mut groups: Vec<Vec<Decimal>> = Vec::new();
    let mut volumes: Vec<Vec<u64>> = Vec::new();

    for level in &levels {
        match groups.last_mut() {
            Some(group) if (level.price - *group.last().unwrap()).abs() <= tolerance => {
                group.push(level.price);
                volumes.last_mut().unwrap().push(level.volume);
            }
            _ => {
                groups.push(vec![level.price]);
                volumes.push(vec![level.volume]);
            }
        }
    }

    groups
        .into_iter()
        .zip(volumes)
        .filter(|(prices, _)| prices.len() >= min_size)
        .map(|(prices, vols)| {
            let total_volume: u64 = vols.iter().sum();
            let notional: Decimal = prices
                .iter()
                .zip(&vols)
                .map(|(p, v)| *p * Decimal::from(*v))
                .sum();
            let vwap = notional / Decimal::from(total_volume);
            let low = *prices.iter().min().unwrap();
            let high = *prices.iter().max().unwrap();
            Cluster {
                center: vwap,
                range: (low, high),
                total_volume,
                order_count: prices.len(),
                vwap,
            }
        })
        .collect()
}

/// Whether a support/resistance level is above or below mid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceZone {
    /// Below mid (candidate support).
    Support,
    /// Above mid (candidate resistance).
    Resistance,
}

/// Why a price was flagged as support/resistance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportResistanceKind {
    /// Derived from a high-volume bucket in the trade tape's volume profile.
    VolumeCluster,
    /// Derived from a resting order-book liquidity concentration.
    OrderbookLiquidity,
}

/// One candidate support/resistance price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportResistanceLevel {
    /// The candidate price.
    pub price: Decimal,
    /// A positive strength score (larger is stronger evidence).
    pub strength: Decimal,
    /// Which evidence produced this level.
    pub kind: SupportResistanceKind,
    /// Position relative to mid.
    pub zone: PriceZone,
}

/// Union of volume-profile POCs (>1.5x the profile mean volume) and
/// order-book liquidity levels (`liquidity_score >= 1`), partitioned by
/// position relative to `mid`.
pub fn support_resistance(
    bid: &BookSide,
    ask: &BookSide,
    tape: &TradeTape,
    mid: Decimal,
    profile_bucket_size: Decimal,
) -> Vec<SupportResistanceLevel> {
    let mut out = Vec::new();

    let profile = tape.volume_profile(profile_bucket_size);
    let buckets = profile.buckets();
    if !buckets.is_empty() {
        let mean_volume =
            buckets.iter().map(|b| b.total_volume).sum::<u64>() as f64 / buckets.len() as f64;
        for bucket in &buckets {
            if (bucket.total_volume as f64) > 1.5 * mean_volume {
                let price = (bucket.low + bucket.high) / Decimal::TWO;
                out.push(SupportResistanceLevel {
                    price,
                    strength: Decimal::from(bucket.total_volume),
                    kind: SupportResistanceKind::VolumeCluster,
                    zone: if price < mid {
                        PriceZone::Support
                    } else {
                        PriceZone::Resistance
                    },
                });
            }
        }
    }

    for side in [bid, ask] {
        for level in liquidity_levels(side, 1) {
            if level.liquidity_score >= Decimal::ONE {
                out.push(SupportResistanceLevel {
                    price: level.price,
                    strength: level.liquidity_score,
                    kind: SupportResistanceKind::OrderbookLiquidity,
                    zone: if level.price < mid {
                        PriceZone::Support
                    } else {
                        PriceZone::Resistance
                    },
                });
            }
        }
    }

    out
}

bitflags! {
    /// Which enriched metrics [`compute`] should produce in one pass over
    /// the book/tape, so a caller only pays for what it asked for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AnalyticsFlags: u32 {
        /// Best bid/ask, spread, mid.
        const BEST_BID_ASK      = 0b0000_0001;
        /// Top-5-level imbalance, corroborated by trade flow.
        const IMBALANCE         = 0b0000_0010;
        /// Depth within `delta` of mid on each side.
        const DEPTH_IN_RANGE    = 0b0000_0100;
        /// Liquidity-concentration levels on each side.
        const LIQUIDITY_LEVELS  = 0b0000_1000;
        /// Nearby-level clusters on each side.
        const CLUSTERS          = 0b0001_0000;
        /// Candidate support/resistance levels.
        const SUPPORT_RESISTANCE = 0b0010_0000;
        /// Iceberg refresh scores.
        const ICEBERG           = 0b0100_0000;
        /// Every metric above.
        const ALL = Self::BEST_BID_ASK.bits()
            | Self::IMBALANCE.bits()
            | Self::DEPTH_IN_RANGE.bits()
            | Self::LIQUIDITY_LEVELS.bits()
            | Self::CLUSTERS.bits()
            | Self::SUPPORT_RESISTANCE.bits()
            | Self::ICEBERG.bits();
    }
}

/// Tunables shared by the flagged-in metrics of one [`compute`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticsParams {
    /// Point-in-time instant, used by imbalance corroboration and iceberg
    /// scoring.
    pub now: DateTime<Utc>,
    /// Half-width of the depth-in-range band around mid.
    pub depth_delta: Decimal,
    /// Minimum resting volume to qualify as a liquidity level.
    pub min_liquidity_volume: u64,
    /// Number of top levels swept when forming clusters.
    pub cluster_top_n: usize,
    /// Maximum gap between consecutive prices within one cluster.
    pub cluster_tolerance: Decimal,
    /// Minimum member count for a cluster to be reported.
    pub cluster_min_size: usize,
    /// Bucket width for the volume profile backing support/resistance.
    pub profile_bucket_size: Decimal,
    /// Trailing window considered for iceberg scoring.
    pub iceberg_window: Duration,
    /// Tick size, used by the iceberg round-price feature.
    pub tick_size: Decimal,
}

/// The subset of metrics [`compute`] produced, one `Option`/`Vec` per flag
/// that was set (unset flags leave their field empty).
#[derive(Debug, Clone, Default)]
pub struct AnalyticsSnapshot {
    /// Present iff [`AnalyticsFlags::BEST_BID_ASK`] was requested.
    pub best_bid_ask: Option<BestBidAsk>,
    /// Present iff [`AnalyticsFlags::IMBALANCE`] was requested and at
    /// least one side had depth.
    pub imbalance: Option<Imbalance>,
    /// Present iff [`AnalyticsFlags::DEPTH_IN_RANGE`] was requested.
    pub depth_in_range: Option<DepthInRange>,
    /// Present iff [`AnalyticsFlags::LIQUIDITY_LEVELS`] was requested.
    pub liquidity_levels: Vec<LiquidityLevel>,
    /// Present iff [`AnalyticsFlags::CLUSTERS`] was requested.
    pub clusters: Vec<Cluster>,
    /// Present iff [`AnalyticsFlags::SUPPORT_RESISTANCE`] was requested.
    pub support_resistance: Vec<SupportResistanceLevel>,
    /// Present iff [`AnalyticsFlags::ICEBERG`] was requested.
    pub iceberg_scores: Vec<IcebergScore>,
}

/// Compute every metric named in `flags` over one consistent snapshot of
/// `bid`/`ask`/`tape`/`iceberg`, all already borrowed under `book_lock` by
/// the caller. Depth-in-range, liquidity, clusters, and support/resistance
/// are skipped (left empty) when mid is unknown, since they are all
/// defined relative to it.
#[allow(clippy::too_many_arguments)]
pub fn compute(
    bid: &BookSide,
    ask: &BookSide,
    tape: &TradeTape,
    iceberg: &IcebergHistory,
    flags: AnalyticsFlags,
    params: &AnalyticsParams,
) -> AnalyticsSnapshot {
    let mut out = AnalyticsSnapshot::default();

    let bba = best_bid_ask(bid, ask);
    if flags.contains(AnalyticsFlags::BEST_BID_ASK) {
        out.best_bid_ask = Some(bba);
    }
    if flags.contains(AnalyticsFlags::IMBALANCE) {
        out.imbalance = imbalance(bid, ask, tape, params.now);
    }

    if let Some(mid) = bba.mid {
        if flags.contains(AnalyticsFlags::DEPTH_IN_RANGE) {
            out.depth_in_range = Some(depth_in_range(bid, ask, mid, params.depth_delta));
        }
        if flags.contains(AnalyticsFlags::LIQUIDITY_LEVELS) {
            out.liquidity_levels = [bid, ask]
                .into_iter()
                .flat_map(|side| liquidity_levels(side, params.min_liquidity_volume))
                .collect();
        }
        if flags.contains(AnalyticsFlags::CLUSTERS) {
            out.clusters = [bid, ask]
                .into_iter()
                .flat_map(|side| {
                    clusters(
                        side,
                        params.cluster_top_n,
                        params.cluster_tolerance,
                        params.cluster_min_size,
                    )
                })
                .collect();
        }
        if flags.contains(AnalyticsFlags::SUPPORT_RESISTANCE) {
            out.support_resistance =
                support_resistance(bid, ask, tape, mid, params.profile_bucket_size);
        }
    }

    if flags.contains(AnalyticsFlags::ICEBERG) {
        out.iceberg_scores = iceberg.score_all(params.now, params.iceberg_window, params.tick_size);
    }

    out
}
