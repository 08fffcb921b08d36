//! Iceberg-order heuristic: scores a resting price level's refresh
//! pattern against seven weighted features. Advisory only — no claim of
//! statistical significance.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

const MAX_SAMPLES_PER_LEVEL: usize = 100;

const WEIGHT_VOLUME_CONSISTENCY: f64 = 0.20;
const WEIGHT_REFRESH_REGULARITY: f64 = 0.15;
const WEIGHT_ROUND_PRICE: f64 = 0.10;
const WEIGHT_VOLUME_SIGNIFICANCE: f64 = 0.15;
const WEIGHT_REFRESH_FREQUENCY: f64 = 0.15;
const WEIGHT_TIME_PERSISTENCE: f64 = 0.15;
const WEIGHT_VOLUME_REPLENISHMENT: f64 = 0.10;

const THRESHOLD_LOW: f64 = 0.6;
const THRESHOLD_MEDIUM: f64 = 0.7;
const THRESHOLD_HIGH: f64 = 0.8;
const THRESHOLD_VERY_HIGH: f64 = 0.9;

/// One observation of a level's resting volume.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LevelSample {
    ts: DateTime<Utc>,
    volume: u64,
}

/// Per-level rolling history of observed volumes, capped at
/// [`MAX_SAMPLES_PER_LEVEL`] samples. Lives inside `BookState` under
/// `book_lock`.
#[derive(Debug, Clone, Default)]
pub struct IcebergHistory {
    levels: HashMap<Decimal, VecDeque<LevelSample>>,
}

impl IcebergHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        IcebergHistory::default()
    }

    /// Record one observed `(price, volume)` pair at `ts`, evicting the
    /// oldest sample for that level if over capacity.
    pub fn observe(&mut self, price: Decimal, volume: u64, ts: DateTime<Utc>) {
        let samples = self.levels.entry(price).or_default();
        samples.push_back(LevelSample { ts, volume });
        while samples.len() > MAX_SAMPLES_PER_LEVEL {
            samples.pop_front();
        }
    }

    /// Drop history for levels that no longer appear in `live_prices`
    /// (the level went away or the book was re-initialized).
    pub fn retain(&mut self, live_prices: impl Fn(&Decimal) -> bool) {
        self.levels.retain(|price, _| live_prices(price));
    }

    /// Score every level with at least two samples within `window` ending
    /// at `now`.
    pub fn score_all(&self, now: DateTime<Utc>, window: Duration, tick_size: Decimal) -> Vec<IcebergScore> {
        self.levels
            .iter()
            .filter_map(|(price, samples)| score_level(*price, samples, now, window, tick_size))
            .collect()
    }
}

/// The bucketed classification of an [`IcebergScore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcebergClassification {
    /// Score in `[0.6, 0.7)`.
    Low,
    /// Score in `[0.7, 0.8)`.
    Medium,
    /// Score in `[0.8, 0.9)`.
    High,
    /// Score `>= 0.9`.
    VeryHigh,
}

/// The result of scoring one price level for iceberg-like refresh behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcebergScore {
    /// The scored price.
    pub price: Decimal,
    /// The weighted feature score in `[0, 1]`.
    pub score: f64,
    /// `None` if `score < 0.6` (not flagged).
    pub classification: Option<IcebergClassification>,
    /// `mean(visible volume) * (3 + 7*score)`, capped at `5 *
    /// total_observed`, or `0` if not flagged.
    pub estimated_hidden_size: u64,
}

fn classify(score: f64) -> Option<IcebergClassification> {
    if score >= THRESHOLD_VERY_HIGH {
        Some(IcebergClassification::VeryHigh)
    } else if score >= THRESHOLD_HIGH {
        Some(IcebergClassification::High)
    } else if score >= THRESHOLD_MEDIUM {
        Some(IcebergClassification::Medium)
    } else if score >= THRESHOLD_LOW {
        Some(IcebergClassification::Low)
    } else {
        None
    }
}

fn score_level(
    price: Decimal,
    samples: &VecDeque<LevelSample>,
    now: DateTime<Utc>,
    window: Duration,
    tick_size: Decimal,
) -> Option<IcebergScore> {
    let in_window: Vec<&LevelSample> = samples
        .iter()
        .filter(|s| now - s.ts <= window)
        .collect();
    if in_window.len() < 2 {
        return None;
    }

    let volumes: Vec<f64> = in_window.iter().map(|s| s.volume as f64).collect();
    let mean_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;
    let variance =
        volumes.iter().map(|v| (v - mean_volume).powi(2)).sum::<f64>() / volumes.len() as f64;
    let std_dev = variance.sqrt();

    // Lower coefficient of variation -> more consistent refresh sizes.
    let volume_consistency = if mean_volume > 0.0 {
        (1.0 - (std_dev / mean_volume)).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let intervals: Vec<f64> = in_window
        .windows(2)
        .map(|w| (w[1].ts - w[0].ts).num_milliseconds() as f64)
        .collect();
    let refresh_regularity = if intervals.len() >= 2 {
        let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let interval_var = intervals
            .iter()
            .map(|i| (i - mean_interval).powi(2))
            .sum::<f64>()
            / intervals.len() as f64;
        if mean_interval > 0.0 {
            (1.0 - (interval_var.sqrt() / mean_interval)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    } else {
        0.5
    };

    let round_price = if tick_size > Decimal::ZERO {
        let ticks = (price / tick_size).round();
        if (ticks % Decimal::from(10)).is_zero() {
            1.0
        } else if (ticks % Decimal::from(5)).is_zero() {
            0.5
        } else {
            0.0
        }
    } else {
        0.0
    };

    // Saturates toward 1 as resting size grows past a few hundred units.
    let volume_significance = (mean_volume / (mean_volume + 200.0)).clamp(0.0, 1.0);

    let observed_span = (in_window.last().unwrap().ts - in_window.first().unwrap().ts)
        .num_seconds()
        .max(1) as f64;
    let refresh_frequency = ((in_window.len() as f64) / (observed_span / 60.0) / 10.0).clamp(0.0, 1.0);

    let time_persistence = (observed_span / window.num_seconds().max(1) as f64).clamp(0.0, 1.0);

    // How often volume was replenished back up after a visible decrease.
    let replenishments = in_window
        .windows(2)
        .filter(|w| w[1].volume >= w[0].volume)
        .count();
    let volume_replenishment = if intervals.is_empty() {
        0.0
    } else {
        replenishments as f64 / intervals.len() as f64
    };

    let score = WEIGHT_VOLUME_CONSISTENCY * volume_consistency
        + WEIGHT_REFRESH_REGULARITY * refresh_regularity
        + WEIGHT_ROUND_PRICE * round_price
        + WEIGHT_VOLUME_SIGNIFICANCE * volume_significance
        + WEIGHT_REFRESH_FREQUENCY * refresh_frequency
        + WEIGHT_TIME_PERSISTENCE * time_persistence
        + WEIGHT_VOLUME_REPLENISHMENT * volume_replenishment;

    let classification = classify(score);
    let total_observed: u64 = in_window.iter().map(|s| s.volume).sum();
    let estimated_hidden_size = if classification.is_some() {
        let raw = mean_volume * (3.0 + 7.0 * score);
        (raw as u64).min(5 * total_observed)
    } else {
        0
    };

    Some(IcebergScore {
        price,
        score,
        classification,
        estimated_hidden_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(s)
    }

    #[test]
    fn a_repeatedly_refreshed_round_level_scores_above_the_low_threshold() {
        let mut history = IcebergHistory::new();
        for i in 0..20 {
            history.observe(dec!(100), 300, at(i * 10));
        }
        let scores = history.score_all(at(200), Duration::minutes(10), dec!(0.25));
        let top = scores.iter().find(|s| s.price == dec!(100)).unwrap();
        assert!(top.score >= THRESHOLD_LOW);
        assert!(top.classification.is_some());
        assert!(top.estimated_hidden_size > 0);
    }

    #[test]
    fn a_single_sample_is_not_scored() {
        let mut history = IcebergHistory::new();
        history.observe(dec!(100), 5, at(0));
        assert!(history.score_all(at(1), Duration::minutes(10), dec!(0.25)).is_empty());
    }

    #[test]
    fn history_caps_samples_per_level() {
        let mut history = IcebergHistory::new();
        for i in 0..150 {
            history.observe(dec!(100), 1, at(i));
        }
        assert_eq!(history.levels.get(&dec!(100)).unwrap().len(), MAX_SAMPLES_PER_LEVEL);
    }
}
