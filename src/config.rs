//! Engine construction configuration.

use chrono_tz::Tz;

use crate::time::Timeframe;

/// Construction-time configuration for one instrument's engine.
///
/// There is no file or environment loader: this is assembled by the host
/// application and passed directly to [`crate::engine::Engine::new`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The instrument symbol this engine tracks.
    pub symbol: String,
    /// The exchange's local timezone, used for calendar-unit bucketing
    /// (day/week/month).
    pub zone: Tz,
    /// The set of timeframes to maintain bar series for. Fixed for the
    /// engine's lifetime.
    pub timeframes: Vec<Timeframe>,
    /// Maximum bars retained per timeframe.
    pub max_bars_per_series: usize,
    /// Maximum resting levels retained per book side.
    pub max_levels_per_side: usize,
    /// Maximum trades retained in the trade tape.
    pub max_trades: usize,
    /// If `true`, a bar with zero cumulative volume is rejected rather
    /// than silently floored to 1.
    pub enforce_min_bar_volume: bool,
    /// Volume assumed for a trade entry whose wire frame omits a size,
    /// before any spread-based estimate applies.
    pub small_trade_volume_default: u64,
}

impl EngineConfig {
    /// Build a config with the documented defaults: 1000 bars per
    /// series, 100 levels per side, 1000 trades, minimum-volume
    /// enforcement off, and a small-trade default of 25.
    pub fn new(symbol: impl Into<String>, zone: Tz, timeframes: Vec<Timeframe>) -> Self {
        EngineConfig {
            symbol: symbol.into(),
            zone,
            timeframes,
            max_bars_per_series: 1000,
            max_levels_per_side: 100,
            max_trades: 1000,
            enforce_min_bar_volume: false,
            small_trade_volume_default: 25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeUnit;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = EngineConfig::new(
            "ESU5",
            chrono_tz::America::Chicago,
            vec![Timeframe::new(1, TimeUnit::Minute)],
        );
        assert_eq!(config.max_bars_per_series, 1000);
        assert_eq!(config.max_levels_per_side, 100);
        assert_eq!(config.max_trades, 1000);
        assert!(!config.enforce_min_bar_volume);
        assert_eq!(config.small_trade_volume_default, 25);
    }
}
