//! Lifecycle controller: historical warm-up, realtime feed start/stop, and
//! health/refresh, layered over an [`Engine`].

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::engine::{Engine, WireTradeEntry};
use crate::error::LifecycleError;
use crate::external::{Channel, HistoricalDataSource, RealtimeTransport};
use crate::quote::RawQuoteFrame;

const WARMUP_RETRIES: u32 = 3;
const WARMUP_BACKOFF: StdDuration = StdDuration::from_secs(2);
const MIN_TOKEN_LEN: usize = 50;

/// The controller's coarse state, independent of [`Engine`]'s internal
/// locks. Infrequent transitions, so a plain `Mutex` rather than an
/// `RwLock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, not yet warmed up.
    Created,
    /// Historical warm-up completed; not yet streaming.
    Initialized,
    /// Realtime feed connected and subscribed.
    Streaming,
    /// Feed disconnected, either by `stop_feed` or mid-`force_refresh`.
    Stopped,
}

/// `true` iff `frame`'s top-level `contract_id` field equals `expected`.
/// A frame with no `contract_id` field, or a different one, is for another
/// instrument on the same shared transport and must not reach the engine.
fn frame_matches_contract(frame: &Value, expected: &str) -> bool {
    frame.get("contract_id").and_then(Value::as_str) == Some(expected)
}

/// Validate the JWT shape the lifecycle controller requires: non-empty,
/// at least [`MIN_TOKEN_LEN`] characters, exactly two `.` separators.
fn validate_token_shape(token: &str) -> Result<(), LifecycleError> {
    if token.is_empty() {
        return Err(LifecycleError::InvalidToken {
            reason: "token is empty".to_string(),
        });
    }
    if token.len() < MIN_TOKEN_LEN {
        return Err(LifecycleError::InvalidToken {
            reason: format!("token shorter than {MIN_TOKEN_LEN} characters"),
        });
    }
    if token.matches('.').count() != 2 {
        return Err(LifecycleError::InvalidToken {
            reason: "token does not have exactly two '.' separators".to_string(),
        });
    }
    Ok(())
}

/// Drives one [`Engine`] through warm-up, streaming, and teardown against
/// a [`HistoricalDataSource`] and [`RealtimeTransport`].
pub struct LifecycleController {
    engine: Arc<Engine>,
    historical: Arc<dyn HistoricalDataSource>,
    transport: Arc<dyn RealtimeTransport>,
    state: Mutex<LifecycleState>,
    contract_id: Mutex<Option<String>>,
    tick_size: Mutex<Option<Decimal>>,
}

impl LifecycleController {
    /// Build a controller in the `Created` state.
    pub fn new(
        engine: Arc<Engine>,
        historical: Arc<dyn HistoricalDataSource>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Self {
        LifecycleController {
            engine,
            historical,
            transport,
            state: Mutex::new(LifecycleState::Created),
            contract_id: Mutex::new(None),
            tick_size: Mutex::new(None),
        }
    }

    /// The controller's current state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    /// Warm up every configured timeframe from `historical`, retrying each
    /// fetch up to [`WARMUP_RETRIES`] times with a fixed backoff, then
    /// resolve `contract_id`. Leaves the controller in `Created` on
    /// failure.
    pub fn initialize(&self, initial_days: u32) -> Result<(), LifecycleError> {
        let days = initial_days.max(1);
        let symbol = &self.engine.config().symbol;

        for tf in self.engine.config().timeframes.clone() {
            let bars = self.fetch_bars_with_retry(symbol, days, tf.interval, tf.unit)?;
            self.engine
                .seed_bars(tf, bars)
                .map_err(|_| LifecycleError::HistoricalFetchFailed {
                    symbol: symbol.clone(),
                    attempts: 1,
                })?;
        }

        let instrument = self
            .historical
            .get_instrument(symbol)
            .map_err(|_| LifecycleError::InstrumentNotFound {
                symbol: symbol.clone(),
            })?;
        *self.contract_id.lock().unwrap() = Some(instrument.contract_id);
        *self.tick_size.lock().unwrap() = Some(instrument.tick_size);

        *self.state.lock().unwrap() = LifecycleState::Initialized;
        Ok(())
    }

    fn fetch_bars_with_retry(
        &self,
        symbol: &str,
        days: u32,
        interval: u32,
        unit: crate::time::TimeUnit,
    ) -> Result<Vec<crate::bar::Bar>, LifecycleError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.historical.get_bars(symbol, days, interval, unit, false) {
                Ok(bars) => return Ok(bars),
                Err(_) if attempts < WARMUP_RETRIES => {
                    thread::sleep(WARMUP_BACKOFF);
                }
                Err(_) => {
                    tracing::warn!(symbol, attempts, "historical warm-up exhausted its retries");
                    return Err(LifecycleError::HistoricalFetchFailed {
                        symbol: symbol.to_string(),
                        attempts,
                    });
                }
            }
        }
    }

    /// Validate `jwt`, connect the realtime transport, install frame
    /// callbacks, subscribe to `contract_id`, and mark `Streaming`. Fails
    /// fast and leaves state unchanged on any error.
    pub fn start_feed(&self, jwt: &str) -> Result<(), LifecycleError> {
        validate_token_shape(jwt)?;

        let contract_id = self
            .contract_id
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LifecycleError::InvalidTransition {
                from: "Created",
                action: "start_feed",
            })?;

        self.install_callbacks(&contract_id);

        let connected = self
            .transport
            .connect()
            .map_err(|e| LifecycleError::TransportError { message: e.message })?;
        if !connected {
            return Err(LifecycleError::TransportError {
                message: "connect() returned false".to_string(),
            });
        }

        let subscribed = self
            .transport
            .subscribe_market_data(&[contract_id])
            .map_err(|e| LifecycleError::TransportError { message: e.message })?;
        if !subscribed {
            return Err(LifecycleError::TransportError {
                message: "subscribe_market_data() returned false".to_string(),
            });
        }

        *self.state.lock().unwrap() = LifecycleState::Streaming;
        Ok(())
    }

    /// Install the three transport callbacks, each dropping frames whose
    /// `contract_id` doesn't match `contract_id` — the transport may be
    /// shared across instruments, so every channel re-checks it before
    /// touching the engine.
    fn install_callbacks(&self, contract_id: &str) {
        let tick_size = self.tick_size.lock().unwrap().unwrap_or(Decimal::ZERO);

        let engine = Arc::clone(&self.engine);
        let expected = contract_id.to_string();
        self.transport.add_callback(
            Channel::MarketDepth,
            Arc::new(move |frame: &Value| {
                if !frame_matches_contract(frame, &expected) {
                    return;
                }
                let Some(entries) = frame.get("data").and_then(|d| d.as_array()) else {
                    return;
                };
                let parsed: Vec<_> = entries
                    .iter()
                    .filter_map(|e| serde_json::from_value(e.clone()).ok())
                    .collect();
                engine.apply_depth_frame(&parsed, Utc::now());
            }),
        );

        let engine = Arc::clone(&self.engine);
        let expected = contract_id.to_string();
        self.transport.add_callback(
            Channel::QuoteUpdate,
            Arc::new(move |frame: &Value| {
                if !frame_matches_contract(frame, &expected) {
                    return;
                }
                let Some(data) = frame.get("data") else {
                    return;
                };
                let Ok(quote) = serde_json::from_value::<RawQuoteFrame>(data.clone()) else {
                    return;
                };
                if let Err(err) = engine.apply_quote_frame(quote, Utc::now(), tick_size) {
                    tracing::warn!(%err, "failed to apply quote frame");
                }
            }),
        );

        let engine = Arc::clone(&self.engine);
        let expected = contract_id.to_string();
        self.transport.add_callback(
            Channel::MarketTrade,
            Arc::new(move |frame: &Value| {
                if !frame_matches_contract(frame, &expected) {
                    return;
                }
                let Some(entries) = frame.get("data").and_then(|d| d.as_array()) else {
                    return;
                };
                let parsed: Vec<WireTradeEntry> = entries
                    .iter()
                    .filter_map(|e| serde_json::from_value(e.clone()).ok())
                    .collect();
                if let Err(err) = engine.apply_trade_frame(&parsed, Utc::now()) {
                    tracing::warn!(%err, "failed to apply trade frame");
                }
            }),
        );
    }

    /// Disconnect the transport and mark `Stopped`. Idempotent.
    pub fn stop_feed(&self) {
        self.transport.disconnect();
        *self.state.lock().unwrap() = LifecycleState::Stopped;
    }

    /// `true` iff `Streaming`, every timeframe has at least one bar, no
    /// timeframe is stale, and the book is not crossed.
    pub fn health(&self) -> bool {
        if self.state() != LifecycleState::Streaming {
            return false;
        }
        self.engine.health(Utc::now()).healthy()
    }

    /// Stop the feed, re-run `initialize`, then `start_feed` with a freshly
    /// fetched session token.
    pub fn force_refresh(&self, initial_days: u32) -> Result<(), LifecycleError> {
        self.stop_feed();
        self.initialize(initial_days)?;
        let token = self
            .historical
            .get_session_token()
            .map_err(|_| LifecycleError::InvalidToken {
                reason: "get_session_token failed during refresh".to_string(),
            })?;
        self.start_feed(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use crate::config::EngineConfig;
    use crate::external::historical::fakes::FakeHistoricalSource;
    use crate::external::transport::fakes::FakeTransport;
    use crate::external::InstrumentInfo;
    use crate::time::{TimeUnit, Timeframe};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    fn controller(fail_first_n: u32) -> (LifecycleController, Arc<FakeTransport>) {
        let config = EngineConfig::new(
            "ESU5",
            chrono_tz::America::Chicago,
            vec![Timeframe::new(5, TimeUnit::Minute)],
        );
        let engine = Arc::new(Engine::new(config));
        let historical = Arc::new(FakeHistoricalSource {
            bars: vec![Bar::opening(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                dec!(100),
                1,
            )],
            instrument: InstrumentInfo {
                contract_id: "CON.F.US.ES.U25".to_string(),
                tick_size: dec!(0.25),
                tick_value: dec!(12.5),
            },
            token: "a".repeat(60) + ".b.c",
            fail_first_n_calls: StdMutex::new(fail_first_n),
        });
        let transport = Arc::new(FakeTransport::default());
        let controller = LifecycleController::new(engine, historical, Arc::clone(&transport));
        (controller, transport)
    }

    #[test]
    fn initialize_seeds_bars_and_resolves_contract_id() {
        let (controller, _transport) = controller(0);
        controller.initialize(1).unwrap();
        assert_eq!(controller.state(), LifecycleState::Initialized);
        assert_eq!(
            controller.contract_id.lock().unwrap().as_deref(),
            Some("CON.F.US.ES.U25")
        );
    }

    #[test]
    fn initialize_retries_transient_failures_and_eventually_succeeds() {
        let (controller, _transport) = controller(2);
        controller.initialize(1).unwrap();
        assert_eq!(controller.state(), LifecycleState::Initialized);
    }

    #[test]
    fn initialize_fails_after_exhausting_retries() {
        let (controller, _transport) = controller(10);
        let err = controller.initialize(1).unwrap_err();
        assert!(matches!(err, LifecycleError::HistoricalFetchFailed { .. }));
        assert_eq!(controller.state(), LifecycleState::Created);
    }

    #[test]
    fn start_feed_rejects_malformed_tokens() {
        let (controller, _transport) = controller(0);
        controller.initialize(1).unwrap();
        let err = controller.start_feed("too-short").unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidToken { .. }));
    }

    #[test]
    fn start_feed_connects_subscribes_and_streams() {
        let (controller, transport) = controller(0);
        controller.initialize(1).unwrap();
        let token = "a".repeat(60) + ".b.c";
        controller.start_feed(&token).unwrap();

        assert_eq!(controller.state(), LifecycleState::Streaming);
        assert!(*transport.connected.lock().unwrap());
        assert_eq!(
            transport.subscribed.lock().unwrap().as_slice(),
            ["CON.F.US.ES.U25".to_string()]
        );
    }

    #[test]
    fn stop_feed_is_idempotent() {
        let (controller, transport) = controller(0);
        controller.initialize(1).unwrap();
        controller.start_feed(&("a".repeat(60) + ".b.c")).unwrap();

        controller.stop_feed();
        controller.stop_feed();
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert!(!*transport.connected.lock().unwrap());
    }

    #[test]
    fn health_is_false_before_streaming() {
        let (controller, _transport) = controller(0);
        assert!(!controller.health());
        controller.initialize(1).unwrap();
        assert!(!controller.health());
    }

    #[test]
    fn depth_frames_emitted_by_the_transport_reach_the_engine() {
        let (controller, transport) = controller(0);
        controller.initialize(1).unwrap();
        controller.start_feed(&("a".repeat(60) + ".b.c")).unwrap();

        let frame = serde_json::json!({
            "contract_id": "CON.F.US.ES.U25",
            "data": [{ "price": "100.25", "volume": 5, "type": 1 }],
        });
        transport.emit(Channel::MarketDepth, &frame);

        let snapshot = controller.engine.orderbook_snapshot(10);
        assert_eq!(snapshot.asks.len(), 1);
        assert_eq!(snapshot.asks[0].price, dec!(100.25));
    }

    #[test]
    fn frames_for_a_different_contract_are_dropped() {
        let (controller, transport) = controller(0);
        controller.initialize(1).unwrap();
        controller.start_feed(&("a".repeat(60) + ".b.c")).unwrap();

        let frame = serde_json::json!({
            "contract_id": "CON.F.US.NQ.U25",
            "data": [{ "price": "100.25", "volume": 5, "type": 1 }],
        });
        transport.emit(Channel::MarketDepth, &frame);

        let snapshot = controller.engine.orderbook_snapshot(10);
        assert!(snapshot.asks.is_empty());
    }
}
