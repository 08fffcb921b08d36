//! The historical REST collaborator the lifecycle controller warms up
//! bar series from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::bar::Bar;
use crate::time::TimeUnit;

/// Static descriptor for the traded instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentInfo {
    /// The vendor's internal contract identifier.
    pub contract_id: String,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Monetary value of one tick move, one unit of size.
    pub tick_value: Decimal,
}

/// A collaborator the lifecycle controller calls during warm-up and on
/// `force_refresh`. Implementations talk to a REST API; tests supply an
/// in-memory fake.
pub trait HistoricalDataSource: Send + Sync {
    /// Fetch historical bars for `symbol` covering the trailing `days`
    /// days, bucketed at `interval * unit`. `partial` requests that the
    /// still-forming current bucket be included as its last row.
    ///
    /// Returned bars must be in ascending `bucket_start` order and
    /// already expressed in UTC; the caller converts to the configured
    /// market zone before storage.
    fn get_bars(
        &self,
        symbol: &str,
        days: u32,
        interval: u32,
        unit: TimeUnit,
        partial: bool,
    ) -> Result<Vec<Bar>, HistoricalError>;

    /// Look up the contract descriptor for `symbol`.
    fn get_instrument(&self, symbol: &str) -> Result<InstrumentInfo, HistoricalError>;

    /// Obtain a session token for authenticating the realtime transport.
    fn get_session_token(&self) -> Result<String, HistoricalError>;
}

/// An error from a [`HistoricalDataSource`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalError {
    /// A human-readable description of the failure.
    pub message: String,
    /// The instant the error was observed, for correlation with logs.
    pub at: DateTime<Utc>,
}

impl HistoricalError {
    /// Build an error with `message`, timestamped now's caller-supplied
    /// instant.
    pub fn new(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        HistoricalError {
            message: message.into(),
            at,
        }
    }
}

impl std::fmt::Display for HistoricalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "historical data source error: {}", self.message)
    }
}

impl std::error::Error for HistoricalError {}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory [`HistoricalDataSource`] for tests: returns canned
    /// bars/instrument info, or fails a fixed number of times before
    /// succeeding.
    pub struct FakeHistoricalSource {
        pub bars: Vec<Bar>,
        pub instrument: InstrumentInfo,
        pub token: String,
        pub fail_first_n_calls: Mutex<u32>,
    }

    impl HistoricalDataSource for FakeHistoricalSource {
        fn get_bars(
            &self,
            _symbol: &str,
            _days: u32,
            _interval: u32,
            _unit: TimeUnit,
            _partial: bool,
        ) -> Result<Vec<Bar>, HistoricalError> {
            let mut remaining = self.fail_first_n_calls.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HistoricalError::new("simulated outage", Utc::now()));
            }
            Ok(self.bars.clone())
        }

        fn get_instrument(&self, _symbol: &str) -> Result<InstrumentInfo, HistoricalError> {
            Ok(self.instrument.clone())
        }

        fn get_session_token(&self) -> Result<String, HistoricalError> {
            Ok(self.token.clone())
        }
    }
}
