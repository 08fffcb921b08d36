//! Error types for the engine and its lifecycle controller.

use std::fmt;

use crate::time::Timeframe;

/// Errors raised by the steady-state engine: timeframe configuration and
/// lookup failures.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum EngineError {
    /// A timeframe name outside the closed set of recognized names.
    InvalidTimeframe {
        /// The rejected name.
        name: String,
    },

    /// An operation referenced a timeframe the engine was not configured
    /// with.
    UnknownTimeframe {
        /// The timeframe that was not found.
        timeframe: Timeframe,
    },

    /// A bucket calculation was asked to floor on an unrecognized unit.
    InvalidUnit {
        /// The raw unit string or code that was rejected.
        unit: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidTimeframe { name } => {
                write!(f, "invalid timeframe name: {name}")
            }
            EngineError::UnknownTimeframe { timeframe } => {
                write!(f, "unknown timeframe: {timeframe}")
            }
            EngineError::InvalidUnit { unit } => {
                write!(f, "invalid time unit: {unit}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Errors raised by the lifecycle controller. These never occur on the
/// tick/depth hot path.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum LifecycleError {
    /// Historical warm-up failed after exhausting its retry budget.
    HistoricalFetchFailed {
        /// The symbol the fetch was for.
        symbol: String,
        /// Number of attempts made, including the first.
        attempts: u32,
    },

    /// The instrument descriptor for the configured symbol was not found.
    InstrumentNotFound {
        /// The symbol that was not found.
        symbol: String,
    },

    /// The supplied session token does not have the expected JWT shape.
    InvalidToken {
        /// Why the token was rejected.
        reason: String,
    },

    /// The realtime transport failed to connect or subscribe.
    TransportError {
        /// The underlying transport error message.
        message: String,
    },

    /// The requested transition is not valid from the controller's current
    /// state.
    InvalidTransition {
        /// The state the controller was in.
        from: &'static str,
        /// The transition that was attempted.
        action: &'static str,
    },
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::HistoricalFetchFailed { symbol, attempts } => {
                write!(
                    f,
                    "historical fetch failed for {symbol} after {attempts} attempt(s)"
                )
            }
            LifecycleError::InstrumentNotFound { symbol } => {
                write!(f, "instrument not found: {symbol}")
            }
            LifecycleError::InvalidToken { reason } => {
                write!(f, "invalid session token: {reason}")
            }
            LifecycleError::TransportError { message } => {
                write!(f, "transport error: {message}")
            }
            LifecycleError::InvalidTransition { from, action } => {
                write!(f, "cannot {action} while in state {from}")
            }
        }
    }
}

impl std::error::Error for LifecycleError {}
