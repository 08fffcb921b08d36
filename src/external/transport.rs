//! The realtime WebSocket/SignalR collaborator the lifecycle controller
//! connects and subscribes through.

use std::sync::Arc;

/// The three frame channels a [`RealtimeTransport`] dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Level-2 depth updates.
    MarketDepth,
    /// Best bid/ask quote updates.
    QuoteUpdate,
    /// Trade executions.
    MarketTrade,
}

/// A callback registered against one [`Channel`], invoked with the raw
/// JSON frame for that channel.
pub type FrameHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// A collaborator the lifecycle controller drives to establish and tear
/// down the realtime feed. Implementations talk to a WebSocket/SignalR
/// endpoint; tests supply an in-memory fake.
pub trait RealtimeTransport: Send + Sync {
    /// Establish the underlying connection. Returns `true` on success.
    fn connect(&self) -> Result<bool, TransportError>;

    /// Subscribe to market data for the given contract identifiers.
    /// Returns `true` on success.
    fn subscribe_market_data(&self, contract_ids: &[String]) -> Result<bool, TransportError>;

    /// Register `handler` to be invoked for every frame received on
    /// `channel`.
    fn add_callback(&self, channel: Channel, handler: FrameHandler);

    /// Tear down the connection. Idempotent.
    fn disconnect(&self);
}

/// An error from a [`RealtimeTransport`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    /// A human-readable description of the failure.
    pub message: String,
}

impl TransportError {
    /// Build an error with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "realtime transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory [`RealtimeTransport`] for tests: records subscribed
    /// contracts and registered handlers, and lets the test drive
    /// frames through them directly via [`FakeTransport::emit`].
    #[derive(Default)]
    pub struct FakeTransport {
        pub connected: Mutex<bool>,
        pub subscribed: Mutex<Vec<String>>,
        handlers: Mutex<Vec<(Channel, FrameHandler)>>,
    }

    impl FakeTransport {
        /// Deliver `frame` to every handler registered on `channel`.
        pub fn emit(&self, channel: Channel, frame: &serde_json::Value) {
            for (registered_channel, handler) in self.handlers.lock().unwrap().iter() {
                if *registered_channel == channel {
                    handler(frame);
                }
            }
        }
    }

    impl RealtimeTransport for FakeTransport {
        fn connect(&self) -> Result<bool, TransportError> {
            *self.connected.lock().unwrap() = true;
            Ok(true)
        }

        fn subscribe_market_data(&self, contract_ids: &[String]) -> Result<bool, TransportError> {
            self.subscribed
                .lock()
                .unwrap()
                .extend(contract_ids.iter().cloned());
            Ok(true)
        }

        fn add_callback(&self, channel: Channel, handler: FrameHandler) {
            self.handlers.lock().unwrap().push((channel, handler));
        }

        fn disconnect(&self) {
            *self.connected.lock().unwrap() = false;
        }
    }
}
