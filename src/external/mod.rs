//! Trait boundaries for the REST and realtime collaborators the engine
//! is driven by, so the core can be tested against in-memory fakes.

pub(crate) mod historical;
pub(crate) mod transport;

pub use historical::{HistoricalDataSource, HistoricalError, InstrumentInfo};
pub use transport::{Channel, FrameHandler, RealtimeTransport, TransportError};
