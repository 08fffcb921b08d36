//! Level-2 order book: sides, price levels, and the depth-event
//! classifier.

mod depth;
mod level;
mod side;

pub use depth::{classify_depth_batch, ClassifyOutcome, DepthEntry, OrderTypeStats, RawDepthEntry};
pub use level::PriceLevel;
pub use side::{BookSide, Side};
