//! Timeframes and time-bucket arithmetic.

mod bucket;
mod timeframe;

pub use bucket::bucket_start;
pub use timeframe::{TimeUnit, Timeframe};
