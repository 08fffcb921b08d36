//! Lock-free observability counters, readable without acquiring
//! `bars_lock` or `book_lock`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for engine-wide activity, complementing
/// [`crate::book::OrderTypeStats`]'s per-entry-type counts.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Ticks successfully fanned out to every configured timeframe.
    pub ticks_ingested: AtomicU64,
    /// Ticks discarded for landing in an already-closed bucket, summed
    /// across every timeframe they were discarded on.
    pub late_ticks_discarded: AtomicU64,
    /// Depth frames classified and applied.
    pub depth_frames_processed: AtomicU64,
    /// Quote frames normalized.
    pub quote_frames_processed: AtomicU64,
    /// Subscriber callbacks that panicked during dispatch.
    pub callback_errors: AtomicU64,
}

impl EngineStats {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        EngineStats::default()
    }

    /// A point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            ticks_ingested: self.ticks_ingested.load(Ordering::Relaxed),
            late_ticks_discarded: self.late_ticks_discarded.load(Ordering::Relaxed),
            depth_frames_processed: self.depth_frames_processed.load(Ordering::Relaxed),
            quote_frames_processed: self.quote_frames_processed.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_ingest(&self, new_bars: usize, discarded_late: usize) {
        self.ticks_ingested.fetch_add(1, Ordering::Relaxed);
        if discarded_late > 0 {
            self.late_ticks_discarded
                .fetch_add(discarded_late as u64, Ordering::Relaxed);
        }
        let _ = new_bars;
    }

    pub(crate) fn record_depth_frame(&self) {
        self.depth_frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_quote_frame(&self) {
        self.quote_frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_error(&self) {
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// An owned, cloneable copy of [`EngineStats`] for the read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStatsSnapshot {
    /// Ticks successfully fanned out to every configured timeframe.
    pub ticks_ingested: u64,
    /// Ticks discarded for landing in an already-closed bucket.
    pub late_ticks_discarded: u64,
    /// Depth frames classified and applied.
    pub depth_frames_processed: u64,
    /// Quote frames normalized.
    pub quote_frames_processed: u64,
    /// Subscriber callbacks that panicked during dispatch.
    pub callback_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let stats = EngineStats::new();
        stats.record_ingest(1, 2);
        stats.record_depth_frame();
        stats.record_quote_frame();
        stats.record_callback_error();

        let snap = stats.snapshot();
        assert_eq!(snap.ticks_ingested, 1);
        assert_eq!(snap.late_ticks_discarded, 2);
        assert_eq!(snap.depth_frames_processed, 1);
        assert_eq!(snap.quote_frames_processed, 1);
        assert_eq!(snap.callback_errors, 1);
    }
}
