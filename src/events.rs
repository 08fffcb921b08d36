//! Subscriber callback channels and ordered dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::book::RawDepthEntry;
use crate::quote::NormalizedQuote;
use crate::tick::NewBarEvent;
use crate::trade::TradeSide;

/// A subscriber callback for one channel, invoked with a borrowed payload.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Submits a callback invocation to run off the calling thread. When no
/// executor is configured, dispatch happens synchronously instead.
pub trait Executor: Send + Sync {
    /// Schedule `job` to run, without blocking the calling thread.
    fn spawn(&self, job: Box<dyn FnOnce() + Send>);
}

/// Payload for the `data_update` channel: the normalized tick that was
/// fanned out to every bar series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataUpdatePayload {
    /// When the tick occurred.
    pub ts: DateTime<Utc>,
    /// The tick price.
    pub price: Decimal,
    /// The tick volume.
    pub volume: u64,
}

/// Payload for the `market_depth` channel: the raw vendor frame, passed
/// through unmodified after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDepthPayload {
    /// The raw entries from this depth frame.
    pub entries: Vec<RawDepthEntry>,
}

/// One raw trade entry from a `market_trade` vendor frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTradeEntry {
    /// Execution price.
    pub price: Decimal,
    /// Execution volume, or the small-trade default if absent on the wire.
    pub volume: u64,
    /// Vendor side code: `0` means sell, anything else means buy.
    pub entry_type: i32,
    /// Execution instant.
    pub ts: DateTime<Utc>,
}

/// The enhanced form of a trade event, derived from the raw entry plus
/// book-side context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhancedTrade {
    /// Execution instant.
    pub ts: DateTime<Utc>,
    /// Execution price.
    pub price: Decimal,
    /// Execution size.
    pub size: u64,
    /// Inferred aggressor side.
    pub side: TradeSide,
    /// `true` if the trade crossed a known top-of-book (side is not
    /// `Unknown`).
    pub is_aggressive: bool,
}

/// Payload for the `market_trade` channel: the raw entry plus its
/// enhanced form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketTradePayload {
    /// The raw vendor entry.
    pub raw: RawTradeEntry,
    /// The enhanced, book-aware form.
    pub enhanced: EnhancedTrade,
}

/// An ordered list of subscriber callbacks for one channel. Registration
/// is rare relative to dispatch; the subscriber list sits behind an
/// `RwLock` so both `subscribe` and `dispatch` take `&self` and any
/// thread may subscribe without an outer `&mut Engine`.
pub struct Dispatcher<T> {
    subscribers: RwLock<Vec<(Uuid, Callback<T>)>>,
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Dispatcher {
            subscribers: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Dispatcher<T> {
    /// Register a callback, returning a handle for [`Dispatcher::unsubscribe`].
    pub fn subscribe(&self, callback: Callback<T>) -> Uuid {
        let id = Uuid::new_v4();
        self.subscribers.write().unwrap().push((id, callback));
        id
    }

    /// Remove a previously registered callback. No-op if `id` is unknown.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers
            .write()
            .unwrap()
            .retain(|(existing, _)| *existing != id);
    }

    /// Number of currently registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    /// `true` iff there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().unwrap().is_empty()
    }

    /// Invoke every subscriber in registration order, either directly or
    /// via `executor`. A panicking subscriber is caught, logged, and does
    /// not stop dispatch to the rest. Returns the number of subscribers
    /// that panicked (always `0` when dispatching through an executor,
    /// since those failures surface on the executor's own thread).
    pub fn dispatch(&self, event: &T, executor: Option<&dyn Executor>) -> u64
    where
        T: Send + Sync + Clone + 'static,
    {
        let mut errors = 0;
        for (_, callback) in self.subscribers.read().unwrap().iter() {
            match executor {
                Some(executor) => {
                    let callback = Arc::clone(callback);
                    let event = event.clone();
                    executor.spawn(Box::new(move || {
                        invoke_guarded(&callback, &event);
                    }));
                }
                None => {
                    if !invoke_guarded(callback, event) {
                        errors += 1;
                    }
                }
            }
        }
        errors
    }
}

fn invoke_guarded<T>(callback: &Callback<T>, event: &T) -> bool {
    let result = catch_unwind(AssertUnwindSafe(|| callback(event)));
    if result.is_err() {
        tracing::error!("subscriber callback panicked; event dispatch continuing");
    }
    result.is_ok()
}

/// One [`Dispatcher`] per channel named in the read API.
#[derive(Default)]
pub struct EventBus {
    /// Subscribers to `data_update`.
    pub data_update: Dispatcher<DataUpdatePayload>,
    /// Subscribers to `new_bar`.
    pub new_bar: Dispatcher<NewBarEvent>,
    /// Subscribers to `market_depth`.
    pub market_depth: Dispatcher<MarketDepthPayload>,
    /// Subscribers to `quote_update`.
    pub quote_update: Dispatcher<NormalizedQuote>,
    /// Subscribers to `market_trade`.
    pub market_trade: Dispatcher<MarketTradePayload>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn subscribers_are_invoked_in_registration_order() {
        let dispatcher: Dispatcher<u32> = Dispatcher::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in [1u32, 2, 3] {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(Arc::new(move |_: &u32| {
                seen.lock().unwrap().push(tag);
            }));
        }
        dispatcher.dispatch(&0, None);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn a_panicking_subscriber_does_not_stop_the_rest() {
        let dispatcher: Dispatcher<u32> = Dispatcher::default();
        let calls = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe(Arc::new(|_: &u32| panic!("boom")));
        let calls_clone = Arc::clone(&calls);
        dispatcher.subscribe(Arc::new(move |_: &u32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.dispatch(&0, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_the_named_handle() {
        let dispatcher: Dispatcher<u32> = Dispatcher::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let id = dispatcher.subscribe(Arc::new(move |_: &u32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        dispatcher.unsubscribe(id);
        dispatcher.dispatch(&0, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
