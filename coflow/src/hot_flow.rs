//! Hot flows: sources that exist independently of their collectors.
//!
//! [`StateFlow`] always holds a current value and replays it to every new
//! collector. [`SharedFlow`] broadcasts emissions to whoever is subscribed at
//! the time, optionally replaying recent values to late subscribers.
//!
//! Collecting a hot flow never completes on its own while the hot flow is
//! alive; use `take`, `first` or cancellation to stop.

use crate::buffer::{BufferOverflow, BufferQueue, Offer};
use crate::flow::Flow;
use crate::{Emission, FlowCollector};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// A hot flow that holds and emits the latest state
///
/// Writes are serialized; collectors that fall behind skip straight to the
/// newest value.
pub struct StateFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    tx: Arc<watch::Sender<T>>,
    equality: Option<fn(&T, &T) -> bool>,
}

impl<T> StateFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new StateFlow with an initial value. Every write notifies
    /// collectors, even if the value did not change.
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            equality: None,
        }
    }

    /// Create a StateFlow that ignores writes equal to the current value
    pub fn distinct(initial: T) -> Self
    where
        T: PartialEq,
    {
        let (tx, _) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            equality: Some(<T as PartialEq>::eq),
        }
    }

    /// Get the current state
    pub fn value(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Get a reference to the current state
    pub fn borrow(&self) -> watch::Ref<'_, T> {
        self.tx.borrow()
    }

    /// Replace the state and notify collectors
    pub fn set_value(&self, value: T) {
        match self.equality {
            Some(eq) => {
                self.tx.send_if_modified(|current| {
                    if eq(current, &value) {
                        false
                    } else {
                        *current = value;
                        true
                    }
                });
            }
            None => {
                self.tx.send_replace(value);
            }
        }
    }

    /// Atomically compute the next state from the current one
    ///
    /// # Example
    /// ```ignore
    /// counter.update(|count| count + 1);
    /// ```
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let equality = self.equality;
        self.tx.send_if_modified(|current| {
            let next = f(current);
            if equality.is_some_and(|eq| eq(current, &next)) {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Convert to a cold Flow that emits the current value and all updates
    pub fn as_flow(&self) -> Flow<T> {
        let sender = Arc::downgrade(&self.tx);
        Flow::new(move |collector: FlowCollector<T>| {
            let sender = Weak::clone(&sender);
            async move {
                let Some(mut rx) = sender.upgrade().map(|tx| tx.subscribe()) else {
                    return Ok(());
                };

                // Emit the current value first
                let current = rx.borrow_and_update().clone();
                collector.emit(current).await?;

                // Then emit all subsequent updates
                while rx.changed().await.is_ok() {
                    let value = rx.borrow_and_update().clone();
                    collector.emit(value).await?;
                }
                Ok(())
            }
        })
    }

    /// Get the number of active collectors
    pub fn subscription_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T> Clone for StateFlow<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
            equality: self.equality,
        }
    }
}

/// Buffering configuration of a [`SharedFlow`]
///
/// # Example
/// ```ignore
/// let config = SharedFlowConfig::default()
///     .with_replay(1)
///     .with_extra_buffer_capacity(16)
///     .with_overflow(BufferOverflow::DropOldest);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SharedFlowConfig {
    /// Number of recent values replayed to each new subscriber
    pub replay: usize,
    /// Slots per subscriber on top of `replay`
    pub extra_buffer_capacity: usize,
    /// Policy when a subscriber's buffer is full
    pub on_buffer_overflow: BufferOverflow,
}

impl SharedFlowConfig {
    pub fn with_replay(mut self, replay: usize) -> Self {
        self.replay = replay;
        self
    }

    pub fn with_extra_buffer_capacity(mut self, capacity: usize) -> Self {
        self.extra_buffer_capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: BufferOverflow) -> Self {
        self.on_buffer_overflow = overflow;
        self
    }

    fn subscriber_capacity(&self) -> usize {
        self.replay + self.extra_buffer_capacity
    }
}

struct SharedState<T> {
    replay_cache: VecDeque<T>,
    subscribers: Vec<Weak<BufferQueue<T>>>,
}

struct SharedInner<T> {
    config: SharedFlowConfig,
    state: Mutex<SharedState<T>>,
    emit_lock: tokio::sync::Mutex<()>,
}

impl<T> SharedInner<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self) -> Subscription<T> {
        let queue = Arc::new(BufferQueue::new(
            Some(self.config.subscriber_capacity()),
            self.config.on_buffer_overflow,
        ));

        let mut state = self.state.lock();
        for value in &state.replay_cache {
            queue.try_push(value.clone());
        }
        state.subscribers.retain(|subscriber| subscriber.strong_count() > 0);
        state.subscribers.push(Arc::downgrade(&queue));
        tracing::trace!(
            subscribers = state.subscribers.len(),
            replayed = state.replay_cache.len(),
            "shared flow subscriber registered"
        );

        Subscription { queue }
    }

    /// Record `value` for replay and return the live subscriber queues
    fn publish(&self, value: &T) -> Vec<Arc<BufferQueue<T>>> {
        let mut state = self.state.lock();
        if self.config.replay > 0 {
            if state.replay_cache.len() == self.config.replay {
                state.replay_cache.pop_front();
            }
            state.replay_cache.push_back(value.clone());
        }
        state.subscribers.retain(|subscriber| subscriber.strong_count() > 0);
        state.subscribers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl<T> Drop for SharedInner<T> {
    fn drop(&mut self) {
        for subscriber in self.state.get_mut().subscribers.drain(..) {
            if let Some(queue) = subscriber.upgrade() {
                queue.close(Ok(()));
            }
        }
    }
}

/// A subscriber's queue; unregisters itself when the collection ends
struct Subscription<T> {
    queue: Arc<BufferQueue<T>>,
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.queue.close_receiver();
        tracing::trace!("shared flow subscriber left");
    }
}

/// A hot flow that multicasts values to all collectors
///
/// Subscribers only see values emitted after they subscribed, plus up to
/// `replay` recent values. When every `SharedFlow` handle has been dropped,
/// subscribers drain what they have buffered and complete.
pub struct SharedFlow<T>
where
    T: Clone + Send + 'static,
{
    inner: Arc<SharedInner<T>>,
}

impl<T> SharedFlow<T>
where
    T: Clone + Send + 'static,
{
    /// Create a SharedFlow without replay or extra buffer.
    ///
    /// Every subscriber still has a single slot, so `emit` returns once each
    /// subscriber has room for the value, not once it has received it.
    pub fn new() -> Self {
        Self::with_config(SharedFlowConfig::default())
    }

    pub fn with_config(config: SharedFlowConfig) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                config,
                state: Mutex::new(SharedState {
                    replay_cache: VecDeque::with_capacity(config.replay),
                    subscribers: Vec::new(),
                }),
                emit_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> SharedFlowConfig {
        self.inner.config
    }

    /// Emit a value to all subscribers.
    ///
    /// With [`BufferOverflow::Suspend`] this waits until every subscriber
    /// has room for the value. Emissions are delivered in call order.
    pub async fn emit(&self, value: T) {
        let _serial = self.inner.emit_lock.lock().await;
        for queue in self.inner.publish(&value) {
            // a failed push means that subscriber is gone
            let _ = queue.push(value.clone()).await;
        }
    }

    /// Emit without waiting. Returns `false`, delivering nothing, when a
    /// subscriber would have to be waited for.
    pub fn try_emit(&self, value: T) -> bool {
        let Ok(_serial) = self.inner.emit_lock.try_lock() else {
            return false;
        };
        let subscribers: Vec<_> = self
            .inner
            .state
            .lock()
            .subscribers
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        if subscribers.iter().any(|queue| queue.would_suspend()) {
            tracing::debug!("shared flow try_emit rejected: subscriber buffer full");
            return false;
        }

        for queue in self.inner.publish(&value) {
            if let Offer::Dropped = queue.try_push(value.clone()) {
                tracing::trace!("shared flow value dropped for a slow subscriber");
            }
        }
        true
    }

    /// Convert to a cold Flow that subscribes on every collection
    pub fn as_flow(&self) -> Flow<T> {
        let inner = Arc::downgrade(&self.inner);
        Flow::new(move |collector: FlowCollector<T>| {
            let inner = Weak::clone(&inner);
            async move {
                let Some(subscription) = inner.upgrade().map(|inner| inner.subscribe()) else {
                    return Ok(());
                };

                loop {
                    match subscription.queue.recv().await {
                        Emission::Value(value) => collector.emit(value).await?,
                        Emission::Complete => return Ok(()),
                        Emission::Fault(error) => return Err(error),
                    }
                }
            }
        })
    }

    /// Values a new subscriber would receive right now
    pub fn replay_cache(&self) -> Vec<T> {
        self.inner.state.lock().replay_cache.iter().cloned().collect()
    }

    pub fn reset_replay_cache(&self) {
        self.inner.state.lock().replay_cache.clear();
    }

    /// Get the number of active subscribers
    pub fn subscription_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.strong_count() > 0)
            .count()
    }
}

impl<T> Default for SharedFlow<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SharedFlow<T>
where
    T: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
