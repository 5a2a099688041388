//! Bounded hand-off queue between a producer task and a single consumer.
//!
//! Every operator that moves a flow across a task boundary (`buffer`,
//! `conflate`, `flow_on`, `zip`, `combine`, `sample`) and every hot-flow
//! subscription moves its values through a [`BufferQueue`].

use crate::{Emission, Flow, FlowCollector, FlowError, FlowResult};
use coflow_core::{Dispatcher, ExecutionContext, JobHandle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Capacity used by `buffer()`, `flow_on` and `into_stream`
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// What happens when a value arrives at a full buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferOverflow {
    /// Suspend the producer until the consumer frees a slot
    #[default]
    Suspend,
    /// Evict the oldest buffered value to make room
    DropOldest,
    /// Discard the incoming value
    DropLatest,
}

pub(crate) enum Offer<T> {
    Accepted,
    Dropped,
    Full(T),
    Closed,
}

struct QueueState<T> {
    items: VecDeque<T>,
    terminal: Option<FlowResult>,
    receiver_alive: bool,
}

/// Queue with one consumer. Pushes must not run concurrently with each other.
pub(crate) struct BufferQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: Option<usize>,
    overflow: BufferOverflow,
    readable: Notify,
    writable: Notify,
}

impl<T> BufferQueue<T> {
    /// `None` capacity means unbounded; a capacity of zero holds one value.
    pub(crate) fn new(capacity: Option<usize>, overflow: BufferOverflow) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                terminal: None,
                receiver_alive: true,
            }),
            capacity: capacity.map(|capacity| capacity.max(1)),
            overflow,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub(crate) fn try_push(&self, value: T) -> Offer<T> {
        let mut state = self.state.lock();
        if !state.receiver_alive || state.terminal.is_some() {
            return Offer::Closed;
        }

        let full = self
            .capacity
            .is_some_and(|capacity| state.items.len() >= capacity);
        let offer = if !full {
            state.items.push_back(value);
            Offer::Accepted
        } else {
            match self.overflow {
                BufferOverflow::Suspend => return Offer::Full(value),
                BufferOverflow::DropOldest => {
                    state.items.pop_front();
                    state.items.push_back(value);
                    Offer::Accepted
                }
                BufferOverflow::DropLatest => Offer::Dropped,
            }
        };
        drop(state);

        if matches!(offer, Offer::Accepted) {
            self.readable.notify_one();
        }
        offer
    }

    /// Push, waiting for space under [`BufferOverflow::Suspend`].
    ///
    /// Fails with [`FlowError::Cancelled`] once the consumer is gone.
    pub(crate) async fn push(&self, mut value: T) -> FlowResult {
        loop {
            match self.try_push(value) {
                Offer::Accepted | Offer::Dropped => return Ok(()),
                Offer::Closed => return Err(FlowError::Cancelled),
                Offer::Full(rejected) => {
                    value = rejected;
                    self.writable.notified().await;
                }
            }
        }
    }

    /// Wait for a fault to be recorded, ignoring queued values.
    ///
    /// Lets a consumer that is not ready for the next value still react to
    /// a failing producer.
    pub(crate) async fn fault(&self) -> FlowError {
        loop {
            let fault = match &self.state.lock().terminal {
                Some(Err(error)) => Some(error.clone()),
                _ => None,
            };
            if let Some(error) = fault {
                return error;
            }
            self.readable.notified().await;
        }
    }

    /// Record the terminal signal; values already queued are still delivered
    pub(crate) fn close(&self, result: FlowResult) {
        let mut state = self.state.lock();
        if state.terminal.is_none() {
            state.terminal = Some(result);
        }
        drop(state);
        self.readable.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        let state = self.state.lock();
        state.terminal.is_some() || !state.receiver_alive
    }

    pub(crate) async fn recv(&self) -> Emission<T> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(value) = state.items.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Emission::Value(value);
                }
                if let Some(terminal) = &state.terminal {
                    return Emission::terminal(terminal.clone());
                }
            }
            self.readable.notified().await;
        }
    }

    /// The consumer went away: drop what is queued and fail further pushes
    pub(crate) fn close_receiver(&self) {
        let mut state = self.state.lock();
        state.receiver_alive = false;
        state.items.clear();
        drop(state);
        self.writable.notify_one();
    }

    /// Whether a push right now would have to wait for the consumer
    pub(crate) fn would_suspend(&self) -> bool {
        self.overflow == BufferOverflow::Suspend
            && self
                .capacity
                .is_some_and(|capacity| self.state.lock().items.len() >= capacity)
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

/// Producing half of a [`channel`]
pub(crate) struct BufferSender<T> {
    queue: Arc<BufferQueue<T>>,
}

impl<T> BufferSender<T> {
    pub(crate) async fn send(&self, value: T) -> FlowResult {
        self.queue.push(value).await
    }

    pub(crate) fn close(&self, result: FlowResult) {
        self.queue.close(result);
    }
}

impl<T> Drop for BufferSender<T> {
    fn drop(&mut self) {
        if self.queue.is_closed() {
            return;
        }
        if std::thread::panicking() {
            tracing::warn!("buffered producer panicked before completing");
            self.queue
                .close(Err(FlowError::fault("producer terminated without completing")));
        } else {
            // torn down by cancellation
            self.queue.close(Err(FlowError::Cancelled));
        }
    }
}

/// Consuming half of a [`channel`]
pub(crate) struct BufferReceiver<T> {
    queue: Arc<BufferQueue<T>>,
}

impl<T> BufferReceiver<T> {
    pub(crate) async fn recv(&self) -> Emission<T> {
        self.queue.recv().await
    }

    pub(crate) async fn fault(&self) -> FlowError {
        self.queue.fault().await
    }
}

impl<T> Drop for BufferReceiver<T> {
    fn drop(&mut self) {
        self.queue.close_receiver();
    }
}

pub(crate) fn channel<T>(
    capacity: Option<usize>,
    overflow: BufferOverflow,
) -> (BufferSender<T>, BufferReceiver<T>) {
    let queue = Arc::new(BufferQueue::new(capacity, overflow));
    (
        BufferSender {
            queue: Arc::clone(&queue),
        },
        BufferReceiver { queue },
    )
}

/// Collect `upstream` into `sender` as a separate job.
///
/// With a dispatcher the job runs there in a fresh execution context;
/// otherwise it inherits the caller's context.
pub(crate) fn produce<T>(
    upstream: Flow<T>,
    sender: BufferSender<T>,
    dispatcher: Option<Dispatcher>,
) -> JobHandle
where
    T: Send + 'static,
{
    let body = async move {
        let sender = Arc::new(sender);
        let forward = Arc::clone(&sender);
        let result = upstream
            .collect_with(FlowCollector::new(move |value| {
                let forward = Arc::clone(&forward);
                async move { forward.send(value).await }
            }))
            .await;
        sender.close(result);
    };

    match dispatcher {
        Some(dispatcher) => {
            let job = JobHandle::new();
            let run = job.clone().run(body);
            ExecutionContext::new(dispatcher).spawn(async move {
                run.await;
            });
            job
        }
        None => coflow_core::launch(body),
    }
}

/// Forward everything received to `collector` until a terminal signal
pub(crate) async fn drain<T>(receiver: &BufferReceiver<T>, collector: &FlowCollector<T>) -> FlowResult {
    loop {
        match receiver.recv().await {
            Emission::Value(value) => collector.emit(value).await?,
            Emission::Complete => return Ok(()),
            Emission::Fault(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<T>(queue: &BufferQueue<T>) -> Vec<T> {
        let mut state = queue.state.lock();
        state.items.drain(..).collect()
    }

    #[test]
    fn drop_oldest_keeps_latest_values() {
        let queue = BufferQueue::new(Some(2), BufferOverflow::DropOldest);
        for value in 1..=4 {
            assert!(matches!(queue.try_push(value), Offer::Accepted));
        }
        assert_eq!(values(&queue), vec![3, 4]);
    }

    #[test]
    fn drop_latest_rejects_incoming_values() {
        let queue = BufferQueue::new(Some(2), BufferOverflow::DropLatest);
        queue.try_push(1);
        queue.try_push(2);
        assert!(matches!(queue.try_push(3), Offer::Dropped));
        assert_eq!(values(&queue), vec![1, 2]);
    }

    #[test]
    fn suspend_reports_full_queue() {
        let queue = BufferQueue::new(Some(0), BufferOverflow::Suspend);
        assert!(matches!(queue.try_push(1), Offer::Accepted));
        assert!(matches!(queue.try_push(2), Offer::Full(2)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn closed_receiver_rejects_pushes() {
        let queue = BufferQueue::new(None, BufferOverflow::Suspend);
        queue.try_push(1);
        queue.close_receiver();
        assert!(matches!(queue.try_push(2), Offer::Closed));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn queued_values_are_delivered_before_terminal() {
        let (sender, receiver) = channel(Some(4), BufferOverflow::Suspend);
        sender.send(1).await.unwrap();
        sender.send(2).await.unwrap();
        sender.close(Err(FlowError::fault("boom")));

        assert!(matches!(receiver.recv().await, Emission::Value(1)));
        assert!(matches!(receiver.recv().await, Emission::Value(2)));
        assert!(matches!(receiver.recv().await, Emission::Fault(_)));
    }

    #[tokio::test]
    async fn fault_is_seen_past_queued_values() {
        let (sender, receiver) = channel(Some(2), BufferOverflow::Suspend);
        sender.send(1).await.unwrap();
        sender.close(Err(FlowError::fault("boom")));

        assert!(matches!(receiver.fault().await, FlowError::Producer(_)));
        assert!(matches!(receiver.recv().await, Emission::Value(1)));
    }

    #[tokio::test]
    async fn suspended_push_resumes_after_recv() {
        let (sender, receiver) = channel(Some(1), BufferOverflow::Suspend);
        sender.send(1).await.unwrap();

        let pending = tokio::spawn(async move {
            sender.send(2).await.unwrap();
            sender.close(Ok(()));
        });

        assert!(matches!(receiver.recv().await, Emission::Value(1)));
        assert!(matches!(receiver.recv().await, Emission::Value(2)));
        assert!(matches!(receiver.recv().await, Emission::Complete));
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_sender_cancels_receiver() {
        let (sender, receiver) = channel::<i32>(Some(1), BufferOverflow::Suspend);
        drop(sender);
        assert!(matches!(receiver.recv().await, Emission::Fault(FlowError::Cancelled)));
    }

    #[tokio::test]
    async fn sender_dropped_by_a_panic_faults_receiver() {
        let (sender, receiver) = channel::<i32>(Some(1), BufferOverflow::Suspend);
        let panicked = tokio::spawn(async move {
            let _sender = sender;
            panic!("producer blew up");
        })
        .await;

        assert!(panicked.is_err());
        assert!(matches!(receiver.recv().await, Emission::Fault(FlowError::Producer(_))));
    }
}
