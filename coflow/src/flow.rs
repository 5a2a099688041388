use crate::buffer::{self, BufferOverflow, BufferReceiver, DEFAULT_BUFFER_CAPACITY};
use crate::{Emission, FlowCollector, FlowError, FlowResult};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::DropGuard;

/// Flow represents a cold asynchronous stream
///
/// A flow is only a description of how to produce values: nothing runs until
/// it is collected, and every collection runs the producer again from the
/// start.
pub struct Flow<T> {
    collect_fn: Arc<dyn Fn(FlowCollector<T>) -> BoxFuture<'static, FlowResult> + Send + Sync>,
}

impl<T: Send + 'static> Flow<T> {
    /// Create a flow from a producer body
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(FlowCollector<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        Self {
            collect_fn: Arc::new(move |collector| Box::pin(f(collector))),
        }
    }

    /// Run the producer against an explicit collector
    pub async fn collect_with(&self, collector: FlowCollector<T>) -> FlowResult {
        (self.collect_fn)(collector).await
    }

    /// Collect values from this flow, returning the fault that ended it, if any
    pub async fn collect<F, Fut>(&self, mut on_value: F) -> FlowResult
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.try_collect(move |value| {
            let pending = on_value(value);
            async move {
                pending.await;
                Ok(())
            }
        })
        .await
    }

    /// Collect values with a callback that can itself fail and stop the flow
    pub async fn try_collect<F, Fut>(&self, on_value: F) -> FlowResult
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        let on_value = Arc::new(Mutex::new(on_value));
        self.collect_with(FlowCollector::new(move |value| {
            let mut on_value = on_value.lock();
            (&mut *on_value)(value)
        }))
        .await
    }

    /// Create a flow that emits a single value
    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move |collector| {
            let value = value.clone();
            async move { collector.emit(value).await }
        })
    }

    /// Create an empty flow
    pub fn empty() -> Self {
        Self::new(|_collector| async { Ok(()) })
    }

    /// Create a flow that fails immediately
    pub fn failed(error: FlowError) -> Self {
        Self::new(move |_collector| {
            let error = error.clone();
            async move { Err(error) }
        })
    }

    /// Pull-based view of this flow.
    ///
    /// The producer starts on the first poll and runs ahead by up to
    /// [`DEFAULT_BUFFER_CAPACITY`] values. A fault is yielded once as the
    /// final item. Dropping the stream cancels the producer.
    pub fn into_stream(self) -> BoxStream<'static, FlowResult<T>> {
        enum Pull<T> {
            Idle(Flow<T>),
            Running(BufferReceiver<T>, DropGuard),
            Done,
        }

        stream::unfold(Pull::Idle(self), |pull| async move {
            let (receiver, guard) = match pull {
                Pull::Idle(flow) => {
                    let (sender, receiver) =
                        buffer::channel(Some(DEFAULT_BUFFER_CAPACITY), BufferOverflow::Suspend);
                    let job = buffer::produce(flow, sender, None);
                    (receiver, job.cancel_on_drop())
                }
                Pull::Running(receiver, guard) => (receiver, guard),
                Pull::Done => return None,
            };

            match receiver.recv().await {
                Emission::Value(value) => Some((Ok(value), Pull::Running(receiver, guard))),
                Emission::Complete => None,
                Emission::Fault(error) => Some((Err(error), Pull::Done)),
            }
        })
        .boxed()
    }
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self {
            collect_fn: Arc::clone(&self.collect_fn),
        }
    }
}

/// Build a flow from a producer body (like Kotlin's `flow { }`)
///
/// # Example
/// ```ignore
/// let numbers = flow(|collector| async move {
///     for i in 1..=3 {
///         collector.emit(i).await?;
///     }
///     Ok(())
/// });
/// ```
pub fn flow<T, F, Fut>(f: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(FlowCollector<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult> + Send + 'static,
{
    Flow::new(f)
}
