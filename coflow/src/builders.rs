//! Flow builders for creating flows from various sources
//!
//! This module provides convenient ways to create flows from iterators,
//! fixed values, channels, and timers.

use crate::flow::Flow;
use crate::FlowResult;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel capacity used by [`channel_flow`]
const CHANNEL_FLOW_CAPACITY: usize = 16;

/// Trait for converting types into Flow
pub trait IntoFlow<T> {
    /// Convert this type into a Flow
    fn into_flow(self) -> Flow<T>;
}

/// Convert an iterable into a Flow; each collection iterates a fresh clone
impl<I, T> IntoFlow<T> for I
where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
    T: Send + 'static,
{
    fn into_flow(self) -> Flow<T> {
        Flow::new(move |collector| {
            let values = self.clone();
            async move { collector.emit_all(values).await }
        })
    }
}

/// Create a flow from multiple values (like Kotlin's `flowOf`)
pub fn flow_of<T, I>(values: I) -> Flow<T>
where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
    T: Send + 'static,
{
    values.into_flow()
}

/// Create a flow whose values are sent through an mpsc channel.
///
/// Like Kotlin's `channelFlow`, the builder may hand the sender to other
/// tasks, so values can be produced concurrently. The flow completes when
/// the builder returns and every sender clone is dropped.
///
/// # Example
/// ```ignore
/// let flow = channel_flow(|tx| async move {
///     tx.send(1).await.ok();
///     tx.send(2).await.ok();
///     Ok(())
/// });
/// ```
pub fn channel_flow<T, F, Fut>(builder: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(mpsc::Sender<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult> + Send + 'static,
{
    let builder = Arc::new(builder);
    Flow::new(move |collector| {
        let builder = Arc::clone(&builder);
        async move {
            let (tx, mut rx) = mpsc::channel(CHANNEL_FLOW_CAPACITY);
            let producer = builder(tx);
            tokio::pin!(producer);

            let mut outcome = None;
            loop {
                tokio::select! {
                    result = &mut producer, if outcome.is_none() => {
                        outcome = Some(result);
                    }
                    received = rx.recv() => match received {
                        Some(value) => collector.emit(value).await?,
                        None => break,
                    },
                }
            }

            match outcome {
                Some(result) => result,
                None => producer.await,
            }
        }
    })
}

/// Create a flow that repeats a value indefinitely.
/// Use with `take()` to limit the number of emissions.
///
/// # Example
/// ```ignore
/// let flow = repeat_flow(42).take(5); // Emits 42 five times
/// ```
pub fn repeat_flow<T: Clone + Send + Sync + 'static>(value: T) -> Flow<T> {
    Flow::new(move |collector| {
        let value = value.clone();
        async move {
            loop {
                collector.emit(value.clone()).await?;
            }
        }
    })
}

/// Create a flow that counts up from zero, one value per `period`.
/// The first value is emitted immediately.
///
/// # Example
/// ```ignore
/// let flow = interval_flow(Duration::from_secs(1)).take(5);
/// ```
pub fn interval_flow(period: Duration) -> Flow<u64> {
    Flow::new(move |collector| async move {
        let mut interval = tokio::time::interval(period);
        let mut counter = 0u64;

        loop {
            interval.tick().await;
            collector.emit(counter).await?;
            counter += 1;
        }
    })
}

/// Macro to create a flow from a list of values (like Kotlin's flowOf)
///
/// # Example
/// ```ignore
/// let flow = flow_of!(1, 2, 3, 4, 5);
/// ```
#[macro_export]
macro_rules! flow_of {
    () => {
        $crate::Flow::empty()
    };
    ($($value:expr),+ $(,)?) => {{
        $crate::builders::flow_of([$($value),+])
    }};
}
