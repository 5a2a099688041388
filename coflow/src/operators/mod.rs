use crate::buffer::BufferOverflow;
use crate::flow::Flow;
use crate::{FlowCollector, FlowResult};
use coflow_core::Dispatcher;
use std::future::Future;

/// Extension methods for Flow
///
/// Every operator returns a new cold flow; nothing runs until the result is
/// collected. Faults and completion pass through unchanged unless stated
/// otherwise.
pub trait FlowExt<T>: Sized
where
    T: Send + 'static,
{
    /// Map each value in the flow (async)
    fn map<U, F, Fut>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static;

    /// Map each value in the flow (sync - Kotlin-like)
    ///
    /// # Example
    /// ```ignore
    /// flow.map_sync(|x| x * 2)
    /// ```
    fn map_sync<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static;

    /// Filter values in the flow (async)
    fn filter<F, Fut>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static;

    /// Filter values in the flow (sync - Kotlin-like)
    ///
    /// # Example
    /// ```ignore
    /// flow.filter_sync(|x| x % 2 == 0)
    /// ```
    fn filter_sync<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static;

    /// Emit zero, one or many values per upstream value
    ///
    /// # Example
    /// ```ignore
    /// flow.transform(|value, collector| async move {
    ///     collector.emit(format!("value: {value}")).await?;
    ///     collector.emit(format!("square: {}", value * value)).await
    /// })
    /// ```
    fn transform<U, F, Fut>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T, FlowCollector<U>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static;

    /// Take only the first n values, then stop the upstream
    fn take(self, count: usize) -> Flow<T>;

    /// Skip the first n values (Kotlin's drop)
    fn drop_first(self, count: usize) -> Flow<T>;

    /// Take values while predicate is true, then stop the upstream
    fn take_while<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static;

    /// Skip values while predicate is true
    fn drop_while<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static;

    /// Perform a side effect for each value (Kotlin's onEach)
    fn on_each<F>(self, f: F) -> Flow<T>
    where
        F: Fn(&T) + Send + Sync + 'static;

    /// Only emit distinct consecutive values
    fn distinct_until_changed(self) -> Flow<T>
    where
        T: Clone + PartialEq;

    /// Fully collect the flow produced for each value before moving on to
    /// the next value (Kotlin's flatMapConcat)
    fn flat_map_concat<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flow<U> + Send + Sync + 'static;

    /// Let the upstream run ahead of the collector by up to `capacity` values
    fn buffer(self, capacity: usize) -> Flow<T>;

    /// Let the upstream run ahead without limit
    fn buffer_unbounded(self) -> Flow<T>;

    /// Buffer with an explicit capacity (`None` for unbounded) and overflow policy
    fn buffer_with(self, capacity: Option<usize>, overflow: BufferOverflow) -> Flow<T>;

    /// Keep only the most recent value the collector has not picked up yet
    fn conflate(self) -> Flow<T>;

    /// Switch to a different dispatcher for upstream collection
    fn flow_on(self, dispatcher: Dispatcher) -> Flow<T>;
}

mod implementation;
