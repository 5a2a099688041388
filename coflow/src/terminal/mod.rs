//! Terminal operators for Flow
//!
//! Terminal operators consume the flow and produce a final result.
//! They are all async functions that suspend until the flow completes,
//! and every one of them reports a producer fault instead of a result.

use crate::flow::Flow;
use crate::FlowResult;
use coflow_core::{CoroutineScope, JobHandle};
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

/// Terminal operators for Flow
///
/// These operators consume the flow and produce a final result.
#[allow(async_fn_in_trait)]
pub trait FlowTerminal<T>: Sized
where
    T: Send + 'static,
{
    /// Return the first value and stop the upstream.
    /// Returns `Err(FlowError::EmptyStream)` if the flow completes without emitting.
    ///
    /// # Example
    /// ```ignore
    /// let first = flow.first().await?;
    /// ```
    async fn first(self) -> FlowResult<T>;

    /// Return the first value, or `None` if the flow is empty.
    async fn first_or_none(self) -> FlowResult<Option<T>>;

    /// Ensure the flow emits exactly one value and return it.
    /// Returns `Err(FlowError::EmptyStream)` if empty, `Err(FlowError::MoreThanOneElement)`
    /// as soon as a second value shows up.
    ///
    /// # Example
    /// ```ignore
    /// let single = flow.single().await?;
    /// ```
    async fn single(self) -> FlowResult<T>;

    /// Collect all values and return the last one.
    async fn last(self) -> FlowResult<T>;

    /// Collect all values and return the last one, or `None` if empty.
    ///
    /// # Example
    /// ```ignore
    /// let last = flow.last_or_none().await?;
    /// ```
    async fn last_or_none(self) -> FlowResult<Option<T>>;

    /// Collect all values into a Vec.
    ///
    /// # Example
    /// ```ignore
    /// let list = flow.to_vec().await?;
    /// ```
    async fn to_vec(self) -> FlowResult<Vec<T>>;

    /// Collect all values into a HashSet.
    async fn to_set(self) -> FlowResult<HashSet<T>>
    where
        T: Eq + Hash;

    /// Accumulate values using an initial value and an accumulator function.
    /// An empty flow yields `initial`.
    ///
    /// # Example
    /// ```ignore
    /// let sum = flow.fold(0, |acc, x| acc + x).await?;
    /// ```
    async fn fold<R, F>(self, initial: R, f: F) -> FlowResult<R>
    where
        R: Send + 'static,
        F: FnMut(R, T) -> R + Send + 'static;

    /// Accumulate values without an initial value.
    /// Returns `Err(FlowError::EmptyStream)` if the flow is empty.
    ///
    /// # Example
    /// ```ignore
    /// let sum = flow.reduce(|acc, x| acc + x).await?;
    /// ```
    async fn reduce<F>(self, f: F) -> FlowResult<T>
    where
        F: FnMut(T, T) -> T + Send + 'static;

    /// Count the number of emitted values.
    async fn count(self) -> FlowResult<usize>;

    /// Check if any value matches the predicate. Stops at the first match.
    ///
    /// # Example
    /// ```ignore
    /// let has_even = flow.any(|x| x % 2 == 0).await?;
    /// ```
    async fn any<F>(self, predicate: F) -> FlowResult<bool>
    where
        F: FnMut(&T) -> bool + Send + 'static;

    /// Check if all values match the predicate. Stops at the first mismatch.
    async fn all<F>(self, predicate: F) -> FlowResult<bool>
    where
        F: FnMut(&T) -> bool + Send + 'static;

    /// Check if no values match the predicate.
    async fn none<F>(self, predicate: F) -> FlowResult<bool>
    where
        F: FnMut(&T) -> bool + Send + 'static;

    /// Run `action` for each value, cancelling the run for the previous value
    /// when a newer one arrives (like Kotlin's collectLatest).
    ///
    /// Returns once the upstream is done and the last action has finished.
    ///
    /// # Example
    /// ```ignore
    /// flow.collect_latest(|value| async move {
    ///     tokio::time::sleep(Duration::from_millis(300)).await;
    ///     println!("Done {value}");
    /// }).await?;
    /// ```
    async fn collect_latest<F, Fut>(self, action: F) -> FlowResult
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static;

    /// Collect the flow in a new coroutine of `scope`, discarding values
    /// (like Kotlin's launchIn). Faults are logged.
    fn launch_in(self, scope: &CoroutineScope) -> JobHandle;
}

mod implementation;
