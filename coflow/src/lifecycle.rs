//! Lifecycle operators for Flow
//!
//! These operators allow you to hook into flow lifecycle events
//! like start, completion, and errors.
//!
//! `catch` and the retry family only look at faults raised upstream of
//! them. A fault returned by the downstream collector, and any
//! cancellation, always passes through untouched.

use crate::flow::Flow;
use crate::{FlowCollector, FlowError, FlowResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle operators for Flow
pub trait FlowLifecycle<T>: Sized
where
    T: Send + 'static,
{
    /// Execute an action when flow collection starts, before any values are emitted.
    /// The action can emit values.
    ///
    /// # Example
    /// ```ignore
    /// flow.on_start(|collector| async move {
    ///     collector.emit(Loading).await
    /// })
    /// ```
    fn on_start<F, Fut>(self, action: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static;

    /// Execute an action once the flow terminates, whatever the reason.
    /// The action receives `None` on completion, or `Some(error)` for a fault
    /// or cancellation. The flow's own outcome is preserved.
    ///
    /// After a fault the action's collector refuses values with that fault.
    /// If the collection is torn down by cancellation (an enclosing
    /// `flow_on`, `zip`, `with_timeout`, or a dropped collector future) the
    /// action runs with `Some(FlowError::Cancelled)` as part of that teardown.
    ///
    /// # Example
    /// ```ignore
    /// flow.on_completion(|collector, cause| async move {
    ///     if cause.is_none() {
    ///         collector.emit(Done).await?;
    ///     }
    ///     Ok(())
    /// })
    /// ```
    fn on_completion<F, Fut>(self, action: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>, Option<FlowError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static;

    /// Execute an action if the flow completes without emitting any values.
    /// The action can emit default values.
    fn on_empty<F, Fut>(self, action: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static;

    /// Handle a fault raised upstream. The handler may emit fallback values,
    /// then either complete the flow (`Ok`) or fail it with another error.
    ///
    /// # Example
    /// ```ignore
    /// flow.catch(|collector, error| async move {
    ///     tracing::warn!(%error, "falling back");
    ///     collector.emit(-1).await
    /// })
    /// ```
    fn catch<F, Fut>(self, handler: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>, FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static;

    /// Re-collect the upstream after a fault, up to `retries` times.
    ///
    /// Values emitted before a fault have already been delivered and will be
    /// emitted again by the next attempt.
    ///
    /// # Example
    /// ```ignore
    /// flow.retry(3) // up to 4 runs of the upstream in total
    /// ```
    fn retry(self, retries: u64) -> Flow<T>;

    /// Like [`retry`](FlowLifecycle::retry), but only for faults accepted by
    /// `predicate`.
    fn retry_if<F, Fut>(self, retries: u64, predicate: F) -> Flow<T>
    where
        F: Fn(FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static;

    /// Re-collect the upstream while `predicate(cause, attempt)` says so.
    /// `attempt` starts at zero. The predicate may suspend, e.g. for backoff.
    ///
    /// # Example
    /// ```ignore
    /// flow.retry_when(|cause, attempt| async move {
    ///     if cause.downcast_ref::<std::io::Error>().is_some() && attempt < 3 {
    ///         tokio::time::sleep(Duration::from_millis(100)).await;
    ///         true
    ///     } else {
    ///         false
    ///     }
    /// })
    /// ```
    fn retry_when<F, Fut>(self, predicate: F) -> Flow<T>
    where
        F: Fn(FlowError, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static;

    /// Stop collecting once `duration` has elapsed, completing normally with
    /// whatever was emitted so far.
    ///
    /// # Example
    /// ```ignore
    /// flow.with_timeout(Duration::from_secs(5))
    /// ```
    fn with_timeout(self, duration: Duration) -> Flow<T>;
}

/// Where a fault seen by an upstream-only handler came from
enum Outcome {
    Completed,
    /// Raised upstream; eligible for catch and retry
    Upstream(FlowError),
    /// Raised downstream, or a cancellation; must be passed on
    Passthrough(FlowError),
}

async fn collect_upstream<T>(upstream: &Flow<T>, downstream: &FlowCollector<T>) -> Outcome
where
    T: Send + 'static,
{
    let downstream_failed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&downstream_failed);
    let target = downstream.clone();

    let result = upstream
        .collect_with(FlowCollector::new(move |value| {
            let target = target.clone();
            let flag = Arc::clone(&flag);
            async move {
                let result = target.emit(value).await;
                if result.is_err() {
                    flag.store(true, Ordering::SeqCst);
                }
                result
            }
        }))
        .await;

    match result {
        Ok(()) => Outcome::Completed,
        Err(error) if error.is_cancellation() || downstream_failed.load(Ordering::SeqCst) => {
            Outcome::Passthrough(error)
        }
        Err(error) => Outcome::Upstream(error),
    }
}

/// Collector for a completion action that runs after a fault: any emission
/// fails with the original cause.
fn refusing<T>(cause: FlowError) -> FlowCollector<T>
where
    T: Send + 'static,
{
    FlowCollector::new(move |_value: T| {
        let cause = cause.clone();
        async move { Err(cause) }
    })
}

/// Runs `on_drop` unless disarmed first
struct OnTeardown(Option<Box<dyn FnOnce() + Send>>);

impl OnTeardown {
    fn new(on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(on_drop)))
    }

    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for OnTeardown {
    fn drop(&mut self) {
        if let Some(on_drop) = self.0.take() {
            on_drop();
        }
    }
}

impl<T> FlowLifecycle<T> for Flow<T>
where
    T: Send + 'static,
{
    fn on_start<F, Fut>(self, action: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        let action = Arc::new(action);
        Flow::new(move |collector: FlowCollector<T>| {
            let upstream = self.clone();
            let action = Arc::clone(&action);
            async move {
                action(collector.clone()).await?;
                upstream.collect_with(collector).await
            }
        })
    }

    fn on_completion<F, Fut>(self, action: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>, Option<FlowError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        let action = Arc::new(action);
        Flow::new(move |collector: FlowCollector<T>| {
            let upstream = self.clone();
            let action = Arc::clone(&action);
            async move {
                let torn_down = {
                    let action = Arc::clone(&action);
                    OnTeardown::new(move || {
                        coflow_core::defer_cleanup(async move {
                            tracing::trace!("flow torn down before completing");
                            let cause = Some(FlowError::Cancelled);
                            // nobody is left to observe the outcome
                            let _ = action(refusing(FlowError::Cancelled), cause).await;
                        })
                    })
                };
                let result = upstream.collect_with(collector.clone()).await;
                torn_down.disarm();

                let error = match result {
                    Ok(()) => return action(collector, None).await,
                    Err(error) => error,
                };
                action(refusing(error.clone()), Some(error.clone())).await?;
                Err(error)
            }
        })
    }

    fn on_empty<F, Fut>(self, action: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        let action = Arc::new(action);
        Flow::new(move |collector: FlowCollector<T>| {
            let upstream = self.clone();
            let action = Arc::clone(&action);
            async move {
                let emitted = Arc::new(AtomicBool::new(false));
                let seen = Arc::clone(&emitted);
                let target = collector.clone();

                upstream
                    .collect_with(FlowCollector::new(move |value| {
                        seen.store(true, Ordering::SeqCst);
                        let target = target.clone();
                        async move { target.emit(value).await }
                    }))
                    .await?;

                if emitted.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    action(collector).await
                }
            }
        })
    }

    fn catch<F, Fut>(self, handler: F) -> Flow<T>
    where
        F: Fn(FlowCollector<T>, FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Flow::new(move |collector: FlowCollector<T>| {
            let upstream = self.clone();
            let handler = Arc::clone(&handler);
            async move {
                match collect_upstream(&upstream, &collector).await {
                    Outcome::Completed => Ok(()),
                    Outcome::Passthrough(error) => Err(error),
                    Outcome::Upstream(error) => {
                        tracing::debug!(%error, "upstream fault handled by catch");
                        handler(collector, error).await
                    }
                }
            }
        })
    }

    fn retry(self, retries: u64) -> Flow<T> {
        self.retry_if(retries, |_| async { true })
    }

    fn retry_if<F, Fut>(self, retries: u64, predicate: F) -> Flow<T>
    where
        F: Fn(FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let predicate = Arc::new(predicate);
        self.retry_when(move |cause, attempt| {
            let predicate = Arc::clone(&predicate);
            async move { attempt < retries && predicate(cause).await }
        })
    }

    fn retry_when<F, Fut>(self, predicate: F) -> Flow<T>
    where
        F: Fn(FlowError, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let predicate = Arc::new(predicate);
        Flow::new(move |collector: FlowCollector<T>| {
            let upstream = self.clone();
            let predicate = Arc::clone(&predicate);
            async move {
                let mut attempt = 0u64;
                loop {
                    match collect_upstream(&upstream, &collector).await {
                        Outcome::Completed => return Ok(()),
                        Outcome::Passthrough(error) => return Err(error),
                        Outcome::Upstream(error) => {
                            if !predicate(error.clone(), attempt).await {
                                return Err(error);
                            }
                            tracing::warn!(attempt, %error, "retrying flow after upstream fault");
                            attempt += 1;
                        }
                    }
                }
            }
        })
    }

    fn with_timeout(self, duration: Duration) -> Flow<T> {
        Flow::new(move |collector: FlowCollector<T>| {
            let upstream = self.clone();
            async move {
                let mut collecting = Box::pin(upstream.collect_with(collector));
                tokio::select! {
                    result = &mut collecting => return result,
                    _ = tokio::time::sleep(duration) => {}
                }

                tracing::debug!(?duration, "flow collection timed out");
                coflow_core::discard(collecting).await;
                Ok(())
            }
        })
    }
}
