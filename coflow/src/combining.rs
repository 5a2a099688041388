//! Combining operators for Flow
//!
//! These operators allow you to combine multiple flows into one. The
//! concurrent ones (`zip`, `combine`, `sample`, `merge`) collect each source
//! in its own job, and cancel and wait for all of them once the combined
//! flow ends.

use crate::buffer::{self, BufferOverflow, BufferReceiver};
use crate::flow::Flow;
use crate::{Emission, FlowCollector, FlowError, FlowResult};
use coflow_core::JobGuard;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Channel capacity shared by all sources of a [`merge`]
const MERGE_CHANNEL_CAPACITY: usize = 16;

/// Combining operators for Flow
pub trait FlowCombining<T>: Sized
where
    T: Send + 'static,
{
    /// Combine this flow with another, emitting a new value whenever either flow emits.
    /// The transform function receives the latest values from both flows;
    /// nothing is emitted until both have produced a value.
    ///
    /// # Example
    /// ```ignore
    /// let combined = flow1.combine(flow2, |a, b| a + b);
    /// ```
    fn combine<U, R, F>(self, other: Flow<U>, transform: F) -> Flow<R>
    where
        U: Send + Clone + 'static,
        R: Send + 'static,
        T: Clone,
        F: Fn(T, U) -> R + Send + Sync + 'static;

    /// Zip this flow with another, pairing values one-to-one.
    /// Completes when either flow completes.
    ///
    /// # Example
    /// ```ignore
    /// let zipped = flow1.zip(flow2, |a, b| (a, b));
    /// ```
    fn zip<U, R, F>(self, other: Flow<U>, transform: F) -> Flow<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: Fn(T, U) -> R + Send + Sync + 'static;

    /// Emit the latest value from this flow each time `sampler` emits.
    /// Values are emitted at most once; completes with this flow.
    ///
    /// # Example
    /// ```ignore
    /// let sampled = data_flow.sample(tick_flow);
    /// ```
    fn sample<U>(self, sampler: Flow<U>) -> Flow<T>
    where
        U: Send + 'static;

    /// Concatenate this flow with another, emitting all values from this flow
    /// first, then all values from the other flow.
    fn concat(self, other: Flow<T>) -> Flow<T>;

    /// Start with the given values, then emit values from this flow.
    ///
    /// # Example
    /// ```ignore
    /// let flow = numbers.start_with(vec![0]);
    /// ```
    fn start_with<I>(self, values: I) -> Flow<T>
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send;
}

/// A flow collected in its own job, handing values over through a
/// single-slot queue
struct Source<T> {
    receiver: BufferReceiver<T>,
    job: JobGuard,
}

impl<T> Source<T>
where
    T: Send + 'static,
{
    fn spawn(flow: Flow<T>, overflow: BufferOverflow) -> Self {
        let (sender, receiver) = buffer::channel(Some(1), overflow);
        let job = buffer::produce(flow, sender, None).guard();
        Self { receiver, job }
    }

    /// Stop the producer and wait until its teardown has finished
    async fn stop(self) {
        drop(self.receiver);
        self.job.cancel_and_join().await;
    }
}

impl<T> FlowCombining<T> for Flow<T>
where
    T: Send + 'static,
{
    fn combine<U, R, F>(self, other: Flow<U>, transform: F) -> Flow<R>
    where
        U: Send + Clone + 'static,
        R: Send + 'static,
        T: Clone,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);

        Flow::new(move |collector: FlowCollector<R>| {
            let left = self.clone();
            let right = other.clone();
            let transform = Arc::clone(&transform);

            async move {
                let left = Source::spawn(left, BufferOverflow::Suspend);
                let right = Source::spawn(right, BufferOverflow::Suspend);
                let result = combine_latest(&left, &right, &collector, &*transform).await;
                tokio::join!(left.stop(), right.stop());
                result
            }
        })
    }

    fn zip<U, R, F>(self, other: Flow<U>, transform: F) -> Flow<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);

        Flow::new(move |collector: FlowCollector<R>| {
            let left = self.clone();
            let right = other.clone();
            let transform = Arc::clone(&transform);

            async move {
                let left = Source::spawn(left, BufferOverflow::Suspend);
                let right = Source::spawn(right, BufferOverflow::Suspend);
                let result = zip_pairs(&left, &right, &collector, &*transform).await;
                tokio::join!(left.stop(), right.stop());
                result
            }
        })
    }

    fn sample<U>(self, sampler: Flow<U>) -> Flow<T>
    where
        U: Send + 'static,
    {
        Flow::new(move |collector: FlowCollector<T>| {
            let source = self.clone();
            let sampler = sampler.clone();

            async move {
                let values = Source::spawn(source, BufferOverflow::DropOldest);
                let ticks = Source::spawn(sampler, BufferOverflow::DropOldest);
                let result = sample_on_ticks(&values, &ticks, &collector).await;
                tokio::join!(values.stop(), ticks.stop());
                result
            }
        })
    }

    fn concat(self, other: Flow<T>) -> Flow<T> {
        Flow::new(move |collector: FlowCollector<T>| {
            let first = self.clone();
            let second = other.clone();

            async move {
                first.collect_with(collector.clone()).await?;
                second.collect_with(collector).await
            }
        })
    }

    fn start_with<I>(self, values: I) -> Flow<T>
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send,
    {
        Flow::new(move |collector: FlowCollector<T>| {
            let upstream = self.clone();
            let values = values.clone();

            async move {
                collector.emit_all(values).await?;
                upstream.collect_with(collector).await
            }
        })
    }
}

async fn combine_latest<T, U, R, F>(
    left: &Source<T>,
    right: &Source<U>,
    collector: &FlowCollector<R>,
    transform: &F,
) -> FlowResult
where
    T: Clone,
    U: Clone,
    F: Fn(T, U) -> R,
{
    let mut latest1: Option<T> = None;
    let mut latest2: Option<U> = None;
    let mut done1 = false;
    let mut done2 = false;

    while !(done1 && done2) {
        let updated = tokio::select! {
            emission = left.receiver.recv(), if !done1 => match emission {
                Emission::Value(value) => {
                    latest1 = Some(value);
                    true
                }
                Emission::Complete => {
                    done1 = true;
                    false
                }
                Emission::Fault(error) => return Err(error),
            },
            emission = right.receiver.recv(), if !done2 => match emission {
                Emission::Value(value) => {
                    latest2 = Some(value);
                    true
                }
                Emission::Complete => {
                    done2 = true;
                    false
                }
                Emission::Fault(error) => return Err(error),
            },
        };

        let combined = match (&latest1, &latest2) {
            (Some(a), Some(b)) if updated => Some(transform(a.clone(), b.clone())),
            _ => None,
        };
        if let Some(value) = combined {
            collector.emit(value).await?;
        }
    }
    Ok(())
}

/// Pair values one-to-one. A side holding an unpaired value is still
/// watched for faults.
async fn zip_pairs<T, U, R, F>(
    left: &Source<T>,
    right: &Source<U>,
    collector: &FlowCollector<R>,
    transform: &F,
) -> FlowResult
where
    F: Fn(T, U) -> R,
{
    let mut pending1: Option<T> = None;
    let mut pending2: Option<U> = None;

    loop {
        tokio::select! {
            emission = left.receiver.recv(), if pending1.is_none() => match emission {
                Emission::Value(value) => pending1 = Some(value),
                Emission::Complete => return Ok(()),
                Emission::Fault(error) => return Err(error),
            },
            error = left.receiver.fault(), if pending1.is_some() => return Err(error),
            emission = right.receiver.recv(), if pending2.is_none() => match emission {
                Emission::Value(value) => pending2 = Some(value),
                Emission::Complete => return Ok(()),
                Emission::Fault(error) => return Err(error),
            },
            error = right.receiver.fault(), if pending2.is_some() => return Err(error),
        }

        if let (Some(_), Some(_)) = (&pending1, &pending2) {
            if let (Some(a), Some(b)) = (pending1.take(), pending2.take()) {
                collector.emit(transform(a, b)).await?;
            }
        }
    }
}

async fn sample_on_ticks<T, U>(
    values: &Source<T>,
    ticks: &Source<U>,
    collector: &FlowCollector<T>,
) -> FlowResult {
    let mut latest: Option<T> = None;
    let mut ticking = true;

    loop {
        tokio::select! {
            emission = values.receiver.recv() => match emission {
                Emission::Value(value) => latest = Some(value),
                Emission::Complete => return Ok(()),
                Emission::Fault(error) => return Err(error),
            },
            emission = ticks.receiver.recv(), if ticking => match emission {
                Emission::Value(_) => {
                    if let Some(value) = latest.take() {
                        collector.emit(value).await?;
                    }
                }
                Emission::Complete => ticking = false,
                Emission::Fault(error) => return Err(error),
            },
        }
    }
}

/// Merge multiple flows into one, emitting values as soon as any source
/// produces them. Completes when every source has completed; the first
/// fault from any source ends the merged flow and cancels the others.
///
/// # Example
/// ```ignore
/// let merged = merge(vec![flow1, flow2, flow3]);
/// ```
pub fn merge<T>(flows: Vec<Flow<T>>) -> Flow<T>
where
    T: Send + 'static,
{
    Flow::new(move |collector: FlowCollector<T>| {
        let sources = flows.clone();

        async move {
            let (tx, mut rx) = mpsc::channel::<Emission<T>>(MERGE_CHANNEL_CAPACITY);
            let remaining = sources.len();

            let jobs: Vec<JobGuard> = sources
                .into_iter()
                .map(|source| {
                    let tx = tx.clone();
                    coflow_core::launch(async move {
                        let sink = tx.clone();
                        let result = source
                            .collect_with(FlowCollector::new(move |value| {
                                let sink = sink.clone();
                                async move {
                                    sink.send(Emission::Value(value))
                                        .await
                                        .map_err(|_| FlowError::Cancelled)
                                }
                            }))
                            .await;
                        // the merged flow may already be done and gone
                        let _ = tx.send(Emission::terminal(result)).await;
                    })
                    .guard()
                })
                .collect();
            drop(tx);

            let result = drain_merged(&mut rx, remaining, &collector).await;
            drop(rx);
            join_all(jobs.into_iter().map(JobGuard::cancel_and_join)).await;
            result
        }
    })
}

async fn drain_merged<T>(
    rx: &mut mpsc::Receiver<Emission<T>>,
    mut remaining: usize,
    collector: &FlowCollector<T>,
) -> FlowResult {
    while remaining > 0 {
        match rx.recv().await {
            Some(Emission::Value(value)) => collector.emit(value).await?,
            Some(Emission::Complete) => remaining -= 1,
            Some(Emission::Fault(error)) => return Err(error),
            None => {
                return Err(FlowError::fault(
                    "merged producer terminated without completing",
                ))
            }
        }
    }
    Ok(())
}

/// Macro for merging multiple flows
///
/// # Example
/// ```ignore
/// let merged = merge!(flow1, flow2, flow3);
/// ```
#[macro_export]
macro_rules! merge {
    ($($flow:expr),+ $(,)?) => {
        $crate::combining::merge(vec![$($flow),+])
    };
}
