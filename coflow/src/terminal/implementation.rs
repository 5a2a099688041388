use super::*;
use crate::error::AbortOwner;
use crate::{FlowCollector, FlowError};
use parking_lot::Mutex;
use std::sync::Arc;

enum Step {
    Continue,
    Stop,
}

/// Feed every value to `on_value` until it asks to stop. Stopping aborts the
/// upstream and counts as normal completion.
async fn drive<T, F>(flow: &Flow<T>, on_value: F) -> FlowResult
where
    T: Send + 'static,
    F: FnMut(T) -> FlowResult<Step> + Send + 'static,
{
    let owner = AbortOwner::next();
    let on_value = Mutex::new(on_value);
    let result = flow
        .collect_with(FlowCollector::new(move |value| {
            let step = {
                let mut on_value = on_value.lock();
                (&mut *on_value)(value)
            };
            async move {
                match step? {
                    Step::Continue => Ok(()),
                    Step::Stop => Err(FlowError::Aborted(owner)),
                }
            }
        }))
        .await;
    owner.absorb(result)
}

/// Cancels the in-flight `collect_latest` action if the terminal is dropped
struct CancelPending(Arc<Mutex<Option<JobHandle>>>);

impl Drop for CancelPending {
    fn drop(&mut self) {
        if let Some(job) = self.0.lock().take() {
            job.cancel();
        }
    }
}

impl<T> FlowTerminal<T> for Flow<T>
where
    T: Send + 'static,
{
    async fn first(self) -> FlowResult<T> {
        self.first_or_none().await?.ok_or(FlowError::EmptyStream)
    }

    async fn first_or_none(self) -> FlowResult<Option<T>> {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);

        drive(&self, move |value| {
            *sink.lock() = Some(value);
            Ok(Step::Stop)
        })
        .await?;

        let value = slot.lock().take();
        Ok(value)
    }

    async fn single(self) -> FlowResult<T> {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);

        drive(&self, move |value| {
            let mut slot = sink.lock();
            if slot.is_some() {
                return Err(FlowError::MoreThanOneElement);
            }
            *slot = Some(value);
            Ok(Step::Continue)
        })
        .await?;

        let value = slot.lock().take();
        value.ok_or(FlowError::EmptyStream)
    }

    async fn last(self) -> FlowResult<T> {
        self.last_or_none().await?.ok_or(FlowError::EmptyStream)
    }

    async fn last_or_none(self) -> FlowResult<Option<T>> {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);

        drive(&self, move |value| {
            *sink.lock() = Some(value);
            Ok(Step::Continue)
        })
        .await?;

        let value = slot.lock().take();
        Ok(value)
    }

    async fn to_vec(self) -> FlowResult<Vec<T>> {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);

        drive(&self, move |value| {
            sink.lock().push(value);
            Ok(Step::Continue)
        })
        .await?;

        let collected = std::mem::take(&mut *values.lock());
        Ok(collected)
    }

    async fn to_set(self) -> FlowResult<HashSet<T>>
    where
        T: Eq + Hash,
    {
        Ok(self.to_vec().await?.into_iter().collect())
    }

    async fn fold<R, F>(self, initial: R, mut f: F) -> FlowResult<R>
    where
        R: Send + 'static,
        F: FnMut(R, T) -> R + Send + 'static,
    {
        let accumulator = Arc::new(Mutex::new(Some(initial)));
        let sink = Arc::clone(&accumulator);

        drive(&self, move |value| {
            let mut accumulator = sink.lock();
            if let Some(current) = accumulator.take() {
                *accumulator = Some(f(current, value));
            }
            Ok(Step::Continue)
        })
        .await?;

        // only empty if `f` panicked part-way through an update
        let result = accumulator.lock().take();
        result.ok_or(FlowError::EmptyStream)
    }

    async fn reduce<F>(self, mut f: F) -> FlowResult<T>
    where
        F: FnMut(T, T) -> T + Send + 'static,
    {
        let accumulator = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&accumulator);

        drive(&self, move |value| {
            let mut accumulator = sink.lock();
            let next = match accumulator.take() {
                Some(current) => f(current, value),
                None => value,
            };
            *accumulator = Some(next);
            Ok(Step::Continue)
        })
        .await?;

        let result = accumulator.lock().take();
        result.ok_or(FlowError::EmptyStream)
    }

    async fn count(self) -> FlowResult<usize> {
        let total = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&total);

        drive(&self, move |_| {
            *sink.lock() += 1;
            Ok(Step::Continue)
        })
        .await?;

        let count = *total.lock();
        Ok(count)
    }

    async fn any<F>(self, mut predicate: F) -> FlowResult<bool>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        let found = Arc::new(Mutex::new(false));
        let sink = Arc::clone(&found);

        drive(&self, move |value| {
            if predicate(&value) {
                *sink.lock() = true;
                Ok(Step::Stop)
            } else {
                Ok(Step::Continue)
            }
        })
        .await?;

        let found = *found.lock();
        Ok(found)
    }

    async fn all<F>(self, mut predicate: F) -> FlowResult<bool>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        Ok(!self.any(move |value| !predicate(value)).await?)
    }

    async fn none<F>(self, predicate: F) -> FlowResult<bool>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        Ok(!self.any(predicate).await?)
    }

    async fn collect_latest<F, Fut>(self, action: F) -> FlowResult
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let current: Arc<Mutex<Option<JobHandle>>> = Arc::new(Mutex::new(None));
        let _cancel_pending = CancelPending(Arc::clone(&current));
        let tracker = Arc::clone(&current);

        let result = self
            .try_collect(move |value| {
                let previous = tracker.lock().take();
                let run = action(value);
                let tracker = Arc::clone(&tracker);
                async move {
                    if let Some(previous) = previous {
                        if !previous.is_finished() {
                            tracing::trace!("cancelling collect_latest action for a newer value");
                        }
                        previous.cancel_and_join().await;
                    }
                    *tracker.lock() = Some(coflow_core::launch(run));
                    Ok(())
                }
            })
            .await;

        let last = current.lock().take();
        if let Some(job) = last {
            match &result {
                Ok(()) => job.join().await,
                Err(_) => job.cancel_and_join().await,
            }
        }
        result
    }

    fn launch_in(self, scope: &CoroutineScope) -> JobHandle {
        scope.launch(async move {
            if let Err(error) = self.collect(|_| async {}).await {
                if !error.is_cancellation() {
                    tracing::warn!(%error, "flow launched in scope failed");
                }
            }
        })
    }
}
