use crate::{CoroutineError, Dispatcher, ExecutionContext, JobHandle};
use std::future::Future;
use tokio::sync::oneshot;

/// CoroutineScope manages the lifecycle and context of coroutines
#[derive(Clone, Debug)]
pub struct CoroutineScope {
    pub dispatcher: Dispatcher,
    pub job: JobHandle,
}

impl CoroutineScope {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            job: JobHandle::new(),
        }
    }

    /// Launch a new coroutine on the scope's dispatcher
    pub fn launch<F>(&self, fut: F) -> JobHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = self.job.new_child();
        let body = job.clone().run(fut);

        ExecutionContext::new(self.dispatcher.clone()).spawn(async move {
            body.await;
        });

        job
    }

    /// Switch to a different dispatcher (like Kotlin's withContext)
    pub async fn with_context<F, T>(&self, dispatcher: Dispatcher, fut: F) -> Result<T, CoroutineError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = self.job.new_child();
        let body = job.clone().run(fut);

        ExecutionContext::new(dispatcher).spawn(async move {
            if let Some(output) = body.await {
                let _ = tx.send(output);
            }
        });

        rx.await.map_err(|_| {
            if job.is_cancelled() {
                CoroutineError::Cancelled
            } else {
                CoroutineError::Abandoned
            }
        })
    }

    /// Cancel every coroutine launched from this scope
    pub fn cancel(&self) {
        self.job.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.job.is_cancelled()
    }
}
