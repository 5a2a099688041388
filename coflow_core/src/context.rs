//! Execution context tracking
//!
//! Every task started through a [`Dispatcher`] runs inside an
//! [`ExecutionContext`] stored in a task-local. Flows use it to check that
//! values are emitted from the context they are collected in, and callers can
//! ask which dispatcher they are running on with [`current_context_name`].

use crate::{CoroutineError, Dispatcher, JobHandle};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Name reported for code that runs outside any dispatcher
pub const ROOT_CONTEXT_NAME: &str = "main";

/// Id reported for code that runs outside any dispatcher
pub const ROOT_CONTEXT_ID: u64 = 0;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(ROOT_CONTEXT_ID + 1);

tokio::task_local! {
    static CURRENT_CONTEXT: ExecutionContext;
}

/// A dispatcher together with a unique scope id
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    id: u64,
    dispatcher: Dispatcher,
}

impl ExecutionContext {
    /// Fresh context on `dispatcher`, distinct from every other context
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            dispatcher,
        }
    }

    /// The context of the running task, if it was started by a dispatcher
    pub fn current() -> Option<Self> {
        CURRENT_CONTEXT.try_with(Clone::clone).ok()
    }

    pub fn current_id() -> u64 {
        CURRENT_CONTEXT
            .try_with(|context| context.id)
            .unwrap_or(ROOT_CONTEXT_ID)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn name(&self) -> &str {
        self.dispatcher.name()
    }

    /// Poll `fut` with this context installed
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_CONTEXT.scope(self, fut).await
    }

    /// Spawn `fut` on this context's dispatcher with the context installed
    pub fn spawn<F>(self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let dispatcher = self.dispatcher.clone();
        dispatcher.spawn(CURRENT_CONTEXT.scope(self, fut));
    }
}

/// Name of the dispatcher the caller is running on
pub fn current_context_name() -> String {
    CURRENT_CONTEXT
        .try_with(|context| context.name().to_string())
        .unwrap_or_else(|_| ROOT_CONTEXT_NAME.to_string())
}

/// Launch `fut` as a job that inherits the caller's execution context
pub fn launch<F>(fut: F) -> JobHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let job = JobHandle::new();
    let body = job.clone().run(fut);
    let task = async move {
        body.await;
    };

    match ExecutionContext::current() {
        Some(context) => context.spawn(task),
        None => {
            tokio::spawn(task);
        }
    }

    job
}

/// Run `fut` on `dispatcher` in a fresh context and wait for its output
/// (like Kotlin's withContext)
pub async fn with_context<F, T>(dispatcher: Dispatcher, fut: F) -> Result<T, CoroutineError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    ExecutionContext::new(dispatcher).spawn(async move {
        let _ = tx.send(fut.await);
    });
    rx.await.map_err(|_| CoroutineError::Abandoned)
}
