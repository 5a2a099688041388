use std::future::Future;
use std::pin::Pin;
use tokio::runtime::Handle;

/// Minimal executor trait that can spawn futures
pub trait Executor: Send + Sync + 'static {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

/// Tokio executor implementation
///
/// Without a handle, futures are spawned on the runtime the caller is running in.
#[derive(Clone, Debug, Default)]
pub struct TokioExecutor {
    handle: Option<Handle>,
}

impl TokioExecutor {
    /// Spawn on whichever runtime is current at spawn time
    pub fn current() -> Self {
        Self { handle: None }
    }

    /// Spawn on a specific runtime, e.g. a dedicated blocking-friendly pool
    pub fn on(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl Executor for TokioExecutor {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        match &self.handle {
            Some(handle) => {
                handle.spawn(fut);
            }
            None => {
                tokio::spawn(fut);
            }
        }
    }
}
