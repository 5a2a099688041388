use crate::executor::{Executor, TokioExecutor};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Dispatcher encapsulates an executor under a human-readable name.
///
/// The name is what [`current_context_name`](crate::current_context_name)
/// reports while code runs on this dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    name: Arc<str>,
    inner: Arc<dyn Executor>,
}

impl Dispatcher {
    pub fn new(name: impl Into<Arc<str>>, inner: Arc<dyn Executor>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        tracing::trace!(dispatcher = %self.name, "spawning task");
        self.inner.spawn(Box::pin(fut));
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("name", &self.name).finish()
    }
}

/// Registry of common dispatchers
pub struct Dispatchers;

impl Dispatchers {
    /// Main dispatcher (uses the current Tokio runtime)
    pub fn main() -> Dispatcher {
        Self::tokio("main")
    }

    /// IO dispatcher (uses the current Tokio runtime)
    pub fn io() -> Dispatcher {
        Self::tokio("io")
    }

    /// Default dispatcher for CPU-bound work
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Dispatcher {
        Self::tokio("default")
    }

    fn tokio(name: &str) -> Dispatcher {
        Dispatcher::new(name, Arc::new(TokioExecutor::current()))
    }
}
