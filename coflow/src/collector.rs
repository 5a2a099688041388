use crate::{FlowError, FlowResult};
use coflow_core::{current_context_name, ExecutionContext};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// FlowCollector receives emitted values from a Flow
///
/// A collector remembers the execution context it was created in and refuses
/// emissions made from any other context.
pub struct FlowCollector<T> {
    emit_fn: Arc<dyn Fn(T) -> BoxFuture<'static, FlowResult> + Send + Sync>,
    context_id: u64,
    context_name: Arc<str>,
}

impl<T> FlowCollector<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        Self {
            emit_fn: Arc::new(move |value| Box::pin(f(value))),
            context_id: ExecutionContext::current_id(),
            context_name: current_context_name().into(),
        }
    }

    /// Hand `value` downstream, suspending until it has been processed.
    ///
    /// An `Err` means the downstream will not accept more values; producers
    /// should stop and return it (`collector.emit(v).await?`).
    pub async fn emit(&self, value: T) -> FlowResult {
        if ExecutionContext::current_id() != self.context_id {
            let actual = current_context_name();
            tracing::debug!(
                expected = %self.context_name,
                actual = %actual,
                "emission from foreign execution context rejected"
            );
            return Err(FlowError::ContextViolation {
                expected: self.context_name.to_string(),
                actual,
            });
        }
        (self.emit_fn)(value).await
    }

    /// Emit every item of `values` in order
    pub async fn emit_all<I>(&self, values: I) -> FlowResult
    where
        I: IntoIterator<Item = T>,
    {
        for value in values {
            self.emit(value).await?;
        }
        Ok(())
    }
}

impl<T> Clone for FlowCollector<T> {
    fn clone(&self) -> Self {
        Self {
            emit_fn: Arc::clone(&self.emit_fn),
            context_id: self.context_id,
            context_name: Arc::clone(&self.context_name),
        }
    }
}
