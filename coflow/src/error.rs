//! Error type shared by every flow operation

use coflow_core::CoroutineError;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of driving a flow (or of one emission)
pub type FlowResult<T = ()> = Result<T, FlowError>;

/// Terminal failure of a flow collection
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    /// The producer body (or an operator callback) failed
    #[error("producer fault: {0}")]
    Producer(Arc<dyn Error + Send + Sync>),

    /// Flow completed without emitting any values
    #[error("flow completed without emitting any values")]
    EmptyStream,

    /// Flow emitted more than one value when exactly one was expected
    #[error("flow emitted more than one value when exactly one was expected")]
    MoreThanOneElement,

    /// A value was emitted from a different execution context than the one
    /// the flow is collected in. Use `flow_on` to move upstream work instead.
    #[error("flow invariant violated: emitted from context `{actual}` but collected in `{expected}`; use flow_on to change the upstream context")]
    ContextViolation { expected: String, actual: String },

    /// Collection was cancelled
    #[error("flow collection was cancelled")]
    Cancelled,

    /// Collection was stopped early by a downstream operator such as `take`
    #[doc(hidden)]
    #[error("flow collection was aborted by a downstream operator")]
    Aborted(AbortOwner),
}

impl FlowError {
    /// Wrap an arbitrary error as a producer fault
    pub fn producer(error: impl Error + Send + Sync + 'static) -> Self {
        Self::Producer(Arc::new(error))
    }

    /// Producer fault carrying only a message
    pub fn fault(message: impl Into<String>) -> Self {
        Self::producer(FaultMessage(message.into()))
    }

    /// Cancellation signals stop a flow but are not failures; `catch` and
    /// the retry operators let them through untouched.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Aborted(_))
    }

    /// Inspect the concrete error behind a producer fault
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Error + 'static,
    {
        match self {
            Self::Producer(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<CoroutineError> for FlowError {
    fn from(_: CoroutineError) -> Self {
        Self::Cancelled
    }
}

#[derive(Debug)]
struct FaultMessage(String);

impl fmt::Display for FaultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for FaultMessage {}

/// Identifies which operator issued an [`FlowError::Aborted`] so nested
/// operators only swallow their own signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortOwner(u64);

impl AbortOwner {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Turn this owner's abort back into a normal completion
    pub(crate) fn absorb(self, result: FlowResult) -> FlowResult {
        match result {
            Err(FlowError::Aborted(owner)) if owner == self => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn fault_message_is_displayed() {
        let error = FlowError::fault("Network error");
        assert_eq!(error.to_string(), "producer fault: Network error");
        assert!(!error.is_cancellation());
    }

    #[test]
    fn downcast_exposes_source() {
        let error = FlowError::producer(io::Error::other("Network error"));

        let source = error.downcast_ref::<io::Error>().expect("io error");
        assert_eq!(source.to_string(), "Network error");
        assert!(FlowError::EmptyStream.downcast_ref::<io::Error>().is_none());
    }

    #[test]
    fn abort_owner_only_absorbs_its_own_signal() {
        let mine = AbortOwner::next();
        let other = AbortOwner::next();

        assert!(mine.absorb(Err(FlowError::Aborted(mine))).is_ok());
        assert!(matches!(
            mine.absorb(Err(FlowError::Aborted(other))),
            Err(FlowError::Aborted(owner)) if owner == other
        ));
        assert!(FlowError::Aborted(other).is_cancellation());
    }
}
