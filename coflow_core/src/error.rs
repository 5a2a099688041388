/// Failures reported by scope-level operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoroutineError {
    /// The job (or one of its parents) was cancelled before the work finished
    #[error("coroutine was cancelled")]
    Cancelled,
    /// The spawned task went away without handing back a result
    #[error("dispatched coroutine ended without producing a result")]
    Abandoned,
}
