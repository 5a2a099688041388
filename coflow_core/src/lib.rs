pub mod cleanup;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod job;
pub mod scope;

pub use cleanup::{defer_cleanup, discard};
pub use context::{
    current_context_name, launch, with_context, ExecutionContext, ROOT_CONTEXT_ID,
    ROOT_CONTEXT_NAME,
};
pub use dispatcher::{Dispatcher, Dispatchers};
pub use error::CoroutineError;
pub use executor::{Executor, TokioExecutor};
pub use job::{JobGuard, JobHandle};
pub use scope::CoroutineScope;
