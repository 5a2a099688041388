//! Cold asynchronous flows with Kotlin-like operators, plus hot
//! [`StateFlow`] and [`SharedFlow`] sources, on top of `coflow_core`.
//!
//! ```ignore
//! use coflow::{flow_of, FlowExt, FlowTerminal};
//!
//! let doubled = flow_of!(1, 2, 3).map_sync(|x| x * 2).to_vec().await?;
//! ```

pub mod buffer;
pub mod builders;
pub mod collector;
pub mod combining;
pub mod emission;
pub mod error;
pub mod flow;
pub mod hot_flow;
pub mod lifecycle;
pub mod macros;
pub mod operators;
pub mod terminal;

pub use collector::FlowCollector;
pub use emission::Emission;
pub use error::{FlowError, FlowResult};
pub use flow::{flow, Flow};
pub use hot_flow::{SharedFlow, SharedFlowConfig, StateFlow};
pub use operators::FlowExt;

// Terminal operators
pub use terminal::FlowTerminal;

// Flow builders
pub use buffer::{BufferOverflow, DEFAULT_BUFFER_CAPACITY};
pub use builders::{channel_flow, flow_of, interval_flow, repeat_flow, IntoFlow};

// Lifecycle operators
pub use lifecycle::FlowLifecycle;

// Combining operators
pub use combining::{merge, FlowCombining};

// Re-export common items from coflow_core
pub use coflow_core::{
    current_context_name, launch, with_context, CoroutineError, CoroutineScope, Dispatcher,
    Dispatchers, ExecutionContext, Executor, JobHandle, TokioExecutor,
};
