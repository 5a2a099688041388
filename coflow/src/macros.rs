//! Kotlin-like macros for coflow
//!
//! This module provides ergonomic macros that eliminate boilerplate
//! around building, collecting and launching flows.

/// Creates a Flow with implicit collector access via emit!()
///
/// `emit!` stops the producer (by returning early) once the downstream
/// refuses further values. The body is a sequence of statements.
///
/// # Example
/// ```ignore
/// use coflow::flow;
///
/// // Kotlin-like syntax
/// let numbers = flow! {
///     for i in 1..=5 {
///         emit!(i);
///     }
/// };
/// ```
#[macro_export]
macro_rules! flow {
    { $($body:tt)* } => {{
        $crate::flow::flow(|__collector__| async move {
            // Make collector available for emit! macro
            #[allow(unused_macros)]
            macro_rules! emit {
                ($value:expr) => {
                    __collector__.emit($value).await?
                };
            }
            $($body)*
            Ok::<(), $crate::FlowError>(())
        })
    }};
}

/// Emit a value to an explicit collector, returning early if it refuses
///
/// Inside a flow! block, a local emit! macro is automatically available.
#[macro_export]
macro_rules! emit_to {
    ($collector:expr, $value:expr) => {
        $collector.emit($value).await?
    };
}

/// Collect values from a flow with simplified syntax
///
/// Evaluates to the `FlowResult` of the collection.
///
/// # Examples
/// ```ignore
/// collect!(my_flow, |x| {
///     println!("Got: {}", x);
/// })?;
/// ```
#[macro_export]
macro_rules! collect {
    // Async move body
    ($flow:expr, |$x:ident| async move $body:block) => {
        $flow.collect(move |$x| async move $body).await
    };
    // Explicit async body
    ($flow:expr, |$x:ident| async $body:block) => {
        $flow.collect(move |$x| async move $body).await
    };
    // Sync body - auto-wrap in async
    ($flow:expr, |$x:ident| $body:expr) => {
        $flow.collect(move |$x| {
            $body;
            async {}
        }).await
    };
}

/// Launch a coroutine on a scope
///
/// # Example
/// ```ignore
/// let job = launch!(scope => { work().await; });
/// ```
#[macro_export]
macro_rules! launch {
    ($scope:expr => { $($body:tt)* }) => {{
        $scope.launch(async move {
            $($body)*
        })
    }};
}

/// Run a block on a different dispatcher and wait for its value
///
/// # Example
/// ```ignore
/// let result = with_context!(Dispatchers::io() => { fetch_data().await })?;
/// ```
#[macro_export]
macro_rules! with_context {
    ($dispatcher:expr => { $($body:tt)* }) => {{
        $crate::with_context($dispatcher, async move {
            $($body)*
        })
        .await
    }};
}

/// Create a StateFlow with initial value
///
/// # Example
/// ```ignore
/// let counter = state_flow!(0);
/// counter.set_value(1);
/// let value = counter.value();
/// ```
#[macro_export]
macro_rules! state_flow {
    ($initial:expr) => {
        $crate::StateFlow::new($initial)
    };
}

/// Create a SharedFlow, optionally with extra buffer capacity per subscriber
///
/// # Example
/// ```ignore
/// let events = shared_flow!(16);
/// events.emit("event").await;
/// ```
#[macro_export]
macro_rules! shared_flow {
    ($capacity:expr) => {
        $crate::SharedFlow::with_config(
            $crate::SharedFlowConfig::default().with_extra_buffer_capacity($capacity),
        )
    };
    () => {
        $crate::SharedFlow::new()
    };
}
