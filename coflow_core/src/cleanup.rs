//! Async cleanup for computations torn down by cancellation
//!
//! `Drop` cannot await, so a destructor that needs to run async work hands it
//! to [`defer_cleanup`]. When the teardown happens through [`discard`] (which
//! [`JobHandle::run`](crate::JobHandle::run) uses for cancelled bodies) the
//! deferred work runs before `discard` returns. Any other teardown spawns it
//! on the current runtime.

use crate::ExecutionContext;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;

type Cleanup = Pin<Box<dyn Future<Output = ()> + Send>>;

tokio::task_local! {
    static DEFERRED: RefCell<Vec<Cleanup>>;
}

/// Schedule `cleanup` to run after the computation being torn down is gone
pub fn defer_cleanup<F>(cleanup: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut slot: Option<Cleanup> = Some(Box::pin(cleanup));
    let _ = DEFERRED.try_with(|deferred| {
        if let Some(cleanup) = slot.take() {
            deferred.borrow_mut().push(cleanup);
        }
    });

    let Some(cleanup) = slot else {
        return;
    };
    if tokio::runtime::Handle::try_current().is_err() {
        tracing::warn!("cleanup deferred outside a tokio runtime was skipped");
        return;
    }
    match ExecutionContext::current() {
        Some(context) => context.spawn(cleanup),
        None => {
            tokio::spawn(cleanup);
        }
    }
}

/// Drop `body` as a cancelled computation, then run every cleanup its
/// destructors deferred, innermost first.
pub async fn discard<F>(body: F) {
    let cleanups = DEFERRED.sync_scope(RefCell::new(Vec::new()), || {
        drop(body);
        DEFERRED.with(|deferred| std::mem::take(&mut *deferred.borrow_mut()))
    });

    if !cleanups.is_empty() {
        tracing::trace!(count = cleanups.len(), "running deferred cleanups");
    }
    for cleanup in cleanups {
        cleanup.await;
    }
}
