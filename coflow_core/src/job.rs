use crate::cleanup::discard;
use std::future::Future;
use tokio_util::sync::{CancellationToken, DropGuard};

/// JobHandle tracks a coroutine in the cancellation tree
#[derive(Clone, Debug)]
pub struct JobHandle {
    cancel_token: CancellationToken,
    finished: CancellationToken,
}

impl JobHandle {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    /// A job cancelled together with this one, but finishing on its own
    pub fn new_child(&self) -> Self {
        Self {
            cancel_token: self.cancel_token.child_token(),
            finished: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait until the job's body has completed or been torn down
    pub async fn join(&self) {
        self.finished.cancelled().await;
    }

    /// Cancel and wait for the body to be dropped
    pub async fn cancel_and_join(&self) {
        self.cancel();
        self.join().await;
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Guard that cancels this job when dropped
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancel_token.clone().drop_guard()
    }

    /// Guard that cancels this job when dropped and lets a surrounding
    /// teardown wait for it
    pub fn guard(&self) -> JobGuard {
        JobGuard {
            job: Some(self.clone()),
        }
    }

    /// Drive `fut` as this job's body.
    ///
    /// Returns `None` when the job was cancelled first. A cancelled body is
    /// dropped through [`discard`], so cleanups its destructors defer have
    /// run before the job is marked finished.
    pub async fn run<F>(self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        let _finished = self.finished.clone().drop_guard();
        if self.cancel_token.is_cancelled() {
            discard(fut).await;
            return None;
        }

        let mut body = Box::pin(fut);
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {}
            output = &mut body => return Some(output),
        }
        discard(body).await;
        None
    }
}

/// Cancels its job when dropped.
///
/// Dropped inside a [`discard`] teardown, it also waits for the job's own
/// teardown before the enclosing one completes.
#[must_use = "dropping the guard cancels the job"]
#[derive(Debug)]
pub struct JobGuard {
    job: Option<JobHandle>,
}

impl JobGuard {
    /// Cancel the job and wait for its body to be gone
    pub async fn cancel_and_join(mut self) {
        if let Some(job) = self.job.take() {
            job.cancel_and_join().await;
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel();
            if !job.is_finished() {
                crate::defer_cleanup(async move { job.join().await });
            }
        }
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}
