//! Designated execution context for caller-visible work.
//!
//! A `MainContext` is a mailbox owned by the thread that created it. Other
//! tasks and threads post boxed jobs through a `ContextHandle`; the jobs only
//! run when the owner drains the mailbox, so results computed on network
//! tasks are always delivered back on the owning thread.

use std::future::Future;
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;

/// Unit of work scheduled onto the main context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Mailbox owned by the designated thread.
pub struct MainContext {
    owner: ThreadId,
    job_tx: mpsc::UnboundedSender<Job>,
    job_rx: mpsc::UnboundedReceiver<Job>,
}

impl MainContext {
    /// Create a context owned by the calling thread.
    pub fn new() -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        Self {
            owner: thread::current().id(),
            job_tx,
            job_rx,
        }
    }

    /// Cloneable handle for posting jobs from anywhere.
    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            owner: self.owner,
            job_tx: self.job_tx.clone(),
        }
    }

    /// Run every job that is already queued. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        debug_assert!(self.is_owner(), "main context drained off its thread");

        let mut ran = 0;
        while let Ok(job) = self.job_rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it.
    ///
    /// The context keeps its own sender, so this only returns `false` if the
    /// channel is closed, which cannot happen while `self` is alive. Callers
    /// normally loop on a completion flag or wrap this in `tokio::select!`.
    pub async fn run_once(&mut self) -> bool {
        debug_assert!(self.is_owner(), "main context drained off its thread");

        match self.job_rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Drive the mailbox until `fut` completes.
    ///
    /// Used when the awaited value is itself produced by a job, such as a
    /// callback that resolves a oneshot.
    pub async fn run_until<F: Future>(&mut self, fut: F) -> F::Output {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                out = &mut fut => return out,
                _ = self.run_once() => {}
            }
        }
    }

    fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side of a `MainContext`.
#[derive(Clone)]
pub struct ContextHandle {
    owner: ThreadId,
    job_tx: mpsc::UnboundedSender<Job>,
}

impl ContextHandle {
    /// Schedule `job` to run on the main context.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.job_tx.send(Box::new(job)).is_err() {
            tracing::error!("Main context closed -- job dropped");
        }
    }

    /// True when called from the thread that owns the context.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_wait_for_drain() {
        let mut ctx = MainContext::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            ctx.handle().post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(ctx.run_pending(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(ctx.run_pending(), 0);
    }

    #[test]
    fn test_handle_knows_owner_thread() {
        let ctx = MainContext::new();
        let handle = ctx.handle();
        assert!(handle.is_current());

        let remote = handle.clone();
        let on_other = std::thread::spawn(move || remote.is_current())
            .join()
            .unwrap();
        assert!(!on_other);
    }

    #[tokio::test]
    async fn test_job_posted_from_task_runs_on_owner() {
        let mut ctx = MainContext::new();
        let owner = std::thread::current().id();
        let handle = ctx.handle();
        let ran_on = Arc::new(std::sync::Mutex::new(None));

        let slot = Arc::clone(&ran_on);
        tokio::spawn(async move {
            handle.post(move || {
                *slot.lock().unwrap() = Some(std::thread::current().id());
            });
        });

        assert!(ctx.run_once().await);
        assert_eq!(*ran_on.lock().unwrap(), Some(owner));
    }

    #[tokio::test]
    async fn test_run_until_resolves_after_job() {
        let mut ctx = MainContext::new();
        let handle = ctx.handle();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            handle.post(move || {
                let _ = tx.send(7);
            });
        });

        let value = ctx.run_until(rx).await.unwrap();
        assert_eq!(value, 7);
    }
}
