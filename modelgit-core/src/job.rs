//! Background workers with progress reporting and cooperative cancellation.
//!
//! A job runs on its own thread. Callers poll [`JobHandle::progress`] at their
//! own cadence; the worker never waits for them. Cancellation is observed at
//! the next [`JobContext::checkpoint`].

use crate::error::{Error, Result};
use std::thread::JoinHandle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub workers: usize,
    pub finished: usize,
}

pub struct JobContext {
    token: CancellationToken,
    progress: watch::Sender<Progress>,
}

impl JobContext {
    /// A context nobody observes, for running steps inline.
    pub fn detached() -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            token: CancellationToken::new(),
            progress,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub fn add_workers(&self, count: usize) {
        self.progress.send_modify(|p| p.workers += count);
    }

    pub fn finish_worker(&self) {
        self.progress
            .send_modify(|p| p.finished = (p.finished + 1).min(p.workers));
    }

    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }
}

pub struct JobHandle<T> {
    name: String,
    token: CancellationToken,
    progress: watch::Receiver<Progress>,
    thread: JoinHandle<Result<T>>,
}

impl<T> JobHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    pub fn cancel(&self) {
        debug!("Cancelling job {}", self.name);
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<T> {
        self.thread
            .join()
            .map_err(|_| Error::InvalidOperation(format!("job '{}' panicked", self.name)))?
    }
}

pub fn spawn<T, F>(name: &str, f: F) -> Result<JobHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(&JobContext) -> Result<T> + Send + 'static,
{
    let token = CancellationToken::new();
    let (sender, receiver) = watch::channel(Progress::default());
    let ctx = JobContext {
        token: token.clone(),
        progress: sender,
    };

    let thread = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || f(&ctx))?;

    debug!("Started job {}", name);
    Ok(JobHandle {
        name: name.to_string(),
        token,
        progress: receiver,
        thread,
    })
}
