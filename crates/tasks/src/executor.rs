//! Named task spawning on the Tokio runtime.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::CancelToken;
use crate::metrics::{IncCounterOnDrop, TaskExecutorMetrics};

/// Spawns named tasks and owns the process-wide shutdown token.
///
/// Critical tasks are expected to run for the lifetime of the process. If one
/// panics or returns, the shutdown token is cancelled so the binary can exit
/// instead of limping along without, say, its network event loop.
#[derive(Clone, Debug)]
pub struct TaskExecutor {
    handle: Handle,
    shutdown: CancelToken,
    metrics: TaskExecutorMetrics,
}

impl TaskExecutor {
    /// Executor bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current(), CancelToken::new())
    }

    /// Executor bound to `handle`, with `shutdown` as the process shutdown token.
    pub fn new(handle: Handle, shutdown: CancelToken) -> Self {
        Self {
            handle,
            shutdown,
            metrics: TaskExecutorMetrics::default(),
        }
    }

    /// Process shutdown token.
    pub fn shutdown_token(&self) -> CancelToken {
        self.shutdown.clone()
    }

    /// Spawn a regular task.
    pub fn spawn<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.inc_regular_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_regular_tasks_total.clone());

        self.handle.spawn(
            async move {
                let _finished = finished;
                fut.await;
                debug!("task finished");
            }
            .instrument(info_span!("task", name)),
        )
    }

    /// Spawn a task that stops as soon as `cancel` fires.
    pub fn spawn_with_cancel<F>(&self, name: &'static str, cancel: CancelToken, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let metrics = self.metrics.clone();
        self.spawn(name, async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    metrics.inc_cancelled_tasks();
                    debug!("task cancelled");
                }
                _ = fut => {}
            }
        })
    }

    /// Spawn a critical task. Shutdown is triggered when it panics or returns.
    pub fn spawn_critical<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.inc_critical_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_critical_tasks_total.clone());
        let shutdown = self.shutdown.clone();
        let inner = self.handle.spawn(fut.instrument(info_span!("critical", name)));

        self.handle.spawn(async move {
            let _finished = finished;
            match inner.await {
                Ok(()) => {
                    if !shutdown.is_cancelled() {
                        warn!(task = name, "Critical task exited, shutting down");
                    }
                }
                Err(e) if e.is_panic() => {
                    error!(task = name, "Critical task panicked, shutting down");
                }
                Err(e) => {
                    debug!(task = name, %e, "Critical task aborted");
                }
            }
            shutdown.cancel();
        })
    }
}
