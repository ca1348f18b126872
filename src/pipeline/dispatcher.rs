//! Admission control and shutdown draining for pipeline tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};

/// A reserved slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
}

/// Bounded task runner for pipelines.
///
/// Every pipeline holds one permit from admission until its last step (or
/// detached confirmation) finishes, so at most `limit` pipelines are in
/// flight. Shutdown closes admission, wakes every `ShutdownSignal` and waits
/// for outstanding permits to come back.
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    limit: usize,
    shutdown_tx: watch::Sender<bool>,
}

impl Dispatcher {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            shutdown_tx,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Reserves a slot without waiting.
    pub fn admit(&self) -> Result<Admission> {
        if self.is_shutting_down() {
            return Err(AppError::ShuttingDown);
        }
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(Admission { _permit: permit }),
            Err(_) => {
                tracing::warn!("Pipeline admission rejected: {} in flight", self.limit);
                Err(AppError::Busy)
            }
        }
    }

    /// Runs `task` in the background; the slot is released when it ends.
    pub fn spawn<F>(&self, admission: Admission, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let _admission = admission;
            task.await;
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Stops admission, signals trackers and waits up to `grace` for
    /// in-flight pipelines. Returns whether everything drained.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown_tx.send_replace(true);
        let in_flight = self.in_flight();
        tracing::info!("Dispatcher shutting down, {} pipeline(s) in flight", in_flight);

        let limit = u32::try_from(self.limit).unwrap_or(u32::MAX);
        match tokio::time::timeout(grace, self.permits.acquire_many(limit)).await {
            Ok(Ok(permits)) => {
                drop(permits);
                self.permits.close();
                tracing::info!("All pipelines drained");
                true
            }
            Ok(Err(_)) => true,
            Err(_) => {
                tracing::warn!(
                    "Shutdown grace of {:?} elapsed with {} pipeline(s) still running",
                    grace,
                    self.in_flight()
                );
                false
            }
        }
    }
}

/// Resolves once shutdown has been requested.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub async fn triggered(&mut self) {
        let fired = self.rx.wait_for(|stop| *stop).await.map(|_| ());
        if fired.is_err() {
            // Sender dropped without signalling
            std::future::pending::<()>().await;
        }
    }
}
