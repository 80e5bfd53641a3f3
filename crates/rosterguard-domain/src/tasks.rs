//! Tracking for fire-and-forget work spawned by the session layer.

use std::future::Future;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Set of background tasks that can be awaited or aborted together.
#[derive(Debug, Default)]
pub(crate) struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Waits until every tracked task, including tasks spawned while
    /// waiting, has finished.
    pub(crate) async fn settle(&self) {
        loop {
            let pending: Vec<_> = std::mem::take(&mut *self.handles.lock());
            if pending.is_empty() {
                return;
            }
            for result in join_all(pending).await {
                if let Err(error) = result {
                    if error.is_panic() {
                        warn!(%error, "background task panicked");
                    }
                }
            }
        }
    }

    pub(crate) fn abort_all(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}
