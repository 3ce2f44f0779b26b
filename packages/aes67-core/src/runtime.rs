//! Runtime task spawning, abstracted so services don't depend on a live
//! Tokio context directly.

use std::future::Future;

/// Spawns a future onto some executor. Exists so services can be
/// constructed and unit tested without a running Tokio runtime.
pub trait TaskSpawner: Send + Sync {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// `TaskSpawner` backed by a handle to a live Tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Captures the handle of whichever runtime is currently executing.
    ///
    /// Panics if called outside a Tokio runtime context.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tokio_spawner_executes_task() {
        let spawner = TokioSpawner::current();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        spawner.spawn(async move {
            ran_clone.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
