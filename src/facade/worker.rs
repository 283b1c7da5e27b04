// ============================================================================
// Background tasks
// ============================================================================
//
// A background task gets a fresh `Persistence` on a worker thread, runs as
// one `perform` block and reports through its completion (or the awaited
// result). Errors never cross the thread boundary any other way.
//
// ============================================================================

use super::handle::StoreHandle;
use super::persistence::Persistence;
use crate::core::{Result, StoreError};
use log::warn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

const WORKER_THREAD_NAME: &str = "memopersist-worker";

impl Persistence {
    /// Runs `block` on a worker with its own context, saves, then calls
    /// `completion` with the outcome.
    ///
    /// Uses the blocking pool of the current tokio runtime when there is
    /// one, a dedicated thread otherwise.
    pub fn perform_background_task<F, C>(store: &StoreHandle, block: F, completion: C)
    where
        F: FnOnce(&mut Persistence) -> Result<()> + Send + 'static,
        C: FnOnce(Result<()>) + Send + 'static,
    {
        let store = store.clone();
        spawn_worker(move || completion(run_task(&store, block)));
    }

    /// Awaitable form of [`Persistence::perform_background_task`] that
    /// returns the block's value.
    pub async fn background_task<F, R>(store: &StoreHandle, block: F) -> Result<R>
    where
        F: FnOnce(&mut Persistence) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let store = store.clone();
        spawn_worker(move || {
            let _ = tx.send(run_task(&store, block));
        });

        rx.await.map_err(|_| StoreError::TaskAborted)?
    }
}

/// Runs the block in a fresh context. A panicking block is reported as
/// `TaskAborted` with nothing saved.
fn run_task<F, R>(store: &StoreHandle, block: F) -> Result<R>
where
    F: FnOnce(&mut Persistence) -> Result<R>,
{
    let span = tracing::info_span!("background_task", store = store.name());
    let _enter = span.enter();

    let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<R> {
        let mut persistence = Persistence::new(store)?;
        persistence.perform(block)
    }))
    .unwrap_or_else(|_| {
        warn!("Background task on '{}' panicked", store.name());
        Err(StoreError::TaskAborted.into())
    });

    if let Err(e) = &result {
        warn!("Background task on '{}' failed: {}", store.name(), e);
    }
    result
}

type Job = Box<dyn FnOnce() + Send + 'static>;

fn spawn_worker(job: impl FnOnce() + Send + 'static) {
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn_blocking(job);
        return;
    }

    // Shared so the job can still run here if the thread never starts.
    let slot: Arc<Mutex<Option<Job>>> = Arc::new(Mutex::new(Some(Box::new(job))));
    let worker_slot = Arc::clone(&slot);

    let spawned = std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            if let Some(job) = take_job(&worker_slot) {
                job();
            }
        });

    if let Err(e) = spawned {
        warn!("Could not start background worker, running inline: {}", e);
        if let Some(job) = take_job(&slot) {
            job();
        }
    }
}

fn take_job(slot: &Mutex<Option<Job>>) -> Option<Job> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::core::PersistenceError;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_background_task_without_runtime() {
        let store = StoreHandle::open(StoreConfig::in_memory("worker")).unwrap();
        let (tx, rx) = mpsc::channel();

        Persistence::perform_background_task(
            &store,
            |p| {
                p.insert_record("missing")?;
                Ok(())
            },
            move |result| {
                let name = std::thread::current().name().map(str::to_string);
                tx.send((result, name)).unwrap();
            },
        );

        let (result, thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Err(PersistenceError::WrongEntityType));
        assert_eq!(thread.as_deref(), Some(WORKER_THREAD_NAME));
    }

    #[tokio::test]
    async fn test_awaitable_background_task() {
        let store = StoreHandle::open(StoreConfig::in_memory("worker")).unwrap();
        let version = Persistence::background_task(&store, |p| Ok(p.store().snapshot()?.version()))
            .await
            .unwrap();
        assert_eq!(version, 0);
    }
}
