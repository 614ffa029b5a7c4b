//! Task-slot scheduler (spec §4.C): a bounded semaphore of
//! `min(workingDirectories.len, maxConcurrentTasks)` permits, FIFO, handing out an emptied
//! working directory alongside each permit.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Error};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Accumulates cleanup closures appended by the body of a queued task (pipe ends, shared-memory
/// handles) and runs every one of them, in the order they were added, when the task is done —
/// whether it finished normally or was canceled.
#[derive(Default)]
pub struct Disposer {
    cleanups: Vec<Box<dyn FnOnce() + Send>>,
}

impl Disposer {
    /// Register a cleanup to run once the task releases its slot.
    pub fn defer(&mut self, cleanup: impl FnOnce() + Send + 'static) {
        self.cleanups.push(Box::new(cleanup));
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
    }
}

/// Releases the working directory back to the pool (and, by dropping the permit it holds, the
/// scheduling slot) no matter how the task exits, including cancellation.
struct WorkingDirGuard {
    dir: PathBuf,
    dirs: Arc<Mutex<VecDeque<PathBuf>>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        self.dirs.lock().unwrap().push_back(self.dir.clone());
    }
}

/// Bounds how many tasks run at once to `min(workingDirectories.len(), maxConcurrentTasks)`.
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    dirs: Arc<Mutex<VecDeque<PathBuf>>>,
}

impl Scheduler {
    pub fn new(working_directories: Vec<PathBuf>, max_concurrent_tasks: usize) -> Result<Self, Error> {
        if working_directories.is_empty() {
            bail!("At least one task working directory must be configured");
        }
        for dir in &working_directories {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create working directory {}", dir.display()))?;
        }
        let permits = working_directories.len().min(max_concurrent_tasks.max(1));
        Ok(Scheduler {
            semaphore: Arc::new(Semaphore::new(permits)),
            dirs: Arc::new(Mutex::new(working_directories.into())),
        })
    }

    /// Acquire a permit and a free, emptied working directory (FIFO queue, no work-stealing), run
    /// `f` with them, and unconditionally return both when `f`'s future resolves or is dropped.
    pub async fn run_queued<F, Fut, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(PathBuf, &mut Disposer) -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Scheduler semaphore closed")?;
        let dir = self
            .dirs
            .lock()
            .unwrap()
            .pop_front()
            .expect("a granted permit always implies a free working directory");
        empty_dir(&dir)
            .with_context(|| format!("Failed to empty working directory {}", dir.display()))?;
        let _guard = WorkingDirGuard {
            dir: dir.clone(),
            dirs: self.dirs.clone(),
            _permit: permit,
        };
        // `disposer` is declared after `_guard` so it drops first: deferred cleanup (closing
        // pipes, unmapping shared memory) runs before the directory is handed to the next task.
        let mut disposer = Disposer::default();
        let result = f(dir, &mut disposer).await;
        Ok(result)
    }

    /// Number of slots currently free, for diagnostics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

fn empty_dir(dir: &Path) -> Result<(), Error> {
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        if entry.file_type().context("Failed to stat directory entry")?.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        } else {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_capped_by_both_bounds() {
        let a = tempfile::TempDir::new().unwrap();
        let b = tempfile::TempDir::new().unwrap();
        let scheduler =
            Scheduler::new(vec![a.path().to_owned(), b.path().to_owned()], 5).unwrap();
        // only 2 working directories, even though maxConcurrentTasks allows 5
        assert_eq!(scheduler.available_permits(), 2);
    }

    #[tokio::test]
    async fn working_directory_is_emptied_before_use() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("stale.txt"), b"leftover").unwrap();
        let scheduler = Scheduler::new(vec![dir.path().to_owned()], 1).unwrap();
        scheduler
            .run_queued(|wd, _disposer| async move {
                assert!(!wd.join("stale.txt").exists());
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disposer_runs_on_completion() {
        let dir = tempfile::TempDir::new().unwrap();
        let scheduler = Scheduler::new(vec![dir.path().to_owned()], 1).unwrap();
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_clone = ran.clone();
        scheduler
            .run_queued(move |_wd, disposer| {
                let ran = ran_clone.clone();
                disposer.defer(move || ran.store(true, std::sync::atomic::Ordering::SeqCst));
                async move {}
            })
            .await
            .unwrap();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn permit_and_directory_are_returned_after_use() {
        let dir = tempfile::TempDir::new().unwrap();
        let scheduler = Scheduler::new(vec![dir.path().to_owned()], 1).unwrap();
        scheduler
            .run_queued(|_wd, _disposer| async move {})
            .await
            .unwrap();
        assert_eq!(scheduler.available_permits(), 1);
        assert_eq!(scheduler.dirs.lock().unwrap().len(), 1);
    }
}
