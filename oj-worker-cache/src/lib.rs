//! Deduplicating, refcounted LRU cache of compiled binaries (spec §4.B, component B).
//!
//! `CompileCache::compile` is keyed by the content hash of a [`key::CompileTask`]. Concurrent
//! callers asking for the same key while a compile is already running all attach to it and each
//! receive an independently-refcounted [`CompileHandle`] once it finishes; the handle's `Drop`
//! releases the reference, and an unreferenced entry becomes eligible for LRU eviction once the
//! store exceeds its soft size cap.
//!
//! This crate doesn't know how to run a compiler: `compile` takes the actual compile step as an
//! async closure, so the task-slot/sandbox machinery in `oj-worker-exec` stays a caller of this
//! crate rather than a dependency of it.

#[macro_use]
extern crate log;

mod entry;
mod key;
mod storage;

use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Error};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

pub use key::{CompileTask, CompileTaskKey};

use crate::entry::CacheEntry;

const INDEX_FILE: &str = "index.bin";

/// Outcome of a compile, either already cached, freshly compiled, or attached to an in-flight one.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Success(CompileHandle),
    Failure { message: String },
}

/// What the caller's compile step produced, before classification (spec §4.B step 3).
pub struct RawCompileRun {
    /// Whether the sandbox itself completed the run without failing (distinct from the compiled
    /// program's exit code).
    pub sandbox_ok: bool,
    /// Prefix to use in the failure message when `sandbox_ok` is false (e.g. the sandbox status).
    pub sandbox_status_message: String,
    pub exit_code: i32,
    /// Contents of the compiler's message file.
    pub message: String,
    /// Optional language-supplied opaque extra info (spec §3, "Compile result").
    pub extra_info: Option<String>,
    /// Directory holding the freshly built binary, owned by the caller until `compile` either
    /// moves it into the cache store (on success) or leaves it for the caller to clean up (on
    /// failure).
    pub binary_dir: PathBuf,
}

/// A refcounted reference to a cached compiled binary directory.
#[derive(Debug)]
pub struct CompileHandle {
    pub binary_dir: PathBuf,
    pub size: u64,
    pub extra_info: Option<String>,
    locked: std::sync::Arc<std::sync::Mutex<HashMap<PathBuf, usize>>>,
}

impl Clone for CompileHandle {
    fn clone(&self) -> Self {
        let mut locked = self.locked.lock().unwrap();
        *locked.entry(self.binary_dir.clone()).or_insert(0) += 1;
        drop(locked);
        CompileHandle {
            binary_dir: self.binary_dir.clone(),
            size: self.size,
            extra_info: self.extra_info.clone(),
            locked: self.locked.clone(),
        }
    }
}

impl Drop for CompileHandle {
    fn drop(&mut self) {
        let mut locked = self.locked.lock().unwrap();
        if let std::collections::hash_map::Entry::Occupied(mut e) =
            locked.entry(self.binary_dir.clone())
        {
            *e.get_mut() -= 1;
            if *e.get() == 0 {
                e.remove();
            }
        }
    }
}

struct CacheState {
    entries: HashMap<CompileTaskKey, CacheEntry>,
    total_size: u64,
    locked: std::sync::Arc<std::sync::Mutex<HashMap<PathBuf, usize>>>,
    in_flight: HashMap<CompileTaskKey, broadcast::Sender<CompileOutcome>>,
}

/// The compile cache, component B of the judging pipeline.
pub struct CompileCache {
    store_dir: PathBuf,
    max_size: u64,
    min_size: u64,
    state: Mutex<CacheState>,
}

impl CompileCache {
    /// Open (or create) a compile cache rooted at `store_dir`.
    pub fn new(store_dir: impl Into<PathBuf>, max_size: u64, min_size: u64) -> Result<Self, Error> {
        let store_dir = store_dir.into();
        std::fs::create_dir_all(&store_dir)
            .with_context(|| format!("Cannot create compile cache dir {}", store_dir.display()))?;
        let entries = storage::load(store_dir.join(INDEX_FILE))?;
        let total_size = entries.values().map(|e| e.size).sum();
        Ok(CompileCache {
            store_dir,
            max_size,
            min_size,
            state: Mutex::new(CacheState {
                entries,
                total_size,
                locked: std::sync::Arc::new(std::sync::Mutex::new(HashMap::new())),
                in_flight: HashMap::new(),
            }),
        })
    }

    /// Resolve a compile, deduplicating concurrent identical requests (spec §4.B).
    pub async fn compile<F, Fut>(&self, task: &CompileTask, max_binary_size: u64, run: F) -> Result<CompileOutcome, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RawCompileRun, Error>>,
    {
        let key = task.key();

        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get(&key).cloned() {
            entry_touch(&mut state, &key);
            let handle = self.handle_for(&state, entry.binary_dir, entry.size, entry.extra_info);
            return Ok(CompileOutcome::Success(handle));
        }
        if let Some(sender) = state.in_flight.get(&key) {
            let mut rx = sender.subscribe();
            drop(state);
            return rx.recv().await.context("In-flight compile sender dropped");
        }

        let (tx, _rx) = broadcast::channel(1);
        state.in_flight.insert(key.clone(), tx.clone());
        drop(state);

        let outcome = self.run_and_classify(&key, max_binary_size, run).await;

        let mut state = self.state.lock().await;
        state.in_flight.remove(&key);
        drop(state);

        let outcome = outcome?;
        let _ = tx.send(outcome.clone());
        Ok(outcome)
    }

    async fn run_and_classify<F, Fut>(
        &self,
        key: &CompileTaskKey,
        max_binary_size: u64,
        run: F,
    ) -> Result<CompileOutcome, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RawCompileRun, Error>>,
    {
        let raw = run().await?;

        if !raw.sandbox_ok {
            return Ok(CompileOutcome::Failure {
                message: format!("{}: {}", raw.sandbox_status_message, raw.message),
            });
        }
        if raw.exit_code != 0 {
            return Ok(CompileOutcome::Failure { message: raw.message });
        }
        let size = dir_size(&raw.binary_dir)
            .with_context(|| format!("Cannot compute size of {}", raw.binary_dir.display()))?;
        if size > max_binary_size {
            return Ok(CompileOutcome::Failure {
                message: format!(
                    "Compiled binary is {} bytes, exceeding the {} byte limit",
                    size, max_binary_size
                ),
            });
        }

        let dest = self.store_dir.join(Uuid::new_v4().to_string());
        std::fs::rename(&raw.binary_dir, &dest).with_context(|| {
            format!(
                "Cannot move compiled binary {} -> {}",
                raw.binary_dir.display(),
                dest.display()
            )
        })?;

        let entry = CacheEntry {
            binary_dir: dest.clone(),
            size,
            message: raw.message,
            extra_info: raw.extra_info.clone(),
            last_access: SystemTime::now(),
        };

        let mut state = self.state.lock().await;
        state.total_size += size;
        state.entries.insert(key.clone(), entry);
        self.maybe_evict(&mut state);
        self.persist(&state);
        let handle = self.handle_for(&state, dest, size, raw.extra_info);
        drop(state);

        Ok(CompileOutcome::Success(handle))
    }

    fn handle_for(
        &self,
        state: &CacheState,
        binary_dir: PathBuf,
        size: u64,
        extra_info: Option<String>,
    ) -> CompileHandle {
        let mut locked = state.locked.lock().unwrap();
        *locked.entry(binary_dir.clone()).or_insert(0) += 1;
        drop(locked);
        CompileHandle {
            binary_dir,
            size,
            extra_info,
            locked: state.locked.clone(),
        }
    }

    /// Weight-based LRU eviction down to `min_size`, skipping entries with a live handle
    /// (spec §4.B "Eviction").
    fn maybe_evict(&self, state: &mut CacheState) {
        if state.total_size <= self.max_size {
            return;
        }
        debug!(
            "Compile cache at {} bytes, evicting down to {}",
            state.total_size, self.min_size
        );
        let locked = state.locked.lock().unwrap();
        let mut heap: BinaryHeap<(std::cmp::Reverse<SystemTime>, CompileTaskKey)> = state
            .entries
            .iter()
            .map(|(k, e)| (std::cmp::Reverse(e.last_access), k.clone()))
            .collect();
        while state.total_size > self.min_size {
            let Some((_, key)) = heap.pop() else { break };
            let Some(entry) = state.entries.get(&key) else { continue };
            if locked.contains_key(&entry.binary_dir) {
                continue;
            }
            let size = entry.size;
            let dir = entry.binary_dir.clone();
            state.entries.remove(&key);
            state.total_size -= size;
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Cannot remove evicted compile cache dir {:?}: {}", dir, e);
            }
        }
    }

    fn persist(&self, state: &CacheState) {
        if let Err(e) = storage::store(self.store_dir.join(INDEX_FILE), &state.entries) {
            warn!("Failed to persist compile cache index: {:?}", e);
        }
    }
}

fn entry_touch(state: &mut CacheState, key: &CompileTaskKey) {
    if let Some(entry) = state.entries.get_mut(key) {
        entry.last_access = SystemTime::now();
    }
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_run(binary_dir: PathBuf) -> RawCompileRun {
        RawCompileRun {
            sandbox_ok: true,
            sandbox_status_message: String::new(),
            exit_code: 0,
            message: String::new(),
            extra_info: None,
            binary_dir,
        }
    }

    fn write_binary(dir: &Path, bytes: usize) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("a.out"), vec![1u8; bytes]).unwrap();
    }

    fn task(source: &str) -> CompileTask {
        CompileTask {
            language: "cpp".to_string(),
            source: source.to_string(),
            compile_options: vec![],
            extra_sources: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_compile_success_then_cached() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CompileCache::new(tmp.path().join("cache"), 1_000_000, 500_000).unwrap();
        let staging = tmp.path().join("staging1");
        write_binary(&staging, 10);
        let t = task("int main(){}");

        let outcome = cache
            .compile(&t, 1_000_000, || async { Ok(success_run(staging.clone())) })
            .await
            .unwrap();
        let handle = match outcome {
            CompileOutcome::Success(h) => h,
            CompileOutcome::Failure { message } => panic!("unexpected failure: {}", message),
        };
        assert!(handle.binary_dir.join("a.out").exists());

        let outcome2 = cache
            .compile(&t, 1_000_000, || async {
                panic!("should not recompile a cached entry")
            })
            .await
            .unwrap();
        assert!(matches!(outcome2, CompileOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_compile_failure_nonzero_exit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CompileCache::new(tmp.path().join("cache"), 1_000_000, 500_000).unwrap();
        let t = task("broken");
        let outcome = cache
            .compile(&t, 1_000_000, || async {
                Ok(RawCompileRun {
                    sandbox_ok: true,
                    sandbox_status_message: String::new(),
                    exit_code: 1,
                    message: "syntax error".to_string(),
                    extra_info: None,
                    binary_dir: tmp.path().join("unused"),
                })
            })
            .await
            .unwrap();
        match outcome {
            CompileOutcome::Failure { message } => assert_eq!(message, "syntax error"),
            CompileOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_compile_failure_oversized_binary() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CompileCache::new(tmp.path().join("cache"), 1_000_000, 500_000).unwrap();
        let staging = tmp.path().join("staging");
        write_binary(&staging, 100);
        let t = task("int main(){}");
        let outcome = cache
            .compile(&t, 10, || async { Ok(success_run(staging.clone())) })
            .await
            .unwrap();
        assert!(matches!(outcome, CompileOutcome::Failure { .. }));
    }

    #[tokio::test]
    async fn test_eviction_skips_referenced_entry() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = CompileCache::new(tmp.path().join("cache"), 100, 10).unwrap();

        let staging1 = tmp.path().join("s1");
        write_binary(&staging1, 90);
        let outcome1 = cache
            .compile(&task("a"), 1_000, || async { Ok(success_run(staging1.clone())) })
            .await
            .unwrap();
        let handle1 = match outcome1 {
            CompileOutcome::Success(h) => h,
            _ => panic!(),
        };

        let staging2 = tmp.path().join("s2");
        write_binary(&staging2, 90);
        let _outcome2 = cache
            .compile(&task("b"), 1_000, || async { Ok(success_run(staging2.clone())) })
            .await
            .unwrap();

        // handle1's directory must survive the eviction triggered by inserting the second entry.
        assert!(handle1.binary_dir.join("a.out").exists());
    }
}
