//! Worker configuration (SPEC_FULL §13 / spec §6 "Configuration"), loaded once at process start.
//!
//! Grounded on the teacher's `directories` + `serde_yaml` combination (`task-maker` uses
//! `directories` for its cache dir, `serde_yaml` for task manifests).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use serde::Deserialize;

/// The full YAML configuration (spec §6 "Configuration" table).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Dispatcher endpoint, e.g. `tcp://judge.example.com:7070`.
    pub server_url: String,
    /// Shared secret used to authenticate with the dispatcher.
    pub key: String,

    /// Persistent testdata store directory.
    pub data_store: PathBuf,
    /// Compiled-binary cache directory; emptied and recreated on start (spec §6).
    pub binary_cache_store: PathBuf,
    /// Soft byte cap on `binaryCacheStore`'s total size.
    pub binary_cache_max_size: u64,

    /// Number of dispatcher-side consumer threads this worker announces (spec §4.H).
    pub task_consuming_threads: usize,
    /// Bound on concurrent testdata downloads.
    pub max_concurrent_downloads: usize,
    /// Bound on concurrent testcase executions (spec §4.C).
    pub max_concurrent_tasks: usize,

    /// One directory per task slot; ideally each a tmpfs mount (spec §4.C).
    pub task_working_directories: Vec<PathBuf>,

    /// Dispatcher RPC timeout, in milliseconds.
    pub rpc_timeout_ms: u64,
    /// Per-attempt testdata download timeout, in milliseconds.
    pub download_timeout_ms: u64,
    /// Number of retries before a download is considered failed (spec §5).
    pub download_retry: u32,

    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub cpu_affinity: CpuAffinityConfig,
}

/// `sandbox.*` keys (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    pub rootfs: PathBuf,
    pub user: String,
    pub hostname: String,
    #[serde(default)]
    pub environments: HashMap<String, String>,
}

/// `cpuAffinity.*` keys: CPU-id lists per sandboxed-program role (spec §4.A).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuAffinityConfig {
    #[serde(default)]
    pub compiler: Vec<usize>,
    #[serde(default)]
    pub user_program: Vec<usize>,
    #[serde(default)]
    pub interactor: Vec<usize>,
    #[serde(default)]
    pub checker: Vec<usize>,
}

impl Config {
    /// Load and validate the configuration at `path`.
    ///
    /// Validation happens eagerly (SPEC_FULL §13): a `taskWorkingDirectories` entry that doesn't
    /// exist and can't be created, or `maxConcurrentTasks == 0`, fails here rather than on the
    /// first task.
    pub fn load(path: &Path) -> Result<Config, Error> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_concurrent_tasks == 0 {
            bail!("maxConcurrentTasks must be at least 1");
        }
        if self.task_consuming_threads == 0 {
            bail!("taskConsumingThreads must be at least 1");
        }
        if self.task_working_directories.is_empty() {
            bail!("taskWorkingDirectories must list at least one directory");
        }
        for dir in &self.task_working_directories {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create task working directory {}", dir.display()))?;
        }
        std::fs::create_dir_all(&self.data_store)
            .with_context(|| format!("Cannot create data store {}", self.data_store.display()))?;
        Ok(())
    }

    /// Empty and recreate `binaryCacheStore` (spec §6: "empties on start"), matching
    /// `task-maker-tools reset`'s cache-reset behavior.
    pub fn reset_binary_cache_store(&self) -> Result<(), Error> {
        if self.binary_cache_store.exists() {
            std::fs::remove_dir_all(&self.binary_cache_store).with_context(|| {
                format!(
                    "Failed to empty binary cache store {}",
                    self.binary_cache_store.display()
                )
            })?;
        }
        std::fs::create_dir_all(&self.binary_cache_store).with_context(|| {
            format!(
                "Failed to recreate binary cache store {}",
                self.binary_cache_store.display()
            )
        })
    }

    /// Default config path, the platform config dir resolved via `directories::ProjectDirs`
    /// (teacher's `StorageOpt::store_dir` pattern), falling back to a temp directory.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "oj-worker")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .unwrap_or_else(|| std::env::temp_dir().join("oj-worker").join("config.yaml"))
    }
}
