use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A committed compile result sitting in the LRU.
///
/// `binary_dir` is a UUID, not the compile-task hash: an entry for a given key can be evicted and
/// later re-inserted under a fresh directory while the old one is still referenced by a live
/// handle (spec §4.B).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct CacheEntry {
    pub binary_dir: PathBuf,
    pub size: u64,
    pub message: String,
    pub extra_info: Option<String>,
    pub last_access: SystemTime,
}
