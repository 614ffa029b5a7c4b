use std::collections::BTreeMap;
use std::path::PathBuf;

use oj_worker_store::FileStoreKey;
use serde::{Deserialize, Serialize};

/// Everything that determines whether two compiles are interchangeable (spec §3, "Compile task").
///
/// Extra source files are identified by their content hash rather than their content, so a large
/// auxiliary file isn't duplicated inside the key itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileTask {
    pub language: String,
    pub source: String,
    pub compile_options: Vec<String>,
    pub extra_sources: BTreeMap<PathBuf, FileStoreKey>,
}

/// Content hash identifying a `CompileTask`'s equivalence class for caching purposes.
pub type CompileTaskKey = FileStoreKey;

impl CompileTask {
    pub fn key(&self) -> CompileTaskKey {
        let encoded = bincode::serialize(self).expect("CompileTask is always serializable");
        FileStoreKey::from_bytes(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(lang: &str, source: &str, opts: &[&str]) -> CompileTask {
        CompileTask {
            language: lang.to_string(),
            source: source.to_string(),
            compile_options: opts.iter().map(|s| s.to_string()).collect(),
            extra_sources: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_tasks_share_a_key() {
        let a = task("cpp", "int main(){}", &["-O2"]);
        let b = task("cpp", "int main(){}", &["-O2"]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn different_source_different_key() {
        let a = task("cpp", "int main(){return 0;}", &["-O2"]);
        let b = task("cpp", "int main(){return 1;}", &["-O2"]);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn different_options_different_key() {
        let a = task("cpp", "int main(){}", &["-O2"]);
        let b = task("cpp", "int main(){}", &["-O0"]);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn different_extra_source_hash_different_key() {
        let mut a = task("cpp", "int main(){}", &[]);
        let mut b = a.clone();
        a.extra_sources.insert(
            PathBuf::from("helper.h"),
            FileStoreKey::from_bytes(b"v1"),
        );
        b.extra_sources.insert(
            PathBuf::from("helper.h"),
            FileStoreKey::from_bytes(b"v2"),
        );
        assert_ne!(a.key(), b.key());
    }
}
