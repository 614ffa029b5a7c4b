use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Error};

use crate::entry::CacheEntry;
use crate::key::CompileTaskKey;

/// Magic string prepended to the cache index to avoid loading an unrelated file.
const MAGIC: &[u8] = b"oj-worker-cache";
/// Version tag; bumping it invalidates any index written by a previous version.
const VERSION: &str = env!("CARGO_PKG_VERSION");
const VERSION_MAX_LEN: usize = 16;

/// Load the index of committed cache entries from disk, if present.
pub(crate) fn load<P: AsRef<Path>>(path: P) -> Result<HashMap<CompileTaskKey, CacheEntry>, Error> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open cache index at {}", path.display()))?;
    let mut magic = [0u8; MAGIC.len() + VERSION_MAX_LEN];
    file.read_exact(&mut magic)
        .context("Failed to read cache index magic")?;
    if &magic[..MAGIC.len()] != MAGIC {
        bail!(
            "Cache index magic mismatch: expected {:?}, found {:?}",
            MAGIC,
            &magic[..MAGIC.len()]
        );
    }
    if &magic[MAGIC.len()..MAGIC.len() + VERSION.len()] != VERSION.as_bytes() {
        bail!(
            "Cache index version mismatch: expected {:?}, found {:?}",
            VERSION.as_bytes(),
            &magic[MAGIC.len()..MAGIC.len() + VERSION.len()]
        );
    }
    bincode::deserialize_from(file).context("Failed to deserialize cache index")
}

/// Persist the index of committed cache entries to disk.
pub(crate) fn store<P: AsRef<Path>>(
    path: P,
    entries: &HashMap<CompileTaskKey, CacheEntry>,
) -> Result<(), Error> {
    let path = path.as_ref();
    std::fs::create_dir_all(path.parent().expect("Invalid cache index path"))
        .context("Failed to create cache directory")?;
    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp)
        .with_context(|| format!("Failed to create cache index at {}", tmp.display()))?;
    let mut magic = [0u8; MAGIC.len() + VERSION_MAX_LEN];
    magic[..MAGIC.len()].clone_from_slice(MAGIC);
    magic[MAGIC.len()..MAGIC.len() + VERSION.as_bytes().len()].clone_from_slice(VERSION.as_bytes());
    file.write_all(&magic)
        .context("Failed to write cache index magic")?;
    bincode::serialize_into(&mut file, entries).context("Failed to serialize cache index")?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let entries = load(tmp.path().join("index.bin")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_load_reject_wrong_magic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"totally-not-the-magic-string...").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.bin");
        store(&path, &HashMap::new()).unwrap();
        assert!(load(&path).unwrap().is_empty());
    }
}
