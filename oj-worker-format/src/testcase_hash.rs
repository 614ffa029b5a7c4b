//! Testcase hash computation (spec §4.G): the identity a result is cached/reported under.
//!
//! The hash combines everything that can change a testcase's outcome without changing its
//! declared position in the plan: the effective limits, the content of every file the run
//! touches, and the checker's/interactor's stable metadata. The testcase's *filename* is
//! deliberately left out, so renaming a testdata file without changing its content doesn't
//! invalidate previously reported results.

use std::collections::BTreeMap;

use oj_worker_dag::ExecutionLimits;
use oj_worker_store::FileStoreKey;
use sha2::{Digest, Sha256};

use crate::checker::{CheckerDescriptor, InteractorDescriptor};

/// Stable identifier for one testcase's grading inputs, used as the key in a submission's
/// progress snapshot (spec §6 `testcaseResult`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TestcaseHash(#[serde(with = "hex_array")] [u8; 32]);

impl TestcaseHash {
    /// Combine the effective limits, the testdata files a testcase reads, and the
    /// checker/interactor's stable metadata into one content hash.
    pub fn compute(
        limits: ExecutionLimits,
        input: Option<&FileStoreKey>,
        output: Option<&FileStoreKey>,
        checker: Option<&CheckerDescriptor>,
        interactor: Option<&InteractorDescriptor>,
    ) -> TestcaseHash {
        let mut hasher = Sha256::new();
        hasher.update(bincode::serialize(&limits).expect("ExecutionLimits always serializes"));
        if let Some(key) = input {
            hasher.update(key.to_hex().as_bytes());
        }
        if let Some(key) = output {
            hasher.update(key.to_hex().as_bytes());
        }
        if let Some(checker) = checker {
            hasher.update(bincode::serialize(checker).expect("CheckerDescriptor always serializes"));
        }
        if let Some(interactor) = interactor {
            hasher.update(
                bincode::serialize(interactor).expect("InteractorDescriptor always serializes"),
            );
        }
        TestcaseHash(hasher.finalize().into())
    }
}

/// Testdata manifest reduced to the subset actually referenced by a judging plan, so hashing
/// doesn't need the full store.
pub type ContentLookup<'a> = BTreeMap<&'a str, &'a FileStoreKey>;

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        serializer.serialize_str(&hex)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let hex = String::deserialize(deserializer)?;
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(serde::de::Error::custom))
            .collect::<Result<Vec<u8>, D::Error>>()?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected a 32-byte hash"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_hash_identically() {
        let limits = ExecutionLimits::new(1000, 256 << 20);
        let input = FileStoreKey::from_bytes(b"input");
        let a = TestcaseHash::compute(limits, Some(&input), None, None, None);
        let b = TestcaseHash::compute(limits, Some(&input), None, None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn different_limits_hash_differently() {
        let input = FileStoreKey::from_bytes(b"input");
        let a = TestcaseHash::compute(ExecutionLimits::new(1000, 256 << 20), Some(&input), None, None, None);
        let b = TestcaseHash::compute(ExecutionLimits::new(2000, 256 << 20), Some(&input), None, None, None);
        assert_ne!(a, b);
    }
}
