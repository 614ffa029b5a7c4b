//! Built-in checker modes (spec §4.D): `integers`, `floats(precision)`, `lines`, `binary`.
//!
//! `integers`/`floats` need real numeric parsing, which isn't expressible as a shell one-liner,
//! so they compare in-process. `lines`/`binary` are implemented the same way the teacher's own
//! `WhiteDiff` checker is (`Checker::WhiteDiff` in the grounding file): a real subprocess
//! invocation of `diff`/`cmp`, run through the checker's CPU-affinity pool like any other
//! sandboxed program, so a pathological input can't hang the worker.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Error};

/// Outcome of a built-in comparison, already in checker-message form so it composes with the
/// custom-checker path (both end up parsed the same way downstream).
pub struct BuiltInOutcome {
    pub score: f64,
    pub message: String,
}

/// `integers`: pairwise long-integer comparison; length mismatch or any differing value ⇒ 0.
pub fn check_integers(correct: &Path, test: &Path) -> Result<BuiltInOutcome, Error> {
    let correct_tokens = read_tokens(correct)?;
    let test_tokens = read_tokens(test)?;

    if correct_tokens.len() != test_tokens.len() {
        return Ok(BuiltInOutcome {
            score: 0.0,
            message: format!(
                "wrong answer expected {} token(s), found {}",
                correct_tokens.len(),
                test_tokens.len()
            ),
        });
    }
    for (i, (a, b)) in correct_tokens.iter().zip(test_tokens.iter()).enumerate() {
        let (a, b): (i64, i64) = match (a.parse(), b.parse()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                return Ok(BuiltInOutcome {
                    score: 0.0,
                    message: format!("wrong answer token {i} is not an integer"),
                })
            }
        };
        if a != b {
            return Ok(BuiltInOutcome {
                score: 0.0,
                message: format!("wrong answer token {i}: expected {a}, found {b}"),
            });
        }
    }
    Ok(BuiltInOutcome {
        score: 100.0,
        message: "ok".to_string(),
    })
}

/// `floats(precision)`: pairwise comparison accepting either absolute or relative error
/// `≤ 10^-precision`.
pub fn check_floats(correct: &Path, test: &Path, precision: u32) -> Result<BuiltInOutcome, Error> {
    let tolerance = 10f64.powi(-(precision as i32));
    let correct_tokens = read_tokens(correct)?;
    let test_tokens = read_tokens(test)?;

    if correct_tokens.len() != test_tokens.len() {
        return Ok(BuiltInOutcome {
            score: 0.0,
            message: format!(
                "wrong answer expected {} token(s), found {}",
                correct_tokens.len(),
                test_tokens.len()
            ),
        });
    }
    for (i, (a, b)) in correct_tokens.iter().zip(test_tokens.iter()).enumerate() {
        let (a, b): (f64, f64) = match (a.parse(), b.parse()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                return Ok(BuiltInOutcome {
                    score: 0.0,
                    message: format!("wrong answer token {i} is not a number"),
                })
            }
        };
        let abs_err = (a - b).abs();
        let rel_ok = abs_err <= tolerance * a.abs().max(b.abs());
        if abs_err > tolerance && !rel_ok {
            return Ok(BuiltInOutcome {
                score: 0.0,
                message: format!("wrong answer token {i}: expected {a}, found {b}"),
            });
        }
    }
    Ok(BuiltInOutcome {
        score: 100.0,
        message: "ok".to_string(),
    })
}

fn read_tokens(path: &Path) -> Result<Vec<String>, Error> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content.split_whitespace().map(str::to_string).collect())
}

/// Build the argv for the `lines`/`binary` built-ins, to be run as a sandboxed `diff`/`cmp`
/// invocation (spec §4.D); see [`classify_diff_exit`]/[`classify_cmp_exit`] for result mapping.
pub fn lines_diff_argv(case_sensitive: bool) -> Vec<String> {
    let mut argv = vec![
        "--brief".to_string(),
        "--ignore-blank-lines".to_string(),
        "--ignore-trailing-space".to_string(),
    ];
    if !case_sensitive {
        argv.push("--ignore-case".to_string());
    }
    argv.push("correct".to_string());
    argv.push("test".to_string());
    argv
}

pub fn binary_cmp_argv() -> Vec<String> {
    vec!["--silent".to_string(), "correct".to_string(), "test".to_string()]
}

/// `diff`'s exit code: 0 files equal, 1 files differ, anything else is a real failure.
pub fn classify_diff_exit(exit_code: i32) -> Result<BuiltInOutcome, Error> {
    match exit_code {
        0 => Ok(BuiltInOutcome {
            score: 100.0,
            message: "ok".to_string(),
        }),
        1 => Ok(BuiltInOutcome {
            score: 0.0,
            message: "wrong answer output differs from the correct one".to_string(),
        }),
        other => anyhow::bail!("diff exited with unexpected code {other}"),
    }
}

/// `cmp --silent`'s exit code: 0 files identical, 1 files differ, anything else a real failure.
pub fn classify_cmp_exit(exit_code: i32) -> Result<BuiltInOutcome, Error> {
    match exit_code {
        0 => Ok(BuiltInOutcome {
            score: 100.0,
            message: "ok".to_string(),
        }),
        1 => Ok(BuiltInOutcome {
            score: 0.0,
            message: "wrong answer output differs from the correct one byte-for-byte".to_string(),
        }),
        other => anyhow::bail!("cmp exited with unexpected code {other}"),
    }
}

/// Streamed byte-exact comparison used by tests/invariant checks without going through a
/// subprocess (spec §8 "binary round-trip" property).
pub fn bytes_equal(a: &Path, b: &Path) -> Result<bool, Error> {
    let mut fa = std::fs::File::open(a).with_context(|| format!("Failed to open {}", a.display()))?;
    let mut fb = std::fs::File::open(b).with_context(|| format!("Failed to open {}", b.display()))?;
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let na = fa.read(&mut buf_a)?;
        let nb = fb.read(&mut buf_b)?;
        if na != nb || buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn integers_accepts_whitespace_differences() {
        let a = write_tmp("1 2 3");
        let b = write_tmp("1\n2\n3\n");
        let outcome = check_integers(a.path(), b.path()).unwrap();
        assert_eq!(outcome.score, 100.0);
    }

    #[test]
    fn integers_rejects_length_mismatch() {
        let a = write_tmp("1 2 3");
        let b = write_tmp("1 2");
        let outcome = check_integers(a.path(), b.path()).unwrap();
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn floats_accepts_within_tolerance() {
        let a = write_tmp("1.00000");
        let b = write_tmp("1.00001");
        let outcome = check_floats(a.path(), b.path(), 3).unwrap();
        assert_eq!(outcome.score, 100.0);
    }

    #[test]
    fn floats_rejects_outside_tolerance() {
        let a = write_tmp("1.0");
        let b = write_tmp("2.0");
        let outcome = check_floats(a.path(), b.path(), 3).unwrap();
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn bytes_equal_detects_identical_files() {
        let a = write_tmp("same content");
        let b = write_tmp("same content");
        assert!(bytes_equal(a.path(), b.path()).unwrap());
    }

    #[test]
    fn bytes_equal_detects_difference() {
        let a = write_tmp("same content");
        let b = write_tmp("different");
        assert!(!bytes_equal(a.path(), b.path()).unwrap());
    }
}
