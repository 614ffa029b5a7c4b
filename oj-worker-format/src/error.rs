//! Error taxonomy of the judging pipeline (spec §7).

use thiserror::Error;

/// Everything that can terminate a submission's judging, beyond a normal per-testcase result.
///
/// Callers match on the variant to decide the terminal progress status sent to the dispatcher;
/// only [`JudgeError::System`] carries an opaque `anyhow::Error` for the catch-all case.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The submission's task was canceled; no further progress is reported (spec §7).
    #[error("canceled")]
    Canceled,

    /// The judging plan, testdata manifest, or checker/interactor configuration is invalid.
    #[error("{0}")]
    Configuration(String),

    /// The user program failed to compile.
    #[error("compilation failed: {0}")]
    Compilation(String),

    /// A checker or interactor misbehaved: crashed, produced an unparseable message, or returned
    /// a score out of range.
    #[error("judgement failed: {0}")]
    JudgementFailed(String),

    /// Anything unexpected: I/O errors, a sandbox `Unknown` status, a lost acknowledgment.
    #[error(transparent)]
    System(#[from] anyhow::Error),
}

impl JudgeError {
    /// A `Configuration` error with a formatted message, the common constructor for plan/checker
    /// validation failures.
    pub fn configuration(message: impl Into<String>) -> Self {
        JudgeError::Configuration(message.into())
    }

    /// A `JudgementFailed` error with a formatted message.
    pub fn judgement_failed(message: impl Into<String>) -> Self {
        JudgeError::JudgementFailed(message.into())
    }
}

/// A possibly-truncated, user-visible string (GLOSSARY "omittable string"), tagged with how many
/// bytes were cut off. Every large user-visible field (compiler message, testcase
/// input/output/stderr previews, checker message) is one of these (spec §7).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Truncated {
    /// The (possibly truncated) content, always a valid prefix of the original.
    pub content: String,
    /// Number of bytes omitted from the end. Zero means the content wasn't truncated.
    pub omitted: u64,
}

impl Truncated {
    /// Clip `content` to at most `limit` bytes, preserving the prefix and recording how much was
    /// cut off. Truncation happens on a UTF-8 boundary, never splitting a multi-byte character.
    pub fn clip(content: &[u8], limit: usize) -> Truncated {
        if content.len() <= limit {
            return Truncated {
                content: String::from_utf8_lossy(content).into_owned(),
                omitted: 0,
            };
        }
        let mut cut = limit;
        while cut > 0 && !content.is_char_boundary(cut) {
            cut -= 1;
        }
        Truncated {
            content: String::from_utf8_lossy(&content[..cut]).into_owned(),
            omitted: (content.len() - cut) as u64,
        }
    }

    /// Build a `Truncated` from a string that's already known to fit, with no omission.
    pub fn whole(content: impl Into<String>) -> Truncated {
        Truncated {
            content: content.into(),
            omitted: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_short_content_whole() {
        let t = Truncated::clip(b"hello", 100);
        assert_eq!(t.content, "hello");
        assert_eq!(t.omitted, 0);
    }

    #[test]
    fn clip_truncates_and_counts_omitted_bytes() {
        let t = Truncated::clip(b"hello world", 5);
        assert_eq!(t.content, "hello");
        assert_eq!(t.omitted, 6);
    }

    #[test]
    fn clip_never_splits_a_utf8_character() {
        let content = "a€€".as_bytes(); // 'a' (1 byte) + two 3-byte euro signs
        let t = Truncated::clip(content, 3);
        assert_eq!(t.content, "a");
        assert_eq!(t.omitted, (content.len() - 1) as u64);
    }
}
