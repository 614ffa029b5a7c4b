//! Competitive-programming checker message parser (spec §4.D).

use regex::Regex;

/// What a checker's message resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    /// A score in `[0, 100]`.
    Score(f64),
    /// The checker signaled an unrecoverable condition (`FAIL`) or the message couldn't be
    /// understood at all.
    JudgementFailed(String),
}

lazy_static! {
    static ref POINTS_RE: Regex = Regex::new(r"(?i)^points\s+(\d+(?:\.\d+)?)").unwrap();
    static ref PARTIAL_RE: Regex = Regex::new(r"(?i)^partially correct\s*\((\d+(?:\.\d+)?)\)").unwrap();
}

/// Classify a checker message by its prefix (spec §4.D):
/// - `ok` ⇒ 100
/// - `wrong answer` / `wrong output format` ⇒ 0
/// - `points N` (N ∈ [0,100]) ⇒ N
/// - `partially correct (N)` (N ∈ [0,200]) ⇒ ⌊N/2⌋
/// - `FAIL` ⇒ judgement-failed with the message
/// - anything else ⇒ judgement-failed with a "couldn't parse" prefix
pub fn parse_checker_message(message: &str) -> ParsedMessage {
    let trimmed = message.trim();
    let lower = trimmed.to_lowercase();

    if lower.starts_with("ok") {
        return ParsedMessage::Score(100.0);
    }
    if lower.starts_with("wrong answer") || lower.starts_with("wrong output format") {
        return ParsedMessage::Score(0.0);
    }
    if let Some(caps) = POINTS_RE.captures(trimmed) {
        let points: f64 = caps[1].parse().unwrap_or(0.0);
        if (0.0..=100.0).contains(&points) {
            return ParsedMessage::Score(points);
        }
        return ParsedMessage::JudgementFailed(format!(
            "Couldn't parse checker message: points {points} out of range [0,100]"
        ));
    }
    if let Some(caps) = PARTIAL_RE.captures(trimmed) {
        let points: f64 = caps[1].parse().unwrap_or(0.0);
        if (0.0..=200.0).contains(&points) {
            return ParsedMessage::Score((points / 2.0).floor());
        }
        return ParsedMessage::JudgementFailed(format!(
            "Couldn't parse checker message: partially correct ({points}) out of range [0,200]"
        ));
    }
    if trimmed.starts_with("FAIL") {
        return ParsedMessage::JudgementFailed(trimmed.to_string());
    }
    ParsedMessage::JudgementFailed(format!("Couldn't parse checker message: {trimmed:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok() {
        assert_eq!(parse_checker_message("ok, correct answer"), ParsedMessage::Score(100.0));
    }

    #[test]
    fn parses_wrong_answer() {
        assert_eq!(parse_checker_message("wrong answer x"), ParsedMessage::Score(0.0));
    }

    #[test]
    fn parses_points() {
        assert_eq!(parse_checker_message("points 73"), ParsedMessage::Score(73.0));
    }

    #[test]
    fn parses_partially_correct() {
        assert_eq!(
            parse_checker_message("partially correct (150)"),
            ParsedMessage::Score(75.0)
        );
    }

    #[test]
    fn fail_is_judgement_failed() {
        assert!(matches!(
            parse_checker_message("FAIL something went wrong"),
            ParsedMessage::JudgementFailed(_)
        ));
    }

    #[test]
    fn gibberish_is_judgement_failed_with_prefix() {
        match parse_checker_message("gibberish") {
            ParsedMessage::JudgementFailed(msg) => assert!(msg.starts_with("Couldn't parse")),
            other => panic!("expected JudgementFailed, got {other:?}"),
        }
    }
}
