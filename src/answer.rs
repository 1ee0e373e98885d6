//! Finalized-answer detection and numeric answer extraction.
//!
//! A solution trace is finished once it contains a closed, non-empty boxed
//! answer such as `\boxed{42}`. An empty `\boxed{}` (as used in prompts to
//! show the expected format) does not count.
//!
//! The same module pulls numeric answers out of traces and reference
//! solutions so benchmark runs can grade them.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::ANSWER_TOLERANCE;

static BOXED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\boxed\{\s*[^\s}][^}]*\}").expect("valid boxed marker regex")
});

static BOXED_CONTENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\boxed\{([^{}]+)\}").expect("valid boxed content regex"));

static HASH_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"####\s*(-?[\d,.]+)").expect("valid #### regex"));

static ANY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d*\.\d+|\d+").expect("valid number regex"));

/// Returns true if `state` contains a finalized-answer marker anywhere.
pub fn is_terminal(state: &str) -> bool {
    BOXED_MARKER.is_match(state)
}

/// Parse a number, ignoring thousands separators and dollar signs.
pub fn clean_number(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|&c| c != ',' && c != '$').collect();
    cleaned.trim().parse::<f64>().ok()
}

/// Extract the numeric answer from a solution trace.
///
/// Tries, in order: the first `\boxed{...}`, the first `#### n` marker, and
/// finally the last number appearing anywhere in the text.
pub fn extract_answer(text: &str) -> Option<f64> {
    if let Some(value) = BOXED_CONTENT
        .captures(text)
        .and_then(|c| clean_number(&c[1]))
    {
        return Some(value);
    }

    if let Some(value) = HASH_ANSWER
        .captures(text)
        .and_then(|c| clean_number(&c[1]))
    {
        return Some(value);
    }

    ANY_NUMBER
        .find_iter(text)
        .last()
        .and_then(|m| clean_number(m.as_str()))
}

/// Returns true if both answers are present and numerically equal.
pub fn is_correct(model_answer: Option<f64>, truth: Option<f64>) -> bool {
    match (model_answer, truth) {
        (Some(m), Some(t)) => (m - t).abs() < ANSWER_TOLERANCE,
        _ => false,
    }
}
