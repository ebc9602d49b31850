//! Reward text recognition and normalisation.

use std::sync::LazyLock;

use regex::Regex;

const MILES_PER_MULTIPLIER: f64 = 1000.0;

/// Marks sites sprinkle around reward text for footnotes and emphasis.
pub const DEFAULT_DECORATIVE_MARKS: &[char] = &['*', '†', '‡', '§', '®', '™'];

static MULTIPLIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*x\s+miles").expect("multiplier pattern is valid")
});

static MAGNITUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:up\s+to\s+)?(\d{1,3}(?:,\d{3})+|\d+)\s*miles").expect("magnitude pattern is valid")
});

pub fn strip_decorations(text: &str, marks: &[char]) -> String {
    text.chars().filter(|ch| !marks.contains(ch)).collect()
}

/// Normalised reward value using the default decorative marks.
///
/// `"5X miles"` is 5000, `"Up to 60,000 miles"` is 60000, anything unrecognised is 0.
pub fn parse_reward(text: &str) -> u64 {
    parse_reward_with(text, DEFAULT_DECORATIVE_MARKS)
}

pub fn parse_reward_with(text: &str, marks: &[char]) -> u64 {
    let clean = strip_decorations(text, marks);

    if let Some(caps) = MULTIPLIER_RE.captures(&clean) {
        let factor: f64 = caps[1].parse().unwrap_or(0.0);
        let miles = (factor * MILES_PER_MULTIPLIER).round();
        return if miles.is_finite() && miles >= 0.0 && miles < u64::MAX as f64 {
            miles as u64
        } else {
            0
        };
    }

    MAGNITUDE_RE
        .captures(&clean)
        .and_then(|caps| caps[1].replace(',', "").parse().ok())
        .unwrap_or(0)
}

/// The substring of `text` that looks like a reward, multiplier form first.
pub fn find_reward_span<'a>(text: &'a str, marks: &[char]) -> Option<&'a str> {
    let clean = strip_decorations(text, marks);
    if !MULTIPLIER_RE.is_match(&clean) && !MAGNITUDE_RE.is_match(&clean) {
        return None;
    }

    MULTIPLIER_RE
        .find(text)
        .or_else(|| MAGNITUDE_RE.find(text))
        .map(|m| m.as_str())
        .or(Some(text.trim()))
}
