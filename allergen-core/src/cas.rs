//! CAS registry number extraction from free cell text

use regex::Regex;
use std::sync::OnceLock;

fn cas_pattern() -> &'static Regex {
    static CAS_PATTERN: OnceLock<Regex> = OnceLock::new();
    CAS_PATTERN.get_or_init(|| Regex::new(r"[0-9]{2,7}-[0-9]{2}-[0-9]").unwrap())
}

/// Find every CAS number embedded in `text`, in order of occurrence.
///
/// A CAS number is 2-7 digits, a hyphen, exactly 2 digits, a hyphen and a
/// single check digit. Matches glued to a longer run of digits on either side
/// are rejected. The check digit is not validated.
pub fn extract_cas(text: Option<&str>) -> Vec<&str> {
    let Some(text) = text else {
        return Vec::new();
    };

    let pattern = cas_pattern();
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(m) = pattern.find_at(text, pos) {
        let digit_before = m.start() > 0 && bytes[m.start() - 1].is_ascii_digit();
        let digit_after = bytes.get(m.end()).is_some_and(u8::is_ascii_digit);

        if digit_before || digit_after {
            // Matches always start on an ASCII digit, so +1 stays on a char boundary
            pos = m.start() + 1;
        } else {
            found.push(m.as_str());
            pos = m.end();
        }
    }

    found
}

/// Whether `text` is exactly one CAS number (surrounding whitespace ignored)
pub fn is_cas(text: &str) -> bool {
    let trimmed = text.trim();
    matches!(extract_cas(Some(trimmed)).as_slice(), [only] if only.len() == trimmed.len())
}
