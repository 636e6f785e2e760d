//! Phone number extraction and canonicalization
//!
//! Only North American numbers are recognized. The canonical form used as the
//! registry key is eleven digits with the leading country code `1`.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Recognized formats, tried in order; the first pattern with a match wins.
const PATTERNS: [&str; 4] = [
    r"\+1-\d{3}-\d{3}-\d{4}\b",
    r"\b1?\d{10}\b",
    r"\b\d{3}-\d{3}-\d{4}\b",
    r"\(\d{3}\)\s*\d{3}-\d{4}\b",
];

static PHONE_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect());

/// A canonicalized phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber {
    digits: String,
}

impl PhoneNumber {
    /// Normalize raw text to a phone number.
    ///
    /// Ten digits gain the `1` country code; eleven digits are accepted only
    /// when they already start with `1`.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        match digits.len() {
            10 => Some(Self {
                digits: format!("1{digits}"),
            }),
            11 if digits.starts_with('1') => Some(Self { digits }),
            _ => None,
        }
    }

    /// Eleven-digit registry key, e.g. `15551234567`
    pub fn canonical(&self) -> &str {
        &self.digits
    }

    fn group(&self, range: std::ops::Range<usize>) -> &str {
        self.digits.get(range).unwrap_or_default()
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+1-{}-{}-{}",
            self.group(1..4),
            self.group(4..7),
            self.group(7..11)
        )
    }
}

/// Find the first phone number in free text
pub fn extract_phone_number(text: &str) -> Option<PhoneNumber> {
    PHONE_PATTERNS
        .iter()
        .find_map(|re| re.find(text))
        .and_then(|m| PhoneNumber::parse(m.as_str()))
}

/// Strip every recognized number from `text`, collapsing leftover whitespace
pub fn remove_phone_numbers(text: &str) -> String {
    let stripped = PHONE_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, " ").into_owned());
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
