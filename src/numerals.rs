//! Locale-aware numeral handling.
//!
//! Source documents mix Western digits with Arabic-Indic (`٠`–`٩`) and Eastern-Arabic
//! (`۰`–`۹`) forms, and may use the Arabic thousands (`٬`) and decimal (`٫`) separators.
//! Everything numeric in the pipeline goes through [`parse_number_safe`], which never fails.

use once_cell::sync::Lazy;
use regex::Regex;

const ARABIC_THOUSANDS_SEPARATOR: char = '\u{066C}';
const ARABIC_DECIMAL_SEPARATOR: char = '\u{066B}';
const MINUS_SIGN: char = '\u{2212}';

static PLAIN_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("plain number pattern"));

/// Map a single Arabic-Indic or Eastern-Arabic digit to its Western equivalent.
fn western_digit(c: char) -> Option<char> {
    let value = match c {
        '\u{0660}'..='\u{0669}' => c as u32 - 0x0660,
        '\u{06F0}'..='\u{06F9}' => c as u32 - 0x06F0,
        _ => return None,
    };
    char::from_digit(value, 10)
}

/// Replace Arabic-Indic/Eastern-Arabic digits and Arabic separators with Western forms.
///
/// Every other character is left untouched, so the result can still carry currency
/// symbols or unit suffixes for the caller to strip.
pub fn normalize_numeral(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ARABIC_THOUSANDS_SEPARATOR => ',',
            ARABIC_DECIMAL_SEPARATOR => '.',
            MINUS_SIGN => '-',
            _ => western_digit(c).unwrap_or(c),
        })
        .collect()
}

/// Parse a numeric cell, degrading to `0.0` on anything unparseable.
///
/// Thousands separators and any residual character other than digits and `.` are
/// dropped; a leading `-` keeps the value negative.
pub fn parse_number_safe(value: &str) -> f64 {
    let normalized = normalize_numeral(value);
    let trimmed = normalized.trim();
    let negative = trimmed.starts_with('-');

    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if digits.is_empty() {
        return 0.0;
    }

    match digits.parse::<f64>() {
        Ok(n) if n.is_finite() => {
            if negative {
                -n
            } else {
                n
            }
        }
        _ => 0.0,
    }
}

/// True when the text (after numeral normalisation) is a bare integer or decimal.
pub fn is_plain_number(text: &str) -> bool {
    PLAIN_NUMBER.is_match(normalize_numeral(text).trim())
}
