//! Reusable field filters
//!
//! These filters normalize field values before validation and persistence

use regex::Regex;
use std::sync::OnceLock;

/// Filter: trim whitespace from string
pub fn trim(value: &str) -> String {
    value.trim().to_string()
}

/// Filter: convert string to lowercase
pub fn lowercase(value: &str) -> String {
    value.to_lowercase()
}

/// Filter: trim in place when present
pub fn trim_opt(value: &mut Option<String>) {
    if let Some(s) = value.as_mut() {
        *s = trim(s);
    }
}

/// Filter: round number to specified decimal places
pub fn round_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn non_slug_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"))
}

/// Filter: URL slug of a display name (`The Forest Hiker` → `the-forest-hiker`)
pub fn slugify(value: &str) -> String {
    non_slug_chars()
        .replace_all(&value.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // === trim() ===

    #[test]
    fn test_trim_removes_whitespace() {
        assert_eq!(trim("  hello  "), "hello");
    }

    #[test]
    fn test_trim_opt_none_unchanged() {
        let mut value: Option<String> = None;
        trim_opt(&mut value);
        assert!(value.is_none());
    }

    // === lowercase() ===

    #[test]
    fn test_lowercase_converts_string() {
        assert_eq!(lowercase("Hello@WORLD.com"), "hello@world.com");
    }

    // === round_decimals() ===

    #[test]
    fn test_round_decimals_one_place() {
        assert_eq!(round_decimals(4.666666, 1), 4.7);
    }

    #[test]
    fn test_round_decimals_negative_number() {
        assert_eq!(round_decimals(-3.456, 1), -3.5);
    }

    // === slugify() ===

    #[test]
    fn test_slugify_name() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
    }

    #[test]
    fn test_slugify_collapses_punctuation() {
        assert_eq!(slugify("  Sea & Sun -- Explorer! "), "sea-sun-explorer");
    }
}
