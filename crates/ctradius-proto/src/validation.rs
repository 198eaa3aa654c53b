//! Cleartext password validation
//!
//! The RADIUS server parses the script output as `Attribute := "value"` lines.
//! Quotes, backslashes, whitespace and control characters inside a value can
//! end the assignment early or inject further attributes, so passwords are
//! restricted to an allow-list instead of being escaped.

/// Symbols permitted in a cleartext password besides ASCII letters and digits
pub const ALLOWED_SYMBOLS: &str = "!@$%&*-_+=?.";

fn is_allowed_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ALLOWED_SYMBOLS.contains(ch)
}

/// Returns true if every character of `value` is on the allow-list.
///
/// The empty string is vacuously allowed; callers that need a non-empty
/// password check that separately.
pub fn is_allowed_password(value: &str) -> bool {
    value.chars().all(is_allowed_char)
}

/// Distinct disallowed characters of `value`, in order of first appearance
pub fn invalid_chars(value: &str) -> Vec<char> {
    let mut found = Vec::new();
    for ch in value.chars() {
        if !is_allowed_char(ch) && !found.contains(&ch) {
            found.push(ch);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_digits_and_symbols_allowed() {
        assert!(is_allowed_password("abcXYZ019"));
        assert!(is_allowed_password("!@$%&*-_+=?."));
        assert!(is_allowed_password("Good_Pass123!"));
        assert!(is_allowed_password(""));
    }

    #[test]
    fn test_injection_characters_rejected() {
        for bad in [
            "bad\"pass", "bad#pass", "bad\npass", "bad pass", "bad'pass", "bad\\pass",
            "bad\tpass", "bad\0pass", "bad;pass", "bad{pass}", "bad|pass", "bad:pass",
        ] {
            assert!(!is_allowed_password(bad), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert!(!is_allowed_password("pässwort"));
        assert!(!is_allowed_password("pass\u{200b}word"));
    }

    #[test]
    fn test_invalid_chars_deduplicated() {
        assert_eq!(invalid_chars("a\"b\"c#"), vec!['"', '#']);
        assert!(invalid_chars("fine").is_empty());
    }
}
