//! Query token escaping.
//!
//! RediSearch treats a wide set of punctuation as syntax; literal values
//! interpolated into a query string get each reserved character prefixed
//! with a backslash. Total over all inputs - any string is escapable.

/// Characters the query engine reserves.
const RESERVED: &[char] = &[
    ',', '.', '<', '>', '{', '}', '[', ']', '\\', '"', '\'', ':', ';', '!', '@', '#', '$', '%',
    '^', '&', '*', '(', ')', '-', '+', '=', '~', ' ',
];

/// Escape a literal value for interpolation into a query string.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(escape("alice"), "alice");
        assert_eq!(escape("01HXYZ"), "01HXYZ");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn test_spaces_and_periods() {
        assert_eq!(escape("Andrew the Michael"), "Andrew\\ the\\ Michael");
        assert_eq!(escape("a.b"), "a\\.b");
    }

    #[test]
    fn test_email_like_values() {
        assert_eq!(escape("a@example.com"), "a\\@example\\.com");
    }

    #[test]
    fn test_backslash_is_escaped() {
        assert_eq!(escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_every_reserved_char_is_prefixed() {
        for &c in RESERVED {
            let escaped = escape(&c.to_string());
            assert_eq!(escaped, format!("\\{c}"), "char {c:?}");
        }
    }
}
