//! Free-text sanitization.

/// Strip CR, LF and NUL from user-supplied text.
///
/// Applied to topics, messages, realnames and quit reasons before they
/// enter the shared state; these bytes would otherwise let a client
/// inject protocol lines.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_breaks() {
        assert_eq!(sanitize_text("a\r\nb\0c"), "abc");
        assert_eq!(sanitize_text("plain text"), "plain text");
    }
}
