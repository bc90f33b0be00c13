//! Mask helpers.

/// Expand a bare nick into a full `nick!user@host` mask.
///
/// `alice` becomes `alice!*@*`; masks that already carry `!` or `@`
/// parts are only completed, never rewritten.
pub fn expand_userhost(mask: &str) -> String {
    let mut expanded = mask.to_string();
    if !expanded.contains('!') {
        expanded.push_str("!*");
    }
    if !expanded.contains('@') {
        expanded.push_str("@*");
    }
    expanded
}

/// Translate a glob mask into an anchored regex fragment.
///
/// Literal parts are meta-escaped; `*` maps to `.*` and `?` to `.`.
/// The caller anchors and joins fragments.
pub fn wildcard_to_regex(mask: &str) -> String {
    let mut out = String::with_capacity(mask.len() + 8);
    for c in mask.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if regex_syntax_meta(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn regex_syntax_meta(c: char) -> bool {
    matches!(
        c,
        '\\' | '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '#' | '-'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_bare_nick() {
        assert_eq!(expand_userhost("alice"), "alice!*@*");
        assert_eq!(expand_userhost("alice!*"), "alice!*@*");
        assert_eq!(expand_userhost("a!b@c"), "a!b@c");
    }

    #[test]
    fn escapes_meta_and_maps_wildcards() {
        assert_eq!(wildcard_to_regex("a*b"), "a.*b");
        assert_eq!(wildcard_to_regex("a?c"), "a.c");
        assert_eq!(wildcard_to_regex("x[y]"), "x\\[y\\]");
    }
}
