//! Nickname validation.

/// Maximum nickname length accepted by the daemon.
pub const NICK_MAX_LEN: usize = 32;

/// Special characters allowed in nicknames per RFC 2812.
#[inline]
fn is_special(c: char) -> bool {
    matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '|' | '}')
}

/// Extension trait for nickname validation.
pub trait NickExt {
    /// True if this string is a valid nickname: first character a letter
    /// or special, the rest letters, digits, specials or `-`, at most
    /// [`NICK_MAX_LEN`] characters.
    fn is_valid_nick(&self) -> bool;
}

impl NickExt for str {
    fn is_valid_nick(&self) -> bool {
        if self.is_empty() || self.len() > NICK_MAX_LEN {
            return false;
        }
        let mut chars = self.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return false,
        };
        if !first.is_ascii_alphabetic() && !is_special(first) {
            return false;
        }
        chars.all(|c| c.is_ascii_alphanumeric() || is_special(c) || c == '-')
    }
}

impl NickExt for String {
    fn is_valid_nick(&self) -> bool {
        self.as_str().is_valid_nick()
    }
}
