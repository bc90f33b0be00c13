//! Compiled user-mask sets.

use ferrum_proto::wildcard_to_regex;
use regex::Regex;

/// A set of `nick!user@host` glob masks with a compiled matcher.
///
/// The matcher is an anchored alternation over every mask, recompiled on
/// change: `^(m1|m2|…)$` with literal parts escaped and `*`/`?` mapped
/// to `.*`/`.`. An empty set matches nothing.
#[derive(Debug, Default)]
pub struct MaskSet {
    masks: Vec<String>,
    regex: Option<Regex>,
}

impl MaskSet {
    /// Create an empty set.
    pub fn new() -> MaskSet {
        MaskSet::default()
    }

    /// Add a mask. Returns false if it was already present.
    pub fn add(&mut self, mask: &str) -> bool {
        if self.masks.iter().any(|m| m == mask) {
            return false;
        }
        self.masks.push(mask.to_string());
        self.rebuild();
        true
    }

    /// Remove a mask. Returns false if it was not present.
    pub fn remove(&mut self, mask: &str) -> bool {
        let before = self.masks.len();
        self.masks.retain(|m| m != mask);
        if self.masks.len() == before {
            return false;
        }
        self.rebuild();
        true
    }

    /// Match a concrete `nick!user@host` against the set.
    pub fn matches(&self, userhost: &str) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|re| re.is_match(userhost))
    }

    /// Iterate the raw masks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.masks.iter().map(String::as_str)
    }

    /// Number of masks.
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// True when no masks are stored.
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    fn rebuild(&mut self) {
        if self.masks.is_empty() {
            self.regex = None;
            return;
        }
        let alternation: Vec<String> = self
            .masks
            .iter()
            .map(|m| wildcard_to_regex(m))
            .collect();
        let expr = format!("^(?:{})$", alternation.join("|"));
        self.regex = Regex::new(&expr).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_matches_nothing() {
        let set = MaskSet::new();
        assert!(!set.matches("a!b@c"));
    }

    #[test]
    fn literal_and_wildcard_masks() {
        let mut set = MaskSet::new();
        assert!(set.add("a!b@c"));
        assert!(set.add("*!*@evil.example"));
        assert!(set.matches("a!b@c"));
        assert!(set.matches("x!y@evil.example"));
        assert!(!set.matches("a!b@cd"));
        assert!(!set.matches("x!y@good.example"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let mut set = MaskSet::new();
        set.add("nick?!*@*");
        assert!(set.matches("nick1!u@h"));
        assert!(!set.matches("nick!u@h"));
        assert!(!set.matches("nick12!u@h"));
    }

    #[test]
    fn remove_recompiles() {
        let mut set = MaskSet::new();
        set.add("a!b@c");
        assert!(set.remove("a!b@c"));
        assert!(!set.remove("a!b@c"));
        assert!(!set.matches("a!b@c"));
        assert!(set.is_empty());
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut set = MaskSet::new();
        assert!(set.add("a!*@*"));
        assert!(!set.add("a!*@*"));
        assert_eq!(set.len(), 1);
    }
}
