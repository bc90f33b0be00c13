//! WHOWAS history.

use ferrum_proto::irc_eq;

/// Snapshot of a destroyed client.
#[derive(Debug, Clone)]
pub struct WhoWas {
    /// Nickname at destruction (case-preserved).
    pub nick: String,
    /// Username.
    pub username: String,
    /// Hostname.
    pub hostname: String,
    /// Realname.
    pub realname: String,
}

/// Fixed-capacity ring of [`WhoWas`] snapshots, newest overwriting
/// oldest, searched newest-first.
#[derive(Debug)]
pub struct WhoWasList {
    buffer: Vec<Option<WhoWas>>,
    start: usize,
    end: usize,
}

impl WhoWasList {
    /// Create a ring holding at most `size` entries.
    pub fn new(size: usize) -> WhoWasList {
        WhoWasList {
            buffer: vec![None; size.max(2)],
            start: 0,
            end: 0,
        }
    }

    /// Record a snapshot, evicting the oldest when full.
    pub fn append(&mut self, entry: WhoWas) {
        self.buffer[self.end] = Some(entry);
        self.end = (self.end + 1) % self.buffer.len();
        if self.end == self.start {
            self.start = (self.start + 1) % self.buffer.len();
        }
    }

    /// Find up to `limit` entries for `nick` (RFC 1459 equality),
    /// newest first. A `limit` of 0 means no limit.
    pub fn find(&self, nick: &str, limit: usize) -> Vec<WhoWas> {
        let mut results = Vec::new();
        for entry in self.iter_reverse() {
            if !irc_eq(&entry.nick, nick) {
                continue;
            }
            results.push(entry.clone());
            if limit > 0 && results.len() >= limit {
                break;
            }
        }
        results
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        (self.end + self.buffer.len() - self.start) % self.buffer.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn iter_reverse(&self) -> impl Iterator<Item = &WhoWas> {
        let len = self.len();
        let cap = self.buffer.len();
        (1..=len).filter_map(move |i| {
            let idx = (self.end + cap - i) % cap;
            self.buffer[idx].as_ref()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(nick: &str) -> WhoWas {
        WhoWas {
            nick: nick.into(),
            username: "u".into(),
            hostname: "h".into(),
            realname: "r".into(),
        }
    }

    #[test]
    fn finds_newest_first() {
        let mut list = WhoWasList::new(10);
        list.append(entry("alice"));
        list.append(entry("bob"));
        list.append(entry("alice"));
        let found = list.find("ALICE", 0);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn limit_stops_iteration() {
        let mut list = WhoWasList::new(10);
        for _ in 0..5 {
            list.append(entry("alice"));
        }
        assert_eq!(list.find("alice", 2).len(), 2);
    }

    #[test]
    fn ring_keeps_only_newest() {
        let mut list = WhoWasList::new(3);
        for i in 0..10 {
            list.append(entry(&format!("n{}", i)));
        }
        assert!(list.len() < 3 + 1);
        assert!(list.find("n0", 0).is_empty());
        assert_eq!(list.find("n9", 0).len(), 1);
    }
}
