//! Connected users.

use std::collections::HashSet;
use std::time::Instant;

use ferrum_proto::Prefix;

use crate::state::Uid;

/// User mode flags.
#[derive(Debug, Default, Clone)]
pub struct UserFlags {
    /// `+i`
    pub invisible: bool,
    /// `+o` IRC operator
    pub oper: bool,
    /// `+w` receives WALLOPS
    pub wallops: bool,
    /// `+r` authenticated via SASL
    pub registered: bool,
    /// `+z` connection is TLS
    pub secure_conn: bool,
    /// `+Z` only speaks with secure peers
    pub secure_only: bool,
    /// `+x` hostname cloaked
    pub cloaked: bool,
}

impl UserFlags {
    /// Render as `+letters`, empty string when no flags are set.
    pub fn mode_string(&self) -> String {
        let mut s = String::new();
        for (set, c) in [
            (self.invisible, 'i'),
            (self.oper, 'o'),
            (self.wallops, 'w'),
            (self.registered, 'r'),
            (self.secure_conn, 'z'),
            (self.secure_only, 'Z'),
            (self.cloaked, 'x'),
        ] {
            if set {
                s.push(c);
            }
        }
        if s.is_empty() {
            s
        } else {
            format!("+{}", s)
        }
    }
}

/// A registered client.
#[derive(Debug)]
pub struct User {
    /// Connection id.
    pub uid: Uid,
    /// Current nickname (case-preserved).
    pub nick: String,
    /// Username from USER.
    pub username: String,
    /// Realname from USER.
    pub realname: String,
    /// Resolved hostname (or textual address).
    pub hostname: String,
    /// SHA-256 hex cloak of the hostname, shown when `+x` is set.
    pub hostmask: String,
    /// Away message, if marked away.
    pub away: Option<String>,
    /// User modes.
    pub flags: UserFlags,
    /// Negotiated IRCv3 capabilities.
    pub caps: HashSet<String>,
    /// Signon time (unix seconds).
    pub signon: i64,
    /// Last command activity, for WHOIS idle.
    pub atime: Instant,
    /// Folded names of joined channels.
    pub channels: HashSet<String>,
}

impl User {
    /// The visible `nick!user@host` prefix; the cloak replaces the
    /// hostname when `+x` is set.
    pub fn prefix(&self) -> Prefix {
        let host = if self.flags.cloaked {
            self.hostmask.clone()
        } else {
            self.hostname.clone()
        };
        Prefix::Nickname(self.nick.clone(), self.username.clone(), host)
    }

    /// The non-cloaked `nick!user@host`, used for mask matching.
    pub fn userhost(&self) -> String {
        format!("{}!{}@{}", self.nick, self.username, self.hostname)
    }

    /// Seconds since the last command.
    pub fn idle_seconds(&self) -> u64 {
        self.atime.elapsed().as_secs()
    }
}
