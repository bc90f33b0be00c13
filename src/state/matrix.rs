//! The Matrix - central shared state for the daemon.
//!
//! Holds every connected user, nickname claim, channel and reply-queue
//! sender in concurrent maps.
//!
//! # Lock order (deadlock prevention)
//!
//! 1. DashMap shard lock (during `.get()` / iteration)
//! 2. Channel `RwLock`
//! 3. User `RwLock`
//!
//! Never acquire in reverse. The `senders` map is a leaf: entries are
//! only ever touched last, and sending on an unbounded queue never
//! blocks, so enqueueing while holding a channel lock is safe (and is
//! what gives per-channel broadcasts their ordering guarantee).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use ferrum_proto::{irc_to_lower, Message};
use regex::Regex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::state::{Channel, Uid, UidGenerator, User, WhoWasList};

/// Static server identity.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Server name from the config.
    pub name: String,
    /// Network name from the config.
    pub network: String,
    /// Creation time (unix seconds).
    pub created: i64,
    /// Version string advertised in 002/351.
    pub version: String,
}

/// Config-derived state replaced wholesale by REHASH.
#[derive(Debug, Default)]
pub struct SharedConfig {
    /// Server description (004/WHOIS server info).
    pub description: String,
    /// MOTD file path, if any.
    pub motd: Option<String>,
    /// Decoded bcrypt hash for the server password, if set.
    pub password: Option<Vec<u8>>,
    /// Operator name to decoded bcrypt hash.
    pub operators: HashMap<String, Vec<u8>>,
    /// SASL account name to decoded bcrypt hash.
    pub accounts: HashMap<String, Vec<u8>>,
}

/// Central shared state.
pub struct Matrix {
    /// All registered users by Uid.
    pub users: DashMap<Uid, Arc<RwLock<User>>>,
    /// Folded nickname to Uid.
    pub nicks: DashMap<String, Uid>,
    /// Folded channel name to channel.
    pub channels: DashMap<String, Arc<RwLock<Channel>>>,
    /// Reply queues by Uid.
    pub senders: DashMap<Uid, UnboundedSender<Message>>,
    /// Forced-quit signals by Uid (KILL, shutdown).
    pub kills: DashMap<Uid, UnboundedSender<String>>,
    /// Ring of destroyed-client snapshots.
    pub whowas: Mutex<WhoWasList>,
    /// Uid source.
    pub uids: UidGenerator,
    /// Static identity.
    pub server: ServerInfo,
    /// Rehashable config material.
    pub shared: std::sync::RwLock<SharedConfig>,
    /// Path the config was loaded from, re-read on REHASH.
    pub config_path: std::path::PathBuf,
    /// Raw connection count (including unregistered).
    pub connections: AtomicI64,
}

impl Matrix {
    /// Build the Matrix from a loaded config.
    pub fn new(config: &Config) -> Matrix {
        Matrix {
            users: DashMap::new(),
            nicks: DashMap::new(),
            channels: DashMap::new(),
            senders: DashMap::new(),
            kills: DashMap::new(),
            whowas: Mutex::new(WhoWasList::new(100)),
            uids: UidGenerator::new(),
            server: ServerInfo {
                name: config.server.name.clone(),
                network: config.network.name.clone(),
                created: chrono::Utc::now().timestamp(),
                version: format!("ferrumd-{}", env!("CARGO_PKG_VERSION")),
            },
            shared: std::sync::RwLock::new(config.shared_config()),
            config_path: config.filename.clone(),
            connections: AtomicI64::new(0),
        }
    }

    /// Reload the config file and swap in the rehashable parts.
    pub fn rehash(&self) -> Result<(), crate::config::ConfigError> {
        let config = Config::load(&self.config_path)?;
        *self.shared.write().expect("shared config") = config.shared_config();
        Ok(())
    }

    /// Look up a user by nickname (RFC 1459 folded).
    pub fn user_by_nick(&self, nick: &str) -> Option<Arc<RwLock<User>>> {
        let uid = *self.nicks.get(&irc_to_lower(nick))?;
        self.users.get(&uid).map(|u| u.clone())
    }

    /// Claim a nickname for `uid`. Fails when another connection holds
    /// the folded name.
    pub fn claim_nick(&self, nick: &str, uid: Uid) -> bool {
        let folded = irc_to_lower(nick);
        match self.nicks.entry(folded) {
            dashmap::mapref::entry::Entry::Occupied(e) => *e.get() == uid,
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(uid);
                true
            }
        }
    }

    /// Release a nickname, but only if `uid` still owns it. Guards
    /// against racing nick changes.
    pub fn release_nick(&self, nick: &str, uid: Uid) -> bool {
        self.nicks
            .remove_if(&irc_to_lower(nick), |_, owner| *owner == uid)
            .is_some()
    }

    /// Enqueue a message for one client. Returns false when the client
    /// is already gone; fanout callers log and continue.
    pub fn send_to(&self, uid: Uid, msg: Message) -> bool {
        match self.senders.get(&uid) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Ask a connection to tear itself down.
    pub fn request_quit(&self, uid: Uid, reason: &str) {
        if let Some(tx) = self.kills.get(&uid) {
            let _ = tx.send(reason.to_string());
        }
    }

    /// All registered users whose non-cloaked `nick!user@host` matches
    /// the mask. Bare nicks expand to `nick!*@*`; `*`/`?` wildcards
    /// compile to an anchored regex.
    pub async fn find_all(&self, mask: &str) -> Vec<Arc<RwLock<User>>> {
        let expanded = ferrum_proto::expand_userhost(mask);
        let expr = format!("^{}$", ferrum_proto::wildcard_to_regex(&expanded));
        let Ok(re) = Regex::new(&expr) else {
            return Vec::new();
        };

        let candidates: Vec<Arc<RwLock<User>>> =
            self.users.iter().map(|e| e.value().clone()).collect();
        let mut matches = Vec::new();
        for user in candidates {
            let hit = {
                let u = user.read().await;
                re.is_match(&u.userhost())
            };
            if hit {
                matches.push(user);
            }
        }
        matches
    }

    /// Remove a channel that has emptied. The emptiness re-check runs
    /// under a non-blocking write attempt so a concurrent joiner who
    /// already holds (or is waiting on) the channel lock keeps it alive.
    pub fn drop_channel_if_empty(&self, folded: &str) -> bool {
        let removed = self
            .channels
            .remove_if(folded, |_, chan| {
                chan.try_write()
                    .map(|guard| guard.members.is_empty())
                    .unwrap_or(false)
            })
            .is_some();
        crate::metrics::SERVER_CHANNELS.set(self.channel_count() as i64);
        removed
    }

    /// Number of registered clients.
    pub fn registered_count(&self) -> usize {
        self.users.len()
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of operators currently connected.
    pub async fn oper_count(&self) -> usize {
        let users: Vec<_> = self.users.iter().map(|e| e.value().clone()).collect();
        let mut count = 0;
        for user in users {
            if user.read().await.flags.oper {
                count += 1;
            }
        }
        count
    }

    /// Raw connection count.
    pub fn connection_count(&self) -> i64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// NOTICE every connected client from the server. Used for the
    /// shutdown announcement and operator global notices.
    pub async fn global_notice(&self, text: &str) {
        let users: Vec<Arc<RwLock<User>>> =
            self.users.iter().map(|e| e.value().clone()).collect();
        for user in users {
            let (uid, nick) = {
                let u = user.read().await;
                (u.uid, u.nick.clone())
            };
            crate::metrics::CLIENT_MESSAGES.inc();
            self.send_to(
                uid,
                Message {
                    prefix: Some(ferrum_proto::Prefix::ServerName(self.server.name.clone())),
                    command: ferrum_proto::Command::Notice(nick, text.to_string()),
                },
            );
        }
    }

    /// The friend set of a user: itself plus every co-member of its
    /// channels. The broadcast set for NICK changes and QUIT.
    pub async fn friends_of(&self, uid: Uid) -> Vec<Uid> {
        let channels: Vec<String> = match self.users.get(&uid).map(|u| u.clone()) {
            Some(user) => user.read().await.channels.iter().cloned().collect(),
            None => Vec::new(),
        };

        let mut friends = vec![uid];
        for folded in channels {
            if let Some(channel) = self.channels.get(&folded).map(|c| c.clone()) {
                let channel = channel.read().await;
                for member in channel.members.keys() {
                    if !friends.contains(member) {
                        friends.push(*member);
                    }
                }
            }
        }
        friends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_matrix() -> Matrix {
        Matrix::new(&Config::for_tests())
    }

    #[test]
    fn nick_claims_are_exclusive_and_folded() {
        let matrix = test_matrix();
        let (a, b) = (matrix.uids.next(), matrix.uids.next());
        assert!(matrix.claim_nick("Alice", a));
        assert!(!matrix.claim_nick("ALICE", b));
        // claiming your own nick again is a no-op success
        assert!(matrix.claim_nick("alice", a));
    }

    #[test]
    fn release_checks_ownership() {
        let matrix = test_matrix();
        let (a, b) = (matrix.uids.next(), matrix.uids.next());
        assert!(matrix.claim_nick("alice", a));
        assert!(!matrix.release_nick("alice", b));
        assert!(matrix.release_nick("alice", a));
        assert!(matrix.claim_nick("alice", b));
    }
}
