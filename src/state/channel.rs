//! Channels.

use std::collections::HashMap;

use crate::state::{MaskSet, Uid};

/// Channel mode flags.
#[derive(Debug, Default, Clone)]
pub struct ChannelFlags {
    /// `+i`
    pub invite_only: bool,
    /// `+m`
    pub moderated: bool,
    /// `+n`
    pub no_outside: bool,
    /// `+t`
    pub op_topic: bool,
    /// `+p`
    pub private: bool,
    /// `+s`
    pub secret: bool,
    /// `+Z`
    pub secure_only: bool,
}

impl ChannelFlags {
    /// Flag letters currently set, in a fixed order.
    pub fn letters(&self) -> String {
        let mut s = String::new();
        for (set, c) in [
            (self.invite_only, 'i'),
            (self.moderated, 'm'),
            (self.no_outside, 'n'),
            (self.op_topic, 't'),
            (self.private, 'p'),
            (self.secret, 's'),
            (self.secure_only, 'Z'),
        ] {
            if set {
                s.push(c);
            }
        }
        s
    }
}

/// Per-member modes.
#[derive(Debug, Default, Clone)]
pub struct MemberModes {
    /// `+O`, granted implicitly to the first joiner.
    pub creator: bool,
    /// `+o`
    pub op: bool,
    /// `+v`
    pub voice: bool,
}

impl MemberModes {
    /// Highest NAMES prefix, `@` before `+`.
    pub fn prefix_char(&self) -> Option<char> {
        if self.op {
            Some('@')
        } else if self.voice {
            Some('+')
        } else {
            None
        }
    }

    /// All prefixes for multi-prefix clients, `@` before `+`.
    pub fn all_prefix_chars(&self) -> String {
        let mut s = String::new();
        if self.op {
            s.push('@');
        }
        if self.voice {
            s.push('+');
        }
        s
    }
}

/// A set topic with attribution.
#[derive(Debug, Clone)]
pub struct Topic {
    /// Topic text.
    pub text: String,
    /// Prefix of the setter.
    pub set_by: String,
    /// Unix seconds when set.
    pub set_at: i64,
}

/// Why a JOIN was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDenied {
    /// 471
    Full,
    /// 475
    BadKey,
    /// 473
    InviteOnly,
    /// 474
    Banned,
}

/// One channel and everything scoped to it.
#[derive(Debug)]
pub struct Channel {
    /// Case-preserved name.
    pub name: String,
    /// Flag modes.
    pub flags: ChannelFlags,
    /// `+k` key.
    pub key: Option<String>,
    /// `+l` limit, 0 = unlimited.
    pub user_limit: u64,
    /// Current topic.
    pub topic: Option<Topic>,
    /// Members with their per-member modes.
    pub members: HashMap<Uid, MemberModes>,
    /// `+b` masks.
    pub bans: MaskSet,
    /// `+e` masks.
    pub excepts: MaskSet,
    /// `+I` masks.
    pub invites: MaskSet,
}

impl Channel {
    /// Create a channel with the default `+nt` modes.
    pub fn new(name: String) -> Channel {
        Channel {
            name,
            flags: ChannelFlags {
                no_outside: true,
                op_topic: true,
                ..ChannelFlags::default()
            },
            key: None,
            user_limit: 0,
            topic: None,
            members: HashMap::new(),
            bans: MaskSet::new(),
            excepts: MaskSet::new(),
            invites: MaskSet::new(),
        }
    }

    /// Membership test.
    pub fn is_member(&self, uid: Uid) -> bool {
        self.members.contains_key(&uid)
    }

    /// Channel-operator test for a member.
    pub fn member_is_op(&self, uid: Uid) -> bool {
        self.members.get(&uid).is_some_and(|m| m.op)
    }

    /// True when `+l` is set and reached.
    pub fn is_full(&self) -> bool {
        self.user_limit > 0 && self.members.len() as u64 >= self.user_limit
    }

    /// Key check; an unset key admits everyone.
    pub fn check_key(&self, key: Option<&str>) -> bool {
        match &self.key {
            None => true,
            Some(k) => key == Some(k.as_str()),
        }
    }

    /// Join authorization, checked in order; the first failure wins.
    /// Operators (server `+o`) bypass every check.
    pub fn check_join(&self, userhost: &str, key: Option<&str>, is_oper: bool) -> Result<(), JoinDenied> {
        if is_oper {
            return Ok(());
        }
        if self.is_full() {
            return Err(JoinDenied::Full);
        }
        if !self.check_key(key) {
            return Err(JoinDenied::BadKey);
        }
        let invited = self.invites.matches(userhost);
        if self.flags.invite_only && !invited {
            return Err(JoinDenied::InviteOnly);
        }
        if self.bans.matches(userhost) && !invited && !self.excepts.matches(userhost) {
            return Err(JoinDenied::Banned);
        }
        Ok(())
    }

    /// Add a member; the first joiner becomes creator and operator.
    pub fn add_member(&mut self, uid: Uid) {
        let first = self.members.is_empty();
        self.members.insert(
            uid,
            MemberModes {
                creator: first,
                op: first,
                voice: false,
            },
        );
    }

    /// Remove a member.
    pub fn remove_member(&mut self, uid: Uid) {
        self.members.remove(&uid);
    }

    /// Speaking policy: operators always may; `+n` blocks non-members;
    /// `+m` requires voice or op; `+Z` requires a secure sender.
    pub fn can_speak(&self, uid: Uid, sender_is_oper: bool, sender_secure: bool) -> bool {
        let member = self.members.get(&uid);
        if sender_is_oper || member.is_some_and(|m| m.op) {
            return true;
        }
        if self.flags.no_outside && member.is_none() {
            return false;
        }
        if self.flags.moderated && !member.is_some_and(|m| m.voice || m.op) {
            return false;
        }
        if self.flags.secure_only && !sender_secure {
            return false;
        }
        true
    }

    /// `RPL_CHANNELMODEIS` form: `+[k][l]<flags> [key] [limit]`, with
    /// argument letters first so positional arguments line up. The key
    /// is only revealed to members and operators.
    pub fn mode_string(&self, show_key: bool) -> String {
        let show_key = show_key && self.key.is_some();
        let show_limit = self.user_limit > 0;

        let mut s = String::from("+");
        if show_key {
            s.push('k');
        }
        if show_limit {
            s.push('l');
        }
        s.push_str(&self.flags.letters());

        if show_key {
            if let Some(key) = &self.key {
                s.push(' ');
                s.push_str(key);
            }
        }
        if show_limit {
            s.push_str(&format!(" {}", self.user_limit));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UidGenerator;

    #[test]
    fn first_joiner_gets_creator_and_op() {
        let uids = UidGenerator::new();
        let (a, b) = (uids.next(), uids.next());
        let mut chan = Channel::new("#x".into());
        chan.add_member(a);
        chan.add_member(b);
        assert!(chan.members[&a].creator && chan.members[&a].op);
        assert!(!chan.members[&b].creator && !chan.members[&b].op);
    }

    #[test]
    fn join_checks_run_in_order() {
        let uids = UidGenerator::new();
        let mut chan = Channel::new("#x".into());
        chan.add_member(uids.next());

        chan.user_limit = 1;
        chan.key = Some("sesame".into());
        assert_eq!(
            chan.check_join("a!b@c", Some("sesame"), false),
            Err(JoinDenied::Full)
        );

        chan.user_limit = 0;
        assert_eq!(
            chan.check_join("a!b@c", Some("wrong"), false),
            Err(JoinDenied::BadKey)
        );

        chan.key = None;
        chan.flags.invite_only = true;
        assert_eq!(
            chan.check_join("a!b@c", None, false),
            Err(JoinDenied::InviteOnly)
        );

        // an invite mask entry clears both the invite and ban gates
        chan.invites.add("a!*@*");
        chan.bans.add("a!*@*");
        assert_eq!(chan.check_join("a!b@c", None, false), Ok(()));

        chan.invites.remove("a!*@*");
        chan.flags.invite_only = false;
        assert_eq!(
            chan.check_join("a!b@c", None, false),
            Err(JoinDenied::Banned)
        );

        chan.excepts.add("a!b@*");
        assert_eq!(chan.check_join("a!b@c", None, false), Ok(()));

        // server operators bypass everything
        chan.user_limit = 1;
        chan.flags.invite_only = true;
        assert_eq!(chan.check_join("z!z@z", None, true), Ok(()));
    }

    #[test]
    fn speaking_policy() {
        let uids = UidGenerator::new();
        let (op, member, outsider) = (uids.next(), uids.next(), uids.next());
        let mut chan = Channel::new("#x".into());
        chan.add_member(op);
        chan.add_member(member);

        // +n default: outsiders are blocked
        assert!(!chan.can_speak(outsider, false, false));
        assert!(chan.can_speak(member, false, false));

        chan.flags.moderated = true;
        assert!(!chan.can_speak(member, false, false));
        assert!(chan.can_speak(op, false, false));
        chan.members.get_mut(&member).unwrap().voice = true;
        assert!(chan.can_speak(member, false, false));

        chan.flags.secure_only = true;
        assert!(!chan.can_speak(member, false, false));
        assert!(chan.can_speak(member, false, true));
        // server operators always may
        assert!(chan.can_speak(outsider, true, false));
    }

    #[test]
    fn mode_string_is_positional() {
        let mut chan = Channel::new("#x".into());
        chan.key = Some("sesame".into());
        chan.user_limit = 10;
        assert_eq!(chan.mode_string(true), "+klnt sesame 10");
        assert_eq!(chan.mode_string(false), "+lnt 10");
    }
}
