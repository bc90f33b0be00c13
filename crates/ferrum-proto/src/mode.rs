//! User and channel modes.
//!
//! Mode letters map to typed enums; `parse_channel_modes` and
//! `parse_user_modes` turn a MODE argument list into a sequence of
//! [`ModeChange`]s, pairing argument-bearing letters with their
//! positional arguments.

use std::fmt;

/// Whether a mode is being added, removed or queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeOp {
    /// `+`
    Add,
    /// `-`
    Remove,
    /// A bare list-mode letter with no argument.
    Query,
}

impl fmt::Display for ModeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModeOp::Add => "+",
            ModeOp::Remove => "-",
            ModeOp::Query => "=",
        })
    }
}

/// One mode change with its optional argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange<M> {
    /// Direction.
    pub op: ModeOp,
    /// The mode letter.
    pub mode: M,
    /// Positional argument, when the mode takes one.
    pub arg: Option<String>,
}

/// User mode letters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserMode {
    /// `a` - away (set via AWAY, not MODE)
    Away,
    /// `i` - invisible
    Invisible,
    /// `o` - IRC operator
    Operator,
    /// `w` - receives WALLOPS
    Wallops,
    /// `r` - authenticated via SASL
    Registered,
    /// `z` - connection is TLS
    SecureConn,
    /// `Z` - only speaks with secure peers
    SecureOnly,
    /// `x` - hostname cloaked
    Cloaked,
    /// Anything else.
    Unknown(char),
}

impl UserMode {
    /// Map a mode letter.
    pub fn from_char(c: char) -> UserMode {
        match c {
            'a' => UserMode::Away,
            'i' => UserMode::Invisible,
            'o' => UserMode::Operator,
            'w' => UserMode::Wallops,
            'r' => UserMode::Registered,
            'z' => UserMode::SecureConn,
            'Z' => UserMode::SecureOnly,
            'x' => UserMode::Cloaked,
            c => UserMode::Unknown(c),
        }
    }

    /// The mode letter.
    pub fn as_char(&self) -> char {
        match self {
            UserMode::Away => 'a',
            UserMode::Invisible => 'i',
            UserMode::Operator => 'o',
            UserMode::Wallops => 'w',
            UserMode::Registered => 'r',
            UserMode::SecureConn => 'z',
            UserMode::SecureOnly => 'Z',
            UserMode::Cloaked => 'x',
            UserMode::Unknown(c) => *c,
        }
    }
}

impl fmt::Display for UserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Channel mode letters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    /// `b` - ban mask list
    Ban,
    /// `e` - ban exception mask list
    Except,
    /// `I` - invite mask list
    InviteMask,
    /// `i` - invite-only
    InviteOnly,
    /// `k` - channel key
    Key,
    /// `l` - user limit
    Limit,
    /// `m` - moderated
    Moderated,
    /// `n` - no outside messages
    NoOutside,
    /// `t` - topic settable by operators only
    OpTopic,
    /// `p` - private
    Private,
    /// `s` - secret
    Secret,
    /// `Z` - secure members only
    SecureChan,
    /// `o` - channel operator (member mode)
    Oper,
    /// `v` - voice (member mode)
    Voice,
    /// `O` - channel creator
    Creator,
    /// Anything else.
    Unknown(char),
}

impl ChannelMode {
    /// Map a mode letter.
    pub fn from_char(c: char) -> ChannelMode {
        match c {
            'b' => ChannelMode::Ban,
            'e' => ChannelMode::Except,
            'I' => ChannelMode::InviteMask,
            'i' => ChannelMode::InviteOnly,
            'k' => ChannelMode::Key,
            'l' => ChannelMode::Limit,
            'm' => ChannelMode::Moderated,
            'n' => ChannelMode::NoOutside,
            't' => ChannelMode::OpTopic,
            'p' => ChannelMode::Private,
            's' => ChannelMode::Secret,
            'Z' => ChannelMode::SecureChan,
            'o' => ChannelMode::Oper,
            'v' => ChannelMode::Voice,
            'O' => ChannelMode::Creator,
            c => ChannelMode::Unknown(c),
        }
    }

    /// The mode letter.
    pub fn as_char(&self) -> char {
        match self {
            ChannelMode::Ban => 'b',
            ChannelMode::Except => 'e',
            ChannelMode::InviteMask => 'I',
            ChannelMode::InviteOnly => 'i',
            ChannelMode::Key => 'k',
            ChannelMode::Limit => 'l',
            ChannelMode::Moderated => 'm',
            ChannelMode::NoOutside => 'n',
            ChannelMode::OpTopic => 't',
            ChannelMode::Private => 'p',
            ChannelMode::Secret => 's',
            ChannelMode::SecureChan => 'Z',
            ChannelMode::Oper => 'o',
            ChannelMode::Voice => 'v',
            ChannelMode::Creator => 'O',
            ChannelMode::Unknown(c) => *c,
        }
    }

    /// True for mask-list modes (`b`, `e`, `I`).
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ChannelMode::Ban | ChannelMode::Except | ChannelMode::InviteMask
        )
    }

    /// True if the mode consumes an argument for the given op.
    fn takes_arg(&self, op: ModeOp) -> bool {
        match self {
            ChannelMode::Ban | ChannelMode::Except | ChannelMode::InviteMask => true,
            ChannelMode::Oper | ChannelMode::Voice => true,
            ChannelMode::Key => op == ModeOp::Add,
            ChannelMode::Limit => op == ModeOp::Add,
            _ => false,
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Parse `MODE` arguments for a channel target.
///
/// Mask-list letters with no remaining argument degrade to a
/// [`ModeOp::Query`], which the channel answers with the list contents.
pub fn parse_channel_modes(params: &[String]) -> Vec<ModeChange<ChannelMode>> {
    let mut changes = Vec::new();
    let words: Vec<&String> = params.iter().filter(|p| is_mode_word(p)).collect();
    let mut positional: Vec<&String> = params.iter().filter(|p| !is_mode_word(p)).collect();
    positional.reverse();

    for word in words {
        let mut op = ModeOp::Add;
        for c in word.chars() {
            match c {
                '+' => op = ModeOp::Add,
                '-' => op = ModeOp::Remove,
                c => {
                    let mode = ChannelMode::from_char(c);
                    let arg = if mode.takes_arg(op) {
                        positional.pop().map(|s| s.to_string())
                    } else {
                        None
                    };
                    let op = if mode.is_list() && arg.is_none() {
                        ModeOp::Query
                    } else {
                        op
                    };
                    changes.push(ModeChange { op, mode, arg });
                }
            }
        }
    }
    changes
}

/// Parse `MODE` arguments for a user target. User modes never take
/// arguments.
pub fn parse_user_modes(params: &[String]) -> Vec<ModeChange<UserMode>> {
    let mut changes = Vec::new();
    for word in params.iter().filter(|p| is_mode_word(p)) {
        let mut op = ModeOp::Add;
        for c in word.chars() {
            match c {
                '+' => op = ModeOp::Add,
                '-' => op = ModeOp::Remove,
                c => changes.push(ModeChange {
                    op,
                    mode: UserMode::from_char(c),
                    arg: None,
                }),
            }
        }
    }
    changes
}

fn is_mode_word(s: &str) -> bool {
    s.starts_with('+') || s.starts_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flag_modes() {
        let changes = parse_channel_modes(&params(&["+in"]));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].mode, ChannelMode::InviteOnly);
        assert_eq!(changes[1].mode, ChannelMode::NoOutside);
        assert!(changes.iter().all(|c| c.op == ModeOp::Add));
    }

    #[test]
    fn pairs_positional_args() {
        let changes = parse_channel_modes(&params(&["+kl", "sesame", "10"]));
        assert_eq!(
            changes[0],
            ModeChange {
                op: ModeOp::Add,
                mode: ChannelMode::Key,
                arg: Some("sesame".into())
            }
        );
        assert_eq!(
            changes[1],
            ModeChange {
                op: ModeOp::Add,
                mode: ChannelMode::Limit,
                arg: Some("10".into())
            }
        );
    }

    #[test]
    fn bare_ban_is_query() {
        let changes = parse_channel_modes(&params(&["+b"]));
        assert_eq!(changes[0].op, ModeOp::Query);
        assert_eq!(changes[0].mode, ChannelMode::Ban);
    }

    #[test]
    fn minus_k_takes_no_arg() {
        let changes = parse_channel_modes(&params(&["-k"]));
        assert_eq!(changes[0].op, ModeOp::Remove);
        assert_eq!(changes[0].arg, None);
    }

    #[test]
    fn member_modes_consume_nicks() {
        let changes = parse_channel_modes(&params(&["+o-v", "alice", "bob"]));
        assert_eq!(changes[0].arg.as_deref(), Some("alice"));
        assert_eq!(changes[0].op, ModeOp::Add);
        assert_eq!(changes[1].arg.as_deref(), Some("bob"));
        assert_eq!(changes[1].op, ModeOp::Remove);
    }

    #[test]
    fn user_modes_parse_signs() {
        let changes = parse_user_modes(&params(&["+iw-Z"]));
        assert_eq!(changes[0].mode, UserMode::Invisible);
        assert_eq!(changes[1].mode, UserMode::Wallops);
        assert_eq!(changes[2].mode, UserMode::SecureOnly);
        assert_eq!(changes[2].op, ModeOp::Remove);
    }
}
