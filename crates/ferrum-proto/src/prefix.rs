//! Message prefixes.

use std::fmt;

use crate::error::ProtocolError;

/// The source of a message: either a server name or a user identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prefix {
    /// `:server.name`
    ServerName(String),
    /// `:nick!user@host`
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix token (without the leading `:`).
    ///
    /// Tokens containing `!` or `@` parse as a user identity; anything
    /// with a `.` and neither separator is taken as a server name, and a
    /// bare word becomes a nick with empty user/host.
    pub fn parse(s: &str) -> Result<Prefix, ProtocolError> {
        if s.is_empty() {
            return Err(ProtocolError::BadPrefix(s.to_string()));
        }
        if let Some((nick, rest)) = s.split_once('!') {
            let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
            return Ok(Prefix::Nickname(
                nick.to_string(),
                user.to_string(),
                host.to_string(),
            ));
        }
        if let Some((nick, host)) = s.split_once('@') {
            return Ok(Prefix::Nickname(
                nick.to_string(),
                String::new(),
                host.to_string(),
            ));
        }
        if s.contains('.') {
            return Ok(Prefix::ServerName(s.to_string()));
        }
        Ok(Prefix::Nickname(s.to_string(), String::new(), String::new()))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => write!(f, "{}", name),
            Prefix::Nickname(nick, user, host) => {
                write!(f, "{}", nick)?;
                if !user.is_empty() {
                    write!(f, "!{}", user)?;
                }
                if !host.is_empty() {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}
