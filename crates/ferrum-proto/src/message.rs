//! Owned IRC messages.
//!
//! A [`Message`] is an optional prefix plus a typed [`Command`]. Parsing
//! runs over a nom grammar for the RFC 2812 line shape: optional
//! `:prefix `, a command token (letters or exactly three digits), up to
//! 15 middle parameters and an optional `:`-trailing parameter.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::opt,
    sequence::preceded,
    IResult,
};

use crate::command::Command;
use crate::error::ProtocolError;
use crate::prefix::Prefix;

/// Maximum number of message parameters per RFC 2812.
const MAX_PARAMS: usize = 15;

/// A parsed IRC message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Message source, when present.
    pub prefix: Option<Prefix>,
    /// The command and its arguments.
    pub command: Command,
}

impl Message {
    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Message {
        self.prefix = Some(prefix);
        self
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Message {
        Message {
            prefix: None,
            command,
        }
    }
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

fn parse_command_token(input: &str) -> IResult<&str, &str> {
    let (rest, token) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;
    let all_letters = token.chars().all(|c| c.is_ascii_alphabetic());
    let three_digits = token.len() == 3 && token.chars().all(|c| c.is_ascii_digit());
    if all_letters || three_digits {
        Ok((rest, token))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::AlphaNumeric,
        )))
    }
}

/// Split the remainder into middles and an optional trailing argument.
fn parse_params(input: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut rest = input;

    while let Some(stripped) = rest.strip_prefix(' ') {
        rest = stripped;
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_string());
            return params;
        }
        if params.len() == MAX_PARAMS - 1 {
            // param 15 swallows the remainder even without a colon
            params.push(rest.to_string());
            return params;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    params
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, ProtocolError> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::ParseCommand(s.to_string()));
        }

        let (rest, prefix) = opt(parse_prefix)(line)
            .map_err(|_: nom::Err<nom::error::Error<&str>>| {
                ProtocolError::ParseCommand(line.to_string())
            })?;
        let rest = rest.strip_prefix(' ').unwrap_or(rest);

        let (rest, token) = parse_command_token(rest)
            .map_err(|_| ProtocolError::ParseCommand(line.to_string()))?;

        let params = parse_params(rest);
        let prefix = prefix.map(Prefix::parse).transpose()?;
        let command = Command::new(token, params)?;

        Ok(Message { prefix, command })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;

    #[test]
    fn parses_privmsg_with_prefix() {
        let msg: Message = ":nick!user@host PRIVMSG #channel :Hello, world!"
            .parse()
            .unwrap();
        assert_eq!(
            msg.prefix,
            Some(Prefix::Nickname("nick".into(), "user".into(), "host".into()))
        );
        assert_eq!(
            msg.command,
            Command::Privmsg("#channel".into(), "Hello, world!".into())
        );
    }

    #[test]
    fn parses_bare_command() {
        let msg: Message = "LUSERS\r\n".parse().unwrap();
        assert_eq!(msg.command, Command::Lusers);
    }

    #[test]
    fn parses_numeric_reply() {
        let msg: Message = ":irc.example.org 001 alice :Welcome to the net"
            .parse()
            .unwrap();
        assert_eq!(
            msg.command,
            Command::Response(
                Response::RPL_WELCOME,
                vec!["alice".into(), "Welcome to the net".into()]
            )
        );
    }

    #[test]
    fn trailing_keeps_spaces_and_colons() {
        let msg: Message = "QUIT :gone: for now".parse().unwrap();
        assert_eq!(msg.command, Command::Quit(Some("gone: for now".into())));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Message>().is_err());
        assert!("12 x".parse::<Message>().is_err());
        assert!("1234 x".parse::<Message>().is_err());
    }

    #[test]
    fn serializes_with_prefix() {
        let msg = Message::from(Command::Nick("bob".into())).with_prefix(Prefix::Nickname(
            "alice".into(),
            "al".into(),
            "example.org".into(),
        ));
        assert_eq!(msg.to_string(), ":alice!al@example.org NICK bob");
    }

    #[test]
    fn round_trips_parse_serialize() {
        for line in [
            "NICK alice",
            "JOIN #a,#b key",
            "MODE #chan +o bob",
            "PING :irc.example.org",
            ":bob!b@h PART #chan :bye",
        ] {
            let msg: Message = line.parse().unwrap();
            assert_eq!(msg.to_string(), line, "round trip {:?}", line);
        }
    }
}
