//! Typed IRC commands.
//!
//! A wire line parses into exactly one [`Command`] variant carrying its
//! argument shape. Unknown opcodes become [`Command::Raw`] so the
//! session can answer ERR_UNKNOWNCOMMAND without dropping the
//! connection; known opcodes with too few arguments fail with
//! [`ProtocolError::NotEnoughArgs`].

use std::fmt;

use crate::error::ProtocolError;
use crate::response::Response;

/// CAP negotiation subcommands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapSubCommand {
    /// List the capabilities the server offers.
    LS,
    /// List the capabilities currently enabled.
    LIST,
    /// Request capabilities.
    REQ,
    /// Server acknowledgement.
    ACK,
    /// Server rejection.
    NAK,
    /// End negotiation.
    END,
}

impl std::str::FromStr for CapSubCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_uppercase().as_str() {
            "LS" => Ok(CapSubCommand::LS),
            "LIST" => Ok(CapSubCommand::LIST),
            "REQ" => Ok(CapSubCommand::REQ),
            "ACK" => Ok(CapSubCommand::ACK),
            "NAK" => Ok(CapSubCommand::NAK),
            "END" => Ok(CapSubCommand::END),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CapSubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapSubCommand::LS => "LS",
            CapSubCommand::LIST => "LIST",
            CapSubCommand::REQ => "REQ",
            CapSubCommand::ACK => "ACK",
            CapSubCommand::NAK => "NAK",
            CapSubCommand::END => "END",
        };
        f.write_str(s)
    }
}

/// A parsed IRC command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// `CAP [target] <subcommand> [:arg]`
    Cap(Option<String>, CapSubCommand, Option<String>),
    /// `PASS <password>`
    Pass(String),
    /// `NICK <nickname>`
    Nick(String),
    /// `USER <user> <a> <b> :<realname>` (RFC 1459 and RFC 2812 forms)
    User(String, String, String, String),
    /// `AUTHENTICATE <data>`
    Authenticate(String),
    /// `OPER <name> <password>`
    Oper(String, String),
    /// `QUIT [:reason]`
    Quit(Option<String>),

    /// `JOIN <channels> [keys]` (comma lists; `JOIN 0` parts all)
    Join(Vec<String>, Vec<String>),
    /// `PART <channels> [:reason]`
    Part(Vec<String>, Option<String>),
    /// `TOPIC <channel> [:topic]`
    Topic(String, Option<String>),
    /// `NAMES [channels]`
    Names(Vec<String>),
    /// `LIST [channels] [target]`
    List(Vec<String>, Option<String>),
    /// `INVITE <nick> <channel>`
    Invite(String, String),
    /// `KICK <channels> <users> [:comment]`
    Kick(Vec<String>, Vec<String>, Option<String>),
    /// `MODE <target> [modestring] [args...]`
    Mode(String, Vec<String>),

    /// `PRIVMSG <target> :<text>`
    Privmsg(String, String),
    /// `NOTICE <target> :<text>`
    Notice(String, String),

    /// `PING <token> [target]`
    Ping(String, Option<String>),
    /// `PONG <token> [target]`
    Pong(String, Option<String>),
    /// `AWAY [:message]`
    Away(Option<String>),
    /// `ISON <nicks...>`
    Ison(Vec<String>),
    /// `WHO [mask] [o]`
    Who(Option<String>, bool),
    /// `WHOIS [target] <masks>`
    Whois(Option<String>, Vec<String>),
    /// `WHOWAS <nicks> [count] [target]`
    Whowas(Vec<String>, Option<i64>, Option<String>),
    /// `USERHOST <nicks...>`
    Userhost(Vec<String>),

    /// `REHASH`
    Rehash,
    /// `WALLOPS :<text>`
    Wallops(String),
    /// `KILL <nick> :<comment>`
    Kill(String, String),
    /// `LUSERS`
    Lusers,
    /// `MOTD [target]`
    Motd(Option<String>),
    /// `TIME [target]`
    Time(Option<String>),
    /// `VERSION [target]`
    Version(Option<String>),
    /// `ERROR :<text>`
    Error(String),

    /// A server numeric reply.
    Response(Response, Vec<String>),
    /// Any opcode the daemon does not understand.
    Raw(String, Vec<String>),
}

fn comma_list(s: &str) -> Vec<String> {
    s.split(',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn need(
    args: &mut std::vec::IntoIter<String>,
    name: &'static str,
) -> Result<String, ProtocolError> {
    args.next().ok_or(ProtocolError::NotEnoughArgs(name))
}

impl Command {
    /// Build a typed command from an opcode and its argument list.
    pub fn new(cmd: &str, args: Vec<String>) -> Result<Command, ProtocolError> {
        let upper = cmd.to_ascii_uppercase();

        if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_digit()) {
            let code: u16 = upper.parse().expect("three ascii digits");
            return Ok(match Response::from_code(code) {
                Some(resp) => Command::Response(resp, args),
                None => Command::Raw(upper, args),
            });
        }

        let mut args = args.into_iter();
        let a = &mut args;

        Ok(match upper.as_str() {
            "CAP" => {
                let first = need(a, "CAP")?;
                match first.parse::<CapSubCommand>() {
                    Ok(sub) => Command::Cap(None, sub, a.next()),
                    Err(()) => {
                        let sub = need(a, "CAP")?
                            .parse()
                            .map_err(|()| ProtocolError::NotEnoughArgs("CAP"))?;
                        Command::Cap(Some(first), sub, a.next())
                    }
                }
            }
            "PASS" => Command::Pass(need(a, "PASS")?),
            "NICK" => Command::Nick(need(a, "NICK")?),
            "USER" => Command::User(
                need(a, "USER")?,
                need(a, "USER")?,
                need(a, "USER")?,
                need(a, "USER")?,
            ),
            "AUTHENTICATE" => Command::Authenticate(need(a, "AUTHENTICATE")?),
            "OPER" => Command::Oper(need(a, "OPER")?, need(a, "OPER")?),
            "QUIT" => Command::Quit(a.next()),

            "JOIN" => {
                let channels = need(a, "JOIN")?;
                if channels == "0" {
                    Command::Join(vec!["0".to_string()], Vec::new())
                } else {
                    let keys = a.next().map(|k| comma_list(&k)).unwrap_or_default();
                    Command::Join(comma_list(&channels), keys)
                }
            }
            "PART" => {
                let channels = need(a, "PART")?;
                Command::Part(comma_list(&channels), a.next())
            }
            "TOPIC" => Command::Topic(need(a, "TOPIC")?, a.next()),
            "NAMES" => Command::Names(a.next().map(|c| comma_list(&c)).unwrap_or_default()),
            "LIST" => Command::List(
                a.next().map(|c| comma_list(&c)).unwrap_or_default(),
                a.next(),
            ),
            "INVITE" => Command::Invite(need(a, "INVITE")?, need(a, "INVITE")?),
            "KICK" => {
                let channels = need(a, "KICK")?;
                let users = need(a, "KICK")?;
                Command::Kick(comma_list(&channels), comma_list(&users), a.next())
            }
            "MODE" => Command::Mode(need(a, "MODE")?, a.collect()),

            "PRIVMSG" => Command::Privmsg(need(a, "PRIVMSG")?, need(a, "PRIVMSG")?),
            "NOTICE" => Command::Notice(need(a, "NOTICE")?, need(a, "NOTICE")?),

            "PING" => Command::Ping(need(a, "PING")?, a.next()),
            "PONG" => Command::Pong(need(a, "PONG")?, a.next()),
            "AWAY" => Command::Away(a.next().filter(|m| !m.is_empty())),
            "ISON" => {
                let first = need(a, "ISON")?;
                let mut nicks = vec![first];
                nicks.extend(a);
                Command::Ison(nicks)
            }
            "WHO" => {
                let mask = a.next();
                let oper_only = a.next().is_some_and(|o| o == "o");
                Command::Who(mask, oper_only)
            }
            "WHOIS" => {
                let first = need(a, "WHOIS")?;
                match a.next() {
                    Some(masks) => Command::Whois(Some(first), comma_list(&masks)),
                    None => Command::Whois(None, comma_list(&first)),
                }
            }
            "WHOWAS" => {
                let nicks = need(a, "WHOWAS")?;
                let count = a.next().and_then(|c| c.parse().ok());
                Command::Whowas(comma_list(&nicks), count, a.next())
            }
            "USERHOST" => {
                let first = need(a, "USERHOST")?;
                let mut nicks = vec![first];
                nicks.extend(a);
                Command::Userhost(nicks)
            }

            "REHASH" => Command::Rehash,
            "WALLOPS" => Command::Wallops(need(a, "WALLOPS")?),
            "KILL" => Command::Kill(need(a, "KILL")?, need(a, "KILL")?),
            "LUSERS" => Command::Lusers,
            "MOTD" => Command::Motd(a.next()),
            "TIME" => Command::Time(a.next()),
            "VERSION" => Command::Version(a.next()),
            "ERROR" => Command::Error(need(a, "ERROR")?),

            _ => Command::Raw(upper.clone(), a.collect()),
        })
    }

    /// The opcode this command serializes under.
    pub fn name(&self) -> &str {
        match self {
            Command::Cap(..) => "CAP",
            Command::Pass(..) => "PASS",
            Command::Nick(..) => "NICK",
            Command::User(..) => "USER",
            Command::Authenticate(..) => "AUTHENTICATE",
            Command::Oper(..) => "OPER",
            Command::Quit(..) => "QUIT",
            Command::Join(..) => "JOIN",
            Command::Part(..) => "PART",
            Command::Topic(..) => "TOPIC",
            Command::Names(..) => "NAMES",
            Command::List(..) => "LIST",
            Command::Invite(..) => "INVITE",
            Command::Kick(..) => "KICK",
            Command::Mode(..) => "MODE",
            Command::Privmsg(..) => "PRIVMSG",
            Command::Notice(..) => "NOTICE",
            Command::Ping(..) => "PING",
            Command::Pong(..) => "PONG",
            Command::Away(..) => "AWAY",
            Command::Ison(..) => "ISON",
            Command::Who(..) => "WHO",
            Command::Whois(..) => "WHOIS",
            Command::Whowas(..) => "WHOWAS",
            Command::Userhost(..) => "USERHOST",
            Command::Rehash => "REHASH",
            Command::Wallops(..) => "WALLOPS",
            Command::Kill(..) => "KILL",
            Command::Lusers => "LUSERS",
            Command::Motd(..) => "MOTD",
            Command::Time(..) => "TIME",
            Command::Version(..) => "VERSION",
            Command::Error(..) => "ERROR",
            Command::Response(_, _) => "RESPONSE",
            Command::Raw(name, _) => name,
        }
    }
}

/// Write `name` plus middle params plus an optional trailing param.
///
/// The trailing param always carries the `:` marker; middles must not
/// contain spaces.
fn write_cmd(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    middles: &[&str],
    trailing: Option<&str>,
) -> fmt::Result {
    f.write_str(name)?;
    for m in middles {
        write!(f, " {}", m)?;
    }
    if let Some(t) = trailing {
        write!(f, " :{}", t)?;
    }
    Ok(())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Cap(target, sub, arg) => {
                let mut middles: Vec<&str> = Vec::new();
                if let Some(t) = target {
                    middles.push(t);
                }
                let sub = sub.to_string();
                middles.push(&sub);
                // LS version argument is a middle, everything else trails
                match (sub.as_str(), arg) {
                    ("LS", Some(a)) if target.is_none() => {
                        middles.push(a);
                        write_cmd(f, "CAP", &middles, None)
                    }
                    (_, arg) => write_cmd(f, "CAP", &middles, arg.as_deref()),
                }
            }
            Command::Pass(p) => write_cmd(f, "PASS", &[p], None),
            Command::Nick(n) => write_cmd(f, "NICK", &[n], None),
            Command::User(u, a, b, real) => write_cmd(f, "USER", &[u, a, b], Some(real)),
            Command::Authenticate(d) => write_cmd(f, "AUTHENTICATE", &[d], None),
            Command::Oper(name, pass) => write_cmd(f, "OPER", &[name, pass], None),
            Command::Quit(reason) => write_cmd(f, "QUIT", &[], reason.as_deref()),

            Command::Join(channels, keys) => {
                let chans = channels.join(",");
                if keys.is_empty() {
                    write_cmd(f, "JOIN", &[&chans], None)
                } else {
                    write_cmd(f, "JOIN", &[&chans, &keys.join(",")], None)
                }
            }
            Command::Part(channels, reason) => {
                write_cmd(f, "PART", &[&channels.join(",")], reason.as_deref())
            }
            Command::Topic(channel, topic) => {
                write_cmd(f, "TOPIC", &[channel], topic.as_deref())
            }
            Command::Names(channels) => {
                if channels.is_empty() {
                    write_cmd(f, "NAMES", &[], None)
                } else {
                    write_cmd(f, "NAMES", &[&channels.join(",")], None)
                }
            }
            Command::List(channels, target) => {
                let mut middles: Vec<String> = Vec::new();
                if !channels.is_empty() {
                    middles.push(channels.join(","));
                }
                if let Some(t) = target {
                    middles.push(t.clone());
                }
                let refs: Vec<&str> = middles.iter().map(String::as_str).collect();
                write_cmd(f, "LIST", &refs, None)
            }
            Command::Invite(nick, channel) => write_cmd(f, "INVITE", &[nick, channel], None),
            Command::Kick(channels, users, comment) => write_cmd(
                f,
                "KICK",
                &[&channels.join(","), &users.join(",")],
                comment.as_deref(),
            ),
            Command::Mode(target, params) => {
                let mut middles: Vec<&str> = vec![target];
                middles.extend(params.iter().map(String::as_str));
                write_cmd(f, "MODE", &middles, None)
            }

            Command::Privmsg(target, text) => write_cmd(f, "PRIVMSG", &[target], Some(text)),
            Command::Notice(target, text) => write_cmd(f, "NOTICE", &[target], Some(text)),

            Command::Ping(token, target) => match target {
                Some(t) => write_cmd(f, "PING", &[token, t], None),
                None => write_cmd(f, "PING", &[], Some(token)),
            },
            Command::Pong(token, target) => match target {
                Some(t) => write_cmd(f, "PONG", &[token, t], None),
                None => write_cmd(f, "PONG", &[], Some(token)),
            },
            Command::Away(msg) => write_cmd(f, "AWAY", &[], msg.as_deref()),
            Command::Ison(nicks) => {
                let refs: Vec<&str> = nicks.iter().map(String::as_str).collect();
                write_cmd(f, "ISON", &refs, None)
            }
            Command::Who(mask, oper_only) => {
                let mut middles: Vec<&str> = Vec::new();
                if let Some(m) = mask {
                    middles.push(m);
                }
                if *oper_only {
                    middles.push("o");
                }
                write_cmd(f, "WHO", &middles, None)
            }
            Command::Whois(target, masks) => {
                let joined = masks.join(",");
                match target {
                    Some(t) => write_cmd(f, "WHOIS", &[t, &joined], None),
                    None => write_cmd(f, "WHOIS", &[&joined], None),
                }
            }
            Command::Whowas(nicks, count, target) => {
                let mut middles: Vec<String> = vec![nicks.join(",")];
                if let Some(c) = count {
                    middles.push(c.to_string());
                }
                if let Some(t) = target {
                    middles.push(t.clone());
                }
                let refs: Vec<&str> = middles.iter().map(String::as_str).collect();
                write_cmd(f, "WHOWAS", &refs, None)
            }
            Command::Userhost(nicks) => {
                let refs: Vec<&str> = nicks.iter().map(String::as_str).collect();
                write_cmd(f, "USERHOST", &refs, None)
            }

            Command::Rehash => write_cmd(f, "REHASH", &[], None),
            Command::Wallops(text) => write_cmd(f, "WALLOPS", &[], Some(text)),
            Command::Kill(nick, comment) => write_cmd(f, "KILL", &[nick], Some(comment)),
            Command::Lusers => write_cmd(f, "LUSERS", &[], None),
            Command::Motd(target) => {
                let middles: Vec<&str> = target.iter().map(String::as_str).collect();
                write_cmd(f, "MOTD", &middles, None)
            }
            Command::Time(target) => {
                let middles: Vec<&str> = target.iter().map(String::as_str).collect();
                write_cmd(f, "TIME", &middles, None)
            }
            Command::Version(target) => {
                let middles: Vec<&str> = target.iter().map(String::as_str).collect();
                write_cmd(f, "VERSION", &middles, None)
            }
            Command::Error(text) => write_cmd(f, "ERROR", &[], Some(text)),

            Command::Response(resp, params) => {
                write!(f, "{}", resp)?;
                if let Some((last, middles)) = params.split_last() {
                    for m in middles {
                        write!(f, " {}", m)?;
                    }
                    write!(f, " :{}", last)?;
                }
                Ok(())
            }
            Command::Raw(name, params) => {
                let refs: Vec<&str> = params.iter().map(String::as_str).collect();
                write_cmd(f, name, &refs, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(cmd: &str, args: &[&str]) -> Command {
        Command::new(cmd, args.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn parses_registration_commands() {
        assert_eq!(new("nick", &["alice"]), Command::Nick("alice".into()));
        assert_eq!(
            new("USER", &["alice", "0", "*", "Alice A"]),
            Command::User("alice".into(), "0".into(), "*".into(), "Alice A".into())
        );
        assert_eq!(new("PASS", &["hunter2"]), Command::Pass("hunter2".into()));
    }

    #[test]
    fn parses_cap_forms() {
        assert_eq!(
            new("CAP", &["LS", "302"]),
            Command::Cap(None, CapSubCommand::LS, Some("302".into()))
        );
        assert_eq!(
            new("CAP", &["REQ", "multi-prefix sasl"]),
            Command::Cap(None, CapSubCommand::REQ, Some("multi-prefix sasl".into()))
        );
        assert_eq!(new("CAP", &["END"]), Command::Cap(None, CapSubCommand::END, None));
    }

    #[test]
    fn parses_join_lists() {
        assert_eq!(
            new("JOIN", &["#a,#b", "k1"]),
            Command::Join(vec!["#a".into(), "#b".into()], vec!["k1".into()])
        );
        assert_eq!(
            new("JOIN", &["0"]),
            Command::Join(vec!["0".into()], vec![])
        );
    }

    #[test]
    fn unknown_opcode_becomes_raw() {
        assert_eq!(
            new("FROBNICATE", &["x"]),
            Command::Raw("FROBNICATE".into(), vec!["x".into()])
        );
    }

    #[test]
    fn missing_args_error() {
        let err = Command::new("PRIVMSG", vec!["#chan".into()]).unwrap_err();
        assert!(matches!(err, ProtocolError::NotEnoughArgs("PRIVMSG")));
    }

    #[test]
    fn numeric_parses_to_response() {
        let cmd = new("001", &["alice", "Welcome"]);
        assert_eq!(
            cmd,
            Command::Response(Response::RPL_WELCOME, vec!["alice".into(), "Welcome".into()])
        );
    }

    #[test]
    fn serializes_with_trailing() {
        assert_eq!(
            Command::Privmsg("#chan".into(), "hello world".into()).to_string(),
            "PRIVMSG #chan :hello world"
        );
        assert_eq!(
            Command::Response(
                Response::RPL_ENDOFNAMES,
                vec!["alice".into(), "#j".into(), "End of /NAMES list".into()]
            )
            .to_string(),
            "366 alice #j :End of /NAMES list"
        );
    }

    #[test]
    fn round_trips_non_trailing_forms() {
        for cmd in [
            Command::Nick("alice".into()),
            Command::Join(vec!["#a".into(), "#b".into()], vec!["key".into()]),
            Command::Mode("#chan".into(), vec!["+k".into(), "sesame".into()]),
            Command::Ison(vec!["a".into(), "b".into()]),
            Command::Invite("bob".into(), "#chan".into()),
        ] {
            let line = cmd.to_string();
            let mut words = line.split(' ');
            let name = words.next().unwrap();
            let args: Vec<String> = words.map(str::to_string).collect();
            assert_eq!(Command::new(name, args).unwrap(), cmd, "line {:?}", line);
        }
    }
}
