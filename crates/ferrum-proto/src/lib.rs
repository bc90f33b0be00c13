//! # ferrum-proto
//!
//! IRC protocol parsing and serialization for ferrumd.
//!
//! Covers the RFC 1459/2812 client protocol subset the daemon speaks:
//! message framing, command parsing into typed values, numeric replies,
//! case mapping, mode strings and SASL PLAIN payloads.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod chan;
pub mod command;
pub mod error;
pub mod line;
pub mod message;
pub mod mode;
pub mod nick;
pub mod prefix;
pub mod response;
pub mod sasl;
pub mod text;
pub mod util;

pub use self::casemap::{irc_eq, irc_lower_char, irc_to_lower};
pub use self::chan::ChannelExt;
pub use self::command::{CapSubCommand, Command};
pub use self::error::{ProtocolError, Result};
pub use self::line::{LineCodec, MAX_LINE_LEN};
pub use self::message::Message;
pub use self::mode::{ChannelMode, ModeChange, ModeOp, UserMode};
pub use self::nick::{NickExt, NICK_MAX_LEN};
pub use self::prefix::Prefix;
pub use self::response::Response;
pub use self::text::sanitize_text;
pub use self::util::{expand_userhost, wildcard_to_regex};
