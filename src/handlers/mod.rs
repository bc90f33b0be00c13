//! IRC command handlers.
//!
//! The [`Registry`] maps opcodes to [`Handler`] objects. Handlers run on
//! the receiving connection's task, mutate the Matrix and channels under
//! their locks, and enqueue replies through the per-client queues.
//! Before registration only the handshake commands are dispatched;
//! everything else answers 451.

mod cap;
mod channel;
mod connection;
mod messaging;
mod mode;
mod oper;
mod server_query;
mod user_query;

pub use cap::{AuthenticateHandler, CapHandler};
pub use connection::{
    NickHandler, PassHandler, PingHandler, PongHandler, QuitHandler, UserHandler,
};
pub use channel::{
    InviteHandler, JoinHandler, KickHandler, ListHandler, NamesHandler, PartHandler, TopicHandler,
};
pub use messaging::{NoticeHandler, PrivmsgHandler};
pub use mode::ModeHandler;
pub use oper::{KillHandler, OperHandler, RehashHandler, WallopsHandler};
pub use server_query::{LusersHandler, MotdHandler, TimeHandler, VersionHandler};
pub use user_query::{
    AwayHandler, IsonHandler, UserhostHandler, WhoHandler, WhoisHandler, WhowasHandler,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ferrum_proto::{Command, Message, Prefix, Response};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::state::{Matrix, Uid};

/// Capability negotiation progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapState {
    /// Never negotiated.
    #[default]
    None,
    /// CAP LS/REQ seen, END pending. Blocks registration.
    Negotiating,
    /// CAP END seen.
    Negotiated,
}

/// SASL exchange progress.
#[derive(Debug, Default)]
pub struct SaslSession {
    /// AUTHENTICATE PLAIN accepted, awaiting data chunks.
    pub started: bool,
    /// Accumulated base64 chunks.
    pub buffer: String,
}

impl SaslSession {
    /// Drop any partial exchange.
    pub fn reset(&mut self) {
        self.started = false;
        self.buffer.clear();
    }
}

/// Per-connection state before and during registration.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Nick from NICK, once claimed.
    pub nick: Option<String>,
    /// Username from USER.
    pub username: Option<String>,
    /// Realname from USER.
    pub realname: String,
    /// PASS accepted (implicitly true when no password is configured).
    pub authorized: bool,
    /// Registration complete.
    pub registered: bool,
    /// Capability negotiation state.
    pub cap_state: CapState,
    /// Enabled capabilities.
    pub caps: HashSet<String>,
    /// SASL exchange state.
    pub sasl: SaslSession,
    /// Account name after a successful SASL exchange.
    pub account: Option<String>,
    /// `+w` requested via the RFC 2812 USER mode bitmask.
    pub wants_wallops: bool,
    /// `+i` requested via the RFC 2812 USER mode bitmask.
    pub wants_invisible: bool,
    /// When the keepalive PING went out, for the latency metric.
    pub ping_sent: Option<Instant>,
}

/// Why a handler tore the connection down.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Normal or forced quit; runs the destroy path with this reason.
    #[error("quit: {0}")]
    Quit(String),
}

/// Handler outcome.
pub type HandlerResult = Result<(), HandlerError>;

/// Everything a handler can reach.
pub struct Context<'a> {
    /// This connection's Uid.
    pub uid: Uid,
    /// Shared state.
    pub matrix: &'a Arc<Matrix>,
    /// This client's reply queue.
    pub sender: &'a UnboundedSender<Message>,
    /// Handshake and capability state.
    pub session: &'a mut SessionState,
    /// True when the transport is TLS.
    pub secure: bool,
    /// Peer hostname (or textual address).
    pub hostname: &'a str,
}

impl Context<'_> {
    /// The client's nick, or `*` before one is set.
    pub fn nick(&self) -> String {
        self.session.nick.clone().unwrap_or_else(|| "*".to_string())
    }

    /// Server name shorthand.
    pub fn server_name(&self) -> &str {
        &self.matrix.server.name
    }

    /// Enqueue a message for this client. Send failures mean the queue
    /// is gone and the connection is tearing down; they are ignored.
    pub fn send(&self, msg: Message) {
        let _ = self.sender.send(msg);
    }

    /// Enqueue a server-prefixed numeric addressed to this client.
    pub fn numeric(&self, resp: Response, params: &[&str]) {
        let mut all = vec![self.nick()];
        all.extend(params.iter().map(|p| p.to_string()));
        self.send(server_reply(self.server_name(), resp, all));
    }

    /// ERR_NEEDMOREPARAMS for a command.
    pub fn need_more_params(&self, command: &str) {
        self.numeric(
            Response::ERR_NEEDMOREPARAMS,
            &[command, "Not enough parameters"],
        );
    }
}

/// Build a server-prefixed numeric.
pub fn server_reply(server_name: &str, resp: Response, params: Vec<String>) -> Message {
    Message {
        prefix: Some(Prefix::ServerName(server_name.to_string())),
        command: Command::Response(resp, params),
    }
}

/// Trait implemented by all command handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one parsed message.
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult;
}

/// Opcode to handler table.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

/// Commands accepted before registration completes.
const PRE_REGISTRATION: &[&str] = &[
    "CAP",
    "PASS",
    "NICK",
    "USER",
    "AUTHENTICATE",
    "QUIT",
    "PING",
    "PONG",
];

impl Registry {
    /// Create the registry with every handler installed.
    pub fn new() -> Registry {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        handlers.insert("CAP", Box::new(CapHandler));
        handlers.insert("AUTHENTICATE", Box::new(AuthenticateHandler));
        handlers.insert("PASS", Box::new(PassHandler));
        handlers.insert("NICK", Box::new(NickHandler));
        handlers.insert("USER", Box::new(UserHandler));
        handlers.insert("QUIT", Box::new(QuitHandler));
        handlers.insert("PING", Box::new(PingHandler));
        handlers.insert("PONG", Box::new(PongHandler));

        handlers.insert("JOIN", Box::new(JoinHandler));
        handlers.insert("PART", Box::new(PartHandler));
        handlers.insert("TOPIC", Box::new(TopicHandler));
        handlers.insert("NAMES", Box::new(NamesHandler));
        handlers.insert("LIST", Box::new(ListHandler));
        handlers.insert("INVITE", Box::new(InviteHandler));
        handlers.insert("KICK", Box::new(KickHandler));
        handlers.insert("MODE", Box::new(ModeHandler));

        handlers.insert("PRIVMSG", Box::new(PrivmsgHandler));
        handlers.insert("NOTICE", Box::new(NoticeHandler));

        handlers.insert("AWAY", Box::new(AwayHandler));
        handlers.insert("ISON", Box::new(IsonHandler));
        handlers.insert("USERHOST", Box::new(UserhostHandler));
        handlers.insert("WHO", Box::new(WhoHandler));
        handlers.insert("WHOIS", Box::new(WhoisHandler));
        handlers.insert("WHOWAS", Box::new(WhowasHandler));

        handlers.insert("OPER", Box::new(OperHandler));
        handlers.insert("REHASH", Box::new(RehashHandler));
        handlers.insert("WALLOPS", Box::new(WallopsHandler));
        handlers.insert("KILL", Box::new(KillHandler));

        handlers.insert("LUSERS", Box::new(LusersHandler));
        handlers.insert("MOTD", Box::new(MotdHandler));
        handlers.insert("TIME", Box::new(TimeHandler));
        handlers.insert("VERSION", Box::new(VersionHandler));

        Registry { handlers }
    }

    /// Route one message, enforcing the pre-registration gate.
    pub async fn dispatch(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let name = msg.command.name().to_string();

        if !ctx.session.registered && !PRE_REGISTRATION.contains(&name.as_str()) {
            ctx.numeric(Response::ERR_NOTREGISTERED, &["You have not registered"]);
            return Ok(());
        }

        match self.handlers.get(name.as_str()) {
            Some(handler) => handler.handle(ctx, msg).await,
            None => {
                ctx.numeric(Response::ERR_UNKNOWNCOMMAND, &[&name, "Unknown command"]);
                Ok(())
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}
