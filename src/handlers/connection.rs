//! Registration and keepalive handlers: PASS, NICK, USER, QUIT, PING,
//! PONG, plus the welcome burst.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ferrum_proto::{irc_to_lower, Command, Message, NickExt, Response};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{server_reply, Context, Handler, HandlerError, HandlerResult};
use crate::security::{cloak_hostname, verify_password};
use crate::state::{User, UserFlags, WhoWas};

/// Handler for PASS.
pub struct PassHandler;

#[async_trait]
impl Handler for PassHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.session.registered {
            ctx.numeric(
                Response::ERR_ALREADYREGISTERED,
                &["You may not reregister"],
            );
            return Ok(());
        }
        let Command::Pass(attempt) = &msg.command else {
            return Ok(());
        };

        let hash = ctx.matrix.shared.read().expect("shared config").password.clone();
        match hash {
            None => {
                // no password configured; PASS is a no-op
                ctx.session.authorized = true;
            }
            // bcrypt compare runs inline on this connection's task so a
            // slow hash cannot stall other clients
            Some(hash) if verify_password(&hash, attempt) => {
                ctx.session.authorized = true;
            }
            Some(_) => {
                ctx.numeric(Response::ERR_PASSWDMISMATCH, &["Password incorrect"]);
                return Err(HandlerError::Quit("bad password".to_string()));
            }
        }
        Ok(())
    }
}

/// Handler for NICK.
pub struct NickHandler;

#[async_trait]
impl Handler for NickHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Nick(nick) = &msg.command else {
            return Ok(());
        };

        if !nick.is_valid_nick() {
            ctx.numeric(
                Response::ERR_ERRONEUSNICKNAME,
                &[nick, "Erroneous nickname"],
            );
            return Ok(());
        }

        if !ctx.matrix.claim_nick(nick, ctx.uid) {
            ctx.numeric(
                Response::ERR_NICKNAMEINUSE,
                &[nick, "Nickname is already in use"],
            );
            return Ok(());
        }

        if ctx.session.registered {
            change_nick(ctx, nick).await;
            return Ok(());
        }

        // release a previously claimed handshake nick
        if let Some(old) = ctx.session.nick.take() {
            if irc_to_lower(&old) != irc_to_lower(nick) {
                ctx.matrix.release_nick(&old, ctx.uid);
            }
        }
        ctx.session.nick = Some(nick.clone());
        debug!(nick = %nick, uid = %ctx.uid, "nick claimed");

        try_register(ctx).await;
        Ok(())
    }
}

/// Nick change for a registered client: snapshot to WHOWAS, broadcast to
/// friends with the old prefix, swap the registry claim.
async fn change_nick(ctx: &mut Context<'_>, new_nick: &str) {
    let Some(user) = ctx.matrix.users.get(&ctx.uid).map(|u| u.clone()) else {
        return;
    };

    let friends = ctx.matrix.friends_of(ctx.uid).await;

    let (old_nick, reply) = {
        let mut user = user.write().await;
        let old_nick = user.nick.clone();
        let reply = Message {
            prefix: Some(user.prefix()),
            command: Command::Nick(new_nick.to_string()),
        };
        ctx.matrix.whowas.lock().expect("whowas").append(WhoWas {
            nick: old_nick.clone(),
            username: user.username.clone(),
            hostname: user.hostname.clone(),
            realname: user.realname.clone(),
        });
        user.nick = new_nick.to_string();
        (old_nick, reply)
    };

    if irc_to_lower(&old_nick) != irc_to_lower(new_nick) {
        ctx.matrix.release_nick(&old_nick, ctx.uid);
    }
    ctx.session.nick = Some(new_nick.to_string());

    for friend in friends {
        ctx.matrix.send_to(friend, reply.clone());
    }
    info!(old = %old_nick, new = %new_nick, "nick changed");
}

/// Handler for USER.
pub struct UserHandler;

#[async_trait]
impl Handler for UserHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.session.registered {
            ctx.numeric(
                Response::ERR_ALREADYREGISTERED,
                &["You may not reregister"],
            );
            return Ok(());
        }
        let Command::User(username, mode, _unused, realname) = &msg.command else {
            return Ok(());
        };

        if !ctx.session.authorized {
            ctx.numeric(Response::ERR_PASSWDMISMATCH, &["Password incorrect"]);
            return Err(HandlerError::Quit("bad password".to_string()));
        }

        // RFC 2812 form carries a mode bitmask: bit 2 = +w, bit 3 = +i
        if let Ok(bits) = mode.parse::<u8>() {
            ctx.session.wants_wallops = bits & 4 != 0;
            ctx.session.wants_invisible = bits & 8 != 0;
            if bits & 12 != 0 {
                let mut modes = String::from("+");
                if ctx.session.wants_invisible {
                    modes.push('i');
                }
                if ctx.session.wants_wallops {
                    modes.push('w');
                }
                ctx.numeric(Response::RPL_UMODEIS, &[&modes]);
            }
        }

        ctx.session.username = Some(username.clone());
        ctx.session.realname = ferrum_proto::sanitize_text(realname);

        try_register(ctx).await;
        Ok(())
    }
}

/// Fire registration once NICK and USER are in, PASS has been settled
/// and capability negotiation is not mid-flight.
pub(crate) async fn try_register(ctx: &mut Context<'_>) {
    use super::CapState;

    if ctx.session.registered
        || ctx.session.nick.is_none()
        || ctx.session.username.is_none()
        || ctx.session.cap_state == CapState::Negotiating
    {
        return;
    }

    // no PASS seen; implicitly authorized when no password is configured
    if !ctx.session.authorized {
        let has_password = ctx
            .matrix
            .shared
            .read()
            .expect("shared config")
            .password
            .is_some();
        if has_password {
            ctx.numeric(Response::ERR_PASSWDMISMATCH, &["Password incorrect"]);
            // the connection loop turns this into a teardown
            ctx.matrix.request_quit(ctx.uid, "bad password");
            return;
        }
        ctx.session.authorized = true;
    }

    let nick = ctx.session.nick.clone().expect("nick present");
    let username = ctx.session.username.clone().expect("username present");

    let user = User {
        uid: ctx.uid,
        nick: nick.clone(),
        username,
        realname: ctx.session.realname.clone(),
        hostname: ctx.hostname.to_string(),
        hostmask: cloak_hostname(ctx.hostname),
        away: None,
        flags: UserFlags {
            invisible: ctx.session.wants_invisible,
            wallops: ctx.session.wants_wallops,
            registered: ctx.session.account.is_some(),
            secure_conn: ctx.secure,
            ..UserFlags::default()
        },
        caps: ctx.session.caps.iter().cloned().collect::<HashSet<_>>(),
        signon: chrono::Utc::now().timestamp(),
        atime: Instant::now(),
        channels: HashSet::new(),
    };
    ctx.matrix.users.insert(ctx.uid, Arc::new(RwLock::new(user)));
    ctx.session.registered = true;

    crate::metrics::SERVER_REGISTERED.set(ctx.matrix.registered_count() as i64);
    info!(nick = %nick, uid = %ctx.uid, account = ?ctx.session.account, "client registered");

    send_welcome_burst(ctx, &nick).await;
}

/// 001-005, LUSERS and MOTD, in that order.
async fn send_welcome_burst(ctx: &mut Context<'_>, nick: &str) {
    let server = ctx.server_name().to_string();
    let network = ctx.matrix.server.network.clone();
    let version = ctx.matrix.server.version.clone();

    let userhost = {
        match ctx.matrix.users.get(&ctx.uid).map(|u| u.clone()) {
            Some(user) => user.read().await.userhost(),
            None => format!("{}!*@*", nick),
        }
    };

    ctx.numeric(
        Response::RPL_WELCOME,
        &[&format!(
            "Welcome to the {} Internet Relay Network {}",
            network, userhost
        )],
    );
    ctx.numeric(
        Response::RPL_YOURHOST,
        &[&format!(
            "Your host is {}, running version {}",
            server, version
        )],
    );
    let created = chrono::DateTime::from_timestamp(ctx.matrix.server.created, 0)
        .map(|t| t.to_rfc2822())
        .unwrap_or_default();
    ctx.numeric(
        Response::RPL_CREATED,
        &[&format!("This server was created {}", created)],
    );
    ctx.numeric(
        Response::RPL_MYINFO,
        &[&server, &version, "iowrzZx", "beIiklmnoptsvZO"],
    );
    ctx.send(server_reply(
        &server,
        Response::RPL_ISUPPORT,
        vec![
            nick.to_string(),
            format!("NETWORK={}", network),
            "CASEMAPPING=rfc1459".to_string(),
            "CHANTYPES=#&".to_string(),
            "PREFIX=(ov)@+".to_string(),
            "CHANMODES=beI,k,l,imnpstZ".to_string(),
            "NICKLEN=32".to_string(),
            "CHANNELLEN=50".to_string(),
            "are supported by this server".to_string(),
        ],
    ));

    send_lusers(ctx).await;
    send_motd(ctx);
}

/// The LUSERS block (251-255).
pub(crate) async fn send_lusers(ctx: &Context<'_>) {
    let registered = ctx.matrix.registered_count() as i64;
    let connections = ctx.matrix.connection_count();
    let unknown = (connections - registered).max(0);
    let opers = ctx.matrix.oper_count().await;
    let channels = ctx.matrix.channel_count();

    ctx.numeric(
        Response::RPL_LUSERCLIENT,
        &[&format!(
            "There are {} users and 0 services on 1 servers",
            registered
        )],
    );
    ctx.numeric(
        Response::RPL_LUSEROP,
        &[&opers.to_string(), "operator(s) online"],
    );
    ctx.numeric(
        Response::RPL_LUSERUNKNOWN,
        &[&unknown.to_string(), "unknown connection(s)"],
    );
    ctx.numeric(
        Response::RPL_LUSERCHANNELS,
        &[&channels.to_string(), "channels formed"],
    );
    ctx.numeric(
        Response::RPL_LUSERME,
        &[&format!("I have {} clients and 1 servers", registered)],
    );
}

/// The MOTD block (375/372/376), or 422 when no file is configured.
pub(crate) fn send_motd(ctx: &Context<'_>) {
    let path = ctx.matrix.shared.read().expect("shared config").motd.clone();
    let Some(path) = path else {
        ctx.numeric(Response::ERR_NOMOTD, &["MOTD File is missing"]);
        return;
    };
    // MOTD files are small; a synchronous read here is fine
    let Ok(content) = std::fs::read_to_string(&path) else {
        ctx.numeric(Response::ERR_NOMOTD, &["MOTD File is missing"]);
        return;
    };

    let server = ctx.server_name();
    ctx.numeric(
        Response::RPL_MOTDSTART,
        &[&format!("- {} Message of the day -", server)],
    );
    for line in content.lines() {
        ctx.numeric(Response::RPL_MOTD, &[&format!("- {}", line)]);
    }
    ctx.numeric(Response::RPL_ENDOFMOTD, &["End of MOTD command"]);
}

/// Handler for QUIT.
pub struct QuitHandler;

#[async_trait]
impl Handler for QuitHandler {
    async fn handle(&self, _ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let reason = match &msg.command {
            Command::Quit(Some(reason)) => ferrum_proto::sanitize_text(reason),
            _ => String::new(),
        };
        Err(HandlerError::Quit(reason))
    }
}

/// Handler for PING.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Ping(token, _) = &msg.command else {
            return Ok(());
        };
        ctx.send(Message {
            prefix: Some(ferrum_proto::Prefix::ServerName(
                ctx.server_name().to_string(),
            )),
            command: Command::Pong(token.clone(), None),
        });
        Ok(())
    }
}

/// Handler for PONG. Observes the keepalive round trip.
pub struct PongHandler;

#[async_trait]
impl Handler for PongHandler {
    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        if let Some(sent) = ctx.session.ping_sent.take() {
            crate::metrics::PING_LATENCY.observe(sent.elapsed().as_secs_f64());
        }
        Ok(())
    }
}
