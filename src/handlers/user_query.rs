//! User queries: WHO, WHOIS, WHOWAS, ISON, USERHOST, AWAY.

use std::sync::Arc;

use async_trait::async_trait;
use ferrum_proto::{irc_to_lower, ChannelExt, Command, Message, Response};
use tokio::sync::RwLock;

use super::channel::{can_see_channel, Caller};
use super::{Context, Handler, HandlerResult};
use crate::state::{Uid, User};

/// Handler for AWAY.
pub struct AwayHandler;

#[async_trait]
impl Handler for AwayHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Away(text) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };

        let text = text.as_deref().map(ferrum_proto::sanitize_text);
        {
            let mut user = caller.user.write().await;
            user.away = text.clone();
        }
        match text {
            Some(_) => ctx.numeric(Response::RPL_NOWAWAY, &["You have been marked as being away"]),
            None => ctx.numeric(Response::RPL_UNAWAY, &["You are no longer marked as being away"]),
        }
        Ok(())
    }
}

/// Handler for ISON.
pub struct IsonHandler;

#[async_trait]
impl Handler for IsonHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Ison(nicks) = &msg.command else {
            return Ok(());
        };
        let mut online = Vec::new();
        for nick in nicks {
            if let Some(user) = ctx.matrix.user_by_nick(nick) {
                online.push(user.read().await.nick.clone());
            }
        }
        ctx.numeric(Response::RPL_ISON, &[&online.join(" ")]);
        Ok(())
    }
}

/// Handler for USERHOST.
pub struct UserhostHandler;

#[async_trait]
impl Handler for UserhostHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Userhost(nicks) = &msg.command else {
            return Ok(());
        };
        let mut entries = Vec::new();
        for nick in nicks.iter().take(5) {
            let Some(user) = ctx.matrix.user_by_nick(nick) else {
                continue;
            };
            let u = user.read().await;
            let oper_mark = if u.flags.oper { "*" } else { "" };
            let away_mark = if u.away.is_some() { "-" } else { "+" };
            let host = if u.flags.cloaked {
                &u.hostmask
            } else {
                &u.hostname
            };
            entries.push(format!(
                "{}{}={}{}@{}",
                u.nick, oper_mark, away_mark, u.username, host
            ));
        }
        ctx.numeric(Response::RPL_USERHOST, &[&entries.join(" ")]);
        Ok(())
    }
}

/// WHO flags column: H/G presence, `*` for opers, highest channel
/// prefix when the row names a channel.
fn who_flags(user: &User, prefix: Option<char>) -> String {
    let mut flags = String::new();
    flags.push(if user.away.is_some() { 'G' } else { 'H' });
    if user.flags.oper {
        flags.push('*');
    }
    if let Some(c) = prefix {
        flags.push(c);
    }
    flags
}

/// Handler for WHO.
pub struct WhoHandler;

#[async_trait]
impl Handler for WhoHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Who(mask, oper_only) = &msg.command else {
            return Ok(());
        };
        let friends = ctx.matrix.friends_of(ctx.uid).await;

        match mask.as_deref() {
            None | Some("") | Some("*") | Some("0") => {
                let channels: Vec<Arc<RwLock<crate::state::Channel>>> =
                    ctx.matrix.channels.iter().map(|e| e.value().clone()).collect();
                for chan_arc in channels {
                    let chan = chan_arc.read().await;
                    who_channel(ctx, &chan, &friends, *oper_only).await;
                }
            }
            Some(mask) if mask.is_channel_name() => {
                let folded = irc_to_lower(mask);
                if let Some(chan_arc) = ctx.matrix.channels.get(&folded).map(|c| c.clone()) {
                    let chan = chan_arc.read().await;
                    who_channel(ctx, &chan, &friends, *oper_only).await;
                }
            }
            Some(mask) => {
                for user in ctx.matrix.find_all(mask).await {
                    let u = user.read().await;
                    if *oper_only && !u.flags.oper {
                        continue;
                    }
                    send_who_reply(ctx, &u, None, None).await;
                }
            }
        }

        ctx.numeric(
            Response::RPL_ENDOFWHO,
            &[mask.as_deref().unwrap_or("*"), "End of /WHO list"],
        );
        Ok(())
    }
}

/// One channel's WHO rows. Invisible members appear only to clients
/// sharing a channel with them.
async fn who_channel(
    ctx: &Context<'_>,
    chan: &crate::state::Channel,
    friends: &[Uid],
    oper_only: bool,
) {
    for (uid, modes) in &chan.members {
        let Some(user) = ctx.matrix.users.get(uid).map(|u| u.clone()) else {
            continue;
        };
        let u = user.read().await;
        if u.flags.invisible && !friends.contains(uid) {
            continue;
        }
        if oper_only && !u.flags.oper {
            continue;
        }
        send_who_reply(ctx, &u, Some(&chan.name), modes.prefix_char()).await;
    }
}

async fn send_who_reply(ctx: &Context<'_>, user: &User, channel: Option<&str>, prefix: Option<char>) {
    let host = if user.flags.cloaked {
        &user.hostmask
    } else {
        &user.hostname
    };
    let flags = who_flags(user, prefix);
    ctx.numeric(
        Response::RPL_WHOREPLY,
        &[
            channel.unwrap_or("*"),
            &user.username,
            host,
            ctx.server_name(),
            &user.nick,
            &flags,
            &format!("0 {}", user.realname),
        ],
    );
}

/// Handler for WHOIS.
pub struct WhoisHandler;

#[async_trait]
impl Handler for WhoisHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Whois(_target, masks) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };
        let (registered, secure) = {
            let u = caller.user.read().await;
            (u.flags.registered, u.flags.secure_conn)
        };

        for mask in masks {
            let matches = ctx.matrix.find_all(mask).await;
            if matches.is_empty() {
                ctx.numeric(Response::ERR_NOSUCHNICK, &[mask, "No such nick/channel"]);
                ctx.numeric(Response::RPL_ENDOFWHOIS, &[mask, "End of /WHOIS list"]);
                continue;
            }
            for user in matches {
                whois_one(ctx, &caller, registered, secure, user).await;
            }
            ctx.numeric(Response::RPL_ENDOFWHOIS, &[mask, "End of /WHOIS list"]);
        }
        Ok(())
    }
}

async fn whois_one(
    ctx: &Context<'_>,
    caller: &Caller,
    registered: bool,
    secure: bool,
    user: Arc<RwLock<User>>,
) {
    let (nick, username, host, realname, oper, away, idle, signon, channels) = {
        let u = user.read().await;
        let host = if u.flags.cloaked {
            u.hostmask.clone()
        } else {
            u.hostname.clone()
        };
        (
            u.nick.clone(),
            u.username.clone(),
            host,
            u.realname.clone(),
            u.flags.oper,
            u.away.clone(),
            u.idle_seconds(),
            u.signon,
            u.channels.iter().cloned().collect::<Vec<_>>(),
        )
    };

    ctx.numeric(
        Response::RPL_WHOISUSER,
        &[&nick, &username, &host, "*", &realname],
    );

    // channel list, with the member's highest prefix; hidden channels
    // are omitted for outsiders
    let mut entries = Vec::new();
    for folded in channels {
        let Some(chan_arc) = ctx.matrix.channels.get(&folded).map(|c| c.clone()) else {
            continue;
        };
        let chan = chan_arc.read().await;
        if !can_see_channel(&chan, ctx.uid, caller.is_oper, registered, secure) {
            continue;
        }
        let target_uid = user.read().await.uid;
        let prefix = chan
            .members
            .get(&target_uid)
            .and_then(|m| m.prefix_char())
            .map(|c| c.to_string())
            .unwrap_or_default();
        entries.push(format!("{}{}", prefix, chan.name));
    }
    if !entries.is_empty() {
        ctx.numeric(Response::RPL_WHOISCHANNELS, &[&nick, &entries.join(" ")]);
    }

    let description = ctx
        .matrix
        .shared
        .read()
        .expect("shared config")
        .description
        .clone();
    ctx.numeric(
        Response::RPL_WHOISSERVER,
        &[&nick, ctx.server_name(), &description],
    );

    if oper {
        ctx.numeric(Response::RPL_WHOISOPERATOR, &[&nick, "is an IRC operator"]);
    }
    if let Some(away) = away {
        ctx.numeric(Response::RPL_AWAY, &[&nick, &away]);
    }
    ctx.numeric(
        Response::RPL_WHOISIDLE,
        &[
            &nick,
            &idle.to_string(),
            &signon.to_string(),
            "seconds idle, signon time",
        ],
    );
}

/// Handler for WHOWAS.
pub struct WhowasHandler;

#[async_trait]
impl Handler for WhowasHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Whowas(nicks, count, _target) = &msg.command else {
            return Ok(());
        };
        let limit = count.map(|c| c.max(0) as usize).unwrap_or(0);

        for nick in nicks {
            let results = ctx
                .matrix
                .whowas
                .lock()
                .expect("whowas")
                .find(nick, limit);
            if results.is_empty() {
                ctx.numeric(Response::ERR_WASNOSUCHNICK, &[nick, "There was no such nickname"]);
            } else {
                for entry in results {
                    ctx.numeric(
                        Response::RPL_WHOWASUSER,
                        &[
                            &entry.nick,
                            &entry.username,
                            &entry.hostname,
                            "*",
                            &entry.realname,
                        ],
                    );
                }
            }
            ctx.numeric(Response::RPL_ENDOFWHOWAS, &[nick, "End of WHOWAS"]);
        }
        Ok(())
    }
}
