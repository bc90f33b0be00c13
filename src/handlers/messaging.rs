//! PRIVMSG and NOTICE.

use async_trait::async_trait;
use ferrum_proto::{irc_to_lower, ChannelExt, Command, Message, Response};
use tracing::debug;

use super::channel::Caller;
use super::{Context, Handler, HandlerResult};

/// Handler for PRIVMSG.
pub struct PrivmsgHandler;

#[async_trait]
impl Handler for PrivmsgHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Privmsg(target, text) = &msg.command else {
            return Ok(());
        };
        deliver(ctx, target, text, false).await;
        Ok(())
    }
}

/// Handler for NOTICE.
pub struct NoticeHandler;

#[async_trait]
impl Handler for NoticeHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Notice(target, text) = &msg.command else {
            return Ok(());
        };
        deliver(ctx, target, text, true).await;
        Ok(())
    }
}

async fn deliver(ctx: &Context<'_>, target: &str, text: &str, notice: bool) {
    let Some(caller) = Caller::of(ctx).await else {
        return;
    };
    let text = ferrum_proto::sanitize_text(text);

    // an operator NOTICE to * is a global notice from the server
    if notice && target == "*" && caller.is_oper {
        ctx.matrix.global_notice(&text).await;
        return;
    }

    if target.is_channel_name() {
        deliver_to_channel(ctx, &caller, target, &text, notice).await;
    } else {
        deliver_to_user(ctx, &caller, target, &text, notice).await;
    }
}

async fn deliver_to_channel(
    ctx: &Context<'_>,
    caller: &Caller,
    target: &str,
    text: &str,
    notice: bool,
) {
    let folded = irc_to_lower(target);
    let Some(chan_arc) = ctx.matrix.channels.get(&folded).map(|c| c.clone()) else {
        ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[target, "No such channel"]);
        return;
    };

    let chan = chan_arc.read().await;
    if !chan.can_speak(ctx.uid, caller.is_oper, caller.secure) {
        ctx.numeric(
            Response::ERR_CANNOTSENDTOCHAN,
            &[&chan.name, "Cannot send to channel"],
        );
        debug!(nick = %caller.nick, channel = %chan.name, "speak refused");
        return;
    }

    let command = if notice {
        Command::Notice(chan.name.clone(), text.to_string())
    } else {
        Command::Privmsg(chan.name.clone(), text.to_string())
    };
    let reply = Message {
        prefix: Some(caller.prefix.clone()),
        command,
    };
    // fanout order matches members-lock order; enqueue never blocks
    for member in chan.members.keys() {
        if *member == ctx.uid {
            continue;
        }
        crate::metrics::CLIENT_MESSAGES.inc();
        ctx.matrix.send_to(*member, reply.clone());
    }
}

async fn deliver_to_user(
    ctx: &Context<'_>,
    caller: &Caller,
    target: &str,
    text: &str,
    notice: bool,
) {
    let Some(target_user) = ctx.matrix.user_by_nick(target) else {
        ctx.numeric(Response::ERR_NOSUCHNICK, &[target, "No such nick/channel"]);
        return;
    };
    let (target_uid, target_nick, target_secure, target_secure_only, target_away) = {
        let t = target_user.read().await;
        (
            t.uid,
            t.nick.clone(),
            t.flags.secure_conn,
            t.flags.secure_only,
            t.away.clone(),
        )
    };

    // +Z on either side demands both ends secure, unless the sender is
    // an operator
    let (sender_secure_only, sender_secure) = {
        let u = caller.user.read().await;
        (u.flags.secure_only, u.flags.secure_conn)
    };
    let requires_secure = sender_secure_only || target_secure_only;
    let both_secure = sender_secure && target_secure;
    if requires_secure && !(caller.is_oper || both_secure) {
        ctx.numeric(
            Response::ERR_CANNOTSENDTOUSER,
            &[&target_nick, "secure connection required"],
        );
        return;
    }

    let command = if notice {
        Command::Notice(target_nick.clone(), text.to_string())
    } else {
        Command::Privmsg(target_nick.clone(), text.to_string())
    };
    crate::metrics::CLIENT_MESSAGES.inc();
    ctx.matrix.send_to(
        target_uid,
        Message {
            prefix: Some(caller.prefix.clone()),
            command,
        },
    );

    if !notice {
        if let Some(away) = target_away {
            ctx.numeric(Response::RPL_AWAY, &[&target_nick, &away]);
        }
    }
}
