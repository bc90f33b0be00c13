//! Channel handlers: JOIN, PART, TOPIC, NAMES, LIST, INVITE, KICK.

use std::sync::Arc;

use async_trait::async_trait;
use ferrum_proto::{irc_to_lower, ChannelExt, Command, Message, Response};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Context, Handler, HandlerResult};
use crate::state::{Channel, JoinDenied, Uid, User};

/// Snapshot of the calling user taken before channel locks are held.
pub(crate) struct Caller {
    pub nick: String,
    pub userhost: String,
    pub prefix: ferrum_proto::Prefix,
    pub is_oper: bool,
    pub secure: bool,
    pub multi_prefix: bool,
    pub user: Arc<RwLock<User>>,
}

impl Caller {
    pub async fn of(ctx: &Context<'_>) -> Option<Caller> {
        let user = ctx.matrix.users.get(&ctx.uid).map(|u| u.clone())?;
        let snapshot = {
            let u = user.read().await;
            Caller {
                nick: u.nick.clone(),
                userhost: u.userhost(),
                prefix: u.prefix(),
                is_oper: u.flags.oper,
                secure: u.flags.secure_conn,
                multi_prefix: u.caps.contains("multi-prefix"),
                user: user.clone(),
            }
        };
        Some(snapshot)
    }
}

/// Channel visibility for LIST and WHOIS: `+s` and `+p` channels are
/// hidden from outsiders unless the querier is an operator.
pub(crate) fn can_see_channel(
    chan: &Channel,
    uid: Uid,
    is_oper: bool,
    registered: bool,
    secure: bool,
) -> bool {
    let hidden = chan.flags.secret || chan.flags.private;
    if !hidden {
        return true;
    }
    let member = chan.is_member(uid);
    if chan.flags.secret && (member || is_oper) {
        return true;
    }
    if chan.flags.private && (member || is_oper || (registered && secure)) {
        return true;
    }
    false
}

/// Handler for JOIN.
pub struct JoinHandler;

#[async_trait]
impl Handler for JoinHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Join(channels, keys) = &msg.command else {
            return Ok(());
        };

        if channels.first().map(String::as_str) == Some("0") {
            return part_all(ctx).await;
        }

        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };

        for (i, name) in channels.iter().enumerate() {
            if !name.is_channel_name() {
                ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
                continue;
            }
            join_channel(ctx, &caller, name, keys.get(i).map(String::as_str)).await;
        }
        Ok(())
    }
}

async fn join_channel(ctx: &Context<'_>, caller: &Caller, name: &str, key: Option<&str>) {
    let folded = irc_to_lower(name);

    let chan_arc = ctx
        .matrix
        .channels
        .entry(folded.clone())
        .or_insert_with(|| Arc::new(RwLock::new(Channel::new(name.to_string()))))
        .clone();
    crate::metrics::SERVER_CHANNELS.set(ctx.matrix.channel_count() as i64);

    let mut chan = chan_arc.write().await;
    if chan.is_member(ctx.uid) {
        return;
    }

    // channel ops bypass the remaining checks too, but a joiner cannot
    // be a member yet, so only the server operator flag applies here
    if let Err(denied) = chan.check_join(&caller.userhost, key, caller.is_oper) {
        let (resp, text) = match denied {
            JoinDenied::Full => (Response::ERR_CHANNELISFULL, "Cannot join channel (+l)"),
            JoinDenied::BadKey => (Response::ERR_BADCHANNELKEY, "Cannot join channel (+k)"),
            JoinDenied::InviteOnly => (Response::ERR_INVITEONLYCHAN, "Cannot join channel (+i)"),
            JoinDenied::Banned => (Response::ERR_BANNEDFROMCHAN, "Cannot join channel (+b)"),
        };
        ctx.numeric(resp, &[&chan.name, text]);
        debug!(nick = %caller.nick, channel = %chan.name, ?denied, "JOIN refused");
        return;
    }

    chan.add_member(ctx.uid);
    {
        let mut user = caller.user.write().await;
        user.channels.insert(folded.clone());
    }

    let join_msg = Message {
        prefix: Some(caller.prefix.clone()),
        command: Command::Join(vec![chan.name.clone()], Vec::new()),
    };
    for member in chan.members.keys() {
        crate::metrics::CLIENT_MESSAGES.inc();
        ctx.matrix.send_to(*member, join_msg.clone());
    }
    info!(nick = %caller.nick, channel = %chan.name, members = chan.members.len(), "joined");

    send_topic(ctx, &chan);
    send_names(ctx, &chan, caller.multi_prefix).await;
}

/// RPL_TOPIC or RPL_NOTOPIC for a channel the caller can see.
pub(crate) fn send_topic(ctx: &Context<'_>, chan: &Channel) {
    match &chan.topic {
        Some(topic) => ctx.numeric(Response::RPL_TOPIC, &[&chan.name, &topic.text]),
        None => ctx.numeric(Response::RPL_NOTOPIC, &[&chan.name, "No topic is set"]),
    }
}

/// RPL_NAMREPLY + RPL_ENDOFNAMES. With multi-prefix both `@` and `+`
/// are shown, `@` first; otherwise only the highest.
pub(crate) async fn send_names(ctx: &Context<'_>, chan: &Channel, multi_prefix: bool) {
    let mut names = Vec::new();
    for (uid, modes) in &chan.members {
        let Some(user) = ctx.matrix.users.get(uid).map(|u| u.clone()) else {
            continue;
        };
        let nick = user.read().await.nick.clone();
        let decorated = if multi_prefix {
            format!("{}{}", modes.all_prefix_chars(), nick)
        } else {
            match modes.prefix_char() {
                Some(c) => format!("{}{}", c, nick),
                None => nick,
            }
        };
        names.push(decorated);
    }
    names.sort();

    ctx.numeric(
        Response::RPL_NAMREPLY,
        &["=", &chan.name, &names.join(" ")],
    );
    ctx.numeric(
        Response::RPL_ENDOFNAMES,
        &[&chan.name, "End of /NAMES list"],
    );
}

/// `JOIN 0`: leave every channel, the nick as the part message.
async fn part_all(ctx: &Context<'_>) -> HandlerResult {
    let Some(caller) = Caller::of(ctx).await else {
        return Ok(());
    };
    let channels: Vec<String> = caller.user.read().await.channels.iter().cloned().collect();
    for folded in channels {
        part_channel(ctx, &caller, &folded, Some(&caller.nick)).await;
    }
    Ok(())
}

pub(crate) async fn part_channel(
    ctx: &Context<'_>,
    caller: &Caller,
    folded: &str,
    reason: Option<&str>,
) {
    let Some(chan_arc) = ctx.matrix.channels.get(folded).map(|c| c.clone()) else {
        ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[folded, "No such channel"]);
        return;
    };

    let mut chan = chan_arc.write().await;
    if !chan.is_member(ctx.uid) {
        ctx.numeric(
            Response::ERR_NOTONCHANNEL,
            &[&chan.name, "You're not on that channel"],
        );
        return;
    }

    let part_msg = Message {
        prefix: Some(caller.prefix.clone()),
        command: Command::Part(
            vec![chan.name.clone()],
            reason.map(ferrum_proto::sanitize_text),
        ),
    };
    for member in chan.members.keys() {
        crate::metrics::CLIENT_MESSAGES.inc();
        ctx.matrix.send_to(*member, part_msg.clone());
    }

    chan.remove_member(ctx.uid);
    let name = chan.name.clone();
    drop(chan);

    {
        let mut user = caller.user.write().await;
        user.channels.remove(folded);
    }
    ctx.matrix.drop_channel_if_empty(folded);
    info!(nick = %caller.nick, channel = %name, "parted");
}

/// Handler for PART.
pub struct PartHandler;

#[async_trait]
impl Handler for PartHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Part(channels, reason) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };
        for name in channels {
            part_channel(ctx, &caller, &irc_to_lower(name), reason.as_deref()).await;
        }
        Ok(())
    }
}

/// Handler for TOPIC.
pub struct TopicHandler;

#[async_trait]
impl Handler for TopicHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Topic(name, new_topic) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };

        let folded = irc_to_lower(name);
        let Some(chan_arc) = ctx.matrix.channels.get(&folded).map(|c| c.clone()) else {
            ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
            return Ok(());
        };

        let mut chan = chan_arc.write().await;
        let is_op = caller.is_oper || chan.member_is_op(ctx.uid);
        if !chan.is_member(ctx.uid) && !is_op {
            ctx.numeric(
                Response::ERR_NOTONCHANNEL,
                &[&chan.name, "You're not on that channel"],
            );
            return Ok(());
        }

        match new_topic {
            None => send_topic(ctx, &chan),
            Some(text) => {
                if chan.flags.op_topic && !is_op {
                    ctx.numeric(
                        Response::ERR_CHANOPRIVSNEEDED,
                        &[&chan.name, "You're not channel operator"],
                    );
                    return Ok(());
                }
                let text = ferrum_proto::sanitize_text(text);
                chan.topic = Some(crate::state::Topic {
                    text: text.clone(),
                    set_by: caller.prefix.to_string(),
                    set_at: chrono::Utc::now().timestamp(),
                });

                let topic_msg = Message {
                    prefix: Some(caller.prefix.clone()),
                    command: Command::Topic(chan.name.clone(), Some(text)),
                };
                for member in chan.members.keys() {
                    crate::metrics::CLIENT_MESSAGES.inc();
                    ctx.matrix.send_to(*member, topic_msg.clone());
                }
                info!(nick = %caller.nick, channel = %chan.name, "topic changed");
            }
        }
        Ok(())
    }
}

/// Handler for NAMES.
pub struct NamesHandler;

#[async_trait]
impl Handler for NamesHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Names(channels) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };

        if channels.is_empty() {
            ctx.numeric(Response::RPL_ENDOFNAMES, &["*", "End of /NAMES list"]);
            return Ok(());
        }

        for name in channels {
            let folded = irc_to_lower(name);
            match ctx.matrix.channels.get(&folded).map(|c| c.clone()) {
                Some(chan_arc) => {
                    let chan = chan_arc.read().await;
                    send_names(ctx, &chan, caller.multi_prefix).await;
                }
                None => {
                    ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
                }
            }
        }
        Ok(())
    }
}

/// Handler for LIST.
pub struct ListHandler;

#[async_trait]
impl Handler for ListHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::List(channels, target) = &msg.command else {
            return Ok(());
        };
        if let Some(target) = target {
            ctx.numeric(Response::ERR_NOSUCHSERVER, &[target, "No such server"]);
            return Ok(());
        }
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };
        let (registered, secure) = {
            let u = caller.user.read().await;
            (u.flags.registered, u.flags.secure_conn)
        };

        ctx.numeric(Response::RPL_LISTSTART, &["Channel", "Users Name"]);

        let list_one = |chan: &Channel| {
            ctx.numeric(
                Response::RPL_LIST,
                &[
                    &chan.name,
                    &chan.members.len().to_string(),
                    chan.topic.as_ref().map(|t| t.text.as_str()).unwrap_or(""),
                ],
            );
        };

        if channels.is_empty() {
            let all: Vec<Arc<RwLock<Channel>>> =
                ctx.matrix.channels.iter().map(|e| e.value().clone()).collect();
            for chan_arc in all {
                let chan = chan_arc.read().await;
                if can_see_channel(&chan, ctx.uid, caller.is_oper, registered, secure) {
                    list_one(&chan);
                }
            }
        } else {
            for name in channels {
                let folded = irc_to_lower(name);
                let visible = match ctx.matrix.channels.get(&folded).map(|c| c.clone()) {
                    Some(chan_arc) => {
                        let chan = chan_arc.read().await;
                        if can_see_channel(&chan, ctx.uid, caller.is_oper, registered, secure) {
                            list_one(&chan);
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                };
                if !visible {
                    ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
                }
            }
        }

        ctx.numeric(Response::RPL_LISTEND, &["End of /LIST"]);
        Ok(())
    }
}

/// Handler for INVITE.
pub struct InviteHandler;

#[async_trait]
impl Handler for InviteHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Invite(target_nick, chan_name) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };

        let Some(target) = ctx.matrix.user_by_nick(target_nick) else {
            ctx.numeric(
                Response::ERR_NOSUCHNICK,
                &[target_nick, "No such nick/channel"],
            );
            return Ok(());
        };
        let (target_uid, target_nick, target_userhost, target_away) = {
            let t = target.read().await;
            (t.uid, t.nick.clone(), t.userhost(), t.away.clone())
        };

        let invite_msg = Message {
            prefix: Some(caller.prefix.clone()),
            command: Command::Invite(target_nick.clone(), chan_name.clone()),
        };

        let folded = irc_to_lower(chan_name);
        if let Some(chan_arc) = ctx.matrix.channels.get(&folded).map(|c| c.clone()) {
            let mut chan = chan_arc.write().await;
            let is_op = caller.is_oper || chan.member_is_op(ctx.uid);

            if chan.flags.invite_only && !is_op {
                ctx.numeric(
                    Response::ERR_CHANOPRIVSNEEDED,
                    &[&chan.name, "You're not channel operator"],
                );
                return Ok(());
            }
            if !chan.is_member(ctx.uid) && !is_op {
                ctx.numeric(
                    Response::ERR_NOTONCHANNEL,
                    &[&chan.name, "You're not on that channel"],
                );
                return Ok(());
            }
            // the invitee passes the +i gate on their next JOIN
            if chan.flags.invite_only {
                chan.invites.add(&target_userhost);
            }
        }

        ctx.numeric(Response::RPL_INVITING, &[&target_nick, chan_name]);
        ctx.matrix.send_to(target_uid, invite_msg);
        if let Some(away) = target_away {
            ctx.numeric(Response::RPL_AWAY, &[&target_nick, &away]);
        }
        Ok(())
    }
}

/// Handler for KICK.
pub struct KickHandler;

#[async_trait]
impl Handler for KickHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Kick(channels, users, comment) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };

        // one channel with many targets, or channels zipped with targets
        let pairs: Vec<(String, String)> = if channels.len() == 1 {
            users
                .iter()
                .map(|u| (channels[0].clone(), u.clone()))
                .collect()
        } else {
            channels.iter().cloned().zip(users.iter().cloned()).collect()
        };

        for (chan_name, target_nick) in pairs {
            kick_one(ctx, &caller, &chan_name, &target_nick, comment.as_deref()).await;
        }
        Ok(())
    }
}

async fn kick_one(
    ctx: &Context<'_>,
    caller: &Caller,
    chan_name: &str,
    target_nick: &str,
    comment: Option<&str>,
) {
    let folded = irc_to_lower(chan_name);
    let Some(chan_arc) = ctx.matrix.channels.get(&folded).map(|c| c.clone()) else {
        ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[chan_name, "No such channel"]);
        return;
    };
    let Some(target) = ctx.matrix.user_by_nick(target_nick) else {
        ctx.numeric(
            Response::ERR_NOSUCHNICK,
            &[target_nick, "No such nick/channel"],
        );
        return;
    };
    let (target_uid, target_nick) = {
        let t = target.read().await;
        (t.uid, t.nick.clone())
    };

    let mut chan = chan_arc.write().await;
    let is_op = caller.is_oper || chan.member_is_op(ctx.uid);
    if !chan.is_member(ctx.uid) && !is_op {
        ctx.numeric(
            Response::ERR_NOTONCHANNEL,
            &[&chan.name, "You're not on that channel"],
        );
        return;
    }
    if !is_op {
        ctx.numeric(
            Response::ERR_CHANOPRIVSNEEDED,
            &[&chan.name, "You're not channel operator"],
        );
        return;
    }
    if !chan.is_member(target_uid) {
        ctx.numeric(
            Response::ERR_USERNOTINCHANNEL,
            &[&target_nick, &chan.name, "They aren't on that channel"],
        );
        return;
    }

    let comment = comment
        .map(ferrum_proto::sanitize_text)
        .unwrap_or_else(|| caller.nick.clone());
    let kick_msg = Message {
        prefix: Some(caller.prefix.clone()),
        command: Command::Kick(
            vec![chan.name.clone()],
            vec![target_nick.clone()],
            Some(comment),
        ),
    };
    for member in chan.members.keys() {
        crate::metrics::CLIENT_MESSAGES.inc();
        ctx.matrix.send_to(*member, kick_msg.clone());
    }

    chan.remove_member(target_uid);
    let name = chan.name.clone();
    drop(chan);

    {
        let mut t = target.write().await;
        t.channels.remove(&folded);
    }
    ctx.matrix.drop_channel_if_empty(&folded);
    info!(kicker = %caller.nick, target = %target_nick, channel = %name, "kicked");
}
