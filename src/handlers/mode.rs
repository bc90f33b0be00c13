//! MODE for users and channels.

use async_trait::async_trait;
use ferrum_proto::mode::{parse_channel_modes, parse_user_modes, ModeChange, ModeOp};
use ferrum_proto::{irc_to_lower, ChannelExt, ChannelMode, Command, Message, Response, UserMode};
use tracing::debug;

use super::channel::Caller;
use super::{Context, Handler, HandlerResult};
use crate::state::Channel;

/// Handler for MODE. Dispatches on the target kind.
pub struct ModeHandler;

#[async_trait]
impl Handler for ModeHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Mode(target, params) = &msg.command else {
            return Ok(());
        };
        if target.is_channel_name() {
            channel_mode(ctx, target, params).await;
        } else {
            user_mode(ctx, target, params).await;
        }
        Ok(())
    }
}

/// Render applied changes back into `MODE` parameters.
fn format_changes<M: Copy>(changes: &[ModeChange<M>], letter: fn(M) -> char) -> Vec<String> {
    let mut word = String::new();
    let mut args = Vec::new();
    let mut last_op = None;
    for change in changes {
        if last_op != Some(change.op) {
            word.push_str(&change.op.to_string());
            last_op = Some(change.op);
        }
        word.push(letter(change.mode));
        if let Some(arg) = &change.arg {
            args.push(arg.clone());
        }
    }
    let mut params = vec![word];
    params.extend(args);
    params
}

async fn channel_mode(ctx: &Context<'_>, target: &str, params: &[String]) {
    let Some(caller) = Caller::of(ctx).await else {
        return;
    };
    let folded = irc_to_lower(target);
    let Some(chan_arc) = ctx.matrix.channels.get(&folded).map(|c| c.clone()) else {
        ctx.numeric(Response::ERR_NOSUCHCHANNEL, &[target, "No such channel"]);
        return;
    };

    let changes = parse_channel_modes(params);
    let mut chan = chan_arc.write().await;

    if changes.is_empty() {
        let show_key = caller.is_oper || chan.is_member(ctx.uid);
        let mode_string = chan.mode_string(show_key);
        let mut reply: Vec<&str> = vec![&chan.name];
        reply.extend(mode_string.split(' '));
        ctx.numeric(Response::RPL_CHANNELMODEIS, &reply);
        return;
    }

    let is_op = caller.is_oper || chan.member_is_op(ctx.uid);
    let mut applied: Vec<ModeChange<ChannelMode>> = Vec::new();

    for change in changes {
        if apply_channel_mode(ctx, &mut chan, is_op, &change).await {
            applied.push(change);
        }
    }

    if !applied.is_empty() {
        let mode_msg = Message {
            prefix: Some(caller.prefix.clone()),
            command: Command::Mode(
                chan.name.clone(),
                format_changes(&applied, |m: ChannelMode| m.as_char()),
            ),
        };
        for member in chan.members.keys() {
            crate::metrics::CLIENT_MESSAGES.inc();
            ctx.matrix.send_to(*member, mode_msg.clone());
        }
    }
}

/// Apply one channel mode change. Returns true when state changed and
/// the change should be echoed to the channel.
async fn apply_channel_mode(
    ctx: &Context<'_>,
    chan: &mut Channel,
    is_op: bool,
    change: &ModeChange<ChannelMode>,
) -> bool {
    use ChannelMode::*;

    let chan_name = chan.name.clone();
    let require_op = |ctx: &Context<'_>| {
        if !is_op {
            ctx.numeric(
                Response::ERR_CHANOPRIVSNEEDED,
                &[&chan_name, "You're not channel operator"],
            );
            return false;
        }
        true
    };

    match change.mode {
        Ban | Except | InviteMask => {
            if change.op == ModeOp::Query {
                show_mask_list(ctx, chan, change.mode);
                return false;
            }
            if !require_op(ctx) {
                return false;
            }
            let mask = match &change.arg {
                Some(mask) => mask.clone(),
                None => return false,
            };
            let list = match change.mode {
                Ban => &mut chan.bans,
                Except => &mut chan.excepts,
                _ => &mut chan.invites,
            };
            match change.op {
                ModeOp::Add => list.add(&mask),
                ModeOp::Remove => list.remove(&mask),
                ModeOp::Query => false,
            }
        }

        InviteOnly | Moderated | NoOutside | OpTopic | Private | Secret | SecureChan => {
            if !require_op(ctx) {
                return false;
            }
            let flag = match change.mode {
                InviteOnly => &mut chan.flags.invite_only,
                Moderated => &mut chan.flags.moderated,
                NoOutside => &mut chan.flags.no_outside,
                OpTopic => &mut chan.flags.op_topic,
                Private => &mut chan.flags.private,
                Secret => &mut chan.flags.secret,
                _ => &mut chan.flags.secure_only,
            };
            let want = change.op == ModeOp::Add;
            if *flag == want {
                return false;
            }
            *flag = want;
            true
        }

        Key => {
            if !require_op(ctx) {
                return false;
            }
            match change.op {
                ModeOp::Add => {
                    let Some(key) = &change.arg else {
                        ctx.need_more_params("MODE");
                        return false;
                    };
                    if chan.key.as_deref() == Some(key.as_str()) {
                        return false;
                    }
                    chan.key = Some(key.clone());
                    true
                }
                ModeOp::Remove => chan.key.take().is_some(),
                ModeOp::Query => false,
            }
        }

        Limit => {
            if !require_op(ctx) {
                return false;
            }
            match change.op {
                ModeOp::Add => {
                    // unparsable or zero limits are a no-op
                    let limit = change
                        .arg
                        .as_deref()
                        .and_then(|a| a.parse::<u64>().ok())
                        .unwrap_or(0);
                    if limit == 0 || limit == chan.user_limit {
                        return false;
                    }
                    chan.user_limit = limit;
                    true
                }
                ModeOp::Remove => {
                    if chan.user_limit == 0 {
                        return false;
                    }
                    chan.user_limit = 0;
                    true
                }
                ModeOp::Query => false,
            }
        }

        Oper | Voice => {
            if !require_op(ctx) {
                return false;
            }
            let Some(nick) = &change.arg else {
                ctx.need_more_params("MODE");
                return false;
            };
            let Some(target) = ctx.matrix.user_by_nick(nick) else {
                ctx.numeric(Response::ERR_NOSUCHNICK, &[nick, "No such nick/channel"]);
                return false;
            };
            let target_uid = target.read().await.uid;
            let Some(member) = chan.members.get_mut(&target_uid) else {
                ctx.numeric(
                    Response::ERR_USERNOTINCHANNEL,
                    &[nick, &chan.name, "They aren't on that channel"],
                );
                return false;
            };
            let slot = if change.mode == Oper {
                &mut member.op
            } else {
                &mut member.voice
            };
            let want = change.op == ModeOp::Add;
            if *slot == want {
                return false;
            }
            *slot = want;
            true
        }

        Creator | Unknown(_) => {
            ctx.numeric(
                Response::ERR_UNKNOWNMODE,
                &[
                    &change.mode.as_char().to_string(),
                    &format!("is unknown mode char to me for {}", chan.name),
                ],
            );
            false
        }
    }
}

fn show_mask_list(ctx: &Context<'_>, chan: &Channel, mode: ChannelMode) {
    let (list, entry_resp, end_resp, end_text) = match mode {
        ChannelMode::Ban => (
            &chan.bans,
            Response::RPL_BANLIST,
            Response::RPL_ENDOFBANLIST,
            "End of channel ban list",
        ),
        ChannelMode::Except => (
            &chan.excepts,
            Response::RPL_EXCEPTLIST,
            Response::RPL_ENDOFEXCEPTLIST,
            "End of channel exception list",
        ),
        _ => (
            &chan.invites,
            Response::RPL_INVITELIST,
            Response::RPL_ENDOFINVITELIST,
            "End of channel invite list",
        ),
    };
    for mask in list.iter() {
        ctx.numeric(entry_resp, &[&chan.name, mask]);
    }
    ctx.numeric(end_resp, &[&chan.name, end_text]);
}

async fn user_mode(ctx: &Context<'_>, target: &str, params: &[String]) {
    let Some(caller) = Caller::of(ctx).await else {
        return;
    };
    let Some(target_user) = ctx.matrix.user_by_nick(target) else {
        ctx.numeric(Response::ERR_NOSUCHNICK, &[target, "No such nick/channel"]);
        return;
    };
    let target_uid = target_user.read().await.uid;
    let changes = parse_user_modes(params);

    if target_uid != ctx.uid {
        if !caller.is_oper || !changes.is_empty() {
            // user modes are self-service; operators may only query
            ctx.numeric(
                Response::ERR_USERSDONTMATCH,
                &["Cannot change mode for other users"],
            );
            return;
        }
        let modes = target_user.read().await.flags.mode_string();
        let modes = if modes.is_empty() { "+".to_string() } else { modes };
        ctx.numeric(Response::RPL_UMODEIS, &[&modes]);
        return;
    }

    if changes.is_empty() {
        let modes = target_user.read().await.flags.mode_string();
        let modes = if modes.is_empty() { "+".to_string() } else { modes };
        ctx.numeric(Response::RPL_UMODEIS, &[&modes]);
        return;
    }

    let mut applied: Vec<ModeChange<UserMode>> = Vec::new();
    {
        let mut user = target_user.write().await;
        for change in changes {
            let slot = match change.mode {
                UserMode::Invisible => &mut user.flags.invisible,
                UserMode::Wallops => &mut user.flags.wallops,
                UserMode::SecureOnly => &mut user.flags.secure_only,
                // +o comes only from OPER; -o is honored
                UserMode::Operator if change.op == ModeOp::Remove => &mut user.flags.oper,
                _ => {
                    debug!(mode = %change.mode, "ignoring unsupported user mode change");
                    continue;
                }
            };
            let want = change.op == ModeOp::Add;
            if *slot == want {
                continue;
            }
            *slot = want;
            applied.push(change);
        }
    }

    if !applied.is_empty() {
        let nick = caller.nick.clone();
        ctx.send(Message {
            prefix: Some(caller.prefix.clone()),
            command: Command::Mode(nick, format_changes(&applied, |m: UserMode| m.as_char())),
        });
    } else {
        let modes = target_user.read().await.flags.mode_string();
        let modes = if modes.is_empty() { "+".to_string() } else { modes };
        ctx.numeric(Response::RPL_UMODEIS, &[&modes]);
    }
}
