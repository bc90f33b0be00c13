//! Operator handlers: OPER, REHASH, WALLOPS, KILL.

use async_trait::async_trait;
use ferrum_proto::{Command, Message, Prefix, Response};
use tracing::{info, warn};

use super::channel::Caller;
use super::{Context, Handler, HandlerResult};
use crate::security::verify_password;

/// Handler for OPER.
pub struct OperHandler;

#[async_trait]
impl Handler for OperHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Oper(name, password) = &msg.command else {
            return Ok(());
        };

        let hash = ctx
            .matrix
            .shared
            .read()
            .expect("shared config")
            .operators
            .get(name)
            .cloned();
        // bcrypt compare runs inline; each connection has its own task
        let verified = hash.is_some_and(|h| verify_password(&h, password));
        if !verified {
            ctx.numeric(Response::ERR_PASSWDMISMATCH, &["Password incorrect"]);
            return Ok(());
        }

        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };
        {
            let mut user = caller.user.write().await;
            user.flags.oper = true;
            user.flags.wallops = true;
        }
        info!(nick = %caller.nick, oper = %name, "operator authenticated");

        ctx.numeric(Response::RPL_YOUREOPER, &["You are now an IRC operator"]);
        ctx.send(Message {
            prefix: Some(caller.prefix.clone()),
            command: Command::Mode(caller.nick.clone(), vec!["+ow".to_string()]),
        });
        Ok(())
    }
}

/// True when the caller holds `+o`; replies 481 otherwise.
async fn require_oper(ctx: &Context<'_>, caller: &Caller) -> bool {
    if caller.is_oper {
        return true;
    }
    ctx.numeric(
        Response::ERR_NOPRIVILEGES,
        &["Permission Denied - You're not an IRC operator"],
    );
    false
}

/// NOTICE every `+w` client from the server.
pub(crate) async fn wallops(ctx: &Context<'_>, text: &str) {
    let server = ctx.server_name().to_string();
    let users: Vec<_> = ctx.matrix.users.iter().map(|e| e.value().clone()).collect();
    for user in users {
        let (uid, nick, wants) = {
            let u = user.read().await;
            (u.uid, u.nick.clone(), u.flags.wallops)
        };
        if !wants {
            continue;
        }
        crate::metrics::CLIENT_MESSAGES.inc();
        ctx.matrix.send_to(
            uid,
            Message {
                prefix: Some(Prefix::ServerName(server.clone())),
                command: Command::Notice(nick, text.to_string()),
            },
        );
    }
}

/// Handler for WALLOPS.
pub struct WallopsHandler;

#[async_trait]
impl Handler for WallopsHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Wallops(text) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };
        if !require_oper(ctx, &caller).await {
            return Ok(());
        }
        wallops(ctx, &ferrum_proto::sanitize_text(text)).await;
        Ok(())
    }
}

/// Handler for REHASH.
pub struct RehashHandler;

#[async_trait]
impl Handler for RehashHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Rehash = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };
        if !require_oper(ctx, &caller).await {
            return Ok(());
        }

        wallops(
            ctx,
            &format!("Rehashing server config ({})", caller.nick),
        )
        .await;

        let path = ctx.matrix.config_path.display().to_string();
        match ctx.matrix.rehash() {
            Ok(()) => {
                ctx.numeric(Response::RPL_REHASHING, &[&path, "Rehashing"]);
            }
            Err(e) => {
                warn!(error = %e, "rehash failed");
                wallops(ctx, &format!("ERROR: Rehashing config failed ({})", e)).await;
            }
        }
        Ok(())
    }
}

/// Handler for KILL.
pub struct KillHandler;

#[async_trait]
impl Handler for KillHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Kill(target_nick, comment) = &msg.command else {
            return Ok(());
        };
        let Some(caller) = Caller::of(ctx).await else {
            return Ok(());
        };
        if !require_oper(ctx, &caller).await {
            return Ok(());
        }

        let Some(target) = ctx.matrix.user_by_nick(target_nick) else {
            ctx.numeric(
                Response::ERR_NOSUCHNICK,
                &[target_nick, "No such nick/channel"],
            );
            return Ok(());
        };
        let target_uid = target.read().await.uid;

        let reason = format!("KILLed by {}: {}", caller.nick, comment);
        info!(target = %target_nick, killer = %caller.nick, "KILL");
        ctx.matrix.request_quit(target_uid, &reason);
        Ok(())
    }
}
