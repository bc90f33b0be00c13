//! Server queries: MOTD, LUSERS, VERSION, TIME.

use async_trait::async_trait;
use ferrum_proto::{Command, Message, Response};

use super::connection::{send_lusers, send_motd};
use super::{Context, Handler, HandlerResult};

fn is_this_server(ctx: &Context<'_>, target: &Option<String>) -> bool {
    match target {
        None => true,
        Some(t) => t == ctx.server_name(),
    }
}

/// Handler for MOTD.
pub struct MotdHandler;

#[async_trait]
impl Handler for MotdHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Motd(target) = &msg.command else {
            return Ok(());
        };
        if !is_this_server(ctx, target) {
            let target = target.as_deref().unwrap_or("");
            ctx.numeric(Response::ERR_NOSUCHSERVER, &[target, "No such server"]);
            return Ok(());
        }
        send_motd(ctx);
        Ok(())
    }
}

/// Handler for LUSERS.
pub struct LusersHandler;

#[async_trait]
impl Handler for LusersHandler {
    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        send_lusers(ctx).await;
        Ok(())
    }
}

/// Handler for VERSION.
pub struct VersionHandler;

#[async_trait]
impl Handler for VersionHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Version(target) = &msg.command else {
            return Ok(());
        };
        if !is_this_server(ctx, target) {
            let target = target.as_deref().unwrap_or("");
            ctx.numeric(Response::ERR_NOSUCHSERVER, &[target, "No such server"]);
            return Ok(());
        }
        let version = ctx.matrix.server.version.clone();
        let server = ctx.server_name().to_string();
        let description = ctx
            .matrix
            .shared
            .read()
            .expect("shared config")
            .description
            .clone();
        ctx.numeric(Response::RPL_VERSION, &[&version, &server, &description]);
        Ok(())
    }
}

/// Handler for TIME.
pub struct TimeHandler;

#[async_trait]
impl Handler for TimeHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Time(target) = &msg.command else {
            return Ok(());
        };
        if !is_this_server(ctx, target) {
            let target = target.as_deref().unwrap_or("");
            ctx.numeric(Response::ERR_NOSUCHSERVER, &[target, "No such server"]);
            return Ok(());
        }
        let server = ctx.server_name().to_string();
        let now = chrono::Utc::now().to_rfc2822();
        ctx.numeric(Response::RPL_TIME, &[&server, &now]);
        Ok(())
    }
}
