//! IRCv3 capability negotiation and SASL PLAIN.

use async_trait::async_trait;
use ferrum_proto::sasl::{parse_plain, CHUNK_SIZE};
use ferrum_proto::{CapSubCommand, Command, Message, Prefix, Response};
use tracing::{debug, info};

use super::{connection::try_register, CapState, Context, Handler, HandlerError, HandlerResult};
use crate::security::verify_password;

/// Capabilities the daemon offers.
const SUPPORTED_CAPS: &[&str] = &["multi-prefix", "sasl"];

/// Handler for CAP.
pub struct CapHandler;

#[async_trait]
impl Handler for CapHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Cap(_, sub, arg) = &msg.command else {
            return Ok(());
        };
        let arg = arg.clone();

        match sub {
            CapSubCommand::LS => {
                if !ctx.session.registered {
                    ctx.session.cap_state = CapState::Negotiating;
                }
                send_cap(ctx, CapSubCommand::LS, &SUPPORTED_CAPS.join(" "));
            }
            CapSubCommand::LIST => {
                let enabled: Vec<&str> =
                    ctx.session.caps.iter().map(String::as_str).collect();
                send_cap(ctx, CapSubCommand::LIST, &enabled.join(" "));
            }
            CapSubCommand::REQ => {
                if !ctx.session.registered {
                    ctx.session.cap_state = CapState::Negotiating;
                }
                let requested = arg.unwrap_or_default();
                handle_req(ctx, &requested);
            }
            CapSubCommand::END => {
                if ctx.session.cap_state == CapState::Negotiating {
                    ctx.session.cap_state = CapState::Negotiated;
                }
                try_register(ctx).await;
            }
            CapSubCommand::ACK | CapSubCommand::NAK => {
                debug!(sub = ?sub, "ignoring server-only CAP subcommand");
            }
        }
        Ok(())
    }
}

/// CAP REQ is all-or-nothing: one unknown capability NAKs the whole
/// request.
fn handle_req(ctx: &mut Context<'_>, requested: &str) {
    let mut accepted = Vec::new();
    for cap in requested.split_whitespace() {
        let (removal, name) = match cap.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, cap),
        };
        if !SUPPORTED_CAPS.contains(&name) {
            send_cap(ctx, CapSubCommand::NAK, requested);
            debug!(requested = %requested, "CAP REQ refused");
            return;
        }
        accepted.push((removal, name.to_string()));
    }

    for (removal, name) in &accepted {
        if *removal {
            ctx.session.caps.remove(name);
        } else {
            ctx.session.caps.insert(name.clone());
        }
    }
    send_cap(ctx, CapSubCommand::ACK, requested);
}

fn send_cap(ctx: &Context<'_>, sub: CapSubCommand, arg: &str) {
    ctx.send(Message {
        prefix: Some(Prefix::ServerName(ctx.server_name().to_string())),
        command: Command::Cap(Some(ctx.nick()), sub, Some(arg.to_string())),
    });
}

/// Handler for AUTHENTICATE (SASL PLAIN only).
pub struct AuthenticateHandler;

#[async_trait]
impl Handler for AuthenticateHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Command::Authenticate(data) = &msg.command else {
            return Ok(());
        };
        let data = data.clone();

        if ctx.session.registered {
            ctx.numeric(
                Response::ERR_ALREADYREGISTERED,
                &["You may not reregister"],
            );
            return Ok(());
        }
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
                return Err(HandlerError::Quit("bad password".to_string()));
            }
            ctx.session.authorized = true;
        }

        if data == "*" {
            ctx.session.sasl.reset();
            ctx.numeric(
                Response::ERR_SASLABORTED,
                &["SASL authentication aborted"],
            );
            return Ok(());
        }

        if !ctx.session.sasl.started {
            if data.eq_ignore_ascii_case("PLAIN") {
                ctx.session.sasl.started = true;
                ctx.send(Message::from(Command::Authenticate("+".to_string())));
            } else {
                ctx.numeric(Response::RPL_SASLMECHS, &["PLAIN", "are available SASL mechanisms"]);
                sasl_fail(ctx, "Unknown authentication mechanism");
            }
            return Ok(());
        }

        if data.len() > CHUNK_SIZE {
            ctx.numeric(Response::ERR_SASLTOOLONG, &["SASL message too long"]);
            ctx.session.sasl.reset();
            return Ok(());
        }
        if data.len() == CHUNK_SIZE {
            // exactly one full chunk: more to come
            ctx.session.sasl.buffer.push_str(&data);
            return Ok(());
        }
        if data != "+" {
            ctx.session.sasl.buffer.push_str(&data);
        }

        let blob = std::mem::take(&mut ctx.session.sasl.buffer);
        ctx.session.sasl.reset();

        let creds = match parse_plain(&blob) {
            Ok(creds) => creds,
            Err(e) => {
                sasl_fail(ctx, &e.to_string());
                return Ok(());
            }
        };

        let hash = ctx
            .matrix
            .shared
            .read()
            .expect("shared config")
            .accounts
            .get(&creds.authcid)
            .cloned();
        let verified = hash.is_some_and(|h| verify_password(&h, &creds.password));
        if !verified {
            sasl_fail(ctx, "invalid authentication");
            return Ok(());
        }

        ctx.session.account = Some(creds.authcid.clone());
        info!(account = %creds.authcid, uid = %ctx.uid, "SASL PLAIN login");

        let nick = ctx.nick();
        ctx.numeric(
            Response::RPL_LOGGEDIN,
            &[
                &format!("{}!*@*", nick),
                &creds.authcid,
                &format!("You are now logged in as {}", creds.authcid),
            ],
        );
        ctx.numeric(
            Response::RPL_SASLSUCCESS,
            &["SASL authentication successful"],
        );
        // advertise the +r grant the way a MODE change would read
        ctx.send(Message {
            prefix: Some(Prefix::Nickname(nick.clone(), String::new(), String::new())),
            command: Command::Mode(nick, vec!["+r".to_string()]),
        });
        Ok(())
    }
}

/// ERR_SASLFAIL, with the exchange reset so the client can retry.
fn sasl_fail(ctx: &mut Context<'_>, reason: &str) {
    ctx.session.sasl.reset();
    ctx.numeric(
        Response::ERR_SASLFAIL,
        &[&format!("SASL authentication failed: {}", reason)],
    );
}
