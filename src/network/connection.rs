//! Per-connection driver.
//!
//! Each connection owns two tasks: this reader task, which parses lines
//! and runs command handlers inline, and a writer task draining the
//! client's reply queue into the socket. An idle timer sends a
//! keepalive `PING` after 60 s of silence and tears the connection down
//! if no line arrives for another 60 s.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::sleep_until;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use ferrum_proto::{Command, LineCodec, Message, Prefix, ProtocolError};

use crate::handlers::{Context, HandlerError, Registry, SessionState};
use crate::state::{Matrix, Uid, WhoWas};

/// Silence before the server sends a keepalive PING.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Further silence before the connection is destroyed.
const QUIT_TIMEOUT: Duration = Duration::from_secs(60);

enum TimerPhase {
    Idle,
    AwaitingPong,
}

/// One client connection.
pub struct Connection {
    uid: Uid,
    stream: crate::network::ClientStream,
    addr: SocketAddr,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
}

impl Connection {
    /// Wrap an accepted stream.
    pub fn new(
        uid: Uid,
        stream: crate::network::ClientStream,
        addr: SocketAddr,
        matrix: Arc<Matrix>,
        registry: Arc<Registry>,
    ) -> Connection {
        Connection {
            uid,
            stream,
            addr,
            matrix,
            registry,
        }
    }

    /// Drive the connection to completion.
    pub async fn run(self) {
        let Connection {
            uid,
            stream,
            addr,
            matrix,
            registry,
        } = self;

        let secure = stream.is_secure();
        let hostname = addr.ip().to_string();

        matrix.connections.fetch_add(1, Ordering::Relaxed);
        crate::metrics::SERVER_CONNECTIONS.inc();
        crate::metrics::SERVER_CLIENTS
            .with_label_values(&[if secure { "true" } else { "false" }])
            .inc();

        let framed = Framed::new(stream, LineCodec::new());
        let (sink, mut lines) = framed.split();

        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        let (kill_tx, mut kill_rx) = mpsc::unbounded_channel::<String>();
        matrix.senders.insert(uid, tx.clone());
        matrix.kills.insert(uid, kill_tx);

        let writer = tokio::spawn(write_loop(sink, rx));

        let mut session = SessionState {
            authorized: matrix
                .shared
                .read()
                .expect("shared config")
                .password
                .is_none(),
            ..SessionState::default()
        };

        let mut phase = TimerPhase::Idle;
        let mut deadline = tokio::time::Instant::now() + IDLE_TIMEOUT;

        let reason = loop {
            tokio::select! {
                maybe_line = lines.next() => {
                    match maybe_line {
                        None => break "connection closed".to_string(),
                        Some(Err(e)) => {
                            debug!(%uid, error = %e, "read error");
                            break "connection closed".to_string();
                        }
                        Some(Ok(line)) => {
                            if line.is_empty() {
                                continue;
                            }
                            phase = TimerPhase::Idle;
                            deadline = tokio::time::Instant::now() + IDLE_TIMEOUT;

                            let mut ctx = Context {
                                uid,
                                matrix: &matrix,
                                sender: &tx,
                                session: &mut session,
                                secure,
                                hostname: &hostname,
                            };
                            if let Some(reason) =
                                handle_line(&registry, &mut ctx, &line).await
                            {
                                break reason;
                            }
                        }
                    }
                }
                Some(reason) = kill_rx.recv() => {
                    break reason;
                }
                _ = sleep_until(deadline) => {
                    match phase {
                        TimerPhase::Idle => {
                            session.ping_sent = Some(Instant::now());
                            let _ = tx.send(Message {
                                prefix: Some(Prefix::ServerName(matrix.server.name.clone())),
                                command: Command::Ping(matrix.server.name.clone(), None),
                            });
                            phase = TimerPhase::AwaitingPong;
                            deadline = tokio::time::Instant::now() + QUIT_TIMEOUT;
                        }
                        TimerPhase::AwaitingPong => {
                            break "connection timeout".to_string();
                        }
                    }
                }
            }
        };

        destroy(&matrix, uid, &session, tx, secure, &reason).await;
        let _ = writer.await;
        info!(%uid, %reason, "client destroyed");
    }
}

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<
        Framed<crate::network::ClientStream, LineCodec>,
        String,
    >,
    mut rx: UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.send(msg.to_string()).await {
            debug!(error = %e, "write error");
            break;
        }
    }
    let _ = sink.close().await;
}

/// Parse and dispatch one line. Returns a quit reason when the
/// connection should end.
async fn handle_line(
    registry: &Registry,
    ctx: &mut Context<'_>,
    line: &str,
) -> Option<String> {
    let msg: Message = match line.parse() {
        Ok(msg) => msg,
        Err(ProtocolError::NotEnoughArgs(command)) => {
            ctx.need_more_params(command);
            return None;
        }
        Err(e) => {
            debug!(error = %e, raw = %line, "unparseable line");
            ctx.send(Message {
                prefix: Some(Prefix::ServerName(ctx.server_name().to_string())),
                command: Command::Notice(ctx.nick(), "failed to parse command".to_string()),
            });
            return None;
        }
    };

    crate::metrics::CLIENT_COMMANDS.inc();
    let name = msg.command.name().to_string();
    let started = Instant::now();

    let result = registry.dispatch(ctx, &msg).await;

    crate::metrics::COMMAND_DURATION
        .with_label_values(&[&name])
        .observe(started.elapsed().as_secs_f64());

    if let Err(HandlerError::Quit(reason)) = result {
        return Some(reason);
    }

    // PING/PONG keep the connection alive but do not count as activity
    if ctx.session.registered && !matches!(name.as_str(), "PING" | "PONG") {
        if let Some(user) = ctx.matrix.users.get(&ctx.uid).map(|u| u.clone()) {
            user.write().await.atime = Instant::now();
        }
    }
    None
}

/// Tear a client down: leave channels, record WHOWAS, tell friends,
/// release the nick and close the reply queue.
async fn destroy(
    matrix: &Arc<Matrix>,
    uid: Uid,
    session: &SessionState,
    tx: UnboundedSender<Message>,
    secure: bool,
    reason: &str,
) {
    if session.registered {
        let friends = matrix.friends_of(uid).await;

        if let Some(user_arc) = matrix.users.get(&uid).map(|u| u.clone()) {
            let (nick, prefix, channels) = {
                let user = user_arc.read().await;
                matrix.whowas.lock().expect("whowas").append(WhoWas {
                    nick: user.nick.clone(),
                    username: user.username.clone(),
                    hostname: user.hostname.clone(),
                    realname: user.realname.clone(),
                });
                (
                    user.nick.clone(),
                    user.prefix(),
                    user.channels.iter().cloned().collect::<Vec<_>>(),
                )
            };

            for folded in &channels {
                if let Some(chan_arc) = matrix.channels.get(folded).map(|c| c.clone()) {
                    chan_arc.write().await.remove_member(uid);
                }
                matrix.drop_channel_if_empty(folded);
            }

            let quit_msg = Message {
                prefix: Some(prefix),
                command: Command::Quit(Some(reason.to_string())),
            };
            for friend in friends {
                if friend == uid {
                    continue;
                }
                if !matrix.send_to(friend, quit_msg.clone()) {
                    debug!(%friend, "quit fanout to dead client");
                }
            }

            matrix.release_nick(&nick, uid);
        }
        matrix.users.remove(&uid);
        crate::metrics::SERVER_REGISTERED.set(matrix.registered_count() as i64);
    } else if let Some(nick) = &session.nick {
        matrix.release_nick(nick, uid);
    }

    // goodbye line; the writer drains the queue before exiting
    let _ = tx.send(Message::from(Command::Error(format!(
        "Closing link: {}",
        reason
    ))));

    matrix.senders.remove(&uid);
    matrix.kills.remove(&uid);
    drop(tx);

    matrix.connections.fetch_sub(1, Ordering::Relaxed);
    crate::metrics::SERVER_CONNECTIONS.dec();
    crate::metrics::SERVER_CLIENTS
        .with_label_values(&[if secure { "true" } else { "false" }])
        .dec();

    if matrix.connection_count() < 0 {
        warn!("connection counter underflow");
    }
}
