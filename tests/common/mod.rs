//! Integration test infrastructure: an in-process server and a
//! line-oriented test client.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use ferrum_proto::{Command, Message, Response};
use ferrumd::config::{Config, PassBlock};
use ferrumd::{Gateway, Matrix};

/// An in-process server bound to an ephemeral port.
pub struct TestServer {
    pub matrix: Arc<Matrix>,
    pub addr: std::net::SocketAddr,
}

impl TestServer {
    /// Spawn with the default test config (no password, no MOTD).
    pub async fn spawn() -> TestServer {
        TestServer::spawn_with(|_| {}).await
    }

    /// Spawn after letting the caller adjust the config.
    pub async fn spawn_with(adjust: impl FnOnce(&mut Config)) -> TestServer {
        let mut config = Config::for_tests();
        config.server.listen = vec!["127.0.0.1:0".to_string()];
        adjust(&mut config);

        let matrix = Arc::new(Matrix::new(&config));
        let gateway = Gateway::bind(&config, Arc::clone(&matrix))
            .await
            .expect("bind test server");
        let addr = gateway.local_addrs()[0];
        tokio::spawn(gateway.run());

        TestServer { matrix, addr }
    }

    /// Spawn with one SASL account configured.
    pub async fn spawn_with_account(name: &str, password: &str) -> TestServer {
        let encoded = ferrumd::security::generate_password(password).expect("hash");
        let name = name.to_string();
        TestServer::spawn_with(move |config| {
            config
                .account
                .insert(name, PassBlock { password: encoded });
        })
        .await
    }

    pub async fn connect(&self, nick: &str) -> TestClient {
        TestClient::connect(self.addr, nick).await
    }
}

/// A raw IRC client for driving the server.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    pub nick: String,
}

impl TestClient {
    pub async fn connect(addr: std::net::SocketAddr, nick: &str) -> TestClient {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, write_half) = stream.into_split();
        TestClient {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            nick: nick.to_string(),
        }
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.expect("write");
        self.writer.write_all(b"\r\n").await.expect("write crlf");
        self.writer.flush().await.expect("flush");
    }

    pub async fn send(&mut self, cmd: Command) {
        let line = Message::from(cmd).to_string();
        self.send_raw(&line).await;
    }

    pub async fn recv(&mut self) -> Message {
        self.recv_timeout(Duration::from_secs(5))
            .await
            .expect("no message within timeout")
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> Option<Message> {
        let mut line = String::new();
        let n = timeout(dur, self.reader.read_line(&mut line)).await.ok()?;
        let n = n.expect("read");
        if n == 0 {
            return None;
        }
        Some(line.trim_end().parse().expect("parse server line"))
    }

    /// Read until the predicate matches, returning every message seen.
    pub async fn recv_until(&mut self, mut pred: impl FnMut(&Message) -> bool) -> Vec<Message> {
        let mut seen = Vec::new();
        loop {
            let msg = self.recv().await;
            let done = pred(&msg);
            seen.push(msg);
            if done {
                return seen;
            }
        }
    }

    /// Read until a specific numeric arrives.
    pub async fn recv_until_numeric(&mut self, resp: Response) -> Vec<Message> {
        self.recv_until(|m| matches!(&m.command, Command::Response(r, _) if *r == resp))
            .await
    }

    /// NICK + USER, returning the whole welcome burst. The test config
    /// has no MOTD file, so 422 ends the burst.
    pub async fn register(&mut self) -> Vec<Message> {
        self.send(Command::Nick(self.nick.clone())).await;
        self.send(Command::User(
            self.nick.clone(),
            "0".to_string(),
            "*".to_string(),
            format!("Test {}", self.nick),
        ))
        .await;
        self.recv_until_numeric(Response::ERR_NOMOTD).await
    }

    pub async fn join(&mut self, channel: &str) {
        self.send(Command::Join(vec![channel.to_string()], Vec::new()))
            .await;
    }

    /// JOIN and wait for the end of the NAMES block.
    pub async fn join_and_sync(&mut self, channel: &str) -> Vec<Message> {
        self.join(channel).await;
        self.recv_until_numeric(Response::RPL_ENDOFNAMES).await
    }
}

/// Extract the numeric codes from a message list, in order.
pub fn numeric_codes(messages: &[Message]) -> Vec<u16> {
    messages
        .iter()
        .filter_map(|m| match &m.command {
            Command::Response(r, _) => Some(r.code()),
            _ => None,
        })
        .collect()
}
