//! SASL PLAIN over CAP negotiation.

mod common;

use common::{numeric_codes, TestServer};
use ferrum_proto::sasl::encode_plain;
use ferrum_proto::{Command, Response};

#[tokio::test]
async fn sasl_plain_success_before_welcome() {
    let server = TestServer::spawn_with_account("admin", "admin").await;
    let mut client = server.connect("a").await;

    client.send_raw("CAP LS").await;
    let ls = client
        .recv_until(|m| matches!(&m.command, Command::Cap(..)))
        .await;
    let Command::Cap(_, _, Some(caps)) = &ls.last().unwrap().command else {
        panic!("expected CAP LS reply");
    };
    assert!(caps.contains("sasl"));
    assert!(caps.contains("multi-prefix"));

    client.send_raw("CAP REQ :sasl").await;
    client
        .recv_until(
            |m| matches!(&m.command, Command::Cap(_, ferrum_proto::CapSubCommand::ACK, _)),
        )
        .await;

    client.send_raw("AUTHENTICATE PLAIN").await;
    client
        .recv_until(|m| matches!(&m.command, Command::Authenticate(d) if d == "+"))
        .await;

    client
        .send_raw(&format!("AUTHENTICATE {}", encode_plain("admin", "admin")))
        .await;
    let outcome = client.recv_until_numeric(Response::RPL_SASLSUCCESS).await;
    assert!(numeric_codes(&outcome).contains(&900));

    client.send_raw("CAP END").await;
    let burst = client.register().await;
    assert!(numeric_codes(&burst).contains(&1));
}

#[tokio::test]
async fn sasl_bad_password_fails_without_disconnect() {
    let server = TestServer::spawn_with_account("admin", "admin").await;
    let mut client = server.connect("a").await;

    client.send_raw("CAP LS").await;
    client
        .recv_until(|m| matches!(&m.command, Command::Cap(..)))
        .await;

    client.send_raw("AUTHENTICATE PLAIN").await;
    client
        .recv_until(|m| matches!(&m.command, Command::Authenticate(_)))
        .await;
    client
        .send_raw(&format!("AUTHENTICATE {}", encode_plain("admin", "nope")))
        .await;
    client.recv_until_numeric(Response::ERR_SASLFAIL).await;

    // still connected: registration completes normally
    client.send_raw("CAP END").await;
    let burst = client.register().await;
    assert!(numeric_codes(&burst).contains(&1));
}

#[tokio::test]
async fn sasl_abort_replies_906() {
    let server = TestServer::spawn_with_account("admin", "admin").await;
    let mut client = server.connect("a").await;

    client.send_raw("CAP LS").await;
    client
        .recv_until(|m| matches!(&m.command, Command::Cap(..)))
        .await;
    client.send_raw("AUTHENTICATE PLAIN").await;
    client
        .recv_until(|m| matches!(&m.command, Command::Authenticate(_)))
        .await;
    client.send_raw("AUTHENTICATE *").await;
    client.recv_until_numeric(Response::ERR_SASLABORTED).await;
}

#[tokio::test]
async fn unknown_mechanism_rejected() {
    let server = TestServer::spawn_with_account("admin", "admin").await;
    let mut client = server.connect("a").await;

    client.send_raw("CAP LS").await;
    client
        .recv_until(|m| matches!(&m.command, Command::Cap(..)))
        .await;
    client.send_raw("AUTHENTICATE EXTERNAL").await;
    let seen = client.recv_until_numeric(Response::ERR_SASLFAIL).await;
    assert!(numeric_codes(&seen).contains(&908));
}

#[tokio::test]
async fn cap_negotiation_defers_registration() {
    let server = TestServer::spawn().await;
    let mut client = server.connect("late").await;

    client.send_raw("CAP LS").await;
    client
        .recv_until(|m| matches!(&m.command, Command::Cap(..)))
        .await;

    // NICK+USER land while negotiating: no welcome yet
    client.send(Command::Nick("late".to_string())).await;
    client
        .send(Command::User(
            "late".to_string(),
            "0".to_string(),
            "*".to_string(),
            "Late".to_string(),
        ))
        .await;
    assert!(
        client
            .recv_timeout(std::time::Duration::from_millis(300))
            .await
            .is_none(),
        "no burst while CAP negotiation is open"
    );

    client.send_raw("CAP END").await;
    let burst = client.recv_until_numeric(Response::ERR_NOMOTD).await;
    assert!(numeric_codes(&burst).contains(&1));
}
