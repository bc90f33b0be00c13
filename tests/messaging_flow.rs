//! PRIVMSG/NOTICE delivery and speaking policy.

mod common;

use common::{numeric_codes, TestServer};
use ferrum_proto::{Command, Response};
use std::time::Duration;

#[tokio::test]
async fn channel_privmsg_fans_out_except_sender() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#chat").await;
    bob.join_and_sync("#chat").await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#chat"))
        .await;

    alice
        .send(Command::Privmsg("#chat".to_string(), "hello bob".to_string()))
        .await;

    let seen = bob
        .recv_until(|m| matches!(&m.command, Command::Privmsg(t, _) if t == "#chat"))
        .await;
    let msg = seen.last().unwrap();
    assert!(matches!(&msg.command, Command::Privmsg(_, text) if text == "hello bob"));
    // prefixed with the sender identity
    let prefix = msg.prefix.as_ref().expect("sender prefix").to_string();
    assert!(prefix.starts_with("alice!"));

    // no echo to the sender
    assert!(alice.recv_timeout(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn no_outside_messages_on_default_channels() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#x").await;

    // bob is not a member; channels default to +n
    bob.send(Command::Privmsg("#x".to_string(), "hi".to_string()))
        .await;
    let seen = bob.recv_until_numeric(Response::ERR_CANNOTSENDTOCHAN).await;
    let Command::Response(_, params) = &seen.last().unwrap().command else {
        panic!("expected numeric");
    };
    assert_eq!(params[1], "#x");

    // and alice hears nothing
    assert!(alice.recv_timeout(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn moderated_channel_needs_voice() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#m").await;
    bob.join_and_sync("#m").await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#m"))
        .await;

    alice
        .send(Command::Mode("#m".to_string(), vec!["+m".to_string()]))
        .await;
    bob.recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#m"))
        .await;

    bob.send(Command::Privmsg("#m".to_string(), "quiet?".to_string()))
        .await;
    bob.recv_until_numeric(Response::ERR_CANNOTSENDTOCHAN).await;

    // voice lifts the gate
    alice
        .send(Command::Mode(
            "#m".to_string(),
            vec!["+v".to_string(), "bob".to_string()],
        ))
        .await;
    bob.recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#m"))
        .await;

    bob.send(Command::Privmsg("#m".to_string(), "now?".to_string()))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Privmsg(_, text) if text == "now?"))
        .await;
}

#[tokio::test]
async fn direct_message_and_away_echo() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    bob.send(Command::Away(Some("lunch".to_string()))).await;
    bob.recv_until_numeric(Response::RPL_NOWAWAY).await;

    alice
        .send(Command::Privmsg("bob".to_string(), "ping".to_string()))
        .await;

    // bob gets the message, alice gets the away notice
    bob.recv_until(|m| matches!(&m.command, Command::Privmsg(_, text) if text == "ping"))
        .await;
    let seen = alice.recv_until_numeric(Response::RPL_AWAY).await;
    let Command::Response(_, params) = &seen.last().unwrap().command else {
        panic!("expected numeric");
    };
    assert_eq!(params[1], "bob");
    assert_eq!(params[2], "lunch");
}

#[tokio::test]
async fn privmsg_unknown_nick_is_401() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    alice.register().await;

    alice
        .send(Command::Privmsg("ghost".to_string(), "anyone?".to_string()))
        .await;
    let seen = alice.recv_until_numeric(Response::ERR_NOSUCHNICK).await;
    assert!(numeric_codes(&seen).contains(&401));
}

#[tokio::test]
async fn ison_and_userhost_report_presence() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice
        .send(Command::Ison(vec!["bob".to_string(), "ghost".to_string()]))
        .await;
    let seen = alice.recv_until_numeric(Response::RPL_ISON).await;
    let Command::Response(_, params) = &seen.last().unwrap().command else {
        panic!("expected numeric");
    };
    assert_eq!(params[1], "bob");

    alice
        .send(Command::Userhost(vec!["bob".to_string()]))
        .await;
    let seen = alice.recv_until_numeric(Response::RPL_USERHOST).await;
    let Command::Response(_, params) = &seen.last().unwrap().command else {
        panic!("expected numeric");
    };
    assert!(params[1].starts_with("bob=+"));
}
