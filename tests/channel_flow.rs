//! Channel join authorization, names, topic and mode flows.

mod common;

use common::{numeric_codes, TestServer};
use ferrum_proto::{Command, Response};
use std::time::Duration;

#[tokio::test]
async fn first_joiner_is_op_and_names_shows_it() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    alice.register().await;

    let seen = alice.join_and_sync("#j").await;

    // the join echo comes back to the joiner
    assert!(seen
        .iter()
        .any(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#j")));

    // 353 with the operator prefix, then 366
    let names = seen.iter().find_map(|m| match &m.command {
        Command::Response(Response::RPL_NAMREPLY, params) => Some(params.clone()),
        _ => None,
    });
    let params = names.expect("RPL_NAMREPLY in join burst");
    assert_eq!(params[1], "=");
    assert_eq!(params[2], "#j");
    assert_eq!(params[3], "@alice");
    assert!(numeric_codes(&seen).contains(&366));
}

#[tokio::test]
async fn invite_only_rejects_outsiders() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#x").await;
    alice
        .send(Command::Mode("#x".to_string(), vec!["+i".to_string()]))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#x"))
        .await;

    bob.join("#x").await;
    let seen = bob.recv_until_numeric(Response::ERR_INVITEONLYCHAN).await;
    let Command::Response(_, params) = &seen.last().unwrap().command else {
        panic!("expected numeric");
    };
    assert_eq!(params[1], "#x");
    assert!(params[2].contains("+i"));
}

#[tokio::test]
async fn invite_lets_the_invitee_in() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#x").await;
    alice
        .send(Command::Mode("#x".to_string(), vec!["+i".to_string()]))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#x"))
        .await;

    alice
        .send(Command::Invite("bob".to_string(), "#x".to_string()))
        .await;
    alice.recv_until_numeric(Response::RPL_INVITING).await;
    bob.recv_until(|m| matches!(&m.command, Command::Invite(nick, _) if nick == "bob"))
        .await;

    let seen = bob.join_and_sync("#x").await;
    assert!(seen
        .iter()
        .any(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#x")));
}

#[tokio::test]
async fn channel_key_good_and_bad() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#k").await;
    alice
        .send(Command::Mode(
            "#k".to_string(),
            vec!["+k".to_string(), "opensesame".to_string()],
        ))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#k"))
        .await;

    bob.send(Command::Join(
        vec!["#k".to_string()],
        vec!["wrongkey".to_string()],
    ))
    .await;
    bob.recv_until_numeric(Response::ERR_BADCHANNELKEY).await;

    bob.send(Command::Join(
        vec!["#k".to_string()],
        vec!["opensesame".to_string()],
    ))
    .await;
    let seen = bob
        .recv_until(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#k"))
        .await;
    assert!(!seen.is_empty());
}

#[tokio::test]
async fn channel_limit_full() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#small").await;
    alice
        .send(Command::Mode(
            "#small".to_string(),
            vec!["+l".to_string(), "1".to_string()],
        ))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#small"))
        .await;

    bob.join("#small").await;
    bob.recv_until_numeric(Response::ERR_CHANNELISFULL).await;
}

#[tokio::test]
async fn ban_and_exception_lists() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#b").await;
    alice
        .send(Command::Mode(
            "#b".to_string(),
            vec!["+b".to_string(), "bob!*@*".to_string()],
        ))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#b"))
        .await;

    bob.join("#b").await;
    bob.recv_until_numeric(Response::ERR_BANNEDFROMCHAN).await;

    // querying the list shows the mask
    alice
        .send(Command::Mode("#b".to_string(), vec!["+b".to_string()]))
        .await;
    let listing = alice.recv_until_numeric(Response::RPL_ENDOFBANLIST).await;
    assert!(listing.iter().any(|m| match &m.command {
        Command::Response(Response::RPL_BANLIST, params) => params[2] == "bob!*@*",
        _ => false,
    }));

    // an exception lets the banned mask back in
    alice
        .send(Command::Mode(
            "#b".to_string(),
            vec!["+e".to_string(), "bob!*@*".to_string()],
        ))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#b"))
        .await;
    let seen = bob.join_and_sync("#b").await;
    assert!(seen
        .iter()
        .any(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#b")));
}

#[tokio::test]
async fn topic_requires_op_under_plus_t() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#t").await;
    bob.join_and_sync("#t").await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#t"))
        .await;

    // channels default to +t: a plain member may not set the topic
    bob.send(Command::Topic(
        "#t".to_string(),
        Some("bob was here".to_string()),
    ))
    .await;
    bob.recv_until_numeric(Response::ERR_CHANOPRIVSNEEDED).await;

    // the op may, and everyone sees the change
    alice
        .send(Command::Topic(
            "#t".to_string(),
            Some("release at noon".to_string()),
        ))
        .await;
    bob.recv_until(
        |m| matches!(&m.command, Command::Topic(_, Some(text)) if text == "release at noon"),
    )
    .await;

    // topic query answers 332
    bob.send(Command::Topic("#t".to_string(), None)).await;
    let seen = bob.recv_until_numeric(Response::RPL_TOPIC).await;
    let Command::Response(_, params) = &seen.last().unwrap().command else {
        panic!("expected numeric");
    };
    assert_eq!(params[2], "release at noon");
}

#[tokio::test]
async fn kick_removes_target() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    alice.register().await;
    bob.register().await;

    alice.join_and_sync("#k").await;
    bob.join_and_sync("#k").await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Join(chans, _) if chans[0] == "#k"))
        .await;

    // a non-op cannot kick
    bob.send(Command::Kick(
        vec!["#k".to_string()],
        vec!["alice".to_string()],
        None,
    ))
    .await;
    bob.recv_until_numeric(Response::ERR_CHANOPRIVSNEEDED).await;

    alice
        .send(Command::Kick(
            vec!["#k".to_string()],
            vec!["bob".to_string()],
            Some("spam".to_string()),
        ))
        .await;
    let seen = bob
        .recv_until(|m| matches!(&m.command, Command::Kick(..)))
        .await;
    let Command::Kick(chans, users, comment) = &seen.last().unwrap().command else {
        panic!("expected KICK");
    };
    assert_eq!(chans[0], "#k");
    assert_eq!(users[0], "bob");
    assert_eq!(comment.as_deref(), Some("spam"));

    // bob is gone: speaking from outside a +n channel fails
    bob.send(Command::Privmsg("#k".to_string(), "hi".to_string()))
        .await;
    bob.recv_until_numeric(Response::ERR_CANNOTSENDTOCHAN).await;
}

#[tokio::test]
async fn mode_query_shows_positional_args() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    alice.register().await;

    alice.join_and_sync("#m").await;
    alice
        .send(Command::Mode(
            "#m".to_string(),
            vec!["+k".to_string(), "sesame".to_string()],
        ))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#m"))
        .await;
    alice
        .send(Command::Mode(
            "#m".to_string(),
            vec!["+l".to_string(), "25".to_string()],
        ))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Mode(t, _) if t == "#m"))
        .await;

    alice.send(Command::Mode("#m".to_string(), vec![])).await;
    let seen = alice.recv_until_numeric(Response::RPL_CHANNELMODEIS).await;
    let Command::Response(_, params) = &seen.last().unwrap().command else {
        panic!("expected numeric");
    };
    // +kl<flags> with key and limit in flag order
    assert_eq!(params[1], "#m");
    assert!(params[2].starts_with("+kl"));
    assert_eq!(params[3], "sesame");
    assert_eq!(params[4], "25");
}

#[tokio::test]
async fn part_empties_and_destroys_channel() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect("alice").await;
    alice.register().await;

    alice.join_and_sync("#gone").await;
    assert_eq!(server.matrix.channel_count(), 1);

    alice
        .send(Command::Part(vec!["#gone".to_string()], None))
        .await;
    alice
        .recv_until(|m| matches!(&m.command, Command::Part(chans, _) if chans[0] == "#gone"))
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.matrix.channel_count(), 0);
}
