//! End-to-end pipeline tests against a real local TCP server:
//! socket → reader → dispatch queue → plugin handlers → writer → socket.

use std::collections::BTreeMap;
use std::time::Duration;

use irk_core::handlers::{BusEventHandler, MessageHandler, MessageHandlerConfig};
use irk_core::{BotConfig, Connection, Flow, Plugin};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

fn config_for(port: u16) -> BotConfig {
    BotConfig {
        server: "127.0.0.1".to_string(),
        port,
        nick: "irkbot".to_string(),
        channels: vec!["#chan".to_string()],
        rate_limit_ms: 0,
        watchdog_timeout_secs: 3600,
        ..BotConfig::default()
    }
}

#[tokio::test]
async fn privmsg_reaches_plugin_through_full_pipeline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Fake server: wait for the JOIN, then deliver one command.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.starts_with("JOIN") {
                write_half
                    .write_all(b":nick!~user@host PRIVMSG #chan :!bot help\r\n")
                    .await
                    .unwrap();
            }
            if line.starts_with("QUIT") {
                break;
            }
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handler = MessageHandler::new(MessageHandlerConfig::new(
        r"!bot\s+help",
        Box::new(move |args| {
            tx.send((args.user.clone(), args.channel.clone(), args.message.clone()))
                .unwrap();
            Ok(Flow::Continue)
        }),
    ))
    .unwrap();

    let connection =
        Connection::new(config_for(port), vec![Plugin::new("help", vec![handler.into()])])
            .unwrap();
    connection.init();
    connection.connect().await.unwrap();

    let (user, channel, message) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("callback within deadline")
        .expect("callback fired");
    assert_eq!(user, "nick");
    assert_eq!(channel, "#chan");
    assert_eq!(message, "!bot help");

    // Exactly one invocation for one line.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    connection.dispose().await;
    server.await.unwrap();
}

#[tokio::test]
async fn server_ping_is_answered_without_any_plugins() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        write_half.write_all(b"PING :liveness-check\r\n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            if line == "PONG :liveness-check" {
                return true;
            }
            if line.starts_with("QUIT") {
                return false;
            }
        }
        false
    });

    let connection = Connection::new(config_for(port), Vec::new()).unwrap();
    connection.init();
    connection.connect().await.unwrap();

    let ponged = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server saw an answer")
        .unwrap();
    assert!(ponged);

    connection.dispose().await;
}

#[tokio::test]
async fn bus_events_flow_between_plugins() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let receiver = BusEventHandler::new(
        "receiver",
        Box::new(move |args| {
            tx.send(args.event.clone()).unwrap();
            Ok(Flow::Continue)
        }),
    );

    // Never connects; the bus only needs the dispatch queue.
    let connection = Connection::new(
        config_for(1),
        vec![Plugin::new("receiver", vec![receiver.into()])],
    )
    .unwrap();
    connection.init();

    let sender = connection.bus_factory().for_plugin("sender");
    let mut args = BTreeMap::new();
    args.insert("question".to_string(), "weather in 02101?".to_string());
    let event = sender.targeted("receiver", args);
    sender.send(&event);

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("delivery within deadline")
        .expect("event delivered");
    assert_eq!(received, event);

    connection.dispose().await;
}
