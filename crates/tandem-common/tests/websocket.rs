//! WsTransport against a local tungstenite server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tandem_common::{
    IncomingMessage, OutgoingMessage, SessionKey, Transport, TransportError, UserId, UserState,
    WsTransport,
};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[tokio::test]
async fn test_session_socket_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let first = ws.next().await.unwrap().unwrap();
        let received = OutgoingMessage::from_json(first.to_text().unwrap()).unwrap();

        // Garbage is dropped by the client, the snapshot after it gets through.
        ws.send(Message::Text("{not json".into())).await.unwrap();
        let snapshot = IncomingMessage::snapshot("shared", "go", vec![UserState::caret("other", 1, 2)]);
        ws.send(Message::Text(snapshot.to_json().unwrap().into()))
            .await
            .unwrap();

        let second = ws.next().await.unwrap().unwrap();
        let report = OutgoingMessage::from_json(second.to_text().unwrap()).unwrap();
        (received, report)
    });

    let transport = WsTransport::new(format!("ws://{addr}/api/"));
    let me = UserId::new("me");
    let mut conn = transport
        .connect(&SessionKey::new("abc", me.clone()))
        .await
        .unwrap();

    conn.send(OutgoingMessage::ping()).unwrap();
    let incoming = conn.events.next().await.unwrap();
    assert_eq!(incoming.new_text.as_deref(), Some("shared"));
    assert_eq!(incoming.language.as_deref(), Some("go"));
    assert_eq!(incoming.users.unwrap()[0].position, 2);

    conn.send(OutgoingMessage::input_text(&me, "stdin")).unwrap();

    let (ping, report) = server.await.unwrap();
    assert!(ping.ping);
    assert_eq!(report.input_text.as_deref(), Some("stdin"));
    assert_eq!(report.user_id, Some(me));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept the TCP connection but never answer the upgrade request.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let transport = WsTransport::new(format!("ws://{addr}/api/"))
        .with_connect_timeout(Duration::from_millis(200));
    let result = transport
        .connect(&SessionKey::new("abc", UserId::new("me")))
        .await;

    match result {
        Err(TransportError::ConnectTimeout { timeout, .. }) => {
            assert_eq!(timeout, Duration::from_millis(200));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("connected to a silent server"),
    }
    server.abort();
}
