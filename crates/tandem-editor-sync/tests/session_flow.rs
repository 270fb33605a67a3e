//! A document, its sync session and a channel, end to end over the in-memory transport.

use std::time::Duration;

use tandem_common::{
    HttpBootstrap, IncomingMessage, InitialSession, MemoryServer, MemoryTransport, RemoteUpdate,
    SessionKey, SyncConfig, UserId, UserState,
};
use tandem_editor_core::{EditorDocument, EditorRope, PlainEditor};
use tandem_editor_sync::{
    ApplyOutcome, ChannelEvent, ChannelEvents, RemoteOutcome, SessionChannel, SyncError,
    SyncSession,
};

type Doc = PlainEditor<EditorRope>;

fn key() -> SessionKey {
    SessionKey::new("s1", UserId::new("me"))
}

async fn next_remote(events: &mut ChannelEvents) -> RemoteUpdate {
    loop {
        match events.next().await {
            Some(ChannelEvent::Remote(update)) => return update,
            Some(_) => continue,
            None => panic!("channel closed"),
        }
    }
}

async fn next_report_due(events: &mut ChannelEvents) {
    loop {
        match events.next().await {
            Some(ChannelEvent::ReportDue) => return,
            Some(_) => continue,
            None => panic!("channel closed"),
        }
    }
}

async fn setup(text: &str) -> (Doc, SyncSession, SessionChannel, ChannelEvents, MemoryServer) {
    let config = SyncConfig::default();
    let mut doc = PlainEditor::new(EditorRope::new());
    let seed = InitialSession::new(text, "rust");
    let (session, _) = SyncSession::attach(&seed, &key(), &config, &mut doc)
        .await
        .unwrap();

    let (transport, server) = MemoryTransport::new();
    let (channel, events) = SessionChannel::spawn(transport, key(), config);
    channel
        .state()
        .wait_for(|s| s.is_connected())
        .await
        .unwrap();
    (doc, session, channel, events, server)
}

#[tokio::test(start_paused = true)]
async fn test_server_corrects_idle_caret() {
    let (mut doc, mut session, _channel, mut events, server) =
        setup("the quick brown fox jumps").await;
    doc.set_cursor_offset(10);

    server.broadcast(IncomingMessage::snapshot(
        "the quick brown fox jumps",
        "rust",
        vec![UserState::caret("me", 0, 14), UserState::caret("you", 1, 4)],
    ));
    let update = next_remote(&mut events).await;
    let outcome = session.handle_remote(&mut doc, &update);

    assert_eq!(outcome.text, Some(ApplyOutcome::Unchanged));
    assert_eq!(outcome.presence.corrected_caret, Some(14));
    assert_eq!(doc.cursor_offset(), 14);
    assert_eq!(session.presence(&doc).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_report_carries_shifted_presence() {
    let (mut doc, mut session, channel, mut events, mut server) =
        setup("the quick brown fox").await;

    server.broadcast(IncomingMessage::snapshot(
        "the quick brown fox",
        "rust",
        vec![UserState::caret("you", 1, 10)],
    ));
    let update = next_remote(&mut events).await;
    session.handle_remote(&mut doc, &update);

    // Local typing before the other caret.
    doc.insert(0, "see ");
    channel.mark_dirty().unwrap();
    next_report_due(&mut events).await;
    channel.send_report(session.build_report(&doc)).unwrap();

    let (from, sent) = server.recv().await.unwrap();
    assert_eq!(from, key());
    assert_eq!(sent.base_text.as_deref(), Some("the quick brown fox"));
    assert_eq!(sent.new_text.as_deref(), Some("see the quick brown fox"));
    assert_eq!(sent.cursor_pos, Some(4));
    let users = sent.users.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].position, 14);
    assert_eq!(users[0].id, "you");
}

#[tokio::test(start_paused = true)]
async fn test_echo_after_more_typing_keeps_local_text() {
    let (mut doc, mut session, channel, mut events, server) = setup("abc").await;

    doc.insert(3, "d");
    let report = session.build_report(&doc);
    channel.send_report(report.clone()).unwrap();
    doc.insert(4, "e");

    // The server echoes the first report while we keep typing.
    server.broadcast(IncomingMessage::snapshot(report.new_text, "rust", vec![]));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    while let Some(event) = events.try_next() {
        assert!(!matches!(event, ChannelEvent::Remote(_)));
    }

    let update = next_remote(&mut events).await;
    let RemoteOutcome { text, .. } = session.handle_remote(&mut doc, &update);
    assert_eq!(text, Some(ApplyOutcome::SuppressedEcho));
    assert_eq!(doc.content_string(), "abcde");
    assert_eq!(doc.cursor_offset(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_peer_revert_to_our_old_report_is_followed() {
    let (mut doc, mut session, channel, mut events, mut server) = setup("abc").await;

    doc.insert(3, "d");
    channel.send_report(session.build_report(&doc)).unwrap();
    let (_, sent) = server.recv().await.unwrap();
    assert_eq!(sent.new_text.as_deref(), Some("abcd"));

    // A peer appends, then undoes back to exactly what we reported.
    server.broadcast(IncomingMessage::snapshot("abcdX", "rust", vec![]));
    let update = next_remote(&mut events).await;
    let outcome = session.handle_remote(&mut doc, &update);
    assert!(outcome.text.is_some_and(|o| o.is_applied()));

    server.broadcast(IncomingMessage::snapshot("abcd", "rust", vec![]));
    let update = next_remote(&mut events).await;
    let outcome = session.handle_remote(&mut doc, &update);
    assert!(outcome.text.is_some_and(|o| o.is_applied()));
    assert_eq!(doc.content_string(), "abcd");

    channel.mark_dirty().unwrap();
    next_report_due(&mut events).await;
    channel.send_report(session.build_report(&doc)).unwrap();
    let (_, sent) = server.recv().await.unwrap();
    assert_eq!(sent.base_text.as_deref(), Some("abcd"));
    assert_eq!(sent.new_text.as_deref(), Some("abcd"));
}

#[tokio::test(start_paused = true)]
async fn test_remote_edit_preserves_local_caret() {
    let (mut doc, mut session, _channel, mut events, server) = setup("fn main() {}").await;
    doc.set_cursor_offset(11);

    server.broadcast(IncomingMessage::snapshot(
        "use std::io;\nfn main() {}",
        "rust",
        vec![],
    ));
    let update = next_remote(&mut events).await;
    let outcome = session.handle_remote(&mut doc, &update);

    assert!(outcome.text.is_some_and(|o| o.is_applied()));
    assert_eq!(doc.content_string(), "use std::io;\nfn main() {}");
    assert_eq!(doc.cursor_offset(), 24);
    assert_eq!(doc.char_at(24), Some('}'));
}

#[tokio::test]
async fn test_invalid_session_is_terminal() {
    let config = SyncConfig::default();
    let mut doc = PlainEditor::new(EditorRope::new());
    let bootstrap = HttpBootstrap::new("http://127.0.0.1:1/api/").with_retries(0);
    let result = SyncSession::attach(&bootstrap, &key(), &config, &mut doc).await;
    assert!(matches!(
        result,
        Err(SyncError::SessionInvalid { ref session_id }) if session_id == "s1"
    ));
}
