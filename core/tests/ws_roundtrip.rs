use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use sopcheck_core::{
    ChecklistSyncWidget, Connection, EventSender, EventSink, Server, SessionBoard, SopCatalog,
    UpdateOutcome,
};
use sopcheck_protocol::{decode_frame, ChecklistUpdate, InboundEvent, OutboundEvent, SessionId, SopUpdate};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};

const CATALOG: &str = r#"{
    "sessions": [
        { "session_id": "abc", "steps": [
            { "step_id": "s1", "step_number": 1, "description": "Open valve" },
            { "step_id": "s2", "step_number": 2, "description": "Check pressure" }
        ] },
        { "session_id": "xyz", "steps": [
            { "step_id": "s9", "step_number": 1, "description": "Other procedure" }
        ] }
    ]
}"#;

async fn start_server() -> String {
    let board = SessionBoard::from_catalog(SopCatalog::from_json(CATALOG).expect("catalog"));
    let server = Server::bind("127.0.0.1:0", board).await.expect("bind");
    let addr = server.local_addr().expect("addr");
    tokio::spawn(server.run());
    format!("ws://{addr}/ws")
}

async fn next(conn: &mut Connection) -> InboundEvent {
    timeout(Duration::from_secs(3), conn.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("connection closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn toggle_round_trips_through_dispatcher() {
    let url = start_server().await;
    let mut conn = Connection::connect(&url).await.expect("connect");
    let mut widget = ChecklistSyncWidget::new(SessionId::new("abc"), conn.sender.clone());

    // one snapshot per session on connect, only ours applies
    let mut applied = 0;
    for _ in 0..2 {
        if widget.handle_event(next(&mut conn).await) == UpdateOutcome::Applied {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(widget.container().len(), 2);
    assert_eq!(widget.container().rows()[0].label.text, "Open valve");

    widget.toggle("s1").expect("row");

    let outcome = widget.handle_event(next(&mut conn).await);
    assert_eq!(outcome, UpdateOutcome::Applied);
    let row = &widget.container().rows()[0];
    assert!(row.checkbox.checked);
    assert!(row.label.has_class("checked"));
    assert!(row.checked_at.is_some());
    assert!(!widget.container().rows()[1].checkbox.checked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn updates_are_broadcast_to_other_clients() {
    let url = start_server().await;
    let mut writer = Connection::connect(&url).await.expect("connect writer");
    let mut watcher = Connection::connect(&url).await.expect("connect watcher");

    let mut widget = ChecklistSyncWidget::new(SessionId::new("abc"), writer.sender.clone());
    for _ in 0..2 {
        widget.handle_event(next(&mut writer).await);
        next(&mut watcher).await;
    }
    widget.set_checked("s2", true).expect("row");

    let InboundEvent::SopUpdate(update) = next(&mut watcher).await;
    assert_eq!(update.session_id.as_str(), "abc");
    assert!(!update.checklist[0].checked);
    assert!(update.checklist[1].checked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_step_is_not_broadcast() {
    let url = start_server().await;
    let mut conn = Connection::connect(&url).await.expect("connect");
    next(&mut conn).await;
    next(&mut conn).await;

    conn.sender
        .emit(OutboundEvent::ChecklistUpdate(ChecklistUpdate::now(
            SessionId::new("abc"),
            "ghost",
            true,
        )))
        .expect("emit");

    let waited = timeout(Duration::from_millis(300), conn.next_event()).await;
    assert!(waited.is_err(), "server should not broadcast for an unknown step");
}

/// Next `sop_update` read off a raw socket.
async fn read_sop<S>(read: &mut S) -> SopUpdate
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(3), read.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            let InboundEvent::SopUpdate(update) = decode_frame::<InboundEvent>(text.as_str()).expect("decode");
            return update;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatcher_skips_malformed_frames() {
    let url = start_server().await;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.expect("ws connect");
    let (mut write, mut read) = ws.split();
    read_sop(&mut read).await;
    read_sop(&mut read).await;

    let frames = [
        "not json",
        r#"{"event":"bogus","data":{}}"#,
        r#"{"event":"checklist_update","data":{"session_id":"abc"}}"#,
        r#"{"event":"checklist_update","data":{"session_id":"abc","step_id":"s2","checked":true}}"#,
    ];
    for frame in frames {
        write.send(Message::Text(frame.to_string().into())).await.expect("send");
    }

    let update = read_sop(&mut read).await;
    assert_eq!(update.session_id.as_str(), "abc");
    assert!(!update.checklist[0].checked);
    assert!(update.checklist[1].checked);
    assert!(update.checklist[1].checked_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_skips_malformed_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let frames = [
            "{{garbage",
            r#"{"event":"bogus","data":{}}"#,
            r#"{"event":"sop_update","data":{"session_id":"abc"}}"#,
            r#"{"event":"sop_update","data":{"session_id":"abc","checklist":[{"step_id":"s1","description":"Open valve","checked":false}]}}"#,
        ];
        for frame in frames {
            ws.send(Message::Text(frame.to_string().into())).await.expect("send");
        }
        let _ = ws.next().await;
    });

    let mut conn = Connection::connect(&format!("ws://{addr}/ws")).await.expect("connect");
    let mut widget = ChecklistSyncWidget::new(SessionId::new("abc"), EventSender::noop());

    assert_eq!(widget.handle_event(next(&mut conn).await), UpdateOutcome::Applied);
    assert_eq!(widget.container().len(), 1);
    assert_eq!(widget.container().rows()[0].label.text, "Open valve");

    let waited = timeout(Duration::from_millis(200), conn.next_event()).await;
    assert!(waited.is_err(), "only the valid frame should be delivered");

    drop(conn);
    peer.abort();
}
