mod common;

use std::time::Duration;

use serde_json::json;
use weaver_ot_client::weaver_ot::{Rope, TextOp};
use weaver_ot_client::{
    DocumentId, EditingSurface, Fault, MemoryServer, MemoryTransport, RecordingSink, ReportKind, SyncError,
};

use common::{TextWorkspace, config, open, server_text, settle, text, workspace};

struct Setup {
    server: MemoryServer<TextOp>,
    sink: RecordingSink,
    id: DocumentId,
}

impl Setup {
    fn new(initial: &str) -> Self {
        let server = MemoryServer::new();
        let id = DocumentId::new("doc");
        server.create(id.clone(), json!(initial));
        Self {
            server,
            sink: RecordingSink::new(),
            id,
        }
    }

    fn client(&self, initial: &str) -> TextWorkspace {
        let mut ws = workspace(&self.server, &self.sink, config());
        open(&mut ws, &self.server, &self.id, Rope::from_str(initial), 0);
        ws
    }

    fn state(&self, ws: &TextWorkspace) -> &'static str {
        ws.session(&self.id).unwrap().state().name()
    }
}

#[tokio::test(start_paused = true)]
async fn test_local_edits_buffer_until_ack() {
    let s = Setup::new("");
    let mut ws = s.client("");
    settle(&mut [&mut ws]).await;

    ws.edit(&s.id, TextOp::insert_at(0, "a")).unwrap();
    assert_eq!(s.state(&ws), "awaiting_confirm");
    ws.edit(&s.id, TextOp::insert_at(1, "b")).unwrap();
    assert_eq!(s.state(&ws), "awaiting_with_buffer");
    ws.edit(&s.id, TextOp::insert_at(2, "c")).unwrap();
    assert_eq!(s.state(&ws), "awaiting_with_buffer");

    settle(&mut [&mut ws]).await;

    let session = ws.session(&s.id).unwrap();
    assert!(session.is_synchronized());
    assert!(session.is_ready());
    assert_eq!(session.revision(), 2);
    // The outstanding edit and then the whole buffer, nothing more.
    assert_eq!(s.server.head(&s.id), Some(2));
    assert_eq!(server_text(&s.server, &s.id), "abc");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_clients_converge() {
    let s = Setup::new("");
    let mut a = s.client("");
    let mut b = s.client("");
    settle(&mut [&mut a, &mut b]).await;

    a.edit(&s.id, TextOp::insert_at(0, "hello")).unwrap();
    b.edit(&s.id, TextOp::insert_at(0, "world")).unwrap();
    b.edit(&s.id, TextOp::insert_at(5, "!")).unwrap();
    settle(&mut [&mut a, &mut b]).await;

    let expected = server_text(&s.server, &s.id);
    assert_eq!(expected.len(), 11);
    assert_eq!(text(&a, &s.id), expected);
    assert_eq!(text(&b, &s.id), expected);
    assert!(a.session(&s.id).unwrap().is_synchronized());
    assert!(b.session(&s.id).unwrap().is_synchronized());
    assert!(s.sink.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_acks_do_not_advance() {
    let s = Setup::new("");
    let mut ws = s.client("");
    ws.edit(&s.id, TextOp::insert_at(0, "x")).unwrap();
    settle(&mut [&mut ws]).await;
    assert_eq!(ws.session(&s.id).unwrap().revision(), 1);

    s.server.rebroadcast(&s.id, 1).unwrap();
    s.server.rebroadcast(&s.id, 1).unwrap();
    settle(&mut [&mut ws]).await;

    assert_eq!(s.sink.count(ReportKind::DuplicateAck), 2);
    assert_eq!(ws.session(&s.id).unwrap().revision(), 1);
    assert_eq!(text(&ws, &s.id), "x");
}

#[tokio::test(start_paused = true)]
async fn test_invalid_messages_force_reconnect() {
    let s = Setup::new("abc");
    let mut ws = s.client("abc");
    settle(&mut [&mut ws]).await;

    s.server.broadcast_raw(&s.id, None);
    settle(&mut [&mut ws]).await;
    assert_eq!(s.sink.count(ReportKind::ValidationFailed), 1);

    s.server.broadcast_raw(
        &s.id,
        Some(json!({"revision": 9, "operation": {"ops": [{"insert": "z"}]}})),
    );
    settle(&mut [&mut ws]).await;
    assert_eq!(s.sink.count(ReportKind::ValidationFailed), 2);

    s.server.broadcast_raw(
        &s.id,
        Some(json!({"revision": 1, "operation": [{"p": [0], "li": "z"}]})),
    );
    settle(&mut [&mut ws]).await;
    assert_eq!(s.sink.count(ReportKind::ValidationFailed), 3);

    // Nothing was applied and the document reconnected each time.
    let session = ws.session(&s.id).unwrap();
    assert!(session.is_ready());
    assert_eq!(session.revision(), 0);
    assert_eq!(text(&ws, &s.id), "abc");

    ws.edit(&s.id, TextOp::insert_at(3, "d")).unwrap();
    settle(&mut [&mut ws]).await;
    assert_eq!(server_text(&s.server, &s.id), "abcd");
}

#[tokio::test(start_paused = true)]
async fn test_conflict_rolls_back_outstanding_and_buffer() {
    let s = Setup::new("base");
    let mut ws = s.client("base");
    settle(&mut [&mut ws]).await;

    s.server.inject(Fault::Conflict, 1);
    ws.edit(&s.id, TextOp::insert_at(4, "!")).unwrap();
    ws.edit(&s.id, TextOp::insert_at(0, ">")).unwrap();
    assert_eq!(text(&ws, &s.id), ">base!");
    settle(&mut [&mut ws]).await;

    let session = ws.session(&s.id).unwrap();
    assert_eq!(text(&ws, &s.id), "base");
    assert!(session.is_synchronized());
    assert!(!session.undo_stack().can_undo());
    assert_eq!(s.server.head(&s.id), Some(0));
    assert_eq!(s.sink.count(ReportKind::RollbackCeiling), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_over_overlapping_remote_delete_matches_server() {
    let s = Setup::new("abcd");
    let mut alice = s.client("abcd");
    let mut bob = s.client("abcd");
    settle(&mut [&mut alice, &mut bob]).await;

    // Bob's delete of "cd" commits and reaches alice's queue before she
    // learns that her delete of "bc" was rejected.
    bob.edit(&s.id, TextOp::delete_at(2, 2)).unwrap();
    settle(&mut [&mut bob]).await;
    s.server.inject(Fault::Conflict, 1);
    alice.edit(&s.id, TextOp::delete_at(1, 2)).unwrap();
    assert_eq!(text(&alice, &s.id), "ad");
    settle(&mut [&mut alice, &mut bob]).await;

    assert_eq!(server_text(&s.server, &s.id), "ab");
    assert_eq!(text(&alice, &s.id), "ab");
    assert_eq!(text(&bob, &s.id), "ab");
    let session = alice.session(&s.id).unwrap();
    assert!(session.is_synchronized());
    assert_eq!(session.revision(), 1);
    assert_eq!(session.server_document(), &json!("ab"));

    alice.edit(&s.id, TextOp::insert_at(2, "!")).unwrap();
    settle(&mut [&mut alice, &mut bob]).await;
    assert_eq!(text(&bob, &s.id), "ab!");
}

#[tokio::test(start_paused = true)]
async fn test_rollback_ceiling_resynchronizes() {
    let s = Setup::new("base");
    let mut other = s.client("base");
    let mut ws = s.client("base");
    settle(&mut [&mut ws, &mut other]).await;

    s.server.inject(Fault::Conflict, 4);
    for _ in 0..4 {
        ws.edit(&s.id, TextOp::insert_at(0, "x")).unwrap();
        settle(&mut [&mut ws]).await;
    }
    assert_eq!(s.sink.count(ReportKind::RollbackCeiling), 1);

    other.edit(&s.id, TextOp::insert_at(4, "!")).unwrap();
    settle(&mut [&mut ws, &mut other]).await;

    let session = ws.session(&s.id).unwrap();
    assert!(!session.is_resynchronizing());
    assert!(session.is_synchronized());
    assert_eq!(text(&ws, &s.id), "base!");
    assert_eq!(session.revision(), 1);

    ws.edit(&s.id, TextOp::insert_at(0, "y")).unwrap();
    settle(&mut [&mut ws, &mut other]).await;
    assert_eq!(server_text(&s.server, &s.id), "ybase!");
    assert_eq!(text(&other, &s.id), "ybase!");
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let s = Setup::new("");
    let mut ws = s.client("");
    settle(&mut [&mut ws]).await;

    s.server.inject(Fault::Transient, 2);
    ws.edit(&s.id, TextOp::insert_at(0, "kept")).unwrap();
    settle(&mut [&mut ws]).await;

    assert_eq!(s.sink.count(ReportKind::SendFailed), 2);
    assert_eq!(server_text(&s.server, &s.id), "kept");
    assert!(ws.session(&s.id).unwrap().is_synchronized());
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_resends_after_reconnect() {
    let s = Setup::new("");
    let mut ws = s.client("");
    settle(&mut [&mut ws]).await;

    s.server.inject(Fault::Network, 1);
    ws.edit(&s.id, TextOp::insert_at(0, "x")).unwrap();
    settle(&mut [&mut ws]).await;

    assert_eq!(s.server.head(&s.id), Some(1));
    assert_eq!(server_text(&s.server, &s.id), "x");
    let session = ws.session(&s.id).unwrap();
    assert!(session.is_synchronized());
    assert!(session.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_lost_response_is_not_committed_twice() {
    let s = Setup::new("");
    let mut ws = s.client("");
    let mut other = s.client("");
    settle(&mut [&mut ws, &mut other]).await;

    s.server.inject(Fault::ResponseLost, 1);
    s.server.inject(Fault::Conflict, 1);
    ws.edit(&s.id, TextOp::insert_at(0, "once")).unwrap();
    settle(&mut [&mut ws, &mut other]).await;

    assert_eq!(s.server.head(&s.id), Some(1));
    assert_eq!(server_text(&s.server, &s.id), "once");
    assert_eq!(text(&ws, &s.id), "once");
    assert_eq!(text(&other, &s.id), "once");
    assert!(ws.session(&s.id).unwrap().is_synchronized());

    // The queued conflict lands on the next new submission instead.
    other.edit(&s.id, TextOp::insert_at(4, "?")).unwrap();
    settle(&mut [&mut ws, &mut other]).await;
    assert_eq!(text(&other, &s.id), "once");
    assert_eq!(server_text(&s.server, &s.id), "once");
}

#[tokio::test(start_paused = true)]
async fn test_catch_up_after_dropped_connections() {
    let s = Setup::new("");
    let mut a = s.client("");
    let mut b = s.client("");
    settle(&mut [&mut a, &mut b]).await;

    s.server.drop_connections(&s.id, Duration::from_millis(50));
    a.edit(&s.id, TextOp::insert_at(0, "a")).unwrap();
    b.edit(&s.id, TextOp::insert_at(0, "b")).unwrap();
    settle(&mut [&mut a, &mut b]).await;

    let expected = server_text(&s.server, &s.id);
    assert_eq!(s.server.head(&s.id), Some(2));
    assert_eq!(text(&a, &s.id), expected);
    assert_eq!(text(&b, &s.id), expected);
    for ws in [&a, &b] {
        let session = ws.session(&s.id).unwrap();
        assert!(session.is_synchronized());
        assert!(session.is_ready());
        assert_eq!(session.revision(), 2);
    }
    assert_eq!(s.sink.count(ReportKind::CatchUpFailed), 0);
}

#[tokio::test(start_paused = true)]
async fn test_local_change_reported_by_surface() {
    let s = Setup::new("abc");
    let mut ws = s.client("abc");
    settle(&mut [&mut ws]).await;

    let old = text(&ws, &s.id);
    let op = TextOp::delete_at(0, 1);
    ws.surface_mut(&s.id).unwrap().apply_operation(&op).unwrap();
    ws.local_change(&s.id, op, old.as_str()).unwrap();
    settle(&mut [&mut ws]).await;

    assert_eq!(server_text(&s.server, &s.id), "bc");
    assert!(ws.session(&s.id).unwrap().undo_stack().can_undo());
}

#[tokio::test(start_paused = true)]
async fn test_open_and_close_lifecycle() {
    let s = Setup::new("");
    let mut ws = s.client("");
    let transport = MemoryTransport::new(s.server.clone(), ws.event_sender(&s.id));
    assert!(matches!(
        ws.open(s.id.clone(), Rope::new(), transport, 0),
        Err(SyncError::DuplicateDocument(_))
    ));

    ws.edit(&s.id, TextOp::insert_at(0, "z")).unwrap();
    let rope = ws.close(&s.id).unwrap();
    assert_eq!(rope.to_string(), "z");
    assert!(ws.session(&s.id).is_none());
    assert!(matches!(
        ws.edit(&s.id, TextOp::insert_at(0, "q")),
        Err(SyncError::UnknownDocument(_))
    ));
    assert_eq!(ws.undo().unwrap(), None);

    // Late events for the closed document are dropped.
    settle(&mut [&mut ws]).await;
}
