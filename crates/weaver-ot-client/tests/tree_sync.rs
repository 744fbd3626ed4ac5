mod common;

use weaver_ot_client::weaver_ot::builders::{edit_text, insert_element, remove_element};
use weaver_ot_client::weaver_ot::{Element, Pane, PaneList, TextOp, TreeOp};
use weaver_ot_client::{DocumentId, Fault, MemoryServer, RecordingSink, ReportKind};

use common::{TreeWorkspace, config, open, settle, workspace};

fn board() -> Pane {
    Pane::new("board", "kanban")
        .with_list(
            PaneList::new("todo")
                .with_element(Element::text("t1", "write tests"))
                .with_element(Element::text("t2", "ship")),
        )
        .with_list(PaneList::new("done"))
}

struct Setup {
    server: MemoryServer<TreeOp>,
    sink: RecordingSink,
    id: DocumentId,
}

impl Setup {
    fn new() -> Self {
        let server = MemoryServer::new();
        let id = DocumentId::new("board");
        server.create(id.clone(), board().to_json().unwrap());
        Self {
            server,
            sink: RecordingSink::new(),
            id,
        }
    }

    fn client(&self) -> TreeWorkspace<Pane> {
        let mut ws = workspace(&self.server, &self.sink, config());
        open(&mut ws, &self.server, &self.id, board(), 0);
        ws
    }

    fn server_pane(&self) -> Pane {
        Pane::from_json(self.server.document(&self.id).unwrap()).unwrap()
    }
}

fn pane<'a>(ws: &'a TreeWorkspace<Pane>, id: &DocumentId) -> &'a Pane {
    ws.surface(id).unwrap()
}

fn texts(pane: &Pane, list: usize) -> Vec<&str> {
    pane.lists[list]
        .elements
        .iter()
        .filter_map(Element::as_text)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_structural_edits_converge() {
    let s = Setup::new();
    let mut alice = s.client();
    let mut bob = s.client();
    settle(&mut [&mut alice, &mut bob]).await;

    let pair = insert_element(pane(&alice, &s.id), "todo", 0, &Element::text("t0", "plan")).unwrap();
    alice.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();

    let pair = edit_text(pane(&bob, &s.id), "todo", "t2", TextOp::insert_at(4, " it")).unwrap();
    bob.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();
    let pair = remove_element(pane(&bob, &s.id), "todo", "t1").unwrap();
    bob.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();

    settle(&mut [&mut alice, &mut bob]).await;

    let expected = s.server_pane();
    assert_eq!(texts(&expected, 0), vec!["plan", "ship it"]);
    assert_eq!(pane(&alice, &s.id), &expected);
    assert_eq!(pane(&bob, &s.id), &expected);
    assert_eq!(s.sink.count(ReportKind::ApplyFailed), 0);
}

#[tokio::test(start_paused = true)]
async fn test_undo_structural_edit_after_remote_text_edit() {
    let s = Setup::new();
    let mut alice = s.client();
    let mut bob = s.client();
    settle(&mut [&mut alice, &mut bob]).await;

    let pair = remove_element(pane(&alice, &s.id), "todo", "t2").unwrap();
    alice.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();
    settle(&mut [&mut alice, &mut bob]).await;

    let pair = edit_text(pane(&bob, &s.id), "todo", "t1", TextOp::insert_at(0, "!")).unwrap();
    bob.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();
    settle(&mut [&mut alice, &mut bob]).await;
    assert_eq!(texts(pane(&alice, &s.id), 0), vec!["!write tests"]);

    assert_eq!(alice.undo().unwrap(), Some(s.id.clone()));
    settle(&mut [&mut alice, &mut bob]).await;

    let expected = s.server_pane();
    assert_eq!(texts(&expected, 0), vec!["!write tests", "ship"]);
    assert_eq!(pane(&alice, &s.id), &expected);
    assert_eq!(pane(&bob, &s.id), &expected);

    assert_eq!(alice.redo().unwrap(), Some(s.id.clone()));
    settle(&mut [&mut alice, &mut bob]).await;
    assert_eq!(texts(&s.server_pane(), 0), vec!["!write tests"]);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_tree_edit_matches_server() {
    let s = Setup::new();
    let mut alice = s.client();
    settle(&mut [&mut alice]).await;

    let pair = edit_text(pane(&alice, &s.id), "todo", "t2", TextOp::insert_at(4, " it")).unwrap();
    alice.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();
    settle(&mut [&mut alice]).await;

    s.server.inject(Fault::Conflict, 1);
    let pair = remove_element(pane(&alice, &s.id), "todo", "t1").unwrap();
    alice.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();
    settle(&mut [&mut alice]).await;

    assert_eq!(pane(&alice, &s.id), &s.server_pane());
    assert_eq!(texts(pane(&alice, &s.id), 0), vec!["write tests", "ship it"]);
    let session = alice.session(&s.id).unwrap();
    assert!(session.is_synchronized());
    assert_eq!(session.server_document(), &s.server_pane().to_json().unwrap());
    assert!(!session.undo_stack().can_undo());
    assert_eq!(alice.undo().unwrap(), None);
    assert_eq!(s.sink.count(ReportKind::RollbackFailed), 0);
}

#[tokio::test(start_paused = true)]
async fn test_plain_json_surface_follows_pane() {
    let s = Setup::new();
    let mut alice = s.client();
    let mut raw: TreeWorkspace<serde_json::Value> = workspace(&s.server, &s.sink, config());
    open(&mut raw, &s.server, &s.id, board().to_json().unwrap(), 0);
    settle(&mut [&mut alice]).await;
    settle(&mut [&mut raw]).await;

    let pair = insert_element(pane(&alice, &s.id), "done", 0, &Element::text("d1", "done!")).unwrap();
    alice.edit_with_inverse(&s.id, pair.op, pair.inverse).unwrap();
    settle(&mut [&mut alice]).await;
    settle(&mut [&mut raw]).await;

    let value = raw.surface(&s.id).unwrap().clone();
    assert_eq!(Pane::from_json(value).unwrap(), s.server_pane());
}
