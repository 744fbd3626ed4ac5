mod common;

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use weaver_ot_client::weaver_ot::{Rope, TextOp};
use weaver_ot_client::{DocumentId, Fault, MemoryServer, RecordingSink, SyncError};

use common::{TextWorkspace, config, open, server_text, text, workspace};

const CLIENTS: usize = 3;
const STEPS: usize = 80;
const FAULT_RATE: f64 = 0.2;

fn random_edit(rng: &mut StdRng, text: &str) -> TextOp {
    let len = text.chars().count();
    if len > 0 && rng.random_bool(0.35) {
        let pos = rng.random_range(0..len);
        let count = rng.random_range(1..=(len - pos).min(4));
        TextOp::delete_at(pos, count)
    } else {
        let pos = rng.random_range(0..=len);
        let inserted: String = (0..rng.random_range(1..4))
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect();
        TextOp::insert_at(pos, &inserted)
    }
}

fn random_fault(rng: &mut StdRng) -> Fault {
    match rng.random_range(0..4) {
        0 => Fault::Conflict,
        1 => Fault::Transient,
        2 => Fault::Network,
        _ => Fault::ResponseLost,
    }
}

fn converged(clients: &[TextWorkspace], server: &MemoryServer<TextOp>, id: &DocumentId) -> bool {
    let expected = server_text(server, id);
    let head = server.head(id);
    clients.iter().all(|ws| {
        ws.session(id).is_some_and(|session| {
            session.is_synchronized()
                && session.is_ready()
                && !session.is_resynchronizing()
                && Some(session.revision()) == head
        }) && text(ws, id) == expected
    })
}

/// Random edits, undos and redos from several replicas while submit
/// requests fail at random, then check that everyone ends on the server's
/// document.
async fn run(seed: u64) {
    let server = MemoryServer::<TextOp>::new().with_latency(Duration::from_millis(2));
    let sink = RecordingSink::new();
    let id = DocumentId::new("doc");
    server.create(id.clone(), json!(""));

    let mut clients: Vec<TextWorkspace> = (0..CLIENTS)
        .map(|_| {
            let mut ws = workspace(&server, &sink, config());
            open(&mut ws, &server, &id, Rope::new(), 0);
            ws
        })
        .collect();
    let mut rng = StdRng::seed_from_u64(seed);

    for step in 0..STEPS {
        if rng.random_bool(FAULT_RATE) {
            server.inject(random_fault(&mut rng), 1);
        }
        let ws = &mut clients[rng.random_range(0..CLIENTS)];
        let roll: f64 = rng.random();
        let result = if roll < 0.12 {
            ws.undo().map(|_| ())
        } else if roll < 0.18 {
            ws.redo().map(|_| ())
        } else {
            let current = text(ws, &id);
            ws.edit(&id, random_edit(&mut rng, &current))
        };
        match result {
            Ok(()) | Err(SyncError::Resynchronizing(_)) => {}
            Err(err) => panic!("seed {seed}, step {step}: {err}"),
        }

        tokio::time::sleep(Duration::from_millis(rng.random_range(0..4))).await;
        for ws in clients.iter_mut() {
            ws.process_pending();
        }
    }

    for _ in 0..2000 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        for ws in clients.iter_mut() {
            ws.process_pending();
        }
        if converged(&clients, &server, &id) {
            return;
        }
    }

    let replicas: Vec<_> = clients
        .iter()
        .map(|ws| {
            let session = ws.session(&id).unwrap();
            (text(ws, &id), session.revision(), session.state().name())
        })
        .collect();
    panic!(
        "seed {seed}: server {:?} at {:?}, replicas {replicas:?}",
        server_text(&server, &id),
        server.head(&id)
    );
}

#[tokio::test(start_paused = true)]
async fn test_replicas_converge_under_random_faults() {
    for seed in 1..=12 {
        run(seed).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_replicas_converge_when_every_response_is_lost_once() {
    let server = MemoryServer::<TextOp>::new();
    let sink = RecordingSink::new();
    let id = DocumentId::new("doc");
    server.create(id.clone(), json!("shared"));

    let mut clients: Vec<TextWorkspace> = (0..CLIENTS)
        .map(|_| {
            let mut ws = workspace(&server, &sink, config());
            open(&mut ws, &server, &id, Rope::from_str("shared"), 0);
            ws
        })
        .collect();
    for ws in clients.iter_mut() {
        ws.process_pending();
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    for ws in clients.iter_mut() {
        ws.process_pending();
    }

    for (index, ws) in clients.iter_mut().enumerate() {
        server.inject(Fault::ResponseLost, 1);
        ws.edit(&id, TextOp::insert_at(0, &index.to_string())).unwrap();
    }
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        for ws in clients.iter_mut() {
            ws.process_pending();
        }
    }

    assert_eq!(server.head(&id), Some(CLIENTS as u64));
    assert!(converged(&clients, &server, &id));
}
