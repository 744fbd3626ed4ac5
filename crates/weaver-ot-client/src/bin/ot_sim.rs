//! Drives several simulated editors against an in-memory server and checks
//! that every replica converges on the server's document.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, info, warn};
use weaver_ot_client::telemetry::{self, TelemetryConfig};
use weaver_ot_client::weaver_ot::{Rope, TextOp};
use weaver_ot_client::{
    DocumentId, Fault, MemoryServer, MemoryTransport, ReportKind, RecordingSink, SyncConfig,
    SyncError, Workspace,
};

type SimWorkspace = Workspace<TextOp, Rope, MemoryTransport<TextOp>, MemoryServer<TextOp>>;

#[derive(Parser)]
#[command(name = "ot-sim")]
#[command(about = "Simulate concurrent editors against an in-memory OT server")]
struct Args {
    /// Number of simulated editors
    #[arg(long, default_value_t = 3)]
    clients: usize,

    /// Number of random edits across all editors
    #[arg(long, default_value_t = 200)]
    edits: usize,

    /// Seed for the random edit sequence
    #[arg(long, env = "OT_SIM_SEED", default_value_t = 1)]
    seed: u64,

    /// Server latency per request, in milliseconds
    #[arg(long, default_value_t = 2)]
    latency_ms: u64,

    /// Probability that a submit request fails
    #[arg(long, default_value_t = 0.05)]
    fault_rate: f64,

    /// Probability that an edit is an undo instead
    #[arg(long, default_value_t = 0.1)]
    undo_rate: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    telemetry::init(TelemetryConfig::from_env("ot-sim"));
    let args = Args::parse();

    let doc = DocumentId::new("sim");
    let server = MemoryServer::<TextOp>::new().with_latency(Duration::from_millis(args.latency_ms));
    server.create(doc.clone(), json!(""));

    let config = SyncConfig::from_env()?
        .with_send_retry_delay(Duration::from_millis(20))
        .with_reconnect_delay(Duration::from_millis(20));
    let sink = RecordingSink::new();

    let mut workspaces = Vec::with_capacity(args.clients);
    for _ in 0..args.clients {
        let mut workspace: SimWorkspace =
            Workspace::new(Arc::new(server.clone()), config.clone(), Arc::new(sink.clone()));
        let transport = MemoryTransport::new(server.clone(), workspace.event_sender(&doc));
        workspace.open(doc.clone(), Rope::new(), transport, 0)?;
        workspaces.push(workspace);
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    info!(clients = args.clients, edits = args.edits, seed = args.seed, "starting simulation");

    for step in 0..args.edits {
        let index = rng.random_range(0..workspaces.len());
        let workspace = &mut workspaces[index];

        if rng.random_bool(args.fault_rate.clamp(0.0, 1.0)) {
            let fault = match rng.random_range(0..4) {
                0 => Fault::Conflict,
                1 => Fault::Transient,
                2 => Fault::Network,
                _ => Fault::ResponseLost,
            };
            debug!(step, ?fault, "injecting fault");
            server.inject(fault, 1);
        }

        let result = if rng.random_bool(args.undo_rate.clamp(0.0, 1.0)) {
            workspace.undo().map(|_| ())
        } else {
            let text = workspace
                .surface(&doc)
                .map(|rope| rope.to_string())
                .unwrap_or_default();
            workspace.edit(&doc, random_edit(&mut rng, &text))
        };
        match result {
            Ok(()) => {}
            Err(SyncError::Resynchronizing(_)) => debug!(step, client = index, "edit skipped during resync"),
            Err(err) => return Err(err.into()),
        }

        tokio::time::sleep(Duration::from_millis(rng.random_range(0..3))).await;
        for workspace in &mut workspaces {
            workspace.process_pending();
        }
    }

    let expected = settle(&mut workspaces, &server, &doc).await?;
    info!(
        length = expected.chars().count(),
        rollbacks_resynced = sink.count(ReportKind::RollbackCeiling),
        validation_failures = sink.count(ReportKind::ValidationFailed),
        send_retries = sink.count(ReportKind::SendFailed),
        "all replicas converged"
    );
    println!("{expected}");
    Ok(())
}

fn random_edit(rng: &mut StdRng, text: &str) -> TextOp {
    let len = text.chars().count();
    if len > 0 && rng.random_bool(0.3) {
        let pos = rng.random_range(0..len);
        let count = rng.random_range(1..=(len - pos).min(3));
        TextOp::delete_at(pos, count)
    } else {
        let pos = rng.random_range(0..=len);
        let inserted: String = (0..rng.random_range(1..4))
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect();
        TextOp::insert_at(pos, &inserted)
    }
}

/// Process events until every replica is idle and matches the server.
async fn settle(
    workspaces: &mut [SimWorkspace],
    server: &MemoryServer<TextOp>,
    doc: &DocumentId,
) -> miette::Result<String> {
    for _ in 0..2000 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        for workspace in workspaces.iter_mut() {
            workspace.process_pending();
        }
        let Some(expected) = server.document(doc).and_then(|v| v.as_str().map(str::to_owned)) else {
            miette::bail!("server lost document {doc}");
        };
        let converged = workspaces.iter().all(|workspace| {
            workspace.session(doc).is_some_and(|session| {
                session.is_synchronized()
                    && session.is_ready()
                    && session.surface().to_string() == expected
            })
        });
        if converged {
            return Ok(expected);
        }
    }
    for (index, workspace) in workspaces.iter().enumerate() {
        if let Some(session) = workspace.session(doc) {
            warn!(
                client = index,
                state = session.state().name(),
                revision = session.revision(),
                text = %session.surface(),
                "replica did not settle"
            );
        }
    }
    miette::bail!("replicas did not converge")
}
