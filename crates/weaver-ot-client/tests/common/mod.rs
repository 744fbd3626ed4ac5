#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use weaver_ot_client::weaver_ot::{Rope, TextOp, TreeOp, WireOperation};
use weaver_ot_client::{
    DocumentId, EditingSurface, MemoryServer, MemoryTransport, RecordingSink, Revision,
    SyncConfig, UndoConfig, Workspace,
};

pub type TextWorkspace = Workspace<TextOp, Rope, MemoryTransport<TextOp>, MemoryServer<TextOp>>;
pub type TreeWorkspace<S> = Workspace<TreeOp, S, MemoryTransport<TreeOp>, MemoryServer<TreeOp>>;

pub fn config() -> SyncConfig {
    SyncConfig::default()
        .with_send_retry_delay(Duration::from_millis(10))
        .with_reconnect_delay(Duration::from_millis(10))
        .with_undo(UndoConfig::default().with_coalesce_delay(Duration::ZERO))
}

pub fn workspace<O, S>(
    server: &MemoryServer<O>,
    sink: &RecordingSink,
    config: SyncConfig,
) -> Workspace<O, S, MemoryTransport<O>, MemoryServer<O>>
where
    O: WireOperation + Send + Sync + 'static,
    S: EditingSurface<O>,
{
    Workspace::new(Arc::new(server.clone()), config, Arc::new(sink.clone()))
}

pub fn open<O, S>(
    workspace: &mut Workspace<O, S, MemoryTransport<O>, MemoryServer<O>>,
    server: &MemoryServer<O>,
    id: &DocumentId,
    surface: S,
    revision: Revision,
) where
    O: WireOperation + Send + Sync + 'static,
    S: EditingSurface<O>,
{
    let transport = MemoryTransport::new(server.clone(), workspace.event_sender(id));
    workspace.open(id.clone(), surface, transport, revision).unwrap();
}

/// Let spawned requests finish and process everything they produce. Meant
/// for tests running on a paused clock.
pub async fn settle<O, S>(workspaces: &mut [&mut Workspace<O, S, MemoryTransport<O>, MemoryServer<O>>])
where
    O: WireOperation + Send + Sync + 'static,
    S: EditingSurface<O>,
{
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        for workspace in workspaces.iter_mut() {
            workspace.process_pending();
        }
    }
}

pub fn text(workspace: &TextWorkspace, id: &DocumentId) -> String {
    workspace.surface(id).unwrap().to_string()
}

pub fn server_text(server: &MemoryServer<TextOp>, id: &DocumentId) -> String {
    match server.document(id) {
        Some(Value::String(text)) => text,
        other => panic!("not a text document: {other:?}"),
    }
}
