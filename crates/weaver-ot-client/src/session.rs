//! One synchronized document.
//!
//! A [`DocumentSession`] wires the client state machine, the server adapter,
//! the undo stack and the editing surface together. It handles exactly one
//! [`SessionEvent`] at a time; the workspace event loop guarantees that.
//!
//! Requests to the authoritative log run as spawned tasks that report back
//! through the same event channel. A send is aborted when the submission it
//! carries is superseded, and catch-up or snapshot results from before a
//! disconnect or reset are discarded by epoch.
//!
//! Alongside the surface the session keeps the document as the server has it
//! at the client's revision. Rolling back by inverses is not exact once
//! remote edits overlapped the rejected ones, so a rollback that leaves the
//! surface anywhere else is finished by loading that copy.

use std::borrow::Borrow;
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::task::JoinHandle;
use serde_json::Value;
use weaver_ot::{CursorTransform, Selection, WireOperation};

use crate::adapter::{AdapterEvent, ServerAdapter};
use crate::client::{ClientState, OtClient};
use crate::config::SyncConfig;
use crate::diagnostics::{Report, ReportKind, SharedSink};
use crate::error::{SubmitError, SyncError};
use crate::protocol::{
    DocumentId, IncomingOperation, OPERATION_EVENT, OperationData, Revision, Snapshot,
    SubmissionId,
};
use crate::surface::EditingSurface;
use crate::transport::{AuthoritativeLog, EventSender, SendOutcome, Transport, TransportEvent};
use crate::undo::{UndoManager, UndoStack};

/// Everything that can happen to a session from the outside.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// A submit request finished. Transient failures were already retried.
    SendFinished {
        submission_id: SubmissionId,
        outcome: SendOutcome,
    },
    CaughtUp {
        epoch: u64,
        result: Result<Vec<IncomingOperation>, SubmitError>,
    },
    SnapshotLoaded {
        epoch: u64,
        snapshot: Snapshot,
    },
}

pub struct DocumentSession<O, S, T> {
    id: DocumentId,
    surface: S,
    transport: T,
    client: OtClient<O>,
    adapter: ServerAdapter<O>,
    adapter_events: UnboundedReceiver<AdapterEvent<O>>,
    pub(crate) undo: UndoStack<O>,
    /// The document at `client.revision()` as the server committed it.
    server_document: Value,
    sender: EventSender,
    config: SyncConfig,
    diagnostics: SharedSink,
    send_task: Option<JoinHandle<()>>,
    fetch_task: Option<JoinHandle<()>>,
    epoch: u64,
    resynchronizing: bool,
}

impl<O, S, T> DocumentSession<O, S, T>
where
    O: WireOperation + Send + Sync + 'static,
    S: EditingSurface<O>,
    T: Transport,
{
    pub fn new(
        id: DocumentId,
        surface: S,
        transport: T,
        revision: Revision,
        sender: EventSender,
        config: SyncConfig,
        diagnostics: SharedSink,
    ) -> Result<Self, SyncError> {
        let server_document = surface.contents()?;
        let (tx, adapter_events) = unbounded_channel();
        let adapter = ServerAdapter::new(
            id.clone(),
            revision,
            config.clone(),
            diagnostics.clone(),
            tx,
        );
        Ok(Self {
            undo: UndoStack::new(config.undo.clone()),
            server_document,
            client: OtClient::new(revision),
            id,
            surface,
            transport,
            adapter,
            adapter_events,
            sender,
            config,
            diagnostics,
            send_task: None,
            fetch_task: None,
            epoch: 0,
            resynchronizing: false,
        })
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// For surfaces that apply local edits themselves before reporting them
    /// through [`local_change`](Self::local_change).
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn revision(&self) -> Revision {
        self.client.revision()
    }

    pub fn state(&self) -> &ClientState<O> {
        self.client.state()
    }

    pub fn is_synchronized(&self) -> bool {
        self.client.is_synchronized()
    }

    pub fn is_ready(&self) -> bool {
        self.adapter.is_ready()
    }

    pub fn is_resynchronizing(&self) -> bool {
        self.resynchronizing
    }

    pub fn undo_stack(&self) -> &UndoStack<O> {
        &self.undo
    }

    /// The document as the server has it at [`revision`](Self::revision).
    pub fn server_document(&self) -> &Value {
        &self.server_document
    }

    pub fn connect(&mut self) {
        self.transport.connect();
    }

    /// Stop all activity. The session can be dropped afterwards.
    pub fn shutdown(&mut self) {
        self.abort_tasks();
        self.undo.set_notifier(None);
        self.transport.disconnect();
    }

    pub fn into_surface(mut self) -> S {
        self.shutdown();
        self.surface
    }

    /// Apply a local edit to the surface and sync it.
    pub fn edit(&mut self, op: O) -> Result<(), SyncError> {
        self.ensure_editable()?;
        let snapshot = self.surface.snapshot()?;
        let inverse = op.invert(snapshot.borrow())?;
        self.surface.apply_operation(&op)?;
        self.commit_local(op, inverse)
    }

    /// Apply a local edit whose inverse is already known, as produced by the
    /// tree edit builders.
    pub fn edit_with_inverse(&mut self, op: O, inverse: O) -> Result<(), SyncError> {
        self.ensure_editable()?;
        self.surface.apply_operation(&op)?;
        self.commit_local(op, inverse)
    }

    /// The surface already applied `op` to a document that looked like
    /// `old` before.
    pub fn local_change(&mut self, op: O, old: &O::Context) -> Result<(), SyncError> {
        self.ensure_editable()?;
        let inverse = op.invert(old)?;
        self.commit_local(op, inverse)
    }

    fn ensure_editable(&self) -> Result<(), SyncError> {
        if self.resynchronizing {
            return Err(SyncError::Resynchronizing(self.id.clone()));
        }
        Ok(())
    }

    fn commit_local(&mut self, op: O, inverse: O) -> Result<(), SyncError> {
        if op.is_noop() {
            return Ok(());
        }
        self.undo.record(op.clone(), inverse.clone())?;
        self.submit_local(op, inverse)
    }

    fn submit_local(&mut self, op: O, inverse: O) -> Result<(), SyncError> {
        if let Some(submission) = self.client.apply_client(op, inverse)? {
            self.adapter.send(submission)?;
        }
        Ok(())
    }

    /// Apply an operation taken from the undo history as a new local edit.
    fn apply_history(&mut self, op: Option<O>) -> Result<bool, SyncError> {
        let Some(op) = op else {
            return Ok(false);
        };
        let snapshot = self.surface.snapshot()?;
        let inverse = op.invert(snapshot.borrow())?;
        self.surface.apply_operation(&op)?;
        self.submit_local(op, inverse)?;
        Ok(true)
    }

    /// Handle one event, then act on everything the adapter asked for.
    pub fn handle<L: AuthoritativeLog>(
        &mut self,
        event: SessionEvent,
        log: &Arc<L>,
    ) -> Result<(), SyncError> {
        match event {
            SessionEvent::Transport(TransportEvent::Connected) => {
                tracing::debug!(document_id = %self.id, "transport connected");
                // The snapshot fetch reconnects once it lands.
                if !self.resynchronizing {
                    self.start_catch_up(log);
                }
            }
            SessionEvent::Transport(TransportEvent::Disconnected) => {
                tracing::debug!(document_id = %self.id, "transport disconnected");
                self.abort_send();
                self.adapter.disconnected();
                if !self.resynchronizing {
                    self.epoch += 1;
                    self.abort_fetch();
                }
            }
            SessionEvent::Transport(TransportEvent::Message { name, payload }) => {
                if name.as_str() == OPERATION_EVENT {
                    self.adapter.server_operation(payload);
                } else {
                    tracing::trace!(document_id = %self.id, %name, "ignoring message");
                }
            }
            SessionEvent::SendFinished {
                submission_id,
                outcome,
            } => self.adapter.submit_result(submission_id, outcome),
            SessionEvent::CaughtUp { epoch, result } => {
                if epoch == self.epoch {
                    self.adapter.catch_up(result);
                } else {
                    tracing::debug!(document_id = %self.id, epoch, "discarding stale catch-up");
                }
            }
            SessionEvent::SnapshotLoaded { epoch, snapshot } => {
                if epoch == self.epoch {
                    self.finish_resync(snapshot)?;
                }
            }
        }
        self.flush(log)
    }

    /// Act on the adapter's queued events, including any queued while
    /// acting on them.
    pub(crate) fn flush<L: AuthoritativeLog>(&mut self, log: &Arc<L>) -> Result<(), SyncError> {
        while let Ok(event) = self.adapter_events.try_recv() {
            match event {
                AdapterEvent::Transmit(data) => self.spawn_send(data, log),
                AdapterEvent::Operation(op, revision) => self.apply_remote(&op, revision, log),
                AdapterEvent::Ack(revision) => self.acknowledge(revision, log)?,
                AdapterEvent::Rollback => self.rollback(log),
                AdapterEvent::Reconnect => {
                    self.abort_send();
                    self.transport.reconnect(self.config.reconnect_delay);
                }
                AdapterEvent::Resync => self.begin_resync(log),
                AdapterEvent::Ready => {
                    tracing::info!(document_id = %self.id, revision = self.adapter.current_revision(), "document ready");
                    self.resend_if_idle()?;
                }
                AdapterEvent::Reconnected { did_ack } => {
                    tracing::info!(document_id = %self.id, did_ack, "document reconnected");
                    if !did_ack {
                        self.resend_if_idle()?;
                    }
                }
            }
        }
        Ok(())
    }

    fn resend_if_idle(&mut self) -> Result<(), SyncError> {
        if self.client.is_synchronized() {
            return Ok(());
        }
        if self.send_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }
        let submission = self.client.resend()?;
        self.adapter.send(submission)
    }

    fn acknowledge<L: AuthoritativeLog>(
        &mut self,
        revision: Revision,
        log: &Arc<L>,
    ) -> Result<(), SyncError> {
        // The outstanding edit has been rebased over every revision before
        // this one, so it is exactly what the server committed.
        let committed = match self.client.outstanding() {
            Some(outstanding) => outstanding.apply_json(&mut self.server_document),
            None => Ok(()),
        };
        if let Err(err) = committed {
            self.report(
                ReportKind::ApplyFailed,
                format!("acknowledged operation at revision {revision}: {err}"),
                None,
            );
            self.begin_resync(log);
            return Ok(());
        }
        match self.client.server_ack() {
            Ok(Some(submission)) => self.adapter.send(submission)?,
            Ok(None) => {}
            Err(err) => {
                self.report(ReportKind::AckMismatch, err.to_string(), None);
                tracing::warn!(document_id = %self.id, revision, "ack did not match the client state");
                self.begin_resync(log);
            }
        }
        Ok(())
    }

    fn apply_remote<L: AuthoritativeLog>(&mut self, op: &O, revision: Revision, log: &Arc<L>) {
        let result = self
            .client
            .apply_server(op)
            .map_err(SyncError::from)
            .and_then(|apply| {
                self.surface.apply_operation(&apply)?;
                op.apply_json(&mut self.server_document)?;
                Ok(apply)
            });
        match result {
            Ok(apply) => self.transform_history(&apply),
            Err(err) => {
                self.report(
                    ReportKind::ApplyFailed,
                    format!("remote operation at revision {revision}: {err}"),
                    serde_json::to_value(op).ok(),
                );
                self.begin_resync(log);
            }
        }
    }

    fn rollback<L: AuthoritativeLog>(&mut self, log: &Arc<L>) {
        let inverses = match self.client.server_rollback() {
            Ok(inverses) => inverses,
            Err(err) => {
                self.report(ReportKind::RollbackFailed, err.to_string(), None);
                self.begin_resync(log);
                return;
            }
        };
        for inverse in &inverses {
            if let Err(err) = self.surface.apply_operation(inverse) {
                self.report(
                    ReportKind::RollbackFailed,
                    err.to_string(),
                    serde_json::to_value(inverse).ok(),
                );
                self.restore_server_document(log);
                return;
            }
        }
        // Entries for the rejected edits would replay changes the server
        // never accepted.
        self.undo.clear();
        match self.surface.contents() {
            Ok(contents) if contents == self.server_document => {}
            Ok(_) => {
                tracing::info!(
                    document_id = %self.id,
                    revision = self.client.revision(),
                    "rollback overlapped remote edits, restoring the server's document"
                );
                self.restore_server_document(log);
            }
            Err(err) => {
                self.report(ReportKind::RollbackFailed, err.to_string(), None);
                self.restore_server_document(log);
            }
        }
    }

    /// Load the server's copy into the surface. Only valid while the client
    /// is synchronized.
    fn restore_server_document<L: AuthoritativeLog>(&mut self, log: &Arc<L>) {
        self.undo.clear();
        if let Err(err) = self.surface.update_contents(self.server_document.clone()) {
            self.report(
                ReportKind::ApplyFailed,
                format!("restoring the server's document: {err}"),
                None,
            );
            self.begin_resync(log);
        }
    }

    fn transform_history(&mut self, op: &O) {
        if let Err(err) = self.undo.transform(op) {
            tracing::warn!(document_id = %self.id, error = %err, "undo history no longer applies, clearing");
            self.undo.clear();
        }
    }

    fn begin_resync<L: AuthoritativeLog>(&mut self, log: &Arc<L>) {
        if self.resynchronizing {
            return;
        }
        tracing::warn!(document_id = %self.id, revision = self.adapter.current_revision(), "resynchronizing");
        self.resynchronizing = true;
        self.epoch += 1;
        self.abort_tasks();
        self.adapter.disconnected();
        self.transport.disconnect();

        let log = Arc::clone(log);
        let id = self.id.clone();
        let sender = self.sender.clone();
        let epoch = self.epoch;
        let retry = self.config.send_retry_delay;
        self.fetch_task = Some(tokio::spawn(async move {
            loop {
                match log.snapshot(&id).await {
                    Ok(snapshot) => {
                        sender.send(SessionEvent::SnapshotLoaded { epoch, snapshot });
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(document_id = %id, error = %err, "snapshot fetch failed");
                        tokio::time::sleep(retry).await;
                    }
                }
            }
        }));
    }

    fn finish_resync(&mut self, snapshot: Snapshot) -> Result<(), SyncError> {
        self.surface.update_contents(snapshot.document)?;
        // Read back so both copies share the surface's JSON form.
        self.server_document = self.surface.contents()?;
        self.client.reset(snapshot.revision);
        self.adapter.reset(snapshot.revision);
        self.undo.clear();
        self.resynchronizing = false;
        tracing::info!(document_id = %self.id, revision = snapshot.revision, "resynchronized");
        self.transport.connect();
        Ok(())
    }

    fn start_catch_up<L: AuthoritativeLog>(&mut self, log: &Arc<L>) {
        self.abort_fetch();
        let log = Arc::clone(log);
        let id = self.id.clone();
        let sender = self.sender.clone();
        let epoch = self.epoch;
        let revision = self.adapter.current_revision();
        self.fetch_task = Some(tokio::spawn(async move {
            let result = log.revisions_since(&id, revision).await;
            sender.send(SessionEvent::CaughtUp { epoch, result });
        }));
    }

    fn spawn_send<L: AuthoritativeLog>(&mut self, data: OperationData, log: &Arc<L>) {
        if self.resynchronizing {
            return;
        }
        self.abort_send();
        let log = Arc::clone(log);
        let sender = self.sender.clone();
        let diagnostics = self.diagnostics.clone();
        let retry = self.config.send_retry_delay;
        self.send_task = Some(tokio::spawn(async move {
            let submission_id = data.submission_id;
            let outcome = loop {
                match log.submit(data.clone()).await {
                    Ok(ack) => break SendOutcome::Acked(ack),
                    Err(SubmitError::Conflict) => break SendOutcome::Conflict,
                    Err(SubmitError::Network(reason)) => break SendOutcome::Network(reason),
                    Err(SubmitError::Other(reason)) => {
                        diagnostics.report(
                            Report::new(
                                ReportKind::SendFailed,
                                &data.document_id,
                                data.revision,
                                format!("{reason}, retrying in {}ms", retry.as_millis()),
                            )
                            .with_payload(Some(data.operation.clone())),
                        );
                        tokio::time::sleep(retry).await;
                    }
                }
            };
            sender.send(SessionEvent::SendFinished {
                submission_id,
                outcome,
            });
        }));
    }

    fn report(&self, kind: ReportKind, message: String, payload: Option<Value>) {
        self.diagnostics.report(
            Report::new(kind, &self.id, self.adapter.current_revision(), message)
                .with_payload(payload),
        );
    }
}

impl<O, S, T> DocumentSession<O, S, T> {
    fn abort_send(&mut self) {
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
    }

    fn abort_fetch(&mut self) {
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
    }

    pub(crate) fn abort_tasks(&mut self) {
        self.abort_send();
        self.abort_fetch();
    }
}

impl<O, S, T> DocumentSession<O, S, T>
where
    O: WireOperation + CursorTransform + Send + Sync + 'static,
    S: EditingSurface<O>,
    T: Transport,
{
    /// Map a selection made against the server's view of the document onto
    /// the local one.
    pub fn transform_cursor(&self, selection: Selection) -> Selection {
        self.client.transform_cursor(selection)
    }
}

impl<O, S, T> UndoManager for DocumentSession<O, S, T>
where
    O: WireOperation + Send + Sync + 'static,
    S: EditingSurface<O>,
    T: Transport,
{
    fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    fn undo(&mut self) -> bool {
        if self.resynchronizing {
            return false;
        }
        let op = self.undo.undo();
        self.apply_history(op).unwrap_or_else(|err| {
            self.report(ReportKind::ApplyFailed, format!("undo: {err}"), None);
            false
        })
    }

    fn redo(&mut self) -> bool {
        if self.resynchronizing {
            return false;
        }
        let op = self.undo.redo();
        self.apply_history(op).unwrap_or_else(|err| {
            self.report(ReportKind::ApplyFailed, format!("redo: {err}"), None);
            false
        })
    }

    fn clear_history(&mut self) {
        self.undo.clear();
    }

    fn undo_sequence(&self) -> Option<u64> {
        self.undo.undo_sequence()
    }

    fn redo_sequence(&self) -> Option<u64> {
        self.undo.redo_sequence()
    }
}
