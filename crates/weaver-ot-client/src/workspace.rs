//! All open documents of one editor, and the loop that drives them.
//!
//! ```ignore
//! let mut workspace = Workspace::new(Arc::new(server.clone()), SyncConfig::default(), sink);
//! let transport = MemoryTransport::new(server.clone(), workspace.event_sender(&id));
//! workspace.open(id.clone(), Rope::new(), transport, 0)?;
//! workspace.edit(&id, TextOp::insert_at(0, "hi"))?;
//! while let Some(id) = workspace.process_next().await {
//!     // ...
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use weaver_ot::{CursorTransform, Selection, WireOperation};

use crate::config::SyncConfig;
use crate::coordinator::UndoCoordinator;
use crate::diagnostics::SharedSink;
use crate::error::SyncError;
use crate::protocol::{DocumentId, Revision};
use crate::session::{DocumentSession, SessionEvent};
use crate::surface::EditingSurface;
use crate::transport::{AuthoritativeLog, EventSender, Transport};

pub struct Workspace<O, S, T, L> {
    sessions: HashMap<DocumentId, DocumentSession<O, S, T>>,
    coordinator: UndoCoordinator,
    log: Arc<L>,
    events_tx: UnboundedSender<(DocumentId, SessionEvent)>,
    events_rx: UnboundedReceiver<(DocumentId, SessionEvent)>,
    config: SyncConfig,
    diagnostics: SharedSink,
}

impl<O, S, T, L> Workspace<O, S, T, L>
where
    O: WireOperation + Send + Sync + 'static,
    S: EditingSurface<O>,
    T: Transport,
    L: AuthoritativeLog,
{
    pub fn new(log: Arc<L>, config: SyncConfig, diagnostics: SharedSink) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            sessions: HashMap::new(),
            coordinator: UndoCoordinator::new(),
            log,
            events_tx,
            events_rx,
            config,
            diagnostics,
        }
    }

    /// Where a transport for `id` delivers its events.
    pub fn event_sender(&self, id: &DocumentId) -> EventSender {
        EventSender::new(id.clone(), self.events_tx.clone())
    }

    /// Start syncing a document whose surface currently shows `revision`.
    pub fn open(
        &mut self,
        id: DocumentId,
        surface: S,
        transport: T,
        revision: Revision,
    ) -> Result<(), SyncError> {
        if self.sessions.contains_key(&id) {
            return Err(SyncError::DuplicateDocument(id));
        }
        let mut session = DocumentSession::new(
            id.clone(),
            surface,
            transport,
            revision,
            self.event_sender(&id),
            self.config.clone(),
            self.diagnostics.clone(),
        )?;
        self.coordinator.register(id.clone(), &mut session.undo);
        session.connect();
        tracing::info!(document_id = %id, revision, "document opened");
        self.sessions.insert(id, session);
        Ok(())
    }

    /// Stop syncing a document and hand its surface back.
    pub fn close(&mut self, id: &DocumentId) -> Result<S, SyncError> {
        let session = self
            .sessions
            .remove(id)
            .ok_or_else(|| SyncError::UnknownDocument(id.clone()))?;
        self.coordinator.unregister(id);
        tracing::info!(document_id = %id, "document closed");
        Ok(session.into_surface())
    }

    pub fn session(&self, id: &DocumentId) -> Option<&DocumentSession<O, S, T>> {
        self.sessions.get(id)
    }

    pub fn surface(&self, id: &DocumentId) -> Option<&S> {
        self.sessions.get(id).map(DocumentSession::surface)
    }

    pub fn surface_mut(&mut self, id: &DocumentId) -> Option<&mut S> {
        self.sessions.get_mut(id).map(DocumentSession::surface_mut)
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.sessions.keys()
    }

    pub fn coordinator(&self) -> &UndoCoordinator {
        &self.coordinator
    }

    fn session_mut(&mut self, id: &DocumentId) -> Result<&mut DocumentSession<O, S, T>, SyncError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SyncError::UnknownDocument(id.clone()))
    }

    pub fn edit(&mut self, id: &DocumentId, op: O) -> Result<(), SyncError> {
        let log = Arc::clone(&self.log);
        let session = self.session_mut(id)?;
        session.edit(op)?;
        session.flush(&log)
    }

    pub fn edit_with_inverse(&mut self, id: &DocumentId, op: O, inverse: O) -> Result<(), SyncError> {
        let log = Arc::clone(&self.log);
        let session = self.session_mut(id)?;
        session.edit_with_inverse(op, inverse)?;
        session.flush(&log)
    }

    /// The surface applied `op` itself; `old` is the document before it.
    pub fn local_change(&mut self, id: &DocumentId, op: O, old: &O::Context) -> Result<(), SyncError> {
        let log = Arc::clone(&self.log);
        let session = self.session_mut(id)?;
        session.local_change(op, old)?;
        session.flush(&log)
    }

    /// Undo the most recent local edit in any open document.
    pub fn undo(&mut self) -> Result<Option<DocumentId>, SyncError> {
        let Some(id) = self.coordinator.undo(&mut self.sessions) else {
            return Ok(None);
        };
        let log = Arc::clone(&self.log);
        self.session_mut(&id)?.flush(&log)?;
        Ok(Some(id))
    }

    pub fn redo(&mut self) -> Result<Option<DocumentId>, SyncError> {
        let Some(id) = self.coordinator.redo(&mut self.sessions) else {
            return Ok(None);
        };
        let log = Arc::clone(&self.log);
        self.session_mut(&id)?.flush(&log)?;
        Ok(Some(id))
    }

    pub fn can_undo(&mut self) -> bool {
        self.coordinator.can_undo()
    }

    pub fn can_redo(&mut self) -> bool {
        self.coordinator.can_redo()
    }

    /// Wait for the next event and handle it. Returns the document it was for.
    pub async fn process_next(&mut self) -> Option<DocumentId> {
        let (id, event) = self.events_rx.recv().await?;
        self.dispatch(id.clone(), event);
        Some(id)
    }

    /// Handle every event already queued, without waiting. Returns how
    /// many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((id, event)) = self.events_rx.try_recv() {
            self.dispatch(id, event);
            handled += 1;
        }
        handled
    }

    fn dispatch(&mut self, id: DocumentId, event: SessionEvent) {
        let Some(session) = self.sessions.get_mut(&id) else {
            tracing::trace!(document_id = %id, "event for a closed document");
            return;
        };
        if let Err(err) = session.handle(event, &self.log) {
            tracing::error!(document_id = %id, error = %err, "failed to handle session event");
        }
    }
}

impl<O, S, T, L> Workspace<O, S, T, L>
where
    O: WireOperation + CursorTransform + Send + Sync + 'static,
    S: EditingSurface<O>,
    T: Transport,
    L: AuthoritativeLog,
{
    pub fn transform_cursor(&self, id: &DocumentId, selection: Selection) -> Option<Selection> {
        self.sessions
            .get(id)
            .map(|session| session.transform_cursor(selection))
    }
}

impl<O, S, T, L> Drop for Workspace<O, S, T, L> {
    fn drop(&mut self) {
        for session in self.sessions.values_mut() {
            session.abort_tasks();
        }
    }
}
