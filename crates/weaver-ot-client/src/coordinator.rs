//! One undo shortcut across many documents.
//!
//! The coordinator mirrors the per-document undo stacks as a single
//! chronological stack of (sequence, document id) pairs. It never holds
//! operations; undo and redo are delegated to whichever document recorded
//! the edit, and only when that document's next entry carries the same
//! sequence number.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use weaver_ot::Operation;

use crate::protocol::DocumentId;
use crate::undo::{RecordNotifier, Recorded, UndoManager, UndoStack};

#[derive(Debug)]
pub struct UndoCoordinator {
    registered: HashSet<DocumentId>,
    undo_entries: Vec<Recorded>,
    redo_entries: Vec<Recorded>,
    clock: Arc<AtomicU64>,
    tx: UnboundedSender<Recorded>,
    rx: UnboundedReceiver<Recorded>,
}

impl Default for UndoCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoCoordinator {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            registered: HashSet::new(),
            undo_entries: Vec::new(),
            redo_entries: Vec::new(),
            clock: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
        }
    }

    /// Start mirroring `stack`. Registering the same id again is a no-op.
    pub fn register<O: Operation>(&mut self, id: DocumentId, stack: &mut UndoStack<O>) {
        if !self.registered.insert(id.clone()) {
            return;
        }
        stack.set_notifier(Some(RecordNotifier::new(
            id,
            self.clock.clone(),
            self.tx.clone(),
        )));
    }

    pub fn unregister(&mut self, id: &DocumentId) {
        self.sync();
        self.registered.remove(id);
        self.undo_entries.retain(|entry| &entry.document_id != id);
        self.redo_entries.retain(|entry| &entry.document_id != id);
    }

    pub fn is_registered(&self, id: &DocumentId) -> bool {
        self.registered.contains(id)
    }

    /// Pull in everything recorded since the last call.
    pub fn sync(&mut self) {
        while let Ok(recorded) = self.rx.try_recv() {
            if !self.registered.contains(&recorded.document_id) {
                continue;
            }
            // A new edit cleared that document's redo stack.
            self.redo_entries
                .retain(|entry| entry.document_id != recorded.document_id);
            self.undo_entries.push(recorded);
        }
    }

    pub fn can_undo(&mut self) -> bool {
        self.sync();
        !self.undo_entries.is_empty()
    }

    pub fn can_redo(&mut self) -> bool {
        self.sync();
        !self.redo_entries.is_empty()
    }

    /// Undo the most recent edit in any registered document.
    ///
    /// An entry whose document no longer holds that sequence on top of its
    /// undo stack (a remote edit emptied it, or the depth cap evicted it) is
    /// skipped on its own; the document's older entries keep their places.
    pub fn undo<M: UndoManager>(
        &mut self,
        documents: &mut HashMap<DocumentId, M>,
    ) -> Option<DocumentId> {
        self.sync();
        while let Some(entry) = self.undo_entries.pop() {
            let applied = documents.get_mut(&entry.document_id).is_some_and(|doc| {
                doc.undo_sequence() == Some(entry.sequence) && doc.undo()
            });
            if applied {
                let id = entry.document_id.clone();
                self.redo_entries.push(entry);
                return Some(id);
            }
            tracing::debug!(
                document_id = %entry.document_id,
                sequence = entry.sequence,
                "skipping stale undo entry"
            );
        }
        None
    }

    pub fn redo<M: UndoManager>(
        &mut self,
        documents: &mut HashMap<DocumentId, M>,
    ) -> Option<DocumentId> {
        self.sync();
        while let Some(entry) = self.redo_entries.pop() {
            let applied = documents.get_mut(&entry.document_id).is_some_and(|doc| {
                doc.redo_sequence() == Some(entry.sequence) && doc.redo()
            });
            if applied {
                let id = entry.document_id.clone();
                self.undo_entries.push(entry);
                return Some(id);
            }
            tracing::debug!(
                document_id = %entry.document_id,
                sequence = entry.sequence,
                "skipping stale redo entry"
            );
        }
        None
    }

    pub fn clear(&mut self) {
        self.sync();
        self.undo_entries.clear();
        self.redo_entries.clear();
    }
}
