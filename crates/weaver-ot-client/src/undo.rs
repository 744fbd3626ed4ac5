//! Undo/redo history that stays valid under concurrent remote edits.
//!
//! Provides:
//! - `UndoManager` trait for anything the global coordinator can undo
//! - `UndoStack<O>` - per-document coalescing history, transformed by remote operations

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::UnboundedSender;
use web_time::Instant;
use weaver_ot::{OtError, Operation, Priority};

use crate::config::UndoConfig;
use crate::protocol::DocumentId;

/// Trait for managing undo/redo operations.
///
/// Implementations must actually perform the undo/redo, not just track state.
pub trait UndoManager {
    /// Check if undo is available.
    fn can_undo(&self) -> bool;

    /// Check if redo is available.
    fn can_redo(&self) -> bool;

    /// Perform undo. Returns true if successful.
    fn undo(&mut self) -> bool;

    /// Perform redo. Returns true if successful.
    fn redo(&mut self) -> bool;

    /// Clear all undo/redo history.
    fn clear_history(&mut self);

    /// Sequence number of the entry the next undo would apply.
    fn undo_sequence(&self) -> Option<u64>;

    /// Sequence number of the entry the next redo would apply.
    fn redo_sequence(&self) -> Option<u64>;
}

/// One step of history: `redo` re-applies the edit, `undo` reverts it.
///
/// `sequence` orders entries across every stack sharing a notifier clock.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry<O> {
    pub redo: O,
    pub undo: O,
    pub sequence: u64,
}

/// A new entry pushed onto some document's undo stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub document_id: DocumentId,
    pub sequence: u64,
}

/// Numbers new entries from a shared clock and announces them.
#[derive(Debug, Clone)]
pub struct RecordNotifier {
    document_id: DocumentId,
    clock: Arc<AtomicU64>,
    tx: UnboundedSender<Recorded>,
}

impl RecordNotifier {
    pub fn new(document_id: DocumentId, clock: Arc<AtomicU64>, tx: UnboundedSender<Recorded>) -> Self {
        Self {
            document_id,
            clock,
            tx,
        }
    }

    fn next_sequence(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn notify(&self, sequence: u64) {
        // A closed receiver means nobody coordinates this document any more.
        let _ = self.tx.send(Recorded {
            document_id: self.document_id.clone(),
            sequence,
        });
    }
}

#[derive(Debug)]
pub struct UndoStack<O> {
    undo_stack: Vec<UndoEntry<O>>,
    redo_stack: Vec<UndoEntry<O>>,
    last_recorded_at: Option<Instant>,
    config: UndoConfig,
    notifier: Option<RecordNotifier>,
    local_sequence: u64,
}

impl<O: Operation> UndoStack<O> {
    pub fn new(config: UndoConfig) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            last_recorded_at: None,
            config,
            notifier: None,
            local_sequence: 0,
        }
    }

    pub fn set_notifier(&mut self, notifier: Option<RecordNotifier>) {
        self.notifier = notifier;
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn peek_undo(&self) -> Option<&UndoEntry<O>> {
        self.undo_stack.last()
    }

    pub fn undo_sequence(&self) -> Option<u64> {
        self.undo_stack.last().map(|entry| entry.sequence)
    }

    pub fn redo_sequence(&self) -> Option<u64> {
        self.redo_stack.last().map(|entry| entry.sequence)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.last_recorded_at = None;
    }

    /// Start a new entry on the next record even inside the coalescing window.
    pub fn cutoff(&mut self) {
        self.last_recorded_at = None;
    }

    /// Record a local edit. Returns true when a new entry was pushed.
    pub fn record(&mut self, op: O, inverse: O) -> Result<bool, OtError> {
        self.record_at(op, inverse, Instant::now())
    }

    pub fn record_at(&mut self, op: O, inverse: O, now: Instant) -> Result<bool, OtError> {
        self.redo_stack.clear();

        let coalesce = self
            .last_recorded_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.coalesce_delay);

        if coalesce {
            if let Some(top) = self.undo_stack.pop() {
                let merged = UndoEntry {
                    undo: inverse.compose(&top.undo)?,
                    redo: top.redo.compose(&op)?,
                    sequence: top.sequence,
                };
                if !merged.undo.is_noop() {
                    self.undo_stack.push(merged);
                }
                return Ok(false);
            }
        }

        self.last_recorded_at = Some(now);
        if inverse.is_noop() {
            return Ok(false);
        }
        let sequence = match &self.notifier {
            Some(notifier) => notifier.next_sequence(),
            None => {
                self.local_sequence += 1;
                self.local_sequence
            }
        };
        self.undo_stack.push(UndoEntry {
            redo: op,
            undo: inverse,
            sequence,
        });
        if self.undo_stack.len() > self.config.max_depth {
            let excess = self.undo_stack.len() - self.config.max_depth;
            self.undo_stack.drain(..excess);
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(sequence);
        }
        Ok(true)
    }

    /// Rebase both stacks over an operation applied to the document from
    /// elsewhere. Entries that no longer change anything are dropped.
    pub fn transform(&mut self, remote: &O) -> Result<(), OtError> {
        if remote.is_noop() {
            return Ok(());
        }
        transform_stack(&mut self.undo_stack, remote, Side::Undo)?;
        transform_stack(&mut self.redo_stack, remote, Side::Redo)?;
        Ok(())
    }

    /// Pop the newest undo entry onto the redo stack. Returns the operation
    /// to apply to the document.
    pub fn undo(&mut self) -> Option<O> {
        let entry = self.undo_stack.pop()?;
        let op = entry.undo.clone();
        self.redo_stack.push(entry);
        self.last_recorded_at = None;
        Some(op)
    }

    /// Pop the newest redo entry back onto the undo stack. Returns the
    /// operation to apply to the document.
    pub fn redo(&mut self) -> Option<O> {
        let entry = self.redo_stack.pop()?;
        let op = entry.redo.clone();
        self.undo_stack.push(entry);
        self.last_recorded_at = None;
        Some(op)
    }
}

/// Which half of an entry a stack applies next.
#[derive(Clone, Copy)]
enum Side {
    Undo,
    Redo,
}

/// Walk `stack` newest to oldest, carrying `remote` along.
///
/// The half of an entry the stack applies next is rebased against the
/// running operation as it is. The other half only ever applies after the
/// first, so it is rebased against the running operation moved past the
/// first half. That moved operation is also what the next older entry sees.
fn transform_stack<O: Operation>(
    stack: &mut Vec<UndoEntry<O>>,
    remote: &O,
    side: Side,
) -> Result<(), OtError> {
    let mut running = remote.clone();
    let mut kept = Vec::with_capacity(stack.len());
    for entry in stack.drain(..).rev() {
        let (first, second) = match side {
            Side::Undo => (&entry.undo, &entry.redo),
            Side::Redo => (&entry.redo, &entry.undo),
        };
        let first_t = first.transform(&running, Priority::Left)?;
        let moved = running.transform(first, Priority::Right)?;
        let second_t = second.transform(&moved, Priority::Left)?;
        running = moved;

        let (undo, redo) = match side {
            Side::Undo => (first_t, second_t),
            Side::Redo => (second_t, first_t),
        };
        if !undo.is_noop() && !redo.is_noop() {
            kept.push(UndoEntry {
                redo,
                undo,
                sequence: entry.sequence,
            });
        }
    }
    kept.reverse();
    *stack = kept;
    Ok(())
}
