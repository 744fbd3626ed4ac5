//! Collaborators the sync layer talks to.
//!
//! A [`Transport`] is the push channel for one document: it connects,
//! disconnects, and delivers [`TransportEvent`]s through an [`EventSender`].
//! An [`AuthoritativeLog`] is the request/response side shared by every
//! document: fetch revisions, submit operations, fetch snapshots.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::SubmitError;
use crate::protocol::{AckData, DocumentId, IncomingOperation, OperationData, Revision, Snapshot};
use crate::session::SessionEvent;

/// Inbound events from a document's transport.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// A named message pushed by the server.
    Message {
        name: SmolStr,
        payload: Option<Value>,
    },
}

impl TransportEvent {
    pub fn operation(payload: Option<Value>) -> Self {
        Self::Message {
            name: SmolStr::new_static(crate::protocol::OPERATION_EVENT),
            payload,
        }
    }
}

/// Delivers events for one document into the workspace event loop.
#[derive(Clone, Debug)]
pub struct EventSender {
    document_id: DocumentId,
    tx: UnboundedSender<(DocumentId, SessionEvent)>,
}

impl EventSender {
    pub(crate) fn new(document_id: DocumentId, tx: UnboundedSender<(DocumentId, SessionEvent)>) -> Self {
        Self { document_id, tx }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Returns false once the workspace has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.send(SessionEvent::Transport(event))
    }

    pub(crate) fn send(&self, event: SessionEvent) -> bool {
        self.tx.send((self.document_id.clone(), event)).is_ok()
    }
}

/// Push channel for one document.
///
/// Connection state changes are reported as [`TransportEvent`]s, never as
/// return values, so a first connect and a reconnect go through the same path.
pub trait Transport: Send {
    fn connect(&mut self);

    fn disconnect(&mut self);

    /// Disconnect now and connect again after `delay`.
    fn reconnect(&mut self, delay: Duration);
}

/// The server's log of committed operations.
pub trait AuthoritativeLog: Send + Sync + 'static {
    /// Committed operations with revision greater than `revision`, in any order.
    fn revisions_since(
        &self,
        document_id: &DocumentId,
        revision: Revision,
    ) -> impl Future<Output = Result<Vec<IncomingOperation>, SubmitError>> + Send;

    fn submit(
        &self,
        data: OperationData,
    ) -> impl Future<Output = Result<AckData, SubmitError>> + Send;

    fn snapshot(
        &self,
        document_id: &DocumentId,
    ) -> impl Future<Output = Result<Snapshot, SubmitError>> + Send;
}

/// How a submission ended, as far as the server adapter is concerned.
#[derive(Clone, Debug, PartialEq)]
pub enum SendOutcome {
    Acked(AckData),
    /// The server rejected the operation; roll it back.
    Conflict,
    /// The request never reached the server; reconnect.
    Network(SmolStr),
}
