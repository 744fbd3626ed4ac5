//! In-process authoritative log and broadcast hub.
//!
//! [`MemoryServer`] commits submissions the way a real server does: a
//! submission built against an older revision is transformed over everything
//! committed since, applied to the server copy of the document, appended to
//! the log, and broadcast to every connected transport including the sender's.
//! Resubmitting an already committed submission id returns the original ack.
//!
//! Faults can be queued to exercise the recovery paths. A resubmission of a
//! committed id is answered before any queued fault is consumed, so a
//! retried request never sees a failure for work the server already did.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use smol_str::SmolStr;
use tokio::task::JoinHandle;
use weaver_ot::{Priority, WireOperation};

use crate::error::SubmitError;
use crate::protocol::{
    AckData, DocumentId, IncomingOperation, OperationData, Revision, Snapshot, SubmissionId,
};
use crate::transport::{AuthoritativeLog, EventSender, Transport, TransportEvent};

/// A failure to inject into the next submit request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Reject the submission as conflicting.
    Conflict,
    /// Fail with a transient error; the client retries.
    Transient,
    /// Fail as if the request never reached the server.
    Network,
    /// Commit the submission, then fail as if the response was lost.
    ResponseLost,
}

struct Committed<O> {
    op: O,
    submission_id: SubmissionId,
}

struct DocumentLog<O> {
    document: Value,
    base_revision: Revision,
    log: Vec<Committed<O>>,
    acks: HashMap<SubmissionId, Revision>,
}

impl<O> DocumentLog<O> {
    fn head(&self) -> Revision {
        self.base_revision + self.log.len() as Revision
    }
}

struct ServerState<O> {
    documents: HashMap<DocumentId, DocumentLog<O>>,
    subscribers: HashMap<DocumentId, HashMap<u64, EventSender>>,
    faults: VecDeque<Fault>,
}

pub struct MemoryServer<O> {
    state: Arc<Mutex<ServerState<O>>>,
    latency: Duration,
    next_connection: Arc<AtomicU64>,
}

impl<O> Clone for MemoryServer<O> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            latency: self.latency,
            next_connection: Arc::clone(&self.next_connection),
        }
    }
}

impl<O: WireOperation + Send + Sync + 'static> Default for MemoryServer<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: WireOperation + Send + Sync + 'static> MemoryServer<O> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                documents: HashMap::new(),
                subscribers: HashMap::new(),
                faults: VecDeque::new(),
            })),
            latency: Duration::ZERO,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Delay every request by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ServerState<O>> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Create or replace a document at revision 0.
    pub fn create(&self, id: impl Into<DocumentId>, document: Value) {
        let id = id.into();
        tracing::debug!(document_id = %id, "creating document");
        self.lock().documents.insert(
            id,
            DocumentLog {
                document,
                base_revision: 0,
                log: Vec::new(),
                acks: HashMap::new(),
            },
        );
    }

    pub fn document(&self, id: &DocumentId) -> Option<Value> {
        self.lock().documents.get(id).map(|doc| doc.document.clone())
    }

    pub fn head(&self, id: &DocumentId) -> Option<Revision> {
        self.lock().documents.get(id).map(DocumentLog::head)
    }

    /// Queue `fault` for the next `times` submit requests.
    pub fn inject(&self, fault: Fault, times: usize) {
        let mut state = self.lock();
        state.faults.extend(std::iter::repeat_n(fault, times));
    }

    /// Push a raw message to every transport connected to `id`.
    pub fn broadcast_raw(&self, id: &DocumentId, payload: Option<Value>) {
        let state = self.lock();
        if let Some(subscribers) = state.subscribers.get(id) {
            for sender in subscribers.values() {
                sender.emit(TransportEvent::operation(payload.clone()));
            }
        }
    }

    /// Broadcast a committed revision again, as a flaky relay would.
    pub fn rebroadcast(&self, id: &DocumentId, revision: Revision) -> Result<(), SubmitError> {
        let payload = {
            let state = self.lock();
            let doc = state.documents.get(id).ok_or_else(|| unknown(id))?;
            let committed = revision
                .checked_sub(doc.base_revision + 1)
                .and_then(|index| doc.log.get(index as usize))
                .ok_or_else(|| SubmitError::Other(format!("no revision {revision}").into()))?;
            operation_data(id, revision, committed)?
        };
        self.broadcast_raw(id, Some(payload));
        Ok(())
    }

    /// Drop every connection to `id`, as a server restart would. Each
    /// transport sees a disconnect and comes back after `reconnect_after`.
    pub fn drop_connections(&self, id: &DocumentId, reconnect_after: Duration) {
        let subscribers = self.lock().subscribers.remove(id).unwrap_or_default();
        for (connection, sender) in subscribers {
            sender.emit(TransportEvent::Disconnected);
            let server = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(reconnect_after).await;
                server.subscribe(connection, sender.clone());
                sender.emit(TransportEvent::Connected);
            });
        }
    }

    fn subscribe(&self, connection: u64, sender: EventSender) {
        let id = sender.document_id().clone();
        self.lock()
            .subscribers
            .entry(id)
            .or_default()
            .insert(connection, sender);
    }

    fn unsubscribe(&self, id: &DocumentId, connection: u64) -> bool {
        self.lock()
            .subscribers
            .get_mut(id)
            .is_some_and(|subscribers| subscribers.remove(&connection).is_some())
    }

    fn commit(&self, data: OperationData) -> Result<AckData, SubmitError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let doc = state
            .documents
            .get_mut(&data.document_id)
            .ok_or_else(|| unknown(&data.document_id))?;
        if let Some(&revision) = doc.acks.get(&data.submission_id) {
            tracing::debug!(document_id = %data.document_id, revision, "resubmission of a committed operation");
            return Ok(AckData {
                submission_id: data.submission_id,
                revision,
            });
        }

        let mut lose_response = false;
        if let Some(fault) = state.faults.pop_front() {
            tracing::debug!(document_id = %data.document_id, ?fault, "injecting fault");
            match fault {
                Fault::Conflict => return Err(SubmitError::Conflict),
                Fault::Transient => return Err(SubmitError::Other("injected failure".into())),
                Fault::Network => return Err(SubmitError::Network("injected failure".into())),
                Fault::ResponseLost => lose_response = true,
            }
        }

        if data.revision < doc.base_revision || data.revision > doc.head() {
            return Err(SubmitError::Conflict);
        }

        let mut op: O = serde_json::from_value(data.operation.clone())
            .map_err(|err| SubmitError::Other(err.to_string().into()))?;
        let start = (data.revision - doc.base_revision) as usize;
        for committed in &doc.log[start..] {
            op = op
                .transform(&committed.op, Priority::Left)
                .map_err(|_| SubmitError::Conflict)?;
        }
        let mut document = doc.document.clone();
        if op.apply_json(&mut document).is_err() {
            return Err(SubmitError::Conflict);
        }

        doc.document = document;
        doc.log.push(Committed {
            op,
            submission_id: data.submission_id,
        });
        let revision = doc.head();
        doc.acks.insert(data.submission_id, revision);
        tracing::debug!(document_id = %data.document_id, revision, "committed");

        let committed = doc.log.last().ok_or_else(|| unknown(&data.document_id))?;
        let payload = operation_data(&data.document_id, revision, committed)?;
        if let Some(subscribers) = state.subscribers.get(&data.document_id) {
            for sender in subscribers.values() {
                sender.emit(TransportEvent::operation(Some(payload.clone())));
            }
        }
        if lose_response {
            return Err(SubmitError::Network("injected lost response".into()));
        }
        Ok(AckData {
            submission_id: data.submission_id,
            revision,
        })
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn unknown(id: &DocumentId) -> SubmitError {
    SubmitError::Other(format!("unknown document {id}").into())
}

fn operation_data<O: WireOperation>(
    id: &DocumentId,
    revision: Revision,
    committed: &Committed<O>,
) -> Result<Value, SubmitError> {
    let encode = |err: serde_json::Error| SubmitError::Other(SmolStr::new(err.to_string()));
    let data = OperationData {
        document_id: id.clone(),
        revision,
        operation: serde_json::to_value(&committed.op).map_err(encode)?,
        submission_id: committed.submission_id,
    };
    serde_json::to_value(data).map_err(encode)
}

impl<O: WireOperation + Send + Sync + 'static> AuthoritativeLog for MemoryServer<O> {
    async fn revisions_since(
        &self,
        document_id: &DocumentId,
        revision: Revision,
    ) -> Result<Vec<IncomingOperation>, SubmitError> {
        self.delay().await;
        let state = self.lock();
        let doc = state.documents.get(document_id).ok_or_else(|| unknown(document_id))?;
        let start = revision.saturating_sub(doc.base_revision) as usize;
        doc.log
            .iter()
            .enumerate()
            .skip(start)
            .map(|(index, committed)| {
                let revision = doc.base_revision + index as Revision + 1;
                let value = operation_data(document_id, revision, committed)?;
                serde_json::from_value(value).map_err(|err| SubmitError::Other(err.to_string().into()))
            })
            .collect()
    }

    async fn submit(&self, data: OperationData) -> Result<AckData, SubmitError> {
        self.delay().await;
        self.commit(data)
    }

    async fn snapshot(&self, document_id: &DocumentId) -> Result<Snapshot, SubmitError> {
        self.delay().await;
        let state = self.lock();
        let doc = state.documents.get(document_id).ok_or_else(|| unknown(document_id))?;
        Ok(Snapshot {
            revision: doc.head(),
            document: doc.document.clone(),
        })
    }
}

/// A transport connected straight to a [`MemoryServer`].
pub struct MemoryTransport<O> {
    server: MemoryServer<O>,
    sender: EventSender,
    connection: u64,
    pending: Option<JoinHandle<()>>,
}

impl<O: WireOperation + Send + Sync + 'static> MemoryTransport<O> {
    pub fn new(server: MemoryServer<O>, sender: EventSender) -> Self {
        let connection = server.next_connection.fetch_add(1, Ordering::Relaxed);
        Self {
            server,
            sender,
            connection,
            pending: None,
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl<O: WireOperation + Send + Sync + 'static> Transport for MemoryTransport<O> {
    fn connect(&mut self) {
        self.cancel_pending();
        self.server.subscribe(self.connection, self.sender.clone());
        self.sender.emit(TransportEvent::Connected);
    }

    fn disconnect(&mut self) {
        self.cancel_pending();
        if self
            .server
            .unsubscribe(self.sender.document_id(), self.connection)
        {
            self.sender.emit(TransportEvent::Disconnected);
        }
    }

    fn reconnect(&mut self, delay: Duration) {
        self.disconnect();
        let server = self.server.clone();
        let sender = self.sender.clone();
        let connection = self.connection;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            server.subscribe(connection, sender.clone());
            sender.emit(TransportEvent::Connected);
        }));
    }
}

impl<O> Drop for MemoryTransport<O> {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}
