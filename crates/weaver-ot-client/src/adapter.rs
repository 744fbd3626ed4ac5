//! Reconciles one document's client with the authoritative log.
//!
//! The adapter owns revision bookkeeping: which submission is in flight,
//! which was acknowledged last, how many rollbacks happened in a row, and
//! whether the transport has caught up since the last connect. It performs
//! no I/O; everything the session should do next is emitted as an
//! [`AdapterEvent`] on the channel it was built with.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::mpsc::UnboundedSender;
use weaver_ot::WireOperation;

use crate::client::Submission;
use crate::config::SyncConfig;
use crate::diagnostics::{Report, ReportKind, SharedSink};
use crate::error::{CatchUpError, SubmitError, SyncError, ValidationError};
use crate::protocol::{
    AckData, DocumentId, IncomingOperation, OperationData, Revision, SubmissionId,
};
use crate::transport::SendOutcome;

/// What the session must do in response to adapter input.
#[derive(Clone, Debug, PartialEq)]
pub enum AdapterEvent<O> {
    /// Submit this payload to the authoritative log.
    Transmit(OperationData),
    /// Apply a validated remote operation committed as `revision`.
    Operation(O, Revision),
    /// The in-flight submission was committed as `revision`.
    Ack(Revision),
    /// The in-flight submission was rejected; undo it locally.
    Rollback,
    /// Drop the connection and connect again.
    Reconnect,
    /// Incremental recovery gave up; reload the document from the server.
    Resync,
    /// First successful catch-up.
    Ready,
    /// Catch-up after a reconnect. `did_ack` is true when the in-flight
    /// submission was acknowledged while catching up.
    Reconnected { did_ack: bool },
}

#[derive(Debug)]
pub struct ServerAdapter<O> {
    document_id: DocumentId,
    current_revision: Revision,
    last_sent: Option<OperationData>,
    last_ack: Option<SubmissionId>,
    /// Submit response for the in-flight submission that arrived before the
    /// revisions preceding it.
    deferred_ack: Option<AckData>,
    rollback_attempts: u32,
    ready: bool,
    has_been_ready: bool,
    revisions_before_ready: Vec<IncomingOperation>,
    config: SyncConfig,
    diagnostics: SharedSink,
    events: UnboundedSender<AdapterEvent<O>>,
    _operation: PhantomData<fn() -> O>,
}

impl<O: WireOperation> ServerAdapter<O> {
    pub fn new(
        document_id: DocumentId,
        revision: Revision,
        config: SyncConfig,
        diagnostics: SharedSink,
        events: UnboundedSender<AdapterEvent<O>>,
    ) -> Self {
        Self {
            document_id,
            current_revision: revision,
            last_sent: None,
            last_ack: None,
            deferred_ack: None,
            rollback_attempts: 0,
            ready: false,
            has_been_ready: false,
            revisions_before_ready: Vec::new(),
            config,
            diagnostics,
            events,
            _operation: PhantomData,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn current_revision(&self) -> Revision {
        self.current_revision
    }

    pub fn last_sent(&self) -> Option<&OperationData> {
        self.last_sent.as_ref()
    }

    pub fn last_ack(&self) -> Option<SubmissionId> {
        self.last_ack
    }

    pub fn rollback_attempts(&self) -> u32 {
        self.rollback_attempts
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Forget everything in flight and continue from `revision`.
    ///
    /// Used after a full resynchronization. The next catch-up counts as a
    /// reconnect if the adapter was ever ready.
    pub fn reset(&mut self, revision: Revision) {
        tracing::debug!(document_id = %self.document_id, revision, "adapter reset");
        self.current_revision = revision;
        self.last_sent = None;
        self.last_ack = None;
        self.deferred_ack = None;
        self.rollback_attempts = 0;
        self.ready = false;
        self.revisions_before_ready.clear();
    }

    /// The transport dropped. Incoming operations are buffered until the
    /// next catch-up.
    pub fn disconnected(&mut self) {
        self.ready = false;
    }

    /// Record `submission` as in flight and ask for it to be transmitted.
    pub fn send(&mut self, submission: Submission<O>) -> Result<(), SyncError> {
        let data = OperationData {
            document_id: self.document_id.clone(),
            revision: submission.revision,
            operation: serde_json::to_value(&submission.operation)?,
            submission_id: submission.submission_id,
        };
        tracing::debug!(
            document_id = %self.document_id,
            revision = data.revision,
            submission_id = %data.submission_id,
            "sending operation"
        );
        if self
            .deferred_ack
            .as_ref()
            .is_some_and(|ack| ack.submission_id != data.submission_id)
        {
            self.deferred_ack = None;
        }
        self.last_sent = Some(data.clone());
        self.emit(AdapterEvent::Transmit(data));
        Ok(())
    }

    /// The response to a transmitted submission.
    pub fn submit_result(&mut self, submission_id: SubmissionId, outcome: SendOutcome) {
        if self.last_sent.as_ref().map(|d| d.submission_id) != Some(submission_id) {
            // Usually the broadcast acknowledged it first.
            tracing::debug!(
                document_id = %self.document_id,
                %submission_id,
                "ignoring response for a submission no longer in flight"
            );
            return;
        }
        match outcome {
            SendOutcome::Acked(ack) => self.server_ack(ack),
            SendOutcome::Conflict => self.rollback(),
            SendOutcome::Network(reason) => {
                tracing::info!(document_id = %self.document_id, %reason, "submission failed to reach the server");
                self.request_reconnect();
            }
        }
    }

    /// Acknowledgement from a submit response.
    pub fn server_ack(&mut self, ack: AckData) {
        let in_flight = self.last_sent.as_ref().map(|d| d.submission_id);
        if in_flight == Some(ack.submission_id) {
            if ack.revision != self.current_revision + 1 {
                // Revisions before ours are still on their way. The ack is
                // kept and taken once they have been applied.
                tracing::debug!(
                    document_id = %self.document_id,
                    current = self.current_revision,
                    revision = ack.revision,
                    "deferring out of order ack"
                );
                if ack.revision > self.current_revision {
                    self.deferred_ack = Some(ack);
                }
                return;
            }
            self.accept_ack(ack.revision);
        } else if self.last_ack == Some(ack.submission_id) {
            tracing::debug!(
                document_id = %self.document_id,
                submission_id = %ack.submission_id,
                "dropping duplicate ack"
            );
        } else {
            self.report(
                Report::new(
                    ReportKind::AckMismatch,
                    &self.document_id,
                    self.current_revision,
                    format!("ack for {} does not match the submission in flight", ack.submission_id),
                )
                .with_payload(serde_json::to_value(ack).ok()),
            );
            self.request_reconnect();
        }
    }

    /// A message pushed by the server under the operation event name.
    pub fn server_operation(&mut self, payload: Option<Value>) {
        let incoming = match payload {
            None => {
                self.reject(ValidationError::MissingPayload, None);
                return;
            }
            Some(value) => match serde_json::from_value::<IncomingOperation>(value.clone()) {
                Ok(incoming) => incoming,
                Err(err) => {
                    let reason = SmolStr::new(err.to_string());
                    self.reject(ValidationError::UndecodableOperation { reason }, Some(value));
                    return;
                }
            },
        };

        if !self.ready {
            self.revisions_before_ready.push(incoming);
            return;
        }
        self.incoming(incoming);
    }

    /// Handle one incoming operation while ready. Returns true if it
    /// acknowledged the submission in flight.
    fn incoming(&mut self, incoming: IncomingOperation) -> bool {
        if incoming.submission_id.is_some() && incoming.submission_id == self.last_ack {
            self.report(
                Report::new(
                    ReportKind::DuplicateAck,
                    &self.document_id,
                    self.current_revision,
                    "operation for an already acknowledged submission",
                )
                .with_payload(serde_json::to_value(&incoming).ok()),
            );
            return false;
        }

        let (op, revision) = match self.validate(&incoming) {
            Ok(valid) => valid,
            Err(err) => {
                let payload = serde_json::to_value(&incoming).ok();
                self.reject(err, payload);
                return false;
            }
        };

        let in_flight = self.last_sent.as_ref().map(|d| d.submission_id);
        if incoming.submission_id.is_some() && incoming.submission_id == in_flight {
            self.accept_ack(revision);
            return true;
        }

        tracing::trace!(document_id = %self.document_id, revision, "remote operation");
        self.current_revision = self.current_revision.max(revision);
        self.emit(AdapterEvent::Operation(op, revision));
        self.accept_deferred_ack()
    }

    /// Take the deferred ack if the revisions before it have all arrived.
    fn accept_deferred_ack(&mut self) -> bool {
        let Some(ack) = self.deferred_ack.take() else {
            return false;
        };
        let in_flight = self.last_sent.as_ref().map(|d| d.submission_id);
        if in_flight != Some(ack.submission_id) || ack.revision <= self.current_revision {
            return false;
        }
        if ack.revision == self.current_revision + 1 {
            self.accept_ack(ack.revision);
            return true;
        }
        self.deferred_ack = Some(ack);
        false
    }

    /// Check an incoming operation against the expected shape and the next
    /// revision.
    pub fn validate(&self, incoming: &IncomingOperation) -> Result<(O, Revision), ValidationError> {
        let operation = incoming
            .operation
            .as_ref()
            .ok_or(ValidationError::MissingOperation)?;
        if !O::SHAPE.matches(operation) {
            return Err(ValidationError::MalformedOperation {
                expected: O::SHAPE.describe(),
            });
        }
        let revision = incoming.revision.ok_or(ValidationError::MissingRevision)?;
        if revision <= self.current_revision {
            return Err(ValidationError::StaleRevision {
                current: self.current_revision,
                incoming: revision,
            });
        }
        if revision != self.current_revision + 1 {
            return Err(ValidationError::RevisionGap {
                expected: self.current_revision + 1,
                incoming: revision,
            });
        }
        let op = serde_json::from_value(operation.clone()).map_err(|err| ValidationError::UndecodableOperation {
            reason: SmolStr::new(err.to_string()),
        })?;
        Ok((op, revision))
    }

    /// Finish a (re)connect with the revisions fetched since
    /// `current_revision`.
    pub fn catch_up(&mut self, fetched: Result<Vec<IncomingOperation>, SubmitError>) {
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                self.catch_up_failed(CatchUpError::Fetch(err));
                return;
            }
        };
        let buffered = std::mem::take(&mut self.revisions_before_ready);
        let merged = match self.merge(fetched, buffered) {
            Ok(merged) => merged,
            Err(err) => {
                self.catch_up_failed(err);
                return;
            }
        };

        tracing::debug!(
            document_id = %self.document_id,
            revision = self.current_revision,
            count = merged.len(),
            "caught up"
        );
        self.ready = true;
        let mut did_ack = false;
        for incoming in merged {
            did_ack |= self.incoming(incoming);
            if !self.ready {
                // One of them failed validation and a reconnect is pending.
                return;
            }
        }

        if self.has_been_ready {
            self.emit(AdapterEvent::Reconnected { did_ack });
        } else {
            self.has_been_ready = true;
            self.emit(AdapterEvent::Ready);
        }
    }

    /// Merge, dedupe by revision, drop what is already applied, and require
    /// the rest to continue `current_revision` without gaps.
    fn merge(
        &self,
        fetched: Vec<IncomingOperation>,
        buffered: Vec<IncomingOperation>,
    ) -> Result<Vec<IncomingOperation>, CatchUpError> {
        let mut by_revision = BTreeMap::new();
        for incoming in fetched.into_iter().chain(buffered) {
            let revision = incoming.revision.ok_or(CatchUpError::MissingRevision)?;
            if revision > self.current_revision {
                by_revision.entry(revision).or_insert(incoming);
            }
        }

        let mut previous = None;
        for &revision in by_revision.keys() {
            match previous {
                None if revision != self.current_revision + 1 => {
                    return Err(CatchUpError::FirstRevision {
                        expected: self.current_revision + 1,
                        found: revision,
                    });
                }
                Some(previous) if revision != previous + 1 => {
                    return Err(CatchUpError::NonContiguous {
                        previous,
                        found: revision,
                    });
                }
                _ => {}
            }
            previous = Some(revision);
        }
        Ok(by_revision.into_values().collect())
    }

    fn catch_up_failed(&mut self, err: CatchUpError) {
        self.report(Report::new(
            ReportKind::CatchUpFailed,
            &self.document_id,
            self.current_revision,
            err.to_string(),
        ));
        self.request_reconnect();
    }

    fn accept_ack(&mut self, revision: Revision) {
        self.deferred_ack = None;
        let Some(sent) = self.last_sent.take() else {
            return;
        };
        tracing::debug!(
            document_id = %self.document_id,
            revision,
            submission_id = %sent.submission_id,
            "submission acknowledged"
        );
        self.current_revision = self.current_revision.max(revision);
        self.last_ack = Some(sent.submission_id);
        self.rollback_attempts = 0;
        self.emit(AdapterEvent::Ack(revision));
    }

    fn rollback(&mut self) {
        self.last_sent = None;
        self.deferred_ack = None;
        self.rollback_attempts += 1;
        if self.rollback_attempts > self.config.rollback_ceiling {
            self.report(Report::new(
                ReportKind::RollbackCeiling,
                &self.document_id,
                self.current_revision,
                format!(
                    "{} rollbacks in a row, resynchronizing",
                    self.rollback_attempts
                ),
            ));
            self.ready = false;
            self.emit(AdapterEvent::Resync);
        } else {
            tracing::info!(
                document_id = %self.document_id,
                attempt = self.rollback_attempts,
                "submission rejected, rolling back"
            );
            self.emit(AdapterEvent::Rollback);
        }
    }

    fn reject(&mut self, err: ValidationError, payload: Option<Value>) {
        self.report(
            Report::new(
                ReportKind::ValidationFailed,
                &self.document_id,
                self.current_revision,
                err.to_string(),
            )
            .with_payload(payload),
        );
        self.request_reconnect();
    }

    fn request_reconnect(&mut self) {
        // Anything arriving before the reconnect is buffered and replayed
        // by the next catch-up.
        self.ready = false;
        self.emit(AdapterEvent::Reconnect);
    }

    fn report(&self, report: Report) {
        self.diagnostics.report(report);
    }

    fn emit(&self, event: AdapterEvent<O>) {
        if self.events.send(event).is_err() {
            tracing::trace!(document_id = %self.document_id, "adapter event dropped, session gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
    use weaver_ot::TextOp;

    struct Harness {
        adapter: ServerAdapter<TextOp>,
        events: UnboundedReceiver<AdapterEvent<TextOp>>,
        sink: RecordingSink,
    }

    impl Harness {
        fn new(revision: Revision) -> Self {
            let (tx, events) = unbounded_channel();
            let sink = RecordingSink::new();
            let adapter = ServerAdapter::new(
                "doc".into(),
                revision,
                SyncConfig::default(),
                Arc::new(sink.clone()),
                tx,
            );
            Self {
                adapter,
                events,
                sink,
            }
        }

        fn ready(revision: Revision) -> Self {
            let mut h = Self::new(revision);
            h.adapter.catch_up(Ok(Vec::new()));
            assert_eq!(h.drain(), vec![AdapterEvent::Ready]);
            h
        }

        fn drain(&mut self) -> Vec<AdapterEvent<TextOp>> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        fn send(&mut self, revision: Revision) -> SubmissionId {
            let submission_id = SubmissionId::new();
            self.adapter
                .send(Submission {
                    revision,
                    operation: TextOp::insert_at(0, "x"),
                    submission_id,
                })
                .unwrap();
            let events = self.drain();
            assert!(matches!(events.as_slice(), [AdapterEvent::Transmit(_)]));
            submission_id
        }
    }

    fn remote(revision: Revision) -> IncomingOperation {
        IncomingOperation {
            document_id: Some("doc".into()),
            revision: Some(revision),
            operation: Some(json!({"ops": [{"insert": "r"}]})),
            submission_id: Some(SubmissionId::new()),
        }
    }

    fn payload(incoming: &IncomingOperation) -> Option<Value> {
        Some(serde_json::to_value(incoming).unwrap())
    }

    #[test]
    fn test_revision_strictness() {
        let h = Harness::ready(2);
        let stale = |r| matches!(h.adapter.validate(&remote(r)), Err(ValidationError::StaleRevision { .. }));
        assert!(stale(1));
        assert!(stale(2));
        assert!(matches!(
            h.adapter.validate(&remote(4)),
            Err(ValidationError::RevisionGap { expected: 3, incoming: 4 })
        ));
        assert!(h.adapter.validate(&remote(3)).is_ok());
    }

    #[test]
    fn test_validation_reasons() {
        let h = Harness::ready(0);
        let mut missing = remote(1);
        missing.operation = None;
        assert_eq!(h.adapter.validate(&missing), Err(ValidationError::MissingOperation));

        let mut wrong_shape = remote(1);
        wrong_shape.operation = Some(json!([{"p": [0], "li": 1}]));
        assert!(matches!(
            h.adapter.validate(&wrong_shape),
            Err(ValidationError::MalformedOperation { .. })
        ));

        let mut no_revision = remote(1);
        no_revision.revision = None;
        assert_eq!(h.adapter.validate(&no_revision), Err(ValidationError::MissingRevision));
    }

    #[test]
    fn test_missing_payload_forces_reconnect() {
        let mut h = Harness::ready(0);
        h.adapter.server_operation(None);
        assert_eq!(h.drain(), vec![AdapterEvent::Reconnect]);
        assert_eq!(h.sink.count(ReportKind::ValidationFailed), 1);
        assert!(!h.adapter.is_ready());
    }

    #[test]
    fn test_remote_operation_advances_revision() {
        let mut h = Harness::ready(0);
        h.adapter.server_operation(payload(&remote(1)));
        assert_eq!(
            h.drain(),
            vec![AdapterEvent::Operation(TextOp::insert_at(0, "r"), 1)]
        );
        assert_eq!(h.adapter.current_revision(), 1);
    }

    #[test]
    fn test_broadcast_of_own_submission_is_an_ack() {
        let mut h = Harness::ready(0);
        let id = h.send(0);
        let mut own = remote(1);
        own.submission_id = Some(id);
        h.adapter.server_operation(payload(&own));
        assert_eq!(h.drain(), vec![AdapterEvent::Ack(1)]);
        assert_eq!(h.adapter.last_ack(), Some(id));
        assert!(h.adapter.last_sent().is_none());
    }

    #[test]
    fn test_duplicate_acks_are_idempotent() {
        let mut h = Harness::ready(0);
        let id = h.send(0);
        let mut own = remote(1);
        own.submission_id = Some(id);
        h.adapter.server_operation(payload(&own));
        assert_eq!(h.drain(), vec![AdapterEvent::Ack(1)]);

        // Replayed twice more over the broadcast and once as a submit response.
        h.adapter.server_operation(payload(&own));
        h.adapter.server_operation(payload(&own));
        h.adapter.submit_result(
            id,
            SendOutcome::Acked(AckData {
                submission_id: id,
                revision: 1,
            }),
        );
        assert!(h.drain().is_empty());
        assert_eq!(h.adapter.current_revision(), 1);
        assert_eq!(h.sink.count(ReportKind::DuplicateAck), 2);
    }

    #[test]
    fn test_unknown_ack_reports_mismatch() {
        let mut h = Harness::ready(0);
        h.send(0);
        h.adapter.server_ack(AckData {
            submission_id: SubmissionId::new(),
            revision: 1,
        });
        assert_eq!(h.drain(), vec![AdapterEvent::Reconnect]);
        assert_eq!(h.sink.count(ReportKind::AckMismatch), 1);
    }

    #[test]
    fn test_out_of_order_ack_is_deferred() {
        let mut h = Harness::ready(0);
        let id = h.send(0);
        h.adapter.submit_result(
            id,
            SendOutcome::Acked(AckData {
                submission_id: id,
                revision: 2,
            }),
        );
        assert!(h.drain().is_empty());
        assert!(h.adapter.last_sent().is_some());

        // Revision 1 arrives over the broadcast; the held ack follows it.
        h.adapter.server_operation(payload(&remote(1)));
        let events = h.drain();
        assert!(matches!(
            events.as_slice(),
            [AdapterEvent::Operation(_, 1), AdapterEvent::Ack(2)]
        ));
        assert_eq!(h.adapter.current_revision(), 2);
        assert_eq!(h.adapter.last_ack(), Some(id));
    }

    #[test]
    fn test_deferred_ack_dropped_after_rollback() {
        let mut h = Harness::ready(0);
        let id = h.send(0);
        h.adapter.server_ack(AckData {
            submission_id: id,
            revision: 2,
        });
        h.adapter.submit_result(id, SendOutcome::Conflict);
        assert_eq!(h.drain(), vec![AdapterEvent::Rollback]);

        h.adapter.server_operation(payload(&remote(1)));
        let events = h.drain();
        assert!(matches!(events.as_slice(), [AdapterEvent::Operation(_, 1)]));
        assert_eq!(h.adapter.current_revision(), 1);
    }

    #[test]
    fn test_debug_output_includes_sink() {
        let h = Harness::ready(3);
        let debug = format!("{:?}", h.adapter);
        assert!(debug.contains("ServerAdapter"));
        assert!(debug.contains("RecordingSink"));
    }

    #[test]
    fn test_rollback_ceiling() {
        let mut h = Harness::ready(0);
        for _ in 0..3 {
            let id = h.send(0);
            h.adapter.submit_result(id, SendOutcome::Conflict);
            assert_eq!(h.drain(), vec![AdapterEvent::Rollback]);
        }
        let id = h.send(0);
        h.adapter.submit_result(id, SendOutcome::Conflict);
        assert_eq!(h.drain(), vec![AdapterEvent::Resync]);
        assert_eq!(h.sink.count(ReportKind::RollbackCeiling), 1);
    }

    #[test]
    fn test_ack_resets_rollback_attempts() {
        let mut h = Harness::ready(0);
        let id = h.send(0);
        h.adapter.submit_result(id, SendOutcome::Conflict);
        h.drain();
        let id = h.send(0);
        h.adapter.submit_result(
            id,
            SendOutcome::Acked(AckData {
                submission_id: id,
                revision: 1,
            }),
        );
        assert_eq!(h.drain(), vec![AdapterEvent::Ack(1)]);
        assert_eq!(h.adapter.rollback_attempts(), 0);
    }

    #[test]
    fn test_network_failure_requests_reconnect() {
        let mut h = Harness::ready(0);
        let id = h.send(0);
        h.adapter.submit_result(id, SendOutcome::Network("offline".into()));
        assert_eq!(h.drain(), vec![AdapterEvent::Reconnect]);
        // Still in flight; it is resent after the reconnect.
        assert!(h.adapter.last_sent().is_some());
    }

    #[test]
    fn test_catch_up_merges_buffered_and_fetched() {
        let mut h = Harness::new(0);
        h.adapter.server_operation(payload(&remote(2)));
        h.adapter.server_operation(payload(&remote(3)));
        assert!(h.drain().is_empty());

        h.adapter.catch_up(Ok(vec![remote(2), remote(1)]));
        let events = h.drain();
        let revisions: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AdapterEvent::Operation(_, r) => Some(*r),
                _ => None,
            })
            .collect();
        assert_eq!(revisions, vec![1, 2, 3]);
        assert_eq!(events.last(), Some(&AdapterEvent::Ready));
        assert_eq!(h.adapter.current_revision(), 3);
    }

    #[test]
    fn test_catch_up_rejects_gap() {
        let mut h = Harness::new(0);
        h.adapter.catch_up(Ok(vec![remote(1), remote(3)]));
        assert_eq!(h.drain(), vec![AdapterEvent::Reconnect]);
        assert_eq!(h.sink.count(ReportKind::CatchUpFailed), 1);
        assert!(!h.adapter.is_ready());

        h.adapter.catch_up(Ok(vec![remote(2)]));
        assert_eq!(h.drain(), vec![AdapterEvent::Reconnect]);
    }

    #[test]
    fn test_reconnect_reports_ack_during_catch_up() {
        let mut h = Harness::ready(0);
        let id = h.send(0);
        h.adapter.disconnected();

        let mut own = remote(1);
        own.submission_id = Some(id);
        h.adapter.catch_up(Ok(vec![own]));
        assert_eq!(
            h.drain(),
            vec![AdapterEvent::Ack(1), AdapterEvent::Reconnected { did_ack: true }]
        );

        h.adapter.disconnected();
        h.adapter.catch_up(Ok(Vec::new()));
        assert_eq!(h.drain(), vec![AdapterEvent::Reconnected { did_ack: false }]);
    }

    #[test]
    fn test_reset_clears_in_flight_state() {
        let mut h = Harness::ready(0);
        h.send(0);
        h.adapter.reset(7);
        assert_eq!(h.adapter.current_revision(), 7);
        assert!(h.adapter.last_sent().is_none());
        assert!(!h.adapter.is_ready());
    }
}
