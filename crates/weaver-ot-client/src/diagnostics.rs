//! Structured reporting of recoverable sync anomalies.
//!
//! Everything the sync layer recovers from on its own (validation failures,
//! duplicate acks, rollback ceilings, failed catch-ups) is reported here with
//! enough context to inspect later. Sinks must not block and must not fail.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use smol_str::SmolStr;

use crate::protocol::{DocumentId, Revision};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// An incoming remote operation failed validation.
    ValidationFailed,
    /// An operation or ack for an already acknowledged submission arrived again.
    DuplicateAck,
    /// An ack arrived for a submission that is not in flight.
    AckMismatch,
    /// Too many rollbacks in a row; the document is being resynchronized.
    RollbackCeiling,
    /// Reconnect catch-up produced a sequence with gaps or a bad start.
    CatchUpFailed,
    /// Applying rollback inverses to the document failed.
    RollbackFailed,
    /// A submission failed and will be retried.
    SendFailed,
    /// A remote or local operation could not be applied to the document.
    ApplyFailed,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::DuplicateAck => "duplicate_ack",
            Self::AckMismatch => "ack_mismatch",
            Self::RollbackCeiling => "rollback_ceiling",
            Self::CatchUpFailed => "catch_up_failed",
            Self::RollbackFailed => "rollback_failed",
            Self::SendFailed => "send_failed",
            Self::ApplyFailed => "apply_failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub kind: ReportKind,
    pub document_id: DocumentId,
    pub revision: Revision,
    pub message: SmolStr,
    /// The offending payload, when there is one.
    pub payload: Option<Value>,
}

impl Report {
    pub fn new(
        kind: ReportKind,
        document_id: &DocumentId,
        revision: Revision,
        message: impl Into<SmolStr>,
    ) -> Self {
        Self {
            kind,
            document_id: document_id.clone(),
            revision,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }
}

pub trait DiagnosticsSink: fmt::Debug + Send + Sync {
    fn report(&self, report: Report);
}

/// Reports through `tracing` at warn level, with errors for the events that
/// force a full resynchronization.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, report: Report) {
        let payload = report.payload.as_ref().map(Value::to_string);
        match report.kind {
            ReportKind::RollbackCeiling | ReportKind::RollbackFailed => tracing::error!(
                kind = report.kind.as_str(),
                document_id = %report.document_id,
                revision = report.revision,
                payload = payload.as_deref(),
                "{}",
                report.message
            ),
            _ => tracing::warn!(
                kind = report.kind.as_str(),
                document_id = %report.document_id,
                revision = report.revision,
                payload = payload.as_deref(),
                "{}",
                report.message
            ),
        }
    }
}

/// Keeps every report in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        match self.reports.lock() {
            Ok(reports) => reports.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, kind: ReportKind) -> usize {
        self.reports().iter().filter(|r| r.kind == kind).count()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, report: Report) {
        tracing::debug!(kind = report.kind.as_str(), document_id = %report.document_id, "recorded report");
        match self.reports.lock() {
            Ok(mut reports) => reports.push(report),
            Err(poisoned) => poisoned.into_inner().push(report),
        }
    }
}

pub type SharedSink = Arc<dyn DiagnosticsSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_counts() {
        let sink = RecordingSink::new();
        let doc = DocumentId::new("d");
        sink.report(Report::new(ReportKind::DuplicateAck, &doc, 2, "dup"));
        sink.report(Report::new(ReportKind::DuplicateAck, &doc, 2, "dup"));
        sink.report(Report::new(ReportKind::AckMismatch, &doc, 2, "mismatch"));
        assert_eq!(sink.count(ReportKind::DuplicateAck), 2);
        assert_eq!(sink.reports().len(), 3);
    }
}
