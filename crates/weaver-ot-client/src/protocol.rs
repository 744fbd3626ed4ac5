//! Wire types exchanged with the authoritative log and the transport.
//!
//! All payloads are JSON with camelCase field names. Operations travel as raw
//! JSON values so the receiving side can validate their shape before decoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use uuid::Uuid;

/// Server-assigned position in a document's edit log.
pub type Revision = u64;

/// Inbound message name carrying a committed operation.
pub const OPERATION_EVENT: &str = "operation";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(SmolStr);

impl DocumentId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Client-generated id of a local edit in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A submitted or committed operation.
///
/// Sent by the client as `revision` = the revision the operation was built
/// against; broadcast by the server with `revision` = the revision it was
/// committed as.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationData {
    pub document_id: DocumentId,
    pub revision: Revision,
    pub operation: Value,
    pub submission_id: SubmissionId,
}

/// A remote operation as received, before validation.
///
/// Every field is optional so that a missing one can be reported precisely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingOperation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<SubmissionId>,
}

impl From<OperationData> for IncomingOperation {
    fn from(data: OperationData) -> Self {
        Self {
            document_id: Some(data.document_id),
            revision: Some(data.revision),
            operation: Some(data.operation),
            submission_id: Some(data.submission_id),
        }
    }
}

/// The server's acknowledgement of a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckData {
    pub submission_id: SubmissionId,
    pub revision: Revision,
}

/// Full document state at a revision, used for resynchronization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub revision: Revision,
    pub document: Value,
}
