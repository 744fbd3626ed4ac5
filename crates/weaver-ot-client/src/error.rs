use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;
use weaver_ot::OtError;

use crate::protocol::{DocumentId, Revision};

/// Top-level error type for a synchronized document session.
#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ot(#[from] OtError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CatchUp(#[from] CatchUpError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transport(#[from] SubmitError),

    #[error("document {0} is not open")]
    #[diagnostic(code(sync::unknown_document))]
    UnknownDocument(DocumentId),

    #[error("document {0} is already open")]
    #[diagnostic(code(sync::duplicate_document))]
    DuplicateDocument(DocumentId),

    #[error("document {0} is being reloaded from the server")]
    #[diagnostic(code(sync::resynchronizing))]
    Resynchronizing(DocumentId),

    #[error("failed to encode operation")]
    #[diagnostic(code(sync::encode))]
    Encode(#[from] serde_json::Error),
}

/// Invalid transitions of the client state machine.
///
/// These mean the state machine and the server adapter disagree about what
/// is in flight.
#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("acknowledgement received with nothing outstanding")]
    #[diagnostic(code(client::ack_while_synchronized))]
    AckWhileSynchronized,

    #[error("rollback received with nothing outstanding")]
    #[diagnostic(code(client::rollback_while_synchronized))]
    RollbackWhileSynchronized,

    #[error("nothing outstanding to resend")]
    #[diagnostic(code(client::resend_while_synchronized))]
    ResendWhileSynchronized,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ot(#[from] OtError),
}

/// Why an incoming remote operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ValidationError {
    #[error("incoming message has no payload")]
    #[diagnostic(code(validation::missing_payload))]
    MissingPayload,

    #[error("incoming message has no operation")]
    #[diagnostic(code(validation::missing_operation))]
    MissingOperation,

    #[error("incoming message has no revision")]
    #[diagnostic(code(validation::missing_revision))]
    MissingRevision,

    #[error("operation is not an {expected}")]
    #[diagnostic(code(validation::malformed_operation))]
    MalformedOperation { expected: &'static str },

    #[error("operation could not be decoded: {reason}")]
    #[diagnostic(code(validation::undecodable_operation))]
    UndecodableOperation { reason: SmolStr },

    #[error("stale revision {incoming}, already at {current}")]
    #[diagnostic(code(validation::stale_revision))]
    StaleRevision { current: Revision, incoming: Revision },

    #[error("revision gap: expected {expected}, got {incoming}")]
    #[diagnostic(code(validation::revision_gap))]
    RevisionGap {
        expected: Revision,
        incoming: Revision,
    },
}

/// Why a reconnect catch-up sequence was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CatchUpError {
    #[error("catch-up starts at revision {found}, expected {expected}")]
    #[diagnostic(code(catch_up::first_revision))]
    FirstRevision { expected: Revision, found: Revision },

    #[error("catch-up jumps from revision {previous} to {found}")]
    #[diagnostic(code(catch_up::non_contiguous))]
    NonContiguous { previous: Revision, found: Revision },

    #[error("catch-up entry has no revision")]
    #[diagnostic(code(catch_up::missing_revision))]
    MissingRevision,

    #[error("fetching revisions failed")]
    #[diagnostic(code(catch_up::fetch))]
    Fetch(#[source] SubmitError),
}

/// Failures reported by the authoritative log.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SubmitError {
    /// The request never reached the server.
    #[error("network failure: {0}")]
    #[diagnostic(code(transport::network))]
    Network(SmolStr),

    /// The server rejected the submission as conflicting.
    #[error("submission conflicts with the server log")]
    #[diagnostic(code(transport::conflict))]
    Conflict,

    #[error("request failed: {0}")]
    #[diagnostic(code(transport::other))]
    Other(SmolStr),
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    #[diagnostic(code(config::invalid_env))]
    InvalidEnv { var: &'static str, value: String },
}
