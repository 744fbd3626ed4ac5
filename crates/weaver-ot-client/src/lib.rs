//! Client-side synchronization for collaboratively edited documents.
//!
//! This crate provides:
//! - `OtClient`: the Synchronized / AwaitingConfirm / AwaitingWithBuffer state machine
//! - `ServerAdapter`: revision bookkeeping, acks, rollbacks and reconnect catch-up
//! - `UndoStack` and `UndoCoordinator`: undo history that survives remote edits,
//!   across any number of documents
//! - `Workspace`: owns the open documents and processes their events one at a time
//! - `MemoryServer`: an in-process authoritative log for tests and simulation

pub mod adapter;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod session;
pub mod surface;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod transport;
pub mod undo;
pub mod workspace;

pub use adapter::{AdapterEvent, ServerAdapter};
pub use client::{ClientState, OtClient, Submission};
pub use config::{SyncConfig, UndoConfig};
pub use coordinator::UndoCoordinator;
pub use diagnostics::{DiagnosticsSink, RecordingSink, Report, ReportKind, SharedSink, TracingSink};
pub use error::{CatchUpError, ClientError, ConfigError, SubmitError, SyncError, ValidationError};
pub use memory::{Fault, MemoryServer, MemoryTransport};
pub use protocol::{
    AckData, DocumentId, IncomingOperation, OperationData, Revision, Snapshot, SubmissionId,
};
pub use session::{DocumentSession, SessionEvent};
pub use surface::EditingSurface;
pub use transport::{AuthoritativeLog, EventSender, SendOutcome, Transport, TransportEvent};
pub use undo::{UndoEntry, UndoManager, UndoStack};
pub use workspace::Workspace;

pub use weaver_ot;
