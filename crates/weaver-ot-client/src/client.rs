//! The client side of the OT protocol for one document.
//!
//! [`OtClient`] decides when a local edit can be sent, buffers edits made
//! while one is in flight, and rebases remote operations over whatever is not
//! yet acknowledged. It does no I/O: each transition returns what the caller
//! should send or apply.

use weaver_ot::{CursorTransform, Operation, Priority, Selection};

use crate::error::ClientError;
use crate::protocol::{Revision, SubmissionId};

#[derive(Clone, Debug, PartialEq)]
pub enum ClientState<O> {
    /// Nothing in flight.
    Synchronized,
    /// One submission in flight.
    AwaitingConfirm {
        outstanding: O,
        inverse_outstanding: O,
        submission_id: SubmissionId,
    },
    /// One submission in flight and local edits made since, not yet sent.
    AwaitingWithBuffer {
        outstanding: O,
        inverse_outstanding: O,
        buffer: O,
        inverse_buffer: O,
        submission_id: SubmissionId,
    },
}

impl<O> Default for ClientState<O> {
    fn default() -> Self {
        Self::Synchronized
    }
}

impl<O> ClientState<O> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Synchronized => "synchronized",
            Self::AwaitingConfirm { .. } => "awaiting_confirm",
            Self::AwaitingWithBuffer { .. } => "awaiting_with_buffer",
        }
    }

    pub fn submission_id(&self) -> Option<SubmissionId> {
        match self {
            Self::Synchronized => None,
            Self::AwaitingConfirm { submission_id, .. }
            | Self::AwaitingWithBuffer { submission_id, .. } => Some(*submission_id),
        }
    }
}

/// An operation to hand to the server adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission<O> {
    /// Revision the operation applies to.
    pub revision: Revision,
    pub operation: O,
    pub submission_id: SubmissionId,
}

#[derive(Clone, Debug)]
pub struct OtClient<O> {
    revision: Revision,
    state: ClientState<O>,
}

impl<O: Operation> OtClient<O> {
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            state: ClientState::Synchronized,
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn state(&self) -> &ClientState<O> {
        &self.state
    }

    pub fn is_synchronized(&self) -> bool {
        matches!(self.state, ClientState::Synchronized)
    }

    /// The submission in flight, as rebased over every remote operation
    /// applied since it was sent.
    pub fn outstanding(&self) -> Option<&O> {
        match &self.state {
            ClientState::Synchronized => None,
            ClientState::AwaitingConfirm { outstanding, .. }
            | ClientState::AwaitingWithBuffer { outstanding, .. } => Some(outstanding),
        }
    }

    /// Drop everything in flight and start over at `revision`.
    pub fn reset(&mut self, revision: Revision) {
        self.revision = revision;
        self.state = ClientState::Synchronized;
    }

    /// A local edit was made. Returns the submission to send, if any.
    pub fn apply_client(
        &mut self,
        op: O,
        inverse: O,
    ) -> Result<Option<Submission<O>>, ClientError> {
        let state = std::mem::take(&mut self.state);
        let (next, send) = match state {
            ClientState::Synchronized => {
                let submission_id = SubmissionId::new();
                let send = Submission {
                    revision: self.revision,
                    operation: op.clone(),
                    submission_id,
                };
                (
                    ClientState::AwaitingConfirm {
                        outstanding: op,
                        inverse_outstanding: inverse,
                        submission_id,
                    },
                    Some(send),
                )
            }
            ClientState::AwaitingConfirm {
                outstanding,
                inverse_outstanding,
                submission_id,
            } => (
                ClientState::AwaitingWithBuffer {
                    outstanding,
                    inverse_outstanding,
                    buffer: op,
                    inverse_buffer: inverse,
                    submission_id,
                },
                None,
            ),
            ClientState::AwaitingWithBuffer {
                outstanding,
                inverse_outstanding,
                buffer,
                inverse_buffer,
                submission_id,
            } => {
                let merged = buffer.compose(&op);
                let merged_inverse = inverse.compose(&inverse_buffer);
                match (merged, merged_inverse) {
                    (Ok(buffer), Ok(inverse_buffer)) => (
                        ClientState::AwaitingWithBuffer {
                            outstanding,
                            inverse_outstanding,
                            buffer,
                            inverse_buffer,
                            submission_id,
                        },
                        None,
                    ),
                    (Err(e), _) | (_, Err(e)) => {
                        self.state = ClientState::AwaitingWithBuffer {
                            outstanding,
                            inverse_outstanding,
                            buffer,
                            inverse_buffer,
                            submission_id,
                        };
                        return Err(e.into());
                    }
                }
            }
        };
        self.state = next;
        Ok(send)
    }

    /// A remote operation arrived. Returns the operation to apply to the
    /// local document, rebased over anything unacknowledged.
    pub fn apply_server(&mut self, op: &O) -> Result<O, ClientError> {
        let (next, apply) = match &self.state {
            ClientState::Synchronized => (ClientState::Synchronized, op.clone()),
            ClientState::AwaitingConfirm {
                outstanding,
                inverse_outstanding,
                submission_id,
            } => {
                let incoming = op.transform(outstanding, Priority::Right)?;
                (
                    ClientState::AwaitingConfirm {
                        outstanding: outstanding.transform(op, Priority::Left)?,
                        inverse_outstanding: inverse_outstanding
                            .transform(&incoming, Priority::Left)?,
                        submission_id: *submission_id,
                    },
                    incoming,
                )
            }
            ClientState::AwaitingWithBuffer {
                outstanding,
                inverse_outstanding,
                buffer,
                inverse_buffer,
                submission_id,
            } => {
                let past_outstanding = op.transform(outstanding, Priority::Right)?;
                let incoming = past_outstanding.transform(buffer, Priority::Right)?;
                (
                    ClientState::AwaitingWithBuffer {
                        outstanding: outstanding.transform(op, Priority::Left)?,
                        inverse_outstanding: inverse_outstanding
                            .transform(&past_outstanding, Priority::Left)?,
                        buffer: buffer.transform(&past_outstanding, Priority::Left)?,
                        inverse_buffer: inverse_buffer.transform(&incoming, Priority::Left)?,
                        submission_id: *submission_id,
                    },
                    incoming,
                )
            }
        };
        self.state = next;
        self.revision += 1;
        Ok(apply)
    }

    /// The outstanding submission was acknowledged. Returns the buffered
    /// edits to send next, if any.
    pub fn server_ack(&mut self) -> Result<Option<Submission<O>>, ClientError> {
        let state = std::mem::take(&mut self.state);
        let send = match state {
            ClientState::Synchronized => return Err(ClientError::AckWhileSynchronized),
            ClientState::AwaitingConfirm { .. } => None,
            ClientState::AwaitingWithBuffer {
                buffer,
                inverse_buffer,
                ..
            } => {
                if buffer.is_noop() {
                    None
                } else {
                    let submission_id = SubmissionId::new();
                    let send = Submission {
                        revision: self.revision + 1,
                        operation: buffer.clone(),
                        submission_id,
                    };
                    self.state = ClientState::AwaitingConfirm {
                        outstanding: buffer,
                        inverse_outstanding: inverse_buffer,
                        submission_id,
                    };
                    Some(send)
                }
            }
        };
        self.revision += 1;
        Ok(send)
    }

    /// The outstanding submission was rejected. Returns the inverses to
    /// apply to the document, in order. The client is synchronized
    /// afterwards whatever happens to those inverses.
    pub fn server_rollback(&mut self) -> Result<Vec<O>, ClientError> {
        match std::mem::take(&mut self.state) {
            ClientState::Synchronized => Err(ClientError::RollbackWhileSynchronized),
            ClientState::AwaitingConfirm {
                inverse_outstanding,
                ..
            } => Ok(vec![inverse_outstanding]),
            // The buffer sits on top of the outstanding edit, so it is undone first.
            ClientState::AwaitingWithBuffer {
                inverse_outstanding,
                inverse_buffer,
                ..
            } => Ok(vec![inverse_buffer, inverse_outstanding]),
        }
    }

    /// Re-send the outstanding submission under its existing id. The buffer
    /// is never re-sent; it has not been submitted yet.
    pub fn resend(&self) -> Result<Submission<O>, ClientError> {
        match &self.state {
            ClientState::Synchronized => Err(ClientError::ResendWhileSynchronized),
            ClientState::AwaitingConfirm {
                outstanding,
                submission_id,
                ..
            }
            | ClientState::AwaitingWithBuffer {
                outstanding,
                submission_id,
                ..
            } => Ok(Submission {
                revision: self.revision,
                operation: outstanding.clone(),
                submission_id: *submission_id,
            }),
        }
    }
}

impl<O: CursorTransform> OtClient<O> {
    /// Map a selection made on the server's view of the document onto the
    /// local one, which has the unacknowledged edits applied.
    pub fn transform_cursor(&self, selection: Selection) -> Selection {
        match &self.state {
            ClientState::Synchronized => selection,
            ClientState::AwaitingConfirm { outstanding, .. } => selection.transform(outstanding),
            ClientState::AwaitingWithBuffer {
                outstanding,
                buffer,
                ..
            } => selection.transform(outstanding).transform(buffer),
        }
    }
}
