//! The editing surface a session keeps in sync.
//!
//! Whatever displays the document implements [`EditingSurface`]: it applies
//! operations coming from the server, replaces its contents on a full
//! resynchronization, hands out a snapshot that local edits are inverted
//! against, and reports its JSON form so a session can check it against the
//! server's view.

use std::borrow::Borrow;

use serde_json::Value;
use weaver_ot::{Operation, OtError, Pane, Rope, TextOp, TreeOp};

pub trait EditingSurface<O: Operation>: Send {
    /// Owned form of the document an operation is inverted against.
    type Snapshot: Borrow<O::Context>;

    fn apply_operation(&mut self, op: &O) -> Result<(), OtError>;

    /// Replace the whole document with the server's JSON form.
    fn update_contents(&mut self, document: Value) -> Result<(), OtError>;

    fn snapshot(&self) -> Result<Self::Snapshot, OtError>;

    /// The document in the same JSON form `update_contents` accepts.
    fn contents(&self) -> Result<Value, OtError>;
}

impl EditingSurface<TreeOp> for Pane {
    type Snapshot = Value;

    fn apply_operation(&mut self, op: &TreeOp) -> Result<(), OtError> {
        self.apply(op)
    }

    fn update_contents(&mut self, document: Value) -> Result<(), OtError> {
        *self = Pane::from_json(document)?;
        Ok(())
    }

    fn snapshot(&self) -> Result<Value, OtError> {
        self.to_json()
    }

    fn contents(&self) -> Result<Value, OtError> {
        self.to_json()
    }
}

impl EditingSurface<TreeOp> for Value {
    type Snapshot = Value;

    fn apply_operation(&mut self, op: &TreeOp) -> Result<(), OtError> {
        op.apply(self)
    }

    fn update_contents(&mut self, document: Value) -> Result<(), OtError> {
        *self = document;
        Ok(())
    }

    fn snapshot(&self) -> Result<Value, OtError> {
        Ok(self.clone())
    }

    fn contents(&self) -> Result<Value, OtError> {
        Ok(self.clone())
    }
}

impl EditingSurface<TextOp> for Rope {
    type Snapshot = String;

    fn apply_operation(&mut self, op: &TextOp) -> Result<(), OtError> {
        op.apply_to_rope(self)
    }

    fn update_contents(&mut self, document: Value) -> Result<(), OtError> {
        let Value::String(text) = document else {
            return Err(OtError::NotText {
                path: Default::default(),
            });
        };
        *self = Rope::from_str(&text);
        Ok(())
    }

    fn snapshot(&self) -> Result<String, OtError> {
        Ok(self.to_string())
    }

    fn contents(&self) -> Result<Value, OtError> {
        Ok(Value::String(self.to_string()))
    }
}
