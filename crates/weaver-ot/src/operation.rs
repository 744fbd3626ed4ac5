//! The operation capability shared by every realization.
//!
//! The client state machine and the undo engine are written once against
//! [`Operation`]; [`TextOp`](crate::TextOp) and [`TreeOp`](crate::TreeOp)
//! are the two conforming variants.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::OtError;

/// Which side wins when two operations touch the same location.
///
/// In `a.transform(&b, Priority::Left)`, `a` is the left side: its inserts
/// land before `b`'s at the same position and its replacements survive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    Left,
    Right,
}

impl Priority {
    /// The priority the other side of the same transform pair uses.
    pub fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn is_left(self) -> bool {
        matches!(self, Self::Left)
    }
}

/// Composable, transformable, invertible description of a document edit.
///
/// Laws, for any document `s`:
/// - `apply(apply(s, a), b) == apply(s, a.compose(&b))`
/// - `apply(apply(s, a), b.transform(&a, Right)) == apply(apply(s, b), a.transform(&b, Left))`
/// - `apply(apply(s, a), a.invert(&s)) == s`
pub trait Operation: Clone + std::fmt::Debug + PartialEq + Sized {
    /// The document shape this operation is inverted against.
    type Context: ?Sized;

    /// An operation that changes nothing.
    fn noop() -> Self;

    /// Sequential composition: `self` followed by `other`.
    fn compose(&self, other: &Self) -> Result<Self, OtError>;

    /// Re-express `self` so it applies after `other` has already been applied.
    fn transform(&self, other: &Self, priority: Priority) -> Result<Self, OtError>;

    /// The operation that undoes `self`, given the document `self` applies to.
    fn invert(&self, context: &Self::Context) -> Result<Self, OtError>;

    /// True when applying this operation cannot change any document.
    fn is_noop(&self) -> bool;
}

/// Operations that can carry a cursor forward.
pub trait CursorTransform: Operation {
    /// Map a position through this operation.
    ///
    /// With `Priority::Left` the position stays in front of text inserted at
    /// exactly that position; with `Priority::Right` it moves past it.
    fn transform_position(&self, index: usize, priority: Priority) -> usize;
}

/// The JSON shape an operation takes on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationShape {
    /// Array of path-addressed components.
    Tree,
    /// Object holding an `ops` array.
    Linear,
}

impl OperationShape {
    /// Shallow check that `value` has this shape.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Tree => value.is_array(),
            Self::Linear => value
                .as_object()
                .and_then(|obj| obj.get("ops"))
                .is_some_and(Value::is_array),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Tree => "array of tree components",
            Self::Linear => "object with an `ops` array",
        }
    }
}

/// Operations with a JSON wire form and a JSON document model.
pub trait WireOperation: Operation + Serialize + DeserializeOwned {
    const SHAPE: OperationShape;

    /// Apply to the JSON form of the document.
    fn apply_json(&self, document: &mut Value) -> Result<(), OtError>;
}
