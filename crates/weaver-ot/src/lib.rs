//! Operation algebra for collaborative pane editing.
//!
//! This crate provides:
//! - `Operation`: the compose/transform/invert capability the sync layer is written against
//! - `TextOp`: linear retain/insert/delete operations over characters
//! - `TreeOp`: path-addressed operations over the JSON form of a document
//! - `Pane`: the nested list/element document tree
//! - Edit builders returning `(op, inverse)` pairs for every structural edit

mod error;
mod operation;
mod selection;
mod text;

pub mod builders;
pub mod pane;
pub mod selectors;
pub mod tree;

pub use builders::EditPair;
pub use error::{OtError, SelectorError};
pub use operation::{CursorTransform, Operation, OperationShape, Priority, WireOperation};
pub use pane::{Element, ElementKind, Pane, PaneList};
pub use selection::Selection;
pub use text::{TextComponent, TextOp};
pub use tree::{Component, Edit, Path, PathSegment, TreeOp};

// Re-export so consumers can hold rope-backed documents without a direct dep.
pub use ropey::Rope;
