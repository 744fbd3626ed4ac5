//! Tree operations over the JSON form of a document.
//!
//! A [`TreeOp`] is an ordered list of [`Component`]s, each addressing one
//! location by [`Path`]. Components are kept normalized: adjacent components
//! at the same path are folded together on construction and composition.

mod apply;
mod component;
mod path;
mod transform;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use component::{Component, Edit, TEXT_SUBTYPE};
pub use path::{Path, PathSegment};

use crate::OtError;
use crate::operation::{Operation, OperationShape, Priority, WireOperation};

pub(crate) use apply::resolve;

/// An edit to a tree-shaped document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeOp {
    components: Vec<Component>,
}

impl TreeOp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from components, folding same-path neighbours together.
    pub fn from_components(
        components: impl IntoIterator<Item = Component>,
    ) -> Result<Self, OtError> {
        let mut out = Self::new();
        for c in components {
            out.push(c)?;
        }
        Ok(out)
    }

    pub fn single(component: Component) -> Self {
        Self {
            components: if component.is_noop() {
                Vec::new()
            } else {
                vec![component]
            },
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn push(&mut self, component: Component) -> Result<(), OtError> {
        transform::append(&mut self.components, component)
    }

    /// Apply to `doc` in place. On error `doc` may be partially edited; use
    /// [`TreeOp::applied`] to keep the input intact.
    pub fn apply(&self, doc: &mut Value) -> Result<(), OtError> {
        for c in &self.components {
            apply::apply_component(doc, c)?;
        }
        Ok(())
    }

    /// Apply to a copy of `doc`.
    pub fn applied(&self, doc: &Value) -> Result<Value, OtError> {
        let mut out = doc.clone();
        self.apply(&mut out)?;
        Ok(out)
    }
}

fn invert_component(c: &Component, before: &Value) -> Result<Component, OtError> {
    let path = c.path.clone();
    let edit = match &c.edit {
        Edit::ListInsert(v) => Edit::ListDelete(v.clone()),
        Edit::ListDelete(v) => Edit::ListInsert(v.clone()),
        Edit::ListReplace { old, new } => Edit::ListReplace {
            old: new.clone(),
            new: old.clone(),
        },
        Edit::ListMove(to) => {
            let from = c.path.last().cloned().ok_or_else(|| {
                OtError::MalformedComponent("list move at the document root".into())
            })?;
            return Ok(Component::new(
                c.path.with_last(*to),
                Edit::ListMove(from.as_index().ok_or_else(|| OtError::InvalidPath {
                    path: c.path.clone(),
                    reason: "list move from an object key".into(),
                })?),
            ));
        }
        Edit::ObjectInsert(v) => Edit::ObjectDelete(v.clone()),
        Edit::ObjectDelete(v) => Edit::ObjectInsert(v.clone()),
        Edit::ObjectReplace { old, new } => Edit::ObjectReplace {
            old: new.clone(),
            new: old.clone(),
        },
        Edit::Text(op) => {
            let target = resolve(before, &c.path)?;
            let text = target.as_str().ok_or_else(|| OtError::NotText {
                path: c.path.clone(),
            })?;
            Edit::Text(op.invert(text)?)
        }
    };
    Ok(Component::new(path, edit))
}

impl Operation for TreeOp {
    type Context = Value;

    fn noop() -> Self {
        Self::new()
    }

    fn compose(&self, other: &Self) -> Result<Self, OtError> {
        let mut out = self.clone();
        for c in &other.components {
            out.push(c.clone())?;
        }
        Ok(out)
    }

    fn transform(&self, other: &Self, priority: Priority) -> Result<Self, OtError> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        let components = match (self.components.as_slice(), other.components.as_slice()) {
            ([mine], [theirs]) => {
                let mut out = Vec::new();
                transform::transform_component(&mut out, mine, theirs, priority)?;
                out
            }
            _ if priority.is_left() => transform::transform_x(&self.components, &other.components)?.0,
            _ => transform::transform_x(&other.components, &self.components)?.1,
        };
        Ok(Self { components })
    }

    /// Components are inverted against the document as it stands just before
    /// each one applies, so text sub-edits see the text they edited.
    fn invert(&self, context: &Value) -> Result<Self, OtError> {
        let mut doc = context.clone();
        let mut inverted = Vec::with_capacity(self.components.len());
        for c in &self.components {
            inverted.push(invert_component(c, &doc)?);
            apply::apply_component(&mut doc, c)?;
        }
        inverted.reverse();
        Self::from_components(inverted)
    }

    fn is_noop(&self) -> bool {
        self.components.iter().all(Component::is_noop)
    }
}

impl WireOperation for TreeOp {
    const SHAPE: OperationShape = OperationShape::Tree;

    fn apply_json(&self, document: &mut Value) -> Result<(), OtError> {
        self.apply(document)
    }
}
