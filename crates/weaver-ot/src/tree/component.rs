//! Single path-addressed edits and their json0 wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::OtError;
use crate::operation::Operation;
use crate::text::TextOp;
use crate::tree::{Path, PathSegment};

/// Subtype tag carried by text sub-edits on the wire.
pub const TEXT_SUBTYPE: &str = "text";

/// What a component does at its path.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    /// Insert a value into a list before the index at the end of the path.
    ListInsert(Value),
    /// Remove the list item at the path. Carries the removed value.
    ListDelete(Value),
    /// Swap the list item at the path for another.
    ListReplace { old: Value, new: Value },
    /// Move the list item at the path to the given index.
    ListMove(usize),
    /// Set an object key that was absent.
    ObjectInsert(Value),
    /// Remove an object key. Carries the removed value.
    ObjectDelete(Value),
    /// Overwrite an object key.
    ObjectReplace { old: Value, new: Value },
    /// Edit the string at the path with a linear operation.
    Text(TextOp),
}

/// One edit at one location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawComponent", into = "RawComponent")]
pub struct Component {
    pub path: Path,
    pub edit: Edit,
}

impl Component {
    pub fn new(path: Path, edit: Edit) -> Self {
        Self { path, edit }
    }

    pub fn list_insert(path: Path, value: Value) -> Self {
        Self::new(path, Edit::ListInsert(value))
    }

    pub fn list_delete(path: Path, value: Value) -> Self {
        Self::new(path, Edit::ListDelete(value))
    }

    pub fn list_replace(path: Path, old: Value, new: Value) -> Self {
        Self::new(path, Edit::ListReplace { old, new })
    }

    pub fn list_move(path: Path, to: usize) -> Self {
        Self::new(path, Edit::ListMove(to))
    }

    pub fn object_insert(path: Path, value: Value) -> Self {
        Self::new(path, Edit::ObjectInsert(value))
    }

    pub fn object_delete(path: Path, value: Value) -> Self {
        Self::new(path, Edit::ObjectDelete(value))
    }

    pub fn object_replace(path: Path, old: Value, new: Value) -> Self {
        Self::new(path, Edit::ObjectReplace { old, new })
    }

    pub fn text(path: Path, op: TextOp) -> Self {
        Self::new(path, Edit::Text(op))
    }

    /// True when this component leaves every document unchanged.
    pub fn is_noop(&self) -> bool {
        match &self.edit {
            Edit::Text(op) => op.is_noop(),
            Edit::ListMove(to) => self.path.last().and_then(PathSegment::as_index) == Some(*to),
            _ => false,
        }
    }

    /// Depth of the value this component operates on. Text edits reach one
    /// level below their path.
    pub(crate) fn operand_len(&self) -> usize {
        match self.edit {
            Edit::Text(_) => self.path.len() + 1,
            _ => self.path.len(),
        }
    }

    pub(crate) fn inserted_item(&self) -> Option<&Value> {
        match &self.edit {
            Edit::ListInsert(v) | Edit::ListReplace { new: v, .. } => Some(v),
            _ => None,
        }
    }

    pub(crate) fn deleted_item(&self) -> Option<&Value> {
        match &self.edit {
            Edit::ListDelete(v) | Edit::ListReplace { old: v, .. } => Some(v),
            _ => None,
        }
    }

    pub(crate) fn inserted_key(&self) -> Option<&Value> {
        match &self.edit {
            Edit::ObjectInsert(v) | Edit::ObjectReplace { new: v, .. } => Some(v),
            _ => None,
        }
    }

    pub(crate) fn deleted_key(&self) -> Option<&Value> {
        match &self.edit {
            Edit::ObjectDelete(v) | Edit::ObjectReplace { old: v, .. } => Some(v),
            _ => None,
        }
    }

    pub(crate) fn move_target(&self) -> Option<usize> {
        match self.edit {
            Edit::ListMove(to) => Some(to),
            _ => None,
        }
    }

    pub(crate) fn is_pure_list_insert(&self) -> bool {
        matches!(self.edit, Edit::ListInsert(_))
    }
}

/// The json0 component object: `{"p": [...], "li": .., "ld": .., ...}`.
#[derive(Serialize, Deserialize)]
struct RawComponent {
    p: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    li: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ld: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lm: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oi: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    od: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    o: Option<TextOp>,
}

impl TryFrom<RawComponent> for Component {
    type Error = OtError;

    fn try_from(raw: RawComponent) -> Result<Self, Self::Error> {
        let RawComponent {
            p,
            li,
            ld,
            lm,
            oi,
            od,
            t,
            o,
        } = raw;
        let edit = match (li, ld, lm, oi, od, t, o) {
            (Some(new), None, None, None, None, None, None) => Edit::ListInsert(new),
            (None, Some(old), None, None, None, None, None) => Edit::ListDelete(old),
            (Some(new), Some(old), None, None, None, None, None) => Edit::ListReplace { old, new },
            (None, None, Some(to), None, None, None, None) => Edit::ListMove(to),
            (None, None, None, Some(new), None, None, None) => Edit::ObjectInsert(new),
            (None, None, None, None, Some(old), None, None) => Edit::ObjectDelete(old),
            (None, None, None, Some(new), Some(old), None, None) => {
                Edit::ObjectReplace { old, new }
            }
            (None, None, None, None, None, Some(t), Some(op)) if t == TEXT_SUBTYPE => Edit::Text(op),
            (None, None, None, None, None, Some(t), _) => {
                return Err(OtError::MalformedComponent(
                    format!("unsupported subtype `{t}` at {p}").into(),
                ));
            }
            _ => {
                return Err(OtError::MalformedComponent(
                    format!("no recognizable edit at {p}").into(),
                ));
            }
        };
        if p.is_empty() && !matches!(edit, Edit::Text(_)) {
            return Err(OtError::MalformedComponent(
                "structural edits need a non-empty path".into(),
            ));
        }
        Ok(Component { path: p, edit })
    }
}

impl From<Component> for RawComponent {
    fn from(c: Component) -> Self {
        let mut raw = RawComponent {
            p: c.path,
            li: None,
            ld: None,
            lm: None,
            oi: None,
            od: None,
            t: None,
            o: None,
        };
        match c.edit {
            Edit::ListInsert(v) => raw.li = Some(v),
            Edit::ListDelete(v) => raw.ld = Some(v),
            Edit::ListReplace { old, new } => {
                raw.ld = Some(old);
                raw.li = Some(new);
            }
            Edit::ListMove(to) => raw.lm = Some(to),
            Edit::ObjectInsert(v) => raw.oi = Some(v),
            Edit::ObjectDelete(v) => raw.od = Some(v),
            Edit::ObjectReplace { old, new } => {
                raw.od = Some(old);
                raw.oi = Some(new);
            }
            Edit::Text(op) => {
                raw.t = Some(SmolStr::new_static(TEXT_SUBTYPE));
                raw.o = Some(op);
            }
        }
        raw
    }
}
