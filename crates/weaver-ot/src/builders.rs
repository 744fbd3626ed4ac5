//! Structural edits over a [`Pane`], each returned with its inverse.
//!
//! Every builder reads the pane it is given to resolve ids and capture the
//! values an inverse needs, so it must be handed the current snapshot. For
//! every builder, applying `op` then `inverse` yields the original pane.

use serde_json::Value;
use smol_str::SmolStr;

use crate::operation::Operation;
use crate::pane::{Element, Pane, PaneList, VALUE};
use crate::selectors;
use crate::text::TextOp;
use crate::tree::{Component, Path, PathSegment, TreeOp};
use crate::OtError;

/// An operation and the operation that undoes it.
#[derive(Clone, Debug, PartialEq)]
pub struct EditPair {
    pub op: TreeOp,
    pub inverse: TreeOp,
}

impl EditPair {
    pub fn new(op: TreeOp, inverse: TreeOp) -> Self {
        Self { op, inverse }
    }

    fn single(op: Component, inverse: Component) -> Self {
        Self::new(TreeOp::single(op), TreeOp::single(inverse))
    }

    pub fn noop() -> Self {
        Self::new(TreeOp::new(), TreeOp::new())
    }

    pub fn is_noop(&self) -> bool {
        self.op.is_noop()
    }

    /// `self` followed by `next`. The inverse undoes `next` first.
    pub fn then(&self, next: &EditPair) -> Result<Self, OtError> {
        Ok(Self {
            op: self.op.compose(&next.op)?,
            inverse: next.inverse.compose(&self.inverse)?,
        })
    }
}

pub fn insert_list(pane: &Pane, index: usize, list: &PaneList) -> Result<EditPair, OtError> {
    let index = index.min(pane.lists.len());
    let value = serde_json::to_value(list)?;
    let path = Pane::list_path(index);
    Ok(EditPair::single(
        Component::list_insert(path.clone(), value.clone()),
        Component::list_delete(path, value),
    ))
}

/// Remove a list. The inverse carries the whole list back.
pub fn remove_list(pane: &Pane, list_id: &str) -> Result<EditPair, OtError> {
    let index = selectors::list_index(pane, list_id)?;
    let value = serde_json::to_value(&pane.lists[index])?;
    let path = Pane::list_path(index);
    Ok(EditPair::single(
        Component::list_delete(path.clone(), value.clone()),
        Component::list_insert(path, value),
    ))
}

pub fn move_list(pane: &Pane, list_id: &str, to: usize) -> Result<EditPair, OtError> {
    let from = selectors::list_index(pane, list_id)?;
    let to = to.min(pane.lists.len().saturating_sub(1));
    if from == to {
        return Ok(EditPair::noop());
    }
    Ok(EditPair::single(
        Component::list_move(Pane::list_path(from), to),
        Component::list_move(Pane::list_path(to), from),
    ))
}

pub fn insert_element(
    pane: &Pane,
    list_id: &str,
    index: usize,
    element: &Element,
) -> Result<EditPair, OtError> {
    let l = selectors::list_index(pane, list_id)?;
    let index = index.min(pane.lists[l].elements.len());
    let value = serde_json::to_value(element)?;
    let path = Pane::element_path(l, index);
    Ok(EditPair::single(
        Component::list_insert(path.clone(), value.clone()),
        Component::list_delete(path, value),
    ))
}

/// Insert an element at the same index in each of several lists as one
/// operation, e.g. adding a row across every column.
///
/// Each per-list insert is built against the pane as the previous ones left
/// it, then folded in with `compose`.
pub fn insert_element_in_lists<'a>(
    pane: &Pane,
    index: usize,
    inserts: impl IntoIterator<Item = (&'a str, Element)>,
) -> Result<EditPair, OtError> {
    let mut working = pane.clone();
    let mut out = EditPair::noop();
    for (list_id, element) in inserts {
        let pair = insert_element(&working, list_id, index, &element)?;
        working.apply(&pair.op)?;
        out = out.then(&pair)?;
    }
    Ok(out)
}

/// Remove an element. The inverse carries the removed element back.
pub fn remove_element(pane: &Pane, list_id: &str, element_id: &str) -> Result<EditPair, OtError> {
    let (l, e) = selectors::element_index(pane, list_id, element_id)?;
    let value = serde_json::to_value(&pane.lists[l].elements[e])?;
    let path = Pane::element_path(l, e);
    Ok(EditPair::single(
        Component::list_delete(path.clone(), value.clone()),
        Component::list_insert(path, value),
    ))
}

/// Move an element to `to_index` in `to_list_id`, which may be its own list.
///
/// Within a list this is a single move. Across lists it is a delete from the
/// source followed by an insert into the target.
pub fn move_element(
    pane: &Pane,
    list_id: &str,
    element_id: &str,
    to_list_id: &str,
    to_index: usize,
) -> Result<EditPair, OtError> {
    let (l, e) = selectors::element_index(pane, list_id, element_id)?;
    let target = selectors::list_index(pane, to_list_id)?;

    if l == target {
        let to = to_index.min(pane.lists[l].elements.len().saturating_sub(1));
        if to == e {
            return Ok(EditPair::noop());
        }
        return Ok(EditPair::single(
            Component::list_move(Pane::element_path(l, e), to),
            Component::list_move(Pane::element_path(l, to), e),
        ));
    }

    let value = serde_json::to_value(&pane.lists[l].elements[e])?;
    let to = to_index.min(pane.lists[target].elements.len());
    let from_path = Pane::element_path(l, e);
    let to_path = Pane::element_path(target, to);
    let op = TreeOp::from_components([
        Component::list_delete(from_path.clone(), value.clone()),
        Component::list_insert(to_path.clone(), value.clone()),
    ])?;
    let inverse = TreeOp::from_components([
        Component::list_delete(to_path, value.clone()),
        Component::list_insert(from_path, value),
    ])?;
    Ok(EditPair::new(op, inverse))
}

pub fn replace_element(
    pane: &Pane,
    list_id: &str,
    element_id: &str,
    element: &Element,
) -> Result<EditPair, OtError> {
    let (l, e) = selectors::element_index(pane, list_id, element_id)?;
    let old = serde_json::to_value(&pane.lists[l].elements[e])?;
    let new = serde_json::to_value(element)?;
    if old == new {
        return Ok(EditPair::noop());
    }
    let path = Pane::element_path(l, e);
    Ok(EditPair::single(
        Component::list_replace(path.clone(), old.clone(), new.clone()),
        Component::list_replace(path, new, old),
    ))
}

/// Replace the value at `path` inside an element, e.g. `["value", "score"]`.
///
/// The prior value is looked up in `pane`, so a stale pane produces a wrong
/// inverse. Setting a missing object key inserts it.
pub fn replace_value(
    pane: &Pane,
    list_id: &str,
    element_id: &str,
    path: &Path,
    value: Value,
) -> Result<EditPair, OtError> {
    let (l, e) = selectors::element_index(pane, list_id, element_id)?;
    let prior = selectors::element_value_at(pane, list_id, element_id, path)?;
    let full = Pane::element_path(l, e).extend(path);

    let pair = match (path.last(), prior) {
        (None, _) => {
            return Err(OtError::InvalidPath {
                path: full,
                reason: "empty value path".into(),
            });
        }
        (_, Some(old)) if old == value => EditPair::noop(),
        (Some(PathSegment::Index(_)), Some(old)) => EditPair::single(
            Component::list_replace(full.clone(), old.clone(), value.clone()),
            Component::list_replace(full, value, old),
        ),
        (Some(PathSegment::Key(_)), Some(old)) => EditPair::single(
            Component::object_replace(full.clone(), old.clone(), value.clone()),
            Component::object_replace(full, value, old),
        ),
        (Some(_), None) => EditPair::single(
            Component::object_insert(full.clone(), value.clone()),
            Component::object_delete(full, value),
        ),
    };
    Ok(pair)
}

/// Edit a text element's string with a linear operation.
///
/// The inverse is `op` inverted against the element's text as it is now.
pub fn edit_text(
    pane: &Pane,
    list_id: &str,
    element_id: &str,
    op: TextOp,
) -> Result<EditPair, OtError> {
    let (l, e) = selectors::element_index(pane, list_id, element_id)?;
    let path = Pane::element_path(l, e).join(VALUE);
    let text = pane.lists[l].elements[e]
        .as_text()
        .ok_or_else(|| OtError::NotText { path: path.clone() })?;
    let required = op.base_len();
    let actual = text.chars().count();
    if required > actual {
        return Err(OtError::TextLength { required, actual });
    }
    let inverse = op.invert(text)?;
    Ok(EditPair::single(
        Component::text(path.clone(), op),
        Component::text(path, inverse),
    ))
}

/// Set a metadata entry. `Value::Null` removes it.
pub fn set_metadata(pane: &Pane, key: &str, value: Value) -> Result<EditPair, OtError> {
    let path = Pane::metadata_path(key);
    let pair = match (pane.metadata.get(key), value) {
        (None, Value::Null) => EditPair::noop(),
        (Some(old), Value::Null) => EditPair::single(
            Component::object_delete(path.clone(), old.clone()),
            Component::object_insert(path, old.clone()),
        ),
        (None, new) => EditPair::single(
            Component::object_insert(path.clone(), new.clone()),
            Component::object_delete(path, new),
        ),
        (Some(old), new) if *old == new => EditPair::noop(),
        (Some(old), new) => EditPair::single(
            Component::object_replace(path.clone(), old.clone(), new.clone()),
            Component::object_replace(path, new, old.clone()),
        ),
    };
    Ok(pair)
}

/// Ids of lists, in pane order.
pub fn list_ids(pane: &Pane) -> Vec<SmolStr> {
    pane.lists.iter().map(|l| l.id.clone()).collect()
}
