//! Id to index resolution over a [`Pane`].
//!
//! Operations are index-addressed on the wire, so every builder resolves ids
//! here first. A missing id is always an error.

use serde_json::Value;

use crate::pane::{Element, Pane, PaneList};
use crate::tree::{Path, resolve};
use crate::{OtError, SelectorError};

pub fn list_index(pane: &Pane, list_id: &str) -> Result<usize, SelectorError> {
    pane.lists
        .iter()
        .position(|l| l.id == list_id)
        .ok_or_else(|| SelectorError::ListNotFound {
            list_id: list_id.into(),
        })
}

pub fn list<'a>(pane: &'a Pane, list_id: &str) -> Result<&'a PaneList, SelectorError> {
    Ok(&pane.lists[list_index(pane, list_id)?])
}

/// `(list index, element index)` of an element.
pub fn element_index(
    pane: &Pane,
    list_id: &str,
    element_id: &str,
) -> Result<(usize, usize), SelectorError> {
    let l = list_index(pane, list_id)?;
    let e = pane.lists[l]
        .elements
        .iter()
        .position(|e| e.id == element_id)
        .ok_or_else(|| SelectorError::ElementNotFound {
            list_id: list_id.into(),
            element_id: element_id.into(),
        })?;
    Ok((l, e))
}

pub fn element<'a>(
    pane: &'a Pane,
    list_id: &str,
    element_id: &str,
) -> Result<&'a Element, SelectorError> {
    let (l, e) = element_index(pane, list_id, element_id)?;
    Ok(&pane.lists[l].elements[e])
}

/// The value at `path` inside an element's JSON form, or `None` when the
/// path leads to a missing object key.
pub fn element_value_at(
    pane: &Pane,
    list_id: &str,
    element_id: &str,
    path: &Path,
) -> Result<Option<Value>, OtError> {
    let element = serde_json::to_value(element(pane, list_id, element_id)?)?;
    if path.is_empty() {
        return Ok(Some(element));
    }
    let parent = resolve(&element, &path.parent())?;
    match (parent, path.last()) {
        (Value::Object(map), Some(segment)) => {
            let key = segment.as_key().ok_or_else(|| OtError::InvalidPath {
                path: path.clone(),
                reason: "index into an object".into(),
            })?;
            Ok(map.get(key).cloned())
        }
        _ => Ok(Some(resolve(&element, path)?.clone())),
    }
}
