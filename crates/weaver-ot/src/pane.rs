//! The collaboratively edited document tree.
//!
//! A [`Pane`] holds metadata and an ordered sequence of [`PaneList`]s, each an
//! ordered sequence of [`Element`]s. Tree operations address it through its
//! JSON form:
//!
//! - `["lists", i]` is the i-th list
//! - `["lists", i, "elements", j]` is the j-th element of that list
//! - `["lists", i, "elements", j, "value", ...]` reaches into an element's value
//! - `["metadata", key]` is a metadata entry

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::OtError;
use crate::path;
use crate::tree::{Path, TreeOp};

pub const LISTS: &str = "lists";
pub const ELEMENTS: &str = "elements";
pub const METADATA: &str = "metadata";
pub const VALUE: &str = "value";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pane {
    pub id: SmolStr,
    pub view_type: SmolStr,
    #[serde(default)]
    pub metadata: BTreeMap<SmolStr, Value>,
    #[serde(default)]
    pub lists: Vec<PaneList>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneList {
    pub id: SmolStr,
    #[serde(default)]
    pub elements: Vec<Element>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: SmolStr,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// A string for text elements; any JSON value otherwise.
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Image,
    Value,
}

impl Pane {
    pub fn new(id: impl Into<SmolStr>, view_type: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            view_type: view_type.into(),
            metadata: BTreeMap::new(),
            lists: Vec::new(),
        }
    }

    pub fn with_list(mut self, list: PaneList) -> Self {
        self.lists.push(list);
        self
    }

    pub fn to_json(&self) -> Result<Value, OtError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: Value) -> Result<Self, OtError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Apply `op` through the JSON form. On error the pane is left untouched.
    pub fn apply(&mut self, op: &TreeOp) -> Result<(), OtError> {
        if op.is_empty() {
            return Ok(());
        }
        let mut json = self.to_json()?;
        if let Err(e) = op.apply(&mut json) {
            tracing::debug!(pane_id = %self.id, error = %e, "tree operation rejected");
            return Err(e);
        }
        *self = Self::from_json(json)?;
        Ok(())
    }

    pub fn list_path(list: usize) -> Path {
        path![LISTS, list]
    }

    pub fn element_path(list: usize, element: usize) -> Path {
        path![LISTS, list, ELEMENTS, element]
    }

    pub fn metadata_path(key: &str) -> Path {
        path![METADATA, key]
    }
}

impl PaneList {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }
}

impl Element {
    pub fn text(id: impl Into<SmolStr>, text: &str) -> Self {
        Self {
            id: id.into(),
            kind: ElementKind::Text,
            value: Value::String(text.to_owned()),
        }
    }

    pub fn image(id: impl Into<SmolStr>, value: Value) -> Self {
        Self {
            id: id.into(),
            kind: ElementKind::Image,
            value,
        }
    }

    pub fn value(id: impl Into<SmolStr>, value: Value) -> Self {
        Self {
            id: id.into(),
            kind: ElementKind::Value,
            value,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            ElementKind::Text => self.value.as_str(),
            _ => None,
        }
    }
}
