//! Error types for the operation algebra.

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::tree::Path;

/// Errors raised while applying, composing, transforming, or inverting operations.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum OtError {
    /// A text operation reached past the end of the text it was applied to.
    #[error("text operation spans {required} chars but the text has {actual}")]
    #[diagnostic(code(weaver_ot::text::length))]
    TextLength { required: usize, actual: usize },

    /// Two text operations could not be composed because their lengths disagree.
    #[error("cannot compose text operations: {0}")]
    #[diagnostic(code(weaver_ot::text::compose))]
    Compose(SmolStr),

    /// A component path does not resolve in the document.
    #[error("invalid path {path}: {reason}")]
    #[diagnostic(code(weaver_ot::tree::path))]
    InvalidPath { path: Path, reason: SmolStr },

    /// A text sub-edit targets something that is not a string.
    #[error("text edit at {path} does not target a string")]
    #[diagnostic(code(weaver_ot::tree::not_text))]
    NotText { path: Path },

    /// A component could not be decoded from its wire form.
    #[error("malformed component: {0}")]
    #[diagnostic(code(weaver_ot::tree::component))]
    MalformedComponent(SmolStr),

    /// Id lookup failed while building an edit.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Selector(#[from] SelectorError),

    /// Converting between the typed document and its JSON form failed.
    #[error("document serialization failed")]
    #[diagnostic(code(weaver_ot::serde))]
    Serde(#[from] serde_json::Error),
}

/// Lookup failures for ids referenced by an edit.
///
/// Builders never fall back to a default index; a missing id means the
/// caller is holding a stale snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SelectorError {
    #[error("list {list_id} not found")]
    #[diagnostic(code(weaver_ot::selector::list_not_found))]
    ListNotFound { list_id: SmolStr },

    #[error("element {element_id} not found in list {list_id}")]
    #[diagnostic(code(weaver_ot::selector::element_not_found))]
    ElementNotFound {
        list_id: SmolStr,
        element_id: SmolStr,
    },
}
