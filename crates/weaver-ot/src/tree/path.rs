//! Paths into the JSON form of a document.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One step into a document: a list index or an object key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(SmolStr),
}

impl PathSegment {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Key(_) => None,
        }
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k.as_str()),
            Self::Index(_) => None,
        }
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.into())
    }
}

impl From<SmolStr> for PathSegment {
    fn from(key: SmolStr) -> Self {
        Self::Key(key)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

/// A path from the document root, index-addressed inside lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn get(&self, i: usize) -> Option<&PathSegment> {
        self.0.get(i)
    }

    /// Index at position `i`, if that segment is an index.
    pub fn index_at(&self, i: usize) -> Option<usize> {
        self.0.get(i).and_then(PathSegment::as_index)
    }

    pub(crate) fn set_index(&mut self, i: usize, index: usize) {
        if let Some(segment) = self.0.get_mut(i) {
            *segment = PathSegment::Index(index);
        }
    }

    /// Everything but the last segment.
    pub fn parent(&self) -> Self {
        let end = self.0.len().saturating_sub(1);
        Self(self.0[..end].to_vec())
    }

    /// The segments after the first `n`.
    pub fn tail(&self, n: usize) -> Self {
        Self(self.0.get(n..).map(<[_]>::to_vec).unwrap_or_default())
    }

    /// A copy of this path with `segment` appended.
    pub fn join(&self, segment: impl Into<PathSegment>) -> Self {
        let mut out = self.clone();
        out.0.push(segment.into());
        out
    }

    /// A copy of this path with every segment of `other` appended.
    pub fn extend(&self, other: &Path) -> Self {
        let mut out = self.clone();
        out.0.extend(other.0.iter().cloned());
        out
    }

    /// A copy with the last segment replaced.
    pub fn with_last(&self, segment: impl Into<PathSegment>) -> Self {
        let mut out = self.parent();
        out.0.push(segment.into());
        out
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<T: IntoIterator<Item = PathSegment>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Build a [`Path`] from a mix of indices and keys.
///
/// ```
/// use weaver_ot::path;
/// let p = path!["lists", 2, "elements", 0];
/// assert_eq!(p.to_string(), "/lists/2/elements/0");
/// ```
#[macro_export]
macro_rules! path {
    ($($segment:expr),* $(,)?) => {
        $crate::tree::Path::from(vec![$($crate::tree::PathSegment::from($segment)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers() {
        let p = crate::path!["lists", 1, "elements", 3];
        assert_eq!(p.index_at(1), Some(1));
        assert_eq!(p.index_at(0), None);
        assert_eq!(p.parent().to_string(), "/lists/1/elements");
        assert_eq!(p.tail(2).to_string(), "/elements/3");
        assert_eq!(p.with_last(5usize).to_string(), "/lists/1/elements/5");
        assert_eq!(Path::root().to_string(), "/");
    }

    #[test]
    fn test_path_wire_form() {
        let p = crate::path!["metadata", "width", 0];
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"["metadata","width",0]"#);
        let back: Path = serde_json::from_str(r#"["metadata","width",0]"#).unwrap();
        assert_eq!(back, p);
    }
}
