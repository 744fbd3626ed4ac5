use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::operation::{CursorTransform, Priority};

/// Text selection with anchor and head positions, in chars.
///
/// The anchor is where the selection started, the head is where the cursor is now.
/// They may be in any order - use `start()` and `end()` for ordered bounds.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// A collapsed selection (cursor position).
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    pub fn to_range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    pub fn is_backwards(&self) -> bool {
        self.head < self.anchor
    }

    /// Map both ends through `op`.
    ///
    /// A collapsed cursor stays in front of text inserted exactly at it. A
    /// range does not grow to swallow text inserted at its edges.
    pub fn transform<O: CursorTransform>(&self, op: &O) -> Self {
        if self.is_collapsed() {
            return Self::collapsed(op.transform_position(self.head, Priority::Left));
        }
        let start = op.transform_position(self.start(), Priority::Right);
        let end = op.transform_position(self.end(), Priority::Left).max(start);
        if self.is_backwards() {
            Self::new(end, start)
        } else {
            Self::new(start, end)
        }
    }
}

impl From<Range<usize>> for Selection {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextOp;
    use crate::operation::Operation;

    #[test]
    fn test_selection_bounds() {
        let sel = Selection::new(10, 5);
        assert_eq!(sel.to_range(), 5..10);
        assert!(sel.is_backwards());
        assert_eq!(sel.len(), 5);
    }

    #[test]
    fn test_transform_shifts_past_earlier_insert() {
        let op = TextOp::insert_at(0, "abc");
        assert_eq!(Selection::new(2, 4).transform(&op), Selection::new(5, 7));
        assert_eq!(Selection::collapsed(0).transform(&op), Selection::collapsed(0));
    }

    #[test]
    fn test_transform_range_edges() {
        // Inserted at both edges of [2, 4).
        let op: TextOp = TextOp::insert_at(2, "x")
            .compose(&TextOp::insert_at(5, "y"))
            .unwrap();
        assert_eq!(Selection::new(2, 4).transform(&op), Selection::new(3, 5));
    }

    #[test]
    fn test_transform_backwards_range_through_delete() {
        let op = TextOp::delete_at(1, 2);
        assert_eq!(Selection::new(6, 2).transform(&op), Selection::new(4, 1));
    }
}
