//! Linear operations over a sequence of characters.
//!
//! A `TextOp` walks the text from the start: `Retain(n)` skips `n` chars,
//! `Insert(s)` inserts `s`, `Delete(n)` removes `n` chars. Anything after the
//! last component is implicitly retained. All offsets are in Unicode scalar
//! values (chars), not bytes or UTF-16.

use std::cmp::min;
use std::fmt;

use ropey::Rope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::operation::{CursorTransform, Operation, OperationShape, Priority, WireOperation};
use crate::OtError;

/// One step of a [`TextOp`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextComponent {
    Retain(usize),
    Insert(SmolStr),
    Delete(usize),
}

impl TextComponent {
    /// Length in chars.
    pub fn len(&self) -> usize {
        match self {
            Self::Retain(n) | Self::Delete(n) => *n,
            Self::Insert(s) => s.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A canonical sequence of text components.
///
/// Canonical means: no empty components, adjacent components of the same kind
/// merged, inserts placed before deletes at the same position, and no
/// trailing retain.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TextOpWire")]
pub struct TextOp {
    ops: Vec<TextComponent>,
}

#[derive(Deserialize)]
struct TextOpWire {
    ops: Vec<TextComponent>,
}

impl From<TextOpWire> for TextOp {
    fn from(wire: TextOpWire) -> Self {
        wire.ops.into_iter().collect()
    }
}

impl FromIterator<TextComponent> for TextOp {
    fn from_iter<T: IntoIterator<Item = TextComponent>>(iter: T) -> Self {
        let mut op = TextOp::new();
        for component in iter {
            op.push(component);
        }
        op.chop();
        op
    }
}

impl fmt::Debug for TextOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.ops).finish()
    }
}

impl TextOp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `text` at char offset `pos`.
    pub fn insert_at(pos: usize, text: &str) -> Self {
        let mut op = Self::new();
        op.retain(pos).insert(text);
        op
    }

    /// Delete `len` chars starting at `pos`.
    pub fn delete_at(pos: usize, len: usize) -> Self {
        let mut op = Self::new();
        op.retain(pos).delete(len);
        op
    }

    /// Smallest edit turning `old` into `new`, found by trimming the common
    /// prefix and suffix.
    pub fn diff(old: &str, new: &str) -> Self {
        let old_chars: Vec<char> = old.chars().collect();
        let new_chars: Vec<char> = new.chars().collect();

        let prefix = old_chars
            .iter()
            .zip(&new_chars)
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = min(old_chars.len(), new_chars.len()) - prefix;
        let suffix = old_chars
            .iter()
            .rev()
            .zip(new_chars.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();
        let mut op = Self::new();
        op.retain(prefix)
            .insert(&inserted)
            .delete(old_chars.len() - suffix - prefix);
        op.chop();
        op
    }

    pub fn components(&self) -> &[TextComponent] {
        &self.ops
    }

    /// Chars of input this operation reads (retains plus deletes).
    pub fn base_len(&self) -> usize {
        self.ops
            .iter()
            .map(|c| match c {
                TextComponent::Retain(n) | TextComponent::Delete(n) => *n,
                TextComponent::Insert(_) => 0,
            })
            .sum()
    }

    /// Net change in length when applied.
    pub fn len_delta(&self) -> isize {
        self.ops
            .iter()
            .map(|c| match c {
                TextComponent::Retain(_) => 0,
                TextComponent::Insert(s) => s.chars().count() as isize,
                TextComponent::Delete(n) => -(*n as isize),
            })
            .sum()
    }

    pub fn retain(&mut self, n: usize) -> &mut Self {
        self.push(TextComponent::Retain(n));
        self
    }

    pub fn insert(&mut self, text: &str) -> &mut Self {
        self.push(TextComponent::Insert(text.into()));
        self
    }

    pub fn delete(&mut self, n: usize) -> &mut Self {
        self.push(TextComponent::Delete(n));
        self
    }

    /// Append a component, keeping the sequence canonical (except for the
    /// trailing retain, which [`chop`](Self::chop) removes).
    pub fn push(&mut self, component: TextComponent) {
        if component.is_empty() {
            return;
        }
        let len = self.ops.len();

        // Inserting before or after a delete at the same spot is equivalent;
        // always keep the insert first.
        if let TextComponent::Insert(s) = &component {
            if matches!(self.ops.last(), Some(TextComponent::Delete(_))) {
                if len >= 2 {
                    if let TextComponent::Insert(prev) = &mut self.ops[len - 2] {
                        *prev = format!("{prev}{s}").into();
                        return;
                    }
                }
                self.ops.insert(len - 1, component);
                return;
            }
        }

        if let Some(last) = self.ops.last_mut() {
            match (last, &component) {
                (TextComponent::Retain(last), TextComponent::Retain(n))
                | (TextComponent::Delete(last), TextComponent::Delete(n)) => {
                    *last += n;
                    return;
                }
                (TextComponent::Insert(last), TextComponent::Insert(s)) => {
                    *last = format!("{last}{s}").into();
                    return;
                }
                _ => {}
            }
        }
        self.ops.push(component);
    }

    /// Drop a trailing retain.
    pub fn chop(&mut self) -> &mut Self {
        if matches!(self.ops.last(), Some(TextComponent::Retain(_))) {
            self.ops.pop();
        }
        self
    }

    /// Apply to a string.
    pub fn apply(&self, text: &str) -> Result<String, OtError> {
        let actual = text.chars().count();
        let required = self.base_len();
        if required > actual {
            return Err(OtError::TextLength { required, actual });
        }

        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars();
        for component in &self.ops {
            match component {
                TextComponent::Retain(n) => out.extend(chars.by_ref().take(*n)),
                TextComponent::Insert(s) => out.push_str(s),
                TextComponent::Delete(n) => {
                    chars.by_ref().take(*n).for_each(drop);
                }
            }
        }
        out.extend(chars);
        Ok(out)
    }

    /// Apply in place to a rope.
    pub fn apply_to_rope(&self, rope: &mut Rope) -> Result<(), OtError> {
        let actual = rope.len_chars();
        let required = self.base_len();
        if required > actual {
            return Err(OtError::TextLength { required, actual });
        }

        let mut pos = 0;
        for component in &self.ops {
            match component {
                TextComponent::Retain(n) => pos += n,
                TextComponent::Insert(s) => {
                    rope.insert(pos, s);
                    pos += s.chars().count();
                }
                TextComponent::Delete(n) => rope.remove(pos..pos + n),
            }
        }
        Ok(())
    }
}

/// Walks a component list, handing out pieces of at most a requested length.
struct Cursor<'a> {
    ops: &'a [TextComponent],
    index: usize,
    offset: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Retain,
    Insert,
    Delete,
}

impl<'a> Cursor<'a> {
    fn new(ops: &'a [TextComponent]) -> Self {
        Self {
            ops,
            index: 0,
            offset: 0,
        }
    }

    fn has_next(&self) -> bool {
        self.index < self.ops.len()
    }

    /// Past the end everything is an infinite retain.
    fn peek_len(&self) -> usize {
        match self.ops.get(self.index) {
            Some(op) => op.len() - self.offset,
            None => usize::MAX,
        }
    }

    fn peek_kind(&self) -> Kind {
        match self.ops.get(self.index) {
            Some(TextComponent::Insert(_)) => Kind::Insert,
            Some(TextComponent::Delete(_)) => Kind::Delete,
            Some(TextComponent::Retain(_)) | None => Kind::Retain,
        }
    }

    fn next_all(&mut self) -> TextComponent {
        self.next(usize::MAX)
    }

    fn next(&mut self, len: usize) -> TextComponent {
        let Some(op) = self.ops.get(self.index) else {
            return TextComponent::Retain(len);
        };
        let remaining = op.len() - self.offset;
        let take = min(len, remaining);
        let piece = match op {
            TextComponent::Retain(_) => TextComponent::Retain(take),
            TextComponent::Delete(_) => TextComponent::Delete(take),
            TextComponent::Insert(s) => {
                TextComponent::Insert(s.chars().skip(self.offset).take(take).collect())
            }
        };
        if take == remaining {
            self.index += 1;
            self.offset = 0;
        } else {
            self.offset += take;
        }
        piece
    }
}

impl Operation for TextOp {
    type Context = str;

    fn noop() -> Self {
        Self::new()
    }

    fn compose(&self, other: &Self) -> Result<Self, OtError> {
        let mut a = Cursor::new(&self.ops);
        let mut b = Cursor::new(&other.ops);
        let mut out = TextOp::new();

        while a.has_next() || b.has_next() {
            if b.peek_kind() == Kind::Insert {
                out.push(b.next_all());
            } else if a.peek_kind() == Kind::Delete {
                out.push(a.next_all());
            } else {
                let len = min(a.peek_len(), b.peek_len());
                let first = a.next(len);
                let second = b.next(len);
                match (first, second) {
                    (TextComponent::Retain(n), TextComponent::Retain(_)) => {
                        out.push(TextComponent::Retain(n));
                    }
                    (TextComponent::Insert(s), TextComponent::Retain(_)) => {
                        out.push(TextComponent::Insert(s));
                    }
                    (TextComponent::Retain(n), TextComponent::Delete(_)) => {
                        out.push(TextComponent::Delete(n));
                    }
                    // Inserted then deleted: cancels out.
                    (TextComponent::Insert(_), TextComponent::Delete(_)) => {}
                    (first, second) => {
                        return Err(OtError::Compose(
                            format!("unexpected pair {first:?} / {second:?}").into(),
                        ));
                    }
                }
            }
        }

        out.chop();
        Ok(out)
    }

    fn transform(&self, other: &Self, priority: Priority) -> Result<Self, OtError> {
        let mut a = Cursor::new(&self.ops);
        let mut b = Cursor::new(&other.ops);
        let mut out = TextOp::new();

        while a.has_next() || b.has_next() {
            if b.peek_kind() == Kind::Insert
                && (!priority.is_left() || a.peek_kind() != Kind::Insert)
            {
                out.retain(b.next_all().len());
            } else if a.peek_kind() == Kind::Insert {
                out.push(a.next_all());
            } else {
                let len = min(a.peek_len(), b.peek_len());
                let mine = a.next(len);
                let theirs = b.next(len);
                match (mine, theirs) {
                    // Already gone on their side.
                    (_, TextComponent::Delete(_)) => {}
                    (TextComponent::Delete(n), _) => {
                        out.delete(n);
                    }
                    (mine, _) => {
                        out.retain(mine.len());
                    }
                }
            }
        }

        out.chop();
        Ok(out)
    }

    fn invert(&self, base: &str) -> Result<Self, OtError> {
        let base_chars: Vec<char> = base.chars().collect();
        let required = self.base_len();
        if required > base_chars.len() {
            return Err(OtError::TextLength {
                required,
                actual: base_chars.len(),
            });
        }

        let mut out = TextOp::new();
        let mut index = 0;
        for component in &self.ops {
            match component {
                TextComponent::Retain(n) => {
                    out.retain(*n);
                    index += n;
                }
                TextComponent::Insert(s) => {
                    out.delete(s.chars().count());
                }
                TextComponent::Delete(n) => {
                    let removed: String = base_chars[index..index + n].iter().collect();
                    out.insert(&removed);
                    index += n;
                }
            }
        }
        out.chop();
        Ok(out)
    }

    fn is_noop(&self) -> bool {
        self.ops
            .iter()
            .all(|c| matches!(c, TextComponent::Retain(_)))
    }
}

impl CursorTransform for TextOp {
    fn transform_position(&self, index: usize, priority: Priority) -> usize {
        let mut index = index;
        let mut offset = 0;
        for component in &self.ops {
            if offset > index {
                break;
            }
            match component {
                TextComponent::Delete(n) => {
                    index -= min(*n, index - offset);
                    continue;
                }
                TextComponent::Insert(s) => {
                    let len = s.chars().count();
                    if offset < index || !priority.is_left() {
                        index += len;
                    }
                    offset += len;
                }
                TextComponent::Retain(n) => offset += n,
            }
        }
        index
    }
}

impl WireOperation for TextOp {
    const SHAPE: OperationShape = OperationShape::Linear;

    fn apply_json(&self, document: &mut Value) -> Result<(), OtError> {
        let Value::String(text) = document else {
            return Err(OtError::NotText {
                path: Default::default(),
            });
        };
        *text = self.apply(text)?;
        Ok(())
    }
}
