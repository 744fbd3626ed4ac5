//! Component-level transform rules for tree operations.
//!
//! These follow the json0 rules: list indices shift around concurrent inserts,
//! deletes and moves; edits under a deleted or replaced subtree are dropped;
//! concurrent writes to the same slot are settled by [`Priority`].

use crate::OtError;
use crate::operation::{Operation, Priority};
use crate::tree::apply::apply_component;
use crate::tree::{Component, Edit};

/// Append `c` to `dest`, folding it into the last component when the two
/// touch the same path.
pub(crate) fn append(dest: &mut Vec<Component>, c: Component) -> Result<(), OtError> {
    if c.is_noop() {
        return Ok(());
    }
    let Some(last) = dest.last_mut() else {
        dest.push(c);
        return Ok(());
    };
    if last.path != c.path {
        dest.push(c);
        return Ok(());
    }

    match (&mut last.edit, c.edit) {
        (Edit::Text(prev), Edit::Text(next)) => {
            *prev = prev.compose(&next)?;
            if prev.is_noop() {
                dest.pop();
            }
        }
        // Insert followed by deleting the same item.
        (Edit::ListInsert(inserted), Edit::ListDelete(deleted)) if *inserted == deleted => {
            dest.pop();
        }
        (Edit::ListReplace { old, new }, Edit::ListDelete(deleted)) if *new == deleted => {
            last.edit = Edit::ListDelete(std::mem::take(old));
        }
        (Edit::ObjectDelete(old), Edit::ObjectInsert(value)) => {
            last.edit = Edit::ObjectReplace {
                old: std::mem::take(old),
                new: value,
            };
        }
        (Edit::ObjectInsert(prev), Edit::ObjectReplace { new, .. })
        | (Edit::ObjectReplace { new: prev, .. }, Edit::ObjectReplace { new, .. }) => {
            *prev = new;
        }
        (Edit::ObjectReplace { old, .. }, Edit::ObjectDelete(_)) => {
            last.edit = Edit::ObjectDelete(std::mem::take(old));
        }
        (Edit::ObjectInsert(_), Edit::ObjectDelete(_)) => {
            dest.pop();
        }
        (_, edit) => dest.push(Component { path: c.path, edit }),
    }
    Ok(())
}

/// Length of the shared parent path when `a`'s operand sits in a container
/// that is on `b`'s path.
fn common_length(a: &Component, b: &Component) -> Option<usize> {
    let alen = a.operand_len().checked_sub(1)?;
    let blen = b.operand_len().checked_sub(1)?;
    for i in 0..alen {
        if i >= blen || a.path.get(i) != b.path.get(i) {
            return None;
        }
    }
    Some(alen)
}

fn shift(index: usize, by: isize) -> usize {
    index.saturating_add_signed(by)
}

/// Transform `c` so it applies after `other`, appending the result to `dest`.
pub(crate) fn transform_component(
    dest: &mut Vec<Component>,
    c: &Component,
    other: &Component,
    priority: Priority,
) -> Result<(), OtError> {
    let mut c = c.clone();
    let common = common_length(other, &c);
    let common2 = common_length(&c, other);
    let cplength = c.operand_len();
    let other_cplength = other.operand_len();

    // We delete a subtree the other side edited inside: keep our recorded
    // copy of it current so the delete stays invertible.
    if let Some(common2) = common2 {
        if other_cplength > cplength && c.path.get(common2) == other.path.get(common2) {
            let inner = Component {
                path: other.path.tail(cplength),
                edit: other.edit.clone(),
            };
            match &mut c.edit {
                Edit::ListDelete(v)
                | Edit::ListReplace { old: v, .. }
                | Edit::ObjectDelete(v)
                | Edit::ObjectReplace { old: v, .. } => apply_component(v, &inner)?,
                _ => {}
            }
        }
    }

    let Some(common) = common else {
        return append(dest, c);
    };
    let common_operand = cplength == other_cplength;
    let c_at = c.path.index_at(common);
    let other_at = other.path.index_at(common);
    let same_slot = c.path.get(common) == other.path.get(common);

    match &other.edit {
        Edit::Text(theirs) => {
            if let Edit::Text(mine) = &c.edit {
                if c.path == other.path {
                    let rebased = mine.transform(theirs, priority)?;
                    return append(dest, Component::text(c.path, rebased));
                }
            }
        }
        Edit::ListReplace { new, .. } => {
            if same_slot {
                if !common_operand {
                    return Ok(());
                }
                match &mut c.edit {
                    Edit::ListReplace { old, .. } if priority.is_left() => *old = new.clone(),
                    Edit::ListReplace { .. } | Edit::ListDelete(_) => return Ok(()),
                    _ => {}
                }
            }
        }
        Edit::ListInsert(_) => {
            if let (Some(p), Some(theirs)) = (c_at, other_at) {
                if c.is_pure_list_insert() && common_operand && p == theirs {
                    if !priority.is_left() {
                        c.path.set_index(common, p + 1);
                    }
                } else if theirs <= p {
                    c.path.set_index(common, p + 1);
                }
                if let Edit::ListMove(to) = &mut c.edit {
                    if common_operand && theirs <= *to {
                        *to += 1;
                    }
                }
            }
        }
        Edit::ListDelete(_) => {
            if let (Some(p), Some(theirs)) = (c_at, other_at) {
                if let Edit::ListMove(to) = &mut c.edit {
                    if common_operand {
                        if theirs == p {
                            // They removed what we are moving.
                            return Ok(());
                        }
                        if theirs < *to || (theirs == *to && p < *to) {
                            *to -= 1;
                        }
                    }
                }
                if theirs < p {
                    c.path.set_index(common, p - 1);
                } else if theirs == p {
                    if other_cplength < cplength {
                        // Our target lived under the removed item.
                        return Ok(());
                    }
                    match &c.edit {
                        Edit::ListReplace { new, .. } => c.edit = Edit::ListInsert(new.clone()),
                        Edit::ListDelete(_) => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
        Edit::ListMove(other_to) => {
            let other_to = *other_to;
            if let (Some(p), Some(other_from)) = (c_at, other_at) {
                if let (Edit::ListMove(to), true) = (&mut c.edit, cplength == other_cplength) {
                    let from = p;
                    let original_to = *to;
                    let mut new_to = original_to as isize;
                    if other_from != other_to {
                        if from == other_from {
                            if priority.is_left() {
                                c.path.set_index(common, other_to);
                                if from == original_to {
                                    new_to = other_to as isize;
                                }
                            } else {
                                return Ok(());
                            }
                        } else {
                            let mut new_from = from as isize;
                            if from > other_from {
                                new_from -= 1;
                            }
                            if from > other_to {
                                new_from += 1;
                            } else if from == other_to && other_from > other_to {
                                new_from += 1;
                                if from == original_to {
                                    new_to += 1;
                                }
                            }
                            c.path.set_index(common, shift(0, new_from));

                            if original_to > other_from {
                                new_to -= 1;
                            } else if original_to == other_from && original_to > from {
                                new_to -= 1;
                            }
                            if original_to > other_to {
                                new_to += 1;
                            } else if original_to == other_to {
                                let same_direction = (other_to > other_from && original_to > from)
                                    || (other_to < other_from && original_to < from);
                                if same_direction {
                                    if !priority.is_left() {
                                        new_to += 1;
                                    }
                                } else if original_to > from {
                                    new_to += 1;
                                } else if original_to == other_from {
                                    new_to -= 1;
                                }
                            }
                        }
                        *to = shift(0, new_to);
                    }
                } else if c.is_pure_list_insert() && common_operand {
                    let mut index = p as isize;
                    if p > other_from {
                        index -= 1;
                    }
                    if p > other_to {
                        index += 1;
                    }
                    c.path.set_index(common, shift(0, index));
                } else if p == other_from {
                    c.path.set_index(common, other_to);
                } else {
                    let mut index = p as isize;
                    if p > other_from {
                        index -= 1;
                    }
                    if p > other_to || (p == other_to && other_from > other_to) {
                        index += 1;
                    }
                    c.path.set_index(common, shift(0, index));
                }
            }
        }
        Edit::ObjectReplace { new, .. } => {
            if same_slot {
                if c.inserted_key().is_some() && common_operand {
                    if !priority.is_left() {
                        return Ok(());
                    }
                    // We win: overwrite their value instead of the original.
                    let ours = c.inserted_key().cloned().unwrap_or_default();
                    c.edit = Edit::ObjectReplace {
                        old: new.clone(),
                        new: ours,
                    };
                } else {
                    return Ok(());
                }
            }
        }
        Edit::ObjectInsert(theirs) => {
            if c.inserted_key().is_some() && same_slot {
                if priority.is_left() {
                    append(dest, Component::object_delete(c.path.clone(), theirs.clone()))?;
                } else {
                    return Ok(());
                }
            }
        }
        Edit::ObjectDelete(_) => {
            if same_slot {
                if !common_operand {
                    return Ok(());
                }
                match &c.edit {
                    Edit::ObjectReplace { new, .. } => c.edit = Edit::ObjectInsert(new.clone()),
                    Edit::ObjectInsert(_) => {}
                    _ => return Ok(()),
                }
            }
        }
    }

    append(dest, c)
}

/// Transform two component lists against each other. Returns
/// `(left', right')` where `left'` applies after `right` and vice versa.
pub(crate) fn transform_x(
    left: &[Component],
    right: &[Component],
) -> Result<(Vec<Component>, Vec<Component>), OtError> {
    let mut left_op: Vec<Component> = left.to_vec();
    let mut new_right = Vec::new();

    for right_component in right {
        let mut new_left = Vec::new();
        let mut current = Some(right_component.clone());
        let mut k = 0;

        while k < left_op.len() {
            let Some(rc) = current.take() else { break };
            let mut next_c = Vec::new();
            transform_component(&mut new_left, &left_op[k], &rc, Priority::Left)?;
            transform_component(&mut next_c, &rc, &left_op[k], Priority::Right)?;
            k += 1;

            match next_c.len() {
                1 => current = next_c.pop(),
                0 => {
                    for rest in &left_op[k..] {
                        append(&mut new_left, rest.clone())?;
                    }
                    break;
                }
                _ => {
                    let (l, r) = transform_x(&left_op[k..], &next_c)?;
                    for c in l {
                        append(&mut new_left, c)?;
                    }
                    for c in r {
                        append(&mut new_right, c)?;
                    }
                    break;
                }
            }
        }

        if let Some(rc) = current {
            append(&mut new_right, rc)?;
        }
        left_op = new_left;
    }

    Ok((left_op, new_right))
}
