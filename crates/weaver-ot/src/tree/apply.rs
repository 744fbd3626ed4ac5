use serde_json::Value;

use crate::OtError;
use crate::tree::{Component, Edit, Path, PathSegment};

fn invalid(path: &Path, reason: &str) -> OtError {
    OtError::InvalidPath {
        path: path.clone(),
        reason: reason.into(),
    }
}

/// Walk `segments` from `doc`, returning the value found there.
pub(crate) fn resolve<'a>(doc: &'a Value, path: &Path) -> Result<&'a Value, OtError> {
    let mut cursor = doc;
    for segment in path.segments() {
        cursor = match (cursor, segment) {
            (Value::Array(items), PathSegment::Index(i)) => items
                .get(*i)
                .ok_or_else(|| invalid(path, "list index out of range"))?,
            (Value::Object(map), PathSegment::Key(k)) => map
                .get(k.as_str())
                .ok_or_else(|| invalid(path, "missing object key"))?,
            _ => return Err(invalid(path, "segment does not match container type")),
        };
    }
    Ok(cursor)
}

fn resolve_mut<'a>(doc: &'a mut Value, full: &Path, depth: usize) -> Result<&'a mut Value, OtError> {
    let mut cursor = doc;
    for segment in &full.segments()[..depth] {
        cursor = match (cursor, segment) {
            (Value::Array(items), PathSegment::Index(i)) => items
                .get_mut(*i)
                .ok_or_else(|| invalid(full, "list index out of range"))?,
            (Value::Object(map), PathSegment::Key(k)) => map
                .get_mut(k.as_str())
                .ok_or_else(|| invalid(full, "missing object key"))?,
            _ => return Err(invalid(full, "segment does not match container type")),
        };
    }
    Ok(cursor)
}

/// Apply a single component to `doc` in place.
pub(crate) fn apply_component(doc: &mut Value, c: &Component) -> Result<(), OtError> {
    let path = &c.path;
    if let Edit::Text(op) = &c.edit {
        let target = resolve_mut(doc, path, path.len())?;
        let Value::String(text) = target else {
            return Err(OtError::NotText { path: path.clone() });
        };
        *text = op.apply(text)?;
        return Ok(());
    }

    let Some(last) = path.last() else {
        return Err(invalid(path, "structural edit at the document root"));
    };
    let parent = resolve_mut(doc, path, path.len() - 1)?;

    match (&c.edit, parent, last) {
        (Edit::ListInsert(value), Value::Array(items), PathSegment::Index(i)) => {
            if *i > items.len() {
                return Err(invalid(path, "list insert past the end"));
            }
            items.insert(*i, value.clone());
        }
        (Edit::ListDelete(_), Value::Array(items), PathSegment::Index(i)) => {
            if *i >= items.len() {
                return Err(invalid(path, "list delete out of range"));
            }
            items.remove(*i);
        }
        (Edit::ListReplace { new, .. }, Value::Array(items), PathSegment::Index(i)) => {
            let slot = items
                .get_mut(*i)
                .ok_or_else(|| invalid(path, "list replace out of range"))?;
            *slot = new.clone();
        }
        (Edit::ListMove(to), Value::Array(items), PathSegment::Index(from)) => {
            if *from >= items.len() || *to >= items.len() {
                return Err(invalid(path, "list move out of range"));
            }
            if from != to {
                let item = items.remove(*from);
                items.insert(*to, item);
            }
        }
        (Edit::ObjectInsert(value), Value::Object(map), PathSegment::Key(k))
        | (Edit::ObjectReplace { new: value, .. }, Value::Object(map), PathSegment::Key(k)) => {
            map.insert(k.to_string(), value.clone());
        }
        (Edit::ObjectDelete(_), Value::Object(map), PathSegment::Key(k)) => {
            if map.remove(k.as_str()).is_none() {
                return Err(invalid(path, "object delete of a missing key"));
            }
        }
        _ => return Err(invalid(path, "edit does not match container type")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::text::TextOp;
    use serde_json::json;

    #[test]
    fn test_list_edits() {
        let mut doc = json!({"items": [1, 2, 3]});
        apply_component(&mut doc, &Component::list_insert(path!["items", 1], json!(9))).unwrap();
        assert_eq!(doc, json!({"items": [1, 9, 2, 3]}));
        apply_component(&mut doc, &Component::list_move(path!["items", 0], 3)).unwrap();
        assert_eq!(doc, json!({"items": [9, 2, 3, 1]}));
        apply_component(&mut doc, &Component::list_delete(path!["items", 2], json!(3))).unwrap();
        assert_eq!(doc, json!({"items": [9, 2, 1]}));
        apply_component(
            &mut doc,
            &Component::list_replace(path!["items", 0], json!(9), json!("x")),
        )
        .unwrap();
        assert_eq!(doc, json!({"items": ["x", 2, 1]}));
    }

    #[test]
    fn test_object_and_text_edits() {
        let mut doc = json!({"meta": {}, "body": "hello"});
        apply_component(&mut doc, &Component::object_insert(path!["meta", "w"], json!(3))).unwrap();
        apply_component(&mut doc, &Component::text(path!["body"], TextOp::insert_at(5, "!")))
            .unwrap();
        assert_eq!(doc, json!({"meta": {"w": 3}, "body": "hello!"}));
        apply_component(&mut doc, &Component::object_delete(path!["meta", "w"], json!(3))).unwrap();
        assert_eq!(doc, json!({"meta": {}, "body": "hello!"}));
    }

    #[test]
    fn test_rejects_bad_paths() {
        let mut doc = json!({"items": [1], "body": 4});
        assert!(matches!(
            apply_component(&mut doc, &Component::list_delete(path!["items", 3], json!(1))),
            Err(OtError::InvalidPath { .. })
        ));
        assert!(matches!(
            apply_component(&mut doc, &Component::object_insert(path!["items", "k"], json!(1))),
            Err(OtError::InvalidPath { .. })
        ));
        assert!(matches!(
            apply_component(&mut doc, &Component::text(path!["body"], TextOp::insert_at(0, "a"))),
            Err(OtError::NotText { .. })
        ));
    }
}
