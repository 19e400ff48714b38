//! Paths and in-place edits on a JSON document tree

use std::fmt;

use serde_json::{Map, Value};

use crate::types::{RecordId, UserId};

/// Slash-separated location of a node in the document tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath(Vec<String>);

impl TreePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// `users/{uid}`
    pub fn user(uid: &UserId) -> Self {
        Self::root().child("users").child(uid.as_str())
    }

    /// `users`
    pub fn users() -> Self {
        Self::root().child("users")
    }

    /// `users/{uid}/drives`
    pub fn drives(uid: &UserId) -> Self {
        Self::user(uid).child("drives")
    }

    /// `users/{uid}/drives/{record_id}`
    pub fn drive(uid: &UserId, id: &RecordId) -> Self {
        Self::drives(uid).child(id.to_string())
    }

    /// `friend_requests/{uid}`
    pub fn friend_requests(uid: &UserId) -> Self {
        Self::root().child("friend_requests").child(uid.as_str())
    }

    /// `friends/{uid}`
    pub fn friends(uid: &UserId) -> Self {
        Self::root().child("friends").child(uid.as_str())
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        f.write_str(&self.0.join("/"))
    }
}

/// Node at `path`, if present
pub fn get<'a>(root: &'a Value, path: &TreePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Replace the node at `path`, creating parents. Writing `null` removes the node.
pub fn set(root: &mut Value, path: &TreePath, value: Value) {
    if value.is_null() {
        remove(root, path);
        return;
    }

    let Some((last, parents)) = path.segments().split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.clone(), value);
}

/// Merge `fields` into the object at `path`, leaving other children untouched
pub fn update(root: &mut Value, path: &TreePath, fields: Map<String, Value>) {
    for (key, value) in fields {
        set(root, &path.clone().child(key), value);
    }
}

/// Delete the node at `path` and prune parents left empty
pub fn remove(root: &mut Value, path: &TreePath) {
    if path.is_root() {
        *root = Value::Object(Map::new());
        return;
    }
    remove_in(root, path.segments());
}

fn remove_in(node: &mut Value, segments: &[String]) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };
    match segments {
        [] => false,
        [last] => {
            map.remove(last);
            map.is_empty()
        }
        [head, rest @ ..] => {
            let emptied = map
                .get_mut(head)
                .map(|child| remove_in(child, rest))
                .unwrap_or(false);
            if emptied {
                map.remove(head);
            }
            map.is_empty()
        }
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_set_creates_parents() {
        let mut root = json!({});
        let path = TreePath::root().child("users").child("u1").child("name");
        set(&mut root, &path, json!("Ada"));

        assert_eq!(root, json!({"users": {"u1": {"name": "Ada"}}}));
        assert_eq!(get(&root, &path), Some(&json!("Ada")));
    }

    #[test]
    fn test_update_keeps_siblings() {
        let mut root = json!({"users": {"u1": {"name": "Ada", "today_mileage": 1}}});
        let mut fields = Map::new();
        fields.insert("today_mileage".into(), json!(4));
        update(&mut root, &TreePath::user(&UserId::new("u1")), fields);

        assert_eq!(root["users"]["u1"], json!({"name": "Ada", "today_mileage": 4}));
    }

    #[test]
    fn test_remove_prunes_empty_parents() {
        let mut root = json!({"friend_requests": {"u1": {"u2": {"status": "pending"}}}, "users": {}});
        let path = TreePath::friend_requests(&UserId::new("u1")).child("u2");
        remove(&mut root, &path);

        assert_eq!(root, json!({"users": {}}));
    }

    #[test]
    fn test_null_write_removes() {
        let mut root = json!({"a": {"b": 1, "c": 2}});
        set(&mut root, &TreePath::root().child("a").child("b"), Value::Null);
        assert_eq!(root, json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_get_missing() {
        let root = json!({"a": 1});
        assert_eq!(get(&root, &TreePath::root().child("a").child("b")), None);
        assert_eq!(get(&root, &TreePath::root().child("z")), None);
    }

    #[test]
    fn test_path_display() {
        let path = TreePath::drives(&UserId::new("abc"));
        assert_eq!(path.to_string(), "users/abc/drives");
        assert_eq!(TreePath::root().to_string(), "/");
    }
}
