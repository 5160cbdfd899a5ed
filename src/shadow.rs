//! Operations over the shadow tree.
//!
//! The shadow tree is the normalized, object-only form of the mounted
//! document (see `normalize`). Every non-leaf node is an object, so a
//! filesystem path maps onto it by plain key descent. Nodes are located
//! either by path or by identity; identity means the node's address inside
//! the tree, which is stable between mutations, never structural equality.
//! Two equal scalars at different positions must stay distinguishable.

use serde_json::Value;

use crate::errors::FsError;

/// Address of a node inside the shadow tree.
///
/// Used purely for comparisons; it is never dereferenced, so a stale
/// address is harmless (lookups with it simply miss).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAddr(*const Value);

impl NodeAddr {
    pub fn of(node: &Value) -> Self {
        NodeAddr(node as *const Value)
    }
}

/// Resolve an absolute path to a node. `/` resolves to the root itself.
///
/// Each segment must name a direct key of an object node; empty segments
/// (repeated slashes) are skipped. Any violation yields `None`.
pub fn resolve<'a>(path: &str, root: &'a Value) -> Option<&'a Value> {
    let mut node = root;
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        node = node.as_object()?.get(seg)?;
    }
    Some(node)
}

/// Mutable variant of [`resolve`].
pub fn resolve_mut<'a>(path: &str, root: &'a mut Value) -> Option<&'a mut Value> {
    let mut node = root;
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        node = node.as_object_mut()?.get_mut(seg)?;
    }
    Some(node)
}

/// Find the object containing `target` and the key it sits under.
///
/// Depth-first over object nodes only. The root has no parent and reports
/// `Invalid`, distinct from `NotFound` for nodes absent from the tree.
pub fn find_parent_and_key<'a>(
    root: &'a Value,
    target: NodeAddr,
) -> Result<(&'a Value, &'a str), FsError> {
    if NodeAddr::of(root) == target {
        return Err(FsError::Invalid);
    }
    search(root, target).ok_or(FsError::NotFound)
}

fn search<'a>(node: &'a Value, target: NodeAddr) -> Option<(&'a Value, &'a str)> {
    let map = node.as_object()?;
    for (key, child) in map {
        if NodeAddr::of(child) == target {
            return Some((node, key.as_str()));
        }
        if let Some(found) = search(child, target) {
            return Some(found);
        }
    }
    None
}

/// Replace the node at `target` with `new_node`, in place.
///
/// The tree is untouched when `target` is the root or cannot be found;
/// `new_node` is dropped in that case.
pub fn replace_node(root: &mut Value, target: NodeAddr, new_node: Value) -> Result<(), FsError> {
    if NodeAddr::of(root) == target {
        return Err(FsError::Invalid);
    }
    let mut replacement = Some(new_node);
    if replace_in(root, target, &mut replacement) {
        Ok(())
    } else {
        Err(FsError::NotFound)
    }
}

fn replace_in(node: &mut Value, target: NodeAddr, replacement: &mut Option<Value>) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };
    let hit = map
        .iter()
        .find(|(_, child)| NodeAddr::of(child) == target)
        .map(|(key, _)| key.clone());
    if let Some(key) = hit {
        if let Some(new_node) = replacement.take() {
            map.insert(key, new_node);
        }
        return true;
    }
    map.values_mut().any(|child| replace_in(child, target, replacement))
}

/// Delete the node at `target` from its parent object.
pub fn remove_node(root: &mut Value, target: NodeAddr) -> Result<(), FsError> {
    if NodeAddr::of(root) == target {
        return Err(FsError::Invalid);
    }
    if remove_in(root, target) {
        Ok(())
    } else {
        Err(FsError::NotFound)
    }
}

fn remove_in(node: &mut Value, target: NodeAddr) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };
    let hit = map
        .iter()
        .find(|(_, child)| NodeAddr::of(child) == target)
        .map(|(key, _)| key.clone());
    if let Some(key) = hit {
        map.remove(&key);
        return true;
    }
    map.values_mut().any(|child| remove_in(child, target))
}

/// Number of direct children that are themselves objects.
///
/// Directory link counts are `2 + this`.
pub fn count_dir_children(node: &Value) -> usize {
    node.as_object()
        .map(|map| map.values().filter(|child| child.is_object()).count())
        .unwrap_or(0)
}
