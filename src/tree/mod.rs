//! Arena-backed syntax tree.
//!
//! All nodes of a conversion live in one [`Tree`] and are addressed by
//! [`NodeId`]. A node has at most one parent; it must be detached before it
//! can be attached elsewhere. Detached nodes stay in the arena and are simply
//! unreachable from the root.

pub mod dump;
pub mod nav;
pub mod notation;
pub mod render;
pub mod repr;
pub mod tag;

use std::collections::BTreeMap;
use std::fmt;

pub use tag::Tag;

use crate::error::{ConvertError, ConvertResult};

/// Attribute whose value replaces the rendered text of a node's whole subtree.
pub const SIMPLE_TEXT: &str = "simpleText";

/// Index of a node inside its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: Tag,
    text: String,
    attributes: BTreeMap<String, String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

/// A syntax tree and every node ever created for it.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only a `Root` node.
    pub fn new() -> Self {
        Self::with_root(Tag::Root, "")
    }

    /// Create a tree whose root has the given tag and text.
    pub fn with_root(tag: Tag, text: &str) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.create(tag, text);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena, including detached ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    // ==================== Node fields ====================

    pub fn tag(&self, id: NodeId) -> Tag {
        self.data(id).tag
    }

    pub fn set_tag(&mut self, id: NodeId, tag: Tag) {
        self.data_mut(id).tag = tag;
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.data(id).text
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.data_mut(id).text = text.into();
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).children
    }

    /// Copy of the child list, safe to iterate while mutating the tree.
    pub fn snapshot(&self, id: NodeId) -> Vec<NodeId> {
        self.data(id).children.clone()
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.data(id).attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self, id: NodeId) -> &BTreeMap<String, String> {
        &self.data(id).attributes
    }

    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        self.data_mut(id)
            .attributes
            .insert(key.to_string(), value.into());
    }

    pub fn remove_attribute(&mut self, id: NodeId, key: &str) -> Option<String> {
        self.data_mut(id).attributes.remove(key)
    }

    // ==================== Structure ====================

    /// Create a detached node.
    pub fn create(&mut self, tag: Tag, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag,
            text: text.to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        });
        id
    }

    /// Create a node and append it to `parent`.
    pub fn append(&mut self, parent: NodeId, tag: Tag, text: &str) -> NodeId {
        let id = self.create(tag, text);
        self.link(parent, id, None);
        id
    }

    /// Create a node and insert it before `existing`.
    pub fn insert_new_before(
        &mut self,
        parent: NodeId,
        tag: Tag,
        text: &str,
        existing: NodeId,
    ) -> ConvertResult<NodeId> {
        let id = self.create(tag, text);
        self.insert_before(parent, id, existing)?;
        Ok(id)
    }

    /// Create a node and insert it after `existing`.
    pub fn insert_new_after(
        &mut self,
        parent: NodeId,
        tag: Tag,
        text: &str,
        existing: NodeId,
    ) -> ConvertResult<NodeId> {
        let id = self.create(tag, text);
        self.insert_after(parent, id, existing)?;
        Ok(id)
    }

    /// Append a detached node to `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> ConvertResult<()> {
        self.check_attachable(parent, child)?;
        self.link(parent, child, None);
        Ok(())
    }

    /// Insert a detached node immediately before `existing`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        existing: NodeId,
    ) -> ConvertResult<()> {
        self.check_attachable(parent, child)?;
        let index = self.position(parent, existing)?;
        self.link(parent, child, Some(index));
        Ok(())
    }

    /// Insert a detached node immediately after `existing`.
    pub fn insert_after(
        &mut self,
        parent: NodeId,
        child: NodeId,
        existing: NodeId,
    ) -> ConvertResult<()> {
        self.check_attachable(parent, child)?;
        let index = self.position(parent, existing)?;
        self.link(parent, child, Some(index + 1));
        Ok(())
    }

    /// Detach `child` from `parent`. Grandchildren stay with the removed subtree.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> ConvertResult<()> {
        let index = self.position(parent, child)?;
        self.data_mut(parent).children.remove(index);
        self.data_mut(child).parent = None;
        Ok(())
    }

    /// Detach a node from whatever parent it has.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self.data_mut(parent).children.retain(|c| *c != id);
            self.data_mut(id).parent = None;
        }
    }

    /// Detach a node and attach it at the end of `parent`.
    pub fn move_to(&mut self, parent: NodeId, id: NodeId) -> ConvertResult<()> {
        self.detach(id);
        self.add_child(parent, id)
    }

    /// Detach a node and insert it before `existing`.
    pub fn move_before(
        &mut self,
        parent: NodeId,
        id: NodeId,
        existing: NodeId,
    ) -> ConvertResult<()> {
        self.detach(id);
        self.insert_before(parent, id, existing)
    }

    /// Detach a node and insert it after `existing`.
    pub fn move_after(&mut self, parent: NodeId, id: NodeId, existing: NodeId) -> ConvertResult<()> {
        self.detach(id);
        self.insert_after(parent, id, existing)
    }

    /// Deep copy of a subtree. The copy is detached and shares nothing with the original.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let data = self.data(id);
        let (tag, text, attributes) = (data.tag, data.text.clone(), data.attributes.clone());
        let copy = self.create(tag, &text);
        self.data_mut(copy).attributes = attributes;
        for child in self.snapshot(id) {
            let child_copy = self.deep_clone(child);
            self.link(copy, child_copy, None);
        }
        copy
    }

    fn position(&self, parent: NodeId, child: NodeId) -> ConvertResult<usize> {
        self.data(parent)
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(ConvertError::NotAChild { parent, child })
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> ConvertResult<()> {
        if let Some(current) = self.parent(child) {
            return Err(ConvertError::AlreadyAttached {
                child,
                parent: current,
            });
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(ConvertError::Cycle { parent, child });
            }
            cursor = self.parent(id);
        }
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        self.data_mut(child).parent = Some(parent);
        let children = &mut self.data_mut(parent).children;
        match index {
            Some(i) => children.insert(i, child),
            None => children.push(child),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement_with_tokens(tree: &mut Tree, words: &[&str]) -> (NodeId, Vec<NodeId>) {
        let root = tree.root();
        let statement = tree.append(root, Tag::Statement, "");
        let ids = words
            .iter()
            .map(|w| tree.append(statement, Tag::OtherNode, w))
            .collect();
        (statement, ids)
    }

    #[test]
    fn test_append_sets_parent() {
        let mut tree = Tree::new();
        let (statement, ids) = statement_with_tokens(&mut tree, &["a", "b"]);
        assert_eq!(tree.parent(statement), Some(tree.root()));
        assert_eq!(tree.children(statement), ids.as_slice());
        for id in ids {
            assert_eq!(tree.parent(id), Some(statement));
        }
    }

    #[test]
    fn test_add_child_rejects_attached_node() {
        let mut tree = Tree::new();
        let (statement, ids) = statement_with_tokens(&mut tree, &["a"]);
        let other = tree.append(tree.root(), Tag::Statement, "");

        let err = tree.add_child(other, ids[0]).unwrap_err();
        assert!(matches!(err, ConvertError::AlreadyAttached { .. }));
        assert!(tree.children(other).is_empty());
        assert_eq!(tree.parent(ids[0]), Some(statement));
    }

    #[test]
    fn test_add_child_rejects_cycle() {
        let mut tree = Tree::new();
        let (statement, ids) = statement_with_tokens(&mut tree, &["a"]);
        tree.detach(statement);

        let err = tree.add_child(ids[0], statement).unwrap_err();
        assert!(matches!(err, ConvertError::Cycle { .. }));
        let err = tree.add_child(statement, statement).unwrap_err();
        assert!(matches!(err, ConvertError::Cycle { .. }));
    }

    #[test]
    fn test_insert_relative_to_non_child_fails() {
        let mut tree = Tree::new();
        let (statement, _) = statement_with_tokens(&mut tree, &["a"]);
        let stranger = tree.create(Tag::OtherNode, "x");
        let fresh = tree.create(Tag::OtherNode, "y");

        let err = tree.insert_before(statement, fresh, stranger).unwrap_err();
        assert!(matches!(err, ConvertError::NotAChild { .. }));
        assert_eq!(tree.parent(fresh), None);
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut tree = Tree::new();
        let (statement, ids) = statement_with_tokens(&mut tree, &["a", "c"]);
        let b = tree.insert_new_after(statement, Tag::OtherNode, "b", ids[0]).unwrap();
        let z = tree.insert_new_before(statement, Tag::OtherNode, "z", ids[0]).unwrap();
        assert_eq!(tree.children(statement), &[z, ids[0], b, ids[1]]);
    }

    #[test]
    fn test_remove_child_keeps_grandchildren() {
        let mut tree = Tree::new();
        let (statement, ids) = statement_with_tokens(&mut tree, &["a"]);
        let root = tree.root();
        tree.remove_child(root, statement).unwrap();
        assert_eq!(tree.parent(statement), None);
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.parent(ids[0]), Some(statement));

        let err = tree.remove_child(root, statement).unwrap_err();
        assert!(matches!(err, ConvertError::NotAChild { .. }));
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let mut tree = Tree::new();
        let (statement, ids) = statement_with_tokens(&mut tree, &["a", "b"]);
        tree.set_attribute(ids[0], SIMPLE_TEXT, "x");

        let copy = tree.deep_clone(statement);
        assert_eq!(tree.parent(copy), None);
        let copied = tree.snapshot(copy);
        assert_eq!(copied.len(), 2);
        for child in &copied {
            assert_eq!(tree.parent(*child), Some(copy));
            assert!(!ids.contains(child));
        }

        tree.set_text(copied[0], "changed");
        tree.remove_attribute(copied[0], SIMPLE_TEXT);
        assert_eq!(tree.text(ids[0]), "a");
        assert_eq!(tree.attribute(ids[0], SIMPLE_TEXT), Some("x"));
    }

    #[test]
    fn test_move_to_reattaches() {
        let mut tree = Tree::new();
        let (statement, ids) = statement_with_tokens(&mut tree, &["a", "b"]);
        let other = tree.append(tree.root(), Tag::Statement, "");
        tree.move_to(other, ids[0]).unwrap();
        assert_eq!(tree.children(statement), &[ids[1]]);
        assert_eq!(tree.parent(ids[0]), Some(other));
    }
}
