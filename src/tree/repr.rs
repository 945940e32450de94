//! JSON representation of trees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{NodeId, Tag, Tree};
use crate::error::ConvertResult;

/// Owned, nested form of a node, as exchanged with parsers and formatters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRepr {
    pub tag: Tag,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRepr>,
}

impl NodeRepr {
    /// Capture the subtree at `id`.
    pub fn from_tree(tree: &Tree, id: NodeId) -> Self {
        Self {
            tag: tree.tag(id),
            text: tree.text(id).to_string(),
            attributes: tree.attributes(id).clone(),
            children: tree
                .children(id)
                .iter()
                .map(|c| Self::from_tree(tree, *c))
                .collect(),
        }
    }

    /// Build a fresh tree rooted at this node.
    pub fn into_tree(self) -> Tree {
        let mut tree = Tree::with_root(self.tag, &self.text);
        let root = tree.root();
        self.fill(&mut tree, root);
        tree
    }

    fn fill(self, tree: &mut Tree, id: NodeId) {
        for (key, value) in self.attributes {
            tree.set_attribute(id, &key, value);
        }
        for child in self.children {
            let child_id = tree.append(id, child.tag, &child.text);
            child.fill(tree, child_id);
        }
    }
}

/// Read a tree from JSON.
pub fn from_json(input: &str) -> ConvertResult<Tree> {
    let repr: NodeRepr = serde_json::from_str(input)?;
    Ok(repr.into_tree())
}

/// Serialize the reachable tree as pretty JSON.
pub fn to_json(tree: &Tree) -> ConvertResult<String> {
    Ok(serde_json::to_string_pretty(&NodeRepr::from_tree(tree, tree.root()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;

    #[test]
    fn test_from_json() {
        let tree = from_json(
            r#"{"tag": "Statement", "children": [
                {"tag": "Clause", "attributes": {"simpleText": "end"}, "children": [
                    {"tag": "OtherKeyword", "text": "select"}
                ]}
            ]}"#,
        )
        .unwrap();
        let clause = tree.child_by_tag(tree.root(), Tag::Clause).unwrap();
        assert_eq!(tree.attribute(clause, "simpleText"), Some("end"));
        assert_eq!(tree.text(tree.children(clause)[0]), "select");
    }

    #[test]
    fn test_to_json_skips_empty_fields() {
        let mut tree = Tree::new();
        tree.append(tree.root(), Tag::Semicolon, ";");
        let json = to_json(&tree).unwrap();
        assert!(!json.contains("attributes"));
        assert!(json.contains("\"Semicolon\""));
        let back = from_json(&json).unwrap();
        assert_eq!(NodeRepr::from_tree(&back, back.root()), NodeRepr::from_tree(&tree, tree.root()));
    }

    #[test]
    fn test_unknown_tag_is_json_error() {
        let err = from_json(r#"{"tag": "Nope"}"#).unwrap_err();
        assert!(matches!(err, ConvertError::Json(_)));
    }
}
