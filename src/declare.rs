//! Variable declaration extraction.
//!
//! A declaration block such as
//!
//! ```sql
//! declare @a int = 1, @b dbo.Items, @c nvarchar(20) -- note
//! ```
//!
//! is scanned token by token and flattened into one [`Declaration`] per
//! variable: the tokens naming and typing it, and the tokens of its
//! initializer. A name preceded by a period is a table type and is recorded
//! as an array of that type.

use crate::tree::{NodeId, Tag, Tree};

/// Tokens of one declared variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    /// Name, type and trailing comments, trimmed of whitespace.
    pub variable: Vec<NodeId>,
    /// Initializer tokens after `=`, trimmed of whitespace. Empty without one.
    pub value: Vec<NodeId>,
    /// Typed with a schema qualified table type, declared as an array of it.
    pub array: bool,
}

impl Declaration {
    /// The declared variable name.
    pub fn name(&self, tree: &Tree) -> Option<NodeId> {
        self.variable.iter().copied().find(|n| tree.is_name(*n))
    }

    pub fn type_keyword(&self, tree: &Tree) -> Option<NodeId> {
        self.variable
            .iter()
            .copied()
            .find(|n| tree.is(*n, Tag::DataTypeKeyword))
    }

    /// Identifier-like tokens: the name, then a table type name if any.
    pub fn names(&self, tree: &Tree) -> Vec<NodeId> {
        self.variable
            .iter()
            .copied()
            .filter(|n| tree.is_name(*n))
            .collect()
    }

    /// Declared with an inline table shape.
    pub fn is_table(&self, tree: &Tree) -> bool {
        self.variable
            .iter()
            .any(|n| tree.is_text(*n, Tag::OtherKeyword, "table"))
    }


    /// Whether any identifier token of the variable matches `name`.
    pub fn declares(&self, tree: &Tree, name: &str) -> bool {
        self.variable
            .iter()
            .any(|n| tree.is(*n, Tag::OtherNode) && tree.has_text(*n, name))
    }
}

/// Every declaration in every declaration block below `id`, in tree order.
pub fn find_declarations(tree: &Tree, id: NodeId) -> Vec<Declaration> {
    if tree.is(id, Tag::DdlDeclareBlock) {
        return extract(tree, id);
    }
    let mut found = Vec::new();
    for child in tree.children(id) {
        found.extend(find_declarations(tree, *child));
    }
    found
}

/// Flatten a `DdlDeclareBlock` into declarations.
pub fn extract(tree: &Tree, block: NodeId) -> Vec<Declaration> {
    let body = tree.child_by_tag(block, Tag::ContainerGeneralContent);
    let mut tokens: Vec<NodeId> = tree
        .children(block)
        .iter()
        .copied()
        .filter(|c| Some(*c) != body)
        .collect();
    if let Some(body) = body {
        tokens.extend_from_slice(tree.children(body));
    }

    let mut result = Vec::new();
    let mut current = Declaration::default();
    let mut in_value = false;

    for node in tokens {
        if in_value {
            if tree.is(node, Tag::Comma) {
                in_value = false;
                finish(tree, &mut result, std::mem::take(&mut current));
            } else {
                current.value.push(node);
            }
            continue;
        }

        match tree.tag(node) {
            Tag::OtherNode | Tag::BracketQuotedName => {
                let before_period = tree
                    .next_adjacent(node)
                    .is_some_and(|n| tree.is(n, Tag::Period));
                let after_period = tree
                    .prev_adjacent(node)
                    .is_some_and(|n| tree.is(n, Tag::Period));
                if before_period {
                    // schema qualifier
                } else if after_period {
                    current.variable.push(node);
                    current.array = true;
                } else {
                    finish(tree, &mut result, std::mem::take(&mut current));
                    current.variable.push(node);
                }
            }
            Tag::WhiteSpace => {
                let last_is_space = current
                    .variable
                    .last()
                    .is_some_and(|n| tree.is_whitespace(*n));
                if !current.variable.is_empty() && !last_is_space {
                    current.variable.push(node);
                }
            }
            Tag::DataTypeKeyword | Tag::DdlDetailParens | Tag::DdlParens => {
                current.variable.push(node);
            }
            Tag::OtherKeyword if tree.has_text(node, "table") => {
                current.variable.push(node);
            }
            Tag::EqualsSign => {
                in_value = true;
                current.value.clear();
            }
            tag if tag.is_comment() => current.variable.push(node),
            _ => {}
        }
    }
    finish(tree, &mut result, current);

    result
}

fn finish(tree: &Tree, result: &mut Vec<Declaration>, mut declaration: Declaration) {
    trim_whitespace(tree, &mut declaration.variable);
    trim_whitespace(tree, &mut declaration.value);
    if !declaration.variable.is_empty() {
        result.push(declaration);
    }
}

/// Drop leading and trailing whitespace tokens.
pub fn trim_whitespace(tree: &Tree, nodes: &mut Vec<NodeId>) {
    while nodes.first().is_some_and(|n| tree.is_whitespace(*n)) {
        nodes.remove(0);
    }
    while nodes.last().is_some_and(|n| tree.is_whitespace(*n)) {
        nodes.pop();
    }
}
