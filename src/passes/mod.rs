//! Tree rewrite passes.
//!
//! Every pass walks the whole tree once and rewrites the constructs it
//! recognises in place. Passes run in a fixed order (see
//! [`crate::pipeline::Pipeline::standard`]); several of them rely on
//! scaffolding left behind by earlier ones.

pub mod cleanup;
pub mod control_flow;
pub mod declarations;
pub mod dml;
pub mod exceptions;
pub mod functions;
pub mod json;
pub mod pivot;
pub mod procedural;
pub mod select;
pub mod table_vars;

use std::collections::BTreeMap;

use crate::declare::Declaration;
use crate::error::ConvertResult;
use crate::tree::{NodeId, Tag, Tree};

/// Signature shared by all passes.
pub type PassFn = fn(&mut Tree, &mut PassContext) -> ConvertResult<()>;

/// A named tree rewrite.
#[derive(Clone, Copy)]
pub struct Pass {
    pub name: &'static str,
    pub run: PassFn,
}

impl Pass {
    pub const fn new(name: &'static str, run: PassFn) -> Self {
        Self { name, run }
    }
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pass").field(&self.name).finish()
    }
}

/// State shared by the passes of one conversion run.
#[derive(Debug, Default)]
pub struct PassContext {
    /// Number of approximate conversions so far.
    pub warnings: usize,
    /// Declarations found in the whole tree by the declaration section pass.
    pub declarations: Vec<Declaration>,
    /// Variables and parameters that became arrays.
    pub array_variables: Vec<String>,
    /// Temp table name (lowercase) to its column definition.
    pub temp_tables: BTreeMap<String, NodeId>,
}

impl PassContext {
    /// Record an approximate conversion.
    pub fn warn(&mut self, message: &str) {
        self.warnings += 1;
        tracing::warn!("Approximate conversion: {}", message);
    }

    pub fn is_array_variable(&self, name: &str) -> bool {
        self.array_variables
            .iter()
            .any(|v| v.eq_ignore_ascii_case(name))
    }
}

/// What the walker does after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Descend,
    Skip,
}

/// Pre-order walk over a snapshot of each child list.
///
/// Children detached while their parent was being visited are not entered.
pub fn walk<F>(tree: &mut Tree, id: NodeId, visit: &mut F) -> ConvertResult<()>
where
    F: FnMut(&mut Tree, NodeId) -> ConvertResult<Visit>,
{
    if visit(tree, id)? == Visit::Skip {
        return Ok(());
    }
    for child in tree.snapshot(id) {
        if tree.parent(child).is_none() {
            continue;
        }
        walk(tree, child, visit)?;
    }
    Ok(())
}

/// Walk the whole tree, visiting nodes matching `tag` and `text`.
///
/// Matching nodes are still descended into.
pub fn for_each_match<F>(tree: &mut Tree, tag: Tag, text: Option<&str>, mut rewrite: F) -> ConvertResult<()>
where
    F: FnMut(&mut Tree, NodeId) -> ConvertResult<()>,
{
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if tree.is(id, tag) && text.is_none_or(|t| tree.has_text(id, t)) {
            rewrite(tree, id)?;
        }
        Ok(Visit::Descend)
    })
}

// ==================== Shared rewrites ====================

/// Split a select clause into its comma separated columns.
pub fn select_columns(tree: &Tree, select_clause: NodeId) -> Vec<Vec<NodeId>> {
    let keyword = tree.child_with_text(select_clause, Tag::OtherKeyword, "select");
    let mut columns = Vec::new();
    let mut current = Vec::new();
    for child in tree.children(select_clause) {
        if Some(*child) == keyword {
            continue;
        }
        if tree.is(*child, Tag::Comma) {
            columns.push(std::mem::take(&mut current));
        } else {
            current.push(*child);
        }
    }
    columns.push(current);
    columns
}

/// A `@var = value` column of a select list.
pub fn is_variable_assignment(tree: &Tree, column: &[NodeId]) -> bool {
    column.iter().any(|n| tree.is(*n, Tag::EqualsSign))
        && column
            .iter()
            .find(|n| tree.is_name(**n))
            .is_some_and(|n| tree.text(*n).starts_with('@'))
}

/// Move the statements of `container` into a new begin/end block, unless it already holds one.
pub fn wrap_in_begin_end(tree: &mut Tree, container: NodeId) -> ConvertResult<()> {
    let has_block = tree.children(container).iter().any(|statement| {
        tree.children(*statement).iter().any(|clause| {
            tree.child_by_tag(*clause, Tag::BeginEndBlock).is_some()
        })
    });
    if has_block {
        return Ok(());
    }

    let statement = tree.create(Tag::Statement, "");
    let clause = tree.append(statement, Tag::Clause, "");
    let block = tree.append(clause, Tag::BeginEndBlock, "");
    let open = tree.append(block, Tag::ContainerOpen, "");
    tree.append(open, Tag::OtherKeyword, "begin");
    let body = tree.append(block, Tag::ContainerMultiStatement, "");
    for child in tree.snapshot(container) {
        tree.move_to(body, child)?;
    }
    let close = tree.append(block, Tag::ContainerClose, "");
    tree.append(close, Tag::OtherKeyword, "end");

    tree.add_child(container, statement)
}

/// Move everything after a clause's leading keyword into expression parens.
pub fn wrap_in_expression_parens(tree: &mut Tree, clause: NodeId) -> ConvertResult<NodeId> {
    use crate::error::Expected;

    let keyword = tree
        .child_by_tag(clause, Tag::OtherKeyword)
        .expected("keyword opening the clause")?;
    let content: Vec<NodeId> = tree
        .siblings_after(keyword)
        .into_iter()
        .filter(|n| !tree.is(*n, Tag::Semicolon))
        .collect();
    let parens = tree.insert_new_after(clause, Tag::ExpressionParens, "", keyword)?;
    for node in content {
        tree.move_to(parens, node)?;
    }
    Ok(parens)
}

/// The routine body statements of a `DdlAsBlock`.
pub fn routine_body(tree: &Tree, as_block: NodeId) -> Option<NodeId> {
    tree.child_by_tag(as_block, Tag::ContainerGeneralContent)
}
