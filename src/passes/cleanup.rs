//! Final cleanups: dialect-only statements, terminators, names and
//! punctuation placement.

use super::{PassContext, Visit, for_each_match, walk};
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

/// Statement options with no PL/pgSQL counterpart; their statements are dropped.
const UNNECESSARY_KEYWORDS: &[&str] = &["lineno", "nocount"];

/// Drop `set nocount on`-like statements and statements that are only a terminator.
pub fn remove_unnecessary_statements(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        let is_option = tree.is(id, Tag::OtherKeyword)
            && UNNECESSARY_KEYWORDS.iter().any(|k| tree.has_text(id, k));
        if is_option {
            let statement = tree
                .closest_ancestor(id, Tag::Statement)
                .expected("statement of the option")?;
            tree.detach(statement);
            return Ok(Visit::Skip);
        }

        if tree.is(id, Tag::Statement) && is_bare_terminator(tree, id) {
            tree.detach(id);
            return Ok(Visit::Skip);
        }
        Ok(Visit::Descend)
    })
}

fn is_bare_terminator(tree: &Tree, statement: NodeId) -> bool {
    let [clause] = tree.significant_children(statement)[..] else {
        return false;
    };
    matches!(
        tree.significant_children(clause)[..],
        [only] if tree.is(only, Tag::Semicolon)
    )
}

/// A terminator inside a `DdlOtherBlock` moves to the enclosing clause.
pub fn fix_ddl_other_block_semicolon(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::DdlOtherBlock, None, |tree, block| {
        let Some(semicolon) = tree.child_by_tag(block, Tag::Semicolon) else {
            return Ok(());
        };
        let clause = tree.parent(block).expected("clause of the ddl block")?;
        tree.move_to(clause, semicolon)
    })
}

/// Terminate the last clause of every statement that lacks a terminator.
pub fn add_missing_semicolons(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        match tree.tag(id) {
            Tag::ExpressionParens | Tag::FunctionParens | Tag::SelectionTargetParens => {
                return Ok(Visit::Skip);
            }
            Tag::Clause if needs_semicolon(tree, id) => {
                let trailing = tree
                    .children(id)
                    .last()
                    .copied()
                    .filter(|n| tree.is_whitespace(*n));
                match trailing {
                    Some(whitespace) => {
                        tree.insert_new_before(id, Tag::Semicolon, ";", whitespace)?;
                    }
                    None => {
                        tree.append(id, Tag::Semicolon, ";");
                    }
                }
            }
            _ => {}
        }
        Ok(Visit::Descend)
    })
}

fn needs_semicolon(tree: &Tree, clause: NodeId) -> bool {
    let Some(parent) = tree.parent(clause) else {
        return false;
    };
    if tree.children(parent).last() != Some(&clause) {
        return false;
    }
    if [Tag::Semicolon, Tag::WhileLoop, Tag::TryBlock]
        .iter()
        .any(|tag| tree.child_by_tag(clause, *tag).is_some())
    {
        return false;
    }
    let Some(last) = tree.children(clause).last().copied() else {
        return false;
    };
    if matches!(tree.tag(last), Tag::DdlProceduralBlock | Tag::IfStatement) {
        return false;
    }
    !tree.ends_with_semicolon(clause) && !is_end_followed_by_else(tree, clause)
}

/// A block closing the then-branch of an if with an else branch.
fn is_end_followed_by_else(tree: &Tree, clause: NodeId) -> bool {
    if tree.child_by_tag(clause, Tag::BeginEndBlock).is_none() {
        return false;
    }
    tree.parent(clause)
        .and_then(|statement| tree.parent(statement))
        .and_then(|container| tree.parent(container))
        .filter(|owner| tree.is(*owner, Tag::IfStatement))
        .is_some_and(|owner| tree.child_by_tag(owner, Tag::ElseClause).is_some())
}

/// `UserId` becomes `user_id`, `HTTPServer` becomes `http_server`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in chars.iter().copied().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Identifiers become snake case with `@` and `#` folded to `_`.
pub fn update_names(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    for id in tree.descendants(root) {
        if !tree.is_name(id) {
            continue;
        }
        let name = match tree.tag(id) {
            Tag::OtherNode | Tag::BracketQuotedName => {
                to_snake_case(tree.text(id)).replace(['@', '#'], "_")
            }
            _ => tree.text(id).to_lowercase(),
        };
        tree.set_text(id, name);
    }
    Ok(())
}

/// `N'text'` becomes `'text'`.
pub fn convert_nstrings(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::NString, None, |tree, id| {
        tree.set_tag(id, Tag::String);
        Ok(())
    })
}

/// A comma written after a trailing comment moves in front of it.
pub fn fix_commas_after_comments(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::Comma, None, move_before_comments)
}

/// A terminator written after a trailing comment moves in front of it.
pub fn fix_semicolons_after_comments(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::Semicolon, None, move_before_comments)
}

fn move_before_comments(tree: &mut Tree, punctuation: NodeId) -> ConvertResult<()> {
    let mut earliest = None;
    let mut cursor = tree.prev_adjacent(punctuation);
    while let Some(node) = cursor.filter(|n| tree.is_noise(*n)) {
        if tree.is_comment(node) {
            earliest = Some(node);
        }
        cursor = tree.prev_adjacent(node);
    }
    let Some(comment) = earliest else {
        return Ok(());
    };
    let parent = tree.parent(punctuation).expected("parent of the punctuation")?;
    tree.move_before(parent, punctuation, comment)
}
