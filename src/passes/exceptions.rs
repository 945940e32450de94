//! Transactions and error handling.
//!
//! Explicit transactions are dropped: a PL/pgSQL routine runs inside the
//! caller's transaction and rolls back through its exception block.

use super::{PassContext, Visit, walk};
use crate::declare::trim_whitespace;
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, SIMPLE_TEXT, Tag, Tree};

/// SQLSTATE raised for user errors.
const ERROR_CODE: &str = "T0000";

/// Remove `begin tran`, `commit` and `rollback` statements.
pub fn convert_transactions(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if !matches!(
            tree.tag(id),
            Tag::BeginTransaction | Tag::CommitTransaction | Tag::RollbackTransaction
        ) {
            return Ok(Visit::Descend);
        }
        let statement = tree
            .closest_ancestor(id, Tag::Statement)
            .expected("statement of the transaction boundary")?;
        tree.detach(statement);
        tracing::debug!("Transaction statement {} removed", statement);
        Ok(Visit::Skip)
    })
}

/// `begin try ... end try begin catch ... end catch` becomes
/// `begin ... exception when others then ... end`; `throw` and
/// `raiserror` become `raise exception`.
pub fn convert_try_catch(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        match tree.tag(id) {
            Tag::OtherKeyword if tree.has_text(id, "try") => convert_try(tree, id)?,
            Tag::OtherKeyword if tree.has_text(id, "catch") => convert_catch(tree, id)?,
            Tag::OtherKeyword if tree.has_text(id, "raiserror") => convert_raiserror(tree, id)?,
            Tag::OtherNode if tree.has_text(id, "throw") => convert_throw(tree, id)?,
            _ => {}
        }
        Ok(Visit::Descend)
    })
}

fn follows_begin(tree: &Tree, keyword: NodeId) -> bool {
    tree.previous_sibling(keyword)
        .is_some_and(|p| tree.has_text(p, "begin"))
}

fn convert_try(tree: &mut Tree, keyword: NodeId) -> ConvertResult<()> {
    if follows_begin(tree, keyword) {
        let open = tree.parent(keyword).expected("opener of the try block")?;
        tree.remove_child(open, keyword)?;
        tree.set_attribute(open, SIMPLE_TEXT, "begin");
        return Ok(());
    }
    let close = tree
        .closest_ancestor(keyword, Tag::ContainerClose)
        .expected("closer of the try block")?;
    tree.detach(close);
    Ok(())
}

fn convert_catch(tree: &mut Tree, keyword: NodeId) -> ConvertResult<()> {
    let marker = tree.parent(keyword).expected("marker of the catch block")?;
    let text = if follows_begin(tree, keyword) {
        "exception when others then"
    } else {
        "end"
    };
    tree.set_attribute(marker, SIMPLE_TEXT, text);
    Ok(())
}

/// Insert `exception <message> using errcode = '...'` after `raise`.
fn raise_exception(tree: &mut Tree, raise: NodeId, message: Vec<NodeId>) -> ConvertResult<()> {
    let clause = tree.parent(raise).expected("clause of the raise")?;
    tree.set_tag(raise, Tag::OtherKeyword);
    tree.set_text(raise, "raise");

    let mut anchor = tree.insert_new_after(clause, Tag::OtherKeyword, "exception", raise)?;
    for node in message {
        tree.move_after(clause, node, anchor)?;
        anchor = node;
    }
    anchor = tree.insert_new_after(clause, Tag::OtherKeyword, "using", anchor)?;
    anchor = tree.insert_new_after(clause, Tag::OtherNode, "errcode", anchor)?;
    anchor = tree.insert_new_after(clause, Tag::EqualsSign, "=", anchor)?;
    tree.insert_new_after(clause, Tag::String, ERROR_CODE, anchor)?;
    Ok(())
}

/// `throw 50001, 'message', 1` keeps the message only. A bare `throw`
/// re-raises.
fn convert_throw(tree: &mut Tree, throw: NodeId) -> ConvertResult<()> {
    let clause = tree.parent(throw).expected("clause of throw")?;
    let arguments: Vec<NodeId> = tree
        .siblings_after(throw)
        .into_iter()
        .take_while(|n| !tree.is(*n, Tag::Semicolon))
        .collect();
    if arguments.iter().all(|n| tree.is_noise(*n)) {
        tree.set_tag(throw, Tag::OtherKeyword);
        tree.set_text(throw, "raise");
        return Ok(());
    }

    let mut parts: Vec<Vec<NodeId>> = vec![Vec::new()];
    for node in &arguments {
        if tree.is(*node, Tag::Comma) {
            parts.push(Vec::new());
        } else if let Some(part) = parts.last_mut() {
            part.push(*node);
        }
    }
    let mut message = parts.into_iter().nth(1).expected("message argument of throw")?;
    trim_whitespace(tree, &mut message);

    for node in arguments {
        if !message.contains(&node) {
            tree.remove_child(clause, node)?;
        }
    }
    raise_exception(tree, throw, message)
}

/// `raiserror('message', 16, 1)` keeps the message only.
fn convert_raiserror(tree: &mut Tree, keyword: NodeId) -> ConvertResult<()> {
    let clause = tree.parent(keyword).expected("clause of raiserror")?;
    let parens = tree
        .next_sibling(keyword, false)
        .filter(|p| tree.tag(*p).is_parens())
        .expected("arguments of raiserror")?;
    let mut message: Vec<NodeId> = tree
        .children(parens)
        .iter()
        .copied()
        .take_while(|n| !tree.is(*n, Tag::Comma))
        .collect();
    trim_whitespace(tree, &mut message);
    for node in &message {
        tree.detach(*node);
    }
    tree.remove_child(clause, parens)?;
    raise_exception(tree, keyword, message)
}
