//! Variable declarations and assignments.

use super::{PassContext, Visit, for_each_match, routine_body, walk};
use crate::declare::{extract, find_declarations};
use crate::error::{ConvertResult, Expected};
use crate::passes::procedural::routine_as_blocks;
use crate::tree::{NodeId, Tag, Tree};

/// Collect every declaration and re-emit those of each routine as one
/// leading `declare` section of the routine body.
///
/// Declarations with neither a type keyword nor a type name are skipped.
pub fn add_declare_section(tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    ctx.declarations = find_declarations(tree, root);
    for declaration in &ctx.declarations {
        if !declaration.array {
            continue;
        }
        if let Some(name) = declaration.variable.iter().find(|n| tree.is(**n, Tag::OtherNode)) {
            ctx.array_variables.push(tree.text(*name).to_string());
        }
    }

    for as_block in routine_as_blocks(tree)? {
        let declarations = find_declarations(tree, as_block);
        if declarations.is_empty() {
            continue;
        }

        let statement = routine_body(tree, as_block)
            .and_then(|b| tree.child_by_tag(b, Tag::Statement))
            .expected("statement of the routine body")?;
        let block_clause = tree
            .child_by_tag(statement, Tag::Clause)
            .expected("begin/end clause of the routine body")?;

        let section = tree.insert_new_before(statement, Tag::Clause, "", block_clause)?;
        let header = tree.append(section, Tag::DdlDeclareBlock, "");
        tree.append(header, Tag::OtherKeyword, "declare");

        for declaration in declarations {
            if declaration.type_keyword(tree).is_none() && declaration.names(tree).len() < 2 {
                continue;
            }

            let element_type = declaration
                .array
                .then(|| declaration.names(tree).last().copied())
                .flatten();
            let clause = tree.append(section, Tag::Clause, "");
            for node in &declaration.variable {
                if tree.is_comment(*node) {
                    continue;
                }
                let copy = tree.deep_clone(*node);
                tree.add_child(clause, copy)?;
                if Some(*node) == element_type {
                    tree.append(clause, Tag::Period, "[]");
                }
            }
            tree.append(clause, Tag::Semicolon, ";");

            let comments = declaration
                .value
                .iter()
                .chain(declaration.variable.iter())
                .copied()
                .filter(|n| tree.is_comment(*n))
                .collect::<Vec<_>>();
            for comment in comments {
                tree.append(clause, Tag::WhiteSpace, " ");
                let copy = tree.deep_clone(comment);
                tree.add_child(clause, copy)?;
            }
        }
    }

    tracing::debug!(
        "Collected {} declarations, {} array variables",
        ctx.declarations.len(),
        ctx.array_variables.len()
    );
    Ok(())
}

/// `declare @a int = 1` becomes `@a := 1;` where the declaration stood.
pub fn convert_declare_to_assign(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if !tree.is(id, Tag::DdlDeclareBlock) {
            return Ok(Visit::Descend);
        }

        let assignments: Vec<_> = extract(tree, id)
            .into_iter()
            .filter(|d| !d.value.is_empty())
            .collect();
        if assignments.is_empty() {
            return Ok(Visit::Skip);
        }

        let clause = tree.parent(id).expected("clause holding the declaration")?;
        let statement = tree.parent(clause).expected("statement holding the declaration")?;

        let mut anchor = clause;
        for assignment in assignments {
            let name = assignment.name(tree).expected("declared variable name")?;
            let value: Vec<NodeId> = assignment
                .value
                .iter()
                .copied()
                .filter(|n| !tree.is_noise(*n) && !tree.is(*n, Tag::Semicolon))
                .collect();

            let target = tree.insert_new_after(statement, Tag::Clause, "", anchor)?;
            tree.move_to(target, name)?;
            tree.append(target, Tag::EqualsSign, ":=");
            for node in value {
                tree.move_to(target, node)?;
            }
            tree.append(target, Tag::Semicolon, ";");
            anchor = target;
        }

        tree.remove_child(statement, clause)?;
        Ok(Visit::Skip)
    })
}

/// `set @a = 1` becomes `@a := 1`, except where `set` belongs to an update.
pub fn convert_set_to_assign(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherKeyword, Some("set"), |tree, keyword| {
        let Some(clause) = tree.parent(keyword) else {
            return Ok(());
        };
        let statement = tree.parent(clause).expected("statement holding set")?;
        let in_update = tree
            .child_containing(statement, Tag::OtherKeyword, "update")
            .is_some();
        if in_update || tree.closest_ancestor(keyword, Tag::MergeClause).is_some() {
            return Ok(());
        }
        let Some(equals) = tree.child_by_tag(clause, Tag::EqualsSign) else {
            return Ok(());
        };

        tree.remove_child(clause, keyword)?;
        if tree.children(clause).first().is_some_and(|n| tree.is_whitespace(*n)) {
            let space = tree.children(clause)[0];
            tree.remove_child(clause, space)?;
        }
        tree.set_text(equals, ":=");
        Ok(())
    })
}

/// Drop statements still holding a declaration, except the routine's own
/// declare section.
pub fn cleanup_declare_statements(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if !tree.is(id, Tag::DdlDeclareBlock) {
            return Ok(Visit::Descend);
        }
        let statement = tree
            .closest_ancestor(id, Tag::Statement)
            .expected("statement holding the declaration")?;
        let Some(container) = tree.parent(statement) else {
            return Ok(Visit::Skip);
        };
        if !tree.is(container, Tag::ContainerGeneralContent) {
            tree.remove_child(container, statement)?;
        }
        Ok(Visit::Skip)
    })
}
