//! Stored routine shaping and result capture.

use super::{PassContext, Visit, for_each_match, is_variable_assignment, routine_body, select_columns, walk, wrap_in_begin_end};
use crate::declare::trim_whitespace;
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

const ROUTINE_KEYWORDS: &[&str] = &["procedure", "proc", "function"];

/// The `procedure`/`function` keyword of a procedural block.
pub fn routine_keyword(tree: &Tree, block: NodeId) -> Option<NodeId> {
    tree.children(block).iter().copied().find(|c| {
        tree.is(*c, Tag::OtherKeyword)
            && ROUTINE_KEYWORDS.iter().any(|k| tree.has_text(*c, k))
    })
}

/// The `DdlAsBlock` of a procedure or function definition.
pub fn routine_as_block(tree: &Tree, block: NodeId) -> Option<NodeId> {
    if !tree.is(block, Tag::DdlProceduralBlock) {
        return None;
    }
    routine_keyword(tree, block)?;
    tree.child_by_tag(block, Tag::DdlAsBlock)
}

/// Visit the `DdlAsBlock` of every routine definition.
fn for_each_routine<F>(tree: &mut Tree, mut rewrite: F) -> ConvertResult<()>
where
    F: FnMut(&mut Tree, NodeId, NodeId) -> ConvertResult<()>,
{
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if let Some(as_block) = routine_as_block(tree, id) {
            rewrite(tree, id, as_block)?;
            return Ok(Visit::Skip);
        }
        Ok(Visit::Descend)
    })
}

/// `alter` headers become `create or replace`; table-returning functions
/// materialise their result table as a temp table and `return query` it.
pub fn convert_procedural_blocks(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_routine(tree, |tree, block, as_block| {
        convert_alter(tree, block)?;
        convert_table_result(tree, block, as_block)
    })
}

fn convert_alter(tree: &mut Tree, block: NodeId) -> ConvertResult<()> {
    let Some(alter) = tree.child_with_text(block, Tag::OtherKeyword, "alter") else {
        return Ok(());
    };
    if tree.child_with_text(block, Tag::OtherKeyword, "create").is_some() {
        tree.set_text(alter, "replace");
        return Ok(());
    }
    tree.set_text(alter, "create");
    let or = tree.insert_new_after(block, Tag::OtherKeyword, "or", alter)?;
    tree.insert_new_after(block, Tag::OtherKeyword, "replace", or)?;
    Ok(())
}

fn convert_table_result(tree: &mut Tree, block: NodeId, as_block: NodeId) -> ConvertResult<()> {
    let Some(returns) = tree.child_by_tag(block, Tag::DdlReturns) else {
        return Ok(());
    };
    let Some(table_name) = tree.next_sibling(returns, false) else {
        return Ok(());
    };
    let Some(table_keyword) = tree.next_sibling(table_name, false) else {
        return Ok(());
    };
    if !tree.is_text(table_keyword, Tag::OtherKeyword, "table") {
        return Ok(());
    }
    let columns = tree
        .next_sibling(table_keyword, false)
        .expected("column list of the returned table")?;

    let body = routine_body(tree, as_block)
        .and_then(|b| tree.path(b, &[Tag::Statement, Tag::Clause, Tag::BeginEndBlock, Tag::ContainerMultiStatement]))
        .expected("begin/end body of the table-returning function")?;

    // create temp table @t (...) ahead of the body
    let create = tree.create(Tag::Statement, "");
    let clause = tree.append(create, Tag::Clause, "");
    tree.append(clause, Tag::OtherKeyword, "create");
    tree.append(clause, Tag::OtherKeyword, "temp");
    tree.append(clause, Tag::OtherKeyword, "table");
    tree.move_to(clause, table_name)?;
    let columns_copy = tree.deep_clone(columns);
    tree.add_child(clause, columns_copy)?;
    tree.append(clause, Tag::Semicolon, ";");
    match tree.children(body).first().copied() {
        Some(first) => tree.insert_before(body, create, first)?,
        None => tree.add_child(body, create)?,
    }

    // return @t -> return query select * from @t
    let return_statement = tree
        .children(body)
        .iter()
        .copied()
        .find(|s| {
            tree.first_significant_child(*s)
                .is_some_and(|c| tree.child_with_text(c, Tag::OtherKeyword, "return").is_some())
        })
        .expected("return statement of the table-returning function")?;
    let return_clause = tree
        .first_significant_child(return_statement)
        .expected("return clause")?;
    let return_keyword = tree
        .child_with_text(return_clause, Tag::OtherKeyword, "return")
        .expected("return keyword")?;
    if let Some(variable) = tree.next_sibling(return_keyword, false) {
        if !tree.is(variable, Tag::Semicolon) {
            tree.remove_child(return_clause, variable)?;
        }
    }
    let semicolon = tree.child_by_tag(return_clause, Tag::Semicolon);
    if let Some(semicolon) = semicolon {
        tree.detach(semicolon);
    }
    tree.insert_new_after(return_clause, Tag::OtherKeyword, "query", return_keyword)?;

    let select = tree.append(return_statement, Tag::Clause, "");
    tree.append(select, Tag::OtherKeyword, "select");
    tree.append(select, Tag::Asterisk, "*");
    let from = tree.append(return_statement, Tag::Clause, "");
    tree.append(from, Tag::OtherKeyword, "from");
    let target = tree.append(from, Tag::SelectionTarget, "");
    let name = tree.deep_clone(table_name);
    tree.add_child(target, name)?;
    if let Some(semicolon) = semicolon {
        tree.add_child(from, semicolon)?;
    }

    tracing::debug!("Table-returning function rewritten to return query");
    Ok(())
}

/// Wrap procedure parameters in a `DdlParens` container.
pub fn force_ddl_parens(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_routine(tree, |tree, block, as_block| {
        let Some(keyword) = routine_keyword(tree, block) else {
            return Ok(());
        };
        if tree.has_text(keyword, "function") {
            return Ok(());
        }

        let first = tree.next_sibling(keyword, false).expected("routine name")?;
        let name = match tree.next_sibling(first, false) {
            Some(period) if tree.is(period, Tag::Period) => {
                tree.next_sibling(period, false).expected("routine name after schema")?
            }
            _ => first,
        };

        let mut parameters: Vec<NodeId> = tree
            .siblings_after(name)
            .into_iter()
            .take_while(|n| *n != as_block)
            .collect();
        trim_whitespace(tree, &mut parameters);
        if let [only] = parameters.as_slice() {
            if tree.is(*only, Tag::DdlParens) {
                return Ok(());
            }
        }

        let parens = tree.insert_new_after(block, Tag::DdlParens, "", name)?;
        for node in parameters {
            tree.move_to(parens, node)?;
        }
        Ok(())
    })
}

/// `language plpgsql` ahead of the routine body.
pub fn add_language_clause(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_routine(tree, |tree, block, as_block| {
        let language = tree.insert_new_before(block, Tag::OtherKeyword, "language", as_block)?;
        tree.insert_new_after(block, Tag::String, "plpgsql", language)?;
        Ok(())
    })
}

/// Routine bodies always become a single begin/end block.
pub fn force_ddl_begin_end(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_routine(tree, |tree, _block, as_block| {
        let body = routine_body(tree, as_block).expected("routine body")?;
        wrap_in_begin_end(tree, body)
    })
}

/// Quote the routine body with `$$ ... $$;`.
pub fn add_block_wrapper(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_routine(tree, |tree, _block, as_block| {
        let open = tree
            .child_by_tag(as_block, Tag::ContainerOpen)
            .expected("as keyword of the routine")?;
        tree.append(open, Tag::OtherKeyword, "$$");
        let close = tree.append(as_block, Tag::ContainerClose, "");
        tree.append(close, Tag::OtherKeyword, "$$");
        tree.append(close, Tag::Semicolon, ";");
        Ok(())
    })
}

/// Plain selects inside a procedure return result sets to the caller. Each
/// one is opened on a named cursor instead, declared as `_select<n>` with the
/// cursor name `<routine>_select<n>`, lowercased to match the call site.
pub fn capture_result_sets(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_routine(tree, |tree, block, as_block| {
        let routine = routine_name(tree, block)?.to_lowercase();
        let mut counter = 0usize;
        walk(tree, as_block, &mut |tree, id| {
            if tree.is_text(id, Tag::OtherKeyword, "select") {
                capture_select(tree, id, &routine, &mut counter)?;
            }
            Ok(Visit::Descend)
        })
    })
}

/// Name of a routine, without schema: the token before its parameter list.
pub fn routine_name(tree: &Tree, block: NodeId) -> ConvertResult<String> {
    let parens = tree
        .child_by_tag(block, Tag::DdlParens)
        .expected("parameter list of the routine")?;
    let name = tree
        .previous_sibling(parens)
        .expected("routine name before its parameters")?;
    Ok(tree.text(name).to_string())
}

fn capture_select(tree: &mut Tree, keyword: NodeId, routine: &str, counter: &mut usize) -> ConvertResult<()> {
    let Some(select_clause) = tree.parent(keyword) else {
        return Ok(());
    };
    let Some(statement) = tree.parent(select_clause) else {
        return Ok(());
    };
    if !tree.is(statement, Tag::Statement) {
        return Ok(());
    }
    if tree.child_by_tag(statement, Tag::Clause) != Some(select_clause) {
        return Ok(());
    }
    if tree.children(statement).iter().any(|c| {
        tree.child_with_text(*c, Tag::OtherKeyword, "into").is_some()
    }) {
        return Ok(());
    }
    if select_columns(tree, select_clause)
        .iter()
        .any(|column| is_variable_assignment(tree, column))
    {
        return Ok(());
    }
    let container = tree.parent(statement).expected("statement container")?;

    *counter += 1;
    let handle = format!("_select{}", counter);

    let open = tree.insert_new_before(statement, Tag::Clause, "", select_clause)?;
    tree.append(open, Tag::OtherKeyword, "open");
    tree.append(open, Tag::OtherNode, &handle);
    tree.append(open, Tag::OtherKeyword, "for");

    let declare = tree.insert_new_before(container, Tag::Statement, "", statement)?;
    let clause = tree.append(declare, Tag::Clause, "");
    let block = tree.append(clause, Tag::DdlDeclareBlock, "");
    tree.append(block, Tag::OtherKeyword, "declare");
    tree.append(block, Tag::OtherNode, &handle);
    tree.append(block, Tag::DataTypeKeyword, "refcursor");
    tree.append(block, Tag::EqualsSign, "=");
    tree.append(block, Tag::String, &format!("{}{}", routine, handle));

    tracing::debug!("Result set {} of {} captured in a cursor", counter, routine);
    Ok(())
}

/// Every `DdlAsBlock` below the root, for passes that need the list upfront.
pub fn routine_as_blocks(tree: &mut Tree) -> ConvertResult<Vec<NodeId>> {
    let mut blocks = Vec::new();
    for_each_match(tree, Tag::DdlProceduralBlock, None, |tree, id| {
        if let Some(as_block) = routine_as_block(tree, id) {
            blocks.push(as_block);
        }
        Ok(())
    })?;
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{notation, render::compact};
    use pretty_assertions::assert_eq;

    const PROCEDURE: &str = r#"(Root (Statement (Clause (DdlProceduralBlock
        (OtherKeyword "alter") (WhiteSpace " ") (OtherKeyword "procedure") (WhiteSpace " ")
        (OtherNode "dbo") (Period ".") (OtherNode "GetUsers") (WhiteSpace " ")
        (OtherNode "@active") (WhiteSpace " ") (DataTypeKeyword "bit") (WhiteSpace "\n")
        (DdlAsBlock
            (ContainerOpen (OtherKeyword "as"))
            (ContainerGeneralContent
                (Statement (Clause (OtherKeyword "select") (WhiteSpace " ") (Asterisk "*"))
                           (Clause (OtherKeyword "from") (WhiteSpace " ") (SelectionTarget (OtherNode "users")) (Semicolon ";")))))))))"#;

    fn run(tree: &mut Tree, passes: &[crate::passes::PassFn]) {
        let mut ctx = PassContext::default();
        for pass in passes {
            pass(tree, &mut ctx).unwrap();
        }
    }

    #[test]
    fn test_procedure_header_shaping() {
        let mut tree = notation::parse(PROCEDURE).unwrap();
        run(
            &mut tree,
            &[convert_procedural_blocks, force_ddl_parens, add_language_clause, force_ddl_begin_end, add_block_wrapper],
        );
        let root = tree.root();
        assert_eq!(
            compact(&tree, root),
            "create or replace procedure dbo.GetUsers(@active bit) language 'plpgsql' as $$ begin select * from users; end $$;"
        );
    }

    #[test]
    fn test_existing_parameter_parens_are_kept() {
        let mut tree = notation::parse(
            r#"(Clause (DdlProceduralBlock (OtherKeyword "create") (OtherKeyword "proc") (OtherNode "p")
                (DdlParens (OtherNode "@a") (DataTypeKeyword "int"))
                (DdlAsBlock (ContainerOpen (OtherKeyword "as")) (ContainerGeneralContent))))"#,
        )
        .unwrap();
        run(&mut tree, &[force_ddl_parens]);
        let block = tree.child_by_tag(tree.root(), Tag::DdlProceduralBlock).unwrap();
        assert_eq!(tree.children_by_tag(block, Tag::DdlParens).len(), 1);
        let root = tree.root();
        assert_eq!(compact(&tree, root), "create proc p(@a int) as");
    }

    #[test]
    fn test_capture_result_sets() {
        let mut tree = notation::parse(PROCEDURE).unwrap();
        run(&mut tree, &[force_ddl_parens, force_ddl_begin_end, capture_result_sets]);
        let body = tree
            .descendants(tree.root())
            .into_iter()
            .find(|n| tree.is(*n, Tag::ContainerMultiStatement))
            .unwrap();
        let statements = tree.children_by_tag(body, Tag::Statement);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            compact(&tree, statements[0]),
            "declare _select1 refcursor = 'getusers_select1'"
        );
        assert_eq!(compact(&tree, statements[1]), "open _select1 for select * from users;");
    }

    #[test]
    fn test_select_with_assignment_is_not_captured() {
        let mut tree = notation::parse(
            r#"(Clause (DdlProceduralBlock (OtherKeyword "create") (OtherKeyword "procedure") (OtherNode "p")
                (DdlParens)
                (DdlAsBlock (ContainerOpen (OtherKeyword "as")) (ContainerGeneralContent
                    (Statement (Clause (OtherKeyword "select") (OtherNode "@x") (EqualsSign "=") (NumberValue "1")))))))"#,
        )
        .unwrap();
        run(&mut tree, &[capture_result_sets]);
        assert!(!compact(&tree, tree.root()).contains("open"));
    }

    #[test]
    fn test_table_returning_function() {
        let mut tree = notation::parse(
            r#"(Clause (DdlProceduralBlock (OtherKeyword "create") (OtherKeyword "function") (OtherNode "f")
                (DdlParens)
                (DdlReturns (OtherKeyword "returns")) (OtherNode "@t") (OtherKeyword "table")
                (DdlParens (OtherNode "id") (DataTypeKeyword "int"))
                (DdlAsBlock (ContainerOpen (OtherKeyword "as")) (ContainerGeneralContent
                    (Statement (Clause (BeginEndBlock
                        (ContainerOpen (OtherKeyword "begin"))
                        (ContainerMultiStatement
                            (Statement (Clause (OtherKeyword "return") (WhiteSpace " ") (OtherNode "@t") (Semicolon ";"))))
                        (ContainerClose (OtherKeyword "end")))))))))"#,
        )
        .unwrap();
        run(&mut tree, &[convert_procedural_blocks]);
        let root = tree.root();
        assert_eq!(
            compact(&tree, root),
            "create function f() returns table(id int) as begin create temp table @t(id int); return query select * from @t; end"
        );
    }
}
