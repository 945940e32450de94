//! Conditionals and loops.

use super::{PassContext, Visit, walk, wrap_in_begin_end};
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

const BLOCK_PATH: &[Tag] = &[
    Tag::ContainerSingleStatement,
    Tag::Statement,
    Tag::Clause,
    Tag::BeginEndBlock,
];

const NESTED_IF_PATH: &[Tag] = &[
    Tag::ContainerSingleStatement,
    Tag::Statement,
    Tag::Clause,
    Tag::IfStatement,
];

/// `if object_id(...) is not null drop table #t` becomes `drop table if exists #t`.
pub fn convert_guarded_drop(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if !tree.is(id, Tag::IfStatement) {
            return Ok(Visit::Descend);
        }
        let checks_object = tree
            .child_by_tag(id, Tag::BooleanExpression)
            .and_then(|c| tree.child_with_text(c, Tag::FunctionKeyword, "object_id"))
            .is_some();
        let drop_clause = tree
            .path(id, &[Tag::ContainerSingleStatement, Tag::Statement, Tag::Clause])
            .filter(|c| tree.child_with_text(*c, Tag::OtherKeyword, "drop").is_some());
        let (true, Some(drop_clause)) = (checks_object, drop_clause) else {
            return Ok(Visit::Descend);
        };
        if tree.child_by_tag(id, Tag::ElseClause).is_some() {
            return Ok(Visit::Descend);
        }

        let table = tree
            .child_by_tag(drop_clause, Tag::OtherNode)
            .expected("dropped table name")?;
        tree.insert_new_before(drop_clause, Tag::OtherKeyword, "if", table)?;
        tree.insert_new_before(drop_clause, Tag::OtherKeyword, "exists", table)?;

        let drop_statement = tree.parent(drop_clause).expected("drop statement")?;
        let if_statement = tree
            .parent(id)
            .and_then(|clause| tree.parent(clause))
            .expected("statement holding the if")?;
        let container = tree.parent(if_statement).expected("statement container")?;
        tree.move_after(container, drop_statement, if_statement)?;
        tree.remove_child(container, if_statement)?;

        tracing::debug!("Guarded drop rewritten to drop if exists");
        Ok(Visit::Skip)
    })
}

/// Single statement branches get an explicit begin/end block, except an
/// else branch holding a nested if, which becomes `elsif`.
pub fn force_if_begin_end(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        match tree.tag(id) {
            Tag::IfStatement => {
                if let Some(container) = tree.child_by_tag(id, Tag::ContainerSingleStatement) {
                    wrap_in_begin_end(tree, container)?;
                }
            }
            Tag::ElseClause => {
                let container = tree.child_by_tag(id, Tag::ContainerSingleStatement);
                if let (Some(container), None) = (container, tree.path(id, NESTED_IF_PATH)) {
                    wrap_in_begin_end(tree, container)?;
                }
            }
            _ => {}
        }
        Ok(Visit::Descend)
    })
}

/// `if c begin ... end else begin ... end` becomes `if c then ... else ... end if;`.
pub fn convert_conditions(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if matches!(tree.tag(id), Tag::IfStatement | Tag::ElseClause) {
            convert_condition(tree, id)?;
        }
        Ok(Visit::Descend)
    })
}

fn convert_condition(tree: &mut Tree, element: NodeId) -> ConvertResult<()> {
    let is_else = tree.is(element, Tag::ElseClause);

    let Some(block) = tree.path(element, BLOCK_PATH) else {
        if !is_else {
            return Ok(());
        }
        let keyword = tree
            .path(element, &[Tag::ContainerOpen, Tag::OtherKeyword])
            .expected("else keyword")?;
        tree.set_text(keyword, "elsif");
        let nested = tree.path(element, NESTED_IF_PATH).expected("nested if of the else branch")?;
        if let Some(open) = tree.child_by_tag(nested, Tag::ContainerOpen) {
            tree.remove_child(nested, open)?;
        }
        return Ok(());
    };

    let open = tree.child_by_tag(block, Tag::ContainerOpen).expected("begin of the branch")?;
    if is_else {
        tree.remove_child(block, open)?;
    } else {
        let begin = tree.children(open).first().copied().expected("begin keyword")?;
        tree.set_text(begin, "then");
    }

    let close = tree.child_by_tag(block, Tag::ContainerClose).expected("end of the branch")?;
    if tree.child_by_tag(element, Tag::ElseClause).is_some() {
        tree.remove_child(block, close)?;
    } else {
        close_block(tree, close, "end if")?;
    }
    Ok(())
}

/// Rename the keyword of a block closer and terminate it.
fn close_block(tree: &mut Tree, close: NodeId, keyword: &str) -> ConvertResult<()> {
    let end = tree.children(close).first().copied().expected("end keyword")?;
    tree.set_text(end, keyword);
    if tree.child_by_tag(close, Tag::Semicolon).is_none() {
        tree.append(close, Tag::Semicolon, ";");
    }
    Ok(())
}

/// `while c begin ... end` becomes `while c loop ... end loop;`.
pub fn convert_loops(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if !tree.is(id, Tag::WhileLoop) {
            return Ok(Visit::Descend);
        }
        if let Some(container) = tree.child_by_tag(id, Tag::ContainerSingleStatement) {
            wrap_in_begin_end(tree, container)?;
        }
        let block = tree.path(id, BLOCK_PATH).expected("body of the loop")?;
        let begin = tree
            .path(block, &[Tag::ContainerOpen, Tag::OtherKeyword])
            .expected("begin keyword of the loop")?;
        tree.set_text(begin, "loop");
        let close = tree.child_by_tag(block, Tag::ContainerClose).expected("end of the loop")?;
        close_block(tree, close, "end loop")?;
        Ok(Visit::Descend)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{notation, render::compact};
    use pretty_assertions::assert_eq;

    fn run(tree: &mut Tree, passes: &[crate::passes::PassFn]) {
        let mut ctx = PassContext::default();
        for pass in passes {
            pass(tree, &mut ctx).unwrap();
        }
    }

    const IF_ELSE: &str = r#"(Root (Statement (Clause (IfStatement
        (ContainerOpen (OtherKeyword "if"))
        (BooleanExpression (OtherNode "@x") (OtherOperator ">") (NumberValue "0"))
        (ContainerSingleStatement (Statement (Clause (OtherNode "@y") (EqualsSign ":=") (NumberValue "1") (Semicolon ";"))))
        (ElseClause
            (ContainerOpen (OtherKeyword "else"))
            (ContainerSingleStatement (Statement (Clause (OtherNode "@y") (EqualsSign ":=") (NumberValue "2") (Semicolon ";")))))))))"#;

    #[test]
    fn test_if_else_becomes_then_end_if() {
        let mut tree = notation::parse(IF_ELSE).unwrap();
        run(&mut tree, &[force_if_begin_end, convert_conditions]);
        assert_eq!(
            compact(&tree, tree.root()),
            "if @x > 0 then @y := 1; else @y := 2; end if;"
        );
    }

    #[test]
    fn test_else_if_becomes_elsif() {
        let mut tree = notation::parse(
            r#"(Root (Statement (Clause (IfStatement
                (ContainerOpen (OtherKeyword "if"))
                (BooleanExpression (OtherNode "@a"))
                (ContainerSingleStatement (Statement (Clause (OtherKeyword "return") (Semicolon ";"))))
                (ElseClause
                    (ContainerOpen (OtherKeyword "else"))
                    (ContainerSingleStatement (Statement (Clause (IfStatement
                        (ContainerOpen (OtherKeyword "if"))
                        (BooleanExpression (OtherNode "@b"))
                        (ContainerSingleStatement (Statement (Clause (OtherKeyword "return") (Semicolon ";")))))))))))))"#,
        )
        .unwrap();
        run(&mut tree, &[force_if_begin_end, convert_conditions]);
        assert_eq!(
            compact(&tree, tree.root()),
            "if @a then return; elsif @b then return; end if;"
        );
    }

    #[test]
    fn test_guarded_drop() {
        let mut tree = notation::parse(
            r##"(Root (Statement (Clause (IfStatement
                (ContainerOpen (OtherKeyword "if"))
                (BooleanExpression (FunctionKeyword "object_id") (FunctionParens (String "tempdb..#t"))
                    (OtherKeyword "is") (OtherKeyword "not") (OtherKeyword "null"))
                (ContainerSingleStatement (Statement (Clause
                    (OtherKeyword "drop") (OtherKeyword "table") (OtherNode "#t") (Semicolon ";"))))))))"##,
        )
        .unwrap();
        run(&mut tree, &[convert_guarded_drop]);
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 1);
        assert_eq!(compact(&tree, root), "drop table if exists #t;");
    }

    #[test]
    fn test_while_loop() {
        let mut tree = notation::parse(
            r#"(Root (Statement (Clause (WhileLoop
                (ContainerOpen (OtherKeyword "while"))
                (BooleanExpression (OtherNode "@i") (OtherOperator "<") (NumberValue "10"))
                (ContainerSingleStatement (Statement (Clause (BeginEndBlock
                    (ContainerOpen (OtherKeyword "begin"))
                    (ContainerMultiStatement (Statement (Clause (OtherNode "@i") (EqualsSign ":=")
                        (OtherNode "@i") (OtherOperator "+") (NumberValue "1") (Semicolon ";"))))
                    (ContainerClose (OtherKeyword "end"))))))))))"#,
        )
        .unwrap();
        run(&mut tree, &[convert_loops]);
        assert_eq!(
            compact(&tree, tree.root()),
            "while @i < 10 loop @i := @i + 1; end loop;"
        );
    }
}
