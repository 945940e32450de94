//! Select statement rewrites.

use super::{PassContext, for_each_match, is_variable_assignment, select_columns};
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

/// Rewrite every select clause: `select ... into #t` becomes
/// `create temp table`, `@v = expr` columns select into variables,
/// `alias = expr` becomes `expr as alias` and `top n` becomes `limit n`.
pub fn update_select_statements(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherKeyword, Some("select"), |tree, keyword| {
        let Some(clause) = tree.parent(keyword) else {
            return Ok(());
        };
        if tree.parent(clause).is_none() {
            return Ok(());
        }
        select_into_table(tree, clause)?;
        select_into_variables(tree, clause)?;
        equals_to_as(tree, clause)?;
        top_to_limit(tree, clause)
    })
}

fn select_into_table(tree: &mut Tree, select: NodeId) -> ConvertResult<()> {
    let statement = tree.parent(select).expected("select statement")?;
    let Some(into) = tree
        .next_sibling(select, false)
        .filter(|c| tree.child_with_text(*c, Tag::OtherKeyword, "into").is_some())
    else {
        return Ok(());
    };
    let name = tree
        .children(into)
        .iter()
        .copied()
        .find(|n| tree.is_name(*n))
        .expected("target table of select into")?;
    let name = tree.text(name).to_string();

    tree.remove_child(statement, into)?;
    let create = tree.insert_new_before(statement, Tag::Clause, "", select)?;
    for keyword in ["create", "temp", "table"] {
        tree.append(create, Tag::OtherKeyword, keyword);
    }
    tree.append(create, Tag::OtherNode, &name);
    tree.append(create, Tag::OtherKeyword, "as");
    tracing::debug!("Select into {} rewritten to create table as", name);
    Ok(())
}

fn select_into_variables(tree: &mut Tree, select: NodeId) -> ConvertResult<()> {
    if let Some(semicolon) = tree.child_by_tag(select, Tag::Semicolon) {
        tree.remove_child(select, semicolon)?;
    }

    let names: Vec<String> = select_columns(tree, select)
        .into_iter()
        .filter(|column| is_variable_assignment(tree, column))
        .filter_map(|column| column.into_iter().find(|n| tree.is_name(*n)))
        .map(|n| tree.text(n).to_string())
        .collect();
    if names.is_empty() {
        return Ok(());
    }

    let statement = tree.parent(select).expected("select statement")?;
    let into = tree.insert_new_after(statement, Tag::Clause, "", select)?;
    tree.append(into, Tag::OtherKeyword, "into");
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            tree.append(into, Tag::Comma, ",");
        }
        tree.append(into, Tag::OtherNode, name);
    }
    Ok(())
}

fn equals_to_as(tree: &mut Tree, select: NodeId) -> ConvertResult<()> {
    for column in select_columns(tree, select) {
        let Some(split) = column.iter().position(|n| tree.is(*n, Tag::EqualsSign)) else {
            continue;
        };
        let equals = column[split];
        let name = column
            .iter()
            .copied()
            .find(|n| tree.is_name(*n))
            .expected("column alias before =")?;
        let value: Vec<NodeId> = column[split + 1..]
            .iter()
            .copied()
            .filter(|n| !tree.is_comment(*n))
            .collect();

        tree.remove_child(select, name)?;
        for node in value {
            tree.move_before(select, node, equals)?;
        }
        tree.insert_after(select, name, equals)?;
        tree.set_tag(equals, Tag::OtherKeyword);
        tree.set_text(equals, "as");
    }
    Ok(())
}

fn top_to_limit(tree: &mut Tree, select: NodeId) -> ConvertResult<()> {
    let Some(top) = tree.child_with_text(select, Tag::OtherKeyword, "top") else {
        return Ok(());
    };
    let value = tree.next_sibling(top, false).expected("row count after top")?;
    tree.remove_child(select, top)?;
    tree.remove_child(select, value)?;

    let statement = tree.parent(select).expected("select statement")?;
    let last = tree
        .last_child_by_tag(statement, Tag::Clause)
        .expected("last clause of the select")?;
    let semicolon = tree.find_terminating_semicolon(last);
    if let Some(semicolon) = semicolon {
        tree.detach(semicolon);
    }

    let limit = tree.append(statement, Tag::Clause, "");
    tree.append(limit, Tag::OtherKeyword, "limit");
    tree.add_child(limit, value)?;
    if let Some(semicolon) = semicolon {
        tree.add_child(limit, semicolon)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{notation, render::compact};
    use pretty_assertions::assert_eq;

    fn convert(source: &str) -> String {
        let mut tree = notation::parse(source).unwrap();
        let mut ctx = PassContext::default();
        update_select_statements(&mut tree, &mut ctx).unwrap();
        compact(&tree, tree.root())
    }

    #[test]
    fn test_top_becomes_limit() {
        let out = convert(
            r#"(Statement
                (Clause (OtherKeyword "select") (WhiteSpace " ") (OtherKeyword "top") (WhiteSpace " ")
                    (NumberValue "5") (WhiteSpace " ") (Asterisk "*"))
                (Clause (OtherKeyword "from") (WhiteSpace " ") (SelectionTarget (OtherNode "t")) (Semicolon ";")))"#,
        );
        assert_eq!(out, "select * from t limit 5;");
    }

    #[test]
    fn test_variable_assignment_selects_into() {
        let out = convert(
            r#"(Statement
                (Clause (OtherKeyword "select") (WhiteSpace " ") (OtherNode "@a") (WhiteSpace " ")
                    (EqualsSign "=") (WhiteSpace " ") (OtherNode "x") (Comma ",") (WhiteSpace " ")
                    (OtherNode "@b") (EqualsSign "=") (OtherNode "y"))
                (Clause (OtherKeyword "from") (SelectionTarget (OtherNode "t")) (Semicolon ";")))"#,
        );
        assert_eq!(out, "select x as @a, y as @b into @a, @b from t;");
    }

    #[test]
    fn test_alias_equals_becomes_as() {
        let out = convert(
            r#"(Statement (Clause (OtherKeyword "select") (WhiteSpace " ") (OtherNode "total")
                (EqualsSign "=") (OtherNode "a") (OtherOperator "+") (OtherNode "b") (CommentMultiLine " sum ")))"#,
        );
        assert_eq!(out, "select a + b as total /* sum */");
    }

    #[test]
    fn test_select_into_temp_table() {
        let out = convert(
            r##"(Statement
                (Clause (OtherKeyword "select") (Asterisk "*"))
                (Clause (OtherKeyword "into") (OtherNode "#recent"))
                (Clause (OtherKeyword "from") (SelectionTarget (OtherNode "orders")) (Semicolon ";")))"##,
        );
        assert_eq!(out, "create temp table #recent as select * from orders;");
    }
}
