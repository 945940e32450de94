//! Table variables and table-typed parameters.
//!
//! Inline table variables become temp tables. Parameters and variables of a
//! table type become arrays of that type, which are read with `unnest` and
//! appended to with `array_cat`.

use super::{PassContext, Visit, for_each_match, walk};
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

/// Array name used for the rows being appended.
const ROW_ALIAS: &str = "_t";

/// `@p dbo.Items readonly` becomes `@p Items[]`; `declare @t table (...)`
/// becomes `create temp table _t (...)`.
pub fn convert_table_variables(tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if tree.is(id, Tag::DdlParens) {
            convert_readonly_parameters(tree, ctx, id)?;
        } else if tree.is_text(id, Tag::OtherKeyword, "table")
            && tree.parent(id).is_some_and(|p| tree.is(p, Tag::DdlDeclareBlock))
        {
            convert_table_declaration(tree, id)?;
        }
        Ok(Visit::Descend)
    })
}

fn convert_readonly_parameters(tree: &mut Tree, ctx: &mut PassContext, parens: NodeId) -> ConvertResult<()> {
    let markers: Vec<NodeId> = tree
        .children(parens)
        .iter()
        .copied()
        .filter(|c| tree.has_text(*c, "readonly") && matches!(tree.tag(*c), Tag::OtherNode | Tag::OtherKeyword))
        .collect();

    for readonly in markers {
        let Some(type_name) = tree.previous_sibling(readonly) else {
            continue;
        };
        let Some(period) = tree.prev_adjacent(type_name).filter(|p| tree.is(*p, Tag::Period)) else {
            continue;
        };
        let Some(schema) = tree.prev_adjacent(period) else {
            continue;
        };

        tree.remove_child(parens, schema)?;
        tree.remove_child(parens, period)?;
        tree.remove_child(parens, readonly)?;
        tree.insert_new_after(parens, Tag::Period, "[]", type_name)?;

        if let Some(parameter) = tree.previous_sibling(type_name) {
            tracing::debug!("Table-typed parameter {} becomes an array", tree.text(parameter));
            ctx.array_variables.push(tree.text(parameter).to_string());
        }
    }
    Ok(())
}

fn convert_table_declaration(tree: &mut Tree, table: NodeId) -> ConvertResult<()> {
    let block = tree.parent(table).expected("declaration block")?;
    tree.set_tag(block, Tag::DdlOtherBlock);
    let declare = tree
        .child_with_text(block, Tag::OtherKeyword, "declare")
        .expected("declare keyword")?;
    tree.set_text(declare, "create");
    tree.insert_new_after(block, Tag::OtherKeyword, "temp", declare)?;

    let name = tree.previous_sibling(table).expected("table variable name")?;
    let renamed = tree.text(name).replace('@', "_");
    tree.set_text(name, renamed);
    tree.move_after(block, name, table)
}

/// Array variables used as a selection target are read through `unnest`.
pub fn unnest_arrays(tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
    if ctx.array_variables.is_empty() {
        return Ok(());
    }
    for_each_match(tree, Tag::SelectionTarget, None, |tree, target| {
        let Some(name) = tree.first_significant_child(target) else {
            return Ok(());
        };
        if !tree.is(name, Tag::OtherNode) || !ctx.is_array_variable(tree.text(name)) {
            return Ok(());
        }
        tree.insert_new_before(target, Tag::FunctionKeyword, "unnest", name)?;
        let parens = tree.insert_new_before(target, Tag::FunctionParens, "", name)?;
        tree.move_to(parens, name)
    })
}

/// `insert into @arr ...` becomes `@arr := array_cat(@arr, (select array_agg(_t) from (...) _t))`.
pub fn insert_into_arrays(tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
    if ctx.array_variables.is_empty() {
        return Ok(());
    }
    for_each_match(tree, Tag::OtherKeyword, Some("insert"), |tree, keyword| {
        let Some(insert_clause) = tree.closest_ancestor(keyword, Tag::Clause) else {
            return Ok(());
        };
        let Some(table) = tree.child_by_tag(insert_clause, Tag::OtherNode) else {
            return Ok(());
        };
        if !ctx.is_array_variable(tree.text(table)) {
            return Ok(());
        }
        let statement = tree.parent(insert_clause).expected("insert statement")?;
        let container = tree.parent(statement).expected("statement container")?;

        if let Some(semicolon) = tree.find_terminating_semicolon(statement) {
            tree.detach(semicolon);
        }

        let tail = tree.siblings_after(insert_clause);
        let values = tail
            .iter()
            .copied()
            .find(|c| tree.child_with_text(*c, Tag::OtherKeyword, "values").is_some());
        match values {
            Some(values) => {
                let nodes = tree.snapshot(values);
                tree.append(values, Tag::OtherKeyword, "from");
                let target = tree.append(values, Tag::SelectionTarget, "");
                let parens = tree.append(target, Tag::SelectionTargetParens, "");
                let rows = tree.append(parens, Tag::Clause, "");
                for node in nodes {
                    tree.move_to(rows, node)?;
                }
                tree.append(target, Tag::OtherNode, ROW_ALIAS);
            }
            None => {
                let wrapper = tree.insert_new_after(statement, Tag::Clause, "", insert_clause)?;
                tree.append(wrapper, Tag::OtherKeyword, "from");
                let parens = tree.append(wrapper, Tag::SelectionTargetParens, "");
                tree.append(wrapper, Tag::OtherNode, ROW_ALIAS);
                for clause in tail {
                    tree.move_to(parens, clause)?;
                }
            }
        }

        let assign = tree.insert_new_before(container, Tag::Statement, "", statement)?;
        let clause = tree.append(assign, Tag::Clause, "");
        let target = tree.deep_clone(table);
        tree.add_child(clause, target)?;
        tree.append(clause, Tag::EqualsSign, ":=");
        tree.append(clause, Tag::FunctionKeyword, "array_cat");
        let concat = tree.append(clause, Tag::FunctionParens, "");
        let current = tree.deep_clone(table);
        tree.add_child(concat, current)?;
        tree.append(concat, Tag::Comma, ",");
        let rows = tree.append(concat, Tag::ExpressionParens, "");
        let aggregate = tree.append(rows, Tag::Clause, "");
        tree.append(aggregate, Tag::OtherKeyword, "select");
        tree.append(aggregate, Tag::FunctionKeyword, "array_agg");
        let aggregate_parens = tree.append(aggregate, Tag::FunctionParens, "");
        tree.append(aggregate_parens, Tag::OtherNode, ROW_ALIAS);
        for node in tree.siblings_after(insert_clause) {
            let copy = tree.deep_clone(node);
            tree.add_child(rows, copy)?;
        }
        tree.append(clause, Tag::Semicolon, ";");

        tree.remove_child(container, statement)?;
        tracing::debug!("Insert into array {} rewritten to array_cat", tree.text(table));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{notation, render::compact};
    use pretty_assertions::assert_eq;

    fn context_with_arrays(names: &[&str]) -> PassContext {
        PassContext {
            array_variables: names.iter().map(|n| n.to_string()).collect(),
            ..PassContext::default()
        }
    }

    #[test]
    fn test_readonly_parameter_becomes_array() {
        let mut tree = notation::parse(
            r#"(DdlParens (OtherNode "@items") (WhiteSpace " ") (OtherNode "dbo") (Period ".")
                (OtherNode "ItemList") (WhiteSpace " ") (OtherNode "READONLY"))"#,
        )
        .unwrap();
        let mut ctx = PassContext::default();
        convert_table_variables(&mut tree, &mut ctx).unwrap();
        assert_eq!(compact(&tree, tree.root()), "(@items ItemList[])");
        assert!(ctx.is_array_variable("@ITEMS"));
    }

    #[test]
    fn test_table_variable_becomes_temp_table() {
        let mut tree = notation::parse(
            r#"(Clause (DdlDeclareBlock (OtherKeyword "declare") (WhiteSpace " ") (OtherNode "@t")
                (WhiteSpace " ") (OtherKeyword "table") (DdlParens (OtherNode "id") (WhiteSpace " ") (DataTypeKeyword "int"))))"#,
        )
        .unwrap();
        let mut ctx = PassContext::default();
        convert_table_variables(&mut tree, &mut ctx).unwrap();
        let block = tree.child_by_tag(tree.root(), Tag::DdlOtherBlock).unwrap();
        assert_eq!(compact(&tree, block), "create temp table _t(id int)");
        assert!(ctx.array_variables.is_empty());
    }

    #[test]
    fn test_unnest_array_target() {
        let mut tree = notation::parse(
            r#"(Clause (OtherKeyword "from") (WhiteSpace " ")
                (SelectionTarget (OtherNode "@items") (WhiteSpace " ") (OtherNode "i")))"#,
        )
        .unwrap();
        let mut ctx = context_with_arrays(&["@items"]);
        unnest_arrays(&mut tree, &mut ctx).unwrap();
        assert_eq!(compact(&tree, tree.root()), "from unnest(@items) i");
    }

    #[test]
    fn test_insert_values_into_array() {
        let mut tree = notation::parse(
            r#"(Root (Statement
                (Clause (OtherKeyword "insert") (WhiteSpace " ") (OtherKeyword "into") (WhiteSpace " ") (OtherNode "@items"))
                (Clause (OtherKeyword "values") (WhiteSpace " ")
                    (ExpressionParens (NumberValue "1") (Comma ",") (WhiteSpace " ") (NumberValue "2")) (Semicolon ";"))))"#,
        )
        .unwrap();
        let mut ctx = context_with_arrays(&["@items"]);
        insert_into_arrays(&mut tree, &mut ctx).unwrap();
        assert_eq!(
            compact(&tree, tree.root()),
            "@items := array_cat(@items, (select array_agg(_t) from (values (1, 2)) _t));"
        );
    }

    #[test]
    fn test_insert_select_into_array() {
        let mut tree = notation::parse(
            r#"(Root (Statement
                (Clause (OtherKeyword "insert") (OtherNode "@ids"))
                (Clause (OtherKeyword "select") (OtherNode "id"))
                (Clause (OtherKeyword "from") (SelectionTarget (OtherNode "users")) (Semicolon ";"))))"#,
        )
        .unwrap();
        let mut ctx = context_with_arrays(&["@ids"]);
        insert_into_arrays(&mut tree, &mut ctx).unwrap();
        assert_eq!(
            compact(&tree, tree.root()),
            "@ids := array_cat(@ids, (select array_agg(_t) from (select id from users) _t));"
        );
    }

    #[test]
    fn test_insert_into_plain_table_is_untouched() {
        let source = r#"(Root (Statement (Clause (OtherKeyword "insert") (OtherNode "users"))
            (Clause (OtherKeyword "values") (ExpressionParens (NumberValue "1")))))"#;
        let mut tree = notation::parse(source).unwrap();
        let mut ctx = context_with_arrays(&["@ids"]);
        insert_into_arrays(&mut tree, &mut ctx).unwrap();
        assert_eq!(compact(&tree, tree.root()), "insert users values (1)");
    }
}
