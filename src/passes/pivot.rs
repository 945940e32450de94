//! PIVOT and UNPIVOT.
//!
//! A pivot becomes filtered aggregates, one per pivoted column, grouped by
//! the remaining columns. An unpivot becomes a derived table unnesting the
//! column names and values in parallel.

use super::{PassContext, for_each_match, select_columns};
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

/// Output name of a select column: the last identifier in it.
fn column_name(tree: &Tree, column: &[NodeId]) -> Option<NodeId> {
    column.iter().rev().copied().find(|n| tree.is_name(*n))
}

/// `select id, [a] from t pivot (sum(v) for k in ([a])) p` becomes
/// `select id, sum(v) filter (where k = 'a') as [a] from t group by 1`.
pub fn convert_pivot(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherNode, Some("pivot"), |tree, pivot| {
        let Some(pivot_clause) = tree.parent(pivot) else {
            return Ok(());
        };
        let parens = tree.next_sibling(pivot, false).expected("pivot definition")?;
        let list = tree
            .child_by_tag(parens, Tag::InParens)
            .expected("pivoted column list")?;
        let pivoted: Vec<String> = tree
            .children(list)
            .iter()
            .filter(|n| tree.is_name(**n))
            .map(|n| tree.text(*n).to_lowercase())
            .collect();
        let for_keyword = tree
            .child_with_text(parens, Tag::OtherKeyword, "for")
            .expected("for keyword of the pivot")?;
        let aggregate: Vec<NodeId> = tree
            .children(parens)
            .iter()
            .copied()
            .take_while(|n| *n != for_keyword)
            .filter(|n| !tree.is_whitespace(*n))
            .collect();
        let source = tree
            .next_sibling(for_keyword, false)
            .expected("pivot source column")?;

        let statement = tree.parent(pivot_clause).expected("pivot statement")?;
        tree.remove_child(statement, pivot_clause)?;
        let select = tree
            .child_containing(statement, Tag::OtherKeyword, "select")
            .expected("select clause of the pivot")?;

        let mut grouped = Vec::new();
        for (index, column) in select_columns(tree, select).into_iter().enumerate() {
            let Some(name) = column_name(tree, &column) else {
                continue;
            };
            let name = tree.text(name).to_lowercase();
            if !pivoted.contains(&name) {
                grouped.push(index + 1);
                continue;
            }
            let first = column
                .iter()
                .copied()
                .find(|n| !tree.is_whitespace(*n))
                .expected("first token of the pivoted column")?;
            for node in &aggregate {
                let copy = tree.deep_clone(*node);
                tree.insert_before(select, copy, first)?;
            }
            tree.insert_new_before(select, Tag::FunctionKeyword, "filter", first)?;
            let filter = tree.insert_new_before(select, Tag::FunctionParens, "", first)?;
            tree.append(filter, Tag::OtherKeyword, "where");
            let column = tree.deep_clone(source);
            tree.add_child(filter, column)?;
            tree.append(filter, Tag::EqualsSign, "=");
            tree.append(filter, Tag::String, &name);
            tree.insert_new_before(select, Tag::OtherKeyword, "as", first)?;
        }

        if !grouped.is_empty() {
            add_group_by(tree, statement, &grouped)?;
        }
        tracing::debug!("Pivot over {} columns rewritten to filtered aggregates", pivoted.len());
        Ok(())
    })
}

fn add_group_by(tree: &mut Tree, statement: NodeId, positions: &[usize]) -> ConvertResult<()> {
    let anchor = ["where", "from"]
        .iter()
        .find_map(|k| tree.clause_starting_with(statement, Tag::OtherKeyword, k))
        .expected("from clause of the pivot")?;
    let semicolon = tree.find_terminating_semicolon(anchor);
    if let Some(semicolon) = semicolon {
        tree.detach(semicolon);
    }

    let group_by = tree.insert_new_after(statement, Tag::Clause, "", anchor)?;
    tree.append(group_by, Tag::CompoundKeyword, "group by");
    for (i, position) in positions.iter().enumerate() {
        if i > 0 {
            tree.append(group_by, Tag::Comma, ",");
        }
        tree.append(group_by, Tag::NumberValue, &position.to_string());
    }
    if let Some(semicolon) = semicolon {
        tree.add_child(group_by, semicolon)?;
    }
    Ok(())
}

/// `from t unpivot (val for attr in (a, b)) u` becomes
/// `from (select unnest(array['a', 'b']) as attr, unnest(array[a, b]) as val from t) u`.
pub fn convert_unpivot(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherNode, Some("unpivot"), |tree, unpivot| {
        let Some(unpivot_clause) = tree.parent(unpivot) else {
            return Ok(());
        };
        let target = tree
            .previous_sibling(unpivot_clause)
            .and_then(|c| tree.child_by_tag(c, Tag::SelectionTarget))
            .expected("selection target before unpivot")?;
        let table = tree
            .child_by_tag(target, Tag::OtherNode)
            .expected("unpivoted table")?;
        let parens = tree.next_sibling(unpivot, false).expected("unpivot definition")?;
        let fields = tree
            .child_by_tag(parens, Tag::InParens)
            .expected("unpivoted column list")?;
        let value_column = tree
            .child_by_tag(parens, Tag::OtherNode)
            .expected("value column of the unpivot")?;
        let name_column = tree
            .next_sibling(value_column, false)
            .and_then(|f| tree.next_sibling(f, false))
            .expected("name column of the unpivot")?;
        let alias = tree.next_sibling(parens, false).expected("unpivot alias")?;
        let join_on = tree.next_sibling(alias, false);

        tree.remove_child(target, table)?;
        let derived = tree.append(target, Tag::SelectionTargetParens, "");
        tree.move_to(target, alias)?;
        if let Some(join_on) = join_on {
            tree.move_to(target, join_on)?;
        }

        let select = tree.append(derived, Tag::Clause, "");
        tree.append(select, Tag::OtherKeyword, "select");
        let value_name = tree.text(value_column).to_string();
        let name_name = tree.text(name_column).to_string();
        append_unnest(tree, select, fields, true)?;
        tree.append(select, Tag::OtherKeyword, "as");
        tree.append(select, Tag::OtherNode, &name_name);
        tree.append(select, Tag::Comma, ",");
        append_unnest(tree, select, fields, false)?;
        tree.append(select, Tag::OtherKeyword, "as");
        tree.append(select, Tag::OtherNode, &value_name);

        let from = tree.append(derived, Tag::Clause, "");
        tree.append(from, Tag::OtherKeyword, "from");
        let source = tree.append(from, Tag::SelectionTarget, "");
        tree.add_child(source, table)?;

        let clause_parent = tree.parent(unpivot_clause).expected("unpivot statement")?;
        tree.remove_child(clause_parent, unpivot_clause)?;
        tracing::debug!("Unpivot rewritten to parallel unnest");
        Ok(())
    })
}

/// `unnest(array[...])` over the field list, as names or as string literals.
fn append_unnest(tree: &mut Tree, clause: NodeId, fields: NodeId, as_strings: bool) -> ConvertResult<()> {
    tree.append(clause, Tag::FunctionKeyword, "unnest");
    let parens = tree.append(clause, Tag::FunctionParens, "");
    tree.append(parens, Tag::FunctionKeyword, "array");
    tree.append(parens, Tag::Period, "[");
    for field in tree.snapshot(fields) {
        let copy = tree.deep_clone(field);
        if as_strings && tree.is_name(copy) {
            tree.set_tag(copy, Tag::String);
        }
        tree.add_child(parens, copy)?;
    }
    tree.append(parens, Tag::Period, "]");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{notation, render::compact};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pivot_becomes_filtered_aggregates() {
        let mut tree = notation::parse(
            r#"(Statement
                (Clause (OtherKeyword "select") (WhiteSpace " ") (OtherNode "id") (Comma ",") (WhiteSpace " ")
                    (BracketQuotedName "A") (Comma ",") (WhiteSpace " ") (BracketQuotedName "B"))
                (Clause (OtherKeyword "from") (WhiteSpace " ") (SelectionTarget (OtherNode "sales")))
                (Clause (OtherNode "pivot") (WhiteSpace " ")
                    (ExpressionParens (FunctionKeyword "sum") (FunctionParens (OtherNode "amount"))
                        (WhiteSpace " ") (OtherKeyword "for") (WhiteSpace " ") (OtherNode "kind")
                        (WhiteSpace " ") (OtherKeyword "in") (WhiteSpace " ")
                        (InParens (BracketQuotedName "A") (Comma ",") (BracketQuotedName "B")))
                    (WhiteSpace " ") (OtherNode "p") (Semicolon ";")))"#,
        )
        .unwrap();
        let mut ctx = PassContext::default();
        convert_pivot(&mut tree, &mut ctx).unwrap();
        assert_eq!(
            compact(&tree, tree.root()),
            "select id, sum(amount) filter(where kind = 'a') as [A], \
             sum(amount) filter(where kind = 'b') as [B] from sales group by 1"
        );
    }

    #[test]
    fn test_unpivot_becomes_parallel_unnest() {
        let mut tree = notation::parse(
            r#"(Statement
                (Clause (OtherKeyword "select") (Asterisk "*"))
                (Clause (OtherKeyword "from") (WhiteSpace " ") (SelectionTarget (OtherNode "t")))
                (Clause (OtherNode "unpivot") (WhiteSpace " ")
                    (ExpressionParens (OtherNode "val") (WhiteSpace " ") (OtherKeyword "for") (WhiteSpace " ")
                        (OtherNode "attr") (WhiteSpace " ") (OtherKeyword "in") (WhiteSpace " ")
                        (InParens (OtherNode "a") (Comma ",") (WhiteSpace " ") (OtherNode "b")))
                    (WhiteSpace " ") (OtherNode "u")))"#,
        )
        .unwrap();
        let mut ctx = PassContext::default();
        convert_unpivot(&mut tree, &mut ctx).unwrap();
        assert_eq!(
            compact(&tree, tree.root()),
            "select * from (select unnest(array['a', 'b']) as attr, unnest(array[a, b]) as val from t) u"
        );
    }
}
