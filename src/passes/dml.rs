//! Data modification statements and procedure calls.

use super::{PassContext, Visit, for_each_match, walk, wrap_in_expression_parens};
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, SIMPLE_TEXT, Tag, Tree};

/// Alias given to the updated table when `update ... from` joins it again.
const UPDATE_TARGET: &str = "__target__";

/// A clause opening an `insert into`, however the keywords were grouped.
fn is_insert_clause(tree: &Tree, clause: NodeId) -> bool {
    tree.children(clause).iter().any(|c| match tree.tag(*c) {
        Tag::CompoundKeyword => {
            tree.text(*c).to_lowercase().starts_with("insert")
                || tree.child_with_text(*c, Tag::OtherKeyword, "insert").is_some()
        }
        Tag::OtherKeyword => tree.has_text(*c, "insert"),
        _ => false,
    })
}

/// `delete t where ...` becomes `delete from t where ...`.
pub fn convert_delete(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherKeyword, Some("delete"), |tree, keyword| {
        let Some(clause) = tree.parent(keyword) else {
            return Ok(());
        };
        let Some(statement) = tree.parent(clause) else {
            return Ok(());
        };
        if tree.child_containing(statement, Tag::OtherKeyword, "from").is_some() {
            return Ok(());
        }
        let Some(table) = tree.next_sibling(keyword, false) else {
            return Ok(());
        };
        if tree.is(table, Tag::Semicolon) {
            return Ok(());
        }

        tree.remove_child(clause, table)?;
        let from = tree.insert_new_after(statement, Tag::Clause, "", clause)?;
        tree.append(from, Tag::OtherKeyword, "from");
        let target = tree.append(from, Tag::SelectionTarget, "");
        tree.add_child(target, table)
    })
}

/// `create table #t` becomes `create temp table #t`; column lists are
/// recorded for later `insert ... exec` rewrites.
pub fn convert_temp_tables(tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if !tree.is(id, Tag::DdlOtherBlock) {
            return Ok(Visit::Descend);
        }
        let create = tree.child_with_text(id, Tag::OtherKeyword, "create");
        let table = tree.child_with_text(id, Tag::OtherKeyword, "table");
        let name = tree.child_by_tag(id, Tag::OtherNode);
        let (Some(create), Some(_), Some(name)) = (create, table, name) else {
            return Ok(Visit::Skip);
        };
        if !tree.text(name).starts_with('#') {
            return Ok(Visit::Skip);
        }

        tree.insert_new_after(id, Tag::OtherKeyword, "temp", create)?;
        if let Some(definition) = tree.next_sibling(name, false) {
            ctx.temp_tables
                .insert(tree.text(name).to_lowercase(), definition);
        }
        tracing::debug!("Temp table {} recorded", tree.text(name));
        Ok(Visit::Skip)
    })
}

/// `update a set ... from t a join ...` joins the target by `ctid`:
/// `update t as __target__ set ... from t a join ... where (...) and __target__.ctid = a.ctid`.
pub fn convert_update_from(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherKeyword, Some("update"), |tree, keyword| {
        let Some(update) = tree.parent(keyword) else {
            return Ok(());
        };
        let Some(statement) = tree.parent(update) else {
            return Ok(());
        };
        let Some(from) = tree.child_containing(statement, Tag::OtherKeyword, "from") else {
            return Ok(());
        };
        let Some(target) = tree.child_by_tag(update, Tag::OtherNode) else {
            return Ok(());
        };
        let target_name = tree.text(target).to_string();

        let mut candidates: Vec<NodeId> = tree.child_by_tag(from, Tag::SelectionTarget).into_iter().collect();
        candidates.extend(
            tree.children(statement)
                .iter()
                .filter(|c| tree.child_by_tag(**c, Tag::CompoundKeyword).is_some())
                .filter_map(|c| tree.child_by_tag(*c, Tag::SelectionTarget)),
        );
        let Some((selection, matched)) = candidates.into_iter().find_map(|s| {
            tree.child_with_text(s, Tag::OtherNode, &target_name)
                .map(|m| (s, m))
        }) else {
            return Ok(());
        };

        let is_alias = tree.index_of(selection, matched).is_some_and(|i| i > 0);
        let table = if is_alias {
            tree.child_by_tag(selection, Tag::OtherNode)
                .expected("table of the aliased update target")?
        } else {
            matched
        };
        let alias = tree
            .next_sibling(table, false)
            .and_then(|n| {
                if tree.is_text(n, Tag::OtherKeyword, "as") {
                    tree.next_sibling(n, false)
                } else {
                    Some(n)
                }
            })
            .filter(|n| tree.is(*n, Tag::OtherNode));
        let reference = alias.map_or_else(|| tree.text(matched).to_string(), |a| tree.text(a).to_string());

        if is_alias {
            let table_name = tree.text(table).to_string();
            tree.set_text(target, table_name);
        }
        tree.append(update, Tag::OtherKeyword, "as");
        tree.append(update, Tag::OtherNode, UPDATE_TARGET);

        let (clause, anchor) = match tree.child_containing(statement, Tag::OtherKeyword, "where") {
            Some(clause) => {
                let parens = wrap_in_expression_parens(tree, clause)?;
                let and = tree.insert_new_after(clause, Tag::AndOperator, "", parens)?;
                tree.append(and, Tag::OtherKeyword, "and");
                (clause, and)
            }
            None => {
                let last = tree.last_child_by_tag(statement, Tag::Clause).expected("last clause")?;
                let semicolon = tree.find_terminating_semicolon(last);
                if let Some(semicolon) = semicolon {
                    tree.detach(semicolon);
                }
                let clause = tree.append(statement, Tag::Clause, "");
                let keyword = tree.append(clause, Tag::OtherKeyword, "where");
                if let Some(semicolon) = semicolon {
                    tree.add_child(clause, semicolon)?;
                }
                (clause, keyword)
            }
        };

        let mut cursor = anchor;
        for (tag, text) in [
            (Tag::OtherNode, UPDATE_TARGET),
            (Tag::Period, "."),
            (Tag::OtherNode, "ctid"),
            (Tag::EqualsSign, "="),
            (Tag::OtherNode, reference.as_str()),
            (Tag::Period, "."),
            (Tag::OtherNode, "ctid"),
        ] {
            cursor = tree.insert_new_after(clause, tag, text, cursor)?;
        }
        tracing::debug!("Update from rewritten to a ctid self join on {}", reference);
        Ok(())
    })
}

/// `exec p @a = 1, @b out` becomes `call p(@a => 1, @b)`. An `insert ... exec`
/// is split into the call and an insert reading the procedure's first
/// result set cursor.
pub fn convert_procedure_calls(tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    walk(tree, root, &mut |tree, id| {
        if tree.is(id, Tag::OtherKeyword) && (tree.has_text(id, "exec") || tree.has_text(id, "execute")) {
            convert_call(tree, ctx, id)?;
        }
        Ok(Visit::Descend)
    })
}

fn convert_call(tree: &mut Tree, ctx: &mut PassContext, keyword: NodeId) -> ConvertResult<()> {
    let clause = tree.parent(keyword).expected("clause of the call")?;
    let mut name = tree.next_sibling(keyword, false).expected("called procedure")?;
    while let Some(period) = tree.next_adjacent(name).filter(|p| tree.is(*p, Tag::Period)) {
        name = tree.next_adjacent(period).expected("name after schema")?;
    }
    tree.set_text(keyword, "call");

    let mut arguments: Vec<NodeId> = tree
        .siblings_after(name)
        .into_iter()
        .filter(|n| !tree.is(*n, Tag::Semicolon))
        .collect();
    while arguments.last().is_some_and(|n| tree.is_whitespace(*n)) {
        arguments.pop();
    }
    while arguments.first().is_some_and(|n| tree.is_whitespace(*n)) {
        arguments.remove(0);
    }

    let parens = tree.insert_new_after(clause, Tag::FunctionParens, "", name)?;
    for node in arguments {
        if tree.is(node, Tag::OtherKeyword) && (tree.has_text(node, "output") || tree.has_text(node, "out")) {
            tree.detach(node);
            continue;
        }
        if tree.is(node, Tag::EqualsSign) {
            tree.set_text(node, "=>");
        }
        tree.move_to(parens, node)?;
    }

    let statement = tree.parent(clause).expected("statement of the call")?;
    let Some(insert) = tree
        .children(statement)
        .iter()
        .copied()
        .find(|c| *c != clause && is_insert_clause(tree, *c))
    else {
        return Ok(());
    };

    let procedure = tree.text(name).to_lowercase();
    let container = tree.parent(statement).expected("statement container")?;
    let insert_statement = tree.insert_new_after(container, Tag::Statement, "", statement)?;
    tree.move_to(insert_statement, insert)?;
    let table = tree
        .child_by_tag(insert, Tag::OtherNode)
        .expected("target table of insert exec")?;
    let table = tree.text(table).to_string();

    let select = tree.append(insert_statement, Tag::Clause, "");
    tree.append(select, Tag::OtherKeyword, "select");
    tree.append(select, Tag::Asterisk, "*");
    let from = tree.append(insert_statement, Tag::Clause, "");
    tree.append(from, Tag::OtherKeyword, "from");
    let target = tree.append(from, Tag::SelectionTarget, "");
    let cursor = format!("{}_select1", procedure);

    match table_shape(tree, ctx, &table) {
        Some(TableShape::Columns(definition)) => {
            tree.append(target, Tag::FunctionKeyword, "fetch_all_from");
            let parens = tree.append(target, Tag::FunctionParens, "");
            tree.append(parens, Tag::String, &cursor);
            tree.append(target, Tag::OtherKeyword, "as");
            let columns = tree.deep_clone(definition);
            tree.set_tag(columns, Tag::ExpressionParens);
            tree.add_child(target, columns)?;
        }
        Some(TableShape::Type(type_name)) => {
            tree.append(target, Tag::FunctionKeyword, "refcursor_populate_recordset");
            let parens = tree.append(target, Tag::FunctionParens, "");
            tree.append(parens, Tag::OtherKeyword, "null");
            tree.append(parens, Tag::Period, "::");
            tree.append(parens, Tag::OtherNode, &type_name);
            tree.append(parens, Tag::Comma, ",");
            tree.append(parens, Tag::String, &cursor);
        }
        None => {
            tree.append(target, Tag::FunctionKeyword, "fetch_all_from");
            let parens = tree.append(target, Tag::FunctionParens, "");
            tree.append(parens, Tag::String, &cursor);
            tree.append(target, Tag::OtherKeyword, "as");
            let stub = tree.append(target, Tag::ExpressionParens, "");
            tree.append(
                stub,
                Tag::CommentMultiLine,
                "converter warning: (TODO) inserting into a table with unknown columns. Add them here",
            );
            ctx.warn(&format!("columns of {} are unknown for insert exec", table));
        }
    }
    Ok(())
}

/// How the rows of an `insert ... exec` target are shaped.
enum TableShape {
    /// A column definition list.
    Columns(NodeId),
    /// A composite type name.
    Type(String),
}

fn table_shape(tree: &Tree, ctx: &PassContext, table: &str) -> Option<TableShape> {
    if let Some(definition) = ctx.temp_tables.get(&table.to_lowercase()) {
        return Some(TableShape::Columns(*definition));
    }
    let renamed = table.replace('@', "_");
    let declaration = ctx
        .declarations
        .iter()
        .find(|d| d.declares(tree, table) || d.declares(tree, &renamed))?;
    if declaration.is_table(tree) {
        let columns = declaration
            .variable
            .iter()
            .copied()
            .find(|n| tree.is(*n, Tag::DdlParens))?;
        return Some(TableShape::Columns(columns));
    }
    let type_name = declaration
        .variable
        .iter()
        .rev()
        .copied()
        .find(|n| tree.is(*n, Tag::OtherNode))?;
    Some(TableShape::Type(tree.text(type_name).to_string()))
}

/// `@a int output` in a parameter list becomes `out @a int`.
pub fn convert_output_parameters(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::DdlParens, None, |tree, parens| {
        let markers: Vec<NodeId> = tree
            .children(parens)
            .iter()
            .copied()
            .filter(|c| {
                tree.is(*c, Tag::OtherKeyword) && (tree.has_text(*c, "output") || tree.has_text(*c, "out"))
            })
            .collect();
        for marker in markers {
            let index = tree.index_of(parens, marker).expected("output marker")?;
            let comma = tree.children(parens)[..index]
                .iter()
                .rev()
                .copied()
                .find(|c| tree.is(*c, Tag::Comma));
            tree.detach(marker);
            tree.set_text(marker, "out");
            match comma {
                Some(comma) => tree.insert_after(parens, marker, comma)?,
                None => {
                    let first = tree.first_significant_child(parens).expected("first parameter")?;
                    tree.insert_before(parens, marker, first)?;
                }
            }
        }
        Ok(())
    })
}

/// `output ... into t` becomes a data modifying CTE feeding an insert;
/// without `into` it becomes `returning`.
pub fn convert_output_clause(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherKeyword, Some("output"), |tree, keyword| {
        let Some(output) = tree.parent(keyword) else {
            return Ok(());
        };
        let Some(statement) = tree.parent(output).filter(|s| tree.is(*s, Tag::Statement)) else {
            return Ok(());
        };
        convert_output(tree, statement, output, keyword)
    })
}

fn convert_output(tree: &mut Tree, statement: NodeId, output: NodeId, keyword: NodeId) -> ConvertResult<()> {
    let find = |tree: &Tree, text: &str| tree.child_containing(statement, Tag::OtherKeyword, text);
    let insert = tree
        .children(statement)
        .iter()
        .copied()
        .find(|c| is_insert_clause(tree, *c));
    let update = find(tree, "update");
    let merge = find(tree, "merge");
    let delete = find(tree, "delete");
    let main = insert
        .or(update)
        .or(merge)
        .or(delete)
        .expected("statement producing the output")?;
    let cte_name = if update.is_some() {
        "updated"
    } else if merge.is_some() {
        "merged"
    } else if delete.is_some() {
        "deleted"
    } else {
        "inserted"
    };
    let versioned = matches!(cte_name, "updated" | "merged");

    if let Some(action) = tree.child_with_text(output, Tag::PseudoName, "$action") {
        tree.set_tag(action, Tag::FunctionKeyword);
        tree.set_text(action, "merge_action");
        tree.insert_new_after(output, Tag::FunctionParens, "", action)?;
    }

    for period in tree.children_by_tag(output, Tag::Period) {
        let Some(table) = tree.previous_sibling(period) else {
            continue;
        };
        let pseudo = tree.text(table).to_lowercase();
        match (pseudo.as_str(), versioned) {
            ("inserted", true) => tree.set_text(table, "new"),
            ("deleted", true) => tree.set_text(table, "old"),
            ("inserted" | "deleted", false) => {
                tree.remove_child(output, table)?;
                tree.remove_child(output, period)?;
            }
            _ => {}
        }
    }

    let into = tree
        .next_sibling(output, false)
        .filter(|c| tree.child_with_text(*c, Tag::OtherKeyword, "into").is_some());
    let Some(into) = into else {
        // no target table: the rows are simply returned
        tree.set_text(keyword, "returning");
        let last = tree.last_child_by_tag(statement, Tag::Clause).expected("last clause")?;
        let semicolon = tree.find_terminating_semicolon(last);
        if let Some(semicolon) = semicolon {
            tree.detach(semicolon);
        }
        tree.move_to(statement, output)?;
        if let Some(semicolon) = semicolon {
            tree.add_child(output, semicolon)?;
        }
        return Ok(());
    };

    let output_nodes: Vec<NodeId> = tree
        .children(output)
        .iter()
        .copied()
        .filter(|n| *n != keyword && !tree.is(*n, Tag::Semicolon))
        .collect();
    let into_keyword = tree
        .child_with_text(into, Tag::OtherKeyword, "into")
        .expected("into keyword")?;
    let table = tree.next_sibling(into_keyword, false).expected("output target table")?;
    let columns = tree
        .next_sibling(table, false)
        .filter(|c| tree.tag(*c).is_parens());

    let semicolon = tree.find_terminating_semicolon(statement);
    if let Some(semicolon) = semicolon {
        tree.detach(semicolon);
    }
    tree.remove_child(statement, output)?;
    tree.remove_child(statement, into)?;

    let cte = match tree
        .children(statement)
        .iter()
        .find_map(|c| tree.child_by_tag(*c, Tag::CteWithClause))
    {
        Some(cte) => {
            let separator = tree.append(cte, Tag::ContainerGeneralContent, "");
            tree.append(separator, Tag::Comma, ",");
            cte
        }
        None => {
            let clause = tree.insert_new_before(statement, Tag::Clause, "", main)?;
            let cte = tree.append(clause, Tag::CteWithClause, "");
            let open = tree.append(cte, Tag::ContainerOpen, "");
            tree.append(open, Tag::OtherKeyword, "with");
            cte
        }
    };
    let alias = tree.append(cte, Tag::CteAlias, "");
    tree.append(alias, Tag::OtherNode, cte_name);
    let as_block = tree.append(cte, Tag::CteAsBlock, "");
    let open = tree.append(as_block, Tag::ContainerOpen, "");
    tree.append(open, Tag::OtherKeyword, "as");
    let body = tree.append(as_block, Tag::ContainerGeneralContent, "");
    let parens = tree.append(body, Tag::SelectionTargetParens, "");
    let index = tree.index_of(statement, main).expected("main clause")?;
    for clause in tree.children(statement)[index..].to_vec() {
        tree.move_to(parens, clause)?;
    }
    let returning = tree.append(parens, Tag::Clause, "");
    tree.append(returning, Tag::OtherKeyword, "returning");
    for node in &output_nodes {
        tree.move_to(returning, *node)?;
    }

    let insert = tree.append(statement, Tag::Clause, "");
    let compound = tree.append(insert, Tag::CompoundKeyword, "");
    tree.append(compound, Tag::OtherKeyword, "insert");
    tree.append(compound, Tag::OtherKeyword, "into");
    tree.set_attribute(compound, SIMPLE_TEXT, "insert into");
    tree.move_to(insert, table)?;
    if let Some(columns) = columns {
        tree.move_to(insert, columns)?;
    }

    let select = tree.append(statement, Tag::Clause, "");
    tree.append(select, Tag::OtherKeyword, "select");
    for (i, column) in output_columns(tree, &output_nodes).into_iter().enumerate() {
        if i > 0 {
            tree.append(select, Tag::Comma, ",");
        }
        for node in column {
            let copy = tree.deep_clone(node);
            tree.add_child(select, copy)?;
        }
    }
    let from = tree.append(statement, Tag::Clause, "");
    tree.append(from, Tag::OtherKeyword, "from");
    let target = tree.append(from, Tag::SelectionTarget, "");
    tree.append(target, Tag::OtherNode, cte_name);
    if let Some(semicolon) = semicolon {
        tree.add_child(from, semicolon)?;
    }

    tracing::debug!("Output clause rewritten to a {} CTE", cte_name);
    Ok(())
}

/// Names under which each output column is visible outside the CTE.
fn output_columns(tree: &Tree, nodes: &[NodeId]) -> Vec<Vec<NodeId>> {
    nodes
        .split(|n| tree.is(*n, Tag::Comma))
        .map(|column| {
            let alias = column
                .iter()
                .position(|n| tree.is_text(*n, Tag::OtherKeyword, "as"))
                .and_then(|i| column[i + 1..].iter().copied().find(|n| !tree.is_noise(*n)));
            let name = alias.or_else(|| column.iter().rev().copied().find(|n| tree.is_name(*n)));
            match name {
                Some(name) => vec![name],
                None => column.iter().copied().filter(|n| !tree.is_noise(*n)).collect(),
            }
        })
        .collect()
}
