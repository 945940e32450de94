//! JSON functions and `for json` queries.

use super::{PassContext, for_each_match, select_columns};
use crate::error::{ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

/// Alias of the derived table aggregated by `for json` rewrites.
const JSON_ROW: &str = "_to_json_temp";

const AUTO_WARNING: &str = "CONVERTER WARNING: converted from /for json auto/ as if it was \
     /for json path/. Output is potentially different, especially if query has joins";

/// What a `for json` query produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    /// One array holding every row.
    Array,
    /// A single object, `without_array_wrapper`.
    Object,
}

impl JsonShape {
    fn function(self) -> &'static str {
        match self {
            JsonShape::Array => "json_agg",
            JsonShape::Object => "to_json",
        }
    }
}

/// Value of a key in a nested output object.
#[derive(Debug)]
enum Member {
    Value(Vec<NodeId>),
    Object(Vec<(String, Member)>),
}

impl Member {
    fn entry(members: &mut Vec<(String, Member)>, key: &str) -> usize {
        match members.iter().position(|(k, _)| k == key) {
            Some(index) => index,
            None => {
                members.push((key.to_string(), Member::Object(Vec::new())));
                members.len() - 1
            }
        }
    }

    /// Place `value` under the dotted path.
    fn insert(members: &mut Vec<(String, Member)>, path: &[&str], value: Vec<NodeId>) {
        let [key, rest @ ..] = path else {
            return;
        };
        let index = Self::entry(members, key);
        if rest.is_empty() {
            members[index].1 = Member::Value(value);
            return;
        }
        if !matches!(members[index].1, Member::Object(_)) {
            members[index].1 = Member::Object(Vec::new());
        }
        if let Member::Object(children) = &mut members[index].1 {
            Self::insert(children, rest, value);
        }
    }
}

/// `json_query(x)` becomes a cast to json, `isjson(x)` becomes
/// `(x is json)` and `openjson` becomes `json_each` or `json_table`.
pub fn convert_json_functions(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherNode, None, |tree, function| {
        let name = tree.text(function).to_lowercase();
        match name.as_str() {
            "json_query" => convert_json_query(tree, function),
            "isjson" => convert_isjson(tree, function),
            "openjson" => convert_openjson(tree, function),
            _ => Ok(()),
        }
    })
}

fn arguments(tree: &Tree, function: NodeId, name: &str) -> ConvertResult<NodeId> {
    tree.next_sibling(function, false)
        .filter(|p| tree.tag(*p).is_parens())
        .expected(&format!("arguments of {name}"))
}

fn convert_json_query(tree: &mut Tree, function: NodeId) -> ConvertResult<()> {
    let parens = arguments(tree, function, "json_query")?;
    if tree.child_by_tag(parens, Tag::Comma).is_some() {
        return Ok(());
    }
    tree.set_tag(function, Tag::FunctionKeyword);
    tree.set_text(function, "cast");
    tree.append(parens, Tag::OtherKeyword, "as");
    tree.append(parens, Tag::DataTypeKeyword, "json");
    Ok(())
}

fn convert_isjson(tree: &mut Tree, function: NodeId) -> ConvertResult<()> {
    let holder = tree.parent(function).expected("expression holding isjson")?;
    let parens = arguments(tree, function, "isjson")?;
    tree.remove_child(holder, function)?;
    tree.set_tag(parens, Tag::ExpressionParens);
    tree.append(parens, Tag::OtherKeyword, "is");
    tree.append(parens, Tag::DataTypeKeyword, "json");
    Ok(())
}

fn convert_openjson(tree: &mut Tree, function: NodeId) -> ConvertResult<()> {
    let target = tree.parent(function).expected("selection target of openjson")?;
    let parens = arguments(tree, function, "openjson")?;
    let with = tree.child_with_text(target, Tag::OtherKeyword, "with");
    let path = tree
        .child_by_tag(parens, Tag::Comma)
        .and_then(|c| tree.next_sibling(c, false))
        .filter(|p| tree.is(*p, Tag::String));

    let Some(with) = with else {
        tree.set_text(function, "json_each");
        if path.is_some() {
            let arguments = tree.snapshot(parens);
            tree.append(parens, Tag::FunctionKeyword, "json_query");
            let inner = tree.append(parens, Tag::FunctionParens, "");
            for node in arguments {
                tree.move_to(inner, node)?;
            }
        }
        tracing::debug!("openjson rewritten to json_each");
        return Ok(());
    };

    let columns = tree
        .next_sibling(with, false)
        .filter(|c| tree.is(*c, Tag::ExpressionParens))
        .expected("column list of openjson")?;
    tree.set_text(function, "json_table");
    tree.remove_child(target, with)?;
    tree.remove_child(target, columns)?;

    if path.is_none() {
        tree.append(parens, Tag::Comma, ",");
        tree.append(parens, Tag::String, "$");
    }
    let clause = tree.append(parens, Tag::Clause, "");
    tree.append(clause, Tag::OtherKeyword, "columns");
    tree.add_child(clause, columns)?;

    for literal in tree.children_by_tag(columns, Tag::String) {
        tree.insert_new_before(columns, Tag::OtherKeyword, "path", literal)?;
    }
    for keyword in tree.children_by_tag(columns, Tag::OtherKeyword) {
        if !tree.has_text(keyword, "as") {
            continue;
        }
        if let Some(json) = tree
            .next_sibling(keyword, false)
            .filter(|j| tree.is_text(*j, Tag::OtherNode, "json"))
        {
            tree.set_text(keyword, "with");
            tree.set_text(json, "wrapper");
        }
    }
    tracing::debug!("openjson with column list rewritten to json_table");
    Ok(())
}

/// `select ... for json path` becomes
/// `select json_agg(_to_json_temp) from (select ...) _to_json_temp`.
///
/// Columns aliased with dotted names (`[a.b]`) are regrouped into nested
/// `json_object` calls. `for json auto` is converted like `path` and
/// flagged with a warning.
pub fn convert_for_json(tree: &mut Tree, ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherKeyword, Some("for"), |tree, keyword| {
        let Some(json) = tree
            .next_sibling(keyword, false)
            .filter(|j| tree.is_text(*j, Tag::OtherNode, "json"))
        else {
            return Ok(());
        };
        let Some(mode) = tree
            .next_sibling(json, false)
            .filter(|m| tree.is_text(*m, Tag::OtherNode, "path") || tree.is_text(*m, Tag::OtherNode, "auto"))
        else {
            return Ok(());
        };
        let is_auto = tree.has_text(mode, "auto");
        let shape = match tree
            .next_sibling(mode, false)
            .filter(|c| tree.is(*c, Tag::Comma))
            .and_then(|c| tree.next_sibling(c, false))
        {
            Some(option) if tree.is_text(option, Tag::OtherNode, "without_array_wrapper") => JsonShape::Object,
            _ => JsonShape::Array,
        };

        let for_clause = tree.parent(keyword).expected("for json clause")?;
        let statement = tree.parent(for_clause).expected("for json statement")?;
        let semicolon = tree.find_terminating_semicolon(for_clause);
        if let Some(semicolon) = semicolon {
            tree.detach(semicolon);
        }
        tree.remove_child(statement, for_clause)?;

        let mut clauses = tree.snapshot(statement);
        if let Some(first) = clauses.first().copied() {
            if tree.child_with_text(first, Tag::OtherKeyword, "open").is_some() {
                clauses.remove(0);
            }
        }

        let select = tree.append(statement, Tag::Clause, "");
        tree.append(select, Tag::OtherKeyword, "select");
        tree.append(select, Tag::FunctionKeyword, shape.function());
        let row = tree.append(select, Tag::FunctionParens, "");
        tree.append(row, Tag::OtherNode, JSON_ROW);
        if is_auto {
            tree.append(select, Tag::CommentMultiLine, AUTO_WARNING);
            ctx.warn("for json auto converted as for json path");
        }

        let from = tree.append(statement, Tag::Clause, "");
        tree.append(from, Tag::OtherKeyword, "from");
        let target = tree.append(from, Tag::SelectionTarget, "");
        let query = tree.append(target, Tag::SelectionTargetParens, "");
        for clause in clauses {
            tree.move_to(query, clause)?;
        }
        tree.append(target, Tag::OtherNode, JSON_ROW);
        if let Some(semicolon) = semicolon {
            tree.add_child(from, semicolon)?;
        }

        let inner = tree
            .child_containing(query, Tag::OtherKeyword, "select")
            .expected("select clause of the for json query")?;
        nest_dotted_columns(tree, inner)
    })
}

/// Dotted BracketQuotedName alias of a column.
fn dotted_alias(tree: &Tree, column: &[NodeId]) -> Option<NodeId> {
    column
        .iter()
        .copied()
        .find(|n| tree.is(*n, Tag::BracketQuotedName) && tree.text(*n).contains('.'))
}

fn nest_dotted_columns(tree: &mut Tree, select: NodeId) -> ConvertResult<()> {
    let columns = select_columns(tree, select);
    if columns.iter().all(|c| dotted_alias(tree, c).is_none()) {
        return Ok(());
    }

    let mut plain = Vec::new();
    let mut nested = Vec::new();
    for column in columns {
        let Some(alias) = dotted_alias(tree, &column) else {
            plain.push(column);
            continue;
        };
        let as_keyword = column
            .iter()
            .position(|n| tree.is_text(*n, Tag::OtherKeyword, "as"))
            .expected("as keyword of a dotted column")?;
        let value: Vec<NodeId> = column[..as_keyword]
            .iter()
            .copied()
            .filter(|n| !tree.is_whitespace(*n))
            .collect();
        let name = tree.text(alias).to_string();
        let path: Vec<&str> = name.split('.').collect();
        Member::insert(&mut nested, &path, value);
    }

    let keyword = tree.child_with_text(select, Tag::OtherKeyword, "select");
    for child in tree.snapshot(select) {
        if Some(child) != keyword {
            tree.detach(child);
        }
    }
    for (i, column) in plain.into_iter().enumerate() {
        if i > 0 {
            tree.append(select, Tag::Comma, ",");
        }
        for node in column {
            tree.add_child(select, node)?;
        }
    }
    let mut first = tree.children(select).len() == 1;
    for (key, member) in nested {
        if !first {
            tree.append(select, Tag::Comma, ",");
        }
        first = false;
        append_member(tree, select, member)?;
        tree.append(select, Tag::OtherKeyword, "as");
        tree.append(select, Tag::OtherNode, &key);
    }
    Ok(())
}

fn append_member(tree: &mut Tree, parent: NodeId, member: Member) -> ConvertResult<()> {
    match member {
        Member::Value(nodes) => {
            for node in nodes {
                tree.add_child(parent, node)?;
            }
        }
        Member::Object(members) => {
            tree.append(parent, Tag::FunctionKeyword, "json_object");
            let parens = tree.append(parent, Tag::FunctionParens, "");
            for (i, (key, value)) in members.into_iter().enumerate() {
                if i > 0 {
                    tree.append(parens, Tag::Comma, ",");
                }
                tree.append(parens, Tag::String, &key);
                tree.append(parens, Tag::Period, ":");
                append_member(tree, parens, value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{notation, render::compact};
    use pretty_assertions::assert_eq;

    fn convert(source: &str) -> (String, usize) {
        let mut tree = notation::parse(source).unwrap();
        let mut ctx = PassContext::default();
        convert_json_functions(&mut tree, &mut ctx).unwrap();
        convert_for_json(&mut tree, &mut ctx).unwrap();
        (compact(&tree, tree.root()), ctx.warnings)
    }

    #[test]
    fn test_json_query_and_isjson() {
        let (out, _) = convert(
            r#"(Clause (OtherKeyword "select") (OtherNode "json_query") (FunctionParens (OtherNode "@doc"))
                (Comma ",") (OtherNode "json_query") (FunctionParens (OtherNode "@doc") (Comma ",") (String "$.a"))
                (Comma ",") (OtherNode "isjson") (FunctionParens (OtherNode "@doc")))"#,
        );
        assert_eq!(
            out,
            "select cast(@doc as json), json_query(@doc, '$.a'), (@doc is json)"
        );
    }

    #[test]
    fn test_openjson_without_columns() {
        let (out, _) = convert(
            r#"(Clause (OtherKeyword "from") (SelectionTarget (OtherNode "openjson")
                (FunctionParens (OtherNode "@doc") (Comma ",") (String "$.items"))))"#,
        );
        assert_eq!(out, "from json_each(json_query(@doc, '$.items'))");
    }

    #[test]
    fn test_openjson_with_columns() {
        let (out, _) = convert(
            r#"(Clause (OtherKeyword "from") (SelectionTarget (OtherNode "openjson")
                (FunctionParens (OtherNode "@doc")) (WhiteSpace " ") (OtherKeyword "with") (WhiteSpace " ")
                (ExpressionParens (OtherNode "id") (DataTypeKeyword "int") (String "$.id") (Comma ",")
                    (OtherNode "tags") (DataTypeKeyword "nvarchar") (String "$.tags")
                    (OtherKeyword "as") (OtherNode "json"))))"#,
        );
        assert_eq!(
            out,
            "from json_table(@doc, '$' columns (id int path '$.id', tags nvarchar path '$.tags' with wrapper))"
        );
    }

    #[test]
    fn test_for_json_path_with_nested_columns() {
        let (out, warnings) = convert(
            r#"(Statement
                (Clause (OtherKeyword "select") (WhiteSpace " ") (OtherNode "id") (Comma ",") (WhiteSpace " ")
                    (OtherNode "city") (WhiteSpace " ") (OtherKeyword "as") (WhiteSpace " ") (BracketQuotedName "address.city")
                    (Comma ",") (WhiteSpace " ")
                    (OtherNode "zip") (OtherKeyword "as") (BracketQuotedName "address.zip"))
                (Clause (OtherKeyword "from") (SelectionTarget (OtherNode "users")))
                (Clause (OtherKeyword "for") (OtherNode "json") (OtherNode "path") (Semicolon ";")))"#,
        );
        assert_eq!(
            out,
            "select json_agg(_to_json_temp) from (select id, json_object('city': city, 'zip': zip) as address \
             from users) _to_json_temp;"
        );
        assert_eq!(warnings, 0);
    }

    #[test]
    fn test_for_json_auto_without_array_wrapper_warns() {
        let (out, warnings) = convert(
            r#"(Statement
                (Clause (OtherKeyword "select") (Asterisk "*"))
                (Clause (OtherKeyword "from") (SelectionTarget (OtherNode "users")))
                (Clause (OtherKeyword "for") (OtherNode "json") (OtherNode "auto") (Comma ",")
                    (OtherNode "without_array_wrapper")))"#,
        );
        assert!(out.starts_with("select to_json(_to_json_temp) /*CONVERTER WARNING:"));
        assert!(out.ends_with("from (select * from users) _to_json_temp"));
        assert_eq!(warnings, 1);
    }
}
