//! Built-in functions and data types.
//!
//! Simple renames go through lookup tables. Functions whose argument
//! order or syntax differs are restructured in place: `stuff` becomes
//! `overlay`, the date functions become `extract` or interval arithmetic,
//! `iif` becomes a case expression and `cast` becomes the `::` operator.

use super::{PassContext, for_each_match};
use crate::declare::trim_whitespace;
use crate::error::{ConvertError, ConvertResult, Expected};
use crate::tree::{NodeId, Tag, Tree};

/// Functions that only differ by name.
const FUNCTION_NAMES: &[(&str, &str)] = &[
    ("len", "length"),
    ("getdate", "now"),
    ("rand", "random"),
    ("newid", "gen_random_uuid"),
    ("isnull", "coalesce"),
    ("scope_identity", "lastval"),
];

/// Date format units that differ in `to_char` pictures.
const DATE_FORMAT_UNITS: &[(&str, &str)] = &[("mm", "MI")];

const DATA_TYPES: &[(&str, &str)] = &[
    ("nvarchar", "text"),
    ("varchar", "text"),
    ("datetime", "timestamp"),
    ("datetimeoffset", "timestamptz"),
    ("bit", "boolean"),
    ("uniqueidentifier", "uuid"),
    ("decimal", "numeric"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(key))
        .map(|(_, to)| *to)
}

/// The argument list following a function name.
fn arguments(tree: &Tree, function: NodeId) -> Option<NodeId> {
    tree.next_sibling(function, false)
        .filter(|p| tree.tag(*p).is_parens())
}

/// Children of `parens` strictly between two positions, whitespace trimmed.
fn between(tree: &Tree, parens: NodeId, after: Option<NodeId>, before: Option<NodeId>) -> Vec<NodeId> {
    let children = tree.children(parens);
    let start = after
        .and_then(|a| children.iter().position(|c| *c == a))
        .map_or(0, |i| i + 1);
    let end = before
        .and_then(|b| children.iter().position(|c| *c == b))
        .unwrap_or(children.len());
    let mut nodes = children[start..end.max(start)].to_vec();
    trim_whitespace(tree, &mut nodes);
    nodes
}

/// `len(x)` becomes `length(x)`, `getdate()` becomes `now()` and so on.
pub fn convert_mapped_functions(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    let root = tree.root();
    for id in tree.descendants(root) {
        if !matches!(tree.tag(id), Tag::OtherNode | Tag::FunctionKeyword) {
            continue;
        }
        let Some(target) = lookup(FUNCTION_NAMES, tree.text(id)) else {
            continue;
        };
        if arguments(tree, id).is_some() {
            tree.set_text(id, target);
        }
    }
    Ok(())
}

/// `string_agg(x, ',') within group (order by x)` becomes
/// `string_agg(x, ',' order by x)`.
pub fn convert_string_agg(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherNode, Some("string_agg"), |tree, function| {
        let clause = tree.parent(function).expected("clause of string_agg")?;
        let Some(within) = tree.child_with_text(clause, Tag::OtherNode, "within") else {
            return Ok(());
        };
        let group = tree.next_sibling(clause, false).expected("within group clause")?;
        let ordering = tree
            .child_by_tag(group, Tag::ExpressionParens)
            .expected("ordering of the within group clause")?;
        let arguments = arguments(tree, function).expected("arguments of string_agg")?;

        tree.remove_child(clause, within)?;
        tree.detach(group);
        for part in tree.snapshot(ordering) {
            if tree.children(part).is_empty() {
                tree.move_to(arguments, part)?;
                continue;
            }
            for node in tree.snapshot(part) {
                tree.move_to(arguments, node)?;
            }
        }
        Ok(())
    })
}

/// The `stuff((select ', ' + x ... for xml path('')), 1, 2, '')` idiom
/// becomes `(select string_agg(x, ', ') ...)`. Without `stuff` the
/// separator is empty.
pub fn convert_for_xml_path(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::DataTypeKeyword, Some("xml"), |tree, xml| {
        let Some(path) = tree
            .next_sibling(xml, false)
            .filter(|p| tree.is_text(*p, Tag::OtherNode, "path"))
        else {
            return Ok(());
        };
        let Some(path_parens) = tree
            .next_sibling(path, false)
            .filter(|p| tree.is(*p, Tag::FunctionParens))
        else {
            return Ok(());
        };
        if tree.child_with_text(path_parens, Tag::String, "").is_none() {
            return Ok(());
        }

        let for_clause = tree.parent(xml).expected("for xml clause")?;
        let query = tree.parent(for_clause).expected("subquery of for xml path")?;
        let outer = tree.parent(query).expected("parens around the subquery")?;
        let stuff = tree
            .previous_sibling(outer)
            .filter(|s| tree.is(outer, Tag::FunctionParens) && tree.is_text(*s, Tag::FunctionKeyword, "stuff"));

        let select = tree
            .child_containing(query, Tag::OtherKeyword, "select")
            .expected("select clause of the subquery")?;
        tree.remove_child(query, for_clause)?;

        let mut separator = String::new();
        if stuff.is_some() {
            let head = tree
                .child_by_tag(select, Tag::String)
                .and_then(|s| tree.next_sibling(s, false).map(|plus| (s, plus)))
                .filter(|(_, plus)| tree.is_text(*plus, Tag::OtherOperator, "+"));
            if let Some((literal, plus)) = head {
                separator = tree.text(literal).to_string();
                tree.remove_child(select, literal)?;
                tree.remove_child(select, plus)?;
            }
        }

        let keyword = tree.child_with_text(select, Tag::OtherKeyword, "select");
        let columns: Vec<NodeId> = tree
            .snapshot(select)
            .into_iter()
            .filter(|n| Some(*n) != keyword)
            .collect();
        tree.append(select, Tag::FunctionKeyword, "string_agg");
        let aggregate = tree.append(select, Tag::FunctionParens, "");
        for node in columns {
            tree.move_to(aggregate, node)?;
        }
        trim_trailing_whitespace(tree, aggregate)?;
        tree.append(aggregate, Tag::Comma, ",");
        tree.append(aggregate, Tag::String, &separator);

        if let Some(stuff) = stuff {
            let holder = tree.parent(outer).expected("expression holding stuff")?;
            tree.move_after(holder, query, outer)?;
            tree.remove_child(holder, stuff)?;
            tree.remove_child(holder, outer)?;
        }
        tracing::debug!("For xml path rewritten to string_agg with separator '{}'", separator);
        Ok(())
    })
}

fn trim_trailing_whitespace(tree: &mut Tree, id: NodeId) -> ConvertResult<()> {
    while let Some(last) = tree.children(id).last().copied() {
        if !tree.is_whitespace(last) {
            break;
        }
        tree.remove_child(id, last)?;
    }
    Ok(())
}

/// `format(x, '#.00')` becomes `to_char(x, 'FM9D00')`; date pictures get
/// their units translated.
pub fn convert_format(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherNode, Some("format"), |tree, function| {
        let Some(arguments) = arguments(tree, function) else {
            return Ok(());
        };
        let picture = tree
            .child_by_tag(arguments, Tag::String)
            .expected("format picture")?;
        tree.set_text(function, "to_char");

        let text = tree.text(picture).to_string();
        let converted = if text.contains('0') || text.contains('#') {
            format!("FM{}", text.replace('#', "9").replace('.', "D"))
        } else {
            DATE_FORMAT_UNITS
                .iter()
                .fold(text, |acc, (from, to)| acc.replace(from, to))
        };
        tree.set_text(picture, converted);
        Ok(())
    })
}

/// `datepart(year, d)` becomes `extract(year from d)`.
pub fn convert_datepart(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::FunctionKeyword, Some("datepart"), |tree, function| {
        let arguments = arguments(tree, function).expected("arguments of datepart")?;
        let comma = tree
            .child_by_tag(arguments, Tag::Comma)
            .expected("comma after the date part")?;
        tree.set_text(function, "extract");
        tree.set_tag(comma, Tag::OtherKeyword);
        tree.set_text(comma, "from");
        Ok(())
    })
}

/// `dateadd(day, 1, d)` becomes `(d + interval '1 day')`. A non literal
/// amount multiplies a unit interval instead.
pub fn convert_dateadd(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::FunctionKeyword, Some("dateadd"), |tree, function| {
        let holder = tree.parent(function).expected("expression holding dateadd")?;
        let arguments = arguments(tree, function).expected("arguments of dateadd")?;
        let commas = tree.children_by_tag(arguments, Tag::Comma);
        let [first, second, ..] = commas[..] else {
            return Err(ConvertError::shape("expected three arguments of dateadd"));
        };
        let part = between(tree, arguments, None, Some(first));
        let part = part.first().copied().expected("date part of dateadd")?;
        let part = tree.text(part).to_lowercase();
        let amount = between(tree, arguments, Some(first), Some(second));
        let date = between(tree, arguments, Some(second), None);

        let sum = tree.insert_new_before(holder, Tag::ExpressionParens, "", function)?;
        for node in date {
            tree.move_to(sum, node)?;
        }
        tree.append(sum, Tag::OtherOperator, "+");

        let literal: Option<String> = amount
            .iter()
            .filter(|n| !tree.is_noise(**n))
            .map(|n| match tree.tag(*n) {
                Tag::NumberValue => Some(tree.text(*n).to_string()),
                Tag::OtherOperator if tree.has_text(*n, "-") => Some("-".to_string()),
                _ => None,
            })
            .collect();
        match literal {
            Some(amount) => {
                tree.append(sum, Tag::OtherKeyword, "interval");
                tree.append(sum, Tag::String, &format!("{amount} {part}"));
            }
            None => {
                for node in amount {
                    tree.move_to(sum, node)?;
                }
                tree.append(sum, Tag::OtherOperator, "*");
                tree.append(sum, Tag::OtherKeyword, "interval");
                tree.append(sum, Tag::String, &format!("1 {part}"));
            }
        }

        tree.remove_child(holder, function)?;
        tree.remove_child(holder, arguments)
    })
}

/// `datediff(day, a, b)` becomes `extract(day from b - a)`.
pub fn convert_datediff(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::FunctionKeyword, Some("datediff"), |tree, function| {
        let arguments = arguments(tree, function).expected("arguments of datediff")?;
        let commas = tree.children_by_tag(arguments, Tag::Comma);
        let [first, second, ..] = commas[..] else {
            return Err(ConvertError::shape("expected three arguments of datediff"));
        };
        let start = between(tree, arguments, Some(first), Some(second));
        let end = between(tree, arguments, Some(second), None);

        tree.set_text(function, "extract");
        tree.set_tag(first, Tag::OtherKeyword);
        tree.set_text(first, "from");
        tree.set_tag(second, Tag::OtherOperator);
        tree.set_text(second, "-");

        for node in end {
            tree.move_before(arguments, node, second)?;
        }
        let mut anchor = second;
        for node in start {
            tree.move_after(arguments, node, anchor)?;
            anchor = node;
        }
        Ok(())
    })
}

/// `iif(c, a, b)` becomes `case when c then a else b end`.
pub fn convert_iif(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherNode, Some("iif"), |tree, function| {
        let holder = tree.parent(function).expected("expression holding iif")?;
        let arguments = arguments(tree, function).expected("arguments of iif")?;
        let commas = tree.children_by_tag(arguments, Tag::Comma);
        let [first, second, ..] = commas[..] else {
            return Err(ConvertError::shape("expected three arguments of iif"));
        };
        let condition = between(tree, arguments, None, Some(first));
        let when_true = between(tree, arguments, Some(first), Some(second));
        let when_false = between(tree, arguments, Some(second), None);

        let case = tree.insert_new_before(holder, Tag::CaseStatement, "", function)?;
        let open = tree.append(case, Tag::ContainerOpen, "");
        tree.append(open, Tag::OtherKeyword, "case");
        tree.append(case, Tag::CaseInput, "");

        let when = tree.append(case, Tag::CaseWhen, "");
        let when_open = tree.append(when, Tag::ContainerOpen, "");
        tree.append(when_open, Tag::OtherKeyword, "when");
        let body = tree.append(when, Tag::ContainerGeneralContent, "");
        for node in condition {
            tree.move_to(body, node)?;
        }
        let then = tree.append(when, Tag::CaseThen, "");
        let then_open = tree.append(then, Tag::ContainerOpen, "");
        tree.append(then_open, Tag::OtherKeyword, "then");
        let body = tree.append(then, Tag::ContainerGeneralContent, "");
        for node in when_true {
            tree.move_to(body, node)?;
        }

        let otherwise = tree.append(case, Tag::CaseElse, "");
        let else_open = tree.append(otherwise, Tag::ContainerOpen, "");
        tree.append(else_open, Tag::OtherKeyword, "else");
        let body = tree.append(otherwise, Tag::ContainerGeneralContent, "");
        for node in when_false {
            tree.move_to(body, node)?;
        }
        let close = tree.append(case, Tag::ContainerClose, "");
        tree.append(close, Tag::OtherKeyword, "end");

        tree.remove_child(holder, function)?;
        tree.remove_child(holder, arguments)
    })
}

/// `stuff(s, start, length, replacement)` becomes
/// `overlay(s placing replacement from start for length)`.
pub fn convert_stuff(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::FunctionKeyword, Some("stuff"), |tree, function| {
        let arguments = arguments(tree, function).expected("arguments of stuff")?;
        let commas = tree.children_by_tag(arguments, Tag::Comma);
        let [placing, from, length_for, ..] = commas[..] else {
            return Err(ConvertError::shape("expected four arguments of stuff"));
        };
        let start = tree.next_sibling(placing, false).expected("start of stuff")?;
        let length = tree.next_sibling(from, false).expected("length of stuff")?;
        let replacement = tree
            .next_sibling(length_for, false)
            .expected("replacement of stuff")?;

        tree.set_text(function, "overlay");
        for (comma, keyword) in [(placing, "placing"), (from, "from"), (length_for, "for")] {
            tree.set_tag(comma, Tag::OtherKeyword);
            tree.set_text(comma, keyword);
        }
        tree.remove_child(arguments, start)?;
        tree.remove_child(arguments, length)?;
        tree.remove_child(arguments, replacement)?;
        tree.insert_after(arguments, replacement, placing)?;
        tree.insert_after(arguments, start, from)?;
        tree.insert_after(arguments, length, length_for)
    })
}

/// `cast(x as int)` becomes `x::int`. Compound values are parenthesised.
pub fn convert_cast(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::FunctionKeyword, Some("cast"), |tree, function| {
        let holder = tree.parent(function).expected("expression holding cast")?;
        let arguments = arguments(tree, function).expected("arguments of cast")?;
        let as_keyword = tree
            .child_with_text(arguments, Tag::OtherKeyword, "as")
            .expected("as keyword of cast")?;
        let value = between(tree, arguments, None, Some(as_keyword));
        let target = between(tree, arguments, Some(as_keyword), None);
        if value.is_empty() || target.is_empty() {
            return Err(ConvertError::shape("expected value and type of cast"));
        }

        let significant: Vec<NodeId> = value.iter().copied().filter(|n| !tree.is_noise(*n)).collect();
        let is_simple = match significant[..] {
            [_] => true,
            [_, parens] => tree.is(parens, Tag::FunctionParens),
            _ => false,
        };
        if is_simple {
            for node in value {
                tree.move_before(holder, node, function)?;
            }
        } else {
            let parens = tree.insert_new_before(holder, Tag::ExpressionParens, "", function)?;
            for node in value {
                tree.move_to(parens, node)?;
            }
        }
        tree.insert_new_before(holder, Tag::Period, "::", function)?;
        for node in target {
            tree.move_before(holder, node, function)?;
        }

        tree.remove_child(holder, function)?;
        tree.remove_child(holder, arguments)
    })
}

/// `try_cast(x as int)` becomes `try_cast(x, null::int)`.
pub fn convert_try_cast(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::OtherNode, Some("try_cast"), |tree, function| {
        let arguments = arguments(tree, function).expected("arguments of try_cast")?;
        let as_keyword = tree
            .child_with_text(arguments, Tag::OtherKeyword, "as")
            .expected("as keyword of try_cast")?;
        let target = tree
            .next_sibling(as_keyword, false)
            .expected("type of try_cast")?;

        tree.insert_new_before(arguments, Tag::Comma, ",", as_keyword)?;
        tree.insert_new_before(arguments, Tag::OtherKeyword, "null", target)?;
        tree.insert_new_before(arguments, Tag::Period, "::", target)?;
        tree.remove_child(arguments, as_keyword)
    })
}

/// Rename data types; string types lose their length.
pub fn convert_data_types(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::DataTypeKeyword, None, |tree, data_type| {
        let text = tree.text(data_type).to_lowercase();
        if text == "varchar" || text == "nvarchar" {
            if let Some(length) = tree
                .next_sibling(data_type, false)
                .filter(|p| tree.is(*p, Tag::DdlDetailParens))
            {
                tree.detach(length);
            }
        }
        if let Some(target) = lookup(DATA_TYPES, &text) {
            tree.set_text(data_type, target);
        }
        Ok(())
    })
}

/// `id int identity(1, 1)` becomes `id serial`.
pub fn convert_identity(tree: &mut Tree, _ctx: &mut PassContext) -> ConvertResult<()> {
    for_each_match(tree, Tag::FunctionKeyword, Some("identity"), |tree, identity| {
        let holder = tree.parent(identity).expected("column list holding identity")?;
        let children = tree.snapshot(holder);
        let index = tree.index_of(holder, identity).expected("position of identity")?;
        let column_start = children[..index]
            .iter()
            .rposition(|c| tree.is(*c, Tag::Comma))
            .map_or(0, |i| i + 1);
        let data_type = children[column_start..index]
            .iter()
            .copied()
            .find(|c| tree.is(*c, Tag::DataTypeKeyword))
            .expected("data type of the identity column")?;

        if let Some(seed) = tree
            .next_sibling(identity, false)
            .filter(|p| tree.is(*p, Tag::FunctionParens))
        {
            tree.remove_child(holder, seed)?;
        }
        tree.remove_child(holder, identity)?;

        let serial = match tree.text(data_type).to_lowercase().as_str() {
            "int" => Some("serial"),
            "bigint" => Some("bigserial"),
            _ => None,
        };
        if let Some(serial) = serial {
            tree.set_text(data_type, serial);
        }
        Ok(())
    })
}
