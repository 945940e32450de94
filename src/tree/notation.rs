//! S-expression notation for syntax trees.
//!
//! ```text
//! (Clause {simpleText="begin"}
//!   (OtherKeyword "select")
//!   (WhiteSpace " ")
//!   (OtherNode "a"))
//! ```
//!
//! A node is a parenthesised tag name, an optional attribute map, an optional
//! quoted text and any number of child nodes. Strings accept the escapes
//! `\\`, `\"`, `\n`, `\r` and `\t`.

use std::fmt::Write;

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while1},
    character::complete::{char, multispace0, none_of},
    combinator::{opt, value},
    multi::many0,
    sequence::{delimited, preceded, separated_pair, terminated},
    IResult,
};

use super::{NodeId, Tag, Tree};
use crate::error::{ConvertError, ConvertResult};

struct RawNode<'a> {
    tag: &'a str,
    /// Input length remaining at the tag name.
    remaining: usize,
    attributes: Vec<(&'a str, String)>,
    text: Option<String>,
    children: Vec<RawNode<'a>>,
}

/// Parse a tree from notation. The outermost node becomes the root.
pub fn parse(input: &str) -> ConvertResult<Tree> {
    match delimited(multispace0, parse_node, multispace0)(input) {
        Ok(("", raw)) => {
            let len = input.len();
            let mut tree = Tree::with_root(tag_of(&raw, len)?, raw.text.as_deref().unwrap_or(""));
            let root = tree.root();
            fill(&mut tree, root, raw, len)?;
            Ok(tree)
        }
        Ok((remaining, _)) => Err(ConvertError::parse(
            input.len() - remaining.len(),
            format!("Unexpected trailing content: '{}'", preview(remaining)),
        )),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ConvertError::parse(
            input.len() - e.input.len(),
            format!("Expected node near '{}'", preview(e.input)),
        )),
        Err(nom::Err::Incomplete(_)) => Err(ConvertError::parse(input.len(), "Incomplete input")),
    }
}

/// Render the subtree at `id` as notation, one node per line.
pub fn write(tree: &Tree, id: NodeId) -> String {
    let mut out = String::new();
    write_node(tree, id, 0, &mut out);
    out
}

fn preview(input: &str) -> String {
    input.chars().take(20).collect()
}

fn tag_of(raw: &RawNode<'_>, len: usize) -> ConvertResult<Tag> {
    raw.tag.parse::<Tag>().map_err(|_| {
        ConvertError::parse(len - raw.remaining, format!("Unknown tag: '{}'", raw.tag))
    })
}

fn fill(tree: &mut Tree, id: NodeId, raw: RawNode<'_>, len: usize) -> ConvertResult<()> {
    for (key, val) in raw.attributes {
        tree.set_attribute(id, key, val);
    }
    for child in raw.children {
        let child_id = tree.append(id, tag_of(&child, len)?, child.text.as_deref().unwrap_or(""));
        fill(tree, child_id, child, len)?;
    }
    Ok(())
}

// ==================== Reader ====================

fn parse_node(input: &str) -> IResult<&str, RawNode<'_>> {
    let (input, _) = char('(')(input)?;
    let (input, _) = multispace0(input)?;
    let remaining = input.len();
    let (input, tag_name) = parse_identifier(input)?;
    let (input, attributes) = opt(preceded(multispace0, parse_attributes))(input)?;
    let (input, text) = opt(preceded(multispace0, parse_string))(input)?;
    let (input, children) = many0(preceded(multispace0, parse_node))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;

    Ok((
        input,
        RawNode {
            tag: tag_name,
            remaining,
            attributes: attributes.unwrap_or_default(),
            text,
            children,
        },
    ))
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// `{key="value", other="value"}`; the commas are optional.
fn parse_attributes(input: &str) -> IResult<&str, Vec<(&str, String)>> {
    delimited(
        char('{'),
        many0(delimited(
            multispace0,
            separated_pair(
                parse_identifier,
                delimited(multispace0, char('='), multispace0),
                parse_string,
            ),
            terminated(multispace0, opt(char(','))),
        )),
        preceded(multispace0, char('}')),
    )(input)
}

fn parse_string(input: &str) -> IResult<&str, String> {
    alt((
        value(String::new(), tag("\"\"")),
        delimited(
            char('"'),
            escaped_transform(
                none_of("\\\""),
                '\\',
                alt((
                    value("\\", char('\\')),
                    value("\"", char('"')),
                    value("\n", char('n')),
                    value("\r", char('r')),
                    value("\t", char('t')),
                )),
            ),
            char('"'),
        ),
    ))(input)
}

// ==================== Writer ====================

fn write_node(tree: &Tree, id: NodeId, depth: usize, out: &mut String) {
    let _ = write!(out, "{}({}", "  ".repeat(depth), tree.tag(id));
    let attributes = tree.attributes(id);
    if !attributes.is_empty() {
        let pairs: Vec<String> = attributes
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape(v)))
            .collect();
        let _ = write!(out, " {{{}}}", pairs.join(", "));
    }
    if !tree.text(id).is_empty() {
        let _ = write!(out, " \"{}\"", escape(tree.text(id)));
    }
    for child in tree.children(id) {
        out.push('\n');
        write_node(tree, *child, depth + 1, out);
    }
    out.push(')');
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_nested() {
        let tree = parse(
            r#"(Root
                (Statement
                    (Clause {simpleText="begin", kind="x"}
                        (OtherKeyword "select")
                        (WhiteSpace "\n\t")
                        (String "say \"hi\""))))"#,
        )
        .unwrap();
        let clause = tree.path(tree.root(), &[Tag::Statement, Tag::Clause]).unwrap();
        assert_eq!(tree.attribute(clause, "simpleText"), Some("begin"));
        assert_eq!(tree.attribute(clause, "kind"), Some("x"));
        let children = tree.children(clause);
        assert_eq!(children.len(), 3);
        assert_eq!(tree.text(children[1]), "\n\t");
        assert_eq!(tree.text(children[2]), "say \"hi\"");
    }

    #[test]
    fn test_parse_empty_string() {
        let tree = parse(r#"(Clause (String ""))"#).unwrap();
        let child = tree.children(tree.root())[0];
        assert!(tree.is(child, Tag::String));
        assert_eq!(tree.text(child), "");
    }

    #[test]
    fn test_unknown_tag_reports_position() {
        let err = parse("(Root (Nope))").unwrap_err();
        assert!(matches!(err, ConvertError::Parse { position: 7, .. }));
    }

    #[test]
    fn test_trailing_content() {
        let err = parse("(Root) junk").unwrap_err();
        assert!(matches!(err, ConvertError::Parse { .. }));
    }

    #[test]
    fn test_write_then_parse_preserves_shape() {
        let source = r#"(Clause {simpleText="end"} (OtherNode "a\\b") (WhiteSpace "\n"))"#;
        let tree = parse(source).unwrap();
        let written = write(&tree, tree.root());
        assert_eq!(
            written,
            "(Clause {simpleText=\"end\"}\n  (OtherNode \"a\\\\b\")\n  (WhiteSpace \"\\n\"))"
        );
        let again = parse(&written).unwrap();
        assert_eq!(again.dump(again.root(), false), tree.dump(tree.root(), false));
    }
}
