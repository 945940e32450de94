//! Compact single-line rendering of a subtree.
//!
//! This is a diagnostic view: tokens are separated by one space, whitespace
//! nodes are dropped and punctuation is glued to its neighbours. Real output
//! formatting belongs to the formatter that consumes the converted tree.

use super::{NodeId, SIMPLE_TEXT, Tag, Tree};

struct Token {
    text: String,
    glue_left: bool,
    glue_right: bool,
}

impl Token {
    fn plain(text: String) -> Self {
        let glue_left = matches!(
            text.as_str(),
            "," | ";" | "." | "::" | "[]" | ")" | "[" | "]" | ":"
        );
        let glue_right = matches!(text.as_str(), "." | "::" | "[");
        Self {
            text,
            glue_left,
            glue_right,
        }
    }
}

/// Render the subtree at `id` as space-separated tokens.
pub fn compact(tree: &Tree, id: NodeId) -> String {
    let mut tokens = Vec::new();
    collect(tree, id, &mut tokens);

    let mut out = String::new();
    let mut glue_next = true;
    for token in tokens {
        if !(glue_next || token.glue_left) {
            out.push(' ');
        }
        out.push_str(&token.text);
        glue_next = token.glue_right;
    }
    out
}

/// Text of a single token as it would appear in SQL.
pub fn token_text(tree: &Tree, id: NodeId) -> String {
    let text = tree.text(id);
    match tree.tag(id) {
        Tag::String => format!("'{}'", text.replace('\'', "''")),
        Tag::NString => format!("N'{}'", text.replace('\'', "''")),
        Tag::QuotedString => format!("\"{text}\""),
        Tag::BracketQuotedName => format!("[{text}]"),
        Tag::CommentMultiLine => format!("/*{text}*/"),
        Tag::CommentSingleLine => format!("--{text}"),
        Tag::CommentSingleLineCStyle => format!("//{text}"),
        _ => text.to_string(),
    }
}

fn collect(tree: &Tree, id: NodeId, tokens: &mut Vec<Token>) {
    if let Some(simple) = tree.attribute(id, SIMPLE_TEXT) {
        if !simple.trim().is_empty() {
            tokens.push(Token::plain(simple.trim().to_string()));
        }
        return;
    }

    let tag = tree.tag(id);
    if tag == Tag::WhiteSpace {
        return;
    }

    if tag.is_parens() {
        tokens.push(Token {
            text: "(".to_string(),
            glue_left: matches!(tag, Tag::FunctionParens | Tag::DdlParens | Tag::DdlDetailParens),
            glue_right: true,
        });
        for child in tree.children(id) {
            collect(tree, *child, tokens);
        }
        tokens.push(Token::plain(")".to_string()));
        return;
    }

    if tag.is_token() {
        let text = token_text(tree, id);
        if !text.is_empty() {
            tokens.push(Token::plain(text));
        }
    } else if !tree.text(id).trim().is_empty() {
        tokens.push(Token::plain(tree.text(id).to_string()));
    }
    for child in tree.children(id) {
        collect(tree, *child, tokens);
    }
}
