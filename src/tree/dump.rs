//! Box-drawing tree diagrams for debugging.

use std::fmt::Write;

use super::{NodeId, Tree};

impl Tree {
    /// Indented diagram of the subtree at `id`, one node per line.
    pub fn dump(&self, id: NodeId, ignore_whitespace: bool) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, id, ignore_whitespace, &mut Vec::new(), None);
        out
    }

    /// `rails[i]` is true while depth `i` still has siblings to draw.
    fn dump_into(
        &self,
        out: &mut String,
        id: NodeId,
        ignore_whitespace: bool,
        rails: &mut Vec<bool>,
        is_last: Option<bool>,
    ) {
        for open in rails.iter() {
            out.push_str(if *open { "│ " } else { "  " });
        }
        match is_last {
            Some(true) => out.push_str("└─"),
            Some(false) => out.push_str("├─"),
            None => {}
        }

        let text = self.text(id);
        if text.trim().is_empty() {
            let _ = writeln!(out, "{}", self.tag(id));
        } else {
            let escaped = text.replace('\n', "\\n").replace('\t', "\\t");
            let _ = writeln!(out, "{} / {}", escaped, self.tag(id));
        }

        let children: Vec<NodeId> = self
            .children(id)
            .iter()
            .copied()
            .filter(|c| !(ignore_whitespace && self.is_whitespace(*c)))
            .collect();

        if let Some(last) = is_last {
            rails.push(!last);
        }
        for (i, child) in children.iter().enumerate() {
            self.dump_into(out, *child, ignore_whitespace, rails, Some(i + 1 == children.len()));
        }
        if is_last.is_some() {
            rails.pop();
        }
    }
}
