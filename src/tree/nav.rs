//! Structural queries over a [`Tree`].
//!
//! Sibling lookups skip whitespace, and comments unless asked otherwise, so
//! rewrites can reason about significant tokens only.

use super::{NodeId, Tag, Tree};

/// Reserved words that are still usable as column names.
pub const KEYWORDS_USABLE_AS_NAMES: &[&str] = &[
    "value", "text", "status", "str", "datetime", "date", "query", "language",
];

impl Tree {
    pub fn is(&self, id: NodeId, tag: Tag) -> bool {
        self.tag(id) == tag
    }

    /// Tag matches and text matches case-insensitively.
    pub fn is_text(&self, id: NodeId, tag: Tag, text: &str) -> bool {
        self.tag(id) == tag && self.text(id).eq_ignore_ascii_case(text)
    }

    pub fn has_text(&self, id: NodeId, text: &str) -> bool {
        self.text(id).eq_ignore_ascii_case(text)
    }

    pub fn is_whitespace(&self, id: NodeId) -> bool {
        self.tag(id) == Tag::WhiteSpace
    }

    pub fn is_comment(&self, id: NodeId) -> bool {
        self.tag(id).is_comment()
    }

    /// Whitespace or comment.
    pub fn is_noise(&self, id: NodeId) -> bool {
        self.is_whitespace(id) || self.is_comment(id)
    }

    /// Whether the node can serve as an identifier.
    pub fn is_name(&self, id: NodeId) -> bool {
        matches!(self.tag(id), Tag::OtherNode | Tag::BracketQuotedName)
            || KEYWORDS_USABLE_AS_NAMES
                .iter()
                .any(|k| self.text(id).eq_ignore_ascii_case(k))
    }

    // ==================== Children ====================

    /// First direct child with the tag and, if given, the text.
    pub fn child_by_tag_and_text(&self, id: NodeId, tag: Tag, text: Option<&str>) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.tag(*c) == tag && text.is_none_or(|t| self.has_text(*c, t)))
    }

    /// Last direct child with the tag and, if given, the text.
    pub fn last_child_by_tag_and_text(
        &self,
        id: NodeId,
        tag: Tag,
        text: Option<&str>,
    ) -> Option<NodeId> {
        self.children(id)
            .iter()
            .rev()
            .copied()
            .find(|c| self.tag(*c) == tag && text.is_none_or(|t| self.has_text(*c, t)))
    }

    pub fn child_by_tag(&self, id: NodeId, tag: Tag) -> Option<NodeId> {
        self.child_by_tag_and_text(id, tag, None)
    }

    pub fn child_with_text(&self, id: NodeId, tag: Tag, text: &str) -> Option<NodeId> {
        self.child_by_tag_and_text(id, tag, Some(text))
    }

    pub fn last_child_by_tag(&self, id: NodeId, tag: Tag) -> Option<NodeId> {
        self.last_child_by_tag_and_text(id, tag, None)
    }

    pub fn children_by_tag(&self, id: NodeId, tag: Tag) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.tag(*c) == tag)
            .collect()
    }

    /// Children that are neither whitespace nor comments.
    pub fn significant_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| !self.is_noise(*c))
            .collect()
    }

    pub fn first_significant_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).iter().copied().find(|c| !self.is_noise(*c))
    }

    pub fn last_significant_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .rev()
            .copied()
            .find(|c| !self.is_noise(*c))
    }

    pub fn last_non_whitespace_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .rev()
            .copied()
            .find(|c| !self.is_whitespace(*c))
    }

    /// Clause of a statement whose first significant token matches.
    pub fn clause_starting_with(&self, statement: NodeId, tag: Tag, text: &str) -> Option<NodeId> {
        self.children(statement).iter().copied().find(|c| {
            self.is(*c, Tag::Clause)
                && self
                    .first_significant_child(*c)
                    .is_some_and(|f| self.is_text(f, tag, text))
        })
    }

    /// First child that itself has a direct child with the tag and text,
    /// e.g. the clause of a statement holding a given keyword.
    pub fn child_containing(&self, id: NodeId, tag: Tag, text: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.child_with_text(*c, tag, text).is_some())
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// Follow the first child with each tag in turn.
    pub fn path(&self, id: NodeId, tags: &[Tag]) -> Option<NodeId> {
        tags.iter()
            .try_fold(id, |current, tag| self.child_by_tag(current, *tag))
    }

    /// Every node below `id`, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn has_descendant(&self, id: NodeId, predicate: impl Fn(NodeId) -> bool) -> bool {
        self.descendants(id).into_iter().any(predicate)
    }

    // ==================== Ancestors ====================

    /// Nearest ancestor with the tag, not including the node itself.
    pub fn closest_ancestor(&self, id: NodeId, tag: Tag) -> Option<NodeId> {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if self.tag(current) == tag {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }

    /// Whether `ancestor` is on the parent chain of `id`.
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    // ==================== Siblings ====================

    /// Next child of `parent` after `from`, skipping whitespace, and comments
    /// unless `allow_comments` is set.
    pub fn following_sibling(&self, parent: NodeId, from: NodeId, allow_comments: bool) -> Option<NodeId> {
        let children = self.children(parent);
        let index = children.iter().position(|c| *c == from)?;
        children[index + 1..].iter().copied().find(|c| {
            !self.is_whitespace(*c) && (allow_comments || !self.is_comment(*c))
        })
    }

    /// Previous child of `parent` before `from`, skipping whitespace and comments.
    pub fn preceding_sibling(&self, parent: NodeId, from: NodeId) -> Option<NodeId> {
        let children = self.children(parent);
        let index = children.iter().position(|c| *c == from)?;
        children[..index]
            .iter()
            .rev()
            .copied()
            .find(|c| !self.is_noise(*c))
    }

    pub fn next_sibling(&self, id: NodeId, allow_comments: bool) -> Option<NodeId> {
        self.following_sibling(self.parent(id)?, id, allow_comments)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.preceding_sibling(self.parent(id)?, id)
    }

    /// Immediate next sibling, whatever it is.
    pub fn next_adjacent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_of(parent, id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Immediate previous sibling, whatever it is.
    pub fn prev_adjacent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_of(parent, id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// Siblings after `id` up to the end of its parent.
    pub fn siblings_after(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let children = self.children(parent);
        match children.iter().position(|c| *c == id) {
            Some(i) => children[i + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    // ==================== Terminators ====================

    /// A semicolon child, or the one nested in the last non-whitespace child.
    pub fn find_terminating_semicolon(&self, id: NodeId) -> Option<NodeId> {
        if self.children(id).is_empty() {
            return None;
        }
        if let Some(semicolon) = self.child_by_tag(id, Tag::Semicolon) {
            return Some(semicolon);
        }
        let last = self.last_non_whitespace_child(id)?;
        self.find_terminating_semicolon(last)
    }

    pub fn ends_with_semicolon(&self, id: NodeId) -> bool {
        self.find_terminating_semicolon(id).is_some()
    }
}
