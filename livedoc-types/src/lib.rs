//! Shared types for livedoc
//!
//! This crate provides the common vocabulary used across the livedoc
//! workspace: document identifiers and the closed node/mark kind
//! enumerations that the tree, plugin, and diff layers all match on.

use serde::{Deserialize, Serialize};

/// Document identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which replica a divergent content region came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOrigin {
    /// Content present only in the locally edited document.
    Local,
    /// Content present only in the upstream (source-of-truth) document.
    Upstream,
}

impl DiffOrigin {
    /// CSS class hook used by the overlay renderer.
    pub fn class_name(&self) -> &'static str {
        match self {
            DiffOrigin::Local => "diff-local",
            DiffOrigin::Upstream => "diff-upstream",
        }
    }
}

/// Kinds of nodes in the document tree.
///
/// A closed enumeration so that structural dispatch (tables, list
/// items, diff wrappers) is an exhaustive match instead of string
/// comparison on type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Document root
    Doc,
    /// Paragraph
    Paragraph,
    /// Heading (level 1-6 via attrs)
    Heading,
    /// Code block (with optional language)
    CodeBlock,
    /// Block quote
    Blockquote,
    /// Bullet list
    BulletList,
    /// Ordered list
    OrderedList,
    /// List item
    ListItem,
    /// Table
    Table,
    /// Table row
    TableRow,
    /// Table cell (colspan/rowspan via attrs)
    TableCell,
    /// Thematic break (horizontal rule)
    HorizontalRule,
    /// Inline text leaf
    Text,
    /// Wrapper around content that exists only locally
    DiffLocal,
    /// Wrapper around content that exists only upstream
    DiffUpstream,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Doc => "doc",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::CodeBlock => "code_block",
            NodeKind::Blockquote => "blockquote",
            NodeKind::BulletList => "bullet_list",
            NodeKind::OrderedList => "ordered_list",
            NodeKind::ListItem => "list_item",
            NodeKind::Table => "table",
            NodeKind::TableRow => "table_row",
            NodeKind::TableCell => "table_cell",
            NodeKind::HorizontalRule => "horizontal_rule",
            NodeKind::Text => "text",
            NodeKind::DiffLocal => "diff_local",
            NodeKind::DiffUpstream => "diff_upstream",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "doc" => Some(NodeKind::Doc),
            "paragraph" => Some(NodeKind::Paragraph),
            "heading" => Some(NodeKind::Heading),
            "code_block" => Some(NodeKind::CodeBlock),
            "blockquote" => Some(NodeKind::Blockquote),
            "bullet_list" => Some(NodeKind::BulletList),
            "ordered_list" => Some(NodeKind::OrderedList),
            "list_item" => Some(NodeKind::ListItem),
            "table" => Some(NodeKind::Table),
            "table_row" => Some(NodeKind::TableRow),
            "table_cell" => Some(NodeKind::TableCell),
            "horizontal_rule" => Some(NodeKind::HorizontalRule),
            "text" => Some(NodeKind::Text),
            "diff_local" => Some(NodeKind::DiffLocal),
            "diff_upstream" => Some(NodeKind::DiffUpstream),
            _ => None,
        }
    }

    /// Whether this kind holds inline text content directly.
    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading | NodeKind::CodeBlock
        )
    }

    /// Whether this kind can have block children.
    pub fn can_have_children(&self) -> bool {
        matches!(
            self,
            NodeKind::Doc
                | NodeKind::Blockquote
                | NodeKind::BulletList
                | NodeKind::OrderedList
                | NodeKind::ListItem
                | NodeKind::Table
                | NodeKind::TableRow
                | NodeKind::TableCell
                | NodeKind::DiffLocal
                | NodeKind::DiffUpstream
        )
    }

    /// Whether this is a leaf that takes no content at all.
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::HorizontalRule | NodeKind::Text)
    }

    /// Whether this kind wraps a divergent content region.
    pub fn is_diff_wrapper(&self) -> bool {
        matches!(self, NodeKind::DiffLocal | NodeKind::DiffUpstream)
    }

    /// Origin of the diff wrapper, if this is one.
    pub fn diff_origin(&self) -> Option<DiffOrigin> {
        match self {
            NodeKind::DiffLocal => Some(DiffOrigin::Local),
            NodeKind::DiffUpstream => Some(DiffOrigin::Upstream),
            _ => None,
        }
    }

    /// Whether text typed into this block carries the is-code flag
    /// (used by input-rule filtering).
    pub fn is_code(&self) -> bool {
        matches!(self, NodeKind::CodeBlock)
    }
}

/// Kinds of inline formatting marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkKind {
    Strong,
    Em,
    Code,
    Link,
    Strikethrough,
}

impl MarkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkKind::Strong => "strong",
            MarkKind::Em => "em",
            MarkKind::Code => "code",
            MarkKind::Link => "link",
            MarkKind::Strikethrough => "strikethrough",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_roundtrip() {
        for kind in [
            NodeKind::Doc,
            NodeKind::Paragraph,
            NodeKind::Table,
            NodeKind::TableRow,
            NodeKind::TableCell,
            NodeKind::ListItem,
            NodeKind::HorizontalRule,
            NodeKind::DiffLocal,
            NodeKind::DiffUpstream,
        ] {
            assert_eq!(NodeKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_diff_wrapper_origin() {
        assert_eq!(NodeKind::DiffLocal.diff_origin(), Some(DiffOrigin::Local));
        assert_eq!(
            NodeKind::DiffUpstream.diff_origin(),
            Some(DiffOrigin::Upstream)
        );
        assert_eq!(NodeKind::Paragraph.diff_origin(), None);
    }

    #[test]
    fn test_textblock_predicates() {
        assert!(NodeKind::Paragraph.is_textblock());
        assert!(NodeKind::CodeBlock.is_code());
        assert!(!NodeKind::Paragraph.is_code());
        assert!(NodeKind::TableRow.can_have_children());
        assert!(!NodeKind::Text.can_have_children());
    }
}
