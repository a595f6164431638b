//! The document tree.
//!
//! An ordered tree of typed nodes mutated only through transactions.
//! Positions are integer token offsets: a text leaf contributes one
//! token per character, a non-text leaf contributes 1, and every other
//! node contributes 2 (open/close) plus its content. The root's tokens
//! are not counted, so valid positions in a document run from 0 to the
//! root's content size inclusive.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use livedoc_types::{MarkKind, NodeKind};

use crate::error::TransformError;

/// An inline formatting mark attached to a text leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub kind: MarkKind,
    /// Mark attributes (e.g. href for links)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, Value>,
}

impl Mark {
    pub fn new(kind: MarkKind) -> Self {
        Self {
            kind,
            attrs: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }
}

/// A node in the document tree.
///
/// Text leaves carry `text` and `marks`; all other nodes carry
/// `children`. Attributes hold kind-specific data such as heading
/// level or cell colspan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: HashMap::new(),
            text: String::new(),
            marks: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn doc(children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::new(NodeKind::Doc)
        }
    }

    pub fn block(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::new(kind)
        }
    }

    pub fn text_leaf(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::new(NodeKind::Text)
        }
    }

    pub fn marked_text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self {
            text: text.into(),
            marks,
            ..Self::new(NodeKind::Text)
        }
    }

    /// A paragraph containing a single text leaf, or nothing if the
    /// text is empty.
    pub fn paragraph(text: &str) -> Self {
        if text.is_empty() {
            Self::new(NodeKind::Paragraph)
        } else {
            Self::block(NodeKind::Paragraph, vec![Self::text_leaf(text)])
        }
    }

    pub fn horizontal_rule() -> Self {
        Self::new(NodeKind::HorizontalRule)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attrs.get(key).and_then(|v| v.as_u64())
    }

    // -------------------------------------------------------------------------
    // Sizes and positions
    // -------------------------------------------------------------------------

    /// Token count of this node as seen from its parent.
    pub fn size(&self) -> usize {
        match self.kind {
            NodeKind::Text => self.text.chars().count(),
            _ if self.kind.is_leaf() => 1,
            _ => 2 + self.content_size(),
        }
    }

    /// Token count of this node's content.
    pub fn content_size(&self) -> usize {
        if self.kind == NodeKind::Text {
            return self.text.chars().count();
        }
        self.children.iter().map(Node::size).sum()
    }

    /// Concatenated text of all descendant text leaves.
    pub fn text_content(&self) -> String {
        if self.kind == NodeKind::Text {
            return self.text.clone();
        }
        let mut out = String::new();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }

    /// The node starting exactly at `pos` in this document, if any.
    pub fn node_at(&self, pos: usize) -> Option<&Node> {
        let resolved = self.resolve(pos).ok()?;
        let parent = resolved.parent(self)?;
        let index = resolved.child_index();
        let child = parent.children.get(index)?;
        // Only a hit when pos is the child's opening boundary.
        if resolved.parent_offset() == parent.child_offset(index) {
            Some(child)
        } else {
            None
        }
    }

    /// Content offset of child `index` within this node.
    pub fn child_offset(&self, index: usize) -> usize {
        self.children[..index].iter().map(Node::size).sum()
    }

    /// Resolve a position into an ancestor chain.
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, TransformError> {
        if pos > self.content_size() {
            return Err(TransformError::PositionOutOfBounds {
                pos,
                len: self.content_size(),
            });
        }

        let mut frames = Vec::new();
        let mut node = self;
        let mut content_start = 0usize;

        loop {
            let offset = pos - content_start;
            let mut child_index = node.children.len();
            let mut acc = 0usize;
            let mut descend: Option<(usize, usize)> = None;

            for (i, child) in node.children.iter().enumerate() {
                let next = acc + child.size();
                if offset == acc {
                    child_index = i;
                    break;
                }
                if offset < next {
                    child_index = i;
                    descend = Some((i, acc));
                    break;
                }
                acc = next;
                if offset == acc {
                    child_index = i + 1;
                }
            }

            frames.push(AncestorFrame {
                kind: node.kind,
                content_start,
                content_end: content_start + node.content_size(),
                child_index,
            });

            match descend {
                Some((i, child_start)) => {
                    let child = &node.children[i];
                    if child.kind == NodeKind::Text || child.kind.is_leaf() {
                        // Position is inside a leaf; stop here.
                        break;
                    }
                    content_start = content_start + child_start + 1;
                    node = child;
                }
                None => break,
            }
        }

        Ok(ResolvedPos { pos, frames })
    }

    /// Walk all descendants, calling `f` with each node and the
    /// position before it. Returning false skips the node's children.
    pub fn descendants(&self, f: &mut impl FnMut(&Node, usize) -> bool) {
        fn walk(node: &Node, content_start: usize, f: &mut impl FnMut(&Node, usize) -> bool) {
            let mut offset = content_start;
            for child in &node.children {
                if f(child, offset) && !child.children.is_empty() {
                    walk(child, offset + 1, f);
                }
                offset += child.size();
            }
        }
        walk(self, 0, f);
    }

    /// Mutable access to a node by child-index path from the root.
    pub fn node_mut_at_path(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = self;
        for &index in path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    pub fn node_at_path(&self, path: &[usize]) -> Option<&Node> {
        let mut node = self;
        for &index in path {
            node = node.children.get(index)?;
        }
        Some(node)
    }
}

/// One ancestor level of a resolved position.
#[derive(Debug, Clone, PartialEq)]
pub struct AncestorFrame {
    pub kind: NodeKind,
    /// Document position where this ancestor's content begins.
    pub content_start: usize,
    pub content_end: usize,
    /// Index of the child the position points at or into.
    pub child_index: usize,
}

/// A position resolved against a specific document.
///
/// Valid only for the document it was produced from; positions held
/// across transactions must be remapped through the transaction's
/// mapping first.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPos {
    pub pos: usize,
    /// Ancestor chain, root first.
    pub frames: Vec<AncestorFrame>,
}

impl ResolvedPos {
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn deepest(&self) -> &AncestorFrame {
        self.frames.last().expect("resolved position has a root frame")
    }

    /// Kind of the innermost ancestor containing the position.
    pub fn parent_kind(&self) -> NodeKind {
        self.deepest().kind
    }

    /// Offset within the innermost ancestor's content.
    pub fn parent_offset(&self) -> usize {
        self.pos - self.deepest().content_start
    }

    /// Child index within the innermost ancestor.
    pub fn child_index(&self) -> usize {
        self.deepest().child_index
    }

    /// Position just before the ancestor node at `depth` (1-based into
    /// the chain; the root has no before position).
    pub fn before(&self, depth: usize) -> Option<usize> {
        if depth == 0 || depth > self.depth() {
            return None;
        }
        Some(self.frames[depth].content_start - 1)
    }

    /// Position just after the ancestor node at `depth`.
    pub fn after(&self, depth: usize) -> Option<usize> {
        if depth == 0 || depth > self.depth() {
            return None;
        }
        Some(self.frames[depth].content_end + 1)
    }

    /// The ancestor node at `depth`, looked up in `doc`.
    pub fn node<'a>(&self, doc: &'a Node, depth: usize) -> Option<&'a Node> {
        doc.node_at_path(&self.path_to_depth(depth))
    }

    /// The innermost ancestor node, looked up in `doc`.
    pub fn parent<'a>(&self, doc: &'a Node) -> Option<&'a Node> {
        self.node(doc, self.depth())
    }

    /// Child-index path from the root down to the ancestor at `depth`.
    pub fn path_to_depth(&self, depth: usize) -> Vec<usize> {
        self.frames[..depth].iter().map(|f| f.child_index).collect()
    }

    /// Find the shallowest-to-deepest ancestor of the given kind.
    pub fn ancestor_of_kind(&self, kind: NodeKind) -> Option<usize> {
        self.frames.iter().rposition(|f| f.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Node {
        Node::doc(vec![
            Node::paragraph("hello"),
            Node::block(
                NodeKind::BulletList,
                vec![Node::block(NodeKind::ListItem, vec![Node::paragraph("item")])],
            ),
        ])
    }

    #[test]
    fn test_sizes() {
        let doc = sample_doc();
        // paragraph "hello" = 2 + 5 = 7
        assert_eq!(doc.children[0].size(), 7);
        // list item: paragraph "item" = 6, li = 8, list = 10
        assert_eq!(doc.children[1].size(), 10);
        assert_eq!(doc.content_size(), 17);
    }

    #[test]
    fn test_resolve_inside_paragraph() {
        let doc = sample_doc();
        let r = doc.resolve(3).unwrap();
        assert_eq!(r.parent_kind(), NodeKind::Paragraph);
        assert_eq!(r.parent_offset(), 2);
    }

    #[test]
    fn test_resolve_block_boundary() {
        let doc = sample_doc();
        let r = doc.resolve(7).unwrap();
        assert_eq!(r.parent_kind(), NodeKind::Doc);
        assert_eq!(r.child_index(), 1);
    }

    #[test]
    fn test_resolve_out_of_bounds() {
        let doc = sample_doc();
        assert!(doc.resolve(99).is_err());
    }

    #[test]
    fn test_node_at() {
        let doc = sample_doc();
        assert_eq!(doc.node_at(0).map(|n| n.kind), Some(NodeKind::Paragraph));
        assert_eq!(doc.node_at(7).map(|n| n.kind), Some(NodeKind::BulletList));
        assert_eq!(doc.node_at(8).map(|n| n.kind), Some(NodeKind::ListItem));
        assert_eq!(doc.node_at(3), None);
    }

    #[test]
    fn test_resolved_node_outlives_resolution() {
        let doc = sample_doc();
        // The returned reference borrows from the document, not from
        // the resolved position.
        let parent = {
            let r = doc.resolve(3).unwrap();
            r.parent(&doc).unwrap()
        };
        assert_eq!(parent.kind, NodeKind::Paragraph);
    }

    #[test]
    fn test_ancestor_of_kind() {
        let doc = sample_doc();
        // Inside the nested paragraph text.
        let r = doc.resolve(11).unwrap();
        assert_eq!(r.parent_kind(), NodeKind::Paragraph);
        let li_depth = r.ancestor_of_kind(NodeKind::ListItem).unwrap();
        assert_eq!(r.before(li_depth), Some(8));
        assert_eq!(r.after(li_depth), Some(16));
    }

    #[test]
    fn test_text_content() {
        let doc = sample_doc();
        assert_eq!(doc.text_content(), "helloitem");
    }
}
