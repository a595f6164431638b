//! Diff regions.
//!
//! Upstream merges wrap disputed content in diff wrapper nodes. A
//! region is tracked by the position before its wrapper; the position
//! is remapped through every transaction's mapping and dropped when
//! the wrapper content was deleted. Resolving a region either keeps
//! its content (wrapper removed, children flattened into the parent)
//! or deletes it.

use livedoc_types::{DiffOrigin, NodeKind};

use crate::error::TransformError;
use crate::node::Node;
use crate::state::EditorState;
use crate::transform::{Mapping, Selection, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Unresolved,
    Kept,
    Deleted,
}

/// One tracked diff region.
#[derive(Debug, Clone)]
pub struct DiffRegion {
    pub origin: DiffOrigin,
    /// Position before the wrapper node, valid for the document the
    /// region was last mapped against.
    pub pos: usize,
    /// Wrapper content at collection time, for review UI.
    pub content_snapshot: Node,
    pub resolution: Resolution,
}

/// All regions of a document, in document order.
#[derive(Debug, Clone, Default)]
pub struct DiffSet {
    pub regions: Vec<DiffRegion>,
}

impl DiffSet {
    /// Collect every diff wrapper in the document.
    pub fn collect(doc: &Node) -> Self {
        let mut regions = Vec::new();
        doc.descendants(&mut |node, pos| {
            if let Some(origin) = node.kind.diff_origin() {
                regions.push(DiffRegion {
                    origin,
                    pos,
                    content_snapshot: node.clone(),
                    resolution: Resolution::Unresolved,
                });
                return false;
            }
            true
        });
        Self { regions }
    }

    /// Remap every region through a transaction mapping, dropping
    /// regions whose wrapper was deleted.
    pub fn map_through(&mut self, mapping: &Mapping) {
        self.regions.retain_mut(|region| {
            // The anchor sits on the wrapper's opening boundary, which
            // never reports deletion itself; probe just inside it.
            if mapping.map_result(region.pos + 1, 1).deleted {
                return false;
            }
            // Forward association keeps the anchor glued to the wrapper
            // when content is inserted exactly at its boundary.
            region.pos = mapping.map(region.pos, 1);
            true
        });
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &DiffRegion> {
        self.regions
            .iter()
            .filter(|r| r.resolution == Resolution::Unresolved)
    }
}

/// The wrapper starting at `pos`, or None when the position is stale.
fn wrapper_at(doc: &Node, pos: usize) -> Option<&Node> {
    doc.node_at(pos).filter(|n| n.kind.is_diff_wrapper())
}

/// Keep a region: remove the wrapper and splice its non-empty children
/// into the parent. Stale positions resolve to None, so calling this
/// twice for the same region is a no-op the second time.
pub fn resolve_keep(
    state: &EditorState,
    pos: usize,
) -> Result<Option<Transaction>, TransformError> {
    let wrapper = match wrapper_at(&state.doc, pos) {
        Some(w) => w,
        None => return Ok(None),
    };
    let size = wrapper.size();
    // An empty region keeps nothing; no placeholder paragraph appears.
    let content: Vec<Node> = wrapper
        .children
        .iter()
        .filter(|child| child.content_size() > 0 || child.kind.is_leaf())
        .cloned()
        .collect();

    let mut tr = state.tr();
    tr.replace(pos, pos + size, content)?;
    tr.set_selection(Selection::cursor(tr.mapping().map(pos, -1)));
    Ok(Some(tr))
}

/// Delete a region. When the wrapper's immediate parent is a list
/// item, the whole list item goes with it.
pub fn resolve_delete(
    state: &EditorState,
    pos: usize,
) -> Result<Option<Transaction>, TransformError> {
    let wrapper = match wrapper_at(&state.doc, pos) {
        Some(w) => w,
        None => return Ok(None),
    };
    let size = wrapper.size();
    let resolved = state.doc.resolve(pos)?;

    let (from, to) = if resolved.parent_kind() == NodeKind::ListItem {
        let depth = resolved
            .ancestor_of_kind(NodeKind::ListItem)
            .ok_or(TransformError::NoNodeAt(pos))?;
        let from = resolved.before(depth).ok_or(TransformError::NoNodeAt(pos))?;
        let to = resolved.after(depth).ok_or(TransformError::NoNodeAt(pos))?;
        (from, to)
    } else {
        (pos, pos + size)
    };

    let mut tr = state.tr();
    tr.delete(from, to)?;
    tr.set_selection(Selection::cursor(tr.mapping().map(from, -1)));
    Ok(Some(tr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper(origin: NodeKind, children: Vec<Node>) -> Node {
        Node::block(origin, children)
    }

    fn doc_with_region() -> Node {
        Node::doc(vec![
            Node::paragraph("before"),
            wrapper(NodeKind::DiffUpstream, vec![Node::paragraph("new text")]),
            Node::paragraph("after"),
        ])
    }

    #[test]
    fn test_collect_regions() {
        let set = DiffSet::collect(&doc_with_region());
        assert_eq!(set.regions.len(), 1);
        assert_eq!(set.regions[0].origin, DiffOrigin::Upstream);
        // "before" paragraph is 8 tokens, so the wrapper starts at 8.
        assert_eq!(set.regions[0].pos, 8);
    }

    #[test]
    fn test_keep_flattens_wrapper() {
        let mut st = EditorState::new(doc_with_region()).unwrap();
        let tr = resolve_keep(&st, 8).unwrap().unwrap();
        st.apply(tr).unwrap();

        assert_eq!(st.doc.children.len(), 3);
        assert_eq!(st.doc.children[1].kind, NodeKind::Paragraph);
        assert_eq!(st.doc.children[1].text_content(), "new text");
    }

    #[test]
    fn test_keep_twice_is_noop() {
        let mut st = EditorState::new(doc_with_region()).unwrap();
        let tr = resolve_keep(&st, 8).unwrap().unwrap();
        st.apply(tr).unwrap();
        let snapshot = st.doc.clone();

        // The stale position now points at an ordinary paragraph.
        assert!(resolve_keep(&st, 8).unwrap().is_none());
        assert_eq!(st.doc, snapshot);
    }

    #[test]
    fn test_keep_empty_region_leaves_nothing() {
        let doc = Node::doc(vec![
            Node::paragraph("x"),
            wrapper(NodeKind::DiffLocal, vec![Node::paragraph("")]),
        ]);
        let mut st = EditorState::new(doc).unwrap();
        let tr = resolve_keep(&st, 3).unwrap().unwrap();
        st.apply(tr).unwrap();

        // No empty paragraph left behind.
        assert_eq!(st.doc.children.len(), 1);
        assert_eq!(st.doc.text_content(), "x");
    }

    #[test]
    fn test_delete_region() {
        let mut st = EditorState::new(doc_with_region()).unwrap();
        let tr = resolve_delete(&st, 8).unwrap().unwrap();
        st.apply(tr).unwrap();

        assert_eq!(st.doc.children.len(), 2);
        assert_eq!(st.doc.text_content(), "beforeafter");
    }

    #[test]
    fn test_delete_inside_list_item_removes_item() {
        let item_with_region = Node::block(
            NodeKind::ListItem,
            vec![wrapper(NodeKind::DiffUpstream, vec![Node::paragraph("a")])],
        );
        let plain_item = Node::block(NodeKind::ListItem, vec![Node::paragraph("b")]);
        let doc = Node::doc(vec![Node::block(
            NodeKind::BulletList,
            vec![item_with_region, plain_item],
        )]);
        let mut st = EditorState::new(doc).unwrap();

        // list at 0, first item content starts at 2; wrapper at 2.
        let tr = resolve_delete(&st, 2).unwrap().unwrap();
        st.apply(tr).unwrap();

        let list = &st.doc.children[0];
        assert_eq!(list.children.len(), 1);
        assert_eq!(list.text_content(), "b");
    }

    #[test]
    fn test_map_through_drops_deleted_region() {
        let mut st = EditorState::new(doc_with_region()).unwrap();
        let mut set = DiffSet::collect(&st.doc);

        let mut tr = st.tr();
        // Delete the wrapper region wholesale (8..20).
        tr.delete(8, 20).unwrap();
        let mapping = tr.mapping();
        st.apply(tr).unwrap();

        set.map_through(&mapping);
        assert!(set.regions.is_empty());
    }

    #[test]
    fn test_map_through_insert_at_wrapper_boundary() {
        let mut st = EditorState::new(doc_with_region()).unwrap();
        let mut set = DiffSet::collect(&st.doc);

        // A block lands exactly at the wrapper's opening boundary (8);
        // the wrapper shifts right and the anchor must follow it.
        let mut tr = st.tr();
        tr.insert(8, vec![Node::paragraph("zz")]).unwrap();
        let mapping = tr.mapping();
        st.apply(tr).unwrap();

        set.map_through(&mapping);
        assert_eq!(set.regions[0].pos, 12);
        assert!(wrapper_at(&st.doc, set.regions[0].pos).is_some());

        // The remapped anchor still resolves for review.
        let tr = resolve_keep(&st, set.regions[0].pos).unwrap();
        assert!(tr.is_some());
    }

    #[test]
    fn test_map_through_shifts_region() {
        let mut st = EditorState::new(doc_with_region()).unwrap();
        let mut set = DiffSet::collect(&st.doc);

        let mut tr = st.tr();
        tr.insert_text(1, "oh ").unwrap();
        let mapping = tr.mapping();
        st.apply(tr).unwrap();

        set.map_through(&mapping);
        assert_eq!(set.regions[0].pos, 11);
    }
}
