//! Transactions, steps, and position mapping.
//!
//! All document mutation goes through [`Transaction`]: an atomic batch
//! of steps applied to a cloned tree. A step either applies cleanly or
//! the whole transaction is rejected. Every step produces a
//! [`StepMap`]; positions captured before a transaction are remapped
//! functionally through the composed [`Mapping`], never mutated in
//! place.

use std::collections::HashMap;

use livedoc_types::NodeKind;
use serde_json::Value;

use crate::error::TransformError;
use crate::node::{Mark, Node};

// =============================================================================
// Position mapping
// =============================================================================

/// Result of mapping a position through a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    /// True when the position sat strictly inside replaced content.
    pub deleted: bool,
}

/// Position map for a single step: a list of `(start, old_size,
/// new_size)` replaced ranges in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepMap {
    ranges: Vec<(usize, usize, usize)>,
}

impl StepMap {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn single(start: usize, old_size: usize, new_size: usize) -> Self {
        Self {
            ranges: vec![(start, old_size, new_size)],
        }
    }

    /// Map `pos` forward. `assoc` < 0 keeps the position glued to the
    /// content before it, >= 0 to the content after it.
    pub fn map_result(&self, pos: usize, assoc: i8) -> MapResult {
        let mut diff = 0isize;
        for &(start, old_size, new_size) in &self.ranges {
            if start > pos {
                break;
            }
            let end = start + old_size;
            if pos <= end {
                let side = if old_size == 0 {
                    assoc
                } else if pos == start {
                    -1
                } else if pos == end {
                    1
                } else {
                    assoc
                };
                let base = (start as isize + diff) as usize;
                let mapped = if side < 0 { base } else { base + new_size };
                return MapResult {
                    pos: mapped,
                    deleted: pos > start && pos < end,
                };
            }
            diff += new_size as isize - old_size as isize;
        }
        MapResult {
            pos: (pos as isize + diff) as usize,
            deleted: false,
        }
    }

    pub fn map(&self, pos: usize, assoc: i8) -> usize {
        self.map_result(pos, assoc).pos
    }
}

/// A composed sequence of step maps.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    pub maps: Vec<StepMap>,
}

impl Mapping {
    pub fn new(maps: Vec<StepMap>) -> Self {
        Self { maps }
    }

    pub fn append(&mut self, map: StepMap) {
        self.maps.push(map);
    }

    pub fn append_mapping(&mut self, other: &Mapping) {
        self.maps.extend(other.maps.iter().cloned());
    }

    pub fn map_result(&self, pos: usize, assoc: i8) -> MapResult {
        let mut current = pos;
        let mut deleted = false;
        for map in &self.maps {
            let result = map.map_result(current, assoc);
            current = result.pos;
            deleted = deleted || result.deleted;
        }
        MapResult {
            pos: current,
            deleted,
        }
    }

    pub fn map(&self, pos: usize, assoc: i8) -> usize {
        self.map_result(pos, assoc).pos
    }
}

// =============================================================================
// Steps
// =============================================================================

/// One structural operation inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Replace the range `from..to` with new content. Endpoints must
    /// fall on node boundaries within one container, or on character
    /// offsets within one textblock.
    Replace {
        from: usize,
        to: usize,
        content: Vec<Node>,
    },
    /// Change the kind and/or attributes of the node starting at `pos`.
    SetNodeMarkup {
        pos: usize,
        kind: Option<NodeKind>,
        attrs: HashMap<String, Value>,
    },
    /// Add an inline mark over a character range within one textblock.
    AddMark { from: usize, to: usize, mark: Mark },
    /// Remove an inline mark over a character range within one textblock.
    RemoveMark { from: usize, to: usize, mark: Mark },
}

impl Step {
    pub fn apply(&self, doc: &Node) -> Result<Node, TransformError> {
        match self {
            Step::Replace { from, to, content } => apply_replace(doc, *from, *to, content),
            Step::SetNodeMarkup { pos, kind, attrs } => apply_set_markup(doc, *pos, *kind, attrs),
            Step::AddMark { from, to, mark } => apply_mark(doc, *from, *to, mark, true),
            Step::RemoveMark { from, to, mark } => apply_mark(doc, *from, *to, mark, false),
        }
    }

    pub fn map(&self) -> StepMap {
        match self {
            Step::Replace { from, to, content } => {
                let new_size: usize = content.iter().map(Node::size).sum();
                StepMap::single(*from, to - from, new_size)
            }
            _ => StepMap::identity(),
        }
    }
}

/// Index of the child whose boundary sits at content offset `off`, or
/// None when the offset falls inside a child.
fn boundary_index(container: &Node, off: usize) -> Option<usize> {
    let mut acc = 0;
    for (i, child) in container.children.iter().enumerate() {
        if off == acc {
            return Some(i);
        }
        acc += child.size();
    }
    (off == acc).then_some(container.children.len())
}

fn apply_replace(
    doc: &Node,
    from: usize,
    to: usize,
    content: &[Node],
) -> Result<Node, TransformError> {
    if to < from {
        return Err(TransformError::InvalidRange { from, to });
    }
    let rf = doc.resolve(from)?;
    doc.resolve(to)?;

    // Deepest ancestor of `from` whose content also spans `to`.
    let depth = rf
        .frames
        .iter()
        .rposition(|f| f.content_start <= to && to <= f.content_end)
        .ok_or(TransformError::InvalidRange { from, to })?;
    let frame = rf.frames[depth].clone();
    let path = rf.path_to_depth(depth);

    let mut new_doc = doc.clone();
    let container = new_doc
        .node_mut_at_path(&path)
        .ok_or(TransformError::InvalidRange { from, to })?;

    let from_off = from - frame.content_start;
    let to_off = to - frame.content_start;

    if frame.kind.is_textblock() {
        splice_inline(container, from_off, to_off, content, from, to)?;
    } else {
        let start = boundary_index(container, from_off)
            .ok_or(TransformError::InvalidRange { from, to })?;
        let end =
            boundary_index(container, to_off).ok_or(TransformError::InvalidRange { from, to })?;
        container.children.splice(start..end, content.iter().cloned());
    }
    Ok(new_doc)
}

/// Replace a character range of a textblock's inline content.
fn splice_inline(
    textblock: &mut Node,
    from_off: usize,
    to_off: usize,
    content: &[Node],
    from: usize,
    to: usize,
) -> Result<(), TransformError> {
    if content.iter().any(|n| n.kind != NodeKind::Text) {
        return Err(TransformError::InvalidRange { from, to });
    }

    let mut new_children: Vec<Node> = Vec::new();
    let mut inserted = false;
    let mut acc = 0usize;

    let push_text = |out: &mut Vec<Node>, text: String, marks: &[Mark]| {
        if !text.is_empty() {
            out.push(Node::marked_text(text, marks.to_vec()));
        }
    };

    for child in &textblock.children {
        let len = child.text.chars().count();
        let end = acc + len;

        // Part of this leaf before the replaced range.
        if acc < from_off {
            let keep = from_off.min(end) - acc;
            let prefix: String = child.text.chars().take(keep).collect();
            push_text(&mut new_children, prefix, &child.marks);
        }

        if !inserted && end >= from_off {
            new_children.extend(content.iter().cloned());
            inserted = true;
        }

        // Part of this leaf after the replaced range.
        if end > to_off {
            let skip = to_off.max(acc) - acc;
            let suffix: String = child.text.chars().skip(skip).collect();
            push_text(&mut new_children, suffix, &child.marks);
        }

        acc = end;
    }

    if !inserted {
        // Empty textblock, or range at the very end.
        new_children.extend(content.iter().cloned());
    }

    textblock.children = new_children;
    Ok(())
}

fn apply_set_markup(
    doc: &Node,
    pos: usize,
    kind: Option<NodeKind>,
    attrs: &HashMap<String, Value>,
) -> Result<Node, TransformError> {
    let resolved = doc.resolve(pos)?;
    let parent = resolved
        .parent(doc)
        .ok_or(TransformError::NoNodeAt(pos))?;
    let index = resolved.child_index();
    if index >= parent.children.len() || resolved.parent_offset() != parent.child_offset(index) {
        return Err(TransformError::NoNodeAt(pos));
    }

    let mut path = resolved.path_to_depth(resolved.depth());
    path.push(index);

    let mut new_doc = doc.clone();
    let target = new_doc
        .node_mut_at_path(&path)
        .ok_or(TransformError::NoNodeAt(pos))?;
    if let Some(kind) = kind {
        // The step maps positions as an identity, so the node must
        // keep its token size across the kind change.
        if kind.is_leaf() != target.kind.is_leaf() {
            return Err(TransformError::KindChangesSize {
                from: target.kind,
                to: kind,
            });
        }
        target.kind = kind;
    }
    target.attrs = attrs.clone();
    Ok(new_doc)
}

fn apply_mark(
    doc: &Node,
    from: usize,
    to: usize,
    mark: &Mark,
    add: bool,
) -> Result<Node, TransformError> {
    let rf = doc.resolve(from)?;
    let depth = rf.depth();
    let frame = rf.frames[depth].clone();
    if !frame.kind.is_textblock() || to > frame.content_end || to < from {
        return Err(TransformError::MarkRangeOutsideTextblock { from, to });
    }

    let path = rf.path_to_depth(depth);
    let mut new_doc = doc.clone();
    let textblock = new_doc
        .node_mut_at_path(&path)
        .ok_or(TransformError::MarkRangeOutsideTextblock { from, to })?;

    let from_off = from - frame.content_start;
    let to_off = to - frame.content_start;

    let mut new_children: Vec<Node> = Vec::new();
    let mut acc = 0usize;
    for child in &textblock.children {
        let len = child.text.chars().count();
        let end = acc + len;
        let ov_start = from_off.max(acc);
        let ov_end = to_off.min(end);

        if ov_start >= ov_end {
            new_children.push(child.clone());
        } else {
            let chars: Vec<char> = child.text.chars().collect();
            let pre: String = chars[..ov_start - acc].iter().collect();
            let mid: String = chars[ov_start - acc..ov_end - acc].iter().collect();
            let post: String = chars[ov_end - acc..].iter().collect();

            if !pre.is_empty() {
                new_children.push(Node::marked_text(pre, child.marks.clone()));
            }
            let mut marks = child.marks.clone();
            if add {
                if !marks.iter().any(|m| m.kind == mark.kind) {
                    marks.push(mark.clone());
                }
            } else {
                marks.retain(|m| m.kind != mark.kind);
            }
            new_children.push(Node::marked_text(mid, marks));
            if !post.is_empty() {
                new_children.push(Node::marked_text(post, child.marks.clone()));
            }
        }
        acc = end;
    }
    textblock.children = new_children;
    Ok(new_doc)
}

// =============================================================================
// Selection
// =============================================================================

/// A selection: anchor and head positions in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn cursor(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    pub fn is_cursor(&self) -> bool {
        self.anchor == self.head
    }

    pub fn from_to(&self) -> (usize, usize) {
        (self.anchor.min(self.head), self.anchor.max(self.head))
    }

    pub fn map(&self, map: &StepMap) -> Self {
        Self {
            anchor: map.map(self.anchor, -1),
            head: map.map(self.head, -1),
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// An atomic batch of steps plus the resulting selection.
///
/// Steps are applied eagerly to a cloned document as they are added,
/// so position arguments for later steps are interpreted against the
/// transaction's current document.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub before: Node,
    pub doc: Node,
    pub steps: Vec<Step>,
    maps: Vec<StepMap>,
    pub selection: Selection,
    meta: HashMap<String, Value>,
}

impl Transaction {
    pub fn new(doc: Node, selection: Selection) -> Self {
        Self {
            before: doc.clone(),
            doc,
            steps: Vec::new(),
            maps: Vec::new(),
            selection,
            meta: HashMap::new(),
        }
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn mapping(&self) -> Mapping {
        Mapping::new(self.maps.clone())
    }

    /// Apply one step; on failure the transaction is left unchanged.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, TransformError> {
        let new_doc = step.apply(&self.doc)?;
        let map = step.map();
        self.selection = self.selection.map(&map);
        self.doc = new_doc;
        self.steps.push(step);
        self.maps.push(map);
        Ok(self)
    }

    pub fn replace(
        &mut self,
        from: usize,
        to: usize,
        content: Vec<Node>,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::Replace { from, to, content })
    }

    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        self.replace(from, to, Vec::new())
    }

    pub fn insert(&mut self, pos: usize, content: Vec<Node>) -> Result<&mut Self, TransformError> {
        self.replace(pos, pos, content)
    }

    pub fn insert_text(&mut self, pos: usize, text: &str) -> Result<&mut Self, TransformError> {
        if text.is_empty() {
            return Ok(self);
        }
        self.insert(pos, vec![Node::text_leaf(text)])
    }

    pub fn set_node_markup(
        &mut self,
        pos: usize,
        kind: Option<NodeKind>,
        attrs: HashMap<String, Value>,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::SetNodeMarkup { pos, kind, attrs })
    }

    pub fn add_mark(
        &mut self,
        from: usize,
        to: usize,
        mark: Mark,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::AddMark { from, to, mark })
    }

    pub fn remove_mark(
        &mut self,
        from: usize,
        to: usize,
        mark: Mark,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::RemoveMark { from, to, mark })
    }

    pub fn set_selection(&mut self, selection: Selection) -> &mut Self {
        self.selection = selection;
        self
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }
}
