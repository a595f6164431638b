//! Table structural invariant enforcement.
//!
//! Tables keep a single-cell header row spanning every column. Two
//! paths maintain it: an append-transaction enforcer that watches
//! committed batches for column growth, and a synchronous add-column
//! command. Both rebuild the header through the same function so the
//! result cannot drift.
//!
//! The policy is asymmetric on purpose: growth widens the header,
//! shrink leaves it alone, and a table whose header has no label is
//! never touched.

use livedoc_types::NodeKind;
use serde_json::json;
use tracing::debug;

use crate::error::TransformError;
use crate::node::Node;
use crate::plugins::Plugin;
use crate::state::EditorState;
use crate::transform::{Mapping, Selection, Transaction};

/// Derived shape of one table, recomputed per doc-changing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStructuralState {
    /// Widest body row, measured in colspan units.
    pub column_count: usize,
    pub header_cell_count: usize,
    pub header_colspan: usize,
}

impl TableStructuralState {
    pub fn of(table: &Node) -> Self {
        let header = table.children.first();
        let header_cell_count = header.map(|r| r.children.len()).unwrap_or(0);
        let header_colspan = header.map(row_colspan).unwrap_or(0);
        let column_count = table
            .children
            .iter()
            .skip(1)
            .map(row_colspan)
            .max()
            .unwrap_or(header_colspan);
        Self {
            column_count,
            header_cell_count,
            header_colspan,
        }
    }

    /// Whether the header already has the enforced one-cell shape.
    fn header_conforms(&self) -> bool {
        self.header_cell_count == 1 && self.header_colspan == self.column_count
    }
}

fn cell_colspan(cell: &Node) -> usize {
    cell.attr_u64("colspan").unwrap_or(1) as usize
}

fn row_colspan(row: &Node) -> usize {
    row.children.iter().map(cell_colspan).sum()
}

/// Label shown in the header: first non-empty cell text of the row.
fn header_label(table: &Node) -> Option<String> {
    let header = table.children.first()?;
    header
        .children
        .iter()
        .map(|cell| cell.text_content())
        .find(|text| !text.trim().is_empty())
}

/// The canonical header: one cell spanning all columns, one paragraph
/// holding the label.
pub fn rebuild_header_row(label: &str, columns: usize) -> Node {
    let cell = Node::block(NodeKind::TableCell, vec![Node::paragraph(label)])
        .with_attr("colspan", json!(columns))
        .with_attr("rowspan", json!(1));
    Node::block(NodeKind::TableRow, vec![cell])
}

fn empty_cell() -> Node {
    Node::block(NodeKind::TableCell, vec![Node::paragraph("")])
}

// =============================================================================
// Append-transaction enforcer
// =============================================================================

pub struct TableFixPlugin;

impl Plugin for TableFixPlugin {
    fn name(&self) -> &'static str {
        "table_fix"
    }

    fn append_transaction(
        &self,
        batch: &[Transaction],
        old_doc: &Node,
        _old_selection: Selection,
        state: &EditorState,
    ) -> Result<Option<Transaction>, TransformError> {
        if !batch.iter().any(Transaction::doc_changed) {
            return Ok(None);
        }

        let mut mapping = Mapping::default();
        for tr in batch {
            mapping.append_mapping(&tr.mapping());
        }

        let mut old_tables: Vec<(usize, Node)> = Vec::new();
        old_doc.descendants(&mut |node, pos| {
            if node.kind == NodeKind::Table {
                old_tables.push((pos, node.clone()));
                return false;
            }
            true
        });

        let mut repair: Option<Transaction> = None;
        for (old_pos, old_table) in old_tables {
            let mapped = mapping.map_result(old_pos, -1);
            if mapped.deleted {
                continue;
            }
            // Steps already queued in this repair shift later tables.
            let pos = match &repair {
                Some(tr) => tr.mapping().map(mapped.pos, -1),
                None => mapped.pos,
            };
            let doc = repair.as_ref().map(|tr| &tr.doc).unwrap_or(&state.doc);

            // Identity lost across the batch: skip, never guess.
            let new_table = match doc.node_at(pos) {
                Some(n) if n.kind == NodeKind::Table => n,
                _ => continue,
            };

            let old_cols = TableStructuralState::of(&old_table).column_count;
            let snap = TableStructuralState::of(new_table);
            if snap.column_count <= old_cols || snap.header_conforms() {
                continue;
            }
            let label = match header_label(&old_table) {
                Some(l) => l,
                None => {
                    debug!(pos, "table grew but old header has no label; leaving it");
                    continue;
                }
            };
            let header = match new_table.children.first() {
                Some(h) => h,
                None => continue,
            };

            let header_from = pos + 1;
            let header_to = header_from + header.size();
            let new_header = rebuild_header_row(&label, snap.column_count);

            let tr = repair.get_or_insert_with(|| state.tr());
            tr.replace(header_from, header_to, vec![new_header])?;
        }

        Ok(repair.filter(Transaction::doc_changed))
    }
}

// =============================================================================
// Synchronous add-column command
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSide {
    Before,
    After,
}

/// Insert a column next to the cell containing `pos`, then rebuild the
/// header inline. Returns None when `pos` is not inside a table.
pub fn add_column(
    state: &EditorState,
    pos: usize,
    side: ColumnSide,
) -> Result<Option<Transaction>, TransformError> {
    let resolved = state.doc.resolve(pos)?;
    let table_depth = match resolved.ancestor_of_kind(NodeKind::Table) {
        Some(d) => d,
        None => return Ok(None),
    };
    let row_depth = match resolved.ancestor_of_kind(NodeKind::TableRow) {
        Some(d) => d,
        None => return Ok(None),
    };
    let table = resolved
        .node(&state.doc, table_depth)
        .ok_or(TransformError::NoNodeAt(pos))?;
    let row = resolved
        .node(&state.doc, row_depth)
        .ok_or(TransformError::NoNodeAt(pos))?;

    // Target column boundary in colspan units.
    let cell_index = resolved.frames[row_depth].child_index;
    let mut col: usize = row.children[..cell_index.min(row.children.len())]
        .iter()
        .map(cell_colspan)
        .sum();
    if side == ColumnSide::After {
        if let Some(cell) = row.children.get(cell_index) {
            col += cell_colspan(cell);
        }
    }

    let table_content = resolved.frames[table_depth].content_start;
    let snap = TableStructuralState::of(table);
    let new_cols = snap.column_count + 1;

    // Collect body-row insertion points, then apply bottom-up so the
    // earlier positions stay valid.
    let mut inserts = Vec::new();
    let mut row_start = table_content;
    for (i, r) in table.children.iter().enumerate() {
        if i > 0 {
            inserts.push(row_start + 1 + insertion_offset(r, col));
        }
        row_start += r.size();
    }

    let mut tr = state.tr();
    for at in inserts.into_iter().rev() {
        tr.insert(at, vec![empty_cell()])?;
    }

    if let Some(label) = header_label(table) {
        if let Some(header) = table.children.first() {
            let header_from = table_content;
            let header_to = header_from + header.size();
            tr.replace(header_from, header_to, vec![rebuild_header_row(&label, new_cols)])?;
        }
    }

    let cursor = tr.mapping().map(pos, -1);
    tr.set_selection(Selection::cursor(cursor));
    Ok(Some(tr))
}

/// Token offset within a row's content where a cell at column `col`
/// should be inserted.
fn insertion_offset(row: &Node, col: usize) -> usize {
    let mut spans = 0usize;
    let mut off = 0usize;
    for cell in &row.children {
        if spans >= col {
            return off;
        }
        spans += cell_colspan(cell);
        off += cell.size();
    }
    off
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cell(text: &str) -> Node {
        Node::block(NodeKind::TableCell, vec![Node::paragraph(text)])
    }

    /// Header: one cell "Data" spanning 2; body: cells "a", "b".
    fn sample_table() -> Node {
        let header = rebuild_header_row("Data", 2);
        let body = Node::block(NodeKind::TableRow, vec![cell("a"), cell("b")]);
        Node::block(NodeKind::Table, vec![header, body])
    }

    fn state_with_table() -> EditorState {
        EditorState::with_plugins(
            Node::doc(vec![sample_table()]),
            vec![Arc::new(TableFixPlugin)],
        )
        .unwrap()
    }

    #[test]
    fn test_structural_state() {
        let snap = TableStructuralState::of(&sample_table());
        assert_eq!(snap.column_count, 2);
        assert_eq!(snap.header_cell_count, 1);
        assert_eq!(snap.header_colspan, 2);
        assert!(snap.header_conforms());
    }

    #[test]
    fn test_growth_rebuilds_header() {
        let mut st = state_with_table();
        let mut tr = st.tr();
        // Body row content ends at 22; append a third cell there.
        tr.insert(22, vec![cell("c")]).unwrap();
        let batch = st.apply(tr).unwrap();

        assert_eq!(batch.len(), 2);
        let header = &st.doc.children[0].children[0];
        assert_eq!(header.children.len(), 1);
        assert_eq!(header.children[0].attr_u64("colspan"), Some(3));
        assert_eq!(header.text_content(), "Data");
    }

    #[test]
    fn test_shrink_is_not_repaired() {
        let mut st = state_with_table();
        let mut tr = st.tr();
        // Delete the second body cell (17..22).
        tr.delete(17, 22).unwrap();
        let batch = st.apply(tr).unwrap();

        assert_eq!(batch.len(), 1);
        let header = &st.doc.children[0].children[0];
        assert_eq!(header.children[0].attr_u64("colspan"), Some(2));
    }

    #[test]
    fn test_deleted_table_is_skipped() {
        let mut st = state_with_table();
        let mut tr = st.tr();
        tr.delete(0, 24).unwrap();
        let batch = st.apply(tr).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(st.doc.children.is_empty());
    }

    #[test]
    fn test_unlabeled_header_is_left_alone() {
        let header = rebuild_header_row("", 2);
        let body = Node::block(NodeKind::TableRow, vec![cell("a"), cell("b")]);
        let table = Node::block(NodeKind::Table, vec![header, body]);
        let mut st = EditorState::with_plugins(
            Node::doc(vec![table]),
            vec![Arc::new(TableFixPlugin)],
        )
        .unwrap();

        let mut tr = st.tr();
        // Header "Data" shrank to "": row is 2 tokens shorter, so the
        // body row's content now ends at 18.
        tr.insert(18, vec![cell("c")]).unwrap();
        let batch = st.apply(tr).unwrap();

        assert_eq!(batch.len(), 1);
        let hdr = &st.doc.children[0].children[0];
        assert_eq!(hdr.children[0].attr_u64("colspan"), Some(2));
    }

    #[test]
    fn test_add_column_after() {
        let st = state_with_table();
        // Position 14 sits inside the "a" cell's paragraph.
        let tr = add_column(&st, 14, ColumnSide::After).unwrap().unwrap();

        let table = &tr.doc.children[0];
        let body = &table.children[1];
        assert_eq!(body.children.len(), 3);
        // New cell lands between "a" and "b".
        assert_eq!(body.children[0].text_content(), "a");
        assert_eq!(body.children[1].text_content(), "");
        assert_eq!(body.children[2].text_content(), "b");

        let header = &table.children[0];
        assert_eq!(header.children[0].attr_u64("colspan"), Some(3));
        assert_eq!(header.text_content(), "Data");
        assert_eq!(tr.selection.head, 14);
    }

    #[test]
    fn test_add_column_then_apply_settles() {
        let mut st = state_with_table();
        let tr = add_column(&st, 14, ColumnSide::Before).unwrap().unwrap();
        // The command already rebuilt the header, so the enforcer has
        // nothing left to do.
        let batch = st.apply(tr).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_add_column_outside_table() {
        let st = EditorState::new(Node::doc(vec![Node::paragraph("hi")])).unwrap();
        assert!(add_column(&st, 1, ColumnSide::After).unwrap().is_none());
    }
}
