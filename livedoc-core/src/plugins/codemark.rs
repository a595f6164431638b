//! Inline-code toggling on backtick input.
//!
//! Typing a backtick scans a bounded window before and after the
//! cursor for an unmatched partner backtick. When one is found and the
//! span is not already code-marked, both delimiters are consumed and
//! the span between them gets the code mark.

use livedoc_types::MarkKind;

use crate::error::TransformError;
use crate::node::{Mark, Node};
use crate::plugins::{Plugin, SCAN_WINDOW};
use crate::state::EditorState;
use crate::transform::{Selection, Transaction};

pub struct CodemarkPlugin;

impl Plugin for CodemarkPlugin {
    fn name(&self) -> &'static str {
        "codemark"
    }

    fn handle_text_input(
        &self,
        state: &EditorState,
        from: usize,
        to: usize,
        text: &str,
    ) -> Result<Option<Transaction>, TransformError> {
        if text != "`" || from != to {
            return Ok(None);
        }

        // Already-marked check 1: stored marks at the cursor.
        if state.stored_marks.iter().any(|m| m.kind == MarkKind::Code) {
            return Ok(None);
        }

        let resolved = state.doc.resolve(from)?;
        if !resolved.parent_kind().is_textblock() || resolved.parent_kind().is_code() {
            return Ok(None);
        }
        let parent = match resolved.parent(&state.doc) {
            Some(p) => p,
            None => return Ok(None),
        };
        let offset = resolved.parent_offset();
        let content_start = from - offset;

        // Already-marked check 2: marks at the resolved cursor position.
        if marks_at(parent, offset).iter().any(|m| m.kind == MarkKind::Code) {
            return Ok(None);
        }

        let full: Vec<char> = parent.text_content().chars().collect();
        let before_start = offset.saturating_sub(SCAN_WINDOW);
        let after_end = (offset + SCAN_WINDOW).min(full.len());

        // Opening backtick behind the cursor wins over one ahead.
        let behind = full[before_start..offset]
            .iter()
            .rposition(|&c| c == '`')
            .map(|i| before_start + i);

        let (delim_off, span_start, span_end) = if let Some(i) = behind {
            // `i` opens, the typed backtick closes: span is i+1..offset.
            (i, i + 1, offset)
        } else if let Some(j) = full[offset..after_end].iter().position(|&c| c == '`') {
            // Typed backtick opens, `offset + j` closes.
            (offset + j, offset, offset + j)
        } else {
            return Ok(None);
        };

        if span_start == span_end {
            return Ok(None);
        }

        // Already-marked check 3: any code mark inside the target range.
        if range_has_code_mark(parent, span_start, span_end) {
            return Ok(None);
        }

        let mut tr = Transaction::new(state.doc.clone(), state.selection);
        tr.delete(content_start + delim_off, content_start + delim_off + 1)?;

        // Coordinates after the delimiter deletion.
        let shift = usize::from(delim_off < span_start);
        let mark_from = content_start + span_start - shift;
        let mark_to = content_start + span_end - shift;
        tr.add_mark(mark_from, mark_to, Mark::new(MarkKind::Code))?;
        tr.set_selection(Selection::cursor(mark_to));
        Ok(Some(tr))
    }
}

/// Marks at a character offset in a textblock's inline content.
fn marks_at(textblock: &Node, offset: usize) -> Vec<Mark> {
    let mut acc = 0usize;
    let mut last: Option<&Node> = None;
    for child in &textblock.children {
        let end = acc + child.text.chars().count();
        if offset > acc && offset <= end {
            return child.marks.clone();
        }
        if end <= offset {
            last = Some(child);
        }
        acc = end;
    }
    last.map(|n| n.marks.clone()).unwrap_or_default()
}

/// Whether any text leaf overlapping `start..end` carries a code mark.
fn range_has_code_mark(textblock: &Node, start: usize, end: usize) -> bool {
    let mut acc = 0usize;
    for child in &textblock.children {
        let child_end = acc + child.text.chars().count();
        if acc < end && child_end > start && child.marks.iter().any(|m| m.kind == MarkKind::Code) {
            return true;
        }
        acc = child_end;
    }
    false
}
