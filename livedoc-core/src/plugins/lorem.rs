//! Placeholder-text generator.
//!
//! Typing space or Enter right after `=lorem(N)` replaces the literal
//! with N lines of canned placeholder text (default 5, clamped to the
//! sentence pool).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TransformError;
use crate::node::Node;
use crate::plugins::{Plugin, SCAN_WINDOW};
use crate::state::EditorState;
use crate::transform::{Selection, Transaction};

/// Canned sentence pool; `=lorem(N)` is clamped to this length.
pub const LOREM_LINES: &[&str] = &[
    "Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
    "Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.",
    "Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris.",
    "Duis aute irure dolor in reprehenderit in voluptate velit esse.",
    "Excepteur sint occaecat cupidatat non proident, sunt in culpa.",
    "Qui officia deserunt mollit anim id est laborum.",
    "Curabitur pretium tincidunt lacus, nulla gravida orci a odio.",
    "Nullam varius, turpis et commodo pharetra, est eros bibendum elit.",
];

const DEFAULT_LINES: usize = 5;

static LOREM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=lorem\((\d*)\)$").expect("static regex"));

pub struct LoremPlugin;

impl LoremPlugin {
    fn expand(&self, state: &EditorState) -> Result<Option<Transaction>, TransformError> {
        let (from, to) = state.selection.from_to();
        if from != to {
            return Ok(None);
        }
        let resolved = state.doc.resolve(from)?;
        if !resolved.parent_kind().is_textblock() {
            return Ok(None);
        }
        let parent = match resolved.parent(&state.doc) {
            Some(p) => p,
            None => return Ok(None),
        };
        let offset = resolved.parent_offset();
        let content_start = from - offset;

        let full: Vec<char> = parent.text_content().chars().collect();
        let window_start = offset.saturating_sub(SCAN_WINDOW);
        let window: String = full[window_start..offset].iter().collect();

        let captures = match LOREM_RE.captures(&window) {
            Some(c) => c,
            None => return Ok(None),
        };
        let whole = captures.get(0).expect("capture 0 always present");
        let count = captures
            .get(1)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(DEFAULT_LINES)
            .clamp(1, LOREM_LINES.len());

        let chars_before = window[..whole.start()].chars().count();
        let match_from = content_start + window_start + chars_before;

        let mut tr = Transaction::new(state.doc.clone(), state.selection);
        tr.replace(match_from, from, vec![Node::text_leaf(LOREM_LINES[0])])?;

        if count > 1 {
            let block_after = resolved
                .after(resolved.depth())
                .ok_or(TransformError::NoNodeAt(from))?;
            let insert_at = tr.mapping().map(block_after, -1);
            let paras: Vec<Node> = LOREM_LINES[1..count]
                .iter()
                .map(|line| Node::paragraph(line))
                .collect();
            tr.insert(insert_at, paras)?;
        }

        let cursor = tr.mapping().map(from, 1);
        tr.set_selection(Selection::cursor(cursor));
        Ok(Some(tr))
    }
}

impl Plugin for LoremPlugin {
    fn name(&self) -> &'static str {
        "lorem"
    }

    fn handle_text_input(
        &self,
        state: &EditorState,
        _from: usize,
        _to: usize,
        text: &str,
    ) -> Result<Option<Transaction>, TransformError> {
        if text != " " {
            return Ok(None);
        }
        self.expand(state)
    }

    fn handle_enter(&self, state: &EditorState) -> Result<Option<Transaction>, TransformError> {
        self.expand(state)
    }
}
