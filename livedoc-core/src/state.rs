//! Editor state and the transaction-dispatch pipeline.
//!
//! Only one transaction is in flight at a time: it is constructed,
//! validated against the content rules, committed, and then every
//! registered plugin gets a chance to append a correction transaction
//! to the same change-set. Plugin failures are logged and skipped;
//! they never abort the dispatch.

use std::sync::Arc;

use tracing::warn;

use crate::error::TransformError;
use crate::node::{Mark, Node};
use crate::plugins::Plugin;
use crate::schema::validate_doc;
use crate::transform::{Selection, Transaction};

/// Metadata key marking transactions that originate from a remote
/// replica merge rather than local input.
pub const META_REMOTE: &str = "remote";

/// Metadata key recording which undoable input rule produced a
/// transaction (used for undo grouping).
pub const META_INPUT_RULE: &str = "applied_input_rule";

/// Per-open-document editing state.
pub struct EditorState {
    pub doc: Node,
    pub selection: Selection,
    /// Marks to apply to the next inserted text (may be toggled at a
    /// cursor without a range).
    pub stored_marks: Vec<Mark>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl EditorState {
    pub fn new(doc: Node) -> Result<Self, TransformError> {
        validate_doc(&doc)?;
        Ok(Self {
            doc,
            selection: Selection::cursor(0),
            stored_marks: Vec::new(),
            plugins: Vec::new(),
        })
    }

    pub fn with_plugins(doc: Node, plugins: Vec<Arc<dyn Plugin>>) -> Result<Self, TransformError> {
        let mut state = Self::new(doc)?;
        state.plugins = plugins;
        Ok(state)
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Start a new transaction against the current document.
    pub fn tr(&self) -> Transaction {
        Transaction::new(self.doc.clone(), self.selection)
    }

    /// Apply a transaction and run the append-transaction pipeline.
    ///
    /// Returns the full committed batch: the original transaction plus
    /// any plugin-appended corrections, in commit order.
    pub fn apply(&mut self, tr: Transaction) -> Result<Vec<Transaction>, TransformError> {
        validate_doc(&tr.doc)?;

        let old_doc = self.doc.clone();
        let old_selection = self.selection;
        self.doc = tr.doc.clone();
        self.selection = tr.selection;
        if tr.doc_changed() {
            self.stored_marks.clear();
        }
        let mut batch = vec![tr];

        // Plugins observe the batch in registration order and may each
        // append one correction per round; rounds repeat until the
        // batch settles, with a hard cap so a misbehaving plugin
        // cannot loop forever.
        let old_state_doc = old_doc;
        for _round in 0..10 {
            let mut appended = false;
            for plugin in self.plugins.clone() {
                let result = plugin.append_transaction(&batch, &old_state_doc, old_selection, self);
                match result {
                    Ok(Some(correction)) => {
                        if let Err(err) = validate_doc(&correction.doc) {
                            warn!(plugin = plugin.name(), ?err, "correction rejected by schema");
                            continue;
                        }
                        self.doc = correction.doc.clone();
                        self.selection = correction.selection;
                        batch.push(correction);
                        appended = true;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Secondary repair failures must not abort the
                        // dispatch; editing stays responsive.
                        warn!(plugin = plugin.name(), ?err, "append_transaction failed");
                    }
                }
            }
            if !appended {
                break;
            }
        }

        Ok(batch)
    }

    /// Handle a text-input event: offer the text to each plugin in
    /// order; the first plugin to act consumes the event. Otherwise
    /// the text is inserted at the selection with stored marks.
    pub fn insert_input_text(&mut self, text: &str) -> Result<Vec<Transaction>, TransformError> {
        let (from, to) = self.selection.from_to();
        for plugin in self.plugins.clone() {
            match plugin.handle_text_input(self, from, to, text) {
                Ok(Some(tr)) => return self.apply(tr),
                Ok(None) => {}
                Err(err) => {
                    warn!(plugin = plugin.name(), ?err, "handle_text_input failed");
                }
            }
        }

        let mut tr = self.tr();
        if self.stored_marks.is_empty() {
            tr.replace(from, to, vec![Node::text_leaf(text)])?;
        } else {
            tr.replace(
                from,
                to,
                vec![Node::marked_text(text, self.stored_marks.clone())],
            )?;
        }
        let cursor = tr.mapping().map(from, 1);
        tr.set_selection(Selection::cursor(cursor));
        let stored = std::mem::take(&mut self.stored_marks);
        let batch = self.apply(tr)?;
        // Typing with stored marks keeps them active for the next input.
        self.stored_marks = stored;
        Ok(batch)
    }

    /// Handle the Enter key. Plugins (input rules) run first; when
    /// none fires, the current textblock is split at the cursor.
    pub fn handle_enter(&mut self) -> Result<Vec<Transaction>, TransformError> {
        for plugin in self.plugins.clone() {
            match plugin.handle_enter(self) {
                Ok(Some(tr)) => return self.apply(tr),
                Ok(None) => {}
                Err(err) => {
                    warn!(plugin = plugin.name(), ?err, "handle_enter failed");
                }
            }
        }
        self.split_block()
    }

    /// Default Enter behavior: split the textblock around the cursor.
    pub fn split_block(&mut self) -> Result<Vec<Transaction>, TransformError> {
        let (from, to) = self.selection.from_to();
        let resolved = self.doc.resolve(from)?;
        if !resolved.parent_kind().is_textblock() {
            return Ok(Vec::new());
        }
        let depth = resolved.depth();
        let parent = resolved
            .parent(&self.doc)
            .ok_or(TransformError::NoNodeAt(from))?;
        let block_kind = parent.kind;
        let block_attrs = parent.attrs.clone();
        let offset = resolved.parent_offset();
        let content_start = from - offset;
        let block_before = content_start - 1;
        let block_after = resolved.after(depth).ok_or(TransformError::NoNodeAt(from))?;

        // Inline content on each side of the cursor; a ranged
        // selection inside the block is dropped by the split.
        let full: Vec<Node> = parent.children.clone();
        let to_off = (to - content_start).min(parent.content_size()).max(offset);
        let (left, right) = split_inline(&full, offset, to_off);

        let mut first = Node::block(block_kind, left);
        first.attrs = block_attrs.clone();
        let mut second = Node::block(block_kind, right);
        second.attrs = block_attrs;
        let first_size = first.size();

        let mut tr = self.tr();
        tr.replace(block_before, block_after, vec![first, second])?;
        // Cursor lands at the start of the second block's content.
        tr.set_selection(Selection::cursor(block_before + first_size + 1));
        self.apply(tr)
    }

    /// Run paste transforms over raw HTML, returning the HTML the
    /// editor should actually parse. Falls back to the input when no
    /// plugin rewrites it.
    pub fn transform_pasted_html(&self, html: &str) -> String {
        let mut current = html.to_string();
        for plugin in &self.plugins {
            if let Some(rewritten) = plugin.transform_pasted_html(&current) {
                current = rewritten;
            }
        }
        current
    }

    /// Run paste transforms over structured pasted content and insert
    /// it at the selection.
    pub fn paste(&mut self, slice: Vec<Node>) -> Result<Vec<Transaction>, TransformError> {
        let mut slice = slice;
        for plugin in self.plugins.clone() {
            slice = plugin.transform_pasted(slice);
        }
        let (from, to) = self.selection.from_to();
        let mut tr = self.tr();
        tr.replace(from, to, slice)?;
        self.apply(tr)
    }
}

/// Split inline content at a character offset, dropping the selected
/// range `at..to` if the selection is not a bare cursor.
fn split_inline(children: &[Node], at: usize, to: usize) -> (Vec<Node>, Vec<Node>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut acc = 0usize;
    for child in children {
        let len = child.text.chars().count();
        let end = acc + len;
        if end <= at {
            left.push(child.clone());
        } else if acc >= to {
            right.push(child.clone());
        } else {
            if acc < at {
                let keep: String = child.text.chars().take(at - acc).collect();
                if !keep.is_empty() {
                    left.push(Node::marked_text(keep, child.marks.clone()));
                }
            }
            if end > to {
                let keep: String = child.text.chars().skip(to - acc).collect();
                if !keep.is_empty() {
                    right.push(Node::marked_text(keep, child.marks.clone()));
                }
            }
        }
        acc = end;
    }
    (left, right)
}
