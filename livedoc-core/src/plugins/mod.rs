//! Editing transform plugins.
//!
//! Plugins intercept pending input events and committed transactions.
//! Each hook dispatches at most one transaction per triggering event
//! and never retries; failures are logged by the dispatch pipeline and
//! never abort it.

mod codemark;
mod input_rules;
mod lorem;
mod paste;

pub use codemark::CodemarkPlugin;
pub use input_rules::{horizontal_rule_rule, CodePolicy, EnterRulesPlugin, InputRule};
pub use lorem::{LoremPlugin, LOREM_LINES};
pub use paste::PastePlugin;

use crate::error::TransformError;
use crate::node::Node;
use crate::state::EditorState;
use crate::transform::{Selection, Transaction};

/// Bounded lookback/lookahead window for input scanning, in characters.
pub const SCAN_WINDOW: usize = 500;

/// A document-transaction interceptor.
///
/// Hooks default to no-ops so a plugin implements only the seams it
/// cares about.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect a text-input event before default insertion. Returning
    /// a transaction consumes the event.
    fn handle_text_input(
        &self,
        _state: &EditorState,
        _from: usize,
        _to: usize,
        _text: &str,
    ) -> Result<Option<Transaction>, TransformError> {
        Ok(None)
    }

    /// Inspect an Enter (or composition-end) event before the default
    /// block split.
    fn handle_enter(&self, _state: &EditorState) -> Result<Option<Transaction>, TransformError> {
        Ok(None)
    }

    /// Observe a committed batch and optionally append one correction
    /// transaction to the same change-set.
    fn append_transaction(
        &self,
        _batch: &[Transaction],
        _old_doc: &Node,
        _old_selection: Selection,
        _state: &EditorState,
    ) -> Result<Option<Transaction>, TransformError> {
        Ok(None)
    }

    /// Rewrite raw pasted HTML. Returning None leaves it unchanged.
    fn transform_pasted_html(&self, _html: &str) -> Option<String> {
        None
    }

    /// Rewrite structured pasted content.
    fn transform_pasted(&self, slice: Vec<Node>) -> Vec<Node> {
        slice
    }
}
