//! Enter-triggered input rules.
//!
//! A variant of text-input rule matching that only fires on Enter or
//! composition-end, not on every keystroke. Each rule's regex runs
//! against a bounded window of text before the cursor concatenated
//! with the triggering text; the first matching rule's handler builds
//! the transaction.

use regex::Regex;

use crate::error::TransformError;
use crate::node::Node;
use crate::plugins::{Plugin, SCAN_WINDOW};
use crate::state::{EditorState, META_INPUT_RULE};
use crate::transform::Transaction;

/// Where a rule may fire relative to code textblocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePolicy {
    /// Fires only in non-code textblocks.
    NonCode,
    /// Fires anywhere.
    Anywhere,
    /// Fires only inside code textblocks.
    CodeOnly,
}

impl CodePolicy {
    fn allows(&self, in_code: bool) -> bool {
        match self {
            CodePolicy::NonCode => !in_code,
            CodePolicy::Anywhere => true,
            CodePolicy::CodeOnly => in_code,
        }
    }
}

/// Handler context: the match, the document range the matched text
/// occupies, and the current state.
pub type RuleHandler = Box<
    dyn Fn(&EditorState, &regex::Captures<'_>, usize, usize) -> Result<Option<Transaction>, TransformError>
        + Send
        + Sync,
>;

pub struct InputRule {
    pub name: &'static str,
    pub pattern: Regex,
    /// Undoable rules record their name in transaction metadata so the
    /// applied transform can be undo-grouped.
    pub undoable: bool,
    pub code: CodePolicy,
    pub handler: RuleHandler,
}

impl InputRule {
    pub fn new(
        name: &'static str,
        pattern: Regex,
        undoable: bool,
        code: CodePolicy,
        handler: RuleHandler,
    ) -> Self {
        Self {
            name,
            pattern,
            undoable,
            code,
            handler,
        }
    }
}

/// Plugin running a fixed rule list on Enter / composition end.
pub struct EnterRulesPlugin {
    rules: Vec<InputRule>,
}

impl EnterRulesPlugin {
    pub fn new(rules: Vec<InputRule>) -> Self {
        Self { rules }
    }

    /// Run the rules with the given triggering text ("" for Enter,
    /// the composed text for composition-end).
    pub fn run(
        &self,
        state: &EditorState,
        trigger: &str,
    ) -> Result<Option<Transaction>, TransformError> {
        let (from, to) = state.selection.from_to();
        if from != to {
            return Ok(None);
        }
        let resolved = state.doc.resolve(from)?;
        if !resolved.parent_kind().is_textblock() {
            return Ok(None);
        }
        let in_code = resolved.parent_kind().is_code();
        let parent = match resolved.parent(&state.doc) {
            Some(p) => p,
            None => return Ok(None),
        };
        let offset = resolved.parent_offset();
        let content_start = from - offset;

        let full: Vec<char> = parent.text_content().chars().collect();
        let window_start = offset.saturating_sub(SCAN_WINDOW);
        let mut haystack: String = full[window_start..offset].iter().collect();
        haystack.push_str(trigger);

        for rule in &self.rules {
            if !rule.code.allows(in_code) {
                continue;
            }
            let captures = match rule.pattern.captures(&haystack) {
                Some(c) => c,
                None => continue,
            };
            let whole = captures.get(0).expect("capture 0 always present");
            // Matched span in document positions, clipped to the part
            // that is really in the document (the trigger text is not).
            let match_chars_before_trigger = haystack[..whole.start()].chars().count();
            let match_from = content_start + window_start + match_chars_before_trigger;
            let match_to = from;

            let tr = (rule.handler)(state, &captures, match_from, match_to)?;
            return Ok(tr.map(|mut tr| {
                if rule.undoable {
                    tr.set_meta(META_INPUT_RULE, serde_json::json!(rule.name));
                }
                tr
            }));
        }
        Ok(None)
    }

    /// Composition-end entry point.
    pub fn handle_composition_end(
        &self,
        state: &EditorState,
        composed: &str,
    ) -> Result<Option<Transaction>, TransformError> {
        self.run(state, composed)
    }
}

impl Plugin for EnterRulesPlugin {
    fn name(&self) -> &'static str {
        "enter_rules"
    }

    fn handle_enter(&self, state: &EditorState) -> Result<Option<Transaction>, TransformError> {
        self.run(state, "")
    }
}

/// Built-in rule: three or more dashes alone in a textblock become a
/// horizontal rule on Enter.
pub fn horizontal_rule_rule() -> InputRule {
    InputRule::new(
        "horizontal_rule",
        Regex::new(r"^\s*(-{3,}|\*{3,})\s*$").expect("static regex"),
        true,
        CodePolicy::NonCode,
        Box::new(|state, _captures, from, _to| {
            let resolved = state.doc.resolve(from)?;
            let depth = resolved.depth();
            let before = match resolved.before(depth) {
                Some(p) => p,
                None => return Ok(None),
            };
            let after = match resolved.after(depth) {
                Some(p) => p,
                None => return Ok(None),
            };
            let mut tr = Transaction::new(state.doc.clone(), state.selection);
            tr.replace(before, after, vec![Node::horizontal_rule()])?;
            Ok(Some(tr))
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Selection;
    use livedoc_types::NodeKind;
    use std::sync::Arc;

    #[test]
    fn test_dashes_become_horizontal_rule_on_enter() {
        let mut st = EditorState::with_plugins(
            Node::doc(vec![Node::paragraph("---")]),
            vec![Arc::new(EnterRulesPlugin::new(vec![horizontal_rule_rule()]))],
        )
        .unwrap();
        st.selection = Selection::cursor(4);
        let batch = st.handle_enter().unwrap();
        assert_eq!(st.doc.children[0].kind, NodeKind::HorizontalRule);
        // Undoable rule recorded in metadata.
        assert_eq!(
            batch[0].get_meta(META_INPUT_RULE),
            Some(&serde_json::json!("horizontal_rule"))
        );
    }

    #[test]
    fn test_rule_does_not_fire_in_code_block() {
        let doc = Node::doc(vec![Node::block(
            NodeKind::CodeBlock,
            vec![Node::text_leaf("---")],
        )]);
        let mut st = EditorState::with_plugins(
            doc,
            vec![Arc::new(EnterRulesPlugin::new(vec![horizontal_rule_rule()]))],
        )
        .unwrap();
        st.selection = Selection::cursor(4);
        st.handle_enter().unwrap();
        // Default split instead: still a code block first.
        assert_eq!(st.doc.children[0].kind, NodeKind::CodeBlock);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let always = |name: &'static str| {
            InputRule::new(
                name,
                Regex::new(r"x$").unwrap(),
                true,
                CodePolicy::Anywhere,
                Box::new(|state, _c, _f, _t| {
                    Ok(Some(Transaction::new(state.doc.clone(), state.selection)))
                }),
            )
        };
        let plugin = EnterRulesPlugin::new(vec![always("first"), always("second")]);
        let mut st = EditorState::new(Node::doc(vec![Node::paragraph("xx")])).unwrap();
        st.selection = Selection::cursor(3);
        let tr = plugin.run(&st, "").unwrap().unwrap();
        assert_eq!(
            tr.get_meta(META_INPUT_RULE),
            Some(&serde_json::json!("first"))
        );
    }

    #[test]
    fn test_composition_end_trigger_text_included() {
        let rule = InputRule::new(
            "needs_trigger",
            Regex::new(r"ab$").unwrap(),
            false,
            CodePolicy::Anywhere,
            Box::new(|state, _c, _f, _t| {
                Ok(Some(Transaction::new(state.doc.clone(), state.selection)))
            }),
        );
        let plugin = EnterRulesPlugin::new(vec![rule]);
        let mut st = EditorState::new(Node::doc(vec![Node::paragraph("a")])).unwrap();
        st.selection = Selection::cursor(2);
        // "a" in the doc + "b" from the composition completes the match.
        assert!(plugin.handle_composition_end(&st, "b").unwrap().is_some());
        assert!(plugin.handle_composition_end(&st, "c").unwrap().is_none());
    }
}
