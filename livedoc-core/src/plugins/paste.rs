//! Paste normalization.
//!
//! Two rewrites run before pasted content is inserted:
//!
//! - HTML copied out of a desktop word processor (detected via its
//!   ProgId meta tag) gets explicit `<hr>` breaks between top-level
//!   section divs, skipping the terminal section.
//! - Structured content containing a paragraph whose text is exactly
//!   `---` gets a horizontal-rule node in its place, with empty
//!   paragraph halves omitted rather than inserted.
//!
//! Anything unparseable falls back to the original pasted content.

use once_cell::sync::Lazy;
use regex::Regex;

use livedoc_types::NodeKind;

use crate::node::Node;
use crate::plugins::Plugin;

static WORD_META_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*\bProgId\b[^>]*\bWord\.Document\b[^>]*>"#).expect("static regex")
});

static DIV_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<div\b[^>]*>|</div\s*>").expect("static regex"));

pub struct PastePlugin;

impl Plugin for PastePlugin {
    fn name(&self) -> &'static str {
        "paste"
    }

    fn transform_pasted_html(&self, html: &str) -> Option<String> {
        if !WORD_META_RE.is_match(html) {
            return None;
        }
        insert_section_breaks(html)
    }

    fn transform_pasted(&self, slice: Vec<Node>) -> Vec<Node> {
        slice.into_iter().flat_map(rewrite_node).collect()
    }
}

/// Insert `<hr>` after every top-level `</div>` except the last one.
/// Returns None (keep the original) when the divs don't balance.
fn insert_section_breaks(html: &str) -> Option<String> {
    let mut depth = 0i32;
    let mut break_points = Vec::new();

    for m in DIV_TAG_RE.find_iter(html) {
        if m.as_str().starts_with("</") {
            depth -= 1;
            if depth < 0 {
                return None;
            }
            if depth == 0 {
                break_points.push(m.end());
            }
        } else {
            depth += 1;
        }
    }
    if depth != 0 || break_points.len() < 2 {
        return None;
    }

    // No trailing break after the terminal section.
    break_points.pop();

    let mut out = String::with_capacity(html.len() + break_points.len() * 4);
    let mut last = 0;
    for point in break_points {
        out.push_str(&html[last..point]);
        out.push_str("<hr>");
        last = point;
    }
    out.push_str(&html[last..]);
    Some(out)
}

/// Rewrite one pasted node, recursing into block containers.
fn rewrite_node(node: Node) -> Vec<Node> {
    if node.kind == NodeKind::Paragraph {
        return split_dash_paragraph(node);
    }
    if node.kind.can_have_children() {
        let mut node = node;
        node.children = node.children.into_iter().flat_map(rewrite_node).collect();
        return vec![node];
    }
    vec![node]
}

/// Split a paragraph around a literal `---` line, inserting a
/// horizontal rule and omitting empty halves.
fn split_dash_paragraph(para: Node) -> Vec<Node> {
    let text = para.text_content();
    if text == "---" {
        return vec![Node::horizontal_rule()];
    }
    let Some(idx) = find_dash_line(&text) else {
        return vec![para];
    };

    let before = text[..idx].trim_end_matches('\n');
    let after = text[idx + 3..].trim_start_matches('\n');
    let mut out = Vec::new();
    if !before.is_empty() {
        out.push(Node::paragraph(before));
    }
    out.push(Node::horizontal_rule());
    if !after.is_empty() {
        out.push(Node::paragraph(after));
    }
    out
}

/// Byte index of a `---` that sits on a line of its own, if any.
fn find_dash_line(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split('\n') {
        if line == "---" {
            return Some(offset);
        }
        offset += line.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD_META: &str = r#"<meta name="ProgId" content="Word.Document">"#;

    #[test]
    fn test_word_paste_inserts_break_between_sections() {
        let html = format!(
            "<html><head>{}</head><body><div>one</div><div>two</div></body></html>",
            WORD_META
        );
        let out = PastePlugin.transform_pasted_html(&html).unwrap();
        assert_eq!(out.matches("<hr>").count(), 1);
        // Break sits between the sections, not after the last one.
        assert!(out.contains("</div><hr><div>"));
        assert!(!out.trim_end_matches("</body></html>").ends_with("<hr>"));
    }

    #[test]
    fn test_word_paste_skips_terminal_section() {
        let html = format!(
            "{}<div>a</div><div>b</div><div>c</div>",
            WORD_META
        );
        let out = PastePlugin.transform_pasted_html(&html).unwrap();
        assert_eq!(out.matches("<hr>").count(), 2);
        assert!(!out.ends_with("<hr>"));
    }

    #[test]
    fn test_non_word_html_untouched() {
        let html = "<div>one</div><div>two</div>";
        assert!(PastePlugin.transform_pasted_html(html).is_none());
    }

    #[test]
    fn test_unbalanced_divs_fall_back() {
        let html = format!("{}<div>one<div>two</div>", WORD_META);
        assert!(PastePlugin.transform_pasted_html(&html).is_none());
    }

    #[test]
    fn test_nested_divs_only_split_top_level() {
        let html = format!(
            "{}<div>a<div>inner</div></div><div>b</div>",
            WORD_META
        );
        let out = PastePlugin.transform_pasted_html(&html).unwrap();
        assert_eq!(out.matches("<hr>").count(), 1);
    }

    #[test]
    fn test_dash_paragraph_becomes_horizontal_rule() {
        let slice = vec![
            Node::paragraph("above"),
            Node::paragraph("---"),
            Node::paragraph("below"),
        ];
        let out = PastePlugin.transform_pasted(slice);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].kind, NodeKind::HorizontalRule);
        // No empty paragraphs around the rule.
        assert!(out.iter().all(|n| n.kind == NodeKind::HorizontalRule
            || !n.text_content().is_empty()));
    }

    #[test]
    fn test_dash_line_inside_paragraph_splits_it() {
        let slice = vec![Node::paragraph("above\n---\nbelow")];
        let out = PastePlugin.transform_pasted(slice);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].text_content(), "above");
        assert_eq!(out[1].kind, NodeKind::HorizontalRule);
        assert_eq!(out[2].text_content(), "below");
    }

    #[test]
    fn test_plain_paragraph_untouched() {
        let slice = vec![Node::paragraph("no dashes here")];
        let out = PastePlugin.transform_pasted(slice);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text_content(), "no dashes here");
    }
}
