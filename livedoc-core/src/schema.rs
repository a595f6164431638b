//! Content rules for the document tree.
//!
//! A transaction is only committed when the document it produces
//! passes validation; otherwise the whole batch is rejected, so the
//! tree between transactions is always self-consistent.

use livedoc_types::NodeKind;

use crate::error::SchemaError;
use crate::node::Node;

/// Validate a whole document, root first.
pub fn validate_doc(doc: &Node) -> Result<(), SchemaError> {
    if doc.kind != NodeKind::Doc {
        return Err(SchemaError::RootNotDoc(doc.kind));
    }
    validate_node(doc)
}

fn validate_node(node: &Node) -> Result<(), SchemaError> {
    if node.kind.is_leaf() {
        if !node.children.is_empty() {
            return Err(SchemaError::LeafWithChildren(node.kind));
        }
        if node.kind == NodeKind::Text && node.text.is_empty() {
            return Err(SchemaError::EmptyText);
        }
        return Ok(());
    }

    if !node.text.is_empty() {
        return Err(SchemaError::TextOutsideTextblock);
    }

    for child in &node.children {
        if !allowed_child(node.kind, child.kind) {
            return Err(SchemaError::InvalidChild {
                parent: node.kind,
                child: child.kind,
            });
        }
        validate_node(child)?;
    }
    Ok(())
}

/// Whether `child` may appear directly under `parent`.
fn allowed_child(parent: NodeKind, child: NodeKind) -> bool {
    use NodeKind::*;
    match parent {
        Table => child == TableRow,
        TableRow => child == TableCell,
        BulletList | OrderedList => child == ListItem,
        _ if parent.is_textblock() => child == Text,
        // Generic block containers take any block content, but the
        // structural kinds above only live inside their containers.
        Doc | Blockquote | ListItem | TableCell | DiffLocal | DiffUpstream => {
            !matches!(child, Text | TableRow | TableCell | ListItem)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_document() {
        let doc = Node::doc(vec![
            Node::paragraph("hello"),
            Node::block(
                NodeKind::Table,
                vec![Node::block(
                    NodeKind::TableRow,
                    vec![Node::block(NodeKind::TableCell, vec![Node::paragraph("a")])],
                )],
            ),
        ]);
        assert!(validate_doc(&doc).is_ok());
    }

    #[test]
    fn test_row_outside_table_rejected() {
        let doc = Node::doc(vec![Node::block(NodeKind::TableRow, vec![])]);
        assert!(matches!(
            validate_doc(&doc),
            Err(SchemaError::InvalidChild { .. })
        ));
    }

    #[test]
    fn test_text_directly_in_doc_rejected() {
        let doc = Node::doc(vec![Node::text_leaf("stray")]);
        assert!(validate_doc(&doc).is_err());
    }

    #[test]
    fn test_empty_text_leaf_rejected() {
        let doc = Node::doc(vec![Node::block(
            NodeKind::Paragraph,
            vec![Node::text_leaf("")],
        )]);
        assert!(matches!(validate_doc(&doc), Err(SchemaError::EmptyText)));
    }

    #[test]
    fn test_diff_wrapper_content() {
        let doc = Node::doc(vec![Node::block(
            NodeKind::DiffUpstream,
            vec![Node::paragraph("upstream version")],
        )]);
        assert!(validate_doc(&doc).is_ok());
    }
}
