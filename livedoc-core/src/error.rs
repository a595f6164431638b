//! Error types for the editing core.

use livedoc_types::NodeKind;
use thiserror::Error;

/// Errors raised while building or applying transaction steps.
#[derive(Error, Debug)]
pub enum TransformError {
    /// A captured position no longer resolves in the current document.
    #[error("position {pos} out of bounds for document with size {len}")]
    PositionOutOfBounds { pos: usize, len: usize },

    /// Replace endpoints do not share a container, or fall on
    /// non-boundary offsets in a non-text context.
    #[error("invalid replace range {from}..{to}")]
    InvalidRange { from: usize, to: usize },

    /// No node starts at the given position.
    #[error("no node at position {0}")]
    NoNodeAt(usize),

    /// Markup changes may not switch a node between leaf and interior
    /// kinds; that would change its token size behind the mapping.
    #[error("cannot change node kind {from:?} to {to:?}: sizes differ")]
    KindChangesSize { from: NodeKind, to: NodeKind },

    /// Mark operations only apply inside a single textblock.
    #[error("mark range {from}..{to} crosses textblock boundaries")]
    MarkRangeOutsideTextblock { from: usize, to: usize },

    /// The step produced a document that violates the content rules.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Content-rule violations detected when validating a document tree.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("root node must be doc, found {0:?}")]
    RootNotDoc(NodeKind),

    #[error("{parent:?} may not contain {child:?}")]
    InvalidChild { parent: NodeKind, child: NodeKind },

    #[error("{0:?} is a leaf and may not have children")]
    LeafWithChildren(NodeKind),

    #[error("text leaf must not be empty")]
    EmptyText,

    #[error("text content outside a textblock")]
    TextOutsideTextblock,
}
