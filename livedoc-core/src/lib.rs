//! # livedoc-core
//!
//! Core library for the livedoc collaborative editor.
//!
//! This crate provides the document tree and its content rules, the
//! transaction/step/mapping layer every mutation goes through, the
//! editing transform plugins, the table structural enforcer, and the
//! diff region model with its overlay view state.

pub mod diff;
pub mod error;
pub mod node;
pub mod overlay;
pub mod plugins;
pub mod schema;
pub mod state;
pub mod table;
pub mod transform;

pub use diff::{DiffRegion, DiffSet, Resolution};
pub use error::{SchemaError, TransformError};
pub use node::{Mark, Node, ResolvedPos};
pub use overlay::{DiffTab, OverlayEvent, OverlayMode, OverlayState, OverlayView};
pub use plugins::{
    CodePolicy, CodemarkPlugin, EnterRulesPlugin, InputRule, LoremPlugin, PastePlugin, Plugin,
};
pub use schema::validate_doc;
pub use state::{EditorState, META_INPUT_RULE, META_REMOTE};
pub use table::{add_column, ColumnSide, TableFixPlugin, TableStructuralState};
pub use transform::{Mapping, Selection, Step, StepMap, Transaction};
