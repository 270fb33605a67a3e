//! tandem-editor-core: Pure Rust editor logic without transport dependencies.
//!
//! This crate provides:
//! - `TextBuffer` trait for text storage abstraction
//! - `EditorRope` - ropey-backed implementation
//! - `DecorationSet` - tracked ranges that shift with the text they annotate
//! - `EditorDocument` - buffer + caret/selection + decorations, with batched edits
//! - Offset/position conversion and snapshot-to-snapshot diffing

pub mod coords;
pub mod decorations;
pub mod diff;
pub mod document;
pub mod text;
pub mod types;

pub use coords::{LineIndex, normalize_line_endings, to_offset, to_position};
pub use decorations::{Bias, Decoration, DecorationId, DecorationSet, Stickiness, map_offset};
pub use diff::{ReplaceOp, apply_ops, compute_ops};
pub use document::{EditorDocument, PlainEditor};
pub use smol_str::SmolStr;
pub use text::{EditorRope, TextBuffer};
pub use types::{Position, Selection};
