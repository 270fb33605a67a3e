//! Core editor document trait and implementations.
//!
//! Defines the `EditorDocument` trait for abstracting editor behavior,
//! allowing different storage strategies (plain fields vs a host widget's
//! model) while sharing the core editing logic.

use std::ops::Range;

use smol_str::SmolStr;

use crate::coords::{LineIndex, normalize_line_endings};
use crate::decorations::DecorationSet;
use crate::diff::ReplaceOp;
use crate::text::TextBuffer;
use crate::types::{Position, Selection};

/// Core trait for editor documents.
///
/// Defines the interface for any editor implementation. Different backends
/// can implement this trait with different storage strategies:
/// - `PlainEditor<T>`: Simple field-based storage
/// - Widget adapters: forward to the host editor's model
///
/// Every mutation goes through [`EditorDocument::splice`], which keeps the
/// tracked-range table in step with the text.
pub trait EditorDocument {
    /// The buffer type used for text storage.
    type Buffer: TextBuffer;

    // === Required: Buffer access ===

    /// Get a reference to the underlying buffer.
    fn buffer(&self) -> &Self::Buffer;

    /// Get a mutable reference to the underlying buffer.
    fn buffer_mut(&mut self) -> &mut Self::Buffer;

    // === Required: Cursor/selection state ===

    /// Get the caret offset.
    fn cursor_offset(&self) -> usize;

    /// Set the caret offset.
    fn set_cursor_offset(&mut self, offset: usize);

    /// Get the current selection, if any.
    fn selection(&self) -> Option<Selection>;

    /// Set the selection.
    fn set_selection(&mut self, selection: Option<Selection>);

    // === Required: Tracked ranges ===

    fn decorations(&self) -> &DecorationSet;

    fn decorations_mut(&mut self) -> &mut DecorationSet;

    // === Provided: Convenience accessors ===

    /// Get the full content as a String.
    fn content_string(&self) -> String {
        self.buffer().to_string()
    }

    /// Get length in characters.
    fn len_chars(&self) -> usize {
        self.buffer().len_chars()
    }

    /// Check if document is empty.
    fn is_empty(&self) -> bool {
        self.buffer().len_chars() == 0
    }

    /// Get a slice of the content.
    fn slice(&self, range: Range<usize>) -> Option<SmolStr> {
        self.buffer().slice(range)
    }

    /// Get character at offset.
    fn char_at(&self, offset: usize) -> Option<char> {
        self.buffer().char_at(offset)
    }

    /// Get selected text, if any.
    fn selected_text(&self) -> Option<SmolStr> {
        self.selection()
            .and_then(|sel| self.buffer().slice(sel.to_range()))
    }

    /// True when a non-empty range is selected.
    fn has_selection(&self) -> bool {
        self.selection().is_some_and(|sel| !sel.is_collapsed())
    }

    /// Line starts of the current content, for converting many offsets at once.
    fn line_index(&self) -> LineIndex {
        LineIndex::new(&self.content_string())
    }

    /// Caret as a 1-indexed line/column.
    fn cursor_position(&self) -> Position {
        self.line_index().to_position(self.cursor_offset())
    }

    /// Selection bounds as line/column pairs, in document order.
    fn selection_positions(&self) -> Option<(Position, Position)> {
        let selection = self.selection().filter(|s| !s.is_collapsed())?;
        let index = self.line_index();
        Some((
            index.to_position(selection.start()),
            index.to_position(selection.end()),
        ))
    }

    /// Move the caret to a 1-indexed line/column, clamping to the document.
    fn set_cursor_position(&mut self, position: Position) {
        let offset = self.line_index().to_offset(position);
        self.set_cursor_offset(offset);
    }

    // === Provided: Text operations ===

    /// Replace `range` with `text` in the buffer and shift tracked ranges.
    ///
    /// Does not touch the caret or selection.
    fn splice(&mut self, range: Range<usize>, text: &str) {
        let len = self.buffer().len_chars();
        let end = range.end.min(len);
        let start = range.start.min(end);
        let inserted_len = text.chars().count();

        self.buffer_mut().replace(start..end, text);
        self.decorations_mut().apply_splice(start..end, inserted_len);
    }

    fn insert(&mut self, offset: usize, text: &str) {
        self.replace(offset..offset, text);
    }

    fn delete(&mut self, range: Range<usize>) {
        self.replace(range, "");
    }

    /// Replace char range with text as a local edit.
    ///
    /// The caret lands after the inserted text and any selection collapses.
    fn replace(&mut self, range: Range<usize>, text: &str) {
        let end = range.end.min(self.buffer().len_chars());
        let start = range.start.min(end);
        self.splice(start..end, text);
        self.set_cursor_offset(start + text.chars().count());
        self.set_selection(None);
    }

    /// Replace the whole content, normalizing CRLF to LF.
    ///
    /// Tracked ranges are clamped rather than mapped, and caret and selection
    /// are clamped to the new length.
    fn set_text(&mut self, text: &str) {
        let text = normalize_line_endings(text);
        self.buffer_mut().set_text(&text);

        let len = self.buffer().len_chars();
        self.decorations_mut().clamp_to(len);
        self.clamp_caret();
    }

    /// Apply a batch of ops computed against the current content.
    ///
    /// Ops must be ascending and non-overlapping. They are applied from the
    /// last to the first so each op's offsets stay valid, and every tracked
    /// range is shifted through each splice. The caret is only clamped; callers
    /// that want it anchored park it in a decoration first.
    fn apply_edits(&mut self, ops: &[ReplaceOp]) {
        for op in ops.iter().rev() {
            self.splice(op.range.clone(), &op.replacement);
        }
        self.clamp_caret();
    }

    /// Clamp caret and selection to the current length.
    fn clamp_caret(&mut self) {
        let len = self.buffer().len_chars();
        if self.cursor_offset() > len {
            self.set_cursor_offset(len);
        }
        if let Some(sel) = self.selection() {
            self.set_selection(Some(sel.clamped(len)));
        }
    }
}

/// Simple field-based implementation of EditorDocument.
///
/// Stores cursor, selection and tracked ranges as plain fields.
/// Use this for headless sessions or as a base for testing.
#[derive(Clone, Debug)]
pub struct PlainEditor<T: TextBuffer> {
    buffer: T,
    cursor: usize,
    selection: Option<Selection>,
    decorations: DecorationSet,
}

impl<T: TextBuffer + Default> Default for PlainEditor<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: TextBuffer> PlainEditor<T> {
    /// Create a new editor with the given buffer.
    pub fn new(buffer: T) -> Self {
        Self {
            buffer,
            cursor: 0,
            selection: None,
            decorations: DecorationSet::new(),
        }
    }
}

impl<T: TextBuffer> EditorDocument for PlainEditor<T> {
    type Buffer = T;

    fn buffer(&self) -> &Self::Buffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut Self::Buffer {
        &mut self.buffer
    }

    fn cursor_offset(&self) -> usize {
        self.cursor
    }

    fn set_cursor_offset(&mut self, offset: usize) {
        self.cursor = offset;
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    fn decorations(&self) -> &DecorationSet {
        &self.decorations
    }

    fn decorations_mut(&mut self) -> &mut DecorationSet {
        &mut self.decorations
    }
}
