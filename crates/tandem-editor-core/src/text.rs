//! Char-addressed text storage.
//!
//! The sync layer only ever splices by char offset and reads whole snapshots
//! back, so [`TextBuffer`] is limited to that surface.

use std::ops::Range;

use smol_str::{SmolStr, ToSmolStr};

/// Storage for one document's text.
///
/// Offsets are Unicode scalar values. Out-of-range offsets clamp to the end.
pub trait TextBuffer {
    fn len_chars(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    fn insert(&mut self, char_offset: usize, text: &str);

    fn delete(&mut self, char_range: Range<usize>);

    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        self.delete(char_range.clone());
        self.insert(char_range.start, text);
    }

    /// Swap in a whole new snapshot.
    fn set_text(&mut self, text: &str) {
        let len = self.len_chars();
        self.replace(0..len, text);
    }

    /// `None` if the range is reversed or runs past the end.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    fn char_at(&self, char_offset: usize) -> Option<char>;

    /// The full snapshot.
    fn to_string(&self) -> String;
}

/// Rope-backed buffer.
#[derive(Clone, Debug, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl EditorRope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
        }
    }

    fn clamp(&self, char_range: Range<usize>) -> Range<usize> {
        let end = char_range.end.min(self.rope.len_chars());
        char_range.start.min(end)..end
    }
}

impl TextBuffer for EditorRope {
    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        let char_offset = char_offset.min(self.rope.len_chars());
        self.rope.insert(char_offset, text);
    }

    fn delete(&mut self, char_range: Range<usize>) {
        let range = self.clamp(char_range);
        if !range.is_empty() {
            self.rope.remove(range);
        }
    }

    fn set_text(&mut self, text: &str) {
        self.rope = ropey::Rope::from_str(text);
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.rope.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn char_at(&self, char_offset: usize) -> Option<char> {
        (char_offset < self.rope.len_chars()).then(|| self.rope.char(char_offset))
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }
}

impl From<&str> for EditorRope {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for EditorRope {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}
