//! Tracked ranges that follow the text they decorate.
//!
//! A [`DecorationSet`] is owned by a document. Every splice the document
//! performs is forwarded to [`DecorationSet::apply_splice`], which shifts the
//! bounds of each range according to its [`Stickiness`]. Remote presence and
//! temporarily captured carets both live here, so a batch of edits moves them
//! consistently.

use std::ops::Range;

use smol_str::SmolStr;

/// Opaque handle for a decoration within one set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecorationId(u64);

/// Which side of an insertion an offset sticks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bias {
    /// Stay before text inserted exactly at this offset.
    Left,
    /// Move past text inserted exactly at this offset.
    Right,
}

/// How a range behaves when text is typed exactly at one of its edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stickiness {
    AlwaysGrowsWhenTypingAtEdges,
    #[default]
    NeverGrowsWhenTypingAtEdges,
    GrowsOnlyWhenTypingBefore,
    GrowsOnlyWhenTypingAfter,
}

impl Stickiness {
    /// Bias of the start and end bound respectively.
    pub fn biases(self) -> (Bias, Bias) {
        match self {
            Stickiness::AlwaysGrowsWhenTypingAtEdges => (Bias::Left, Bias::Right),
            Stickiness::NeverGrowsWhenTypingAtEdges => (Bias::Right, Bias::Left),
            Stickiness::GrowsOnlyWhenTypingBefore => (Bias::Left, Bias::Left),
            Stickiness::GrowsOnlyWhenTypingAfter => (Bias::Right, Bias::Right),
        }
    }
}

/// Map an offset through the splice `range -> inserted_len chars`.
///
/// Offsets before the splice are untouched, offsets after it shift by the net
/// length change. An offset inside a replaced range collapses to the start of
/// the replacement (`Left`) or its end (`Right`).
pub fn map_offset(offset: usize, range: &Range<usize>, inserted_len: usize, bias: Bias) -> usize {
    if offset < range.start {
        return offset;
    }
    if offset > range.end {
        return offset - (range.end - range.start) + inserted_len;
    }
    match bias {
        Bias::Left => range.start,
        Bias::Right => range.start + inserted_len,
    }
}

/// A tracked range with a CSS-style class name for the renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoration {
    pub range: Range<usize>,
    pub class_name: SmolStr,
    pub stickiness: Stickiness,
}

impl Decoration {
    pub fn new(range: Range<usize>, class_name: impl Into<SmolStr>) -> Self {
        Self {
            range,
            class_name: class_name.into(),
            stickiness: Stickiness::default(),
        }
    }

    pub fn with_stickiness(mut self, stickiness: Stickiness) -> Self {
        self.stickiness = stickiness;
        self
    }

    fn apply_splice(&mut self, range: &Range<usize>, inserted_len: usize) {
        let (start_bias, end_bias) = self.stickiness.biases();
        let start = map_offset(self.range.start, range, inserted_len, start_bias);
        let end = map_offset(self.range.end, range, inserted_len, end_bias);
        // A collapsed range can't invert when its two biases disagree.
        self.range = start..end.max(start);
    }
}

/// The tracked-range table of one document.
///
/// Small sets are the norm (one entry per remote participant), so this is a
/// flat list rather than an interval tree.
#[derive(Clone, Debug, Default)]
pub struct DecorationSet {
    entries: Vec<(DecorationId, Decoration)>,
    next_id: u64,
}

impl DecorationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, decoration: Decoration) -> DecorationId {
        let id = DecorationId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, decoration));
        id
    }

    /// Remove a decoration, returning it if it was present.
    pub fn remove(&mut self, id: DecorationId) -> Option<Decoration> {
        let index = self.entries.iter().position(|(eid, _)| *eid == id)?;
        Some(self.entries.remove(index).1)
    }

    /// Remove `old` and add `new` in one call, returning the ids of `new` in order.
    pub fn delta_decorations(
        &mut self,
        old: &[DecorationId],
        new: impl IntoIterator<Item = Decoration>,
    ) -> Vec<DecorationId> {
        self.entries.retain(|(id, _)| !old.contains(id));
        new.into_iter().map(|d| self.add(d)).collect()
    }

    pub fn get(&self, id: DecorationId) -> Option<&Decoration> {
        self.entries
            .iter()
            .find(|(eid, _)| *eid == id)
            .map(|(_, d)| d)
    }

    /// Current range of a decoration.
    pub fn range(&self, id: DecorationId) -> Option<Range<usize>> {
        self.get(id).map(|d| d.range.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (DecorationId, &Decoration)> {
        self.entries.iter().map(|(id, d)| (*id, d))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Shift every range through a splice of `range` replaced by `inserted_len` chars.
    pub fn apply_splice(&mut self, range: Range<usize>, inserted_len: usize) {
        for (_, decoration) in &mut self.entries {
            decoration.apply_splice(&range, inserted_len);
        }
    }

    /// Clamp every range to a document of `len` chars.
    pub fn clamp_to(&mut self, len: usize) {
        for (_, decoration) in &mut self.entries {
            let start = decoration.range.start.min(len);
            let end = decoration.range.end.min(len);
            decoration.range = start..end;
        }
    }
}
