//! Remote participants' carets and selections.
//!
//! Every broadcast replaces the whole set of markers in one
//! `delta_decorations` call. Between broadcasts the markers live in the
//! document's tracked-range table, so local edits move them, and
//! [`PresenceTracker::current_presence_for_broadcast`] reports where they are
//! now rather than where they were received.

use smol_str::{SmolStr, format_smolstr};
use tandem_common::{UserId, UserState};
use tandem_editor_core::{Decoration, DecorationId, EditorDocument, Position, Stickiness};

/// Editor colour scheme, baked into marker class names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// 1-based colour bucket for a participant slot.
pub fn color_bucket(index: u32, buckets: u32) -> u32 {
    index % buckets.max(1) + 1
}

pub fn caret_class(bucket: u32, theme: Theme) -> SmolStr {
    format_smolstr!("other-user-cursor-{bucket}-{}", theme.as_str())
}

pub fn selection_class(bucket: u32, theme: Theme) -> SmolStr {
    format_smolstr!("other-user-selection-{bucket}-{}", theme.as_str())
}

/// One remote participant and the markers placed for them.
#[derive(Debug, Clone)]
struct TrackedUser {
    state: UserState,
    caret: DecorationId,
    selection: Option<DecorationId>,
}

/// Result of folding one broadcast user list into the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceOutcome {
    /// Remote participants now shown.
    pub tracked: usize,
    /// Where the local caret was moved to, if the server corrected it.
    pub corrected_caret: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    local_id: UserId,
    theme: Theme,
    buckets: u32,
    tracked: Vec<TrackedUser>,
}

impl PresenceTracker {
    pub fn new(local_id: UserId, buckets: u32) -> Self {
        Self {
            local_id,
            theme: Theme::default(),
            buckets: buckets.max(1),
            tracked: Vec::new(),
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn local_id(&self) -> &UserId {
        &self.local_id
    }

    /// Number of remote participants currently shown.
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Replace every remote marker with markers for `users`.
    ///
    /// The local user's own entry is never shown. If it reports a caret
    /// different from ours and we have no selection, the caret moves there.
    pub fn update_presence<D: EditorDocument>(
        &mut self,
        doc: &mut D,
        users: &[UserState],
    ) -> PresenceOutcome {
        let len = doc.len_chars();
        let remote: Vec<UserState> = users
            .iter()
            .filter(|u| u.id != self.local_id)
            .cloned()
            .collect();

        let mut decorations = Vec::with_capacity(remote.len() * 2);
        for user in &remote {
            decorations.push(self.caret_decoration(user, len));
            if let Some(decoration) = self.selection_decoration(user, len) {
                decorations.push(decoration);
            }
        }

        let old = self.decoration_ids();
        let mut ids = doc
            .decorations_mut()
            .delta_decorations(&old, decorations)
            .into_iter();

        self.tracked = remote
            .into_iter()
            .filter_map(|state| {
                let caret = ids.next()?;
                let selection = if state.selection().is_some() {
                    ids.next()
                } else {
                    None
                };
                Some(TrackedUser {
                    state,
                    caret,
                    selection,
                })
            })
            .collect();

        let corrected_caret = users
            .iter()
            .find(|u| u.id == self.local_id)
            .and_then(|me| self.correct_local_caret(doc, me.position));

        tracing::trace!(tracked = self.tracked.len(), "presence updated");
        PresenceOutcome {
            tracked: self.tracked.len(),
            corrected_caret,
        }
    }

    /// The remote participants as they sit in the document now.
    ///
    /// Offsets come from the tracked ranges, so they include every local edit
    /// made since the broadcast that placed them.
    pub fn current_presence_for_broadcast<D: EditorDocument>(&self, doc: &D) -> Vec<UserState> {
        let decorations = doc.decorations();
        self.tracked
            .iter()
            .map(|user| {
                let mut state = user.state.clone();
                if let Some(range) = decorations.range(user.caret) {
                    state.position = range.start;
                }
                let selection = user
                    .selection
                    .and_then(|id| decorations.range(id))
                    .filter(|r| r.start < r.end);
                match selection {
                    Some(range) => state = state.with_selection(range),
                    None => {
                        state.has_selection = false;
                        state.selection_start = 0;
                        state.selection_end = 0;
                    }
                }
                state
            })
            .collect()
    }

    /// Each remote caret as a line/column, for hosts that place markers by
    /// position rather than by offset.
    pub fn caret_positions<D: EditorDocument>(&self, doc: &D) -> Vec<(UserId, Position)> {
        let index = doc.line_index();
        self.tracked
            .iter()
            .filter_map(|user| {
                let range = doc.decorations().range(user.caret)?;
                Some((user.state.id.clone(), index.to_position(range.start)))
            })
            .collect()
    }

    /// Switch theme, renaming the markers already placed.
    pub fn set_theme<D: EditorDocument>(&mut self, doc: &mut D, theme: Theme) {
        if self.theme == theme {
            return;
        }
        self.theme = theme;
        let users = self.current_presence_for_broadcast(doc);
        let old = self.decoration_ids();
        let len = doc.len_chars();
        let mut decorations = Vec::with_capacity(users.len() * 2);
        for user in &users {
            decorations.push(self.caret_decoration(user, len));
            if let Some(decoration) = self.selection_decoration(user, len) {
                decorations.push(decoration);
            }
        }
        let mut ids = doc
            .decorations_mut()
            .delta_decorations(&old, decorations)
            .into_iter();
        for (tracked, state) in self.tracked.iter_mut().zip(users) {
            tracked.caret = ids.next().unwrap_or(tracked.caret);
            tracked.selection = if state.selection().is_some() {
                ids.next()
            } else {
                None
            };
            tracked.state = state;
        }
    }

    /// Drop every remote marker.
    pub fn clear<D: EditorDocument>(&mut self, doc: &mut D) {
        let old = self.decoration_ids();
        doc.decorations_mut().delta_decorations(&old, []);
        self.tracked.clear();
    }

    fn decoration_ids(&self) -> Vec<DecorationId> {
        self.tracked
            .iter()
            .flat_map(|u| std::iter::once(u.caret).chain(u.selection))
            .collect()
    }

    fn caret_decoration(&self, user: &UserState, len: usize) -> Decoration {
        let start = user.position.min(len);
        // One column wide, or zero-width at the very end.
        let end = (start + 1).min(len);
        let bucket = color_bucket(user.index, self.buckets);
        Decoration::new(start..end, caret_class(bucket, self.theme))
            .with_stickiness(Stickiness::NeverGrowsWhenTypingAtEdges)
    }

    fn selection_decoration(&self, user: &UserState, len: usize) -> Option<Decoration> {
        let range = user.selection()?;
        let start = range.start.min(len);
        let end = range.end.min(len);
        if start >= end {
            return None;
        }
        let bucket = color_bucket(user.index, self.buckets);
        Some(
            Decoration::new(start..end, selection_class(bucket, self.theme))
                .with_stickiness(Stickiness::NeverGrowsWhenTypingAtEdges),
        )
    }

    fn correct_local_caret<D: EditorDocument>(&self, doc: &mut D, reported: usize) -> Option<usize> {
        if doc.has_selection() {
            return None;
        }
        let target = reported.min(doc.len_chars());
        if doc.cursor_offset() == target {
            return None;
        }
        tracing::debug!(from = doc.cursor_offset(), to = target, "server corrected local caret");
        doc.set_cursor_offset(target);
        doc.set_selection(None);
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_editor_core::{EditorRope, PlainEditor, Selection};

    type TestEditor = PlainEditor<EditorRope>;

    fn make_editor(content: &str) -> TestEditor {
        PlainEditor::new(EditorRope::from(content))
    }

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(UserId::new("me"), 5)
    }

    fn classes(doc: &TestEditor) -> Vec<String> {
        doc.decorations()
            .iter()
            .map(|(_, d)| d.class_name.to_string())
            .collect()
    }

    #[test]
    fn test_buckets_wrap() {
        assert_eq!(color_bucket(0, 5), 1);
        assert_eq!(color_bucket(5, 5), 1);
        assert_eq!(color_bucket(3, 5), 4);
        assert_eq!(color_bucket(7, 0), 1);
    }

    #[test]
    fn test_index_zero_and_five_share_a_colour() {
        let mut doc = make_editor("fn main() {}");
        let mut presence = tracker();
        presence.update_presence(
            &mut doc,
            &[UserState::caret("a", 0, 1), UserState::caret("b", 5, 4)],
        );
        assert_eq!(
            classes(&doc),
            ["other-user-cursor-1-light", "other-user-cursor-1-light"]
        );
    }

    #[test]
    fn test_self_is_never_shown() {
        let mut doc = make_editor("hello");
        let mut presence = tracker();
        let outcome = presence.update_presence(
            &mut doc,
            &[UserState::caret("me", 0, 0), UserState::caret("you", 1, 2)],
        );
        assert_eq!(outcome.tracked, 1);
        assert_eq!(doc.decorations().len(), 1);
        assert!(
            presence
                .current_presence_for_broadcast(&doc)
                .iter()
                .all(|u| u.id != "me")
        );
    }

    #[test]
    fn test_selection_gets_a_range_marker() {
        let mut doc = make_editor("let value = 42;");
        let mut presence = tracker().with_theme(Theme::Dark);
        presence.update_presence(
            &mut doc,
            &[UserState::caret("you", 2, 9).with_selection(4..9)],
        );
        assert_eq!(
            classes(&doc),
            ["other-user-cursor-3-dark", "other-user-selection-3-dark"]
        );
        let reported = presence.current_presence_for_broadcast(&doc);
        assert_eq!(reported[0].selection(), Some(4..9));
    }

    #[test]
    fn test_broadcast_replaces_markers_wholesale() {
        let mut doc = make_editor("abcdef");
        let mut presence = tracker();
        presence.update_presence(
            &mut doc,
            &[UserState::caret("a", 0, 1), UserState::caret("b", 1, 2)],
        );
        assert_eq!(doc.decorations().len(), 2);

        // "a" left the session.
        presence.update_presence(&mut doc, &[UserState::caret("b", 1, 3)]);
        assert_eq!(doc.decorations().len(), 1);
        let reported = presence.current_presence_for_broadcast(&doc);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].position, 3);
    }

    #[test]
    fn test_reported_offsets_follow_local_edits() {
        let mut doc = make_editor("0123456789 target here");
        let mut presence = tracker();
        presence.update_presence(&mut doc, &[UserState::caret("b", 1, 11)]);

        doc.insert(2, "inserted!!");
        let reported = presence.current_presence_for_broadcast(&doc);
        assert_eq!(reported[0].position, 21);

        doc.insert(doc.len_chars(), " tail");
        let reported = presence.current_presence_for_broadcast(&doc);
        assert_eq!(reported[0].position, 21);
    }

    #[test]
    fn test_caret_positions_use_lines() {
        let mut doc = make_editor("fn main() {\n    let x = 1;\n}");
        let mut presence = tracker();
        presence.update_presence(
            &mut doc,
            &[UserState::caret("a", 0, 3), UserState::caret("b", 1, 20)],
        );
        doc.insert(0, "\n");

        assert_eq!(
            presence.caret_positions(&doc),
            [
                (UserId::new("a"), Position::new(2, 4)),
                (UserId::new("b"), Position::new(3, 9)),
            ]
        );
    }

    #[test]
    fn test_caret_at_end_is_zero_width() {
        let mut doc = make_editor("abc");
        let mut presence = tracker();
        presence.update_presence(&mut doc, &[UserState::caret("b", 0, 10)]);
        let (_, decoration) = doc.decorations().iter().next().unwrap();
        assert_eq!(decoration.range, 3..3);
    }

    #[test]
    fn test_self_correction_moves_caret() {
        let mut doc = make_editor("the quick brown fox jumps");
        doc.set_cursor_offset(10);
        let mut presence = tracker();
        let outcome = presence.update_presence(&mut doc, &[UserState::caret("me", 0, 14)]);
        assert_eq!(outcome.corrected_caret, Some(14));
        assert_eq!(doc.cursor_offset(), 14);
    }

    #[test]
    fn test_self_correction_skipped_with_selection() {
        let mut doc = make_editor("the quick brown fox jumps");
        doc.set_cursor_offset(10);
        doc.set_selection(Some(Selection::new(4, 10)));
        let mut presence = tracker();
        let outcome = presence.update_presence(&mut doc, &[UserState::caret("me", 0, 14)]);
        assert_eq!(outcome.corrected_caret, None);
        assert_eq!(doc.cursor_offset(), 10);
    }

    #[test]
    fn test_theme_switch_renames_markers() {
        let mut doc = make_editor("abcdef");
        let mut presence = tracker();
        presence.update_presence(&mut doc, &[UserState::caret("b", 1, 2)]);
        doc.insert(0, "xx");
        presence.set_theme(&mut doc, Theme::Dark);

        assert_eq!(classes(&doc), ["other-user-cursor-2-dark"]);
        assert_eq!(presence.current_presence_for_broadcast(&doc)[0].position, 4);
    }

    #[test]
    fn test_clear_removes_only_presence() {
        let mut doc = make_editor("abcdef");
        let other = doc.decorations_mut().add(Decoration::new(0..1, "lint"));
        let mut presence = tracker();
        presence.update_presence(&mut doc, &[UserState::caret("b", 1, 2)]);
        presence.clear(&mut doc);
        assert!(presence.is_empty());
        assert_eq!(doc.decorations().len(), 1);
        assert!(doc.decorations().get(other).is_some());
    }
}
