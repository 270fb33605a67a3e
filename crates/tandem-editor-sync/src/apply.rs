//! Applying authoritative snapshots to a local document.
//!
//! A broadcast carries the whole document. The applier diffs it against the
//! buffer and applies the ops as one batch, so tracked ranges (presence
//! markers and the local caret, captured as temporary decorations) move
//! consistently with the text.

use tandem_editor_core::{
    Decoration, DecorationId, EditorDocument, Selection, Stickiness, compute_ops,
    normalize_line_endings,
};

const CARET_CLASS: &str = "local-caret";
const SELECTION_CLASS: &str = "local-selection";

/// What applying one snapshot did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The snapshot equals the buffer. Nothing was touched.
    Unchanged,
    /// The snapshot equals the last one this client sent and nothing newer
    /// has been applied since. Nothing was touched.
    SuppressedEcho,
    /// The buffer now equals the snapshot.
    Applied { ops: usize },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Applies remote snapshots, remembering what this client last sent.
#[derive(Debug, Clone, Default)]
pub struct RemoteApplier {
    last_sent: Option<String>,
}

impl RemoteApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the snapshot carried by an outgoing report.
    pub fn record_sent(&mut self, snapshot: impl Into<String>) {
        self.last_sent = Some(snapshot.into());
    }

    pub fn last_sent(&self) -> Option<&str> {
        self.last_sent.as_deref()
    }

    pub fn clear(&mut self) {
        self.last_sent = None;
    }

    /// Bring `doc` to `incoming`, keeping caret and selection anchored to the
    /// text around them.
    pub fn apply<D: EditorDocument>(&mut self, doc: &mut D, incoming: &str) -> ApplyOutcome {
        let incoming = normalize_line_endings(incoming);
        let current = doc.content_string();

        if current == incoming {
            tracing::trace!("remote snapshot matches buffer");
            return ApplyOutcome::Unchanged;
        }
        if self.last_sent.as_deref() == Some(incoming.as_ref()) {
            tracing::debug!("remote snapshot echoes our last report, skipping");
            return ApplyOutcome::SuppressedEcho;
        }
        // The server has moved past our report. A later snapshot that happens
        // to equal it is someone else's edit, not an echo.
        self.last_sent = None;

        let ops = compute_ops(&current, &incoming);
        if ops.is_empty() {
            return ApplyOutcome::Unchanged;
        }

        let captured = CapturedCaret::capture(doc);
        doc.apply_edits(&ops);
        captured.restore(doc);

        tracing::debug!(ops = ops.len(), len = doc.len_chars(), "applied remote snapshot");
        ApplyOutcome::Applied { ops: ops.len() }
    }
}

/// Caret and selection parked in the document's tracked-range table for the
/// duration of one batch.
struct CapturedCaret {
    caret: DecorationId,
    selection: Option<(DecorationId, bool)>,
}

impl CapturedCaret {
    fn capture<D: EditorDocument>(doc: &mut D) -> Self {
        let offset = doc.cursor_offset();
        // The caret keeps its place when text lands exactly on it.
        let caret = doc.decorations_mut().add(
            Decoration::new(offset..offset, CARET_CLASS)
                .with_stickiness(Stickiness::GrowsOnlyWhenTypingBefore),
        );
        let selection = doc.selection().filter(|s| !s.is_collapsed()).map(|s| {
            let id = doc.decorations_mut().add(
                Decoration::new(s.to_range(), SELECTION_CLASS)
                    .with_stickiness(Stickiness::NeverGrowsWhenTypingAtEdges),
            );
            (id, s.is_backwards())
        });
        Self { caret, selection }
    }

    fn restore<D: EditorDocument>(self, doc: &mut D) {
        if let Some(caret) = doc.decorations_mut().remove(self.caret) {
            doc.set_cursor_offset(caret.range.start);
        }
        if let Some((id, backwards)) = self.selection {
            let restored = doc.decorations_mut().remove(id).and_then(|d| {
                let range = d.range;
                (range.start < range.end).then(|| {
                    if backwards {
                        Selection::new(range.end, range.start)
                    } else {
                        Selection::new(range.start, range.end)
                    }
                })
            });
            doc.set_selection(restored);
        }
        doc.clamp_caret();
    }
}
