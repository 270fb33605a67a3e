//! Snapshot diffing into coalesced replace operations.
//!
//! [`compute_ops`] runs a char-level Myers diff and folds every run of
//! deletes and inserts between two equal spans into one [`ReplaceOp`], so a
//! remote snapshot lands on the live buffer as few discrete edits as possible.

use std::ops::Range;

use similar::{Algorithm, ChangeTag, TextDiff};

/// Replace `range` (char offsets into the old snapshot) with `replacement`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaceOp {
    pub range: Range<usize>,
    pub replacement: String,
}

impl ReplaceOp {
    pub fn new(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    /// Net change in document length, in chars.
    pub fn len_delta(&self) -> isize {
        self.replacement.chars().count() as isize - self.range.len() as isize
    }
}

/// Diff two snapshots into ascending, non-overlapping replace ops.
///
/// Identical snapshots produce no ops. Consecutive ops are always separated
/// by at least one unchanged char.
pub fn compute_ops(old: &str, new: &str) -> Vec<ReplaceOp> {
    if old == new {
        return Vec::new();
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(old, new);

    let mut ops = Vec::new();
    let mut pending: Option<ReplaceOp> = None;
    // Char offset into `old`. Only equal and deleted chars advance it.
    let mut cursor = 0usize;

    for change in diff.iter_all_changes() {
        let value = change.value();
        match change.tag() {
            ChangeTag::Equal => {
                ops.extend(pending.take());
                cursor += value.chars().count();
            }
            ChangeTag::Delete => {
                let op = pending.get_or_insert_with(|| ReplaceOp::new(cursor..cursor, ""));
                cursor += value.chars().count();
                op.range.end = cursor;
            }
            ChangeTag::Insert => {
                pending
                    .get_or_insert_with(|| ReplaceOp::new(cursor..cursor, ""))
                    .replacement
                    .push_str(value);
            }
        }
    }
    ops.extend(pending);

    debug_assert!(
        ops.windows(2).all(|w| w[0].range.end < w[1].range.start),
        "diff ops must be ascending and non-overlapping"
    );
    tracing::trace!(old_len = old.len(), new_len = new.len(), ops = ops.len(), "computed diff");
    ops
}

/// Apply ops computed by [`compute_ops`] to the snapshot they were computed from.
///
/// Splices from the last op to the first, the same order
/// `EditorDocument::apply_edits` uses, so offsets are never remapped.
pub fn apply_ops(text: &str, ops: &[ReplaceOp]) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    for op in ops.iter().rev() {
        let end = op.range.end.min(chars.len());
        let start = op.range.start.min(end);
        chars.splice(start..end, op.replacement.chars());
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_well_formed(old: &str, ops: &[ReplaceOp]) {
        let len = old.chars().count();
        for op in ops {
            assert!(op.range.start <= op.range.end);
            assert!(op.range.end <= len);
        }
        for pair in ops.windows(2) {
            assert!(pair[0].range.end < pair[1].range.start);
        }
    }

    #[test]
    fn test_identical_is_empty() {
        assert!(compute_ops("same", "same").is_empty());
        assert!(compute_ops("", "").is_empty());
    }

    #[test]
    fn test_scenario_text_to_script() {
        let old = "some text was";
        let new = "some script was modified";
        let ops = compute_ops(old, new);

        assert!(!ops.is_empty());
        assert_well_formed(old, &ops);
        assert_eq!(apply_ops(old, &ops), new);
        // The leading "some " survives untouched.
        assert!(ops[0].range.start >= 5);
    }

    #[test]
    fn test_empty_old_is_single_insert() {
        let ops = compute_ops("", "fresh text");
        assert_eq!(ops, vec![ReplaceOp::new(0..0, "fresh text")]);
    }

    #[test]
    fn test_empty_new_is_single_delete() {
        let ops = compute_ops("gone", "");
        assert_eq!(ops, vec![ReplaceOp::new(0..4, "")]);
    }

    #[test]
    fn test_delete_then_insert_coalesces() {
        let ops = compute_ops("a-b", "a+b");
        assert_eq!(ops, vec![ReplaceOp::new(1..2, "+")]);
        assert_eq!(ops[0].len_delta(), 0);
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let ops = compute_ops("日本語", "日本人語");
        assert_eq!(ops, vec![ReplaceOp::new(2..2, "人")]);
    }

    #[test]
    fn test_separate_edits_stay_separate() {
        let old = "alpha beta gamma";
        let new = "Alpha beta gammA";
        let ops = compute_ops(old, new);
        assert_eq!(ops.len(), 2);
        assert_well_formed(old, &ops);
        assert_eq!(apply_ops(old, &ops), new);
    }

    #[test]
    fn test_insert_after_delete_stays_ascending() {
        let ops = compute_ops("a\n", "\n\na");
        assert_well_formed("a\n", &ops);
        assert_eq!(apply_ops("a\n", &ops), "\n\na");

        let old = "\n\n 日a\n";
        let new = "\n日日a日 \n\n日";
        let ops = compute_ops(old, new);
        assert_well_formed(old, &ops);
        assert_eq!(apply_ops(old, &ops), new);
    }

    proptest! {
        #[test]
        fn applying_ops_reproduces_target(a in "[ab\n日 ]{0,24}", b in "[ab\n日 ]{0,24}") {
            let ops = compute_ops(&a, &b);
            assert_well_formed(&a, &ops);
            prop_assert_eq!(apply_ops(&a, &ops), b);
        }

        #[test]
        fn identical_snapshots_have_no_ops(a in ".{0,32}") {
            prop_assert!(compute_ops(&a, &a).is_empty());
        }
    }
}
