//! Rebuild a unified diff from the selected lines of a [`Diff`].
//!
//! The output targets `git apply --cached --unidiff-zero`, so it describes a
//! change from the *index* rather than from the working tree:
//!
//! - Selected additions and deletions are kept as they are.
//! - Unselected deletions become context. The index still holds those lines.
//! - Unselected additions are dropped. The index never held them.
//!
//! Context is then trimmed to the lines directly next to a change. This can
//! split one input hunk into several output hunks. Start lines come from
//! running counters, and the new side is offset by the net line count of
//! everything emitted earlier in the file.

use crate::diff::{Diff, DiffKind, DiffLine, DiffLineKind, Hunk, HunkHeader};
use crate::status::{FileChange, FileStatus};
use error_set::error_set;
use std::fmt::Write as _;

error_set! {
    /// Errors from building a patch
    PatchError := {
        /// Only text diffs can be expressed as a patch
        #[display("Cannot build a patch from a {kind} diff")]
        UnsupportedDiffKind { kind: DiffKind },
        /// Every hunk was dropped because no change line was selected
        #[display("No selected changes in {path}")]
        NothingSelected { path: String },
    }
}

/// A line as it will be written to the patch
#[derive(Debug, Clone, Copy)]
struct PatchLine<'a> {
    kind: DiffLineKind,
    text: &'a str,
    /// Preimage number of this line, or of the line an addition goes before
    old_number: u32,
    no_trailing_newline: bool,
}

/// Format the selected lines of `diff` as a patch for `file`.
///
/// The output is a function of its inputs only: the same file, diff and
/// selection always give byte-identical text.
///
/// # Errors
///
/// - [`PatchError::UnsupportedDiffKind`] if `diff` is not a text diff.
/// - [`PatchError::NothingSelected`] if no hunk has a selected change line.
pub fn format_patch(file: &FileChange, diff: &Diff) -> Result<String, PatchError> {
    if !diff.is_patchable() {
        return Err(PatchError::UnsupportedDiffKind { kind: diff.kind });
    }

    let mut hunks = Vec::new();
    // Net lines added by the hunks emitted so far
    let mut delta: i64 = 0;

    for hunk in &diff.hunks {
        let lines = staged_lines(hunk);
        for run in retained_runs(&lines) {
            let staged = build_hunk(run, delta);
            delta += i64::from(staged.header.new_len) - i64::from(staged.header.old_len);
            hunks.push(staged);
        }
    }

    if hunks.is_empty() {
        return Err(PatchError::NothingSelected {
            path: file.path().to_string(),
        });
    }

    let mut patch = file_header(file, removes_whole_file(file, diff));
    for hunk in &hunks {
        let _ = write!(patch, "{hunk}");
    }

    Ok(patch)
}

/// Reclassify a hunk's lines against the index
fn staged_lines(hunk: &Hunk) -> Vec<PatchLine<'_>> {
    let mut old_number = if hunk.header.old_len == 0 {
        hunk.header.old_start + 1
    } else {
        hunk.header.old_start
    };
    let mut staged: Vec<PatchLine<'_>> = Vec::with_capacity(hunk.lines.len());

    for line in &hunk.lines {
        let kind = match (line.kind, line.selected) {
            (DiffLineKind::Add, false) => None,
            (DiffLineKind::Delete, false) => Some(DiffLineKind::Context),
            (kind, _) => Some(kind),
        };

        if let Some(kind) = kind {
            if kind == DiffLineKind::Add {
                bridge_missing_newline(&mut staged, old_number);
            }
            staged.push(PatchLine {
                kind,
                text: &line.text,
                old_number,
                no_trailing_newline: line.no_trailing_newline,
            });
        }

        if line.kind != DiffLineKind::Add {
            old_number += 1;
        }
    }

    staged
}

/// Lines cannot be appended after a context line that has no newline.
/// Replace it with a delete and a re-add that carries the newline.
fn bridge_missing_newline<'a>(staged: &mut Vec<PatchLine<'a>>, old_number: u32) {
    let Some(last) = staged.last_mut() else {
        return;
    };
    if last.kind != DiffLineKind::Context || !last.no_trailing_newline {
        return;
    }

    last.kind = DiffLineKind::Delete;
    let text = last.text;
    staged.push(PatchLine {
        kind: DiffLineKind::Add,
        text,
        old_number,
        no_trailing_newline: false,
    });
}

/// Split staged lines into runs of changes plus their adjacent context
fn retained_runs<'l, 'a>(lines: &'l [PatchLine<'a>]) -> Vec<&'l [PatchLine<'a>]> {
    let is_change = |i: usize| {
        lines
            .get(i)
            .is_some_and(|line| line.kind != DiffLineKind::Context)
    };

    let mut runs = Vec::new();
    let mut start = None;

    for i in 0..lines.len() {
        let keep = is_change(i) || (i > 0 && is_change(i - 1)) || is_change(i + 1);
        match (keep, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(&lines[s..i]);
                start = None;
            }
            _ => {}
        }
    }

    if let Some(s) = start {
        runs.push(&lines[s..]);
    }

    runs
}

/// Build an output hunk from one run, numbering the new side with `delta`
fn build_hunk(run: &[PatchLine<'_>], delta: i64) -> Hunk {
    let first_old = run.first().map_or(1, |line| line.old_number);
    let first_new = (i64::from(first_old) + delta).clamp(0, i64::from(u32::MAX)) as u32;

    let (mut old, mut new) = (first_old, first_new);
    let mut lines = Vec::with_capacity(run.len());

    for line in run {
        let mut diff_line = match line.kind {
            DiffLineKind::Context => DiffLine::context(line.text, old, new),
            DiffLineKind::Delete => DiffLine::delete(line.text, old),
            DiffLineKind::Add => DiffLine::add(line.text, new),
        };
        diff_line.no_trailing_newline = line.no_trailing_newline;

        if line.kind != DiffLineKind::Add {
            old += 1;
        }
        if line.kind != DiffLineKind::Delete {
            new += 1;
        }
        lines.push(diff_line);
    }

    let old_len = old - first_old;
    let new_len = new - first_new;

    Hunk {
        header: HunkHeader {
            old_start: if old_len == 0 { first_old.saturating_sub(1) } else { first_old },
            old_len,
            new_start: if new_len == 0 { first_new.saturating_sub(1) } else { first_new },
            new_len,
        },
        lines,
    }
}

/// A deleted file whose every line is selected for removal
fn removes_whole_file(file: &FileChange, diff: &Diff) -> bool {
    let mut lines = diff.hunks.iter().flat_map(|hunk| &hunk.lines).peekable();
    file.status() == FileStatus::Deleted
        && lines.peek().is_some()
        && lines.all(|line| line.kind == DiffLineKind::Delete && line.selected)
}

fn file_header(file: &FileChange, removes_whole_file: bool) -> String {
    let from = match (file.status(), file.old_path()) {
        (FileStatus::New, _) => "/dev/null".to_string(),
        (_, Some(old_path)) => quote_path("a/", old_path),
        _ => quote_path("a/", file.path()),
    };
    let to = if removes_whole_file {
        "/dev/null".to_string()
    } else {
        quote_path("b/", file.path())
    };

    format!("--- {from}\n+++ {to}\n")
}

/// C-style quote a path the way git does when it holds special characters
fn quote_path(prefix: &str, path: &str) -> String {
    if !path.contains(|c| matches!(c, '"' | '\\' | '\n' | '\t')) {
        return format!("{prefix}{path}");
    }

    let mut quoted = format!("\"{prefix}");
    for c in path.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::selection::{DiffSelection, LineRef};
    use proptest::prelude::*;
    use similar_asserts::assert_eq;
    use std::num::NonZeroU32;

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn modified(path: &str) -> FileChange {
        FileChange::new(path, FileStatus::Modified)
    }

    fn select(raw: &str, refs: Vec<LineRef>) -> Diff {
        Diff::parse(raw)
            .unwrap()
            .with_selection(&DiffSelection::Lines(refs))
    }

    #[test]
    fn single_addition() {
        let diff = Diff::parse("@@ -136,0 +137 @@\n+      debug = true;\n").unwrap();
        let patch = format_patch(&modified("flake.nix"), &diff).unwrap();
        assert_eq!(
            patch,
            "--- a/flake.nix\n+++ b/flake.nix\n@@ -136,0 +137 @@\n+      debug = true;\n"
        );
    }

    #[test]
    fn contiguous_additions() {
        let diff = Diff::parse(
            "@@ -38,0 +39,3 @@\n+\n+    stylix = {\n+    };\n",
        )
        .unwrap();
        let patch = format_patch(&modified("flake.nix"), &diff).unwrap();
        assert_eq!(
            patch,
            "--- a/flake.nix\n+++ b/flake.nix\n@@ -38,0 +39,3 @@\n+\n+    stylix = {\n+    };\n"
        );
    }

    #[test]
    fn partial_additions() {
        let diff = select(
            "@@ -39,0 +40,3 @@\n+        # Allow Stylix\n+        \"fontFamily\" = \"monospace\";\n+        \"direnv.restart.automatic\" = true;\n",
            vec![LineRef::AddRange(nz(40), nz(41))],
        );
        let patch = format_patch(&modified("default.nix"), &diff).unwrap();
        assert_eq!(
            patch,
            "--- a/default.nix\n+++ b/default.nix\n@@ -39,0 +40,2 @@\n+        # Allow Stylix\n+        \"fontFamily\" = \"monospace\";\n"
        );
        assert!(!patch.contains("direnv.restart.automatic"));
    }

    #[test]
    fn single_deletion() {
        let diff = Diff::parse("@@ -15 +14,0 @@\n-      enableAutosuggestions = true;\n").unwrap();
        let patch = format_patch(&modified("zsh.nix"), &diff).unwrap();
        assert_eq!(
            patch,
            "--- a/zsh.nix\n+++ b/zsh.nix\n@@ -15 +14,0 @@\n-      enableAutosuggestions = true;\n"
        );
    }

    #[test]
    fn selective_from_mixed() {
        let diff = select(
            "@@ -10,2 +10,3 @@\n-    gtk.theme.name = \"Adwaita\";\n-    gtk.iconTheme.name = \"Papirus\";\n+    # Theme managed by Stylix\n+    gtk.iconTheme.name = \"Papirus-Dark\";\n+    gtk.cursorTheme.size = 24;\n",
            vec![LineRef::Add(nz(12))],
        );
        let patch = format_patch(&modified("gtk.nix"), &diff).unwrap();

        // The unselected deletion next to the addition stays as context
        assert_eq!(
            patch,
            "--- a/gtk.nix\n+++ b/gtk.nix\n@@ -11 +11,2 @@\n     gtk.iconTheme.name = \"Papirus\";\n+    gtk.cursorTheme.size = 24;\n"
        );
        assert!(!patch.contains("-    gtk.theme.name"));
        assert!(!patch.contains("Papirus-Dark"));
    }

    #[test]
    fn unselected_changes_reclassified() {
        let diff = select(
            "@@ -1,3 +1,3 @@\n-a\n-b\n-c\n+A\n+B\n+C\n",
            vec![LineRef::Delete(nz(2)), LineRef::Add(nz(2))],
        );
        let patch = format_patch(&modified("f"), &diff).unwrap();
        assert_eq!(patch, "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n-b\n c\n+B\n");

        let hunk = &Diff::parse(&patch).unwrap().hunks[0];
        assert_eq!(hunk.counts(), (hunk.header.old_len, hunk.header.new_len));
    }

    #[test]
    fn only_additions_selected_in_replacement() {
        let diff = select(
            "@@ -1,3 +1,3 @@\n-a\n-b\n-c\n+A\n+B\n+C\n",
            vec![LineRef::Add(nz(2))],
        );
        let patch = format_patch(&modified("f"), &diff).unwrap();
        assert_eq!(patch, "--- a/f\n+++ b/f\n@@ -3 +3,2 @@\n c\n+B\n");
    }

    #[test]
    fn no_matching_lines() {
        let diff = select("@@ -9,0 +10 @@\n+something\n", vec![LineRef::Add(nz(99))]);
        let result = format_patch(&modified("file.nix"), &diff);
        assert!(matches!(result, Err(PatchError::NothingSelected { .. })));
    }

    #[test]
    fn non_text_diff_is_rejected() {
        for kind in [
            DiffKind::Binary,
            DiffKind::Image,
            DiffKind::LargeText,
            DiffKind::Deleted,
        ] {
            let result = format_patch(&modified("logo.png"), &Diff::opaque(kind));
            assert!(matches!(
                result,
                Err(PatchError::UnsupportedDiffKind { kind: k }) if k == kind
            ));
        }
    }

    #[test]
    fn new_file_uses_dev_null_source() {
        let diff = select(
            "@@ -0,0 +1,3 @@\n+a\n+b\n+c\n",
            vec![LineRef::Add(nz(1)), LineRef::Add(nz(3))],
        );
        let patch = format_patch(&FileChange::new("X.txt", FileStatus::New), &diff).unwrap();
        assert_eq!(patch, "--- /dev/null\n+++ b/X.txt\n@@ -0,0 +1,2 @@\n+a\n+c\n");
    }

    #[test]
    fn full_deletion_uses_dev_null_target() {
        let diff = Diff::parse("@@ -1,2 +0,0 @@\n-a\n-b\n").unwrap();
        let patch = format_patch(&FileChange::new("gone.txt", FileStatus::Deleted), &diff).unwrap();
        assert_eq!(patch, "--- a/gone.txt\n+++ /dev/null\n@@ -1,2 +0,0 @@\n-a\n-b\n");
    }

    #[test]
    fn partial_deletion_keeps_target_path() {
        let diff = select("@@ -1,2 +0,0 @@\n-a\n-b\n", vec![LineRef::Delete(nz(2))]);
        let patch = format_patch(&FileChange::new("gone.txt", FileStatus::Deleted), &diff).unwrap();
        assert_eq!(patch, "--- a/gone.txt\n+++ b/gone.txt\n@@ -1,2 +1 @@\n a\n-b\n");
    }

    #[test]
    fn rename_uses_old_path_for_source() {
        let diff = Diff::parse("@@ -3 +3 @@\n-three\n+THREE\n").unwrap();
        let patch = format_patch(&FileChange::renamed("A.txt", "B.txt"), &diff).unwrap();
        assert_eq!(patch, "--- a/A.txt\n+++ b/B.txt\n@@ -3 +3 @@\n-three\n+THREE\n");
    }

    #[test]
    fn special_paths_are_quoted() {
        let diff = Diff::parse("@@ -1 +1 @@\n-a\n+b\n").unwrap();
        let patch = format_patch(&modified("say \"hi\".txt"), &diff).unwrap();
        assert!(patch.starts_with("--- \"a/say \\\"hi\\\".txt\"\n+++ \"b/say \\\"hi\\\".txt\"\n"));
    }

    #[test]
    fn later_hunks_shift_by_earlier_selections() {
        let raw = "@@ -2,0 +3,2 @@\n+x\n+y\n@@ -10 +12 @@\n-old\n+new\n";

        let all = Diff::parse(raw).unwrap();
        let patch = format_patch(&modified("f"), &all).unwrap();
        assert_eq!(
            patch,
            "--- a/f\n+++ b/f\n@@ -2,0 +3,2 @@\n+x\n+y\n@@ -10 +12 @@\n-old\n+new\n"
        );

        let second_only = select(raw, vec![LineRef::Delete(nz(10)), LineRef::Add(nz(12))]);
        let patch = format_patch(&modified("f"), &second_only).unwrap();
        assert_eq!(patch, "--- a/f\n+++ b/f\n@@ -10 +10 @@\n-old\n+new\n");
    }

    #[test]
    fn distant_context_splits_hunk() {
        let diff = Diff::parse(
            "@@ -1,7 +1,7 @@\n a\n-b\n+B\n c\n d\n e\n-f\n+F\n g\n",
        )
        .unwrap();
        let patch = format_patch(&modified("f"), &diff).unwrap();
        assert_eq!(
            patch,
            "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n@@ -5,3 +5,3 @@\n e\n-f\n+F\n g\n"
        );
    }

    #[test]
    fn fully_selected_adjacent_context_round_trips_counts() {
        let raw = "@@ -2,3 +2,4 @@\n b\n-c\n+C\n+C2\n d\n@@ -20,2 +21,2 @@\n t\n-u\n+U\n";
        let original = Diff::parse(raw).unwrap();
        let patch = format_patch(&modified("f"), &original).unwrap();
        let reparsed = Diff::parse(&patch).unwrap();

        let headers = |diff: &Diff| -> Vec<HunkHeader> {
            diff.hunks.iter().map(|hunk| hunk.header).collect()
        };
        assert_eq!(headers(&reparsed), headers(&original));
    }

    #[test]
    fn unselected_last_line_without_newline_is_bridged() {
        let diff = select(
            "@@ -3 +3,2 @@\n-last\n\\ No newline at end of file\n+last\n+appended\n",
            vec![LineRef::Add(nz(4))],
        );
        let patch = format_patch(&modified("f"), &diff).unwrap();
        assert_eq!(
            patch,
            "--- a/f\n+++ b/f\n@@ -3 +3,2 @@\n-last\n\\ No newline at end of file\n+last\n+appended\n"
        );
    }

    #[test]
    fn carriage_returns_survive() {
        let diff = Diff::parse("@@ -1 +1 @@\n-old\r\n+new\r\n").unwrap();
        let patch = format_patch(&modified("f"), &diff).unwrap();
        assert!(patch.ends_with("-old\r\n+new\r\n"));
    }

    fn hunk_shape() -> impl Strategy<Value = Vec<(DiffLineKind, bool)>> {
        let kind = prop::sample::select(vec![
            DiffLineKind::Context,
            DiffLineKind::Add,
            DiffLineKind::Delete,
        ]);
        prop::collection::vec((kind, any::<bool>()), 1..30)
    }

    proptest! {
        #[test]
        fn formatted_patch_is_consistent(shape in hunk_shape(), start in 1u32..500) {
            let old_len = shape.iter().filter(|(k, _)| *k != DiffLineKind::Add).count();
            let new_len = shape.iter().filter(|(k, _)| *k != DiffLineKind::Delete).count();
            let old_start = if old_len == 0 { start - 1 } else { start };
            let new_start = if new_len == 0 { start - 1 } else { start };

            let mut raw = format!("@@ -{old_start},{old_len} +{new_start},{new_len} @@\n");
            for (i, (kind, _)) in shape.iter().enumerate() {
                raw.push(kind.prefix());
                raw.push_str(&format!("line {i}\n"));
            }

            let mut diff = Diff::parse(&raw).unwrap();
            for (line, (_, selected)) in diff.hunks[0].lines.iter_mut().zip(&shape) {
                if line.is_change() {
                    line.selected = *selected;
                }
            }

            let selected_adds = shape.iter().filter(|(k, s)| *k == DiffLineKind::Add && *s).count();
            let selected_dels = shape.iter().filter(|(k, s)| *k == DiffLineKind::Delete && *s).count();
            let file = modified("f.txt");

            match format_patch(&file, &diff) {
                Err(PatchError::NothingSelected { .. }) => {
                    prop_assert_eq!(selected_adds + selected_dels, 0);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
                Ok(patch) => {
                    // Re-parsing checks every header against its body
                    let reparsed = Diff::parse(&patch);
                    prop_assert!(reparsed.is_ok(), "{:?}\n{}", reparsed, patch);

                    let body: Vec<&str> = patch.lines().skip(2).collect();
                    prop_assert_eq!(body.iter().filter(|l| l.starts_with('+')).count(), selected_adds);
                    prop_assert_eq!(body.iter().filter(|l| l.starts_with('-')).count(), selected_dels);
                    prop_assert_eq!(format_patch(&file, &diff).unwrap(), patch);
                }
            }
        }
    }
}
