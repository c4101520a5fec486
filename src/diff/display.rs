use super::{Diff, DiffKind};
use std::fmt::Write as _;

/// Format a diff for human-readable display with explicit line numbers.
///
/// Each change line is prefixed with the number that a `FILE:REFS` selection
/// uses for it: new numbers for additions, old numbers for deletions.
/// Non-contiguous hunks are separated by a blank line.
///
/// ```text
/// flake.nix:
///   +137:       debug = true;
///
///   +142:         ./flake-modules/home-manager.nix
/// ```
pub fn format_numbered(path: &str, diff: &Diff) -> String {
    let mut result = format!("{path}:\n");

    if diff.kind != DiffKind::Text {
        let _ = writeln!(result, "  ({} diff)", diff.kind);
        return result;
    }

    for (i, hunk) in diff.hunks.iter().enumerate() {
        if i > 0 {
            result.push('\n');
        }
        for line in hunk.lines.iter().filter(|line| line.is_change()) {
            let number = line.new_line_number.or(line.old_line_number).unwrap_or(0);
            let _ = writeln!(result, "  {}{}:\t{}", line.kind.prefix(), number, line.text);
        }
    }

    result
}
