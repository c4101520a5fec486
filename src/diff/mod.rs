//! Structured unified diffs for a single file.

pub mod display;
pub mod hunk;

pub use display::format_numbered;
pub use hunk::{DiffLine, DiffLineKind, Hunk, HunkHeader};

use crate::selection::DiffSelection;
use error_set::error_set;
use std::fmt;

error_set! {
    /// Errors from parsing unified diff text
    DiffError := {
        #[display("Invalid hunk header: {line}")]
        MalformedHunkHeader { line: String },
        #[display("Unexpected line in diff: {line}")]
        UnexpectedLine { line: String },
        #[display("Hunk '{header}' has {old_seen} old and {new_seen} new lines")]
        HunkLengthMismatch { header: String, old_seen: u32, new_seen: u32 },
    }
}

/// What kind of content a diff describes. Only [`DiffKind::Text`] can be
/// turned into a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    Text,
    Binary,
    Image,
    /// Text output too large to parse
    LargeText,
    /// A deleted file with no line content
    Deleted,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffKind::Text => "text",
            DiffKind::Binary => "binary",
            DiffKind::Image => "image",
            DiffKind::LargeText => "large text",
            DiffKind::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// A parsed diff of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub kind: DiffKind,
    pub hunks: Vec<Hunk>,
}

impl Diff {
    pub fn text(hunks: Vec<Hunk>) -> Self {
        Self {
            kind: DiffKind::Text,
            hunks,
        }
    }

    /// A diff without hunks, for content that cannot be shown line by line
    pub fn opaque(kind: DiffKind) -> Self {
        Self {
            kind,
            hunks: Vec::new(),
        }
    }

    /// Parse `git diff` output for a single file.
    ///
    /// Everything before the first `@@` line (the `diff --git`, `index`, `---`
    /// and `+++` lines) is skipped. Binary diffs produce a
    /// [`DiffKind::Binary`] diff without hunks.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError`] if a hunk header is malformed, a hunk body holds
    /// a line with an unknown prefix, or a body does not match its header.
    pub fn parse(text: &str) -> Result<Self, DiffError> {
        // Split on '\n' only so CRLF content keeps its '\r'
        let mut lines = text.split_terminator('\n').peekable();
        let mut hunks = Vec::new();

        while let Some(line) = lines.next_if(|line| !line.starts_with("@@ ")) {
            if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
                return Ok(Diff::opaque(DiffKind::Binary));
            }
        }

        while let Some(line) = lines.next() {
            let header = HunkHeader::parse(line).ok_or_else(|| DiffError::MalformedHunkHeader {
                line: line.to_string(),
            })?;

            let mut old_line = header.old_start;
            let mut new_line = header.new_start;
            let (mut old_seen, mut new_seen) = (0u32, 0u32);
            let mut body: Vec<DiffLine> = Vec::new();

            loop {
                let more_body = old_seen < header.old_len || new_seen < header.new_len;
                let Some(line) = lines.next_if(|next| more_body || next.starts_with('\\')) else {
                    break;
                };

                let diff_line = if line.starts_with('\\') {
                    if let Some(last) = body.last_mut() {
                        last.no_trailing_newline = true;
                    }
                    continue;
                } else if let Some(text) = line.strip_prefix('+') {
                    new_seen += 1;
                    new_line += 1;
                    DiffLine::add(text, new_line - 1)
                } else if let Some(text) = line.strip_prefix('-') {
                    old_seen += 1;
                    old_line += 1;
                    DiffLine::delete(text, old_line - 1)
                } else if let Some(text) = line.strip_prefix(' ').or(line.is_empty().then_some("")) {
                    old_seen += 1;
                    new_seen += 1;
                    old_line += 1;
                    new_line += 1;
                    DiffLine::context(text, old_line - 1, new_line - 1)
                } else {
                    return Err(DiffError::UnexpectedLine {
                        line: line.to_string(),
                    });
                };

                body.push(diff_line);
            }

            if old_seen != header.old_len || new_seen != header.new_len {
                return Err(DiffError::HunkLengthMismatch {
                    header: header.to_string(),
                    old_seen,
                    new_seen,
                });
            }

            hunks.push(Hunk {
                header,
                lines: body,
            });

            // Anything between hunks other than the next header ends this file
            if lines.peek().is_some_and(|next| !next.starts_with("@@ ")) {
                break;
            }
        }

        Ok(Diff::text(hunks))
    }

    /// Set the `selected` flag of every change line from `selection`
    pub fn apply_selection(&mut self, selection: &DiffSelection) {
        for line in self.hunks.iter_mut().flat_map(|hunk| hunk.lines.iter_mut()) {
            line.selected = selection.includes(line);
        }
    }

    /// Return the diff with `selection` applied
    #[must_use]
    pub fn with_selection(mut self, selection: &DiffSelection) -> Self {
        self.apply_selection(selection);
        self
    }

    pub fn is_patchable(&self) -> bool {
        self.kind == DiffKind::Text
    }
}
