//! Parsing for `git status --porcelain=v1 -z` output.
//!
//! Each record is `XY<space>PATH` terminated by NUL. Renames and copies carry
//! a second NUL-terminated field holding the source path:
//!
//! ```text
//!  M src/lib.rs\0?? notes.txt\0R  new.rs\0old.rs\0
//! ```
//!
//! NUL termination keeps paths with spaces, quotes or newlines intact.
//!
//! # Examples
//!
//! ```
//! use git_partial::status::{FileStatus, parse_status};
//!
//! let status = parse_status("?? X.txt\0 D A.txt\0", None).unwrap();
//! assert_eq!(status.files.len(), 2);
//! assert_eq!(status.files[0].path(), "X.txt");
//! assert_eq!(status.files[0].status(), FileStatus::New);
//! assert!(!status.incomplete);
//! ```

use crate::selection::DiffSelection;
use error_set::error_set;
use nom::{
    IResult, Parser,
    bytes::complete::take,
    character::complete::char,
    combinator::rest,
    sequence::separated_pair,
};
use std::fmt;

error_set! {
    /// Errors from parsing porcelain status output
    StatusError := {
        /// A record does not have the `XY PATH` shape
        #[display("Malformed status record '{record}': {reason}")]
        MalformedRecord { record: String, reason: String },
    }
}

/// Kind of change reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
    Renamed,
    Copied,
    /// Unmerged paths, and any status code this crate does not recognise
    Conflicted,
}

impl FileStatus {
    /// Map the two-character `XY` porcelain code onto a status.
    ///
    /// Unmerged pairs win over everything else, then renames and copies. For
    /// the remaining codes the index column is used unless it is blank.
    pub fn from_code(index: char, worktree: char) -> Self {
        match (index, worktree) {
            ('D', 'D') | ('A', 'A') | ('U', _) | (_, 'U') => return FileStatus::Conflicted,
            ('?', '?') => return FileStatus::New,
            _ => {}
        }

        if index == 'R' || worktree == 'R' {
            return FileStatus::Renamed;
        }
        if index == 'C' || worktree == 'C' {
            return FileStatus::Copied;
        }

        let code = if index == ' ' { worktree } else { index };
        match code {
            'A' => FileStatus::New,
            'M' | 'T' => FileStatus::Modified,
            'D' => FileStatus::Deleted,
            _ => FileStatus::Conflicted,
        }
    }

    /// Whether records of this status carry a source path
    pub fn has_source_path(self) -> bool {
        matches!(self, FileStatus::Renamed | FileStatus::Copied)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileStatus::New => "new",
            FileStatus::Modified => "modified",
            FileStatus::Deleted => "deleted",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Conflicted => "conflicted",
        };
        f.write_str(name)
    }
}

/// A single changed path in the working directory.
///
/// `old_path` is present exactly when the status is [`FileStatus::Renamed`] or
/// [`FileStatus::Copied`]. The optional selection narrows which diff lines a
/// later [`apply_patch_to_index`](crate::command::apply_patch_to_index) stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    path: String,
    status: FileStatus,
    old_path: Option<String>,
    selection: DiffSelection,
}

impl FileChange {
    /// Create a change for a path that was not renamed or copied.
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        debug_assert!(
            !status.has_source_path(),
            "renamed and copied changes need a source path"
        );
        Self {
            path: path.into(),
            status,
            old_path: None,
            selection: DiffSelection::All,
        }
    }

    /// Create a rename from `old_path` to `path`
    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self::moved(FileStatus::Renamed, old_path.into(), path.into())
    }

    /// Create a copy from `old_path` to `path`
    pub fn copied(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self::moved(FileStatus::Copied, old_path.into(), path.into())
    }

    fn moved(status: FileStatus, old_path: String, path: String) -> Self {
        Self {
            path,
            status,
            old_path: Some(old_path),
            selection: DiffSelection::All,
        }
    }

    /// Return the same change with a different line selection
    #[must_use]
    pub fn with_selection(self, selection: DiffSelection) -> Self {
        Self { selection, ..self }
    }

    /// Repository-relative path (the destination for renames)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn old_path(&self) -> Option<&str> {
        self.old_path.as_deref()
    }

    pub fn selection(&self) -> &DiffSelection {
        &self.selection
    }
}

/// Changed files in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingDirectoryStatus {
    pub files: Vec<FileChange>,
    /// True when a limit cut the listing short
    pub incomplete: bool,
}

impl WorkingDirectoryStatus {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Find the change recorded for `path`
    pub fn find(&self, path: &str) -> Option<&FileChange> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// Parse NUL-terminated porcelain v1 status output.
///
/// With `limit`, parsing stops once `limit` records have been collected. The
/// first `limit` records in report order are kept and `incomplete` is set only
/// if at least one further record exists.
///
/// # Errors
///
/// Returns [`StatusError::MalformedRecord`] if a record is not `XY PATH`, or a
/// rename/copy record lacks its source path field.
pub fn parse_status(raw: &str, limit: Option<usize>) -> Result<WorkingDirectoryStatus, StatusError> {
    let mut fields = raw.split('\0');
    let mut status = WorkingDirectoryStatus::default();

    while let Some(field) = fields.next() {
        // The final terminator leaves an empty field behind
        if field.is_empty() {
            continue;
        }

        if limit.is_some_and(|limit| status.files.len() >= limit) {
            status.incomplete = true;
            break;
        }

        let (code, path) = split_record(field)?;
        let mut code_chars = code.chars();
        let (index, worktree) = match (code_chars.next(), code_chars.next()) {
            (Some(index), Some(worktree)) => (index, worktree),
            _ => return Err(malformed(field, "status code must be two characters")),
        };

        let kind = FileStatus::from_code(index, worktree);
        let change = if kind.has_source_path() {
            let source = fields
                .next()
                .filter(|source| !source.is_empty())
                .ok_or_else(|| malformed(field, "missing source path"))?;
            FileChange::moved(kind, source.to_string(), path.to_string())
        } else {
            FileChange::new(path, kind)
        };

        status.files.push(change);
    }

    Ok(status)
}

/// Split `XY PATH` into its code and path
fn split_record(field: &str) -> Result<(&str, &str), StatusError> {
    let parsed: IResult<&str, (&str, &str)> =
        separated_pair(take(2usize), char(' '), rest).parse(field);

    match parsed {
        Ok((_, (_, ""))) => Err(malformed(field, "empty path")),
        Ok((_, record)) => Ok(record),
        Err(_) => Err(malformed(field, "expected 'XY PATH'")),
    }
}

fn malformed(record: &str, reason: &str) -> StatusError {
    StatusError::MalformedRecord {
        record: record.to_string(),
        reason: reason.to_string(),
    }
}
