//! Async wrapper around the `git` binary for status inspection and
//! line-level partial staging.
//!
//! The crate has two pure cores and a thin command layer around them:
//!
//! - [`status::parse_status`] turns `git status --porcelain=v1 -z` output into
//!   a [`WorkingDirectoryStatus`].
//! - [`patch::format_patch`] turns a [`FileChange`] and its selected [`Diff`]
//!   lines back into a zero-context patch for `git apply --cached`.
//!
//! The [`command`] functions shell out through [`exec::git`] and glue the two
//! together.
//!
//! ```no_run
//! # async fn run() -> Result<(), git_partial::GitPartialError> {
//! use git_partial::{DiffSelection, LineRef, StatusOptions, command};
//! use std::num::NonZeroU32;
//! use std::path::Path;
//!
//! let repo = Path::new(".");
//! let status = command::get_status(repo, &StatusOptions::default()).await?;
//! for file in status.files {
//!     let line = NonZeroU32::MIN;
//!     let file = file.with_selection(DiffSelection::Lines(vec![LineRef::Add(line)]));
//!     command::apply_patch_to_index(repo, &file, Default::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```

use error_set::error_set;

pub mod command;
pub mod diff;
pub mod exec;
pub mod patch;
pub mod progress;
pub mod selection;
pub mod status;

pub use command::{CloneOptions, CloneProgress, StatusOptions};
pub use diff::{Diff, DiffError, DiffKind, DiffLine, DiffLineKind, Hunk, HunkHeader};
pub use exec::{ExecutionOptions, GitOutput, ProgressSink};
pub use patch::{PatchError, format_patch};
pub use progress::{GitProgressParser, ProgressEvent, ProgressKind};
pub use selection::{DiffSelection, FileLineRefs, LineRef, SelectionError, parse_file_refs};
pub use status::{FileChange, FileStatus, StatusError, WorkingDirectoryStatus, parse_status};

error_set! {
    /// Top-level error for git-partial operations
    GitPartialError := {
        #[display("No entry for {path} in the working directory status")]
        NotInStatus { path: String },
        #[display("Unexpected ls-tree output for {path}: {output}")]
        UnexpectedTreeEntry { path: String, output: String },
        StatusError(StatusError),
        DiffError(DiffError),
        PatchError(PatchError),
        SelectionError(SelectionError),
    } || GitCommandError

    /// Errors from git command execution
    GitCommandError := {
        #[display("Unable to find path to repository on disk.")]
        InputNotFound { path: String },
        #[display("Failed to spawn git {label}: {message}")]
        SpawnFailed { label: String, message: String },
        #[display("Failed to write patch to git {label}: {message}")]
        StdinWriteFailed { label: String, message: String },
        #[display("Failed to read output of git {label}: {message}")]
        OutputReadFailed { label: String, message: String },
        #[display("git {label} failed with exit code {exit_code}: {stderr}")]
        ProcessFailure { label: String, exit_code: i32, stderr: String },
        #[display("Invalid UTF-8 in git {label} output: {message}")]
        InvalidUtf8 { label: String, message: String },
    }
}
