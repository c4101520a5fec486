use crate::exec::{ExecutionOptions, git};
use crate::status::{WorkingDirectoryStatus, parse_status};
use crate::{GitCommandError, GitPartialError};
use std::path::Path;
use tracing::{debug, instrument};

/// Options for [`get_status`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusOptions {
    /// Ignore the user's global excludes file so only the repository's own
    /// ignore rules apply
    pub limit_to_gitignore: bool,
    /// Stop after this many records and mark the result incomplete
    pub limit: Option<usize>,
}

/// Read the working directory status of the repository at `path`.
///
/// # Errors
///
/// [`GitCommandError::InputNotFound`] when `path` is not a directory or not
/// inside a repository, otherwise any git or parse failure.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn get_status(
    path: &Path,
    options: &StatusOptions,
) -> Result<WorkingDirectoryStatus, GitPartialError> {
    let is_dir = tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_dir());
    if !is_dir {
        return Err(GitCommandError::InputNotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let mut args = Vec::new();
    if options.limit_to_gitignore {
        args.extend(["-c", "core.excludesFile="]);
    }
    args.extend(["status", "--porcelain=v1", "-z", "--untracked-files=all"]);

    let output = git(&args, path, "getStatus", ExecutionOptions::default()).await?;
    let status = parse_status(&output.stdout, options.limit)?;

    debug!(
        files = status.files.len(),
        incomplete = status.incomplete,
        "parsed status"
    );
    Ok(status)
}
