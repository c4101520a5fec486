use super::diff::{against_index, diff_file};
use crate::GitPartialError;
use crate::exec::{ExecutionOptions, git};
use crate::patch::format_patch;
use crate::status::{FileChange, FileStatus};
use nom::{
    IResult, Parser,
    bytes::complete::{take_till1, take_while1},
    character::complete::char,
};
use std::path::Path;
use tracing::{debug, instrument};

const LABEL: &str = "applyPatchToIndex";

/// Stage the selected lines of `file` into the index.
///
/// Renamed and copied files first get the `HEAD` blob of their source path
/// staged under the new path, so the patch applies on top of the original
/// content. Caller `options` are merged in, but the patch is always what is
/// piped to `git apply`.
///
/// # Errors
///
/// - [`PatchError::UnsupportedDiffKind`](crate::PatchError::UnsupportedDiffKind)
///   for anything but a text diff.
/// - [`PatchError::NothingSelected`](crate::PatchError::NothingSelected) when
///   the selection covers no change line.
/// - Any git failure, including `git apply` rejecting the patch.
#[instrument(skip_all, fields(path = %file.path(), status = %file.status()))]
pub async fn apply_patch_to_index(
    repository: &Path,
    file: &FileChange,
    options: ExecutionOptions,
) -> Result<(), GitPartialError> {
    if let Some(old_path) = file.old_path() {
        stage_source_blob(repository, file, old_path, options.clone()).await?;
    }

    let file = against_index(repository, file).await?;
    let diff = diff_file(repository, &file)
        .await?
        .with_selection(file.selection());
    let patch = format_patch(&file, &diff)?;
    debug!(bytes = patch.len(), "applying patch");

    git(
        ["apply", "--cached", "--unidiff-zero", "--whitespace=nowarn", "-"],
        repository,
        LABEL,
        options.merge(ExecutionOptions::default().with_stdin(patch)),
    )
    .await?;

    Ok(())
}

/// Equivalent of `git mv` done by hand: stage the source path's removal
/// (renames only) and its `HEAD` blob under the destination path.
async fn stage_source_blob(
    repository: &Path,
    file: &FileChange,
    old_path: &str,
    options: ExecutionOptions,
) -> Result<(), GitPartialError> {
    if file.status() == FileStatus::Renamed {
        // `add --update` rather than `update-index --force-remove` so a
        // recreated source file is staged as it is on disk
        git(
            ["add", "--update", "--", old_path],
            repository,
            LABEL,
            ExecutionOptions::default(),
        )
        .await?;
    }

    let output = git(
        ["ls-tree", "HEAD", "--", old_path],
        repository,
        LABEL,
        ExecutionOptions::default(),
    )
    .await?;

    let Ok((_, (mode, oid))) = tree_entry(&output.stdout) else {
        return Err(GitPartialError::UnexpectedTreeEntry {
            path: old_path.to_string(),
            output: output.stdout.clone(),
        });
    };
    debug!(old_path, mode, oid, "staging source blob under new path");

    git(
        ["update-index", "--add", "--cacheinfo", mode, oid, file.path()],
        repository,
        LABEL,
        options,
    )
    .await?;

    Ok(())
}

/// `<mode> SP <type> SP <object> TAB <file>`, keeping mode and object
fn tree_entry(input: &str) -> IResult<&str, (&str, &str)> {
    let field = || take_till1(|c: char| c == ' ' || c == '\t');
    (
        take_while1(|c: char| c.is_ascii_digit()),
        char(' '),
        field(),
        char(' '),
        field(),
        char('\t'),
    )
        .map(|(mode, _, _, _, oid, _)| (mode, oid))
        .parse(input)
}
