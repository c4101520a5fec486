use crate::GitPartialError;
use crate::diff::{Diff, DiffError, DiffKind};
use crate::exec::{ExecutionOptions, git};
use crate::status::{FileChange, FileStatus};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, instrument};

/// Diff output above this size is not parsed
const MAX_DIFF_BYTES: usize = 3_000_000;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "bmp", "avif", "tif", "tiff",
];

/// Diff the working tree copy of `file` against the index.
///
/// Untracked files are compared against `/dev/null` so their content shows up
/// as one addition hunk. A new file that already has an index entry is diffed
/// against that entry. The diff is taken with zero context lines.
///
/// # Errors
///
/// Any git failure, or [`DiffError`] if the output cannot be parsed.
#[instrument(skip_all, fields(path = %file.path(), status = %file.status()))]
pub async fn get_working_directory_diff(
    repository: &Path,
    file: &FileChange,
) -> Result<Diff, GitPartialError> {
    let file = against_index(repository, file).await?;
    diff_file(repository, &file).await
}

/// View `file` relative to the index.
///
/// Status reports staged additions (`A`) as [`FileStatus::New`] just like
/// untracked files, but once the path is in the index later patches must
/// modify that entry instead of creating it.
pub(super) async fn against_index<'a>(
    repository: &Path,
    file: &'a FileChange,
) -> Result<Cow<'a, FileChange>, GitPartialError> {
    if file.status() != FileStatus::New {
        return Ok(Cow::Borrowed(file));
    }

    let pathspec = format!(":(literal){}", file.path());
    let output = git(
        ["ls-files", "--cached", "-z", "--", pathspec.as_str()],
        repository,
        "getWorkingDirectoryDiff",
        ExecutionOptions::default(),
    )
    .await?;

    if output.stdout.is_empty() {
        return Ok(Cow::Borrowed(file));
    }

    debug!("new file already staged, diffing against the index");
    Ok(Cow::Owned(
        FileChange::new(file.path(), FileStatus::Modified).with_selection(file.selection().clone()),
    ))
}

/// Run the diff for a file already resolved by [`against_index`]
pub(super) async fn diff_file(repository: &Path, file: &FileChange) -> Result<Diff, GitPartialError> {
    let mut args = vec!["diff", "--no-ext-diff", "--no-color", "--unified=0"];
    let mut options = ExecutionOptions::default();

    if file.status() == FileStatus::New {
        args.extend(["--no-index", "--", "/dev/null", file.path()]);
        // --no-index exits with 1 when the files differ
        options = options.with_success_exit_codes([0, 1]);
    } else {
        args.extend(["--", file.path()]);
    }

    let output = git(&args, repository, "getWorkingDirectoryDiff", options).await?;
    let diff = classify(file, &output.stdout)?;

    debug!(kind = %diff.kind, hunks = diff.hunks.len(), "read working directory diff");
    Ok(diff)
}

fn classify(file: &FileChange, raw: &str) -> Result<Diff, DiffError> {
    if raw.len() > MAX_DIFF_BYTES {
        return Ok(Diff::opaque(DiffKind::LargeText));
    }

    let diff = Diff::parse(raw)?;
    if diff.kind == DiffKind::Binary {
        let kind = if is_image(file.path()) {
            DiffKind::Image
        } else {
            DiffKind::Binary
        };
        return Ok(Diff::opaque(kind));
    }

    if file.status() == FileStatus::Deleted && diff.hunks.is_empty() {
        return Ok(Diff::opaque(DiffKind::Deleted));
    }

    Ok(diff)
}

fn is_image(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|image| image.eq_ignore_ascii_case(ext))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BINARY: &str = "diff --git a/f b/f\nindex 1..2 100644\nBinary files a/f and b/f differ\n";

    #[test]
    fn binary_images_are_detected_by_extension() {
        let logo = FileChange::new("assets/Logo.PNG", FileStatus::Modified);
        assert_eq!(classify(&logo, BINARY).unwrap().kind, DiffKind::Image);

        let blob = FileChange::new("data.bin", FileStatus::Modified);
        assert_eq!(classify(&blob, BINARY).unwrap().kind, DiffKind::Binary);
    }

    #[test]
    fn oversized_output_is_large_text() {
        let file = FileChange::new("big.txt", FileStatus::Modified);
        let raw = format!("@@ -1 +1 @@\n-a\n+{}\n", "x".repeat(MAX_DIFF_BYTES));
        assert_eq!(classify(&file, &raw).unwrap(), Diff::opaque(DiffKind::LargeText));
    }

    #[test]
    fn deleted_without_hunks() {
        let file = FileChange::new("gone.txt", FileStatus::Deleted);
        assert_eq!(classify(&file, "").unwrap().kind, DiffKind::Deleted);

        let with_lines = classify(&file, "@@ -1 +0,0 @@\n-a\n").unwrap();
        assert_eq!(with_lines.kind, DiffKind::Text);
    }

    #[test]
    fn text_passes_through() {
        let file = FileChange::new("a.txt", FileStatus::Modified);
        let diff = classify(&file, "@@ -1 +1 @@\n-a\n+b\n").unwrap();
        assert_eq!(diff.kind, DiffKind::Text);
        assert_eq!(diff.hunks.len(), 1);
    }
}
