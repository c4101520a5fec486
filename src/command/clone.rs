use crate::GitPartialError;
use crate::exec::{ExecutionOptions, ProgressSink, git};
use crate::progress::{GitProgressParser, ProgressEvent, ProgressKind};
use std::ffi::OsString;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{instrument, trace};

const PROGRESS_BUFFER: usize = 64;

/// Options for [`clone`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Branch to check out instead of the remote's default
    pub branch: Option<String>,
}

/// Progress of a running clone
#[derive(Debug, Clone, PartialEq)]
pub struct CloneProgress {
    pub title: String,
    /// The git output line behind this update
    pub description: Option<String>,
    /// Overall completion from 0.0 to 1.0
    pub value: f64,
}

/// Clone `url` into `path`, including submodules.
///
/// When `progress` is given, git is run with `--progress` and an initial
/// event with value `0.0` is sent before git starts. Events arrive in order
/// and their values never decrease.
///
/// # Errors
///
/// Any git failure, e.g. an unreachable remote or a non-empty `path`.
#[instrument(skip_all, fields(url = %url, path = %path.display()))]
pub async fn clone(
    url: &str,
    path: &Path,
    clone_options: &CloneOptions,
    options: ExecutionOptions,
    progress: Option<mpsc::Sender<CloneProgress>>,
) -> Result<(), GitPartialError> {
    let args = clone_args(url, path, clone_options, progress.is_some());
    let working_directory = Path::new(".");

    let Some(progress) = progress else {
        git(&args, working_directory, "clone", options).await?;
        return Ok(());
    };

    let title = format!("Cloning into {}", path.display());
    send(
        &progress,
        CloneProgress {
            title: title.clone(),
            description: None,
            value: 0.0,
        },
    )
    .await;

    let (sender, mut receiver) = mpsc::channel(PROGRESS_BUFFER);
    let sink = ProgressSink::new(GitProgressParser::new(ProgressKind::Clone), sender);
    let options = options.merge(ExecutionOptions::default().with_progress(sink));

    let forward = async {
        while let Some(event) = receiver.recv().await {
            let value = f64::from(event.percent()) / 100.0;
            let description = match event {
                ProgressEvent::Progress { details, .. } => details.text,
                ProgressEvent::Context { text, .. } => text,
            };
            send(
                &progress,
                CloneProgress {
                    title: title.clone(),
                    description: Some(description),
                    value,
                },
            )
            .await;
        }
    };

    let (result, ()) = tokio::join!(git(&args, working_directory, "clone", options), forward);
    result?;
    Ok(())
}

async fn send(progress: &mpsc::Sender<CloneProgress>, update: CloneProgress) {
    if progress.send(update).await.is_err() {
        trace!("clone progress receiver dropped");
    }
}

fn clone_args(url: &str, path: &Path, options: &CloneOptions, with_progress: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["clone".into(), "--recursive".into()];
    if with_progress {
        args.push("--progress".into());
    }
    if let Some(branch) = &options.branch {
        args.push("-b".into());
        args.push(branch.into());
    }
    args.push("--".into());
    args.push(url.into());
    args.push(path.as_os_str().to_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn args_without_progress() {
        let args = clone_args(
            "https://example.com/repo.git",
            Path::new("/tmp/repo"),
            &CloneOptions::default(),
            false,
        );
        assert_eq!(
            args,
            ["clone", "--recursive", "--", "https://example.com/repo.git", "/tmp/repo"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn args_with_branch_and_progress() {
        let options = CloneOptions {
            branch: Some("develop".to_string()),
        };
        let args = clone_args("../origin", Path::new("copy"), &options, true);
        assert_eq!(
            args,
            ["clone", "--recursive", "--progress", "-b", "develop", "--", "../origin", "copy"]
                .map(OsString::from)
                .to_vec()
        );
    }
}
