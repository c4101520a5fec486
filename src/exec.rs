//! Running the `git` binary.

use crate::GitCommandError;
use crate::progress::{GitProgressParser, ProgressEvent};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Where parsed progress lines from stderr are sent
#[derive(Debug, Clone)]
pub struct ProgressSink {
    pub parser: GitProgressParser,
    pub sender: mpsc::Sender<ProgressEvent>,
}

impl ProgressSink {
    pub fn new(parser: GitProgressParser, sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self { parser, sender }
    }

    async fn emit(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let event = self.parser.parse(line);
        if self.sender.send(event).await.is_err() {
            trace!("progress receiver dropped");
        }
    }
}

/// Per-invocation settings for [`git`].
///
/// Every field is optional. Combine a base set with caller overrides using
/// [`ExecutionOptions::merge`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Run somewhere other than the repository path
    pub working_directory: Option<PathBuf>,
    /// Text piped to the process on stdin
    pub stdin: Option<String>,
    /// Extra environment variables, later entries win
    pub env: Vec<(String, String)>,
    pub progress: Option<ProgressSink>,
    /// Exit codes treated as success, `[0]` when unset
    pub success_exit_codes: Option<Vec<i32>>,
}

impl ExecutionOptions {
    /// Field-by-field merge where `overrides` wins when set.
    ///
    /// Environment overrides are concatenated so both sets apply.
    #[must_use]
    pub fn merge(self, overrides: ExecutionOptions) -> Self {
        let mut env = self.env;
        env.extend(overrides.env);

        Self {
            working_directory: overrides.working_directory.or(self.working_directory),
            stdin: overrides.stdin.or(self.stdin),
            env,
            progress: overrides.progress.or(self.progress),
            success_exit_codes: overrides.success_exit_codes.or(self.success_exit_codes),
        }
    }

    #[must_use]
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn with_success_exit_codes(mut self, codes: impl Into<Vec<i32>>) -> Self {
        self.success_exit_codes = Some(codes.into());
        self
    }
}

/// Captured result of a git invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `git <args>` in `working_directory` and capture its output.
///
/// `label` names the operation in logs and errors. Stdin, stdout and stderr
/// are driven concurrently so a large patch cannot deadlock against a full
/// output pipe. Stderr is split on `\r` and `\n` and fed to the progress sink
/// as it arrives.
///
/// # Errors
///
/// - [`GitCommandError::InputNotFound`] if the directory does not exist or git
///   reports it is not inside a repository.
/// - [`GitCommandError::ProcessFailure`] for any other exit code outside
///   `success_exit_codes`.
/// - Spawn, pipe and UTF-8 failures as their own variants.
pub async fn git<I, S>(
    args: I,
    working_directory: &Path,
    label: &str,
    options: ExecutionOptions,
) -> Result<GitOutput, GitCommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|arg| arg.as_ref().to_owned()).collect();
    let ExecutionOptions {
        working_directory: directory_override,
        stdin,
        env,
        progress,
        success_exit_codes,
    } = options;
    let directory = directory_override.as_deref().unwrap_or(working_directory);

    debug!(label, ?args, directory = %directory.display(), "running git");

    let mut command = Command::new("git");
    command
        .args(&args)
        .current_dir(directory)
        .envs(env.iter().map(|(key, value)| (key, value)))
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let is_dir = tokio::fs::metadata(directory)
                .await
                .is_ok_and(|meta| meta.is_dir());
            return Err(if is_dir {
                GitCommandError::SpawnFailed {
                    label: label.to_string(),
                    message: e.to_string(),
                }
            } else {
                GitCommandError::InputNotFound {
                    path: directory.display().to_string(),
                }
            });
        }
    };

    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();

    let write_stdin = async move {
        match (child_stdin, stdin) {
            (Some(mut pipe), Some(payload)) => {
                pipe.write_all(payload.as_bytes()).await?;
                pipe.shutdown().await
            }
            _ => Ok(()),
        }
    };
    let read_stdout = async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = child_stdout {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let (stdin_result, stdout_result, stderr_result) = tokio::join!(
        write_stdin,
        read_stdout,
        read_stderr(child_stderr, progress)
    );

    let status = child
        .wait()
        .await
        .map_err(|e| GitCommandError::OutputReadFailed {
            label: label.to_string(),
            message: e.to_string(),
        })?;
    let exit_code = status.code().unwrap_or(-1);
    trace!(label, exit_code, "git exited");

    let read_failed = |e: std::io::Error| GitCommandError::OutputReadFailed {
        label: label.to_string(),
        message: e.to_string(),
    };
    let stderr = String::from_utf8_lossy(&stderr_result.map_err(read_failed)?).into_owned();
    let stdout = stdout_result.map_err(read_failed)?;

    let success_exit_codes = success_exit_codes.unwrap_or_else(|| vec![0]);
    if !success_exit_codes.contains(&exit_code) {
        if stderr.contains("not a git repository") {
            return Err(GitCommandError::InputNotFound {
                path: directory.display().to_string(),
            });
        }
        return Err(GitCommandError::ProcessFailure {
            label: label.to_string(),
            exit_code,
            stderr: stderr.trim_end().to_string(),
        });
    }

    stdin_result.map_err(|e| GitCommandError::StdinWriteFailed {
        label: label.to_string(),
        message: e.to_string(),
    })?;

    let stdout = String::from_utf8(stdout).map_err(|e| GitCommandError::InvalidUtf8 {
        label: label.to_string(),
        message: e.to_string(),
    })?;

    Ok(GitOutput {
        exit_code,
        stdout,
        stderr,
    })
}

/// Collect stderr, forwarding each `\r` or `\n` terminated line to `progress`
async fn read_stderr<R>(pipe: Option<R>, mut progress: Option<ProgressSink>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(Vec::new());
    };

    let mut all = Vec::new();
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        all.extend_from_slice(&chunk[..n]);

        let Some(sink) = progress.as_mut() else {
            continue;
        };
        pending.extend_from_slice(&chunk[..n]);
        while let Some(end) = pending.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            sink.emit(&String::from_utf8_lossy(&line)).await;
        }
    }

    if let Some(sink) = progress.as_mut() {
        sink.emit(&String::from_utf8_lossy(&pending)).await;
    }

    Ok(all)
}
