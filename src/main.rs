use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use git_partial::diff::format_numbered;
use git_partial::{
    CloneOptions, CloneProgress, ExecutionOptions, FileChange, FileStatus, GitPartialError,
    StatusOptions, WorkingDirectoryStatus, command, parse_file_refs,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "git-partial")]
#[command(about = "Working directory status and line-level staging for git")]
#[command(version)]
struct Cli {
    /// Run as if started in <REPO>
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    repo: PathBuf,

    /// Log git invocations to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List changed files in the working directory
    Status {
        /// Stop after this many entries
        #[arg(long)]
        limit: Option<usize>,
        /// Ignore the global excludes file
        #[arg(long)]
        limit_to_gitignore: bool,
    },
    /// Show working directory changes with line numbers for staging
    Diff {
        /// Files to show (all changed files if omitted)
        files: Vec<String>,
    },
    /// Stage specific lines by reference (e.g., file.nix:10..15,-20)
    Stage {
        /// File and line references (e.g., "flake.nix:137" or "flake.nix:10..15")
        #[arg(required = true)]
        file_refs: Vec<String>,
    },
    /// Clone a repository, reporting progress on stderr
    Clone {
        url: String,
        path: PathBuf,
        /// Branch to check out
        #[arg(short, long)]
        branch: Option<String>,
    },
    /// Generate shell completions
    Completions { shell: Shell },
    /// Generate a man page
    Man,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Status {
            limit,
            limit_to_gitignore,
        } => {
            let options = StatusOptions {
                limit_to_gitignore,
                limit,
            };
            let status = command::get_status(&cli.repo, &options).await?;
            print!("{}", format_status(&status));
        }
        Commands::Diff { files } => {
            let status = command::get_status(&cli.repo, &StatusOptions::default()).await?;
            for file in select_files(&status, &files)? {
                let diff = command::get_working_directory_diff(&cli.repo, file).await?;
                print!("{}", format_numbered(file.path(), &diff));
            }
        }
        Commands::Stage { file_refs } => {
            let status = command::get_status(&cli.repo, &StatusOptions::default()).await?;
            for input in &file_refs {
                let refs = parse_file_refs(input)?;
                let file = find_file(&status, &refs.file)?
                    .clone()
                    .with_selection(refs.selection());
                command::apply_patch_to_index(&cli.repo, &file, ExecutionOptions::default())
                    .await?;
                println!("Staged {input}");
            }
        }
        Commands::Clone { url, path, branch } => {
            clone_with_progress(&url, &path, CloneOptions { branch }).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "git-partial", &mut std::io::stdout());
        }
        Commands::Man => {
            clap_mangen::Man::new(Cli::command()).render(&mut std::io::stdout())?;
        }
    }

    Ok(())
}

fn format_status(status: &WorkingDirectoryStatus) -> String {
    let mut out = String::new();
    for file in &status.files {
        let code = match file.status() {
            FileStatus::New => 'A',
            FileStatus::Modified => 'M',
            FileStatus::Deleted => 'D',
            FileStatus::Renamed => 'R',
            FileStatus::Copied => 'C',
            FileStatus::Conflicted => 'U',
        };
        match file.old_path() {
            Some(old_path) => out.push_str(&format!("{code}\t{old_path} -> {}\n", file.path())),
            None => out.push_str(&format!("{code}\t{}\n", file.path())),
        }
    }
    if status.incomplete {
        out.push_str("(more entries not shown)\n");
    }
    out
}

fn find_file<'a>(status: &'a WorkingDirectoryStatus, path: &str) -> Result<&'a FileChange, GitPartialError> {
    status.find(path).ok_or_else(|| GitPartialError::NotInStatus {
        path: path.to_string(),
    })
}

fn select_files<'a>(
    status: &'a WorkingDirectoryStatus,
    files: &[String],
) -> Result<Vec<&'a FileChange>, GitPartialError> {
    if files.is_empty() {
        return Ok(status.files.iter().collect());
    }
    files.iter().map(|path| find_file(status, path)).collect()
}

async fn clone_with_progress(url: &str, path: &Path, options: CloneOptions) -> Result<(), GitPartialError> {
    let (sender, mut receiver) = mpsc::channel::<CloneProgress>(16);

    let report = async {
        let mut stderr = std::io::stderr();
        while let Some(progress) = receiver.recv().await {
            let percent = (progress.value * 100.0).round();
            let detail = progress.description.unwrap_or_default();
            let _ = write!(stderr, "\r\x1b[2K{percent:>3}% {} {detail}", progress.title);
            let _ = stderr.flush();
        }
        let _ = writeln!(stderr);
    };

    let (result, ()) = tokio::join!(
        command::clone(url, path, &options, ExecutionOptions::default(), Some(sender)),
        report
    );
    result
}
