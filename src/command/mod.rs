//! Git operations built on [`exec::git`](crate::exec::git).
//!
//! Each function runs one or a few git processes against a repository path
//! and feeds their output through the pure parsers and formatters.

mod apply;
mod clone;
mod diff;
mod status;

pub use apply::apply_patch_to_index;
pub use clone::{CloneOptions, CloneProgress, clone};
pub use diff::get_working_directory_diff;
pub use status::{StatusOptions, get_status};
