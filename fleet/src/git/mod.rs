//! Version control for batch runs
//!
//! The driver only talks to [`VersionControl`]; [`GitCli`] is the real
//! implementation and tests substitute an in-memory one.
//!
//! ```no_run
//! use fleet::git::{GitCli, VersionControl};
//! use hosting::RepositoryRef;
//! use std::path::Path;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let git = GitCli::new("https://github.com", None);
//! let repo = RepositoryRef::new("templates-python", "m323-lu01-a05-sum");
//! let dest = Path::new("work/m323-lu01-a05-sum");
//!
//! git.clone_repo(&repo, dest).await?;
//! git.checkout(dest, "solution").await?;
//! if git.has_pending_changes(dest).await? {
//!     git.commit_all(dest, "Update files").await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Every operation takes the working copy path explicitly; the process
//! working directory is never changed.

pub mod cli;
pub mod operations;

pub use cli::GitCli;
pub use operations::*;

use async_trait::async_trait;
use hosting::RepositoryRef;
use std::path::Path;

#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn clone_repo(&self, repo: &RepositoryRef, dest: &Path) -> GitOperationResult<()>;

    /// Switch the working copy to `branch`, creating the local tracking
    /// branch if only the remote one exists.
    async fn checkout(&self, workdir: &Path, branch: &str) -> GitOperationResult<()>;

    async fn pull(&self, workdir: &Path, branch: &str) -> GitOperationResult<()>;

    async fn has_pending_changes(&self, workdir: &Path) -> GitOperationResult<bool>;

    /// Throw away uncommitted edits and untracked files so the next
    /// checkout starts from the branch's committed state.
    async fn discard_changes(&self, workdir: &Path) -> GitOperationResult<()>;

    /// Stage everything and commit.
    async fn commit_all(&self, workdir: &Path, message: &str) -> GitOperationResult<()>;

    async fn remote_branch_exists(&self, workdir: &Path, branch: &str) -> GitOperationResult<bool>;

    async fn push(&self, workdir: &Path, branch: &str, set_upstream: bool) -> GitOperationResult<()>;
}
