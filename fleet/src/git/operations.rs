//! Local git state reads
//!
//! Reads the working copy through git2-rs. Nothing here touches the network.

use git2::{Repository, StatusOptions};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during git operations
#[derive(Error, Debug)]
pub enum GitOperationError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Invalid UTF-8 in git data: {0}")]
    InvalidUtf8(String),
}

pub type GitOperationResult<T> = Result<T, GitOperationError>;

/// Whether the working copy differs from the last commit, counting
/// untracked files but not ignored ones.
pub fn has_pending_changes(path: impl AsRef<Path>) -> GitOperationResult<bool> {
    let repo = Repository::open(path.as_ref())?;

    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let statuses = repo.statuses(Some(&mut options))?;
    Ok(!statuses.is_empty())
}

/// Paths with pending changes, for diagnostics.
pub fn read_pending_paths(path: impl AsRef<Path>) -> GitOperationResult<Vec<String>> {
    let repo = Repository::open(path.as_ref())?;

    let mut options = StatusOptions::new();
    options.include_untracked(true).recurse_untracked_dirs(true);

    let statuses = repo.statuses(Some(&mut options))?;
    statuses
        .iter()
        .map(|entry| {
            entry
                .path()
                .map(str::to_string)
                .ok_or_else(|| GitOperationError::InvalidUtf8("file path".to_string()))
        })
        .collect()
}

/// Read the checked-out branch name
pub fn read_current_branch(path: impl AsRef<Path>) -> GitOperationResult<String> {
    let repo = Repository::open(path.as_ref())?;
    let head = repo.head()?;

    if !head.is_branch() {
        return Err(GitOperationError::BranchNotFound(
            "detached HEAD".to_string(),
        ));
    }

    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| GitOperationError::InvalidUtf8("branch name".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{RepositoryInitOptions, Signature};
    use std::fs;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) -> Repository {
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        Repository::init_opts(dir, &options).unwrap()
    }

    fn commit_all(repo: &Repository, message: &str) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = Signature::now("Fleet Test", "fleet@example.com").unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )
        .unwrap();
    }

    #[test]
    fn test_pending_changes_lifecycle() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());

        assert!(!has_pending_changes(dir.path()).unwrap());

        fs::write(dir.path().join("requirements.txt"), "pylint==3.2.7\n").unwrap();
        assert!(has_pending_changes(dir.path()).unwrap());
        assert_eq!(
            read_pending_paths(dir.path()).unwrap(),
            vec!["requirements.txt".to_string()]
        );

        commit_all(&repo, "initial");
        assert!(!has_pending_changes(dir.path()).unwrap());

        fs::write(dir.path().join("requirements.txt"), "pylint==3.2.6\n").unwrap();
        assert!(has_pending_changes(dir.path()).unwrap());
    }

    #[test]
    fn test_ignored_files_are_not_pending() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        fs::write(dir.path().join(".gitignore"), "__pycache__/\n").unwrap();
        commit_all(&repo, "ignore caches");

        fs::create_dir(dir.path().join("__pycache__")).unwrap();
        fs::write(dir.path().join("__pycache__/main.pyc"), [0u8, 1, 2]).unwrap();
        assert!(!has_pending_changes(dir.path()).unwrap());
    }

    #[test]
    fn test_read_current_branch() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
        commit_all(&repo, "initial");

        assert_eq!(read_current_branch(dir.path()).unwrap(), "main");
    }

    #[test]
    fn test_invalid_repository_path() {
        let result = has_pending_changes("/nonexistent/invalid/path");
        assert!(matches!(result, Err(GitOperationError::Git(_))));
    }
}
