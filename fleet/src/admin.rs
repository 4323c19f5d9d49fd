//! Batch repository administration on the hosting service.

use crate::driver::{remove_working_copy, working_copy_path};
use crate::git::{GitOperationError, VersionControl};
use hosting::{HostingError, HostingProvider, HostingResult, RepositoryRef, Visibility};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingAction {
    Transfer { new_owner: String },
    Delete,
    MakeTemplate,
}

impl HostingAction {
    pub fn describe(&self) -> String {
        match self {
            HostingAction::Transfer { new_owner } => format!("transfer to {}", new_owner),
            HostingAction::Delete => "delete".to_string(),
            HostingAction::MakeTemplate => "mark as template".to_string(),
        }
    }

    pub async fn apply(
        &self,
        provider: &dyn HostingProvider,
        repo: &RepositoryRef,
    ) -> HostingResult<()> {
        match self {
            HostingAction::Transfer { new_owner } => provider.transfer(repo, new_owner).await,
            HostingAction::Delete => provider.delete(repo).await,
            HostingAction::MakeTemplate => provider.set_template(repo).await,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub succeeded: Vec<RepositoryRef>,
    pub failed: Vec<(RepositoryRef, String)>,
}

impl ActionReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply `action` to every repository, logging and recording failures
/// instead of stopping.
pub async fn apply_to_all(
    provider: &dyn HostingProvider,
    action: &HostingAction,
    repositories: &[RepositoryRef],
) -> ActionReport {
    let mut report = ActionReport::default();
    for repo in repositories {
        match action.apply(provider, repo).await {
            Ok(()) => {
                info!(repo = %repo, action = %action.describe(), provider = provider.provider_name(), "done");
                report.succeeded.push(repo.clone());
            }
            Err(e) => {
                error!(repo = %repo, action = %action.describe(), error = %e, "failed");
                report.failed.push((repo.clone(), e.to_string()));
            }
        }
    }
    report
}

/// Names of the organization's repositories containing `keyword`.
pub async fn list_matching(
    provider: &dyn HostingProvider,
    organization: &str,
    keyword: Option<&str>,
) -> HostingResult<Vec<String>> {
    let repos = provider.list_repositories(organization, keyword).await?;
    Ok(repos.into_iter().map(|r| r.name).collect())
}

/// One `"name",` line per repository, ready to paste into a manifest list.
pub fn format_name_list(names: &[String]) -> String {
    names.iter().map(|name| format!("\"{}\",\n", name)).collect()
}

#[derive(Error, Debug)]
pub enum RecreateError {
    #[error("Git error: {0}")]
    Git(#[from] GitOperationError),

    #[error("Hosting error: {0}")]
    Hosting(#[from] HostingError),

    #[error("No branches to carry over; refusing to delete the repository")]
    NoBranches,

    #[error("Invalid working copy: {0}")]
    WorkingCopy(#[from] std::io::Error),
}

/// Snapshot a repository's branches locally, delete it on the hosting
/// service, create it again as public and push the branches back.
///
/// If anything fails after the remote delete, the local clone is kept so
/// the branches can be pushed by hand.
pub struct Recreate<'a> {
    vcs: &'a dyn VersionControl,
    provider: &'a dyn HostingProvider,
    workdir: PathBuf,
    branches: Vec<String>,
}

impl<'a> Recreate<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        provider: &'a dyn HostingProvider,
        workdir: impl Into<PathBuf>,
        branches: Vec<String>,
    ) -> Self {
        Self {
            vcs,
            provider,
            workdir: workdir.into(),
            branches,
        }
    }

    pub async fn run(&self, repositories: &[RepositoryRef]) -> ActionReport {
        let mut report = ActionReport::default();
        for repo in repositories {
            match self.recreate(repo).await {
                Ok(()) => report.succeeded.push(repo.clone()),
                Err(e) => {
                    error!(repo = %repo, error = %e, "recreate failed");
                    report.failed.push((repo.clone(), e.to_string()));
                }
            }
        }
        report
    }

    pub async fn recreate(&self, repo: &RepositoryRef) -> Result<(), RecreateError> {
        if self.branches.is_empty() {
            return Err(RecreateError::NoBranches);
        }
        let dir = working_copy_path(&self.workdir, &repo.name)?;
        if let Err(e) = remove_working_copy(&dir) {
            warn!(repo = %repo, error = %e, "could not remove stale working copy");
        }

        if let Err(e) = self.snapshot(repo, &dir).await {
            discard(repo, &dir);
            return Err(e);
        }

        self.provider.delete(repo).await.inspect_err(|_| discard(repo, &dir))?;
        info!(repo = %repo, "deleted remote repository");

        // From here on the local clone is the only copy.
        if let Err(e) = self.restore(repo, &dir).await {
            warn!(repo = %repo, workdir = %dir.display(), "keeping local clone after failed restore");
            return Err(e);
        }

        discard(repo, &dir);
        info!(repo = %repo, branches = ?self.branches, "repository recreated");
        Ok(())
    }

    async fn snapshot(&self, repo: &RepositoryRef, dir: &Path) -> Result<(), RecreateError> {
        self.vcs.clone_repo(repo, dir).await?;
        for branch in &self.branches {
            self.vcs.checkout(dir, branch).await?;
            self.vcs.pull(dir, branch).await?;
        }
        Ok(())
    }

    async fn restore(&self, repo: &RepositoryRef, dir: &Path) -> Result<(), RecreateError> {
        self.provider.create(repo, Visibility::Public).await?;
        info!(repo = %repo, "created remote repository");
        for branch in &self.branches {
            self.vcs.checkout(dir, branch).await?;
            self.vcs.push(dir, branch, true).await?;
        }
        Ok(())
    }
}

fn discard(repo: &RepositoryRef, dir: &Path) {
    if let Err(e) = remove_working_copy(dir) {
        warn!(repo = %repo, workdir = %dir.display(), error = %e, "could not remove working copy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_name_list() {
        let names = vec![
            "m323-lu01-a05-sum".to_string(),
            "m323-lu06-a08-hashing".to_string(),
        ];
        assert_eq!(
            format_name_list(&names),
            "\"m323-lu01-a05-sum\",\n\"m323-lu06-a08-hashing\",\n"
        );
        assert_eq!(format_name_list(&[]), "");
    }

    #[test]
    fn test_describe() {
        let transfer = HostingAction::Transfer {
            new_owner: "m323-archive".to_string(),
        };
        assert_eq!(transfer.describe(), "transfer to m323-archive");
        assert_eq!(HostingAction::Delete.describe(), "delete");
    }
}
