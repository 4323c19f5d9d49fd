//! Repository batch driver
//!
//! For every repository: clone into `<workdir>/<name>`, walk the configured
//! branches, apply the [`StepPipeline`] on each, commit and push when the
//! working copy changed, then delete the working copy. Failures are recorded
//! in the [`BatchReport`] and never stop the run.

use crate::git::{GitOperationResult, VersionControl};
use crate::steps::{PipelineReport, StepError, StepPipeline};
use chrono::{DateTime, Utc};
use hosting::RepositoryRef;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{error, info, warn};

pub const DEFAULT_COMMIT_MESSAGE: &str = "Apply fleet updates on {branch} branch";
pub const DEFAULT_WORKDIR: &str = ".fleet-work";

/// Fill `{branch}` and `{repo}` in a commit message template.
pub fn render_commit_message(template: &str, repo: &RepositoryRef, branch: &str) -> String {
    template
        .replace("{branch}", branch)
        .replace("{repo}", &repo.name)
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub workdir: PathBuf,
    pub branches: Vec<String>,
    pub commit_message: String,
    /// Apply steps and report pending changes without committing.
    pub dry_run: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            branches: vec!["main".to_string(), "solution".to_string()],
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            dry_run: false,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_branches(mut self, branches: impl IntoIterator<Item = String>) -> Self {
        self.branches = branches.into_iter().collect();
        self
    }

    pub fn with_commit_message(mut self, commit_message: impl Into<String>) -> Self {
        self.commit_message = commit_message.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.workdir.as_os_str().is_empty() {
            return Err("Working directory cannot be empty".to_string());
        }

        if self.branches.iter().any(|b| b.trim().is_empty()) {
            return Err("Branch names cannot be empty".to_string());
        }

        if self.commit_message.trim().is_empty() {
            return Err("Commit message cannot be empty".to_string());
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome {
    Committed { pushed: bool },
    Unchanged,
    /// Dry run found changes it did not commit.
    PendingChanges,
    CheckoutFailed { reason: String },
    /// Commit or push failed.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchReport {
    pub branch: String,
    pub outcome: BranchOutcome,
    pub steps: PipelineReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepositoryOutcome {
    Processed,
    /// The name cannot be used as a working copy directory.
    InvalidName { reason: String },
    CloneFailed { reason: String },
    /// Malformed data stopped the repository on `branch`.
    Halted { branch: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryReport {
    pub repository: RepositoryRef,
    pub outcome: RepositoryOutcome,
    pub branches: Vec<BranchReport>,
}

impl RepositoryReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RepositoryOutcome::Processed
            && self.branches.iter().all(|b| {
                !matches!(
                    b.outcome,
                    BranchOutcome::CheckoutFailed { .. } | BranchOutcome::Failed { .. }
                )
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub repositories: Vec<RepositoryReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.repositories.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.repositories.len() - self.succeeded()
    }

    fn branch_outcomes(&self) -> impl Iterator<Item = &BranchOutcome> {
        self.repositories
            .iter()
            .flat_map(|r| r.branches.iter().map(|b| &b.outcome))
    }

    pub fn commits(&self) -> usize {
        self.branch_outcomes()
            .filter(|o| matches!(o, BranchOutcome::Committed { .. }))
            .count()
    }

    pub fn pushes(&self) -> usize {
        self.branch_outcomes()
            .filter(|o| matches!(o, BranchOutcome::Committed { pushed: true }))
            .count()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

pub struct BatchDriver {
    vcs: Box<dyn VersionControl>,
    pipeline: StepPipeline,
    config: DriverConfig,
}

impl BatchDriver {
    pub fn new(vcs: Box<dyn VersionControl>, pipeline: StepPipeline, config: DriverConfig) -> Self {
        Self {
            vcs,
            pipeline,
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &StepPipeline {
        &self.pipeline
    }

    pub async fn run(&self, repositories: &[RepositoryRef]) -> BatchReport {
        let started_at = Utc::now();
        info!(
            repositories = repositories.len(),
            branches = ?self.config.branches,
            steps = ?self.pipeline.names(),
            dry_run = self.config.dry_run,
            "starting batch run"
        );

        if let Err(e) = fs::create_dir_all(&self.config.workdir) {
            error!(workdir = %self.config.workdir.display(), error = %e, "cannot create working directory");
        }

        let mut reports = Vec::with_capacity(repositories.len());
        for repo in repositories {
            reports.push(self.process_repository(repo).await);
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.config.dry_run,
            repositories: reports,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            commits = report.commits(),
            pushes = report.pushes(),
            "batch run finished"
        );
        report
    }

    async fn process_repository(&self, repo: &RepositoryRef) -> RepositoryReport {
        let workdir = match working_copy_path(&self.config.workdir, &repo.name) {
            Ok(path) => path,
            Err(e) => {
                error!(repo = %repo, error = %e, "skipping repository");
                return RepositoryReport {
                    repository: repo.clone(),
                    outcome: RepositoryOutcome::InvalidName {
                        reason: e.to_string(),
                    },
                    branches: Vec::new(),
                };
            }
        };
        if let Err(e) = remove_working_copy(&workdir) {
            warn!(repo = %repo, error = %e, "could not remove stale working copy");
        }

        info!(repo = %repo, "cloning");
        if let Err(e) = self.vcs.clone_repo(repo, &workdir).await {
            error!(repo = %repo, error = %e, "clone failed, skipping repository");
            cleanup(repo, &workdir);
            return RepositoryReport {
                repository: repo.clone(),
                outcome: RepositoryOutcome::CloneFailed {
                    reason: e.to_string(),
                },
                branches: Vec::new(),
            };
        }

        let mut outcome = RepositoryOutcome::Processed;
        let mut branches = Vec::with_capacity(self.config.branches.len());
        for branch in &self.config.branches {
            match self.process_branch(repo, &workdir, branch).await {
                Ok(report) => branches.push(report),
                Err(e) => {
                    error!(repo = %repo, branch = %branch, error = %e, "halting repository");
                    outcome = RepositoryOutcome::Halted {
                        branch: branch.clone(),
                        reason: e.to_string(),
                    };
                    break;
                }
            }
        }

        cleanup(repo, &workdir);
        RepositoryReport {
            repository: repo.clone(),
            outcome,
            branches,
        }
    }

    /// `Err` only for failures that stop the whole repository.
    async fn process_branch(
        &self,
        repo: &RepositoryRef,
        workdir: &Path,
        branch: &str,
    ) -> Result<BranchReport, StepError> {
        if let Err(e) = self.vcs.checkout(workdir, branch).await {
            warn!(repo = %repo, branch = %branch, error = %e, "checkout failed, skipping branch");
            return Ok(BranchReport {
                branch: branch.to_string(),
                outcome: BranchOutcome::CheckoutFailed {
                    reason: e.to_string(),
                },
                steps: PipelineReport::default(),
            });
        }

        let steps = self.pipeline.run(workdir)?;

        let outcome = if self.config.dry_run {
            match self.vcs.has_pending_changes(workdir).await {
                Ok(true) => BranchOutcome::PendingChanges,
                Ok(false) => BranchOutcome::Unchanged,
                Err(e) => BranchOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        } else {
            let message = render_commit_message(&self.config.commit_message, repo, branch);
            match commit_and_push(self.vcs.as_ref(), workdir, branch, &message).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(repo = %repo, branch = %branch, error = %e, "commit/push failed");
                    BranchOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };

        if matches!(
            outcome,
            BranchOutcome::PendingChanges | BranchOutcome::Failed { .. }
        ) {
            // Leftovers would follow the checkout onto the next branch.
            if let Err(e) = self.vcs.discard_changes(workdir).await {
                warn!(repo = %repo, branch = %branch, error = %e, "could not discard changes");
            }
        }

        info!(repo = %repo, branch = %branch, outcome = ?outcome, "branch done");
        Ok(BranchReport {
            branch: branch.to_string(),
            outcome,
            steps,
        })
    }
}

/// Commit everything pending in `workdir` and push it to the remote branch
/// of the same name, if that branch exists on the remote.
pub async fn commit_and_push(
    vcs: &dyn VersionControl,
    workdir: &Path,
    branch: &str,
    message: &str,
) -> GitOperationResult<BranchOutcome> {
    if !vcs.has_pending_changes(workdir).await? {
        info!(branch = %branch, "no changes to commit");
        return Ok(BranchOutcome::Unchanged);
    }

    vcs.commit_all(workdir, message).await?;

    if !vcs.remote_branch_exists(workdir, branch).await? {
        warn!(branch = %branch, "branch does not exist on the remote, commit not pushed");
        return Ok(BranchOutcome::Committed { pushed: false });
    }

    vcs.push(workdir, branch, false).await?;
    info!(branch = %branch, "changes pushed");
    Ok(BranchOutcome::Committed { pushed: true })
}

/// True for a single ordinary path component: no separators, `.` or `..`.
pub fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// `<root>/<name>`, rejecting names that would point outside `root`.
pub fn working_copy_path(root: &Path, name: &str) -> io::Result<PathBuf> {
    if !is_plain_name(name) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' is not a plain directory name", name),
        ));
    }
    Ok(root.join(name))
}

/// Delete a working copy if it exists.
pub fn remove_working_copy(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

fn cleanup(repo: &RepositoryRef, workdir: &Path) {
    match remove_working_copy(workdir) {
        Ok(()) => info!(repo = %repo, "working copy removed"),
        Err(e) => warn!(repo = %repo, workdir = %workdir.display(), error = %e, "could not remove working copy"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_commit_message() {
        let repo = RepositoryRef::new("templates-python", "m323-lu01-a05-sum");
        assert_eq!(
            render_commit_message(DEFAULT_COMMIT_MESSAGE, &repo, "solution"),
            "Apply fleet updates on solution branch"
        );
        assert_eq!(
            render_commit_message("{repo}: sync {branch}", &repo, "main"),
            "m323-lu01-a05-sum: sync main"
        );
    }

    #[test]
    fn test_driver_config_validation() {
        assert!(DriverConfig::default().validate().is_ok());
        assert!(DriverConfig::new().with_workdir("").validate().is_err());
        assert!(DriverConfig::new()
            .with_branches(vec!["main".to_string(), " ".to_string()])
            .validate()
            .is_err());
        assert!(DriverConfig::new().with_commit_message("").validate().is_err());
        assert!(DriverConfig::new().with_branches(Vec::new()).validate().is_ok());
    }

    #[test]
    fn test_repository_report_success() {
        let repo = RepositoryRef::new("acme", "demo");
        let mut report = RepositoryReport {
            repository: repo,
            outcome: RepositoryOutcome::Processed,
            branches: vec![BranchReport {
                branch: "main".to_string(),
                outcome: BranchOutcome::Committed { pushed: false },
                steps: PipelineReport::default(),
            }],
        };
        assert!(report.is_success());

        report.branches[0].outcome = BranchOutcome::CheckoutFailed {
            reason: "missing".to_string(),
        };
        assert!(!report.is_success());
    }

    #[test]
    fn test_working_copy_path_rejects_escaping_names() {
        let root = Path::new("/srv/fleet/.fleet-work");
        assert_eq!(
            working_copy_path(root, "m323-lu01-a05-sum").unwrap(),
            root.join("m323-lu01-a05-sum")
        );
        for name in ["", ".", "..", "a/b", "./sum", "../sum", "/etc"] {
            assert!(working_copy_path(root, name).is_err(), "{:?}", name);
            assert!(!is_plain_name(name), "{:?}", name);
        }
        assert!(is_plain_name(".github-templates"));
    }

    #[test]
    fn test_remove_working_copy_is_noop_when_absent() {
        let dir = tempfile::TempDir::new().unwrap();
        let absent = dir.path().join("nothing-here");
        assert!(remove_working_copy(&absent).is_ok());

        let present = dir.path().join("repo");
        fs::create_dir_all(present.join("sub")).unwrap();
        remove_working_copy(&present).unwrap();
        assert!(!present.exists());
    }
}
