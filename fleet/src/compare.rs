//! Template vs. deployed repository comparison
//!
//! Classroom copies are named after the template they were generated from,
//! e.g. `m323-ix22-m323-lu01-a05-sum-m323-lu01-a05-sum` in organization
//! `m323-ix22` for the template `templates-python/m323-lu01-a05-sum`. The
//! runner diffs each branch of the pair and, unless asked only to report,
//! overlays the template onto the deployed copy and pushes.

use crate::driver::{
    commit_and_push, remove_working_copy, render_commit_message, working_copy_path, BranchOutcome,
};
use crate::git::VersionControl;
use crate::steps::sync::sync_tree;
use hosting::RepositoryRef;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_TARGET_PATTERN: &str = "{org}-{repo}-{repo}";

/// `{repo}` is the template repository the update came from.
pub const DEFAULT_UPDATE_MESSAGE: &str = "Update from {repo} on branch {branch}";

const IGNORED: &[&str] = &[".git"];

/// Name of the deployed copy: `{org}` is the target organization and
/// `{repo}` the template repository name.
pub fn target_name(pattern: &str, target_org: &str, repo: &str) -> String {
    pattern.replace("{org}", target_org).replace("{repo}", repo)
}

/// Relative paths (with `/` separators) that differ between two trees.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TreeDiff {
    pub only_in_source: Vec<String>,
    pub only_in_target: Vec<String>,
    pub modified: Vec<String>,
}

impl TreeDiff {
    pub fn is_identical(&self) -> bool {
        self.only_in_source.is_empty() && self.only_in_target.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.only_in_source.len() + self.only_in_target.len() + self.modified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_identical()
    }
}

fn collect_files(root: &Path, ignore: &[&str]) -> std::io::Result<BTreeMap<String, PathBuf>> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() != 1
                || !ignore
                    .iter()
                    .any(|name| entry.file_name().to_string_lossy() == *name)
        });

    let mut files = BTreeMap::new();
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, entry.path().to_path_buf());
        }
    }
    Ok(files)
}

fn same_content(a: &Path, b: &Path) -> std::io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

/// Compare two directory trees file by file, skipping top-level entries
/// named in `ignore`. Empty directories are not considered.
pub fn diff_trees(source: &Path, target: &Path, ignore: &[&str]) -> std::io::Result<TreeDiff> {
    let source_files = collect_files(source, ignore)?;
    let mut target_files = collect_files(target, ignore)?;

    let mut diff = TreeDiff::default();
    for (relative, source_path) in source_files {
        match target_files.remove(&relative) {
            Some(target_path) => {
                if !same_content(&source_path, &target_path)? {
                    diff.modified.push(relative);
                }
            }
            None => diff.only_in_source.push(relative),
        }
    }
    diff.only_in_target = target_files.into_keys().collect();

    Ok(diff)
}

#[derive(Debug, Clone)]
pub struct CompareConfig {
    pub source_org: String,
    pub target_org: String,
    pub pattern: String,
    pub branches: Vec<String>,
    pub workdir: PathBuf,
    pub report_only: bool,
    pub commit_message: String,
}

impl CompareConfig {
    pub fn new(source_org: impl Into<String>, target_org: impl Into<String>) -> Self {
        Self {
            source_org: source_org.into(),
            target_org: target_org.into(),
            pattern: DEFAULT_TARGET_PATTERN.to_string(),
            branches: vec!["main".to_string(), "solution".to_string()],
            workdir: PathBuf::from(crate::driver::DEFAULT_WORKDIR),
            report_only: false,
            commit_message: DEFAULT_UPDATE_MESSAGE.to_string(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_branches(mut self, branches: impl IntoIterator<Item = String>) -> Self {
        self.branches = branches.into_iter().collect();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_report_only(mut self, report_only: bool) -> Self {
        self.report_only = report_only;
        self
    }

    pub fn with_commit_message(mut self, commit_message: impl Into<String>) -> Self {
        self.commit_message = commit_message.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.commit_message.trim().is_empty() {
            return Err("Commit message cannot be empty".to_string());
        }
        if self.source_org.trim().is_empty() || self.target_org.trim().is_empty() {
            return Err("Source and target organizations are required".to_string());
        }
        if !self.pattern.contains("{repo}") {
            return Err("Target pattern must contain {repo}".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Identical,
    /// Differences found and left alone.
    Differs { diff: TreeDiff },
    Updated { diff: TreeDiff, result: BranchOutcome },
    CheckoutFailed { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchComparison {
    pub branch: String,
    pub outcome: ComparisonOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    pub source: RepositoryRef,
    pub target: RepositoryRef,
    /// Set when either clone failed; no branches were compared.
    pub error: Option<String>,
    pub branches: Vec<BranchComparison>,
}

pub struct TemplateComparison {
    vcs: Box<dyn VersionControl>,
    config: CompareConfig,
}

impl TemplateComparison {
    pub fn new(vcs: Box<dyn VersionControl>, config: CompareConfig) -> Self {
        Self { vcs, config }
    }

    pub async fn run(&self, names: &[String]) -> Vec<ComparisonReport> {
        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            reports.push(self.compare_repository(name).await);
        }
        reports
    }

    async fn compare_repository(&self, name: &str) -> ComparisonReport {
        let source = RepositoryRef::new(self.config.source_org.clone(), name);
        let target = RepositoryRef::new(
            self.config.target_org.clone(),
            target_name(&self.config.pattern, &self.config.target_org, name),
        );
        let mut report = ComparisonReport {
            source: source.clone(),
            target: target.clone(),
            error: None,
            branches: Vec::new(),
        };

        let dirs = working_copy_path(&self.config.workdir.join("source"), &source.name).and_then(
            |source_dir| {
                working_copy_path(&self.config.workdir.join("target"), &target.name)
                    .map(|target_dir| (source_dir, target_dir))
            },
        );
        let (source_dir, target_dir) = match dirs {
            Ok(dirs) => dirs,
            Err(e) => {
                error!(source = %source, target = %target, error = %e, "skipping comparison");
                report.error = Some(e.to_string());
                return report;
            }
        };

        for (repo, dir) in [(&source, &source_dir), (&target, &target_dir)] {
            if let Err(e) = remove_working_copy(dir) {
                warn!(repo = %repo, error = %e, "could not remove stale working copy");
            }
            info!(repo = %repo, "cloning");
            if let Err(e) = self.vcs.clone_repo(repo, dir).await {
                error!(repo = %repo, error = %e, "clone failed, skipping comparison");
                report.error = Some(format!("clone of {} failed: {}", repo, e));
                break;
            }
        }

        if report.error.is_none() {
            for branch in &self.config.branches {
                let outcome = self
                    .compare_branch(&source, &source_dir, &target, &target_dir, branch)
                    .await;
                report.branches.push(BranchComparison {
                    branch: branch.clone(),
                    outcome,
                });
            }
        }

        for dir in [&source_dir, &target_dir] {
            if let Err(e) = remove_working_copy(dir) {
                warn!(workdir = %dir.display(), error = %e, "could not remove working copy");
            }
        }
        report
    }

    async fn compare_branch(
        &self,
        source: &RepositoryRef,
        source_dir: &Path,
        target: &RepositoryRef,
        target_dir: &Path,
        branch: &str,
    ) -> ComparisonOutcome {
        for (repo, dir) in [(source, source_dir), (target, target_dir)] {
            if let Err(e) = self.vcs.checkout(dir, branch).await {
                warn!(repo = %repo, branch = %branch, error = %e, "checkout failed");
                return ComparisonOutcome::CheckoutFailed {
                    reason: format!("{}: {}", repo, e),
                };
            }
        }

        let diff = match diff_trees(source_dir, target_dir, IGNORED) {
            Ok(diff) => diff,
            Err(e) => {
                return ComparisonOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if diff.is_identical() {
            info!(source = %source, target = %target, branch = %branch, "identical");
            return ComparisonOutcome::Identical;
        }

        info!(
            source = %source,
            target = %target,
            branch = %branch,
            only_in_source = ?diff.only_in_source,
            only_in_target = ?diff.only_in_target,
            modified = ?diff.modified,
            "repositories differ"
        );

        if self.config.report_only {
            return ComparisonOutcome::Differs { diff };
        }

        let ignored: Vec<String> = IGNORED.iter().map(|s| s.to_string()).collect();
        if let Err(e) = sync_tree(source_dir, target_dir, &ignored) {
            error!(target = %target, branch = %branch, error = %e, "update failed");
            self.discard(target, target_dir).await;
            return ComparisonOutcome::Failed {
                reason: e.to_string(),
            };
        }

        let message = render_commit_message(&self.config.commit_message, source, branch);
        match commit_and_push(self.vcs.as_ref(), target_dir, branch, &message).await {
            Ok(result) => ComparisonOutcome::Updated { diff, result },
            Err(e) => {
                error!(target = %target, branch = %branch, error = %e, "commit/push failed");
                self.discard(target, target_dir).await;
                ComparisonOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn discard(&self, repo: &RepositoryRef, dir: &Path) {
        if let Err(e) = self.vcs.discard_changes(dir).await {
            warn!(repo = %repo, error = %e, "could not discard changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_target_name() {
        assert_eq!(
            target_name(DEFAULT_TARGET_PATTERN, "m323-ix22", "m323-lu01-a05-sum"),
            "m323-ix22-m323-lu01-a05-sum-m323-lu01-a05-sum"
        );
        assert_eq!(target_name("{repo}", "x", "plain"), "plain");
    }

    #[test]
    fn test_identical_trees() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        for root in [a.path(), b.path()] {
            write(root, "main.py", "print(1)\n");
            write(root, "docs/readme.md", "# doc\n");
        }
        write(a.path(), ".git/HEAD", "ref: refs/heads/main\n");
        write(b.path(), ".git/HEAD", "ref: refs/heads/solution\n");

        let diff = diff_trees(a.path(), b.path(), IGNORED).unwrap();
        assert!(diff.is_identical());
        assert_eq!(diff.len(), 0);
    }

    #[test]
    fn test_differences_are_classified() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "main.py", "print(1)\n");
        write(b.path(), "main.py", "print(2)\n");
        write(a.path(), "docs/new.md", "new\n");
        write(b.path(), "student.txt", "mine\n");
        write(a.path(), "same.txt", "same\n");
        write(b.path(), "same.txt", "same\n");

        let diff = diff_trees(a.path(), b.path(), IGNORED).unwrap();
        assert_eq!(diff.modified, vec!["main.py"]);
        assert_eq!(diff.only_in_source, vec!["docs/new.md"]);
        assert_eq!(diff.only_in_target, vec!["student.txt"]);
        assert_eq!(diff.len(), 3);
    }

    #[test]
    fn test_compare_config_validation() {
        assert!(CompareConfig::new("templates-python", "m323-ix22").validate().is_ok());
        assert!(CompareConfig::new("", "m323-ix22").validate().is_err());
        assert!(CompareConfig::new("a", "b").with_pattern("{org}").validate().is_err());
        assert!(CompareConfig::new("a", "b").with_commit_message(" ").validate().is_err());
    }
}
