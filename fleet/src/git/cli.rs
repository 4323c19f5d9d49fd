//! Git command wrappers using [`tokio::process::Command`].
//!
//! Network operations (clone, pull, push, ls-remote) shell out to the system
//! `git` binary so the user's git configuration applies. The access token is
//! embedded in the clone URL and scrubbed from anything that gets logged.

use super::operations::{self, GitOperationError, GitOperationResult};
use super::VersionControl;
use async_trait::async_trait;
use hosting::{GitHubToken, RepositoryRef};
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, instrument};

pub struct GitCli {
    host: String,
    token: Option<GitHubToken>,
    env_vars: Vec<(String, String)>,
}

impl GitCli {
    /// `host` is the clone base, e.g. `https://github.com`. A plain
    /// filesystem path also works and is used as-is.
    pub fn new(host: impl Into<String>, token: Option<GitHubToken>) -> Self {
        let host: String = host.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
            token,
            env_vars: Vec::new(),
        }
    }

    /// Extra environment for every git invocation (e.g. committer identity).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn remote_url(&self, repo: &RepositoryRef) -> String {
        match (&self.token, self.host.strip_prefix("https://")) {
            (Some(token), Some(rest)) => format!(
                "https://x-access-token:{}@{}/{}.git",
                token.expose(),
                rest,
                repo.full_name()
            ),
            _ => format!("{}/{}.git", self.host, repo.full_name()),
        }
    }

    fn redact(&self, text: &str) -> String {
        match &self.token {
            Some(token) if !token.expose().is_empty() => text.replace(token.expose(), "***"),
            _ => text.to_string(),
        }
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> GitOperationResult<Output> {
        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args);

        cmd.env("GIT_TERMINAL_PROMPT", "0");
        for (k, v) in &self.env_vars {
            cmd.env(k, v);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let printable = self.redact(&args.join(" "));
        debug!(command = %printable, "spawning git");

        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitOperationError::CommandFailed {
                command: format!("git {}", printable),
                stderr: self.redact(stderr.trim()),
            });
        }

        Ok(output)
    }
}

/// True when `git ls-remote --heads` output names exactly `refs/heads/<branch>`.
pub fn ls_remote_lists_branch(stdout: &str, branch: &str) -> bool {
    let wanted = format!("refs/heads/{}", branch);
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|reference| reference == wanted)
}

#[async_trait]
impl VersionControl for GitCli {
    #[instrument(skip(self), fields(repo = %repo, dest = %dest.display()))]
    async fn clone_repo(&self, repo: &RepositoryRef, dest: &Path) -> GitOperationResult<()> {
        let url = self.remote_url(repo);
        let dest = dest.to_string_lossy();
        self.run(None, &["clone", "--no-tags", &url, &dest]).await?;
        debug!("clone succeeded");
        Ok(())
    }

    async fn checkout(&self, workdir: &Path, branch: &str) -> GitOperationResult<()> {
        match self.run(Some(workdir), &["checkout", branch]).await {
            Ok(_) => {}
            Err(GitOperationError::CommandFailed { stderr, .. })
                if stderr.contains("did not match any") =>
            {
                return Err(GitOperationError::BranchNotFound(branch.to_string()));
            }
            Err(e) => return Err(e),
        }

        // A tag or commit with the branch's name would leave HEAD detached.
        let current = operations::read_current_branch(workdir)?;
        if current != branch {
            return Err(GitOperationError::BranchNotFound(branch.to_string()));
        }
        Ok(())
    }

    async fn pull(&self, workdir: &Path, branch: &str) -> GitOperationResult<()> {
        self.run(Some(workdir), &["pull", "--ff-only", "origin", branch])
            .await?;
        Ok(())
    }

    async fn has_pending_changes(&self, workdir: &Path) -> GitOperationResult<bool> {
        operations::has_pending_changes(workdir)
    }

    async fn discard_changes(&self, workdir: &Path) -> GitOperationResult<()> {
        self.run(Some(workdir), &["reset", "--hard", "--quiet"]).await?;
        self.run(Some(workdir), &["clean", "-fd", "--quiet"]).await?;
        Ok(())
    }

    async fn commit_all(&self, workdir: &Path, message: &str) -> GitOperationResult<()> {
        if let Ok(paths) = operations::read_pending_paths(workdir) {
            debug!(?paths, "committing");
        }
        self.run(Some(workdir), &["add", "--all"]).await?;
        self.run(Some(workdir), &["commit", "--quiet", "-m", message])
            .await?;
        Ok(())
    }

    async fn remote_branch_exists(&self, workdir: &Path, branch: &str) -> GitOperationResult<bool> {
        let output = self
            .run(Some(workdir), &["ls-remote", "--heads", "origin", branch])
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(ls_remote_lists_branch(&stdout, branch))
    }

    async fn push(&self, workdir: &Path, branch: &str, set_upstream: bool) -> GitOperationResult<()> {
        let mut args = vec!["push"];
        if set_upstream {
            args.push("--set-upstream");
        }
        args.extend(["origin", branch]);
        self.run(Some(workdir), &args).await?;
        Ok(())
    }
}
