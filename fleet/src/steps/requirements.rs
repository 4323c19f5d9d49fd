//! `requirements.txt` add/update/remove
//!
//! Lines are kept verbatim unless a package on them is updated or removed.
//! The package name of a line is the text before its first `==`, trimmed;
//! lines without `==` (comments, `>=` ranges, blank lines) are matched by
//! their whole trimmed text, so in practice they pass through.

use super::{MutationStep, StepError, StepResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Desired `name -> version` pins. Iterates in name order, which is also the
/// order new entries are appended in.
pub type PackageSpec = BTreeMap<String, String>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequirementsError {
    #[error("Invalid package pin '{value}': expected name==version")]
    InvalidPin { value: String },
}

impl From<RequirementsError> for StepError {
    fn from(err: RequirementsError) -> Self {
        StepError::local_state(err.to_string())
    }
}

/// Parse `name==version`. Both halves are required.
pub fn parse_pin(value: &str) -> Result<(String, String), RequirementsError> {
    match value.split_once("==") {
        Some((name, version)) if !name.trim().is_empty() && !version.trim().is_empty() => {
            Ok((name.trim().to_string(), version.trim().to_string()))
        }
        _ => Err(RequirementsError::InvalidPin {
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementsDocument {
    lines: Vec<String>,
}

impl RequirementsDocument {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Every line terminated by `\n`.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Version of the first `name==...` line for `name`.
    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| package_name(line) == name)
            .and_then(|line| line.split_once("=="))
            .map(|(_, version)| version.trim())
    }

    pub fn occurrences(&self, name: &str) -> usize {
        self.lines
            .iter()
            .filter(|line| package_name(line) == name)
            .count()
    }

    /// Add or update `to_add` pins and drop every line naming a package in
    /// `to_remove`.
    ///
    /// The first line declaring a package in `to_add` is rewritten; later
    /// duplicates of it are left alone. Pins not found are appended.
    pub fn merge(&self, to_add: &PackageSpec, to_remove: &BTreeSet<String>) -> Self {
        let mut pending = to_add.clone();
        let mut lines = Vec::with_capacity(self.lines.len() + pending.len());

        for line in &self.lines {
            let name = package_name(line);
            if to_remove.contains(name) {
                continue;
            }
            match pending.remove(name) {
                Some(version) => lines.push(format!("{}=={}", name, version)),
                None => lines.push(line.clone()),
            }
        }

        lines.extend(
            pending
                .into_iter()
                .map(|(name, version)| format!("{}=={}", name, version)),
        );

        Self { lines }
    }
}

/// Package name of a requirements line: the text before `==`, trimmed.
pub fn package_name(line: &str) -> &str {
    match line.split_once("==") {
        Some((name, _)) => name.trim(),
        None => line.trim(),
    }
}

/// Merge pins into `requirements.txt` at the working copy root.
pub struct RequirementsStep {
    add: PackageSpec,
    remove: BTreeSet<String>,
}

impl RequirementsStep {
    pub fn new(add: PackageSpec, remove: impl IntoIterator<Item = String>) -> Self {
        Self {
            add,
            remove: remove.into_iter().collect(),
        }
    }
}

impl MutationStep for RequirementsStep {
    fn name(&self) -> &str {
        "requirements"
    }

    fn describe(&self) -> String {
        let add: Vec<String> = self
            .add
            .iter()
            .map(|(name, version)| format!("{}=={}", name, version))
            .collect();
        let remove: Vec<&str> = self.remove.iter().map(String::as_str).collect();
        format!(
            "update {} (add [{}], remove [{}])",
            REQUIREMENTS_FILE,
            add.join(", "),
            remove.join(", ")
        )
    }

    fn apply(&self, workdir: &Path) -> StepResult<usize> {
        let path = workdir.join(REQUIREMENTS_FILE);

        let (existing, original) = if path.exists() {
            let content = fs::read_to_string(&path)?;
            (RequirementsDocument::parse(&content), Some(content))
        } else if self.add.is_empty() {
            debug!(path = %path.display(), "no requirements file and nothing to add");
            return Ok(0);
        } else {
            (RequirementsDocument::default(), None)
        };

        let rendered = existing.merge(&self.add, &self.remove).render();
        if original.as_deref() == Some(rendered.as_str()) {
            debug!(path = %path.display(), "requirements already up to date");
            return Ok(0);
        }

        fs::write(&path, rendered)?;
        info!(path = %path.display(), "requirements updated");
        Ok(1)
    }
}
