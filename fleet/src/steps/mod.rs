//! Mutation steps applied to a checked-out working copy
//!
//! A batch run applies the same ordered [`StepPipeline`] to every
//! repository/branch pair. Steps only see the working copy path they are
//! given.

pub mod autograding;
pub mod remove;
pub mod requirements;
pub mod sync;

pub use autograding::ConvertRepository;
pub use remove::RemoveFiles;
pub use requirements::RequirementsStep;
pub use sync::TemplateSync;

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StepError {
    /// An expected file or directory is missing, or a path is unusable.
    #[error("Local state error: {message}")]
    LocalState { message: String },

    #[error("Data format error in {}: {message}", path.display())]
    DataFormat { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepError {
    pub fn local_state(message: impl Into<String>) -> Self {
        StepError::LocalState {
            message: message.into(),
        }
    }

    /// Malformed input data stops the whole repository; anything else only
    /// skips the step that hit it.
    pub fn is_fatal_for_repository(&self) -> bool {
        matches!(self, StepError::DataFormat { .. })
    }
}

pub type StepResult<T> = Result<T, StepError>;

pub trait MutationStep: Send + Sync {
    fn name(&self) -> &str;

    /// One-line human description for plans and logs.
    fn describe(&self) -> String;

    /// Apply the step to `workdir`, returning how many paths were written
    /// or removed.
    fn apply(&self, workdir: &Path) -> StepResult<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub step: String,
    pub touched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStep {
    pub step: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub applied: Vec<AppliedStep>,
    pub skipped: Vec<SkippedStep>,
}

impl PipelineReport {
    pub fn touched(&self) -> usize {
        self.applied.iter().map(|s| s.touched).sum()
    }
}

/// Ordered list of steps.
pub struct StepPipeline {
    steps: Vec<Box<dyn MutationStep>>,
}

impl StepPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn push(&mut self, step: Box<dyn MutationStep>) {
        self.steps.push(step);
    }

    pub fn with_step(mut self, step: Box<dyn MutationStep>) -> Self {
        self.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.describe()).collect()
    }

    /// Apply every step in order. Non-fatal failures are logged and recorded
    /// as skipped; a fatal one aborts the remaining steps.
    pub fn run(&self, workdir: &Path) -> StepResult<PipelineReport> {
        let mut report = PipelineReport::default();

        for step in &self.steps {
            match step.apply(workdir) {
                Ok(touched) => {
                    debug!(step = step.name(), touched, "step applied");
                    report.applied.push(AppliedStep {
                        step: step.name().to_string(),
                        touched,
                    });
                }
                Err(e) if e.is_fatal_for_repository() => return Err(e),
                Err(e) => {
                    warn!(step = step.name(), error = %e, "step skipped");
                    report.skipped.push(SkippedStep {
                        step: step.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

impl Default for StepPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects absolute paths, `..` components and anything inside `.git`.
pub(crate) fn ensure_relative(path: &Path) -> StepResult<()> {
    use std::path::Component;

    let mut components = path.components().peekable();
    if components.peek().is_none() {
        return Err(StepError::local_state("empty path"));
    }

    let mut seen_normal = false;
    for component in components {
        match component {
            Component::Normal(name) if !seen_normal && name == ".git" => {
                return Err(StepError::local_state(format!(
                    "refusing to touch git metadata: {}",
                    path.display()
                )));
            }
            Component::Normal(_) => seen_normal = true,
            Component::CurDir => {}
            _ => {
                return Err(StepError::local_state(format!(
                    "path must stay inside the working copy: {}",
                    path.display()
                )));
            }
        }
    }

    Ok(())
}
