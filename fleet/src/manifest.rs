//! TOML batch manifest (`fleet.toml`)
//!
//! Describes one run: the organization, the repositories and branches to
//! visit and the ordered steps to apply. Relative paths inside the manifest
//! resolve against the manifest's own directory.

use crate::driver::{is_plain_name, DriverConfig, DEFAULT_COMMIT_MESSAGE, DEFAULT_WORKDIR};
use crate::steps::autograding::DEFAULT_LINT_MAX;
use crate::steps::{
    ConvertRepository, MutationStep, RemoveFiles, RequirementsStep, StepPipeline, TemplateSync,
};
use hosting::RepositoryRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MANIFEST: &str = "fleet.toml";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid manifest: {message}")]
    Invalid { message: String },
}

impl ManifestError {
    fn invalid(message: impl Into<String>) -> Self {
        ManifestError::Invalid {
            message: message.into(),
        }
    }
}

pub type ManifestResult<T> = Result<T, ManifestError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchManifest {
    pub organization: String,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_workdir() -> PathBuf {
    PathBuf::from(DEFAULT_WORKDIR)
}

fn default_lint_max() -> u32 {
    DEFAULT_LINT_MAX
}

/// One `[[steps]]` table, selected by its `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepConfig {
    RemoveFiles {
        paths: Vec<String>,
    },
    SyncTemplate {
        source: PathBuf,
        #[serde(default)]
        exclude: Vec<String>,
    },
    Requirements {
        #[serde(default)]
        add: BTreeMap<String, String>,
        #[serde(default)]
        remove: Vec<String>,
    },
    ConvertAutograding {
        template_dir: PathBuf,
        #[serde(default = "default_lint_max")]
        lint_max: u32,
    },
}

impl BatchManifest {
    pub fn load(path: impl AsRef<Path>) -> ManifestResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let manifest = Self::from_toml_str(&content)?.with_base_dir(base_dir);
        debug!(
            path = %path.display(),
            repositories = manifest.repositories.len(),
            steps = manifest.steps.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Parse and validate. Relative paths resolve against the current
    /// directory until [`with_base_dir`](Self::with_base_dir) says otherwise.
    pub fn from_toml_str(content: &str) -> ManifestResult<Self> {
        let mut manifest: BatchManifest = toml::from_str(content)?;
        manifest.base_dir = PathBuf::from(".");
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn validate(&self) -> ManifestResult<()> {
        if self.organization.trim().is_empty() {
            return Err(ManifestError::invalid("organization cannot be empty"));
        }

        let mut seen = HashSet::new();
        for name in &self.repositories {
            if name.trim().is_empty() {
                return Err(ManifestError::invalid("repository names cannot be empty"));
            }
            if !is_plain_name(name) {
                return Err(ManifestError::invalid(format!(
                    "repository '{}' must be a bare name; the organization is set separately",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ManifestError::invalid(format!(
                    "repository '{}' is listed more than once",
                    name
                )));
            }
        }

        if self.branches.iter().any(|b| b.trim().is_empty()) {
            return Err(ManifestError::invalid("branch names cannot be empty"));
        }

        if let Some(message) = &self.commit_message {
            if message.trim().is_empty() {
                return Err(ManifestError::invalid("commit_message cannot be empty"));
            }
        }

        for step in &self.steps {
            if let StepConfig::Requirements { add, remove } = step {
                for (name, version) in add {
                    if name.trim().is_empty() || version.trim().is_empty() {
                        return Err(ManifestError::invalid(format!(
                            "requirements pin '{}=={}' needs both a name and a version",
                            name, version
                        )));
                    }
                }
                if remove.iter().any(|n| n.trim().is_empty()) {
                    return Err(ManifestError::invalid(
                        "requirements remove entries cannot be empty",
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn repository_refs(&self) -> Vec<RepositoryRef> {
        self.repositories
            .iter()
            .map(|name| RepositoryRef::new(self.organization.clone(), name.clone()))
            .collect()
    }

    /// `path` as-is when absolute, otherwise relative to the manifest.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn workdir_path(&self) -> PathBuf {
        self.resolve(&self.workdir)
    }

    pub fn commit_message(&self) -> &str {
        self.commit_message
            .as_deref()
            .unwrap_or(DEFAULT_COMMIT_MESSAGE)
    }

    pub fn driver_config(&self, dry_run: bool) -> DriverConfig {
        DriverConfig::new()
            .with_workdir(self.workdir_path())
            .with_branches(self.branches.iter().cloned())
            .with_commit_message(self.commit_message())
            .with_dry_run(dry_run)
    }

    pub fn build_step(&self, config: &StepConfig) -> Box<dyn MutationStep> {
        match config {
            StepConfig::RemoveFiles { paths } => Box::new(RemoveFiles::new(paths.iter().cloned())),
            StepConfig::SyncTemplate { source, exclude } => Box::new(
                // A template that is itself a checkout must not bring its
                // git metadata along.
                TemplateSync::new(self.resolve(source))
                    .with_exclude(std::iter::once(".git".to_string()).chain(exclude.iter().cloned())),
            ),
            StepConfig::Requirements { add, remove } => Box::new(RequirementsStep::new(
                add.iter()
                    .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
                    .collect(),
                remove.iter().map(|n| n.trim().to_string()),
            )),
            StepConfig::ConvertAutograding {
                template_dir,
                lint_max,
            } => Box::new(
                ConvertRepository::new(self.resolve(template_dir)).with_lint_max(*lint_max),
            ),
        }
    }

    pub fn build_pipeline(&self) -> StepPipeline {
        self.steps
            .iter()
            .fold(StepPipeline::new(), |pipeline, config| {
                pipeline.with_step(self.build_step(config))
            })
    }
}
