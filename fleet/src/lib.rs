pub mod admin;
pub mod compare;
pub mod driver;
pub mod git;
pub mod manifest;
pub mod steps;

pub use admin::{
    apply_to_all, format_name_list, list_matching, ActionReport, HostingAction, Recreate,
    RecreateError,
};
pub use compare::{
    diff_trees, target_name, BranchComparison, CompareConfig, ComparisonOutcome, ComparisonReport,
    TemplateComparison, TreeDiff,
};
pub use driver::{
    commit_and_push, render_commit_message, BatchDriver, BatchReport, BranchOutcome, BranchReport,
    DriverConfig, RepositoryOutcome, RepositoryReport,
};
pub use git::{GitCli, GitOperationError, GitOperationResult, VersionControl};
pub use manifest::{BatchManifest, ManifestError, ManifestResult, StepConfig};
pub use steps::{
    ConvertRepository, MutationStep, PipelineReport, RemoveFiles, RequirementsStep, StepError,
    StepPipeline, StepResult, TemplateSync,
};

pub mod prelude {
    pub use crate::admin::*;
    pub use crate::compare::*;
    pub use crate::driver::*;
    pub use crate::git::*;
    pub use crate::manifest::*;
    pub use crate::steps::*;
}
