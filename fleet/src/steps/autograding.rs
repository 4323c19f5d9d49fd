//! Autograding configuration conversion
//!
//! Classroom repositories used to carry their test definitions in
//! `.github/classroom/autograding.json`. The newer layout keeps a simplified
//! `unittests.json` plus a `lint.json` under `.github/autograding/` and the
//! workflow files under `.github/workflows/`.
//!
//! ```
//! use fleet::steps::autograding::convert_json;
//!
//! let converted = convert_json(r#"{"tests":[{"name":"t1","timeout":10,"points":5}]}"#).unwrap();
//! assert!(converted.contains(r#""function": "t1""#));
//! ```

use super::{MutationStep, StepError, StepResult};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_LINT_MAX: u32 = 5;

const GITHUB_DIR: &str = ".github";
const CLASSROOM_DIR: &str = "classroom";
const AUTOGRADING_DIR: &str = "autograding";
const WORKFLOWS_DIR: &str = "workflows";
const AUTOGRADING_FILE: &str = "autograding.json";
const UNITTESTS_FILE: &str = "unittests.json";
const LINT_FILE: &str = "lint.json";
const PYLINT_RUNNER: &str = "_run_pylint.py";

#[derive(Error, Debug)]
pub enum AutogradingError {
    #[error("Malformed autograding document: {0}")]
    DataFormat(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AutogradingResult<T> = Result<T, AutogradingError>;

impl From<AutogradingError> for StepError {
    fn from(err: AutogradingError) -> Self {
        match err {
            AutogradingError::DataFormat(e) => StepError::DataFormat {
                path: PathBuf::from(AUTOGRADING_FILE),
                message: e.to_string(),
            },
            AutogradingError::Io(e) => StepError::Io(e),
        }
    }
}

/// `autograding.json` as written by the classroom tooling. Extra fields
/// (`setup`, `run`, `comparison`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutogradingDocument {
    pub tests: Vec<AutogradingTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutogradingTest {
    pub name: String,
    pub timeout: Number,
    pub points: Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTestEntry {
    pub name: String,
    pub function: String,
    pub timeout: Number,
    pub points: Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintConfig {
    pub files: Vec<String>,
    pub ignore: Vec<String>,
    pub max: u32,
}

/// Each test becomes an entry whose `function` is its `name`.
pub fn convert(document: &AutogradingDocument) -> Vec<UnitTestEntry> {
    document
        .tests
        .iter()
        .map(|test| UnitTestEntry {
            name: test.name.clone(),
            function: test.name.clone(),
            timeout: test.timeout.clone(),
            points: test.points.clone(),
        })
        .collect()
}

/// Parse, convert and pretty-print with two-space indentation.
pub fn convert_json(input: &str) -> AutogradingResult<String> {
    let document: AutogradingDocument = serde_json::from_str(input)?;
    Ok(serde_json::to_string_pretty(&convert(&document))?)
}

/// Lint configuration listing the root-level Python sources of `dir`,
/// skipping tests and the pylint runner.
pub fn lint_config_for(dir: &Path, max: u32) -> std::io::Result<LintConfig> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_lintable(&name) {
            files.push(name);
        }
    }
    files.sort();

    Ok(LintConfig {
        files,
        ignore: Vec::new(),
        max,
    })
}

fn is_lintable(file_name: &str) -> bool {
    file_name.ends_with(".py")
        && !file_name.contains("test_")
        && !file_name.contains("_test")
        && file_name != PYLINT_RUNNER
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> StepResult<()> {
    let mut body = serde_json::to_string_pretty(value).map_err(|e| StepError::DataFormat {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    body.push('\n');
    fs::write(path, body)?;
    Ok(())
}

/// Moves a working copy from the classroom layout to the autograding one.
pub struct ConvertRepository {
    template_dir: PathBuf,
    lint_max: u32,
}

impl ConvertRepository {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            lint_max: DEFAULT_LINT_MAX,
        }
    }

    pub fn with_lint_max(mut self, lint_max: u32) -> Self {
        self.lint_max = lint_max;
        self
    }

    /// Copy `file_name` from the template directory if it is there.
    fn copy_template(&self, file_name: &str, destination_dir: &Path) -> StepResult<usize> {
        let source = self.template_dir.join(file_name);
        if !source.is_file() {
            debug!(path = %source.display(), "template file not present");
            return Ok(0);
        }
        fs::copy(&source, destination_dir.join(file_name))?;
        Ok(1)
    }
}

impl MutationStep for ConvertRepository {
    fn name(&self) -> &str {
        "convert-autograding"
    }

    fn describe(&self) -> String {
        format!(
            "convert classroom autograding to unittests.json/lint.json (templates from {})",
            self.template_dir.display()
        )
    }

    fn apply(&self, workdir: &Path) -> StepResult<usize> {
        let github = workdir.join(GITHUB_DIR);
        let classroom = github.join(CLASSROOM_DIR);
        let autograding = github.join(AUTOGRADING_DIR);
        let workflows = github.join(WORKFLOWS_DIR);

        // Read and convert before touching anything so a bad document leaves
        // the working copy as it was.
        let input = classroom.join(AUTOGRADING_FILE);
        if !input.is_file() {
            return Err(StepError::local_state(format!(
                "{} not found",
                input.display()
            )));
        }
        let content = fs::read_to_string(&input)?;
        let document: AutogradingDocument =
            serde_json::from_str(&content).map_err(|e| StepError::DataFormat {
                path: input.clone(),
                message: e.to_string(),
            })?;
        let unittests = convert(&document);

        fs::create_dir_all(&autograding)?;
        fs::create_dir_all(&workflows)?;

        write_json(&autograding.join(UNITTESTS_FILE), &unittests)?;
        write_json(
            &autograding.join(LINT_FILE),
            &lint_config_for(workdir, self.lint_max)?,
        )?;
        let mut touched = 2;

        touched += self.copy_template("pylintrc", &autograding)?;
        touched += self.copy_template("classroom.yml", &workflows)?;
        touched += self.copy_template("copyissues.yml", &workflows)?;

        fs::remove_dir_all(&classroom)?;
        touched += 1;

        info!(
            workdir = %workdir.display(),
            tests = unittests.len(),
            "autograding converted"
        );
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_convert_single_test() {
        let output = convert_json(r#"{"tests":[{"name":"t1","timeout":10,"points":5}]}"#).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            value,
            json!([{"name": "t1", "function": "t1", "timeout": 10, "points": 5}])
        );
    }

    #[test]
    fn test_convert_keeps_field_order_and_indent() {
        let output = convert_json(
            r#"{"tests":[{"name":"test_sum","setup":"","run":"pytest","timeout":10,"points":1}]}"#,
        )
        .unwrap();
        assert_eq!(
            output,
            "[\n  {\n    \"name\": \"test_sum\",\n    \"function\": \"test_sum\",\n    \"timeout\": 10,\n    \"points\": 1\n  }\n]"
        );
    }

    #[test]
    fn test_missing_tests_key_is_data_format_error() {
        let result = convert_json(r#"{"checks": []}"#);
        assert!(matches!(result, Err(AutogradingError::DataFormat(_))));
    }

    #[test]
    fn test_data_format_error_is_fatal_step_error() {
        let err: StepError = convert_json("[]").unwrap_err().into();
        assert!(err.is_fatal_for_repository());
    }

    #[test]
    fn test_empty_test_list() {
        assert_eq!(convert_json(r#"{"tests": []}"#).unwrap(), "[]");
    }

    #[test]
    fn test_is_lintable() {
        assert!(is_lintable("main.py"));
        assert!(is_lintable("bubblesort.py"));
        assert!(!is_lintable("test_main.py"));
        assert!(!is_lintable("main_test.py"));
        assert!(!is_lintable("_run_pylint.py"));
        assert!(!is_lintable("README.md"));
    }
}
