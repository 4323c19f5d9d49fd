//! Overlay a template directory onto a working copy.

use super::{MutationStep, StepError, StepResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub struct TemplateSync {
    source: PathBuf,
    exclude: Vec<String>,
}

impl TemplateSync {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            exclude: Vec::new(),
        }
    }

    /// Skip top-level entries of the template with these names.
    pub fn with_exclude(mut self, exclude: impl IntoIterator<Item = String>) -> Self {
        self.exclude.extend(exclude);
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl MutationStep for TemplateSync {
    fn name(&self) -> &str {
        "sync-template"
    }

    fn describe(&self) -> String {
        format!("copy {} over the working copy", self.source.display())
    }

    fn apply(&self, workdir: &Path) -> StepResult<usize> {
        sync_tree(&self.source, workdir, &self.exclude)
    }
}

/// Copy every file under `source` to the same relative path under `target`,
/// creating directories as needed and overwriting existing files. Files
/// that exist only in `target` are left alone.
///
/// Returns the number of files copied.
pub fn sync_tree(source: &Path, target: &Path, exclude: &[String]) -> StepResult<usize> {
    if !source.is_dir() {
        return Err(StepError::local_state(format!(
            "template directory {} does not exist",
            source.display()
        )));
    }

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() != 1
                || !exclude
                    .iter()
                    .any(|name| entry.file_name().to_string_lossy() == name.as_str())
        });

    let mut copied = 0;
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| StepError::local_state(e.to_string()))?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            copy_file(entry.path(), &destination)?;
            debug!(from = %entry.path().display(), to = %destination.display(), "copied");
            copied += 1;
        }
    }

    info!(source = %source.display(), target = %target.display(), copied, "template synced");
    Ok(copied)
}

/// Copy one file, carrying over its modification time when the platform
/// allows it.
fn copy_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;

    let modified = fs::metadata(from).and_then(|meta| meta.modified());
    if let Ok(modified) = modified {
        let result = fs::File::options()
            .write(true)
            .open(to)
            .and_then(|file| file.set_modified(modified));
        if let Err(e) = result {
            debug!(path = %to.display(), error = %e, "could not preserve modification time");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(root: &Path, relative: &str) -> String {
        fs::read_to_string(root.join(relative)).unwrap()
    }

    #[test]
    fn test_sync_creates_overwrites_and_keeps_extra_files() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), "_run_pylint.py", "import pylint\n");
        write(source.path(), ".github/workflows/classroom.yml", "name: GitHub Classroom\n");
        fs::create_dir_all(source.path().join("empty_dir")).unwrap();

        write(target.path(), "_run_pylint.py", "old\n");
        write(target.path(), "main.py", "print('student code')\n");

        let copied = sync_tree(source.path(), target.path(), &[]).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(read(target.path(), "_run_pylint.py"), "import pylint\n");
        assert_eq!(
            read(target.path(), ".github/workflows/classroom.yml"),
            "name: GitHub Classroom\n"
        );
        assert!(target.path().join("empty_dir").is_dir());
        assert_eq!(read(target.path(), "main.py"), "print('student code')\n");
    }

    #[test]
    fn test_sync_twice_equals_once() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), "a/b/c.txt", "c\n");
        write(source.path(), "root.txt", "root\n");
        write(target.path(), "keep.txt", "keep\n");

        sync_tree(source.path(), target.path(), &[]).unwrap();
        let first: Vec<(String, String)> = ["a/b/c.txt", "root.txt", "keep.txt"]
            .iter()
            .map(|p| (p.to_string(), read(target.path(), p)))
            .collect();

        sync_tree(source.path(), target.path(), &[]).unwrap();
        let second: Vec<(String, String)> = ["a/b/c.txt", "root.txt", "keep.txt"]
            .iter()
            .map(|p| (p.to_string(), read(target.path(), p)))
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_sync_skips_excluded_top_level_entries() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), ".git/HEAD", "ref: refs/heads/main\n");
        write(source.path(), "docs/.git", "not top level\n");
        write(source.path(), "main.py", "pass\n");

        let copied = sync_tree(source.path(), target.path(), &[".git".to_string()]).unwrap();

        assert_eq!(copied, 2);
        assert!(!target.path().join(".git").exists());
        assert!(target.path().join("docs/.git").exists());
    }

    #[test]
    fn test_missing_source_is_local_state_error() {
        let target = TempDir::new().unwrap();
        let step = TemplateSync::new(target.path().join("templates_for_file_manager"));
        let err = step.apply(target.path()).unwrap_err();
        assert!(matches!(err, StepError::LocalState { .. }));
        assert!(!err.is_fatal_for_repository());
    }

    #[test]
    fn test_modification_time_is_preserved() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write(source.path(), "pylintrc", "[MASTER]\n");

        let old = SystemTime::now() - Duration::from_secs(48 * 3600);
        fs::File::options()
            .write(true)
            .open(source.path().join("pylintrc"))
            .unwrap()
            .set_modified(old)
            .unwrap();

        sync_tree(source.path(), target.path(), &[]).unwrap();

        let copied = fs::metadata(target.path().join("pylintrc"))
            .unwrap()
            .modified()
            .unwrap();
        assert!(copied < SystemTime::now() - Duration::from_secs(3600));
    }
}
