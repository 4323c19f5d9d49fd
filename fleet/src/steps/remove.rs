use super::{ensure_relative, MutationStep, StepError, StepResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Delete files and directories from the working copy. Entries may be plain
/// relative paths or glob patterns (`*.bak`, `docs/**/draft_*.md`).
pub struct RemoveFiles {
    patterns: Vec<String>,
}

impl RemoveFiles {
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
        }
    }

    fn resolve(&self, workdir: &Path, pattern: &str) -> StepResult<Vec<PathBuf>> {
        ensure_relative(Path::new(pattern))?;

        if !is_glob(pattern) {
            let path = workdir.join(pattern);
            return Ok(if path.exists() || path.is_symlink() {
                vec![path]
            } else {
                vec![]
            });
        }

        let root = glob::Pattern::escape(&workdir.to_string_lossy());
        let full = format!("{}/{}", root.trim_end_matches('/'), pattern);
        let paths = glob::glob(&full).map_err(|e| {
            StepError::local_state(format!("invalid pattern '{}': {}", pattern, e.msg))
        })?;

        let mut matched = Vec::new();
        for path in paths {
            let path = path.map_err(|e| StepError::Io(e.into()))?;
            let inside_git = path
                .strip_prefix(workdir)
                .map(|relative| relative.starts_with(".git"))
                .unwrap_or(true);
            if !inside_git {
                matched.push(path);
            }
        }
        Ok(matched)
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

impl MutationStep for RemoveFiles {
    fn name(&self) -> &str {
        "remove-files"
    }

    fn describe(&self) -> String {
        format!("remove [{}]", self.patterns.join(", "))
    }

    fn apply(&self, workdir: &Path) -> StepResult<usize> {
        let mut removed = 0;

        for pattern in &self.patterns {
            let matches = self.resolve(workdir, pattern)?;
            if matches.is_empty() {
                warn!(pattern = %pattern, workdir = %workdir.display(), "nothing to remove");
                continue;
            }

            for path in matches {
                // A match may sit inside a directory removed earlier.
                if !path.exists() && !path.is_symlink() {
                    continue;
                }
                if path.is_dir() && !path.is_symlink() {
                    fs::remove_dir_all(&path)?;
                    info!(path = %path.display(), "removed directory");
                } else {
                    fs::remove_file(&path)?;
                    info!(path = %path.display(), "removed file");
                }
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_removes_files_and_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "notes.md");
        touch(dir.path(), ".github/classroom/autograding.json");
        touch(dir.path(), "main.py");

        let step = RemoveFiles::new(vec![
            "notes.md".to_string(),
            ".github/classroom".to_string(),
            "absent.txt".to_string(),
        ]);
        assert_eq!(step.apply(dir.path()).unwrap(), 2);

        assert!(!dir.path().join("notes.md").exists());
        assert!(!dir.path().join(".github/classroom").exists());
        assert!(dir.path().join(".github").is_dir());
        assert!(dir.path().join("main.py").exists());
    }

    #[test]
    fn test_glob_patterns() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.bak");
        touch(dir.path(), "sub/b.bak");
        touch(dir.path(), "keep.py");

        let step = RemoveFiles::new(vec!["**/*.bak".to_string()]);
        assert_eq!(step.apply(dir.path()).unwrap(), 2);
        assert!(!dir.path().join("a.bak").exists());
        assert!(!dir.path().join("sub/b.bak").exists());
        assert!(dir.path().join("keep.py").exists());
    }

    #[test]
    fn test_glob_never_matches_git_metadata() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".git/config");
        touch(dir.path(), "x.cfg");

        let step = RemoveFiles::new(vec!["**/*".to_string()]);
        step.apply(dir.path()).unwrap();
        assert!(dir.path().join(".git/config").exists());
        assert!(!dir.path().join("x.cfg").exists());
    }

    #[test]
    fn test_rejects_paths_outside_working_copy() {
        let dir = TempDir::new().unwrap();
        for bad in ["../elsewhere", "/tmp/file", ".git"] {
            let step = RemoveFiles::new(vec![bad.to_string()]);
            let err = step.apply(dir.path()).unwrap_err();
            assert!(matches!(err, StepError::LocalState { .. }), "{}", bad);
        }
    }
}
