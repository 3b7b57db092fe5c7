//! Playbook persistence and syntax validation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::ValidationResult;

/// The generated playbook file. Its path never changes during a run; every
/// write replaces the whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the artifact with `content` (no append, no backup).
    pub fn write(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create artifact dir {}", parent.display()))?;
        }
        fs::write(&self.path, content)
            .with_context(|| format!("write playbook {}", self.path.display()))?;
        debug!(path = %self.path.display(), bytes = content.len(), "artifact written");
        Ok(())
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("read playbook {}", self.path.display()))
    }
}

/// Syntax checker for a playbook already on disk.
pub trait SyntaxChecker {
    fn check(&self, path: &Path) -> Result<ValidationResult>;
}

/// Persist `content` to the artifact and run the syntax checker on it.
#[instrument(skip_all, fields(path = %artifact.path().display()))]
pub fn validate<C: SyntaxChecker + ?Sized>(
    content: &str,
    artifact: &Artifact,
    checker: &C,
) -> Result<ValidationResult> {
    artifact.write(content)?;
    let result = checker.check(artifact.path())?;
    debug!(passed = result.passed, "syntax check finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Records what was on disk at check time.
    struct SnapshotChecker {
        seen: RefCell<Vec<String>>,
        pass: bool,
    }

    impl SyntaxChecker for SnapshotChecker {
        fn check(&self, path: &Path) -> Result<ValidationResult> {
            self.seen
                .borrow_mut()
                .push(fs::read_to_string(path).expect("read artifact"));
            Ok(if self.pass {
                ValidationResult::pass("playbook: ok")
            } else {
                ValidationResult::fail("ERROR! bad yaml")
            })
        }
    }

    #[test]
    fn validate_overwrites_previous_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = Artifact::new(temp.path().join("nested/playbook.yml"));
        let checker = SnapshotChecker {
            seen: RefCell::new(Vec::new()),
            pass: false,
        };

        validate("a much longer first playbook", &artifact, &checker).expect("first");
        let result = validate("short", &artifact, &checker).expect("second");

        assert!(!result.passed);
        assert_eq!(result.diagnostic.as_deref(), Some("ERROR! bad yaml"));
        assert_eq!(
            *checker.seen.borrow(),
            vec!["a much longer first playbook", "short"]
        );
        assert_eq!(artifact.read().expect("read"), "short");
    }

    #[test]
    fn passing_check_has_no_diagnostic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = Artifact::new(temp.path().join("playbook.yml"));
        let checker = SnapshotChecker {
            seen: RefCell::new(Vec::new()),
            pass: true,
        };
        let result = validate("- hosts: all", &artifact, &checker).expect("validate");
        assert!(result.passed);
        assert_eq!(result.diagnostic, None);
        assert_eq!(result.output, "playbook: ok");
    }
}
