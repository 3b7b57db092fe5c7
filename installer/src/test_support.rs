//! Scripted doubles for the pipeline's side-effecting seams.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::types::{ExecutionResult, ModelCandidate, Provider, ValidationResult};
use crate::io::artifact::{Artifact, SyntaxChecker};
use crate::io::completion::{CompletionClient, CompletionError};
use crate::io::playbook::PlaybookRunner;
use crate::io::sleeper::Sleeper;

/// Artifact path inside a fresh temporary directory. The directory lives as
/// long as the returned `TempDir`.
pub fn temp_artifact() -> Result<(tempfile::TempDir, Artifact)> {
    let dir = tempfile::tempdir()?;
    let artifact = Artifact::new(dir.path().join("ansible_playbook.yml"));
    Ok((dir, artifact))
}

/// Non-empty completion text.
pub fn ok(text: &str) -> Result<String, CompletionError> {
    Ok(text.to_string())
}

/// Completion that returned no usable text.
pub fn empty() -> Result<String, CompletionError> {
    Ok(String::new())
}

/// Transport or API failure.
pub fn fault(message: &str) -> Result<String, CompletionError> {
    Err(CompletionError::Http(message.to_string()))
}

/// Returns queued responses in order and records every call.
pub struct ScriptedCompletionClient {
    responses: RefCell<VecDeque<Result<String, CompletionError>>>,
    calls: RefCell<Vec<(ModelCandidate, String)>>,
    fallback_available: bool,
}

impl ScriptedCompletionClient {
    pub fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            calls: RefCell::new(Vec::new()),
            fallback_available: true,
        }
    }

    /// Behave as if the fallback credential were unset.
    pub fn without_fallback(mut self) -> Self {
        self.fallback_available = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn models_called(&self) -> Vec<ModelCandidate> {
        self.calls.borrow().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(_, p)| p.clone()).collect()
    }
}

impl CompletionClient for ScriptedCompletionClient {
    fn complete(&self, candidate: &ModelCandidate, prompt: &str) -> Result<String, CompletionError> {
        self.calls
            .borrow_mut()
            .push((candidate.clone(), prompt.to_string()));
        if candidate.provider == Provider::Fallback && !self.fallback_available {
            return Err(CompletionError::ProviderUnavailable(Provider::Fallback));
        }
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Http("no scripted response left".to_string())))
    }

    fn has_provider(&self, provider: Provider) -> bool {
        provider == Provider::Primary || self.fallback_available
    }
}

/// Returns queued validation results and records what was on disk at each
/// check.
pub struct ScriptedSyntaxChecker {
    results: RefCell<VecDeque<ValidationResult>>,
    checked: RefCell<Vec<String>>,
}

impl ScriptedSyntaxChecker {
    pub fn new(results: Vec<ValidationResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            checked: RefCell::new(Vec::new()),
        }
    }

    /// Fail every check with the same diagnostic.
    pub fn always_failing(diagnostic: &str, checks: usize) -> Self {
        Self::new(vec![ValidationResult::fail(diagnostic); checks])
    }

    pub fn checked_contents(&self) -> Vec<String> {
        self.checked.borrow().clone()
    }
}

impl SyntaxChecker for ScriptedSyntaxChecker {
    fn check(&self, path: &Path) -> Result<ValidationResult> {
        self.checked.borrow_mut().push(fs::read_to_string(path)?);
        Ok(self
            .results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ValidationResult::fail("no scripted validation left")))
    }
}

pub struct ScriptedPlaybookRunner {
    result: ExecutionResult,
    runs: RefCell<Vec<PathBuf>>,
}

impl ScriptedPlaybookRunner {
    pub fn new(result: ExecutionResult) -> Self {
        Self {
            result,
            runs: RefCell::new(Vec::new()),
        }
    }

    pub fn runs(&self) -> Vec<PathBuf> {
        self.runs.borrow().clone()
    }
}

impl PlaybookRunner for ScriptedPlaybookRunner {
    fn run(&self, path: &Path) -> Result<ExecutionResult> {
        self.runs.borrow_mut().push(path.to_path_buf());
        Ok(self.result.clone())
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept_secs(&self) -> Vec<u64> {
        self.slept.borrow().iter().map(Duration::as_secs).collect()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}
