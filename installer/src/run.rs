//! Top-level pipeline: generate, persist and repair, then execute.

use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::backoff::RetryPolicy;
use crate::core::events::PipelineEvent;
use crate::core::prompt::EXAMPLE_PLAYBOOK;
use crate::core::types::{GenerationContext, ModelCandidate, ProgramRequest};
use crate::exit_codes;
use crate::generate::{GenerationError, generate};
use crate::io::artifact::{Artifact, SyntaxChecker};
use crate::io::completion::CompletionClient;
use crate::io::config::InstallerConfig;
use crate::io::platform::{PackageManager, SearchPath};
use crate::io::playbook::PlaybookRunner;
use crate::io::process::{CommandLimits, describe, run_checked};
use crate::io::sleeper::Sleeper;
use crate::repair::{RepairDeps, RepairOutcome, RepairRequest, repair_until_valid};

/// Everything one pipeline run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub context: GenerationContext,
    pub chain: Vec<ModelCandidate>,
    pub retry: RetryPolicy,
    pub max_repair_attempts: u32,
    pub artifact: Artifact,
}

impl RunRequest {
    /// Build a request for `programs`, loading the example template if one is
    /// configured.
    pub fn from_config(cfg: &InstallerConfig, programs: ProgramRequest) -> Result<Self> {
        let template = match &cfg.playbook.template_path {
            Some(path) => Some(
                fs::read_to_string(path)
                    .with_context(|| format!("read playbook template {}", path.display()))?,
            ),
            None if cfg.playbook.use_builtin_example => Some(EXAMPLE_PLAYBOOK.to_string()),
            None => None,
        };
        Ok(Self {
            context: GenerationContext::create(&cfg.playbook.target_description, programs)
                .with_template(template),
            chain: cfg.completion.model_chain(),
            retry: cfg.retry,
            max_repair_attempts: cfg.repair.max_attempts,
            artifact: Artifact::new(&cfg.playbook.path),
        })
    }
}

pub struct RunDeps<'a, C: ?Sized, K: ?Sized, R: ?Sized, S: ?Sized> {
    pub client: &'a C,
    pub checker: &'a K,
    pub runner: &'a R,
    pub sleeper: &'a S,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Executed,
    ExecutionFailed { diagnostic: String },
    /// No content was produced; the artifact may not exist.
    GenerationFailed,
    ValidationExhausted { diagnostic: String },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Executed => exit_codes::OK,
            Self::ExecutionFailed { .. } => exit_codes::EXECUTION_FAILED,
            Self::GenerationFailed => exit_codes::GENERATION_FAILED,
            Self::ValidationExhausted { .. } => exit_codes::VALIDATION_EXHAUSTED,
        }
    }
}

/// Run the full pipeline once.
///
/// Generation exhaustion returns before anything is written. The playbook is
/// executed only after it passed its syntax check, and exactly once.
#[instrument(skip_all, fields(programs = request.context.programs.len()))]
pub fn run_pipeline<C, K, R, S, F>(
    request: &RunRequest,
    deps: &RunDeps<'_, C, K, R, S>,
    mut on_event: F,
) -> Result<RunOutcome>
where
    C: CompletionClient + ?Sized,
    K: SyntaxChecker + ?Sized,
    R: PlaybookRunner + ?Sized,
    S: Sleeper + ?Sized,
    F: FnMut(&PipelineEvent),
{
    let initial = match generate(
        &request.context,
        &request.chain,
        deps.client,
        &request.retry,
        deps.sleeper,
        &mut on_event,
    ) {
        Ok(content) => content,
        Err(GenerationError::Exhausted { attempts }) => {
            warn!(attempts, "generation exhausted, nothing written");
            return Ok(RunOutcome::GenerationFailed);
        }
        Err(err @ GenerationError::Prompt(_)) => return Err(err.into()),
    };

    let repair = repair_until_valid(
        initial,
        &RepairRequest {
            context: &request.context,
            chain: &request.chain,
            retry: &request.retry,
            max_attempts: request.max_repair_attempts,
            artifact: &request.artifact,
        },
        &RepairDeps {
            client: deps.client,
            checker: deps.checker,
            sleeper: deps.sleeper,
        },
        &mut on_event,
    )?;
    match repair {
        RepairOutcome::Passed { regenerations, .. } => {
            info!(regenerations, "playbook validated");
        }
        RepairOutcome::Exhausted { diagnostic, .. } => {
            return Ok(RunOutcome::ValidationExhausted { diagnostic });
        }
        RepairOutcome::GenerationFailed { .. } => return Ok(RunOutcome::GenerationFailed),
    }

    on_event(&PipelineEvent::ExecutionStarted);
    let result = deps
        .runner
        .run(request.artifact.path())
        .context("run playbook")?;
    if result.success {
        on_event(&PipelineEvent::ExecutionSucceeded);
        Ok(RunOutcome::Executed)
    } else {
        let diagnostic = result.diagnostic.unwrap_or_default();
        on_event(&PipelineEvent::ExecutionFailed {
            diagnostic: diagnostic.clone(),
        });
        Ok(RunOutcome::ExecutionFailed { diagnostic })
    }
}

/// Install `programs` directly with `manager`, skipping playbook generation.
///
/// Commands run in order and stop at the first failure. `path` is the search
/// path left by bootstrapping, so a freshly installed manager is runnable.
#[instrument(skip_all, fields(manager = ?manager, programs = programs.len()))]
pub fn direct_install(
    manager: PackageManager,
    programs: &ProgramRequest,
    path: &SearchPath,
    limits: CommandLimits,
    out: &mut dyn Write,
) -> Result<RunOutcome> {
    writeln!(
        out,
        "Installing {} with {}...",
        programs.joined(),
        manager.executable()
    )?;
    for cmd in manager.install_commands(programs, path) {
        let line = describe(&cmd);
        writeln!(out, "$ {line}")?;
        if let Err(err) = run_checked(cmd, limits, true) {
            warn!(command = %line, err = %err, "package manager command failed");
            let diagnostic = format!("{err:#}");
            writeln!(out, "Error installing programs: {diagnostic}")?;
            return Ok(RunOutcome::ExecutionFailed { diagnostic });
        }
    }
    writeln!(out, "Programs installed successfully.")?;
    Ok(RunOutcome::Executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionResult, ValidationResult};
    use crate::test_support::{
        RecordingSleeper, ScriptedCompletionClient, ScriptedPlaybookRunner, ScriptedSyntaxChecker,
        empty, ok,
    };

    fn request(temp: &tempfile::TempDir) -> RunRequest {
        let mut cfg = InstallerConfig::default();
        cfg.playbook.path = temp.path().join("ansible_playbook.yml");
        cfg.completion.models = vec!["m1".to_string()];
        cfg.completion.fallback_model = String::new();
        RunRequest::from_config(&cfg, ["git"].into_iter().collect()).expect("request")
    }

    #[test]
    fn valid_playbook_is_executed_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request(&temp);
        let client = ScriptedCompletionClient::new(vec![ok("- hosts: all")]);
        let checker = ScriptedSyntaxChecker::new(vec![ValidationResult::pass("")]);
        let runner = ScriptedPlaybookRunner::new(ExecutionResult::success());
        let deps = RunDeps {
            client: &client,
            checker: &checker,
            runner: &runner,
            sleeper: &RecordingSleeper::new(),
        };

        let mut events = Vec::new();
        let outcome = run_pipeline(&request, &deps, |e| events.push(e.clone())).expect("run");

        assert_eq!(outcome, RunOutcome::Executed);
        assert_eq!(outcome.exit_code(), exit_codes::OK);
        assert_eq!(runner.runs(), vec![request.artifact.path().to_path_buf()]);
        assert_eq!(events.last(), Some(&PipelineEvent::ExecutionSucceeded));
    }

    #[test]
    fn generation_failure_writes_nothing_and_runs_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request(&temp);
        let client = ScriptedCompletionClient::new(vec![empty(), empty(), empty()]);
        let checker = ScriptedSyntaxChecker::new(Vec::new());
        let runner = ScriptedPlaybookRunner::new(ExecutionResult::success());
        let deps = RunDeps {
            client: &client,
            checker: &checker,
            runner: &runner,
            sleeper: &RecordingSleeper::new(),
        };

        let outcome = run_pipeline(&request, &deps, |_| {}).expect("run");

        assert_eq!(outcome, RunOutcome::GenerationFailed);
        assert_eq!(outcome.exit_code(), exit_codes::GENERATION_FAILED);
        assert!(!request.artifact.path().exists());
        assert!(checker.checked_contents().is_empty());
        assert!(runner.runs().is_empty());
    }

    #[test]
    fn exhausted_repair_skips_execution() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request(&temp);
        let client = ScriptedCompletionClient::new(vec![ok("v1"), ok("v2"), ok("v3"), ok("v4")]);
        let checker = ScriptedSyntaxChecker::always_failing("ERROR! syntax", 4);
        let runner = ScriptedPlaybookRunner::new(ExecutionResult::success());
        let deps = RunDeps {
            client: &client,
            checker: &checker,
            runner: &runner,
            sleeper: &RecordingSleeper::new(),
        };

        let outcome = run_pipeline(&request, &deps, |_| {}).expect("run");

        assert_eq!(
            outcome,
            RunOutcome::ValidationExhausted {
                diagnostic: "ERROR! syntax".to_string()
            }
        );
        assert_eq!(outcome.exit_code(), exit_codes::VALIDATION_EXHAUSTED);
        assert!(runner.runs().is_empty());
    }

    #[test]
    fn execution_failure_is_reported_not_retried() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request(&temp);
        let client = ScriptedCompletionClient::new(vec![ok("- hosts: all")]);
        let checker = ScriptedSyntaxChecker::new(vec![ValidationResult::pass("")]);
        let runner = ScriptedPlaybookRunner::new(ExecutionResult::failure("exited with status 2"));
        let deps = RunDeps {
            client: &client,
            checker: &checker,
            runner: &runner,
            sleeper: &RecordingSleeper::new(),
        };

        let outcome = run_pipeline(&request, &deps, |_| {}).expect("run");

        assert_eq!(
            outcome,
            RunOutcome::ExecutionFailed {
                diagnostic: "exited with status 2".to_string()
            }
        );
        assert_eq!(outcome.exit_code(), exit_codes::EXECUTION_FAILED);
        assert_eq!(runner.runs().len(), 1);
    }

    #[test]
    fn builtin_example_is_embedded_when_enabled() {
        let mut cfg = InstallerConfig::default();
        cfg.playbook.use_builtin_example = true;
        let request = RunRequest::from_config(&cfg, ProgramRequest::default()).expect("request");
        assert_eq!(request.context.template.as_deref(), Some(EXAMPLE_PLAYBOOK));
    }

    #[test]
    fn missing_template_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = InstallerConfig::default();
        cfg.playbook.template_path = Some(temp.path().join("missing.yml"));
        let err = RunRequest::from_config(&cfg, ProgramRequest::default()).expect_err("missing");
        assert!(format!("{err:#}").contains("missing.yml"));
    }

    #[cfg(unix)]
    fn fake_bin(dir: &std::path::Path, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.join(name);
        fs::write(&bin, format!("#!/bin/sh\n{script}")).expect("write fake bin");
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[cfg(unix)]
    #[test]
    fn direct_install_runs_manager_found_only_on_search_path() {
        let bin = tempfile::tempdir().expect("tempdir");
        let log = bin.path().join("calls.log");
        fake_bin(
            bin.path(),
            "brew",
            &format!("echo \"brew $*\" >> '{}'\n", log.display()),
        );
        let path = SearchPath::new(vec![bin.path().to_path_buf()]);
        let programs: ProgramRequest = ["git", "vlc"].into_iter().collect();
        let manager =
            PackageManager::detect(crate::core::types::Platform::Darwin, &path).expect("brew");

        let mut out = Vec::new();
        let outcome =
            direct_install(manager, &programs, &path, CommandLimits::default(), &mut out)
                .expect("install");

        assert_eq!(outcome, RunOutcome::Executed);
        assert_eq!(
            fs::read_to_string(&log).expect("log"),
            "brew install git vlc\n"
        );
        assert!(String::from_utf8_lossy(&out).ends_with("Programs installed successfully.\n"));
    }

    #[cfg(unix)]
    #[test]
    fn direct_install_runs_commands_in_order() {
        let bin = tempfile::tempdir().expect("tempdir");
        let log = bin.path().join("calls.log");
        fake_bin(bin.path(), "sudo", "exec \"$@\"\n");
        fake_bin(
            bin.path(),
            "apt",
            &format!("echo \"apt $*\" >> '{}'\n", log.display()),
        );
        let path = SearchPath::new(vec![bin.path().to_path_buf()]);
        let programs: ProgramRequest = ["git", "curl"].into_iter().collect();

        let outcome = direct_install(
            PackageManager::Apt,
            &programs,
            &path,
            CommandLimits::default(),
            &mut Vec::new(),
        )
        .expect("install");

        assert_eq!(outcome, RunOutcome::Executed);
        assert_eq!(
            fs::read_to_string(&log).expect("log"),
            "apt update\napt install -y git curl\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn direct_install_stops_at_first_failure() {
        let bin = tempfile::tempdir().expect("tempdir");
        let log = bin.path().join("calls.log");
        fake_bin(bin.path(), "sudo", "exec \"$@\"\n");
        fake_bin(
            bin.path(),
            "apt",
            &format!(
                "if [ \"$1\" = update ]; then echo 'lock held' >&2; exit 100; fi\necho \"apt $*\" >> '{}'\n",
                log.display()
            ),
        );
        let path = SearchPath::new(vec![bin.path().to_path_buf()]);
        let programs: ProgramRequest = ["git"].into_iter().collect();

        let mut out = Vec::new();
        let outcome = direct_install(
            PackageManager::Apt,
            &programs,
            &path,
            CommandLimits::default(),
            &mut out,
        )
        .expect("install");

        let RunOutcome::ExecutionFailed { diagnostic } = &outcome else {
            panic!("expected execution failure, got {outcome:?}");
        };
        assert!(diagnostic.contains("status 100"), "{diagnostic}");
        assert_eq!(outcome.exit_code(), exit_codes::EXECUTION_FAILED);
        assert!(!log.exists());
        assert!(String::from_utf8_lossy(&out).contains("Error installing programs"));
    }
}
