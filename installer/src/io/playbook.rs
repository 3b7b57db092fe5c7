//! `ansible-playbook` adapter: syntax checks and the final run.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::{ExecutionResult, ValidationResult};
use crate::io::artifact::SyntaxChecker;
use crate::io::config::PlaybookConfig;
use crate::io::process::{CommandLimits, describe, run_checked, run_command};

/// Runs the validated playbook once. No retries.
pub trait PlaybookRunner {
    fn run(&self, path: &Path) -> Result<ExecutionResult>;
}

/// Invokes the configured playbook executable.
#[derive(Debug, Clone)]
pub struct AnsiblePlaybook {
    program: String,
    syntax_check_args: Vec<String>,
    run_args: Vec<String>,
    inventory: Option<PathBuf>,
    limits: CommandLimits,
}

impl AnsiblePlaybook {
    /// `inventory` overrides the inventory from `cfg` when present.
    pub fn from_config(cfg: &PlaybookConfig, inventory: Option<&Path>, limits: CommandLimits) -> Self {
        Self {
            program: cfg.command.clone(),
            syntax_check_args: cfg.syntax_check_args.clone(),
            run_args: cfg.run_args.clone(),
            inventory: inventory
                .map(Path::to_path_buf)
                .or_else(|| cfg.inventory.clone()),
            limits,
        }
    }

    /// `<program> <path> <syntax args...> [-i <inventory>]`
    pub fn syntax_check_command(&self, path: &Path) -> Command {
        self.command(path, &self.syntax_check_args)
    }

    /// `<program> <path> <run args...> [-i <inventory>]`
    pub fn run_command(&self, path: &Path) -> Command {
        self.command(path, &self.run_args)
    }

    fn command(&self, path: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(path).args(args);
        if let Some(inventory) = &self.inventory {
            cmd.arg("-i").arg(inventory);
        }
        cmd
    }
}

impl SyntaxChecker for AnsiblePlaybook {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn check(&self, path: &Path) -> Result<ValidationResult> {
        let output = run_command(self.syntax_check_command(path), self.limits)?;
        let text = output.combined();
        if output.timed_out {
            warn!("syntax check timed out");
            return Ok(ValidationResult::fail(format!(
                "syntax check timed out\n{text}"
            )));
        }
        if output.status.success() {
            Ok(ValidationResult::pass(text))
        } else {
            Ok(ValidationResult::fail(text))
        }
    }
}

impl PlaybookRunner for AnsiblePlaybook {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn run(&self, path: &Path) -> Result<ExecutionResult> {
        let cmd = self.run_command(path);
        info!(command = %describe(&cmd), "running playbook");
        match run_checked(cmd, self.limits, true) {
            Ok(_) => Ok(ExecutionResult::success()),
            Err(err) => {
                warn!(err = %err, "playbook run failed");
                Ok(ExecutionResult::failure(format!("{err:#}")))
            }
        }
    }
}
