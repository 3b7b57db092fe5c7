//! Installer configuration stored in `installer.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::backoff::RetryPolicy;
use crate::core::programs::Normalization;
use crate::core::types::ModelCandidate;
use crate::io::process::{CommandLimits, DEFAULT_OUTPUT_LIMIT_BYTES};

pub const DEFAULT_CONFIG_PATH: &str = "installer.toml";

/// Installer configuration (TOML).
///
/// Every section is optional; missing fields fall back to the defaults the
/// tool ships with. Built once at startup and passed by reference from then on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallerConfig {
    pub completion: CompletionConfig,
    pub retry: RetryPolicy,
    pub repair: RepairConfig,
    pub playbook: PlaybookConfig,
    pub programs: Normalization,
    pub process: ProcessConfig,
    pub bootstrap: BootstrapConfig,
}

/// One OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL including the API version segment (e.g. `.../v1`).
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.aimlapi.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Primary models, tried in order.
    pub models: Vec<String>,
    /// The single model tried on the fallback endpoint. Empty disables it.
    pub fallback_model: String,
    pub primary: EndpointConfig,
    pub fallback: EndpointConfig,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            models: vec!["gpt-4o-mini".to_string(), "gpt-5-2025-08-07".to_string()],
            fallback_model: "gpt5-mini".to_string(),
            primary: EndpointConfig::default(),
            fallback: EndpointConfig {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                api_key_env: "OPENROUTER_API_KEY".to_string(),
                request_timeout_secs: 120,
            },
        }
    }
}

impl CompletionConfig {
    /// Primary models in order, followed by the fallback model if any.
    pub fn model_chain(&self) -> Vec<ModelCandidate> {
        let mut chain: Vec<ModelCandidate> = self
            .models
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(ModelCandidate::primary)
            .collect();
        if !self.fallback_model.trim().is_empty() {
            chain.push(ModelCandidate::fallback(self.fallback_model.trim()));
        }
        chain
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairConfig {
    /// Regenerations allowed after failed syntax checks.
    pub max_attempts: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaybookConfig {
    /// Artifact path, overwritten on every generation and repair.
    pub path: PathBuf,
    /// Executable used for both syntax checks and runs.
    pub command: String,
    pub syntax_check_args: Vec<String>,
    pub run_args: Vec<String>,
    /// Inventory passed as `-i <path>`. The `--inventory` flag overrides it.
    pub inventory: Option<PathBuf>,
    /// Example playbook embedded in create prompts.
    pub template_path: Option<PathBuf>,
    /// Embed the bundled example playbook when no `template_path` is set.
    pub use_builtin_example: bool,
    /// Description of the machines the playbook targets.
    pub target_description: String,
}

impl Default for PlaybookConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ansible_playbook.yml"),
            command: "ansible-playbook".to_string(),
            syntax_check_args: vec!["--syntax-check".to_string(), "-v".to_string()],
            run_args: vec!["-v".to_string()],
            inventory: None,
            template_path: None,
            use_builtin_example: false,
            target_description: "multiple operating systems (Debian, RedHat, Darwin, Windows)"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Kill external commands after this many seconds. Unset waits forever.
    pub command_timeout_secs: Option<u64>,
    pub output_limit_bytes: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl ProcessConfig {
    pub fn limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: self.command_timeout_secs.map(Duration::from_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Python interpreter used for pip.
    pub python: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            python: if cfg!(windows) { "python" } else { "python3" }.to_string(),
        }
    }
}

impl InstallerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.completion.models.iter().all(|m| m.trim().is_empty()) {
            return Err(anyhow!("completion.models must name at least one model"));
        }
        if self.completion.primary.base_url.trim().is_empty() {
            return Err(anyhow!("completion.primary.base_url must be non-empty"));
        }
        if self.completion.primary.api_key_env.trim().is_empty() {
            return Err(anyhow!("completion.primary.api_key_env must be non-empty"));
        }
        if !self.completion.fallback_model.trim().is_empty()
            && self.completion.fallback.api_key_env.trim().is_empty()
        {
            return Err(anyhow!(
                "completion.fallback.api_key_env must be set when fallback_model is"
            ));
        }
        if self.retry.max_retries_per_model == 0 {
            return Err(anyhow!("retry.max_retries_per_model must be > 0"));
        }
        if self.repair.max_attempts == 0 {
            return Err(anyhow!("repair.max_attempts must be > 0"));
        }
        if self.playbook.command.trim().is_empty() {
            return Err(anyhow!("playbook.command must be non-empty"));
        }
        if self.playbook.path.as_os_str().is_empty() {
            return Err(anyhow!("playbook.path must be non-empty"));
        }
        if self.process.output_limit_bytes == 0 {
            return Err(anyhow!("process.output_limit_bytes must be > 0"));
        }
        if self.process.command_timeout_secs == Some(0) {
            return Err(anyhow!("process.command_timeout_secs must be > 0 when set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `InstallerConfig::default()`.
pub fn load_config(path: &Path) -> Result<InstallerConfig> {
    if !path.exists() {
        let cfg = InstallerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: InstallerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &InstallerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
