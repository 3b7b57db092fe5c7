//! Shared deterministic types for the playbook pipeline.
//!
//! These types define stable contracts between components. They carry no I/O
//! and are cheap to clone; each generation attempt builds a fresh
//! [`GenerationContext`] rather than mutating an old one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host operating systems the installer knows how to bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

impl Platform {
    /// Map an OS name (as reported by `std::env::consts::OS`) to a platform.
    pub fn from_os_name(name: &str) -> Option<Self> {
        match name {
            "linux" => Some(Self::Linux),
            "macos" | "darwin" => Some(Self::Darwin),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }

    /// Ansible cannot act as a control machine on Windows.
    pub fn supports_ansible_control(self) -> bool {
        !matches!(self, Self::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of program names requested by the operator.
///
/// Names keep the case and order they were given in; normalization is an explicit,
/// separate step (see [`crate::core::programs::normalize`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramRequest(Vec<String>);

impl ProgramRequest {
    pub fn new(programs: Vec<String>) -> Self {
        Self(programs)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Comma-joined program list in request order.
    pub fn joined(&self) -> String {
        self.0.join(", ")
    }
}

impl<S: Into<String>> FromIterator<S> for ProgramRequest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Everything the prompt builder needs to render one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationContext {
    pub target_description: String,
    pub programs: ProgramRequest,
    /// Diagnostic from the previous syntax check. Present only when repairing.
    pub prior_error: Option<String>,
    /// Artifact content that produced `prior_error`.
    pub prior_content: Option<String>,
    /// Example playbook embedded verbatim in create prompts.
    pub template: Option<String>,
}

impl GenerationContext {
    pub fn create(target_description: impl Into<String>, programs: ProgramRequest) -> Self {
        Self {
            target_description: target_description.into(),
            programs,
            prior_error: None,
            prior_content: None,
            template: None,
        }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    /// Derive the context for a repair attempt from a failed artifact.
    pub fn for_repair(&self, diagnostic: &str, failed_content: &str) -> Self {
        Self {
            prior_error: Some(diagnostic.to_string()),
            prior_content: Some(failed_content.to_string()),
            ..self.clone()
        }
    }

    pub fn is_repair(&self) -> bool {
        self.prior_error.is_some()
    }
}

/// Which completion endpoint serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Primary,
    Fallback,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// One entry in the model chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub provider: Provider,
    pub model_id: String,
}

impl ModelCandidate {
    pub fn primary(model_id: impl Into<String>) -> Self {
        Self {
            provider: Provider::Primary,
            model_id: model_id.into(),
        }
    }

    pub fn fallback(model_id: impl Into<String>) -> Self {
        Self {
            provider: Provider::Fallback,
            model_id: model_id.into(),
        }
    }
}

impl fmt::Display for ModelCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.provider {
            Provider::Primary => f.write_str(&self.model_id),
            Provider::Fallback => write!(f, "{} (fallback)", self.model_id),
        }
    }
}

/// Outcome of one syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub passed: bool,
    /// Checker output on failure. Always `None` when `passed`.
    pub diagnostic: Option<String>,
    /// Raw checker output, kept for display even on success.
    pub output: String,
}

impl ValidationResult {
    pub fn pass(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            diagnostic: None,
            output: output.into(),
        }
    }

    pub fn fail(diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        Self {
            passed: false,
            output: diagnostic.clone(),
            diagnostic: Some(diagnostic),
        }
    }
}

/// Outcome of running the validated playbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub diagnostic: Option<String>,
}

impl ExecutionResult {
    pub fn success() -> Self {
        Self {
            success: true,
            diagnostic: None,
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_maps_rust_os_names() {
        assert_eq!(Platform::from_os_name("macos"), Some(Platform::Darwin));
        assert_eq!(Platform::from_os_name("linux"), Some(Platform::Linux));
        assert_eq!(Platform::from_os_name("windows"), Some(Platform::Windows));
        assert_eq!(Platform::from_os_name("freebsd"), None);
    }

    #[test]
    fn repair_context_keeps_programs_and_target() {
        let ctx = GenerationContext::create("linux hosts", ["git", "vlc"].into_iter().collect())
            .with_template(Some("---".to_string()));
        let repair = ctx.for_repair("bad indent", "- hosts: all");

        assert!(repair.is_repair());
        assert_eq!(repair.programs, ctx.programs);
        assert_eq!(repair.target_description, "linux hosts");
        assert_eq!(repair.prior_error.as_deref(), Some("bad indent"));
        assert_eq!(repair.prior_content.as_deref(), Some("- hosts: all"));
        assert!(!ctx.is_repair());
    }

    #[test]
    fn fallback_candidate_display_is_marked() {
        assert_eq!(ModelCandidate::primary("m1").to_string(), "m1");
        assert_eq!(
            ModelCandidate::fallback("m2").to_string(),
            "m2 (fallback)"
        );
    }
}
