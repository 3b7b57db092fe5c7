//! Operator-facing status events emitted by the pipeline.
//!
//! Events are product output, not tracing: the binary prints each one as a
//! single human-readable line (or block) via `Display`. Tests collect them to
//! assert on transitions without scraping stdout.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::types::ModelCandidate;

/// Longest diagnostic excerpt included in a status line.
pub const DIAGNOSTIC_EXCERPT_CHARS: usize = 4_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ModelStarted {
        model: ModelCandidate,
    },
    CompletionFault {
        model: ModelCandidate,
        attempt: u32,
        error: String,
        backoff: Option<Duration>,
    },
    CompletionEmpty {
        model: ModelCandidate,
        attempt: u32,
        backoff: Option<Duration>,
    },
    CompletionSucceeded {
        model: ModelCandidate,
        attempt: u32,
    },
    FallbackSkipped {
        model: ModelCandidate,
    },
    GenerationExhausted {
        attempts: u32,
    },
    ArtifactWritten {
        path: PathBuf,
        content: String,
    },
    ValidationStarted {
        check: u32,
    },
    ValidationPassed {
        output: String,
    },
    ValidationFailed {
        diagnostic: String,
    },
    FencesStripped {
        charged: bool,
    },
    Regenerating {
        attempt: u32,
        max_attempts: u32,
    },
    RepairExhausted {
        attempts: u32,
    },
    ExecutionStarted,
    ExecutionSucceeded,
    ExecutionFailed {
        diagnostic: String,
    },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelStarted { model } => {
                write!(f, "Attempting to generate playbook with model: {model}")
            }
            Self::CompletionFault {
                model,
                attempt,
                error,
                backoff,
            } => write!(
                f,
                "An error occurred with model {model} (attempt {attempt}): {error}.{}",
                retry_suffix(*backoff)
            ),
            Self::CompletionEmpty {
                model,
                attempt,
                backoff,
            } => write!(
                f,
                "Warning: model {model} returned empty content (attempt {attempt}).{}",
                retry_suffix(*backoff)
            ),
            Self::CompletionSucceeded { model, attempt } => write!(
                f,
                "Successfully generated playbook with model: {model} (attempt {attempt})"
            ),
            Self::FallbackSkipped { model } => write!(
                f,
                "Warning: fallback credential not set. Skipping fallback model {model}."
            ),
            Self::GenerationExhausted { attempts } => write!(
                f,
                "Failed to generate playbook with all models and fallbacks ({attempts} attempts)."
            ),
            Self::ArtifactWritten { path, content } => write!(
                f,
                "Playbook written to {}:\n===================\n{}\n===================",
                path.display(),
                content
            ),
            Self::ValidationStarted { check } => {
                write!(f, "Check {check}: checking playbook syntax...")
            }
            Self::ValidationPassed { output } => {
                if output.trim().is_empty() {
                    write!(f, "Syntax check passed.")
                } else {
                    write!(
                        f,
                        "Syntax check output:\n{}\nSyntax check passed.",
                        excerpt(output.trim_end(), DIAGNOSTIC_EXCERPT_CHARS)
                    )
                }
            }
            Self::ValidationFailed { diagnostic } => write!(
                f,
                "Syntax check failed:\n{}",
                excerpt(diagnostic.trim_end(), DIAGNOSTIC_EXCERPT_CHARS)
            ),
            Self::FencesStripped { charged: false } => write!(
                f,
                "Detected code block fences. Removing them and retrying syntax check."
            ),
            Self::FencesStripped { charged: true } => write!(
                f,
                "Detected the same fenced playbook again. Removing fences and charging a repair attempt."
            ),
            Self::Regenerating {
                attempt,
                max_attempts,
            } => write!(
                f,
                "Attempting to fix the playbook by regenerating ({attempt}/{max_attempts})..."
            ),
            Self::RepairExhausted { attempts } => write!(
                f,
                "Failed to fix playbook after {attempts} repair attempts."
            ),
            Self::ExecutionStarted => write!(f, "Running the playbook..."),
            Self::ExecutionSucceeded => write!(f, "Playbook executed successfully."),
            Self::ExecutionFailed { diagnostic } => write!(
                f,
                "Error running playbook: {}",
                excerpt(diagnostic.trim_end(), DIAGNOSTIC_EXCERPT_CHARS)
            ),
        }
    }
}

fn retry_suffix(backoff: Option<Duration>) -> String {
    match backoff {
        Some(delay) => format!(" Retrying after {} seconds...", delay.as_secs()),
        None => String::new(),
    }
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n[... {} bytes omitted]", &text[..cut], text.len() - cut),
        None => text.to_string(),
    }
}
