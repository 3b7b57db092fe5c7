//! Validate-and-repair loop for generated playbooks.
//!
//! The loop is an explicit state machine. Fence stripping is free the first
//! time a given raw content is seen; every regeneration (and any repeated
//! strip of the same content) spends one unit of the repair budget.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::backoff::{RetryBudget, RetryPolicy};
use crate::core::events::PipelineEvent;
use crate::core::fence::strip_fences;
use crate::core::types::{GenerationContext, ModelCandidate};
use crate::generate::{GenerationError, generate};
use crate::io::artifact::{Artifact, SyntaxChecker, validate};
use crate::io::completion::CompletionClient;
use crate::io::sleeper::Sleeper;

/// Inputs that stay fixed for the whole repair loop.
#[derive(Debug, Clone, Copy)]
pub struct RepairRequest<'a> {
    /// Context the initial content was generated from.
    pub context: &'a GenerationContext,
    pub chain: &'a [ModelCandidate],
    pub retry: &'a RetryPolicy,
    /// Repair budget (regenerations plus charged strips).
    pub max_attempts: u32,
    pub artifact: &'a Artifact,
}

pub struct RepairDeps<'a, C: ?Sized, K: ?Sized, S: ?Sized> {
    pub client: &'a C,
    pub checker: &'a K,
    pub sleeper: &'a S,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// `content` passed the syntax check and is what the artifact holds.
    Passed { content: String, regenerations: u32 },
    /// The budget ran out while the artifact still failed validation.
    Exhausted {
        diagnostic: String,
        regenerations: u32,
    },
    /// A regeneration produced no content at all.
    GenerationFailed {
        diagnostic: String,
        regenerations: u32,
    },
}

#[derive(Debug)]
enum RepairState {
    Validating,
    Stripping(String),
    Regenerating,
    Passed,
    Exhausted,
}

/// Write `initial` to the artifact and drive it to a passing syntax check.
#[instrument(skip_all, fields(path = %request.artifact.path().display(), max_attempts = request.max_attempts))]
pub fn repair_until_valid<C, K, S, F>(
    initial: String,
    request: &RepairRequest<'_>,
    deps: &RepairDeps<'_, C, K, S>,
    mut on_event: F,
) -> Result<RepairOutcome>
where
    C: CompletionClient + ?Sized,
    K: SyntaxChecker + ?Sized,
    S: Sleeper + ?Sized,
    F: FnMut(&PipelineEvent),
{
    let mut budget = RetryBudget::new(request.max_attempts);
    let mut stripped_before: HashSet<String> = HashSet::new();
    let mut content = initial;
    let mut diagnostic = String::new();
    let mut regenerations = 0u32;
    let mut checks = 0u32;
    let mut state = RepairState::Validating;

    loop {
        debug!(?state, attempts_made = budget.attempts_made(), "repair state");
        state = match state {
            RepairState::Validating => {
                checks += 1;
                on_event(&PipelineEvent::ValidationStarted { check: checks });
                let result = validate(&content, request.artifact, deps.checker)?;
                on_event(&PipelineEvent::ArtifactWritten {
                    path: request.artifact.path().to_path_buf(),
                    content: content.clone(),
                });
                if result.passed {
                    on_event(&PipelineEvent::ValidationPassed {
                        output: result.output,
                    });
                    RepairState::Passed
                } else {
                    diagnostic = result.diagnostic.unwrap_or(result.output);
                    on_event(&PipelineEvent::ValidationFailed {
                        diagnostic: diagnostic.clone(),
                    });
                    match strip_fences(&content) {
                        Some(stripped) => RepairState::Stripping(stripped),
                        None if budget.remaining() > 0 => RepairState::Regenerating,
                        None => RepairState::Exhausted,
                    }
                }
            }
            RepairState::Stripping(stripped) => {
                let free = stripped_before.insert(content.clone());
                if free || budget.take().is_some() {
                    on_event(&PipelineEvent::FencesStripped { charged: !free });
                    content = stripped;
                    RepairState::Validating
                } else {
                    RepairState::Exhausted
                }
            }
            RepairState::Regenerating => match budget.take() {
                None => RepairState::Exhausted,
                Some(attempt) => {
                    regenerations += 1;
                    on_event(&PipelineEvent::Regenerating {
                        attempt,
                        max_attempts: budget.max_attempts(),
                    });
                    let ctx = request.context.for_repair(&diagnostic, &content);
                    match generate(
                        &ctx,
                        request.chain,
                        deps.client,
                        request.retry,
                        deps.sleeper,
                        &mut on_event,
                    ) {
                        Ok(next) => {
                            content = next;
                            RepairState::Validating
                        }
                        Err(GenerationError::Exhausted { attempts }) => {
                            warn!(attempts, "regeneration produced no content");
                            return Ok(RepairOutcome::GenerationFailed {
                                diagnostic,
                                regenerations,
                            });
                        }
                        Err(err @ GenerationError::Prompt(_)) => return Err(err.into()),
                    }
                }
            },
            RepairState::Passed => {
                info!(regenerations, checks, "playbook passed syntax check");
                return Ok(RepairOutcome::Passed {
                    content,
                    regenerations,
                });
            }
            RepairState::Exhausted => {
                warn!(regenerations, checks, "repair budget exhausted");
                on_event(&PipelineEvent::RepairExhausted {
                    attempts: budget.attempts_made(),
                });
                return Ok(RepairOutcome::Exhausted {
                    diagnostic,
                    regenerations,
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ProgramRequest, ValidationResult};
    use crate::test_support::{
        RecordingSleeper, ScriptedCompletionClient, ScriptedSyntaxChecker, empty, ok,
        temp_artifact,
    };

    struct Fixture {
        _temp: tempfile::TempDir,
        artifact: Artifact,
        context: GenerationContext,
        chain: Vec<ModelCandidate>,
        retry: RetryPolicy,
    }

    impl Fixture {
        fn new() -> Self {
            let (temp, artifact) = temp_artifact().expect("artifact");
            Self {
                _temp: temp,
                artifact,
                context: GenerationContext::create(
                    "Debian hosts",
                    ["git"].into_iter().collect::<ProgramRequest>(),
                ),
                chain: vec![ModelCandidate::primary("m1")],
                retry: RetryPolicy::default(),
            }
        }

        fn request(&self, max_attempts: u32) -> RepairRequest<'_> {
            RepairRequest {
                context: &self.context,
                chain: &self.chain,
                retry: &self.retry,
                max_attempts,
                artifact: &self.artifact,
            }
        }
    }

    fn run(
        fixture: &Fixture,
        initial: &str,
        client: &ScriptedCompletionClient,
        checker: &ScriptedSyntaxChecker,
        events: &mut Vec<PipelineEvent>,
    ) -> RepairOutcome {
        let sleeper = RecordingSleeper::new();
        let deps = RepairDeps {
            client,
            checker,
            sleeper: &sleeper,
        };
        repair_until_valid(initial.to_string(), &fixture.request(3), &deps, |e| {
            events.push(e.clone());
        })
        .expect("repair")
    }

    #[test]
    fn passing_content_is_left_on_disk_untouched() {
        let fixture = Fixture::new();
        let client = ScriptedCompletionClient::new(Vec::new());
        let checker = ScriptedSyntaxChecker::new(vec![ValidationResult::pass("ok")]);
        let outcome = run(&fixture, "- hosts: all\n", &client, &checker, &mut Vec::new());

        assert_eq!(
            outcome,
            RepairOutcome::Passed {
                content: "- hosts: all\n".to_string(),
                regenerations: 0
            }
        );
        assert_eq!(fixture.artifact.read().expect("read"), "- hosts: all\n");
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn fenced_content_is_stripped_without_spending_budget() {
        let fixture = Fixture::new();
        let client = ScriptedCompletionClient::new(Vec::new());
        let checker = ScriptedSyntaxChecker::new(vec![
            ValidationResult::fail("ERROR! fences"),
            ValidationResult::pass("ok"),
        ]);
        let mut events = Vec::new();
        let outcome = run(&fixture, "```yaml\nfoo\n```", &client, &checker, &mut events);

        assert_eq!(
            outcome,
            RepairOutcome::Passed {
                content: "foo".to_string(),
                regenerations: 0
            }
        );
        assert_eq!(fixture.artifact.read().expect("read"), "foo");
        assert_eq!(checker.checked_contents(), vec!["```yaml\nfoo\n```", "foo"]);
        assert_eq!(client.call_count(), 0);
        assert!(events.contains(&PipelineEvent::FencesStripped { charged: false }));
    }

    #[test]
    fn every_failure_spends_one_regeneration_until_exhausted() {
        let fixture = Fixture::new();
        let client = ScriptedCompletionClient::new(vec![ok("v2"), ok("v3"), ok("v4")]);
        let checker = ScriptedSyntaxChecker::new(vec![
            ValidationResult::fail("initial"),
            ValidationResult::fail("regeneration 1"),
            ValidationResult::fail("regeneration 2"),
            ValidationResult::fail("regeneration 3"),
        ]);
        let mut events = Vec::new();
        let outcome = run(&fixture, "v1", &client, &checker, &mut events);

        assert_eq!(
            outcome,
            RepairOutcome::Exhausted {
                diagnostic: "regeneration 3".to_string(),
                regenerations: 3
            }
        );
        assert_eq!(client.call_count(), 3);
        assert_eq!(checker.checked_contents(), vec!["v1", "v2", "v3", "v4"]);
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::RepairExhausted { attempts: 3 })
        );
    }

    #[test]
    fn regeneration_prompt_carries_previous_failure() {
        let fixture = Fixture::new();
        let client = ScriptedCompletionClient::new(vec![ok("v2")]);
        let checker = ScriptedSyntaxChecker::new(vec![
            ValidationResult::fail("ERROR! mapping values are not allowed"),
            ValidationResult::pass("ok"),
        ]);
        let outcome = run(&fixture, "v1: : bad", &client, &checker, &mut Vec::new());

        assert!(matches!(
            outcome,
            RepairOutcome::Passed { regenerations: 1, .. }
        ));
        let prompt = &client.prompts()[0];
        assert!(prompt.contains("ERROR! mapping values are not allowed"));
        assert!(prompt.contains("v1: : bad"));
    }

    #[test]
    fn repeated_fenced_content_spends_budget() {
        let fixture = Fixture::new();
        let fenced = "```\n- hosts: all\n```";
        let client = ScriptedCompletionClient::new(vec![ok(fenced)]);
        let checker = ScriptedSyntaxChecker::new(vec![
            ValidationResult::fail("fenced"),
            ValidationResult::fail("still bad"),
            ValidationResult::fail("fenced again"),
            ValidationResult::pass("ok"),
        ]);
        let mut events = Vec::new();
        let outcome = run(&fixture, fenced, &client, &checker, &mut events);

        // strip (free), regenerate (1), strip of the same text (2).
        assert_eq!(
            outcome,
            RepairOutcome::Passed {
                content: "- hosts: all".to_string(),
                regenerations: 1
            }
        );
        let strips: Vec<&PipelineEvent> = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::FencesStripped { .. }))
            .collect();
        assert_eq!(
            strips,
            vec![
                &PipelineEvent::FencesStripped { charged: false },
                &PipelineEvent::FencesStripped { charged: true },
            ]
        );
    }

    #[test]
    fn repeated_fenced_content_without_budget_exhausts() {
        let fixture = Fixture::new();
        let fenced = "```yaml\n- hosts: all\n```";
        let client = ScriptedCompletionClient::new(vec![ok(fenced)]);
        let checker = ScriptedSyntaxChecker::new(vec![
            ValidationResult::fail("fenced"),
            ValidationResult::fail("stripped but bad"),
            ValidationResult::fail("fenced again"),
        ]);
        let sleeper = RecordingSleeper::new();
        let deps = RepairDeps {
            client: &client,
            checker: &checker,
            sleeper: &sleeper,
        };
        let mut events = Vec::new();
        let outcome = repair_until_valid(fenced.to_string(), &fixture.request(1), &deps, |e| {
            events.push(e.clone());
        })
        .expect("repair");

        // strip (free), regenerate (1), same fenced text with nothing left.
        assert_eq!(
            outcome,
            RepairOutcome::Exhausted {
                diagnostic: "fenced again".to_string(),
                regenerations: 1
            }
        );
        assert_eq!(client.call_count(), 1);
        assert_eq!(checker.checked_contents(), vec![fenced, "- hosts: all", fenced]);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, PipelineEvent::FencesStripped { .. }))
                .count(),
            1
        );
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::RepairExhausted { .. })
        ));
    }

    #[test]
    fn empty_regeneration_ends_with_generation_failure() {
        let fixture = Fixture::new();
        let client = ScriptedCompletionClient::new(vec![empty(), empty(), empty()]);
        let checker = ScriptedSyntaxChecker::new(vec![ValidationResult::fail("bad yaml")]);
        let outcome = run(&fixture, "v1", &client, &checker, &mut Vec::new());

        assert_eq!(
            outcome,
            RepairOutcome::GenerationFailed {
                diagnostic: "bad yaml".to_string(),
                regenerations: 1
            }
        );
        assert_eq!(fixture.artifact.read().expect("read"), "v1");
    }

    #[test]
    fn zero_budget_reports_first_diagnostic() {
        let fixture = Fixture::new();
        let client = ScriptedCompletionClient::new(Vec::new());
        let checker = ScriptedSyntaxChecker::new(vec![ValidationResult::fail("only")]);
        let sleeper = RecordingSleeper::new();
        let deps = RepairDeps {
            client: &client,
            checker: &checker,
            sleeper: &sleeper,
        };
        let outcome =
            repair_until_valid("v1".to_string(), &fixture.request(0), &deps, |_| {}).expect("repair");
        assert_eq!(
            outcome,
            RepairOutcome::Exhausted {
                diagnostic: "only".to_string(),
                regenerations: 0
            }
        );
        assert_eq!(client.call_count(), 0);
    }
}
