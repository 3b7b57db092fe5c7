//! Generation pipeline: walk the model chain until one model returns text.

use tracing::{debug, info, instrument, warn};

use crate::core::backoff::{RetryBudget, RetryPolicy};
use crate::core::events::PipelineEvent;
use crate::core::prompt;
use crate::core::types::{GenerationContext, ModelCandidate};
use crate::io::completion::CompletionClient;
use crate::io::sleeper::Sleeper;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Every model in the effective plan was tried without usable output.
    #[error("no model produced playbook content after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("failed to build prompt: {0:#}")]
    Prompt(anyhow::Error),
}

/// Drop candidates whose provider cannot be reached, reporting each one.
fn effective_plan<C, F>(chain: &[ModelCandidate], client: &C, on_event: &mut F) -> Vec<ModelCandidate>
where
    C: CompletionClient + ?Sized,
    F: FnMut(&PipelineEvent),
{
    chain
        .iter()
        .filter(|candidate| {
            let available = client.has_provider(candidate.provider);
            if !available {
                debug!(model = %candidate, "provider unavailable, skipping");
                on_event(&PipelineEvent::FallbackSkipped {
                    model: (*candidate).clone(),
                });
            }
            available
        })
        .cloned()
        .collect()
}

/// Request a playbook for `ctx`, trying each candidate in `chain` in order.
///
/// Each model gets at most `policy.max_retries_per_model` calls with its own
/// backoff schedule. Empty text and faults both count as failed attempts. A
/// sleep happens only when another call follows. The first non-empty answer
/// is returned unchanged.
#[instrument(skip_all, fields(models = chain.len(), repair = ctx.is_repair()))]
pub fn generate<C, S, F>(
    ctx: &GenerationContext,
    chain: &[ModelCandidate],
    client: &C,
    policy: &RetryPolicy,
    sleeper: &S,
    mut on_event: F,
) -> Result<String, GenerationError>
where
    C: CompletionClient + ?Sized,
    S: Sleeper + ?Sized,
    F: FnMut(&PipelineEvent),
{
    let prompt = prompt::build(ctx).map_err(GenerationError::Prompt)?;
    let plan = effective_plan(chain, client, &mut on_event);

    let mut calls = 0u32;
    for (index, model) in plan.iter().enumerate() {
        let last_model = index + 1 == plan.len();
        on_event(&PipelineEvent::ModelStarted {
            model: model.clone(),
        });

        let mut budget = RetryBudget::new(policy.max_retries_per_model);
        let mut delays = policy.delays();
        while let Some(attempt) = budget.take() {
            calls += 1;
            let result = client.complete(model, &prompt);
            let backoff = if budget.remaining() > 0 || !last_model {
                delays.next()
            } else {
                None
            };

            match result {
                Ok(text) if !text.trim().is_empty() => {
                    info!(model = %model, attempt, calls, "completion succeeded");
                    on_event(&PipelineEvent::CompletionSucceeded {
                        model: model.clone(),
                        attempt,
                    });
                    return Ok(text);
                }
                Ok(_) => {
                    warn!(model = %model, attempt, "empty completion");
                    on_event(&PipelineEvent::CompletionEmpty {
                        model: model.clone(),
                        attempt,
                        backoff,
                    });
                }
                Err(err) => {
                    warn!(model = %model, attempt, err = %err, "completion failed");
                    on_event(&PipelineEvent::CompletionFault {
                        model: model.clone(),
                        attempt,
                        error: err.to_string(),
                        backoff,
                    });
                }
            }

            if let Some(delay) = backoff {
                sleeper.sleep(delay);
            }
        }
    }

    on_event(&PipelineEvent::GenerationExhausted { attempts: calls });
    Err(GenerationError::Exhausted { attempts: calls })
}
