//! Prompt construction for playbook generation and repair.
//!
//! Rendering is pure: identical [`GenerationContext`] values always produce
//! identical prompt text.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::GenerationContext;

const CREATE_TEMPLATE: &str = include_str!("prompts/create.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const OUTPUT_RULES_TEMPLATE: &str = include_str!("prompts/output_rules.md");

/// Example playbook shipped with the binary, usable as a structural template.
pub const EXAMPLE_PLAYBOOK: &str = include_str!("prompts/example_playbook.yml");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("create", CREATE_TEMPLATE)
            .context("load create prompt template")?;
        env.add_template("fix", FIX_TEMPLATE)
            .context("load fix prompt template")?;
        env.add_template("output_rules", OUTPUT_RULES_TEMPLATE)
            .context("load output rules template")?;
        Ok(Self { env })
    }

    fn render_create(&self, ctx: &GenerationContext) -> Result<String> {
        let template = self.env.get_template("create")?;
        let rendered = template.render(context! {
            target => ctx.target_description.trim(),
            programs => ctx.programs.joined(),
            template => ctx.template.as_deref().filter(|t| !t.trim().is_empty()),
        })?;
        Ok(rendered)
    }

    fn render_fix(&self, ctx: &GenerationContext, error: &str) -> Result<String> {
        let template = self.env.get_template("fix")?;
        let rendered = template.render(context! {
            target => ctx.target_description.trim(),
            programs => ctx.programs.joined(),
            error => error,
            previous => ctx.prior_content.as_deref().unwrap_or_default(),
        })?;
        Ok(rendered)
    }
}

/// Render the instruction for `ctx`: a fix prompt when a prior error is
/// present, otherwise a create prompt.
pub fn build(ctx: &GenerationContext) -> Result<String> {
    let engine = PromptEngine::new()?;
    match ctx.prior_error.as_deref() {
        Some(error) => engine.render_fix(ctx, error).context("render fix prompt"),
        None => engine.render_create(ctx).context("render create prompt"),
    }
}
