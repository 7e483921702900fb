//! Prompt builder for generation requests.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::io::llm::ChatRequest;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const USER_TEMPLATE: &str = include_str!("prompts/user.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("user", USER_TEMPLATE)
            .context("load user template")?;
        Ok(Self { env })
    }

    fn render_system(&self, language: &str) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template.render(context! { language => language.trim() })?;
        Ok(rendered.trim().to_string())
    }

    fn render_user(&self, task: &str, error: Option<&str>) -> Result<String> {
        let template = self.env.get_template("user")?;
        let rendered = template.render(context! {
            task => task.trim(),
            error => error.map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered.trim().to_string())
    }
}

/// Builds the system/user message pair for one generation attempt.
pub struct PromptBuilder {
    engine: PromptEngine,
    language: String,
}

impl PromptBuilder {
    /// Create a builder for programs written in `language` (e.g. "Python").
    pub fn new(language: impl Into<String>) -> Result<Self> {
        Ok(Self {
            engine: PromptEngine::new()?,
            language: language.into(),
        })
    }

    /// Build the request for `task`, embedding the previous execution error when present.
    pub fn build(&self, task: &str, error: Option<&str>) -> Result<ChatRequest> {
        Ok(ChatRequest {
            system: self
                .engine
                .render_system(&self.language)
                .context("render system prompt")?,
            user: self
                .engine
                .render_user(task, error)
                .context("render user prompt")?,
        })
    }
}
