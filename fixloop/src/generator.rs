//! Program generation from a task and the previous failure.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::fences::strip_code_fences;
use crate::io::llm::ChatModel;
use crate::io::prompt::PromptBuilder;

/// Abstraction over program generators.
pub trait Generator {
    /// Produce program text for `task`. `error` is the previous execution's
    /// feedback, absent on the first attempt.
    fn generate(&self, task: &str, error: Option<&str>) -> Result<String>;
}

/// Generator backed by a single chat-model request per attempt.
pub struct LlmGenerator<M> {
    model: M,
    prompts: PromptBuilder,
}

impl<M: ChatModel> LlmGenerator<M> {
    pub fn new(model: M, prompts: PromptBuilder) -> Self {
        Self { model, prompts }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: ChatModel> Generator for LlmGenerator<M> {
    #[instrument(skip_all, fields(has_error = error.is_some()))]
    fn generate(&self, task: &str, error: Option<&str>) -> Result<String> {
        let request = self.prompts.build(task, error)?;
        let raw = self.model.complete(&request).context("request program from model")?;
        let code = strip_code_fences(&raw);
        debug!(raw_bytes = raw.len(), code_bytes = code.len(), "generated program");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::llm::{ModelErrorKind, ModelRequestError};
    use crate::test_support::ScriptedModel;

    fn generator(model: ScriptedModel) -> LlmGenerator<ScriptedModel> {
        LlmGenerator::new(model, PromptBuilder::new("Python").expect("prompts"))
    }

    #[test]
    fn strips_fences_from_model_output() {
        let generator = generator(ScriptedModel::new(vec![Ok(
            "```python\nprint('hi')\n```\n".to_string(),
        )]));

        let code = generator.generate("say hi", None).expect("generate");
        assert_eq!(code, "print('hi')");
        generator.model().assert_drained().expect("drained");
    }

    #[test]
    fn sends_previous_error_to_model() {
        let generator = generator(ScriptedModel::new(vec![Ok("print(1)".to_string())]));

        generator
            .generate("divide", Some("ZeroDivisionError: division by zero"))
            .expect("generate");

        let requests = generator.model().requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].user.contains("Task: divide"));
        assert!(
            requests[0]
                .user
                .contains("Previous Error:\nZeroDivisionError: division by zero")
        );
        assert!(requests[0].system.contains("Python"));
    }

    #[test]
    fn model_failure_is_propagated() {
        let generator = generator(ScriptedModel::new(vec![Err(ModelRequestError {
            kind: ModelErrorKind::Auth,
            status: Some(401),
            message: "invalid api key".to_string(),
        })]));

        let err = generator.generate("task", None).unwrap_err();
        assert!(format!("{err:#}").contains("invalid api key"));
        let inner = err.downcast_ref::<ModelRequestError>().expect("typed error");
        assert_eq!(inner.kind, ModelErrorKind::Auth);
    }
}
