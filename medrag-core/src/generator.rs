//! Answer generation: fills the prompt template and calls the chat model.

use std::sync::Arc;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::RagError;
use crate::providers::LlmProvider;
use crate::types::{CompletionRequest, Message, Question};

pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl std::fmt::Debug for AnswerGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerGenerator")
            .field("model", &self.llm.model_name())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            llm,
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Assemble the two-message prompt.
    ///
    /// The system message is the instruction followed by a blank line and the
    /// context; the user message is the question on its own.
    pub fn build_messages(&self, question: &Question, context: &str) -> Vec<Message> {
        vec![
            Message::system(format!("{}\n\n{}", self.system_prompt, context)),
            Message::user(question.as_str()),
        ]
    }

    /// Ask the model and return its text unmodified.
    pub async fn generate(&self, question: &Question, context: &str) -> Result<String, RagError> {
        let request = CompletionRequest {
            messages: self.build_messages(question, context),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = self.llm.complete(request).await?;
        debug!(
            model = response.model.as_str(),
            tokens = response.usage.total(),
            "Generated answer"
        );
        Ok(response.text)
    }
}
