use fixloop_llm::{LlmClient, Request, Response};
use fixloop_tools::ToolRegistry;
use fixloop_types::Result;

use crate::conversation::ConversationBuffer;
use crate::retry::{execute_with_retry, BackoffPolicy};

/// Turns the active conversation into one model response.
pub struct ModelCaller {
    client: LlmClient,
    model: String,
    max_retries: usize,
    backoff: BackoffPolicy,
}

impl ModelCaller {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_retries(mut self, max_retries: usize, backoff: BackoffPolicy) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model for the next response, offering the tools in `tools`.
    pub async fn invoke(
        &self,
        conversation: &ConversationBuffer,
        tools: &ToolRegistry,
        label: &str,
    ) -> Result<Response> {
        let request =
            Request::new(&self.model, conversation.to_messages()).with_tools(tools.definitions());
        execute_with_retry(
            || self.client.complete(&request),
            self.max_retries,
            &self.backoff,
            label,
        )
        .await
    }
}
