//! LLM stage runner: one validated chat-completion call.

use std::sync::Arc;

use pipeline::{
    ChatRequest, CompletionPayload, Conversation, LlmProvider, ModelId, PipelineError,
    StageResult, UpstreamService,
};
use tracing::debug;

use crate::retry::{with_retry, RetryConfig};

/// Executes a single LLM request and extracts the reply text.
///
/// The reply is returned verbatim; any trimming or reshaping is the caller's
/// business.
#[derive(Clone)]
pub struct StageRunner {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
}

impl StageRunner {
    /// Creates a runner over `provider` with the given retry envelope.
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    /// Sends `conversation` to `model`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::UpstreamInvalidResponse`] when the body lacks a
    ///   non-empty `choices[0].message.content`.
    /// - [`PipelineError::UpstreamError`] for transport failures and for
    ///   throttling that outlasted the retry envelope.
    pub async fn run(
        &self,
        model: &ModelId,
        conversation: Conversation,
    ) -> Result<StageResult, PipelineError> {
        let request = ChatRequest::new(model.clone(), conversation);

        let raw = with_retry(self.provider.name(), &self.retry, || {
            self.provider.complete(&request)
        })
        .await
        .map_err(|err| PipelineError::from_provider(UpstreamService::Llm, err))?;

        let payload: CompletionPayload =
            serde_json::from_value(raw.clone()).map_err(|err| invalid(err.to_string()))?;

        let text = payload
            .reply_text()
            .ok_or_else(|| invalid("missing choices[0].message.content".to_owned()))?
            .to_owned();

        debug!(
            provider = self.provider.name(),
            model = %model,
            reply_chars = text.chars().count(),
            "stage reply received"
        );

        Ok(StageResult { text, raw })
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("provider", &self.provider.name())
            .field("retry", &self.retry)
            .finish()
    }
}

fn invalid(message: String) -> PipelineError {
    PipelineError::UpstreamInvalidResponse {
        service: UpstreamService::Llm,
        message,
    }
}
