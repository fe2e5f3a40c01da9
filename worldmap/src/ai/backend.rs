use super::convo::AiPrompt;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Anything that went wrong getting text out of a model, as opposed
/// to the text being wrong.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendFailure {
    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("backend returned an empty response")]
    EmptyResponse,
}

/// A generative backend. Implementations are single-threaded, like
/// the rest of the turn pipeline.
#[async_trait(?Send)]
pub trait TextGenerator {
    async fn generate(&self, prompt: &AiPrompt) -> Result<String, BackendFailure>;
}

/// Call the backend with a deadline. A response that is only
/// whitespace counts as no response.
pub async fn generate_within(
    backend: &dyn TextGenerator,
    prompt: &AiPrompt,
    timeout: Duration,
) -> Result<String, BackendFailure> {
    let text = tokio::time::timeout(timeout, backend.generate(prompt))
        .await
        .map_err(|_| BackendFailure::Timeout(timeout))??;

    match text.trim().is_empty() {
        true => Err(BackendFailure::EmptyResponse),
        false => Ok(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedGenerator;

    struct Stalled;

    #[async_trait(?Send)]
    impl TextGenerator for Stalled {
        async fn generate(&self, _prompt: &AiPrompt) -> Result<String, BackendFailure> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let prompt = AiPrompt::new("hello");
        let result = generate_within(&Stalled, &prompt, Duration::from_millis(10)).await;
        assert_eq!(result, Err(BackendFailure::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn blank_text_is_empty_response() {
        let backend = ScriptedGenerator::new().respond("   \n");
        let prompt = AiPrompt::new("hello");
        let result = generate_within(&backend, &prompt, Duration::from_secs(1)).await;
        assert_eq!(result, Err(BackendFailure::EmptyResponse));
    }
}
