use async_trait::async_trait;
use es::SSE;
use eventsource_client as es;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::ai::backend::{BackendFailure, TextGenerator};
use crate::ai::convo::AiPrompt;
use crate::models::new_uuid_string;

/// Request body shared by the blocking and streaming endpoints of the
/// KoboldCpp API.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenerationInput {
    pub genkey: String,
    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grammar: Option<String>,

    pub grammar_retain_state: bool,
    pub use_default_badwordsids: bool,
    pub max_length: u64,
    pub rep_pen: f64,
    pub rep_pen_range: u64,
    pub temperature: f64,
    pub top_a: f64,
    pub top_p: f64,
    pub sampler_order: Vec<u8>,
    pub stop_sequence: Vec<String>,
}

pub fn create_input(prompt: &AiPrompt) -> GenerationInput {
    GenerationInput {
        genkey: format!("KCPP{}", new_uuid_string()),
        prompt: prompt.prompt.clone(),
        grammar: prompt.grammar.clone(),
        grammar_retain_state: false,
        use_default_badwordsids: false,
        max_length: prompt.max_tokens,
        rep_pen: 1.1,
        rep_pen_range: 320,
        temperature: prompt.creativity.temperature(),
        top_a: 0.0,
        top_p: 0.92,
        sampler_order: vec![6, 0, 1, 3, 4, 2, 5],
        stop_sequence: vec!["<s>".to_string(), "</s>".to_string()],
    }
}

#[derive(Deserialize, Debug)]
struct GenerationResult {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GenerationOutput {
    results: Vec<GenerationResult>,
}

impl GenerationOutput {
    fn into_text(self) -> Result<String, BackendFailure> {
        self.results
            .into_iter()
            .next()
            .map(|result| result.text)
            .ok_or(BackendFailure::EmptyResponse)
    }
}

#[derive(Serialize, Deserialize)]
struct AIEvent {
    token: String,
}

impl From<es::Error> for BackendFailure {
    fn from(value: es::Error) -> Self {
        BackendFailure::Transport(format!("{:?}", value))
    }
}

impl From<reqwest::Error> for BackendFailure {
    fn from(value: reqwest::Error) -> Self {
        BackendFailure::Transport(value.to_string())
    }
}

fn create_response_stream(client: impl es::Client) -> impl Stream<Item = Result<String, es::Error>> {
    client.stream().map(|sse| {
        sse.and_then(|event| match event {
            SSE::Event(ev) => serde_json::from_str::<AIEvent>(&ev.data)
                .map(|r| r.token)
                .map_err(|err| es::Error::Unexpected(Box::new(err))),
            SSE::Comment(_) => Ok("".to_string()),
        })
    })
}

/// HTTP client for a KoboldCpp-compatible text generation server.
pub struct KoboldClient {
    base_url: String,
    http: reqwest::Client,
    streaming: bool,
}

impl KoboldClient {
    pub fn new(base_url: &str, timeout: Duration, streaming: bool) -> Result<KoboldClient, BackendFailure> {
        let http = reqwest::ClientBuilder::new()
            .connect_timeout(timeout)
            .pool_idle_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(KoboldClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            streaming,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn sync_generate(&self, input: &GenerationInput) -> Result<String, BackendFailure> {
        let url = format!("{}/v1/generate", self.base_url);
        let output: GenerationOutput = self
            .http
            .post(url)
            .json(input)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        output.into_text()
    }

    /// Token-by-token generation over server-sent events. Reconnecting
    /// would restart generation, so a dropped stream is a failure.
    async fn sse_generate(&self, input: &GenerationInput) -> Result<String, BackendFailure> {
        let params = serde_json::to_string(input).map_err(|e| BackendFailure::Transport(e.to_string()))?;
        let stream_url = format!("{}/extra/generate/stream", self.base_url);

        let reconnect_opts = es::ReconnectOptions::reconnect(false).build();

        let client = es::ClientBuilder::for_url(&stream_url)?
            .header("accept", "application/json")?
            .header("Content-Type", "application/json")?
            .method("POST".to_string())
            .body(params)
            .reconnect(reconnect_opts)
            .build();

        let mut stream = create_response_stream(client);
        let mut response = String::new();

        loop {
            let maybe_token = stream.try_next().await;
            match maybe_token {
                Ok(Some(token)) => response.push_str(&token),
                Ok(None) | Err(es::Error::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(response)
    }
}

#[async_trait(?Send)]
impl TextGenerator for KoboldClient {
    async fn generate(&self, prompt: &AiPrompt) -> Result<String, BackendFailure> {
        let input = create_input(prompt);
        debug!(url = %self.base_url, streaming = self.streaming, max_length = input.max_length, "generating");

        match self.streaming {
            true => self.sse_generate(&input).await,
            false => self.sync_generate(&input).await,
        }
    }
}
