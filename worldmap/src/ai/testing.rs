//! Scripted stand-in for a generative backend.

use super::backend::{BackendFailure, TextGenerator};
use super::convo::AiPrompt;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Replays queued responses in order and records every prompt it was
/// sent. Once the queue runs dry it repeats the fallback, if one was
/// set, and otherwise fails.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<Result<String, BackendFailure>>>,
    fallback: Option<Result<String, BackendFailure>>,
    prompts: RefCell<Vec<AiPrompt>>,
}

impl ScriptedGenerator {
    pub fn new() -> ScriptedGenerator {
        ScriptedGenerator::default()
    }

    pub fn respond(self, text: &str) -> ScriptedGenerator {
        self.responses.borrow_mut().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, failure: BackendFailure) -> ScriptedGenerator {
        self.responses.borrow_mut().push_back(Err(failure));
        self
    }

    pub fn always(mut self, response: Result<String, BackendFailure>) -> ScriptedGenerator {
        self.fallback = Some(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompts(&self) -> Vec<AiPrompt> {
        self.prompts.borrow().clone()
    }
}

#[async_trait(?Send)]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &AiPrompt) -> Result<String, BackendFailure> {
        self.prompts.borrow_mut().push(prompt.clone());

        let next = self.responses.borrow_mut().pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(response) => response,
            None => Err(BackendFailure::Transport("script exhausted".to_string())),
        }
    }
}
