use super::backend::{generate_within, BackendFailure, TextGenerator};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiCreativity {
    Predictable,
    Normal,
    Creative,
}

impl AiCreativity {
    pub fn temperature(&self) -> f64 {
        match self {
            AiCreativity::Predictable => 0.5,
            AiCreativity::Normal => 0.7,
            AiCreativity::Creative => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiPrompt {
    pub prompt: String,
    pub grammar: Option<String>,
    pub max_tokens: u64,
    pub creativity: AiCreativity,
}

impl AiPrompt {
    pub fn new(prompt: &str) -> AiPrompt {
        AiPrompt {
            prompt: prompt.to_string(),
            grammar: None,
            max_tokens: 150,
            creativity: AiCreativity::Normal,
        }
    }

    pub fn new_with_grammar(prompt: &str, grammar: &str) -> AiPrompt {
        AiPrompt {
            prompt: prompt.to_string(),
            grammar: Some(grammar.to_string()),
            max_tokens: 150,
            creativity: AiCreativity::Normal,
        }
    }

    pub fn predictable_with_grammar(prompt: &str, grammar: &str) -> AiPrompt {
        AiPrompt {
            prompt: prompt.to_string(),
            grammar: Some(grammar.to_string()),
            max_tokens: 150,
            creativity: AiCreativity::Predictable,
        }
    }

    pub fn with_size(mut self, tokens: u64) -> AiPrompt {
        self.max_tokens = tokens;
        self
    }

    /// Drop the grammar, for backends that cannot take one.
    pub fn without_grammar(mut self) -> AiPrompt {
        self.grammar = None;
        self
    }
}

/// A running Mistral-instruct conversation with one backend. Each
/// exchange is appended to the history, so later prompts can refer to
/// earlier answers ("your previous response had these errors").
pub struct AiConversation {
    prompt_so_far: RefCell<String>,
    client: Rc<dyn TextGenerator>,
    timeout: Duration,
}

impl AiConversation {
    pub fn new(client: Rc<dyn TextGenerator>, timeout: Duration) -> AiConversation {
        AiConversation {
            prompt_so_far: RefCell::new(String::new()),
            client,
            timeout,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_so_far.borrow().is_empty()
    }

    pub fn reset(&self) {
        self.prompt_so_far.borrow_mut().clear();
    }

    pub fn history(&self) -> String {
        self.prompt_so_far.borrow().clone()
    }

    /// Send the prompt on top of the history so far. The history only
    /// grows if the backend actually answered.
    pub async fn execute(&self, prompt: &AiPrompt) -> Result<String, BackendFailure> {
        // Only the very first message of a conversation begins with
        // <s>, not subsequent ones.
        let mut full_prompt = self.history();
        if full_prompt.is_empty() {
            full_prompt.push_str("<s>");
        }

        full_prompt.push_str(&prompt.prompt);

        let request = AiPrompt {
            prompt: full_prompt.clone(),
            ..prompt.clone()
        };

        let response = generate_within(self.client.as_ref(), &request, self.timeout).await?;

        full_prompt.push_str(&response);

        // mistral end of response token (for when a grammar is used)
        if !full_prompt.trim().ends_with("</s>") {
            full_prompt.push_str("</s>");
        }

        *self.prompt_so_far.borrow_mut() = full_prompt;
        Ok(response)
    }
}
