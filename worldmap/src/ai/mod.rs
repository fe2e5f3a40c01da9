pub mod backend;
pub mod coherence;
pub mod convo;
pub mod generator;
pub mod logic;
pub mod prompts;

#[cfg(test)]
pub mod testing;

pub use backend::{BackendFailure, TextGenerator};
pub use logic::{AiLogic, MapDeltaOutcome, TurnWarning, MAX_RETRIES};
