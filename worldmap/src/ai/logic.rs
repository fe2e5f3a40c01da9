use crate::config::PipelineSettings;
use crate::delta;
use crate::models::coherence::{CoherenceFailure, Rejection};
use crate::models::delta::Delta;
use crate::models::map::MapGraph;
use std::rc::Rc;
use thiserror::Error;
use tracing::{info, warn};

use super::backend::{BackendFailure, TextGenerator};
use super::coherence::AiCoherence;
use super::generator::AiGenerator;

/// Retries after the first attempt. A turn makes at most
/// MAX_RETRIES + 1 calls to the primary backend.
pub const MAX_RETRIES: u32 = 3;

/// Reported to the player when a turn could not update the map.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnWarning {
    #[error("the map was not updated: no usable answer after {attempts} attempts ({rejection})")]
    Rejected { attempts: u32, rejection: Rejection },

    #[error("the map was not updated: backend unavailable after {attempts} attempts ({failure})")]
    BackendUnavailable { attempts: u32, failure: BackendFailure },
}

/// What one turn of delta generation produced. The delta is empty
/// when a warning is present.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDeltaOutcome {
    pub delta: Delta,
    pub attempts: u32,
    pub warning: Option<TurnWarning>,
    pub resolved: Vec<CoherenceFailure>,
}

enum AttemptState {
    Attempting { attempt: u32, previous: Option<Rejection> },
    Succeeded(Delta),
    ExhaustedRetries,
}

/// The last thing that went wrong, kept for the corrective fallback
/// and the warning.
#[derive(Default)]
struct AttemptLog {
    attempts: u32,
    consecutive_failures: u32,
    malformed: Option<String>,
    rejection: Option<Rejection>,
    failure: Option<BackendFailure>,
}

impl AttemptLog {
    fn warning(self) -> Option<TurnWarning> {
        let attempts = self.attempts;
        match (self.rejection, self.failure) {
            (Some(rejection), _) => Some(TurnWarning::Rejected { attempts, rejection }),
            (None, Some(failure)) => Some(TurnWarning::BackendUnavailable { attempts, failure }),
            (None, None) => None,
        }
    }
}

/// Highest-level AI construct. Turns narrative into a delta that is
/// safe to commit: asks the primary backend, retries with feedback
/// when the answer is unusable, then hands the result through the
/// consistency resolver.
pub struct AiLogic {
    generator: Rc<AiGenerator>,
    coherence: AiCoherence,
}

impl AiLogic {
    pub fn new(
        primary: Rc<dyn TextGenerator>,
        secondary: Rc<dyn TextGenerator>,
        settings: PipelineSettings,
    ) -> AiLogic {
        let generator = Rc::new(AiGenerator::new(primary, secondary, settings));
        let coherence = AiCoherence::new(generator.clone());

        AiLogic { generator, coherence }
    }

    /// Never fails. If nothing usable comes back within the retry
    /// budget, the outcome carries an empty delta and a warning.
    pub async fn propose_map_delta(&self, graph: &MapGraph, narrative: &str) -> MapDeltaOutcome {
        self.generator.reset_map_conversation();

        let mut log = AttemptLog::default();
        let mut state = AttemptState::Attempting {
            attempt: 1,
            previous: None,
        };

        let delta = loop {
            state = match state {
                AttemptState::Attempting { attempt, .. } if attempt > MAX_RETRIES + 1 => {
                    AttemptState::ExhaustedRetries
                }
                AttemptState::Attempting { attempt, previous } => {
                    self.attempt(graph, narrative, attempt, previous, &mut log).await
                }
                AttemptState::Succeeded(delta) => break Some(delta),
                AttemptState::ExhaustedRetries => break self.corrective_fallback(&log).await,
            };
        };

        self.generator.reset_map_conversation();

        match delta {
            Some(delta) => {
                let (delta, resolved) = self.coherence.make_delta_coherent(graph, delta).await;
                info!(attempts = log.attempts, operations = delta.op_count(), "map delta ready");

                MapDeltaOutcome {
                    delta,
                    attempts: log.attempts,
                    warning: None,
                    resolved,
                }
            }
            None => {
                let attempts = log.attempts;
                let warning = log.warning();
                warn!(attempts, "giving up on map changes for this turn");

                MapDeltaOutcome {
                    delta: Delta::empty(),
                    attempts,
                    warning,
                    resolved: vec![],
                }
            }
        }
    }

    async fn attempt(
        &self,
        graph: &MapGraph,
        narrative: &str,
        attempt: u32,
        previous: Option<Rejection>,
        log: &mut AttemptLog,
    ) -> AttemptState {
        log.attempts = attempt;

        match self.generator.propose_delta(graph, narrative, previous.as_ref()).await {
            Ok(text) => {
                log.consecutive_failures = 0;
                match delta::process_response(&text) {
                    Ok(delta) => AttemptState::Succeeded(delta),
                    Err(rejection) => {
                        warn!(attempt, errors = %rejection.summary(), "map delta rejected");
                        log.malformed = Some(text);
                        log.rejection = Some(rejection.clone());

                        AttemptState::Attempting {
                            attempt: attempt + 1,
                            previous: Some(rejection),
                        }
                    }
                }
            }
            Err(failure) => {
                log.consecutive_failures += 1;
                warn!(attempt, error = %failure, "backend call failed");
                log.failure = Some(failure);

                // No point waiting if the budget is spent.
                if attempt <= MAX_RETRIES {
                    let delay = self.generator.settings().backoff(log.consecutive_failures);
                    tokio::time::sleep(delay).await;
                }

                AttemptState::Attempting {
                    attempt: attempt + 1,
                    previous,
                }
            }
        }
    }

    /// One last try through the secondary backend with the most recent
    /// rejected answer. Only meaningful if some answer was rejected.
    async fn corrective_fallback(&self, log: &AttemptLog) -> Option<Delta> {
        if !self.generator.settings().corrective_fallback {
            return None;
        }

        let (malformed, rejection) = match (&log.malformed, &log.rejection) {
            (Some(malformed), Some(rejection)) => (malformed, rejection),
            _ => return None,
        };

        let corrected = match self.generator.correct_delta(malformed, rejection).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "corrective call failed");
                return None;
            }
        };

        match delta::process_response(&corrected) {
            Ok(delta) => {
                info!("corrective fallback produced a usable delta");
                Some(delta)
            }
            Err(rejection) => {
                warn!(errors = %rejection.summary(), "corrected answer still rejected");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedGenerator;
    use std::time::Duration;

    const INVALID: &str = r#"{"nodesToAdd": [{"name": "Mill", "description": "a mill",
        "category": "castle-ish", "status": "discovered", "parentId": "root"}]}"#;

    const VALID: &str = r#"{"nodesToAdd": [{"name": "Mill", "description": "a mill",
        "category": "building", "status": "discovered", "parentId": "root"}]}"#;

    fn settings(corrective_fallback: bool) -> PipelineSettings {
        PipelineSettings {
            backoff_base_ms: 0,
            corrective_fallback,
            ..Default::default()
        }
    }

    fn logic(
        primary: ScriptedGenerator,
        secondary: ScriptedGenerator,
        corrective_fallback: bool,
    ) -> (AiLogic, Rc<ScriptedGenerator>, Rc<ScriptedGenerator>) {
        let primary = Rc::new(primary);
        let secondary = Rc::new(secondary);
        let logic = AiLogic::new(primary.clone(), secondary.clone(), settings(corrective_fallback));
        (logic, primary, secondary)
    }

    #[tokio::test]
    async fn first_valid_answer_is_used() {
        let (logic, primary, _) = logic(ScriptedGenerator::new().respond(VALID), ScriptedGenerator::new(), true);
        let outcome = logic.propose_map_delta(&MapGraph::new(), "You find a mill.").await;

        assert_eq!(primary.calls(), 1);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.warning, None);
        assert_eq!(outcome.delta.nodes_to_add[0].name, "Mill");
    }

    #[tokio::test]
    async fn retry_prompt_carries_previous_errors() {
        let (logic, primary, _) = logic(
            ScriptedGenerator::new().respond(INVALID).respond(VALID),
            ScriptedGenerator::new(),
            true,
        );

        let outcome = logic.propose_map_delta(&MapGraph::new(), "You find a mill.").await;
        let prompts = primary.prompts();

        assert_eq!(outcome.attempts, 2);
        assert!(!prompts[0].prompt.contains("castle-ish"));
        assert!(prompts[1].prompt.contains("nodesToAdd[0].category"));
        assert!(prompts[1].prompt.contains("castle-ish"));
    }

    #[tokio::test]
    async fn retries_are_bounded_and_degrade_to_empty_delta() {
        let (logic, primary, secondary) = logic(
            ScriptedGenerator::new().always(Ok(INVALID.to_string())),
            ScriptedGenerator::new(),
            false,
        );

        let outcome = logic.propose_map_delta(&MapGraph::new(), "You find a mill.").await;

        assert_eq!(primary.calls(), (MAX_RETRIES + 1) as usize);
        assert_eq!(secondary.calls(), 0);
        assert!(outcome.delta.is_empty());
        assert!(matches!(outcome.warning, Some(TurnWarning::Rejected { attempts: 4, .. })));
    }

    #[tokio::test]
    async fn backend_failures_consume_the_budget() {
        let timeout = BackendFailure::Timeout(Duration::from_secs(1));
        let (logic, primary, _) = logic(
            ScriptedGenerator::new().always(Err(timeout.clone())),
            ScriptedGenerator::new(),
            true,
        );

        let outcome = logic.propose_map_delta(&MapGraph::new(), "You find a mill.").await;

        assert_eq!(primary.calls(), (MAX_RETRIES + 1) as usize);
        assert!(outcome.delta.is_empty());
        assert_eq!(
            outcome.warning,
            Some(TurnWarning::BackendUnavailable {
                attempts: MAX_RETRIES + 1,
                failure: timeout,
            })
        );
    }

    #[tokio::test]
    async fn rejection_survives_a_backend_failure() {
        let (logic, primary, _) = logic(
            ScriptedGenerator::new()
                .respond(INVALID)
                .fail(BackendFailure::EmptyResponse)
                .respond(VALID),
            ScriptedGenerator::new(),
            true,
        );

        let outcome = logic.propose_map_delta(&MapGraph::new(), "You find a mill.").await;
        let prompts = primary.prompts();

        assert_eq!(outcome.attempts, 3);
        assert!(prompts[2].prompt.contains("castle-ish"));
        assert_eq!(outcome.delta.op_count(), 1);
    }

    #[tokio::test]
    async fn corrective_fallback_rescues_the_turn() {
        let (logic, primary, secondary) = logic(
            ScriptedGenerator::new().always(Ok(INVALID.to_string())),
            ScriptedGenerator::new().respond(VALID),
            true,
        );

        let outcome = logic.propose_map_delta(&MapGraph::new(), "You find a mill.").await;

        assert_eq!(primary.calls(), (MAX_RETRIES + 1) as usize);
        assert_eq!(secondary.calls(), 1);
        assert!(secondary.prompts()[0].prompt.contains("castle-ish"));
        assert_eq!(outcome.warning, None);
        assert_eq!(outcome.delta.nodes_to_add[0].name, "Mill");
    }

    #[tokio::test]
    async fn accepted_delta_is_made_coherent() {
        let duplicated = r#"{"nodesToAdd": [
            {"name": "Well", "category": "feature", "status": "discovered", "parentId": "root"},
            {"name": "Well", "category": "feature", "status": "discovered", "parentId": "root"}
        ]}"#;

        let (logic, _, _) = logic(
            ScriptedGenerator::new().respond(duplicated),
            ScriptedGenerator::new().fail(BackendFailure::EmptyResponse),
            true,
        );

        let outcome = logic.propose_map_delta(&MapGraph::new(), "Two wells.").await;

        assert_eq!(outcome.delta.nodes_to_add[1].name, "Well (2)");
        assert_eq!(outcome.resolved.len(), 1);
    }
}
