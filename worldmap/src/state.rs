use crate::ai::{AiLogic, TurnWarning};
use crate::commit::{self, CommitResult};
use crate::models::map::MapGraph;
use itertools::Itertools;
use std::fmt::Display;
use std::rc::Rc;
use tracing::info;

/// What a turn did to the map.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub commit: CommitResult,
    pub attempts: u32,
    pub warning: Option<TurnWarning>,
}

impl TurnReport {
    pub fn map_changed(&self) -> bool {
        !self.commit.patch.is_empty()
    }
}

impl Display for TurnReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patch = &self.commit.patch;
        if patch.is_empty() {
            return write!(f, "The map is unchanged.");
        }

        if !self.commit.new_nodes.is_empty() {
            let names = self.commit.new_nodes.iter().map(|n| n.name.as_str()).join(", ");
            writeln!(f, "New places: {}", names)?;
        }

        write!(
            f,
            "Places: {} added, {} changed, {} removed. Routes: {} added, {} changed, {} removed.",
            patch.added_nodes.len(),
            patch.updated_nodes.len(),
            patch.removed_nodes.len(),
            patch.added_edges.len(),
            patch.updated_edges.len(),
            patch.removed_edges.len(),
        )
    }
}

pub struct GameState {
    pub start_prompt: String,
    pub logic: Rc<AiLogic>,
    pub graph: MapGraph,
}

impl GameState {
    pub fn new(logic: Rc<AiLogic>, start_prompt: &str) -> GameState {
        GameState {
            start_prompt: start_prompt.to_string(),
            logic,
            graph: MapGraph::new(),
        }
    }

    /// One full turn: propose, resolve, commit. The map is only touched
    /// at the commit, and an empty delta leaves it as it was.
    pub async fn run_turn(&mut self, narrative: &str) -> TurnReport {
        let outcome = self.logic.propose_map_delta(&self.graph, narrative).await;
        let commit = commit::apply_delta(&mut self.graph, &outcome.delta);

        info!(
            attempts = outcome.attempts,
            nodes = self.graph.nodes().len(),
            edges = self.graph.edges().len(),
            "turn finished"
        );

        TurnReport {
            commit,
            attempts: outcome.attempts,
            warning: outcome.warning,
        }
    }

    pub async fn start(&mut self) -> TurnReport {
        let narrative = format!("The adventure begins in a {}.", self.start_prompt);
        self.run_turn(&narrative).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedGenerator;
    use crate::config::PipelineSettings;

    fn state(primary: ScriptedGenerator) -> GameState {
        let settings = PipelineSettings {
            backoff_base_ms: 0,
            corrective_fallback: false,
            ..Default::default()
        };

        let logic = AiLogic::new(Rc::new(primary), Rc::new(ScriptedGenerator::new()), settings);
        GameState::new(Rc::new(logic), "quiet river valley")
    }

    #[tokio::test]
    async fn accepted_turn_changes_the_map() {
        let mut state = state(ScriptedGenerator::new().respond(
            r#"{"nodesToAdd": [{"name": "Old Mill", "category": "building", "parentId": "root", "status": "found"}],
                "suggestedCurrentLocation": "Old Mill"}"#,
        ));

        let report = state.start().await;

        assert!(report.map_changed());
        assert_eq!(report.warning, None);
        assert_eq!(state.graph.current_location().map(|n| n.name.as_str()), Some("Old Mill"));
        assert!(report.to_string().contains("New places: Old Mill"));
    }

    #[tokio::test]
    async fn failed_turn_leaves_the_map_alone() {
        let mut state = state(
            ScriptedGenerator::new()
                .respond(r#"{"nodesToAdd": [{"name": "Hut", "category": "hut", "parentId": "root"}]}"#)
                .always(Ok("I cannot help with that.".to_string())),
        );
        state.run_turn("A hut.").await;
        let before = state.graph.clone();

        let report = state.run_turn("Nothing happens.").await;

        assert!(!report.map_changed());
        assert!(report.warning.is_some());
        assert_eq!(state.graph, before);
        assert_eq!(report.to_string(), "The map is unchanged.");
    }
}
