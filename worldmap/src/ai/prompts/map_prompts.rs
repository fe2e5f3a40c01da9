use super::tables::map_tables;
use crate::ai::convo::{AiCreativity, AiPrompt};
use crate::models::coherence::Rejection;
use crate::models::delta::MapDeltaSeed;
use crate::models::map::{EdgeCategory, EdgeStatus, MapGraph, NodeCategory, NodeStatus};
use crate::models::ROOT_NODE_ID;
use strum::VariantNames;

const MAP_DELTA_TOKENS: u64 = 1024;

const MAP_INSTRUCTIONS: &'static str = r#"
The world map is a hierarchy of places ("nodes") connected by routes ("edges").
 - Every place has a parent. Top-level places use `{ROOT}` as their parent.
 - `{ROOT}` itself is not a place. Never add, update, remove or connect it.
 - A place of category `feature` can never contain another `feature`.
 - Refer to existing places and routes by the ids in the tables below. New places may be referred to by name.
 - Only propose changes that the narrative actually implies. An empty list is a valid answer.

Your response must be a single JSON object with these fields:
 - `observations`: what in the narrative changes the map.
 - `rationale`: why the changes below follow from it.
 - `nodesToAdd`: new places. Each needs `name`, `description`, `category`, `status` and `parentId`. Optional: `aliases`, and `splitFrom` if the place was carved out of an existing one.
 - `nodesToUpdate`: changes to existing places. Each needs `id` plus the fields that change (`newName`, `description`, `category`, `status`, `parentId`).
 - `nodesToRemove`: ids of places that no longer exist.
 - `edgesToAdd`: new routes. Each needs `sourcePlaceId`, `targetPlaceId`, `category`, `status` and `description`. Optional: `travelTime`.
 - `edgesToUpdate`: changes to existing routes, by `id` or by `sourcePlaceId` and `targetPlaceId`.
 - `edgesToRemove`: ids of routes that no longer exist.
 - `suggestedCurrentLocation`: id or name of the place the player is now in, or null.

Place categories: {NODE_CATEGORIES}
Place statuses: {NODE_STATUSES}
Route categories: {EDGE_CATEGORIES}
Route statuses: {EDGE_STATUSES}
"#;

const INTRO_PROMPT: &'static str = r#"
[INST]
You are maintaining the world map of a text-based adventure game. After each turn of the story, you must work out how the map changes.
{MAP_INSTRUCTIONS}

Current map:
{MAP_TABLES}

Narrative for this turn:
{NARRATIVE}
{CORRECTIONS}
[/INST]
"#;

const CONTINUATION_PROMPT: &'static str = r#"
[INST]
Your previous response could not be used. Fix these problems and respond again with the complete JSON object:
{ERRORS}
[/INST]
"#;

const CORRECTIVE_PROMPT: &'static str = r#"
[INST]
The text below was supposed to be a JSON description of world map changes, but it has problems.
{MAP_INSTRUCTIONS}

Problems:
{ERRORS}

Text to repair:
{MALFORMED}

Respond only with the corrected JSON object. Keep every change that was valid.
[/INST]
"#;

fn map_instructions() -> String {
    MAP_INSTRUCTIONS
        .replace("{ROOT}", ROOT_NODE_ID)
        .replacen("{NODE_CATEGORIES}", &NodeCategory::VARIANTS.join(", "), 1)
        .replacen("{NODE_STATUSES}", &NodeStatus::VARIANTS.join(", "), 1)
        .replacen("{EDGE_CATEGORIES}", &EdgeCategory::VARIANTS.join(", "), 1)
        .replacen("{EDGE_STATUSES}", &EdgeStatus::VARIANTS.join(", "), 1)
}

fn delta_prompt(prompt: &str, use_grammar: bool) -> AiPrompt {
    let prompt = AiPrompt::new_with_grammar(prompt, MapDeltaSeed::to_grammar()).with_size(MAP_DELTA_TOKENS);
    match use_grammar {
        true => prompt,
        false => prompt.without_grammar(),
    }
}

/// First prompt of a turn. If an earlier attempt this turn was
/// rejected but never made it into the conversation (the backend
/// failed outright), its problems ride along here.
pub fn intro_prompt(
    graph: &MapGraph,
    narrative: &str,
    previous: Option<&Rejection>,
    use_grammar: bool,
) -> AiPrompt {
    let corrections = match previous {
        Some(rejection) => format!(
            "\nA previous answer for this turn had these problems. Avoid them:\n{}\n",
            rejection.summary()
        ),
        None => String::new(),
    };

    let prompt = INTRO_PROMPT
        .replacen("{MAP_INSTRUCTIONS}", &map_instructions(), 1)
        .replacen("{MAP_TABLES}", &map_tables(graph), 1)
        .replacen("{NARRATIVE}", narrative.trim(), 1)
        .replacen("{CORRECTIONS}", &corrections, 1);

    delta_prompt(&prompt, use_grammar)
}

pub fn continuation_prompt(rejection: &Rejection, use_grammar: bool) -> AiPrompt {
    let prompt = CONTINUATION_PROMPT.replacen("{ERRORS}", &rejection.summary(), 1);
    delta_prompt(&prompt, use_grammar)
}

/// One-shot repair request for the secondary backend.
pub fn corrective_prompt(malformed: &str, rejection: &Rejection, use_grammar: bool) -> AiPrompt {
    let prompt = CORRECTIVE_PROMPT
        .replacen("{MAP_INSTRUCTIONS}", &map_instructions(), 1)
        .replacen("{ERRORS}", &rejection.summary(), 1)
        .replacen("{MALFORMED}", malformed.trim(), 1);

    let mut prompt = delta_prompt(&format!("<s>{}", prompt), use_grammar);
    prompt.creativity = AiCreativity::Predictable;
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::coherence::ValidationError;

    #[test]
    fn intro_lists_vocabularies_and_root_rule() {
        let prompt = intro_prompt(&MapGraph::new(), "You walk into a mill.", None, true);

        assert!(prompt.prompt.contains("quest_target"));
        assert!(prompt.prompt.contains("boarding_hook"));
        assert!(prompt.prompt.contains("`root` itself is not a place"));
        assert!(prompt.prompt.contains("You walk into a mill."));
        assert!(prompt.grammar.is_some());
    }

    #[test]
    fn continuation_carries_error_summary() {
        let rejection = Rejection::Invalid(vec![ValidationError::value(
            "nodesToAdd[0].category",
            "castle-ish",
            NodeCategory::VARIANTS,
        )]);

        let prompt = continuation_prompt(&rejection, false);
        assert!(prompt.prompt.contains("nodesToAdd[0].category"));
        assert!(prompt.prompt.contains("castle-ish"));
        assert!(prompt.grammar.is_none());
    }
}
