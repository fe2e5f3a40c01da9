use anyhow::{anyhow, Result};
use serde_json::Value;
use std::rc::Rc;
use std::str::FromStr;
use strum::VariantNames;
use tracing::debug;

use super::backend::{generate_within, BackendFailure, TextGenerator};
use super::convo::{AiConversation, AiPrompt};
use super::prompts::{coherence_prompts, map_prompts};

use crate::config::PipelineSettings;
use crate::delta::parser::extract_json;
use crate::delta::synonyms::fold;
use crate::models::coherence::{HierarchyFix, OrphanDestination, Rejection};
use crate::models::map::{MapGraph, MapNode};
use crate::models::Key;

/// Every string a resolution answer might hold its choice in: the
/// string values of a JSON object, a bare JSON string, or the raw text.
fn answer_candidates(text: &str) -> Vec<String> {
    match extract_json(text) {
        Ok(Value::Object(fields)) => fields
            .values()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => vec![text.trim().trim_matches('"').to_string()],
    }
}

/// Match a free-text answer against a closed option set, ignoring
/// case. Falls back to looking for exactly one option mentioned in
/// the text.
fn match_choice<T: FromStr + VariantNames>(text: &str) -> Option<T> {
    let exact = answer_candidates(text)
        .iter()
        .find_map(|candidate| T::from_str(&fold(candidate)).ok());

    if exact.is_some() {
        return exact;
    }

    let folded = fold(text);
    let mentioned: Vec<_> = T::VARIANTS
        .iter()
        .filter(|variant| folded.contains(*variant))
        .collect();

    match mentioned.as_slice() {
        [only] => T::from_str(only).ok(),
        _ => None,
    }
}

fn object_str<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Intermediate level struct that owns every round-trip to the
/// backends. It builds prompts and hands back raw or lightly-parsed
/// answers; deciding what to do with them happens a level up.
pub struct AiGenerator {
    map_convo: AiConversation,
    secondary: Rc<dyn TextGenerator>,
    settings: PipelineSettings,
}

impl AiGenerator {
    pub fn new(
        primary: Rc<dyn TextGenerator>,
        secondary: Rc<dyn TextGenerator>,
        settings: PipelineSettings,
    ) -> AiGenerator {
        AiGenerator {
            map_convo: AiConversation::new(primary, settings.backend_timeout()),
            secondary,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn reset_map_conversation(&self) {
        self.map_convo.reset();
    }

    /// Ask the primary backend for this turn's map changes. Once the
    /// conversation holds a rejected answer, only the corrections are
    /// sent; the backend can see what it said before.
    pub async fn propose_delta(
        &self,
        graph: &MapGraph,
        narrative: &str,
        previous: Option<&Rejection>,
    ) -> Result<String, BackendFailure> {
        let use_grammar = self.settings.use_grammar;
        let prompt = match (self.map_convo.is_empty(), previous) {
            (false, Some(rejection)) => map_prompts::continuation_prompt(rejection, use_grammar),
            _ => {
                self.map_convo.reset();
                map_prompts::intro_prompt(graph, narrative, previous, use_grammar)
            }
        };

        self.map_convo.execute(&prompt).await
    }

    async fn ask_secondary(&self, prompt: &AiPrompt) -> Result<String, BackendFailure> {
        let prompt = match self.settings.use_grammar {
            true => prompt.clone(),
            false => prompt.clone().without_grammar(),
        };

        generate_within(self.secondary.as_ref(), &prompt, self.settings.backend_timeout()).await
    }

    /// One-shot "repair this text given these errors" request.
    pub async fn correct_delta(
        &self,
        malformed: &str,
        rejection: &Rejection,
    ) -> Result<String, BackendFailure> {
        let prompt = map_prompts::corrective_prompt(malformed, rejection, self.settings.use_grammar);
        self.ask_secondary(&prompt).await
    }

    pub async fn choose_hierarchy_fix(&self, child: &MapNode, parent: &MapNode) -> Result<HierarchyFix> {
        let prompt = coherence_prompts::hierarchy_prompt(child, parent);
        let answer = self.ask_secondary(&prompt).await?;

        debug!(answer = %answer.trim(), "hierarchy fix answer");
        match_choice(&answer).ok_or_else(|| anyhow!("no recognizable hierarchy fix in: {}", answer))
    }

    /// Batch classification of a split node's children. Children the
    /// answer does not mention are left out of the result.
    pub async fn classify_orphans(
        &self,
        original: &MapNode,
        new_name: &str,
        children: &[&MapNode],
    ) -> Result<Vec<(Key, OrphanDestination)>> {
        let prompt = coherence_prompts::orphan_prompt(original, new_name, children);
        let answer = self.ask_secondary(&prompt).await?;

        let assignments = match extract_json(&answer)? {
            Value::Array(items) => items,
            object => match object.get("assignments") {
                Some(Value::Array(items)) => items.clone(),
                _ => return Err(anyhow!("no assignments in: {}", answer)),
            },
        };

        let mut classified = vec![];
        for assignment in assignments {
            let child_ref = object_str(&assignment, &["childId", "child_id", "id", "child", "name"]);
            let destination = object_str(&assignment, &["destination", "assignment", "parent"])
                .and_then(match_choice::<OrphanDestination>);

            let child = child_ref.and_then(|reference| {
                children
                    .iter()
                    .find(|c| c.id.eq_ignore_ascii_case(reference) || c.answers_to(reference))
            });

            match (child, destination) {
                (Some(child), Some(destination)) => classified.push((child.id.clone(), destination)),
                _ => debug!(assignment = %assignment, "unusable orphan assignment"),
            }
        }

        Ok(classified)
    }

    pub async fn rename_duplicate(&self, name: &str, description: &str, taken: &[String]) -> Result<String> {
        let prompt = coherence_prompts::distinct_name_prompt(name, description, taken);
        let answer = self.ask_secondary(&prompt).await?;

        let new_name = match extract_json(&answer) {
            Ok(value) => object_str(&value, &["name", "newName"]).map(str::to_string),
            Err(_) => answer.lines().next().map(|l| l.trim().trim_matches('"').to_string()),
        }
        .filter(|n| !n.is_empty());

        match new_name {
            Some(new_name) if !taken.iter().any(|t| t.eq_ignore_ascii_case(&new_name)) => Ok(new_name),
            _ => Err(anyhow!("no usable distinct name in: {}", answer)),
        }
    }
}
