use super::tables::node_table;
use crate::ai::convo::AiPrompt;
use crate::models::coherence::{
    DistinctName, HierarchyChoice, HierarchyFix, OrphanAssignments, OrphanDestination,
};
use crate::models::map::MapNode;
use itertools::Itertools;
use strum::VariantNames;

const HIERARCHY_PROMPT: &'static str = r#"
<s>[INST]
On the world map of a text-based adventure game, the place `{CHILD_NAME}` ({CHILD_DESCRIPTION}) is a `feature` inside `{PARENT_NAME}` ({PARENT_DESCRIPTION}), which is also a `feature`. A feature cannot contain another feature.

Choose one way to fix this:
 - `promote_parent`: `{PARENT_NAME}` becomes a larger place (a building or room) that can contain features.
 - `make_sibling`: `{CHILD_NAME}` is moved out, next to `{PARENT_NAME}` instead of inside it.

Respond in JSON with a single field `fix`, which must be one of: {CHOICES}
[/INST]
"#;

const ORPHAN_PROMPT: &'static str = r#"
<s>[INST]
On the world map of a text-based adventure game, the place `{ORIGINAL_NAME}` ({ORIGINAL_DESCRIPTION}) has been split, and part of it is now the new place `{NEW_NAME}`.

The places below used to be inside `{ORIGINAL_NAME}`:
{CHILDREN}

For each place, decide whether it stays inside `{ORIGINAL_NAME}` (`original`) or now belongs inside `{NEW_NAME}` (`new`).
Respond in JSON with a list `assignments`. Each assignment has `childId` (the id from the table) and `destination`, which must be one of: {CHOICES}
[/INST]
"#;

const DISTINCT_NAME_PROMPT: &'static str = r#"
<s>[INST]
On the world map of a text-based adventure game, two new places were both named `{NAME}`. Give a different, short, distinctive name to this one:

{DESCRIPTION}

The name must not be any of: {TAKEN}
Respond in JSON with a single field `name`.
[/INST]
"#;

const RESOLUTION_TOKENS: u64 = 64;
const CLASSIFICATION_TOKENS: u64 = 400;

fn describe(node: &MapNode) -> &str {
    match node.description.trim().is_empty() {
        true => "no description",
        false => node.description.trim(),
    }
}

pub fn hierarchy_prompt(child: &MapNode, parent: &MapNode) -> AiPrompt {
    let prompt = HIERARCHY_PROMPT
        .replace("{CHILD_NAME}", &child.name)
        .replacen("{CHILD_DESCRIPTION}", describe(child), 1)
        .replace("{PARENT_NAME}", &parent.name)
        .replacen("{PARENT_DESCRIPTION}", describe(parent), 1)
        .replacen("{CHOICES}", &HierarchyFix::VARIANTS.join(", "), 1);

    AiPrompt::predictable_with_grammar(&prompt, HierarchyChoice::to_grammar()).with_size(RESOLUTION_TOKENS)
}

pub fn orphan_prompt(original: &MapNode, new_name: &str, children: &[&MapNode]) -> AiPrompt {
    let prompt = ORPHAN_PROMPT
        .replace("{ORIGINAL_NAME}", &original.name)
        .replacen("{ORIGINAL_DESCRIPTION}", describe(original), 1)
        .replace("{NEW_NAME}", new_name)
        .replacen("{CHILDREN}", &node_table(children.iter().copied()).to_string(), 1)
        .replacen("{CHOICES}", &OrphanDestination::VARIANTS.join(", "), 1);

    AiPrompt::predictable_with_grammar(&prompt, OrphanAssignments::to_grammar())
        .with_size(CLASSIFICATION_TOKENS)
}

pub fn distinct_name_prompt(name: &str, description: &str, taken: &[String]) -> AiPrompt {
    let taken = taken.iter().map(|t| format!("`{}`", t)).join(", ");
    let prompt = DISTINCT_NAME_PROMPT
        .replace("{NAME}", name)
        .replacen("{DESCRIPTION}", description, 1)
        .replacen("{TAKEN}", &taken, 1);

    AiPrompt::new_with_grammar(&prompt, DistinctName::to_grammar()).with_size(RESOLUTION_TOKENS)
}
