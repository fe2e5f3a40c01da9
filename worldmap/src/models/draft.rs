use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter};

/// The six operation lists of a delta, in the order they are
/// validated and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter)]
pub enum OpList {
    #[strum(serialize = "nodesToAdd")]
    NodesToAdd,
    #[strum(serialize = "nodesToUpdate")]
    NodesToUpdate,
    #[strum(serialize = "nodesToRemove")]
    NodesToRemove,
    #[strum(serialize = "edgesToAdd")]
    EdgesToAdd,
    #[strum(serialize = "edgesToUpdate")]
    EdgesToUpdate,
    #[strum(serialize = "edgesToRemove")]
    EdgesToRemove,
}

impl OpList {
    pub fn is_node_list(&self) -> bool {
        matches!(
            self,
            OpList::NodesToAdd | OpList::NodesToUpdate | OpList::NodesToRemove
        )
    }
}

/// A single proposed operation exactly as the backend sent it, with
/// keys already mapped onto canonical field names. Values are not
/// checked until validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftOp {
    pub fields: Map<String, Value>,
}

impl DraftOp {
    pub fn new(fields: Map<String, Value>) -> DraftOp {
        DraftOp { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// The value as a trimmed string, if it is a non-empty string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.fields
            .insert(key.to_string(), Value::String(value.to_string()));
    }
}

/// Backend output after parsing but before normalization and
/// validation. Created fresh every attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftDelta {
    pub nodes_to_add: Vec<DraftOp>,
    pub nodes_to_update: Vec<DraftOp>,
    pub nodes_to_remove: Vec<DraftOp>,
    pub edges_to_add: Vec<DraftOp>,
    pub edges_to_update: Vec<DraftOp>,
    pub edges_to_remove: Vec<DraftOp>,
    pub observations: Option<String>,
    pub rationale: Option<String>,
    pub suggested_current_location: Option<String>,
}

impl DraftDelta {
    pub fn list(&self, list: OpList) -> &Vec<DraftOp> {
        match list {
            OpList::NodesToAdd => &self.nodes_to_add,
            OpList::NodesToUpdate => &self.nodes_to_update,
            OpList::NodesToRemove => &self.nodes_to_remove,
            OpList::EdgesToAdd => &self.edges_to_add,
            OpList::EdgesToUpdate => &self.edges_to_update,
            OpList::EdgesToRemove => &self.edges_to_remove,
        }
    }

    pub fn list_mut(&mut self, list: OpList) -> &mut Vec<DraftOp> {
        match list {
            OpList::NodesToAdd => &mut self.nodes_to_add,
            OpList::NodesToUpdate => &mut self.nodes_to_update,
            OpList::NodesToRemove => &mut self.nodes_to_remove,
            OpList::EdgesToAdd => &mut self.edges_to_add,
            OpList::EdgesToUpdate => &mut self.edges_to_update,
            OpList::EdgesToRemove => &mut self.edges_to_remove,
        }
    }

    pub fn op_count(&self) -> usize {
        self.nodes_to_add.len()
            + self.nodes_to_update.len()
            + self.nodes_to_remove.len()
            + self.edges_to_add.len()
            + self.edges_to_update.len()
            + self.edges_to_remove.len()
    }

    /// Fold a later fragment into this one: operation lists are
    /// concatenated, while the free-text fields keep the first
    /// non-empty value seen.
    pub fn merge(&mut self, mut other: DraftDelta) {
        self.nodes_to_add.append(&mut other.nodes_to_add);
        self.nodes_to_update.append(&mut other.nodes_to_update);
        self.nodes_to_remove.append(&mut other.nodes_to_remove);
        self.edges_to_add.append(&mut other.edges_to_add);
        self.edges_to_update.append(&mut other.edges_to_update);
        self.edges_to_remove.append(&mut other.edges_to_remove);

        keep_first(&mut self.observations, other.observations);
        keep_first(&mut self.rationale, other.rationale);
        keep_first(
            &mut self.suggested_current_location,
            other.suggested_current_location,
        );
    }
}

fn keep_first(current: &mut Option<String>, candidate: Option<String>) {
    let is_empty = current.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
    let candidate = candidate.filter(|s| !s.trim().is_empty());

    if is_empty && candidate.is_some() {
        *current = candidate;
    }
}
