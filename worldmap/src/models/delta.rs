use super::map::{EdgeCategory, EdgeStatus, NodeCategory, NodeStatus};
use super::Key;
use gbnf_derive::Gbnf;
use serde::Serialize;

/// A status field on an update. The backend often expresses deletion
/// as a status ("destroyed", "severed"), which is kept distinct here so
/// repair can turn it into an explicit removal.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange<S> {
    Set(S),
    Remove(String),
}

impl<S> StatusChange<S> {
    pub fn is_removal(&self) -> bool {
        matches!(self, StatusChange::Remove(_))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeAdd {
    pub name: String,
    pub description: String,
    pub category: NodeCategory,
    pub status: NodeStatus,

    /// Soft reference: id, display name, or the root sentinel.
    pub parent: String,

    pub aliases: Vec<String>,

    /// Existing node this one was carved out of, if any.
    pub split_from: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub target: String,
    pub new_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<NodeCategory>,
    pub status: Option<StatusChange<NodeStatus>>,
    pub parent: Option<String>,
    pub aliases: Vec<String>,
}

impl NodeUpdate {
    pub fn reparent(target: &str, parent: &str) -> NodeUpdate {
        NodeUpdate {
            target: target.to_string(),
            parent: Some(parent.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRemove {
    pub target: String,
}

/// How an update or removal names an existing edge.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum EdgeRef {
    Id(Key),
    Endpoints {
        source: String,
        target: String,
        category: Option<EdgeCategory>,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAdd {
    pub source: String,
    pub target: String,
    pub category: EdgeCategory,
    pub status: EdgeStatus,
    pub description: String,
    pub travel_time: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeUpdate {
    pub edge: EdgeRef,

    /// Only honoured for id-addressed updates; for endpoint-addressed
    /// ones the category is part of the reference.
    pub category: Option<EdgeCategory>,

    pub status: Option<StatusChange<EdgeStatus>>,
    pub description: Option<String>,
    pub travel_time: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRemove {
    pub edge: EdgeRef,
}

/// A validated, typed set of proposed map mutations for one turn.
/// Soft references inside it are resolved only at commit time.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub nodes_to_add: Vec<NodeAdd>,
    pub nodes_to_update: Vec<NodeUpdate>,
    pub nodes_to_remove: Vec<NodeRemove>,
    pub edges_to_add: Vec<EdgeAdd>,
    pub edges_to_update: Vec<EdgeUpdate>,
    pub edges_to_remove: Vec<EdgeRemove>,
    pub observations: Option<String>,
    pub rationale: Option<String>,
    pub suggested_current_location: Option<String>,
}

impl Delta {
    pub fn empty() -> Delta {
        Delta::default()
    }

    pub fn op_count(&self) -> usize {
        self.nodes_to_add.len()
            + self.nodes_to_update.len()
            + self.nodes_to_remove.len()
            + self.edges_to_add.len()
            + self.edges_to_update.len()
            + self.edges_to_remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.op_count() == 0 && self.suggested_current_location.is_none()
    }
}

// Response shapes handed to grammar-capable backends. They are never
// built or deserialized; they exist so MapDeltaSeed::to_grammar() can
// constrain generation. The parser reads the JSON loosely.

#[allow(dead_code)]
#[derive(Gbnf)]
#[gbnf(rename_all = "camelCase")]
pub struct NodeSeed {
    name: String,
    description: String,
    category: String,
    status: String,
    parent_id: String,
    aliases: Vec<String>,
    split_from: Option<String>,
}

#[allow(dead_code)]
#[derive(Gbnf)]
#[gbnf(rename_all = "camelCase")]
pub struct NodeChangeSeed {
    id: String,
    new_name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    status: Option<String>,
    parent_id: Option<String>,
}

#[allow(dead_code)]
#[derive(Gbnf)]
#[gbnf(rename_all = "camelCase")]
pub struct EdgeSeed {
    source_place_id: String,
    target_place_id: String,
    category: String,
    status: String,
    description: String,
    travel_time: Option<String>,
}

#[allow(dead_code)]
#[derive(Gbnf)]
#[gbnf(rename_all = "camelCase")]
pub struct EdgeChangeSeed {
    id: Option<String>,
    source_place_id: Option<String>,
    target_place_id: Option<String>,
    category: Option<String>,
    status: Option<String>,
    description: Option<String>,
}

#[allow(dead_code)]
#[derive(Gbnf)]
#[gbnf(rename_all = "camelCase")]
pub struct MapDeltaSeed {
    observations: String,
    rationale: String,
    nodes_to_add: Vec<NodeSeed>,
    nodes_to_update: Vec<NodeChangeSeed>,
    nodes_to_remove: Vec<String>,
    edges_to_add: Vec<EdgeSeed>,
    edges_to_update: Vec<EdgeChangeSeed>,
    edges_to_remove: Vec<String>,
    suggested_current_location: Option<String>,
}
