use super::{Key, ROOT_NODE_ID};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, EnumVariantNames};

#[derive(
    Serialize, Deserialize, Debug, EnumString, EnumVariantNames, AsRefStr, Display, Clone, Copy,
    PartialEq, Eq, Hash,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Region,
    Settlement,
    District,
    Exterior,
    Interior,
    Room,
    Feature,
}

#[derive(
    Serialize, Deserialize, Debug, EnumString, EnumVariantNames, AsRefStr, Display, Clone, Copy,
    PartialEq, Eq, Hash,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Undiscovered,
    Discovered,
    Rumored,
    QuestTarget,
}

#[derive(
    Serialize, Deserialize, Debug, EnumString, EnumVariantNames, AsRefStr, Display, Clone, Copy,
    PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EdgeCategory {
    Path,
    Road,
    SeaRoute,
    Teleporter,
    Door,
    SecretPassage,
    RiverCrossing,
    TemporaryBridge,
    Shortcut,
    BoardingHook,
}

#[derive(
    Serialize, Deserialize, Debug, EnumString, EnumVariantNames, AsRefStr, Display, Clone, Copy,
    PartialEq, Eq, Hash,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Open,
    Closed,
    Locked,
    Blocked,
    Hidden,
    Rumored,
    OneWay,
    Collapsed,
    Inactive,
}

/// Where the renderer last drew a node. Not authoritative for
/// anything else.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapNode {
    pub id: Key,
    pub name: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    pub description: String,
    pub category: NodeCategory,
    pub status: NodeStatus,

    /// ROOT_NODE_ID for top-level nodes.
    pub parent_id: Key,

    #[serde(default)]
    pub is_leaf: bool,

    #[serde(default)]
    pub visited: bool,

    #[serde(default)]
    pub position: Position,
}

impl MapNode {
    pub fn is_top_level(&self) -> bool {
        self.parent_id == ROOT_NODE_ID
    }

    /// Name or alias match, ignoring case.
    pub fn answers_to(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapEdge {
    pub id: Key,
    pub source_id: Key,
    pub target_id: Key,
    pub category: EdgeCategory,
    pub status: EdgeStatus,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_time: Option<String>,
}

impl MapEdge {
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(&self.source_id, &self.target_id, self.category)
    }
}

/// Order-independent identity of an edge: swapping the endpoints of
/// an edge with the same category yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub lower: String,
    pub upper: String,
    pub category: EdgeCategory,
}

impl EdgeKey {
    pub fn new(a: &str, b: &str, category: EdgeCategory) -> EdgeKey {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();

        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        EdgeKey {
            lower,
            upper,
            category,
        }
    }
}

/// All nodes and edges of the active setting. Only the commit step
/// writes to it; everything else gets a shared reference or a clone.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapGraph {
    pub(crate) nodes: Vec<MapNode>,
    pub(crate) edges: Vec<MapEdge>,

    #[serde(default)]
    pub(crate) current_location: Option<Key>,
}

impl MapGraph {
    pub fn new() -> MapGraph {
        MapGraph::default()
    }

    pub fn nodes(&self) -> &[MapNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[MapEdge] {
        &self.edges
    }

    pub fn current_location(&self) -> Option<&MapNode> {
        self.current_location.as_deref().and_then(|id| self.node(id))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&MapNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut MapNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&MapEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub(crate) fn edge_mut(&mut self, id: &str) -> Option<&mut MapEdge> {
        self.edges.iter_mut().find(|e| e.id == id)
    }

    /// Resolve a soft reference: exact id first, then display name,
    /// then alias. Names compare case-insensitively.
    pub fn resolve_node(&self, reference: &str) -> Option<&MapNode> {
        let reference = reference.trim();

        self.nodes
            .iter()
            .find(|n| n.id.eq_ignore_ascii_case(reference))
            .or_else(|| {
                self.nodes
                    .iter()
                    .find(|n| n.name.eq_ignore_ascii_case(reference))
            })
            .or_else(|| self.nodes.iter().find(|n| n.answers_to(reference)))
    }

    pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a MapNode> + 'a {
        self.nodes.iter().filter(move |n| n.parent_id == id)
    }

    pub fn edges_touching<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a MapEdge> + 'a {
        self.edges.iter().filter(move |e| e.touches(id))
    }

    pub fn find_edge(&self, key: &EdgeKey) -> Option<&MapEdge> {
        self.edges.iter().find(|e| &e.key() == key)
    }

    /// Parent node, or None for top-level nodes.
    pub fn parent_of(&self, node: &MapNode) -> Option<&MapNode> {
        match node.is_top_level() {
            true => None,
            false => self.node(&node.parent_id),
        }
    }

    /// True if `node_id` sits somewhere below `ancestor_id`.
    pub fn is_descendant(&self, node_id: &str, ancestor_id: &str) -> bool {
        let mut current = self.node(node_id);
        let mut hops = 0;

        while let Some(node) = current {
            if node.parent_id == ancestor_id {
                return true;
            }

            // guard against a corrupt parent chain
            hops += 1;
            if hops > self.nodes.len() {
                return false;
            }

            current = self.parent_of(node);
        }

        false
    }

    pub(crate) fn refresh_leaf_flags(&mut self) {
        let parents: Vec<Key> = self.nodes.iter().map(|n| n.parent_id.clone()).collect();

        for node in self.nodes.iter_mut() {
            node.is_leaf = !parents.contains(&node.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, name: &str, category: NodeCategory, parent: &str) -> MapNode {
        MapNode {
            id: id.to_string(),
            name: name.to_string(),
            aliases: vec![],
            description: String::new(),
            category,
            status: NodeStatus::Discovered,
            parent_id: parent.to_string(),
            is_leaf: true,
            visited: false,
            position: Position::default(),
        }
    }

    #[test]
    fn edge_key_ignores_direction_and_case() {
        assert_eq!(
            EdgeKey::new("Mill", "town", EdgeCategory::Path),
            EdgeKey::new("Town", "mill", EdgeCategory::Path)
        );
        assert_ne!(
            EdgeKey::new("mill", "town", EdgeCategory::Path),
            EdgeKey::new("mill", "town", EdgeCategory::Road)
        );
    }

    #[test]
    fn resolve_prefers_id_then_name_then_alias() {
        let mut graph = MapGraph::new();
        let mut mill = node("node_1", "Old Mill", NodeCategory::Exterior, ROOT_NODE_ID);
        mill.aliases.push("the mill".to_string());
        graph.nodes.push(mill);

        assert_eq!(graph.resolve_node("node_1").map(|n| n.id.as_str()), Some("node_1"));
        assert_eq!(graph.resolve_node("old mill").map(|n| n.id.as_str()), Some("node_1"));
        assert_eq!(graph.resolve_node("The Mill").map(|n| n.id.as_str()), Some("node_1"));
        assert!(graph.resolve_node("bakery").is_none());
    }

    #[test]
    fn descendants_and_leaves() {
        let mut graph = MapGraph::new();
        graph.nodes.push(node("node_r", "Vale", NodeCategory::Region, ROOT_NODE_ID));
        graph.nodes.push(node("node_s", "Town", NodeCategory::Settlement, "node_r"));
        graph.nodes.push(node("node_f", "Well", NodeCategory::Feature, "node_s"));
        graph.refresh_leaf_flags();

        assert!(graph.is_descendant("node_f", "node_r"));
        assert!(!graph.is_descendant("node_r", "node_f"));
        assert!(!graph.node("node_r").map(|n| n.is_leaf).unwrap_or(true));
        assert!(graph.node("node_f").map(|n| n.is_leaf).unwrap_or(false));
    }
}
