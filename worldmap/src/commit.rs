use crate::models::delta::{Delta, EdgeAdd, EdgeRef, EdgeUpdate, NodeAdd, NodeUpdate, StatusChange};
use crate::models::map::{EdgeCategory, EdgeKey, MapEdge, MapGraph, MapNode, Position};
use crate::models::{is_root_reference, new_edge_id, new_node_id, Key, ROOT_NODE_ID};
use serde::Serialize;
use tracing::{debug, info};

const CHILD_OFFSET_X: f32 = 48.0;
const CHILD_OFFSET_Y: f32 = 64.0;
const TOP_LEVEL_SPACING: f32 = 160.0;

/// Ids of everything a commit touched, for the renderer and the
/// prompt builder.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapPatch {
    pub added_nodes: Vec<Key>,
    pub updated_nodes: Vec<Key>,
    pub removed_nodes: Vec<Key>,
    pub added_edges: Vec<Key>,
    pub updated_edges: Vec<Key>,
    pub removed_edges: Vec<Key>,
}

impl MapPatch {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.updated_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.updated_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub patch: MapPatch,
    pub new_nodes: Vec<MapNode>,
    pub new_edges: Vec<MapEdge>,

    /// Operations that could not be applied, usually because a soft
    /// reference named nothing on the map.
    pub skipped: Vec<String>,
}

fn push_unique(ids: &mut Vec<Key>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

struct Commit<'g> {
    graph: &'g mut MapGraph,
    patch: MapPatch,
    skipped: Vec<String>,
}

impl<'g> Commit<'g> {
    fn skip(&mut self, reason: String) {
        debug!(reason = %reason, "commit skipped operation");
        self.skipped.push(reason);
    }

    fn mark_node_updated(&mut self, id: &str) {
        if !self.patch.added_nodes.iter().any(|added| added == id) {
            push_unique(&mut self.patch.updated_nodes, id);
        }
    }

    fn mark_edge_updated(&mut self, id: &str) {
        if !self.patch.added_edges.iter().any(|added| added == id) {
            push_unique(&mut self.patch.updated_edges, id);
        }
    }

    /// Hard id for a parent reference. The root sentinel is always
    /// resolvable.
    fn resolve_parent(&self, reference: &str) -> Option<Key> {
        match is_root_reference(reference) {
            true => Some(ROOT_NODE_ID.to_string()),
            false => self.resolve_node_id(reference),
        }
    }

    /// Ids win, then the names of nodes this commit added, then the
    /// rest of the map.
    fn resolve_node_id(&self, reference: &str) -> Option<Key> {
        let reference = reference.trim();

        self.graph
            .nodes
            .iter()
            .find(|n| n.id.eq_ignore_ascii_case(reference))
            .or_else(|| {
                self.patch
                    .added_nodes
                    .iter()
                    .filter_map(|id| self.graph.node(id))
                    .find(|n| n.name.eq_ignore_ascii_case(reference))
            })
            .or_else(|| self.graph.resolve_node(reference))
            .map(|n| n.id.clone())
    }

    fn position_for_child(&self, parent_id: &str) -> Position {
        let siblings = self.graph.children_of(parent_id).count() as f32;

        match self.graph.node(parent_id) {
            Some(parent) => Position {
                x: parent.position.x + CHILD_OFFSET_X * siblings,
                y: parent.position.y + CHILD_OFFSET_Y,
            },
            None => Position {
                x: TOP_LEVEL_SPACING * siblings,
                y: 0.0,
            },
        }
    }

    fn create_node(&mut self, add: &NodeAdd, parent_id: Key) {
        let existing_sibling = self
            .graph
            .children_of(&parent_id)
            .find(|n| n.name.eq_ignore_ascii_case(&add.name))
            .map(|n| n.id.clone());

        if let Some(id) = existing_sibling {
            self.skip(format!("node '{}' already exists as {}", add.name, id));
            return;
        }

        let mut aliases: Vec<String> = vec![];
        for alias in &add.aliases {
            if !alias.eq_ignore_ascii_case(&add.name) && !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }

        let node = MapNode {
            id: new_node_id(),
            name: add.name.clone(),
            aliases,
            description: add.description.clone(),
            category: add.category,
            status: add.status,
            position: self.position_for_child(&parent_id),
            parent_id,
            is_leaf: true,
            visited: false,
        };

        push_unique(&mut self.patch.added_nodes, &node.id);
        self.graph.nodes.push(node);
    }

    /// Adds may name a parent that is itself added later in the list,
    /// so keep sweeping until a pass makes no progress.
    fn add_nodes(&mut self, adds: &[NodeAdd]) {
        let mut pending: Vec<&NodeAdd> = adds.iter().collect();

        loop {
            let before = pending.len();
            let mut still_pending = vec![];

            for add in pending {
                match self.resolve_parent(&add.parent) {
                    Some(parent_id) => self.create_node(add, parent_id),
                    None => still_pending.push(add),
                }
            }

            pending = still_pending;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        for add in pending {
            self.skip(format!("node '{}': parent '{}' not found", add.name, add.parent));
        }
    }

    fn update_node(&mut self, update: &NodeUpdate) {
        let id = match self.resolve_node_id(&update.target) {
            Some(id) => id,
            None => return self.skip(format!("node update: '{}' not found", update.target)),
        };

        let new_parent = match &update.parent {
            Some(reference) => match self.resolve_parent(reference) {
                Some(parent_id) if parent_id == id || self.graph.is_descendant(&parent_id, &id) => {
                    self.skip(format!("reparenting '{}' under '{}' would create a cycle", update.target, reference));
                    None
                }
                Some(parent_id) => Some(parent_id),
                None => {
                    self.skip(format!("node update: parent '{}' not found", reference));
                    None
                }
            },
            None => None,
        };

        let node = match self.graph.node_mut(&id) {
            Some(node) => node,
            None => return,
        };

        if let Some(new_name) = update.new_name.as_ref().filter(|n| !n.eq_ignore_ascii_case(&node.name)) {
            let old_name = std::mem::replace(&mut node.name, new_name.clone());
            node.aliases.retain(|a| !a.eq_ignore_ascii_case(new_name));
            if !node.aliases.iter().any(|a| a.eq_ignore_ascii_case(&old_name)) {
                node.aliases.push(old_name);
            }
        }

        if let Some(description) = &update.description {
            node.description = description.clone();
        }

        if let Some(category) = update.category {
            node.category = category;
        }

        if let Some(StatusChange::Set(status)) = update.status {
            node.status = status;
        }

        if let Some(parent_id) = new_parent {
            node.parent_id = parent_id;
        }

        for alias in &update.aliases {
            if !node.answers_to(alias) {
                node.aliases.push(alias.clone());
            }
        }

        self.mark_node_updated(&id);
    }

    fn add_edge(&mut self, add: &EdgeAdd) {
        let (source, target) = match (self.resolve_node_id(&add.source), self.resolve_node_id(&add.target)) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return self.skip(format!(
                    "edge '{}' - '{}': endpoint not found",
                    add.source, add.target
                ))
            }
        };

        if source == target {
            return self.skip(format!("edge '{}' - '{}' joins a node to itself", add.source, add.target));
        }

        let key = EdgeKey::new(&source, &target, add.category);
        if let Some(existing_id) = self.graph.find_edge(&key).map(|e| e.id.clone()) {
            if let Some(edge) = self.graph.edge_mut(&existing_id) {
                edge.status = add.status;
                if !add.description.is_empty() {
                    edge.description = add.description.clone();
                }
                if add.travel_time.is_some() {
                    edge.travel_time = add.travel_time.clone();
                }
            }
            self.mark_edge_updated(&existing_id);
            return;
        }

        let edge = MapEdge {
            id: new_edge_id(),
            source_id: source,
            target_id: target,
            category: add.category,
            status: add.status,
            description: add.description.clone(),
            travel_time: add.travel_time.clone(),
        };

        push_unique(&mut self.patch.added_edges, &edge.id);
        self.graph.edges.push(edge);
    }

    /// All existing edges an edge reference names. Endpoint references
    /// match either direction.
    fn resolve_edges(&self, edge: &EdgeRef) -> Vec<Key> {
        match edge {
            EdgeRef::Id(id) => self
                .graph
                .edges
                .iter()
                .filter(|e| e.id.eq_ignore_ascii_case(id))
                .map(|e| e.id.clone())
                .collect(),
            EdgeRef::Endpoints {
                source,
                target,
                category,
            } => {
                let (source, target) = match (self.resolve_node_id(source), self.resolve_node_id(target)) {
                    (Some(source), Some(target)) => (source, target),
                    _ => return vec![],
                };

                self.graph
                    .edges
                    .iter()
                    .filter(|e| e.touches(&source) && e.touches(&target))
                    .filter(|e| category.map(|c| c == e.category).unwrap_or(true))
                    .map(|e| e.id.clone())
                    .collect()
            }
        }
    }

    fn update_edge(&mut self, update: &EdgeUpdate) {
        let ids = self.resolve_edges(&update.edge);
        if ids.is_empty() {
            return self.skip(format!("edge update: no edge matches {:?}", update.edge));
        }

        for id in ids {
            if let Some(category) = update.category {
                self.recategorize_edge(&id, category);
            }
            if let Some(edge) = self.graph.edge_mut(&id) {
                if let Some(StatusChange::Set(status)) = update.status {
                    edge.status = status;
                }
                if let Some(description) = &update.description {
                    edge.description = description.clone();
                }
                if update.travel_time.is_some() {
                    edge.travel_time = update.travel_time.clone();
                }
            }
            self.mark_edge_updated(&id);
        }
    }

    /// The category change is dropped when another edge between the same
    /// endpoints already has that category.
    fn recategorize_edge(&mut self, id: &str, category: EdgeCategory) {
        let key = match self.graph.edge(id) {
            Some(edge) => EdgeKey::new(&edge.source_id, &edge.target_id, category),
            None => return,
        };

        if let Some(existing) = self.graph.find_edge(&key).filter(|e| e.id != id) {
            let existing = existing.id.clone();
            return self.skip(format!("edge {}: a {} edge already joins its ends ({})", id, category, existing));
        }

        if let Some(edge) = self.graph.edge_mut(id) {
            edge.category = category;
        }
    }

    fn remove_edge_id(&mut self, id: &str) {
        self.graph.edges.retain(|e| e.id != id);
        self.patch.added_edges.retain(|e| e != id);
        self.patch.updated_edges.retain(|e| e != id);
        push_unique(&mut self.patch.removed_edges, id);
    }

    fn remove_edge(&mut self, edge: &EdgeRef) {
        let ids = self.resolve_edges(edge);
        if ids.is_empty() {
            return self.skip(format!("edge removal: no edge matches {:?}", edge));
        }

        for id in ids {
            self.remove_edge_id(&id);
        }
    }

    /// Removing a node takes its edges with it and hands its children
    /// to its own parent.
    fn remove_node(&mut self, target: &str) {
        let (id, parent_id) = match self.graph.resolve_node(target) {
            Some(node) => (node.id.clone(), node.parent_id.clone()),
            None => return self.skip(format!("node removal: '{}' not found", target)),
        };

        let touching: Vec<Key> = self.graph.edges_touching(&id).map(|e| e.id.clone()).collect();
        for edge_id in touching {
            self.remove_edge_id(&edge_id);
        }

        let children: Vec<Key> = self.graph.children_of(&id).map(|n| n.id.clone()).collect();
        for child_id in children {
            if let Some(child) = self.graph.node_mut(&child_id) {
                child.parent_id = parent_id.clone();
            }
            self.mark_node_updated(&child_id);
        }

        if self.graph.current_location.as_deref() == Some(id.as_str()) {
            self.graph.current_location = match parent_id == ROOT_NODE_ID {
                true => None,
                false => Some(parent_id.clone()),
            };
        }

        self.graph.nodes.retain(|n| n.id != id);
        self.patch.added_nodes.retain(|n| n != &id);
        self.patch.updated_nodes.retain(|n| n != &id);
        push_unique(&mut self.patch.removed_nodes, &id);
    }

    fn move_player(&mut self, reference: &str) {
        match self.resolve_node_id(reference) {
            Some(id) => {
                if let Some(node) = self.graph.node_mut(&id) {
                    node.visited = true;
                }
                self.graph.current_location = Some(id);
            }
            None => self.skip(format!("suggested location '{}' not found", reference)),
        }
    }

    fn run(mut self, delta: &Delta) -> CommitResult {
        self.add_nodes(&delta.nodes_to_add);
        delta.nodes_to_update.iter().for_each(|u| self.update_node(u));
        delta.edges_to_add.iter().for_each(|a| self.add_edge(a));
        delta.edges_to_update.iter().for_each(|u| self.update_edge(u));
        delta.edges_to_remove.iter().for_each(|r| self.remove_edge(&r.edge));
        delta.nodes_to_remove.iter().for_each(|r| self.remove_node(&r.target));

        if let Some(location) = &delta.suggested_current_location {
            self.move_player(location);
        }

        self.graph.refresh_leaf_flags();

        let new_nodes = self
            .patch
            .added_nodes
            .iter()
            .filter_map(|id| self.graph.node(id).cloned())
            .collect();

        let new_edges = self
            .patch
            .added_edges
            .iter()
            .filter_map(|id| self.graph.edge(id).cloned())
            .collect();

        CommitResult {
            patch: self.patch,
            new_nodes,
            new_edges,
            skipped: self.skipped,
        }
    }
}

/// Merge a delta into the graph. Works on a copy and swaps it in at
/// the end, so the caller never sees a half-applied delta. Operations
/// whose references cannot be resolved are skipped and reported.
pub fn apply_delta(graph: &mut MapGraph, delta: &Delta) -> CommitResult {
    let mut working = graph.clone();
    let result = Commit {
        graph: &mut working,
        patch: MapPatch::default(),
        skipped: vec![],
    }
    .run(delta);

    *graph = working;

    info!(
        added_nodes = result.patch.added_nodes.len(),
        added_edges = result.patch.added_edges.len(),
        removed_nodes = result.patch.removed_nodes.len(),
        removed_edges = result.patch.removed_edges.len(),
        skipped = result.skipped.len(),
        "delta committed"
    );

    result
}

/// The graph as it would look with the delta applied. The input graph
/// is not touched.
pub fn preview(graph: &MapGraph, delta: &Delta) -> (MapGraph, CommitResult) {
    let mut working = graph.clone();
    let result = Commit {
        graph: &mut working,
        patch: MapPatch::default(),
        skipped: vec![],
    }
    .run(delta);

    (working, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::process_response;
    use crate::models::delta::{EdgeRemove, NodeRemove};
    use crate::models::map::{EdgeCategory, EdgeStatus, NodeCategory, NodeStatus};

    fn node_add(name: &str, category: NodeCategory, parent: &str) -> NodeAdd {
        NodeAdd {
            name: name.to_string(),
            description: String::new(),
            category,
            status: NodeStatus::Discovered,
            parent: parent.to_string(),
            aliases: vec![],
            split_from: None,
        }
    }

    fn edge_add(source: &str, target: &str, category: EdgeCategory) -> EdgeAdd {
        EdgeAdd {
            source: source.to_string(),
            target: target.to_string(),
            category,
            status: EdgeStatus::Open,
            description: String::new(),
            travel_time: None,
        }
    }

    fn id_of(graph: &MapGraph, name: &str) -> Key {
        graph
            .resolve_node(name)
            .map(|n| n.id.clone())
            .unwrap_or_else(|| panic!("no node named {}", name))
    }

    fn village() -> MapGraph {
        let mut graph = MapGraph::new();
        let delta = Delta {
            nodes_to_add: vec![
                node_add("Vale", NodeCategory::Region, "root"),
                node_add("Town", NodeCategory::Settlement, "Vale"),
                node_add("Farm", NodeCategory::Exterior, "Vale"),
            ],
            edges_to_add: vec![edge_add("Town", "Farm", EdgeCategory::Road)],
            ..Default::default()
        };
        apply_delta(&mut graph, &delta);
        graph
    }

    #[test]
    fn old_mill_gets_a_minted_id() {
        let text = r#"{"nodesToAdd": [{"name": "Old Mill", "category": "building",
            "parentId": "root", "status": "found"}]}"#;
        let delta = process_response(text).expect("should be accepted");

        let mut graph = MapGraph::new();
        let result = apply_delta(&mut graph, &delta);

        assert_eq!(result.new_nodes.len(), 1);
        let mill = &result.new_nodes[0];
        assert!(mill.id.starts_with("node_"));
        assert_eq!(mill.category, NodeCategory::Exterior);
        assert_eq!(mill.status, NodeStatus::Discovered);
        assert!(mill.is_top_level());
        assert_eq!(result.patch.added_nodes, vec![mill.id.clone()]);
        assert_eq!(graph.node(&mill.id), Some(mill));
    }

    #[test]
    fn children_may_precede_parents() {
        let mut graph = MapGraph::new();
        let delta = Delta {
            nodes_to_add: vec![
                node_add("Well", NodeCategory::Feature, "Town"),
                node_add("Town", NodeCategory::Settlement, "root"),
                node_add("Shed", NodeCategory::Exterior, "Nowhere"),
            ],
            ..Default::default()
        };

        let result = apply_delta(&mut graph, &delta);
        assert_eq!(result.new_nodes.len(), 2);
        assert_eq!(result.skipped.len(), 1);

        let town = id_of(&graph, "Town");
        assert_eq!(graph.resolve_node("Well").map(|n| n.parent_id.clone()), Some(town.clone()));
        assert_eq!(graph.node(&town).map(|n| n.is_leaf), Some(false));
    }

    #[test]
    fn reversed_edges_collapse_into_one() {
        let mut graph = village();
        let delta = Delta {
            edges_to_add: vec![
                edge_add("Farm", "Town", EdgeCategory::Road),
                edge_add("Town", "Farm", EdgeCategory::Path),
            ],
            ..Default::default()
        };

        let result = apply_delta(&mut graph, &delta);
        assert_eq!(result.patch.added_edges.len(), 1);
        assert_eq!(result.patch.updated_edges.len(), 1);
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn recategorizing_onto_an_existing_edge_is_skipped() {
        let mut graph = village();
        apply_delta(&mut graph, &Delta {
            edges_to_add: vec![edge_add("Town", "Farm", EdgeCategory::Path)],
            ..Default::default()
        });
        let path = graph
            .edges()
            .iter()
            .find(|e| e.category == EdgeCategory::Path)
            .map(|e| e.id.clone())
            .unwrap_or_default();

        let result = apply_delta(&mut graph, &Delta {
            edges_to_update: vec![EdgeUpdate {
                edge: EdgeRef::Id(path.clone()),
                category: Some(EdgeCategory::Road),
                status: Some(StatusChange::Set(EdgeStatus::Blocked)),
                description: None,
                travel_time: None,
            }],
            ..Default::default()
        });

        let roads = graph.edges().iter().filter(|e| e.category == EdgeCategory::Road).count();
        assert_eq!(roads, 1);
        assert_eq!(graph.edges().len(), 2);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(graph.edge(&path).map(|e| (e.category, e.status)), Some((EdgeCategory::Path, EdgeStatus::Blocked)));
    }

    #[test]
    fn names_prefer_nodes_added_in_the_same_commit() {
        let mut graph = village();
        apply_delta(&mut graph, &Delta {
            nodes_to_add: vec![
                node_add("Barn", NodeCategory::Exterior, "Town"),
                node_add("Cart", NodeCategory::Feature, "Town"),
            ],
            ..Default::default()
        });
        let old_barn = id_of(&graph, "Barn");
        let cart = id_of(&graph, "Cart");

        let result = apply_delta(&mut graph, &Delta {
            nodes_to_add: vec![
                node_add("Barn", NodeCategory::Exterior, "Farm"),
                node_add("Hay", NodeCategory::Feature, "barn"),
            ],
            nodes_to_update: vec![NodeUpdate::reparent(&cart, "Barn")],
            ..Default::default()
        });

        let new_barn = result.new_nodes.iter().find(|n| n.name == "Barn").map(|n| n.id.clone());
        assert!(new_barn.is_some());
        assert_ne!(new_barn.as_ref(), Some(&old_barn));

        let parent_of = |name: &str| graph.nodes().iter().find(|n| n.name == name).map(|n| n.parent_id.clone());
        assert_eq!(parent_of("Hay"), new_barn);
        assert_eq!(parent_of("Cart"), new_barn);
        assert!(graph.children_of(&old_barn).next().is_none());
    }

    #[test]
    fn removal_cascades_to_edges_and_children() {
        let mut graph = village();
        let town = id_of(&graph, "Town");
        let vale = id_of(&graph, "Vale");
        apply_delta(&mut graph, &Delta {
            nodes_to_add: vec![node_add("Inn", NodeCategory::Exterior, "Town")],
            suggested_current_location: Some("Town".to_string()),
            ..Default::default()
        });

        let result = apply_delta(&mut graph, &Delta {
            nodes_to_remove: vec![NodeRemove {
                target: "town".to_string(),
            }],
            ..Default::default()
        });

        assert!(graph.node(&town).is_none());
        assert!(graph.edges().is_empty());
        assert_eq!(result.patch.removed_edges.len(), 1);
        assert_eq!(graph.resolve_node("Inn").map(|n| n.parent_id.clone()), Some(vale.clone()));
        assert_eq!(graph.current_location().map(|n| n.id.clone()), Some(vale));
    }

    #[test]
    fn rename_keeps_old_name_as_alias() {
        let mut graph = village();
        apply_delta(&mut graph, &Delta {
            nodes_to_update: vec![NodeUpdate {
                target: "Town".to_string(),
                new_name: Some("Millbrook".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        });

        let town = graph.resolve_node("town").expect("old name still resolves");
        assert_eq!(town.name, "Millbrook");
    }

    #[test]
    fn cyclic_reparent_is_skipped() {
        let mut graph = village();
        let vale = id_of(&graph, "Vale");
        let result = apply_delta(&mut graph, &Delta {
            nodes_to_update: vec![NodeUpdate::reparent("Vale", "Town")],
            ..Default::default()
        });

        assert_eq!(result.skipped.len(), 1);
        assert_eq!(graph.node(&vale).map(|n| n.parent_id.as_str()), Some(ROOT_NODE_ID));
    }

    #[test]
    fn edges_addressed_by_endpoints() {
        let mut graph = village();
        apply_delta(&mut graph, &Delta {
            edges_to_update: vec![EdgeUpdate {
                edge: EdgeRef::Endpoints {
                    source: "Farm".to_string(),
                    target: "Town".to_string(),
                    category: None,
                },
                category: None,
                status: Some(StatusChange::Set(EdgeStatus::Blocked)),
                description: None,
                travel_time: None,
            }],
            ..Default::default()
        });
        assert_eq!(graph.edges()[0].status, EdgeStatus::Blocked);

        let result = apply_delta(&mut graph, &Delta {
            edges_to_remove: vec![EdgeRemove {
                edge: EdgeRef::Endpoints {
                    source: "Town".to_string(),
                    target: "Farm".to_string(),
                    category: Some(EdgeCategory::Path),
                },
            }],
            ..Default::default()
        });
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn preview_leaves_graph_alone() {
        let graph = village();
        let before = graph.clone();

        let (preview, result) = preview(&graph, &Delta {
            nodes_to_add: vec![node_add("Mill", NodeCategory::Exterior, "Vale")],
            ..Default::default()
        });

        assert_eq!(graph, before);
        assert_eq!(preview.nodes().len(), before.nodes().len() + 1);
        assert_eq!(result.new_nodes.len(), 1);
    }
}
