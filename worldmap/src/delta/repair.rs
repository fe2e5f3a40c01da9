use crate::models::delta::{Delta, EdgeRef, EdgeRemove, EdgeUpdate, NodeRemove, StatusChange};
use crate::models::map::{EdgeCategory, EdgeKey};
use crate::models::{looks_like_edge_id, looks_like_node_id};
use std::collections::HashSet;
use tracing::debug;

/// One deterministic fix. Takes the delta by value and returns the
/// repaired one, noting what it changed.
pub type RepairStep = fn(Delta, &mut Vec<String>) -> Delta;

/// Order matters: removal rewrites can produce removals that the
/// reclassification step then has to look at.
pub const REPAIR_STEPS: [RepairStep; 3] = [
    rewrite_removal_updates,
    reclassify_removals,
    dedup_edges,
];

/// An update whose new status means "gone" becomes a removal of the
/// same entity. Any other changes on that update are moot.
pub fn rewrite_removal_updates(mut delta: Delta, notes: &mut Vec<String>) -> Delta {
    let (removals, updates): (Vec<_>, Vec<_>) = delta
        .nodes_to_update
        .into_iter()
        .partition(|u| u.status.as_ref().map(StatusChange::is_removal).unwrap_or(false));

    delta.nodes_to_update = updates;
    for update in removals {
        notes.push(format!("node update on '{}' rewritten as a removal", update.target));
        delta.nodes_to_remove.push(NodeRemove {
            target: update.target,
        });
    }

    let (removals, updates): (Vec<_>, Vec<_>) = delta
        .edges_to_update
        .into_iter()
        .partition(|u| u.status.as_ref().map(StatusChange::is_removal).unwrap_or(false));

    delta.edges_to_update = updates;
    for update in removals {
        notes.push(format!("edge update on {} rewritten as a removal", describe_edge(&update.edge)));
        delta.edges_to_remove.push(EdgeRemove { edge: update.edge });
    }

    delta
}

/// A removal filed under the wrong kind, judged by id prefix, moves to
/// the right list.
pub fn reclassify_removals(mut delta: Delta, notes: &mut Vec<String>) -> Delta {
    let (edges, nodes): (Vec<_>, Vec<_>) = delta
        .nodes_to_remove
        .into_iter()
        .partition(|r| looks_like_edge_id(&r.target));

    let (misfiled_nodes, edge_removals): (Vec<_>, Vec<_>) = delta
        .edges_to_remove
        .into_iter()
        .partition(|r| matches!(&r.edge, EdgeRef::Id(id) if looks_like_node_id(id)));

    delta.nodes_to_remove = nodes;
    delta.edges_to_remove = edge_removals;

    for removal in edges {
        notes.push(format!("'{}' moved from node to edge removals", removal.target));
        delta.edges_to_remove.push(EdgeRemove {
            edge: EdgeRef::Id(removal.target),
        });
    }

    for removal in misfiled_nodes {
        if let EdgeRef::Id(id) = removal.edge {
            notes.push(format!("'{}' moved from edge to node removals", id));
            delta.nodes_to_remove.push(NodeRemove { target: id });
        }
    }

    delta
}

#[derive(Hash, PartialEq, Eq)]
enum UpdateKey {
    Id(String),
    Endpoints(String, String, Option<EdgeCategory>),
}

fn update_key(update: &EdgeUpdate) -> UpdateKey {
    match &update.edge {
        EdgeRef::Id(id) => UpdateKey::Id(id.to_lowercase()),
        EdgeRef::Endpoints {
            source,
            target,
            category,
        } => {
            // Reuse the undirected ordering of EdgeKey.
            let key = EdgeKey::new(source, target, category.unwrap_or(EdgeCategory::Path));
            UpdateKey::Endpoints(key.lower, key.upper, *category)
        }
    }
}

/// The same logical edge proposed twice, in either direction, keeps
/// only its first occurrence.
pub fn dedup_edges(mut delta: Delta, notes: &mut Vec<String>) -> Delta {
    let mut seen = HashSet::new();
    delta.edges_to_add.retain(|add| {
        let first = seen.insert(EdgeKey::new(&add.source, &add.target, add.category));
        if !first {
            notes.push(format!(
                "duplicate {} edge between '{}' and '{}' dropped",
                add.category, add.source, add.target
            ));
        }
        first
    });

    let mut seen = HashSet::new();
    delta.edges_to_update.retain(|update| {
        let first = seen.insert(update_key(update));
        if !first {
            notes.push(format!("duplicate update on {} dropped", describe_edge(&update.edge)));
        }
        first
    });

    delta
}

fn describe_edge(edge: &EdgeRef) -> String {
    match edge {
        EdgeRef::Id(id) => format!("'{}'", id),
        EdgeRef::Endpoints { source, target, .. } => format!("'{}' - '{}'", source, target),
    }
}

/// Run every step in order.
pub fn repair(delta: Delta) -> (Delta, Vec<String>) {
    let mut notes = vec![];
    let delta = REPAIR_STEPS
        .iter()
        .fold(delta, |delta, step| step(delta, &mut notes));

    for note in &notes {
        debug!(repair = %note, "heuristic repair");
    }

    (delta, notes)
}
