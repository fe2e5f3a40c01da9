use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::commit;
use crate::models::coherence::{CoherenceFailure, HierarchyFix, OrphanDestination};
use crate::models::delta::{Delta, NodeUpdate};
use crate::models::map::{MapGraph, MapNode, NodeCategory};
use crate::models::{Key, ROOT_NODE_ID};

use super::generator::AiGenerator;

/// How many times the hierarchy is re-checked after fixing it. Each
/// fix can push a feature one level up, into another violation.
pub const MAX_HIERARCHY_PASSES: usize = 8;

fn is_feature(node: &MapNode) -> bool {
    node.category == NodeCategory::Feature
}

/// How the delta should refer to a node seen in a preview: new nodes
/// only exist in the delta by name, existing ones have stable ids.
fn soft_ref(node_id: &str, preview: &MapGraph, added: &[Key]) -> String {
    if node_id == ROOT_NODE_ID {
        return ROOT_NODE_ID.to_string();
    }

    match (preview.node(node_id), added.iter().any(|id| id == node_id)) {
        (Some(node), true) => node.name.clone(),
        _ => node_id.to_string(),
    }
}

fn unique_fallback_name(name: &str, taken: &[String]) -> String {
    (2..)
        .map(|n| format!("{} ({})", name, n))
        .find(|candidate| !taken.iter().any(|t| t.eq_ignore_ascii_case(candidate)))
        .unwrap_or_else(|| name.to_string())
}

fn find_duplicate_names(delta: &Delta) -> Vec<CoherenceFailure> {
    let mut groups: Vec<(String, Vec<usize>)> = vec![];

    for (index, add) in delta.nodes_to_add.iter().enumerate() {
        let key = add.name.to_lowercase();
        match groups.iter_mut().find(|(name, _)| *name == key) {
            Some((_, indexes)) => indexes.push(index),
            None => groups.push((key, vec![index])),
        }
    }

    groups
        .into_iter()
        .filter(|(_, indexes)| indexes.len() > 1)
        .map(|(_, indexes)| CoherenceFailure::DuplicateName {
            name: delta.nodes_to_add[indexes[0]].name.clone(),
            duplicates: indexes[1..].to_vec(),
        })
        .collect()
}

fn find_orphans(graph: &MapGraph, delta: &Delta) -> Vec<CoherenceFailure> {
    let reparented = delta.nodes_to_update.iter().filter(|u| u.parent.is_some()).map(|u| &u.target);
    let removed = delta.nodes_to_remove.iter().map(|r| &r.target);

    let already_moved: HashSet<Key> = reparented
        .chain(removed)
        .filter_map(|reference| graph.resolve_node(reference).map(|n| n.id.clone()))
        .collect();

    delta
        .nodes_to_add
        .iter()
        .filter_map(|add| {
            let original = graph.resolve_node(add.split_from.as_deref()?)?;
            let children: Vec<Key> = graph
                .children_of(&original.id)
                .filter(|child| !already_moved.contains(&child.id))
                .map(|child| child.id.clone())
                .collect();

            match children.is_empty() {
                true => None,
                false => Some(CoherenceFailure::OrphanedChildren {
                    original: original.id.clone(),
                    new_name: add.name.clone(),
                    children,
                }),
            }
        })
        .collect()
}

/// Feature-inside-feature relations in the preview that involve a
/// node the delta touched. Violations already present in the map
/// before this turn are not ours to fix.
fn find_feature_violations(preview: &MapGraph, touched: &HashSet<Key>) -> Vec<CoherenceFailure> {
    preview
        .nodes()
        .iter()
        .filter(|child| is_feature(child))
        .filter_map(|child| {
            let parent = preview.parent_of(child).filter(|p| is_feature(p))?;
            let involved = touched.contains(&child.id) || touched.contains(&parent.id);

            involved.then(|| CoherenceFailure::FeatureParentsFeature {
                child: child.id.clone(),
                parent: parent.id.clone(),
            })
        })
        .collect()
}

/// True if this delta is what makes the parent a feature: it is being
/// added, or an update turns it into one.
fn parent_is_mutable(preview: &MapGraph, delta: &Delta, added: &[Key], parent: &MapNode) -> bool {
    added.contains(&parent.id)
        || delta.nodes_to_update.iter().any(|update| {
            update.category == Some(NodeCategory::Feature)
                && preview.resolve_node(&update.target).map(|n| n.id == parent.id).unwrap_or(false)
        })
}

/// The deterministic answer, or None when the choice is a toss-up and
/// worth asking about.
fn default_fix(preview: &MapGraph, delta: &Delta, added: &[Key], parent: &MapNode) -> Option<HierarchyFix> {
    if !parent_is_mutable(preview, delta, added, parent) {
        // Established places keep their category.
        return Some(HierarchyFix::MakeSibling);
    }

    let feature_children = preview.children_of(&parent.id).filter(|c| is_feature(c)).count();
    match feature_children {
        0 | 1 => None,
        _ => Some(HierarchyFix::PromoteParent),
    }
}

fn promoted_category(preview: &MapGraph, parent: &MapNode) -> NodeCategory {
    match preview.parent_of(parent).map(|g| g.category) {
        Some(NodeCategory::Interior) | Some(NodeCategory::Room) => NodeCategory::Room,
        _ => NodeCategory::Exterior,
    }
}

fn promote_parent(delta: &mut Delta, preview: &MapGraph, added: &[Key], parent: &MapNode) {
    let category = promoted_category(preview, parent);

    if added.contains(&parent.id) {
        for add in delta.nodes_to_add.iter_mut().filter(|a| a.name.eq_ignore_ascii_case(&parent.name)) {
            add.category = category;
        }
        return;
    }

    for update in delta.nodes_to_update.iter_mut() {
        let targets_parent = preview
            .resolve_node(&update.target)
            .map(|n| n.id == parent.id)
            .unwrap_or(false);

        if targets_parent && update.category == Some(NodeCategory::Feature) {
            update.category = Some(category);
        }
    }
}

fn make_sibling(delta: &mut Delta, preview: &MapGraph, added: &[Key], child: &MapNode, parent: &MapNode) {
    let grandparent = soft_ref(&parent.parent_id, preview, added);

    if added.contains(&child.id) {
        for add in delta.nodes_to_add.iter_mut().filter(|a| a.name.eq_ignore_ascii_case(&child.name)) {
            add.parent = grandparent.clone();
        }
        return;
    }

    // Later updates win at commit, so this overrides any reparent the
    // delta already had for the child.
    delta.nodes_to_update.push(NodeUpdate::reparent(&child.id, &grandparent));
}

/// Remove every operation that shapes either node of a violation we
/// could not fix, including the removal that pushed an existing child
/// up under its new parent.
fn drop_offending(delta: &mut Delta, graph: &MapGraph, preview: &MapGraph, child: &MapNode, parent: &MapNode) -> usize {
    let before = delta.op_count();
    let previous_parent = graph.node(&child.id).map(|n| n.parent_id.clone());

    let involved = |reference: &str| {
        preview
            .resolve_node(reference)
            .map(|n| n.id == child.id || n.id == parent.id)
            .unwrap_or(false)
    };

    delta
        .nodes_to_add
        .retain(|a| !a.name.eq_ignore_ascii_case(&child.name) && !a.name.eq_ignore_ascii_case(&parent.name));
    delta.nodes_to_update.retain(|u| !involved(&u.target));
    delta.nodes_to_remove.retain(|r| {
        let target = graph.resolve_node(&r.target).map(|n| n.id.clone());
        target.is_none() || target != previous_parent
    });

    before - delta.op_count()
}

/// The Consistency Resolver. Works on a delta that already passed
/// validation, against a read-only view of the map, and fixes what
/// would break the map's invariants once committed.
pub struct AiCoherence {
    generator: Rc<AiGenerator>,
}

impl AiCoherence {
    pub fn new(generator: Rc<AiGenerator>) -> AiCoherence {
        AiCoherence { generator }
    }

    /// Resolve name collisions, split orphans and hierarchy violations,
    /// in that order. Never fails: secondary-model trouble falls back
    /// to deterministic defaults.
    pub async fn make_delta_coherent(&self, graph: &MapGraph, mut delta: Delta) -> (Delta, Vec<CoherenceFailure>) {
        let mut failures = vec![];

        self.resolve_duplicate_names(&mut delta, &mut failures).await;
        self.resolve_orphans(graph, &mut delta, &mut failures).await;
        self.resolve_hierarchy(graph, &mut delta, &mut failures).await;

        if !failures.is_empty() {
            info!(count = failures.len(), "resolved coherence failures");
        }

        (delta, failures)
    }

    async fn resolve_duplicate_names(&self, delta: &mut Delta, failures: &mut Vec<CoherenceFailure>) {
        for failure in find_duplicate_names(delta) {
            if let CoherenceFailure::DuplicateName { name, duplicates } = &failure {
                for &index in duplicates {
                    let taken: Vec<String> = delta.nodes_to_add.iter().map(|a| a.name.clone()).collect();
                    let description = delta.nodes_to_add[index].description.clone();

                    let new_name = match self.generator.rename_duplicate(name, &description, &taken).await {
                        Ok(new_name) => new_name,
                        Err(err) => {
                            warn!(error = %err, name = %name, "could not get a distinct name, numbering instead");
                            unique_fallback_name(name, &taken)
                        }
                    };

                    debug!(from = %name, to = %new_name, "renamed duplicate node");
                    delta.nodes_to_add[index].name = new_name;
                }
            }

            failures.push(failure);
        }
    }

    async fn resolve_orphans(&self, graph: &MapGraph, delta: &mut Delta, failures: &mut Vec<CoherenceFailure>) {
        for failure in find_orphans(graph, delta) {
            if let CoherenceFailure::OrphanedChildren {
                original,
                new_name,
                children,
            } = &failure
            {
                let original_node = match graph.node(original) {
                    Some(node) => node,
                    None => continue,
                };

                let child_nodes: Vec<&MapNode> = children.iter().filter_map(|id| graph.node(id)).collect();

                let classified: HashMap<Key, OrphanDestination> = match self
                    .generator
                    .classify_orphans(original_node, new_name, &child_nodes)
                    .await
                {
                    Ok(classified) => classified.into_iter().collect(),
                    Err(err) => {
                        warn!(error = %err, "orphan classification failed, children stay put");
                        HashMap::new()
                    }
                };

                for child in children {
                    let destination = classified.get(child).copied().unwrap_or(OrphanDestination::Original);
                    if destination == OrphanDestination::New {
                        delta.nodes_to_update.push(NodeUpdate::reparent(child, new_name));
                    }
                }
            }

            failures.push(failure);
        }
    }

    async fn choose_fix(&self, preview: &MapGraph, delta: &Delta, added: &[Key], child: &MapNode, parent: &MapNode) -> HierarchyFix {
        if let Some(fix) = default_fix(preview, delta, added, parent) {
            return fix;
        }

        match self.generator.choose_hierarchy_fix(child, parent).await {
            Ok(fix) => fix,
            Err(err) => {
                warn!(error = %err, "hierarchy fix not chosen, moving child out");
                HierarchyFix::MakeSibling
            }
        }
    }

    async fn resolve_hierarchy(&self, graph: &MapGraph, delta: &mut Delta, failures: &mut Vec<CoherenceFailure>) {
        for _ in 0..MAX_HIERARCHY_PASSES {
            let (preview, result) = commit::preview(graph, delta);
            let added = result.patch.added_nodes.clone();
            let touched: HashSet<Key> = added.iter().chain(result.patch.updated_nodes.iter()).cloned().collect();

            let violations = find_feature_violations(&preview, &touched);
            if violations.is_empty() {
                return;
            }

            for violation in violations {
                if let CoherenceFailure::FeatureParentsFeature { child, parent } = &violation {
                    let (child, parent) = match (preview.node(child), preview.node(parent)) {
                        (Some(child), Some(parent)) => (child, parent),
                        _ => continue,
                    };

                    let fix = self.choose_fix(&preview, delta, &added, child, parent).await;
                    debug!(child = %child.name, parent = %parent.name, fix = %fix, "fixing feature inside feature");

                    match fix {
                        HierarchyFix::PromoteParent => promote_parent(delta, &preview, &added, parent),
                        HierarchyFix::MakeSibling => make_sibling(delta, &preview, &added, child, parent),
                    }
                }

                failures.push(violation);
            }
        }

        // Out of passes: strip whatever still breaks the hierarchy.
        loop {
            let (preview, result) = commit::preview(graph, delta);
            let touched: HashSet<Key> = result
                .patch
                .added_nodes
                .iter()
                .chain(result.patch.updated_nodes.iter())
                .cloned()
                .collect();

            let mut dropped = 0;
            for violation in find_feature_violations(&preview, &touched) {
                if let CoherenceFailure::FeatureParentsFeature { child, parent } = &violation {
                    if let (Some(child), Some(parent)) = (preview.node(child), preview.node(parent)) {
                        warn!(child = %child.name, parent = %parent.name, "unresolved hierarchy violation, dropping operations");
                        dropped += drop_offending(delta, graph, &preview, child, parent);
                    }
                }
            }

            if dropped == 0 {
                return;
            }
        }
    }
}
