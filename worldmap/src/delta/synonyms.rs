//! Static synonym tables that map the many ways a model phrases a
//! category or status onto the canonical enumerations. Lookups are on
//! the lowercased value with spaces and hyphens folded to underscores.

use crate::models::draft::{DraftDelta, DraftOp};
use crate::models::map::{EdgeCategory, EdgeStatus, NodeCategory, NodeStatus};
use std::collections::HashMap;
use std::sync::OnceLock;
use strum::VariantNames;
use tracing::debug;

/// Bumped whenever a table changes meaning.
pub const SYNONYM_TABLE_VERSION: u32 = 1;

const NODE_CATEGORY_SYNONYMS: &[(&str, &str)] = &[
    ("area", "region"),
    ("zone", "region"),
    ("province", "region"),
    ("kingdom", "region"),
    ("realm", "region"),
    ("land", "region"),
    ("wilderness", "region"),
    ("town", "settlement"),
    ("village", "settlement"),
    ("city", "settlement"),
    ("hamlet", "settlement"),
    ("outpost", "settlement"),
    ("camp", "settlement"),
    ("quarter", "district"),
    ("ward", "district"),
    ("neighborhood", "district"),
    ("neighbourhood", "district"),
    ("borough", "district"),
    ("building", "exterior"),
    ("structure", "exterior"),
    ("outside", "exterior"),
    ("outdoors", "exterior"),
    ("location", "exterior"),
    ("inside", "interior"),
    ("indoors", "interior"),
    ("indoor", "interior"),
    ("chamber", "room"),
    ("hall", "room"),
    ("cell", "room"),
    ("cellar", "room"),
    ("object", "feature"),
    ("landmark", "feature"),
    ("poi", "feature"),
    ("point_of_interest", "feature"),
    ("spot", "feature"),
];

const NODE_STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("found", "discovered"),
    ("visited", "discovered"),
    ("explored", "discovered"),
    ("known", "discovered"),
    ("seen", "discovered"),
    ("unknown", "undiscovered"),
    ("unexplored", "undiscovered"),
    ("unvisited", "undiscovered"),
    ("hidden", "undiscovered"),
    ("rumoured", "rumored"),
    ("heard_of", "rumored"),
    ("legendary", "rumored"),
    ("quest", "quest_target"),
    ("objective", "quest_target"),
    ("goal", "quest_target"),
    ("target", "quest_target"),
    ("destination", "quest_target"),
];

const EDGE_CATEGORY_SYNONYMS: &[(&str, &str)] = &[
    ("trail", "path"),
    ("footpath", "path"),
    ("track", "path"),
    ("walkway", "path"),
    ("street", "road"),
    ("highway", "road"),
    ("avenue", "road"),
    ("lane", "road"),
    ("sea", "sea_route"),
    ("sea_lane", "sea_route"),
    ("shipping_lane", "sea_route"),
    ("ferry", "sea_route"),
    ("voyage", "sea_route"),
    ("portal", "teleporter"),
    ("teleport", "teleporter"),
    ("warp", "teleporter"),
    ("doorway", "door"),
    ("gate", "door"),
    ("hatch", "door"),
    ("entrance", "door"),
    ("secret_door", "secret_passage"),
    ("hidden_passage", "secret_passage"),
    ("secret_tunnel", "secret_passage"),
    ("ford", "river_crossing"),
    ("bridge", "river_crossing"),
    ("temp_bridge", "temporary_bridge"),
    ("makeshift_bridge", "temporary_bridge"),
    ("rope_bridge", "temporary_bridge"),
    ("short_cut", "shortcut"),
    ("grapple", "boarding_hook"),
    ("grappling_hook", "boarding_hook"),
    ("boarding_line", "boarding_hook"),
];

const EDGE_STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("opened", "open"),
    ("accessible", "open"),
    ("passable", "open"),
    ("available", "open"),
    ("active", "open"),
    ("shut", "closed"),
    ("sealed", "locked"),
    ("barred", "locked"),
    ("obstructed", "blocked"),
    ("impassable", "blocked"),
    ("concealed", "hidden"),
    ("secret", "hidden"),
    ("rumoured", "rumored"),
    ("unconfirmed", "rumored"),
    ("oneway", "one_way"),
    ("caved_in", "collapsed"),
    ("ruined", "collapsed"),
    ("broken", "collapsed"),
    ("disabled", "inactive"),
    ("dormant", "inactive"),
    ("offline", "inactive"),
];

/// Statuses on an update that mean the node should be deleted.
const NODE_REMOVAL_STATUSES: &[&str] = &[
    "destroyed",
    "removed",
    "deleted",
    "gone",
    "obliterated",
    "razed",
    "demolished",
    "vanished",
];

/// Statuses on an update that mean the edge should be deleted.
const EDGE_REMOVAL_STATUSES: &[&str] = &[
    "severed",
    "destroyed",
    "removed",
    "deleted",
    "gone",
    "cut",
    "demolished",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    NodeCategory,
    NodeStatus,
    EdgeCategory,
    EdgeStatus,
}

impl Vocabulary {
    pub fn canonical(&self) -> &'static [&'static str] {
        match self {
            Vocabulary::NodeCategory => NodeCategory::VARIANTS,
            Vocabulary::NodeStatus => NodeStatus::VARIANTS,
            Vocabulary::EdgeCategory => EdgeCategory::VARIANTS,
            Vocabulary::EdgeStatus => EdgeStatus::VARIANTS,
        }
    }

    fn synonyms(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Vocabulary::NodeCategory => NODE_CATEGORY_SYNONYMS,
            Vocabulary::NodeStatus => NODE_STATUS_SYNONYMS,
            Vocabulary::EdgeCategory => EDGE_CATEGORY_SYNONYMS,
            Vocabulary::EdgeStatus => EDGE_STATUS_SYNONYMS,
        }
    }

    fn table(&self) -> &'static HashMap<&'static str, &'static str> {
        let tables = tables();
        match self {
            Vocabulary::NodeCategory => &tables.node_category,
            Vocabulary::NodeStatus => &tables.node_status,
            Vocabulary::EdgeCategory => &tables.edge_category,
            Vocabulary::EdgeStatus => &tables.edge_status,
        }
    }
}

struct SynonymTables {
    node_category: HashMap<&'static str, &'static str>,
    node_status: HashMap<&'static str, &'static str>,
    edge_category: HashMap<&'static str, &'static str>,
    edge_status: HashMap<&'static str, &'static str>,
}

fn build_table(vocabulary: Vocabulary) -> HashMap<&'static str, &'static str> {
    // Canonical values map to themselves so a case or spacing variant
    // of a canonical value is also a hit.
    vocabulary
        .canonical()
        .iter()
        .map(|c| (*c, *c))
        .chain(vocabulary.synonyms().iter().copied())
        .collect()
}

fn tables() -> &'static SynonymTables {
    static TABLES: OnceLock<SynonymTables> = OnceLock::new();
    TABLES.get_or_init(|| SynonymTables {
        node_category: build_table(Vocabulary::NodeCategory),
        node_status: build_table(Vocabulary::NodeStatus),
        edge_category: build_table(Vocabulary::EdgeCategory),
        edge_status: build_table(Vocabulary::EdgeStatus),
    })
}

/// Force the tables to load. Called once at startup so the first turn
/// does not pay for it.
pub fn init() {
    let tables = tables();
    debug!(
        version = SYNONYM_TABLE_VERSION,
        entries = tables.node_category.len()
            + tables.node_status.len()
            + tables.edge_category.len()
            + tables.edge_status.len(),
        "synonym tables loaded"
    );
}

pub(crate) fn fold(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Canonical form of the value, or None on a miss.
pub fn lookup(vocabulary: Vocabulary, value: &str) -> Option<&'static str> {
    vocabulary.table().get(fold(value).as_str()).copied()
}

/// Every value that normalizes to a canonical one: the canonical
/// values themselves plus all table synonyms.
pub fn known_values(vocabulary: Vocabulary) -> impl Iterator<Item = &'static str> {
    vocabulary.table().keys().copied()
}

pub fn is_node_removal_status(value: &str) -> bool {
    NODE_REMOVAL_STATUSES.contains(&fold(value).as_str())
}

pub fn is_edge_removal_status(value: &str) -> bool {
    EDGE_REMOVAL_STATUSES.contains(&fold(value).as_str())
}

fn normalize_field(op: &mut DraftOp, key: &str, vocabulary: Vocabulary) {
    let canonical = match op.get_str(key) {
        Some(value) => match lookup(vocabulary, value) {
            Some(canonical) if canonical != value => canonical,
            _ => return,
        },
        None => return,
    };

    debug!(field = key, to = canonical, "normalized synonym");
    op.set_str(key, canonical);
}

fn normalize_node_ops(ops: &mut [DraftOp]) {
    for op in ops {
        normalize_field(op, "category", Vocabulary::NodeCategory);
        normalize_field(op, "status", Vocabulary::NodeStatus);
    }
}

fn normalize_edge_ops(ops: &mut [DraftOp]) {
    for op in ops {
        normalize_field(op, "category", Vocabulary::EdgeCategory);
        normalize_field(op, "status", Vocabulary::EdgeStatus);
    }
}

/// Rewrite every category/status value that hits a synonym table to
/// its canonical form. Misses are left untouched for validation to
/// reject.
pub fn normalize(mut draft: DraftDelta) -> DraftDelta {
    normalize_node_ops(&mut draft.nodes_to_add);
    normalize_node_ops(&mut draft.nodes_to_update);
    normalize_edge_ops(&mut draft.edges_to_add);
    normalize_edge_ops(&mut draft.edges_to_update);
    normalize_edge_ops(&mut draft.edges_to_remove);
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL: [Vocabulary; 4] = [
        Vocabulary::NodeCategory,
        Vocabulary::NodeStatus,
        Vocabulary::EdgeCategory,
        Vocabulary::EdgeStatus,
    ];

    #[test]
    fn every_synonym_targets_a_canonical_value() {
        for vocabulary in ALL {
            for (synonym, canonical) in vocabulary.synonyms() {
                assert!(
                    vocabulary.canonical().contains(canonical),
                    "{} -> {} is not canonical for {:?}",
                    synonym,
                    canonical,
                    vocabulary
                );
            }
        }
    }

    #[test]
    fn removal_statuses_are_not_synonyms() {
        for status in NODE_REMOVAL_STATUSES {
            assert!(lookup(Vocabulary::NodeStatus, status).is_none());
        }

        for status in EDGE_REMOVAL_STATUSES {
            assert!(lookup(Vocabulary::EdgeStatus, status).is_none());
        }
    }

    #[test]
    fn lookup_folds_case_and_separators() {
        assert_eq!(lookup(Vocabulary::NodeCategory, "Building"), Some("exterior"));
        assert_eq!(lookup(Vocabulary::NodeStatus, "Quest Target"), Some("quest_target"));
        assert_eq!(lookup(Vocabulary::EdgeStatus, "one-way"), Some("one_way"));
        assert_eq!(lookup(Vocabulary::EdgeCategory, "Sea Route"), Some("sea_route"));
        assert_eq!(lookup(Vocabulary::NodeCategory, "spaceship"), None);
    }

    #[test]
    fn normalize_rewrites_hits_and_leaves_misses() {
        let mut draft = DraftDelta::default();
        draft.nodes_to_add.push(DraftOp::new(
            json!({"name": "Old Mill", "category": "building", "status": "found"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        ));
        draft.edges_to_add.push(DraftOp::new(
            json!({"category": "wormhole", "status": "Shut"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        ));

        let draft = normalize(draft);
        assert_eq!(draft.nodes_to_add[0].get_str("category"), Some("exterior"));
        assert_eq!(draft.nodes_to_add[0].get_str("status"), Some("discovered"));
        assert_eq!(draft.edges_to_add[0].get_str("category"), Some("wormhole"));
        assert_eq!(draft.edges_to_add[0].get_str("status"), Some("closed"));
    }
}
