use super::synonyms::{fold, is_edge_removal_status, is_node_removal_status, Vocabulary};
use crate::models::coherence::ValidationError;
use crate::models::delta::{
    Delta, EdgeAdd, EdgeRef, EdgeRemove, EdgeUpdate, NodeAdd, NodeRemove, NodeUpdate, StatusChange,
};
use crate::models::draft::{DraftDelta, DraftOp, OpList};
use crate::models::map::{EdgeCategory, EdgeStatus, NodeCategory, NodeStatus};
use serde_json::Value;
use std::str::FromStr;

/// Reads the fields of one draft operation, collecting diagnostics
/// instead of stopping at the first problem.
struct FieldReader<'a> {
    op: &'a DraftOp,
    list: OpList,
    index: usize,
    errors: &'a mut Vec<ValidationError>,
}

impl<'a> FieldReader<'a> {
    fn location(&self, field: &str) -> String {
        format!("{}[{}].{}", self.list, self.index, field)
    }

    fn whole_op(&self) -> String {
        format!("{}[{}]", self.list, self.index)
    }

    fn missing(&mut self, field: &str) {
        let location = self.location(field);
        self.errors
            .push(ValidationError::structural(location, "missing required field"));
    }

    fn optional_str(&mut self, field: &str) -> Option<String> {
        match self.op.get(field)? {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            other => {
                let location = self.location(field);
                self.errors.push(ValidationError::mistyped(location, other));
                None
            }
        }
    }

    fn required_str(&mut self, field: &str) -> Option<String> {
        let present = self.op.get(field).is_some();
        let value = self.optional_str(field);

        if !present {
            self.missing(field);
        } else if value.is_none() && self.op.get(field).map(Value::is_string).unwrap_or(false) {
            // Present but blank.
            self.missing(field);
        }

        value
    }

    /// Free text that the backend sometimes sends as a number.
    fn optional_text(&mut self, field: &str) -> Option<String> {
        match self.op.get(field)? {
            Value::Number(n) => Some(n.to_string()),
            _ => self.optional_str(field),
        }
    }

    /// A list of strings, or a single string standing in for one.
    fn string_list(&mut self, field: &str) -> Vec<String> {
        let values = match self.op.get(field) {
            None => return vec![],
            Some(Value::String(s)) => return vec![s.trim().to_string()],
            Some(Value::Array(values)) => values,
            Some(other) => {
                let location = self.location(field);
                self.errors.push(ValidationError::mistyped(location, other));
                return vec![];
            }
        };

        let mut strings = vec![];
        for (i, value) in values.iter().enumerate() {
            match value {
                Value::String(s) if !s.trim().is_empty() => strings.push(s.trim().to_string()),
                Value::String(_) => (),
                other => {
                    let location = format!("{}[{}]", self.location(field), i);
                    self.errors.push(ValidationError::mistyped(location, other));
                }
            }
        }

        strings
    }

    fn parse_enum<T: FromStr>(&mut self, field: &str, raw: &str, vocabulary: Vocabulary) -> Option<T> {
        match T::from_str(&fold(raw)) {
            Ok(value) => Some(value),
            Err(_) => {
                let location = self.location(field);
                self.errors
                    .push(ValidationError::value(location, raw, vocabulary.canonical()));
                None
            }
        }
    }

    fn optional_enum<T: FromStr>(&mut self, field: &str, vocabulary: Vocabulary) -> Option<T> {
        let raw = self.optional_str(field)?;
        self.parse_enum(field, &raw, vocabulary)
    }

    fn required_enum<T: FromStr>(&mut self, field: &str, vocabulary: Vocabulary) -> Option<T> {
        let raw = self.required_str(field)?;
        self.parse_enum(field, &raw, vocabulary)
    }

    /// A status that may also be a removal word. Removal words are
    /// only legal where the caller says so (updates, not adds).
    fn status_change<S: FromStr>(
        &mut self,
        vocabulary: Vocabulary,
        is_removal: fn(&str) -> bool,
    ) -> Option<StatusChange<S>> {
        let raw = self.optional_str("status")?;

        if is_removal(&raw) {
            return Some(StatusChange::Remove(raw));
        }

        self.parse_enum("status", &raw, vocabulary)
            .map(StatusChange::Set)
    }

    fn add_status<S: FromStr>(&mut self, vocabulary: Vocabulary, is_removal: fn(&str) -> bool) -> Option<S> {
        let raw = self.required_str("status")?;

        if is_removal(&raw) {
            let location = self.location("status");
            let mut error = ValidationError::value(location, &raw, vocabulary.canonical());
            error.reason = format!("a new entity cannot be created as removed; {}", error.reason);
            self.errors.push(error);
            return None;
        }

        self.parse_enum("status", &raw, vocabulary)
    }

    /// Identify an existing node by id, falling back to name.
    fn node_target(&mut self, id: Option<&String>, name: Option<&String>) -> Option<String> {
        match id.or(name).cloned() {
            Some(target) => Some(target),
            None => {
                let location = self.location("id");
                self.errors.push(ValidationError::structural(
                    location,
                    "an id or name identifying the node is required",
                ));
                None
            }
        }
    }

    fn edge_ref(&mut self) -> Option<EdgeRef> {
        if let Some(id) = self.optional_str("id") {
            return Some(EdgeRef::Id(id));
        }

        let source = self.optional_str("source");
        let target = self.optional_str("target");
        let category = self.optional_enum::<EdgeCategory>("category", Vocabulary::EdgeCategory);

        match (source, target) {
            (Some(source), Some(target)) => Some(EdgeRef::Endpoints {
                source,
                target,
                category,
            }),
            _ => {
                let location = self.whole_op();
                self.errors.push(ValidationError::structural(
                    location,
                    "an edge id or both source and target are required",
                ));
                None
            }
        }
    }
}

fn validate_node_add(reader: &mut FieldReader) -> Option<NodeAdd> {
    let name = reader.required_str("name");
    let description = reader.optional_str("description").unwrap_or_default();
    let category = reader.required_enum::<NodeCategory>("category", Vocabulary::NodeCategory);
    let status = reader.add_status::<NodeStatus>(Vocabulary::NodeStatus, is_node_removal_status);
    let parent = reader.required_str("parent");
    let aliases = reader.string_list("aliases");
    let split_from = reader.optional_str("splitFrom");

    Some(NodeAdd {
        name: name?,
        description,
        category: category?,
        status: status?,
        parent: parent?,
        aliases,
        split_from,
    })
}

fn validate_node_update(reader: &mut FieldReader) -> Option<NodeUpdate> {
    let id = reader.optional_str("id");
    let name = reader.optional_str("name");
    let target = reader.node_target(id.as_ref(), name.as_ref());

    // With an id present, a name is the new display name.
    let new_name = reader
        .optional_str("newName")
        .or_else(|| id.as_ref().and(name));

    let update = NodeUpdate {
        target: target?,
        new_name,
        description: reader.optional_str("description"),
        category: reader.optional_enum("category", Vocabulary::NodeCategory),
        status: reader.status_change(Vocabulary::NodeStatus, is_node_removal_status),
        parent: reader.optional_str("parent"),
        aliases: reader.string_list("aliases"),
    };

    let changes_something = update.new_name.is_some()
        || update.description.is_some()
        || update.category.is_some()
        || update.status.is_some()
        || update.parent.is_some()
        || !update.aliases.is_empty();

    match changes_something {
        true => Some(update),
        false => {
            let location = reader.whole_op();
            reader.errors.push(ValidationError::structural(
                location,
                "an update must change at least one field",
            ));
            None
        }
    }
}

fn validate_node_remove(reader: &mut FieldReader) -> Option<NodeRemove> {
    let id = reader.optional_str("id");
    let name = reader.optional_str("name");
    reader
        .node_target(id.as_ref(), name.as_ref())
        .map(|target| NodeRemove { target })
}

fn validate_edge_add(reader: &mut FieldReader) -> Option<EdgeAdd> {
    let source = reader.required_str("source");
    let target = reader.required_str("target");
    let category = reader.required_enum::<EdgeCategory>("category", Vocabulary::EdgeCategory);
    let status = reader.add_status::<EdgeStatus>(Vocabulary::EdgeStatus, is_edge_removal_status);
    let description = reader.optional_str("description").unwrap_or_default();
    let travel_time = reader.optional_text("travelTime");

    let (source, target) = (source?, target?);
    if source.eq_ignore_ascii_case(&target) {
        let location = reader.location("target");
        reader.errors.push(ValidationError::structural(
            location,
            "an edge must join two different nodes",
        ));
        return None;
    }

    Some(EdgeAdd {
        source,
        target,
        category: category?,
        status: status?,
        description,
        travel_time,
    })
}

fn validate_edge_update(reader: &mut FieldReader) -> Option<EdgeUpdate> {
    let edge = reader.edge_ref();

    // For endpoint references the category was consumed as a filter.
    let category = match &edge {
        Some(EdgeRef::Id(_)) => reader.optional_enum("category", Vocabulary::EdgeCategory),
        _ => None,
    };

    let update = EdgeUpdate {
        edge: edge?,
        category,
        status: reader.status_change(Vocabulary::EdgeStatus, is_edge_removal_status),
        description: reader.optional_str("description"),
        travel_time: reader.optional_text("travelTime"),
    };

    let changes_something = update.category.is_some()
        || update.status.is_some()
        || update.description.is_some()
        || update.travel_time.is_some();

    match changes_something {
        true => Some(update),
        false => {
            let location = reader.whole_op();
            reader.errors.push(ValidationError::structural(
                location,
                "an update must change at least one field",
            ));
            None
        }
    }
}

fn validate_edge_remove(reader: &mut FieldReader) -> Option<EdgeRemove> {
    reader.edge_ref().map(|edge| EdgeRemove { edge })
}

fn validate_list<T>(
    draft: &DraftDelta,
    list: OpList,
    errors: &mut Vec<ValidationError>,
    validate_op: fn(&mut FieldReader) -> Option<T>,
) -> Vec<T> {
    let mut valid = vec![];

    for (index, op) in draft.list(list).iter().enumerate() {
        let before = errors.len();
        let mut reader = FieldReader {
            op,
            list,
            index,
            errors,
        };

        let result = validate_op(&mut reader);

        // An op is only accepted if reading it raised nothing at all.
        if let Some(typed) = result.filter(|_| errors.len() == before) {
            valid.push(typed);
        }
    }

    valid
}

/// Check every operation for required fields, types and enum
/// membership. The draft is never modified. Returns the typed delta,
/// or every diagnostic found across all operations.
pub fn validate(draft: &DraftDelta) -> Result<Delta, Vec<ValidationError>> {
    let mut errors = vec![];

    let delta = Delta {
        nodes_to_add: validate_list(draft, OpList::NodesToAdd, &mut errors, validate_node_add),
        nodes_to_update: validate_list(draft, OpList::NodesToUpdate, &mut errors, validate_node_update),
        nodes_to_remove: validate_list(draft, OpList::NodesToRemove, &mut errors, validate_node_remove),
        edges_to_add: validate_list(draft, OpList::EdgesToAdd, &mut errors, validate_edge_add),
        edges_to_update: validate_list(draft, OpList::EdgesToUpdate, &mut errors, validate_edge_update),
        edges_to_remove: validate_list(draft, OpList::EdgesToRemove, &mut errors, validate_edge_remove),
        observations: draft.observations.clone(),
        rationale: draft.rationale.clone(),
        suggested_current_location: draft.suggested_current_location.clone(),
    };

    match errors.is_empty() {
        true => Ok(delta),
        false => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::synonyms;
    use crate::models::coherence::FailureKind;
    use proptest::prelude::*;
    use serde_json::json;

    fn op(value: serde_json::Value) -> DraftOp {
        match value {
            serde_json::Value::Object(fields) => DraftOp::new(fields),
            _ => panic!("test ops must be objects"),
        }
    }

    fn mill() -> DraftOp {
        op(json!({
            "name": "Old Mill",
            "description": "A creaking mill.",
            "category": "exterior",
            "status": "discovered",
            "parent": "root"
        }))
    }

    #[test]
    fn full_node_add_passes() {
        let draft = DraftDelta {
            nodes_to_add: vec![mill()],
            ..Default::default()
        };

        let delta = validate(&draft).expect("should validate");
        assert_eq!(delta.nodes_to_add[0].category, NodeCategory::Exterior);
        assert_eq!(delta.nodes_to_add[0].parent, "root");
    }

    #[test]
    fn collects_every_error_with_locations() {
        let draft = DraftDelta {
            nodes_to_add: vec![
                op(json!({"name": "Keep", "category": "castle-ish", "status": "discovered"})),
                op(json!({"name": 7, "category": "room", "status": "discovered", "parent": "Keep"})),
            ],
            edges_to_add: vec![op(json!({"source": "Keep", "target": "keep", "category": "path", "status": "open"}))],
            ..Default::default()
        };

        let errors = validate(&draft).expect_err("should fail");
        let locations: Vec<_> = errors.iter().map(|e| e.location.as_str()).collect();

        assert!(locations.contains(&"nodesToAdd[0].category"));
        assert!(locations.contains(&"nodesToAdd[0].parent"));
        assert!(locations.contains(&"nodesToAdd[1].name"));
        assert!(locations.contains(&"edgesToAdd[0].target"));

        let category = errors
            .iter()
            .find(|e| e.location == "nodesToAdd[0].category")
            .expect("category error");
        assert_eq!(category.kind, FailureKind::Value);
        assert_eq!(category.value.as_deref(), Some("castle-ish"));
    }

    #[test]
    fn draft_is_left_untouched() {
        let draft = DraftDelta {
            nodes_to_add: vec![op(json!({"name": "Keep", "category": "nope"}))],
            ..Default::default()
        };
        let before = draft.clone();

        let _ = validate(&draft);
        assert_eq!(draft, before);
    }

    #[test]
    fn update_with_id_and_name_is_a_rename() {
        let draft = DraftDelta {
            nodes_to_update: vec![op(json!({"id": "node_1", "name": "New Mill"}))],
            ..Default::default()
        };

        let delta = validate(&draft).expect("should validate");
        assert_eq!(delta.nodes_to_update[0].target, "node_1");
        assert_eq!(delta.nodes_to_update[0].new_name.as_deref(), Some("New Mill"));
    }

    #[test]
    fn update_without_changes_is_structural() {
        let draft = DraftDelta {
            nodes_to_update: vec![op(json!({"name": "Old Mill"}))],
            edges_to_update: vec![op(json!({"source": "A", "target": "B", "category": "road"}))],
            ..Default::default()
        };

        let errors = validate(&draft).expect_err("should fail");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == FailureKind::Structural));
    }

    #[test]
    fn removal_status_allowed_on_updates_only() {
        let draft = DraftDelta {
            nodes_to_update: vec![op(json!({"id": "node_1", "status": "destroyed"}))],
            edges_to_update: vec![op(json!({"id": "edge_1", "status": "severed"}))],
            ..Default::default()
        };

        let delta = validate(&draft).expect("should validate");
        assert!(matches!(delta.nodes_to_update[0].status, Some(StatusChange::Remove(_))));
        assert!(matches!(delta.edges_to_update[0].status, Some(StatusChange::Remove(_))));

        let mut add = mill();
        add.set_str("status", "destroyed");
        let draft = DraftDelta {
            nodes_to_add: vec![add],
            ..Default::default()
        };
        let errors = validate(&draft).expect_err("should fail");
        assert_eq!(errors[0].kind, FailureKind::Value);
    }

    #[test]
    fn edge_refs_and_loose_fields() {
        let draft = DraftDelta {
            edges_to_add: vec![op(json!({
                "source": "Mill", "target": "Town", "category": "road",
                "status": "open", "travelTime": 2
            }))],
            edges_to_remove: vec![op(json!({"source": "Mill", "target": "Town"}))],
            nodes_to_update: vec![op(json!({"id": "node_1", "aliases": "the mill"}))],
            ..Default::default()
        };

        let delta = validate(&draft).expect("should validate");
        assert_eq!(delta.edges_to_add[0].travel_time.as_deref(), Some("2"));
        assert!(matches!(
            delta.edges_to_remove[0].edge,
            EdgeRef::Endpoints { category: None, .. }
        ));
        assert_eq!(delta.nodes_to_update[0].aliases, vec!["the mill".to_string()]);
    }

    const VOCABULARIES: [Vocabulary; 4] = [
        Vocabulary::NodeCategory,
        Vocabulary::NodeStatus,
        Vocabulary::EdgeCategory,
        Vocabulary::EdgeStatus,
    ];

    /// A draft with one op whose field in the given vocabulary holds
    /// `value`. Statuses ride on updates, where removal words are legal.
    fn draft_carrying(vocabulary: Vocabulary, value: &str) -> DraftDelta {
        match vocabulary {
            Vocabulary::NodeCategory => {
                let mut add = mill();
                add.set_str("category", value);
                DraftDelta {
                    nodes_to_add: vec![add],
                    ..Default::default()
                }
            }
            Vocabulary::NodeStatus => DraftDelta {
                nodes_to_update: vec![op(json!({"id": "node_1", "status": value}))],
                ..Default::default()
            },
            Vocabulary::EdgeCategory => DraftDelta {
                edges_to_add: vec![op(json!({
                    "source": "Mill", "target": "Town", "category": value, "status": "open"
                }))],
                ..Default::default()
            },
            Vocabulary::EdgeStatus => DraftDelta {
                edges_to_update: vec![op(json!({"id": "edge_1", "status": value}))],
                ..Default::default()
            },
        }
    }

    proptest! {
        #[test]
        fn known_synonyms_always_validate(
            vocabulary in prop::sample::select(VOCABULARIES.to_vec()),
            index in 0usize..1000,
        ) {
            let mut synonyms: Vec<_> = synonyms::known_values(vocabulary).collect();
            synonyms.sort();
            let value = synonyms[index % synonyms.len()];

            let draft = synonyms::normalize(draft_carrying(vocabulary, value));

            prop_assert!(validate(&draft).is_ok(), "{:?} value {} rejected", vocabulary, value);
        }

        #[test]
        fn unknown_values_fail_naming_the_value(
            vocabulary in prop::sample::select(VOCABULARIES.to_vec()),
            value in "[a-z]{3,12}zq",
        ) {
            let draft = synonyms::normalize(draft_carrying(vocabulary, &value));

            let errors = validate(&draft).expect_err("should fail");
            prop_assert_eq!(errors.len(), 1);
            prop_assert_eq!(errors[0].kind, FailureKind::Value);
            prop_assert_eq!(errors[0].value.as_deref(), Some(value.as_str()));
        }
    }
}
