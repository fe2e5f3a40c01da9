use crate::models::coherence::ParseFailure;
use crate::models::draft::{DraftDelta, DraftOp, OpList};
use crate::models::{is_root_reference, looks_like_edge_id, looks_like_node_id};
use serde_json::{Map, Value};
use strum::IntoEnumIterator;
use tracing::debug;

/// Characters which can break the JSON deserialization. Only stripped
/// as a last resort, when the response does not parse as-is.
const ILLEGAL_CHARACTERS: [char; 1] = ['\\'];

/// Objects that wrap the real payload one level down.
const WRAPPER_KEYS: [&str; 5] = ["delta", "mapdelta", "mapupdates", "mapupdate", "updates"];

fn compact_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn op_list_for_key(key: &str) -> Option<OpList> {
    let list = match compact_key(key).as_str() {
        "nodestoadd" | "addnodes" | "newnodes" | "nodesadded" | "addednodes" => OpList::NodesToAdd,
        "nodestoupdate" | "updatenodes" | "nodeupdates" | "nodesupdated" | "updatednodes" => {
            OpList::NodesToUpdate
        }
        "nodestoremove" | "removenodes" | "nodestodelete" | "deletenodes" | "nodesremoved"
        | "removednodes" => OpList::NodesToRemove,
        "edgestoadd" | "addedges" | "newedges" | "edgesadded" | "addededges" => OpList::EdgesToAdd,
        "edgestoupdate" | "updateedges" | "edgeupdates" | "edgesupdated" | "updatededges" => {
            OpList::EdgesToUpdate
        }
        "edgestoremove" | "removeedges" | "edgestodelete" | "deleteedges" | "edgesremoved"
        | "removededges" => OpList::EdgesToRemove,
        _ => return None,
    };

    Some(list)
}

/// Map the many key spellings of a node operation onto canonical
/// field names.
fn canonical_node_key(key: &str) -> Option<&'static str> {
    let canonical = match compact_key(key).as_str() {
        "id" | "nodeid" | "placeid" => "id",
        "name" | "placename" | "nodename" | "displayname" => "name",
        "newname" | "rename" | "renameto" | "newdisplayname" => "newName",
        "description" | "desc" | "details" => "description",
        "category" | "type" | "kind" | "placetype" | "nodetype" => "category",
        "status" | "state" => "status",
        "parent" | "parentid" | "parentname" | "parentplaceid" | "parentnodeid"
        | "parentplace" | "within" => "parent",
        "aliases" | "alias" | "othernames" => "aliases",
        "splitfrom" | "splitof" | "splitoff" | "splitfromid" => "splitFrom",
        _ => return None,
    };

    Some(canonical)
}

fn canonical_edge_key(key: &str) -> Option<&'static str> {
    let canonical = match compact_key(key).as_str() {
        "id" | "edgeid" => "id",
        "source" | "sourceid" | "sourceplaceid" | "sourcenodeid" | "sourcename" | "from"
        | "fromplace" | "fromid" => "source",
        "target" | "targetid" | "targetplaceid" | "targetnodeid" | "targetname" | "to"
        | "toplace" | "toid" => "target",
        "category" | "type" | "kind" | "edgetype" => "category",
        "status" | "state" => "status",
        "description" | "desc" | "details" => "description",
        "traveltime" | "traveltimehint" | "duration" => "travelTime",
        _ => return None,
    };

    Some(canonical)
}

fn canonicalize_op(list: OpList, object: Map<String, Value>) -> DraftOp {
    let mut fields = Map::new();

    for (key, value) in object {
        let canonical = match list.is_node_list() {
            true => canonical_node_key(&key),
            false => canonical_edge_key(&key),
        };

        match canonical {
            // First spelling wins if the backend sent two.
            Some(canonical) => {
                fields.entry(canonical.to_string()).or_insert(value);
            }
            None => {
                fields.insert(key, value);
            }
        }
    }

    DraftOp::new(fields)
}

/// Removal lists may hold bare strings instead of objects.
fn op_from_value(list: OpList, value: Value) -> Option<DraftOp> {
    match value {
        Value::Object(object) => Some(canonicalize_op(list, object)),
        Value::String(reference) if !reference.trim().is_empty() => {
            let key = if looks_like_node_id(&reference) || looks_like_edge_id(&reference) {
                "id"
            } else {
                "name"
            };

            let mut op = DraftOp::default();
            op.set_str(key, reference.trim());
            Some(op)
        }
        other => {
            debug!(list = %list, value = %other, "dropping unreadable operation");
            None
        }
    }
}

fn push_ops(draft: &mut DraftDelta, list: OpList, value: Value) {
    let values = match value {
        Value::Array(values) => values,
        Value::Null => vec![],
        single => vec![single],
    };

    let ops = values.into_iter().filter_map(|v| op_from_value(list, v));
    draft.list_mut(list).extend(ops);
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter_map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Some(joined).filter(|s| !s.trim().is_empty())
        }
        _ => None,
    }
}

fn looks_like_bare_edge(object: &Map<String, Value>) -> bool {
    let keys: Vec<_> = object
        .keys()
        .filter_map(|k| canonical_edge_key(k))
        .collect();
    keys.contains(&"source") && keys.contains(&"target")
}

fn looks_like_bare_node(object: &Map<String, Value>) -> bool {
    let keys: Vec<_> = object
        .keys()
        .filter_map(|k| canonical_node_key(k))
        .collect();
    keys.contains(&"name") && keys.contains(&"category")
}

/// Read one object into a draft. Handles the full delta shape as well
/// as the "minimal" shapes a model falls back to when it only has one
/// thing to say.
fn draft_from_object(mut object: Map<String, Value>) -> DraftDelta {
    // Unwrap {"delta": {...}} and friends.
    let wrapper = object
        .iter()
        .find(|(key, value)| WRAPPER_KEYS.contains(&compact_key(key).as_str()) && value.is_object())
        .map(|(key, _)| key.clone());

    if let Some(key) = wrapper.filter(|_| object.len() == 1) {
        if let Some(Value::Object(inner)) = object.remove(&key) {
            debug!(wrapper = %key, "unwrapping delta wrapper object");
            return draft_from_object(inner);
        }
    }

    let mut draft = DraftDelta::default();
    let mut recognized = false;

    for (key, value) in std::mem::take(&mut object) {
        if let Some(list) = op_list_for_key(&key) {
            push_ops(&mut draft, list, value);
            recognized = true;
            continue;
        }

        match compact_key(&key).as_str() {
            "observations" | "observation" | "notes" => draft.observations = text_field(&value),
            "rationale" | "reasoning" | "reason" => draft.rationale = text_field(&value),
            "suggestedcurrentlocation" | "currentlocation" | "suggestedlocation"
            | "currentlocationid" | "suggestedcurrentlocationid" => {
                draft.suggested_current_location = text_field(&value)
            }
            "node" | "place" | "nodes" | "places" => {
                push_ops(&mut draft, OpList::NodesToAdd, value);
                recognized = true;
            }
            "edge" | "connection" | "edges" | "connections" => {
                push_ops(&mut draft, OpList::EdgesToAdd, value);
                recognized = true;
            }
            _ => {
                object.insert(key, value);
            }
        }
    }

    // A bare node or edge object with no operation lists at all.
    if !recognized {
        if looks_like_bare_edge(&object) {
            draft.edges_to_add.push(canonicalize_op(OpList::EdgesToAdd, object));
        } else if looks_like_bare_node(&object) {
            draft.nodes_to_add.push(canonicalize_op(OpList::NodesToAdd, object));
        }
    }

    draft
}

fn draft_from_value(value: Value) -> Option<DraftDelta> {
    match value {
        Value::Object(object) => Some(draft_from_object(object)),
        Value::Array(fragments) => {
            let mut merged = DraftDelta::default();
            for fragment in fragments {
                if let Value::Object(object) = fragment {
                    merged.merge(draft_from_object(object));
                }
            }
            Some(merged)
        }
        _ => None,
    }
}

/// An object, or an array holding at least one object fragment. A
/// bracketed aside like `[3]` is neither.
fn has_object(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

/// Remove surrounding code fences (```json ... ```), keeping whatever
/// was inside the first fenced block.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let start = match trimmed.find("```") {
        Some(start) => start,
        None => return trimmed,
    };

    let after_fence = &trimmed[start + 3..];
    // Only a language tag glued to the fence is skipped; the payload
    // may sit on the fence line itself.
    let tag_len = after_fence
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(after_fence.len());
    let body = &after_fence[tag_len..];

    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse the first JSON object (or array of objects) found in the
/// text, ignoring prose before it and garbage after it. Values without
/// any object in them are stepped over. A broken object is an error;
/// a broken `[` is assumed to be prose and skipped.
fn first_json_value(text: &str) -> Result<Value, ParseFailure> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if has_object(&value) {
            return Ok(value);
        }
    }

    let mut skipped_err = None;
    let mut offset = 0;

    while let Some(found) = text[offset..].find(|c| c == '{' || c == '[') {
        let start = offset + found;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();

        match stream.next() {
            Some(Ok(value)) if has_object(&value) => return Ok(value),
            Some(Ok(_)) => offset = start + stream.byte_offset().max(1),
            Some(Err(err)) if text[start..].starts_with('{') => {
                return Err(ParseFailure::Malformed(err.to_string()))
            }
            Some(Err(err)) => {
                skipped_err.get_or_insert_with(|| err.to_string());
                offset = start + 1;
            }
            None => break,
        }
    }

    Err(skipped_err.map(ParseFailure::Malformed).unwrap_or(ParseFailure::NoStructure))
}

fn sanitize_json_response(mut json: String) -> String {
    for illegal_char in ILLEGAL_CHARACTERS {
        json = json.replace(illegal_char, "");
    }

    json
}

/// The first JSON object or array in a model response, with fences and
/// surrounding prose removed. Falls back to the sanitized text, then to
/// the text with its fences left in place.
pub fn extract_json(text: &str) -> Result<Value, ParseFailure> {
    let body = strip_code_fences(text);

    let first_err = match first_json_value(body) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if let Ok(value) = first_json_value(&sanitize_json_response(body.to_string())) {
        return Ok(value);
    }

    match body.len() == text.trim().len() {
        true => Err(first_err),
        false => first_json_value(text).map_err(|_| first_err),
    }
}

fn references_root(list: OpList, op: &DraftOp) -> bool {
    let target_keys: &[&str] = match list {
        OpList::NodesToAdd => &["name"],
        OpList::NodesToUpdate | OpList::NodesToRemove => &["id", "name"],
        OpList::EdgesToAdd | OpList::EdgesToUpdate | OpList::EdgesToRemove => {
            &["id", "source", "target"]
        }
    };

    target_keys
        .iter()
        .filter_map(|key| op.get_str(key))
        .any(is_root_reference)
}

/// Any operation that targets the root sentinel is illegal no matter
/// what else it says, so it never reaches validation.
fn drop_root_targets(mut draft: DraftDelta) -> DraftDelta {
    for list in OpList::iter() {
        draft.list_mut(list).retain(|op| {
            let illegal = references_root(list, op);
            if illegal {
                debug!(list = %list, "dropping operation that targets the root node");
            }
            !illegal
        });
    }

    draft
}

/// Extract a draft delta from raw backend text. Fails only when no
/// object or array can be recovered at all.
pub fn parse_delta(text: &str) -> Result<DraftDelta, ParseFailure> {
    let value = extract_json(text)?;
    let draft = draft_from_value(value).ok_or(ParseFailure::NoStructure)?;
    Ok(drop_root_targets(draft))
}
