use uuid::Uuid;

pub mod coherence;
pub mod delta;
pub mod draft;
pub mod map;

/// Type alias for how we're storing IDs. Would prefer to have strong
/// UUIDs in code, but ids are handed to the LLM and read back as text.
pub type Key = String;

pub const NODE_ID_PREFIX: &'static str = "node_";
pub const EDGE_ID_PREFIX: &'static str = "edge_";

/// Parent id of every top-level node. Never itself a node, and never
/// a valid target of any map operation.
pub const ROOT_NODE_ID: &'static str = "root";

const ROOT_NAMES: [&str; 3] = ["root", "__root__", "universe"];

pub fn new_uuid_string() -> String {
    let uuid = Uuid::now_v7();
    let mut uuid_str = Uuid::encode_buffer();
    let uuid_str = uuid.simple().encode_lower(&mut uuid_str);
    uuid_str.to_owned()
}

pub fn new_node_id() -> Key {
    format!("{}{}", NODE_ID_PREFIX, new_uuid_string())
}

pub fn new_edge_id() -> Key {
    format!("{}{}", EDGE_ID_PREFIX, new_uuid_string())
}

/// True if the value names the reserved root node.
pub fn is_root_reference(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    ROOT_NAMES.contains(&value.as_str())
}

pub fn looks_like_node_id(value: &str) -> bool {
    value.trim().to_lowercase().starts_with(NODE_ID_PREFIX)
}

pub fn looks_like_edge_id(value: &str) -> bool {
    value.trim().to_lowercase().starts_with(EDGE_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_carry_kind_prefix() {
        let node = new_node_id();
        let edge = new_edge_id();

        assert!(looks_like_node_id(&node) && !looks_like_edge_id(&node));
        assert!(looks_like_edge_id(&edge) && !looks_like_node_id(&edge));
        assert_ne!(new_node_id(), node);
    }

    #[test]
    fn root_names_are_case_insensitive() {
        assert!(is_root_reference("Root"));
        assert!(is_root_reference(" UNIVERSE "));
        assert!(!is_root_reference("Rootwood"));
    }
}
