//! The synchronous half of map-delta ingestion. Everything here is
//! pure: raw backend text goes in, a typed delta or the reason it was
//! rejected comes out.

use crate::models::coherence::Rejection;
use crate::models::delta::Delta;
use tracing::debug;

pub mod parser;
pub mod repair;
pub mod synonyms;
pub mod validator;

/// Parse, normalize, validate and repair one backend response, in that
/// order. Normalization has to precede validation or most synonym
/// values would be rejected.
pub fn process_response(text: &str) -> Result<Delta, Rejection> {
    let draft = parser::parse_delta(text).map_err(Rejection::Parse)?;
    let draft = synonyms::normalize(draft);
    let delta = validator::validate(&draft).map_err(Rejection::Invalid)?;
    let (delta, notes) = repair::repair(delta);

    debug!(
        operations = delta.op_count(),
        repairs = notes.len(),
        "response accepted"
    );

    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::coherence::{FailureKind, ParseFailure};
    use crate::models::map::{NodeCategory, NodeStatus};

    #[test]
    fn old_mill_is_normalized_and_accepted() {
        let text = r#"{"nodesToAdd": [{"name": "Old Mill", "category": "building",
            "parentId": "root", "status": "found"}]}"#;

        let delta = process_response(text).expect("should be accepted");
        let mill = &delta.nodes_to_add[0];

        assert_eq!(mill.category, NodeCategory::Exterior);
        assert_eq!(mill.status, NodeStatus::Discovered);
    }

    #[test]
    fn removal_status_on_update_comes_out_as_removal() {
        let text = r#"{"nodesToUpdate": [{"name": "Old Mill", "status": "Destroyed"}]}"#;

        let delta = process_response(text).expect("should be accepted");
        assert!(delta.nodes_to_update.is_empty());
        assert_eq!(delta.nodes_to_remove[0].target, "Old Mill");
    }

    #[test]
    fn rejections_carry_their_cause() {
        assert_eq!(
            process_response("nothing to see"),
            Err(Rejection::Parse(ParseFailure::NoStructure))
        );

        let rejection = process_response(r#"{"nodesToAdd": [{"name": "Vault", "category": "spaceship",
            "parent": "root", "status": "discovered"}]}"#)
        .expect_err("should be rejected");

        assert_eq!(rejection.errors()[0].kind, FailureKind::Value);
        assert!(rejection.summary().contains("spaceship"));
    }
}
