use super::Key;
use gbnf_derive::Gbnf;
use itertools::Itertools;
use serde::Serialize;
use std::fmt::Display;
use strum::{AsRefStr, Display as StrumDisplay, EnumString, EnumVariantNames};
use thiserror::Error;

/// Which half of validation a diagnostic came from.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or mistyped required field.
    Structural,
    /// Category or status not in the canonical set, even after
    /// synonym normalization.
    Value,
}

/// One (location, offending value, reason) record from a validation
/// pass.
#[derive(Error, Serialize, Debug, Clone, PartialEq)]
#[error("{location}: {reason}{}", .value.as_deref().map(|v| format!(" (got `{}`)", v)).unwrap_or_default())]
pub struct ValidationError {
    pub kind: FailureKind,
    pub location: String,
    pub value: Option<String>,
    pub reason: String,
}

impl ValidationError {
    pub fn structural(location: impl Display, reason: impl Into<String>) -> ValidationError {
        ValidationError {
            kind: FailureKind::Structural,
            location: location.to_string(),
            value: None,
            reason: reason.into(),
        }
    }

    pub fn mistyped(location: impl Display, value: &serde_json::Value) -> ValidationError {
        ValidationError {
            kind: FailureKind::Structural,
            location: location.to_string(),
            value: Some(value.to_string()),
            reason: "expected a string".to_string(),
        }
    }

    pub fn value(location: impl Display, value: &str, allowed: &[&str]) -> ValidationError {
        ValidationError {
            kind: FailureKind::Value,
            location: location.to_string(),
            value: Some(value.to_string()),
            reason: format!("must be one of: {}", allowed.join(", ")),
        }
    }
}

#[derive(Error, Serialize, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("no JSON object or array found in the response")]
    NoStructure,

    #[error("response JSON could not be read: {0}")]
    Malformed(String),
}

/// Why one attempt's response was not accepted. Passed by value from
/// attempt N to the prompt of attempt N+1.
#[derive(Error, Serialize, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("parse failure: {0}")]
    Parse(ParseFailure),

    #[error("{} validation error(s)", .0.len())]
    Invalid(Vec<ValidationError>),
}

impl Rejection {
    /// Bullet list suitable for a correction prompt.
    pub fn summary(&self) -> String {
        match self {
            Rejection::Parse(failure) => format!(" - {}", failure),
            Rejection::Invalid(errors) => errors.iter().map(|e| format!(" - {}", e)).join("\n"),
        }
    }

    pub fn errors(&self) -> &[ValidationError] {
        match self {
            Rejection::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

/// Graph-level invariant breaks found in an otherwise well-formed
/// delta.
#[derive(Debug, Clone, PartialEq)]
pub enum CoherenceFailure {
    /// A feature node would end up parented by another feature node.
    FeatureParentsFeature { child: Key, parent: Key },

    /// Two adds in the same delta share a display name. Indexes are
    /// into nodes_to_add; the first occurrence keeps its name.
    DuplicateName { name: String, duplicates: Vec<usize> },

    /// A node is being split; its existing children must be assigned
    /// to the original or the new node.
    OrphanedChildren {
        original: Key,
        new_name: String,
        children: Vec<Key>,
    },
}

/// The two ways out of a feature-inside-feature violation.
#[derive(
    Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumVariantNames, AsRefStr, StrumDisplay,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HierarchyFix {
    /// Turn the parent into a container category.
    PromoteParent,
    /// Move the child up to be a sibling of its parent.
    MakeSibling,
}

#[derive(
    Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumVariantNames, AsRefStr, StrumDisplay,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrphanDestination {
    Original,
    New,
}

// Answer shapes for the narrow resolution questions put to the
// secondary backend. Only their grammars are used; answers are read
// loosely by the generator.

/// Grammar for the promote-or-sibling question.
#[derive(Gbnf, Debug)]
pub struct HierarchyChoice {
    #[gbnf(one_of("promote_parent", "make_sibling"))]
    pub fix: String,
}

#[derive(Gbnf, Debug)]
#[gbnf(rename_all = "camelCase")]
pub struct OrphanAssignment {
    pub child_id: String,
    #[gbnf(one_of("original", "new"))]
    pub destination: String,
}

/// Grammar for sorting a split node's children.
#[derive(Gbnf, Debug)]
pub struct OrphanAssignments {
    pub assignments: Vec<OrphanAssignment>,
}

/// Grammar for the rename-a-duplicate question.
#[derive(Gbnf, Debug)]
pub struct DistinctName {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::VariantNames;

    #[test]
    fn answer_grammars_offer_exactly_the_choices() {
        let hierarchy = HierarchyChoice::to_grammar();
        for fix in HierarchyFix::VARIANTS {
            assert!(hierarchy.contains(&format!("\"\\\"{}\\\"\"", fix)), "{}", hierarchy);
        }

        let orphans = OrphanAssignments::to_grammar();
        for destination in OrphanDestination::VARIANTS {
            assert!(orphans.contains(&format!("\"\\\"{}\\\"\"", destination)), "{}", orphans);
        }
        assert!(orphans.contains("childId"), "{}", orphans);
        assert!(DistinctName::to_grammar().contains("name"));
    }

    #[test]
    fn summary_names_location_value_and_reason() {
        let rejection = Rejection::Invalid(vec![
            ValidationError::value("nodesToAdd[0].category", "castle-ish", &["region", "room"]),
            ValidationError::structural("edgesToAdd[1].source", "missing required field"),
        ]);

        let summary = rejection.summary();
        assert_eq!(
            summary,
            " - nodesToAdd[0].category: must be one of: region, room (got `castle-ish`)\n \
             - edgesToAdd[1].source: missing required field"
        );
    }
}
