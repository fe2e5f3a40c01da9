use crate::models::map::{MapEdge, MapGraph, MapNode};
use crate::models::ROOT_NODE_ID;
use itertools::Itertools;

use tabled::settings::Style;
use tabled::{Table, Tabled};

const UNKNOWN: &'static str = "unknown";

#[derive(Tabled)]
pub struct NodeTableRow<'a> {
    id: &'a str,
    name: &'a str,
    category: &'a str,
    status: &'a str,
    #[tabled(rename = "parent")]
    parent_id: &'a str,
}

impl<'a> From<&'a MapNode> for NodeTableRow<'a> {
    fn from(value: &'a MapNode) -> Self {
        NodeTableRow {
            id: &value.id,
            name: &value.name,
            category: value.category.as_ref(),
            status: value.status.as_ref(),
            parent_id: &value.parent_id,
        }
    }
}

#[derive(Tabled)]
pub struct EdgeTableRow<'a> {
    id: &'a str,
    source: &'a str,
    target: &'a str,
    category: &'a str,
    status: &'a str,
}

fn name_of<'a>(graph: &'a MapGraph, id: &'a str) -> &'a str {
    graph.node(id).map(|n| n.name.as_str()).unwrap_or(UNKNOWN)
}

fn edge_row<'a>(graph: &'a MapGraph, edge: &'a MapEdge) -> EdgeTableRow<'a> {
    EdgeTableRow {
        id: &edge.id,
        source: name_of(graph, &edge.source_id),
        target: name_of(graph, &edge.target_id),
        category: edge.category.as_ref(),
        status: edge.status.as_ref(),
    }
}

pub(super) fn node_table<'a, I>(nodes: I) -> Table
where
    I: IntoIterator<Item = &'a MapNode>,
{
    let nodes = nodes.into_iter();
    let mut table = Table::new(nodes.map_into::<NodeTableRow>());
    table.with(Style::markdown());
    table
}

pub(super) fn edge_table(graph: &MapGraph) -> Table {
    let rows = graph.edges().iter().map(|edge| edge_row(graph, edge));
    let mut table = Table::new(rows);
    table.with(Style::markdown());
    table
}

/// Node and edge tables, or a note that the map is still blank.
pub fn map_tables(graph: &MapGraph) -> String {
    if graph.is_empty() {
        return format!(
            "The map is empty. Every new top-level place must use `{}` as its parent.",
            ROOT_NODE_ID
        );
    }

    format!(
        "Places:\n{}\n\nConnections:\n{}",
        node_table(graph.nodes()),
        edge_table(graph)
    )
}
