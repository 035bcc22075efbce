use std::collections::HashSet;

use crate::engine::{Node, NodeId};
use crate::error::GraphError;

/// Splits a valid order into waves of mutually independent nodes.
///
/// A node joins the current wave once all of its predecessors sit in earlier
/// waves. Nodes keep their relative order inside a wave. Predecessors that
/// are not part of `ordered` are ignored.
pub(crate) fn levels(nodes: &[Node], ordered: &[NodeId]) -> Result<Vec<Vec<NodeId>>, GraphError> {
    let members: HashSet<NodeId> = ordered.iter().copied().collect();
    let mut placed: HashSet<NodeId> = HashSet::with_capacity(ordered.len());
    let mut remaining: Vec<NodeId> = ordered.to_vec();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (wave, rest): (Vec<NodeId>, Vec<NodeId>) =
            remaining.iter().copied().partition(|&id| {
                predecessors(nodes, id)
                    .iter()
                    .filter(|p| members.contains(*p))
                    .all(|p| placed.contains(p))
            });

        if wave.is_empty() {
            let names = rest.iter().map(|id| nodes[id.0].name().to_string()).collect();
            return Err(GraphError::Cyclic(names));
        }

        placed.extend(wave.iter().copied());
        levels.push(wave);
        remaining = rest;
    }

    Ok(levels)
}

fn predecessors(nodes: &[Node], id: NodeId) -> &[NodeId] {
    nodes[id.0]
        .binding()
        .map(|binding| binding.predecessors.as_slice())
        .unwrap_or_default()
}
