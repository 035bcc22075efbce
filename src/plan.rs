use std::fmt::{self, Display};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::Level;

use crate::engine::{self, Binding, Node, NodeId, ProducerIndex};
use crate::error::GraphError;
use crate::template::TemplateValue;

/// Orders `nodes` against the `external` artifacts and splits the order into
/// waves.
///
/// Node handles in the returned [`Plan`] are the positions of the nodes in
/// `nodes`. Bindings left over from an earlier build are discarded.
pub fn build_graph(
    mut nodes: Vec<Node>,
    external: impl IntoIterator<Item = TemplateValue>,
) -> Result<Plan, GraphError> {
    let span = tracing::span!(Level::INFO, "build_graph", nodes = nodes.len());
    let _enter = span.enter();

    for node in &mut nodes {
        node.binding = None;
    }

    let producers = ProducerIndex::seed(external);
    let (order, producers) = engine::order(&mut nodes, producers)?;
    let levels = engine::levels(&nodes, &order)?;

    tracing::info!(
        nodes = nodes.len(),
        waves = levels.len(),
        artifacts = producers.len(),
        "Graph built"
    );

    Ok(Plan {
        nodes,
        order,
        levels,
        producers,
    })
}

/// The outcome of a successful build.
///
/// Every node carries its final binding. The waves are a contract for the
/// execution layer: nodes of one wave only read artifacts written by earlier
/// waves and may run concurrently.
#[derive(Debug, Clone)]
pub struct Plan {
    nodes: Vec<Node>,
    order: Vec<NodeId>,
    levels: Vec<Vec<NodeId>>,
    producers: ProducerIndex,
}

impl Plan {
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    /// The flattened sequential order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn binding(&self, id: NodeId) -> Option<&Binding> {
        self.node(id).and_then(Node::binding)
    }

    pub fn producers(&self) -> &ProducerIndex {
        &self.producers
    }

    /// Iterates over the waves, resolving handles to nodes.
    pub fn waves(&self) -> impl Iterator<Item = Vec<&Node>> {
        self.levels
            .iter()
            .map(|wave| wave.iter().map(|id| &self.nodes[id.0]).collect())
    }

    /// Exports the plan as a petgraph graph. Node weights are handles, with
    /// `NodeIndex` equal to the handle index. There is one edge per producer,
    /// consumer and artifact passed between them.
    pub fn to_graph(&self) -> DiGraph<NodeId, TemplateValue> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), 0);

        for index in 0..self.nodes.len() {
            graph.add_node(NodeId(index));
        }

        for &consumer in &self.order {
            let Some(binding) = self.binding(consumer) else {
                continue;
            };

            for value in &binding.actual_inputs {
                for &producer in self.producers.producers(value) {
                    if producer != consumer {
                        graph.add_edge(
                            NodeIndex::new(producer.0),
                            NodeIndex::new(consumer.0),
                            value.clone(),
                        );
                    }
                }
            }
        }

        graph
    }
}

/// Renders the plan as a Mermaid flowchart, one subgraph per wave.
impl Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;

        for (wave, ids) in self.levels.iter().enumerate() {
            writeln!(f, "    subgraph wave{wave}[\"Wave {wave}\"]")?;
            for id in ids {
                let name = escape(self.nodes[id.0].name());
                writeln!(f, "        {}[\"{}\"]", id.0, name)?;
            }
            writeln!(f, "    end")?;
        }

        let graph = self.to_graph();
        for edge in graph.raw_edges() {
            let label = escape(edge.weight.as_str());
            writeln!(
                f,
                "    {} -- \"{}\" --> {}",
                edge.source().index(),
                label,
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

fn escape(label: &str) -> String {
    label
        .replace('"', "\\\"")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
