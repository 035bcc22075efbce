//! Incremental ordering of templated nodes against a growing set of known
//! artifacts.
//!
//! Nodes are taken from a FIFO queue and bound against the artifacts known so
//! far. A node that cannot be bound goes to the back of the queue. A node
//! that can be bound registers its outputs and is appended to the order.
//!
//! Appending may reveal that nodes already placed consume the artifacts the
//! new node just produced; they were placed too early. Those successors are
//! pulled out of the order and revised: rebound against the enlarged index and
//! appended again, which in turn may revise their own successors. While its
//! successors are being revised a node sits in quarantine. Meeting a
//! quarantined node again means the revision chain loops, i.e. the graph has
//! a cycle.
//!
//! The revision runs on an explicit stack of frames rather than the call
//! stack, so long dependency chains do not grow the native stack.

use std::collections::{HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, trace};

use crate::engine::{Bind, Node, NodeId, ProducerIndex};
use crate::error::{GraphError, Unresolved};
use crate::template::Template;

enum Frame {
    /// Bind and place the node.
    Visit(NodeId),
    /// All successors of the node have been revised, lift its quarantine.
    Release(NodeId),
}

struct Scheduler<'a> {
    nodes: &'a mut [Node],
    producers: ProducerIndex,
    pending: VecDeque<NodeId>,
    ordered: Vec<NodeId>,
    quarantined: Vec<NodeId>,
    /// Input templates which matched nothing on the last failed attempt.
    unmatched: HashMap<NodeId, Vec<usize>>,
}

/// Orders `nodes` so that every node comes after the producers of its actual
/// inputs. Leaves the final binding on every node.
pub(crate) fn order(
    nodes: &mut [Node],
    producers: ProducerIndex,
) -> Result<(Vec<NodeId>, ProducerIndex), GraphError> {
    let pending = (0..nodes.len()).map(NodeId).collect();

    let mut scheduler = Scheduler {
        nodes,
        producers,
        pending,
        ordered: Vec::new(),
        quarantined: Vec::new(),
        unmatched: HashMap::new(),
    };

    let mut stalled = 0;

    while let Some(id) = scheduler.pending.pop_front() {
        if scheduler.place(id)? {
            stalled = 0;
            continue;
        }

        debug!(node = scheduler.name(id), "Not ready, requeued");
        scheduler.pending.push_back(id);
        stalled += 1;

        // every node left has failed once since the last placement
        if stalled >= scheduler.pending.len() {
            return Err(scheduler.diagnose());
        }
    }

    Ok((scheduler.ordered, scheduler.producers))
}

impl Scheduler<'_> {
    fn name(&self, id: NodeId) -> &str {
        self.nodes[id.0].name()
    }

    fn names(&self, ids: impl IntoIterator<Item = NodeId>) -> Vec<String> {
        ids.into_iter().map(|id| self.name(id).to_string()).collect()
    }

    /// Binds and places `start`, revising every placed node that turns out to
    /// depend on it. Returns `false` if `start` is not ready yet.
    fn place(&mut self, start: NodeId) -> Result<bool, GraphError> {
        let mut stack = vec![Frame::Visit(start)];

        while let Some(frame) = stack.pop() {
            let id = match frame {
                Frame::Visit(id) => id,
                Frame::Release(id) => {
                    let released = self.quarantined.pop();
                    debug_assert_eq!(released, Some(id));
                    continue;
                }
            };

            let binding = match self.nodes[id.0].bind(id, &self.producers) {
                Bind::Ready(binding) => binding,
                Bind::NotReady { unmatched } if id == start => {
                    self.unmatched.insert(id, unmatched);
                    return Ok(false);
                }
                Bind::NotReady { unmatched } => {
                    // a revised node lost its inputs, retry it later instead
                    // of dropping it
                    debug!(node = self.name(id), "Revised node not ready, requeued");
                    self.unmatched.insert(id, unmatched);
                    self.pending.push_back(id);
                    continue;
                }
            };

            if self.quarantined.contains(&id) {
                let mut chain = self.names(self.quarantined.iter().copied());
                chain.push(self.name(id).to_string());
                return Err(GraphError::Cyclic(chain));
            }

            trace!(
                node = self.name(id),
                inputs = binding.actual_inputs.len(),
                outputs = binding.actual_outputs.len(),
                "Bound"
            );

            for value in &binding.actual_outputs {
                self.producers.register(value.clone(), id);
            }

            let successors: Vec<NodeId> = self
                .ordered
                .iter()
                .copied()
                .filter(|&other| other != id && self.nodes[other.0].consumes(&binding.actual_outputs))
                .collect();

            self.nodes[id.0].binding = Some(binding);
            self.unmatched.remove(&id);
            self.ordered.push(id);

            if successors.is_empty() {
                debug!(node = self.name(id), position = self.ordered.len() - 1, "Placed");
                continue;
            }

            debug!(
                node = self.name(id),
                successors = ?self.names(successors.iter().copied()),
                "Placed, revising successors"
            );

            self.quarantined.push(id);
            self.ordered.retain(|other| !successors.contains(other));

            stack.push(Frame::Release(id));
            stack.extend(successors.into_iter().rev().map(Frame::Visit));
        }

        Ok(true)
    }

    /// Explains why none of the pending nodes can be placed.
    ///
    /// Two or more stuck nodes waiting on each other form a cycle, reported
    /// as such. Otherwise each stuck node is listed with its unmatched
    /// templates.
    fn diagnose(&self) -> GraphError {
        let mut stuck: Vec<NodeId> = self.pending.iter().copied().collect();
        stuck.sort();

        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let indices: HashMap<NodeId, NodeIndex> =
            stuck.iter().map(|&id| (id, graph.add_node(id))).collect();

        for &consumer in &stuck {
            let wanted = self.unmatched_templates(consumer);

            // a node never consumes its own outputs, see `Node::bind`
            for &producer in stuck.iter().filter(|&&p| p != consumer) {
                let feeds = self.nodes[producer.0]
                    .outputs()
                    .iter()
                    .any(|output| wanted.iter().any(|input| output.could_feed(input)));

                if feeds {
                    graph.add_edge(indices[&producer], indices[&consumer], ());
                }
            }
        }

        let cycle = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut ids: Vec<NodeId> = component.into_iter().map(|index| graph[index]).collect();
                ids.sort();
                ids
            })
            .min();

        if let Some(cycle) = cycle {
            return GraphError::Cyclic(self.names(cycle));
        }

        let unresolved = stuck
            .iter()
            .map(|&id| Unresolved {
                node: self.name(id).to_string(),
                inputs: self
                    .unmatched_templates(id)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            })
            .collect();

        GraphError::UnresolvedInputs(unresolved)
    }

    fn unmatched_templates(&self, id: NodeId) -> Vec<&Template> {
        let inputs = self.nodes[id.0].inputs();

        self.unmatched
            .get(&id)
            .map(|positions| positions.iter().map(|&pos| &inputs[pos]).collect())
            .unwrap_or_default()
    }
}
