use indexmap::IndexSet;

use crate::engine::ProducerIndex;
use crate::error::{GraphError, TemplateError};
use crate::tag::Tag;
use crate::template::{Template, TemplateValue, cartesian};

/// Stable handle of a node, its position in the pool handed to the build.
///
/// Nodes are compared by handle, never structurally: two nodes declaring the
/// same templates are still two different nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

/// How a node derives its actual outputs from its actual inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expansion {
    /// Every output template is expanded over the Cartesian product of the
    /// distinct tag values observed on all actual inputs.
    #[default]
    Tags,
    /// Picks one actual input per input template and offers the union of
    /// their tags to all output templates. A pick contributes only when every
    /// output template instantiates.
    Grid,
}

/// The concrete shape of a node once bound against the known artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    pub actual_inputs: Vec<TemplateValue>,
    pub actual_outputs: Vec<TemplateValue>,
    pub predecessors: Vec<NodeId>,
}

/// Outcome of [`Node::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    Ready(Binding),
    /// Positions of the input templates that matched nothing.
    NotReady { unmatched: Vec<usize> },
}

/// A named processing unit declaring its inputs and outputs as templates.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    inputs: Vec<Template>,
    outputs: Vec<Template>,
    expansion: Expansion,
    pub(crate) binding: Option<Binding>,
}

impl Node {
    pub fn new(name: impl Into<String>, inputs: Vec<Template>, outputs: Vec<Template>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            expansion: Expansion::Tags,
            binding: None,
        }
    }

    /// Creates a node from template literals.
    pub fn parse<I, O>(name: impl Into<String>, inputs: I, outputs: O) -> Result<Self, GraphError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        let name = name.into();
        let templates = parse_templates(inputs)
            .and_then(|inputs| Ok((inputs, parse_templates(outputs)?)));

        match templates {
            Ok((inputs, outputs)) => Ok(Node::new(name, inputs, outputs)),
            Err(source) => Err(GraphError::Node { node: name, source }),
        }
    }

    pub fn with_expansion(mut self, expansion: Expansion) -> Self {
        self.expansion = expansion;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Template] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Template] {
        &self.outputs
    }

    pub fn expansion(&self) -> Expansion {
        self.expansion
    }

    /// The binding from the last time this node was placed, if any.
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// Binds the node against the artifacts currently known to `producers`.
    ///
    /// Artifacts already produced by `id` itself are not taken as inputs. A
    /// node is not ready as long as one of its input templates matches
    /// nothing at all.
    pub fn bind(&self, id: NodeId, producers: &ProducerIndex) -> Bind {
        let mut actual_inputs: IndexSet<TemplateValue> = IndexSet::new();
        let mut unmatched = Vec::new();

        for (position, template) in self.inputs.iter().enumerate() {
            let mut matched = producers.matching(template).peekable();

            if matched.peek().is_none() {
                unmatched.push(position);
                continue;
            }

            for value in matched {
                if !producers.producers(value).contains(&id) {
                    actual_inputs.insert(value.clone());
                }
            }
        }

        if !unmatched.is_empty() {
            return Bind::NotReady { unmatched };
        }

        let mut predecessors: IndexSet<NodeId> = IndexSet::new();
        for value in &actual_inputs {
            predecessors.extend(producers.producers(value).iter().copied().filter(|&p| p != id));
        }

        let actual_inputs: Vec<TemplateValue> = actual_inputs.into_iter().collect();
        let actual_outputs = match self.expansion {
            Expansion::Tags => self
                .outputs
                .iter()
                .flat_map(|template| template.expand(&actual_inputs))
                .collect(),
            Expansion::Grid => self.expand_grid(&actual_inputs),
        };

        Bind::Ready(Binding {
            actual_inputs,
            actual_outputs: dedup(actual_outputs),
            predecessors: predecessors.into_iter().collect(),
        })
    }

    /// Whether any input template of this node matches one of `values`.
    pub(crate) fn consumes(&self, values: &[TemplateValue]) -> bool {
        self.inputs
            .iter()
            .any(|template| values.iter().any(|value| template.matches(value)))
    }

    fn expand_grid(&self, actual_inputs: &[TemplateValue]) -> Vec<TemplateValue> {
        let axes: Vec<Vec<&TemplateValue>> = self
            .inputs
            .iter()
            .map(|template| {
                actual_inputs
                    .iter()
                    .filter(|value| value.name() == template.name())
                    .collect()
            })
            .collect();

        let mut outputs = Vec::new();

        for combination in cartesian(&axes) {
            let tags: Vec<&Tag> = combination.iter().flat_map(|value| value.tags()).collect();

            let produced: Option<Vec<TemplateValue>> = self
                .outputs
                .iter()
                .map(|template| template.instantiate(tags.iter().copied()))
                .collect();

            if let Some(produced) = produced {
                outputs.extend(produced);
            }
        }

        outputs
    }
}

fn parse_templates<I>(literals: I) -> Result<Vec<Template>, TemplateError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    literals
        .into_iter()
        .map(|literal| Template::parse(literal.as_ref()))
        .collect()
}

fn dedup(values: Vec<TemplateValue>) -> Vec<TemplateValue> {
    values
        .into_iter()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(literal: &str) -> TemplateValue {
        TemplateValue::parse(literal).unwrap()
    }

    fn index(external: &[&str]) -> ProducerIndex {
        ProducerIndex::seed(external.iter().map(|lit| value(lit)))
    }

    #[test]
    fn test_not_ready_reports_unmatched_positions() {
        let node = Node::parse("Pred", ["model, id", "X_test, id"], ["pred, id"]).unwrap();
        let producers = index(&["X_test, id: 1"]);

        assert_eq!(
            node.bind(NodeId(0), &producers),
            Bind::NotReady { unmatched: vec![0] }
        );
    }

    #[test]
    fn test_bind_collects_inputs_and_predecessors() {
        let node = Node::parse("Fit", ["X_train, id", "y_train, id"], ["model, id"]).unwrap();

        let mut producers = index(&[]);
        for id in ["1", "2"] {
            producers.register(value(&format!("X_train, id: {id}")), NodeId(0));
            producers.register(value(&format!("y_train, id: {id}")), NodeId(1));
        }

        let Bind::Ready(binding) = node.bind(NodeId(2), &producers) else {
            panic!("node should be ready");
        };

        assert_eq!(
            binding.actual_inputs,
            vec![
                value("X_train, id: 1"),
                value("X_train, id: 2"),
                value("y_train, id: 1"),
                value("y_train, id: 2"),
            ]
        );
        assert_eq!(
            binding.actual_outputs,
            vec![value("model, id: 1"), value("model, id: 2")]
        );
        assert_eq!(binding.predecessors, vec![NodeId(0), NodeId(1)]);
    }

    #[test]
    fn test_bind_drops_self_produced_inputs() {
        let node = Node::parse("Ensemble", ["L, method"], ["L, method: ensemble"]).unwrap();

        let mut producers = index(&["L, method: opt"]);
        producers.register(value("L, method: ensemble"), NodeId(3));

        let Bind::Ready(binding) = node.bind(NodeId(3), &producers) else {
            panic!("node should be ready");
        };

        assert_eq!(binding.actual_inputs, vec![value("L, method: opt")]);
        assert!(binding.predecessors.is_empty());
        assert_eq!(binding.actual_outputs, vec![value("L, method: ensemble")]);
    }

    #[test]
    fn test_bind_dedups_outputs() {
        let node = Node::parse("Combine", ["y_test, country"], ["y_test", "y_test"]).unwrap();
        let producers = index(&["y_test, country: DE", "y_test, country: IT"]);

        let Bind::Ready(binding) = node.bind(NodeId(0), &producers) else {
            panic!("node should be ready");
        };

        assert_eq!(binding.actual_outputs, vec![value("y_test")]);
    }

    #[test]
    fn test_node_without_inputs_is_ready() {
        let node = Node::parse("Source", Vec::<&str>::new(), ["seed, id: 0"]).unwrap();

        let Bind::Ready(binding) = node.bind(NodeId(0), &index(&[])) else {
            panic!("node should be ready");
        };

        assert!(binding.actual_inputs.is_empty());
        assert_eq!(binding.actual_outputs, vec![value("seed, id: 0")]);
    }

    #[test]
    fn test_grid_expansion_pairs_inputs() {
        let node = Node::parse("Pred", ["model, id", "X_test, country"], ["pred, id, country"])
            .unwrap()
            .with_expansion(Expansion::Grid);

        let producers = index(&[
            "model, id: 1",
            "model, id: 2",
            "X_test, country: DE",
            "X_test, country: IT",
        ]);

        let Bind::Ready(binding) = node.bind(NodeId(0), &producers) else {
            panic!("node should be ready");
        };

        assert_eq!(binding.actual_outputs.len(), 4);
        assert!(
            binding
                .actual_outputs
                .contains(&value("pred, country: IT, id: 2"))
        );
    }

    #[test]
    fn test_grid_skips_incomplete_combinations() {
        let node = Node::parse("Split", ["data, id"], ["train, id", "test, id, fold"])
            .unwrap()
            .with_expansion(Expansion::Grid);

        let producers = index(&["data, id: 1"]);

        let Bind::Ready(binding) = node.bind(NodeId(0), &producers) else {
            panic!("node should be ready");
        };

        // "test" needs a fold tag nobody carries, so nothing is produced
        assert!(binding.actual_outputs.is_empty());
    }

    #[test]
    fn test_parse_error_names_node() {
        let err = Node::parse("Broken", ["x, a, a"], ["y"]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Node { ref node, source: TemplateError::DuplicateTag(..) } if node == "Broken"
        ));
    }
}
