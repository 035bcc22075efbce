use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::engine::{Expansion, Node, NodeId};
use crate::error::GraphError;
use crate::plan::{Plan, build_graph};
use crate::template::TemplateValue;

/// The blueprint for your dataflow graph.
///
/// `Blueprint` collects nodes and the artifacts supplied from outside. Nodes
/// declare their inputs and outputs as template literals; how they connect is
/// only worked out once the blueprint is built into a [`Plan`].
///
/// # Example
///
/// ```rust
/// use tagflow::Blueprint;
///
/// let mut blueprint = Blueprint::new();
/// blueprint.input("raw, id: 1").unwrap();
/// blueprint.input("raw, id: 2").unwrap();
///
/// blueprint
///     .node()
///     .name("Clean")
///     .input("raw, id")
///     .output("clean, id")
///     .add()
///     .unwrap();
///
/// let plan = blueprint.build().unwrap();
/// assert_eq!(plan.levels().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Blueprint {
    nodes: Vec<Node>,
    inputs: Vec<TemplateValue>,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every node and external input of a manifest.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, GraphError> {
        let mut blueprint = Blueprint::new();

        for literal in &manifest.inputs {
            blueprint.input(literal)?;
        }

        for spec in &manifest.nodes {
            let mut def = blueprint
                .node()
                .inputs(&spec.inputs)
                .outputs(&spec.outputs);

            if let Some(name) = &spec.name {
                def = def.name(name.clone());
            }
            if spec.grid {
                def = def.grid();
            }

            def.add()?;
        }

        Ok(blueprint)
    }

    /// Declares an artifact supplied from outside the graph.
    pub fn input(&mut self, literal: &str) -> Result<&mut Self, GraphError> {
        self.inputs.push(TemplateValue::parse(literal)?);
        Ok(self)
    }

    /// Starts declaring a new node.
    pub fn node(&mut self) -> NodeDef<'_> {
        NodeDef {
            blueprint: self,
            name: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            expansion: Expansion::Tags,
        }
    }

    /// Adds an already constructed node.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn inputs(&self) -> &[TemplateValue] {
        &self.inputs
    }

    pub fn build(self) -> Result<Plan, GraphError> {
        build_graph(self.nodes, self.inputs)
    }
}

pub struct NodeDef<'a> {
    blueprint: &'a mut Blueprint,
    name: Option<Cow<'static, str>>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    expansion: Expansion,
}

impl<'a> NodeDef<'a> {
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn input(mut self, literal: impl Into<String>) -> Self {
        self.inputs.push(literal.into());
        self
    }

    pub fn inputs<I>(mut self, literals: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.inputs
            .extend(literals.into_iter().map(|lit| lit.as_ref().to_string()));
        self
    }

    pub fn output(mut self, literal: impl Into<String>) -> Self {
        self.outputs.push(literal.into());
        self
    }

    pub fn outputs<I>(mut self, literals: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.outputs
            .extend(literals.into_iter().map(|lit| lit.as_ref().to_string()));
        self
    }

    /// Switches the node to [`Expansion::Grid`].
    pub fn grid(mut self) -> Self {
        self.expansion = Expansion::Grid;
        self
    }

    /// Parses the declared literals and adds the node to the blueprint.
    /// Unnamed nodes are called `node-<index>`.
    pub fn add(self) -> Result<NodeId, GraphError> {
        let index = self.blueprint.nodes.len();
        let name = self
            .name
            .unwrap_or_else(|| Cow::Owned(format!("node-{index}")));

        let node = Node::parse(name, &self.inputs, &self.outputs)?.with_expansion(self.expansion);

        Ok(self.blueprint.add_node(node))
    }
}

/// Declarative form of a [`Blueprint`].
///
/// ```json
/// {
///   "inputs": ["X, country: DE"],
///   "nodes": [
///     { "name": "Split", "inputs": ["X, country"], "outputs": ["X_train, country"] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub grid: bool,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }
}
