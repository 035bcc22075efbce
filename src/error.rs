use std::fmt::{self, Display};

use thiserror::Error;

/// Errors raised while constructing tags, templates and template values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Blank name in '{0}'")]
    BlankName(String),

    #[error("Blank tag in '{0}'")]
    BlankTag(String),

    #[error("Tag '{0}' has no value, concrete values need 'name: value' tags")]
    MissingValue(String),

    #[error("Invalid character '{1}' in '{0}'")]
    InvalidCharacter(String, char),

    #[error("Duplicate tag '{0}' found in '{1}'")]
    DuplicateTag(String, String),
}

/// A node that could not be bound, with the input templates that matched
/// nothing known to the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub node: String,
    pub inputs: Vec<String>,
}

impl Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' waits for [{}]", self.node, self.inputs.join("], ["))
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Cyclic graph detected! Nodes involved: {}", .0.join(" -> "))]
    Cyclic(Vec<String>),

    #[error("Unresolved inputs:\n{}", format_unresolved(.0))]
    UnresolvedInputs(Vec<Unresolved>),

    #[error("Node '{node}': {source}")]
    Node {
        node: String,
        #[source]
        source: TemplateError,
    },

    #[error("External input: {0}")]
    Input(#[from] TemplateError),

    #[error("Couldn't read manifest.\n{0}")]
    Manifest(#[from] serde_json::Error),
}

fn format_unresolved(stuck: &[Unresolved]) -> String {
    stuck
        .iter()
        .map(|item| format!("  {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
