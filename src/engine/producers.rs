use indexmap::IndexMap;

use crate::engine::NodeId;
use crate::template::{Template, TemplateValue};

/// Multimap from concrete artifact to the nodes producing it.
///
/// Externally supplied artifacts are present with no producer. Entries keep
/// insertion order and are only ever appended to during one build.
#[derive(Debug, Clone, Default)]
pub struct ProducerIndex {
    map: IndexMap<TemplateValue, Vec<NodeId>>,
}

impl ProducerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index knowing the given external artifacts.
    pub fn seed(external: impl IntoIterator<Item = TemplateValue>) -> Self {
        Self {
            map: external.into_iter().map(|value| (value, Vec::new())).collect(),
        }
    }

    /// Records `node` as a producer of `value`. Returns `false` when it was
    /// already registered for that exact artifact.
    pub fn register(&mut self, value: TemplateValue, node: NodeId) -> bool {
        let producers = self.map.entry(value).or_default();

        if producers.contains(&node) {
            return false;
        }

        producers.push(node);
        true
    }

    /// Every known artifact matched by `template`, in insertion order.
    pub fn matching<'a>(
        &'a self,
        template: &'a Template,
    ) -> impl Iterator<Item = &'a TemplateValue> + 'a {
        self.map.keys().filter(|value| template.matches(value))
    }

    /// Nodes registered as producers of `value`, empty for external or
    /// unknown artifacts.
    pub fn producers(&self, value: &TemplateValue) -> &[NodeId] {
        self.map.get(value).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, value: &TemplateValue) -> bool {
        self.map.contains_key(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TemplateValue, &[NodeId])> {
        self.map.iter().map(|(value, nodes)| (value, nodes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
