mod builder;
mod level;
mod node;
mod producers;

pub use crate::engine::node::{Bind, Binding, Expansion, Node, NodeId};
pub use crate::engine::producers::ProducerIndex;

pub(crate) use crate::engine::builder::order;
pub(crate) use crate::engine::level::levels;
