#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
pub mod engine;
mod error;
mod plan;
pub mod tag;
pub mod template;
#[cfg(feature = "logging")]
mod utils;

pub use crate::blueprint::{Blueprint, Manifest, NodeDef, NodeSpec};
pub use crate::engine::{Bind, Binding, Expansion, Node, NodeId, ProducerIndex};
pub use crate::error::*;
pub use crate::plan::{Plan, build_graph};
pub use crate::tag::{Tag, TagFilter};
pub use crate::template::{Template, TemplateValue};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
