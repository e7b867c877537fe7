//! Plugin registry, query/command façade and relationship resolution.

pub mod export;
pub mod facade;
pub mod registry;
pub mod resolver;

pub use facade::{Facade, MutationOutcome, RowMutation};
pub use registry::PluginRegistry;
pub use resolver::SchemaSnapshot;
