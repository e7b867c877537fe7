//! Backend plugins behind the unified storage contract.

pub mod document;
pub mod memory;
pub mod options;
pub mod plugin;
pub mod postgres;

pub use memory::{ForeignKeyDefinition, MemoryPlugin, UnitDefinition};
pub use options::PostgresOptions;
pub use plugin::{Plugin, PluginDescriptor};
pub use postgres::PostgresPlugin;
