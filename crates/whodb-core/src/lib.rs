//! Core model shared by the WhoDB engine crates.
//!
//! Holds the canonical type and value vocabulary, the condition model, the
//! storage-unit data model, the relationship graph and the error taxonomy.

pub mod condition;
pub mod config;
pub mod error;
pub mod graph;
pub mod schema;
pub mod types;
pub mod value;

pub use condition::{Condition, Operator, OperatorSet, Page, Sort, SortDirection};
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use graph::{GraphSummary, RelationshipGraph};
pub use schema::{
    Cardinality, Column, ForeignKeyEdge, Row, RowIdentity, RowSet, StorageUnit, WriteMode,
};
pub use types::{CanonicalType, Category, TypeSpec};
pub use value::{Value, ValueError};
