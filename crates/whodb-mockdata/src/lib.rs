//! Foreign-key aware mock data generation for WhoDB storage units.
//!
//! A request for `N` rows of one unit plans the unit together with every
//! transitive parent, writes parents first and wires foreign keys to rows
//! that were actually written in the same run.

pub mod engine;
pub mod errors;
pub mod foreign;
pub mod generators;
pub mod model;
pub mod planner;

pub use engine::GenerationEngine;
pub use errors::{GenerationError, Result};
pub use model::{
    GenerateOptions, GenerationPlan, GenerationReport, NullPolicy, PlanStep, UnitReport,
};
