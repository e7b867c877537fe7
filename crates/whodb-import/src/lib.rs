//! Validation and staging of external tabular data before it is written.

pub mod commit;
pub mod errors;
pub mod model;
pub mod validate;

pub use commit::commit_import;
pub use errors::{ImportError, Result};
pub use model::{
    AutoGeneratedPolicy, ColumnMapping, DisabledReason, ImportLimits, ImportOptions,
    ImportPreview, ImportResult, MappedColumn, StagedImport, SubmitState, TabularInput,
};
pub use validate::{
    validate_import, validate_mapped_import, validate_mapped_records, validate_records,
};
