use thiserror::Error;

use whodb_core::ErrorKind;

/// Errors emitted while reading, staging or committing an import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Engine(#[from] whodb_core::Error),
    /// Headers were accepted but there are no data rows.
    #[error("nothing to import: the input has headers but no rows")]
    NothingToImport,
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::Engine(err) => err.kind(),
            ImportError::NothingToImport | ImportError::Csv(_) => ErrorKind::ValidationError,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
