use thiserror::Error;

use whodb_core::ErrorKind;

/// Errors emitted by the mock data generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Engine(#[from] whodb_core::Error),
    #[error("mock data generation is disabled for '{0}'")]
    Disabled(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("no unique value for '{unit}.{column}' after {attempts} attempts")]
    UniqueExhausted {
        unit: String,
        column: String,
        attempts: u32,
    },
}

impl GenerationError {
    /// Position of this failure in the engine-wide taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Engine(err) => err.kind(),
            GenerationError::Disabled(_) | GenerationError::Unsupported(_) => {
                ErrorKind::Unsupported
            }
            GenerationError::UniqueExhausted { .. } => ErrorKind::ConstraintViolation,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
