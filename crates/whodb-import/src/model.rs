use std::io::Read;

use serde::{Deserialize, Serialize};

use whodb_core::config::{DEFAULT_IMPORT_MAX_ROWS, DEFAULT_IMPORT_PREVIEW_ROWS};
use whodb_core::{Error, Row, ValidationError, WriteMode};

use crate::errors::{ImportError, Result};

/// Issue codes reported by the validator.
pub mod codes {
    pub const EMPTY_HEADER: &str = "import.validation.emptyHeader";
    pub const DUPLICATE_HEADER: &str = "import.validation.duplicateHeader";
    pub const NO_COLUMNS: &str = "import.validation.noColumns";
    pub const ROW_COLUMN_COUNT: &str = "import.validation.rowColumnCount";
    pub const UNKNOWN_COLUMN: &str = "import.validation.unknownColumn";
    pub const GENERATED_COLUMN: &str = "import.validation.generatedColumn";
    pub const INVALID_VALUE: &str = "import.validation.invalidValue";
    pub const NULL_VALUE: &str = "import.validation.nullValue";
    pub const ROW_LIMIT_EXCEEDED: &str = "import.validation.rowLimitExceeded";
    pub const MAPPING_INVALID: &str = "import.validation.mappingInvalid";
    pub const AUTO_GENERATED_TOGGLE: &str = "import.validation.autoGeneratedToggle";
    pub const COLUMN_COUNT_MISMATCH: &str = "import.validation.columnCountMismatch";
    pub const COLUMN_COUNT_INSERTABLE: &str = "import.validation.columnCountInsertable";
}

/// Raw records; the first record holds the headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularInput {
    pub records: Vec<Vec<String>>,
}

impl TabularInput {
    pub fn new(records: Vec<Vec<String>>) -> Self {
        Self { records }
    }

    /// Read every record of a CSV stream; ragged rows are kept for validation.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut records = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { records })
    }

    pub fn headers(&self) -> &[String] {
        self.records.first().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn data(&self) -> &[Vec<String>] {
        self.records.get(1..).unwrap_or_default()
    }
}

/// How source columns are matched to target columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMapping {
    /// Every header names its target column.
    #[default]
    Headers,
    /// The n-th source column feeds the n-th insertable target column.
    ///
    /// Generated and serial/identity columns are not insertable.
    Positional,
    /// One entry per source column, in any order.
    Explicit {
        columns: Vec<MappedColumn>,
        /// Allow entries that target serial/identity columns.
        #[serde(default)]
        allow_auto_generated: bool,
    },
}

impl ColumnMapping {
    pub fn explicit(columns: Vec<MappedColumn>) -> Self {
        ColumnMapping::Explicit {
            columns,
            allow_auto_generated: false,
        }
    }

    pub fn allowing_auto_generated(self) -> Self {
        match self {
            ColumnMapping::Explicit { columns, .. } => ColumnMapping::Explicit {
                columns,
                allow_auto_generated: true,
            },
            other => other,
        }
    }
}

/// Where one source column goes; `target: None` leaves it out of the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub source: String,
    pub target: Option<String>,
}

impl MappedColumn {
    pub fn to(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: Some(target.into()),
        }
    }

    pub fn skip(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportLimits {
    pub max_rows: usize,
    pub preview_rows: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_IMPORT_MAX_ROWS,
            preview_rows: DEFAULT_IMPORT_PREVIEW_ROWS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    /// Headers are fine but there are no data rows.
    NothingToImport,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitState {
    Enabled,
    Disabled(DisabledReason),
}

/// What to do with backend-assigned columns present in the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoGeneratedPolicy {
    UseSupplied,
    /// Drop the supplied cells and let the backend assign values.
    #[default]
    Generate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub mode: WriteMode,
    pub auto_generated: AutoGeneratedPolicy,
}

impl ImportOptions {
    pub fn new(mode: WriteMode, auto_generated: AutoGeneratedPolicy) -> Self {
        Self {
            mode,
            auto_generated,
        }
    }
}

/// Result of validating one input against one storage unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPreview {
    pub unit: String,
    pub headers: Vec<String>,
    /// Target column per header; `None` for skipped source columns.
    pub targets: Vec<Option<String>>,
    /// Serial/identity columns present in the headers.
    pub auto_generated_columns: Vec<String>,
    pub rows_total: usize,
    pub issues: Vec<ValidationError>,
    pub submit: SubmitState,
    pub(crate) rows: Vec<Row>,
    pub(crate) preview_rows: usize,
}

impl ImportPreview {
    /// Leading rows for display, already converted to column types.
    pub fn preview(&self) -> &[Row] {
        &self.rows[..self.rows.len().min(self.preview_rows)]
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Hand the parsed rows over for commit; only possible when submit is enabled.
    pub fn stage(self) -> Result<StagedImport> {
        match self.submit {
            SubmitState::Enabled => Ok(StagedImport {
                unit: self.unit,
                headers: self.headers,
                auto_generated_columns: self.auto_generated_columns,
                rows: self.rows,
            }),
            SubmitState::Disabled(DisabledReason::NothingToImport) => {
                Err(ImportError::NothingToImport)
            }
            SubmitState::Disabled(DisabledReason::Invalid) => {
                let first = self.issues.into_iter().next().unwrap_or_else(|| {
                    ValidationError::new(codes::NO_COLUMNS, "input is not importable")
                });
                Err(Error::Validation(first).into())
            }
        }
    }
}

/// Validated rows ready for [`crate::commit_import`].
#[derive(Debug, Clone, PartialEq)]
pub struct StagedImport {
    pub unit: String,
    pub headers: Vec<String>,
    pub auto_generated_columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub rows_written: u64,
    pub rows_cleared: u64,
}
