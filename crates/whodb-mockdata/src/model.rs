use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use whodb_core::WriteMode;
use whodb_core::config::{DEFAULT_CHILDREN_PER_PARENT, DEFAULT_MAX_ATTEMPTS_ROW, MAX_MOCK_DATA_ROWS};

/// Wildcard entry of [`GenerateOptions::disabled_units`] that turns generation off.
pub const DISABLE_ALL: &str = "*";

/// Whether nullable columns may receive NULL.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Every writable column gets a value.
    #[default]
    Never,
    /// Nullable, non-key columns are NULL with this probability.
    Probability(f64),
}

/// Options for the generation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Upper bound for a single request; larger requests are clamped. Values
    /// above [`MAX_MOCK_DATA_ROWS`] do not raise the cap.
    pub max_rows: u64,
    /// Children sharing one parent row when sizing non one-to-one parents.
    pub children_per_parent: u64,
    pub null_policy: NullPolicy,
    /// Fixed RNG seed; a random seed is drawn when absent.
    pub seed: Option<u64>,
    /// Units excluded from generation; `"*"` excludes all.
    pub disabled_units: Vec<String>,
    /// Maximum attempts to produce a unique value for one cell.
    pub max_attempts_row: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_rows: MAX_MOCK_DATA_ROWS,
            children_per_parent: DEFAULT_CHILDREN_PER_PARENT,
            null_policy: NullPolicy::Never,
            seed: None,
            disabled_units: Vec::new(),
            max_attempts_row: DEFAULT_MAX_ATTEMPTS_ROW,
        }
    }
}

impl GenerateOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    pub fn disable(mut self, unit: impl Into<String>) -> Self {
        self.disabled_units.push(unit.into());
        self
    }

    /// Entries are trimmed and compared exactly, case included.
    pub fn is_disabled(&self, unit: &str) -> bool {
        self.disabled_units.iter().map(|entry| entry.trim()).any(|entry| {
            entry == DISABLE_ALL || entry == unit
        })
    }

    /// Bring a requested row count into `[1, min(max_rows, MAX_MOCK_DATA_ROWS)]`.
    pub fn clamp_rows(&self, requested: u64) -> u64 {
        requested.clamp(1, self.max_rows.min(MAX_MOCK_DATA_ROWS).max(1))
    }
}

/// One unit of a plan with the number of rows to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub unit: String,
    pub rows: u64,
}

/// Parents-first write order for one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub target: String,
    pub rows_requested: u64,
    /// Target row count after clamping.
    pub rows: u64,
    pub mode: WriteMode,
    pub steps: Vec<PlanStep>,
}

impl GenerationPlan {
    pub fn units(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.unit.clone()).collect()
    }

    pub fn rows_for(&self, unit: &str) -> Option<u64> {
        self.steps
            .iter()
            .find(|step| step.unit == unit)
            .map(|step| step.rows)
    }
}

/// Outcome for one unit of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: String,
    pub rows_planned: u64,
    pub rows_written: u64,
    pub rows_cleared: u64,
    /// Candidates discarded because a unique column already held them.
    pub retries: u64,
}

/// Report for a fully successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub target: String,
    pub rows_requested: u64,
    /// Rows written to the target unit.
    pub rows_generated: u64,
    pub units: Vec<UnitReport>,
    /// Values produced per generator, e.g. `email` or `type:integer`.
    pub generator_usage: BTreeMap<String, u64>,
}

impl GenerationReport {
    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|report| report.unit == name)
    }

    pub fn record_generator_usage(&mut self, id: &str) {
        *self.generator_usage.entry(id.to_string()).or_insert(0) += 1;
    }
}
