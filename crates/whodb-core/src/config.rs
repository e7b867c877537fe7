use std::collections::BTreeMap;

use crate::condition::OperatorSet;
use crate::error::{Error, Result};
use crate::types::Category;

/// Upper bound on rows requested from the mock data generator.
pub const MAX_MOCK_DATA_ROWS: u64 = 200;
/// Default number of child rows that share one generated parent row.
pub const DEFAULT_CHILDREN_PER_PARENT: u64 = 3;
/// Default attempts per row before a unique column gives up.
pub const DEFAULT_MAX_ATTEMPTS_ROW: u32 = 50;
/// Rows fetched per round trip while exporting.
pub const DEFAULT_EXPORT_PAGE_SIZE: u64 = 500;
/// Rows accepted by one import.
pub const DEFAULT_IMPORT_MAX_ROWS: usize = 10_000;
/// Rows kept in an import preview.
pub const DEFAULT_IMPORT_PREVIEW_ROWS: usize = 20;

/// Immutable engine settings passed to the façade at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    operator_sets: BTreeMap<Category, OperatorSet>,
    pub export_page_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let operator_sets = [Category::Sql, Category::Document, Category::KeyValue]
            .into_iter()
            .map(|category| (category, OperatorSet::for_category(category)))
            .collect();
        Self {
            operator_sets,
            export_page_size: DEFAULT_EXPORT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn with_operator_set(mut self, category: Category, set: OperatorSet) -> Self {
        self.operator_sets.insert(category, set);
        self
    }

    pub fn with_export_page_size(mut self, size: u64) -> Self {
        self.export_page_size = size.max(1);
        self
    }

    pub fn operators(&self, category: Category) -> Result<&OperatorSet> {
        self.operator_sets
            .get(&category)
            .ok_or_else(|| Error::Unsupported(format!("no operator set for {category}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;

    #[test]
    fn defaults_cover_every_category() {
        let config = EngineConfig::default();
        for category in [Category::Sql, Category::Document, Category::KeyValue] {
            assert!(config.operators(category).is_ok());
        }
        assert_eq!(config.export_page_size, DEFAULT_EXPORT_PAGE_SIZE);
    }

    #[test]
    fn operator_sets_can_be_narrowed() {
        let config = EngineConfig::default()
            .with_operator_set(Category::Document, OperatorSet::new([Operator::Eq]));
        let set = config.operators(Category::Document).unwrap();
        assert!(!set.contains(Operator::Match));
    }
}
