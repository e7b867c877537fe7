use whodb_core::{Category, Column};

/// Declared shape of one in-memory storage unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDefinition {
    pub name: String,
    /// Backend kind; defaults per category when absent.
    pub kind: Option<String>,
    pub columns: Vec<Column>,
}

impl UnitDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            columns,
        }
    }

    /// Schemaless collection or key space.
    pub fn schemaless(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn view(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            kind: Some("VIEW".to_string()),
            columns,
        }
    }

    pub(crate) fn resolved_kind(&self, category: Category) -> String {
        if let Some(kind) = &self.kind {
            return kind.clone();
        }
        match category {
            Category::Sql => "BASE TABLE",
            Category::Document => "COLLECTION",
            Category::KeyValue => "KEYSPACE",
        }
        .to_string()
    }
}

/// Foreign key between two in-memory units, enforced with RESTRICT semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    pub name: String,
    pub from_unit: String,
    pub from_columns: Vec<String>,
    pub to_unit: String,
    pub to_columns: Vec<String>,
}

impl ForeignKeyDefinition {
    /// Single-column key named the way Postgres names it by default.
    pub fn new(
        from_unit: impl Into<String>,
        from_column: impl Into<String>,
        to_unit: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        let from_unit = from_unit.into();
        let from_column = from_column.into();
        Self {
            name: format!("{from_unit}_{from_column}_fkey"),
            from_unit,
            from_columns: vec![from_column],
            to_unit: to_unit.into(),
            to_columns: vec![to_column.into()],
        }
    }

    pub fn composite(
        name: impl Into<String>,
        from_unit: impl Into<String>,
        from_columns: &[&str],
        to_unit: impl Into<String>,
        to_columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            from_unit: from_unit.into(),
            from_columns: from_columns.iter().map(|c| c.to_string()).collect(),
            to_unit: to_unit.into(),
            to_columns: to_columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}
