use serde::{Deserialize, Serialize};

use crate::types::{CanonicalType, Category};
use crate::value::Value;

/// Identifier of the field that carries document identity.
pub const DOCUMENT_ID_FIELD: &str = "_id";
/// Identifier of the field that carries key-value identity.
pub const KEY_FIELD: &str = "key";

/// Table, collection or key namespace as discovered on a schema refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUnit {
    pub name: String,
    pub category: Category,
    /// Backend kind such as `BASE TABLE`, `VIEW` or `COLLECTION`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl StorageUnit {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|column| column.primary_key).collect()
    }

    pub fn is_view(&self) -> bool {
        self.kind.eq_ignore_ascii_case("VIEW") || self.kind.eq_ignore_ascii_case("MATERIALIZED VIEW")
    }
}

/// Column descriptor owned by one storage unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Type as reported by the backend, e.g. `character varying(40)`.
    pub native_type: String,
    pub canonical: CanonicalType,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Serial, identity or otherwise backend-assigned on insert.
    #[serde(default)]
    pub auto_generated: bool,
    #[serde(default)]
    pub unique: bool,
    /// Generated column; never written.
    #[serde(default)]
    pub computed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl Column {
    /// Column with the canonical type derived from `native_type`.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        let native_type = native_type.into();
        Self {
            name: name.into(),
            canonical: CanonicalType::from_native(&native_type),
            native_type,
            nullable: true,
            primary_key: false,
            auto_generated: false,
            unique: false,
            computed: false,
            default: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn auto(mut self) -> Self {
        self.auto_generated = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// True when the backend fills the column and callers should not write it.
    pub fn is_backend_assigned(&self) -> bool {
        self.auto_generated || self.computed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// Directed reference `(from_unit, from_column) -> (to_unit, to_column)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub from_unit: String,
    pub from_column: String,
    pub to_unit: String,
    pub to_column: String,
    /// Edges sharing a constraint name form one composite key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    pub cardinality: Cardinality,
}

impl ForeignKeyEdge {
    pub fn new(
        from_unit: impl Into<String>,
        from_column: impl Into<String>,
        to_unit: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_unit: from_unit.into(),
            from_column: from_column.into(),
            to_unit: to_unit.into(),
            to_column: to_column.into(),
            constraint: None,
            cardinality: Cardinality::OneToMany,
        }
    }

    pub fn named(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Grouping key for composite constraints; unnamed edges stand alone.
    pub fn group_key(&self) -> String {
        match &self.constraint {
            Some(name) => format!("{}:{}", self.from_unit, name),
            None => format!("{}:{}->{}", self.from_unit, self.from_column, self.to_unit),
        }
    }
}

/// Ordered `(column, value)` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Replace an existing cell or append a new one.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.cells.iter().position(|(name, _)| name == column)?;
        Some(self.cells.remove(idx).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

/// Cells that identify one row: primary key columns, `_id` or `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIdentity {
    pub cells: Vec<(String, Value)>,
}

impl RowIdentity {
    pub fn single(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            cells: vec![(column.into(), value.into())],
        }
    }

    /// Extract the identity of `row` for `unit`.
    ///
    /// Returns `None` when the unit has no identifying columns or the row
    /// lacks one of them.
    pub fn from_row(unit: &StorageUnit, row: &Row) -> Option<Self> {
        let names: Vec<&str> = match unit.category {
            Category::Document => vec![DOCUMENT_ID_FIELD],
            Category::KeyValue => vec![KEY_FIELD],
            Category::Sql => unit.primary_key().iter().map(|c| c.name.as_str()).collect(),
        };
        if names.is_empty() {
            return None;
        }
        let mut cells = Vec::with_capacity(names.len());
        for name in names {
            cells.push((name.to_string(), row.get(name)?.clone()));
        }
        Some(Self { cells })
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.cells.iter().all(|(column, value)| {
            row.get(column)
                .is_some_and(|cell| cell.key() == value.key())
        })
    }
}

/// Result page of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Views and key-value listings cannot be edited in place.
    #[serde(default)]
    pub disable_update: bool,
}

/// Shared by the mock data generator and the importer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    Overwrite,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Append => f.write_str("append"),
            WriteMode::Overwrite => f.write_str("overwrite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_set_replaces_existing_cell() {
        let mut row = Row::new().with("id", 1).with("name", "a");
        row.set("name", Value::from("b"));
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("name"), Some(&Value::from("b")));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn identity_uses_primary_key_columns() {
        let unit = StorageUnit {
            name: "order_items".to_string(),
            category: Category::Sql,
            kind: "BASE TABLE".to_string(),
            row_count: None,
            size: None,
            columns: vec![
                Column::new("order_id", "integer").primary(),
                Column::new("line", "integer").primary(),
                Column::new("sku", "text"),
            ],
        };
        let row = Row::new().with("order_id", 4).with("line", 2).with("sku", "x");
        let identity = RowIdentity::from_row(&unit, &row).unwrap();
        assert_eq!(identity.cells.len(), 2);
        assert!(identity.matches(&row));
        assert!(!identity.matches(&Row::new().with("order_id", 4).with("line", 3)));
    }

    #[test]
    fn document_identity_uses_id_field() {
        let unit = StorageUnit {
            name: "events".to_string(),
            category: Category::Document,
            kind: "COLLECTION".to_string(),
            row_count: None,
            size: None,
            columns: Vec::new(),
        };
        let row = Row::new().with("_id", "abc").with("kind", "click");
        let identity = RowIdentity::from_row(&unit, &row).unwrap();
        assert_eq!(identity, RowIdentity::single("_id", "abc"));
    }
}
