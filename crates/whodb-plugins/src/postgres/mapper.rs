use std::sync::LazyLock;

use regex::Regex;

use whodb_core::{Cardinality, Category, Column, ForeignKeyEdge, StorageUnit};

use crate::options::PostgresOptions;

use super::queries::{RawColumn, RawForeignKey, RawUnit};

static QUOTED_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'((?:[^']|'')*)'").expect("valid literal regex"));

pub fn relkind_label(relkind: &str) -> &'static str {
    match relkind {
        "v" => "VIEW",
        "m" => "MATERIALIZED VIEW",
        "f" => "FOREIGN TABLE",
        "p" => "PARTITIONED TABLE",
        _ => "BASE TABLE",
    }
}

fn kind_enabled(relkind: &str, opts: &PostgresOptions) -> bool {
    match relkind {
        "v" => opts.include_views,
        "m" => opts.include_materialized_views,
        _ => true,
    }
}

pub fn map_units(raw: Vec<RawUnit>, opts: &PostgresOptions) -> Vec<StorageUnit> {
    raw.into_iter()
        .filter(|unit| kind_enabled(&unit.relkind, opts))
        .map(|unit| StorageUnit {
            name: unit.name,
            category: Category::Sql,
            kind: relkind_label(&unit.relkind).to_string(),
            row_count: unit.row_count.and_then(|count| u64::try_from(count).ok()),
            size: unit.size,
            columns: Vec::new(),
        })
        .collect()
}

pub fn map_columns(raw: Vec<RawColumn>) -> Vec<Column> {
    raw.into_iter()
        .map(|col| {
            let serial = col
                .default
                .as_deref()
                .is_some_and(|expr| expr.starts_with("nextval("));
            let mut column = Column::new(col.name, col.data_type);
            column.nullable = col.is_nullable;
            column.primary_key = col.is_primary;
            column.unique = col.is_unique;
            column.auto_generated = col.is_identity || serial;
            column.computed = col.is_generated;
            // Generated columns report their expression through pg_attrdef.
            column.default = if col.is_generated { None } else { col.default };
            column.allowed_values = match col.enum_labels {
                Some(labels) if !labels.is_empty() => labels,
                _ => col
                    .check_definitions
                    .as_deref()
                    .map(check_values)
                    .unwrap_or_default(),
            };
            column
        })
        .collect()
}

/// Literal values listed by `CHECK (col IN (...))` or `CHECK (col = ANY (ARRAY[...]))`.
pub fn check_values(definition: &str) -> Vec<String> {
    let upper = definition.to_uppercase();
    if !upper.contains(" IN (") && !upper.contains("= ANY (") {
        return Vec::new();
    }
    QUOTED_LITERAL_RE
        .captures_iter(definition)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().replace("''", "'")))
        .collect()
}

pub fn map_foreign_keys(unit: &str, raw: Vec<RawForeignKey>) -> Vec<ForeignKeyEdge> {
    raw.into_iter()
        .map(|fk| {
            let cardinality = if fk.is_unique {
                Cardinality::OneToOne
            } else {
                Cardinality::OneToMany
            };
            ForeignKeyEdge::new(unit, fk.column, fk.referenced_table, fk.referenced_column)
                .named(fk.name)
                .with_cardinality(cardinality)
        })
        .collect()
}
