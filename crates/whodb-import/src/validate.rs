use std::collections::BTreeSet;

use tracing::{debug, info};

use whodb_core::{Category, Column, Row, ValidationError, Value};
use whodb_engine::Facade;

use crate::errors::Result;
use crate::model::{
    ColumnMapping, DisabledReason, ImportLimits, ImportPreview, MappedColumn, SubmitState,
    TabularInput, codes,
};

/// Validate `input` against the columns of `unit`, matching headers to column names.
pub async fn validate_import(
    facade: &Facade,
    unit: &str,
    input: &TabularInput,
    limits: ImportLimits,
) -> Result<ImportPreview> {
    validate_mapped_import(facade, unit, input, &ColumnMapping::Headers, limits).await
}

/// Validate `input` against the columns of `unit` as reported by the backend.
pub async fn validate_mapped_import(
    facade: &Facade,
    unit: &str,
    input: &TabularInput,
    mapping: &ColumnMapping,
    limits: ImportLimits,
) -> Result<ImportPreview> {
    let columns = facade.columns(unit).await?;
    let preview = validate_mapped_records(unit, facade.category(), &columns, input, mapping, limits);
    info!(
        event = "import.validate",
        unit = %unit,
        rows = preview.rows_total,
        issues = preview.issues.len(),
        submit = ?preview.submit
    );
    Ok(preview)
}

pub fn validate_records(
    unit: &str,
    category: Category,
    columns: &[Column],
    input: &TabularInput,
    limits: ImportLimits,
) -> ImportPreview {
    validate_mapped_records(unit, category, columns, input, &ColumnMapping::Headers, limits)
}

/// Check headers, the column mapping, row shapes and cell values without
/// touching the backend.
///
/// Header and mapping problems stop validation before any row is looked at.
/// Schemaless document collections accept every target name and keep cells
/// as text.
pub fn validate_mapped_records(
    unit: &str,
    category: Category,
    columns: &[Column],
    input: &TabularInput,
    mapping: &ColumnMapping,
    limits: ImportLimits,
) -> ImportPreview {
    let headers: Vec<String> = input
        .headers()
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    let data = input.data();
    let mut preview = ImportPreview {
        unit: unit.to_string(),
        headers: headers.clone(),
        targets: Vec::new(),
        auto_generated_columns: Vec::new(),
        rows_total: data.len(),
        issues: Vec::new(),
        submit: SubmitState::Disabled(DisabledReason::Invalid),
        rows: Vec::new(),
        preview_rows: limits.preview_rows,
    };

    let schemaless = category == Category::Document && columns.is_empty();
    let resolved = check_headers(&headers).and_then(|()| match mapping {
        ColumnMapping::Headers => map_by_header(&headers, columns, schemaless),
        ColumnMapping::Positional => map_by_position(&headers, columns),
        ColumnMapping::Explicit {
            columns: entries,
            allow_auto_generated,
        } => map_explicitly(&headers, entries, columns, schemaless, *allow_auto_generated),
    });
    let targets = match resolved {
        Ok(targets) => targets,
        Err(issues) => {
            preview.issues = issues;
            return preview;
        }
    };
    preview.targets = headers
        .iter()
        .enumerate()
        .map(|(idx, _)| {
            targets
                .iter()
                .find(|target| target.source == idx)
                .map(|target| target.name.clone())
        })
        .collect();
    preview.auto_generated_columns = targets
        .iter()
        .filter_map(|target| target.column)
        .filter(|column| column.auto_generated)
        .map(|column| column.name.clone())
        .collect();

    if data.is_empty() {
        preview.submit = SubmitState::Disabled(DisabledReason::NothingToImport);
        return preview;
    }
    if data.len() > limits.max_rows {
        preview.issues.push(ValidationError::new(
            codes::ROW_LIMIT_EXCEEDED,
            format!(
                "input has {} rows; at most {} can be imported at once",
                data.len(),
                limits.max_rows
            ),
        ));
        return preview;
    }

    for (idx, record) in data.iter().enumerate() {
        let row_number = idx + 1;
        if record.len() != headers.len() {
            preview.issues.push(
                ValidationError::new(
                    codes::ROW_COLUMN_COUNT,
                    format!("expected {} values, found {}", headers.len(), record.len()),
                )
                .at_row(row_number),
            );
            continue;
        }
        match parse_record(&targets, record, row_number) {
            Ok(row) => preview.rows.push(row),
            Err(issues) => preview.issues.extend(issues),
        }
    }

    if preview.issues.is_empty() {
        preview.submit = SubmitState::Enabled;
    } else {
        preview.rows.clear();
    }
    debug!(
        event = "import.rows",
        unit = %unit,
        parsed = preview.rows.len(),
        issues = preview.issues.len()
    );
    preview
}

/// One source column and the row key it is written under.
struct Target<'a> {
    source: usize,
    name: String,
    /// `None` for fields of schemaless collections.
    column: Option<&'a Column>,
}

type Resolved<'a> = std::result::Result<Vec<Target<'a>>, Vec<ValidationError>>;

fn check_headers(headers: &[String]) -> std::result::Result<(), Vec<ValidationError>> {
    if headers.is_empty() {
        return Err(vec![ValidationError::new(
            codes::NO_COLUMNS,
            "input has no header row",
        )]);
    }

    let mut issues = Vec::new();
    let mut seen = BTreeSet::new();
    for (idx, header) in headers.iter().enumerate() {
        if header.is_empty() {
            issues.push(ValidationError::new(
                codes::EMPTY_HEADER,
                format!("header {} is empty", idx + 1),
            ));
        } else if !seen.insert(header.as_str()) {
            issues.push(
                ValidationError::new(
                    codes::DUPLICATE_HEADER,
                    format!("header '{header}' appears more than once"),
                )
                .at_column(header.clone()),
            );
        }
    }
    if issues.is_empty() { Ok(()) } else { Err(issues) }
}

/// Look up a writable target column, reporting unknown and generated ones.
fn writable<'a>(
    name: &str,
    columns: &'a [Column],
) -> std::result::Result<&'a Column, ValidationError> {
    match columns.iter().find(|column| column.name == name) {
        None => Err(ValidationError::new(
            codes::UNKNOWN_COLUMN,
            format!("'{name}' is not a column of the target"),
        )
        .at_column(name.to_string())),
        Some(column) if column.computed => Err(ValidationError::new(
            codes::GENERATED_COLUMN,
            format!("'{name}' is a generated column and cannot be written"),
        )
        .at_column(name.to_string())),
        Some(column) => Ok(column),
    }
}

fn map_by_header<'a>(headers: &[String], columns: &'a [Column], schemaless: bool) -> Resolved<'a> {
    let mut issues = Vec::new();
    let mut targets = Vec::with_capacity(headers.len());
    for (source, header) in headers.iter().enumerate() {
        if schemaless {
            targets.push(Target {
                source,
                name: header.clone(),
                column: None,
            });
            continue;
        }
        match writable(header, columns) {
            Ok(column) => targets.push(Target {
                source,
                name: column.name.clone(),
                column: Some(column),
            }),
            Err(issue) => issues.push(issue),
        }
    }
    if issues.is_empty() { Ok(targets) } else { Err(issues) }
}

fn map_by_position<'a>(headers: &[String], columns: &'a [Column]) -> Resolved<'a> {
    let insertable: Vec<&Column> = columns
        .iter()
        .filter(|column| !column.computed && !column.auto_generated)
        .collect();
    if headers.len() != insertable.len() {
        let mut auto: Vec<&str> = columns
            .iter()
            .filter(|column| !column.computed && column.auto_generated)
            .map(|column| column.name.as_str())
            .collect();
        auto.sort_unstable();
        let issue = if auto.is_empty() {
            ValidationError::new(
                codes::COLUMN_COUNT_MISMATCH,
                format!(
                    "input has {} columns but the target has {}",
                    headers.len(),
                    insertable.len()
                ),
            )
        } else {
            ValidationError::new(
                codes::COLUMN_COUNT_INSERTABLE,
                format!(
                    "input has {} columns but the target accepts {}; {} assigned by the database",
                    headers.len(),
                    insertable.len(),
                    auto.join(", ")
                ),
            )
        };
        return Err(vec![issue]);
    }
    Ok(insertable
        .into_iter()
        .enumerate()
        .map(|(source, column)| Target {
            source,
            name: column.name.clone(),
            column: Some(column),
        })
        .collect())
}

fn map_explicitly<'a>(
    headers: &[String],
    entries: &[MappedColumn],
    columns: &'a [Column],
    schemaless: bool,
    allow_auto_generated: bool,
) -> Resolved<'a> {
    let invalid = |message: String| vec![ValidationError::new(codes::MAPPING_INVALID, message)];
    if entries.len() != headers.len() {
        return Err(invalid(format!(
            "mapping lists {} columns but the input has {}",
            entries.len(),
            headers.len()
        )));
    }

    let mut sources = BTreeSet::new();
    let mut names = BTreeSet::new();
    let mut issues = Vec::new();
    let mut targets = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(source) = headers.iter().position(|header| *header == entry.source) else {
            return Err(invalid(format!("'{}' is not a column of the input", entry.source)));
        };
        if !sources.insert(source) {
            return Err(invalid(format!("'{}' is mapped more than once", entry.source)));
        }
        let Some(name) = entry.target.as_deref().map(str::trim) else {
            continue;
        };
        if name.is_empty() {
            return Err(invalid(format!("'{}' has an empty target", entry.source)));
        }
        if !names.insert(name) {
            return Err(invalid(format!("'{name}' is the target of more than one column")));
        }
        if schemaless {
            targets.push(Target {
                source,
                name: name.to_string(),
                column: None,
            });
            continue;
        }
        match writable(name, columns) {
            Ok(column) if column.auto_generated && !allow_auto_generated => issues.push(
                ValidationError::new(
                    codes::AUTO_GENERATED_TOGGLE,
                    format!("'{name}' is assigned by the database; allow supplied values to import it"),
                )
                .at_column(name.to_string()),
            ),
            Ok(column) => targets.push(Target {
                source,
                name: column.name.clone(),
                column: Some(column),
            }),
            Err(issue) => issues.push(issue),
        }
    }
    if !issues.is_empty() {
        return Err(issues);
    }
    if targets.is_empty() {
        return Err(invalid("every column is skipped".to_string()));
    }
    targets.sort_by_key(|target| target.source);
    Ok(targets)
}

/// Convert one record; empty cells become NULL.
fn parse_record(
    targets: &[Target<'_>],
    record: &[String],
    row_number: usize,
) -> std::result::Result<Row, Vec<ValidationError>> {
    let mut row = Row::new();
    let mut issues = Vec::new();
    for target in targets {
        let name = &target.name;
        let cell = &record[target.source];
        let Some(column) = target.column else {
            row.set(name.clone(), Value::Text(cell.clone()));
            continue;
        };
        if cell.is_empty() {
            if !column.nullable && !column.auto_generated && column.default.is_none() {
                issues.push(
                    ValidationError::new(
                        codes::NULL_VALUE,
                        format!("'{name}' does not accept empty values"),
                    )
                    .at_row(row_number)
                    .at_column(name.clone()),
                );
            }
            row.set(name.clone(), Value::Null);
            continue;
        }
        if !column.allowed_values.is_empty() && !column.allowed_values.contains(cell) {
            issues.push(
                ValidationError::new(
                    codes::INVALID_VALUE,
                    format!(
                        "'{cell}' is not one of {}",
                        column.allowed_values.join(", ")
                    ),
                )
                .at_row(row_number)
                .at_column(name.clone()),
            );
            continue;
        }
        match Value::parse_text(&column.canonical, cell) {
            Ok(value) => row.set(name.clone(), value),
            Err(err) => issues.push(
                ValidationError::new(codes::INVALID_VALUE, err.to_string())
                    .at_row(row_number)
                    .at_column(name.clone()),
            ),
        }
    }
    if issues.is_empty() { Ok(row) } else { Err(issues) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", "serial").primary().auto(),
            Column::new("name", "varchar(8)").not_null(),
            Column::new("age", "integer"),
            Column::new("slug", "text").computed(),
        ]
    }

    fn input(lines: &[&[&str]]) -> TabularInput {
        TabularInput::new(
            lines
                .iter()
                .map(|line| line.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    fn validate(lines: &[&[&str]]) -> ImportPreview {
        validate_records(
            "people",
            Category::Sql,
            &columns(),
            &input(lines),
            ImportLimits::default(),
        )
    }

    fn codes_of(preview: &ImportPreview) -> Vec<&str> {
        preview.issues.iter().map(|issue| issue.code.as_str()).collect()
    }

    #[test]
    fn duplicate_header_disables_submit() {
        let preview = validate(&[&["name", "name"], &["a", "b"]]);
        assert_eq!(codes_of(&preview), vec![codes::DUPLICATE_HEADER]);
        assert_eq!(preview.submit, SubmitState::Disabled(DisabledReason::Invalid));
    }

    #[test]
    fn header_only_input_has_nothing_to_import() {
        let preview = validate(&[&["name", "age"]]);
        assert!(preview.issues.is_empty());
        assert_eq!(
            preview.submit,
            SubmitState::Disabled(DisabledReason::NothingToImport)
        );
    }

    #[test]
    fn empty_and_missing_headers_are_reported() {
        let preview = validate(&[&["name", " "], &["a", "b"]]);
        assert_eq!(codes_of(&preview), vec![codes::EMPTY_HEADER]);
        let preview = validate(&[]);
        assert_eq!(codes_of(&preview), vec![codes::NO_COLUMNS]);
    }

    #[test]
    fn unknown_and_generated_columns_are_rejected() {
        let preview = validate(&[&["name", "nickname", "slug"], &["a", "b", "c"]]);
        assert_eq!(
            codes_of(&preview),
            vec![codes::UNKNOWN_COLUMN, codes::GENERATED_COLUMN]
        );
    }

    #[test]
    fn ragged_rows_carry_their_row_number() {
        let preview = validate(&[&["name", "age"], &["a", "1"], &["b"]]);
        assert_eq!(preview.issues.len(), 1);
        assert_eq!(preview.issues[0].code, codes::ROW_COLUMN_COUNT);
        assert_eq!(preview.issues[0].row, Some(2));
    }

    #[test]
    fn cells_are_checked_against_column_types() {
        let preview = validate(&[
            &["name", "age"],
            &["Ada", "36"],
            &["Grace", "old"],
            &["Bartholomew", "50"],
            &["", "1"],
        ]);
        assert_eq!(
            codes_of(&preview),
            vec![codes::INVALID_VALUE, codes::INVALID_VALUE, codes::NULL_VALUE]
        );
        assert_eq!(preview.issues[0].column.as_deref(), Some("age"));
        assert_eq!(preview.issues[1].row, Some(3));
        assert!(preview.preview().is_empty());
    }

    #[test]
    fn auto_generated_columns_are_listed() {
        let preview = validate(&[&["id", "name"], &["7", "Ada"]]);
        assert!(preview.is_valid());
        assert_eq!(preview.auto_generated_columns, vec!["id"]);
        assert_eq!(preview.submit, SubmitState::Enabled);
        assert_eq!(preview.preview()[0].get("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn row_cap_is_enforced() {
        let preview = validate_records(
            "people",
            Category::Sql,
            &columns(),
            &input(&[&["name"], &["a"], &["b"], &["c"]]),
            ImportLimits {
                max_rows: 2,
                preview_rows: 1,
            },
        );
        assert_eq!(codes_of(&preview), vec![codes::ROW_LIMIT_EXCEEDED]);
    }

    #[test]
    fn preview_is_truncated() {
        let preview = validate_records(
            "people",
            Category::Sql,
            &columns(),
            &input(&[&["name"], &["a"], &["b"], &["c"]]),
            ImportLimits {
                max_rows: 10,
                preview_rows: 2,
            },
        );
        assert_eq!(preview.rows_total, 3);
        assert_eq!(preview.preview().len(), 2);
    }

    fn validate_mapped(lines: &[&[&str]], mapping: ColumnMapping) -> ImportPreview {
        validate_mapped_records(
            "people",
            Category::Sql,
            &columns(),
            &input(lines),
            &mapping,
            ImportLimits::default(),
        )
    }

    #[test]
    fn explicit_mapping_renames_and_skips() {
        let preview = validate_mapped(
            &[&["Full Name", "Notes", "Years"], &["Ada", "first", "36"]],
            ColumnMapping::explicit(vec![
                MappedColumn::to("Years", "age"),
                MappedColumn::to("Full Name", "name"),
                MappedColumn::skip("Notes"),
            ]),
        );
        assert!(preview.is_valid(), "{:?}", preview.issues);
        assert_eq!(
            preview.targets,
            vec![Some("name".to_string()), None, Some("age".to_string())]
        );
        let row = &preview.preview()[0];
        assert_eq!(row.get("name"), Some(&Value::Text("Ada".to_string())));
        assert_eq!(row.get("age"), Some(&Value::Int(36)));
        assert_eq!(row.get("Notes"), None);
    }

    #[test]
    fn malformed_explicit_mappings_are_invalid() {
        let lines: &[&[&str]] = &[&["a", "b"], &["Ada", "1"]];
        let cases = [
            vec![MappedColumn::to("a", "name")],
            vec![MappedColumn::to("a", "name"), MappedColumn::to("a", "age")],
            vec![MappedColumn::to("a", "name"), MappedColumn::to("c", "age")],
            vec![MappedColumn::to("a", "name"), MappedColumn::to("b", "name")],
            vec![MappedColumn::to("a", "name"), MappedColumn::to("b", " ")],
            vec![MappedColumn::skip("a"), MappedColumn::skip("b")],
        ];
        for entries in cases {
            let preview = validate_mapped(lines, ColumnMapping::explicit(entries.clone()));
            assert_eq!(codes_of(&preview), vec![codes::MAPPING_INVALID], "{entries:?}");
        }
    }

    #[test]
    fn explicit_targets_are_checked_against_columns() {
        let lines: &[&[&str]] = &[&["a", "b"], &["x", "y"]];
        let preview = validate_mapped(
            lines,
            ColumnMapping::explicit(vec![
                MappedColumn::to("a", "nickname"),
                MappedColumn::to("b", "slug"),
            ]),
        );
        assert_eq!(
            codes_of(&preview),
            vec![codes::UNKNOWN_COLUMN, codes::GENERATED_COLUMN]
        );
    }

    #[test]
    fn mapping_onto_serial_columns_needs_the_toggle() {
        let lines: &[&[&str]] = &[&["key", "who"], &["7", "Ada"]];
        let entries = vec![MappedColumn::to("key", "id"), MappedColumn::to("who", "name")];

        let preview = validate_mapped(lines, ColumnMapping::explicit(entries.clone()));
        assert_eq!(codes_of(&preview), vec![codes::AUTO_GENERATED_TOGGLE]);

        let preview = validate_mapped(
            lines,
            ColumnMapping::explicit(entries).allowing_auto_generated(),
        );
        assert!(preview.is_valid());
        assert_eq!(preview.auto_generated_columns, vec!["id"]);
        assert_eq!(preview.preview()[0].get("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn positional_mapping_fills_insertable_columns_in_order() {
        let preview = validate_mapped(&[&["c1", "c2"], &["Ada", "36"]], ColumnMapping::Positional);
        assert!(preview.is_valid());
        assert_eq!(
            preview.targets,
            vec![Some("name".to_string()), Some("age".to_string())]
        );
        assert_eq!(preview.preview()[0].get("age"), Some(&Value::Int(36)));
    }

    #[test]
    fn positional_count_mismatch_names_serial_columns() {
        let preview = validate_mapped(
            &[&["c1", "c2", "c3"], &["7", "Ada", "36"]],
            ColumnMapping::Positional,
        );
        assert_eq!(codes_of(&preview), vec![codes::COLUMN_COUNT_INSERTABLE]);
        assert!(preview.issues[0].message.contains("id"));

        let plain = vec![Column::new("name", "text"), Column::new("age", "integer")];
        let preview = validate_mapped_records(
            "people",
            Category::Sql,
            &plain,
            &input(&[&["c1"], &["Ada"]]),
            &ColumnMapping::Positional,
            ImportLimits::default(),
        );
        assert_eq!(codes_of(&preview), vec![codes::COLUMN_COUNT_MISMATCH]);
    }

    #[test]
    fn schemaless_collections_accept_any_header() {
        let preview = validate_records(
            "events",
            Category::Document,
            &[],
            &input(&[&["kind", "payload"], &["click", "{}"]]),
            ImportLimits::default(),
        );
        assert!(preview.is_valid());
        assert_eq!(
            preview.preview()[0].get("kind"),
            Some(&Value::Text("click".to_string()))
        );
    }
}
