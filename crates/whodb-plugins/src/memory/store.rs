use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use whodb_core::schema::{DOCUMENT_ID_FIELD, KEY_FIELD};
use whodb_core::{
    CanonicalType, Category, Column, Condition, Error, Operator, Page, Result, Row, RowIdentity,
    Sort, SortDirection, Value,
};

use crate::document;

use super::definition::{ForeignKeyDefinition, UnitDefinition};

#[derive(Debug)]
pub(crate) struct UnitState {
    pub definition: UnitDefinition,
    pub category: Category,
    pub kind: String,
    pub rows: Vec<Row>,
    /// Next value per auto-increment column; never reused after deletes.
    sequences: BTreeMap<String, i64>,
}

impl UnitState {
    pub fn new(definition: UnitDefinition, category: Category) -> Self {
        let mut definition = definition;
        if category == Category::KeyValue && definition.columns.is_empty() {
            definition.columns = vec![
                Column::new(KEY_FIELD, "text").primary(),
                Column::new("value", "text"),
            ];
        }
        let kind = definition.resolved_kind(category);
        Self {
            definition,
            category,
            kind,
            rows: Vec::new(),
            sequences: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.definition.columns
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.definition.columns.iter().find(|c| c.name == name)
    }

    pub fn is_view(&self) -> bool {
        self.kind.contains("VIEW")
    }

    fn identity_columns(&self) -> Vec<String> {
        match self.category {
            Category::Document => vec![DOCUMENT_ID_FIELD.to_string()],
            Category::KeyValue => vec![KEY_FIELD.to_string()],
            Category::Sql => self
                .definition
                .columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect(),
        }
    }

    fn position(&self, identity: &RowIdentity) -> Result<usize> {
        self.rows
            .iter()
            .position(|row| identity.matches(row))
            .ok_or_else(|| Error::NotFound(format!("row in storage unit '{}'", self.name())))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    pub units: Vec<UnitState>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    /// Units cleared so far, in call order.
    pub clear_log: Vec<String>,
}

fn tuple_key(row: &Row, columns: &[String]) -> Option<String> {
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        match row.get(column) {
            None | Some(Value::Null) => return None,
            Some(value) => parts.push(value.key()),
        }
    }
    Some(parts.join("\u{1f}"))
}

fn coerce(unit: &str, column: &Column, value: Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let (CanonicalType::Json, Value::Json(_)) = (&column.canonical, &value) {
        return Ok(value);
    }
    let text = value.to_text().unwrap_or_default();
    Value::parse_text(&column.canonical, &text).map_err(|err| {
        let detail = match &column.canonical {
            CanonicalType::Text {
                max_len: Some(max_len),
            } => format!("value too long for type character varying({max_len})"),
            _ => err.to_string(),
        };
        Error::constraint(unit, detail)
    })
}

fn default_value(column: &Column) -> Value {
    let Some(expr) = column.default.as_deref() else {
        return Value::Null;
    };
    let lowered = expr.trim().to_ascii_lowercase();
    if matches!(lowered.as_str(), "now()" | "current_timestamp" | "current_date") {
        let now = Utc::now().naive_utc();
        return match column.canonical {
            CanonicalType::Date => Value::Date(now.date()),
            _ => Value::Timestamp(now),
        };
    }
    let literal = expr.split("::").next().unwrap_or(expr).trim().trim_matches('\'');
    Value::parse_text(&column.canonical, literal).unwrap_or(Value::Null)
}

fn evaluate(unit: &str, columns: &[Column], row: &Row, condition: &Condition) -> Result<bool> {
    let column = columns
        .iter()
        .find(|c| c.name == condition.key)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "column '{}' of storage unit '{unit}'",
                condition.key
            ))
        })?;
    let actual = row.get(&column.name).cloned().unwrap_or(Value::Null);

    if condition.operator == Operator::Match {
        let pattern = condition.value.to_text().unwrap_or_default();
        let regex = Regex::new(&pattern)
            .map_err(|err| Error::Unsupported(format!("invalid match pattern: {err}")))?;
        return Ok(actual.to_text().is_some_and(|text| regex.is_match(&text)));
    }

    let expected = coerce(unit, column, condition.value.clone())?;
    if expected.is_null() {
        return match condition.operator {
            Operator::Eq => Ok(actual.is_null()),
            Operator::Ne => Ok(!actual.is_null()),
            _ => Ok(false),
        };
    }
    let ordering = actual.compare(&expected);
    Ok(match condition.operator {
        Operator::Eq => ordering == Some(Ordering::Equal),
        Operator::Ne => ordering.is_some_and(|o| o != Ordering::Equal),
        Operator::Gt => ordering == Some(Ordering::Greater),
        Operator::Lt => ordering == Some(Ordering::Less),
        Operator::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        Operator::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        Operator::Match => false,
    })
}

fn sort_rows(rows: &mut [Row], sort: &[Sort]) {
    rows.sort_by(|left, right| {
        for entry in sort {
            let a = left.get(&entry.key).unwrap_or(&Value::Null);
            let b = right.get(&entry.key).unwrap_or(&Value::Null);
            // Nulls sort last in both directions.
            let ordering = match (a.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
            };
            let ordering = match entry.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

impl MemoryState {
    pub fn index_of(&self, unit: &str) -> Result<usize> {
        self.units
            .iter()
            .position(|state| state.name() == unit)
            .ok_or_else(|| Error::NotFound(format!("storage unit '{unit}'")))
    }

    pub fn unit(&self, unit: &str) -> Result<&UnitState> {
        Ok(&self.units[self.index_of(unit)?])
    }

    pub fn select(
        &self,
        unit: &str,
        conditions: &[Condition],
        sort: &[Sort],
        page: Option<Page>,
    ) -> Result<(Vec<String>, Vec<Row>)> {
        let state = self.unit(unit)?;
        if state.category == Category::KeyValue {
            if !sort.is_empty() {
                return Err(Error::Unsupported(format!(
                    "sorting items of key-value unit '{unit}'"
                )));
            }
            if let Some(condition) = conditions
                .iter()
                .find(|c| c.operator != Operator::Eq || c.key != KEY_FIELD)
            {
                return Err(Error::Unsupported(format!(
                    "key-value unit '{unit}' filters by key equality only, got '{} {}'",
                    condition.key, condition.operator
                )));
            }
        }

        let mut rows = Vec::new();
        if state.category == Category::Document {
            let filter = document::to_filter(conditions);
            for row in &state.rows {
                if document::matches(&filter, &document::row_to_document(row))? {
                    rows.push(row.clone());
                }
            }
        } else {
            for row in &state.rows {
                let mut keep = true;
                for condition in conditions {
                    if !evaluate(unit, state.columns(), row, condition)? {
                        keep = false;
                        break;
                    }
                }
                if keep {
                    rows.push(row.clone());
                }
            }
        }

        if !sort.is_empty() {
            if state.category == Category::Sql
                && let Some(entry) = sort.iter().find(|s| state.column(&s.key).is_none())
            {
                return Err(Error::NotFound(format!(
                    "column '{}' of storage unit '{unit}'",
                    entry.key
                )));
            }
            sort_rows(&mut rows, sort);
        }

        if let Some(page) = page {
            let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
            let size = usize::try_from(page.size).unwrap_or(usize::MAX);
            rows = rows.into_iter().skip(offset).take(size).collect();
        }

        let mut columns: Vec<String> = state.columns().iter().map(|c| c.name.clone()).collect();
        if state.category == Category::Document {
            for row in &rows {
                for name in row.columns() {
                    if !columns.iter().any(|c| c == name) {
                        columns.push(name.to_string());
                    }
                }
            }
        }
        Ok((columns, rows))
    }

    /// Validate and store a new row; returns the stored row.
    pub fn insert(&mut self, unit: &str, cells: Row) -> Result<Row> {
        let idx = self.index_of(unit)?;
        let state = &self.units[idx];
        if state.is_view() {
            return Err(Error::Unsupported(format!("cannot insert into view '{unit}'")));
        }

        let mut assigned: Vec<(String, i64)> = Vec::new();
        let row = match state.category {
            Category::Sql | Category::KeyValue => {
                for (name, value) in &cells.cells {
                    let column = state.column(name).ok_or_else(|| {
                        Error::NotFound(format!(
                            "column \"{name}\" of relation \"{unit}\" does not exist"
                        ))
                    })?;
                    if column.computed && !value.is_null() {
                        return Err(Error::constraint(
                            unit,
                            format!("cannot insert a non-DEFAULT value into column \"{name}\""),
                        ));
                    }
                }

                let mut row = Row::new();
                for column in state.columns() {
                    let value = match cells.get(&column.name) {
                        Some(value) if !column.computed => {
                            coerce(unit, column, value.clone())?
                        }
                        _ if column.computed => Value::Null,
                        _ if column.auto_generated => match column.canonical {
                            CanonicalType::Integer { .. } => {
                                let next = self.next_sequence(idx, &column.name);
                                assigned.push((column.name.clone(), next));
                                Value::Int(next)
                            }
                            CanonicalType::Uuid => Value::Uuid(Uuid::new_v4()),
                            _ => default_value(column),
                        },
                        _ => default_value(column),
                    };
                    row.cells.push((column.name.clone(), value));
                }
                row
            }
            Category::Document => {
                let mut row = Row::new();
                let id = cells
                    .get(DOCUMENT_ID_FIELD)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .unwrap_or_else(|| Value::Text(Uuid::new_v4().simple().to_string()));
                row.cells.push((DOCUMENT_ID_FIELD.to_string(), id));
                for (name, value) in cells.cells {
                    if name == DOCUMENT_ID_FIELD {
                        continue;
                    }
                    let value = match state.column(&name) {
                        Some(column) => coerce(unit, column, value)?,
                        None => value,
                    };
                    row.cells.push((name, value));
                }
                for column in state.columns() {
                    if row.get(&column.name).is_none() {
                        row.cells.push((column.name.clone(), default_value(column)));
                    }
                }
                row
            }
        };

        self.validate(idx, &row, None)?;

        let state = &mut self.units[idx];
        for (column, value) in assigned {
            let entry = state.sequences.entry(column).or_insert(1);
            *entry = (*entry).max(value + 1);
        }
        state.rows.push(row.clone());
        Ok(row)
    }

    /// Store every row or none; sequences keep advancing on failure.
    pub fn insert_all(&mut self, unit: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let idx = self.index_of(unit)?;
        let before = self.units[idx].rows.len();
        let mut written = Vec::with_capacity(rows.len());
        for cells in rows {
            match self.insert(unit, cells) {
                Ok(row) => written.push(row),
                Err(err) => {
                    self.units[idx].rows.truncate(before);
                    return Err(err);
                }
            }
        }
        Ok(written)
    }

    fn next_sequence(&self, idx: usize, column: &str) -> i64 {
        let state = &self.units[idx];
        let current_max = state
            .rows
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        let counter = state.sequences.get(column).copied().unwrap_or(1);
        counter.max(current_max + 1)
    }

    pub fn update(&mut self, unit: &str, identity: &RowIdentity, cells: Row) -> Result<Row> {
        let idx = self.index_of(unit)?;
        let state = &self.units[idx];
        if state.is_view() {
            return Err(Error::Unsupported(format!("cannot update view '{unit}'")));
        }
        let position = state.position(identity)?;
        let old = state.rows[position].clone();
        let mut row = old.clone();
        for (name, value) in cells.cells {
            let value = match state.column(&name) {
                Some(column) if column.computed => {
                    return Err(Error::constraint(
                        unit,
                        format!("column \"{name}\" can only be updated to DEFAULT"),
                    ));
                }
                Some(column) => coerce(unit, column, value)?,
                None if state.category == Category::Document => value,
                None => {
                    return Err(Error::NotFound(format!(
                        "column \"{name}\" of relation \"{unit}\" does not exist"
                    )));
                }
            };
            row.set(name, value);
        }

        self.validate(idx, &row, Some(position))?;
        self.restrict_referenced_change(idx, &old, Some(&row))?;
        self.units[idx].rows[position] = row.clone();
        Ok(row)
    }

    pub fn delete(&mut self, unit: &str, identity: &RowIdentity) -> Result<()> {
        let idx = self.index_of(unit)?;
        if self.units[idx].is_view() {
            return Err(Error::Unsupported(format!("cannot delete from view '{unit}'")));
        }
        let position = self.units[idx].position(identity)?;
        let old = self.units[idx].rows[position].clone();
        self.restrict_referenced_change(idx, &old, None)?;
        self.units[idx].rows.remove(position);
        Ok(())
    }

    pub fn clear(&mut self, unit: &str) -> Result<u64> {
        let idx = self.index_of(unit)?;
        if self.units[idx].is_view() {
            return Err(Error::Unsupported(format!("cannot delete from view '{unit}'")));
        }
        for fk in self.foreign_keys.iter().filter(|fk| fk.to_unit == unit) {
            if fk.from_unit == unit {
                continue;
            }
            let parents: BTreeSet<String> = self.units[idx]
                .rows
                .iter()
                .filter_map(|row| tuple_key(row, &fk.to_columns))
                .collect();
            let child = self.unit(&fk.from_unit)?;
            let referenced = child
                .rows
                .iter()
                .filter_map(|row| tuple_key(row, &fk.from_columns))
                .any(|key| parents.contains(&key));
            if referenced {
                return Err(restrict_error(unit, fk));
            }
        }

        let removed = self.units[idx].rows.len() as u64;
        self.units[idx].rows.clear();
        self.clear_log.push(unit.to_string());
        Ok(removed)
    }

    /// NOT NULL, uniqueness and outgoing foreign keys for `row`.
    fn validate(&self, idx: usize, row: &Row, exclude: Option<usize>) -> Result<()> {
        let state = &self.units[idx];
        let unit = state.name();

        for column in state.columns() {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            if value.is_null() && !column.nullable && !column.computed {
                return Err(Error::constraint(
                    unit,
                    format!(
                        "null value in column \"{}\" of relation \"{unit}\" violates not-null constraint",
                        column.name
                    ),
                ));
            }
        }

        let others = || {
            state
                .rows
                .iter()
                .enumerate()
                .filter(move |(pos, _)| Some(*pos) != exclude)
                .map(|(_, other)| other)
        };

        let identity = state.identity_columns();
        if !identity.is_empty() {
            let key = tuple_key(row, &identity);
            if state.category == Category::KeyValue && key.is_none() {
                return Err(Error::constraint(
                    unit,
                    format!("null value in column \"{KEY_FIELD}\" of relation \"{unit}\" violates not-null constraint"),
                ));
            }
            if let Some(key) = key
                && others().any(|other| tuple_key(other, &identity).as_ref() == Some(&key))
            {
                let detail = match state.category {
                    Category::Document => format!(
                        "E11000 duplicate key error collection: {unit} index: _id_ dup key: {{ _id: {key} }}"
                    ),
                    _ => format!(
                        "duplicate key value violates unique constraint \"{unit}_pkey\""
                    ),
                };
                return Err(Error::constraint(unit, detail));
            }
        }

        for column in state.columns().iter().filter(|c| c.unique && !c.primary_key) {
            let columns = [column.name.clone()];
            if let Some(key) = tuple_key(row, &columns)
                && others().any(|other| tuple_key(other, &columns).as_ref() == Some(&key))
            {
                return Err(Error::constraint(
                    unit,
                    format!(
                        "duplicate key value violates unique constraint \"{unit}_{}_key\"",
                        column.name
                    ),
                ));
            }
        }

        for fk in self.foreign_keys.iter().filter(|fk| fk.from_unit == unit) {
            let Some(wanted) = tuple_key(row, &fk.from_columns) else {
                continue;
            };
            if fk.to_unit == unit && tuple_key(row, &fk.to_columns).as_ref() == Some(&wanted) {
                continue;
            }
            let parent = self.unit(&fk.to_unit)?;
            let found = parent
                .rows
                .iter()
                .any(|candidate| tuple_key(candidate, &fk.to_columns).as_ref() == Some(&wanted));
            if !found {
                return Err(Error::constraint(
                    unit,
                    format!(
                        "insert or update on table \"{unit}\" violates foreign key constraint \"{}\"",
                        fk.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Reject removing or re-keying a row that other rows still reference.
    fn restrict_referenced_change(&self, idx: usize, old: &Row, new: Option<&Row>) -> Result<()> {
        let unit = self.units[idx].name();
        for fk in self.foreign_keys.iter().filter(|fk| fk.to_unit == unit) {
            let Some(old_key) = tuple_key(old, &fk.to_columns) else {
                continue;
            };
            if let Some(new) = new
                && tuple_key(new, &fk.to_columns).as_ref() == Some(&old_key)
            {
                continue;
            }
            let child = self.unit(&fk.from_unit)?;
            let referenced = child.rows.iter().any(|row| {
                // A self-referencing row does not block its own removal.
                let is_same = fk.from_unit == unit && tuple_key(row, &fk.to_columns) == Some(old_key.clone());
                !is_same && tuple_key(row, &fk.from_columns).as_ref() == Some(&old_key)
            });
            if referenced {
                return Err(restrict_error(unit, fk));
            }
        }
        Ok(())
    }
}

fn restrict_error(unit: &str, fk: &ForeignKeyDefinition) -> Error {
    Error::constraint(
        unit,
        format!(
            "update or delete on table \"{unit}\" violates foreign key constraint \"{}\" on table \"{}\"",
            fk.name, fk.from_unit
        ),
    )
}
