use whodb_core::{Category, Column, Condition, Operator, Sort, Value};

use crate::CliError;

/// Parse `KEY OP VALUE` (e.g. `status = paid`); the value is typed from the column.
///
/// `match` keeps the value as text. Keys without a known column stay text too,
/// which covers schemaless collections.
pub fn parse_filter(raw: &str, category: Category, columns: &[Column]) -> Result<Condition, CliError> {
    let mut parts = raw.trim().splitn(3, char::is_whitespace);
    let key = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    let value = parts.next().map(str::trim).unwrap_or_default();
    if key.is_empty() || token.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "filter '{raw}' must look like 'KEY OP VALUE'"
        )));
    }

    let operator = Operator::parse_token(token, category)?;
    let column = columns.iter().find(|column| column.name == key);
    let value = match column {
        Some(column) if operator != Operator::Match => Value::parse_text(&column.canonical, value)
            .map_err(|err| CliError::InvalidArgument(format!("filter on '{key}': {err}")))?,
        _ => Value::Text(value.to_string()),
    };
    Ok(Condition::new(key, operator, value))
}

/// `name` sorts ascending, `name:desc` descending.
pub fn parse_sort(raw: &str) -> Result<Sort, CliError> {
    match raw.rsplit_once(':') {
        None => Ok(Sort::asc(raw)),
        Some((key, direction)) => match direction.to_ascii_lowercase().as_str() {
            "asc" => Ok(Sort::asc(key)),
            "desc" => Ok(Sort::desc(key)),
            other => Err(CliError::InvalidArgument(format!(
                "unknown sort direction '{other}' for '{key}'"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whodb_core::{ErrorKind, SortDirection};

    fn columns() -> Vec<Column> {
        vec![Column::new("id", "integer"), Column::new("status", "text")]
    }

    #[test]
    fn values_follow_the_column_type() {
        let condition = parse_filter("id >= 10", Category::Sql, &columns()).unwrap();
        assert_eq!(condition.operator, Operator::Ge);
        assert_eq!(condition.value, Value::Int(10));

        let condition = parse_filter("status = on hold", Category::Sql, &columns()).unwrap();
        assert_eq!(condition.value, Value::Text("on hold".to_string()));
    }

    #[test]
    fn match_keeps_text_values() {
        let condition = parse_filter("id match ^1", Category::Sql, &columns()).unwrap();
        assert_eq!(condition.value, Value::Text("^1".to_string()));
    }

    #[test]
    fn bad_filters_are_rejected() {
        assert!(matches!(
            parse_filter("id", Category::Sql, &columns()),
            Err(CliError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_filter("id = ten", Category::Sql, &columns()),
            Err(CliError::InvalidArgument(_))
        ));
        let err = parse_filter("id ~ 1", Category::Sql, &columns()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::UnsupportedOperator));
    }

    #[test]
    fn sort_direction_suffix() {
        assert_eq!(parse_sort("name").unwrap().direction, SortDirection::Asc);
        assert_eq!(parse_sort("name:DESC").unwrap().direction, SortDirection::Desc);
        assert!(parse_sort("name:sideways").is_err());
    }
}
