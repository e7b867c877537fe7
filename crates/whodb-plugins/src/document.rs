//! Document filter codec.
//!
//! Conditions become a Mongo-style JSON filter (`{"age": {"$gt": 30}}`) and the
//! same filter can be evaluated against a JSON document in-process.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value as Json};

use whodb_core::{Condition, Error, Operator, Result, Row, Value};

fn operator_key(operator: Operator) -> &'static str {
    match operator {
        Operator::Eq => "$eq",
        Operator::Ne => "$ne",
        Operator::Gt => "$gt",
        Operator::Lt => "$lt",
        Operator::Ge => "$gte",
        Operator::Le => "$lte",
        Operator::Match => "$regex",
    }
}

/// Translate an AND-set of conditions into a filter document.
pub fn to_filter(conditions: &[Condition]) -> Json {
    let mut filter = Map::new();
    for condition in conditions {
        let clause = match condition.operator {
            Operator::Match => Json::String(condition.value.to_text().unwrap_or_default()),
            _ => condition.value.to_json(),
        };
        let entry = filter
            .entry(condition.key.clone())
            .or_insert_with(|| Json::Object(Map::new()));
        if let Json::Object(ops) = entry {
            ops.insert(operator_key(condition.operator).to_string(), clause);
        }
    }
    Json::Object(filter)
}

/// Evaluate a filter produced by [`to_filter`] against one document.
pub fn matches(filter: &Json, document: &Json) -> Result<bool> {
    let Json::Object(fields) = filter else {
        return Err(Error::Unsupported("filter must be a JSON object".to_string()));
    };
    for (path, clause) in fields {
        let actual = lookup(document, path);
        let ok = match clause {
            Json::Object(ops) if ops.keys().all(|key| key.starts_with('$')) => {
                let mut all = true;
                for (op, expected) in ops {
                    if !eval_op(op, actual, expected)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            expected => eval_op("$eq", actual, expected)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_op(op: &str, actual: Option<&Json>, expected: &Json) -> Result<bool> {
    let actual_or_null = actual.unwrap_or(&Json::Null);
    match op {
        "$eq" => Ok(json_eq(actual_or_null, expected)),
        "$ne" => Ok(!json_eq(actual_or_null, expected)),
        "$gt" => Ok(json_cmp(actual, expected) == Some(Ordering::Greater)),
        "$lt" => Ok(json_cmp(actual, expected) == Some(Ordering::Less)),
        "$gte" => Ok(matches!(
            json_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        "$lte" => Ok(matches!(
            json_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        )),
        "$regex" => {
            let pattern = expected.as_str().unwrap_or_default();
            let regex = Regex::new(pattern)
                .map_err(|err| Error::Unsupported(format!("invalid match pattern: {err}")))?;
            Ok(match actual {
                Some(Json::String(text)) => regex.is_match(text),
                Some(Json::Null) | None => false,
                Some(other) => regex.is_match(&other.to_string()),
            })
        }
        other => Err(Error::Unsupported(format!("filter operator '{other}'"))),
    }
}

fn lookup<'a>(document: &'a Json, path: &str) -> Option<&'a Json> {
    let mut current = document;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn json_eq(left: &Json, right: &Json) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn json_cmp(actual: Option<&Json>, expected: &Json) -> Option<Ordering> {
    match (actual?, expected) {
        (Json::Number(a), Json::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Json::String(a), Json::String(b)) => Some(a.cmp(b)),
        (Json::Bool(a), Json::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Render a row as a JSON document.
pub fn row_to_document(row: &Row) -> Json {
    let mut map = Map::new();
    for (column, value) in &row.cells {
        map.insert(column.clone(), value.to_json());
    }
    Json::Object(map)
}

/// Flatten a JSON document into a row; nested values stay as JSON cells.
pub fn document_to_row(document: &Json) -> Row {
    match document {
        Json::Object(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_json(value)))
            .collect(),
        _ => Row::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn equality_becomes_eq_clause() {
        let filter = to_filter(&[Condition::eq("status", "active")]);
        assert_eq!(filter, json!({"status": {"$eq": "active"}}));
    }

    #[test]
    fn conditions_on_one_key_share_a_clause() {
        let filter = to_filter(&[
            Condition::new("age", Operator::Ge, 18),
            Condition::new("age", Operator::Lt, 65),
            Condition::new("name", Operator::Match, "^A"),
        ]);
        assert_eq!(
            filter,
            json!({"age": {"$gte": 18, "$lt": 65}, "name": {"$regex": "^A"}})
        );
    }

    #[test]
    fn filter_evaluates_against_documents() {
        let filter = to_filter(&[
            Condition::new("age", Operator::Gt, 30),
            Condition::new("name", Operator::Match, "^Ad"),
        ]);
        assert!(matches(&filter, &json!({"name": "Ada", "age": 36})).unwrap());
        assert!(!matches(&filter, &json!({"name": "Ada", "age": 20})).unwrap());
        assert!(!matches(&filter, &json!({"name": "Bob", "age": 40})).unwrap());
        assert!(!matches(&filter, &json!({"name": "Ada"})).unwrap());
    }

    #[test]
    fn nested_paths_and_missing_fields() {
        let filter = json!({"address.city": {"$eq": "Lisbon"}, "deleted": {"$ne": true}});
        let doc = json!({"address": {"city": "Lisbon"}});
        assert!(matches(&filter, &doc).unwrap());
    }

    #[test]
    fn invalid_pattern_is_unsupported() {
        let filter = to_filter(&[Condition::new("name", Operator::Match, "(")]);
        assert!(matches(&filter, &json!({"name": "x"})).is_err());
    }

    #[test]
    fn documents_flatten_into_rows() {
        let row = document_to_row(&json!({"_id": "a1", "tags": ["x"], "n": 2}));
        assert_eq!(row.get("_id"), Some(&Value::Text("a1".to_string())));
        assert_eq!(row.get("n"), Some(&Value::Int(2)));
        assert_eq!(row.get("tags"), Some(&Value::Json(json!(["x"]))));
        assert_eq!(row_to_document(&row)["n"], json!(2));
    }
}
