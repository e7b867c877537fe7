//! Parameterised statement construction.
//!
//! Every value is bound as text and cast to the column's native type in SQL,
//! and every selected column is cast back to text so rows decode through the
//! canonical text codec.

use whodb_core::{
    Column, Condition, Error, Operator, Page, Result, Row, RowIdentity, Sort, SortDirection,
};

/// SQL text plus its positional text parameters (`None` binds NULL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn qualified(schema: &str, unit: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(unit))
}

fn find_column<'a>(columns: &'a [Column], unit: &str, name: &str) -> Result<&'a Column> {
    columns
        .iter()
        .find(|column| column.name == name)
        .ok_or_else(|| Error::NotFound(format!("column '{name}' of storage unit '{unit}'")))
}

fn select_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|column| {
            let ident = quote_ident(&column.name);
            format!("{ident}::text as {ident}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

struct Builder<'a> {
    unit: &'a str,
    columns: &'a [Column],
    params: Vec<Option<String>>,
}

impl<'a> Builder<'a> {
    fn new(unit: &'a str, columns: &'a [Column]) -> Self {
        Self {
            unit,
            columns,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, column: &Column, value: Option<String>) -> String {
        self.params.push(value);
        format!("${}::{}", self.params.len(), column.native_type)
    }

    fn predicate(&mut self, condition: &Condition) -> Result<String> {
        let column = find_column(self.columns, self.unit, &condition.key)?;
        let ident = quote_ident(&column.name);
        let text = condition.value.to_text();

        if text.is_none() {
            return match condition.operator {
                Operator::Eq => Ok(format!("{ident} is null")),
                Operator::Ne => Ok(format!("{ident} is not null")),
                other => Err(Error::Unsupported(format!(
                    "operator '{other}' cannot compare against NULL"
                ))),
            };
        }

        match condition.operator.sql_symbol() {
            Some(symbol) => {
                let placeholder = self.bind(column, text);
                Ok(format!("{ident} {symbol} {placeholder}"))
            }
            None => {
                self.params.push(text);
                Ok(format!("{ident}::text ~ ${}", self.params.len()))
            }
        }
    }

    fn where_clause(&mut self, conditions: &[Condition]) -> Result<String> {
        if conditions.is_empty() {
            return Ok(String::new());
        }
        let mut parts = Vec::with_capacity(conditions.len());
        for condition in conditions {
            parts.push(self.predicate(condition)?);
        }
        Ok(format!(" where {}", parts.join(" and ")))
    }

    fn identity_clause(&mut self, identity: &RowIdentity) -> Result<String> {
        if identity.cells.is_empty() {
            return Err(Error::Unsupported(format!(
                "storage unit '{}' has no row identity",
                self.unit
            )));
        }
        let conditions: Vec<Condition> = identity
            .cells
            .iter()
            .map(|(column, value)| Condition::new(column.clone(), Operator::Eq, value.clone()))
            .collect();
        self.where_clause(&conditions)
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

pub fn select(
    schema: &str,
    unit: &str,
    columns: &[Column],
    conditions: &[Condition],
    sort: &[Sort],
    page: Option<Page>,
) -> Result<Statement> {
    let mut builder = Builder::new(unit, columns);
    let mut sql = format!(
        "select {} from {}",
        select_list(columns),
        qualified(schema, unit)
    );
    sql.push_str(&builder.where_clause(conditions)?);

    if !sort.is_empty() {
        let mut keys = Vec::with_capacity(sort.len());
        for entry in sort {
            let column = find_column(columns, unit, &entry.key)?;
            let direction = match entry.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            keys.push(format!("{} {direction}", quote_ident(&column.name)));
        }
        sql.push_str(&format!(" order by {}", keys.join(", ")));
    }

    if let Some(page) = page {
        sql.push_str(&format!(" limit {} offset {}", page.size, page.offset));
    }
    Ok(builder.finish(sql))
}

pub fn count(schema: &str, unit: &str, columns: &[Column], conditions: &[Condition]) -> Result<Statement> {
    let mut builder = Builder::new(unit, columns);
    let mut sql = format!("select count(*) from {}", qualified(schema, unit));
    sql.push_str(&builder.where_clause(conditions)?);
    Ok(builder.finish(sql))
}

pub fn insert(schema: &str, unit: &str, columns: &[Column], row: &Row) -> Result<Statement> {
    let mut builder = Builder::new(unit, columns);
    let table = qualified(schema, unit);
    let returning = select_list(columns);

    if row.is_empty() {
        let sql = format!("insert into {table} default values returning {returning}");
        return Ok(builder.finish(sql));
    }

    let mut names = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (name, value) in &row.cells {
        let column = find_column(columns, unit, name)?;
        names.push(quote_ident(&column.name));
        values.push(builder.bind(column, value.to_text()));
    }
    let sql = format!(
        "insert into {table} ({}) values ({}) returning {returning}",
        names.join(", "),
        values.join(", ")
    );
    Ok(builder.finish(sql))
}

pub fn update(
    schema: &str,
    unit: &str,
    columns: &[Column],
    identity: &RowIdentity,
    row: &Row,
) -> Result<Statement> {
    if row.is_empty() {
        return Err(Error::Unsupported("update without any values".to_string()));
    }
    let mut builder = Builder::new(unit, columns);
    let mut assignments = Vec::with_capacity(row.len());
    for (name, value) in &row.cells {
        let column = find_column(columns, unit, name)?;
        let placeholder = builder.bind(column, value.to_text());
        assignments.push(format!("{} = {placeholder}", quote_ident(&column.name)));
    }
    let filter = builder.identity_clause(identity)?;
    let sql = format!(
        "update {} set {}{filter} returning {}",
        qualified(schema, unit),
        assignments.join(", "),
        select_list(columns)
    );
    Ok(builder.finish(sql))
}

pub fn delete(
    schema: &str,
    unit: &str,
    columns: &[Column],
    identity: &RowIdentity,
) -> Result<Statement> {
    let mut builder = Builder::new(unit, columns);
    let filter = builder.identity_clause(identity)?;
    let sql = format!("delete from {}{filter}", qualified(schema, unit));
    Ok(builder.finish(sql))
}

pub fn clear(schema: &str, unit: &str) -> Statement {
    Statement {
        sql: format!("delete from {}", qualified(schema, unit)),
        params: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use whodb_core::{Value, ErrorKind};

    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", "integer").primary().auto(),
            Column::new("name", "character varying(40)").not_null(),
            Column::new("created_at", "timestamp with time zone"),
        ]
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified("public", "orders"), "\"public\".\"orders\"");
    }

    #[test]
    fn select_casts_conditions_and_results() {
        let stmt = select(
            "public",
            "customers",
            &columns(),
            &[
                Condition::new("id", Operator::Ge, 10),
                Condition::eq("name", "Ada"),
            ],
            &[Sort::desc("id")],
            Some(Page::new(20, 10)),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "select \"id\"::text as \"id\", \"name\"::text as \"name\", \
             \"created_at\"::text as \"created_at\" from \"public\".\"customers\" \
             where \"id\" >= $1::integer and \"name\" = $2::character varying(40) \
             order by \"id\" desc limit 10 offset 20"
        );
        assert_eq!(
            stmt.params,
            vec![Some("10".to_string()), Some("Ada".to_string())]
        );
    }

    #[test]
    fn null_comparisons_use_is_null() {
        let stmt = count(
            "public",
            "customers",
            &columns(),
            &[Condition::new("created_at", Operator::Eq, Value::Null)],
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "select count(*) from \"public\".\"customers\" where \"created_at\" is null"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn unknown_condition_column_is_not_found() {
        let err = count(
            "public",
            "customers",
            &columns(),
            &[Condition::eq("missing", 1)],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn insert_returns_every_column() {
        let row = Row::new().with("name", "Ada");
        let stmt = insert("public", "customers", &columns(), &row).unwrap();
        assert!(stmt.sql.starts_with(
            "insert into \"public\".\"customers\" (\"name\") values ($1::character varying(40)) returning"
        ));
        assert!(stmt.sql.ends_with("\"created_at\"::text as \"created_at\""));

        let stmt = insert("public", "customers", &columns(), &Row::new()).unwrap();
        assert!(stmt.sql.contains("default values"));
    }

    #[test]
    fn update_and_delete_filter_by_identity() {
        let identity = RowIdentity::single("id", 7);
        let stmt = update(
            "public",
            "customers",
            &columns(),
            &identity,
            &Row::new().with("name", "Grace"),
        )
        .unwrap();
        assert!(stmt.sql.contains("set \"name\" = $1::character varying(40) where \"id\" = $2::integer"));
        assert_eq!(stmt.params[1].as_deref(), Some("7"));

        let stmt = delete("public", "customers", &columns(), &identity).unwrap();
        assert_eq!(
            stmt.sql,
            "delete from \"public\".\"customers\" where \"id\" = $1::integer"
        );
    }
}
