use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row as _};
use tracing::debug;

use whodb_core::{
    Category, Column, Condition, Error, ForeignKeyEdge, Page, Result, Row, RowIdentity, RowSet,
    Sort, StorageUnit, Value,
};

use crate::options::PostgresOptions;
use crate::plugin::{Plugin, PluginDescriptor};

mod mapper;
mod queries;
pub mod sqlbuilder;

use sqlbuilder::Statement;

pub const STORE_TYPE: &str = "Postgres";

/// Plugin for PostgreSQL databases.
#[derive(Debug, Clone)]
pub struct PostgresPlugin {
    pool: PgPool,
    options: PostgresOptions,
}

impl PostgresPlugin {
    /// Create a plugin over a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self::with_options(pool, PostgresOptions::default())
    }

    pub fn with_options(pool: PgPool, options: PostgresOptions) -> Self {
        Self { pool, options }
    }

    /// Open a small pool for `url`.
    pub async fn connect(url: &str, options: PostgresOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|err| Error::Db(err.to_string()))?;
        Ok(Self::with_options(pool, options))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Kind and columns of `unit`, or `NotFound`.
    async fn describe(&self, unit: &str) -> Result<(String, Vec<Column>)> {
        let relkind = queries::fetch_unit_kind(&self.pool, &self.options.schema, unit)
            .await?
            .ok_or_else(|| Error::NotFound(format!("storage unit '{unit}'")))?;
        let columns = mapper::map_columns(
            queries::list_columns(&self.pool, &self.options.schema, unit).await?,
        );
        Ok((mapper::relkind_label(&relkind).to_string(), columns))
    }

    async fn fetch_rows(&self, unit: &str, columns: &[Column], stmt: Statement) -> Result<Vec<Row>> {
        let mut query = sqlx::query(&stmt.sql);
        for param in stmt.params {
            query = query.bind(param);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| map_db_error(unit, err))?;
        rows.iter().map(|row| decode_row(row, columns)).collect()
    }

    async fn execute(&self, unit: &str, stmt: Statement) -> Result<u64> {
        let mut query = sqlx::query(&stmt.sql);
        for param in stmt.params {
            query = query.bind(param);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|err| map_db_error(unit, err))?;
        Ok(result.rows_affected())
    }
}

fn decode_row(row: &PgRow, columns: &[Column]) -> Result<Row> {
    let mut out = Row::new();
    for (idx, column) in columns.iter().enumerate() {
        let text: Option<String> = row
            .try_get(idx)
            .map_err(|err| Error::Db(err.to_string()))?;
        let value = match text {
            None => Value::Null,
            Some(text) => Value::parse_text(&column.canonical, &text)
                .unwrap_or(Value::Text(text)),
        };
        out.cells.push((column.name.clone(), value));
    }
    Ok(out)
}

/// Map a driver error onto the taxonomy, keeping the server message verbatim.
pub fn map_db_error(unit: &str, err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code().map(|code| code.into_owned()).unwrap_or_default();
        // Class 23 is integrity violations, class 22 data exceptions.
        if code.starts_with("23") || code.starts_with("22") {
            return Error::constraint(unit, db.message());
        }
        if code == "42P01" {
            return Error::NotFound(db.message().to_string());
        }
    }
    Error::Db(err.to_string())
}

#[async_trait]
impl Plugin for PostgresPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new(Category::Sql, STORE_TYPE)
    }

    async fn list_storage_units(&self) -> Result<Vec<StorageUnit>> {
        let raw = queries::list_units(&self.pool, &self.options.schema).await?;
        let mut units = mapper::map_units(raw, &self.options);
        for unit in &mut units {
            unit.columns = mapper::map_columns(
                queries::list_columns(&self.pool, &self.options.schema, &unit.name).await?,
            );
        }
        debug!(event = "postgres.units", schema = %self.options.schema, units = units.len());
        Ok(units)
    }

    async fn get_columns(&self, unit: &str) -> Result<Vec<Column>> {
        let (_, columns) = self.describe(unit).await?;
        Ok(columns)
    }

    async fn get_relationships(&self, unit: &str) -> Result<Vec<ForeignKeyEdge>> {
        let raw = queries::list_foreign_keys(&self.pool, &self.options.schema, unit).await?;
        Ok(mapper::map_foreign_keys(unit, raw))
    }

    async fn query(
        &self,
        unit: &str,
        conditions: &[Condition],
        sort: &[Sort],
        page: Option<Page>,
    ) -> Result<RowSet> {
        let (kind, columns) = self.describe(unit).await?;
        let stmt = sqlbuilder::select(&self.options.schema, unit, &columns, conditions, sort, page)?;
        debug!(event = "postgres.query", unit = %unit, sql = %stmt.sql);
        let rows = self.fetch_rows(unit, &columns, stmt).await?;
        Ok(RowSet {
            columns: columns.iter().map(|column| column.name.clone()).collect(),
            rows,
            disable_update: kind.contains("VIEW"),
        })
    }

    async fn add_row(&self, unit: &str, cells: Row) -> Result<Row> {
        let (_, columns) = self.describe(unit).await?;
        let stmt = sqlbuilder::insert(&self.options.schema, unit, &columns, &cells)?;
        let mut rows = self.fetch_rows(unit, &columns, stmt).await?;
        rows.pop()
            .ok_or_else(|| Error::Db(format!("insert into '{unit}' returned no row")))
    }

    async fn update_row(&self, unit: &str, identity: &RowIdentity, cells: Row) -> Result<Row> {
        let (_, columns) = self.describe(unit).await?;
        let stmt = sqlbuilder::update(&self.options.schema, unit, &columns, identity, &cells)?;
        let mut rows = self.fetch_rows(unit, &columns, stmt).await?;
        rows.pop()
            .ok_or_else(|| Error::NotFound(format!("row in storage unit '{unit}'")))
    }

    async fn delete_row(&self, unit: &str, identity: &RowIdentity) -> Result<()> {
        let (_, columns) = self.describe(unit).await?;
        let stmt = sqlbuilder::delete(&self.options.schema, unit, &columns, identity)?;
        match self.execute(unit, stmt).await? {
            0 => Err(Error::NotFound(format!("row in storage unit '{unit}'"))),
            _ => Ok(()),
        }
    }

    async fn count(&self, unit: &str, conditions: &[Condition]) -> Result<u64> {
        let (_, columns) = self.describe(unit).await?;
        let stmt = sqlbuilder::count(&self.options.schema, unit, &columns, conditions)?;
        let mut query = sqlx::query_scalar::<_, i64>(&stmt.sql);
        for param in stmt.params {
            query = query.bind(param);
        }
        let total = query
            .fetch_one(&self.pool)
            .await
            .map_err(|err| map_db_error(unit, err))?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn clear_unit(&self, unit: &str) -> Result<u64> {
        if queries::fetch_unit_kind(&self.pool, &self.options.schema, unit)
            .await?
            .is_none()
        {
            return Err(Error::NotFound(format!("storage unit '{unit}'")));
        }
        let removed = self
            .execute(unit, sqlbuilder::clear(&self.options.schema, unit))
            .await?;
        debug!(event = "postgres.clear", unit = %unit, rows = removed);
        Ok(removed)
    }

    async fn bulk_add_rows(&self, unit: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let (_, columns) = self.describe(unit).await?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| Error::Db(err.to_string()))?;
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let stmt = sqlbuilder::insert(&self.options.schema, unit, &columns, &row)?;
            let mut query = sqlx::query(&stmt.sql);
            for param in stmt.params {
                query = query.bind(param);
            }
            let returned = query
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| map_db_error(unit, err))?;
            written.push(decode_row(&returned, &columns)?);
        }
        tx.commit().await.map_err(|err| Error::Db(err.to_string()))?;
        Ok(written)
    }
}
