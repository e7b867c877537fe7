/// Options that control how the Postgres plugin reads the catalog.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Schema whose tables are exposed as storage units.
    pub schema: String,
    pub include_views: bool,
    pub include_materialized_views: bool,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            include_views: true,
            include_materialized_views: true,
        }
    }
}

impl PostgresOptions {
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}
