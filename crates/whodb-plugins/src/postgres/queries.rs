use sqlx::{PgPool, Row as _};

use whodb_core::{Error, Result};

fn db_error(err: sqlx::Error) -> Error {
    Error::Db(err.to_string())
}

pub struct RawUnit {
    pub name: String,
    pub relkind: String,
    pub row_count: Option<i64>,
    pub size: Option<String>,
}

pub async fn list_units(pool: &PgPool, schema: &str) -> Result<Vec<RawUnit>> {
    let rows = sqlx::query(
        r#"
        select
          c.relname::text as name,
          c.relkind::text as relkind,
          s.n_live_tup as row_count,
          pg_size_pretty(pg_total_relation_size(c.oid)) as size
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        left join pg_stat_user_tables s on s.relid = c.oid
        where n.nspname = $1
          and c.relkind in ('r','p','v','m','f')
        order by c.relname
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    rows.into_iter()
        .map(|row| {
            Ok(RawUnit {
                name: row.try_get("name").map_err(db_error)?,
                relkind: row.try_get("relkind").map_err(db_error)?,
                row_count: row.try_get("row_count").map_err(db_error)?,
                size: row.try_get("size").map_err(db_error)?,
            })
        })
        .collect()
}

pub async fn fetch_unit_kind(pool: &PgPool, schema: &str, unit: &str) -> Result<Option<String>> {
    let kind = sqlx::query_scalar::<_, String>(
        r#"
        select c.relkind::text
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        where n.nspname = $1
          and c.relname = $2
          and c.relkind in ('r','p','v','m','f')
        "#,
    )
    .bind(schema)
    .bind(unit)
    .fetch_optional(pool)
    .await
    .map_err(db_error)?;
    Ok(kind)
}

pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub is_identity: bool,
    pub is_generated: bool,
    pub is_primary: bool,
    pub is_unique: bool,
    pub enum_labels: Option<Vec<String>>,
    pub check_definitions: Option<String>,
}

pub async fn list_columns(pool: &PgPool, schema: &str, unit: &str) -> Result<Vec<RawColumn>> {
    let rows = sqlx::query(
        r#"
        select
          a.attname::text as name,
          pg_catalog.format_type(a.atttypid, a.atttypmod) as data_type,
          (not a.attnotnull) as is_nullable,
          pg_get_expr(ad.adbin, ad.adrelid) as column_default,
          (a.attidentity <> '') as is_identity,
          (a.attgenerated <> '') as is_generated,
          exists (
            select 1 from pg_constraint con
            where con.conrelid = c.oid and con.contype = 'p' and a.attnum = any(con.conkey)
          ) as is_primary,
          exists (
            select 1 from pg_constraint con
            where con.conrelid = c.oid and con.contype = 'u' and con.conkey = array[a.attnum]
          ) as is_unique,
          (
            select array_agg(e.enumlabel::text order by e.enumsortorder)
            from pg_enum e
            where e.enumtypid = a.atttypid
          ) as enum_labels,
          (
            select string_agg(pg_get_constraintdef(con.oid), ' ')
            from pg_constraint con
            where con.conrelid = c.oid and con.contype = 'c' and con.conkey = array[a.attnum]
          ) as check_definitions
        from pg_attribute a
        join pg_class c on c.oid = a.attrelid
        join pg_namespace n on n.oid = c.relnamespace
        left join pg_attrdef ad on ad.adrelid = a.attrelid and ad.adnum = a.attnum
        where n.nspname = $1
          and c.relname = $2
          and a.attnum > 0
          and not a.attisdropped
        order by a.attnum
        "#,
    )
    .bind(schema)
    .bind(unit)
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    rows.into_iter()
        .map(|row| {
            Ok(RawColumn {
                name: row.try_get("name").map_err(db_error)?,
                data_type: row.try_get("data_type").map_err(db_error)?,
                is_nullable: row.try_get("is_nullable").map_err(db_error)?,
                default: row.try_get("column_default").map_err(db_error)?,
                is_identity: row.try_get("is_identity").map_err(db_error)?,
                is_generated: row.try_get("is_generated").map_err(db_error)?,
                is_primary: row.try_get("is_primary").map_err(db_error)?,
                is_unique: row.try_get("is_unique").map_err(db_error)?,
                enum_labels: row.try_get("enum_labels").map_err(db_error)?,
                check_definitions: row.try_get("check_definitions").map_err(db_error)?,
            })
        })
        .collect()
}

pub struct RawForeignKey {
    pub name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    /// The referencing column set is itself a primary key or unique constraint.
    pub is_unique: bool,
}

pub async fn list_foreign_keys(
    pool: &PgPool,
    schema: &str,
    unit: &str,
) -> Result<Vec<RawForeignKey>> {
    let rows = sqlx::query(
        r#"
        select
          con.conname::text as name,
          src.attname::text as column_name,
          ref.relname::text as referenced_table,
          dst.attname::text as referenced_column,
          exists (
            select 1 from pg_constraint u
            where u.conrelid = con.conrelid
              and u.contype in ('p','u')
              and u.conkey @> con.conkey
              and u.conkey <@ con.conkey
          ) as is_unique
        from pg_constraint con
        join pg_class rel on rel.oid = con.conrelid
        join pg_namespace nsp on nsp.oid = rel.relnamespace
        join pg_class ref on ref.oid = con.confrelid
        join unnest(con.conkey, con.confkey) with ordinality as k(src_num, dst_num, ord) on true
        join pg_attribute src on src.attrelid = con.conrelid and src.attnum = k.src_num
        join pg_attribute dst on dst.attrelid = con.confrelid and dst.attnum = k.dst_num
        where nsp.nspname = $1
          and rel.relname = $2
          and con.contype = 'f'
        order by con.conname, k.ord
        "#,
    )
    .bind(schema)
    .bind(unit)
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    rows.into_iter()
        .map(|row| {
            Ok(RawForeignKey {
                name: row.try_get("name").map_err(db_error)?,
                column: row.try_get("column_name").map_err(db_error)?,
                referenced_table: row.try_get("referenced_table").map_err(db_error)?,
                referenced_column: row.try_get("referenced_column").map_err(db_error)?,
                is_unique: row.try_get("is_unique").map_err(db_error)?,
            })
        })
        .collect()
}
