//! Dialect-aware schema provisioning.
//!
//! The column set is fixed across dialects; only the concrete types, the
//! identity column, and the existence guard vary. Timestamps are stored as
//! epoch milliseconds in 64-bit integer columns so every DML statement
//! binds the same scalar types on every backend.

use sqlx::AnyPool;
use tracing::debug;

use crate::dialect::Dialect;

/// Build the CREATE TABLE statement for `table` in the given dialect.
///
/// Every variant declares the uniqueness constraint on
/// `(bucket_name, data_key)` that backs overwrite and race semantics.
pub fn create_table_sql(dialect: Dialect, table: &str) -> String {
    match dialect {
        Dialect::MySql => format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                bucket_name VARCHAR(255) NOT NULL,
                data_key VARCHAR(255) NOT NULL,
                data LONGBLOB NOT NULL,
                data_length BIGINT NOT NULL,
                meta LONGTEXT,
                gmt_create BIGINT NOT NULL,
                gmt_modified BIGINT NOT NULL,
                UNIQUE KEY uk_bucket_key (bucket_name, data_key)
            )"#
        ),
        // Oracle has no IF NOT EXISTS; creation runs inside a PL/SQL block
        // that discards the "name is already used" failure.
        Dialect::Oracle => format!(
            r#"BEGIN EXECUTE IMMEDIATE 'CREATE TABLE {table} (
                id NUMBER(19) GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                bucket_name VARCHAR2(255) NOT NULL,
                data_key VARCHAR2(255) NOT NULL,
                data BLOB NOT NULL,
                data_length NUMBER(19) NOT NULL,
                meta CLOB,
                gmt_create NUMBER(19) NOT NULL,
                gmt_modified NUMBER(19) NOT NULL,
                CONSTRAINT uk_bucket_key UNIQUE (bucket_name, data_key)
            )'; EXCEPTION WHEN OTHERS THEN NULL; END;"#
        ),
        Dialect::SqlServer => format!(
            r#"IF NOT EXISTS (SELECT * FROM sysobjects WHERE name='{table}')
            CREATE TABLE {table} (
                id BIGINT IDENTITY(1,1) PRIMARY KEY,
                bucket_name VARCHAR(255) NOT NULL,
                data_key VARCHAR(255) NOT NULL,
                data VARBINARY(MAX) NOT NULL,
                data_length BIGINT NOT NULL,
                meta NVARCHAR(MAX),
                gmt_create BIGINT NOT NULL,
                gmt_modified BIGINT NOT NULL,
                CONSTRAINT uk_bucket_key UNIQUE (bucket_name, data_key)
            )"#
        ),
        Dialect::PostgresCompatible | Dialect::Unknown => format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                bucket_name VARCHAR(255) NOT NULL,
                data_key VARCHAR(255) NOT NULL,
                data BYTEA NOT NULL,
                data_length BIGINT NOT NULL,
                meta TEXT,
                gmt_create BIGINT NOT NULL,
                gmt_modified BIGINT NOT NULL,
                UNIQUE (bucket_name, data_key)
            )"#
        ),
    }
}

/// Create the backing table if it does not already exist.
///
/// Runs the single dialect-specific DDL statement. A failure here is fatal
/// to initialization: without the table every later operation would fail
/// anyway. Re-running against a provisioned table neither errors nor
/// alters existing rows.
pub async fn ensure_schema(
    pool: &AnyPool,
    dialect: Dialect,
    table: &str,
) -> Result<(), sqlx::Error> {
    let ddl = create_table_sql(dialect, table);
    debug!(dialect = %dialect, table, "provisioning blob table");
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}
