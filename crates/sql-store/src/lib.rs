//! SQL-row blob store.
//!
//! Persists opaque binary files as rows in a relational database reached
//! through sqlx's Any driver, so one codebase serves servers speaking
//! MySQL, Oracle, SQL Server, or PostgreSQL-compatible SQL dialects. A
//! `productName` query parameter in the connection string declares the
//! active dialect; schema provisioning emits the matching DDL.
//!
//! # Example
//!
//! ```rust,no_run
//! use rowstore_core::{ByteSource, FileLocation, StoreRequest};
//! use rowstore_sql::{SqlBlobStore, StoreConfig};
//!
//! # async fn example() -> Result<(), rowstore_sql::Error> {
//! let config = StoreConfig {
//!     url: Some("postgres://db.internal:54321/jobs?productName=MySQL".into()),
//!     username: Some("scheduler".into()),
//!     password: Some("secret".into()),
//!     auto_create_table: true,
//!     ..StoreConfig::default()
//! };
//! let store = SqlBlobStore::connect(config).await?;
//!
//! let location = FileLocation::new("logs", "job-42.log");
//! let source = ByteSource::from_bytes(b"job output".to_vec());
//! store.store(StoreRequest::new(location, source)).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dialect;
mod error;
mod schema;
mod store;

pub use config::{ConfigError, StoreConfig, DEFAULT_TABLE_NAME};
pub use dialect::{detect_mode, BindStyle, Dialect};
pub use error::{Error, Result};
pub use schema::{create_table_sql, ensure_schema};
pub use store::SqlBlobStore;
