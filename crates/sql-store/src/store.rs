//! Blob operations over a pooled Any-driver connection.

use std::collections::HashMap;
use std::sync::Once;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Row};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use rowstore_core::{BlobStore, DownloadRequest, FileLocation, FileMeta, StoreRequest};

use crate::config::StoreConfig;
use crate::dialect::{detect_mode, BindStyle, Dialect};
use crate::error::{Error, Result};
use crate::schema::ensure_schema;

/// Diagnostic metadata recorded with every stored blob.
const META_SERVER_KEY: &str = "_server_";
const META_LOCAL_PATH_KEY: &str = "_local_file_path_";

static DRIVERS: Once = Once::new();

// sqlx's Any driver registry is process-global and set exactly once.
fn install_drivers() {
    DRIVERS.call_once(sqlx::any::install_default_drivers);
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Blob store persisting payloads as rows in a relational database.
///
/// Each operation acquires one pooled connection for its duration and
/// releases it on every exit path. Autocommit applies throughout: every
/// statement is its own transaction, so the delete-then-insert overwrite
/// inside [`store`] is deliberately not atomic. The uniqueness constraint
/// on `(bucket_name, data_key)` is the backstop against duplicate rows; a
/// losing concurrent insert surfaces as [`Error::Conflict`].
///
/// [`store`]: SqlBlobStore::store
#[derive(Debug, Clone)]
pub struct SqlBlobStore {
    pool: AnyPool,
    table: String,
    mode: String,
    dialect: Dialect,
    bind: BindStyle,
    server_id: String,
}

impl SqlBlobStore {
    /// Validate the configuration, open the pool, and provision the schema
    /// when auto-create is enabled.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let url = config.connect_url()?;
        install_drivers();

        let mode = detect_mode(config.url.as_deref());
        let dialect = Dialect::from_mode(&mode);
        let bind = BindStyle::from_url(url.as_str());
        info!(config = ?config, mode = %mode, dialect = %dialect, "connecting blob store");

        let pool = AnyPoolOptions::new()
            .min_connections(config.min_idle)
            .max_connections(config.max_pool_size)
            .connect(url.as_str())
            .await
            .map_err(Error::Connection)?;

        if config.auto_create_table {
            ensure_schema(&pool, dialect, &config.table_name)
                .await
                .map_err(Error::Schema)?;
            info!(table = %config.table_name, "blob table provisioned");
        }

        let server_id = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            pool,
            table: config.table_name,
            mode,
            dialect,
            bind,
            server_id,
        })
    }

    /// The raw dialect tag detected from the connection string.
    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Persist the request's payload at its location, replacing any
    /// existing blob.
    ///
    /// The pre-delete and the insert are independent autocommit statements;
    /// a reader between the two can observe the location as absent.
    pub async fn store(&self, request: StoreRequest) -> Result<()> {
        let StoreRequest { location, source } = request;
        self.delete_internal(&location).await;

        let started = Instant::now();
        let mut meta = HashMap::new();
        meta.insert(META_SERVER_KEY.to_string(), self.server_id.clone());
        if let Some(origin) = source.origin() {
            meta.insert(META_LOCAL_PATH_KEY.to_string(), origin.display().to_string());
        }
        let meta_json = serde_json::to_string(&meta).map_err(|e| Error::Meta {
            location: location.clone(),
            source: e,
        })?;

        let length = source.length() as i64;
        let payload = source.read_all().await?;
        let now = Utc::now().timestamp_millis();

        let sql = format!(
            "INSERT INTO {} (bucket_name, data_key, data, data_length, meta, gmt_create, gmt_modified) VALUES ({}, {}, {}, {}, {}, {}, {})",
            self.table,
            self.bind.placeholder(1),
            self.bind.placeholder(2),
            self.bind.placeholder(3),
            self.bind.placeholder(4),
            self.bind.placeholder(5),
            self.bind.placeholder(6),
            self.bind.placeholder(7),
        );
        let mut conn = self.acquire().await?;
        let result = sqlx::query(&sql)
            .bind(location.bucket())
            .bind(location.key())
            .bind(payload)
            .bind(length)
            .bind(meta_json)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    location = %location,
                    mode = %self.mode,
                    length,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "blob stored"
                );
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                error!(location = %location, "insert lost a concurrent store race");
                Err(Error::Conflict(location))
            }
            Err(e) => {
                error!(location = %location, error = %e, "store failed");
                Err(Error::Store {
                    location,
                    source: e,
                })
            }
        }
    }

    /// Stream a stored payload into the request's target.
    ///
    /// A missing record is not an error: the call logs the miss and leaves
    /// the target untouched.
    pub async fn download(&self, request: DownloadRequest) -> Result<()> {
        let DownloadRequest { location, target } = request;
        let started = Instant::now();

        target.prepare().await?;

        let sql = format!("SELECT data FROM {}{}", self.table, self.location_filter(1));
        let mut conn = self.acquire().await?;
        let row = sqlx::query(&sql)
            .bind(location.bucket())
            .bind(location.key())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                error!(location = %location, error = %e, "download query failed");
                self.read_err(&location, e)
            })?;

        let Some(row) = row else {
            warn!(location = %location, "download miss, record not found");
            return Ok(());
        };

        let payload: Vec<u8> = row.try_get("data").map_err(|e| self.read_err(&location, e))?;

        let mut writer = target.open().await?;
        let mut reader = payload.as_slice();
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;

        info!(
            location = %location,
            length = payload.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "blob downloaded"
        );
        Ok(())
    }

    /// Fetch a record's metadata without materializing its payload.
    pub async fn fetch_meta(&self, location: &FileLocation) -> Result<Option<FileMeta>> {
        let sql = format!(
            "SELECT data_length, meta, gmt_modified FROM {}{}",
            self.table,
            self.location_filter(1)
        );
        let mut conn = self.acquire().await?;
        let row = sqlx::query(&sql)
            .bind(location.bucket())
            .bind(location.key())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                error!(location = %location, error = %e, "fetch_meta query failed");
                self.read_err(location, e)
            })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let length: i64 = row
            .try_get("data_length")
            .map_err(|e| self.read_err(location, e))?;
        let modified_ms: i64 = row
            .try_get("gmt_modified")
            .map_err(|e| self.read_err(location, e))?;
        let meta_raw: Option<String> = row.try_get("meta").map_err(|e| self.read_err(location, e))?;

        let meta = match meta_raw.as_deref() {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str(raw).map_err(|e| Error::Meta {
                    location: location.clone(),
                    source: e,
                })?
            }
            _ => HashMap::new(),
        };

        Ok(Some(FileMeta {
            length,
            last_modified: DateTime::from_timestamp_millis(modified_ms)
                .unwrap_or(DateTime::UNIX_EPOCH),
            meta,
        }))
    }

    /// Best-effort removal of every blob in `bucket` whose modified time is
    /// strictly older than `days` days ago.
    ///
    /// This is a maintenance sweep: failures are logged and suppressed so
    /// they never reach the caller.
    pub async fn clean_expired_files(&self, bucket: &str, days: u32) {
        let cutoff = (Utc::now() - Duration::days(days as i64)).timestamp_millis();
        let sql = format!(
            "DELETE FROM {} WHERE bucket_name = {} AND gmt_modified < {}",
            self.table,
            self.bind.placeholder(1),
            self.bind.placeholder(2),
        );
        let result: std::result::Result<u64, sqlx::Error> = async {
            let mut conn = self.pool.acquire().await?;
            let done = sqlx::query(&sql)
                .bind(bucket)
                .bind(cutoff)
                .execute(&mut *conn)
                .await?;
            Ok(done.rows_affected())
        }
        .await;

        match result {
            Ok(affected) => info!(bucket, days, affected, "cleaned expired blobs"),
            Err(e) => error!(bucket, days, error = %e, "failed to clean expired blobs"),
        }
    }

    /// Close the pool. Safe to call once during teardown; operations after
    /// shutdown are undefined.
    pub async fn shutdown(&self) {
        self.pool.close().await;
        info!("blob store shut down");
    }

    /// Best-effort removal of the record at `location`, used as store()'s
    /// pre-step. Failures are logged and swallowed; a surviving stale
    /// record still trips the uniqueness constraint on the follow-up
    /// insert.
    async fn delete_internal(&self, location: &FileLocation) {
        let sql = format!("DELETE FROM {}{}", self.table, self.location_filter(1));
        let result: std::result::Result<_, sqlx::Error> = async {
            let mut conn = self.pool.acquire().await?;
            sqlx::query(&sql)
                .bind(location.bucket())
                .bind(location.key())
                .execute(&mut *conn)
                .await
        }
        .await;

        if let Err(e) = result {
            error!(location = %location, error = %e, "pre-delete failed");
        }
    }

    async fn acquire(&self) -> Result<PoolConnection<Any>> {
        self.pool.acquire().await.map_err(Error::Connection)
    }

    fn location_filter(&self, first: usize) -> String {
        format!(
            " WHERE bucket_name = {} AND data_key = {}",
            self.bind.placeholder(first),
            self.bind.placeholder(first + 1)
        )
    }

    fn read_err(&self, location: &FileLocation, source: sqlx::Error) -> Error {
        Error::Download {
            location: location.clone(),
            source,
        }
    }
}

#[async_trait]
impl BlobStore for SqlBlobStore {
    type Error = Error;

    async fn store(&self, request: StoreRequest) -> Result<()> {
        SqlBlobStore::store(self, request).await
    }

    async fn download(&self, request: DownloadRequest) -> Result<()> {
        SqlBlobStore::download(self, request).await
    }

    async fn fetch_meta(&self, location: &FileLocation) -> Result<Option<FileMeta>> {
        SqlBlobStore::fetch_meta(self, location).await
    }

    async fn clean_expired_files(&self, bucket: &str, days: u32) {
        SqlBlobStore::clean_expired_files(self, bucket, days).await
    }

    async fn shutdown(&self) {
        SqlBlobStore::shutdown(self).await
    }
}

#[cfg(test)]
mod tests {
    use rowstore_core::ByteSink;
    use rowstore_core::ByteSource;
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn connect_store(dir: &tempfile::TempDir) -> SqlBlobStore {
        let db_path = dir.path().join("store.db");
        let config = StoreConfig {
            url: Some(format!("sqlite://{}?mode=rwc", db_path.display())),
            username: Some("scheduler".to_string()),
            password: Some("secret".to_string()),
            auto_create_table: true,
            ..StoreConfig::default()
        };
        SqlBlobStore::connect(config).await.unwrap()
    }

    async fn test_store() -> (SqlBlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = connect_store(&dir).await;
        (store, dir)
    }

    async fn put(store: &SqlBlobStore, location: &FileLocation, payload: &[u8]) {
        store
            .store(StoreRequest::new(
                location.clone(),
                ByteSource::from_bytes(payload.to_vec()),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_then_fetch_meta_round_trip() {
        let (store, _dir) = test_store().await;
        let location = FileLocation::new("logs", "job-1.log");
        put(&store, &location, b"job output").await;

        let meta = store.fetch_meta(&location).await.unwrap().unwrap();
        assert_eq!(meta.length, 10);
        assert!(meta.meta.contains_key(META_SERVER_KEY));
        assert!(meta.last_modified > DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_fetch_meta_of_absent_record_is_none() {
        let (store, _dir) = test_store().await;
        let location = FileLocation::new("logs", "never-stored");
        assert!(store.fetch_meta(&location).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_url_maps_to_default_dialect() {
        let (store, _dir) = test_store().await;
        assert_eq!(store.mode(), "unknown");
        assert_eq!(store.dialect(), Dialect::Unknown);
        assert_eq!(store.table(), "oms_dfs_store");
    }

    #[tokio::test]
    async fn test_store_from_file_records_origin_path() {
        let (store, dir) = test_store().await;
        let artifact = dir.path().join("artifact.bin");
        tokio::fs::write(&artifact, b"file payload").await.unwrap();

        let location = FileLocation::new("artifacts", "job-7.bin");
        let source = ByteSource::from_path(&artifact).await.unwrap();
        store
            .store(StoreRequest::new(location.clone(), source))
            .await
            .unwrap();

        let meta = store.fetch_meta(&location).await.unwrap().unwrap();
        assert_eq!(meta.length, 12);
        assert_eq!(
            meta.meta.get(META_LOCAL_PATH_KEY),
            Some(&artifact.display().to_string())
        );
    }

    #[tokio::test]
    async fn test_overwrite_leaves_single_record() {
        let (store, dir) = test_store().await;
        let location = FileLocation::new("logs", "job-2.log");
        put(&store, &location, b"first").await;
        put(&store, &location, b"second").await;

        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM oms_dfs_store")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.try_get::<i64, _>("cnt").unwrap(), 1);

        let out = dir.path().join("out/job-2.log");
        store
            .download(DownloadRequest::new(location, ByteSink::file(&out)))
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_download_miss_leaves_target_untouched() {
        let (store, dir) = test_store().await;
        let out = dir.path().join("downloads/missing.bin");
        store
            .download(DownloadRequest::new(
                FileLocation::new("logs", "never-stored"),
                ByteSink::file(&out),
            ))
            .await
            .unwrap();

        assert!(!out.exists());
        assert!(out.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_download_into_writer_sink() {
        let (store, _dir) = test_store().await;
        let location = FileLocation::new("logs", "job-3.log");
        put(&store, &location, b"streamed payload").await;

        let (mut rx, tx) = tokio::io::duplex(64 * 1024);
        store
            .download(DownloadRequest::new(location, ByteSink::writer(tx)))
            .await
            .unwrap();

        let mut out = Vec::new();
        rx.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"streamed payload");
    }

    #[tokio::test]
    async fn test_clean_expired_files_scopes_to_bucket() {
        let (store, _dir) = test_store().await;
        put(&store, &FileLocation::new("logs", "old.log"), b"old").await;
        put(&store, &FileLocation::new("logs", "fresh.log"), b"fresh").await;
        put(&store, &FileLocation::new("artifacts", "old.bin"), b"old").await;

        let aged = (Utc::now() - Duration::days(10)).timestamp_millis();
        sqlx::query("UPDATE oms_dfs_store SET gmt_modified = ? WHERE data_key = ? OR data_key = ?")
            .bind(aged)
            .bind("old.log")
            .bind("old.bin")
            .execute(&store.pool)
            .await
            .unwrap();

        store.clean_expired_files("logs", 1).await;

        assert!(store
            .fetch_meta(&FileLocation::new("logs", "old.log"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .fetch_meta(&FileLocation::new("logs", "fresh.log"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .fetch_meta(&FileLocation::new("artifacts", "old.bin"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_clean_expired_files_with_zero_days() {
        let (store, _dir) = test_store().await;
        let location = FileLocation::new("logs", "hourly.log");
        put(&store, &location, b"stale").await;

        let aged = (Utc::now() - Duration::hours(1)).timestamp_millis();
        sqlx::query("UPDATE oms_dfs_store SET gmt_modified = ?")
            .bind(aged)
            .execute(&store.pool)
            .await
            .unwrap();

        store.clean_expired_files("logs", 0).await;
        assert!(store.fetch_meta(&location).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_stores_to_distinct_locations() {
        let (store, _dir) = test_store().await;
        let a = FileLocation::new("logs", "worker-a.log");
        let b = FileLocation::new("logs", "worker-b.log");

        let (ra, rb) = tokio::join!(
            store.store(StoreRequest::new(
                a.clone(),
                ByteSource::from_bytes(vec![b'a'; 4096]),
            )),
            store.store(StoreRequest::new(
                b.clone(),
                ByteSource::from_bytes(vec![b'b'; 8192]),
            )),
        );
        ra.unwrap();
        rb.unwrap();

        assert_eq!(store.fetch_meta(&a).await.unwrap().unwrap().length, 4096);
        assert_eq!(store.fetch_meta(&b).await.unwrap().unwrap().length, 8192);
    }

    #[tokio::test]
    async fn test_unique_constraint_rejects_duplicate_rows() {
        let (store, _dir) = test_store().await;
        let insert = "INSERT INTO oms_dfs_store \
            (bucket_name, data_key, data, data_length, meta, gmt_create, gmt_modified) \
            VALUES (?, ?, ?, ?, ?, ?, ?)";
        let now = Utc::now().timestamp_millis();

        for attempt in 0..2 {
            let result = sqlx::query(insert)
                .bind("logs")
                .bind("dup.log")
                .bind(b"payload".to_vec())
                .bind(7_i64)
                .bind("{}")
                .bind(now)
                .bind(now)
                .execute(&store.pool)
                .await;
            if attempt == 0 {
                result.unwrap();
            } else {
                let err = result.unwrap_err();
                assert!(is_unique_violation(&err));
            }
        }
    }

    #[tokio::test]
    async fn test_schema_provisioning_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = connect_store(&dir).await;
        let location = FileLocation::new("logs", "survivor.log");
        put(&store, &location, b"keep me").await;

        ensure_schema(&store.pool, Dialect::Unknown, "oms_dfs_store")
            .await
            .unwrap();

        // A second connect against the same database re-runs provisioning.
        let again = connect_store(&dir).await;
        assert!(again.fetch_meta(&location).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_closes_pool() {
        let (store, _dir) = test_store().await;
        store.shutdown().await;
        assert!(store.pool.is_closed());
    }

    async fn store_through_seam<S: BlobStore>(
        store: &S,
        request: StoreRequest,
    ) -> std::result::Result<(), S::Error> {
        store.store(request).await
    }

    #[tokio::test]
    async fn test_store_usable_through_the_seam() {
        let (store, _dir) = test_store().await;
        let location = FileLocation::new("logs", "via-trait.log");
        store_through_seam(
            &store,
            StoreRequest::new(location.clone(), ByteSource::from_bytes(b"abc".to_vec())),
        )
        .await
        .unwrap();
        assert_eq!(store.fetch_meta(&location).await.unwrap().unwrap().length, 3);
    }
}
