use std::fmt;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Table backing the store unless configured otherwise.
pub const DEFAULT_TABLE_NAME: &str = "oms_dfs_store";

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_min_idle() -> u32 {
    2
}

fn default_max_pool_size() -> u32 {
    16
}

/// Connection settings for the SQL-row blob store.
///
/// `url`, `username`, and `password` are required; everything else has a
/// default. The embedding scheduler deserializes this from its own
/// configuration file.
#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    /// Connection string. The URL scheme selects the driver; a
    /// `productName` query parameter declares the server's SQL dialect.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Name of the table holding blob rows.
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Provision the backing table at startup if it is missing.
    #[serde(default)]
    pub auto_create_table: bool,
    /// Idle connections kept warm in the pool.
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    /// Upper bound on pooled connections.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            table_name: default_table_name(),
            auto_create_table: false,
            min_idle: default_min_idle(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required property `{0}` is missing")]
    MissingProperty(&'static str),

    #[error("invalid connection url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid table name `{0}`")]
    InvalidTableName(String),
}

impl StoreConfig {
    /// Check that every required property is present and well-formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connect_url().map(|_| ())
    }

    /// Check required properties and assemble the credentialed connection
    /// URL handed to the driver.
    pub(crate) fn connect_url(&self) -> Result<Url, ConfigError> {
        let raw = require("url", self.url.as_deref())?;
        let username = require("username", self.username.as_deref())?;
        let password = require("password", self.password.as_deref())?;

        // The table name is interpolated into SQL, so it is restricted to
        // identifier characters.
        if self.table_name.is_empty()
            || !self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }

        let mut url = Url::parse(raw)?;
        if url.set_username(username).is_err() || url.set_password(Some(password)).is_err() {
            // Hostless URLs (file-backed databases) cannot carry inline
            // credentials; the driver ignores them anyway.
            debug!("connection url does not accept inline credentials");
        }
        Ok(url)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("table_name", &self.table_name)
            .field("auto_create_table", &self.auto_create_table)
            .field("min_idle", &self.min_idle)
            .field("max_pool_size", &self.max_pool_size)
            .finish()
    }
}

fn require<'a>(key: &'static str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingProperty(key)),
    }
}
