use rowstore_core::FileLocation;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the SQL-row blob store.
///
/// Maintenance paths (the pre-delete inside store and the expiry sweep)
/// log their failures and never surface them, so they do not appear here
/// as caller-visible outcomes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("schema provisioning failed: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("could not acquire a database connection: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("failed to store blob at {location}: {source}")]
    Store {
        location: FileLocation,
        #[source]
        source: sqlx::Error,
    },

    /// A concurrent writer won the race for this location; the uniqueness
    /// constraint rejected the losing insert.
    #[error("blob at {0} was stored concurrently")]
    Conflict(FileLocation),

    #[error("failed to read blob at {location}: {source}")]
    Download {
        location: FileLocation,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid metadata on blob at {location}: {source}")]
    Meta {
        location: FileLocation,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
