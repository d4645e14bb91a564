use async_trait::async_trait;

use crate::location::FileLocation;
use crate::meta::FileMeta;
use crate::transfer::{ByteSink, ByteSource};

/// Request to persist a payload at a location, replacing any existing blob.
#[derive(Debug)]
pub struct StoreRequest {
    pub location: FileLocation,
    pub source: ByteSource,
}

impl StoreRequest {
    pub fn new(location: FileLocation, source: ByteSource) -> Self {
        Self { location, source }
    }
}

/// Request to stream a stored payload into a destination.
#[derive(Debug)]
pub struct DownloadRequest {
    pub location: FileLocation,
    pub target: ByteSink,
}

impl DownloadRequest {
    pub fn new(location: FileLocation, target: ByteSink) -> Self {
        Self { location, target }
    }
}

/// Storage seam for job artifacts and logs.
///
/// Implementations persist opaque payloads keyed by [`FileLocation`]. The
/// scheduler owns the store instance and calls [`shutdown`] once at
/// teardown; behavior of other operations after shutdown is undefined.
///
/// [`shutdown`]: BlobStore::shutdown
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist the request's payload at its location.
    ///
    /// A blob already stored at the location is replaced.
    async fn store(&self, request: StoreRequest) -> Result<(), Self::Error>;

    /// Stream a stored payload into the request's target.
    ///
    /// A missing record is not an error: the call returns `Ok(())` and the
    /// target is left untouched.
    async fn download(&self, request: DownloadRequest) -> Result<(), Self::Error>;

    /// Fetch the record's metadata without its payload.
    async fn fetch_meta(&self, location: &FileLocation) -> Result<Option<FileMeta>, Self::Error>;

    /// Best-effort removal of every blob in `bucket` last modified more
    /// than `days` days ago. Failures are logged by the implementation and
    /// never surfaced.
    async fn clean_expired_files(&self, bucket: &str, days: u32);

    /// Release the store's resources. Safe to call once at teardown.
    async fn shutdown(&self);
}
