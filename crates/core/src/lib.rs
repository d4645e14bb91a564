//! Abstractions for rowstore blob backends.
//!
//! This crate defines the value types and the [`BlobStore`] seam that a
//! scheduler uses to persist job artifacts and logs, independent of the
//! backend that actually holds the bytes. Backends (such as the SQL-row
//! store in `rowstore-sql`) implement [`BlobStore`] against these types.
//!
//! Binary transfer is modeled as abstract byte-stream capabilities
//! ([`ByteSource`], [`ByteSink`]) rather than concrete file handles, so
//! store logic stays agnostic to where bytes come from or go to.

mod location;
mod meta;
mod store;
mod transfer;

pub use location::FileLocation;
pub use meta::FileMeta;
pub use store::{BlobStore, DownloadRequest, StoreRequest};
pub use transfer::{ByteSink, ByteSource};
