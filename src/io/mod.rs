//! Object storage abstraction for locating and downloading source files

pub mod local_store;
pub mod object_store;
pub mod s3_store;
pub mod uri;

pub use local_store::LocalObjectStore;
pub use object_store::{ObjectStore, default_prefix, fetch_source_object};
pub use s3_store::S3ObjectStore;
pub use uri::SourceUri;
