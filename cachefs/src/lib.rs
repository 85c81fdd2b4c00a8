//! A cache-backed virtual file system that lets a POSIX-expecting storage
//! engine operate against an S3-compatible object store: a bounded local
//! 2Q disk cache absorbs reads and writes, and a background scheduler
//! write-back evicted or closed files to the object store.
//!
//! The concrete object store client lives in the sibling `cachefs-s3`
//! crate; this crate is generic over the [`object_store::ObjectStore`]
//! trait so it can be exercised against an in-memory double in tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod object_store;
pub mod path;
pub mod uploader;
pub mod vfs;
pub mod wbs;

pub use catalog::CacheCatalog;
pub use config::CfsConfig;
pub use error::{CatalogError, CfsError, ObjectStoreError, Result};
pub use object_store::ObjectStore;
pub use path::LogicalPath;
pub use uploader::Uploader;
pub use vfs::{Cfs, FileLock, FileStat, Vfs, VfsFile};
pub use wbs::WriteBackScheduler;
