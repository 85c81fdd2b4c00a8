use std::io;

use thiserror::Error;

/// Errors surfaced by the [`crate::catalog::CacheCatalog`].
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
    #[error("no cache entry for {path}")]
    NotFound { path: String },
    #[error("invalid logical path: {path}")]
    InvalidPath { path: String },
}

/// Errors surfaced by an [`crate::object_store::ObjectStore`] implementation.
///
/// 403/404 responses collapse to `NotFound`, 409 to `Conflict`; everything
/// else is either `Transient` (worth retrying) or `Fatal`.
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("bucket already exists: {bucket}")]
    Conflict { bucket: String },
    #[error("transient object store error: {source}")]
    Transient { source: anyhow::Error },
    #[error("object store error: {source}")]
    Fatal { source: anyhow::Error },
}

impl ObjectStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectStoreError::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ObjectStoreError::Transient { .. })
    }
}

/// Top-level error type for the VFS adapter, composing the catalog and
/// object-store error hierarchies.
#[derive(Error, Debug)]
pub enum CfsError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error("invalid logical path: {path}")]
    InvalidPath { path: String },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

pub type Result<T, E = CfsError> = std::result::Result<T, E>;
