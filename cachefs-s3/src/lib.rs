//! A concrete [`cachefs::ObjectStore`] backend for real S3-compatible
//! endpoints, presigning requests with `rusty-s3` the same way the
//! teacher's own `infinitree-backends::S3` backend does for its
//! content-addressed object store.

mod region;
mod s3;

pub use region::Region;
pub use s3::S3ObjectStore;
