use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Size, in bytes, at which a cached file's in-memory append buffer is
/// flushed to its backing disk file.
pub const FLUSH_SIZE: u64 = 1024 * 1024;

/// The cold queue is sized to `limit / COLD_MULTIPLES`.
pub const COLD_MULTIPLES: u64 = 1024;

/// Base delay for the write-back scheduler's exponential retry backoff.
pub const RETRY_BACKOFF_BASE_MS: u64 = 200;

/// Ceiling for the write-back scheduler's exponential retry backoff.
pub const RETRY_BACKOFF_CAP_MS: u64 = 30_000;

/// Canned ACL applied when a bucket is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketAcl {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
}

/// Configuration recognized by the cache catalog and the S3-compatible
/// object store client. Deserializable from TOML (or any other `serde`
/// format the embedding application prefers).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CfsConfig {
    /// Total on-disk budget for the cache, in bytes.
    pub cache_size: u64,
    /// Root path for the local cache.
    pub cache_dir: PathBuf,

    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub access_key_secret: String,

    #[serde(default)]
    pub acl: BucketAcl,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_flush_size")]
    pub flush_size: u64,

    #[serde(default = "default_cold_multiples")]
    pub cold_multiples: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_flush_size() -> u64 {
    FLUSH_SIZE
}

fn default_cold_multiples() -> u64 {
    COLD_MULTIPLES
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let toml = r#"
            cache_size = 1073741824
            cache_dir = "/var/lib/cfs"
            endpoint = "https://s3.example.com"
            region = "us-east-1"
            access_key_id = "AKIA"
            access_key_secret = "secret"
        "#;
        let cfg: CfsConfig = toml::from_str(toml).expect("should deserialize with defaults");
        assert_eq!(cfg.flush_size, FLUSH_SIZE);
        assert_eq!(cfg.cold_multiples, COLD_MULTIPLES);
        assert_eq!(cfg.acl, BucketAcl::Private);
        assert_eq!(cfg.request_timeout_secs, 30);
    }
}
