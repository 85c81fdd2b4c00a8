use std::fmt;

use crate::error::CfsError;

/// A validated `bucket/object` identifier.
///
/// The first segment names a bucket in the object store and a directory in
/// the local cache; the rest of the string is an opaque object key and may
/// itself contain `/`. Operations other than removal assume exactly two
/// top-level segments (see [`LogicalPath::extra_segments`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPath(String);

impl LogicalPath {
    pub fn new(path: impl Into<String>) -> Result<Self, CfsError> {
        let path = path.into();
        let mut parts = path.splitn(2, '/');
        let bucket = parts.next().unwrap_or("");
        let key = parts.next().unwrap_or("");
        if bucket.is_empty() || key.is_empty() {
            return Err(CfsError::InvalidPath { path });
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bucket(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    /// Everything after the first `/`, i.e. the object key.
    pub fn key(&self) -> &str {
        &self.0[self.bucket().len() + 1..]
    }

    pub fn join(bucket: &str, key: &str) -> Self {
        Self(format!("{bucket}/{key}"))
    }

    /// `true` if the object key itself contains further `/` separators,
    /// meaning this path has more than the two segments most operations
    /// assume. `remove_all` routes these to a single-object `remove`.
    pub fn has_extra_segments(&self) -> bool {
        self.key().contains('/')
    }

    pub fn is_sst(&self) -> bool {
        self.0.rsplit('.').next() == Some("sst")
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for LogicalPath {
    type Error = CfsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = CfsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_bucket_and_key() {
        let p = LogicalPath::new("bucket/a/b.sst").unwrap();
        assert_eq!(p.bucket(), "bucket");
        assert_eq!(p.key(), "a/b.sst");
        assert!(p.has_extra_segments());
        assert!(p.is_sst());
    }

    #[test]
    fn rejects_missing_segments() {
        assert!(LogicalPath::new("bucket").is_err());
        assert!(LogicalPath::new("/key").is_err());
        assert!(LogicalPath::new("bucket/").is_err());
    }

    #[test]
    fn non_sst_suffix() {
        let p = LogicalPath::new("bucket/MANIFEST-000001").unwrap();
        assert!(!p.is_sst());
    }
}
