//! The object store seam: a synchronous trait bridging into an async S3
//! client, mirroring how the reference cache treats its storage backend as
//! a plain, blocking interface regardless of what sits behind it.

use std::sync::Arc;

use crate::config::BucketAcl;
use crate::error::ObjectStoreError;

pub type Result<T> = std::result::Result<T, ObjectStoreError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_length: u64,
}

/// A blocking object store client. Implementations that talk to a remote
/// service (see `cachefs-s3`) are expected to bridge into their async
/// transport internally rather than exposing `async fn` here, so that the
/// write-back scheduler and the VFS adapter can treat every backend the
/// same way regardless of transport.
pub trait ObjectStore: Send + Sync {
    fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// `range` is an inclusive `(start, end)` byte range; `None` fetches the
    /// whole object.
    fn get(&self, bucket: &str, key: &str, range: Option<(u64, u64)>) -> Result<Vec<u8>>;
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta>;
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Lists one page of keys in `bucket`, continuing from `marker` if
    /// given. Returns the page and, if the listing was truncated, a marker
    /// to pass on the next call — mirrors the original's marker-based
    /// `ListObjects` pagination rather than returning everything at once,
    /// since a bucket can have far more keys than fit in one response.
    fn list(&self, bucket: &str, marker: Option<&str>) -> Result<(Vec<String>, Option<String>)>;

    /// Collects every key in `bucket` by following `list`'s `next_marker`
    /// until a page reports none, the way the original's `List`/`RemoveAll`
    /// loop on `ListObjects(oss.Marker(marker))` until `!IsTruncated`.
    fn list_all(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let (mut page, next_marker) = self.list(bucket, marker.as_deref())?;
            keys.append(&mut page);
            match next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(keys)
    }

    fn create_bucket(&self, bucket: &str, acl: BucketAcl) -> Result<()>;
    fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

/// Lets an `Arc<S>` stand in for `S` wherever an `ObjectStore` is expected,
/// so the same store handle can be shared between the write-back scheduler
/// and the VFS adapter.
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        (**self).put(bucket, key, data)
    }

    fn get(&self, bucket: &str, key: &str, range: Option<(u64, u64)>) -> Result<Vec<u8>> {
        (**self).get(bucket, key, range)
    }

    fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        (**self).head(bucket, key)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        (**self).delete(bucket, key)
    }

    fn list(&self, bucket: &str, marker: Option<&str>) -> Result<(Vec<String>, Option<String>)> {
        (**self).list(bucket, marker)
    }

    fn create_bucket(&self, bucket: &str, acl: BucketAcl) -> Result<()> {
        (**self).create_bucket(bucket, acl)
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        (**self).delete_bucket(bucket)
    }
}

#[cfg(any(test, feature = "test"))]
pub mod test {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// An in-memory [`ObjectStore`] double, grounded in the reference
    /// cache's own in-memory backend test double: good enough to exercise
    /// the catalog and write-back scheduler without a network.
    #[derive(Default)]
    pub struct InMemoryObjectStore {
        buckets: Mutex<HashSet<String>>,
        objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_bucket(bucket: impl Into<String>) -> Self {
            let store = Self::default();
            store.buckets.lock().unwrap().insert(bucket.into());
            store
        }

        pub fn object_count(&self) -> usize {
            self.objects.lock().unwrap().len()
        }
    }

    impl ObjectStore for InMemoryObjectStore {
        fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
            if !self.buckets.lock().unwrap().contains(bucket) {
                return Err(ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), data);
            Ok(())
        }

        fn get(&self, bucket: &str, key: &str, range: Option<(u64, u64)>) -> Result<Vec<u8>> {
            let data = self
                .objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?;
            match range {
                Some((start, end)) => {
                    let start = (start as usize).min(data.len());
                    let end = ((end as usize) + 1).min(data.len());
                    Ok(data.get(start..end).map(<[u8]>::to_vec).unwrap_or_default())
                }
                None => Ok(data),
            }
        }

        fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .map(|data| ObjectMeta {
                    content_length: data.len() as u64,
                })
                .ok_or_else(|| ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }

        fn delete(&self, bucket: &str, key: &str) -> Result<()> {
            self.objects
                .lock()
                .unwrap()
                .remove(&(bucket.to_string(), key.to_string()));
            Ok(())
        }

        fn list(&self, bucket: &str, _marker: Option<&str>) -> Result<(Vec<String>, Option<String>)> {
            // a single in-memory page is never truncated.
            let keys = self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .collect();
            Ok((keys, None))
        }

        fn create_bucket(&self, bucket: &str, _acl: BucketAcl) -> Result<()> {
            let mut buckets = self.buckets.lock().unwrap();
            if !buckets.insert(bucket.to_string()) {
                return Err(ObjectStoreError::Conflict {
                    bucket: bucket.to_string(),
                });
            }
            Ok(())
        }

        fn delete_bucket(&self, bucket: &str) -> Result<()> {
            self.buckets.lock().unwrap().remove(bucket);
            Ok(())
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = InMemoryObjectStore::with_bucket("b");
        store.put("b", "k", vec![1, 2, 3]).unwrap();
        assert_eq!(store.get("b", "k", None).unwrap(), vec![1, 2, 3]);
        assert_eq!(store.get("b", "k", Some((1, 2))).unwrap(), vec![2, 3]);
        assert_eq!(store.head("b", "k").unwrap().content_length, 3);
    }

    #[test]
    fn put_without_bucket_is_not_found() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.put("missing", "k", vec![]),
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[test]
    fn create_bucket_twice_conflicts() {
        let store = InMemoryObjectStore::new();
        store.create_bucket("b", BucketAcl::Private).unwrap();
        assert!(matches!(
            store.create_bucket("b", BucketAcl::Private),
            Err(ObjectStoreError::Conflict { .. })
        ));
    }
}
