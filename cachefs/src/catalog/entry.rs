use std::fs::File;
use std::path::PathBuf;

use super::queue::Link;
use crate::path::LogicalPath;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residency {
    Hot,
    Cold,
}

/// Per-file catalog state. Stored in the [`super::arena::Arena`]; queues
/// hold only [`super::arena::Key`]s, so this struct carries the actual
/// intrusive links for both the hot and cold queue.
pub struct CacheEntry {
    pub logical_path: LogicalPath,
    pub disk_path: PathBuf,
    pub size_on_disk: u64,
    pub append_buffer: Vec<u8>,
    pub dirty: bool,
    pub open_handle: Option<File>,
    pub residency: Residency,

    pub hot_link: Link,
    pub cold_link: Link,
    /// `true` while this entry has a back-pointer into the hot queue,
    /// independent of `residency` — a cold entry can be ghost-linked into
    /// the hot queue without being promoted.
    pub in_hot: bool,
    pub in_cold: bool,
}

impl CacheEntry {
    pub fn new(logical_path: LogicalPath, disk_path: PathBuf) -> Self {
        Self {
            logical_path,
            disk_path,
            size_on_disk: 0,
            append_buffer: Vec::new(),
            dirty: true,
            open_handle: None,
            residency: Residency::Hot,
            hot_link: Link::default(),
            cold_link: Link::default(),
            in_hot: false,
            in_cold: false,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.size_on_disk + self.append_buffer.len() as u64
    }

    pub fn hot_link(e: &mut CacheEntry) -> &mut Link {
        &mut e.hot_link
    }

    pub fn cold_link(e: &mut CacheEntry) -> &mut Link {
        &mut e.cold_link
    }
}
