//! Plain-data stat snapshots compared by the reconciliation loop.

use std::fs::Metadata;
use std::time::SystemTime;

/// Stable handle to "the same underlying file", independent of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn of(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: meta.dev(),
            inode: meta.ino(),
        }
    }

    // Volume serial and file index are not exposed by stable std on Windows;
    // creation time is the closest stable stand-in.
    #[cfg(windows)]
    pub fn of(meta: &Metadata) -> Self {
        use std::os::windows::fs::MetadataExt;
        Self {
            device: 0,
            inode: meta.creation_time(),
        }
    }

    #[cfg(not(any(unix, windows)))]
    pub fn of(_meta: &Metadata) -> Self {
        Self {
            device: 0,
            inode: 0,
        }
    }
}

/// What the watcher remembers about a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub identity: FileIdentity,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Hard link count, where the platform reports one.
    pub links: Option<u64>,
}

impl From<&Metadata> for FileStat {
    fn from(meta: &Metadata) -> Self {
        Self {
            identity: FileIdentity::of(meta),
            size: meta.len(),
            modified: meta.modified().ok(),
            links: link_count(meta),
        }
    }
}

#[cfg(unix)]
fn link_count(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.nlink())
}

#[cfg(not(unix))]
fn link_count(_meta: &Metadata) -> Option<u64> {
    None
}
