//! Per-platform meaning of stat results, resolved once at startup.
//!
//! Different hosts report "the file you hold open was deleted" in different
//! ways. Windows refuses access to a path whose file is pending deletion
//! while a handle is still open, so `PermissionDenied` means gone there.
//! Unix keeps the inode alive for the open handle and reports a link count
//! of zero instead.

use std::io;
use std::sync::OnceLock;

use super::stat::FileStat;

/// Capability table entry for one operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformBehavior {
    pub os: &'static str,
    /// `PermissionDenied` from a path stat means the file was deleted while open.
    pub permission_denied_means_deleted: bool,
    /// A handle stat with zero links means the file was unlinked while open.
    pub zero_links_means_deleted: bool,
}

const TABLE: &[PlatformBehavior] = &[
    PlatformBehavior {
        os: "windows",
        permission_denied_means_deleted: true,
        zero_links_means_deleted: false,
    },
    PlatformBehavior {
        os: "linux",
        permission_denied_means_deleted: false,
        zero_links_means_deleted: true,
    },
    PlatformBehavior {
        os: "macos",
        permission_denied_means_deleted: false,
        zero_links_means_deleted: true,
    },
    PlatformBehavior {
        os: "freebsd",
        permission_denied_means_deleted: false,
        zero_links_means_deleted: true,
    },
];

const FALLBACK: PlatformBehavior = PlatformBehavior {
    os: "unknown",
    permission_denied_means_deleted: false,
    zero_links_means_deleted: false,
};

static CURRENT: OnceLock<PlatformBehavior> = OnceLock::new();

impl PlatformBehavior {
    /// Look up the behavior for an OS name as reported by `std::env::consts::OS`.
    pub fn for_os(os: &str) -> PlatformBehavior {
        TABLE
            .iter()
            .find(|entry| entry.os == os)
            .copied()
            .unwrap_or(FALLBACK)
    }

    /// Behavior of the host we are running on.
    pub fn current() -> PlatformBehavior {
        *CURRENT.get_or_init(|| {
            let behavior = Self::for_os(std::env::consts::OS);
            tracing::debug!("[platform] stat behavior: {behavior:?}");
            behavior
        })
    }

    /// Does a stat error on the watched path mean the file is gone?
    pub fn stat_error_means_gone(&self, err: &io::Error) -> bool {
        match err.kind() {
            io::ErrorKind::NotFound => true,
            io::ErrorKind::PermissionDenied => self.permission_denied_means_deleted,
            _ => false,
        }
    }

    /// Does a successful handle stat still describe a file that was unlinked?
    pub fn handle_stat_means_gone(&self, stat: &FileStat) -> bool {
        self.zero_links_means_deleted && stat.links == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::stat::FileIdentity;

    fn stat_with_links(links: Option<u64>) -> FileStat {
        FileStat {
            identity: FileIdentity {
                device: 1,
                inode: 2,
            },
            size: 0,
            modified: None,
            links,
        }
    }

    #[test]
    fn test_not_found_always_means_gone() {
        for os in ["windows", "linux", "macos", "plan9"] {
            let behavior = PlatformBehavior::for_os(os);
            let err = io::Error::from(io::ErrorKind::NotFound);
            assert!(behavior.stat_error_means_gone(&err), "{os}");
        }
    }

    #[test]
    fn test_permission_denied_only_on_windows() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(PlatformBehavior::for_os("windows").stat_error_means_gone(&err));
        assert!(!PlatformBehavior::for_os("linux").stat_error_means_gone(&err));
        assert!(!PlatformBehavior::for_os("macos").stat_error_means_gone(&err));
    }

    #[test]
    fn test_other_errors_are_not_gone() {
        let err = io::Error::other("disk on fire");
        assert!(!PlatformBehavior::for_os("windows").stat_error_means_gone(&err));
        assert!(!PlatformBehavior::for_os("linux").stat_error_means_gone(&err));
    }

    #[test]
    fn test_zero_links() {
        let linux = PlatformBehavior::for_os("linux");
        assert!(linux.handle_stat_means_gone(&stat_with_links(Some(0))));
        assert!(!linux.handle_stat_means_gone(&stat_with_links(Some(1))));
        assert!(!linux.handle_stat_means_gone(&stat_with_links(None)));

        let windows = PlatformBehavior::for_os("windows");
        assert!(!windows.handle_stat_means_gone(&stat_with_links(Some(0))));
    }

    #[test]
    fn test_unknown_os_falls_back() {
        assert_eq!(PlatformBehavior::for_os("plan9"), FALLBACK);
        assert_eq!(
            PlatformBehavior::current().os,
            PlatformBehavior::for_os(std::env::consts::OS).os
        );
    }
}
