//! File state watcher for log tailing.
//!
//! Tells a reader when a single file was appended to, truncated, or
//! deleted. Push events from the OS are merged with a periodic stat so a
//! missed or coalesced event never leaves the reader stuck.
//!
//! # Architecture
//!
//! ```text
//! WatchRegistry
//!   - Single notify::RecommendedWatcher
//!   - One OS watch per directory/file, reference counted
//!   - Routes events to subscriptions by path
//!         |
//!    +----------------+
//!    |                |
//! block_until_exists  watch_changes
//! (parent dir watch)  (file watch + poll timer)
//!                          |
//!                    ReconcileState
//!                          |
//!                     FileChanges ---> ChangeSignals (reader)
//! ```

mod changes;
mod error;
mod event;
mod platform;
mod reconcile;
mod registry;
mod stat;

pub use changes::{Change, ChangeSignals, DEFAULT_GRACE_PERIOD, FileChanges, SessionEnd};
pub use error::WatchError;
pub use event::{FileEvent, FileEventKind};
pub use platform::PlatformBehavior;
pub use reconcile::{
    DEFAULT_POLL_INTERVAL, FatalHandler, FileWatcher, FileWatcherBuilder, ReconcileState,
    Transition, WaitOutcome, exit_on_fatal,
};
pub use registry::{Subscription, WatchBackend, WatchKind, WatchRegistry};
pub use stat::{FileIdentity, FileStat};
