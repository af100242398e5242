//! Reconciliation of push events and stat polling for one watched file.
//!
//! A session merges two sources of truth:
//!
//! ```text
//!   Subscription (notify events) ---+
//!                                   +--> ReconcileState --> FileChanges
//!   poll interval (path re-stat) ---+
//! ```
//!
//! Events are preferred because they are immediate; the poll timer only
//! covers for an event source that went quiet or missed something. Each
//! iteration handles exactly one of: cancellation, an event, a timer tick.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::fs::File;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::changes::{ChangeSignals, DEFAULT_GRACE_PERIOD, FileChanges, SessionEnd};
use super::error::WatchError;
use super::event::{FileEvent, FileEventKind};
use super::platform::PlatformBehavior;
use super::registry::{Subscription, WatchRegistry};
use super::stat::{FileIdentity, FileStat};
use crate::config::WatchConfig;

/// Default interval of the stat fallback.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Callback for unrecoverable stat failures.
pub type FatalHandler = Arc<dyn Fn(&WatchError) + Send + Sync>;

/// Default fatal handler: log and terminate the process.
pub fn exit_on_fatal() -> FatalHandler {
    Arc::new(|err: &WatchError| {
        tracing::error!("[watcher] fatal: {err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    })
}

/// Result of [`FileWatcher::block_until_exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exists,
    Cancelled,
}

/// Classification of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Modified,
    Truncated,
    Deleted,
}

/// What the event path should do with a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventAction {
    Deleted,
    Restat,
    Ignore,
}

fn event_action(kind: FileEventKind) -> EventAction {
    match kind {
        FileEventKind::Remove | FileEventKind::Rename => EventAction::Deleted,
        // Unlinking an open file only changes its link count, so attribute
        // changes get the same stat comparison as writes
        FileEventKind::Metadata | FileEventKind::Write => EventAction::Restat,
        FileEventKind::Create => EventAction::Ignore,
    }
}

/// Per-session comparison state. Only the reconciliation task writes it.
#[derive(Debug, Clone)]
pub struct ReconcileState {
    pub event_size: u64,
    pub poll_size: u64,
    pub mod_time: Option<SystemTime>,
    pub identity: FileIdentity,
    platform: PlatformBehavior,
}

impl ReconcileState {
    /// Seed from the initial snapshot. Sizes start at the reader's offset.
    pub fn new(initial: &FileStat, start_offset: u64, platform: PlatformBehavior) -> Self {
        Self {
            event_size: start_offset,
            poll_size: start_offset,
            mod_time: initial.modified,
            identity: initial.identity,
            platform,
        }
    }

    /// Classify a re-stat of the watched path (timer path).
    ///
    /// Returns the stat error back when it does not mean "gone".
    pub fn on_poll(&mut self, stat: io::Result<FileStat>) -> io::Result<Transition> {
        let stat = match stat {
            Ok(stat) => stat,
            Err(e) if self.platform.stat_error_means_gone(&e) => return Ok(Transition::Deleted),
            Err(e) => return Err(e),
        };

        if stat.identity != self.identity {
            return Ok(Transition::Deleted);
        }

        if stat.size < self.poll_size {
            self.poll_size = stat.size;
            return Ok(Transition::Truncated);
        }
        if stat.size > self.poll_size {
            self.poll_size = stat.size;
            return Ok(Transition::Modified);
        }

        if stat.modified != self.mod_time {
            self.mod_time = stat.modified;
            return Ok(Transition::Modified);
        }

        Ok(Transition::Unchanged)
    }

    /// Classify a stat of the open handle after a write or metadata event.
    pub fn on_handle_stat(&mut self, stat: io::Result<FileStat>) -> io::Result<Transition> {
        let stat = match stat {
            Ok(stat) => stat,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Transition::Deleted),
            Err(e) => return Err(e),
        };

        if self.platform.handle_stat_means_gone(&stat) {
            return Ok(Transition::Deleted);
        }

        let transition = if stat.size < self.event_size {
            Transition::Truncated
        } else {
            Transition::Modified
        };
        self.event_size = stat.size;
        Ok(transition)
    }
}

/// Watches one file path on behalf of a tailing reader.
pub struct FileWatcher {
    path: PathBuf,
    registry: Arc<WatchRegistry>,
    poll_interval: Duration,
    grace_period: Duration,
    platform: PlatformBehavior,
    on_fatal: FatalHandler,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("path", &self.path)
            .field("poll_interval", &self.poll_interval)
            .field("grace_period", &self.grace_period)
            .field("platform", &self.platform.os)
            .finish()
    }
}

impl FileWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> FileWatcherBuilder {
        FileWatcherBuilder::new()
    }

    /// The cleaned absolute path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the watched path exists.
    ///
    /// The create watch is registered before the existence check, so a file
    /// created in between is caught either by the check or by its event.
    pub async fn block_until_exists(
        &self,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, WatchError> {
        let mut subscription = self.registry.watch_create(&self.path)?;
        let outcome = self.wait_for_create(&mut subscription, cancel).await;
        subscription.unsubscribe();
        outcome
    }

    async fn wait_for_create(
        &self,
        subscription: &mut Subscription,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, WatchError> {
        if self.exists().await? {
            return Ok(WaitOutcome::Exists);
        }

        crate::debug_event!("watcher", "waiting for", "{}", self.path.display());
        let expected = subscription.path().to_path_buf();
        let mut ticker = poll_ticker(self.poll_interval);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),

                event = subscription.recv() => match event {
                    None => return Err(WatchError::EventSourceClosed),
                    Some(event) if event.kind == FileEventKind::Create && event.path == expected => {
                        crate::debug_event!("watcher", "created", "{}", self.path.display());
                        return Ok(WaitOutcome::Exists);
                    }
                    Some(_) => {}
                },

                _ = ticker.tick() => {
                    if self.exists().await? {
                        crate::debug_event!("watcher", "found by poll", "{}", self.path.display());
                        return Ok(WaitOutcome::Exists);
                    }
                }
            }
        }
    }

    async fn exists(&self) -> Result<bool, WatchError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(WatchError::Stat {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Start a reconciliation session and return its change signals.
    ///
    /// `start_offset` is the reader's current position; growth and
    /// truncation are measured against it.
    pub async fn watch_changes(
        &self,
        start_offset: u64,
        cancel: CancellationToken,
    ) -> Result<ChangeSignals, WatchError> {
        let file = File::open(&self.path)
            .await
            .map_err(|source| WatchError::Open {
                path: self.path.clone(),
                source,
            })?;
        let metadata = file.metadata().await.map_err(|source| WatchError::Stat {
            path: self.path.clone(),
            source,
        })?;
        let initial = FileStat::from(&metadata);

        let subscription = self.registry.watch_content(&self.path)?;
        let (changes, mut signals) = FileChanges::channel(self.grace_period);

        let session = Session {
            path: self.path.clone(),
            file,
            subscription,
            changes,
            state: ReconcileState::new(&initial, start_offset, self.platform),
            poll_interval: self.poll_interval,
            on_fatal: Arc::clone(&self.on_fatal),
            cancel,
        };

        crate::log_event!(
            "watcher",
            "watching",
            "{} from offset {start_offset}",
            self.path.display()
        );
        signals.attach(tokio::spawn(session.run()));
        Ok(signals)
    }
}

/// Background task state for one `watch_changes` call.
struct Session {
    path: PathBuf,
    file: File,
    subscription: Subscription,
    changes: FileChanges,
    state: ReconcileState,
    poll_interval: Duration,
    on_fatal: FatalHandler,
    cancel: CancellationToken,
}

impl Session {
    async fn run(mut self) -> Result<SessionEnd, WatchError> {
        let result = self.reconcile().await;
        self.subscription.unsubscribe();

        match &result {
            Ok(end) => crate::log_event!("watcher", "stopped", "{}: {end:?}", self.path.display()),
            Err(e) => tracing::warn!("[watcher] stopped {}: {e}", self.path.display()),
        }
        result
    }

    async fn reconcile(&mut self) -> Result<SessionEnd, WatchError> {
        let mut ticker = poll_ticker(self.poll_interval);

        loop {
            let transition = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),

                event = self.subscription.recv() => match event {
                    Some(event) => self.on_event(event).await?,
                    None => return Err(WatchError::EventSourceClosed),
                },

                _ = ticker.tick() => self.on_tick().await?,
            };

            match transition {
                Transition::Unchanged => {}
                Transition::Modified => {
                    crate::debug_event!("watcher", "modified", "{}", self.path.display());
                    self.changes.notify_modified();
                }
                Transition::Truncated => {
                    crate::debug_event!("watcher", "truncated", "{}", self.path.display());
                    self.changes.notify_truncated().await;
                }
                Transition::Deleted => {
                    crate::debug_event!("watcher", "deleted", "{}", self.path.display());
                    self.subscription.unsubscribe();
                    self.changes.notify_deleted().await;
                    return Ok(SessionEnd::Deleted);
                }
            }
        }
    }

    async fn on_event(&mut self, event: FileEvent) -> Result<Transition, WatchError> {
        match event_action(event.kind) {
            EventAction::Deleted => Ok(Transition::Deleted),
            EventAction::Ignore => Ok(Transition::Unchanged),
            EventAction::Restat => {
                // Stat the handle, not the path: the path may already name a new file
                let stat = self.file.metadata().await.map(|m| FileStat::from(&m));
                let result = self.state.on_handle_stat(stat);
                escalate(&self.path, &self.on_fatal, result)
            }
        }
    }

    async fn on_tick(&mut self) -> Result<Transition, WatchError> {
        let stat = tokio::fs::metadata(&self.path)
            .await
            .map(|m| FileStat::from(&m));
        let result = self.state.on_poll(stat);
        escalate(&self.path, &self.on_fatal, result)
    }
}

/// Route an unexpected stat failure through the fatal handler.
fn escalate(
    path: &Path,
    on_fatal: &FatalHandler,
    result: io::Result<Transition>,
) -> Result<Transition, WatchError> {
    result.map_err(|source| {
        let err = WatchError::Stat {
            path: path.to_path_buf(),
            source,
        };
        on_fatal(&err);
        err
    })
}

/// Interval whose first tick is one period out, like a plain ticker.
fn poll_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Builder for constructing a FileWatcher.
pub struct FileWatcherBuilder {
    registry: Option<Arc<WatchRegistry>>,
    poll_interval: Duration,
    grace_period: Duration,
    platform: Option<PlatformBehavior>,
    on_fatal: Option<FatalHandler>,
}

impl FileWatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            registry: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            platform: None,
            on_fatal: None,
        }
    }

    /// Set the shared watch registry.
    pub fn registry(mut self, registry: Arc<WatchRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Take poll interval and grace period from configuration.
    pub fn config(mut self, config: &WatchConfig) -> Self {
        self.poll_interval = Duration::from_millis(config.poll_interval_ms);
        self.grace_period = Duration::from_millis(config.grace_period_ms);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Override the platform behavior table entry.
    pub fn platform(mut self, platform: PlatformBehavior) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Replace the handler for unrecoverable stat failures.
    pub fn on_fatal(mut self, handler: FatalHandler) -> Self {
        self.on_fatal = Some(handler);
        self
    }

    /// Build the FileWatcher for `path`.
    pub fn build(self, path: impl AsRef<Path>) -> Result<FileWatcher, WatchError> {
        let registry = self.registry.ok_or_else(|| WatchError::InitFailed {
            reason: "Registry is required".to_string(),
        })?;

        if self.poll_interval.is_zero() {
            return Err(WatchError::InitFailed {
                reason: "Poll interval must be greater than zero".to_string(),
            });
        }

        let raw = path.as_ref();
        let cleaned = crate::utils::clean_path(raw).map_err(|e| WatchError::InvalidPath {
            path: raw.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = crate::utils::resolve_parent(&cleaned);

        Ok(FileWatcher {
            path,
            registry,
            poll_interval: self.poll_interval,
            grace_period: self.grace_period,
            platform: self.platform.unwrap_or_else(PlatformBehavior::current),
            on_fatal: self.on_fatal.unwrap_or_else(exit_on_fatal),
        })
    }
}

impl Default for FileWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
