//! Coalescing change signals shared between a watch session and its reader.
//!
//! Each signal kind is a capacity-one channel fed with `try_send`: a send
//! while a token is already pending is dropped, so the reader only learns
//! "at least one change of this kind happened" and never builds a backlog.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::WatchError;

/// Default pause between the `modified` token and a destructive token.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// A change observed by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// New data may be available.
    Modified,
    /// The file shrank; the reader should reopen or seek back.
    Truncated,
    /// The file was deleted, renamed away or replaced.
    Deleted,
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Modified => write!(f, "modified"),
            Change::Truncated => write!(f, "truncated"),
            Change::Deleted => write!(f, "deleted"),
        }
    }
}

/// How a reconciliation task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The watched file went away and a `Deleted` signal was sent.
    Deleted,
    /// The owner cancelled the session.
    Cancelled,
}

/// Producer half, owned by the reconciliation task.
#[derive(Debug)]
pub struct FileChanges {
    modified: mpsc::Sender<()>,
    truncated: mpsc::Sender<()>,
    deleted: mpsc::Sender<()>,
    grace: Duration,
}

impl FileChanges {
    /// Create a producer/consumer pair.
    ///
    /// `grace` is how long `notify_truncated` and `notify_deleted` wait after
    /// signalling `modified`, giving the reader a chance to drain bytes that
    /// were written before the cut.
    pub fn channel(grace: Duration) -> (FileChanges, ChangeSignals) {
        let (modified_tx, modified_rx) = mpsc::channel(1);
        let (truncated_tx, truncated_rx) = mpsc::channel(1);
        let (deleted_tx, deleted_rx) = mpsc::channel(1);

        let producer = FileChanges {
            modified: modified_tx,
            truncated: truncated_tx,
            deleted: deleted_tx,
            grace,
        };
        let consumer = ChangeSignals {
            modified: modified_rx,
            truncated: truncated_rx,
            deleted: deleted_rx,
            task: None,
        };
        (producer, consumer)
    }

    pub fn notify_modified(&self) {
        send_only_if_empty(&self.modified);
    }

    pub async fn notify_truncated(&self) {
        self.notify_modified();
        tokio::time::sleep(self.grace).await;
        send_only_if_empty(&self.truncated);
    }

    pub async fn notify_deleted(&self) {
        self.notify_modified();
        tokio::time::sleep(self.grace).await;
        send_only_if_empty(&self.deleted);
    }
}

/// Full channel means a token is already pending; a closed one means the
/// reader is gone. Either way there is nothing left to do.
fn send_only_if_empty(slot: &mpsc::Sender<()>) {
    let _ = slot.try_send(());
}

/// Consumer half, handed to the file reader.
#[derive(Debug)]
pub struct ChangeSignals {
    modified: mpsc::Receiver<()>,
    truncated: mpsc::Receiver<()>,
    deleted: mpsc::Receiver<()>,
    task: Option<JoinHandle<Result<SessionEnd, WatchError>>>,
}

impl ChangeSignals {
    pub(crate) fn attach(&mut self, task: JoinHandle<Result<SessionEnd, WatchError>>) {
        self.task = Some(task);
    }

    /// Check and clear the `modified` token without blocking.
    pub fn take_modified(&mut self) -> bool {
        self.modified.try_recv().is_ok()
    }

    /// Check and clear the `truncated` token without blocking.
    pub fn take_truncated(&mut self) -> bool {
        self.truncated.try_recv().is_ok()
    }

    /// Check and clear the `deleted` token without blocking.
    pub fn take_deleted(&mut self) -> bool {
        self.deleted.try_recv().is_ok()
    }

    /// Wait for the next pending change.
    ///
    /// When several tokens are pending, `Modified` wins over `Truncated`,
    /// which wins over `Deleted`, so a reader always gets to drain before it
    /// reacts to a destructive signal. Returns `None` once the session has
    /// ended and every token has been consumed.
    pub async fn changed(&mut self) -> Option<Change> {
        tokio::select! {
            biased;
            Some(()) = self.modified.recv() => Some(Change::Modified),
            Some(()) = self.truncated.recv() => Some(Change::Truncated),
            Some(()) = self.deleted.recv() => Some(Change::Deleted),
            else => None,
        }
    }

    /// Wait for the reconciliation task and report how it ended.
    ///
    /// Subsystem failures (`EventSourceClosed`) and fatal stat errors are
    /// surfaced here. Signals detached from any task report `Cancelled`.
    pub async fn finish(mut self) -> Result<SessionEnd, WatchError> {
        match self.task.take() {
            Some(task) => task.await.map_err(|e| WatchError::TaskFailed {
                reason: e.to_string(),
            })?,
            None => Ok(SessionEnd::Cancelled),
        }
    }
}
