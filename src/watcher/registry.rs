//! Reference-counted watch registry with per-path event fan-out.
//!
//! The host watcher is a single OS resource shared by every session in the
//! process. The registry keeps two tables:
//!
//! ```text
//! WatchRegistry
//!   handles: target path -> refcount     (guards backend.watch/unwatch)
//!   routes:  event path  -> subscribers  (fed from the notify callback)
//! ```
//!
//! A content watch registers the file itself; a create watch registers the
//! parent directory, because the file does not exist yet. The notify
//! callback only touches `routes`, so a session can unsubscribe (which
//! locks `handles`) without racing event delivery.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::error::WatchError;
use super::event::FileEvent;

/// OS-level watch primitive keyed by target path.
pub trait WatchBackend: Send {
    fn watch(&mut self, target: &Path) -> notify::Result<()>;
    fn unwatch(&mut self, target: &Path) -> notify::Result<()>;
}

impl WatchBackend for notify::RecommendedWatcher {
    fn watch(&mut self, target: &Path) -> notify::Result<()> {
        Watcher::watch(self, target, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, target: &Path) -> notify::Result<()> {
        Watcher::unwatch(self, target)
    }
}

/// What a subscription is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// Creation of a path that may not exist yet.
    Create,
    /// Changes to an existing file.
    Content,
}

struct HandleTable {
    backend: Box<dyn WatchBackend>,
    refcounts: HashMap<PathBuf, usize>,
}

impl HandleTable {
    fn acquire(&mut self, target: &Path) -> Result<(), WatchError> {
        let count = self.refcounts.get(target).copied().unwrap_or(0);
        if count == 0 {
            self.backend
                .watch(target)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: target.to_path_buf(),
                    reason: e.to_string(),
                })?;
            crate::debug_event!("registry", "watching", "{}", target.display());
        }
        self.refcounts.insert(target.to_path_buf(), count + 1);
        Ok(())
    }

    fn release(&mut self, target: &Path) {
        let Some(count) = self.refcounts.get_mut(target) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }

        self.refcounts.remove(target);
        // The OS may already have dropped the watch (inode gone), which is fine
        if let Err(e) = self.backend.unwatch(target) {
            crate::debug_event!("registry", "unwatch ignored", "{}: {e}", target.display());
        } else {
            crate::debug_event!("registry", "unwatched", "{}", target.display());
        }
    }
}

struct Route {
    id: u64,
    sender: mpsc::UnboundedSender<FileEvent>,
}

#[derive(Default)]
struct RouteTable {
    routes: HashMap<PathBuf, Vec<Route>>,
    next_id: u64,
    closed: bool,
}

impl RouteTable {
    fn deliver(&mut self, event: FileEvent) {
        let Some(routes) = self.routes.get_mut(&event.path) else {
            return;
        };
        // Drop routes whose receiver went away without unsubscribing
        routes.retain(|route| route.sender.send(event.clone()).is_ok());
        if routes.is_empty() {
            self.routes.remove(&event.path);
        }
    }

    fn remove(&mut self, path: &Path, id: u64) {
        if let Some(routes) = self.routes.get_mut(path) {
            routes.retain(|route| route.id != id);
            if routes.is_empty() {
                self.routes.remove(path);
            }
        }
    }
}

/// Shared registry of OS watches and per-path event subscribers.
pub struct WatchRegistry {
    handles: Mutex<HandleTable>,
    routes: Arc<Mutex<RouteTable>>,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("targets", &self.handles.lock().refcounts.len())
            .field("paths", &self.routes.lock().routes.len())
            .finish()
    }
}

impl WatchRegistry {
    /// Create a registry backed by the platform's recommended notify watcher.
    pub fn new() -> Result<Arc<Self>, WatchError> {
        let routes = Arc::new(Mutex::new(RouteTable::default()));
        let callback_routes = Arc::clone(&routes);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let mut table = callback_routes.lock();
                for file_event in FileEvent::from_notify(event) {
                    table.deliver(file_event);
                }
            }
            Err(e) => {
                tracing::error!("[registry] file watch error: {e}");
            }
        })?;

        Ok(Self::from_parts(Box::new(watcher), routes))
    }

    /// Create a registry over a custom backend. Events are fed with [`deliver`](Self::deliver).
    pub fn with_backend(backend: impl WatchBackend + 'static) -> Arc<Self> {
        Self::from_parts(Box::new(backend), Arc::new(Mutex::new(RouteTable::default())))
    }

    fn from_parts(backend: Box<dyn WatchBackend>, routes: Arc<Mutex<RouteTable>>) -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(HandleTable {
                backend,
                refcounts: HashMap::new(),
            }),
            routes,
        })
    }

    /// Subscribe to creation of `path`. The parent directory is registered.
    pub fn watch_create(self: &Arc<Self>, path: &Path) -> Result<Subscription, WatchError> {
        let target = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        self.subscribe(path, target, WatchKind::Create)
    }

    /// Subscribe to changes of the existing file at `path`.
    pub fn watch_content(self: &Arc<Self>, path: &Path) -> Result<Subscription, WatchError> {
        self.subscribe(path, path.to_path_buf(), WatchKind::Content)
    }

    fn subscribe(
        self: &Arc<Self>,
        path: &Path,
        target: PathBuf,
        kind: WatchKind,
    ) -> Result<Subscription, WatchError> {
        if self.routes.lock().closed {
            return Err(WatchError::EventSourceClosed);
        }

        self.handles.lock().acquire(&target)?;

        let (sender, events) = mpsc::unbounded_channel();
        let id = {
            let mut table = self.routes.lock();
            if table.closed {
                drop(table);
                self.handles.lock().release(&target);
                return Err(WatchError::EventSourceClosed);
            }
            let id = table.next_id;
            table.next_id += 1;
            table
                .routes
                .entry(path.to_path_buf())
                .or_default()
                .push(Route { id, sender });
            id
        };

        Ok(Subscription {
            id,
            kind,
            path: path.to_path_buf(),
            target,
            registry: Arc::clone(self),
            events,
            active: true,
        })
    }

    /// Fan one event out to every subscriber of its path.
    pub fn deliver(&self, event: FileEvent) {
        self.routes.lock().deliver(event);
    }

    /// Shut the event feed down. Every subscription sees its stream end.
    pub fn close(&self) {
        let mut table = self.routes.lock();
        table.closed = true;
        table.routes.clear();
        crate::debug_event!("registry", "closed");
    }

    /// Number of live subscriptions holding the OS watch on `target`.
    pub fn watch_count(&self, target: &Path) -> usize {
        self.handles
            .lock()
            .refcounts
            .get(target)
            .copied()
            .unwrap_or(0)
    }

    /// Number of subscribers receiving events for `path`.
    pub fn subscriber_count(&self, path: &Path) -> usize {
        self.routes
            .lock()
            .routes
            .get(path)
            .map_or(0, |routes| routes.len())
    }

    fn release(&self, path: &Path, target: &Path, id: u64) {
        self.routes.lock().remove(path, id);
        self.handles.lock().release(target);
    }
}

/// One session's registration with the [`WatchRegistry`].
///
/// Released exactly once, either explicitly through
/// [`unsubscribe`](Self::unsubscribe) or on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    kind: WatchKind,
    path: PathBuf,
    target: PathBuf,
    registry: Arc<WatchRegistry>,
    events: mpsc::UnboundedReceiver<FileEvent>,
    active: bool,
}

impl Subscription {
    /// Next event for this path. `None` means the event source shut down.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.events.recv().await
    }

    /// Remove the registration. Calling it again is a no-op.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.registry.release(&self.path, &self.target, self.id);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
