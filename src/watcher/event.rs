//! Raw file events as seen by watch sessions.

use std::path::PathBuf;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

/// Kind of filesystem change reported for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// Path came into existence (including a rename onto it).
    Create,
    /// File content changed.
    Write,
    /// Path was unlinked.
    Remove,
    /// File was moved away from this path.
    Rename,
    /// Attributes changed. Linux reports this when an open file is unlinked.
    Metadata,
}

/// A change reported for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Split a notify event into per-path events.
    ///
    /// Access events carry no state change and are dropped. Unknown or
    /// generic modifications are reported as writes, since a spurious write
    /// only costs a stat while a missed one loses data.
    pub fn from_notify(event: notify::Event) -> Vec<FileEvent> {
        let notify::Event { kind, paths, .. } = event;

        if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = kind {
            let mut paths = paths.into_iter();
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                events.push(FileEvent::new(FileEventKind::Rename, from));
            }
            if let Some(to) = paths.next() {
                events.push(FileEvent::new(FileEventKind::Create, to));
            }
            return events;
        }

        let kind = match kind {
            EventKind::Create(_) => FileEventKind::Create,
            EventKind::Remove(_) => FileEventKind::Remove,
            EventKind::Modify(ModifyKind::Metadata(_)) => FileEventKind::Metadata,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileEventKind::Create,
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Rename,
            EventKind::Modify(_) | EventKind::Any | EventKind::Other => FileEventKind::Write,
            EventKind::Access(_) => return Vec::new(),
        };

        paths
            .into_iter()
            .map(|path| FileEvent::new(kind, path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    fn notify_event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    fn kinds(kind: EventKind) -> Vec<FileEventKind> {
        FileEvent::from_notify(notify_event(kind, &["/var/log/app.log"]))
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_basic_kinds() {
        assert_eq!(
            kinds(EventKind::Create(CreateKind::File)),
            vec![FileEventKind::Create]
        );
        assert_eq!(
            kinds(EventKind::Remove(RemoveKind::File)),
            vec![FileEventKind::Remove]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            vec![FileEventKind::Write]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            vec![FileEventKind::Metadata]
        );
    }

    #[test]
    fn test_generic_events_are_writes() {
        assert_eq!(kinds(EventKind::Any), vec![FileEventKind::Write]);
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Any)),
            vec![FileEventKind::Write]
        );
    }

    #[test]
    fn test_access_is_dropped() {
        assert!(kinds(EventKind::Access(AccessKind::Any)).is_empty());
    }

    #[test]
    fn test_rename_modes() {
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            vec![FileEventKind::Rename]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Name(RenameMode::Any))),
            vec![FileEventKind::Rename]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            vec![FileEventKind::Create]
        );
    }

    #[test]
    fn test_rename_both_splits_paths() {
        let event = notify_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/logs/app.log", "/logs/app.log.1"],
        );

        let events = FileEvent::from_notify(event);
        assert_eq!(
            events,
            vec![
                FileEvent::new(FileEventKind::Rename, "/logs/app.log"),
                FileEvent::new(FileEventKind::Create, "/logs/app.log.1"),
            ]
        );
    }
}
