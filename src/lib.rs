pub mod cli;
pub mod config;
pub mod logging;
pub mod utils;
pub mod watcher;

pub use config::Settings;
pub use watcher::{
    Change, ChangeSignals, FileWatcher, FileWatcherBuilder, SessionEnd, WaitOutcome, WatchError,
    WatchRegistry,
};
