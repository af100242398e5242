//! Watch command: follow one file and print each change.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::watcher::{FileWatcher, SessionEnd, WaitOutcome, WatchError, WatchRegistry};

/// Options collected from `tailwatch watch`.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub file: PathBuf,
    pub offset: Option<u64>,
    pub follow: bool,
    pub poll_interval_ms: Option<u64>,
    pub grace_period_ms: Option<u64>,
}

impl WatchOptions {
    /// Apply command-line overrides on top of the loaded settings.
    pub fn effective_config(&self, base: &WatchConfig) -> WatchConfig {
        WatchConfig {
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            grace_period_ms: self.grace_period_ms.unwrap_or(base.grace_period_ms),
        }
    }
}

/// Run watch command until Ctrl-C, or until the file goes away without `--follow`.
pub async fn run_watch(options: WatchOptions, config: &WatchConfig) -> Result<()> {
    let config = options.effective_config(config);
    let registry = WatchRegistry::new().context("Failed to start file watcher")?;
    let watcher = FileWatcher::builder()
        .registry(registry.clone())
        .config(&config)
        .build(&options.file)
        .with_context(|| format!("Cannot watch {}", options.file.display()))?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            crate::debug_event!("cli", "interrupted");
            on_ctrl_c.cancel();
        }
    });

    let result = follow_file(&watcher, &options, &cancel).await;
    registry.close();
    result
}

async fn follow_file(
    watcher: &FileWatcher,
    options: &WatchOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let path = watcher.path();
    let mut offset = options.offset;

    loop {
        if watcher.block_until_exists(cancel).await? == WaitOutcome::Cancelled {
            return Ok(());
        }

        let start = match offset.take() {
            Some(offset) => offset,
            None => current_len(path).await,
        };

        let mut signals = match watcher.watch_changes(start, cancel.clone()).await {
            Ok(signals) => signals,
            // Gone again between the existence check and the open
            Err(WatchError::Open { source, .. })
                if options.follow && source.kind() == ErrorKind::NotFound =>
            {
                offset = Some(0);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
            Err(e) => return Err(e).context("Failed to start watching"),
        };

        while let Some(change) = signals.changed().await {
            println!("{change}");
        }

        match signals.finish().await? {
            SessionEnd::Cancelled => return Ok(()),
            SessionEnd::Deleted if options.follow => {
                crate::log_event!("cli", "waiting for new file", "{}", path.display());
                offset = Some(0);
            }
            SessionEnd::Deleted => return Ok(()),
        }
    }
}

async fn current_len(path: &std::path::Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> WatchOptions {
        WatchOptions {
            file: PathBuf::from("app.log"),
            offset: None,
            follow: false,
            poll_interval_ms: None,
            grace_period_ms: None,
        }
    }

    #[test]
    fn test_config_without_overrides() {
        let base = WatchConfig {
            poll_interval_ms: 700,
            grace_period_ms: 30,
        };
        assert_eq!(options().effective_config(&base), base);
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut options = options();
        options.poll_interval_ms = Some(50);

        let effective = options.effective_config(&WatchConfig::default());
        assert_eq!(effective.poll_interval_ms, 50);
        assert_eq!(effective.grace_period_ms, 100);
    }
}
