//! Watches the resource configuration directory so mapping changes are
//! picked up without a restart.
//!
//! Uses the `notify` crate for cross-platform file system events.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use karp_core::error::KarpError;

use crate::is_config_file;

/// Events emitted by the config watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    /// A configuration file was created or modified.
    Changed(PathBuf),
    /// A configuration file was deleted.
    Removed(PathBuf),
}

impl ConfigEvent {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Changed(path) | Self::Removed(path) => path,
        }
    }
}

/// Watches a directory for configuration changes and emits events.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::Receiver<ConfigEvent>,
}

impl ConfigWatcher {
    /// Start watching `dir`. Only the top level is watched; resources do not
    /// live in sub-directories.
    ///
    /// # Errors
    ///
    /// Returns [`KarpError::Io`] if the watcher cannot be created.
    pub fn start(dir: &Path) -> Result<Self, KarpError> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "config watcher error");
                    return;
                }
            };
            for path in &event.paths {
                // Editors drop swap and backup files next to the config.
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
                if hidden || !is_config_file(path) {
                    continue;
                }
                let config_event = match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => ConfigEvent::Changed(path.clone()),
                    EventKind::Remove(_) => ConfigEvent::Removed(path.clone()),
                    _ => continue,
                };
                let _ = tx.send(config_event);
            }
        })
        .map_err(|e| KarpError::Io(std::io::Error::other(e)))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| KarpError::Io(std::io::Error::other(e)))?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Next event, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ConfigEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Next event if one is already queued.
    pub fn try_recv(&self) -> Option<ConfigEvent> {
        self.receiver.try_recv().ok()
    }
}
