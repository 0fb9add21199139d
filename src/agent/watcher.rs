use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

/// What the watcher saw happen to the credential file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The file was created or written.
    Written,
    /// The watcher backend reported an error.
    Error(String),
}

/// Source of completion events for the request loop.
#[async_trait]
pub trait CompletionEvents: Send {
    /// Next event, or `None` once the source is closed.
    async fn next_event(&mut self) -> Option<WatchEvent>;
}

#[async_trait]
impl CompletionEvents for mpsc::UnboundedReceiver<WatchEvent> {
    async fn next_event(&mut self) -> Option<WatchEvent> {
        self.recv().await
    }
}

/// Watches the credential file's directory and reports create or modify
/// events for the file itself.
pub struct CredentialWatcher {
    // Dropping the watcher stops the OS watch.
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<WatchEvent>,
}

impl std::fmt::Debug for CredentialWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialWatcher").finish_non_exhaustive()
    }
}

impl CredentialWatcher {
    /// Start watching `directory` for events on `file_name`. The directory
    /// must exist.
    pub fn watch(directory: &Path, file_name: OsString) -> notify::Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    let _ = tx.send(WatchEvent::Error(e.to_string()));
                    return;
                }
            };

            let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                && event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()));
            if relevant {
                debug!(kind = ?event.kind, "Token file event");
                let _ = tx.send(WatchEvent::Written);
            }
        })?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        Ok(Self { _watcher: watcher, events })
    }
}

#[async_trait]
impl CompletionEvents for CredentialWatcher {
    async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}
