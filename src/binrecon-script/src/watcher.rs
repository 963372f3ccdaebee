//! Debounced file-change trigger that re-invokes a script run.
//!
//! Every filesystem event (write, rename, create) pushes the run out to
//! 400ms after itself — a fresh event arriving inside that window resets
//! the wait, so a burst settles into exactly one run, fired 400ms after the
//! *last* event in the burst. A manual trigger (`F5` in the host UI)
//! bypasses the debounce entirely.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

const DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("notify backend error: {0}")]
    Notify(#[from] notify::Error),
}

/// A run trigger received from the watcher: either a debounced filesystem
/// event or a manual, debounce-bypassing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    FileChanged,
    Manual,
}

/// Watches one script file and emits a coalesced [`Trigger`] stream.
///
/// A shared "last event" timestamp lets a single background task re-arm its
/// own wait on every new event: any number of events collapse into one
/// trigger, fired 400ms after the most recent of them.
pub struct ScriptWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ScriptWatcher {
    /// Starts watching `path`, returning the watcher (drop it to stop) and a
    /// receiver of debounced/coalesced triggers.
    pub fn watch(path: impl AsRef<Path>) -> Result<(Self, mpsc::Receiver<Trigger>), WatcherError> {
        let path = path.as_ref().to_path_buf();
        let (trigger_tx, trigger_rx) = mpsc::channel::<Trigger>(1);

        let last_event: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let armed = Arc::new(Notify::new());

        let cb_last_event = Arc::clone(&last_event);
        let cb_armed = Arc::clone(&armed);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if res.is_ok() {
                *cb_last_event.lock().unwrap() = Some(Instant::now());
                cb_armed.notify_one();
            }
        })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            loop {
                armed.notified().await;
                loop {
                    let deadline = last_event.lock().unwrap().map(|t| t + DEBOUNCE);
                    let Some(deadline) = deadline else { break };
                    let now = Instant::now();
                    if now >= deadline {
                        *last_event.lock().unwrap() = None;
                        let _ = trigger_tx.send(Trigger::FileChanged).await;
                        break;
                    }
                    tokio::time::sleep(deadline - now).await;
                    // A newer event may have pushed `last_event` further out
                    // while we slept; loop re-reads it and waits again.
                }
            }
        });

        Ok((ScriptWatcher { _watcher: watcher, path }, trigger_rx))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
