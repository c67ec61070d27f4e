//! Background watch loop and snapshot publication.
//!
//! One dedicated task owns the file-system notifier subscription and is the
//! only writer of new snapshots. Readers observe the current snapshot
//! through a replace-never-mutate published reference, so a reader holding
//! an old snapshot is never affected by a later resolution. Re-resolutions
//! are serialized inside the loop: a debounce expiry or poll tick arriving
//! while a resolution is in flight waits for it rather than running
//! concurrently.

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::future::pending;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{ConfigError, Described, Loader};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Queue depth of the reload event stream. A consumer lagging this far
/// behind delays publication of newer notifications rather than losing
/// them.
const EVENT_QUEUE_CAPACITY: usize = 32;

/// One immutable, fully resolved configuration instance.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    /// The resolved, validated value.
    pub value: T,
    /// Monotonic version; the initial resolution is version 1.
    pub version: u64,
    /// When this resolution completed.
    pub resolved_at: DateTime<Utc>,
}

/// One notification on the reload event stream.
#[derive(Debug)]
pub enum WatchEvent<T> {
    /// A re-resolution succeeded and this snapshot is now current.
    Updated(Arc<Snapshot<T>>),
    /// A re-resolution failed; the last good snapshot stays current.
    Failed(Arc<ConfigError>),
}

impl<T> Clone for WatchEvent<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Updated(snapshot) => Self::Updated(snapshot.clone()),
            Self::Failed(error) => Self::Failed(error.clone()),
        }
    }
}

/// Failure modes of watch setup and teardown.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The file-system notifier could not be created or attached.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("watch task panicked")]
    TaskPanicked,
}

/// Timing knobs for the watch loop.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period collapsing a burst of raw change events into one
    /// re-resolution.
    pub debounce: Duration,
    /// Periodic re-resolution for sources with no native change
    /// notification. `None` disables polling.
    pub poll: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            poll: None,
        }
    }
}

/// Clonable read-only view of the current snapshot.
#[derive(Debug, Clone)]
pub struct WatchHandle<T> {
    current: watch::Receiver<Arc<Snapshot<T>>>,
}

impl<T> WatchHandle<T> {
    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        self.current.borrow().clone()
    }
}

/// Live configuration watcher.
///
/// Created by [`ConfigWatcher::spawn`], which resolves once up front and
/// starts the background loop. Dropping the watcher cancels the loop;
/// [`ConfigWatcher::stop`] does so deterministically and waits for the
/// task to exit.
pub struct ConfigWatcher<T> {
    current: watch::Receiver<Arc<Snapshot<T>>>,
    events: mpsc::Receiver<WatchEvent<T>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Described> ConfigWatcher<T> {
    /// Resolve once, then start watching.
    ///
    /// The initial resolution is fatal on failure: a watcher only exists
    /// once the caller holds a valid value. Later failures are reported on
    /// the event stream instead.
    pub async fn spawn(loader: Loader, options: WatchOptions) -> Result<Self, WatchError> {
        let value = resolve::<T>(&loader).await?;
        let snapshot = Arc::new(Snapshot {
            value,
            version: 1,
            resolved_at: Utc::now(),
        });
        let (publisher, current) = watch::channel(snapshot);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();

        let file = loader.options().file.clone();
        let (raw, notifier) = match &file {
            Some(path) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let notifier = start_notifier(path, tx)?;
                (Some(rx), Some(notifier))
            }
            None => (None, None),
        };

        let task = WatchTask {
            loader,
            options,
            file,
            raw,
            _notifier: notifier,
            publisher,
            events: event_tx,
            cancel: cancel.clone(),
            version: 1,
        };
        let task = tokio::spawn(task.run());

        Ok(Self {
            current,
            events: event_rx,
            cancel,
            task: Some(task),
        })
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<Snapshot<T>> {
        self.current.borrow().clone()
    }

    /// A clonable read-only view of the current snapshot, detached from
    /// this watcher's lifetime controls.
    pub fn handle(&self) -> WatchHandle<T> {
        WatchHandle {
            current: self.current.clone(),
        }
    }

    /// Next reload notification, in publication order. Returns `None` once
    /// the watcher has stopped and the stream is drained.
    pub async fn next_event(&mut self) -> Option<WatchEvent<T>> {
        self.events.recv().await
    }

    /// Stop the background loop and wait for it to exit.
    ///
    /// Safe to call more than once. After the first call returns, no
    /// further snapshot is published; a resolution already in flight
    /// completes but its result is discarded.
    pub async fn stop(&mut self) -> Result<(), WatchError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| WatchError::TaskPanicked)?;
        }
        Ok(())
    }
}

impl<T> Drop for ConfigWatcher<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run one resolution off the async executor.
async fn resolve<T: Described>(loader: &Loader) -> Result<T, WatchError> {
    let loader = loader.clone();
    tokio::task::spawn_blocking(move || loader.load::<T>())
        .await
        .map_err(|_| WatchError::TaskPanicked)?
        .map_err(WatchError::Config)
}

/// Attach a notifier to the watched file's parent directory.
///
/// Watching the directory rather than the file survives editors and
/// deployment tools that replace the file wholesale.
fn start_notifier(
    path: &Path,
    tx: mpsc::UnboundedSender<notify::Event>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut notifier =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!("file watcher error: {e}"),
        })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    notifier.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(notifier)
}

/// What woke the watch loop up.
enum Tick {
    Stop,
    Raw(notify::Event),
    RawClosed,
    Debounce,
    Poll,
}

struct WatchTask<T: Described> {
    loader: Loader,
    options: WatchOptions,
    file: Option<PathBuf>,
    raw: Option<mpsc::UnboundedReceiver<notify::Event>>,
    // Keeps the OS-level watch alive for the task's lifetime.
    _notifier: Option<RecommendedWatcher>,
    publisher: watch::Sender<Arc<Snapshot<T>>>,
    events: mpsc::Sender<WatchEvent<T>>,
    cancel: CancellationToken,
    version: u64,
}

impl<T: Described> WatchTask<T> {
    async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut fs_open = self.raw.is_some();
        let mut deadline: Option<Instant> = None;
        let mut poll = self.options.poll.map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let tick = tokio::select! {
                _ = cancel.cancelled() => Tick::Stop,
                event = raw_recv(&mut self.raw, fs_open) => match event {
                    Some(event) => Tick::Raw(event),
                    None => Tick::RawClosed,
                },
                _ = debounce_wait(deadline) => Tick::Debounce,
                _ = poll_wait(&mut poll) => Tick::Poll,
            };

            match tick {
                Tick::Stop => {
                    debug!("watch loop shutting down");
                    break;
                }
                Tick::Raw(event) => {
                    let relevant = self
                        .file
                        .as_deref()
                        .is_some_and(|file| is_relevant(file, &event));
                    if relevant {
                        // Every raw event restarts the quiet period.
                        deadline = Some(Instant::now() + self.options.debounce);
                    }
                }
                Tick::RawClosed => {
                    fs_open = false;
                }
                Tick::Debounce => {
                    deadline = None;
                    self.resolve_and_publish().await;
                }
                Tick::Poll => {
                    // A poll tick inside an active debounce window is
                    // coalesced into the pending re-resolution.
                    if deadline.is_none() {
                        self.resolve_and_publish().await;
                    }
                }
            }
        }
    }

    async fn resolve_and_publish(&mut self) {
        debug!("re-resolving configuration");
        let outcome = resolve::<T>(&self.loader).await;

        // A stop that arrived while resolving wins: the result is
        // discarded and nothing is published after cancellation.
        if self.cancel.is_cancelled() {
            return;
        }

        let event = match outcome {
            Ok(value) => {
                self.version += 1;
                let snapshot = Arc::new(Snapshot {
                    value,
                    version: self.version,
                    resolved_at: Utc::now(),
                });
                self.publisher.send_replace(snapshot.clone());
                debug!(version = self.version, "published new configuration snapshot");
                WatchEvent::Updated(snapshot)
            }
            Err(WatchError::Config(error)) => {
                warn!("configuration reload failed, keeping last good snapshot: {error}");
                WatchEvent::Failed(Arc::new(error))
            }
            Err(error) => {
                warn!("configuration reload failed: {error}");
                return;
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.events.send(event) => {}
        }
    }
}

async fn raw_recv(
    rx: &mut Option<mpsc::UnboundedReceiver<notify::Event>>,
    open: bool,
) -> Option<notify::Event> {
    match rx {
        Some(rx) if open => rx.recv().await,
        _ => pending().await,
    }
}

async fn debounce_wait(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn poll_wait(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

/// Returns `true` if this raw event is for (or near) the watched file.
fn is_relevant(target: &Path, event: &notify::Event) -> bool {
    // Data changes, creates and removes matter; metadata-only changes and
    // access events do not.
    let is_data_event = match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    if !is_data_event {
        return false;
    }

    // No path info: be conservative and treat it as relevant.
    if event.paths.is_empty() {
        return true;
    }

    let target_name = target.file_name();
    event.paths.iter().any(|p| {
        if p == target {
            return true;
        }
        // File name match handles platform path canonicalization
        // differences (macOS /var vs /private/var and similar).
        p.file_name().is_some() && p.file_name() == target_name
    })
}
