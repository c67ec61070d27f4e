//! Live reloading on top of the `strata-core` resolution pipeline.
//!
//! [`ConfigWatcher::spawn`] performs one initial resolution (so the caller
//! always holds a valid value before watching starts), then re-resolves in
//! the background whenever the configuration file changes on disk, and
//! optionally on a fixed poll interval for sources with no native change
//! notification (remote `ref:` resolvers, secret files outside the watched
//! path). Raw file-system events are debounced; each quiet period triggers
//! at most one re-resolution.
//!
//! Every successful re-resolution publishes a new immutable
//! [`Snapshot`] with a monotonically increasing version. A failed
//! re-resolution never replaces the last good snapshot; it is surfaced as a
//! [`WatchEvent::Failed`] notification and the loop keeps running. Stopping
//! the watcher is idempotent and guarantees no snapshot is published
//! afterwards.

pub mod watcher;

pub use watcher::{
    ConfigWatcher, Snapshot, WatchError, WatchEvent, WatchHandle, WatchOptions,
};
