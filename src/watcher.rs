// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Restart-on-error event pump.
//!
//! A [`Watcher`] owns one dedicated task that opens a watch stream at its cursor
//! and dispatches each event to a [`WatchHandler`], strictly one at a time and in
//! delivery order. The task alternates between two states:
//!
//! ```text
//!            open stream at cursor
//! Restarting ─────────────────────▶ Running
//!     ▲                               │
//!     └───── Error event / stream end ┘
//! ```
//!
//! After each object event the cursor advances to the object's resource version,
//! so a restart resumes without re-delivering applied events. Bookmarks advance
//! the cursor without dispatching. An expired cursor (HTTP 410) triggers a full
//! re-list: the listed objects go to [`WatchHandler::resync`] and the next stream
//! starts at the list's cursor.
//!
//! Retries are unbounded. [`Watcher::stop`] is terminal: the live stream is
//! dropped on every exit path and no restart follows.

use crate::accessor::{Event, EventStream, ResourceAccessor};
use crate::constants::WATCH_EXPIRED_CODE;
use crate::dns_errors::ReconcileError;
use crate::entry::EntryKind;
use crate::metrics;
use futures::StreamExt;
use kube::Resource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receiver of dispatched watch events.
#[async_trait::async_trait]
pub trait WatchHandler<K>: Send
where
    K: Send + Sync,
{
    /// An object appeared.
    async fn added_event(&mut self, object: &K) -> Result<(), ReconcileError>;

    /// An object changed.
    async fn updated_event(&mut self, object: &K) -> Result<(), ReconcileError>;

    /// An object was deleted; `object` is its last known state.
    async fn deleted_event(&mut self, object: &K) -> Result<(), ReconcileError>;

    /// Replace tracked state with a fresh list of every current object.
    ///
    /// Objects that are tracked but absent from `objects` were deleted while no
    /// watch could observe them.
    async fn resync(&mut self, objects: &[K]);

    /// Called after every dispatched object event and after each resync.
    async fn post_event(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectEvent {
    Added,
    Modified,
    Deleted,
}

impl ObjectEvent {
    fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StreamOutcome {
    Stopped,
    Restart,
    Resync,
}

/// Handle to a running watch task.
pub struct Watcher<H> {
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<H>>>,
}

impl<H> Watcher<H>
where
    H: Send + 'static,
{
    /// Start watching from `cursor` on a dedicated task.
    ///
    /// `restart_delay` is the pause between a stream ending and the next attempt.
    pub fn spawn<A>(accessor: Arc<A>, handler: H, cursor: String, restart_delay: Duration) -> Self
    where
        A: ResourceAccessor,
        H: WatchHandler<A::Object>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_watch_loop(
            accessor,
            handler,
            cursor,
            stop_rx,
            restart_delay,
        ));
        Self {
            stop_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop the watch and wait for the task to finish.
    ///
    /// An event already being handled completes first. Returns the handler the
    /// first time it is called and `None` afterwards.
    pub async fn stop(&self) -> Option<H> {
        self.stop_tx.send_replace(true);
        let task = self.task.lock().take()?;
        match task.await {
            Ok(handler) => Some(handler),
            Err(e) => {
                error!(error = %e, "Watch task terminated abnormally");
                None
            }
        }
    }

    /// True once [`Watcher::stop`] has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

async fn run_watch_loop<A, H>(
    accessor: Arc<A>,
    mut handler: H,
    mut cursor: String,
    mut stop: watch::Receiver<bool>,
    restart_delay: Duration,
) -> H
where
    A: ResourceAccessor,
    H: WatchHandler<A::Object>,
{
    let kind = accessor.kind();
    let mut needs_resync = false;

    loop {
        if *stop.borrow() {
            break;
        }

        if needs_resync {
            let listed = tokio::select! {
                biased;
                _ = stop.changed() => break,
                listed = accessor.pre_fetch() => listed,
            };
            match listed {
                Ok((objects, list_cursor)) => {
                    info!(kind = %kind, count = objects.len(), cursor = %list_cursor, "Resynced after expired cursor");
                    handler.resync(&objects).await;
                    handler.post_event().await;
                    cursor = list_cursor;
                    needs_resync = false;
                }
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Failed to re-list objects; retrying");
                    metrics::record_watch_restart(kind.as_str());
                    if !pause(&mut stop, restart_delay).await {
                        break;
                    }
                    continue;
                }
            }
        }

        debug!(kind = %kind, cursor = %cursor, "Opening watch stream");
        let opened = tokio::select! {
            biased;
            _ = stop.changed() => break,
            opened = accessor.watch(&cursor) => opened,
        };

        match opened {
            Ok(mut stream) => {
                let outcome = pump(&mut stream, &mut handler, &mut cursor, &mut stop, kind).await;
                drop(stream);
                match outcome {
                    StreamOutcome::Stopped => break,
                    StreamOutcome::Resync => needs_resync = true,
                    StreamOutcome::Restart => {}
                }
                warn!(kind = %kind, cursor = %cursor, "Watch stream interrupted; restarting");
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Failed to open watch stream; retrying");
            }
        }

        metrics::record_watch_restart(kind.as_str());
        if !pause(&mut stop, restart_delay).await {
            break;
        }
    }

    info!(kind = %kind, "Watch stopped");
    handler
}

/// Wait out the restart delay. Returns false if stop was requested meanwhile.
async fn pause(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !*stop.borrow();
    }
    tokio::select! {
        biased;
        _ = stop.changed() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

async fn pump<K, H>(
    stream: &mut EventStream<K>,
    handler: &mut H,
    cursor: &mut String,
    stop: &mut watch::Receiver<bool>,
    kind: EntryKind,
) -> StreamOutcome
where
    K: Resource + Send + Sync,
    H: WatchHandler<K>,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.changed() => return StreamOutcome::Stopped,
            next = stream.next() => next,
        };

        let Some(event) = next else {
            debug!(kind = %kind, "Watch stream ended");
            return StreamOutcome::Restart;
        };

        match event {
            Event::Added(object) => {
                apply(handler, kind, ObjectEvent::Added, &object, cursor).await;
            }
            Event::Modified(object) => {
                apply(handler, kind, ObjectEvent::Modified, &object, cursor).await;
            }
            Event::Deleted(object) => {
                apply(handler, kind, ObjectEvent::Deleted, &object, cursor).await;
            }
            Event::Bookmark(version) => {
                if !version.is_empty() {
                    *cursor = version;
                }
            }
            Event::Error { code, message } => {
                warn!(kind = %kind, code, message = %message, "Watch stream reported an error");
                if code == WATCH_EXPIRED_CODE {
                    cursor.clear();
                    return StreamOutcome::Resync;
                }
                return StreamOutcome::Restart;
            }
        }
    }
}

async fn apply<K, H>(
    handler: &mut H,
    kind: EntryKind,
    event: ObjectEvent,
    object: &K,
    cursor: &mut String,
) where
    K: Resource + Send + Sync,
    H: WatchHandler<K>,
{
    let started = Instant::now();
    let result = match event {
        ObjectEvent::Added => handler.added_event(object).await,
        ObjectEvent::Modified => handler.updated_event(object).await,
        ObjectEvent::Deleted => handler.deleted_event(object).await,
    };

    metrics::record_watch_event(kind.as_str(), event.as_str());
    metrics::record_event_handled(kind.as_str(), started.elapsed(), result.is_err());
    if let Err(e) = result {
        error!(kind = %kind, event = event.as_str(), error = %e, "Failed to apply watch event");
    }

    match object.meta().resource_version.as_deref() {
        Some(version) if !version.is_empty() => *cursor = version.to_string(),
        _ => debug!(kind = %kind, "Object carries no resource version; cursor unchanged"),
    }

    handler.post_event().await;
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod watcher_tests;
