//! Debounced progress writes for long running operations.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::domain::Operation;
use crate::ports::OperationLog;

/// Admits at most one event per `interval`.
///
/// The window opens at construction, so the first event is admitted one
/// interval after the reporter starts.
#[derive(Debug)]
pub(crate) struct Debounce {
    interval: Duration,
    last_sent: Instant,
}

impl Debounce {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_sent: now,
        }
    }

    pub(crate) fn admit(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_sent) < self.interval {
            return false;
        }
        self.last_sent = now;
        true
    }
}

/// Turns a stream of progress entries into operation log updates.
///
/// One writer task owns a copy of the operation and applies the latest
/// admitted entry to it. Entries published while an update is in flight
/// coalesce, so updates never overlap and never arrive out of order.
pub struct ProgressReporter<P> {
    debounce: Mutex<Debounce>,
    tx: watch::Sender<Option<P>>,
    writer: JoinHandle<()>,
}

impl<P> ProgressReporter<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn spawn(
        oplog: Arc<dyn OperationLog>,
        mut op: Operation,
        interval: Duration,
        apply: fn(&mut Operation, P),
    ) -> Self {
        let (tx, mut rx) = watch::channel::<Option<P>>(None);
        let writer = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(entry) = rx.borrow_and_update().clone() else {
                    continue;
                };
                apply(&mut op, entry);
                if let Err(err) = oplog.update(&op).await {
                    tracing::warn!(operation = ?op.id, error = %err, "failed to write progress");
                }
            }
        });
        Self {
            debounce: Mutex::new(Debounce::new(interval, Instant::now())),
            tx,
            writer,
        }
    }

    /// Publishes `entry` if the debounce window allows it.
    pub fn report(&self, entry: P) {
        if !self.debounce.lock().admit(Instant::now()) {
            return;
        }
        self.tx.send_replace(Some(entry));
    }

    /// Stops accepting entries and waits for the last write to land.
    ///
    /// Returns the last admitted entry, which is the one the writer applied
    /// last. The caller folds it into its own copy of the operation so the
    /// final update does not roll the progress back.
    pub async fn close(self) -> Option<P> {
        let Self { tx, writer, .. } = self;
        let last = tx.borrow().clone();
        drop(tx);
        if let Err(err) = writer.await {
            tracing::warn!(error = %err, "progress writer stopped abnormally");
        }
        last
    }
}
