use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use instructor_events::EventPublisher;

use super::OutboxStore;
use crate::store::StoreError;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BATCH_SIZE: usize = 32;

/// Wakes the relay ahead of its next tick.
///
/// Kicks are never lost: a kick with no waiting relay is kept until the
/// relay next waits.
#[derive(Debug, Clone, Default)]
pub struct RelayTrigger {
    notify: Arc<Notify>,
}

impl RelayTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kick(&self) {
        self.notify.notify_one();
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// What one drain pass did.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    /// Failed this pass; will be retried on a later pass.
    pub failed: usize,
    pub dead_lettered: usize,
}

impl RelayReport {
    pub fn is_empty(&self) -> bool {
        self.published == 0 && self.failed == 0 && self.dead_lettered == 0
    }
}

/// Delivers outbox rows to the bus.
///
/// - Drains in batches, oldest first
/// - A row is retried on every pass until it is published or has used up
///   `max_attempts`, then it is dead-lettered
/// - Serialization failures are dead-lettered immediately
#[derive(Debug)]
pub struct OutboxRelay<S, P> {
    store: S,
    publisher: P,
    max_attempts: u32,
    batch_size: usize,
    trigger: RelayTrigger,
}

impl<S, P> OutboxRelay<S, P>
where
    S: OutboxStore,
    P: EventPublisher,
{
    pub fn new(store: S, publisher: P) -> Self {
        Self {
            store,
            publisher,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            batch_size: DEFAULT_BATCH_SIZE,
            trigger: RelayTrigger::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn trigger(&self) -> RelayTrigger {
        self.trigger.clone()
    }

    /// Deliver one batch of pending rows.
    #[instrument(skip(self), fields(batch_size = self.batch_size), err)]
    pub async fn drain_once(&self) -> Result<RelayReport, StoreError> {
        let mut report = RelayReport::default();

        for record in self.store.pending(self.batch_size).await? {
            let event_id = record.event.event_id();
            let operation = record.event.operation();

            match self.publisher.publish(record.event).await {
                Ok(()) => {
                    self.store.mark_published(event_id).await?;
                    report.published += 1;
                }
                Err(err) => {
                    let attempts = record.attempts + 1;
                    let dead_letter = !err.is_retryable() || attempts >= self.max_attempts;
                    self.store
                        .mark_failed(event_id, &err.to_string(), dead_letter)
                        .await?;

                    if dead_letter {
                        warn!(%event_id, %operation, attempts, error = %err, "outbox event dead-lettered");
                        report.dead_lettered += 1;
                    } else {
                        debug!(%event_id, %operation, attempts, error = %err, "outbox publish failed");
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn drain_logged(&self) {
        match self.drain_once().await {
            Ok(report) if !report.is_empty() => {
                debug!(?report, "outbox drained");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "outbox drain failed"),
        }
    }
}

impl<S, P> OutboxRelay<S, P>
where
    S: OutboxStore + 'static,
    P: EventPublisher + 'static,
{
    /// Run the relay on the current tokio runtime.
    ///
    /// Drains every `poll_interval` and whenever the trigger is kicked. A
    /// last drain runs on shutdown. Dropping the handle also stops the task.
    pub fn spawn(self, poll_interval: Duration) -> RelayHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let trigger = self.trigger.clone();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                    _ = self.trigger.notified() => {}
                }
                self.drain_logged().await;
            }

            self.drain_logged().await;
        });

        RelayHandle {
            trigger,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

/// Handle to control and join the relay task.
#[derive(Debug)]
pub struct RelayHandle {
    trigger: RelayTrigger,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn trigger(&self) -> RelayTrigger {
        self.trigger.clone()
    }

    /// Request graceful shutdown and wait for the final drain.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "outbox relay task ended abnormally");
            }
        }
    }
}
