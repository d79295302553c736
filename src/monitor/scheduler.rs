//! The payment monitor: one polling task per tracking hash.

use super::backoff::Backoff;
use super::hooks::PaymentHooks;
use super::registry::{Claim, Registration, RegistryStats, SessionId, SessionRegistry};
use super::session::{ExpiryReason, MonitorTicket, PollingSession, SessionOutcome, SessionState};
use crate::config::{AppConfig, MonitorConfig};
use crate::error::{Error, Result};
use crate::event::{create_event_channel, MonitorEvent, MonitorEventsChannel, MonitorEventsSender};
use crate::khqr::is_tracking_hash;
use crate::settlement::{PaymentStatus, PaymentStatusRecord, StatusClient, MAX_BULK_HASHES};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Builder for a [`PaymentMonitor`].
pub struct MonitorBuilder {
    client: StatusClient,
    hooks: Arc<dyn PaymentHooks>,
    config: MonitorConfig,
    max_in_flight: usize,
    registry: Option<SessionRegistry>,
}

impl MonitorBuilder {
    /// Start from default polling settings.
    #[must_use]
    pub fn new(client: StatusClient, hooks: Arc<dyn PaymentHooks>) -> Self {
        let defaults = AppConfig::default();
        Self {
            client,
            hooks,
            config: defaults.monitor,
            max_in_flight: defaults.settlement.max_in_flight,
            registry: None,
        }
    }

    /// Take polling settings and the in-flight cap from a full configuration.
    #[must_use]
    pub fn app_config(mut self, config: &AppConfig) -> Self {
        self.config = config.monitor.clone();
        self.max_in_flight = config.settlement.max_in_flight;
        self
    }

    /// Polling settings.
    #[must_use]
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum concurrent settlement calls (at least 1).
    #[must_use]
    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Use an existing registry instead of a fresh one.
    #[must_use]
    pub fn registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the monitor.
    #[must_use]
    pub fn build(self) -> PaymentMonitor {
        let (events_tx, _) = create_event_channel();
        let registry = self
            .registry
            .unwrap_or_else(|| SessionRegistry::with_capacity(self.config.settled_capacity));
        let backoff = Backoff::new(self.config.poll_interval(), self.config.max_backoff());

        PaymentMonitor {
            inner: Arc::new(MonitorInner {
                client: self.client,
                hooks: self.hooks,
                registry,
                limiter: Semaphore::new(self.max_in_flight.max(1)),
                config: self.config,
                backoff,
                events_tx,
            }),
        }
    }
}

/// Watches tracking hashes until they settle and fires the booking hooks.
///
/// Cloning is cheap; clones share sessions, the settled ledger and the
/// in-flight limit.
#[derive(Clone)]
pub struct PaymentMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    client: StatusClient,
    hooks: Arc<dyn PaymentHooks>,
    registry: SessionRegistry,
    limiter: Semaphore,
    config: MonitorConfig,
    backoff: Backoff,
    events_tx: MonitorEventsSender,
}

impl PaymentMonitor {
    /// Start watching `hash`.
    ///
    /// If a session is already running the ticket joins it; if the hash
    /// already settled the ticket carries that outcome and nothing is polled.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHash`] if `hash` is not a tracking hash.
    pub fn monitor(&self, hash: &str) -> Result<MonitorTicket> {
        ensure_hash(hash)?;

        match self.inner.registry.register(hash) {
            Registration::Settled(outcome) => {
                debug!("Hash {hash} already settled");
                Ok(MonitorTicket::finished(hash, outcome))
            }
            Registration::Joined(state) => Ok(MonitorTicket::new(hash, false, state)),
            Registration::Created { id, state, cancel } => {
                let ticket = MonitorTicket::new(hash, true, state.subscribe());
                let session = PollingSession::new(
                    hash,
                    self.inner.config.poll_interval(),
                    self.inner.config.deadline(),
                );
                info!("Monitoring payment {hash}");
                self.inner.emit(MonitorEvent::SessionStarted {
                    hash: hash.to_string(),
                });

                let task = tokio::spawn(run_session(
                    Arc::clone(&self.inner),
                    id,
                    session,
                    state,
                    cancel,
                ));
                self.inner.registry.attach_task(hash, id, task);
                Ok(ticket)
            }
        }
    }

    /// Check `hash` once, outside the polling schedule.
    ///
    /// A terminal answer settles the hash through the same idempotent path
    /// as polling. If the hash settled earlier the returned status is the
    /// settled one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHash`] for malformed input and any error from
    /// the status client. Credential failures also raise an operator alert.
    pub async fn verify(&self, hash: &str) -> Result<PaymentStatusRecord> {
        ensure_hash(hash)?;

        match self.inner.check(hash).await {
            Ok(record) => Ok(self.inner.reconcile(record).await),
            Err(e) => {
                if e.is_fatal() {
                    self.inner
                        .alert(hash, &format!("Manual verification rejected: {e}"))
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Check many hashes through the bulk endpoint.
    ///
    /// Duplicates are collapsed and the rest is split into batches of
    /// [`MAX_BULK_HASHES`], checked concurrently within the in-flight limit.
    /// Hashes in failed batches are missing from the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHash`] before any call if an input is
    /// malformed, and the first batch error if every batch failed.
    pub async fn verify_bulk(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, PaymentStatusRecord>> {
        for hash in hashes {
            ensure_hash(hash)?;
        }
        let mut seen = HashSet::new();
        let unique: Vec<String> = hashes
            .iter()
            .filter(|h| seen.insert(h.as_str()))
            .cloned()
            .collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let batches: Vec<&[String]> = unique.chunks(MAX_BULK_HASHES).collect();
        debug!(
            "Bulk verifying {} hashes in {} batches",
            unique.len(),
            batches.len()
        );
        let answers = futures::future::join_all(
            batches
                .iter()
                .map(|batch| self.inner.check_batch(batch)),
        )
        .await;

        let mut results = HashMap::with_capacity(unique.len());
        let mut first_error = None;
        let mut failed_batches = 0usize;
        for (batch, answer) in batches.iter().zip(answers) {
            match answer {
                Ok(records) => {
                    for (hash, record) in records {
                        let record = self.inner.reconcile(record).await;
                        results.insert(hash, record);
                    }
                }
                Err(e) => {
                    failed_batches += 1;
                    warn!("Bulk batch of {} hashes failed: {e}", batch.len());
                    if e.is_fatal() {
                        if let Some(first) = batch.first() {
                            self.inner
                                .alert(
                                    first,
                                    &format!("Bulk check of {} hashes rejected: {e}", batch.len()),
                                )
                                .await;
                        }
                    }
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) if failed_batches == batches.len() => Err(e),
            _ => Ok(results),
        }
    }

    /// Ask the session for `hash` to stop. Returns false if none is running.
    ///
    /// An in-flight call is not interrupted; its result is discarded.
    pub fn cancel(&self, hash: &str) -> bool {
        let cancelled = self.inner.registry.cancel(hash);
        if cancelled {
            info!("Cancelling session for {hash}");
        }
        cancelled
    }

    /// Cancel every session and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        let tasks = self.inner.registry.cancel_all();
        info!("Shutting down {} monitor sessions", tasks.len());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Monitor session task failed: {e}");
            }
        }
    }

    /// Subscribe to monitor events.
    #[must_use]
    pub fn subscribe_events(&self) -> MonitorEventsChannel {
        self.inner.events_tx.subscribe()
    }

    /// Number of running sessions.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.inner.registry.active_count()
    }

    /// Registry statistics.
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        self.inner.registry.stats()
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }
}

impl MonitorInner {
    fn emit(&self, event: MonitorEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn check(&self, hash: &str) -> Result<PaymentStatusRecord> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| Error::Config("status check limiter closed".to_string()))?;
        self.client.check_status(hash).await
    }

    async fn check_batch(&self, hashes: &[String]) -> Result<HashMap<String, PaymentStatusRecord>> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| Error::Config("status check limiter closed".to_string()))?;
        self.client.check_status_bulk(hashes).await
    }

    async fn alert(&self, hash: &str, message: &str) {
        error!("Operator alert for {hash}: {message}");
        self.hooks.on_operator_alert(hash, message).await;
        self.emit(MonitorEvent::OperatorAlert {
            hash: hash.to_string(),
            message: message.to_string(),
        });
    }

    /// Settle `hash` with `outcome` unless it already settled.
    ///
    /// The winner runs the hooks and only then publishes the final state, so
    /// anyone woken by it sees the side effect done. A loser waits for the
    /// winner's hooks and then republishes the recorded outcome.
    async fn settle(&self, hash: &str, outcome: SessionOutcome) -> bool {
        let guard = match self.registry.claim(hash, &outcome) {
            Claim::Won(guard) => guard,
            Claim::Lost(mut settled) => {
                finished_elsewhere(&mut settled).await;
                let recorded = match &*settled.borrow() {
                    SessionState::Finished(recorded) => Some(recorded.clone()),
                    _ => None,
                };
                if let Some(recorded) = recorded {
                    self.registry.publish_finished(hash, &recorded);
                }
                return false;
            }
        };

        match &outcome {
            SessionOutcome::Confirmed(record) => {
                info!("Payment {hash} confirmed");
                self.hooks.on_confirmed(record).await;
                self.emit(MonitorEvent::Confirmed {
                    hash: hash.to_string(),
                    transaction_id: record.transaction_id.clone(),
                });
            }
            SessionOutcome::Expired { reason, .. } => {
                info!("Payment {hash} expired: {reason}");
                self.hooks.on_expired(hash, *reason).await;
                self.emit(MonitorEvent::Expired {
                    hash: hash.to_string(),
                    reason: *reason,
                });
            }
            SessionOutcome::Aborted { .. } | SessionOutcome::Cancelled => {}
        }
        self.registry.publish_finished(hash, &outcome);
        drop(guard);
        true
    }

    /// Settle on a terminal record and make its status monotonic with
    /// whatever settled first.
    async fn reconcile(&self, mut record: PaymentStatusRecord) -> PaymentStatusRecord {
        let hash = record.hash.clone();
        if let Some(outcome) = terminal_outcome(&record) {
            self.settle(&hash, outcome).await;
        }

        let settled = self
            .registry
            .settled_outcome(&hash)
            .and_then(|outcome| outcome.status());
        if let Some(settled) = settled {
            if record.status == PaymentStatus::Paid && settled != PaymentStatus::Paid {
                self.alert(
                    &hash,
                    &format!("Payment reported PAID after the booking was released ({settled})"),
                )
                .await;
            }
            record.status = settled.advance(record.status);
        }
        record
    }
}

fn terminal_outcome(record: &PaymentStatusRecord) -> Option<SessionOutcome> {
    match record.status {
        PaymentStatus::Pending => None,
        PaymentStatus::Paid => Some(SessionOutcome::Confirmed(record.clone())),
        PaymentStatus::Failed => Some(SessionOutcome::Expired {
            reason: ExpiryReason::UpstreamFailed,
            record: Some(record.clone()),
        }),
        PaymentStatus::Expired => Some(SessionOutcome::Expired {
            reason: ExpiryReason::UpstreamExpired,
            record: Some(record.clone()),
        }),
    }
}

fn ensure_hash(hash: &str) -> Result<()> {
    if is_tracking_hash(hash) {
        Ok(())
    } else {
        Err(Error::InvalidHash(hash.to_string()))
    }
}

/// Publish a non-settling state unless the session already finished.
fn publish_progress(state: &watch::Sender<SessionState>, next: SessionState) -> bool {
    state.send_if_modified(|current| {
        if current.is_finished() {
            return false;
        }
        *current = next;
        true
    })
}

async fn cancel_requested(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn finished_elsewhere(state: &mut watch::Receiver<SessionState>) {
    loop {
        if state.borrow_and_update().is_finished() {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

enum Wake {
    Tick,
    Cancelled,
    Finished,
}

async fn run_session(
    inner: Arc<MonitorInner>,
    id: SessionId,
    mut session: PollingSession,
    state: Arc<watch::Sender<SessionState>>,
    mut cancel: watch::Receiver<bool>,
) {
    let hash = session.hash.clone();
    let mut observed = state.subscribe();
    let mut delay = Duration::ZERO;
    let mut transient_failures = 0u32;
    let mut upstream_errors = 0u32;
    let mut fatal_failures = 0u32;
    let mut last_record: Option<PaymentStatusRecord> = None;

    loop {
        let wake_at = (Instant::now() + delay).min(session.deadline);
        let wake = tokio::select! {
            biased;
            () = cancel_requested(&mut cancel) => Wake::Cancelled,
            () = finished_elsewhere(&mut observed) => Wake::Finished,
            () = tokio::time::sleep_until(wake_at) => Wake::Tick,
        };
        match wake {
            Wake::Tick => {}
            Wake::Cancelled => {
                finish_cancelled(&inner, &hash, &state);
                break;
            }
            Wake::Finished => {
                debug!("Session for {hash} settled by another path");
                break;
            }
        }

        if session.deadline_reached() {
            let ambiguous = Error::AmbiguousState { hash: hash.clone() };
            warn!("{ambiguous}, forcing expiry");
            inner
                .settle(
                    &hash,
                    SessionOutcome::Expired {
                        reason: ExpiryReason::DeadlineElapsed,
                        record: last_record.take(),
                    },
                )
                .await;
            break;
        }

        let result = inner.check(&hash).await;
        session.attempts_made += 1;

        if *cancel.borrow() {
            debug!("Discarding result for cancelled session {hash}");
            finish_cancelled(&inner, &hash, &state);
            break;
        }

        match result {
            Ok(record) => {
                transient_failures = 0;
                upstream_errors = 0;
                fatal_failures = 0;
                session.last_status = record.status;
                debug!(
                    "Check {} for {hash}: {}",
                    session.attempts_made, record.status
                );
                inner.emit(MonitorEvent::StatusChecked {
                    hash: hash.clone(),
                    status: record.status,
                    attempt: session.attempts_made,
                });

                if record.status.is_terminal() {
                    inner.reconcile(record).await;
                    break;
                }
                last_record = Some(record);
                if !publish_progress(&state, session.state()) {
                    break;
                }
                delay = session.interval;
            }
            Err(e) if e.is_fatal() => {
                fatal_failures += 1;
                transient_failures = 0;
                error!("Settlement API rejected check for {hash}: {e}");
                inner.emit(MonitorEvent::CheckFailed {
                    hash: hash.clone(),
                    category: e.category(),
                    message: e.to_string(),
                });

                if fatal_failures >= inner.config.fatal_abort_threshold {
                    let reason = e.to_string();
                    inner
                        .alert(&hash, &format!("Polling aborted: {reason}"))
                        .await;
                    if publish_progress(
                        &state,
                        SessionState::Finished(SessionOutcome::Aborted {
                            reason: reason.clone(),
                        }),
                    ) {
                        inner.emit(MonitorEvent::Aborted {
                            hash: hash.clone(),
                            reason,
                        });
                    }
                    break;
                }
                if !publish_progress(&state, session.state()) {
                    break;
                }
                delay = session.interval;
            }
            Err(e) => {
                fatal_failures = 0;
                transient_failures += 1;
                if e.counts_toward_cap() {
                    upstream_errors += 1;
                }
                warn!(
                    "Check {} for {hash} failed ({transient_failures} in a row): {e}",
                    session.attempts_made
                );
                inner.emit(MonitorEvent::CheckFailed {
                    hash: hash.clone(),
                    category: e.category(),
                    message: e.to_string(),
                });

                if upstream_errors >= inner.config.max_upstream_errors {
                    inner
                        .alert(
                            &hash,
                            &format!(
                                "Giving up after {upstream_errors} unexpected settlement answers: {e}"
                            ),
                        )
                        .await;
                    inner
                        .settle(
                            &hash,
                            SessionOutcome::Expired {
                                reason: ExpiryReason::UpstreamUnavailable,
                                record: last_record.take(),
                            },
                        )
                        .await;
                    break;
                }
                if !publish_progress(&state, session.state()) {
                    break;
                }
                delay = inner.backoff.delay(transient_failures);
            }
        }
    }

    inner.registry.release(&hash, id);
    debug!("Session for {hash} ended after {} checks", session.attempts_made);
}

fn finish_cancelled(inner: &MonitorInner, hash: &str, state: &watch::Sender<SessionState>) {
    if publish_progress(state, SessionState::Finished(SessionOutcome::Cancelled)) {
        info!("Session for {hash} cancelled");
        inner.emit(MonitorEvent::Cancelled {
            hash: hash.to_string(),
        });
    }
}
