//! Registry of active polling sessions and settled hashes.
//!
//! This is the one place where different sessions meet. Registration and
//! settlement both happen under a single lock so that:
//! - a hash never has two active sessions
//! - a hash is confirmed or expired at most once, whichever path (polling,
//!   manual verify, bulk verify) gets there first
//!
//! A settled hash is only reported as finished once the winner's hooks have
//! run. Until then later callers wait on the ledger entry.

use super::session::{SessionOutcome, SessionState};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default number of settled hashes remembered.
const DEFAULT_SETTLED_CAPACITY: usize = 10_000;

/// Registry statistics for monitoring.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Sessions created.
    pub sessions_started: u64,
    /// Monitor requests that joined an active session.
    pub sessions_joined: u64,
    /// Hashes settled.
    pub settled: u64,
    /// Settle attempts rejected because the hash was already settled.
    pub duplicate_settles: u64,
}

/// Identifies one session among all sessions ever run for a hash.
pub(crate) type SessionId = u64;

struct ActiveSession {
    id: SessionId,
    state: Arc<watch::Sender<SessionState>>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

struct SettledEntry {
    outcome: SessionOutcome,
    /// Finished once the winner's hooks have run.
    done: Arc<watch::Sender<SessionState>>,
}

struct RegistryState {
    active: HashMap<String, ActiveSession>,
    settled: LruCache<String, SettledEntry>,
    next_id: SessionId,
    stats: RegistryStats,
}

/// Result of registering interest in a hash.
pub(crate) enum Registration {
    /// A new session was registered; the caller must run it.
    Created {
        id: SessionId,
        state: Arc<watch::Sender<SessionState>>,
        cancel: watch::Receiver<bool>,
    },
    /// A session is already running, or the hash is being settled.
    Joined(watch::Receiver<SessionState>),
    /// The hash settled earlier.
    Settled(SessionOutcome),
}

/// Result of trying to settle a hash.
pub(crate) enum Claim {
    /// The caller settles the hash. The ledger entry is marked finished when
    /// the guard is dropped.
    Won(SettleGuard),
    /// Someone else settles it. The receiver turns `Finished` once their
    /// hooks have run.
    Lost(watch::Receiver<SessionState>),
}

/// Held by the path settling a hash while its hooks run.
pub(crate) struct SettleGuard {
    outcome: SessionOutcome,
    done: Arc<watch::Sender<SessionState>>,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.done
            .send_replace(SessionState::Finished(self.outcome.clone()));
    }
}

/// Hash → session registry with an idempotency ledger of settled hashes.
pub struct SessionRegistry {
    inner: Mutex<RegistryState>,
}

impl SessionRegistry {
    /// Create a registry with the default ledger capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SETTLED_CAPACITY)
    }

    /// Create a registry remembering up to `capacity` settled hashes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(RegistryState {
                active: HashMap::new(),
                settled: LruCache::new(cap),
                next_id: 0,
                stats: RegistryStats::default(),
            }),
        }
    }

    /// Atomically join, or create, the session for `hash`.
    pub(crate) fn register(&self, hash: &str) -> Registration {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(entry) = inner.settled.get(hash) {
            if entry.done.borrow().is_finished() {
                return Registration::Settled(entry.outcome.clone());
            }
            let state = entry.done.subscribe();
            inner.stats.sessions_joined += 1;
            debug!("Hash {hash} is being settled, waiting for it");
            return Registration::Joined(state);
        }

        if let Some(active) = inner.active.get(hash) {
            let state = active.state.subscribe();
            inner.stats.sessions_joined += 1;
            debug!("Joined active session for {hash}");
            return Registration::Joined(state);
        }

        let (state, _) = watch::channel(SessionState::Created);
        let state = Arc::new(state);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.active.insert(
            hash.to_string(),
            ActiveSession {
                id,
                state: Arc::clone(&state),
                cancel: cancel_tx,
                task: None,
            },
        );
        inner.stats.sessions_started += 1;
        Registration::Created {
            id,
            state,
            cancel: cancel_rx,
        }
    }

    /// Record the task driving session `id` for `hash`.
    ///
    /// Ignored if that session already ended, even if a newer session for
    /// the same hash has registered since.
    pub(crate) fn attach_task(&self, hash: &str, id: SessionId, task: JoinHandle<()>) {
        match self.inner.lock().active.get_mut(hash) {
            Some(active) if active.id == id => active.task = Some(task),
            _ => debug!("Session {id} for {hash} ended before its task was attached"),
        }
    }

    /// Claim the right to settle `hash`. Wins exactly once per hash (while
    /// the hash stays in the ledger).
    pub(crate) fn claim(&self, hash: &str, outcome: &SessionOutcome) -> Claim {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(entry) = inner.settled.get(hash) {
            inner.stats.duplicate_settles += 1;
            debug!("Hash {hash} already settled, not settling again");
            return Claim::Lost(entry.done.subscribe());
        }
        let (done, _) = watch::channel(SessionState::Created);
        let done = Arc::new(done);
        inner.settled.put(
            hash.to_string(),
            SettledEntry {
                outcome: outcome.clone(),
                done: Arc::clone(&done),
            },
        );
        inner.stats.settled += 1;
        Claim::Won(SettleGuard {
            outcome: outcome.clone(),
            done,
        })
    }

    /// The recorded outcome for a settled hash.
    #[must_use]
    pub fn settled_outcome(&self, hash: &str) -> Option<SessionOutcome> {
        self.inner
            .lock()
            .settled
            .peek(hash)
            .map(|entry| entry.outcome.clone())
    }

    /// Publish a final state to the session watching `hash`, if any.
    pub(crate) fn publish_finished(&self, hash: &str, outcome: &SessionOutcome) {
        if let Some(active) = self.inner.lock().active.get(hash) {
            active
                .state
                .send_replace(SessionState::Finished(outcome.clone()));
        }
    }

    /// Remove the active entry for `hash` if it still belongs to session `id`.
    pub(crate) fn release(&self, hash: &str, id: SessionId) {
        let mut inner = self.inner.lock();
        if inner.active.get(hash).is_some_and(|active| active.id == id) {
            inner.active.remove(hash);
        }
    }

    /// Ask the session for `hash` to stop at its next tick.
    pub(crate) fn cancel(&self, hash: &str) -> bool {
        match self.inner.lock().active.get(hash) {
            Some(active) => {
                active.cancel.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Cancel every active session and hand back their tasks.
    pub(crate) fn cancel_all(&self) -> Vec<JoinHandle<()>> {
        let mut inner = self.inner.lock();
        inner
            .active
            .values_mut()
            .filter_map(|active| {
                active.cancel.send_replace(true);
                active.task.take()
            })
            .collect()
    }

    /// Returns true if a session is running for `hash`.
    #[must_use]
    pub fn is_active(&self, hash: &str) -> bool {
        self.inner.lock().active.contains_key(hash)
    }

    /// Number of running sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.inner.lock().stats.clone()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
