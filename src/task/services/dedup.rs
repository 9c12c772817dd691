//! Idempotency filter keyed by `(task, round, nonce)`.
//!
//! The first request for a key becomes the leader and runs the round. Any
//! request presenting the same key while the leader works waits for the
//! leader's outcome, and requests arriving afterwards receive the stored
//! outcome verbatim. Payloads are compared by digest so a reused nonce with a
//! different brief is refused.

use super::{OrchestrationError, OrchestrationResult};
use crate::task::domain::{Nonce, PayloadDigest, RoundNumber, RoundView, TaskDomainError, TaskId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Outcome of processing one round request.
pub type RoundOutcome = OrchestrationResult<RoundView>;

/// Key identifying a logical round request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    /// Task identifier.
    pub task_id: TaskId,
    /// Round number.
    pub round: RoundNumber,
    /// Request nonce.
    pub nonce: Nonce,
}

impl IdempotencyKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(task_id: TaskId, round: RoundNumber, nonce: Nonce) -> Self {
        Self {
            task_id,
            round,
            nonce,
        }
    }

    fn duplicate_nonce(&self) -> OrchestrationError {
        OrchestrationError::Domain(TaskDomainError::DuplicateNonce {
            task_id: self.task_id.clone(),
            round: self.round,
        })
    }
}

enum Slot {
    InFlight {
        digest: PayloadDigest,
        outcome: watch::Receiver<Option<RoundOutcome>>,
    },
    Settled {
        digest: PayloadDigest,
        outcome: RoundOutcome,
        settled_at: Instant,
    },
}

type Slots = Arc<Mutex<HashMap<IdempotencyKey, Slot>>>;

/// How a request was admitted by the filter.
#[derive(Debug)]
pub enum Admission {
    /// No request with this key is known; the caller must run the round.
    Lead(LeaderTicket),
    /// A request with this key is running; the caller should wait.
    Follow(FollowerWait),
    /// A request with this key already settled; this is its outcome.
    Replay(RoundOutcome),
}

/// Deduplicates round requests in memory.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyFilter {
    slots: Slots,
    retention: Option<Duration>,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InFlight { .. } => f.write_str("InFlight"),
            Self::Settled { settled_at, .. } => {
                f.debug_struct("Settled").field("settled_at", settled_at).finish()
            }
        }
    }
}

impl IdempotencyFilter {
    /// Creates a filter that keeps settled outcomes for `retention`, or
    /// forever when `None`.
    #[must_use]
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            slots: Slots::default(),
            retention,
        }
    }

    /// Admits a request.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::DuplicateNonce`] when the key is known with
    /// a different payload digest.
    pub fn admit(
        &self,
        key: IdempotencyKey,
        digest: &PayloadDigest,
    ) -> OrchestrationResult<Admission> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(retention) = self.retention {
            slots.retain(|_, slot| match slot {
                Slot::Settled { settled_at, .. } => settled_at.elapsed() < retention,
                Slot::InFlight { .. } => true,
            });
        }

        match slots.get(&key) {
            Some(Slot::InFlight { digest: known, .. } | Slot::Settled { digest: known, .. })
                if known != digest =>
            {
                Err(key.duplicate_nonce())
            }
            Some(Slot::InFlight { outcome, .. }) => Ok(Admission::Follow(FollowerWait {
                outcome: outcome.clone(),
                key,
            })),
            Some(Slot::Settled { outcome, .. }) => Ok(Admission::Replay(outcome.clone())),
            None => {
                let (sender, receiver) = watch::channel(None);
                slots.insert(
                    key.clone(),
                    Slot::InFlight {
                        digest: digest.clone(),
                        outcome: receiver,
                    },
                );
                Ok(Admission::Lead(LeaderTicket {
                    slots: Arc::clone(&self.slots),
                    key,
                    digest: digest.clone(),
                    sender,
                    finished: false,
                }))
            }
        }
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Right to run a round, held by the first request for a key.
///
/// Dropping the ticket without settling forgets the key and wakes waiters
/// with [`OrchestrationError::Interrupted`].
#[derive(Debug)]
pub struct LeaderTicket {
    slots: Slots,
    key: IdempotencyKey,
    digest: PayloadDigest,
    sender: watch::Sender<Option<RoundOutcome>>,
    finished: bool,
}

impl LeaderTicket {
    /// Returns the key this ticket leads.
    #[must_use]
    pub const fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// Stores the outcome for replay and hands it to waiting requests.
    pub fn settle(mut self, outcome: RoundOutcome) {
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.insert(
                self.key.clone(),
                Slot::Settled {
                    digest: self.digest.clone(),
                    outcome: outcome.clone(),
                    settled_at: Instant::now(),
                },
            );
        }
        self.sender.send_replace(Some(outcome));
        self.finished = true;
    }

    /// Hands the outcome to waiting requests without storing it.
    ///
    /// Used for requests the registry refused, which a later request with
    /// the same key may legitimately retry.
    pub fn release(mut self, outcome: RoundOutcome) {
        self.forget();
        self.sender.send_replace(Some(outcome));
        self.finished = true;
    }

    fn forget(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(slots.get(&self.key), Some(Slot::InFlight { .. })) {
            slots.remove(&self.key);
        }
    }
}

impl Drop for LeaderTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.forget();
        }
    }
}

/// Handle for a request waiting on the leader of its key.
#[derive(Debug)]
pub struct FollowerWait {
    key: IdempotencyKey,
    outcome: watch::Receiver<Option<RoundOutcome>>,
}

impl FollowerWait {
    /// Waits up to `limit` for the leader's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::StillProcessing`] when the wait expires
    /// and [`OrchestrationError::Interrupted`] when the leader vanished.
    pub async fn wait(mut self, limit: Duration) -> RoundOutcome {
        let interrupted = || OrchestrationError::Interrupted {
            task_id: self.key.task_id.clone(),
            round: self.key.round,
        };
        match tokio::time::timeout(limit, self.outcome.wait_for(Option::is_some)).await {
            Err(_elapsed) => Err(OrchestrationError::StillProcessing {
                task_id: self.key.task_id.clone(),
                round: self.key.round,
            }),
            Ok(Err(_closed)) => Err(interrupted()),
            Ok(Ok(settled)) => settled.clone().unwrap_or_else(|| Err(interrupted())),
        }
    }
}
