//! Per-suggestion execution lock.
//!
//! A lock is a short-lived key `(job_id, suggestion_index)` with a TTL. Its
//! existence means a pipeline run is in flight; absence means it is safe to
//! start one. Triggers may come from independent requests or processes, so
//! the key lives in shared storage rather than in process memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drape_core::types::{JobId, SuggestionIndex};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::StoreError;

/// Identifies the suggestion a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LockKey {
    pub job_id: JobId,
    pub suggestion_index: SuggestionIndex,
}

impl LockKey {
    pub fn new(job_id: JobId, suggestion_index: SuggestionIndex) -> Self {
        Self {
            job_id,
            suggestion_index,
        }
    }
}

/// Proof of ownership returned by a successful acquisition. Release only
/// removes the lock if the token still matches, so a holder whose TTL ran
/// out cannot delete a lock someone else acquired since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(pub uuid::Uuid);

impl LockToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

/// TTL'd mutual exclusion keyed by suggestion.
#[async_trait]
pub trait ExecutionLock: Send + Sync {
    /// Atomically create the lock if it is absent or expired.
    ///
    /// Returns `None` when another holder owns an unexpired lock.
    async fn try_acquire(&self, key: LockKey, ttl: Duration)
        -> Result<Option<LockToken>, StoreError>;

    /// Push the expiry of a lock `token` still owns to `ttl` from now.
    ///
    /// Returns `false` when the lock has been taken over by another holder
    /// or removed.
    async fn extend(&self, key: LockKey, token: LockToken, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Remove the lock if `token` still owns it.
    async fn release(&self, key: LockKey, token: LockToken) -> Result<(), StoreError>;
}

/// Scoped ownership of an execution lock.
///
/// While the guard lives a heartbeat task extends the lock every third of
/// its TTL, so a run may outlast the TTL without losing the lock. If an
/// extension finds the lock owned by someone else the guard is marked lost;
/// [`renew`](Self::renew) reports that to the holder.
///
/// Call [`release`](Self::release) on normal exit paths. If the guard is
/// dropped without it (early return, panic unwinding) the release is
/// spawned onto the current Tokio runtime; outside a runtime the lock is
/// left to expire through its TTL.
pub struct LockGuard {
    lock: Arc<dyn ExecutionLock>,
    key: LockKey,
    token: LockToken,
    ttl: Duration,
    lost: Arc<AtomicBool>,
    heartbeat: JoinHandle<()>,
    released: bool,
}

impl LockGuard {
    /// Try to take the lock for `key`. `Ok(None)` means it is held elsewhere.
    pub async fn acquire(
        lock: Arc<dyn ExecutionLock>,
        key: LockKey,
        ttl: Duration,
    ) -> Result<Option<Self>, StoreError> {
        let Some(token) = lock.try_acquire(key, ttl).await? else {
            return Ok(None);
        };
        let lost = Arc::new(AtomicBool::new(false));
        let heartbeat = tokio::spawn(heartbeat(
            Arc::clone(&lock),
            key,
            token,
            ttl,
            Arc::clone(&lost),
        ));
        Ok(Some(Self {
            lock,
            key,
            token,
            ttl,
            lost,
            heartbeat,
            released: false,
        }))
    }

    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn token(&self) -> LockToken {
        self.token
    }

    /// Whether a heartbeat or renewal found the lock owned by someone else.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Extend the lock now. Returns `false` once the lock is lost.
    pub async fn renew(&self) -> Result<bool, StoreError> {
        if self.is_lost() {
            return Ok(false);
        }
        let held = self.lock.extend(self.key, self.token, self.ttl).await?;
        if !held {
            self.lost.store(true, Ordering::SeqCst);
        }
        Ok(held)
    }

    /// Release the lock now. Failures are logged; the TTL bounds the damage.
    pub async fn release(mut self) {
        self.released = true;
        self.heartbeat.abort();
        if let Err(e) = self.lock.release(self.key, self.token).await {
            tracing::warn!(
                job_id = %self.key.job_id,
                suggestion_index = self.key.suggestion_index,
                error = %e,
                "Failed to release execution lock",
            );
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.heartbeat.abort();
        if self.released {
            return;
        }
        let key = self.key;
        let token = self.token;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = Arc::clone(&self.lock);
                handle.spawn(async move {
                    if let Err(e) = lock.release(key, token).await {
                        tracing::warn!(
                            job_id = %key.job_id,
                            suggestion_index = key.suggestion_index,
                            error = %e,
                            "Failed to release execution lock after abnormal exit",
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    job_id = %key.job_id,
                    suggestion_index = key.suggestion_index,
                    "No runtime to release execution lock; it will expire",
                );
            }
        }
    }
}

/// Keep extending the lock until it is lost or the task is aborted.
/// Extension errors are logged and retried on the next beat.
async fn heartbeat(
    lock: Arc<dyn ExecutionLock>,
    key: LockKey,
    token: LockToken,
    ttl: Duration,
    lost: Arc<AtomicBool>,
) {
    let period = (ttl / 3).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match lock.extend(key, token, ttl).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    job_id = %key.job_id,
                    suggestion_index = key.suggestion_index,
                    "Execution lock taken over by another holder",
                );
                lost.store(true, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %key.job_id,
                    suggestion_index = key.suggestion_index,
                    error = %e,
                    "Failed to extend execution lock",
                );
            }
        }
    }
}
