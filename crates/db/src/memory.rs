//! In-memory [`JobStore`] and [`ExecutionLock`].
//!
//! Used when no `DATABASE_URL` is configured and throughout the test
//! suites. Semantics match the Postgres implementations: each operation is
//! atomic per job, and locks honour their TTL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use drape_core::error::CoreError;
use drape_core::job::{Job, SuggestionPatch};
use drape_core::types::{JobId, SuggestionIndex};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::lock::{ExecutionLock, LockKey, LockToken};
use crate::store::JobStore;

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

/// Job store backed by a mutex-guarded map.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Run `f` against the stored job under the map lock.
    async fn mutate<F>(&self, job_id: JobId, f: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), CoreError> + Send,
    {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        // Work on a copy so a rejected patch leaves the record untouched.
        let mut updated = job.clone();
        f(&mut updated)?;
        *job = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.job_id) {
            return Err(CoreError::Conflict(format!("Job {} already exists", job.job_id)).into());
        }
        jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn update_suggestion(
        &self,
        job_id: JobId,
        index: SuggestionIndex,
        patch: &SuggestionPatch,
    ) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| {
            job.apply_suggestion_patch(index, patch, Utc::now())
                .map(|_| ())
        })
        .await
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| job.request_cancel(Utc::now()))
            .await
    }

    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<Job, StoreError> {
        let error = error.to_string();
        self.mutate(job_id, move |job| {
            job.fail(error, Utc::now());
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Execution lock
// ---------------------------------------------------------------------------

/// Execution lock backed by a mutex-guarded map of expiry instants.
#[derive(Default)]
pub struct MemoryExecutionLock {
    held: Mutex<HashMap<LockKey, (LockToken, Instant)>>,
}

impl MemoryExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the lock for `key` whoever holds it.
    pub async fn evict(&self, key: LockKey) {
        self.held.lock().await.remove(&key);
    }

    /// Whether an unexpired lock exists for `key`.
    pub async fn is_held(&self, key: LockKey) -> bool {
        self.held
            .lock()
            .await
            .get(&key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }
}

#[async_trait]
impl ExecutionLock for MemoryExecutionLock {
    async fn try_acquire(
        &self,
        key: LockKey,
        ttl: Duration,
    ) -> Result<Option<LockToken>, StoreError> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        if let Some((_, expires)) = held.get(&key) {
            if *expires > now {
                return Ok(None);
            }
        }
        let token = LockToken::generate();
        held.insert(key, (token, now + ttl));
        Ok(Some(token))
    }

    async fn extend(
        &self,
        key: LockKey,
        token: LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut held = self.held.lock().await;
        match held.get_mut(&key) {
            Some((owner, expires)) if *owner == token => {
                *expires = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: LockKey, token: LockToken) -> Result<(), StoreError> {
        let mut held = self.held.lock().await;
        if held.get(&key).is_some_and(|(owner, _)| *owner == token) {
            held.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use drape_core::generation::GenerationMode;
    use drape_core::job::{JobInput, JobStatus, SuggestionStatus};

    use super::*;
    use crate::lock::LockGuard;

    fn sample_job(count: usize) -> Job {
        Job::new(
            JobInput {
                human_image_url: "https://img.example.com/me.jpg".into(),
                garment_image_url: "https://img.example.com/shirt.jpg".into(),
                mode: GenerationMode::TryonOnly,
                occasion: "office".into(),
                user_profile: None,
                custom_prompt: None,
                provider: None,
            },
            count,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_then_get_returns_snapshot() {
        let store = MemoryJobStore::new();
        let job = sample_job(2);
        store.create(&job).await.unwrap();

        let fetched = store.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched, job);
        assert!(store.get(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = MemoryJobStore::new();
        let job = sample_job(1);
        store.create(&job).await.unwrap();
        assert_matches!(
            store.create(&job).await,
            Err(StoreError::Core(CoreError::Conflict(_)))
        );
    }

    #[tokio::test]
    async fn rejected_patch_leaves_record_untouched() {
        let store = MemoryJobStore::new();
        let job = sample_job(1);
        store.create(&job).await.unwrap();

        let err = store
            .update_suggestion(job.job_id, 0, &SuggestionPatch::succeeded(vec![]))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::Conflict(_)));
        assert_eq!(store.get(job.job_id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn sibling_updates_do_not_clobber_each_other() {
        let store = Arc::new(MemoryJobStore::new());
        let job = sample_job(4);
        store.create(&job).await.unwrap();

        let mut handles = Vec::new();
        for index in 0..4 {
            let store = Arc::clone(&store);
            let job_id = job.job_id;
            handles.push(tokio::spawn(async move {
                store
                    .update_suggestion(job_id, index, &SuggestionPatch::started())
                    .await
                    .unwrap();
                store
                    .update_suggestion(
                        job_id,
                        index,
                        &SuggestionPatch::succeeded(vec![format!("img-{index}")]),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        for (index, s) in stored.suggestions.iter().enumerate() {
            assert_eq!(s.status, SuggestionStatus::Succeeded);
            assert_eq!(s.image_urls, vec![format!("img-{index}")]);
        }
    }

    #[tokio::test]
    async fn missing_job_is_not_found() {
        let store = MemoryJobStore::new();
        let err = store.request_cancel(JobId::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.get_required(JobId::new()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn fail_job_marks_job_failed() {
        let store = MemoryJobStore::new();
        let job = sample_job(2);
        store.create(&job).await.unwrap();
        let failed = store.fail_job(job.job_id, "no text").await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let lock = MemoryExecutionLock::new();
        let key = LockKey::new(JobId::new(), 0);
        let ttl = Duration::from_secs(60);

        let token = lock.try_acquire(key, ttl).await.unwrap().unwrap();
        assert!(lock.try_acquire(key, ttl).await.unwrap().is_none());
        assert!(lock.is_held(key).await);

        lock.release(key, token).await.unwrap();
        assert!(!lock.is_held(key).await);
        assert!(lock.try_acquire(key, ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn locks_are_per_suggestion() {
        let lock = MemoryExecutionLock::new();
        let job_id = JobId::new();
        let ttl = Duration::from_secs(60);
        assert!(lock.try_acquire(LockKey::new(job_id, 0), ttl).await.unwrap().is_some());
        assert!(lock.try_acquire(LockKey::new(job_id, 1), ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over() {
        let lock = MemoryExecutionLock::new();
        let key = LockKey::new(JobId::new(), 0);

        let stale = lock
            .try_acquire(key, Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = lock
            .try_acquire(key, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        // The stale holder's release must not remove the new lock.
        lock.release(key, stale).await.unwrap();
        assert!(lock.is_held(key).await);
        lock.release(key, fresh).await.unwrap();
        assert!(!lock.is_held(key).await);
    }

    #[tokio::test]
    async fn only_the_owner_can_extend() {
        let lock = MemoryExecutionLock::new();
        let key = LockKey::new(JobId::new(), 0);

        let stale = lock
            .try_acquire(key, Duration::from_millis(5))
            .await
            .unwrap()
            .unwrap();
        assert!(lock.extend(key, stale, Duration::from_millis(5)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = lock
            .try_acquire(key, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert!(!lock.extend(key, stale, Duration::from_secs(60)).await.unwrap());
        assert!(lock.extend(key, fresh, Duration::from_secs(60)).await.unwrap());
        lock.release(key, fresh).await.unwrap();
        assert!(!lock.extend(key, fresh, Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn guard_keeps_lock_past_its_ttl() {
        let lock = Arc::new(MemoryExecutionLock::new());
        let key = LockKey::new(JobId::new(), 0);
        let dyn_lock: Arc<dyn ExecutionLock> = lock.clone();
        let ttl = Duration::from_millis(60);

        let guard = LockGuard::acquire(dyn_lock.clone(), key, ttl)
            .await
            .unwrap()
            .expect("lock should be free");
        tokio::time::sleep(ttl * 5).await;

        assert!(lock.is_held(key).await);
        assert!(LockGuard::acquire(dyn_lock, key, ttl).await.unwrap().is_none());
        assert!(guard.renew().await.unwrap());
        assert!(!guard.is_lost());

        guard.release().await;
        assert!(!lock.is_held(key).await);
    }

    #[tokio::test]
    async fn guard_notices_a_takeover() {
        let lock = Arc::new(MemoryExecutionLock::new());
        let key = LockKey::new(JobId::new(), 0);
        let dyn_lock: Arc<dyn ExecutionLock> = lock.clone();

        let guard = LockGuard::acquire(dyn_lock, key, Duration::from_secs(60))
            .await
            .unwrap()
            .expect("lock should be free");
        lock.evict(key).await;
        let other = lock
            .try_acquire(key, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert!(!guard.renew().await.unwrap());
        assert!(guard.is_lost());

        // Releasing a lost guard leaves the new holder's lock alone.
        guard.release().await;
        assert!(lock.is_held(key).await);
        lock.release(key, other).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let lock = Arc::new(MemoryExecutionLock::new());
        let key = LockKey::new(JobId::new(), 0);
        let dyn_lock: Arc<dyn ExecutionLock> = lock.clone();

        let guard = LockGuard::acquire(dyn_lock.clone(), key, Duration::from_secs(60))
            .await
            .unwrap()
            .expect("lock should be free");
        assert!(LockGuard::acquire(dyn_lock, key, Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());

        drop(guard);
        for _ in 0..50 {
            if !lock.is_held(key).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("lock was not released after the guard was dropped");
    }
}
