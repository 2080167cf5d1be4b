//! Per-target cache of validation snapshots.
//!
//! Validation is expensive, so the host-facing service runs it at most once
//! per target until the entry is reset or the [`EvictionPolicy`] says it is
//! stale. Recovery re-validation never goes through the cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::collaborators::ValidationStack;
use crate::domain::{Result, TargetId, ValidationSnapshot};

/// Decides whether a cached snapshot may still be served.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn is_fresh(&self, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> bool;
}

/// Entries live until explicitly reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverExpire;

impl EvictionPolicy for NeverExpire {
    fn is_fresh(&self, _captured_at: DateTime<Utc>, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// Entries older than the given age are re-validated.
#[derive(Debug, Clone, Copy)]
pub struct MaxAge(pub Duration);

impl EvictionPolicy for MaxAge {
    fn is_fresh(&self, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - captured_at).to_std() {
            Ok(age) => age <= self.0,
            // Captured "in the future" (clock went backwards): keep it.
            Err(_) => true,
        }
    }
}

#[derive(Debug)]
pub struct ResultCache {
    entries: Mutex<HashMap<TargetId, ValidationSnapshot>>,
    policy: Arc<dyn EvictionPolicy>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Arc::new(NeverExpire))
    }
}

impl ResultCache {
    pub fn new(policy: Arc<dyn EvictionPolicy>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Serve a fresh cached snapshot or run the stack and cache the result.
    ///
    /// The lock is held while the stack runs, so concurrent callers for the
    /// same cache wait for one validation instead of starting their own.
    /// Failed validations are not cached.
    pub async fn get_or_run(
        &self,
        target: &TargetId,
        stack: &ValidationStack,
    ) -> Result<ValidationSnapshot> {
        let mut entries = self.entries.lock().await;
        if let Some(snapshot) = entries.get(target) {
            if self.policy.is_fresh(snapshot.captured_at, Utc::now()) {
                debug!(target = %target, "validation cache hit");
                return Ok(snapshot.clone());
            }
            debug!(target = %target, "validation cache entry expired");
        }

        let snapshot = stack.run(target).await?;
        entries.insert(target.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Cached snapshot for `target`, regardless of freshness.
    pub async fn get(&self, target: &TargetId) -> Option<ValidationSnapshot> {
        self.entries.lock().await.get(target).cloned()
    }

    /// Drop the entry for `target`; returns whether one existed.
    pub async fn reset(&self, target: &TargetId) -> bool {
        self.entries.lock().await.remove(target).is_some()
    }

    pub async fn reset_all(&self) {
        self.entries.lock().await.clear();
    }

    /// Targets with a cached entry, sorted.
    pub async fn targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = self.entries.lock().await.keys().cloned().collect();
        targets.sort();
        targets
    }
}
