#![forbid(unsafe_code)]

use std::sync::{Mutex, MutexGuard};

use tracing::warn;
use wayguide_kernel_contracts::MonotonicTimeNs;

use crate::ttl_cache::{CacheStats, TtlCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCacheConfig {
    pub default_ttl_ms: u64,
    /// Shorter window while vision is on so obstacle changes surface quickly.
    pub vision_ttl_ms: u64,
    pub max_entries: usize,
}

impl ResponseCacheConfig {
    pub fn mvp_v1() -> Self {
        Self {
            default_ttl_ms: 2_000,
            vision_ttl_ms: 1_000,
            max_entries: 256,
        }
    }
}

/// Cache key that changes whenever the step or the obstacle set changes, so entries go stale
/// without explicit invalidation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseKey {
    pub session_id: String,
    pub step_index: usize,
    pub obstacle_signature: String,
}

impl ResponseKey {
    pub fn new(session_id: &str, step_index: usize, hazards: &[String]) -> Self {
        Self {
            session_id: session_id.to_string(),
            step_index,
            obstacle_signature: obstacle_signature(hazards),
        }
    }

    pub fn as_string(&self) -> String {
        format!(
            "instruction_{}_{}_{}",
            self.session_id, self.step_index, self.obstacle_signature
        )
    }
}

/// `none` for a clear path, otherwise `obs_` followed by the sorted hazard labels.
pub fn obstacle_signature(hazards: &[String]) -> String {
    if hazards.is_empty() {
        return "none".to_string();
    }
    let mut sorted: Vec<&str> = hazards.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    format!("obs_{}", sorted.join("_"))
}

#[derive(Debug)]
pub struct ResponseCache<V: Clone> {
    config: ResponseCacheConfig,
    inner: Mutex<TtlCache<ResponseKey, V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: ResponseCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(TtlCache::new(config.max_entries)),
        }
    }

    pub fn ttl_ms(&self, vision_enabled: bool) -> u64 {
        if vision_enabled {
            self.config.vision_ttl_ms
        } else {
            self.config.default_ttl_ms
        }
    }

    pub fn get(&self, key: &ResponseKey, now: MonotonicTimeNs) -> Option<V> {
        self.lock().get(key, now)
    }

    pub fn set(&self, key: ResponseKey, payload: V, vision_enabled: bool, now: MonotonicTimeNs) {
        let ttl_ms = self.ttl_ms(vision_enabled);
        self.lock().set(key, payload, ttl_ms, now);
    }

    /// Drops everything cached for one session; used when its route is replaced.
    pub fn invalidate_session(&self, session_id: &str) -> usize {
        self.lock().remove_where(|k| k.session_id == session_id)
    }

    pub fn cleanup_expired(&self, now: MonotonicTimeNs) -> usize {
        self.lock().cleanup_expired(now)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    fn lock(&self) -> MutexGuard<'_, TtlCache<ResponseKey, V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("response cache lock poisoned; recovering");
                self.inner.clear_poison();
                poisoned.into_inner()
            }
        }
    }
}
