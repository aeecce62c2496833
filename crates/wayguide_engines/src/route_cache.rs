#![forbid(unsafe_code)]

use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use wayguide_kernel_contracts::route::{EngineTag, Route, RoutingMode};
use wayguide_kernel_contracts::{GeoPoint, MonotonicTimeNs};

use crate::ttl_cache::{CacheStats, TtlCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteCacheConfig {
    /// Decimal places kept from each coordinate; 4 is roughly an 11 m grid.
    pub precision_decimals: u8,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl RouteCacheConfig {
    pub fn mvp_v1() -> Self {
        Self {
            precision_decimals: 4,
            ttl_secs: 3_600,
            max_entries: 100,
        }
    }
}

/// Routes keyed by rounded start/end coordinates and routing mode.
#[derive(Debug)]
pub struct RouteCache {
    config: RouteCacheConfig,
    inner: Mutex<TtlCache<String, Route>>,
}

impl RouteCache {
    pub fn new(config: RouteCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(TtlCache::new(config.max_entries)),
        }
    }

    pub fn key(&self, start: GeoPoint, end: GeoPoint, mode: RoutingMode) -> String {
        let scale = 10f64.powi(i32::from(self.config.precision_decimals.min(9)));
        let q = |v: f64| (v * scale).round() as i64;
        let raw = format!(
            "{}:{}:{}:{}:{}",
            q(start.lat),
            q(start.lng),
            q(end.lat),
            q(end.lng),
            mode.as_str()
        );
        let digest = Sha256::digest(raw.as_bytes());
        let mut hex = String::with_capacity(6 + digest.len() * 2);
        hex.push_str("route_");
        for b in digest {
            hex.push_str(&format!("{b:02x}"));
        }
        hex
    }

    /// Hit only while unexpired and produced by `active_engine`; a foreign engine tag is a miss.
    pub fn get(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        mode: RoutingMode,
        active_engine: &EngineTag,
        now: MonotonicTimeNs,
    ) -> Option<Route> {
        let key = self.key(start, end, mode);
        let mut inner = self.lock();
        let route = inner.get(&key, now)?;
        if &route.engine_tag != active_engine {
            debug!(
                cached_engine = route.engine_tag.as_str(),
                active_engine = active_engine.as_str(),
                "route cache entry from another engine treated as miss"
            );
            inner.delete(&key);
            return None;
        }
        Some(route)
    }

    pub fn set(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        mode: RoutingMode,
        route: Route,
        now: MonotonicTimeNs,
    ) {
        let key = self.key(start, end, mode);
        let ttl_ms = self.config.ttl_secs.saturating_mul(1_000);
        self.lock().set(key, route, ttl_ms, now);
    }

    pub fn cleanup_expired(&self, now: MonotonicTimeNs) -> usize {
        self.lock().cleanup_expired(now)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    fn lock(&self) -> MutexGuard<'_, TtlCache<String, Route>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("route cache lock poisoned; recovering");
                self.inner.clear_poison();
                poisoned.into_inner()
            }
        }
    }
}
