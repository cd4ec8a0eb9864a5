//! Per-plugin authentication result cache
//!
//! Entries are keyed by a digest of the full credential tuple, so a cached
//! result is only ever returned for the exact password it was computed for.
//! Concurrent misses on one key share a single computation; failed
//! computations are not stored.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

/// SHA-256 over the length-prefixed plugin name, username and password.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(plugin_name: &str, username: &str, password: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [plugin_name, username, password] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.iter().take(6).map(|b| format!("{b:02x}")).collect();
        write!(f, "CacheKey({prefix}…)")
    }
}

#[derive(Debug, Clone)]
struct Cached<V> {
    value: V,
    expires_at: Instant,
}

type Slot<V> = Arc<OnceCell<Cached<V>>>;

/// Minimum time between two sweeps of one namespace.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Entries of one plugin.
struct Namespace<V> {
    entries: DashMap<CacheKey, Slot<V>>,
    last_sweep: Mutex<Instant>,
}

impl<V> Namespace<V> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Drop expired entries, at most once per [`SWEEP_INTERVAL`]. Slots
    /// still being computed are kept.
    fn sweep_if_due(&self, name: &str, now: Instant) {
        {
            let mut last = self.last_sweep.lock();
            if now.duration_since(*last) < SWEEP_INTERVAL {
                return;
            }
            *last = now;
        }
        let before = self.entries.len();
        self.entries
            .retain(|_, slot| !slot.get().is_some_and(|cached| cached.expires_at <= now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(namespace = %name, removed, "Swept expired auth cache entries");
        }
    }
}

/// Cache of authentication results, one namespace per plugin.
///
/// Expired entries are replaced when their key is requested again and
/// swept from the namespace periodically, so keys that are never repeated
/// (wrong passwords) do not accumulate.
pub struct AuthCache<V> {
    namespaces: DashMap<String, Arc<Namespace<V>>>,
}

impl<V> AuthCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            namespaces: DashMap::new(),
        }
    }

    fn namespace(&self, name: &str) -> Arc<Namespace<V>> {
        if let Some(ns) = self.namespaces.get(name) {
            return Arc::clone(ns.value());
        }
        Arc::clone(
            self.namespaces
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Namespace::new()))
                .value(),
        )
    }

    /// Live slot for `key`, replacing an expired one.
    fn slot(&self, ns: &Namespace<V>, namespace: &str, key: CacheKey) -> Slot<V> {
        let now = Instant::now();
        ns.sweep_if_due(namespace, now);
        let mut slot = ns.entries.entry(key).or_insert_with(|| Arc::new(OnceCell::new()));
        let expired = slot.value().get().is_some_and(|cached| cached.expires_at <= now);
        if expired {
            debug!(namespace = %namespace, key = ?key, "Auth cache entry expired");
            *slot.value_mut() = Arc::new(OnceCell::new());
        }
        Arc::clone(slot.value())
    }

    /// Return the live value for `key`, or run `compute` and keep its
    /// successful result for `ttl`.
    ///
    /// # Errors
    ///
    /// Whatever `compute` fails with; the failure is not cached and the next
    /// caller computes again.
    pub async fn get_or_compute<F, E>(&self, namespace: &str, key: CacheKey, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: Future<Output = Result<V, E>>,
    {
        let ns = self.namespace(namespace);
        let slot = self.slot(&ns, namespace, key);
        if slot.initialized() {
            debug!(namespace = %namespace, key = ?key, "Auth cache hit");
        }
        let result = slot
            .get_or_try_init(|| async move {
                let value = compute.await?;
                Ok::<_, E>(Cached {
                    value,
                    expires_at: Instant::now() + ttl,
                })
            })
            .await;
        match result {
            Ok(cached) => Ok(cached.value.clone()),
            Err(e) => {
                ns.entries
                    .remove_if(&key, |_, held| Arc::ptr_eq(held, &slot) && !held.initialized());
                Err(e)
            }
        }
    }

    /// Drop every entry of one namespace.
    pub fn clear_namespace(&self, namespace: &str) {
        self.namespaces.remove(namespace);
    }

    pub fn clear(&self) {
        self.namespaces.clear();
    }

    /// Computed entries held for `namespace`, including expired ones not
    /// yet swept or replaced.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map_or(0, |ns| ns.entries.iter().filter(|slot| slot.value().initialized()).count())
    }

    /// Slots held for `namespace`, computed or not.
    #[cfg(test)]
    fn slots(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, |ns| ns.entries.len())
    }
}

impl<V> Default for AuthCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for AuthCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCache")
            .field("namespaces", &self.namespaces.len())
            .finish()
    }
}
