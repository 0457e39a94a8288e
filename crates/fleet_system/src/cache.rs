//! Per-participant RPC component proxy cache.

use std::collections::HashMap;

use fleet_net::{InterfaceId, RpcProxy};
use tokio::sync::Mutex;

use crate::error::ControlError;

/// Cache key: a component addressed by name and interface, or by interface
/// alone (first component implementing it).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// `(component name, interface id)`.
    Named {
        /// The component name.
        component: String,
        /// The interface the proxy is resolved against.
        interface_id: InterfaceId,
    },
    /// Interface id alone, component name left to the participant.
    ByIid(InterfaceId),
}

/// Memoizes resolved RPC proxies per key.
///
/// At most one entry per key. Misses resolve through the supplied closure
/// and store the proxy on success; failures are returned without storing,
/// so later attempts retry resolution (no negative caching).
///
/// The map lock is held across resolution, which serializes concurrent
/// resolutions: callers racing on the same key observe the winner's entry
/// instead of resolving twice.
pub struct ComponentProxyCache {
    entries: Mutex<HashMap<CacheKey, RpcProxy>>,
}

impl ComponentProxyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached proxy for `key`, or resolve, store, and return it.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's error; the cache is left untouched.
    pub async fn resolve_with<F, Fut>(
        &self,
        key: CacheKey,
        resolve: F,
    ) -> Result<RpcProxy, ControlError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RpcProxy, ControlError>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(proxy) = entries.get(&key) {
            return Ok(proxy.clone());
        }
        let proxy = resolve().await?;
        entries.insert(key, proxy.clone());
        Ok(proxy)
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for ComponentProxyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentProxyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentProxyCache").finish_non_exhaustive()
    }
}
