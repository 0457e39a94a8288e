//! The local stand-in for one remote participant.
//!
//! A [`ParticipantProxy`] is a handle to shared, internally synchronized
//! state: cloning yields another handle to the *same* participant, not a
//! deep copy. The underlying state lives as long as any handle does. All
//! network work is delegated to the [`SystemAccess`] collaborator; the
//! proxy itself only tracks metadata, reachability, and the component
//! proxy cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::debug;

use fleet_net::messages::HealthSnapshot;
use fleet_net::{InterfaceId, RpcProxy, SystemAccess};

use crate::cache::{CacheKey, ComponentProxyCache};
use crate::error::ControlError;
use crate::identity::ParticipantIdentity;
use crate::logging::{Severity, SystemLogger};

/// Default component name of the participant state machine.
pub const STATE_MACHINE_COMPONENT: &str = "participant_statemachine";

/// Interface id of the participant state machine.
#[must_use]
pub fn state_machine_iid() -> InterfaceId {
    InterfaceId::from("participant_statemachine.fleet.iid")
}

#[derive(Debug, Default, Clone, Copy)]
struct Priorities {
    init: i32,
    start: i32,
}

struct ProxyShared {
    identity: ParticipantIdentity,
    access: Arc<dyn SystemAccess>,
    logger: Arc<SystemLogger>,
    priorities: Mutex<Priorities>,
    additional_info: DashMap<String, String>,
    cache: ComponentProxyCache,
    /// One-way: cleared by `set_not_reachable`, never set again.
    reachable: AtomicBool,
    health_listener_running: AtomicBool,
    logging_registered: AtomicBool,
}

/// Addressable representation of one remote participant.
#[derive(Clone)]
pub struct ParticipantProxy {
    shared: Arc<ProxyShared>,
}

impl ParticipantProxy {
    /// Create the proxy and register the system's log sink at the
    /// participant.
    ///
    /// Registration is best effort: an unreachable participant still
    /// yields a proxy (so a discovered-then-crashed peer can be inspected
    /// and removed), with [`logging_registered`](Self::logging_registered)
    /// reporting `false`.
    pub async fn connect(
        identity: ParticipantIdentity,
        access: Arc<dyn SystemAccess>,
        logger: Arc<SystemLogger>,
    ) -> Self {
        let proxy = Self {
            shared: Arc::new(ProxyShared {
                identity,
                access,
                logger,
                priorities: Mutex::new(Priorities::default()),
                additional_info: DashMap::new(),
                cache: ComponentProxyCache::new(),
                reachable: AtomicBool::new(true),
                health_listener_running: AtomicBool::new(true),
                logging_registered: AtomicBool::new(false),
            }),
        };

        let shared = &proxy.shared;
        match shared
            .access
            .register_log_sink(shared.identity.name(), shared.logger.sink_url())
            .await
        {
            Ok(()) => shared.logging_registered.store(true, Ordering::SeqCst),
            Err(error) => shared.logger.log_now(
                Severity::Warning,
                shared.identity.name(),
                "participant_proxy",
                &format!("log sink registration failed: {error}"),
            ),
        }

        proxy
    }

    /// The participant's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.identity.name()
    }

    /// The participant's network URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.shared.identity.url()
    }

    /// The participant's full identity.
    #[must_use]
    pub fn identity(&self) -> &ParticipantIdentity {
        &self.shared.identity
    }

    // ── Scheduling metadata ─────────────────────────────────────────────────

    /// Set the initialization priority.
    pub fn set_init_priority(&self, priority: i32) {
        lock_unpoisoned(&self.shared.priorities).init = priority;
    }

    /// The initialization priority (0 unless set).
    #[must_use]
    pub fn init_priority(&self) -> i32 {
        lock_unpoisoned(&self.shared.priorities).init
    }

    /// Set the start priority.
    pub fn set_start_priority(&self, priority: i32) {
        lock_unpoisoned(&self.shared.priorities).start = priority;
    }

    /// The start priority (0 unless set).
    #[must_use]
    pub fn start_priority(&self) -> i32 {
        lock_unpoisoned(&self.shared.priorities).start
    }

    /// Set or overwrite one additional-info entry.
    pub fn set_additional_info(&self, key: &str, value: &str) {
        self.shared
            .additional_info
            .insert(key.to_string(), value.to_string());
    }

    /// The last-set value for `key`, or `default` if the key was never set.
    #[must_use]
    pub fn additional_info(&self, key: &str, default: &str) -> String {
        self.shared
            .additional_info
            .get(key)
            .map(|value| value.clone())
            .unwrap_or_else(|| default.to_string())
    }

    /// Copy priorities and additional info into `other`'s underlying
    /// state. Identity, cache, and health state are untouched — this is
    /// for refreshing a proxy in place after re-discovery without
    /// disturbing other holders' cached component proxies.
    pub fn copy_values_to(&self, other: &ParticipantProxy) {
        *lock_unpoisoned(&other.shared.priorities) = *lock_unpoisoned(&self.shared.priorities);
        for entry in self.shared.additional_info.iter() {
            other
                .shared
                .additional_info
                .insert(entry.key().clone(), entry.value().clone());
        }
    }

    // ── Reachability & health ───────────────────────────────────────────────

    /// Mark the participant unreachable. One-way: the only road back is
    /// re-discovery, which builds a fresh proxy. Subsequent operations
    /// needing the transport fail fast with
    /// [`ControlError::RemoteUnavailable`].
    pub fn set_not_reachable(&self) {
        self.shared.reachable.store(false, Ordering::SeqCst);
        debug!(participant = self.name(), "marked unreachable");
    }

    /// Whether the participant is still considered reachable.
    #[must_use]
    pub fn reachable(&self) -> bool {
        self.shared.reachable.load(Ordering::SeqCst)
    }

    /// Query the participant's current health through the bus. Never
    /// cached; health is expected to change.
    ///
    /// # Errors
    ///
    /// [`ControlError::RemoteUnavailable`] if the participant was marked
    /// unreachable, [`ControlError::Rpc`] on transport failure.
    pub async fn participant_health(&self) -> Result<HealthSnapshot, ControlError> {
        self.ensure_reachable()?;
        Ok(self
            .shared
            .access
            .participant_health(self.name())
            .await?)
    }

    /// Record whether the background health listener is running. Pure
    /// state; the listener itself is an external collaborator.
    pub fn set_health_listener_running(&self, running: bool) {
        self.shared
            .health_listener_running
            .store(running, Ordering::SeqCst);
    }

    /// Whether the background health listener is recorded as running.
    #[must_use]
    pub fn health_listener_running(&self) -> bool {
        self.shared.health_listener_running.load(Ordering::SeqCst)
    }

    // ── Logging relay ───────────────────────────────────────────────────────

    /// Whether the system log sink is registered at the participant.
    #[must_use]
    pub fn logging_registered(&self) -> bool {
        self.shared.logging_registered.load(Ordering::SeqCst)
    }

    /// Tear down the log-sink registration. A no-op when not registered.
    ///
    /// # Errors
    ///
    /// [`ControlError::Rpc`] if the deregistration call fails; the
    /// registration is then still considered active.
    pub async fn deregister_logging(&self) -> Result<(), ControlError> {
        if !self.shared.logging_registered.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.shared
            .access
            .deregister_log_sink(self.name(), self.shared.logger.sink_url())
            .await?;
        self.shared.logging_registered.store(false, Ordering::SeqCst);
        Ok(())
    }

    // ── RPC component proxies ───────────────────────────────────────────────

    /// Resolve (possibly from cache) a proxy for the named component
    /// implementing the given interface.
    ///
    /// # Errors
    ///
    /// [`ControlError::RemoteUnavailable`] if marked unreachable (the
    /// transport is not consulted), [`ControlError::Rpc`] if resolution
    /// fails.
    pub async fn rpc_component_proxy(
        &self,
        component: &str,
        interface_id: &InterfaceId,
    ) -> Result<RpcProxy, ControlError> {
        self.ensure_reachable()?;
        let key = CacheKey::Named {
            component: component.to_string(),
            interface_id: interface_id.clone(),
        };
        let access = Arc::clone(&self.shared.access);
        let participant = self.name().to_string();
        let component = component.to_string();
        let interface_id = interface_id.clone();
        self.shared
            .cache
            .resolve_with(key, move || async move {
                Ok(access
                    .resolve_proxy(&participant, &component, &interface_id)
                    .await?)
            })
            .await
    }

    /// Resolve (possibly from cache) a proxy for *some* component
    /// implementing the given interface, independent of component name.
    /// When several components qualify, the participant's first is used.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotFound`] if no component implements the
    /// interface; otherwise as
    /// [`rpc_component_proxy`](Self::rpc_component_proxy).
    pub async fn rpc_component_proxy_by_iid(
        &self,
        interface_id: &InterfaceId,
    ) -> Result<RpcProxy, ControlError> {
        self.ensure_reachable()?;
        let key = CacheKey::ByIid(interface_id.clone());
        let access = Arc::clone(&self.shared.access);
        let participant = self.name().to_string();
        let interface_id = interface_id.clone();
        self.shared
            .cache
            .resolve_with(key, move || async move {
                let supporting = access.find_components(&participant, &interface_id).await?;
                let Some(component) = supporting.into_iter().next() else {
                    return Err(ControlError::NotFound(format!(
                        "component implementing '{interface_id}' on participant '{participant}'"
                    )));
                };
                Ok(access
                    .resolve_proxy(&participant, &component, &interface_id)
                    .await?)
            })
            .await
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Drive the participant's `load` transition through its state
    /// machine component.
    ///
    /// # Errors
    ///
    /// As [`rpc_component_proxy`](Self::rpc_component_proxy), plus
    /// [`ControlError::Rpc`] if the transition itself fails remotely.
    pub async fn load(&self) -> Result<(), ControlError> {
        self.lifecycle_call("load").await
    }

    /// Drive the participant's `initialize` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn initialize(&self) -> Result<(), ControlError> {
        self.lifecycle_call("initialize").await
    }

    /// Drive the participant's `start` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn start(&self) -> Result<(), ControlError> {
        self.lifecycle_call("start").await
    }

    /// Drive the participant's `stop` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn stop(&self) -> Result<(), ControlError> {
        self.lifecycle_call("stop").await
    }

    /// Drive the participant's `pause` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn pause(&self) -> Result<(), ControlError> {
        self.lifecycle_call("pause").await
    }

    /// Drive the participant's `deinitialize` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn deinitialize(&self) -> Result<(), ControlError> {
        self.lifecycle_call("deinitialize").await
    }

    /// Drive the participant's `unload` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn unload(&self) -> Result<(), ControlError> {
        self.lifecycle_call("unload").await
    }

    /// Drive the participant's `shutdown` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.lifecycle_call("shutdown").await
    }

    async fn lifecycle_call(&self, method: &str) -> Result<(), ControlError> {
        let state_machine = self
            .rpc_component_proxy(STATE_MACHINE_COMPONENT, &state_machine_iid())
            .await?;
        state_machine.call(method, serde_json::Value::Null).await?;
        debug!(participant = self.name(), method, "lifecycle transition done");
        Ok(())
    }

    fn ensure_reachable(&self) -> Result<(), ControlError> {
        if self.reachable() {
            Ok(())
        } else {
            Err(ControlError::RemoteUnavailable(self.name().to_string()))
        }
    }
}

impl std::fmt::Debug for ParticipantProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantProxy")
            .field("identity", &self.shared.identity)
            .field("reachable", &self.reachable())
            .field("logging_registered", &self.logging_registered())
            .finish_non_exhaustive()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
