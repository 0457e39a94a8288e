//! The abstract service-bus capabilities the control plane consumes.
//!
//! The core never talks to NATS directly; it sees a [`ServiceBus`] handing
//! out per-system [`SystemAccess`] capabilities, and resolved component
//! proxies as [`RpcProxy`] handles. Tests substitute scripted
//! implementations, and a plugin-backed transport can stand in for the
//! built-in NATS one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NetError;
use crate::messages::{HealthSnapshot, ParticipantAnnouncement, RpcRequest};

/// A stable identifier for an RPC-exposed capability contract, independent
/// of the component name implementing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceId(String);

impl InterfaceId {
    /// Create an interface identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InterfaceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The request channel behind a resolved [`RpcProxy`].
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Issue one method call and return its result value.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure or a remote error reply.
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, NetError>;
}

/// A resolved proxy for one component of one participant.
///
/// Cloning is cheap; clones share the underlying request channel.
#[derive(Clone)]
pub struct RpcProxy {
    participant: String,
    component: String,
    interface_id: InterfaceId,
    client: Arc<dyn RpcClient>,
}

impl RpcProxy {
    /// Create a proxy bound to a participant's component.
    #[must_use]
    pub fn new(
        participant: impl Into<String>,
        component: impl Into<String>,
        interface_id: InterfaceId,
        client: Arc<dyn RpcClient>,
    ) -> Self {
        Self {
            participant: participant.into(),
            component: component.into(),
            interface_id,
            client,
        }
    }

    /// The participant this proxy addresses.
    #[must_use]
    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// The component this proxy addresses.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The interface contract this proxy was resolved against.
    #[must_use]
    pub fn interface_id(&self) -> &InterfaceId {
        &self.interface_id
    }

    /// Call a method on the remote component.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure or a remote error reply.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, NetError> {
        self.client
            .call(RpcRequest {
                component: self.component.clone(),
                interface_id: self.interface_id.to_string(),
                method: method.to_string(),
                params,
            })
            .await
    }
}

impl std::fmt::Debug for RpcProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcProxy")
            .field("participant", &self.participant)
            .field("component", &self.component)
            .field("interface_id", &self.interface_id)
            .finish_non_exhaustive()
    }
}

/// Scoped access to one simulation system on the bus.
///
/// This is the capability set the control plane needs from a transport:
/// discover participants, resolve component proxies, query health, and
/// manage log-sink registration.
#[async_trait]
pub trait SystemAccess: Send + Sync {
    /// The system name this access is scoped to.
    fn system_name(&self) -> &str;

    /// The discovery URL of the bus behind this access.
    fn discovery_url(&self) -> &str;

    /// Collect participant announcements, blocking for at most `window`.
    ///
    /// Returns the cumulative set observed over this access's lifetime, so
    /// repeated short windows converge on the same result a single long
    /// window would produce.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure.
    async fn discover(&self, window: Duration) -> Result<Vec<ParticipantAnnouncement>, NetError>;

    /// Resolve a proxy for the named component of a participant,
    /// implementing the given interface.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::UnknownComponent`] if the participant does not
    /// expose such a component, other [`NetError`]s on transport failure.
    async fn resolve_proxy(
        &self,
        participant: &str,
        component: &str,
        interface_id: &InterfaceId,
    ) -> Result<RpcProxy, NetError>;

    /// List the participant's components implementing an interface, in the
    /// participant's registration order.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure.
    async fn find_components(
        &self,
        participant: &str,
        interface_id: &InterfaceId,
    ) -> Result<Vec<String>, NetError>;

    /// Query a participant's current health. Never cached.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure.
    async fn participant_health(&self, participant: &str) -> Result<HealthSnapshot, NetError>;

    /// Register a central log sink at a participant.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure.
    async fn register_log_sink(&self, participant: &str, sink_url: &str) -> Result<(), NetError>;

    /// Remove a previously registered log sink from a participant.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure.
    async fn deregister_log_sink(&self, participant: &str, sink_url: &str) -> Result<(), NetError>;
}

/// A connected service bus handing out per-system access capabilities.
///
/// Accesses are created on demand and reused, so every caller asking for
/// the same system shares one cumulative discovery view.
pub trait ServiceBus: Send + Sync {
    /// Access scoped to one system name.
    fn system_access(&self, system_name: &str) -> Arc<dyn SystemAccess>;

    /// Access observing announcements of every system on the bus.
    fn all_systems_access(&self) -> Arc<dyn SystemAccess>;
}
