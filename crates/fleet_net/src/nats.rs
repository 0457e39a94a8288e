//! The NATS-backed service bus.
//!
//! Concrete implementation of the [`bus`](crate::bus) capabilities on top
//! of [`BusConnection`]: discovery probes with announcement draining,
//! request/reply RPC, health queries, and log-sink control.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::bus::{InterfaceId, RpcClient, RpcProxy, ServiceBus, SystemAccess};
use crate::connection::BusConnection;
use crate::error::NetError;
use crate::messages::{
    ComponentQuery, ComponentQueryReply, DiscoveryProbe, HealthSnapshot, LogRelayRecord,
    LogSinkRegistration, ParticipantAnnouncement, RpcRequest, RpcResponse,
};
use crate::subjects;

/// System name of the access observing announcements of every system.
pub const ALL_SYSTEMS_SCOPE: &str = "_all_systems";

/// Request channel for one participant, shared by all proxies resolved
/// against it.
struct NatsRpcClient {
    connection: BusConnection,
    system_name: String,
    participant: String,
}

#[async_trait]
impl RpcClient for NatsRpcClient {
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, NetError> {
        let subject = subjects::rpc_request(&self.system_name, &self.participant, &request.component);
        let response: RpcResponse = self.connection.request(&subject, &request).await?;
        if let Some(error) = response.error {
            return Err(NetError::Rpc(error));
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

/// NATS-backed access to one simulation system (or to all systems, for
/// system-level discovery).
pub struct NatsSystemAccess {
    connection: BusConnection,
    system_name: String,
    /// Subject the announcements arrive on (wildcard for the all-systems scope).
    announce_subject: String,
    /// Probe narrowing; `None` probes every system.
    probe_scope: Option<String>,
    /// Cumulative announcements keyed by `participant@system`.
    seen: DashMap<String, ParticipantAnnouncement>,
}

impl NatsSystemAccess {
    /// Access scoped to one system name.
    #[must_use]
    pub fn new(connection: BusConnection, system_name: &str) -> Self {
        Self {
            connection,
            system_name: system_name.to_string(),
            announce_subject: subjects::discovery_announce(system_name),
            probe_scope: Some(system_name.to_string()),
            seen: DashMap::new(),
        }
    }

    /// Access observing announcements of every system on the bus.
    #[must_use]
    pub fn all_systems(connection: BusConnection) -> Self {
        Self {
            connection,
            system_name: ALL_SYSTEMS_SCOPE.to_string(),
            announce_subject: subjects::DISCOVERY_ANNOUNCE_ALL.to_string(),
            probe_scope: None,
            seen: DashMap::new(),
        }
    }

    /// Stream of log records relayed by this system's participants.
    ///
    /// Records that fail to decode are dropped with a warning; one garbled
    /// publisher must not tear down the relay.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn log_records(
        &self,
    ) -> Result<impl futures::Stream<Item = LogRelayRecord> + Send + use<>, NetError> {
        let sub = self
            .connection
            .subscribe(&subjects::log_relay(&self.system_name))
            .await?;
        Ok(sub.filter_map(|message| async move {
            match crate::codec::decode::<LogRelayRecord>(message.payload.as_ref()) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(%error, "dropping undecodable log relay record");
                    None
                }
            }
        }))
    }

    fn rpc_client(&self, participant: &str) -> Arc<dyn RpcClient> {
        Arc::new(NatsRpcClient {
            connection: self.connection.clone(),
            system_name: self.system_name.clone(),
            participant: participant.to_string(),
        })
    }
}

#[async_trait]
impl SystemAccess for NatsSystemAccess {
    fn system_name(&self) -> &str {
        &self.system_name
    }

    fn discovery_url(&self) -> &str {
        self.connection.url()
    }

    async fn discover(&self, window: Duration) -> Result<Vec<ParticipantAnnouncement>, NetError> {
        let mut sub = self.connection.subscribe(&self.announce_subject).await?;
        self.connection
            .publish(
                subjects::DISCOVERY_PROBE,
                &DiscoveryProbe {
                    system_name: self.probe_scope.clone(),
                },
            )
            .await?;

        let deadline = Instant::now() + window;
        loop {
            match timeout_at(deadline, sub.next()).await {
                Ok(Some(message)) => {
                    match crate::codec::decode::<ParticipantAnnouncement>(message.payload.as_ref())
                    {
                        Ok(announcement) => {
                            let key = format!(
                                "{}@{}",
                                announcement.participant_name, announcement.system_name
                            );
                            self.seen.insert(key, announcement);
                        }
                        Err(error) => warn!(%error, "dropping undecodable announcement"),
                    }
                }
                // Subscription closed or window elapsed.
                Ok(None) | Err(_) => break,
            }
        }

        let mut found: Vec<ParticipantAnnouncement> =
            self.seen.iter().map(|entry| entry.value().clone()).collect();
        found.sort_by(|a, b| {
            a.system_name
                .cmp(&b.system_name)
                .then_with(|| a.participant_name.cmp(&b.participant_name))
        });
        debug!(
            scope = self.system_name,
            count = found.len(),
            "discovery window finished"
        );
        Ok(found)
    }

    async fn resolve_proxy(
        &self,
        participant: &str,
        component: &str,
        interface_id: &InterfaceId,
    ) -> Result<RpcProxy, NetError> {
        let supporting = self.find_components(participant, interface_id).await?;
        if !supporting.iter().any(|name| name == component) {
            return Err(NetError::UnknownComponent {
                participant: participant.to_string(),
                component: component.to_string(),
                interface_id: interface_id.to_string(),
            });
        }
        Ok(RpcProxy::new(
            participant,
            component,
            interface_id.clone(),
            self.rpc_client(participant),
        ))
    }

    async fn find_components(
        &self,
        participant: &str,
        interface_id: &InterfaceId,
    ) -> Result<Vec<String>, NetError> {
        let subject = subjects::component_query(&self.system_name, participant);
        let reply: ComponentQueryReply = self
            .connection
            .request(
                &subject,
                &ComponentQuery {
                    interface_id: interface_id.to_string(),
                },
            )
            .await?;
        Ok(reply.components)
    }

    async fn participant_health(&self, participant: &str) -> Result<HealthSnapshot, NetError> {
        let subject = subjects::health_query(&self.system_name, participant);
        self.connection.request(&subject, &()).await
    }

    async fn register_log_sink(&self, participant: &str, sink_url: &str) -> Result<(), NetError> {
        self.log_sink_control(participant, sink_url, true).await
    }

    async fn deregister_log_sink(&self, participant: &str, sink_url: &str) -> Result<(), NetError> {
        self.log_sink_control(participant, sink_url, false).await
    }
}

impl NatsSystemAccess {
    async fn log_sink_control(
        &self,
        participant: &str,
        sink_url: &str,
        enable: bool,
    ) -> Result<(), NetError> {
        let subject = subjects::log_control(&self.system_name, participant);
        // Request/reply so registration is confirmed; participants answer
        // with an empty payload.
        self.connection
            .request::<_, ()>(
                &subject,
                &LogSinkRegistration {
                    sink_url: sink_url.to_string(),
                    enable,
                },
            )
            .await
    }
}

/// A connected NATS service bus. Per-system accesses are created once and
/// reused, so every caller asking for the same system shares one
/// cumulative discovery view.
pub struct NatsServiceBus {
    connection: BusConnection,
    accesses: DashMap<String, Arc<NatsSystemAccess>>,
}

impl NatsServiceBus {
    /// Wrap an established connection.
    #[must_use]
    pub fn new(connection: BusConnection) -> Self {
        Self {
            connection,
            accesses: DashMap::new(),
        }
    }

    /// Connect to NATS (env-var URL or default) and wrap the connection.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect() -> Result<Self, NetError> {
        Ok(Self::new(BusConnection::connect().await?))
    }

    fn access(&self, scope: &str) -> Arc<NatsSystemAccess> {
        self.accesses
            .entry(scope.to_string())
            .or_insert_with(|| {
                let access = if scope == ALL_SYSTEMS_SCOPE {
                    NatsSystemAccess::all_systems(self.connection.clone())
                } else {
                    NatsSystemAccess::new(self.connection.clone(), scope)
                };
                Arc::new(access)
            })
            .clone()
    }
}

impl ServiceBus for NatsServiceBus {
    fn system_access(&self, system_name: &str) -> Arc<dyn SystemAccess> {
        self.access(system_name)
    }

    fn all_systems_access(&self) -> Arc<dyn SystemAccess> {
        self.access(ALL_SYSTEMS_SCOPE)
    }
}
