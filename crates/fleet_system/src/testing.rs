//! Scripted in-memory service bus for unit tests.
//!
//! [`ScriptedAccess`] plays the role of one bus scope: discovery waves are
//! queued up front and revealed one `discover` call at a time (cumulative,
//! like the real access), component catalogues and health snapshots are
//! preset, and every transport touch is counted so tests can assert that a
//! call did or did not reach the wire.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fleet_net::messages::{HealthSnapshot, ParticipantAnnouncement, RpcRequest};
use fleet_net::{InterfaceId, NetError, RpcClient, RpcProxy, ServiceBus, SystemAccess};

/// Build an announcement with conventional URLs.
pub fn announcement(participant: &str, system: &str) -> ParticipantAnnouncement {
    ParticipantAnnouncement {
        participant_name: participant.to_string(),
        system_name: system.to_string(),
        participant_url: format!("http://{participant}:9090"),
        rpc_server_url: format!("http://{participant}:9091"),
    }
}

/// Records every RPC request; fails scripted methods, answers the rest
/// with `null`.
#[derive(Default)]
pub struct ScriptedRpcClient {
    calls: Mutex<Vec<RpcRequest>>,
    fail_methods: Mutex<HashSet<String>>,
}

impl ScriptedRpcClient {
    /// Make every call of `method` fail.
    pub fn fail_method(&self, method: &str) {
        self.fail_methods.lock().unwrap().insert(method.to_string());
    }

    /// All requests seen so far.
    pub fn calls(&self) -> Vec<RpcRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcClient for ScriptedRpcClient {
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, NetError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail_methods.lock().unwrap().contains(&request.method) {
            return Err(NetError::Rpc(format!(
                "scripted failure for '{}'",
                request.method
            )));
        }
        Ok(serde_json::Value::Null)
    }
}

/// Scripted [`SystemAccess`] for one scope.
pub struct ScriptedAccess {
    system_name: String,
    waves: Mutex<VecDeque<Vec<ParticipantAnnouncement>>>,
    seen: Mutex<Vec<ParticipantAnnouncement>>,
    components: Mutex<HashMap<String, Vec<(String, InterfaceId)>>>,
    rpc_clients: Mutex<HashMap<String, Arc<ScriptedRpcClient>>>,
    fail_resolve: Mutex<HashSet<String>>,
    fail_log_registration: Mutex<HashSet<String>>,
    health: Mutex<HashMap<String, HealthSnapshot>>,
    log_registrations: Mutex<Vec<(String, String, bool)>>,
    discover_windows: Mutex<Vec<Duration>>,
    resolve_calls: AtomicUsize,
    health_calls: AtomicUsize,
    discover_calls: AtomicUsize,
}

impl ScriptedAccess {
    /// New scripted access scoped to `system_name`.
    pub fn new(system_name: &str) -> Arc<Self> {
        Arc::new(Self {
            system_name: system_name.to_string(),
            waves: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            components: Mutex::new(HashMap::new()),
            rpc_clients: Mutex::new(HashMap::new()),
            fail_resolve: Mutex::new(HashSet::new()),
            fail_log_registration: Mutex::new(HashSet::new()),
            health: Mutex::new(HashMap::new()),
            log_registrations: Mutex::new(Vec::new()),
            discover_windows: Mutex::new(Vec::new()),
            resolve_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            discover_calls: AtomicUsize::new(0),
        })
    }

    /// Queue one discovery wave; each `discover` call reveals one wave.
    pub fn push_wave(&self, wave: Vec<ParticipantAnnouncement>) {
        self.waves.lock().unwrap().push_back(wave);
    }

    /// Declare that `participant` exposes `component` implementing `iid`.
    pub fn add_component(&self, participant: &str, component: &str, iid: &InterfaceId) {
        self.components
            .lock()
            .unwrap()
            .entry(participant.to_string())
            .or_default()
            .push((component.to_string(), iid.clone()));
    }

    /// Make proxy resolution fail for `participant`.
    pub fn fail_resolve_for(&self, participant: &str) {
        self.fail_resolve
            .lock()
            .unwrap()
            .insert(participant.to_string());
    }

    /// Make log-sink registration fail for `participant`.
    pub fn fail_log_registration_for(&self, participant: &str) {
        self.fail_log_registration
            .lock()
            .unwrap()
            .insert(participant.to_string());
    }

    /// Preset the health snapshot returned for `participant`.
    pub fn set_health(&self, participant: &str, snapshot: HealthSnapshot) {
        self.health
            .lock()
            .unwrap()
            .insert(participant.to_string(), snapshot);
    }

    /// The shared RPC client of `participant` (created on demand).
    pub fn rpc_client(&self, participant: &str) -> Arc<ScriptedRpcClient> {
        self.rpc_clients
            .lock()
            .unwrap()
            .entry(participant.to_string())
            .or_default()
            .clone()
    }

    /// How many times `resolve_proxy` was called.
    pub fn resolve_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    /// How many times `participant_health` was called.
    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// How many times `discover` was called.
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    /// The window passed to each `discover` call, in call order.
    pub fn discover_windows(&self) -> Vec<Duration> {
        self.discover_windows.lock().unwrap().clone()
    }

    /// Every `(participant, sink_url, enable)` log-sink control seen.
    pub fn log_registrations(&self) -> Vec<(String, String, bool)> {
        self.log_registrations.lock().unwrap().clone()
    }
}

#[async_trait]
impl SystemAccess for ScriptedAccess {
    fn system_name(&self) -> &str {
        &self.system_name
    }

    fn discovery_url(&self) -> &str {
        "stub://bus"
    }

    async fn discover(&self, window: Duration) -> Result<Vec<ParticipantAnnouncement>, NetError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        self.discover_windows.lock().unwrap().push(window);
        if let Some(wave) = self.waves.lock().unwrap().pop_front() {
            let mut seen = self.seen.lock().unwrap();
            for incoming in wave {
                let duplicate = seen.iter().any(|existing| {
                    existing.participant_name == incoming.participant_name
                        && existing.system_name == incoming.system_name
                });
                if !duplicate {
                    seen.push(incoming);
                }
            }
        }
        Ok(self.seen.lock().unwrap().clone())
    }

    async fn resolve_proxy(
        &self,
        participant: &str,
        component: &str,
        interface_id: &InterfaceId,
    ) -> Result<RpcProxy, NetError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolve.lock().unwrap().contains(participant) {
            return Err(NetError::Rpc(format!(
                "scripted resolve failure for '{participant}'"
            )));
        }
        let supported = self
            .components
            .lock()
            .unwrap()
            .get(participant)
            .is_some_and(|list| {
                list.iter()
                    .any(|(name, iid)| name == component && iid == interface_id)
            });
        if !supported {
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
        Ok(self
            .components
            .lock()
            .unwrap()
            .get(participant)
            .map(|list| {
                list.iter()
                    .filter(|(_, iid)| iid == interface_id)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn participant_health(&self, participant: &str) -> Result<HealthSnapshot, NetError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .health
            .lock()
            .unwrap()
            .get(participant)
            .cloned()
            .unwrap_or_else(|| HealthSnapshot {
                participant_name: participant.to_string(),
                state: "running".to_string(),
                jobs: Vec::new(),
            }))
    }

    async fn register_log_sink(&self, participant: &str, sink_url: &str) -> Result<(), NetError> {
        if self
            .fail_log_registration
            .lock()
            .unwrap()
            .contains(participant)
        {
            return Err(NetError::Rpc(format!(
                "scripted registration failure for '{participant}'"
            )));
        }
        self.log_registrations.lock().unwrap().push((
            participant.to_string(),
            sink_url.to_string(),
            true,
        ));
        Ok(())
    }

    async fn deregister_log_sink(&self, participant: &str, sink_url: &str) -> Result<(), NetError> {
        self.log_registrations.lock().unwrap().push((
            participant.to_string(),
            sink_url.to_string(),
            false,
        ));
        Ok(())
    }
}

/// Scripted [`ServiceBus`] handing out [`ScriptedAccess`] scopes.
pub struct ScriptedBus {
    accesses: Mutex<HashMap<String, Arc<ScriptedAccess>>>,
    all: Arc<ScriptedAccess>,
}

impl ScriptedBus {
    /// New bus with an empty all-systems scope.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accesses: Mutex::new(HashMap::new()),
            all: ScriptedAccess::new("_all_systems"),
        })
    }

    /// The scripted access for one system (created on demand).
    pub fn access(&self, system_name: &str) -> Arc<ScriptedAccess> {
        self.accesses
            .lock()
            .unwrap()
            .entry(system_name.to_string())
            .or_insert_with(|| ScriptedAccess::new(system_name))
            .clone()
    }

    /// The scripted all-systems access.
    pub fn all_access(&self) -> Arc<ScriptedAccess> {
        self.all.clone()
    }
}

impl ServiceBus for ScriptedBus {
    fn system_access(&self, system_name: &str) -> Arc<dyn SystemAccess> {
        self.access(system_name)
    }

    fn all_systems_access(&self) -> Arc<dyn SystemAccess> {
        self.all.clone()
    }
}
