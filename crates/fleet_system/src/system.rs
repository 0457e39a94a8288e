//! A named collection of participant proxies driven as one unit.
//!
//! [`System`] owns the proxies of one simulation system, in the order they
//! were added, and fans control operations out across them. It also owns
//! the system-wide [`SystemLogger`] that every member's log relay feeds
//! into.

use std::sync::Arc;

use tracing::debug;

use fleet_net::SystemAccess;
use fleet_net::messages::ParticipantAnnouncement;

use crate::error::ControlError;
use crate::identity::ParticipantIdentity;
use crate::logging::{EventMonitor, Severity, SystemLogger};
use crate::proxy::ParticipantProxy;

/// One simulation system as seen from the control plane.
pub struct System {
    name: String,
    access: Arc<dyn SystemAccess>,
    logger: Arc<SystemLogger>,
    participants: Vec<ParticipantProxy>,
}

impl System {
    /// Create an empty system bound to a bus access.
    #[must_use]
    pub fn new(name: impl Into<String>, access: Arc<dyn SystemAccess>) -> Self {
        let name = name.into();
        Self {
            logger: Arc::new(SystemLogger::new(&name)),
            name,
            access,
            participants: Vec::new(),
        }
    }

    /// The system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The system-wide logger fed by every member's log relay.
    #[must_use]
    pub fn logger(&self) -> &Arc<SystemLogger> {
        &self.logger
    }

    // ── Membership ──────────────────────────────────────────────────────────

    /// Add a participant by name and URL.
    ///
    /// Adding a name that is already a member replaces the old proxy with
    /// a freshly connected one, carrying over its priorities and
    /// additional info. Holders of the old proxy keep a working but
    /// detached handle.
    pub async fn add(&mut self, participant_name: &str, url: &str) -> ParticipantProxy {
        let identity = ParticipantIdentity::new(
            participant_name,
            url,
            &self.name,
            self.access.discovery_url(),
            "",
        );
        self.connect_member(identity).await
    }

    /// Add (or refresh) one member per discovery announcement.
    pub async fn add_discovered(&mut self, announcements: &[ParticipantAnnouncement]) {
        for announcement in announcements {
            let identity =
                ParticipantIdentity::from_announcement(announcement, self.access.discovery_url());
            self.connect_member(identity).await;
        }
    }

    async fn connect_member(&mut self, identity: ParticipantIdentity) -> ParticipantProxy {
        let proxy = ParticipantProxy::connect(
            identity,
            Arc::clone(&self.access),
            Arc::clone(&self.logger),
        )
        .await;

        let position = self
            .participants
            .iter()
            .position(|existing| existing.name() == proxy.name());
        match position {
            Some(index) => {
                self.participants[index].copy_values_to(&proxy);
                self.participants[index] = proxy.clone();
                debug!(system = self.name, participant = proxy.name(), "member refreshed");
            }
            None => {
                self.participants.push(proxy.clone());
                debug!(system = self.name, participant = proxy.name(), "member added");
            }
        }
        proxy
    }

    /// Remove a member by name. Returns whether it was present.
    pub fn remove(&mut self, participant_name: &str) -> bool {
        let before = self.participants.len();
        self.participants
            .retain(|proxy| proxy.name() != participant_name);
        self.participants.len() != before
    }

    /// Look up a member by name.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotFound`] (also logged as fatal) if no such
    /// member exists.
    pub fn participant(&self, participant_name: &str) -> Result<ParticipantProxy, ControlError> {
        self.participants
            .iter()
            .find(|proxy| proxy.name() == participant_name)
            .cloned()
            .ok_or_else(|| {
                self.logger.log_now(
                    Severity::Fatal,
                    participant_name,
                    "system",
                    &format!("no participant '{participant_name}' in system '{}'", self.name),
                );
                ControlError::NotFound(format!(
                    "participant '{participant_name}' in system '{}'",
                    self.name
                ))
            })
    }

    /// All members, in the order they were added.
    #[must_use]
    pub fn participants(&self) -> &[ParticipantProxy] {
        &self.participants
    }

    // ── Lifecycle fan-out ───────────────────────────────────────────────────

    /// Drive every member through its `load` transition.
    ///
    /// Every member is attempted regardless of earlier failures.
    ///
    /// # Errors
    ///
    /// [`ControlError::Lifecycle`] naming every member that failed.
    pub async fn load(&self) -> Result<(), ControlError> {
        self.for_each_member("load", |p| async move { p.load().await })
            .await
    }

    /// Drive every member through its `initialize` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn initialize(&self) -> Result<(), ControlError> {
        self.for_each_member("initialize", |p| async move { p.initialize().await })
            .await
    }

    /// Drive every member through its `start` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn start(&self) -> Result<(), ControlError> {
        self.for_each_member("start", |p| async move { p.start().await })
            .await
    }

    /// Drive every member through its `stop` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn stop(&self) -> Result<(), ControlError> {
        self.for_each_member("stop", |p| async move { p.stop().await })
            .await
    }

    /// Drive every member through its `pause` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn pause(&self) -> Result<(), ControlError> {
        self.for_each_member("pause", |p| async move { p.pause().await })
            .await
    }

    /// Drive every member through its `deinitialize` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn deinitialize(&self) -> Result<(), ControlError> {
        self.for_each_member("deinitialize", |p| async move { p.deinitialize().await })
            .await
    }

    /// Drive every member through its `unload` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn unload(&self) -> Result<(), ControlError> {
        self.for_each_member("unload", |p| async move { p.unload().await })
            .await
    }

    /// Drive every member through its `shutdown` transition.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.for_each_member("shutdown", |p| async move { p.shutdown().await })
            .await
    }

    /// Apply one transition to every member. The closure takes the proxy
    /// by value (cloning is an alias) so the returned future does not
    /// borrow the member list.
    async fn for_each_member<F, Fut>(
        &self,
        transition: &'static str,
        operation: F,
    ) -> Result<(), ControlError>
    where
        F: Fn(ParticipantProxy) -> Fut,
        Fut: Future<Output = Result<(), ControlError>>,
    {
        let mut failed = Vec::new();
        for proxy in &self.participants {
            if let Err(error) = operation(proxy.clone()).await {
                self.logger.log_now(
                    Severity::Error,
                    proxy.name(),
                    "system",
                    &format!("'{transition}' failed: {error}"),
                );
                failed.push(format!("{}: {error}", proxy.name()));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ControlError::Lifecycle { transition, failed })
        }
    }

    // ── Logging control ─────────────────────────────────────────────────────

    /// Set the minimum severity relayed to monitors.
    pub fn set_severity_level(&self, level: Severity) {
        self.logger.set_severity_level(level);
    }

    /// Attach a monitor to the system logger.
    pub fn register_monitor(&self, monitor: Arc<dyn EventMonitor>) {
        self.logger.register_monitor(monitor);
    }

    /// Detach all monitors.
    pub fn release_monitors(&self) {
        self.logger.release_monitors();
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field(
                "participants",
                &self
                    .participants
                    .iter()
                    .map(ParticipantProxy::name)
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAccess, announcement};

    #[tokio::test]
    async fn test_participants_keep_insertion_order() {
        let access = ScriptedAccess::new("sys");
        let mut system = System::new("sys", access as Arc<dyn SystemAccess>);
        system.add("zeta", "http://zeta:9090").await;
        system.add("alpha", "http://alpha:9090").await;
        system.add("mid", "http://mid:9090").await;

        let names: Vec<_> = system.participants().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_add_duplicate_replaces_and_carries_values() {
        let access = ScriptedAccess::new("sys");
        let mut system = System::new("sys", access as Arc<dyn SystemAccess>);
        let first = system.add("p1", "http://p1:9090").await;
        first.set_init_priority(5);
        first.set_additional_info("role", "clock-master");

        let second = system.add("p1", "http://p1-new:9090").await;
        assert_eq!(system.participants().len(), 1);
        assert_eq!(second.url(), "http://p1-new:9090");
        assert_eq!(second.init_priority(), 5);
        assert_eq!(second.additional_info("role", ""), "clock-master");
        // The displaced proxy still works as a detached handle.
        assert_eq!(first.url(), "http://p1:9090");
    }

    #[tokio::test]
    async fn test_add_discovered_builds_members_from_announcements() {
        let access = ScriptedAccess::new("sys");
        let mut system = System::new("sys", access as Arc<dyn SystemAccess>);
        system
            .add_discovered(&[announcement("p1", "sys"), announcement("p2", "sys")])
            .await;

        let p1 = system.participant("p1").unwrap();
        assert_eq!(p1.url(), "http://p1:9090");
        assert_eq!(p1.identity().system_discovery_url(), "stub://bus");
        assert_eq!(system.participants().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_participant_is_not_found() {
        let access = ScriptedAccess::new("sys");
        let system = System::new("sys", access as Arc<dyn SystemAccess>);
        let error = system.participant("ghost").unwrap_err();
        assert!(matches!(error, ControlError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_member() {
        let access = ScriptedAccess::new("sys");
        let mut system = System::new("sys", access as Arc<dyn SystemAccess>);
        system.add("p1", "http://p1:9090").await;

        assert!(system.remove("p1"));
        assert!(!system.remove("p1"));
        assert!(system.participants().is_empty());
    }

    #[tokio::test]
    async fn test_load_attempts_every_member_and_collects_failures() {
        let access = ScriptedAccess::new("sys");
        for name in ["p1", "p2", "p3"] {
            access.add_component(
                name,
                crate::proxy::STATE_MACHINE_COMPONENT,
                &crate::proxy::state_machine_iid(),
            );
        }
        access.rpc_client("p2").fail_method("load");

        let mut system = System::new("sys", Arc::clone(&access) as Arc<dyn SystemAccess>);
        for name in ["p1", "p2", "p3"] {
            system.add(name, &format!("http://{name}:9090")).await;
        }

        let error = system.load().await.unwrap_err();
        match error {
            ControlError::Lifecycle { transition, failed } => {
                assert_eq!(transition, "load");
                assert_eq!(failed.len(), 1);
                assert!(failed[0].starts_with("p2: "));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The healthy members were still driven through the transition.
        assert_eq!(access.rpc_client("p1").calls().len(), 1);
        assert_eq!(access.rpc_client("p3").calls().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_succeeds_over_all_members() {
        let access = ScriptedAccess::new("sys");
        for name in ["p1", "p2"] {
            access.add_component(
                name,
                crate::proxy::STATE_MACHINE_COMPONENT,
                &crate::proxy::state_machine_iid(),
            );
        }

        let mut system = System::new("sys", Arc::clone(&access) as Arc<dyn SystemAccess>);
        for name in ["p1", "p2"] {
            system.add(name, &format!("http://{name}:9090")).await;
        }

        system.initialize().await.unwrap();
        assert_eq!(access.rpc_client("p1").calls()[0].method, "initialize");
        assert_eq!(access.rpc_client("p2").calls()[0].method, "initialize");
    }

    #[tokio::test]
    async fn test_full_transition_set_broadcasts_to_every_member() {
        let access = ScriptedAccess::new("sys");
        for name in ["p1", "p2"] {
            access.add_component(
                name,
                crate::proxy::STATE_MACHINE_COMPONENT,
                &crate::proxy::state_machine_iid(),
            );
        }

        let mut system = System::new("sys", Arc::clone(&access) as Arc<dyn SystemAccess>);
        for name in ["p1", "p2"] {
            system.add(name, &format!("http://{name}:9090")).await;
        }

        system.start().await.unwrap();
        system.pause().await.unwrap();
        system.stop().await.unwrap();
        system.deinitialize().await.unwrap();
        system.unload().await.unwrap();
        system.shutdown().await.unwrap();

        for name in ["p1", "p2"] {
            let methods: Vec<_> = access
                .rpc_client(name)
                .calls()
                .iter()
                .map(|c| c.method.clone())
                .collect();
            assert_eq!(
                methods,
                ["start", "pause", "stop", "deinitialize", "unload", "shutdown"]
            );
        }
    }

    #[tokio::test]
    async fn test_stop_collects_failures_like_load() {
        let access = ScriptedAccess::new("sys");
        for name in ["p1", "p2"] {
            access.add_component(
                name,
                crate::proxy::STATE_MACHINE_COMPONENT,
                &crate::proxy::state_machine_iid(),
            );
        }
        access.rpc_client("p1").fail_method("stop");

        let mut system = System::new("sys", Arc::clone(&access) as Arc<dyn SystemAccess>);
        for name in ["p1", "p2"] {
            system.add(name, &format!("http://{name}:9090")).await;
        }

        let error = system.stop().await.unwrap_err();
        match error {
            ControlError::Lifecycle { transition, failed } => {
                assert_eq!(transition, "stop");
                assert_eq!(failed.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // p2 was still attempted.
        assert_eq!(access.rpc_client("p2").calls().len(), 1);
    }
}
