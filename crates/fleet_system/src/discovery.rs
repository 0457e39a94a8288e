//! Constraint-driven participant and system discovery.
//!
//! The engine repeatedly polls the bus in short windows and evaluates a
//! [`DiscoveryConstraint`] against the cumulative announcement set, so a
//! system that comes up gradually is found as soon as the constraint is
//! met rather than only after the full timeout.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use fleet_net::ServiceBus;
use fleet_net::messages::ParticipantAnnouncement;

use crate::error::ControlError;
use crate::system::System;

/// How long one poll window lasts unless overridden.
///
/// Half a second keeps constraint checks snappy at the cost of a little
/// extra probe traffic; raise it on busy clusters via
/// [`DiscoveryEngine::with_poll_period`]. The final window before the
/// deadline is clamped to the remaining time, so timeouts that are not a
/// multiple of the period are still honored exactly.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(500);

/// What a discovery run must observe before it may return early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryConstraint {
    /// Take whatever announces within the timeout.
    Unconstrained,
    /// Exactly this many participants. Observing more is an error.
    Count(u32),
    /// Exactly these participants, matched by name.
    Names(Vec<String>),
}

enum Evaluation {
    Satisfied(Vec<ParticipantAnnouncement>),
    Pending,
    Mismatch(String),
}

impl DiscoveryConstraint {
    /// Evaluate against the cumulative announcement set.
    ///
    /// `Satisfied` carries the selected announcements: for `Names` in the
    /// order the names were given, otherwise sorted by name.
    fn evaluate(&self, announced: &[ParticipantAnnouncement]) -> Evaluation {
        match self {
            Self::Unconstrained => {
                let mut selected = announced.to_vec();
                selected.sort_by(|a, b| a.participant_name.cmp(&b.participant_name));
                Evaluation::Satisfied(selected)
            }
            Self::Count(expected) => {
                let found = announced.len() as u32;
                if found > *expected {
                    Evaluation::Mismatch(format!(
                        "expected {expected} participants, found {found}"
                    ))
                } else if found == *expected {
                    let mut selected = announced.to_vec();
                    selected.sort_by(|a, b| a.participant_name.cmp(&b.participant_name));
                    Evaluation::Satisfied(selected)
                } else {
                    Evaluation::Pending
                }
            }
            Self::Names(names) => {
                let mut selected = Vec::with_capacity(names.len());
                for name in names {
                    match announced
                        .iter()
                        .find(|candidate| candidate.participant_name == *name)
                    {
                        Some(found) => selected.push(found.clone()),
                        None => return Evaluation::Pending,
                    }
                }
                Evaluation::Satisfied(selected)
            }
        }
    }

    fn timeout_message(&self, announced: &[ParticipantAnnouncement]) -> String {
        let mut found: Vec<_> = announced
            .iter()
            .map(|a| a.participant_name.as_str())
            .collect();
        found.sort_unstable();
        match self {
            Self::Unconstrained => "discovery window elapsed".to_string(),
            Self::Count(expected) => format!(
                "expected {expected} participants, found {} [{}]",
                found.len(),
                found.join(", ")
            ),
            Self::Names(names) => {
                let missing: Vec<_> = names
                    .iter()
                    .filter(|name| !found.contains(&name.as_str()))
                    .map(String::as_str)
                    .collect();
                format!("still missing participants [{}]", missing.join(", "))
            }
        }
    }
}

/// Finds participants and whole systems on the service bus.
pub struct DiscoveryEngine {
    bus: Arc<dyn ServiceBus>,
    poll_period: Duration,
}

impl DiscoveryEngine {
    /// Create an engine with the default poll period.
    #[must_use]
    pub fn new(bus: Arc<dyn ServiceBus>) -> Self {
        Self {
            bus,
            poll_period: DEFAULT_POLL_PERIOD,
        }
    }

    /// Override how long each poll window lasts.
    #[must_use]
    pub fn with_poll_period(mut self, poll_period: Duration) -> Self {
        self.poll_period = poll_period;
        self
    }

    /// Discover one system and return it populated with the participants
    /// that satisfied the constraint.
    ///
    /// # Errors
    ///
    /// [`ControlError::DiscoveryMismatch`] if more participants than a
    /// `Count` constraint allows announced themselves,
    /// [`ControlError::DiscoveryTimeout`] if the constraint was still
    /// unmet when `timeout` elapsed, [`ControlError::Rpc`] on transport
    /// failure.
    pub async fn discover_system(
        &self,
        system_name: &str,
        constraint: DiscoveryConstraint,
        timeout: Duration,
    ) -> Result<System, ControlError> {
        let access = self.bus.system_access(system_name);
        let announcements = self
            .run_constrained(&constraint, timeout, |window| access.discover(window))
            .await?;

        let mut system = System::new(system_name, access);
        system.add_discovered(&announcements).await;
        debug!(
            system = system_name,
            participants = system.participants().len(),
            "system discovered"
        );
        Ok(system)
    }

    /// Discover every system announcing on the bus within the timeout.
    ///
    /// # Errors
    ///
    /// [`ControlError::Rpc`] on transport failure.
    pub async fn discover_all_systems(&self, timeout: Duration) -> Result<Vec<System>, ControlError> {
        self.discover_all(None, timeout).await
    }

    /// Discover all systems, returning as soon as at least `count`
    /// distinct systems were seen.
    ///
    /// Unlike participant counts this is a lower bound, and hitting the
    /// timeout with fewer systems is not an error: whatever was found is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`ControlError::Rpc`] on transport failure.
    pub async fn discover_all_systems_expecting(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<System>, ControlError> {
        self.discover_all(Some(count), timeout).await
    }

    async fn discover_all(
        &self,
        expected_systems: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<System>, ControlError> {
        let all_access = self.bus.all_systems_access();
        let mut remaining = timeout;
        let announced = loop {
            let window = remaining.min(self.poll_period);
            let announced = all_access.discover(window).await?;

            let distinct = announced
                .iter()
                .map(|a| a.system_name.as_str())
                .collect::<std::collections::BTreeSet<_>>()
                .len();
            if expected_systems.is_some_and(|count| distinct >= count) {
                break announced;
            }
            remaining = remaining.saturating_sub(window);
            if remaining.is_zero() {
                break announced;
            }
        };

        let mut grouped: BTreeMap<String, Vec<ParticipantAnnouncement>> = BTreeMap::new();
        for announcement in announced {
            grouped
                .entry(announcement.system_name.clone())
                .or_default()
                .push(announcement);
        }

        let mut systems = Vec::with_capacity(grouped.len());
        for (system_name, mut announcements) in grouped {
            announcements.sort_by(|a, b| a.participant_name.cmp(&b.participant_name));
            let mut system = System::new(&system_name, self.bus.system_access(&system_name));
            system.add_discovered(&announcements).await;
            systems.push(system);
        }
        debug!(systems = systems.len(), "all-systems discovery done");
        Ok(systems)
    }

    /// Run the poll/evaluate loop. `poll` receives the window to listen
    /// for: the whole timeout when unconstrained (there is nothing to
    /// check early), otherwise one poll period, clamped to the remaining
    /// time so the deadline is honored exactly.
    async fn run_constrained<F, Fut>(
        &self,
        constraint: &DiscoveryConstraint,
        timeout: Duration,
        poll: F,
    ) -> Result<Vec<ParticipantAnnouncement>, ControlError>
    where
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = Result<Vec<ParticipantAnnouncement>, fleet_net::NetError>>,
    {
        if *constraint == DiscoveryConstraint::Unconstrained {
            let announced = poll(timeout).await?;
            return match constraint.evaluate(&announced) {
                Evaluation::Satisfied(selected) => Ok(selected),
                // Unconstrained never rejects.
                Evaluation::Pending | Evaluation::Mismatch(_) => unreachable!(),
            };
        }

        let mut remaining = timeout;
        loop {
            let window = remaining.min(self.poll_period);
            let announced = poll(window).await?;
            match constraint.evaluate(&announced) {
                Evaluation::Satisfied(selected) => return Ok(selected),
                Evaluation::Mismatch(message) => {
                    return Err(ControlError::DiscoveryMismatch(message));
                }
                Evaluation::Pending => {
                    remaining = remaining.saturating_sub(window);
                    if remaining.is_zero() {
                        return Err(ControlError::DiscoveryTimeout(
                            constraint.timeout_message(&announced),
                        ));
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("poll_period", &self.poll_period)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedBus, announcement};

    fn engine(bus: &Arc<ScriptedBus>) -> DiscoveryEngine {
        DiscoveryEngine::new(Arc::clone(bus) as Arc<dyn ServiceBus>)
            .with_poll_period(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_names_constraint_orders_by_requested_names() {
        let bus = ScriptedBus::new();
        // p2 announces before p1; the result still follows the request.
        bus.access("sys").push_wave(vec![announcement("p2", "sys")]);
        bus.access("sys").push_wave(vec![announcement("p1", "sys")]);

        let system = engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Names(vec!["p1".to_string(), "p2".to_string()]),
                Duration::from_millis(100),
            )
            .await
            .unwrap();

        let names: Vec<_> = system.participants().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_names_constraint_times_out_naming_missing() {
        let bus = ScriptedBus::new();
        bus.access("sys").push_wave(vec![announcement("p1", "sys")]);

        let error = engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Names(vec!["p1".to_string(), "ghost".to_string()]),
                Duration::from_millis(30),
            )
            .await
            .unwrap_err();

        match error {
            ControlError::DiscoveryTimeout(message) => {
                assert!(message.contains("ghost"), "got: {message}");
                assert!(!message.contains("p1,"), "got: {message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_count_constraint_satisfied_across_waves() {
        let bus = ScriptedBus::new();
        bus.access("sys").push_wave(vec![announcement("p1", "sys")]);
        bus.access("sys").push_wave(Vec::new());
        bus.access("sys").push_wave(vec![announcement("p2", "sys")]);

        let system = engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Count(2),
                Duration::from_millis(100),
            )
            .await
            .unwrap();

        assert_eq!(system.participants().len(), 2);
        assert!(bus.access("sys").discover_calls() >= 3);
    }

    #[tokio::test]
    async fn test_count_overshoot_is_a_mismatch() {
        let bus = ScriptedBus::new();
        bus.access("sys").push_wave(vec![
            announcement("p1", "sys"),
            announcement("p2", "sys"),
            announcement("p3", "sys"),
        ]);

        let error = engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Count(2),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, ControlError::DiscoveryMismatch(_)));
    }

    #[tokio::test]
    async fn test_unconstrained_takes_single_window() {
        let bus = ScriptedBus::new();
        bus.access("sys")
            .push_wave(vec![announcement("p2", "sys"), announcement("p1", "sys")]);

        let system = engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Unconstrained,
                Duration::from_millis(100),
            )
            .await
            .unwrap();

        let names: Vec<_> = system.participants().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["p1", "p2"]);
        assert_eq!(bus.access("sys").discover_calls(), 1);
    }

    #[tokio::test]
    async fn test_unconstrained_window_spans_whole_timeout() {
        // There is no constraint to check early, so the one listen window
        // must cover the caller's full timeout, not a single poll period.
        let bus = ScriptedBus::new();
        bus.access("sys").push_wave(vec![announcement("p1", "sys")]);

        engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Unconstrained,
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        assert_eq!(
            bus.access("sys").discover_windows(),
            vec![Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_constrained_windows_clamp_to_remaining_time() {
        let bus = ScriptedBus::new();

        let error = engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Names(vec!["ghost".to_string()]),
                Duration::from_millis(25),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ControlError::DiscoveryTimeout(_)));

        // Two full periods, then only the 5 ms left before the deadline.
        assert_eq!(
            bus.access("sys").discover_windows(),
            vec![
                Duration::from_millis(10),
                Duration::from_millis(10),
                Duration::from_millis(5),
            ]
        );
    }

    #[tokio::test]
    async fn test_all_systems_grouped_by_system_name() {
        let bus = ScriptedBus::new();
        bus.all_access().push_wave(vec![
            announcement("b1", "beta"),
            announcement("a2", "alpha"),
            announcement("a1", "alpha"),
        ]);

        let systems = engine(&bus)
            .discover_all_systems_expecting(2, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(systems.len(), 2);
        assert_eq!(systems[0].name(), "alpha");
        assert_eq!(systems[1].name(), "beta");
        let alpha: Vec<_> = systems[0].participants().iter().map(|p| p.name()).collect();
        assert_eq!(alpha, ["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_all_systems_tolerates_fewer_than_expected() {
        let bus = ScriptedBus::new();
        bus.all_access().push_wave(vec![announcement("a1", "alpha")]);

        let systems = engine(&bus)
            .discover_all_systems_expecting(3, Duration::from_millis(30))
            .await
            .unwrap();

        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].name(), "alpha");
    }

    #[tokio::test]
    async fn test_discovered_system_is_operational_end_to_end() {
        let bus = ScriptedBus::new();
        let access = bus.access("sys");
        access.push_wave(vec![announcement("p1", "sys"), announcement("p2", "sys")]);
        for name in ["p1", "p2"] {
            access.add_component(
                name,
                crate::proxy::STATE_MACHINE_COMPONENT,
                &crate::proxy::state_machine_iid(),
            );
        }

        let system = engine(&bus)
            .discover_system(
                "sys",
                DiscoveryConstraint::Unconstrained,
                Duration::from_millis(100),
            )
            .await
            .unwrap();

        system.load().await.unwrap();
        assert_eq!(access.rpc_client("p1").calls()[0].method, "load");

        let short = engine(&bus)
            .discover_system("sys", DiscoveryConstraint::Count(3), Duration::from_millis(20))
            .await;
        assert!(matches!(short, Err(ControlError::DiscoveryTimeout(_))));
    }
}
